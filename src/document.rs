//! Extracted diagram document types
//!
//! A [`Document`] is the in-memory form of one extraction batch: the entities,
//! fields and relationships read off a single diagram, plus free-form metadata.
//! It is ephemeral; nothing here touches the store.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{PopulateError, Result};

/// Field type used when a field declares none
pub const DEFAULT_FIELD_TYPE: &str = "string";

/// Relationship type used when a relationship declares none
pub const DEFAULT_RELATIONSHIP_TYPE: &str = "relates_to";

/// One extraction batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    /// Entities keyed by short name
    #[serde(default)]
    pub entities: BTreeMap<String, EntityDef>,

    #[serde(default)]
    pub relationships: Vec<RelationshipDef>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub meta: Meta,
}

impl Document {
    /// Convert an already-parsed JSON/YAML value into a typed document.
    ///
    /// An entity listing attributes under both `fields` and `properties`
    /// gets the two lists concatenated, `fields` first.
    pub fn from_value(mut value: Value) -> Result<Self> {
        merge_field_lists(&mut value);
        serde_json::from_value(value).map_err(|e| PopulateError::Document(e.to_string()))
    }

    /// Total number of fields across all entities
    pub fn field_count(&self) -> usize {
        self.entities.values().map(|e| e.fields.len()).sum()
    }
}

/// An entity (class box) extracted from a diagram
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityDef {
    /// Declared kind. Untrusted: resolved against the allowlist before use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Display label (defaults to the short name when stored)
    #[serde(default, deserialize_with = "scalar_text", skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Attribute rows, in diagram order
    #[serde(default, alias = "properties")]
    pub fields: Vec<FieldDef>,
}

/// An attribute row of an entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,

    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub required: bool,

    #[serde(default, deserialize_with = "scalar_text", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FieldDef {
    pub fn field_type(&self) -> &str {
        self.field_type.as_deref().unwrap_or(DEFAULT_FIELD_TYPE)
    }
}

/// Declared direction of a relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Out,
    In,
    Bidirectional,
}

impl Direction {
    pub const ALL: [Direction; 3] = [Direction::Out, Direction::In, Direction::Bidirectional];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "out" => Some(Direction::Out),
            "in" => Some(Direction::In),
            "bidirectional" => Some(Direction::Bidirectional),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Out => "out",
            Direction::In => "in",
            Direction::Bidirectional => "bidirectional",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An association line between two entities
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipDef {
    #[serde(default)]
    pub from: Option<String>,

    #[serde(default)]
    pub to: Option<String>,

    #[serde(default, rename = "type")]
    pub rel_type: Option<String>,

    #[serde(default)]
    pub from_cardinality: Option<String>,

    #[serde(default)]
    pub to_cardinality: Option<String>,

    /// Legacy single cardinality, applied to whichever end is unset
    #[serde(default)]
    pub cardinality: Option<String>,

    /// Raw direction; see [`RelationshipDef::direction`]
    #[serde(default, rename = "direction")]
    pub direction_raw: Option<String>,

    #[serde(default, deserialize_with = "scalar_text")]
    pub role: Option<String>,

    #[serde(default, deserialize_with = "scalar_text")]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "scalar_text")]
    pub relationship_type: Option<String>,

    #[serde(default)]
    pub order: Option<Value>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub is_containment: bool,

    #[serde(default, deserialize_with = "null_as_default")]
    pub is_inheritance: bool,

    #[serde(default, deserialize_with = "null_as_default")]
    pub is_dashed: bool,
}

impl RelationshipDef {
    /// Relationship type, normalized when absent or empty
    pub fn rel_type(&self) -> &str {
        match self.rel_type.as_deref() {
            Some(t) if !t.is_empty() => t,
            _ => DEFAULT_RELATIONSHIP_TYPE,
        }
    }

    /// Resolved direction. Unknown values fall back to `out`.
    pub fn direction(&self) -> Direction {
        match self.direction_raw.as_deref() {
            None => Direction::Out,
            Some(raw) => Direction::parse(raw).unwrap_or_else(|| {
                tracing::warn!(direction = raw, "Unknown relationship direction, using 'out'");
                Direction::Out
            }),
        }
    }

    pub fn from_cardinality(&self) -> Option<&str> {
        non_empty(&self.from_cardinality).or_else(|| non_empty(&self.cardinality))
    }

    pub fn to_cardinality(&self) -> Option<&str> {
        non_empty(&self.to_cardinality).or_else(|| non_empty(&self.cardinality))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

// ============================================================================
// Lenient deserialization
// ============================================================================

/// Free-text slot: strings as-is, any other non-null value as its JSON text
/// (`7` becomes `"7"`)
fn scalar_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Explicit `null` reads as the default
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Fold `properties` into `fields` on entities that carry both lists
fn merge_field_lists(document: &mut Value) {
    let Some(entities) = document.get_mut("entities").and_then(Value::as_object_mut) else {
        return;
    };
    for entity in entities.values_mut().filter_map(Value::as_object_mut) {
        if !entity.contains_key("fields") {
            continue;
        }
        let Some(properties) = entity.remove("properties") else {
            continue;
        };
        if let (Some(Value::Array(fields)), Value::Array(extra)) = (entity.get_mut("fields"), properties) {
            fields.extend(extra);
        }
    }
}

/// Free-form extraction metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Meta {
    /// Path of the diagram the data was extracted from
    #[serde(default, deserialize_with = "scalar_text", skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, rename = "specId", deserialize_with = "scalar_text", skip_serializing_if = "Option::is_none")]
    pub spec_id: Option<String>,

    #[serde(default, rename = "diagramId", deserialize_with = "scalar_text", skip_serializing_if = "Option::is_none")]
    pub diagram_id: Option<String>,

    #[serde(default, deserialize_with = "scalar_text", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Version may arrive as a number from YAML (`version: 1.0`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Value>,

    #[serde(
        default,
        alias = "extractedAt",
        deserialize_with = "scalar_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub extracted_at: Option<String>,

    /// Everything else the extractor recorded
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Meta {
    pub fn version_string(&self) -> Option<String> {
        match self.version.as_ref()? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}
