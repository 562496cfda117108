//! Graph writer
//!
//! Turns a validated [`Document`] into batched merge-by-key writes. Each
//! phase is one batch per label, so a phase either lands or fails as a unit
//! and re-running a document converges on the same graph.

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::document::{Direction, Document};
use crate::identity::{entity_fqn, field_fqn, resolve_kind, DiagramIdentity, IdentityResolver, Kind, UNKNOWN_SOURCE};
use crate::store::{EdgeBatch, EdgeLabel, EdgeMerge, GraphSession, NodeBatch, NodeLabel, PropertyMap, StoreResult};

/// Schema block version when the metadata has none
pub const DEFAULT_BLOCK_VERSION: &str = "1.0";

/// How one declared relationship becomes stored edges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgePlan {
    /// Edge runs `to -> from`
    pub reversed: bool,
    /// Stored `direction` tag
    pub tag: Direction,
    /// Edge cardinalities are the declared ones swapped
    pub swap_cardinality: bool,
}

const OUT_EDGE: EdgePlan = EdgePlan {
    reversed: false,
    tag: Direction::Out,
    swap_cardinality: false,
};

const IN_EDGE: EdgePlan = EdgePlan {
    reversed: true,
    tag: Direction::In,
    swap_cardinality: true,
};

/// Edges to materialize for a declared direction
pub fn edge_plan(direction: Direction) -> &'static [EdgePlan] {
    match direction {
        Direction::Out => &[OUT_EDGE],
        Direction::In => &[IN_EDGE],
        Direction::Bidirectional => &[OUT_EDGE, IN_EDGE],
    }
}

/// Counts from the relationship phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelationshipCounts {
    /// Edges merged
    pub edges: usize,
    /// Relationships dropped for an unresolved endpoint
    pub dropped: usize,
}

/// Current time as stored in `extractedAt`
pub fn run_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn text(value: Option<&str>) -> Value {
    value.map(|s| Value::String(s.to_string())).unwrap_or(Value::Null)
}

/// Node properties must be scalars or lists; structured defaults are kept as JSON text
fn property_value(value: &Value) -> Value {
    match value {
        Value::Object(_) => Value::String(value.to_string()),
        Value::Array(items) if items.iter().any(|v| v.is_object() || v.is_array()) => {
            Value::String(value.to_string())
        }
        other => other.clone(),
    }
}

/// Writes one document through a store session
pub struct GraphWriter<'s, S: GraphSession> {
    session: &'s mut S,
    resolver: IdentityResolver,
    timestamp: String,
}

impl<'s, S: GraphSession> GraphWriter<'s, S> {
    pub fn new(session: &'s mut S, resolver: IdentityResolver) -> Self {
        Self {
            session,
            resolver,
            timestamp: run_timestamp(),
        }
    }

    /// Use a fixed `extractedAt` fallback instead of the current time
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    /// Merge the document's SchemaBlock node
    pub fn upsert_schema_block(&mut self, document: &Document) -> StoreResult<DiagramIdentity> {
        let meta = &document.meta;
        let identity = self.resolver.resolve(meta);

        let title = meta
            .title
            .clone()
            .unwrap_or_else(|| format!("Schema Block: {}/{}", identity.spec_id, identity.diagram_id));
        let version = meta
            .version_string()
            .unwrap_or_else(|| DEFAULT_BLOCK_VERSION.to_string());
        let extracted_at = meta.extracted_at.clone().unwrap_or_else(|| self.timestamp.clone());

        let mut props = PropertyMap::new();
        props.insert("specId".into(), Value::String(identity.spec_id.clone()));
        props.insert("diagramId".into(), Value::String(identity.diagram_id.clone()));
        props.insert("title".into(), Value::String(title));
        props.insert("version".into(), Value::String(version));
        props.insert(
            "artifact".into(),
            Value::String(meta.source.clone().unwrap_or_else(|| UNKNOWN_SOURCE.to_string())),
        );
        props.insert("extractedAt".into(), Value::String(extracted_at));

        let mut batch = NodeBatch::new(NodeLabel::SchemaBlock);
        batch.push(identity.diagram_id.clone(), props);
        self.session.merge_nodes(&batch)?;

        tracing::info!(spec_id = %identity.spec_id, diagram_id = %identity.diagram_id, "Schema block upserted");
        Ok(identity)
    }

    /// Merge Entity and RefType nodes, one batch per resolved kind.
    /// Returns short name -> FQN for every entity.
    pub fn upsert_entities(&mut self, document: &Document, spec_id: &str) -> StoreResult<BTreeMap<String, String>> {
        let mut groups: BTreeMap<Kind, NodeBatch> = BTreeMap::new();
        let mut fqns = BTreeMap::new();

        for (short_name, entity) in &document.entities {
            let kind = resolve_kind(short_name, entity).entity_label();
            let fqn = entity_fqn(spec_id, short_name);

            let mut props = PropertyMap::new();
            props.insert("name".into(), Value::String(short_name.clone()));
            props.insert(
                "label".into(),
                Value::String(entity.label.clone().unwrap_or_else(|| short_name.clone())),
            );
            props.insert("specId".into(), Value::String(spec_id.to_string()));
            props.insert("kind".into(), Value::String(kind.label().to_string()));

            groups
                .entry(kind)
                .or_insert_with(|| NodeBatch::new(NodeLabel::from(kind)))
                .push(fqn.clone(), props);
            fqns.insert(short_name.clone(), fqn);
        }

        for (kind, batch) in &groups {
            self.session.merge_nodes(batch)?;
            tracing::info!(kind = %kind, count = batch.len(), "Entities upserted");
        }

        Ok(fqns)
    }

    /// Merge Field nodes and their HAS_FIELD edges. Returns the number of fields.
    pub fn upsert_fields(&mut self, document: &Document, fqns: &BTreeMap<String, String>) -> StoreResult<usize> {
        let mut nodes = NodeBatch::new(NodeLabel::Field);
        let mut edges = EdgeBatch::new(EdgeLabel::HasField);

        for (short_name, entity) in &document.entities {
            let Some(owner) = fqns.get(short_name) else {
                continue;
            };
            for field in &entity.fields {
                let fqn = field_fqn(owner, &field.name);

                let mut props = PropertyMap::new();
                props.insert("name".into(), Value::String(field.name.clone()));
                props.insert("type".into(), Value::String(field.field_type().to_string()));
                props.insert("required".into(), Value::Bool(field.required));
                props.insert("description".into(), text(field.description.as_deref()));
                props.insert(
                    "defaultValue".into(),
                    field.default.as_ref().map(property_value).unwrap_or(Value::Null),
                );
                props.insert("entityFqn".into(), Value::String(owner.clone()));
                nodes.push(fqn.clone(), props);

                edges.push(EdgeMerge {
                    from_fqn: owner.clone(),
                    to_fqn: fqn,
                    identity: PropertyMap::new(),
                    properties: PropertyMap::new(),
                });
            }
        }

        if nodes.is_empty() {
            tracing::info!("No fields to upsert");
            return Ok(0);
        }

        self.session.merge_nodes(&nodes)?;
        self.session.merge_edges(&edges)?;
        tracing::info!(count = nodes.len(), "Fields upserted");
        Ok(nodes.len())
    }

    /// Merge RELATES_TO edges. Relationships with an endpoint that is not an
    /// entity of this document are dropped with a warning.
    pub fn upsert_relationships(
        &mut self,
        document: &Document,
        fqns: &BTreeMap<String, String>,
    ) -> StoreResult<RelationshipCounts> {
        let mut batch = EdgeBatch::new(EdgeLabel::RelatesTo);
        let mut dropped = 0;

        for (i, rel) in document.relationships.iter().enumerate() {
            let from = rel.from.as_deref().and_then(|s| fqns.get(s));
            let to = rel.to.as_deref().and_then(|s| fqns.get(s));
            let (Some(from), Some(to)) = (from, to) else {
                tracing::warn!(
                    index = i,
                    from = rel.from.as_deref().unwrap_or(""),
                    to = rel.to.as_deref().unwrap_or(""),
                    "Dropping relationship with unresolved endpoint"
                );
                dropped += 1;
                continue;
            };

            for plan in edge_plan(rel.direction()) {
                let (source, target) = if plan.reversed { (to, from) } else { (from, to) };
                let (from_card, to_card) = if plan.swap_cardinality {
                    (rel.to_cardinality(), rel.from_cardinality())
                } else {
                    (rel.from_cardinality(), rel.to_cardinality())
                };

                let mut identity = PropertyMap::new();
                identity.insert("type".into(), Value::String(rel.rel_type().to_string()));
                identity.insert("direction".into(), Value::String(plan.tag.as_str().to_string()));

                let mut props = PropertyMap::new();
                props.insert("fromCardinality".into(), text(from_card));
                props.insert("toCardinality".into(), text(to_card));
                props.insert("role".into(), text(rel.role.as_deref()));
                props.insert("name".into(), text(rel.name.as_deref()));
                props.insert("relationshipType".into(), text(rel.relationship_type.as_deref()));
                props.insert("order".into(), rel.order.as_ref().map(property_value).unwrap_or(Value::Null));
                props.insert("isContainment".into(), Value::Bool(rel.is_containment));
                props.insert("isInheritance".into(), Value::Bool(rel.is_inheritance));
                props.insert("isDashed".into(), Value::Bool(rel.is_dashed));

                batch.push(EdgeMerge {
                    from_fqn: source.clone(),
                    to_fqn: target.clone(),
                    identity,
                    properties: props,
                });
            }
        }

        let edges = if batch.is_empty() {
            0
        } else {
            self.session.merge_edges(&batch)?
        };
        tracing::info!(edges, dropped, "Relationships upserted");
        Ok(RelationshipCounts { edges, dropped })
    }

    /// Link the schema block to every Entity/RefType of its spec
    pub fn link_containment(&mut self, identity: &DiagramIdentity) -> StoreResult<usize> {
        let linked = self.session.link_containment(identity)?;
        tracing::info!(linked, diagram_id = %identity.diagram_id, "Containment linked");
        Ok(linked)
    }
}
