//! Document Validation
//!
//! Extraction output is untrusted. Before anything reaches the store the raw
//! document is checked for:
//!
//! 1. **Structure**: `entities` is a mapping, `relationships` a sequence,
//!    entities/fields/relationships/`meta` are mappings, fields are named,
//!    flags are booleans
//! 2. **References**: relationship endpoints name existing entities
//! 3. **Vocabulary**: `kind` and `direction` are allowlisted
//! 4. **Cardinality**: multiplicities use a known notation
//!
//! Validation never stops at the first defect; one independent defect yields
//! exactly one [`Violation`].

pub mod diagnostics;

pub use diagnostics::{ValidationReport, Violation, ViolationKind};

use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::document::Direction;
use crate::identity::Kind;

/// Cardinality notations accepted verbatim
pub const CARDINALITY_LITERALS: [&str; 12] = [
    "0..1", "0..*", "1", "1..*", "1..1", "*", "0..0", "1..0", "0..n", "1..n", "n", "m..n",
];

/// Keys an entity may list its fields under
const FIELD_KEYS: [&str; 2] = ["fields", "properties"];

/// Relationship flags stored as booleans
const RELATIONSHIP_FLAGS: [&str; 3] = ["isContainment", "isInheritance", "isDashed"];

/// The document validator
pub struct Validator {
    /// `3..7` and `2..*`
    range_pattern: Regex,
    literals: HashSet<&'static str>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator {
    pub fn new() -> Self {
        Self {
            range_pattern: Regex::new(r"^\d+\.\.(?:\d+|\*)$").unwrap(),
            literals: CARDINALITY_LITERALS.into_iter().collect(),
        }
    }

    /// Whether a cardinality string uses a recognized notation
    pub fn is_valid_cardinality(&self, card: &str) -> bool {
        self.literals.contains(card) || self.range_pattern.is_match(card)
    }

    /// Validate a raw document
    pub fn validate(&self, document: &Value) -> ValidationReport {
        let mut report = ValidationReport::new();

        let Some(root) = document.as_object() else {
            report.structural("$", "Document must be a mapping");
            return report;
        };

        let entity_names = self.validate_entities(root, &mut report);
        self.validate_relationships(root, &entity_names, &mut report);
        self.validate_meta(root, &mut report);

        report
    }

    fn validate_entities<'a>(
        &self,
        root: &'a Map<String, Value>,
        report: &mut ValidationReport,
    ) -> HashSet<&'a str> {
        let entities = match root.get("entities") {
            None => {
                report.structural("entities", "Missing 'entities' key");
                return HashSet::new();
            }
            Some(Value::Object(entities)) => entities,
            Some(_) => {
                report.structural("entities", "'entities' must be a mapping");
                return HashSet::new();
            }
        };

        for (name, entity) in entities {
            let path = format!("entities.{}", name);
            let Some(entity) = entity.as_object() else {
                report.structural(&path, format!("Entity '{}' data must be a mapping", name));
                continue;
            };

            if let Some(kind) = entity.get("kind").filter(|k| !k.is_null()) {
                if kind.as_str().and_then(Kind::parse).is_none() {
                    report.vocabulary(
                        format!("{}.kind", path),
                        format!(
                            "Entity '{}' has invalid kind {} (must be one of {:?})",
                            name,
                            kind,
                            Kind::ALLOWED.map(|k| k.label())
                        ),
                    );
                }
            }

            for key in FIELD_KEYS {
                if let Some(fields) = entity.get(key) {
                    self.validate_fields(name, &format!("{}.{}", path, key), fields, report);
                }
            }
        }

        entities.keys().map(String::as_str).collect()
    }

    fn validate_fields(&self, entity: &str, path: &str, fields: &Value, report: &mut ValidationReport) {
        let Some(fields) = fields.as_array() else {
            report.structural(path, format!("Entity '{}' fields must be a list", entity));
            return;
        };

        for (idx, field) in fields.iter().enumerate() {
            let field_path = format!("{}[{}]", path, idx);
            let Some(field) = field.as_object() else {
                report.structural(&field_path, format!("Entity '{}' field[{}] must be a mapping", entity, idx));
                continue;
            };

            match field.get("name") {
                None | Some(Value::Null) => {
                    report.structural(
                        format!("{}.name", field_path),
                        format!("Entity '{}' field[{}] missing 'name'", entity, idx),
                    );
                }
                Some(Value::String(_)) => {}
                Some(_) => {
                    report.structural(
                        format!("{}.name", field_path),
                        format!("Entity '{}' field[{}] 'name' must be a string", entity, idx),
                    );
                }
            }

            if let Some(ty) = field.get("type") {
                if !ty.is_null() && !ty.is_string() {
                    report.structural(
                        format!("{}.type", field_path),
                        format!("Entity '{}' field[{}] 'type' must be a string", entity, idx),
                    );
                }
            }

            expect_bool(field, "required", &field_path, report);
        }
    }

    fn validate_relationships(
        &self,
        root: &Map<String, Value>,
        entity_names: &HashSet<&str>,
        report: &mut ValidationReport,
    ) {
        let relationships = match root.get("relationships") {
            None => {
                report.structural("relationships", "Missing 'relationships' key");
                return;
            }
            Some(Value::Array(relationships)) => relationships,
            Some(_) => {
                report.structural("relationships", "'relationships' must be a list");
                return;
            }
        };

        for (i, rel) in relationships.iter().enumerate() {
            let path = format!("relationships[{}]", i);
            let Some(rel) = rel.as_object() else {
                report.structural(&path, format!("Relationship[{}] must be a mapping", i));
                continue;
            };

            for end in ["from", "to"] {
                let end_path = format!("{}.{}", path, end);
                match rel.get(end) {
                    None | Some(Value::Null) => {
                        report.structural(end_path, format!("Relationship[{}] missing '{}'", i, end));
                    }
                    Some(target) => {
                        let known = target.as_str().map(|t| entity_names.contains(t)).unwrap_or(false);
                        if !known {
                            report.referential(
                                end_path,
                                format!("Relationship[{}] '{}' entity {} not found in entities", i, end, target),
                            );
                        }
                    }
                }
            }

            for key in ["fromCardinality", "toCardinality", "cardinality"] {
                match rel.get(key) {
                    None | Some(Value::Null) => {}
                    Some(Value::String(card)) => {
                        if !self.is_valid_cardinality(card) {
                            report.cardinality(
                                format!("{}.{}", path, key),
                                format!("Relationship[{}].{} has invalid cardinality format '{}'", i, key, card),
                            );
                        }
                    }
                    Some(other) => {
                        report.cardinality(
                            format!("{}.{}", path, key),
                            format!("Relationship[{}].{} must be a string or null, got {}", i, key, other),
                        );
                    }
                }
            }

            if let Some(direction) = rel.get("direction") {
                if !direction.is_null() && direction.as_str().and_then(Direction::parse).is_none() {
                    report.vocabulary(
                        format!("{}.direction", path),
                        format!(
                            "Relationship[{}] has invalid direction {} (must be one of {:?})",
                            i,
                            direction,
                            Direction::ALL.map(|d| d.as_str())
                        ),
                    );
                }
            }

            if let Some(rel_type) = rel.get("type") {
                if !rel_type.is_null() && !rel_type.is_string() {
                    report.structural(
                        format!("{}.type", path),
                        format!("Relationship[{}] 'type' must be a string", i),
                    );
                }
            }

            for flag in RELATIONSHIP_FLAGS {
                expect_bool(rel, flag, &path, report);
            }
        }
    }

    fn validate_meta(&self, root: &Map<String, Value>, report: &mut ValidationReport) {
        let meta = match root.get("meta") {
            None | Some(Value::Null) => return,
            Some(Value::Object(meta)) => meta,
            Some(_) => {
                report.structural("meta", "'meta' must be a mapping");
                return;
            }
        };

        if meta.contains_key("extracted_at") && meta.contains_key("extractedAt") {
            report.structural("meta.extractedAt", "'meta' has both 'extracted_at' and 'extractedAt'");
        }
    }
}

/// A flag must be a boolean when present; `null` reads as false
fn expect_bool(object: &Map<String, Value>, key: &str, path: &str, report: &mut ValidationReport) {
    match object.get(key) {
        None | Some(Value::Null) | Some(Value::Bool(_)) => {}
        Some(other) => {
            report.structural(
                format!("{}.{}", path, key),
                format!("'{}' must be a boolean, got {}", key, other),
            );
        }
    }
}

/// Validate a raw document with the default validator
pub fn validate(document: &Value) -> ValidationReport {
    Validator::new().validate(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_document() -> Value {
        json!({
            "entities": {
                "Order": { "fields": [{ "name": "id", "type": "string", "required": true }] },
                "OrderRef": {}
            },
            "relationships": [
                { "from": "Order", "to": "OrderRef", "type": "has_ref", "toCardinality": "0..1", "direction": "out" }
            ],
            "meta": { "source": "tmf622/page1.png" }
        })
    }

    #[test]
    fn test_valid_document_is_clean() {
        let report = validate(&valid_document());
        assert!(report.is_clean(), "{}", report);
    }

    #[test]
    fn test_cardinality_grammar() {
        let validator = Validator::new();
        for card in ["0..1", "0..*", "1", "1..*", "*", "3..7", "2..*", "m..n", "0..n"] {
            assert!(validator.is_valid_cardinality(card), "{} should be valid", card);
        }
        for card in ["many", "0..1..2", "", "1..", "..*", "-1..2", "1...2"] {
            assert!(!validator.is_valid_cardinality(card), "{} should be invalid", card);
        }
    }

    #[test]
    fn test_missing_top_level_keys() {
        let report = validate(&json!({ "meta": {} }));
        assert_eq!(report.len(), 2);
        assert_eq!(report.count(ViolationKind::Structural), 2);
    }

    #[test]
    fn test_wrong_top_level_types() {
        let report = validate(&json!({ "entities": [], "relationships": {} }));
        assert_eq!(report.len(), 2);
        assert!(report.iter().any(|v| v.path == "entities"));
        assert!(report.iter().any(|v| v.path == "relationships"));
    }

    #[test]
    fn test_non_mapping_document() {
        let report = validate(&json!(["entities"]));
        assert_eq!(report.len(), 1);
        assert_eq!(report.iter().next().unwrap().path, "$");
    }

    #[test]
    fn test_invalid_kind_is_vocabulary_error() {
        let report = validate(&json!({
            "entities": { "Order": { "kind": "Hacked" } },
            "relationships": []
        }));
        assert_eq!(report.len(), 1);
        assert_eq!(report.count(ViolationKind::Vocabulary), 1);
    }

    #[test]
    fn test_field_defects() {
        let report = validate(&json!({
            "entities": {
                "Order": { "fields": [{ "type": "string" }, { "name": "total", "type": 5 }, "oops"] },
                "Item": { "properties": "not-a-list" }
            },
            "relationships": []
        }));
        assert_eq!(report.len(), 4, "{}", report);
        assert_eq!(report.count(ViolationKind::Structural), 4);
    }

    #[test]
    fn test_referential_and_direction_errors() {
        let report = validate(&json!({
            "entities": { "Order": {} },
            "relationships": [
                { "from": "Order", "to": "Ghost" },
                { "to": "Order" },
                { "from": "Order", "to": "Order", "direction": "sideways" }
            ]
        }));
        assert_eq!(report.len(), 3, "{}", report);
        assert_eq!(report.count(ViolationKind::Referential), 1);
        assert_eq!(report.count(ViolationKind::Structural), 1);
        assert_eq!(report.count(ViolationKind::Vocabulary), 1);
    }

    #[test]
    fn test_cardinality_errors() {
        let report = validate(&json!({
            "entities": { "A": {}, "B": {} },
            "relationships": [
                { "from": "A", "to": "B", "fromCardinality": "many", "toCardinality": null },
                { "from": "A", "to": "B", "cardinality": "0..1..2" },
                { "from": "A", "to": "B", "toCardinality": 1 }
            ]
        }));
        assert_eq!(report.len(), 3, "{}", report);
        assert_eq!(report.count(ViolationKind::CardinalityFormat), 3);
    }

    #[test]
    fn test_k_independent_defects_yield_k_violations() {
        let mut doc = valid_document();
        doc["entities"]["Order"]["kind"] = json!("Hacked");
        doc["entities"]["Order"]["fields"][0]["type"] = json!(["array"]);
        doc["relationships"][0]["toCardinality"] = json!("several");
        doc["relationships"][0]["direction"] = json!("up");
        doc["relationships"].as_array_mut().unwrap().push(json!({ "from": "Nobody", "to": "Order" }));

        let report = validate(&doc);
        assert_eq!(report.len(), 5, "{}", report);
    }

    #[test]
    fn test_flag_and_meta_defects() {
        let report = validate(&json!({
            "entities": { "Order": { "fields": [{ "name": "id", "required": "yes" }] } },
            "relationships": [
                { "from": "Order", "to": "Order", "isDashed": "no", "isContainment": 1, "isInheritance": null }
            ],
            "meta": { "extracted_at": "2024-01-01T00:00:00Z", "extractedAt": "2024-01-02T00:00:00Z" }
        }));
        assert_eq!(report.len(), 4, "{}", report);
        assert_eq!(report.count(ViolationKind::Structural), 4);
        assert!(report.iter().any(|v| v.path == "entities.Order.fields[0].required"));
        assert!(report.iter().any(|v| v.path == "relationships[0].isDashed"));

        let report = validate(&json!({ "entities": {}, "relationships": [], "meta": "page1" }));
        assert_eq!(report.len(), 1);
        assert_eq!(report.iter().next().unwrap().path, "meta");
    }

    #[test]
    fn test_clean_document_always_converts() {
        use crate::document::Document;

        let doc = json!({
            "entities": {
                "Order": {
                    "label": 5,
                    "fields": [{ "name": "id", "description": 7, "required": null }],
                    "properties": [{ "name": "href", "required": false }]
                }
            },
            "relationships": [
                { "from": "Order", "to": "Order", "role": 3, "name": 4.5, "relationshipType": false, "isDashed": null }
            ],
            "meta": { "specId": 622, "diagramId": 1, "title": 2, "source": 3, "extractedAt": 20240101 }
        });
        let report = validate(&doc);
        assert!(report.is_clean(), "{}", report);

        let typed = Document::from_value(doc).unwrap();
        assert_eq!(typed.field_count(), 2);
        assert_eq!(typed.meta.spec_id.as_deref(), Some("622"));
    }

    #[test]
    fn test_report_display() {
        let report = validate(&json!({ "entities": {} }));
        let text = report.to_string();
        assert!(text.contains("[V001] structural: Missing 'relationships' key (relationships)"));
    }
}
