//! Cypher statement templates
//!
//! Statement text is assembled only from [`NodeLabel`], [`EdgeLabel`] and
//! static names; all document data goes in parameters.

use serde_json::{json, Value};

use super::{Constraint, EdgeBatch, EdgeLabel, IndexSpec, NodeBatch, NodeLabel};
use crate::identity::DiagramIdentity;

/// A statement with its parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub parameters: Value,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: json!({}),
        }
    }

    pub fn with_parameters(text: impl Into<String>, parameters: Value) -> Self {
        Self {
            text: text.into(),
            parameters,
        }
    }
}

pub fn create_constraint(c: &Constraint) -> Statement {
    Statement::new(format!(
        "CREATE CONSTRAINT {} IF NOT EXISTS FOR (n:{}) REQUIRE n.{} IS UNIQUE",
        c.name, c.label, c.property
    ))
}

pub fn create_index(index: &IndexSpec) -> Statement {
    let text = match index {
        IndexSpec::Node { name, label, property } => {
            format!("CREATE INDEX {} IF NOT EXISTS FOR (n:{}) ON (n.{})", name, label, property)
        }
        IndexSpec::Relationship { name, label, property } => {
            format!("CREATE INDEX {} IF NOT EXISTS FOR ()-[r:{}]-() ON (r.{})", name, label, property)
        }
    };
    Statement::new(text)
}

pub fn server_version() -> Statement {
    Statement::new("CALL dbms.components() YIELD name, versions RETURN versions[0] AS version")
}

pub fn ping() -> Statement {
    Statement::new("RETURN 1 AS ok")
}

/// `UNWIND` merge of one node label; returns the merged keys
pub fn merge_nodes(batch: &NodeBatch) -> Statement {
    let key = batch.label.key_property();
    let text = format!(
        "UNWIND $rows AS row \
         MERGE (n:{label} {{{key}: row.key}}) \
         SET n += row.props \
         RETURN n.{key} AS key",
        label = batch.label,
        key = key,
    );
    let rows: Vec<Value> = batch
        .rows
        .iter()
        .map(|r| json!({ "key": r.key, "props": r.properties }))
        .collect();
    Statement::with_parameters(text, json!({ "rows": rows }))
}

/// `UNWIND` merge of one relationship type between nodes matched by `fqn`
pub fn merge_edges(batch: &EdgeBatch) -> Statement {
    let identity: Vec<String> = batch
        .label
        .merge_properties()
        .iter()
        .map(|p| format!("{p}: row.identity.{p}", p = p))
        .collect();
    let pattern = if identity.is_empty() {
        String::new()
    } else {
        format!(" {{{}}}", identity.join(", "))
    };

    let text = format!(
        "UNWIND $rows AS row \
         MATCH (a) WHERE a.fqn = row.from \
         MATCH (b) WHERE b.fqn = row.to \
         MERGE (a)-[r:{label}{pattern}]->(b) \
         SET r += row.props \
         RETURN count(r) AS merged",
        label = batch.label,
        pattern = pattern,
    );
    let rows: Vec<Value> = batch
        .rows
        .iter()
        .map(|r| {
            json!({
                "from": r.from_fqn,
                "to": r.to_fqn,
                "identity": r.identity,
                "props": r.properties,
            })
        })
        .collect();
    Statement::with_parameters(text, json!({ "rows": rows }))
}

/// Fields and other SchemaBlocks of the same spec are not linked
pub fn link_containment(identity: &DiagramIdentity) -> Statement {
    let text = format!(
        "MATCH (sb:{block} {{diagramId: $diagram_id}}) \
         MATCH (e) WHERE e.specId = $spec_id AND (e:{entity} OR e:{reftype}) \
         MERGE (sb)-[r:{contains}]->(e) \
         RETURN count(r) AS linked",
        block = NodeLabel::SchemaBlock,
        entity = NodeLabel::Entity,
        reftype = NodeLabel::RefType,
        contains = EdgeLabel::ContainsEntity,
    );
    Statement::with_parameters(
        text,
        json!({ "diagram_id": identity.diagram_id, "spec_id": identity.spec_id }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EdgeMerge, PropertyMap};

    #[test]
    fn test_constraint_statement() {
        let stmt = create_constraint(&Constraint {
            name: "entity_fqn",
            label: NodeLabel::Entity,
            property: "fqn",
        });
        assert_eq!(
            stmt.text,
            "CREATE CONSTRAINT entity_fqn IF NOT EXISTS FOR (n:Entity) REQUIRE n.fqn IS UNIQUE"
        );
    }

    #[test]
    fn test_relationship_index_statement() {
        let stmt = create_index(&IndexSpec::Relationship {
            name: "relationship_type",
            label: EdgeLabel::RelatesTo,
            property: "type",
        });
        assert_eq!(
            stmt.text,
            "CREATE INDEX relationship_type IF NOT EXISTS FOR ()-[r:RELATES_TO]-() ON (r.type)"
        );
    }

    #[test]
    fn test_node_merge_keeps_data_in_parameters() {
        let mut batch = NodeBatch::new(NodeLabel::Entity);
        let mut props = PropertyMap::new();
        props.insert("name".into(), json!("Order`) DETACH DELETE n //"));
        batch.push("tmf622#Order", props);

        let stmt = merge_nodes(&batch);
        assert!(stmt.text.contains("MERGE (n:Entity {fqn: row.key})"));
        assert!(!stmt.text.contains("DETACH"));
        assert_eq!(stmt.parameters["rows"][0]["key"], json!("tmf622#Order"));
    }

    #[test]
    fn test_relates_to_merge_pattern_includes_identity() {
        let mut batch = EdgeBatch::new(EdgeLabel::RelatesTo);
        batch.push(EdgeMerge {
            from_fqn: "s#A".into(),
            to_fqn: "s#B".into(),
            identity: PropertyMap::new(),
            properties: PropertyMap::new(),
        });
        let stmt = merge_edges(&batch);
        assert!(stmt
            .text
            .contains("MERGE (a)-[r:RELATES_TO {type: row.identity.type, direction: row.identity.direction}]->(b)"));

        let stmt = merge_edges(&EdgeBatch::new(EdgeLabel::HasField));
        assert!(stmt.text.contains("MERGE (a)-[r:HAS_FIELD]->(b)"));
    }

    #[test]
    fn test_containment_statement() {
        let stmt = link_containment(&DiagramIdentity::new("tmf622", "page1"));
        assert!(stmt.text.contains("MATCH (sb:SchemaBlock {diagramId: $diagram_id})"));
        assert!(stmt.text.contains("(e:Entity OR e:RefType)"));
        assert_eq!(stmt.parameters["spec_id"], json!("tmf622"));
    }
}
