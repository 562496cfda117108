//! End-to-end population tests
//!
//! Every test runs the full pipeline against the in-memory store.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use diagram_graph::identity::DiagramIdentity;
use diagram_graph::loader::{collect_documents, load_document, load_value};
use diagram_graph::store::{
    Constraint, EdgeBatch, EdgeLabel, GraphSession, GraphStore, IndexSpec, MemorySession, MemoryStore, NodeBatch,
    NodeLabel, StoreError, StoreResult,
};
use diagram_graph::{populate, PopulateError, PopulateOptions, ServerVersion, ViolationKind};
use proptest::prelude::*;
use serde_json::{json, Value};

const TS: &str = "2024-06-01T12:00:00Z";

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn fixture_value(name: &str) -> Value {
    load_value(&fixture(name)).unwrap()
}

fn options() -> PopulateOptions {
    PopulateOptions {
        timestamp: Some(TS.to_string()),
        ..PopulateOptions::default()
    }
}

// =============================================================================
// End-to-end
// =============================================================================

#[test]
fn test_order_diagram_end_to_end() {
    let store = MemoryStore::new();
    let summary = populate(&store, &fixture_value("order.json"), &options()).unwrap();

    assert_eq!(summary.identity, DiagramIdentity::new("tmf622", "page1"));
    assert_eq!(summary.entities, 2);
    assert_eq!(summary.fields, 4);
    assert_eq!(summary.relationships.edges, 1);
    assert_eq!(summary.containment, 2);

    let block = store.node(NodeLabel::SchemaBlock, "page1").unwrap();
    assert_eq!(block["specId"], json!("tmf622"));
    assert_eq!(block["title"], json!("Product Ordering"));
    assert_eq!(block["extractedAt"], json!("2024-05-01T10:00:00Z"));

    let order = store.node(NodeLabel::Entity, "tmf622#Order").unwrap();
    assert_eq!(order["kind"], json!("Entity"));
    assert_eq!(order["label"], json!("Order"));
    let order_ref = store.node(NodeLabel::RefType, "tmf622#OrderRef").unwrap();
    assert_eq!(order_ref["kind"], json!("RefType"));

    let id = store.node(NodeLabel::Field, "tmf622#Order.id").unwrap();
    assert_eq!(id["required"], json!(true));
    assert_eq!(id["description"], json!("Unique identifier"));

    let edges = store.edges(EdgeLabel::RelatesTo);
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].from, "tmf622#Order");
    assert_eq!(edges[0].to, "tmf622#OrderRef");
    assert_eq!(edges[0].get("toCardinality"), Some("0..1"));
    assert_eq!(edges[0].get("direction"), Some("out"));
    assert_eq!(edges[0].get("role"), Some("relatedOrder"));

    assert_eq!(store.node_count(), 7);
    assert_eq!(store.count_edges(EdgeLabel::HasField), 4);
    assert_eq!(store.count_edges(EdgeLabel::ContainsEntity), 2);
    assert_eq!(store.constraint_names().len(), 4);
    assert_eq!(store.index_names().len(), 6);
}

#[test]
fn test_rerun_is_idempotent() {
    let store = MemoryStore::new();
    let document = fixture_value("order.json");

    populate(&store, &document, &options()).unwrap();
    let first = store.snapshot();
    populate(&store, &document, &options()).unwrap();

    assert_eq!(store.snapshot(), first);
    assert_eq!(store.sessions_opened(), 2);
    assert_eq!(store.open_sessions(), 0);
}

#[test]
fn test_yaml_document_with_validation_skipped() {
    let store = MemoryStore::new();
    let options = PopulateOptions {
        skip_validation: true,
        ..options()
    };
    let summary = populate(&store, &fixture_value("catalog.yaml"), &options).unwrap();

    assert_eq!(summary.identity, DiagramIdentity::new("tmf620", "productoffering"));

    // "Hacked" is not an allowed kind
    let category = store.node(NodeLabel::Entity, "tmf620#Category").unwrap();
    assert_eq!(category["kind"], json!("Entity"));
    assert!(store.node(NodeLabel::RefType, "tmf620#ProductSpecificationRef").is_some());

    let offering = store.node(NodeLabel::Entity, "tmf620#ProductOffering").unwrap();
    assert_eq!(offering["label"], json!("Product Offering"));

    let block = store.node(NodeLabel::SchemaBlock, "productoffering").unwrap();
    assert_eq!(block["version"], json!("2.1"));
    assert_eq!(block["extractedAt"], json!(TS));

    let status = store.node(NodeLabel::Field, "tmf620#ProductOffering.lifecycleStatus").unwrap();
    assert_eq!(status["defaultValue"], json!("Active"));
}

#[test]
fn test_bidirectional_relationship_materializes_both_edges() {
    let store = MemoryStore::new();
    let options = PopulateOptions {
        skip_validation: true,
        ..options()
    };
    populate(&store, &fixture_value("catalog.yaml"), &options).unwrap();

    let edges: Vec<_> = store
        .edges(EdgeLabel::RelatesTo)
        .into_iter()
        .filter(|e| e.from.ends_with("Category") || e.to.ends_with("Category"))
        .collect();
    assert_eq!(edges.len(), 2);

    let out = edges.iter().find(|e| e.get("direction") == Some("out")).unwrap();
    assert_eq!(out.from, "tmf620#ProductOffering");
    assert_eq!(out.get("fromCardinality"), Some("0..*"));
    assert_eq!(out.get("toCardinality"), Some("1..*"));

    let back = edges.iter().find(|e| e.get("direction") == Some("in")).unwrap();
    assert_eq!(back.from, "tmf620#Category");
    assert_eq!(back.to, "tmf620#ProductOffering");
    assert_eq!(back.get("fromCardinality"), Some("1..*"));
    assert_eq!(back.get("toCardinality"), Some("0..*"));

    let legacy = store
        .edges(EdgeLabel::RelatesTo)
        .into_iter()
        .find(|e| e.to == "tmf620#ProductSpecificationRef")
        .unwrap();
    assert_eq!(legacy.get("fromCardinality"), Some("0..1"));
    assert_eq!(legacy.get("toCardinality"), Some("0..1"));
}

// =============================================================================
// Validation
// =============================================================================

#[test]
fn test_invalid_document_aborts_before_any_write() {
    let store = MemoryStore::new();
    let err = populate(&store, &fixture_value("invalid.json"), &options()).unwrap_err();

    let report = match err {
        PopulateError::Validation(report) => report,
        other => panic!("expected validation failure, got {:?}", other),
    };
    assert_eq!(report.len(), 5, "{}", report);
    assert_eq!(report.count(ViolationKind::Vocabulary), 2);
    assert_eq!(report.count(ViolationKind::Structural), 1);
    assert_eq!(report.count(ViolationKind::Referential), 1);
    assert_eq!(report.count(ViolationKind::CardinalityFormat), 1);

    assert_eq!(store.sessions_opened(), 0);
    assert_eq!(store.node_count(), 0);
}

#[test]
fn test_catalog_hacked_kind_is_rejected_when_validating() {
    let store = MemoryStore::new();
    let err = populate(&store, &fixture_value("catalog.yaml"), &options()).unwrap_err();
    match err {
        PopulateError::Validation(report) => {
            assert_eq!(report.len(), 1);
            assert_eq!(report.count(ViolationKind::Vocabulary), 1);
        }
        other => panic!("expected validation failure, got {:?}", other),
    }
}

#[test]
fn test_skipped_validation_still_requires_convertible_document() {
    let store = MemoryStore::new();
    let options = PopulateOptions {
        skip_validation: true,
        ..options()
    };
    let err = populate(&store, &json!({"entities": []}), &options).unwrap_err();
    assert!(matches!(err, PopulateError::Document(_)), "{:?}", err);
    assert_eq!(store.sessions_opened(), 0);
}

#[test]
fn test_loosely_typed_document_populates_after_clean_validation() {
    let document = json!({
        "entities": {
            "Order": {
                "label": 5,
                "fields": [{ "name": "id", "required": null, "description": 7 }],
                "properties": [{ "name": "href" }]
            }
        },
        "relationships": [{ "from": "Order", "to": "Order", "role": 3, "isDashed": false }],
        "meta": { "specId": 622, "diagramId": "page1" }
    });
    assert!(diagram_graph::validate(&document).is_clean());

    let store = MemoryStore::new();
    let summary = populate(&store, &document, &options()).unwrap();
    assert_eq!(summary.identity, DiagramIdentity::new("622", "page1"));
    assert_eq!(store.count_nodes(NodeLabel::Field), 2);

    let order = store.node(NodeLabel::Entity, "622#Order").unwrap();
    assert_eq!(order["label"], json!("5"));
}

#[test]
fn test_non_boolean_flag_is_rejected_before_any_write() {
    let mut document = fixture_value("order.json");
    document["relationships"][0]["isDashed"] = json!("no");

    let store = MemoryStore::new();
    match populate(&store, &document, &options()).unwrap_err() {
        PopulateError::Validation(report) => {
            assert_eq!(report.len(), 1, "{}", report);
            assert_eq!(report.count(ViolationKind::Structural), 1);
        }
        other => panic!("expected validation failure, got {:?}", other),
    }
    assert_eq!(store.sessions_opened(), 0);
}

// =============================================================================
// Store failures
// =============================================================================

#[test]
fn test_unreachable_store_is_fatal() {
    let store = MemoryStore::new();
    store.set_offline(true);
    let err = populate(&store, &fixture_value("order.json"), &options()).unwrap_err();
    assert!(err.is_connectivity());
    assert_eq!(store.open_sessions(), 0);
}

#[test]
fn test_old_server_skips_relationship_indexes() {
    let store = MemoryStore::new();
    store.set_server_version(Some(ServerVersion::parse("3.5.14").unwrap()));
    let summary = populate(&store, &fixture_value("order.json"), &options()).unwrap();

    let indexes = summary.indexes.unwrap();
    assert_eq!(indexes.skipped.len(), 2);
    assert!(!store.index_names().contains(&"relationship_type"));
    assert_eq!(store.count_edges(EdgeLabel::RelatesTo), 1);
}

/// Memory store whose relationship writes can be made to fail
#[derive(Clone, Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_edges: Arc<AtomicBool>,
}

struct FlakySession {
    inner: MemorySession,
    fail_edges: Arc<AtomicBool>,
}

impl GraphStore for FlakyStore {
    type Session = FlakySession;

    fn session(&self) -> StoreResult<FlakySession> {
        Ok(FlakySession {
            inner: self.inner.session()?,
            fail_edges: self.fail_edges.clone(),
        })
    }
}

impl GraphSession for FlakySession {
    fn declare_constraint(&mut self, constraint: &Constraint) -> StoreResult<()> {
        self.inner.declare_constraint(constraint)
    }

    fn declare_index(&mut self, index: &IndexSpec) -> StoreResult<()> {
        self.inner.declare_index(index)
    }

    fn server_version(&mut self) -> StoreResult<ServerVersion> {
        self.inner.server_version()
    }

    fn merge_nodes(&mut self, batch: &NodeBatch) -> StoreResult<Vec<String>> {
        self.inner.merge_nodes(batch)
    }

    fn merge_edges(&mut self, batch: &EdgeBatch) -> StoreResult<usize> {
        if batch.label == EdgeLabel::RelatesTo && self.fail_edges.load(Ordering::SeqCst) {
            return Err(StoreError::Query {
                code: "Neo.TransientError.Transaction.DeadlockDetected".to_string(),
                message: "deadlock".to_string(),
            });
        }
        self.inner.merge_edges(batch)
    }

    fn link_containment(&mut self, identity: &DiagramIdentity) -> StoreResult<usize> {
        self.inner.link_containment(identity)
    }
}

#[test]
fn test_failed_run_releases_session_and_rerun_converges() {
    let document = fixture_value("order.json");

    let clean = MemoryStore::new();
    populate(&clean, &document, &options()).unwrap();

    let flaky = FlakyStore::default();
    flaky.fail_edges.store(true, Ordering::SeqCst);
    let err = populate(&flaky, &document, &options()).unwrap_err();
    assert!(!err.is_connectivity());
    assert_eq!(flaky.inner.open_sessions(), 0);
    assert_eq!(flaky.inner.count_edges(EdgeLabel::RelatesTo), 0);

    flaky.fail_edges.store(false, Ordering::SeqCst);
    populate(&flaky, &document, &options()).unwrap();
    assert_eq!(flaky.inner.snapshot(), clean.snapshot());
}

#[test]
fn test_concurrent_runs_match_sequential_runs() {
    let order = fixture_value("order.json");
    let mut catalog = fixture_value("catalog.yaml");
    catalog["entities"]["Category"]["kind"] = json!("Entity");

    let sequential = MemoryStore::new();
    populate(&sequential, &order, &options()).unwrap();
    populate(&sequential, &catalog, &options()).unwrap();

    let shared = MemoryStore::new();
    std::thread::scope(|scope| {
        for document in [&order, &catalog, &order] {
            let store = shared.clone();
            scope.spawn(move || populate(&store, document, &options()).unwrap());
        }
    });

    assert_eq!(shared.snapshot(), sequential.snapshot());
}

// =============================================================================
// Loading
// =============================================================================

#[test]
fn test_fixture_directory_collection() {
    let files = collect_documents(&[fixture("")]).unwrap();
    let names: Vec<_> = files
        .iter()
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["catalog.yaml", "invalid.json", "order.json"]);
}

#[test]
fn test_yaml_properties_alias() {
    let document = load_document(&fixture("catalog.yaml")).unwrap();
    assert_eq!(document.entities["ProductOffering"].fields.len(), 2);
    assert_eq!(document.field_count(), 3);
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn prop_distinct_short_names_get_distinct_nodes(
        spec in "[a-z]{1,5}[0-9]{0,3}",
        names in prop::collection::btree_set("[A-Z][A-Za-z0-9]{0,8}", 1..12),
    ) {
        let entities: serde_json::Map<String, Value> =
            names.iter().map(|n| (n.clone(), json!({"fields": [{"name": "id"}]}))).collect();
        let document = json!({
            "entities": entities,
            "relationships": [],
            "meta": {"specId": spec, "diagramId": "d"}
        });

        let store = MemoryStore::new();
        let summary = populate(&store, &document, &options()).unwrap();

        let stored = store.count_nodes(NodeLabel::Entity) + store.count_nodes(NodeLabel::RefType);
        prop_assert_eq!(stored, names.len());
        prop_assert_eq!(summary.entities, names.len());
        prop_assert_eq!(store.count_nodes(NodeLabel::Field), names.len());
    }

    #[test]
    fn prop_numeric_ranges_are_valid_cardinalities(lo in 0u32..1000, hi in 0u32..1000) {
        let validator = diagram_graph::Validator::new();
        let range = format!("{}..{}", lo, hi);
        let open = format!("{}..*", lo);
        let nested = format!("{}..{}..{}", lo, hi, lo);
        prop_assert!(validator.is_valid_cardinality(&range));
        prop_assert!(validator.is_valid_cardinality(&open));
        prop_assert!(!validator.is_valid_cardinality(&nested));
    }

    #[test]
    fn prop_words_are_invalid_cardinalities(word in "[a-z]{2,8}") {
        let validator = diagram_graph::Validator::new();
        prop_assert!(!validator.is_valid_cardinality(&word));
    }

    #[test]
    fn prop_clean_validation_implies_population(
        label in scalar(),
        description in scalar(),
        required in scalar(),
        role in scalar(),
        is_dashed in scalar(),
        spec_id in scalar(),
        title in scalar(),
    ) {
        let document = json!({
            "entities": {
                "Order": { "label": label, "fields": [{ "name": "id", "description": description, "required": required }] }
            },
            "relationships": [{ "from": "Order", "to": "Order", "role": role, "isDashed": is_dashed }],
            "meta": { "specId": spec_id, "title": title, "diagramId": "d" }
        });

        let store = MemoryStore::new();
        let result = populate(&store, &document, &options());
        if diagram_graph::validate(&document).is_clean() {
            prop_assert!(result.is_ok(), "{:?}", result);
        } else {
            prop_assert!(matches!(result, Err(PopulateError::Validation(_))), "{:?}", result);
        }
    }
}

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-z0-9]{0,6}".prop_map(Value::from),
    ]
}
