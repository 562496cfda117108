//! Diagram Graph
//!
//! Populates a property graph from structured extraction output: entities,
//! fields and relationships read off architecture diagrams.
//!
//! ## Features
//!
//! - **Validation**: untrusted documents are checked for structure, references,
//!   vocabulary and cardinality notation before anything is written
//! - **Stable identity**: every node is keyed by a fully-qualified name derived
//!   from the spec and diagram it came from
//! - **Idempotent writes**: batched merge-by-key upserts; re-running a document
//!   converges on the same graph
//! - **Pluggable stores**: Neo4j over HTTP, or an in-memory graph for dry runs
//!
//! ## Graph layout
//!
//! ```text
//! (:SchemaBlock {id: diagramId})
//!     -[:CONTAINS_ENTITY]-> (:Entity {fqn: "tmf622#Order"})
//!                               -[:HAS_FIELD]-> (:Field {fqn: "tmf622#Order.id"})
//!                               -[:RELATES_TO {type, direction}]-> (:RefType {fqn: "tmf622#OrderRef"})
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod identity;
pub mod loader;
pub mod populate;
pub mod schema;
pub mod store;
pub mod validate;
pub mod version;
pub mod writer;

pub use config::PopulateConfig;
pub use document::{Direction, Document, EntityDef, FieldDef, Meta, RelationshipDef};
pub use error::{PopulateError, Result};
pub use identity::{entity_fqn, field_fqn, resolve_kind, DiagramIdentity, IdentityResolver, Kind};
pub use populate::{populate, PopulateOptions, PopulateSummary, RunPhase};
pub use schema::SchemaManager;
pub use store::{GraphSession, GraphStore, MemoryStore, Neo4jHttpStore, StoreError};
pub use validate::{validate, ValidationReport, Validator, Violation, ViolationKind};
pub use version::ServerVersion;
pub use writer::GraphWriter;
