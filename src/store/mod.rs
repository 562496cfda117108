//! Graph Store Boundary
//!
//! The population engine talks to a property-graph store through two traits:
//!
//! - [`GraphStore`]: connection parameters; opens one [`GraphSession`] per run
//! - [`GraphSession`]: schema declaration, version probe and batched
//!   merge-by-key writes
//!
//! Sessions release their resources on `Drop`, so a run that fails halfway
//! still gives its session back.
//!
//! Labels and relationship types are closed enums here. Upstream strings only
//! ever travel as parameter values, never as statement text.

pub mod cypher;
pub mod memory;
pub mod neo4j;

pub use memory::{MemorySession, MemoryStore};
pub use neo4j::{Neo4jHttpStore, Neo4jSession};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::identity::{DiagramIdentity, Kind};
use crate::version::ServerVersion;

/// Properties of a node or edge
pub type PropertyMap = BTreeMap<String, Value>;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Cannot reach store at {uri}: {reason}")]
    Connectivity { uri: String, reason: String },

    #[error("Authentication failed for user '{user}'")]
    Authentication { user: String },

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not supported by this store: {0}")]
    Unsupported(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Query failed [{code}]: {message}")]
    Query { code: String, message: String },

    #[error("Unexpected store response: {0}")]
    Protocol(String),
}

impl StoreError {
    /// Unreachable store or rejected credentials. Always fatal for a run.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, StoreError::Connectivity { .. } | StoreError::Authentication { .. })
    }
}

// =============================================================================
// Labels
// =============================================================================

/// Node labels the engine writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeLabel {
    SchemaBlock,
    Entity,
    RefType,
    Field,
}

impl NodeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeLabel::SchemaBlock => "SchemaBlock",
            NodeLabel::Entity => "Entity",
            NodeLabel::RefType => "RefType",
            NodeLabel::Field => "Field",
        }
    }

    /// Property that identifies a node of this label
    pub fn key_property(&self) -> &'static str {
        match self {
            NodeLabel::SchemaBlock => "id",
            NodeLabel::Entity | NodeLabel::RefType | NodeLabel::Field => "fqn",
        }
    }
}

impl From<Kind> for NodeLabel {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Entity => NodeLabel::Entity,
            Kind::RefType => NodeLabel::RefType,
            Kind::SchemaBlock => NodeLabel::SchemaBlock,
        }
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relationship types the engine writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EdgeLabel {
    /// Entity -> Field
    HasField,
    /// Entity -> Entity, one per materialized direction
    RelatesTo,
    /// SchemaBlock -> Entity/RefType
    ContainsEntity,
}

impl EdgeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeLabel::HasField => "HAS_FIELD",
            EdgeLabel::RelatesTo => "RELATES_TO",
            EdgeLabel::ContainsEntity => "CONTAINS_ENTITY",
        }
    }

    /// Edge properties that are part of the merge identity, besides the endpoints
    pub fn merge_properties(&self) -> &'static [&'static str] {
        match self {
            EdgeLabel::RelatesTo => &["type", "direction"],
            EdgeLabel::HasField | EdgeLabel::ContainsEntity => &[],
        }
    }
}

impl fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Schema declarations
// =============================================================================

/// Uniqueness constraint on a node property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Constraint {
    pub name: &'static str,
    pub label: NodeLabel,
    pub property: &'static str,
}

/// Property index declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexSpec {
    Node {
        name: &'static str,
        label: NodeLabel,
        property: &'static str,
    },
    Relationship {
        name: &'static str,
        label: EdgeLabel,
        property: &'static str,
    },
}

impl IndexSpec {
    pub fn name(&self) -> &'static str {
        match self {
            IndexSpec::Node { name, .. } | IndexSpec::Relationship { name, .. } => name,
        }
    }
}

// =============================================================================
// Batched writes
// =============================================================================

/// One node to create-or-update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMerge {
    /// Value of the label's key property
    pub key: String,
    /// Properties to set. `null` removes a property.
    pub properties: PropertyMap,
}

/// Nodes of one label, written as a single operation
#[derive(Debug, Clone, PartialEq)]
pub struct NodeBatch {
    pub label: NodeLabel,
    pub rows: Vec<NodeMerge>,
}

impl NodeBatch {
    pub fn new(label: NodeLabel) -> Self {
        Self { label, rows: Vec::new() }
    }

    pub fn push(&mut self, key: impl Into<String>, properties: PropertyMap) {
        self.rows.push(NodeMerge {
            key: key.into(),
            properties,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// One edge to create-or-update between two nodes matched by `fqn`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeMerge {
    pub from_fqn: String,
    pub to_fqn: String,
    /// Values for [`EdgeLabel::merge_properties`]
    pub identity: PropertyMap,
    /// Properties to set on the merged edge
    pub properties: PropertyMap,
}

/// Edges of one type, written as a single operation
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeBatch {
    pub label: EdgeLabel,
    pub rows: Vec<EdgeMerge>,
}

impl EdgeBatch {
    pub fn new(label: EdgeLabel) -> Self {
        Self { label, rows: Vec::new() }
    }

    pub fn push(&mut self, edge: EdgeMerge) {
        self.rows.push(edge);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

// =============================================================================
// Traits
// =============================================================================

/// A property-graph store the engine can open sessions against
pub trait GraphStore {
    type Session: GraphSession;

    /// Open a session. Fails with a connectivity error if the store is
    /// unreachable or rejects the credentials.
    fn session(&self) -> StoreResult<Self::Session>;
}

/// One unit of work against the store
pub trait GraphSession {
    /// Declare a uniqueness constraint, if not already present
    fn declare_constraint(&mut self, constraint: &Constraint) -> StoreResult<()>;

    /// Declare a property index, if not already present
    fn declare_index(&mut self, index: &IndexSpec) -> StoreResult<()>;

    /// Probe the server version
    fn server_version(&mut self) -> StoreResult<ServerVersion>;

    /// Merge a batch of nodes by key. Returns the keys written, in batch order.
    fn merge_nodes(&mut self, batch: &NodeBatch) -> StoreResult<Vec<String>>;

    /// Merge a batch of edges. Rows whose endpoints do not exist are skipped.
    /// Returns the number of edges merged.
    fn merge_edges(&mut self, batch: &EdgeBatch) -> StoreResult<usize>;

    /// Connect the batch's SchemaBlock to every Entity/RefType of its spec.
    /// Field nodes and other SchemaBlocks are never linked.
    /// Returns the number of containment edges merged.
    fn link_containment(&mut self, identity: &DiagramIdentity) -> StoreResult<usize>;
}
