//! Storage schema declarations
//!
//! Declares the uniqueness constraints and lookup indexes the writer relies
//! on. Every declaration is idempotent. A declaration the store refuses
//! (already present, unsupported syntax, old server) is logged and the run
//! continues; only connectivity failures abort.

use crate::store::{Constraint, EdgeLabel, GraphSession, IndexSpec, NodeLabel, StoreError, StoreResult};

/// Uniqueness constraints on every merge key
pub const CONSTRAINTS: [Constraint; 4] = [
    Constraint {
        name: "entity_fqn",
        label: NodeLabel::Entity,
        property: "fqn",
    },
    Constraint {
        name: "reftype_fqn",
        label: NodeLabel::RefType,
        property: "fqn",
    },
    Constraint {
        name: "schema_block_id",
        label: NodeLabel::SchemaBlock,
        property: "id",
    },
    Constraint {
        name: "field_fqn",
        label: NodeLabel::Field,
        property: "fqn",
    },
];

/// Node property lookup indexes
pub const NODE_INDEXES: [IndexSpec; 4] = [
    IndexSpec::Node {
        name: "entity_name",
        label: NodeLabel::Entity,
        property: "name",
    },
    IndexSpec::Node {
        name: "entity_spec_id",
        label: NodeLabel::Entity,
        property: "specId",
    },
    IndexSpec::Node {
        name: "reftype_name",
        label: NodeLabel::RefType,
        property: "name",
    },
    IndexSpec::Node {
        name: "field_name",
        label: NodeLabel::Field,
        property: "name",
    },
];

/// Relationship property indexes; need server support (>= 4.3)
pub const RELATIONSHIP_INDEXES: [IndexSpec; 2] = [
    IndexSpec::Relationship {
        name: "relationship_type",
        label: EdgeLabel::RelatesTo,
        property: "type",
    },
    IndexSpec::Relationship {
        name: "relationship_cardinality",
        label: EdgeLabel::RelatesTo,
        property: "cardinality",
    },
];

/// What a declaration pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaOutcome {
    /// Declarations the store accepted (including ones already present)
    pub declared: Vec<&'static str>,
    /// Declarations not attempted
    pub skipped: Vec<&'static str>,
    /// Declarations the store refused, with the reason
    pub warnings: Vec<(&'static str, String)>,
}

impl SchemaOutcome {
    fn merge(&mut self, other: SchemaOutcome) {
        self.declared.extend(other.declared);
        self.skipped.extend(other.skipped);
        self.warnings.extend(other.warnings);
    }
}

/// Declares constraints and indexes on a session
#[derive(Debug, Clone, Copy)]
pub struct SchemaManager {
    check_server_version: bool,
}

impl Default for SchemaManager {
    fn default() -> Self {
        Self::new(true)
    }
}

impl SchemaManager {
    /// With `check_server_version` off, relationship indexes are attempted
    /// without probing and refusals are only logged.
    pub fn new(check_server_version: bool) -> Self {
        Self { check_server_version }
    }

    /// Declare uniqueness on every merge key
    pub fn ensure_constraints<S: GraphSession>(&self, session: &mut S) -> StoreResult<SchemaOutcome> {
        let mut outcome = SchemaOutcome::default();
        for constraint in &CONSTRAINTS {
            record(&mut outcome, constraint.name, session.declare_constraint(constraint))?;
        }
        tracing::info!(
            declared = outcome.declared.len(),
            warnings = outcome.warnings.len(),
            "Constraints ensured"
        );
        Ok(outcome)
    }

    /// Declare node indexes, then relationship indexes if the server supports them
    pub fn ensure_indexes<S: GraphSession>(&self, session: &mut S) -> StoreResult<SchemaOutcome> {
        let mut outcome = SchemaOutcome::default();
        for index in &NODE_INDEXES {
            record(&mut outcome, index.name(), session.declare_index(index))?;
        }
        outcome.merge(self.ensure_relationship_indexes(session)?);

        tracing::info!(
            declared = outcome.declared.len(),
            skipped = outcome.skipped.len(),
            warnings = outcome.warnings.len(),
            "Indexes ensured"
        );
        Ok(outcome)
    }

    fn ensure_relationship_indexes<S: GraphSession>(&self, session: &mut S) -> StoreResult<SchemaOutcome> {
        let mut outcome = SchemaOutcome::default();

        if self.check_server_version {
            let supported = match session.server_version() {
                Ok(version) => {
                    tracing::debug!(version = %version, "Store version");
                    version.supports_relationship_property_indexes()
                }
                Err(e) if e.is_connectivity() => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "Store version probe failed");
                    false
                }
            };
            if !supported {
                tracing::info!("Skipping relationship property indexes (requires store version 4.3+)");
                outcome.skipped.extend(RELATIONSHIP_INDEXES.iter().map(IndexSpec::name));
                return Ok(outcome);
            }
        }

        for index in &RELATIONSHIP_INDEXES {
            record(&mut outcome, index.name(), session.declare_index(index))?;
        }
        Ok(outcome)
    }
}

/// Fold one declaration result into the outcome. Connectivity errors propagate.
fn record(outcome: &mut SchemaOutcome, name: &'static str, result: StoreResult<()>) -> StoreResult<()> {
    match result {
        Ok(()) => {
            tracing::debug!(name, "Declared");
            outcome.declared.push(name);
        }
        Err(StoreError::AlreadyExists(_)) => {
            tracing::debug!(name, "Already exists");
            outcome.declared.push(name);
        }
        Err(e) if e.is_connectivity() => return Err(e),
        Err(e) => {
            tracing::warn!(name, error = %e, "Schema declaration failed");
            outcome.warnings.push((name, e.to_string()));
        }
    }
    Ok(())
}
