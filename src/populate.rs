//! Population runs
//!
//! One run takes one document through a fixed sequence of phases:
//!
//! ```text
//! Init -> Validate -+-> EnsureSchema -> WriteSchemaBlock -> WriteEntities
//!                   |   -> WriteFields -> WriteRelationships -> LinkContainment -> Done
//!                   +-> Abort (violations)
//! ```
//!
//! Every write is a merge by key, so recovery from any failure is simply
//! running the document again from `Init`. The run holds exactly one store
//! session, which is released when the run ends either way.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::config::PopulateConfig;
use crate::document::Document;
use crate::error::{PopulateError, Result};
use crate::identity::{DiagramIdentity, IdentityResolver};
use crate::schema::{SchemaManager, SchemaOutcome};
use crate::store::GraphStore;
use crate::validate::Validator;
use crate::writer::{GraphWriter, RelationshipCounts};

/// Phases of a population run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunPhase {
    Init,
    Validate,
    Abort,
    EnsureSchema,
    WriteSchemaBlock,
    WriteEntities,
    WriteFields,
    WriteRelationships,
    LinkContainment,
    Done,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Init => "init",
            RunPhase::Validate => "validate",
            RunPhase::Abort => "abort",
            RunPhase::EnsureSchema => "ensure_schema",
            RunPhase::WriteSchemaBlock => "write_schema_block",
            RunPhase::WriteEntities => "write_entities",
            RunPhase::WriteFields => "write_fields",
            RunPhase::WriteRelationships => "write_relationships",
            RunPhase::LinkContainment => "link_containment",
            RunPhase::Done => "done",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Switches for one run
#[derive(Debug, Clone)]
pub struct PopulateOptions {
    pub skip_constraints: bool,
    pub skip_indexes: bool,
    pub skip_validation: bool,
    /// Probe the server before declaring relationship indexes
    pub check_server_version: bool,
    pub resolver: IdentityResolver,
    /// Replaces `meta.source` when set
    pub source: Option<String>,
    /// Fallback `extractedAt`; the current time when unset
    pub timestamp: Option<String>,
}

impl Default for PopulateOptions {
    fn default() -> Self {
        Self {
            skip_constraints: false,
            skip_indexes: false,
            skip_validation: false,
            check_server_version: true,
            resolver: IdentityResolver::default(),
            source: None,
            timestamp: None,
        }
    }
}

impl PopulateOptions {
    pub fn from_config(config: &PopulateConfig) -> Self {
        Self {
            skip_constraints: !config.schema.create_constraints,
            skip_indexes: !config.schema.create_indexes,
            skip_validation: !config.validation.enabled,
            check_server_version: config.schema.check_server_version,
            resolver: IdentityResolver::new(config.identity.spec_prefixes.clone()),
            source: None,
            timestamp: None,
        }
    }
}

/// What a completed run wrote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulateSummary {
    pub identity: DiagramIdentity,
    pub entities: usize,
    pub fields: usize,
    pub relationships: RelationshipCounts,
    pub containment: usize,
    pub constraints: Option<SchemaOutcome>,
    pub indexes: Option<SchemaOutcome>,
}

impl fmt::Display for PopulateSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} entities, {} fields, {} relationship edges ({} dropped), {} containment links",
            self.identity,
            self.entities,
            self.fields,
            self.relationships.edges,
            self.relationships.dropped,
            self.containment
        )
    }
}

/// Populate the store from one raw document
pub fn populate<G: GraphStore>(store: &G, document: &Value, options: &PopulateOptions) -> Result<PopulateSummary> {
    let mut phase = RunPhase::Init;
    let result = run(store, document, options, &mut phase);
    match &result {
        Ok(summary) => tracing::info!(%summary, "Population complete"),
        Err(e) => tracing::error!(phase = %phase, error = %e, "Population failed"),
    }
    result
}

fn enter(phase: &mut RunPhase, next: RunPhase) {
    tracing::debug!(from = %phase, to = %next, "Run phase");
    *phase = next;
}

fn run<G: GraphStore>(
    store: &G,
    raw: &Value,
    options: &PopulateOptions,
    phase: &mut RunPhase,
) -> Result<PopulateSummary> {
    enter(phase, RunPhase::Validate);
    if options.skip_validation {
        tracing::warn!("Validation skipped");
    } else {
        let report = Validator::new().validate(raw);
        if !report.is_clean() {
            enter(phase, RunPhase::Abort);
            return Err(PopulateError::Validation(report));
        }
    }

    let mut document = Document::from_value(raw.clone())?;
    if let Some(source) = &options.source {
        document.meta.source = Some(source.clone());
    }

    enter(phase, RunPhase::EnsureSchema);
    let mut session = store.session()?;
    let manager = SchemaManager::new(options.check_server_version);
    let constraints = if options.skip_constraints {
        None
    } else {
        Some(manager.ensure_constraints(&mut session)?)
    };
    let indexes = if options.skip_indexes {
        None
    } else {
        Some(manager.ensure_indexes(&mut session)?)
    };

    let mut writer = GraphWriter::new(&mut session, options.resolver.clone());
    if let Some(timestamp) = &options.timestamp {
        writer = writer.with_timestamp(timestamp.clone());
    }

    enter(phase, RunPhase::WriteSchemaBlock);
    let identity = writer.upsert_schema_block(&document)?;

    enter(phase, RunPhase::WriteEntities);
    let fqns = writer.upsert_entities(&document, &identity.spec_id)?;

    enter(phase, RunPhase::WriteFields);
    let fields = writer.upsert_fields(&document, &fqns)?;

    enter(phase, RunPhase::WriteRelationships);
    let relationships = writer.upsert_relationships(&document, &fqns)?;

    enter(phase, RunPhase::LinkContainment);
    let containment = writer.link_containment(&identity)?;

    enter(phase, RunPhase::Done);
    Ok(PopulateSummary {
        identity,
        entities: fqns.len(),
        fields,
        relationships,
        containment,
        constraints,
        indexes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_options_from_config() {
        let mut config = PopulateConfig::default();
        config.schema.create_indexes = false;
        config.validation.enabled = false;
        config.identity.spec_prefixes = vec!["rfc".to_string()];

        let options = PopulateOptions::from_config(&config);
        assert!(!options.skip_constraints);
        assert!(options.skip_indexes);
        assert!(options.skip_validation);
        assert_eq!(options.resolver.spec_prefixes, vec!["rfc"]);
    }

    #[test]
    fn test_skip_switches() {
        let store = MemoryStore::new();
        let options = PopulateOptions {
            skip_constraints: true,
            skip_indexes: true,
            ..PopulateOptions::default()
        };
        let summary = populate(&store, &json!({"entities": {}, "relationships": []}), &options).unwrap();

        assert!(summary.constraints.is_none());
        assert!(summary.indexes.is_none());
        assert!(store.constraint_names().is_empty());
        assert!(store.index_names().is_empty());
    }

    #[test]
    fn test_source_override() {
        let store = MemoryStore::new();
        let options = PopulateOptions {
            source: Some("spec7/overview.png".to_string()),
            ..PopulateOptions::default()
        };
        let summary = populate(
            &store,
            &json!({"entities": {}, "relationships": [], "meta": {"source": "ignored/x.png"}}),
            &options,
        )
        .unwrap();
        assert_eq!(summary.identity, DiagramIdentity::new("spec7", "overview"));
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(RunPhase::LinkContainment.to_string(), "link_containment");
    }
}
