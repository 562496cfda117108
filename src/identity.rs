//! Identity resolution
//!
//! Everything persisted is keyed by a fully-qualified name (FQN) derived here.
//! Short names are only unique within one diagram, so they are never used as
//! storage keys:
//!
//! ```text
//! entity FQN  = specId "#" shortName          tmf622#Order
//! field FQN   = entityFQN "." fieldName       tmf622#Order.id
//! ```
//!
//! All functions are pure over (path, metadata) / (name, declaration).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::document::{EntityDef, Meta};

/// Spec id used when neither metadata nor the path yields one
pub const DEFAULT_SPEC_ID: &str = "default";

/// Source recorded when the metadata names none
pub const UNKNOWN_SOURCE: &str = "unknown";

/// Node kinds that may ever be written as a label or `kind` property
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Kind {
    Entity,
    RefType,
    SchemaBlock,
}

impl Kind {
    /// The closed allowlist
    pub const ALLOWED: [Kind; 3] = [Kind::Entity, Kind::RefType, Kind::SchemaBlock];

    /// Look up an upstream string in the allowlist (exact match)
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Entity" => Some(Kind::Entity),
            "RefType" => Some(Kind::RefType),
            "SchemaBlock" => Some(Kind::SchemaBlock),
            _ => None,
        }
    }

    /// Storage label. Always a compile-time constant.
    pub fn label(&self) -> &'static str {
        match self {
            Kind::Entity => "Entity",
            Kind::RefType => "RefType",
            Kind::SchemaBlock => "SchemaBlock",
        }
    }

    /// Label an entity of this kind is stored under.
    ///
    /// Only Entity and RefType are entity labels; a declared `SchemaBlock`
    /// entity is stored as a plain Entity so it can never collide with the
    /// batch node keyed by diagram id.
    pub fn entity_label(&self) -> Kind {
        match self {
            Kind::RefType => Kind::RefType,
            Kind::Entity | Kind::SchemaBlock => Kind::Entity,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Spec and diagram identifiers of one extraction batch
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiagramIdentity {
    pub spec_id: String,
    pub diagram_id: String,
}

impl DiagramIdentity {
    pub fn new(spec_id: impl Into<String>, diagram_id: impl Into<String>) -> Self {
        Self {
            spec_id: spec_id.into(),
            diagram_id: diagram_id.into(),
        }
    }
}

impl fmt::Display for DiagramIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.spec_id, self.diagram_id)
    }
}

/// FQN of an entity within a spec
pub fn entity_fqn(spec_id: &str, short_name: &str) -> String {
    format!("{}#{}", spec_id, short_name)
}

/// FQN of a field within an entity
pub fn field_fqn(entity_fqn: &str, field_name: &str) -> String {
    format!("{}.{}", entity_fqn, field_name)
}

/// Resolve the kind of an entity.
///
/// A `Ref`/`Reference` name suffix wins; otherwise the declared kind is used
/// only if it is allowlisted. Anything else becomes [`Kind::Entity`].
pub fn resolve_kind(short_name: &str, entity: &EntityDef) -> Kind {
    if short_name.ends_with("Ref") || short_name.ends_with("Reference") {
        return Kind::RefType;
    }

    if let Some(declared) = entity.kind.as_deref() {
        if let Some(kind) = Kind::parse(declared) {
            return kind;
        }
        tracing::warn!(
            entity = short_name,
            kind = declared,
            "Unknown kind, defaulting to 'Entity'"
        );
    }

    Kind::Entity
}

/// Derives spec/diagram identifiers from source paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityResolver {
    /// Directory or filename prefixes that mark a spec id (e.g. `tmf620`)
    pub spec_prefixes: Vec<String>,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self {
            spec_prefixes: vec!["tmf".to_string(), "spec".to_string()],
        }
    }
}

impl IdentityResolver {
    pub fn new(spec_prefixes: Vec<String>) -> Self {
        Self { spec_prefixes }
    }

    fn is_spec_token(&self, segment: &str) -> bool {
        self.spec_prefixes.iter().any(|p| segment.starts_with(p.as_str()))
    }

    /// Identity of the document's batch, from `meta.source` and overrides
    pub fn resolve(&self, meta: &Meta) -> DiagramIdentity {
        let source = meta.source.as_deref().unwrap_or(UNKNOWN_SOURCE);
        self.derive(source, meta)
    }

    /// Derive `(specId, diagramId)`.
    ///
    /// ```text
    /// meta.specId = "x"                  -> ("x", meta.diagramId | stem)
    /// tmf620/page_034.png                -> ("tmf620", "page_034")
    /// diagrams/tmf620_productoffering.png -> ("tmf620", "productoffering")
    /// diagrams/overview.png              -> ("diagrams", "overview")
    /// overview.png                       -> ("default", "overview")
    /// ```
    pub fn derive(&self, source_path: &str, meta: &Meta) -> DiagramIdentity {
        let path = Path::new(source_path);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| source_path.to_string());
        let parent = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|s| s.to_string_lossy().to_string());

        if let Some(spec_id) = meta.spec_id.as_deref().filter(|s| !s.is_empty()) {
            let diagram_id = meta
                .diagram_id
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or(stem);
            return DiagramIdentity::new(spec_id, diagram_id);
        }

        if let Some(parent) = parent.as_deref() {
            if self.is_spec_token(parent) {
                return DiagramIdentity::new(parent, stem);
            }
        }

        if let Some((prefix, rest)) = stem.split_once('_') {
            if self.is_spec_token(prefix) {
                let diagram_id = if rest.is_empty() { stem.as_str() } else { rest };
                return DiagramIdentity::new(prefix, diagram_id);
            }
        }

        let spec_id = parent.unwrap_or_else(|| DEFAULT_SPEC_ID.to_string());
        DiagramIdentity::new(spec_id, stem)
    }
}

/// Derive identity with the default spec-token prefixes
pub fn derive_spec_and_diagram(source_path: &str, meta: &Meta) -> DiagramIdentity {
    IdentityResolver::default().derive(source_path, meta)
}
