//! Violations
//!
//! Collects everything wrong with a document in one pass so the caller can
//! report it all at once instead of fixing defects one run at a time.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Violation Kinds
// =============================================================================

/// Category of a document defect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViolationKind {
    /// Missing or mis-typed key
    Structural,
    /// Relationship endpoint absent from the entity set
    Referential,
    /// `kind` or `direction` outside its allowlist
    Vocabulary,
    /// Cardinality matches neither the literal set nor the range grammar
    CardinalityFormat,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structural => "V001",
            Self::Referential => "V002",
            Self::Vocabulary => "V003",
            Self::CardinalityFormat => "V004",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Structural => "structural",
            Self::Referential => "referential",
            Self::Vocabulary => "vocabulary",
            Self::CardinalityFormat => "cardinality",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Violation
// =============================================================================

/// A single defect found in a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    /// Location in the document, e.g. `relationships[2].toCardinality`
    pub path: String,
    pub message: String,
}

impl Violation {
    pub fn new(kind: ViolationKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} ({})",
            self.kind,
            self.kind.name(),
            self.message,
            self.path
        )
    }
}

// =============================================================================
// Report
// =============================================================================

/// All violations found in one document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationReport {
    violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    pub fn structural(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.push(Violation::new(ViolationKind::Structural, path, message));
    }

    pub fn referential(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.push(Violation::new(ViolationKind::Referential, path, message));
    }

    pub fn vocabulary(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.push(Violation::new(ViolationKind::Vocabulary, path, message));
    }

    pub fn cardinality(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.push(Violation::new(ViolationKind::CardinalityFormat, path, message));
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter()
    }

    pub fn count(&self, kind: ViolationKind) -> usize {
        self.violations.iter().filter(|v| v.kind == kind).count()
    }

    pub fn into_vec(self) -> Vec<Violation> {
        self.violations
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.violations.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  - {}", violation)?;
        }
        Ok(())
    }
}
