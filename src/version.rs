//! Store server version probing

use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;

/// First server release supporting relationship property indexes
pub const RELATIONSHIP_INDEX_MIN: Version = Version::new(4, 3, 0);

/// Version reported by the store's capability probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerVersion {
    /// Normalized semantic version
    pub version: Version,
    /// Raw string as reported by the server (e.g. "5.26-aura")
    pub raw: String,
}

impl ServerVersion {
    pub fn new(version: Version) -> Self {
        let raw = version.to_string();
        Self { version, raw }
    }

    /// Parse a reported version.
    ///
    /// Servers report `5.12.0`, `4.4`, `5.26-aura` or `2025.01.0`; the numeric
    /// prefix is padded to three components and anything after it is dropped.
    pub fn parse(version_str: &str) -> Result<Self, semver::Error> {
        let trimmed = version_str.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);

        let numeric: String = trimmed
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        // semver rejects leading zeros ("2025.01.0")
        let mut parts: Vec<&str> = numeric
            .trim_end_matches('.')
            .split('.')
            .filter(|p| !p.is_empty())
            .take(3)
            .map(|p| match p.trim_start_matches('0') {
                "" => "0",
                stripped => stripped,
            })
            .collect();
        while !parts.is_empty() && parts.len() < 3 {
            parts.push("0");
        }

        // Empty input falls through to semver for a proper error
        let version = Version::parse(&parts.join("."))?;
        Ok(Self {
            version,
            raw: version_str.to_string(),
        })
    }

    pub fn major(&self) -> u64 {
        self.version.major
    }

    pub fn minor(&self) -> u64 {
        self.version.minor
    }

    /// Whether indexes on relationship properties can be declared
    pub fn supports_relationship_property_indexes(&self) -> bool {
        self.version >= RELATIONSHIP_INDEX_MIN
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}
