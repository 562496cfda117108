//! Configuration management for diagram population
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (diagram-graph.toml)
//! - Environment variables (DIAGRAM_GRAPH__*)
//!
//! ## Example config file (diagram-graph.toml):
//! ```toml
//! [store]
//! uri = "http://localhost:7474"
//! user = "neo4j"
//! database = "neo4j"
//! timeout_secs = 30
//!
//! [schema]
//! create_constraints = true
//! create_indexes = true
//! check_server_version = true
//!
//! [validation]
//! enabled = true
//!
//! [identity]
//! spec_prefixes = ["tmf", "spec"]
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Main configuration for a population run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PopulateConfig {
    /// Store connection settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Schema declaration settings
    #[serde(default)]
    pub schema: SchemaSettings,

    /// Validation settings
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Identity derivation settings
    #[serde(default)]
    pub identity: IdentityConfig,
}

/// Store connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store URI. `bolt://` and `neo4j://` URIs are mapped to the HTTP port.
    #[serde(default = "default_uri")]
    pub uri: String,

    #[serde(default = "default_user")]
    pub user: String,

    /// Kept out of saved files
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    #[serde(default = "default_database")]
    pub database: String,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Which schema declarations a run performs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSettings {
    #[serde(default = "default_true")]
    pub create_constraints: bool,

    #[serde(default = "default_true")]
    pub create_indexes: bool,

    /// Probe the server version before declaring relationship indexes
    #[serde(default = "default_true")]
    pub check_server_version: bool,
}

/// Validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Refuse to populate documents with violations
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Identity derivation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Directory/file prefixes that mark a spec identifier
    #[serde(default = "default_spec_prefixes")]
    pub spec_prefixes: Vec<String>,
}

// Default value functions
fn default_uri() -> String {
    "http://localhost:7474".to_string()
}

fn default_user() -> String {
    "neo4j".to_string()
}

fn default_database() -> String {
    "neo4j".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_spec_prefixes() -> Vec<String> {
    vec!["tmf".to_string(), "spec".to_string()]
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            user: default_user(),
            password: None,
            database: default_database(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for SchemaSettings {
    fn default() -> Self {
        Self {
            create_constraints: true,
            create_indexes: true,
            check_server_version: true,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            spec_prefixes: default_spec_prefixes(),
        }
    }
}

impl PopulateConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file over the default locations
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "diagram-graph.toml",
            ".diagram-graph.toml",
            "config/diagram-graph.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "diagram-graph", "diagram-graph") {
            let xdg_config = config_dir.config_dir().join("diagram-graph.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // DIAGRAM_GRAPH__STORE__URI etc.
        builder = builder.add_source(
            Environment::with_prefix("DIAGRAM_GRAPH")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("identity.spec_prefixes")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}
