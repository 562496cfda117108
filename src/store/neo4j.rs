//! Neo4j Store
//!
//! Talks to Neo4j through its HTTP transactional endpoint
//! (`POST /db/{database}/tx/commit`). Every statement is committed on its
//! own, so each batch is one round trip and one server-side transaction.

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use super::cypher::{self, Statement};
use super::{
    Constraint, EdgeBatch, GraphSession, GraphStore, IndexSpec, NodeBatch, StoreError, StoreResult,
};
use crate::config::StoreConfig;
use crate::identity::DiagramIdentity;
use crate::version::ServerVersion;

const BOLT_PORT: &str = "7687";
const HTTP_PORT: &str = "7474";
const HTTPS_PORT: &str = "7473";

/// Map a Bolt URI (`bolt://host:7687`, `neo4j://host`) to the HTTP base URL.
/// A missing or default Bolt port becomes the server's HTTP(S) port; other
/// ports are kept. HTTP(S) URIs pass through unchanged.
pub fn http_base_url(uri: &str) -> String {
    let uri = uri.trim_end_matches('/');
    for scheme in ["bolt+s://", "neo4j+s://"] {
        if let Some(rest) = uri.strip_prefix(scheme) {
            return format!("https://{}", with_http_port(rest, HTTPS_PORT));
        }
    }
    for scheme in ["bolt://", "neo4j://"] {
        if let Some(rest) = uri.strip_prefix(scheme) {
            return format!("http://{}", with_http_port(rest, HTTP_PORT));
        }
    }
    uri.to_string()
}

fn with_http_port(rest: &str, http_port: &str) -> String {
    let (authority, path) = match rest.find('/') {
        Some(at) => rest.split_at(at),
        None => (rest, ""),
    };
    // `[::1]` has colons but no port
    let port = authority
        .rsplit_once(':')
        .filter(|(_, port)| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()));

    match port {
        Some((host, port)) if port == BOLT_PORT => format!("{}:{}{}", host, http_port, path),
        Some(_) => rest.to_string(),
        None => format!("{}:{}{}", authority, http_port, path),
    }
}

/// Classify a Neo4j status code.
///
/// Only a failed login is an authentication error; a `Forbidden` refusal on a
/// single statement (for example schema privileges) is an ordinary query error.
pub(crate) fn classify_error(code: &str, message: &str, user: &str) -> StoreError {
    if code.contains("AlreadyExists") {
        StoreError::AlreadyExists(message.to_string())
    } else if code == "Neo.ClientError.Security.Unauthorized"
        || code == "Neo.ClientError.Security.AuthenticationRateLimit"
    {
        StoreError::Authentication {
            user: user.to_string(),
        }
    } else if code.contains("ConstraintValidationFailed") {
        StoreError::ConstraintViolation(message.to_string())
    } else if code.contains("SyntaxError") || code.contains("ProcedureNotFound") || code.contains("Unsupported") {
        StoreError::Unsupported(message.to_string())
    } else {
        StoreError::Query {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct TxRequest<'a> {
    statements: [TxStatement<'a>; 1],
}

#[derive(Debug, Serialize)]
struct TxStatement<'a> {
    statement: &'a str,
    parameters: &'a Value,
}

#[derive(Debug, Default, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    #[serde(default)]
    data: Vec<TxRow>,
}

#[derive(Debug, Deserialize)]
struct TxRow {
    #[serde(default)]
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct TxError {
    code: String,
    message: String,
}

/// Connection to a Neo4j server over HTTP
#[derive(Clone)]
pub struct Neo4jHttpStore {
    client: Client,
    base_url: String,
    database: String,
    user: String,
    password: String,
}

impl fmt::Debug for Neo4jHttpStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Neo4jHttpStore")
            .field("base_url", &self.base_url)
            .field("database", &self.database)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl Neo4jHttpStore {
    pub fn new(config: &StoreConfig) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StoreError::Protocol(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: http_base_url(&config.uri),
            database: config.database.clone(),
            user: config.user.clone(),
            password: config.password.clone().unwrap_or_default(),
        })
    }

    fn commit_url(&self) -> String {
        format!("{}/db/{}/tx/commit", self.base_url, self.database)
    }

    /// Run one auto-committed statement and return its result rows
    fn run(&self, statement: &Statement) -> StoreResult<Vec<Vec<Value>>> {
        tracing::debug!(statement = %statement.text, "Running statement");

        let request = TxRequest {
            statements: [TxStatement {
                statement: &statement.text,
                parameters: &statement.parameters,
            }],
        };

        let response = self
            .client
            .post(self.commit_url())
            .basic_auth(&self.user, Some(&self.password))
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    StoreError::Connectivity {
                        uri: self.base_url.clone(),
                        reason: e.to_string(),
                    }
                } else {
                    StoreError::Protocol(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(StoreError::Authentication {
                user: self.user.clone(),
            });
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(StoreError::Protocol(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let body: TxResponse = response
            .json()
            .map_err(|e| StoreError::Protocol(format!("invalid transaction response: {}", e)))?;

        if let Some(error) = body.errors.first() {
            return Err(classify_error(&error.code, &error.message, &self.user));
        }

        Ok(body
            .results
            .into_iter()
            .next()
            .map(|r| r.data.into_iter().map(|d| d.row).collect())
            .unwrap_or_default())
    }
}

impl GraphStore for Neo4jHttpStore {
    type Session = Neo4jSession;

    fn session(&self) -> StoreResult<Neo4jSession> {
        // Surface unreachable servers and bad credentials before any work starts
        self.run(&cypher::ping())?;
        tracing::debug!(url = %self.base_url, database = %self.database, "Opened session");
        Ok(Neo4jSession { store: self.clone() })
    }
}

/// Session over a [`Neo4jHttpStore`]
#[derive(Debug)]
pub struct Neo4jSession {
    store: Neo4jHttpStore,
}

impl Drop for Neo4jSession {
    fn drop(&mut self) {
        tracing::debug!(url = %self.store.base_url, "Closed session");
    }
}

fn first_count(rows: &[Vec<Value>]) -> usize {
    rows.first()
        .and_then(|row| row.first())
        .and_then(Value::as_u64)
        .unwrap_or(0) as usize
}

impl GraphSession for Neo4jSession {
    fn declare_constraint(&mut self, constraint: &Constraint) -> StoreResult<()> {
        self.store.run(&cypher::create_constraint(constraint)).map(|_| ())
    }

    fn declare_index(&mut self, index: &IndexSpec) -> StoreResult<()> {
        self.store.run(&cypher::create_index(index)).map(|_| ())
    }

    fn server_version(&mut self) -> StoreResult<ServerVersion> {
        let rows = self.store.run(&cypher::server_version())?;
        let raw = rows
            .first()
            .and_then(|row| row.first())
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::Protocol("dbms.components returned no version".to_string()))?;
        ServerVersion::parse(raw).map_err(|e| StoreError::Protocol(format!("bad server version '{}': {}", raw, e)))
    }

    fn merge_nodes(&mut self, batch: &NodeBatch) -> StoreResult<Vec<String>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self.store.run(&cypher::merge_nodes(batch))?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .filter_map(|key| key.as_str().map(str::to_string))
            .collect())
    }

    fn merge_edges(&mut self, batch: &EdgeBatch) -> StoreResult<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let rows = self.store.run(&cypher::merge_edges(batch))?;
        Ok(first_count(&rows))
    }

    fn link_containment(&mut self, identity: &DiagramIdentity) -> StoreResult<usize> {
        let rows = self.store.run(&cypher::link_containment(identity))?;
        Ok(first_count(&rows))
    }
}
