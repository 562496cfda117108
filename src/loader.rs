//! Document Loading
//!
//! Reads extraction output from JSON or YAML files. Documents are first read as
//! an untyped [`serde_json::Value`] so the validator can inspect the raw shape
//! before anything is converted into typed structures.

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::document::Document;
use crate::error::{PopulateError, Result};

/// On-disk document format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    /// Detect format from the file extension. Anything not YAML is read as JSON.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("yaml") | Some("yml") => DocumentFormat::Yaml,
            _ => DocumentFormat::Json,
        }
    }

    fn is_document(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()).as_deref(),
            Some("json") | Some("yaml") | Some("yml")
        )
    }
}

/// Parse document text in the given format
pub fn parse_value(content: &str, format: DocumentFormat) -> Result<Value> {
    let value = match format {
        DocumentFormat::Json => serde_json::from_str(content)?,
        DocumentFormat::Yaml => serde_yaml::from_str(content)?,
    };
    Ok(value)
}

/// Load a document file as an untyped value
pub fn load_value(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)?;
    parse_value(&content, DocumentFormat::from_path(path))
}

/// Load and convert a document file without validating it
pub fn load_document(path: &Path) -> Result<Document> {
    Document::from_value(load_value(path)?)
}

/// Expand a list of files and directories into the documents to process.
///
/// Directories are walked recursively; only `.json`, `.yaml` and `.yml` files
/// are picked up. Explicit file arguments are kept regardless of extension.
pub fn collect_documents(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(input)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| DocumentFormat::is_document(p))
                .collect();
            found.sort();
            files.extend(found);
        } else if input.is_file() {
            files.push(input.clone());
        } else {
            return Err(PopulateError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such file or directory: {}", input.display()),
            )));
        }
    }

    Ok(files)
}
