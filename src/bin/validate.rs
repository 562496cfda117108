//! Diagram Validate CLI
//!
//! Checks extracted documents without touching the store.

use clap::Parser;
use diagram_graph::loader::{collect_documents, load_value};
use diagram_graph::{ValidationReport, Validator};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "diagram-validate")]
#[command(about = "Validate extracted diagram documents")]
struct Cli {
    /// Document files (JSON/YAML) or directories of documents
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct FileReport {
    file: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    violations: ValidationReport,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Returns whether every document is clean
fn run(cli: Cli) -> anyhow::Result<bool> {
    let validator = Validator::new();
    let mut reports = Vec::new();

    for file in collect_documents(&cli.inputs)? {
        let report = match load_value(&file) {
            Ok(document) => FileReport {
                violations: validator.validate(&document),
                error: None,
                file,
            },
            Err(e) => FileReport {
                error: Some(e.to_string()),
                violations: ValidationReport::new(),
                file,
            },
        };
        reports.push(report);
    }

    let clean = reports.iter().all(|r| r.error.is_none() && r.violations.is_clean());

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(clean);
    }

    for report in &reports {
        if let Some(error) = &report.error {
            println!("❌ {}: {}", report.file.display(), error);
        } else if report.violations.is_clean() {
            println!("✅ {}", report.file.display());
        } else {
            println!("❌ {}: {} violation(s)", report.file.display(), report.violations.len());
            println!("{}", report.violations);
        }
    }

    Ok(clean)
}
