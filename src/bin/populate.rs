//! Diagram Populate CLI
//!
//! Writes extracted diagram documents into the graph store.

use anyhow::{bail, Context};
use clap::Parser;
use diagram_graph::loader::{collect_documents, load_value};
use diagram_graph::{populate, GraphStore, MemoryStore, Neo4jHttpStore, PopulateConfig, PopulateOptions};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "diagram-populate")]
#[command(about = "Populate the graph store from extracted diagram documents")]
struct Cli {
    /// Document files (JSON/YAML) or directories of documents
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Store URI
    #[arg(long, env = "NEO4J_URI")]
    uri: Option<String>,

    /// Store user
    #[arg(long, env = "NEO4J_USER")]
    user: Option<String>,

    /// Store password
    #[arg(long, env = "NEO4J_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Database name
    #[arg(long, env = "NEO4J_DATABASE")]
    database: Option<String>,

    /// Skip constraint creation
    #[arg(long)]
    no_constraints: bool,

    /// Skip index creation
    #[arg(long)]
    no_indexes: bool,

    /// Skip document validation
    #[arg(long)]
    no_validate: bool,

    /// Source path to record for the document (single document only)
    #[arg(long)]
    source: Option<String>,

    /// Config file
    #[arg(short, long)]
    config: Option<String>,

    /// Populate an in-memory graph instead of the store
    #[arg(long)]
    dry_run: bool,

    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)))
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = PopulateConfig::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(uri) = cli.uri {
        config.store.uri = uri;
    }
    if let Some(user) = cli.user {
        config.store.user = user;
    }
    if cli.password.is_some() {
        config.store.password = cli.password;
    }
    if let Some(database) = cli.database {
        config.store.database = database;
    }

    let mut options = PopulateOptions::from_config(&config);
    options.skip_constraints |= cli.no_constraints;
    options.skip_indexes |= cli.no_indexes;
    options.skip_validation |= cli.no_validate;

    let files = collect_documents(&cli.inputs)?;
    if files.is_empty() {
        bail!("no documents found");
    }
    if cli.source.is_some() && files.len() > 1 {
        bail!("--source applies to a single document, got {}", files.len());
    }
    options.source = cli.source;

    if cli.dry_run {
        let store = MemoryStore::new();
        populate_all(&store, &files, &options)?;
        println!(
            "🧪 Dry run: {} nodes, {} edges",
            store.node_count(),
            store.edge_count()
        );
        Ok(())
    } else {
        let store = Neo4jHttpStore::new(&config.store)?;
        populate_all(&store, &files, &options)
    }
}

/// Populate each document in turn. Later documents still run after a
/// document fails, unless the store itself is unreachable.
fn populate_all<G: GraphStore>(store: &G, files: &[PathBuf], options: &PopulateOptions) -> anyhow::Result<()> {
    let mut failed = 0;

    for path in files {
        let result = load_value(path).and_then(|document| populate(store, &document, options));
        match result {
            Ok(summary) => println!("✅ {}: {}", path.display(), summary),
            Err(e) if e.is_connectivity() => {
                return Err(e).with_context(|| format!("while populating {}", path.display()));
            }
            Err(e) => {
                println!("❌ {}: {}", path.display(), e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} documents failed", failed, files.len());
    }
    Ok(())
}
