//! Diagram Config CLI
//!
//! View and manage population configuration.

use clap::{Parser, Subcommand};
use diagram_graph::PopulateConfig;

#[derive(Parser)]
#[command(name = "diagram-config")]
#[command(about = "View and manage diagram population configuration")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the effective configuration
    Show {
        /// Config file to layer over the defaults
        #[arg(short, long)]
        config: Option<String>,

        /// Output as TOML
        #[arg(long)]
        toml: bool,
    },

    /// Write a default config file
    Init {
        #[arg(short, long, default_value = "diagram-graph.toml")]
        output: String,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Show { config, toml } => {
            let cfg = PopulateConfig::load_from(config.as_deref())?;

            if toml {
                println!("{}", ::toml::to_string_pretty(&cfg)?);
                return Ok(());
            }

            println!("📋 Diagram Population Configuration\n");
            println!("Store:");
            println!("  URI: {}", cfg.store.uri);
            println!("  User: {}", cfg.store.user);
            println!("  Password: {}", if cfg.store.password.is_some() { "(set)" } else { "(unset)" });
            println!("  Database: {}", cfg.store.database);
            println!("  Timeout: {}s", cfg.store.timeout_secs);

            println!("\nSchema:");
            println!("  Constraints: {}", cfg.schema.create_constraints);
            println!("  Indexes: {}", cfg.schema.create_indexes);
            println!("  Check server version: {}", cfg.schema.check_server_version);

            println!("\nValidation:");
            println!("  Enabled: {}", cfg.validation.enabled);

            println!("\nIdentity:");
            println!("  Spec prefixes: {}", cfg.identity.spec_prefixes.join(", "));
        }

        Commands::Init { output } => {
            PopulateConfig::default().save(&output)?;
            println!("✅ Created config file: {}", output);
        }
    }

    Ok(())
}
