use std::path::PathBuf;
use clap::Parser;
use diagram_graph::loader::load_value;
use diagram_graph::{populate, MemoryStore, PopulateOptions};

#[derive(Parser)]
#[command(name = "diagram-graph-export")]
#[command(about = "Export the graph a document would produce to DOT/SVG format")]
struct Cli {
    /// Document file (JSON/YAML)
    document: PathBuf,

    /// Output file (defaults to diagram.dot / diagram.svg)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format: dot or svg
    #[arg(short, long, default_value = "dot")]
    format: String,

    /// Export even if the document has violations
    #[arg(long)]
    no_validate: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let document = load_value(&cli.document)?;
    let store = MemoryStore::new();
    let options = PopulateOptions {
        skip_validation: cli.no_validate,
        ..PopulateOptions::default()
    };
    let summary = populate(&store, &document, &options)?;

    println!("Graph built: {} ({} nodes, {} edges)",
             summary.identity,
             store.node_count(),
             store.edge_count());

    let dot_content = store.to_dot();

    match cli.format.as_str() {
        "dot" => {
            let output_path = cli.output.unwrap_or_else(|| PathBuf::from("diagram.dot"));
            std::fs::write(&output_path, &dot_content)?;
            println!("✅ Exported DOT to: {:?}", output_path);
        }
        "svg" => {
            let output_path = cli.output.unwrap_or_else(|| PathBuf::from("diagram.svg"));

            // GraphViz reads the DOT from stdin
            let mut child = std::process::Command::new("dot")
                .arg("-Tsvg")
                .arg("-o")
                .arg(&output_path)
                .stdin(std::process::Stdio::piped())
                .stderr(std::process::Stdio::piped())
                .spawn()?;
            if let Some(mut stdin) = child.stdin.take() {
                use std::io::Write;
                stdin.write_all(dot_content.as_bytes())?;
            }
            let output = child.wait_with_output()?;

            if output.status.success() {
                println!("✅ Exported SVG to: {:?}", output_path);
            } else {
                eprintln!("❌ GraphViz conversion failed:");
                eprintln!("{}", String::from_utf8_lossy(&output.stderr));
                std::process::exit(1);
            }
        }
        _ => {
            eprintln!("❌ Invalid format. Use 'dot' or 'svg'");
            std::process::exit(1);
        }
    }

    Ok(())
}
