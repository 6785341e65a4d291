use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nethook_analyzer::{Inspector, InspectorConfig, LoadOptions, Registry};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nethook-dump")]
#[command(about = "Inspect captured nethook packet dumps", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Registry JSON document (overrides the config file)
    #[arg(long, global = true)]
    registry: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the records of a dump directory
    List {
        dir: PathBuf,
    },
    /// Print the decoded tree of one record
    Tree {
        dir: PathBuf,
        sequence: u64,
        /// Emit the tree as JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => InspectorConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => InspectorConfig::default(),
    };
    if let Some(path) = cli.registry {
        config.registry = Some(path);
    }
    let registry: Registry = config.load_registry().context("loading registry")?;
    let inspector = Inspector::new(Arc::new(registry), config.projection);

    match cli.command {
        Commands::List { dir } => run_list(&inspector, dir),
        Commands::Tree {
            dir,
            sequence,
            json,
        } => run_tree(&inspector, dir, sequence, json),
    }
}

fn run_list(inspector: &Inspector, dir: PathBuf) -> Result<()> {
    let dump = inspector
        .load(&dir, &LoadOptions::default())
        .with_context(|| format!("loading {}", dir.display()))?;
    let mut out = String::new();
    for record in dump.iter() {
        let emsg = record
            .type_discriminator
            .map_or_else(|| "-".to_string(), |v| v.to_string());
        out.push_str(&format!(
            "{}\t{}\t{}\t{}\t{}\n",
            record.sequence,
            record.direction.as_str(),
            emsg,
            record.name.as_deref().unwrap_or("-"),
            record.inner_type_name.as_deref().unwrap_or("-"),
        ));
    }
    for skipped in &dump.skipped {
        tracing::warn!(file = %skipped.file_name, reason = ?skipped.reason, "skipped");
    }
    print_stdout(&out)
}

fn run_tree(inspector: &Inspector, dir: PathBuf, sequence: u64, json: bool) -> Result<()> {
    inspector
        .load(&dir, &LoadOptions::default())
        .with_context(|| format!("loading {}", dir.display()))?;
    let tree = inspector
        .tree_by_sequence(sequence)
        .with_context(|| format!("no record with sequence {sequence} in {}", dir.display()))?;
    let text = if json {
        serde_json::to_string_pretty(tree.as_ref())?
    } else {
        tree.render_with(inspector.config().bytes_preview)
    };
    print_stdout(&format!("{text}\n"))
}

fn print_stdout(text: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    let bytes = text.as_bytes();
    if let Err(err) = stdout.write_all(bytes).and_then(|_| stdout.flush()) {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}
