//! graphfetch CLI: resumable, rate-limited harvesting from SPARQL endpoints.
//!
//! `paginate` pages through a LIMIT/OFFSET query; `supplement` fetches extra
//! columns for the entity keys of an earlier dataset.

mod commands;

use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// graphfetch: checkpointed batch fetching from knowledge-graph endpoints
#[derive(Parser, Debug)]
#[command(name = "graphfetch", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output directory for final artifacts, checkpoints and logs
    #[arg(long, global = true)]
    target_dir: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Page through a LIMIT/OFFSET query until the endpoint runs dry
    Paginate {
        /// Run name; names the checkpoint files and `<name>.csv`
        #[arg(short, long)]
        name: String,
        /// Query template file (TOML)
        #[arg(short, long)]
        template: PathBuf,
        /// Page size, overriding `pagination.limit`
        #[arg(long)]
        limit: Option<u64>,
        /// Stop after this many pages (trial runs)
        #[arg(long)]
        max_batches: Option<u64>,
    },
    /// Fetch supplemental columns for the entity keys of an earlier dataset
    Supplement {
        /// Run name; the result is written to `<output_prefix><name>.csv`
        #[arg(short, long)]
        name: String,
        /// Source CSV holding the key column
        #[arg(short, long)]
        source: PathBuf,
        /// Column of entity URIs in the source
        #[arg(long)]
        column: String,
        /// Query template file (TOML) using {qid_list}
        #[arg(short, long)]
        template: PathBuf,
    },
    /// Show checkpoint and final artifact state for a run
    Status {
        #[arg(short, long)]
        name: String,
        /// Inspect a supplement run instead of a paginated one
        #[arg(long)]
        batched: bool,
    },
    /// Delete the checkpoint files of a run
    Clear {
        #[arg(short, long)]
        name: String,
        #[arg(long)]
        batched: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create a default configuration file in the workspace
    Init,
    /// Show the current configuration
    Show,
}

/// Relative target directories live under the workspace.
fn resolve_target_dir(workspace: &Path, target_dir: &Path) -> PathBuf {
    if target_dir.is_absolute() {
        target_dir.to_path_buf()
    } else {
        workspace.join(target_dir)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Resolve workspace
    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    // Load configuration
    let mut config =
        graphfetch_core::config::load_config(Some(&workspace), cli.config.as_deref(), None)
            .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    // Apply CLI overrides
    if let Some(target_dir) = &cli.target_dir {
        config.storage.target_dir = target_dir.clone();
    }
    config.storage.target_dir = resolve_target_dir(&workspace, &config.storage.target_dir);
    config.validate()?;

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    // Human-readable layer for stderr (always active)
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    // JSON file layer for structured logging
    let log_dir = config.storage.target_dir.join("logs");
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "graphfetch.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    commands::handle_command(cli.command, &workspace, &config).await
}
