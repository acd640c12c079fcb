//! CLI entry point for todoverse.

use std::{io, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use todoverse_app::{AppConfig, FileStorage, SystemClock, open_store};
use todoverse_core::{Priority, SortKey, StatusFilter};
use tracing::debug;
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

mod commands;

/// Personal todo list kept in a local JSON file.
#[derive(Parser, Debug)]
#[command(
    name = "todoverse",
    version,
    about = "todoverse: a personal todo list with filtering, sorting, and analytics"
)]
struct Cli {
    /// Configuration file (defaults to $TODOVERSE_CONFIG, then the platform config dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding todos.json (overrides the configured one).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a todo.
    Add {
        #[arg(long)]
        title: String,
        #[arg(short = 'd', long)]
        description: Option<String>,
        #[arg(short = 'p', long)]
        priority: Option<Priority>,
        #[arg(short = 't', long = "tag")]
        tags: Vec<String>,
        /// RFC 3339 timestamp or YYYY-MM-DD.
        #[arg(long)]
        due: Option<String>,
    },

    /// Change fields of an existing todo.
    Edit {
        /// Todo id or a unique prefix of it.
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(short = 'd', long)]
        description: Option<String>,
        #[arg(short = 'p', long)]
        priority: Option<Priority>,
        /// Replace the tag list.
        #[arg(short = 't', long = "tag", conflicts_with = "clear_tags")]
        tags: Vec<String>,
        #[arg(long)]
        clear_tags: bool,
        #[arg(long, conflicts_with = "clear_due")]
        due: Option<String>,
        #[arg(long)]
        clear_due: bool,
    },

    /// Flip the completion flag.
    Toggle {
        /// Todo id or a unique prefix of it.
        id: String,
    },

    /// Delete a todo.
    Rm {
        /// Todo id or a unique prefix of it.
        id: String,
    },

    /// Move the todo at position FROM to position TO in the full list.
    Mv { from: usize, to: usize },

    /// List todos.
    Ls {
        #[arg(short = 'f', long)]
        filter: Option<StatusFilter>,
        #[arg(short = 's', long)]
        search: Option<String>,
        /// Only show todos carrying any of these tags.
        #[arg(short = 't', long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        sort: Option<SortKey>,
        #[arg(long, conflicts_with = "desc")]
        asc: bool,
        #[arg(long)]
        desc: bool,
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Show completion counters.
    Stats {
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// List every tag in use.
    Tags,

    /// Show analytics: priority mix, seven-day trend, top tags and deadlines.
    Dashboard {
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn main() -> Result<()> {
    let Cli {
        config,
        data_dir,
        cmd,
    } = Cli::parse();
    install_tracing();

    let app_config = AppConfig::load(config.as_deref())?;
    let dir = match data_dir {
        Some(dir) => dir,
        None => app_config.storage.resolve_dir()?,
    };
    debug!(dir = %dir.display(), "opening todo storage");
    let mut store = open_store(FileStorage::new(&dir), Arc::new(SystemClock))
        .with_context(|| format!("failed to open todos in {}", dir.display()))?;

    let mut out = io::stdout().lock();
    commands::run(cmd, &mut store, app_config.view, &mut out)
}

fn install_tracing() {
    // RUST_LOG overrides; warnings only by default so stdout stays clean.
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}
