//! nvc - naive version control.
//!
//! This is the main entry point for the nvc CLI. Every snapshot is a full
//! copy of the working tree stored under `.nvc/<N>`.

mod commands;

use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use commands::*;
use nvc_core::{Config, Repository};
use nvc_snapshot::SnapshotId;
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser)]
#[command(name = "nvc")]
#[command(author, version, about = "Naive version control", long_about = None)]
struct Cli {
    /// Working tree to operate on (defaults to the current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Snapshot the working tree
    #[command(alias = "backup")]
    Snap,
    /// Restore a snapshot
    Checkout {
        /// Snapshot number
        id: SnapshotId,
        /// Restore into this directory instead of the configured destination
        #[arg(long)]
        into: Option<PathBuf>,
    },
    /// Print the most recent snapshot number
    Current,
    /// List snapshots
    Log {
        /// Print output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compare a snapshot with a directory
    Diff {
        /// Snapshot number
        id: SnapshotId,
        /// Directory to compare against (defaults to the working tree)
        #[arg(long)]
        against: Option<PathBuf>,
        /// Include unified diffs of changed files
        #[arg(long)]
        patch: bool,
    },
    /// Branching is not supported; accepted for compatibility
    Branch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = parse_cli();
    let Some(command) = cli.command else {
        unrecognised_command();
    };

    let cwd = std::env::current_dir()?;
    let root = match cli.root {
        Some(root) => nvc_util::path::resolve_in(&cwd, &root),
        None => cwd.clone(),
    };

    let (config, sources) = Config::load(Some(&root)).await?;
    init_logging(cli.verbose, config.log_level());
    debug!(root = %root.display(), sources = ?sources, "Starting nvc");

    let repo = Repository::open_or_init(&root, &config).await?;
    if repo.was_created() {
        eprintln!("Creating repository..");
    }

    match command {
        Commands::Snap => handle_snap(&repo).await,
        Commands::Checkout { id, into } => {
            let into = into.map(|dir| nvc_util::path::resolve_in(&cwd, &dir));
            handle_checkout(&repo, id, into.as_deref()).await
        }
        Commands::Current => handle_current(&repo).await,
        Commands::Log { json } => handle_log(&repo, json).await,
        Commands::Diff { id, against, patch } => {
            let against = against.map(|dir| nvc_util::path::resolve_in(&cwd, &dir));
            handle_diff(&repo, id, against.as_deref(), patch).await
        }
        Commands::Branch => {
            handle_branch();
            Ok(())
        }
    }
}

/// Parse arguments, reporting unknown commands the nvc way.
fn parse_cli() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.kind() == ErrorKind::InvalidSubcommand => unrecognised_command(),
        Err(e) => e.exit(),
    }
}

fn unrecognised_command() -> ! {
    eprintln!("Unrecognised command");
    std::process::exit(1);
}
