//! CLI argument parsing for the CodeRED export.
//!
//! The CLI is intentionally thin: it resolves configuration and hands the
//! pipeline an explicit workspace, so the same stages can be reused elsewhere.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint for the export pipeline.
#[derive(Parser, Debug)]
#[command(
    name = "coderedgen",
    version,
    about = "Dated CodeRED shapefile feed generator",
    after_help = "Commands:\n  run    --workspace <DIR>   Run the full export pipeline\n  clean  --workspace <DIR>   Only clean stale outputs and the scratch dir\n\nExamples:\n  coderedgen run --workspace /srv/codered\n  coderedgen run --config /etc/codered/export.json --date 20250829\n  coderedgen clean --workspace /srv/codered",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    Run(RunArgs),
    Clean(CleanArgs),
}

/// Run command inputs for a full export pass.
#[derive(Parser, Debug)]
#[command(about = "Run the full export: clean, export, join, filter, project, stamp, zip")]
pub struct RunArgs {
    /// Workspace directory receiving the dated output and archive
    #[arg(long, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Path to a JSON export config
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Date stamp for output names (defaults to today)
    #[arg(long, value_name = "YYYYMMDD")]
    pub date: Option<String>,

    /// Emit debug-level progress output
    #[arg(long)]
    pub verbose: bool,
}

/// Clean command inputs: the cleanup stages without the export.
#[derive(Parser, Debug)]
#[command(about = "Delete stale outputs and purge the scratch directory")]
pub struct CleanArgs {
    /// Workspace directory to clean
    #[arg(long, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Path to a JSON export config
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Emit debug-level progress output
    #[arg(long)]
    pub verbose: bool,
}
