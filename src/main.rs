use anyhow::{anyhow, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod archive;
mod cleaner;
mod cli;
mod config;
mod gis;
mod pipeline;
mod retry;
mod shapefile;

use cli::{CleanArgs, Command, RootArgs, RunArgs};
use gis::ogr::OgrBackend;

fn main() -> Result<()> {
    let args = RootArgs::parse();
    match args.command {
        Command::Run(run) => {
            init_tracing(run.verbose);
            cmd_run(run)
        }
        Command::Clean(clean) => {
            init_tracing(clean.verbose);
            cmd_clean(clean)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_run(args: RunArgs) -> Result<()> {
    let config = config::resolve_config(args.config.as_deref(), args.workspace.as_deref())?;
    let date_stamp = match args.date {
        Some(date) => validated_date_stamp(date)?,
        None => pipeline::date_stamp_today(),
    };

    let backend = OgrBackend::locate(
        config.ogr2ogr_command.as_deref(),
        config.ogrinfo_command.as_deref(),
    )?;
    let outcome = pipeline::run_export(&config, &backend, &date_stamp)?;

    println!("Processing complete.");
    println!("Final shapefile: {}", outcome.shapefile.display());
    println!("Zipped output: {}", outcome.archive.display());
    Ok(())
}

fn cmd_clean(args: CleanArgs) -> Result<()> {
    let config = config::resolve_config(args.config.as_deref(), args.workspace.as_deref())?;
    cleaner::clean_workspace(&config.workspace, &config.output_prefix)?;
    cleaner::prepare_temp_dir(&config.temp_dir())?;
    println!("Workspace cleaned: {}", config.workspace.display());
    Ok(())
}

fn validated_date_stamp(date: String) -> Result<String> {
    let valid = date.len() == 8 && date.bytes().all(|byte| byte.is_ascii_digit());
    if !valid {
        return Err(anyhow!("--date must be 8 digits (YYYYMMDD), got {date:?}"));
    }
    Ok(date)
}
