mod cmd;
mod config;
mod debugger;
mod util;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use crate::config::Configs;
use crate::util::logging::{setup_logging, LevelFilter};

#[derive(clap::Parser)]
#[clap(
    name = "hudsonbug",
    about = "Debug and load programs through the X68000 HudsonSoft bug monitor",
    version
)]
struct Cli {
    /// Location for log file
    ///
    /// The log file receives every command sent to the monitor and every answer.
    #[clap(long, global = true, help_heading = "LOG CONFIGURATION")]
    log_file: Option<PathBuf>,

    /// Console log level. Falls back to RUST_LOG when not given.
    #[clap(long, global = true, value_enum, help_heading = "LOG CONFIGURATION")]
    log_level: Option<LevelFilter>,

    /// Configuration file merged on top of hudsonbug.toml (toml, json or yaml).
    #[clap(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    subcommand: Subcommand,
}

#[derive(clap::Subcommand)]
enum Subcommand {
    /// Upload an object file into target memory
    Upload(cmd::upload::Cmd),
    /// Show the register values of the target
    Regs(cmd::regs::Cmd),
    /// Basic command line debugger
    Debug(cmd::debug::Cmd),
}

fn main() -> Result<()> {
    let matches = Cli::parse();

    let _logger_guard = setup_logging(matches.log_file.as_deref(), matches.log_level)?;

    let mut configs = Configs::new(PathBuf::from("."));
    if let Some(config) = matches.config {
        configs
            .merge(config.clone())
            .with_context(|| format!("Unable to use configuration file {}", config.display()))?;
    }
    let config = configs.extract().context("Failed to load configuration.")?;

    tracing::debug!("Configuration: {:?}", config);

    match matches.subcommand {
        Subcommand::Upload(cmd) => cmd.run(&config),
        Subcommand::Regs(cmd) => cmd.run(&config),
        Subcommand::Debug(cmd) => cmd.run(&config),
    }
}
