//! Almoner CLI - back-office access to the Almoner REST API

mod commands;
mod config;
mod logging;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use commands::Commands;
use std::path::PathBuf;
use tracing::{Level, debug, error};

#[derive(Parser)]
#[command(name = "almoner")]
#[command(about = "Manage donations, projects and news from the command line")]
#[command(version)]
struct Cli {
    /// Set logging level
    #[arg(short = 'l', long, global = true, default_value = "warn")]
    log_level: LogLevel,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Data directory for the session file and logs
    #[arg(short = 'd', long, global = true, env = "ALMONER_STATE_DIR")]
    data_dir: Option<PathBuf>,

    /// Client configuration file (TOML or YAML)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// API origin, overrides the configuration file
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Per-request timeout in seconds, overrides the configuration file
    #[arg(short = 't', long, global = true)]
    timeout: Option<u64>,

    /// Disable file logging (only log to stderr)
    #[arg(long, global = true)]
    no_file_log: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let data_dir = config::data_dir(cli.data_dir);

    logging::init_logging(
        cli.log_level.into(),
        &data_dir,
        cli.log_json,
        cli.no_file_log,
    )?;

    let overrides = config::Overrides {
        base_url: cli.base_url,
        timeout_secs: cli.timeout,
    };
    let client_config = config::load_client_config(cli.config.as_deref(), &data_dir, overrides)?;
    debug!(base_url = %client_config.base_url, "Loaded client configuration");

    if let Err(e) = cli.command.execute(&client_config).await {
        error!("Command failed: {e}");
        eprintln!("error: {e}");
        std::process::exit(1);
    }

    Ok(())
}

#[derive(Clone, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(log_level: LogLevel) -> Self {
        match log_level {
            LogLevel::Error => Self::ERROR,
            LogLevel::Warn => Self::WARN,
            LogLevel::Info => Self::INFO,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Trace => Self::TRACE,
        }
    }
}
