//! Command-line interface definitions.

pub mod check;
pub mod output;
pub mod risk;
pub mod watch;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::config::Config;

/// Config file picked up when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "perpwatch.toml";

/// Perpwatch - Real-time futures position risk monitoring.
#[derive(Parser, Debug)]
#[command(name = "perpwatch")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stream positions and report risk until interrupted
    Watch(WatchArgs),

    /// Compute risk metrics for a single position offline
    Risk(RiskArgs),

    /// Run diagnostic checks
    #[command(subcommand)]
    Check(CheckCommand),
}

/// Subcommands for `perpwatch check`
#[derive(Subcommand, Debug)]
pub enum CheckCommand {
    /// Validate configuration file
    Config(ConfigPathArg),
}

/// Shared argument for commands that only need a config path.
#[derive(Parser, Debug)]
pub struct ConfigPathArg {
    /// Path to configuration file [default: perpwatch.toml if present]
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Arguments for the `watch` subcommand.
#[derive(Parser, Debug)]
pub struct WatchArgs {
    /// Path to configuration file [default: perpwatch.toml if present]
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Ticker symbol to follow (repeatable; replaces configured symbols)
    #[arg(short, long = "symbol")]
    pub symbols: Vec<String>,
}

/// Arguments for the `risk` subcommand.
#[derive(Parser, Debug)]
pub struct RiskArgs {
    /// Symbol label for the position
    #[arg(long, default_value = "POSITION")]
    pub symbol: String,

    /// Signed position size (negative for short)
    #[arg(long, allow_negative_numbers = true)]
    pub amount: f64,

    /// Average entry price
    #[arg(long)]
    pub entry: f64,

    /// Mark price [default: entry]
    #[arg(long)]
    pub mark: Option<f64>,

    /// Leverage multiplier
    #[arg(long)]
    pub leverage: f64,

    /// Cross margin balance backing the position
    #[arg(long, default_value = "0", allow_negative_numbers = true)]
    pub balance: f64,

    /// Isolated margin allocation (switches to isolated mode)
    #[arg(long)]
    pub isolated_margin: Option<f64>,

    /// Unrealized PnL [default: amount x (mark - entry)]
    #[arg(long, allow_negative_numbers = true)]
    pub pnl: Option<f64>,

    /// Emit JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// Load config from `path`, or from `perpwatch.toml` when present, or fall
/// back to defaults.
///
/// An explicit path that cannot be read is an error.
pub fn load_config(path: Option<&Path>) -> crate::error::Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Config::load(DEFAULT_CONFIG_PATH),
        None => Config::from_env(),
    }
}

/// Dispatch a parsed command line.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Watch(args) => watch::execute(&args).await,
        Commands::Risk(args) => {
            risk::execute(&args);
            Ok(())
        }
        Commands::Check(CheckCommand::Config(arg)) => check::execute_config(arg.config.as_deref()),
    }
}
