use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the graphsync binary.
#[derive(Debug, Parser)]
#[command(
    name = "graphsync",
    version,
    about = "Client-side graph mirror, body caches and undo history for a simulation server"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "GRAPHSYNC_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: SessionOverrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a TOML script of editor actions against the in-memory server.
    Replay(ReplayArgs),
    /// List the operation types the in-memory server offers.
    Catalog,
}

#[derive(Debug, Args, Clone)]
pub struct ReplayArgs {
    /// Script to replay.
    #[arg(value_name = "SCRIPT", value_hint = ValueHint::FilePath)]
    pub script: PathBuf,
}

#[derive(Debug, Args, Default, Clone)]
pub struct SessionOverrides {
    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit logs as JSON.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the maximum undo history depth.
    #[arg(long = "undo-limit", value_name = "COUNT", global = true)]
    pub undo_limit: Option<u64>,

    /// Override how many notifications are applied per drain.
    #[arg(long = "notification-batch-limit", value_name = "COUNT", global = true)]
    pub notification_batch_limit: Option<u64>,

    /// Disable the per-plug live body caches.
    #[arg(long = "no-live-cache", action = clap::ArgAction::SetTrue, global = true)]
    pub no_live_cache: bool,

    /// Disable the per-operation historical body caches.
    #[arg(long = "no-historical-cache", action = clap::ArgAction::SetTrue, global = true)]
    pub no_historical_cache: bool,
}
