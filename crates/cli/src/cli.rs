//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Spin Playback - merged log replay with lidar spin synchronization
#[derive(Parser, Debug)]
#[command(
    name = "spin-playback",
    author,
    version,
    about = "Merged log playback with lidar spin synchronization",
    long_about = "Replays recorded vehicle logs in chronological order and resolves every\n\
                  complete lidar rotation into a world-referenced frame.\n\n\
                  Spins are held back until the pose data they depend on has been read,\n\
                  then released in arrival order."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "SPIN_PLAYBACK_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "SPIN_PLAYBACK_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Play back logs and emit transformed spins
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "playback.toml",
        env = "SPIN_PLAYBACK_CONFIG"
    )]
    pub config: PathBuf,

    /// Additional log file (repeatable), appended after the configured logs
    #[arg(short, long = "log")]
    pub logs: Vec<PathBuf>,

    /// Override the initial duration to skip (seconds)
    #[arg(long, env = "SPIN_PLAYBACK_SKIP")]
    pub skip: Option<f64>,

    /// Lidar calibration file; takes precedence over configuration and parameters
    #[arg(long)]
    pub calibration: Option<PathBuf>,

    /// Override the frame spins are resolved into
    #[arg(long)]
    pub target_frame: Option<String>,

    /// Maximum number of spins to emit (0 = unlimited)
    #[arg(long, default_value = "0", env = "SPIN_PLAYBACK_MAX_SPINS")]
    pub max_spins: u64,

    /// Write every transformed spin as one JSON line to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Validate configuration and exit without playing back
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "9000", env = "SPIN_PLAYBACK_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "playback.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "playback.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show the static transforms of the robot description and sensor mount
    #[arg(long)]
    pub robot: bool,

    /// Scan the configured logs and count records by kind
    #[arg(long)]
    pub logs: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}
