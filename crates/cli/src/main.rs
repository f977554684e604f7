//! # Spin Playback CLI
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 配置加载与验证
//! - 回放会话编排
//! - 优雅关闭处理

mod cli;
mod commands;
mod error;
mod pipeline;

use anyhow::Result;
use clap::Parser;
use observability::{LogFormat, ObservabilityConfig};
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_info, run_playback, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging based on CLI options
    init_logging(&cli)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Spin playback CLI starting"
    );

    // Execute command
    let result = match &cli.command {
        Commands::Run(args) => run_playback(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Filter directives for a verbosity level
///
/// `-v` opens up the playback crates only; `-vv` traces them and lets
/// everything else log at debug.
fn filter_directives(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "info,ingestion=debug,sync_engine=debug,broadcast=debug,config_loader=debug",
        _ => "debug,ingestion=trace,sync_engine=trace,broadcast=trace,config_loader=trace",
    }
}

/// Observability settings for the CLI options
///
/// `--quiet` overrides `RUST_LOG`; otherwise `RUST_LOG` overrides `-v`.
fn observability_config(cli: &Cli) -> ObservabilityConfig {
    ObservabilityConfig {
        log_format: match cli.log_format {
            cli::LogFormat::Json => LogFormat::Json,
            cli::LogFormat::Pretty => LogFormat::Pretty,
            cli::LogFormat::Compact => LogFormat::Compact,
        },
        filter: cli.quiet.then(|| "warn".to_string()),
        default_filter: filter_directives(cli.verbose).to_string(),
        // Prometheus is started per run from the run arguments
        metrics_port: None,
    }
}

/// Initialize logging based on CLI options
fn init_logging(cli: &Cli) -> Result<()> {
    observability::init_with_config(observability_config(cli))
}
