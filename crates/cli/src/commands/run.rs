//! `run` command implementation.

use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use contracts::{EnvParameterStore, PlaybackBlueprint};
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{PlaybackSession, SessionConfig};

/// Execute the `run` command
pub async fn run_playback(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let mut blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    apply_overrides(&mut blueprint, args);
    config_loader::ConfigLoader::validate(&blueprint)
        .context("Configuration invalid after command-line overrides")?;

    info!(
        logs = blueprint.playback.logs.len(),
        skip_sec = blueprint.playback.skip_sec,
        sensor_frame = %blueprint.lidar.sensor_frame,
        target_frame = %blueprint.sync.target_frame,
        broadcast = blueprint.broadcast.enabled,
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let session = PlaybackSession::new(SessionConfig {
        blueprint,
        calibration: args.calibration.clone(),
        max_spins: (args.max_spins > 0).then_some(args.max_spins),
        output: args.output.clone(),
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    });

    let stop = session.stop_handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Received shutdown signal, stopping playback...");
        stop.store(true, Ordering::Relaxed);
    });

    info!("Starting playback...");
    let stats = session
        .run(Box::new(EnvParameterStore::default()))
        .await
        .context("Playback failed")?;

    info!(
        spins = stats.spins_emitted,
        discarded = stats.sync.spins_discarded,
        duration_secs = stats.duration.as_secs_f64(),
        spins_per_sec = format!("{:.2}", stats.spins_per_sec()),
        "Playback completed"
    );
    stats.print_summary();

    info!("Spin playback finished");
    Ok(())
}

fn apply_overrides(blueprint: &mut PlaybackBlueprint, args: &RunArgs) {
    if !args.logs.is_empty() {
        info!(extra = args.logs.len(), "Appending logs from CLI");
        blueprint.playback.logs.extend(args.logs.iter().cloned());
    }
    if let Some(skip) = args.skip {
        info!(skip_sec = skip, "Overriding skip from CLI");
        blueprint.playback.skip_sec = skip;
    }
    if let Some(ref frame) = args.target_frame {
        info!(target_frame = %frame, "Overriding target frame from CLI");
        blueprint.sync.target_frame = frame.clone();
    }
}

/// Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &PlaybackBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Logs ({}):", blueprint.playback.logs.len());
    for log in &blueprint.playback.logs {
        println!("  - {}", log.display());
    }
    if blueprint.playback.skip_sec > 0.0 {
        println!("  Skip: {}s", blueprint.playback.skip_sec);
    }

    println!("\nLidar:");
    println!("  Sensor frame: {}", blueprint.lidar.sensor_frame);
    match &blueprint.lidar.calibration {
        Some(path) => println!("  Calibration: {}", path.display()),
        None => println!("  Calibration: (parameter store)"),
    }
    println!("  Start azimuth: {} deg", blueprint.lidar.start_azimuth_deg);

    println!("\nSync Settings:");
    println!("  Target frame: {}", blueprint.sync.target_frame);
    println!("  Max pending spins: {}", blueprint.sync.max_pending_spins);
    println!("  History: {}", blueprint.sync.history_len);
    if blueprint.localization.corrected_only {
        println!("  Localization: corrected only");
    }

    if blueprint.broadcast.enabled {
        println!("\nBroadcast: {:?}", blueprint.broadcast.sink_type);
    }

    println!();
}
