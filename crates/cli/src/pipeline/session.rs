//! Playback session - wires configuration, collaborators and the synchronizer.
//!
//! The synchronizer is synchronous and pull-based, so the whole loop runs on
//! a blocking task; the async side only waits for it, for a shutdown signal
//! and for the broadcast worker to drain.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use config_loader::{CalibrationResolver, RobotModel};
use contracts::{
    ParameterStore, PlaybackBlueprint, StaticTransform, TransformObserver, TransformedSpin,
};
use observability::PlaybackMetricsAggregator;
use sync_engine::SpinSynchronizer;
use tracing::{debug, info, warn};

use super::SessionStats;
use crate::error::CliError;

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Validated configuration (CLI overrides applied)
    pub blueprint: PlaybackBlueprint,

    /// Calibration file given on the command line
    pub calibration: Option<PathBuf>,

    /// Maximum number of spins to emit (None = unlimited)
    pub max_spins: Option<u64>,

    /// JSON-lines spin output
    pub output: Option<PathBuf>,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// One playback run
pub struct PlaybackSession {
    config: SessionConfig,
    stop: Arc<AtomicBool>,
}

impl PlaybackSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that ends the playback loop after the current spin
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Run the session to completion
    pub async fn run(self, store: Box<dyn ParameterStore + Send>) -> Result<SessionStats> {
        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let (observer, worker) = match broadcast::create_broadcaster(&self.config.blueprint.broadcast) {
            Some(broadcaster) => (Some(broadcaster.observer), broadcaster.worker),
            None => (None, None),
        };

        let config = self.config;
        let stop = self.stop;
        let mut stats = tokio::task::spawn_blocking(move || {
            play(&config, store.as_ref(), observer, &stop)
        })
        .await
        .context("Playback task panicked")??;

        // The synchronizer, and with it the broadcaster, is gone by now
        if let Some(worker) = worker {
            stats.transforms_forwarded = Some(worker.join().await);
        }

        Ok(stats)
    }
}

/// Static edges: robot description first, then the configured sensor mount
pub fn collect_static_transforms(
    blueprint: &PlaybackBlueprint,
    store: &dyn ParameterStore,
) -> std::result::Result<Vec<StaticTransform>, CliError> {
    let mut statics = match RobotModel::from_config(&blueprint.robot, store).map_err(CliError::setup)? {
        Some(model) => model.static_transforms(),
        None => Vec::new(),
    };
    if let Some(mount) = blueprint.mount_transform() {
        statics.push(mount);
    }
    Ok(statics)
}

/// Build a synchronizer with calibration and static transforms resolved
pub fn build_synchronizer(
    config: &SessionConfig,
    store: &dyn ParameterStore,
) -> std::result::Result<SpinSynchronizer<'static>, CliError> {
    let blueprint = &config.blueprint;

    let explicit = config
        .calibration
        .as_deref()
        .or(blueprint.lidar.calibration.as_deref());
    let calibration = CalibrationResolver::resolve(explicit, store).map_err(CliError::setup)?;

    let statics = collect_static_transforms(blueprint, store)?;
    debug!(edges = statics.len(), "static transforms collected");

    SpinSynchronizer::new(blueprint.to_sync_config(), statics, Box::new(calibration))
        .map_err(CliError::setup)
}

/// Synchronous playback loop
fn play(
    config: &SessionConfig,
    store: &dyn ParameterStore,
    observer: Option<Box<dyn TransformObserver>>,
    stop: &AtomicBool,
) -> std::result::Result<SessionStats, CliError> {
    let start_time = Instant::now();
    let blueprint = &config.blueprint;

    let mut sync = build_synchronizer(config, store)?;
    if let Some(observer) = observer {
        sync.add_observer(observer);
    }
    sync.load(&blueprint.playback.logs, blueprint.playback.skip_sec)
        .map_err(CliError::setup)?;

    let mut output = match &config.output {
        Some(path) => Some(BufWriter::new(File::create(path)?)),
        None => None,
    };

    let mut stats = SessionStats::default();
    let mut aggregator = PlaybackMetricsAggregator::new();

    loop {
        if stop.load(Ordering::Relaxed) {
            warn!(emitted = stats.spins_emitted, "Playback interrupted");
            stats.interrupted = true;
            break;
        }
        if config.max_spins.is_some_and(|max| stats.spins_emitted >= max) {
            info!(max_spins = stats.spins_emitted, "Spin limit reached");
            break;
        }

        let advanced = sync
            .next_spin()
            .map_err(|e| CliError::playback(stats.spins_emitted, e))?;
        if !advanced {
            break;
        }
        let Some(spin) = sync.get_spin() else {
            break;
        };

        let wait_s = sync.current_time().map_or(0.0, |now| now - spin.end);
        aggregator.update(spin, wait_s);
        stats.spins_emitted += 1;
        stats.points += spin.len() as u64;

        if let Some(writer) = output.as_mut() {
            write_spin(writer, spin)?;
        }
    }

    if let Some(mut writer) = output {
        writer
            .flush()
            .map_err(|e| CliError::output(e.to_string()))?;
    }

    stats.duration = start_time.elapsed();
    stats.sync = sync.stats().clone();
    stats.metrics = aggregator;
    Ok(stats)
}

fn write_spin(writer: &mut impl Write, spin: &TransformedSpin) -> std::result::Result<(), CliError> {
    serde_json::to_writer(&mut *writer, spin).map_err(|e| CliError::output(e.to_string()))?;
    writer
        .write_all(b"\n")
        .map_err(|e| CliError::output(e.to_string()))
}
