//! `info` command implementation.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use contracts::{EnvParameterStore, PlaybackBlueprint, RecordStream};
use ingestion::MergedLogStream;
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;
use crate::pipeline::collect_static_transforms;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    logs: Vec<String>,
    skip_sec: f64,
    lidar: LidarInfo,
    sync_settings: SyncInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    static_transforms: Vec<EdgeInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    log_scan: Option<LogScan>,
}

#[derive(Serialize)]
struct LidarInfo {
    sensor_frame: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    calibration: Option<String>,
    start_azimuth_deg: f64,
    min_points: usize,
}

#[derive(Serialize)]
struct SyncInfo {
    target_frame: String,
    max_pending_spins: usize,
    history_len: usize,
    cache_duration_sec: f64,
    corrected_only: bool,
}

#[derive(Serialize)]
struct EdgeInfo {
    child: String,
    parent: String,
    xyz: [f64; 3],
    rpy: [f64; 3],
}

/// Record counts of the merged logs
#[derive(Serialize)]
struct LogScan {
    sources: usize,
    records: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_stamp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_stamp: Option<f64>,
    kinds: BTreeMap<&'static str, u64>,
    sources_failed: u64,
    out_of_order: u64,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let static_transforms = if args.robot {
        let store = EnvParameterStore::default();
        collect_static_transforms(&blueprint, &store)
            .context("Failed to load static transforms")?
            .iter()
            .map(|edge| {
                let t = edge.transform.translation();
                let (roll, pitch, yaw) = edge.transform.rpy();
                EdgeInfo {
                    child: edge.child.to_string(),
                    parent: edge.parent.to_string(),
                    xyz: [t.x, t.y, t.z],
                    rpy: [roll, pitch, yaw],
                }
            })
            .collect()
    } else {
        Vec::new()
    };

    let log_scan = if args.logs {
        Some(scan_logs(&blueprint).context("Failed to scan logs")?)
    } else {
        None
    };

    let info = build_config_info(&blueprint, static_transforms, log_scan);
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn scan_logs(blueprint: &PlaybackBlueprint) -> Result<LogScan> {
    let mut stream = MergedLogStream::open(&blueprint.playback.logs, blueprint.playback.skip_sec)?;

    let mut records = 0;
    let mut first_stamp = None;
    let mut last_stamp = None;
    let mut kinds = BTreeMap::new();
    while stream.advance() {
        let Some(record) = stream.current() else {
            break;
        };
        records += 1;
        if first_stamp.is_none() {
            first_stamp = Some(record.timestamp);
        }
        last_stamp = Some(record.timestamp);
        *kinds.entry(record.kind().as_str()).or_insert(0) += 1;
    }

    let stats = stream.stats();
    Ok(LogScan {
        sources: stream.source_count(),
        records,
        first_stamp,
        last_stamp,
        kinds,
        sources_failed: stats.sources_failed as u64,
        out_of_order: stats.out_of_order,
    })
}

fn build_config_info(
    blueprint: &PlaybackBlueprint,
    static_transforms: Vec<EdgeInfo>,
    log_scan: Option<LogScan>,
) -> ConfigInfo {
    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        logs: blueprint
            .playback
            .logs
            .iter()
            .map(|p| p.display().to_string())
            .collect(),
        skip_sec: blueprint.playback.skip_sec,
        lidar: LidarInfo {
            sensor_frame: blueprint.lidar.sensor_frame.clone(),
            calibration: blueprint
                .lidar
                .calibration
                .as_ref()
                .map(|p| p.display().to_string()),
            start_azimuth_deg: blueprint.lidar.start_azimuth_deg,
            min_points: blueprint.lidar.min_points,
        },
        sync_settings: SyncInfo {
            target_frame: blueprint.sync.target_frame.clone(),
            max_pending_spins: blueprint.sync.max_pending_spins,
            history_len: blueprint.sync.history_len,
            cache_duration_sec: blueprint.sync.cache_duration_sec,
            corrected_only: blueprint.localization.corrected_only,
        },
        static_transforms,
        log_scan,
    }
}

fn tree_prefix(index: usize, len: usize) -> &'static str {
    if index + 1 == len {
        "└─"
    } else {
        "├─"
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("=== Spin Playback Configuration ===\n");

    println!("Logs ({})", info.logs.len());
    for (i, log) in info.logs.iter().enumerate() {
        println!("   {} {}", tree_prefix(i, info.logs.len()), log);
    }
    if info.skip_sec > 0.0 {
        println!("   Skip: {}s", info.skip_sec);
    }

    let lidar = &info.lidar;
    println!("\nLidar");
    println!("   ├─ Sensor frame: {}", lidar.sensor_frame);
    println!(
        "   ├─ Calibration: {}",
        lidar.calibration.as_deref().unwrap_or("(parameter store)")
    );
    println!("   ├─ Start azimuth: {} deg", lidar.start_azimuth_deg);
    println!("   └─ Min points: {}", lidar.min_points);

    let sync = &info.sync_settings;
    println!("\nSync Settings");
    println!("   ├─ Target frame: {}", sync.target_frame);
    println!("   ├─ Max pending spins: {}", sync.max_pending_spins);
    println!("   ├─ History: {}", sync.history_len);
    println!("   ├─ Cache: {}s", sync.cache_duration_sec);
    println!("   └─ Corrected only: {}", sync.corrected_only);

    if !info.static_transforms.is_empty() {
        println!("\nStatic Transforms ({})", info.static_transforms.len());
        for (i, edge) in info.static_transforms.iter().enumerate() {
            println!(
                "   {} {} -> {}  xyz={:?} rpy={:?}",
                tree_prefix(i, info.static_transforms.len()),
                edge.child,
                edge.parent,
                edge.xyz,
                edge.rpy
            );
        }
    }

    if let Some(ref scan) = info.log_scan {
        println!("\nLog Scan");
        println!("   ├─ Sources: {} ({} failed)", scan.sources, scan.sources_failed);
        println!("   ├─ Records: {}", scan.records);
        if let (Some(first), Some(last)) = (scan.first_stamp, scan.last_stamp) {
            println!("   ├─ Span: {:.3}s .. {:.3}s ({:.3}s)", first, last, last - first);
        }
        println!("   ├─ Out of order: {}", scan.out_of_order);
        println!("   └─ Kinds:");
        for (kind, count) in &scan.kinds {
            println!("        {}: {}", kind, count);
        }
    }

    println!();
}
