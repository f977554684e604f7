//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::PlaybackBlueprint;
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    log_count: usize,
    sensor_frame: String,
    target_frame: String,
    broadcast: bool,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    log_count: blueprint.playback.logs.len(),
                    sensor_frame: blueprint.lidar.sensor_frame.clone(),
                    target_frame: blueprint.sync.target_frame.clone(),
                    broadcast: blueprint.broadcast.enabled,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &PlaybackBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    for log in &blueprint.playback.logs {
        if !log.exists() {
            warnings.push(format!(
                "Log '{}' not found - it will be skipped",
                log.display()
            ));
        }
    }

    if blueprint.lidar.calibration.is_none() {
        warnings.push(
            "lidar.calibration is unset - the 'lidar_calibration' parameter must provide it"
                .to_string(),
        );
    }

    if blueprint.lidar.mount.is_none() && !blueprint.robot.is_configured() {
        warnings.push(format!(
            "Neither lidar.mount nor a robot description is configured - '{}' has no path to the vehicle",
            blueprint.lidar.sensor_frame
        ));
    }

    if blueprint.localization.corrected_only {
        warnings.push(
            "localization.corrected_only is set - spins before the first corrected pose are discarded"
                .to_string(),
        );
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Logs: {}", summary.log_count);
            println!("  Sensor frame: {}", summary.sensor_frame);
            println!("  Target frame: {}", summary.target_frame);
            println!("  Broadcast: {}", summary.broadcast);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
