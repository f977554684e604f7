//! 配置校验模块
//!
//! 校验规则：
//! - 至少一个日志文件，skip_sec >= 0
//! - sensor/target 坐标系非空，sensor 坐标系不能是全局链上的坐标系
//! - 队列容量 >= 1，cache_duration > 0
//! - offset_smoothing 位于 (0, 1]，local_utm 网格 > 0
//! - channel 广播需要非零队列容量

use contracts::{
    BroadcastSinkType, PlaybackBlueprint, PlaybackError, LOCAL_UTM_FRAME, SMOOTH_FRAME, UTM_FRAME,
    VEHICLE_FRAME,
};

/// 校验 PlaybackBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &PlaybackBlueprint) -> Result<(), PlaybackError> {
    validate_playback(blueprint)?;
    validate_lidar(blueprint)?;
    validate_sync(blueprint)?;
    validate_localization(blueprint)?;
    validate_broadcast(blueprint)?;
    Ok(())
}

/// 校验日志列表与跳过时长
fn validate_playback(blueprint: &PlaybackBlueprint) -> Result<(), PlaybackError> {
    let playback = &blueprint.playback;

    if playback.logs.is_empty() {
        return Err(PlaybackError::config_validation(
            "playback.logs",
            "at least one log is required",
        ));
    }

    if !(playback.skip_sec >= 0.0) || !playback.skip_sec.is_finite() {
        return Err(PlaybackError::config_validation(
            "playback.skip_sec",
            format!("skip_sec must be >= 0, got {}", playback.skip_sec),
        ));
    }

    Ok(())
}

fn validate_lidar(blueprint: &PlaybackBlueprint) -> Result<(), PlaybackError> {
    let lidar = &blueprint.lidar;

    if lidar.sensor_frame.is_empty() {
        return Err(PlaybackError::config_validation(
            "lidar.sensor_frame",
            "sensor_frame cannot be empty",
        ));
    }

    // 传感器挂在车体上，不能是全局链上的坐标系
    if [UTM_FRAME, LOCAL_UTM_FRAME, SMOOTH_FRAME, VEHICLE_FRAME].contains(&lidar.sensor_frame.as_str())
    {
        return Err(PlaybackError::config_validation(
            "lidar.sensor_frame",
            format!("'{}' is a reserved frame name", lidar.sensor_frame),
        ));
    }

    if !lidar.start_azimuth_deg.is_finite() {
        return Err(PlaybackError::config_validation(
            "lidar.start_azimuth_deg",
            "start_azimuth_deg must be finite",
        ));
    }

    Ok(())
}

/// 校验同步配置
fn validate_sync(blueprint: &PlaybackBlueprint) -> Result<(), PlaybackError> {
    let sync = &blueprint.sync;

    if sync.target_frame.is_empty() {
        return Err(PlaybackError::config_validation(
            "sync.target_frame",
            "target_frame cannot be empty",
        ));
    }

    if sync.max_pending_spins == 0 {
        return Err(PlaybackError::config_validation(
            "sync.max_pending_spins",
            "max_pending_spins must be >= 1",
        ));
    }

    if sync.history_len == 0 {
        return Err(PlaybackError::config_validation(
            "sync.history_len",
            "history_len must be >= 1",
        ));
    }

    if !(sync.cache_duration_sec > 0.0) {
        return Err(PlaybackError::config_validation(
            "sync.cache_duration_sec",
            format!(
                "cache_duration_sec must be > 0, got {}",
                sync.cache_duration_sec
            ),
        ));
    }

    Ok(())
}

/// 校验定位配置
fn validate_localization(blueprint: &PlaybackBlueprint) -> Result<(), PlaybackError> {
    let localization = &blueprint.localization;

    if !(localization.offset_smoothing > 0.0 && localization.offset_smoothing <= 1.0) {
        return Err(PlaybackError::config_validation(
            "localization.offset_smoothing",
            format!(
                "offset_smoothing must be in (0, 1], got {}",
                localization.offset_smoothing
            ),
        ));
    }

    if !(localization.local_utm_grid_m > 0.0) {
        return Err(PlaybackError::config_validation(
            "localization.local_utm_grid_m",
            format!(
                "local_utm_grid_m must be > 0, got {}",
                localization.local_utm_grid_m
            ),
        ));
    }

    Ok(())
}

fn validate_broadcast(blueprint: &PlaybackBlueprint) -> Result<(), PlaybackError> {
    let broadcast = &blueprint.broadcast;

    if broadcast.enabled
        && broadcast.sink_type == BroadcastSinkType::Channel
        && broadcast.queue_capacity == 0
    {
        return Err(PlaybackError::config_validation(
            "broadcast.queue_capacity",
            "queue_capacity must be > 0 for channel broadcast",
        ));
    }

    Ok(())
}
