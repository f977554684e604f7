//! LogRecord - Ingestion 输出
//!
//! 车辆日志中解码后的一条记录。每条记录恰好一种载荷，调用方直接匹配载荷。

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::FrameId;

/// 带时间戳的日志记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// 日志时间 (秒) - 主时钟
    pub timestamp: f64,

    /// 记录载荷
    pub payload: RecordPayload,
}

/// 记录载荷，每种记录一个变体
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordPayload {
    /// 原始惯导位姿 (航位推算输入)
    Pose(PoseSample),

    /// GPS 定位
    GpsFix(GpsFix),

    /// 位姿精度状态
    RmsStatus(RmsStatus),

    /// 原始激光雷达数据包批次
    LidarPacketBatch(LidarPacketBatch),

    /// 同步的相机图像
    CameraImageSet(CameraImageSet),

    /// 校正定位输出
    CorrectedPose(CorrectedPose),

    /// 急停状态
    EmergencyStopStatus(EmergencyStopStatus),

    /// 车辆总线状态
    VehicleStatus(VehicleStatus),

    /// 规划轨迹
    Trajectory(Trajectory),
}

/// 记录类型标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Pose,
    GpsFix,
    RmsStatus,
    LidarPacketBatch,
    CameraImageSet,
    CorrectedPose,
    EmergencyStopStatus,
    VehicleStatus,
    Trajectory,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pose => "pose",
            Self::GpsFix => "gps_fix",
            Self::RmsStatus => "rms_status",
            Self::LidarPacketBatch => "lidar_packet_batch",
            Self::CameraImageSet => "camera_image_set",
            Self::CorrectedPose => "corrected_pose",
            Self::EmergencyStopStatus => "emergency_stop_status",
            Self::VehicleStatus => "vehicle_status",
            Self::Trajectory => "trajectory",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl LogRecord {
    pub fn new(timestamp: f64, payload: RecordPayload) -> Self {
        Self { timestamp, payload }
    }

    /// 载荷类型
    pub fn kind(&self) -> RecordKind {
        match &self.payload {
            RecordPayload::Pose(_) => RecordKind::Pose,
            RecordPayload::GpsFix(_) => RecordKind::GpsFix,
            RecordPayload::RmsStatus(_) => RecordKind::RmsStatus,
            RecordPayload::LidarPacketBatch(_) => RecordKind::LidarPacketBatch,
            RecordPayload::CameraImageSet(_) => RecordKind::CameraImageSet,
            RecordPayload::CorrectedPose(_) => RecordKind::CorrectedPose,
            RecordPayload::EmergencyStopStatus(_) => RecordKind::EmergencyStopStatus,
            RecordPayload::VehicleStatus(_) => RecordKind::VehicleStatus,
            RecordPayload::Trajectory(_) => RecordKind::Trajectory,
        }
    }

    pub fn as_pose(&self) -> Option<&PoseSample> {
        match &self.payload {
            RecordPayload::Pose(pose) => Some(pose),
            _ => None,
        }
    }

    pub fn as_corrected_pose(&self) -> Option<&CorrectedPose> {
        match &self.payload {
            RecordPayload::CorrectedPose(pose) => Some(pose),
            _ => None,
        }
    }

    pub fn as_lidar_packets(&self) -> Option<&LidarPacketBatch> {
        match &self.payload {
            RecordPayload::LidarPacketBatch(batch) => Some(batch),
            _ => None,
        }
    }

    pub fn as_camera_images(&self) -> Option<&CameraImageSet> {
        match &self.payload {
            RecordPayload::CameraImageSet(images) => Some(images),
            _ => None,
        }
    }
}

/// 三维向量
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// 原始惯导位姿样本
///
/// 同时携带 smooth 坐标系下的车体位姿和同一时刻的绝对 (有噪声) 测量位置。
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PoseSample {
    /// smooth 坐标系下的车体位置 (米)
    pub smooth: Vector3,

    /// 横滚角 (弧度)
    pub roll: f64,

    /// 俯仰角 (弧度)
    pub pitch: f64,

    /// smooth 坐标系下的航向角 (弧度)
    pub yaw: f64,

    /// 绝对位置：东向、北向、高度 (米)
    pub utm: Vector3,

    /// 绝对航向 (弧度)
    #[serde(default)]
    pub utm_yaw: f64,

    /// 东/北/天 速度 (m/s)
    #[serde(default)]
    pub velocity: Vector3,
}

/// 校正定位样本
///
/// smooth 坐标系在测量坐标系中的偏移：smooth 下的点 `p` 在 utm 中位于
/// `R(yaw_offset) * p + offset`。
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CorrectedPose {
    /// smooth 到 utm 的平移 (米)
    pub offset: Vector3,

    /// smooth 与 utm 的航向差 (弧度)
    #[serde(default)]
    pub yaw_offset: f64,

    /// 上报的标准差 (米)
    #[serde(default)]
    pub std_dev: Option<f64>,
}

/// GPS 定位
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GpsFix {
    /// 纬度 (度)
    pub latitude: f64,

    /// 经度 (度)
    pub longitude: f64,

    /// 高度 (米)
    pub altitude: f64,

    /// 可见卫星数
    #[serde(default)]
    pub num_satellites: u8,
}

/// 位姿精度状态
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RmsStatus {
    pub east_rms: f64,
    pub north_rms: f64,
    pub down_rms: f64,
    pub roll_rms: f64,
    pub pitch_rms: f64,
    pub yaw_rms: f64,
}

/// 同一传感器坐标系下采集的一批原始激光雷达数据包
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LidarPacketBatch {
    /// 采集坐标系
    pub sensor_frame: FrameId,

    /// 按采集顺序排列的数据包
    pub packets: Vec<LidarPacket>,
}

/// 单个激光雷达数据包
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LidarPacket {
    /// 采集时间 (秒)
    pub stamp: f64,

    /// 按采集顺序排列的发射块
    pub blocks: Vec<FiringBlock>,
}

/// 同一方位角下所有激光器的一次发射
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FiringBlock {
    /// 旋转位置 (度，[0, 360))
    pub azimuth_deg: f64,

    /// 各激光器测距 (米)，0 = 无回波
    pub ranges: Vec<f32>,

    /// 各激光器强度
    #[serde(default)]
    pub intensities: Vec<u8>,
}

/// 同步的相机图像
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CameraImageSet {
    pub images: Vec<CameraImage>,
}

/// 单张相机图像
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraImage {
    /// 相机坐标系
    pub camera_frame: FrameId,

    pub width: u32,

    pub height: u32,

    /// 压缩或原始图像字节
    pub data: Bytes,
}

/// 急停状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyStopStatus {
    pub state: StopState,
}

/// 急停状态值
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopState {
    #[default]
    Run,
    Pause,
    Disable,
}

/// 车辆总线状态
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VehicleStatus {
    /// 车速 (m/s)
    pub speed: f64,

    /// 方向盘转角 (弧度)
    pub steering_angle: f64,

    /// 是否处于自动驾驶模式
    #[serde(default)]
    pub autonomous: bool,
}

/// 规划的二维轨迹
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trajectory {
    pub points: Vec<TrajectoryPoint>,
}

/// smooth 坐标系下的轨迹点
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    pub velocity: f64,
    /// 沿轨迹的相对时间 (秒)
    pub t: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_payload() {
        let record = LogRecord::new(1.0, RecordPayload::Pose(PoseSample::default()));
        assert_eq!(record.kind(), RecordKind::Pose);
        assert!(record.as_pose().is_some());
        assert!(record.as_corrected_pose().is_none());
        assert!(record.as_lidar_packets().is_none());
    }

    #[test]
    fn test_tagged_json_format() {
        let json = r#"{"timestamp": 2.5, "payload": {"kind": "corrected_pose", "offset": {"x": 1.0, "y": 2.0, "z": 0.0}}}"#;
        let record: LogRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.kind(), RecordKind::CorrectedPose);
        let corrected = record.as_corrected_pose().unwrap();
        assert_eq!(corrected.offset.y, 2.0);
        assert_eq!(corrected.yaw_offset, 0.0);
        assert!(corrected.std_dev.is_none());
    }

    #[test]
    fn test_lidar_batch_json() {
        let json = r#"{"timestamp": 0.1, "payload": {"kind": "lidar_packet_batch", "sensor_frame": "velodyne",
            "packets": [{"stamp": 0.1, "blocks": [{"azimuth_deg": 12.5, "ranges": [4.0, 0.0]}]}]}}"#;
        let record: LogRecord = serde_json::from_str(json).unwrap();
        let batch = record.as_lidar_packets().unwrap();
        assert_eq!(batch.sensor_frame, "velodyne");
        assert_eq!(batch.packets[0].blocks[0].ranges.len(), 2);
        assert!(batch.packets[0].blocks[0].intensities.is_empty());
    }

    #[test]
    fn test_emergency_stop_json() {
        let json = r#"{"timestamp": 3.0, "payload": {"kind": "emergency_stop_status", "state": "pause"}}"#;
        let record: LogRecord = serde_json::from_str(json).unwrap();
        match record.payload {
            RecordPayload::EmergencyStopStatus(status) => assert_eq!(status.state, StopState::Pause),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(RecordKind::EmergencyStopStatus.to_string(), "emergency_stop_status");
    }
}
