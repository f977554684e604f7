//! # Sync Engine
//!
//! 激光雷达 spin 与坐标变换同步。
//!
//! 负责：
//! - 静态边与带时间戳动态边的变换树
//! - 航位推算或校正定位提供的全局链
//! - 激光雷达整圈拼装
//! - 变换就绪后按到达顺序释放 spin
//!
//! ## 使用示例
//!
//! ```ignore
//! use contracts::SpinSyncConfig;
//! use sync_engine::SpinSynchronizer;
//!
//! let mut sync = SpinSynchronizer::new(
//!     SpinSyncConfig::new("velodyne"),
//!     robot.static_transforms(),
//!     Box::new(calibration),
//! )?;
//! sync.load(&logs, 0.0)?;
//!
//! while sync.next_spin()? {
//!     let spin = sync.get_spin().unwrap();
//!     println!("{} points at {:.3}", spin.len(), spin.end);
//! }
//! ```

mod assembler;
mod localization;
mod synchronizer;
mod transform_tree;

pub use assembler::SpinAssembler;
pub use localization::{CorrectedIngest, GlobalChain, LocalizationSource};
pub use synchronizer::{DataSource, SpinSynchronizer, SyncState, SyncStats};
pub use transform_tree::TransformTree;

pub use contracts::{SpinSyncConfig, TransformedSpin};
