//! Playback session orchestration.

mod session;
mod stats;

pub use session::{collect_static_transforms, PlaybackSession, SessionConfig};
pub use stats::SessionStats;
