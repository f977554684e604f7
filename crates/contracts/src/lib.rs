//! # Contracts
//!
//! Frozen interface contracts, defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Uses log timestamps (seconds, f64) as the only clock
//! - Every record, packet and spin point carries its own capture time

mod blueprint;
mod error;
mod frame_id;
mod log_source;
mod params;
mod record;
mod spin;
mod sync_engine_config;
mod transform;

pub use blueprint::*;
pub use error::*;
pub use frame_id::*;
pub use log_source::{LogReader, RecordStream};
pub use params::{EnvParameterStore, MapParameterStore, ParameterStore};
pub use record::*;
pub use spin::*;
pub use sync_engine_config::*;
pub use transform::*;
