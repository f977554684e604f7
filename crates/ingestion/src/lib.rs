//! # Ingestion
//!
//! Recorded log ingestion.
//!
//! Responsibilities:
//! - Open log files with the reader matching their format
//! - Merge several logs into one timestamp-ordered stream
//! - Apply the initial time skip
//!
//! ## Usage Example
//!
//! ```ignore
//! use contracts::RecordStream;
//! use ingestion::MergedLogStream;
//!
//! let mut stream = MergedLogStream::open(&paths, 5.0)?;
//! while stream.advance() {
//!     let record = stream.current().unwrap();
//!     println!("{:.3} {}", record.timestamp, record.kind());
//! }
//! ```

mod merge;
mod readers;

pub use merge::{MergeStats, MergedLogStream};
pub use readers::{open_log, JsonlLogReader, LogFormat, MemoryLogReader};
