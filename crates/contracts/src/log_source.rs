//! LogReader / RecordStream traits - log data source abstraction
//!
//! Decouples the playback engine from concrete log formats. Readers are
//! cursors: after opening, the first record (if any) is current.

use crate::{LogRecord, PlaybackError};

/// Single-format, single-file record cursor
///
/// # Example
///
/// ```ignore
/// let mut reader = open_log(path)?;
/// while reader.has_more() {
///     let record = reader.current().unwrap();
///     println!("{} {}", record.timestamp, record.kind());
///     reader.advance()?;
/// }
/// ```
pub trait LogReader: Send {
    /// Source name (used for logging)
    fn name(&self) -> &str;

    /// Whether a current record exists
    fn has_more(&self) -> bool;

    /// Move to the next record. After the last record `has_more` is false.
    ///
    /// # Errors
    /// Read or decode failure; callers treat the reader as exhausted.
    fn advance(&mut self) -> Result<(), PlaybackError>;

    /// Timestamp of the current record
    fn timestamp(&self) -> Option<f64> {
        self.current().map(|record| record.timestamp)
    }

    /// Current record
    fn current(&self) -> Option<&LogRecord>;
}

/// Time-ordered record stream consumed by the spin synchronizer
///
/// Nothing is current until the first `advance`.
pub trait RecordStream {
    /// Make the next record current; false when exhausted
    fn advance(&mut self) -> bool;

    fn current(&self) -> Option<&LogRecord>;

    fn current_time(&self) -> Option<f64> {
        self.current().map(|record| record.timestamp)
    }
}
