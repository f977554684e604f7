//! JSON-lines log reader
//!
//! Reads one `LogRecord` per line, lazily. Blank lines are skipped.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use contracts::{LogReader, LogRecord, PlaybackError};
use tracing::debug;

/// Lazy JSONL record cursor
pub struct JsonlLogReader {
    name: String,
    lines: Lines<BufReader<File>>,
    line_no: usize,
    current: Option<LogRecord>,
}

impl std::fmt::Debug for JsonlLogReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlLogReader")
            .field("name", &self.name)
            .field("line_no", &self.line_no)
            .field("has_more", &self.current.is_some())
            .finish()
    }
}

impl JsonlLogReader {
    /// Open a log file and position on its first record
    ///
    /// # Errors
    /// `SourceUnavailable` if the file cannot be opened or its first record
    /// cannot be decoded.
    pub fn open(path: &Path) -> Result<Self, PlaybackError> {
        let name = path.display().to_string();
        let file = File::open(path)
            .map_err(|e| PlaybackError::source_unavailable(name.as_str(), e.to_string()))?;

        let mut reader = Self {
            name,
            lines: BufReader::new(file).lines(),
            line_no: 0,
            current: None,
        };
        reader.read_next()?;

        debug!(source = %reader.name, has_records = reader.current.is_some(), "opened jsonl log");
        Ok(reader)
    }

    fn read_next(&mut self) -> Result<(), PlaybackError> {
        self.current = None;
        for line in self.lines.by_ref() {
            self.line_no += 1;
            let line = line
                .map_err(|e| PlaybackError::source_unavailable(self.name.as_str(), e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let record: LogRecord = serde_json::from_str(&line).map_err(|e| {
                PlaybackError::source_unavailable(
                    self.name.as_str(),
                    format!("line {}: {e}", self.line_no),
                )
            })?;
            self.current = Some(record);
            break;
        }
        Ok(())
    }
}

impl LogReader for JsonlLogReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_more(&self) -> bool {
        self.current.is_some()
    }

    fn advance(&mut self) -> Result<(), PlaybackError> {
        self.read_next()
    }

    fn current(&self) -> Option<&LogRecord> {
        self.current.as_ref()
    }
}
