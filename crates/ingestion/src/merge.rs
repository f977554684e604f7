//! Multi-log merge
//!
//! Presents several independently ordered logs as one stream ordered by
//! timestamp. Ties are broken by source order: for equal timestamps the
//! reader listed first is served first.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::path::PathBuf;

use contracts::{LogReader, LogRecord, PlaybackError, RecordStream};
use tracing::{debug, info, instrument, warn};

use crate::readers::open_log;

/// Pending head of one reader
#[derive(Debug, Clone, Copy)]
struct Head {
    timestamp: f64,
    index: usize,
}

impl PartialEq for Head {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Head {}

impl PartialOrd for Head {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Head {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .total_cmp(&other.timestamp)
            .then(self.index.cmp(&other.index))
    }
}

/// Merge statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Sources that opened successfully
    pub sources_opened: usize,

    /// Sources skipped at open time
    pub sources_failed: usize,

    /// Records skipped by the initial offset
    pub records_skipped: u64,

    /// Records served
    pub records_served: u64,

    /// Readers dropped after a mid-stream read error
    pub read_errors: u64,

    /// Records whose timestamp went backwards within a single source
    pub out_of_order: u64,
}

/// Timestamp-ordered view over several logs
///
/// Nothing is current until the first [`advance`](RecordStream::advance).
pub struct MergedLogStream {
    readers: Vec<Box<dyn LogReader>>,
    heads: BinaryHeap<Reverse<Head>>,
    /// Last served timestamp per reader, for order checks
    last_served: Vec<Option<f64>>,
    current: Option<LogRecord>,
    current_source: Option<usize>,
    stats: MergeStats,
}

impl std::fmt::Debug for MergedLogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergedLogStream")
            .field("sources", &self.readers.len())
            .field("pending_heads", &self.heads.len())
            .field("current_time", &self.current.as_ref().map(|r| r.timestamp))
            .field("stats", &self.stats)
            .finish()
    }
}

impl MergedLogStream {
    /// Open every path and skip the first `skip_sec` seconds of the merged log
    ///
    /// # Errors
    /// `Configuration` when none of the paths can be opened.
    pub fn open(paths: &[PathBuf], skip_sec: f64) -> Result<Self, PlaybackError> {
        let mut stream = Self::empty();
        stream.load(paths, skip_sec)?;
        Ok(stream)
    }

    /// Build from already opened readers
    ///
    /// # Errors
    /// `Configuration` when `readers` is empty.
    pub fn from_readers(
        readers: Vec<Box<dyn LogReader>>,
        skip_sec: f64,
    ) -> Result<Self, PlaybackError> {
        let mut stream = Self::empty();
        stream.load_readers(readers, skip_sec)?;
        Ok(stream)
    }

    fn empty() -> Self {
        Self {
            readers: Vec::new(),
            heads: BinaryHeap::new(),
            last_served: Vec::new(),
            current: None,
            current_source: None,
            stats: MergeStats::default(),
        }
    }

    /// Replace the current reader set with freshly opened `paths`
    ///
    /// Sources that fail to open are logged and skipped. On error the
    /// previous reader set is left untouched.
    ///
    /// # Errors
    /// `Configuration` when none of the paths can be opened.
    #[instrument(name = "merge_load", skip(self, paths), fields(paths = paths.len()))]
    pub fn load(&mut self, paths: &[PathBuf], skip_sec: f64) -> Result<(), PlaybackError> {
        let mut readers = Vec::with_capacity(paths.len());
        let mut failed = 0;

        for path in paths {
            match open_log(path) {
                Ok(reader) => readers.push(reader),
                Err(e) => {
                    failed += 1;
                    warn!(path = %path.display(), error = %e, "skipping unavailable log");
                }
            }
        }

        self.load_readers(readers, skip_sec)?;
        self.stats.sources_failed = failed;
        Ok(())
    }

    /// Replace the current reader set with `readers`
    ///
    /// # Errors
    /// `Configuration` when `readers` is empty.
    pub fn load_readers(
        &mut self,
        mut readers: Vec<Box<dyn LogReader>>,
        skip_sec: f64,
    ) -> Result<(), PlaybackError> {
        if readers.is_empty() {
            return Err(PlaybackError::configuration("no readable log sources"));
        }

        let mut stats = MergeStats {
            sources_opened: readers.len(),
            ..Default::default()
        };

        // Skip is measured from the earliest first record across all logs.
        let t0 = readers
            .iter()
            .filter_map(|r| r.timestamp())
            .min_by(f64::total_cmp);

        if let Some(t0) = t0 {
            if skip_sec > 0.0 {
                let cutoff = t0 + skip_sec;
                for reader in readers.iter_mut() {
                    skip_until(reader.as_mut(), cutoff, &mut stats);
                }
                debug!(t0, cutoff, skipped = stats.records_skipped, "applied initial skip");
            }
        }

        let mut heads = BinaryHeap::with_capacity(readers.len());
        for (index, reader) in readers.iter().enumerate() {
            if let Some(timestamp) = reader.timestamp() {
                heads.push(Reverse(Head { timestamp, index }));
            }
        }

        info!(
            sources = readers.len(),
            non_empty = heads.len(),
            start_time = t0,
            "log sources loaded"
        );

        self.last_served = vec![None; readers.len()];
        self.readers = readers;
        self.heads = heads;
        self.current = None;
        self.current_source = None;
        self.stats = stats;
        Ok(())
    }

    /// Number of loaded sources
    pub fn source_count(&self) -> usize {
        self.readers.len()
    }

    /// Name of the source that produced the current record
    pub fn current_source(&self) -> Option<&str> {
        self.current_source.map(|i| self.readers[i].name())
    }

    pub fn stats(&self) -> &MergeStats {
        &self.stats
    }

    /// Whether any record remains after the current one
    pub fn has_more(&self) -> bool {
        !self.heads.is_empty()
    }

    fn next_record(&mut self) -> Option<LogRecord> {
        while let Some(Reverse(head)) = self.heads.pop() {
            let reader = &mut self.readers[head.index];
            let Some(record) = reader.current().cloned() else {
                continue;
            };

            match reader.advance() {
                Ok(()) => {
                    if let Some(timestamp) = reader.timestamp() {
                        self.heads.push(Reverse(Head {
                            timestamp,
                            index: head.index,
                        }));
                    }
                }
                Err(e) => {
                    self.stats.read_errors += 1;
                    warn!(source = %reader.name(), error = %e, "log read failed, source exhausted");
                }
            }

            if let Some(last) = self.last_served[head.index] {
                if record.timestamp < last {
                    self.stats.out_of_order += 1;
                    debug!(
                        source = %self.readers[head.index].name(),
                        timestamp = record.timestamp,
                        previous = last,
                        "out of order record"
                    );
                }
            }
            self.last_served[head.index] = Some(record.timestamp);
            self.current_source = Some(head.index);
            self.stats.records_served += 1;
            metrics::counter!("spin_playback_records_total", "kind" => record.kind().as_str())
                .increment(1);
            return Some(record);
        }
        None
    }
}

fn skip_until(reader: &mut dyn LogReader, cutoff: f64, stats: &mut MergeStats) {
    while reader.timestamp().is_some_and(|t| t < cutoff) {
        stats.records_skipped += 1;
        if let Err(e) = reader.advance() {
            stats.read_errors += 1;
            warn!(source = %reader.name(), error = %e, "log read failed during skip");
            break;
        }
    }
}

impl RecordStream for MergedLogStream {
    fn advance(&mut self) -> bool {
        self.current = self.next_record();
        if self.current.is_none() {
            self.current_source = None;
        }
        self.current.is_some()
    }

    fn current(&self) -> Option<&LogRecord> {
        self.current.as_ref()
    }
}
