//! Spin synchronizer
//!
//! Pulls records from a time-ordered stream, feeds poses into the
//! localization source and transform tree, assembles lidar rotations and
//! releases them in arrival order once every transform they need exists.
//!
//! ```text
//! Idle --set_data_reader/load--> Buffering --front resolvable--> Ready
//!                                    ^                             |
//!                                    +-------- next_spin ----------+
//! Buffering --stream exhausted, nothing releasable--> Drained
//! Buffering --fatal error--> Failed
//! ```

use std::collections::VecDeque;
use std::path::PathBuf;

use contracts::{
    CorrectedPose, FrameId, LocalizationMode, LogRecord, PlaybackError, PointConverter, PoseSample,
    RecordPayload, RecordStream, RigidTransform, Spin, SpinPoint, SpinSyncConfig, StaticTransform,
    TransformObserver, TransformedSpin, LOCAL_UTM_FRAME, SMOOTH_FRAME, UTM_FRAME, VEHICLE_FRAME,
};
use ingestion::MergedLogStream;
use observability::metrics as playback_metrics;
use ringbuf::{traits::*, HeapRb};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::assembler::SpinAssembler;
use crate::localization::{GlobalChain, LocalizationSource};
use crate::transform_tree::TransformTree;

/// Record source of a synchronizer session
pub enum DataSource<'a> {
    /// Stream created and owned by the synchronizer (`load`)
    Owned(MergedLogStream),
    /// Stream owned by the caller (`set_data_reader`)
    Borrowed(&'a mut dyn RecordStream),
}

impl DataSource<'_> {
    fn stream(&mut self) -> &mut dyn RecordStream {
        match self {
            Self::Owned(stream) => stream as &mut dyn RecordStream,
            Self::Borrowed(stream) => &mut **stream,
        }
    }

    fn current_time(&self) -> Option<f64> {
        match self {
            Self::Owned(stream) => stream.current_time(),
            Self::Borrowed(stream) => stream.current_time(),
        }
    }
}

/// Synchronizer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No data source attached
    Idle,
    /// Pulling records until the oldest pending spin resolves
    Buffering,
    /// A transformed spin is available
    Ready,
    /// Stream exhausted and nothing left to release
    Drained,
    /// Session ended by an error; pending spins were discarded
    Failed,
}

/// Session counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub records: u64,
    pub poses: u64,
    pub corrected_poses: u64,
    pub packet_batches: u64,
    /// Packet batches of other lidars
    pub foreign_batches: u64,
    /// Records not used for synchronization
    pub other_records: u64,
    pub spins_assembled: u64,
    pub spins_emitted: u64,
    /// Pending spins that could never be resolved
    pub spins_discarded: u64,
    /// Rotations below the point threshold
    pub spins_degenerate: u64,
    pub stale_updates: u64,
}

/// Releases assembled spins in arrival order once transformable
pub struct SpinSynchronizer<'a> {
    config: SpinSyncConfig,
    tree: TransformTree,
    localization: LocalizationSource,
    assembler: SpinAssembler,
    source: Option<DataSource<'a>>,
    exhausted: bool,
    pending: VecDeque<Spin>,
    /// Corrected samples held back while dead-reckoning spins are outstanding
    deferred: VecDeque<(f64, CorrectedPose)>,
    history: HeapRb<TransformedSpin>,
    /// Steps back from the newest history entry
    cursor: usize,
    state: SyncState,
    next_sequence: u64,
    stats: SyncStats,
}

impl std::fmt::Debug for SpinSynchronizer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpinSynchronizer")
            .field("sensor_frame", &self.config.sensor_frame)
            .field("target_frame", &self.config.target_frame)
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .field("history", &self.history.occupied_len())
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl<'a> SpinSynchronizer<'a> {
    /// Create a synchronizer in the `Idle` state
    ///
    /// `static_transforms` are the fixed robot and sensor mounting edges.
    ///
    /// # Errors
    /// - `Cycle` for conflicting static edges
    /// - `Configuration` if the sensor frame has no static path to the
    ///   vehicle frame, or a queue bound is zero
    pub fn new(
        config: SpinSyncConfig,
        static_transforms: impl IntoIterator<Item = StaticTransform>,
        converter: Box<dyn PointConverter>,
    ) -> Result<Self, PlaybackError> {
        if config.queue.max_pending_spins == 0 {
            return Err(PlaybackError::configuration(
                "max_pending_spins must be at least 1",
            ));
        }

        let mut tree = TransformTree::new(config.cache_duration_s);
        for edge in static_transforms {
            tree.add_static(edge.child, edge.parent, edge.transform)?;
        }

        // No dynamic edges exist yet, so only a static path can resolve.
        if tree
            .resolve(VEHICLE_FRAME, &config.sensor_frame, 0.0)
            .is_none()
        {
            return Err(PlaybackError::configuration(format!(
                "sensor frame '{}' has no static path to '{}'",
                config.sensor_frame, VEHICLE_FRAME
            )));
        }

        info!(
            sensor_frame = %config.sensor_frame,
            target_frame = %config.target_frame,
            static_edges = tree.static_edge_count(),
            "spin synchronizer configured"
        );

        Ok(Self {
            localization: LocalizationSource::new(
                config.localization.clone(),
                config.cache_duration_s,
            ),
            assembler: SpinAssembler::new(config.assembler.clone(), converter),
            history: HeapRb::new(config.queue.history_len.max(1)),
            tree,
            source: None,
            exhausted: false,
            pending: VecDeque::new(),
            deferred: VecDeque::new(),
            cursor: 0,
            state: SyncState::Idle,
            next_sequence: 0,
            stats: SyncStats::default(),
            config,
        })
    }

    /// Attach a caller-owned stream and start a new session
    pub fn set_data_reader(&mut self, stream: &'a mut dyn RecordStream) {
        self.reset_session();
        self.source = Some(DataSource::Borrowed(stream));
        self.state = SyncState::Buffering;
        debug!("borrowed data reader attached");
    }

    /// Open `paths` as a merged stream and start a new session
    ///
    /// # Errors
    /// `Configuration` when none of the logs can be opened; the current
    /// session is kept in that case.
    #[instrument(name = "spin_sync_load", skip(self, paths), fields(logs = paths.len()))]
    pub fn load(&mut self, paths: &[PathBuf], skip_sec: f64) -> Result<(), PlaybackError> {
        let stream = MergedLogStream::open(paths, skip_sec)?;
        self.load_stream(stream);
        Ok(())
    }

    /// Take ownership of an already opened merged stream and start a new session
    pub fn load_stream(&mut self, stream: MergedLogStream) {
        self.reset_session();
        info!(sources = stream.source_count(), "merged log stream attached");
        self.source = Some(DataSource::Owned(stream));
        self.state = SyncState::Buffering;
    }

    /// Detach the data source and return to `Idle`
    pub fn unset_data_reader(&mut self) {
        self.reset_session();
        self.source = None;
        self.state = SyncState::Idle;
        debug!("data reader detached");
    }

    fn reset_session(&mut self) {
        self.localization.reset();
        self.assembler.reset();
        self.tree.clear_all_dynamic();
        self.pending.clear();
        self.deferred.clear();
        self.history = HeapRb::new(self.config.queue.history_len.max(1));
        self.cursor = 0;
        self.exhausted = false;
        self.next_sequence = 0;
        self.stats = SyncStats::default();
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Current transformed spin; repeatable until the cursor moves
    pub fn get_spin(&self) -> Option<&TransformedSpin> {
        if self.state != SyncState::Ready {
            return None;
        }
        let len = self.history.occupied_len();
        let index = len.checked_sub(self.cursor + 1)?;
        self.history.iter().nth(index)
    }

    /// Advance to the next spin
    ///
    /// Walks forward through history first, then pulls records until the
    /// oldest pending spin can be transformed. `Ok(false)` once the stream is
    /// exhausted and no pending spin can be released, or after a fatal error.
    ///
    /// # Errors
    /// - `Configuration` when no data source is attached
    /// - `ResourceExhausted` when the pending queue overflows
    /// - `Cycle` when the log defines conflicting edges
    ///
    /// Errors other than `Configuration` end the session: every spin not yet
    /// emitted is discarded and the synchronizer moves to `Failed`.
    #[instrument(name = "spin_sync_next_spin", skip(self), fields(state = ?self.state))]
    pub fn next_spin(&mut self) -> Result<bool, PlaybackError> {
        if self.cursor > 0 {
            self.cursor -= 1;
            self.state = SyncState::Ready;
            return Ok(true);
        }

        match self.state {
            SyncState::Idle => {
                return Err(PlaybackError::configuration("no data source attached"));
            }
            SyncState::Drained | SyncState::Failed => return Ok(false),
            SyncState::Buffering | SyncState::Ready => {}
        }

        self.state = SyncState::Buffering;
        match self.release_next() {
            Ok(advanced) => Ok(advanced),
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    fn release_next(&mut self) -> Result<bool, PlaybackError> {
        loop {
            self.apply_deferred_corrections(false)?;
            if let Some(spin) = self.try_release() {
                self.emit(spin);
                return Ok(true);
            }
            if !self.pull()? {
                break;
            }
        }

        // End of stream: nothing new can arrive for the pending spins.
        self.assembler.finish();
        self.drain_assembler()?;
        while !self.pending.is_empty() {
            if let Some(spin) = self.try_release() {
                self.emit(spin);
                return Ok(true);
            }
            if let Some(spin) = self.pending.pop_front() {
                self.discard(&spin, "unresolved_at_end");
            }
        }
        self.apply_deferred_corrections(true)?;

        info!(
            emitted = self.stats.spins_emitted,
            discarded = self.stats.spins_discarded,
            "playback drained"
        );
        self.state = SyncState::Drained;
        Ok(false)
    }

    /// Terminal failure: account for every spin that will never be emitted
    fn fail(&mut self, error: &PlaybackError) {
        while let Some(spin) = self.pending.pop_front() {
            self.discard(&spin, "session_failed");
        }
        while let Some(spin) = self.assembler.pop() {
            self.stats.spins_assembled += 1;
            self.discard(&spin, "session_failed");
        }
        self.deferred.clear();
        self.exhausted = true;
        self.state = SyncState::Failed;
        error!(
            error = %error,
            emitted = self.stats.spins_emitted,
            discarded = self.stats.spins_discarded,
            "playback session failed"
        );
    }

    /// Step back to the previous emitted spin; false past the history window
    pub fn prev_spin(&mut self) -> bool {
        let len = self.history.occupied_len();
        if len == 0 {
            return false;
        }

        if self.state == SyncState::Drained {
            self.cursor = 0;
            self.state = SyncState::Ready;
            return true;
        }
        if self.state != SyncState::Ready || self.cursor + 1 >= len {
            return false;
        }

        self.cursor += 1;
        true
    }

    /// Oldest pending spin, transformed, if every transform it needs exists
    fn try_release(&mut self) -> Option<TransformedSpin> {
        loop {
            let front = self.pending.front()?;
            let (frame, end) = (front.sensor_frame.clone(), front.end);

            // Chain history only moves forward; an older spin can never resolve.
            if self
                .localization
                .earliest_stamp()
                .is_some_and(|earliest| end < earliest)
            {
                if let Some(spin) = self.pending.pop_front() {
                    self.discard(&spin, "before_localization");
                }
                continue;
            }

            let sensor_to_target = self.tree.resolve(&self.config.target_frame, &frame, end)?;
            let global = self.localization.resolve(end)?;
            let spin = self.pending.pop_front()?;
            return Some(self.transform(spin, sensor_to_target, global));
        }
    }

    fn transform(
        &mut self,
        spin: Spin,
        sensor_to_target: RigidTransform,
        global: RigidTransform,
    ) -> TransformedSpin {
        let points = spin
            .points
            .into_iter()
            .map(|p| {
                let (x, y, z) = sensor_to_target.apply(p.x, p.y, p.z);
                SpinPoint { x, y, z, ..p }
            })
            .collect();

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        TransformedSpin {
            sequence,
            sensor_frame: spin.sensor_frame,
            target_frame: self.config.target_frame.clone(),
            start: spin.start,
            end: spin.end,
            points,
            sensor_to_target,
            global,
            localization_mode: self.localization.mode(),
        }
    }

    fn emit(&mut self, spin: TransformedSpin) {
        let wait_s = self
            .source
            .as_ref()
            .and_then(DataSource::current_time)
            .map_or(0.0, |now| now - spin.end);

        playback_metrics::record_spin_emitted(&spin, wait_s);
        playback_metrics::record_pending_depth(self.pending.len());
        debug!(
            sequence = spin.sequence,
            end = spin.end,
            points = spin.len(),
            mode = spin.localization_mode.as_str(),
            wait_s,
            "spin released"
        );

        self.stats.spins_emitted += 1;
        self.history.push_overwrite(spin);
        self.cursor = 0;
        self.state = SyncState::Ready;
    }

    fn discard(&mut self, spin: &Spin, reason: &'static str) {
        self.stats.spins_discarded += 1;
        playback_metrics::record_spin_discarded(reason);
        warn!(
            start = spin.start,
            end = spin.end,
            points = spin.len(),
            reason,
            "pending spin discarded"
        );
    }

    /// Pull and route one record; false once the stream is exhausted
    fn pull(&mut self) -> Result<bool, PlaybackError> {
        if self.exhausted {
            return Ok(false);
        }
        let Some(source) = self.source.as_mut() else {
            return Ok(false);
        };

        let stream = source.stream();
        if !stream.advance() {
            self.exhausted = true;
            debug!("record stream exhausted");
            return Ok(false);
        }
        let Some(record) = stream.current().cloned() else {
            return Ok(true);
        };

        self.route(&record)?;
        Ok(true)
    }

    fn route(&mut self, record: &LogRecord) -> Result<(), PlaybackError> {
        self.stats.records += 1;
        trace!(timestamp = record.timestamp, kind = %record.kind(), "record");

        match &record.payload {
            RecordPayload::Pose(pose) => {
                self.stats.poses += 1;
                self.ingest_pose(record.timestamp, pose)
            }
            RecordPayload::CorrectedPose(corrected) => {
                self.stats.corrected_poses += 1;
                self.ingest_corrected(record.timestamp, corrected)
            }
            RecordPayload::LidarPacketBatch(batch) => {
                if batch.sensor_frame != self.config.sensor_frame {
                    self.stats.foreign_batches += 1;
                    return Ok(());
                }
                self.stats.packet_batches += 1;
                let dropped_before = self.assembler.dropped();
                self.assembler.push_batch(batch)?;
                self.stats.spins_degenerate += self.assembler.dropped() - dropped_before;
                self.drain_assembler()
            }
            _ => {
                self.stats.other_records += 1;
                Ok(())
            }
        }
    }

    fn ingest_pose(&mut self, stamp: f64, pose: &PoseSample) -> Result<(), PlaybackError> {
        let vehicle = RigidTransform::from_xyz_rpy(
            pose.smooth.x,
            pose.smooth.y,
            pose.smooth.z,
            pose.roll,
            pose.pitch,
            pose.yaw,
        );
        self.apply_dynamic(FrameId::vehicle(), FrameId::smooth(), vehicle, stamp)?;

        if let Some(chain) = self.localization.ingest_pose(stamp, pose) {
            self.write_chain(&chain)?;
        }
        Ok(())
    }

    fn ingest_corrected(
        &mut self,
        stamp: f64,
        corrected: &CorrectedPose,
    ) -> Result<(), PlaybackError> {
        let dead_reckoning = self.localization.mode() == LocalizationMode::DeadReckoning;
        if dead_reckoning && (!self.deferred.is_empty() || self.awaits_dead_reckoning(stamp)) {
            debug!(
                stamp,
                pending = self.pending.len(),
                "corrected sample held until earlier spins resolve"
            );
            self.deferred.push_back((stamp, *corrected));
            return Ok(());
        }
        self.apply_corrected(stamp, corrected)
    }

    /// Whether a spin that ends before `stamp` is pending or still being assembled
    fn awaits_dead_reckoning(&self, stamp: f64) -> bool {
        self.pending.front().is_some_and(|spin| spin.end < stamp)
            || self.assembler.partial_start().is_some_and(|start| start < stamp)
    }

    /// Apply held corrected samples once no earlier spin depends on dead
    /// reckoning, or once they fall out of the cache window
    fn apply_deferred_corrections(&mut self, force: bool) -> Result<(), PlaybackError> {
        let Some(&(first, _)) = self.deferred.front() else {
            return Ok(());
        };
        if !force && self.awaits_dead_reckoning(first) {
            let expired = self
                .current_time()
                .is_some_and(|now| now - first > self.config.cache_duration_s);
            if !expired {
                return Ok(());
            }
            warn!(stamp = first, "spins still waiting on dead reckoning, switching anyway");
        }

        while let Some((stamp, corrected)) = self.deferred.pop_front() {
            self.apply_corrected(stamp, &corrected)?;
        }
        Ok(())
    }

    fn apply_corrected(
        &mut self,
        stamp: f64,
        corrected: &CorrectedPose,
    ) -> Result<(), PlaybackError> {
        match self.localization.ingest_corrected(stamp, corrected) {
            Ok(ingest) => {
                if ingest.switched {
                    self.tree.clear_dynamic(LOCAL_UTM_FRAME);
                    self.tree.clear_dynamic(SMOOTH_FRAME);
                    playback_metrics::record_localization_switch(stamp);
                    info!(stamp, pending = self.pending.len(), "global chain now from corrected localization");
                }
                self.write_chain(&ingest.chain)
            }
            Err(e) if !e.is_fatal() => {
                self.stats.stale_updates += 1;
                playback_metrics::record_stale_update(SMOOTH_FRAME);
                warn!(error = %e, "corrected localization sample ignored");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn write_chain(&mut self, chain: &GlobalChain) -> Result<(), PlaybackError> {
        self.apply_dynamic(
            FrameId::local_utm(),
            FrameId::utm(),
            chain.utm_to_local_utm,
            chain.stamp,
        )?;
        self.apply_dynamic(
            FrameId::smooth(),
            FrameId::local_utm(),
            chain.local_utm_to_smooth,
            chain.stamp,
        )
    }

    /// Dynamic tree update; stale samples are logged and skipped
    fn apply_dynamic(
        &mut self,
        child: FrameId,
        parent: FrameId,
        transform: RigidTransform,
        stamp: f64,
    ) -> Result<(), PlaybackError> {
        match self
            .tree
            .add_dynamic(child.clone(), parent, transform, stamp)
        {
            Ok(()) => Ok(()),
            Err(e) if !e.is_fatal() => {
                self.stats.stale_updates += 1;
                playback_metrics::record_stale_update(&child);
                warn!(error = %e, "transform sample ignored");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn drain_assembler(&mut self) -> Result<(), PlaybackError> {
        let max = self.config.queue.max_pending_spins;
        while self.assembler.queued() > 0 {
            // Overflowing spin stays queued so a failed session still accounts for it
            if self.pending.len() >= max {
                return Err(PlaybackError::resource_exhausted(
                    "pending_spins",
                    self.pending.len() + 1,
                    max,
                ));
            }
            let Some(spin) = self.assembler.pop() else {
                break;
            };
            self.stats.spins_assembled += 1;
            self.pending.push_back(spin);
        }
        playback_metrics::record_pending_depth(self.pending.len());
        Ok(())
    }

    /// Register a broadcast sink for every transform tree mutation
    pub fn add_observer(&mut self, observer: Box<dyn TransformObserver>) {
        self.tree.add_observer(observer);
    }

    pub fn tf_tree(&self) -> &TransformTree {
        &self.tree
    }

    pub fn tf_tree_mut(&mut self) -> &mut TransformTree {
        &mut self.tree
    }

    pub fn localization(&self) -> &LocalizationSource {
        &self.localization
    }

    pub fn config(&self) -> &SpinSyncConfig {
        &self.config
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Spins waiting for a transform
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Log time of the record pulled last
    pub fn current_time(&self) -> Option<f64> {
        self.source.as_ref().and_then(DataSource::current_time)
    }

    /// Pose of the smooth frame in utm as stored in the tree, at `time`
    ///
    /// Interpolates between chain samples only. Past the newest sample this
    /// is `None`, while spins released there still carry a `global` pose
    /// held from the newest sample by the localization source.
    pub fn resolve_global(&self, time: f64) -> Option<RigidTransform> {
        self.tree.resolve(UTM_FRAME, SMOOTH_FRAME, time)
    }
}
