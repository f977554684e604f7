//! Lidar rotation assembly
//!
//! Firing blocks are grouped into complete rotations. A rotation closes
//! whenever the azimuth, measured from the reference angle, decreases.

use std::collections::VecDeque;

use contracts::{
    AssemblerConfig, FrameId, LidarPacketBatch, PlaybackError, PointConverter, Spin, SpinPoint,
};
use tracing::{debug, trace, warn};

/// Rotation currently being filled
#[derive(Debug)]
struct Partial {
    frame: FrameId,
    start: f64,
    end: f64,
    points: Vec<SpinPoint>,
}

/// Groups packet batches into complete spins
pub struct SpinAssembler {
    config: AssemblerConfig,
    converter: Box<dyn PointConverter>,
    /// Relative azimuth of the previous block
    last_azimuth: Option<f64>,
    /// `None` until the first boundary crossing
    partial: Option<Partial>,
    output: VecDeque<Spin>,
    dropped: u64,
}

impl std::fmt::Debug for SpinAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpinAssembler")
            .field("start_azimuth_deg", &self.config.start_azimuth_deg)
            .field("synced", &self.partial.is_some())
            .field("queued", &self.output.len())
            .field("dropped", &self.dropped)
            .finish()
    }
}

impl SpinAssembler {
    pub fn new(config: AssemblerConfig, converter: Box<dyn PointConverter>) -> Self {
        Self {
            config,
            converter,
            last_azimuth: None,
            partial: None,
            output: VecDeque::new(),
            dropped: 0,
        }
    }

    /// Consume one batch; returns the number of spins completed by it
    ///
    /// # Errors
    /// `ResourceExhausted` when a completed spin does not fit the output queue.
    /// The spin is still queued; the rest of the batch is not consumed.
    pub fn push_batch(&mut self, batch: &LidarPacketBatch) -> Result<usize, PlaybackError> {
        let mut completed = 0;

        for packet in &batch.packets {
            for block in &packet.blocks {
                let azimuth = (block.azimuth_deg - self.config.start_azimuth_deg).rem_euclid(360.0);

                if self.last_azimuth.is_some_and(|last| azimuth < last) {
                    if let Some(done) = self.partial.take() {
                        completed += usize::from(self.complete(done)?);
                    } else {
                        debug!(frame = %batch.sensor_frame, "first rotation boundary, leading fragment discarded");
                    }
                    self.partial = Some(Partial {
                        frame: batch.sensor_frame.clone(),
                        start: packet.stamp,
                        end: packet.stamp,
                        points: Vec::new(),
                    });
                }
                self.last_azimuth = Some(azimuth);

                if let Some(partial) = self.partial.as_mut() {
                    partial.end = packet.stamp;
                    self.converter
                        .convert_block(packet.stamp, block, &mut partial.points);
                }
            }
        }

        Ok(completed)
    }

    fn complete(&mut self, done: Partial) -> Result<bool, PlaybackError> {
        if done.points.len() < self.config.min_points {
            self.dropped += 1;
            warn!(
                frame = %done.frame,
                points = done.points.len(),
                min_points = self.config.min_points,
                "degenerate rotation dropped"
            );
            return Ok(false);
        }

        let overflow = self.output.len() >= self.config.capacity;
        trace!(frame = %done.frame, start = done.start, end = done.end, points = done.points.len(), "spin assembled");
        self.output.push_back(Spin {
            sensor_frame: done.frame,
            start: done.start,
            end: done.end,
            points: done.points,
        });
        // Kept queued past capacity so the caller can still account for it
        if overflow {
            return Err(PlaybackError::resource_exhausted(
                "assembled_spins",
                self.output.len(),
                self.config.capacity,
            ));
        }
        Ok(true)
    }

    /// Take the oldest completed spin
    pub fn pop(&mut self) -> Option<Spin> {
        self.output.pop_front()
    }

    /// Start of the rotation being filled, if any
    pub fn partial_start(&self) -> Option<f64> {
        self.partial.as_ref().map(|p| p.start)
    }

    pub fn queued(&self) -> usize {
        self.output.len()
    }

    /// Spins dropped for having too few points
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// End of input: the rotation in progress can never complete
    pub fn finish(&mut self) {
        if let Some(partial) = self.partial.take() {
            debug!(frame = %partial.frame, points = partial.points.len(), "trailing fragment discarded");
        }
        self.last_azimuth = None;
    }

    /// Forget all state, including queued spins
    pub fn reset(&mut self) {
        self.last_azimuth = None;
        self.partial = None;
        self.output.clear();
        self.dropped = 0;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use contracts::{FiringBlock, LidarPacket};

    /// One point per block at (range, 0, 0)
    pub(crate) struct RangeConverter;

    impl PointConverter for RangeConverter {
        fn convert_block(&self, stamp: f64, block: &FiringBlock, out: &mut Vec<SpinPoint>) {
            for (laser, range) in block.ranges.iter().enumerate() {
                out.push(SpinPoint {
                    x: f64::from(*range),
                    laser: laser as u16,
                    timestamp: stamp,
                    ..Default::default()
                });
            }
        }
    }

    /// Packets at `stamps`, each with one block at the matching azimuth
    pub(crate) fn batch(stamps: &[f64], azimuths: &[f64]) -> LidarPacketBatch {
        LidarPacketBatch {
            sensor_frame: FrameId::from("velodyne"),
            packets: stamps
                .iter()
                .zip(azimuths)
                .map(|(&stamp, &azimuth_deg)| LidarPacket {
                    stamp,
                    blocks: vec![FiringBlock {
                        azimuth_deg,
                        ranges: vec![1.0],
                        intensities: vec![10],
                    }],
                })
                .collect(),
        }
    }

    fn assembler(config: AssemblerConfig) -> SpinAssembler {
        SpinAssembler::new(config, Box::new(RangeConverter))
    }

    #[test]
    fn test_leading_and_trailing_fragments_discarded() {
        let mut asm = assembler(AssemblerConfig::default());
        // Starts mid-rotation, wraps at 0.3 and 0.7, ends mid-rotation
        let n = asm
            .push_batch(&batch(
                &[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8],
                &[180.0, 270.0, 0.0, 90.0, 180.0, 270.0, 0.0, 90.0],
            ))
            .unwrap();
        assert_eq!(n, 1);

        let spin = asm.pop().unwrap();
        assert_eq!(spin.start, 0.3);
        assert_eq!(spin.end, 0.6);
        assert_eq!(spin.len(), 4);
        assert_eq!(spin.sensor_frame, "velodyne");
        assert!(spin.points.iter().all(|p| p.timestamp >= spin.start && p.timestamp <= spin.end));

        asm.finish();
        assert!(asm.pop().is_none());
    }

    #[test]
    fn test_reference_azimuth_offsets_boundary() {
        let mut asm = assembler(AssemblerConfig {
            start_azimuth_deg: 90.0,
            ..Default::default()
        });
        // Relative azimuths: 270, 0 (wrap), 90, 180, 270, 0 (wrap)
        asm.push_batch(&batch(
            &[0.0, 0.1, 0.2, 0.3, 0.4, 0.5],
            &[0.0, 90.0, 180.0, 270.0, 0.0, 90.0],
        ))
        .unwrap();
        let spin = asm.pop().unwrap();
        assert_eq!((spin.start, spin.end), (0.1, 0.4));
    }

    #[test]
    fn test_spin_spans_batches() {
        let mut asm = assembler(AssemblerConfig::default());
        assert_eq!(asm.push_batch(&batch(&[0.0, 0.1], &[300.0, 10.0])).unwrap(), 0);
        assert_eq!(asm.push_batch(&batch(&[0.2, 0.3], &[120.0, 240.0])).unwrap(), 0);
        assert_eq!(asm.push_batch(&batch(&[0.4], &[5.0])).unwrap(), 1);
        assert_eq!(asm.pop().unwrap().len(), 3);
    }

    #[test]
    fn test_min_points_drop() {
        let mut asm = assembler(AssemblerConfig {
            min_points: 3,
            ..Default::default()
        });
        asm.push_batch(&batch(&[0.0, 0.1, 0.2], &[300.0, 10.0, 5.0]))
            .unwrap();
        assert!(asm.pop().is_none());
        assert_eq!(asm.dropped(), 1);
    }

    #[test]
    fn test_output_capacity_exhausted() {
        let mut asm = assembler(AssemblerConfig {
            capacity: 1,
            ..Default::default()
        });
        let err = asm
            .push_batch(&batch(
                &[0.0, 0.1, 0.2, 0.3, 0.4, 0.5],
                &[300.0, 10.0, 200.0, 10.0, 200.0, 10.0],
            ))
            .unwrap_err();
        assert!(matches!(err, PlaybackError::ResourceExhausted { depth: 2, max: 1, .. }));
        // Overflowing spin is not lost
        assert_eq!(asm.queued(), 2);
        assert_eq!(asm.pop().map(|s| s.start), Some(0.1));
        assert_eq!(asm.pop().map(|s| s.start), Some(0.3));
    }

    #[test]
    fn test_partial_start_tracks_open_rotation() {
        let mut asm = assembler(AssemblerConfig::default());
        asm.push_batch(&batch(&[0.0], &[300.0])).unwrap();
        assert_eq!(asm.partial_start(), None);
        asm.push_batch(&batch(&[0.1, 0.2], &[10.0, 200.0])).unwrap();
        assert_eq!(asm.partial_start(), Some(0.1));
        asm.finish();
        assert_eq!(asm.partial_start(), None);
    }

    #[test]
    fn test_reset_clears_queue() {
        let mut asm = assembler(AssemblerConfig::default());
        asm.push_batch(&batch(&[0.0, 0.1, 0.2, 0.3], &[300.0, 10.0, 200.0, 10.0]))
            .unwrap();
        assert_eq!(asm.queued(), 1);
        asm.reset();
        assert_eq!(asm.queued(), 0);
    }
}
