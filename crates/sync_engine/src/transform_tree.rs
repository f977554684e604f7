//! Transform tree
//!
//! Named frames connected by `child -> parent` edges. Static edges hold a
//! single transform; dynamic edges hold a short, time-ordered history of
//! samples. Resolution composes the path between two frames at a given time.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use contracts::{FrameId, PlaybackError, RigidTransform, TransformObserver, TransformUpdate};
use tracing::{debug, trace};

/// Time-stamped samples of one dynamic edge, oldest first
#[derive(Debug, Clone)]
struct DynamicEdge {
    parent: FrameId,
    samples: VecDeque<(f64, RigidTransform)>,
}

impl DynamicEdge {
    fn latest_stamp(&self) -> Option<f64> {
        self.samples.back().map(|(t, _)| *t)
    }

    /// Exact sample at `time`, or interpolation between the samples that
    /// bracket it. Never extrapolates.
    fn sample_at(&self, time: f64) -> Option<RigidTransform> {
        let idx = self.samples.partition_point(|(t, _)| *t < time);
        if let Some((t, tf)) = self.samples.get(idx) {
            if *t == time {
                return Some(*tf);
            }
        }
        if idx == 0 || idx >= self.samples.len() {
            return None;
        }

        let (t0, before) = self.samples[idx - 1];
        let (t1, after) = self.samples[idx];
        let ratio = (time - t0) / (t1 - t0);
        Some(before.interpolate(&after, ratio))
    }
}

/// Frame graph with static and time-varying edges
pub struct TransformTree {
    statics: HashMap<FrameId, (FrameId, RigidTransform)>,
    dynamics: HashMap<FrameId, DynamicEdge>,
    cache_duration: f64,
    observers: Vec<Box<dyn TransformObserver>>,
}

impl fmt::Debug for TransformTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformTree")
            .field("static_edges", &self.statics.len())
            .field("dynamic_edges", &self.dynamics.len())
            .field("cache_duration", &self.cache_duration)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl TransformTree {
    /// Create an empty tree keeping `cache_duration` seconds of dynamic history
    pub fn new(cache_duration: f64) -> Self {
        Self {
            statics: HashMap::new(),
            dynamics: HashMap::new(),
            cache_duration,
            observers: Vec::new(),
        }
    }

    /// Register an observer notified after every successful mutation
    ///
    /// Static edges already present are replayed to it first.
    pub fn add_observer(&mut self, mut observer: Box<dyn TransformObserver>) {
        for (child, (parent, transform)) in &self.statics {
            observer.on_update(&TransformUpdate {
                child: child.clone(),
                parent: parent.clone(),
                transform: *transform,
                stamp: None,
            });
        }
        debug!(
            observer = observer.name(),
            replayed = self.statics.len(),
            "transform observer registered"
        );
        self.observers.push(observer);
    }

    /// Insert or overwrite the static edge `child -> parent`
    ///
    /// # Errors
    /// `Cycle` if the edge would close a cycle or `child` already has a
    /// dynamic edge. The tree is unchanged on error.
    pub fn add_static(
        &mut self,
        child: impl Into<FrameId>,
        parent: impl Into<FrameId>,
        transform: RigidTransform,
    ) -> Result<(), PlaybackError> {
        let child = child.into();
        let parent = parent.into();

        if self.dynamics.contains_key(&child) {
            return Err(PlaybackError::cycle(
                child.as_str(),
                parent.as_str(),
                "frame already has a dynamic parent",
            ));
        }
        self.check_acyclic(&child, &parent)?;

        self.statics
            .insert(child.clone(), (parent.clone(), transform));
        trace!(child = %child, parent = %parent, "static edge set");
        self.notify(TransformUpdate {
            child,
            parent,
            transform,
            stamp: None,
        });
        Ok(())
    }

    /// Append a time-stamped sample to the dynamic edge `child -> parent`
    ///
    /// A sample with the same stamp as the latest one replaces it.
    ///
    /// # Errors
    /// - `StaleUpdate` if `stamp` is older than the latest sample
    /// - `Cycle` if `child` has a static parent, a different dynamic parent,
    ///   or the edge would close a cycle
    pub fn add_dynamic(
        &mut self,
        child: impl Into<FrameId>,
        parent: impl Into<FrameId>,
        transform: RigidTransform,
        stamp: f64,
    ) -> Result<(), PlaybackError> {
        let child = child.into();
        let parent = parent.into();

        if self.statics.contains_key(&child) {
            return Err(PlaybackError::cycle(
                child.as_str(),
                parent.as_str(),
                "frame already has a static parent",
            ));
        }

        match self.dynamics.get(&child) {
            Some(edge) if edge.parent != parent => {
                return Err(PlaybackError::cycle(
                    child.as_str(),
                    parent.as_str(),
                    format!("frame already has dynamic parent '{}'", edge.parent),
                ));
            }
            Some(edge) => {
                if let Some(latest) = edge.latest_stamp() {
                    if stamp < latest {
                        return Err(PlaybackError::StaleUpdate {
                            child: child.to_string(),
                            parent: parent.to_string(),
                            stamp,
                            latest,
                        });
                    }
                }
            }
            None => self.check_acyclic(&child, &parent)?,
        }

        let cache_duration = self.cache_duration;
        let edge = self
            .dynamics
            .entry(child.clone())
            .or_insert_with(|| DynamicEdge {
                parent: parent.clone(),
                samples: VecDeque::new(),
            });

        if edge.latest_stamp() == Some(stamp) {
            edge.samples.pop_back();
        }
        edge.samples.push_back((stamp, transform));

        let horizon = stamp - cache_duration;
        while edge.samples.len() > 1 && edge.samples.front().is_some_and(|(t, _)| *t < horizon) {
            edge.samples.pop_front();
        }

        self.notify(TransformUpdate {
            child,
            parent,
            transform,
            stamp: Some(stamp),
        });
        Ok(())
    }

    /// Remove the dynamic edge of `child` and its whole history
    ///
    /// Returns whether an edge was removed.
    pub fn clear_dynamic(&mut self, child: &str) -> bool {
        let removed = self.dynamics.remove(child).is_some();
        if removed {
            debug!(child, "dynamic edge cleared");
        }
        removed
    }

    /// Remove every dynamic edge, keeping static ones
    pub fn clear_all_dynamic(&mut self) {
        self.dynamics.clear();
    }

    /// Transform mapping `source` coordinates into `target` at `time`
    ///
    /// `None` when the frames are unconnected or a dynamic edge on the path
    /// has no sample at or bracketing `time`.
    pub fn resolve(&self, target: &str, source: &str, time: f64) -> Option<RigidTransform> {
        if target == source {
            return Some(RigidTransform::identity());
        }

        let source_chain = self.ancestors(source);
        let target_chain = self.ancestors(target);

        // First frame of the source chain that also lies on the target chain
        let (source_depth, target_depth) = source_chain.iter().enumerate().find_map(|(i, f)| {
            target_chain
                .iter()
                .position(|g| g.as_str() == f.as_str())
                .map(|j| (i, j))
        })?;

        let source_to_ancestor = self.compose_up(&source_chain[..=source_depth], time)?;
        let target_to_ancestor = self.compose_up(&target_chain[..=target_depth], time)?;

        Some(target_to_ancestor.inverse() * source_to_ancestor)
    }

    pub fn can_resolve(&self, target: &str, source: &str, time: f64) -> bool {
        self.resolve(target, source, time).is_some()
    }

    /// Whether `frame` appears in any edge
    pub fn has_frame(&self, frame: &str) -> bool {
        self.statics.contains_key(frame)
            || self.dynamics.contains_key(frame)
            || self.statics.values().any(|(p, _)| p.as_str() == frame)
            || self.dynamics.values().any(|e| e.parent.as_str() == frame)
    }

    /// All known frames, sorted
    pub fn frames(&self) -> Vec<FrameId> {
        let mut set: HashSet<FrameId> = HashSet::new();
        for (child, (parent, _)) in &self.statics {
            set.insert(child.clone());
            set.insert(parent.clone());
        }
        for (child, edge) in &self.dynamics {
            set.insert(child.clone());
            set.insert(edge.parent.clone());
        }
        let mut frames: Vec<FrameId> = set.into_iter().collect();
        frames.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        frames
    }

    /// Parent of `frame`, if it has an edge
    pub fn parent_of(&self, frame: &str) -> Option<&FrameId> {
        self.statics
            .get(frame)
            .map(|(p, _)| p)
            .or_else(|| self.dynamics.get(frame).map(|e| &e.parent))
    }

    /// Latest sample time of the dynamic edge of `child`
    pub fn latest_stamp(&self, child: &str) -> Option<f64> {
        self.dynamics.get(child).and_then(DynamicEdge::latest_stamp)
    }

    pub fn static_edge_count(&self) -> usize {
        self.statics.len()
    }

    pub fn dynamic_edge_count(&self) -> usize {
        self.dynamics.len()
    }

    /// `frame` followed by its ancestors up to the root
    fn ancestors(&self, frame: &str) -> Vec<FrameId> {
        let mut chain = vec![FrameId::from(frame)];
        let mut current = FrameId::from(frame);
        while let Some(parent) = self.parent_of(&current) {
            // Guarded on insert; the bound only protects against corruption.
            if chain.len() > self.statics.len() + self.dynamics.len() {
                break;
            }
            chain.push(parent.clone());
            current = parent.clone();
        }
        chain
    }

    /// Product of the edges along `chain` (child first), i.e. the transform
    /// from `chain[0]` into its last element.
    fn compose_up(&self, chain: &[FrameId], time: f64) -> Option<RigidTransform> {
        let mut acc = RigidTransform::identity();
        for child in &chain[..chain.len().saturating_sub(1)] {
            let edge = self.edge_at(child, time)?;
            acc = edge * acc;
        }
        Some(acc)
    }

    fn edge_at(&self, child: &str, time: f64) -> Option<RigidTransform> {
        if let Some((_, tf)) = self.statics.get(child) {
            return Some(*tf);
        }
        self.dynamics.get(child)?.sample_at(time)
    }

    fn check_acyclic(&self, child: &FrameId, parent: &FrameId) -> Result<(), PlaybackError> {
        if child == parent {
            return Err(PlaybackError::cycle(
                child.as_str(),
                parent.as_str(),
                "frame cannot be its own parent",
            ));
        }
        if self
            .ancestors(parent)
            .iter()
            .any(|f| f.as_str() == child.as_str())
        {
            return Err(PlaybackError::cycle(
                child.as_str(),
                parent.as_str(),
                "would create a cycle",
            ));
        }
        Ok(())
    }

    fn notify(&mut self, update: TransformUpdate) {
        for observer in &mut self.observers {
            observer.on_update(&update);
        }
    }
}

impl Default for TransformTree {
    fn default() -> Self {
        Self::new(10.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        updates: Arc<Mutex<Vec<TransformUpdate>>>,
    }

    impl TransformObserver for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn on_update(&mut self, update: &TransformUpdate) {
            self.updates.lock().unwrap().push(update.clone());
        }
    }

    fn translation(x: f64) -> RigidTransform {
        RigidTransform::from_translation(x, 0.0, 0.0)
    }

    #[test]
    fn test_resolve_static_chain() {
        let mut tree = TransformTree::new(10.0);
        tree.add_static("velodyne", "vehicle", translation(1.0)).unwrap();
        tree.add_static("vehicle", "smooth", translation(10.0)).unwrap();

        let tf = tree.resolve("smooth", "velodyne", 0.0).unwrap();
        let (x, _, _) = tf.apply(0.0, 0.0, 0.0);
        assert!((x - 11.0).abs() < 1e-9);

        // Reverse direction is the inverse
        let back = tree.resolve("velodyne", "smooth", 0.0).unwrap();
        assert!((back.apply(11.0, 0.0, 0.0).0).abs() < 1e-9);
    }

    #[test]
    fn test_resolve_between_siblings() {
        let mut tree = TransformTree::new(10.0);
        tree.add_static("left", "vehicle", translation(1.0)).unwrap();
        tree.add_static("right", "vehicle", translation(-1.0)).unwrap();

        let tf = tree.resolve("right", "left", 0.0).unwrap();
        assert!((tf.apply(0.0, 0.0, 0.0).0 - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_unconnected_frames() {
        let mut tree = TransformTree::new(10.0);
        tree.add_static("a", "b", translation(1.0)).unwrap();
        tree.add_static("c", "d", translation(1.0)).unwrap();
        assert!(tree.resolve("a", "c", 0.0).is_none());
        assert!(tree.resolve("x", "x", 0.0).is_some());
    }

    #[test]
    fn test_cycle_rejected_and_tree_unchanged() {
        let mut tree = TransformTree::new(10.0);
        tree.add_static("a", "b", translation(1.0)).unwrap();
        tree.add_static("b", "c", translation(2.0)).unwrap();

        let before = tree.resolve("c", "a", 0.0).unwrap();
        let err = tree.add_static("c", "a", translation(3.0)).unwrap_err();
        assert!(matches!(err, PlaybackError::Cycle { .. }));

        assert_eq!(tree.static_edge_count(), 2);
        assert!(tree.parent_of("c").is_none());
        assert_eq!(tree.resolve("c", "a", 0.0).unwrap(), before);
    }

    #[test]
    fn test_self_edge_rejected() {
        let mut tree = TransformTree::new(10.0);
        assert!(tree.add_static("a", "a", translation(1.0)).is_err());
        assert!(tree.add_dynamic("a", "a", translation(1.0), 0.0).is_err());
    }

    #[test]
    fn test_static_overwrite() {
        let mut tree = TransformTree::new(10.0);
        tree.add_static("a", "b", translation(1.0)).unwrap();
        tree.add_static("a", "b", translation(5.0)).unwrap();
        let tf = tree.resolve("b", "a", 0.0).unwrap();
        assert!((tf.apply(0.0, 0.0, 0.0).0 - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_dynamic_interpolation_without_extrapolation() {
        let mut tree = TransformTree::new(10.0);
        tree.add_dynamic("vehicle", "smooth", translation(0.0), 1.0).unwrap();
        tree.add_dynamic("vehicle", "smooth", translation(10.0), 2.0).unwrap();

        let mid = tree.resolve("smooth", "vehicle", 1.5).unwrap();
        assert!((mid.apply(0.0, 0.0, 0.0).0 - 5.0).abs() < 1e-9);

        let exact = tree.resolve("smooth", "vehicle", 2.0).unwrap();
        assert!((exact.apply(0.0, 0.0, 0.0).0 - 10.0).abs() < 1e-9);

        assert!(tree.resolve("smooth", "vehicle", 0.5).is_none());
        assert!(tree.resolve("smooth", "vehicle", 2.5).is_none());
    }

    #[test]
    fn test_stale_update_keeps_state() {
        let mut tree = TransformTree::new(10.0);
        tree.add_dynamic("vehicle", "smooth", translation(1.0), 2.0).unwrap();

        let err = tree
            .add_dynamic("vehicle", "smooth", translation(99.0), 1.0)
            .unwrap_err();
        assert!(matches!(err, PlaybackError::StaleUpdate { latest, .. } if latest == 2.0));

        assert_eq!(tree.latest_stamp("vehicle"), Some(2.0));
        let tf = tree.resolve("smooth", "vehicle", 2.0).unwrap();
        assert!((tf.apply(0.0, 0.0, 0.0).0 - 1.0).abs() < 1e-9);
        assert!(tree.resolve("smooth", "vehicle", 1.0).is_none());
    }

    #[test]
    fn test_same_stamp_replaces_sample() {
        let mut tree = TransformTree::new(10.0);
        tree.add_dynamic("vehicle", "smooth", translation(1.0), 2.0).unwrap();
        tree.add_dynamic("vehicle", "smooth", translation(3.0), 2.0).unwrap();
        let tf = tree.resolve("smooth", "vehicle", 2.0).unwrap();
        assert!((tf.apply(0.0, 0.0, 0.0).0 - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_dynamic_conflicts() {
        let mut tree = TransformTree::new(10.0);
        tree.add_static("velodyne", "vehicle", translation(1.0)).unwrap();
        tree.add_dynamic("vehicle", "smooth", translation(0.0), 0.0).unwrap();

        // Static parent already present
        assert!(matches!(
            tree.add_dynamic("velodyne", "vehicle", translation(0.0), 1.0),
            Err(PlaybackError::Cycle { .. })
        ));
        // Different dynamic parent
        assert!(matches!(
            tree.add_dynamic("vehicle", "utm", translation(0.0), 1.0),
            Err(PlaybackError::Cycle { .. })
        ));
        // Static redefinition of a dynamic frame
        assert!(matches!(
            tree.add_static("vehicle", "smooth", translation(0.0)),
            Err(PlaybackError::Cycle { .. })
        ));
        // Dynamic edge closing a cycle
        assert!(matches!(
            tree.add_dynamic("smooth", "velodyne", translation(0.0), 1.0),
            Err(PlaybackError::Cycle { .. })
        ));
    }

    #[test]
    fn test_history_pruned_by_cache_duration() {
        let mut tree = TransformTree::new(2.0);
        for t in 0..10 {
            tree.add_dynamic("vehicle", "smooth", translation(t as f64), t as f64)
                .unwrap();
        }
        assert!(tree.resolve("smooth", "vehicle", 8.5).is_some());
        assert!(tree.resolve("smooth", "vehicle", 3.0).is_none());
    }

    #[test]
    fn test_clear_dynamic() {
        let mut tree = TransformTree::new(10.0);
        tree.add_dynamic("smooth", "local_utm", translation(1.0), 1.0).unwrap();
        assert!(tree.clear_dynamic("smooth"));
        assert!(!tree.clear_dynamic("smooth"));
        assert!(tree.resolve("local_utm", "smooth", 1.0).is_none());
        // A fresh edge may use another parent after clearing
        tree.add_dynamic("smooth", "utm", translation(1.0), 0.5).unwrap();
    }

    #[test]
    fn test_observers_see_every_mutation() {
        let updates = Arc::new(Mutex::new(Vec::new()));
        let mut tree = TransformTree::new(10.0);
        tree.add_observer(Box::new(Recorder {
            updates: updates.clone(),
        }));

        tree.add_static("velodyne", "vehicle", translation(1.0)).unwrap();
        tree.add_dynamic("vehicle", "smooth", translation(0.0), 1.0).unwrap();
        let _ = tree.add_dynamic("vehicle", "smooth", translation(0.0), 0.5);

        let updates = updates.lock().unwrap();
        assert_eq!(updates.len(), 2);
        assert!(updates[0].is_static());
        assert_eq!(updates[1].stamp, Some(1.0));
    }

    #[test]
    fn test_late_observer_receives_static_edges() {
        let updates = Arc::new(Mutex::new(Vec::new()));
        let mut tree = TransformTree::new(10.0);
        tree.add_static("velodyne", "vehicle", translation(1.0)).unwrap();
        tree.add_dynamic("vehicle", "smooth", translation(0.0), 1.0).unwrap();

        tree.add_observer(Box::new(Recorder {
            updates: updates.clone(),
        }));

        let updates = updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].child, "velodyne");
        assert!(updates[0].is_static());
    }

    #[test]
    fn test_frames_listing() {
        let mut tree = TransformTree::new(10.0);
        tree.add_static("velodyne", "vehicle", translation(1.0)).unwrap();
        tree.add_dynamic("vehicle", "smooth", translation(0.0), 0.0).unwrap();

        let frames: Vec<String> = tree.frames().iter().map(|f| f.to_string()).collect();
        assert_eq!(frames, vec!["smooth", "vehicle", "velodyne"]);
        assert!(tree.has_frame("smooth"));
        assert!(!tree.has_frame("utm"));
    }
}
