use std::collections::BTreeMap;

/// Full-state snapshots taken at a fixed tick interval, used as seek points.
///
/// Slot `i` holds the frame `initial_frame + i * interval_ticks`. Slot 0 is
/// the initial frame and is filled on construction. Each slot is written once;
/// later offers for an occupied slot are ignored.
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    initial_frame: u32,
    interval_ticks: u32,
    snapshots: BTreeMap<u32, Vec<u8>>,
}

impl SnapshotCache {
    pub fn new(initial_frame: u32, initial_data: Vec<u8>, interval_ticks: u32) -> Self {
        let mut snapshots = BTreeMap::new();
        snapshots.insert(0, initial_data);
        Self {
            initial_frame,
            interval_ticks: interval_ticks.max(1),
            snapshots,
        }
    }

    pub fn initial_frame(&self) -> u32 {
        self.initial_frame
    }

    pub fn interval_ticks(&self) -> u32 {
        self.interval_ticks
    }

    /// Slot for `frame` if it lands exactly on a snapshot boundary.
    pub fn slot_for(&self, frame: u32) -> Option<u32> {
        let offset = frame.checked_sub(self.initial_frame)?;
        (offset % self.interval_ticks == 0).then(|| offset / self.interval_ticks)
    }

    /// Store a snapshot for `frame` if it is on a boundary and the slot is still
    /// empty. `serialize` only runs when the snapshot is actually kept.
    pub fn offer(&mut self, frame: u32, serialize: impl FnOnce() -> Vec<u8>) -> bool {
        let Some(slot) = self.slot_for(frame) else {
            return false;
        };
        if self.snapshots.contains_key(&slot) {
            return false;
        }
        self.snapshots.insert(slot, serialize());
        true
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn get(&self, slot: u32) -> Option<&[u8]> {
        self.snapshots.get(&slot).map(Vec::as_slice)
    }

    pub fn frame_of(&self, slot: u32) -> u32 {
        self.initial_frame + slot * self.interval_ticks
    }

    /// Latest cached snapshot at or before `frame`, with the frame number it belongs to.
    pub fn nearest_before(&self, frame: u32) -> Option<(u32, &[u8])> {
        let offset = frame.checked_sub(self.initial_frame)?;
        let max_slot = offset / self.interval_ticks;
        self.snapshots
            .range(..=max_slot)
            .next_back()
            .map(|(slot, data)| (self.frame_of(*slot), data.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_frame_is_slot_zero() {
        let cache = SnapshotCache::new(100, vec![1], 10);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(0), Some(&[1u8][..]));
        assert_eq!(cache.slot_for(100), Some(0));
    }

    #[test]
    fn test_only_boundaries_are_kept() {
        let mut cache = SnapshotCache::new(100, vec![0], 10);
        assert!(!cache.offer(105, || vec![5]));
        assert!(!cache.offer(99, || vec![9]));
        assert!(cache.offer(110, || vec![1]));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_first_writer_wins() {
        let mut cache = SnapshotCache::new(0, vec![0], 10);
        assert!(cache.offer(10, || vec![1]));
        assert!(!cache.offer(10, || panic!("must not serialize an occupied slot")));
        assert_eq!(cache.get(1), Some(&[1u8][..]));
    }

    #[test]
    fn test_step_count_bounds_cache_size() {
        let interval = 7;
        for steps in [0u32, 1, 6, 7, 8, 49, 50, 100] {
            let mut cache = SnapshotCache::new(20, vec![], interval);
            for frame in 20..=20 + steps {
                cache.offer(frame, Vec::new);
                // duplicate callbacks for the same frame
                cache.offer(frame, Vec::new);
            }
            assert_eq!(cache.len() as u32, steps / interval + 1, "steps={steps}");
        }
    }

    #[test]
    fn test_nearest_before_seeks_backwards() {
        let mut cache = SnapshotCache::new(0, vec![0], 10);
        cache.offer(10, || vec![1]);
        cache.offer(30, || vec![3]);

        assert_eq!(cache.nearest_before(9), Some((0, &[0u8][..])));
        assert_eq!(cache.nearest_before(25), Some((10, &[1u8][..])));
        assert_eq!(cache.nearest_before(1000), Some((30, &[3u8][..])));
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let cache = SnapshotCache::new(0, vec![], 0);
        assert_eq!(cache.interval_ticks(), 1);
    }
}
