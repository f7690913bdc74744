use crate::sim::SimulationFrame;

use super::cache::SnapshotCache;
use super::file::ReplayFile;
use super::input::InputRecord;
use super::{snapshot_interval_ticks, SNAPSHOT_INTERVAL_SECONDS};

/// Drives a loaded replay: feeds recorded inputs back frame by frame and
/// builds the seek cache as playback advances.
#[derive(Debug)]
pub struct ReplayPlayback {
    replay: ReplayFile,
    snapshots: SnapshotCache,
}

impl ReplayPlayback {
    pub fn new(replay: ReplayFile) -> Self {
        Self::with_snapshot_interval(replay, SNAPSHOT_INTERVAL_SECONDS)
    }

    pub fn with_snapshot_interval(replay: ReplayFile, interval_secs: u32) -> Self {
        let interval = snapshot_interval_ticks(replay.update_rate, interval_secs);
        let snapshots = SnapshotCache::new(
            replay.initial_frame,
            replay.initial_frame_data.clone(),
            interval,
        );
        Self { replay, snapshots }
    }

    pub fn replay(&self) -> &ReplayFile {
        &self.replay
    }

    pub fn start_frame(&self) -> u32 {
        self.replay.initial_frame
    }

    pub fn length(&self) -> u32 {
        self.replay.length_in_frames
    }

    pub fn end_frame(&self) -> u32 {
        self.replay.end_frame()
    }

    pub fn is_finished(&self, frame: u32) -> bool {
        frame >= self.end_frame()
    }

    /// Recorded commands to apply on `frame`.
    pub fn inputs_at(&self, frame: u32) -> &[InputRecord] {
        self.replay.inputs.at_frame(frame)
    }

    pub fn on_step(&mut self, frame: &dyn SimulationFrame) -> bool {
        self.snapshots.offer(frame.number(), || frame.serialize())
    }

    /// Closest cached state at or before `target`, clamped to the replay range.
    /// The caller restores it and simulates forward to `target`.
    pub fn seek_point(&self, target: u32) -> Option<(u32, &[u8])> {
        let target = target.clamp(self.start_frame(), self.end_frame());
        self.snapshots.nearest_before(target)
    }

    pub fn snapshots(&self) -> &SnapshotCache {
        &self.snapshots
    }
}
