//! Match replay capture, persistence and playback.

pub mod cache;
pub mod codec;
pub mod error;
pub mod file;
pub mod input;
pub mod playback;
pub mod recorder;

pub use cache::SnapshotCache;
pub use error::ReplayError;
pub use file::{ReplayConfigs, ReplayFile, ReplayPlayer};
pub use input::{InputLog, InputRecord};
pub use playback::ReplayPlayback;
pub use recorder::ReplayRecorder;

pub const MAGIC: [u8; 4] = *b"MVLR";
pub const FORMAT_VERSION: u8 = 1;
pub const FILE_EXTENSION: &str = "mvlreplay";

pub const MAX_RECORDED_PLAYERS: usize = 10;

/// Winner value for a match that ended without a decision.
pub const NO_WINNER: i8 = -1;

/// Seconds of simulation time between two seek snapshots.
pub const SNAPSHOT_INTERVAL_SECONDS: u32 = 5;

/// Snapshot interval in ticks for a simulation running at `update_rate`.
pub fn snapshot_interval_ticks(update_rate: u32, interval_secs: u32) -> u32 {
    update_rate.saturating_mul(interval_secs).max(1)
}
