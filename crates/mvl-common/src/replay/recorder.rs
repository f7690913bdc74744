use crate::sim::{GamePhase, GameRules, PlayerRef, SimulationFrame};

use super::cache::SnapshotCache;
use super::file::{ReplayConfigs, ReplayFile, ReplayPlayer};
use super::input::{InputLog, InputRecord};
use super::{snapshot_interval_ticks, MAX_RECORDED_PLAYERS, SNAPSHOT_INTERVAL_SECONDS};

const FALLBACK_NICKNAME: &str = "noname";

/// Identity of a player captured when recording starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPlayer {
    pub player: PlayerRef,
    pub nickname: String,
    pub team: u8,
}

#[derive(Debug)]
struct Recording {
    initial_frame: u32,
    update_rate: u32,
    rules: GameRules,
    configs: ReplayConfigs,
    players: Vec<RecordedPlayer>,
    inputs: InputLog,
    snapshots: SnapshotCache,
}

/// Captures a match as initial frame + input stream, with periodic seek
/// snapshots.
///
/// Idle until [`start`](Self::start); [`finish`](Self::finish) and
/// [`discard`](Self::discard) both return it to idle.
#[derive(Debug)]
pub struct ReplayRecorder {
    enabled: bool,
    interval_secs: u32,
    recording: Option<Recording>,
}

impl Default for ReplayRecorder {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ReplayRecorder {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            interval_secs: SNAPSHOT_INTERVAL_SECONDS,
            recording: None,
        }
    }

    pub fn with_snapshot_interval(mut self, interval_secs: u32) -> Self {
        self.interval_secs = interval_secs;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Disabling drops any recording in progress.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.discard();
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    pub fn start_frame(&self) -> Option<u32> {
        self.recording.as_ref().map(|r| r.initial_frame)
    }

    pub fn players(&self) -> &[RecordedPlayer] {
        self.recording
            .as_ref()
            .map(|r| r.players.as_slice())
            .unwrap_or(&[])
    }

    pub fn snapshots(&self) -> Option<&SnapshotCache> {
        self.recording.as_ref().map(|r| &r.snapshots)
    }

    pub fn input_count(&self) -> usize {
        self.recording.as_ref().map_or(0, |r| r.inputs.len())
    }

    /// Begin recording at `frame`, replacing any recording in progress.
    /// Returns false when replays are disabled.
    pub fn start(&mut self, frame: &dyn SimulationFrame, configs: ReplayConfigs) -> bool {
        if !self.enabled {
            return false;
        }

        let initial_frame = frame.number();
        let update_rate = frame.update_rate();
        let interval = snapshot_interval_ticks(update_rate, self.interval_secs);
        let players = collect_players(frame);

        tracing::info!(
            initial_frame,
            players = players.len(),
            interval_ticks = interval,
            "replay recording started"
        );

        self.recording = Some(Recording {
            initial_frame,
            update_rate,
            rules: frame.rules(),
            configs,
            players,
            inputs: InputLog::new(),
            snapshots: SnapshotCache::new(initial_frame, frame.serialize(), interval),
        });
        true
    }

    /// Append a raw input command. Commands before the start frame or older
    /// than the last recorded one are dropped.
    pub fn record_input(&mut self, frame: u32, player: PlayerRef, payload: Vec<u8>) -> bool {
        let Some(recording) = self.recording.as_mut() else {
            return false;
        };
        if frame < recording.initial_frame {
            return false;
        }
        if recording.inputs.last_frame().is_some_and(|last| frame < last) {
            return false;
        }
        recording.inputs.push(InputRecord {
            frame,
            player,
            payload,
        });
        true
    }

    /// Step-completed hook. Stores a seek snapshot when `frame` lands on an
    /// interval boundary that has not been captured yet.
    pub fn on_step(&mut self, frame: &dyn SimulationFrame) -> bool {
        match self.recording.as_mut() {
            Some(recording) => recording.snapshots.offer(frame.number(), || frame.serialize()),
            None => false,
        }
    }

    /// A resync moves the input base, so recording restarts from `frame`
    /// while the match is in active play.
    pub fn on_resync(&mut self, frame: &dyn SimulationFrame, configs: ReplayConfigs) -> bool {
        if frame.phase() != GamePhase::Playing {
            return false;
        }
        tracing::debug!(frame = frame.number(), "simulation resynced, restarting replay");
        self.start(frame, configs)
    }

    pub fn discard(&mut self) {
        if self.recording.take().is_some() {
            tracing::debug!("replay recording discarded");
        }
    }

    /// True when [`finish`](Self::finish) would produce a replay.
    pub fn has_pending_replay(&self) -> bool {
        self.enabled
            && self
                .recording
                .as_ref()
                .is_some_and(|r| !r.inputs.is_empty())
    }

    /// Stop recording and assemble the replay. Returns `None` when replays
    /// are disabled or no input was recorded. The recorder is idle afterwards
    /// either way.
    pub fn finish(
        &mut self,
        frame: &dyn SimulationFrame,
        winner: i8,
        created_at: i64,
    ) -> Option<ReplayFile> {
        let recording = self.recording.take()?;
        if !self.enabled {
            tracing::debug!("replays disabled, nothing to save");
            return None;
        }
        if recording.inputs.is_empty() {
            tracing::debug!("no inputs recorded, nothing to save");
            return None;
        }

        let rules = frame.rules();
        let entities = frame.player_entities();
        let players = recording
            .players
            .into_iter()
            .map(|p| {
                let stars = entities
                    .iter()
                    .find(|e| e.player == p.player)
                    .map(|e| {
                        if e.lives > 0 || !rules.is_lives_enabled() {
                            e.stars
                        } else {
                            0
                        }
                    })
                    .unwrap_or(0);
                ReplayPlayer {
                    player: p.player,
                    nickname: p.nickname,
                    team: p.team,
                    stars,
                }
            })
            .collect();

        let initial_frame_data = recording
            .snapshots
            .get(0)
            .map(<[u8]>::to_vec)
            .unwrap_or_default();

        Some(ReplayFile {
            initial_frame: recording.initial_frame,
            length_in_frames: frame.number().saturating_sub(recording.initial_frame),
            update_rate: recording.update_rate,
            created_at,
            rules: recording.rules,
            configs: recording.configs,
            players,
            winner,
            initial_frame_data,
            inputs: recording.inputs,
        })
    }
}

/// Non-spectating players in ascending slot order, capped at
/// [`MAX_RECORDED_PLAYERS`].
fn collect_players(frame: &dyn SimulationFrame) -> Vec<RecordedPlayer> {
    let wanted = (frame.real_player_count() as usize).min(MAX_RECORDED_PLAYERS);
    let mut players = Vec::with_capacity(wanted);
    for player in 0..frame.player_table_len() {
        if players.len() >= wanted {
            break;
        }
        let Some(slot) = frame.player(player) else {
            continue;
        };
        if slot.is_spectator {
            continue;
        }
        players.push(RecordedPlayer {
            player,
            nickname: sanitize_nickname(&slot.nickname),
            team: slot.team,
        });
    }
    players
}

fn sanitize_nickname(raw: &str) -> String {
    let cleaned: String = raw.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        FALLBACK_NICKNAME.to_string()
    } else {
        cleaned.to_string()
    }
}
