//! Read-only view of the deterministic simulation.
//!
//! The simulation engine itself lives outside this crate. Everything the
//! matchmaking and replay code needs from it goes through [`SimulationFrame`].

use serde::{Deserialize, Serialize};

/// Slot index of a player in the simulation's player table.
pub type PlayerRef = u8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GamePhase {
    PreGameRoom,
    Starting,
    Playing,
    Ended,
}

/// Ruleset of the running match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRules {
    pub stars_to_win: u8,
    pub coins_for_powerup: u8,
    /// Zero disables lives.
    pub lives: u8,
    pub timer_seconds: u16,
    pub teams_enabled: bool,
    pub custom_powerups_enabled: bool,
    pub draw_on_time_up: bool,
    pub stage_id: String,
}

impl GameRules {
    pub fn is_lives_enabled(&self) -> bool {
        self.lives > 0
    }
}

/// One entry in the simulation's player table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSlot {
    pub player: PlayerRef,
    pub user_id: String,
    pub nickname: String,
    pub team: u8,
    pub is_spectator: bool,
}

/// A player-controlled entity as found while scanning the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerEntity {
    pub player: PlayerRef,
    pub stars: u8,
    pub lives: u8,
}

pub trait SimulationFrame {
    fn number(&self) -> u32;

    /// Simulation ticks per second.
    fn update_rate(&self) -> u32;

    /// Full serialized state of this frame.
    fn serialize(&self) -> Vec<u8>;

    fn phase(&self) -> GamePhase;

    fn rules(&self) -> GameRules;

    /// Number of non-spectating players in the match.
    fn real_player_count(&self) -> u8;

    /// Size of the player table, spectators included.
    fn player_table_len(&self) -> u8;

    fn player(&self, player: PlayerRef) -> Option<PlayerSlot>;

    /// Player entities in the engine's scan order.
    fn player_entities(&self) -> Vec<PlayerEntity>;

    fn host_is_local(&self) -> bool;

    /// Current star count per player slot, as shown on the results screen.
    fn player_stars(&self, player: PlayerRef) -> u8 {
        self.player_entities()
            .into_iter()
            .find(|e| e.player == player)
            .map(|e| e.stars)
            .unwrap_or(0)
    }

    /// Whether the match was decided, i.e. a results screen should show a winner.
    fn has_winner(&self) -> bool;
}
