use serde::{Deserialize, Serialize};

use crate::props::{RoomProperties, LOBBY_PROPERTIES};

/// A room as reported by the lobby backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRecord {
    pub name: String,
    pub player_count: u8,
    pub max_players: u8,
    #[serde(default)]
    pub properties: RoomProperties,
    #[serde(default = "default_true")]
    pub is_visible: bool,
    #[serde(default = "default_true")]
    pub is_open: bool,
    /// Set when the backend reports the room has left the listing.
    #[serde(default)]
    pub removed_from_list: bool,
}

fn default_true() -> bool {
    true
}

impl RoomRecord {
    pub fn new(name: impl Into<String>, player_count: u8, max_players: u8) -> Self {
        Self {
            name: name.into(),
            player_count,
            max_players,
            properties: RoomProperties::default(),
            is_visible: true,
            is_open: true,
            removed_from_list: false,
        }
    }

    pub fn is_quick_play(&self) -> bool {
        self.properties.is_quick_play()
    }

    pub fn has_space(&self) -> bool {
        self.player_count < self.max_players
    }

    pub fn is_full(&self) -> bool {
        !self.has_space()
    }

    pub fn has_game_started(&self) -> bool {
        self.properties.has_game_started()
    }

    /// A quickplay room that can take one more player and has the requested size.
    pub fn accepts_quick_play(&self, max_players: u8) -> bool {
        self.is_quick_play() && self.has_space() && self.max_players == max_players
    }
}

/// Options for a room that is about to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomOptions {
    pub max_players: u8,
    pub is_visible: bool,
    pub publish_user_id: bool,
    pub properties: RoomProperties,
    /// Property keys the backend should expose in lobby listings.
    pub lobby_properties: Vec<String>,
}

impl RoomOptions {
    pub fn new(max_players: u8) -> Self {
        Self {
            max_players,
            is_visible: true,
            publish_user_id: false,
            properties: RoomProperties::default(),
            lobby_properties: Vec::new(),
        }
    }

    pub fn advertise_lobby_properties(&mut self) {
        self.lobby_properties = LOBBY_PROPERTIES.iter().map(|k| k.to_string()).collect();
    }
}

/// Which lobby a room belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lobby {
    #[default]
    Default,
    Named(String),
}

/// Arguments for entering a room, whether joining or creating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnterRoomArgs {
    /// Always an uppercase room code once the request is sent.
    pub room_name: String,
    pub lobby: Lobby,
    pub options: RoomOptions,
}

impl EnterRoomArgs {
    pub fn join(room_name: impl Into<String>, options: RoomOptions) -> Self {
        Self {
            room_name: room_name.into().to_ascii_uppercase(),
            lobby: Lobby::Default,
            options,
        }
    }
}
