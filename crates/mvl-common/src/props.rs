use serde::{Deserialize, Serialize};

pub const HOST_NAME: &str = "HostName";
pub const INT_PROPERTIES: &str = "IntProperties";
pub const BOOL_PROPERTIES: &str = "BoolProperties";
pub const STAGE_GUID: &str = "StageGuid";

/// Custom room properties that are advertised in lobby listings.
pub const LOBBY_PROPERTIES: [&str; 4] = [HOST_NAME, INT_PROPERTIES, BOOL_PROPERTIES, STAGE_GUID];

// -- Boolean flags --

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomFlag {
    GameStarted,
    CustomPowerups,
    Teams,
    DrawOnTimeUp,
    QuickPlay,
}

impl RoomFlag {
    pub const ALL: [RoomFlag; 5] = [
        RoomFlag::GameStarted,
        RoomFlag::CustomPowerups,
        RoomFlag::Teams,
        RoomFlag::DrawOnTimeUp,
        RoomFlag::QuickPlay,
    ];

    pub const fn bit(self) -> i32 {
        match self {
            RoomFlag::GameStarted => 1 << 0,
            RoomFlag::CustomPowerups => 1 << 1,
            RoomFlag::Teams => 1 << 2,
            RoomFlag::DrawOnTimeUp => 1 << 3,
            RoomFlag::QuickPlay => 1 << 4,
        }
    }
}

/// Packed boolean room settings, stored on the wire as a single integer.
///
/// Bits this build does not know about are carried through untouched; every
/// setter only ever flips its own bit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoolProperties(i32);

impl BoolProperties {
    pub const fn from_bits(bits: i32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> i32 {
        self.0
    }

    pub const fn get(self, flag: RoomFlag) -> bool {
        self.0 & flag.bit() != 0
    }

    pub fn set(&mut self, flag: RoomFlag, value: bool) {
        if value {
            self.0 |= flag.bit();
        } else {
            self.0 &= !flag.bit();
        }
    }

    pub fn with(mut self, flag: RoomFlag, value: bool) -> Self {
        self.set(flag, value);
        self
    }

    pub const fn game_started(self) -> bool {
        self.get(RoomFlag::GameStarted)
    }

    pub const fn teams(self) -> bool {
        self.get(RoomFlag::Teams)
    }

    pub const fn quick_play(self) -> bool {
        self.get(RoomFlag::QuickPlay)
    }
}

// -- Integer settings --

/// Packed integer room settings.
///
/// Layout (low to high): star requirement (8 bits), coin requirement (8 bits),
/// lives (4 bits), timer in seconds (12 bits).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub struct IntProperties {
    pub star_requirement: u8,
    pub coin_requirement: u8,
    pub lives: u8,
    pub timer_seconds: u16,
}

impl IntProperties {
    pub const MAX_LIVES: u8 = 0x0F;
    pub const MAX_TIMER_SECONDS: u16 = 0x0FFF;

    pub fn to_bits(self) -> i32 {
        let lives = self.lives.min(Self::MAX_LIVES) as u32;
        let timer = self.timer_seconds.min(Self::MAX_TIMER_SECONDS) as u32;
        let packed = self.star_requirement as u32
            | (self.coin_requirement as u32) << 8
            | lives << 16
            | timer << 20;
        packed as i32
    }

    pub fn from_bits(bits: i32) -> Self {
        let bits = bits as u32;
        Self {
            star_requirement: (bits & 0xFF) as u8,
            coin_requirement: ((bits >> 8) & 0xFF) as u8,
            lives: ((bits >> 16) & 0x0F) as u8,
            timer_seconds: ((bits >> 20) & 0x0FFF) as u16,
        }
    }
}

impl From<i32> for IntProperties {
    fn from(bits: i32) -> Self {
        Self::from_bits(bits)
    }
}

impl From<IntProperties> for i32 {
    fn from(props: IntProperties) -> Self {
        props.to_bits()
    }
}

// -- Property bag --

/// Custom properties attached to a room. Every field is optional because
/// lobby listings and partial updates only carry a subset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomProperties {
    #[serde(rename = "HostName", default, skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,
    #[serde(rename = "IntProperties", default, skip_serializing_if = "Option::is_none")]
    pub int_properties: Option<IntProperties>,
    #[serde(rename = "BoolProperties", default, skip_serializing_if = "Option::is_none")]
    pub bool_properties: Option<BoolProperties>,
    #[serde(rename = "StageGuid", default, skip_serializing_if = "Option::is_none")]
    pub stage_guid: Option<String>,
}

impl RoomProperties {
    /// Properties a freshly created room starts with.
    pub fn defaults(host_name: impl Into<String>) -> Self {
        Self {
            host_name: Some(host_name.into()),
            int_properties: Some(IntProperties {
                star_requirement: 10,
                coin_requirement: 8,
                lives: 0,
                timer_seconds: 0,
            }),
            bool_properties: Some(BoolProperties::default()),
            stage_guid: None,
        }
    }

    pub fn flags(&self) -> BoolProperties {
        self.bool_properties.unwrap_or_default()
    }

    pub fn is_quick_play(&self) -> bool {
        self.bool_properties.is_some_and(|b| b.quick_play())
    }

    pub fn has_game_started(&self) -> bool {
        self.bool_properties.is_some_and(|b| b.game_started())
    }

    /// Read-modify-write a single flag, keeping all other bits as they were.
    pub fn set_flag(&mut self, flag: RoomFlag, value: bool) {
        let mut flags = self.flags();
        flags.set(flag, value);
        self.bool_properties = Some(flags);
    }

    /// Apply a partial update: only fields present in `update` overwrite.
    pub fn merge(&mut self, update: &RoomProperties) {
        if let Some(name) = &update.host_name {
            self.host_name = Some(name.clone());
        }
        if let Some(ints) = update.int_properties {
            self.int_properties = Some(ints);
        }
        if let Some(bools) = update.bool_properties {
            self.bool_properties = Some(bools);
        }
        if let Some(stage) = &update.stage_guid {
            self.stage_guid = Some(stage.clone());
        }
    }
}
