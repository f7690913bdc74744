use std::collections::HashMap;

use crate::room::RoomRecord;

/// What changed in the visible room list after an update batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryChange {
    Created(RoomRecord),
    Updated(RoomRecord),
    Removed(String),
}

/// Filters applied when listing visible rooms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoomFilter {
    pub hide_full: bool,
    pub hide_in_progress: bool,
}

/// The locally known set of rooms, built from directory-update notifications.
///
/// Player-created rooms are kept by name for display. Quickplay rooms live in
/// a separate list that is only ever searched, never shown.
#[derive(Debug, Default)]
pub struct RoomDirectory {
    rooms: HashMap<String, RoomRecord>,
    quickplay_rooms: Vec<RoomRecord>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one batch of room reports and return the visible-list changes.
    pub fn apply_update(&mut self, batch: Vec<RoomRecord>) -> Vec<DirectoryChange> {
        let mut changes = Vec::new();

        for room in batch {
            tracing::debug!(
                room = %room.name,
                quickplay = room.is_quick_play(),
                players = room.player_count,
                max_players = room.max_players,
                removed = room.removed_from_list,
                "directory update"
            );

            if room.is_quick_play() {
                self.apply_quickplay(room);
                continue;
            }

            let tracked = self.rooms.contains_key(&room.name);
            match (tracked, room.removed_from_list) {
                (true, true) => {
                    self.rooms.remove(&room.name);
                    changes.push(DirectoryChange::Removed(room.name));
                }
                (true, false) => {
                    self.rooms.insert(room.name.clone(), room.clone());
                    changes.push(DirectoryChange::Updated(room));
                }
                (false, false) => {
                    self.rooms.insert(room.name.clone(), room.clone());
                    changes.push(DirectoryChange::Created(room));
                }
                (false, true) => {}
            }
        }

        tracing::debug!(quickplay_rooms = self.quickplay_rooms.len(), "quickplay cache size");
        changes
    }

    fn apply_quickplay(&mut self, room: RoomRecord) {
        if room.removed_from_list {
            self.quickplay_rooms.retain(|r| r.name != room.name);
            return;
        }
        match self.quickplay_rooms.iter_mut().find(|r| r.name == room.name) {
            Some(existing) => *existing = room,
            None => self.quickplay_rooms.push(room),
        }
    }

    /// First cached quickplay room, in insertion order, with space left and the
    /// requested size.
    pub fn available_quickplay_room(&self, max_players: u8) -> Option<&RoomRecord> {
        let found = self
            .quickplay_rooms
            .iter()
            .find(|r| r.accepts_quick_play(max_players));

        match found {
            Some(room) => tracing::debug!(room = %room.name, "found matching quickplay room"),
            None => tracing::debug!(
                max_players,
                candidates = self.quickplay_rooms.len(),
                "no matching quickplay room"
            ),
        }
        found
    }

    pub fn get(&self, name: &str) -> Option<&RoomRecord> {
        self.rooms.get(name)
    }

    /// Visible rooms sorted by name, plus how many the filter hid.
    pub fn visible_rooms(&self, filter: RoomFilter) -> (Vec<&RoomRecord>, usize) {
        let mut shown = Vec::new();
        let mut hidden = 0;
        for room in self.rooms.values() {
            if (filter.hide_full && room.is_full())
                || (filter.hide_in_progress && room.has_game_started())
            {
                hidden += 1;
            } else {
                shown.push(room);
            }
        }
        shown.sort_by(|a, b| a.name.cmp(&b.name));
        (shown, hidden)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn quickplay_count(&self) -> usize {
        self.quickplay_rooms.len()
    }

    /// Forget everything. Directory state never survives a connection cycle.
    pub fn clear(&mut self) {
        self.rooms.clear();
        self.quickplay_rooms.clear();
    }
}
