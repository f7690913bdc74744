//! End-of-match results document submitted to the results service.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sim::SimulationFrame;

/// Team value of a player in free-for-all matches.
pub const NO_TEAM: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamResult {
    pub team_id: u8,
    pub score: u32,
    pub rank: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResult {
    pub player_index: u8,
    pub player_id: String,
    pub nickname: String,
    pub stars: u8,
    pub team: i32,
    pub rank: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub match_id: Uuid,
    /// RFC 3339, UTC.
    pub timestamp: String,
    pub is_team_mode: bool,
    pub teams: Vec<TeamResult>,
    pub players: Vec<PlayerResult>,
}

impl MatchResult {
    pub fn from_frame(frame: &dyn SimulationFrame, now: DateTime<Utc>) -> Self {
        let players: Vec<_> = (0..frame.player_table_len())
            .filter_map(|i| frame.player(i))
            .filter(|slot| !slot.is_spectator)
            .take(frame.real_player_count() as usize)
            .map(|slot| (frame.player_stars(slot.player), slot))
            .collect();

        let mut team_scores: BTreeMap<u8, u32> = BTreeMap::new();
        for (stars, slot) in &players {
            *team_scores.entry(slot.team).or_default() += u32::from(*stars);
        }
        team_scores.retain(|_, score| *score > 0);
        let is_team_mode = frame.rules().teams_enabled && team_scores.len() > 1;

        let (teams, players) = if is_team_mode {
            let team_ranks: BTreeMap<u8, u32> = team_scores
                .keys()
                .copied()
                .zip(competition_ranks(&team_scores.values().copied().collect::<Vec<_>>()))
                .collect();
            // teams without stars share last place
            let unranked = team_ranks.len() as u32 + 1;
            let teams = team_scores
                .iter()
                .map(|(&team_id, &score)| TeamResult {
                    team_id,
                    score,
                    rank: team_ranks.get(&team_id).copied().unwrap_or(unranked),
                })
                .collect();
            let players = players
                .into_iter()
                .map(|(stars, slot)| PlayerResult {
                    player_index: slot.player,
                    rank: team_ranks.get(&slot.team).copied().unwrap_or(unranked),
                    team: i32::from(slot.team),
                    player_id: slot.user_id,
                    nickname: slot.nickname,
                    stars,
                })
                .collect();
            (teams, players)
        } else {
            let stars: Vec<u32> = players.iter().map(|(s, _)| u32::from(*s)).collect();
            let ranks = competition_ranks(&stars);
            let players = players
                .into_iter()
                .zip(ranks)
                .map(|((stars, slot), rank)| PlayerResult {
                    player_index: slot.player,
                    player_id: slot.user_id,
                    nickname: slot.nickname,
                    stars,
                    team: NO_TEAM,
                    rank,
                })
                .collect();
            (Vec::new(), players)
        };

        Self {
            match_id: Uuid::new_v4(),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            is_team_mode,
            teams,
            players,
        }
    }
}

/// Results are only submitted for decided matches, and only by the host.
pub fn should_submit(frame: &dyn SimulationFrame) -> bool {
    frame.has_winner() && frame.host_is_local()
}

/// Standard competition ranking ("1224"): higher scores rank first, equal
/// scores share a rank, and the next distinct score skips past the tie.
/// Output is aligned with `scores`.
pub fn competition_ranks(scores: &[u32]) -> Vec<u32> {
    scores
        .iter()
        .map(|score| 1 + scores.iter().filter(|other| *other > score).count() as u32)
        .collect()
}
