use std::io::{Read, Write};

use crate::sim::{GameRules, PlayerRef};

use super::codec::*;
use super::error::ReplayError;
use super::input::InputLog;
use super::{FORMAT_VERSION, MAGIC, MAX_RECORDED_PLAYERS, NO_WINNER};

const RULE_TEAMS: u8 = 1 << 0;
const RULE_CUSTOM_POWERUPS: u8 = 1 << 1;
const RULE_DRAW_ON_TIME_UP: u8 = 1 << 2;

/// A recorded player with their final star count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayPlayer {
    pub player: PlayerRef,
    pub nickname: String,
    pub team: u8,
    pub stars: u8,
}

/// Opaque engine configuration needed to rebuild the simulation session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayConfigs {
    pub runtime_config: Vec<u8>,
    pub session_config: Vec<u8>,
}

/// A complete replay, as persisted to disk.
///
/// On-disk order: header (magic, version, frame range, ruleset, engine
/// configs), player identity table, score trailer (stars, winner), initial
/// frame, input stream. Blobs are gzip-compressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayFile {
    pub initial_frame: u32,
    pub length_in_frames: u32,
    pub update_rate: u32,
    /// Unix seconds.
    pub created_at: i64,
    pub rules: GameRules,
    pub configs: ReplayConfigs,
    pub players: Vec<ReplayPlayer>,
    /// Winning team, or [`NO_WINNER`].
    pub winner: i8,
    pub initial_frame_data: Vec<u8>,
    pub inputs: InputLog,
}

impl ReplayFile {
    pub fn end_frame(&self) -> u32 {
        self.initial_frame.saturating_add(self.length_in_frames)
    }

    pub fn has_winner(&self) -> bool {
        self.winner != NO_WINNER
    }

    /// Encode the whole replay. Returns the number of bytes written.
    pub fn write_to(&self, w: &mut dyn Write) -> Result<u64, ReplayError> {
        let mut buf: Vec<u8> = Vec::new();
        self.encode(&mut buf)?;
        w.write_all(&buf)?;
        w.flush()?;
        Ok(buf.len() as u64)
    }

    fn encode(&self, w: &mut dyn Write) -> Result<(), ReplayError> {
        if self.players.len() > MAX_RECORDED_PLAYERS {
            return Err(ReplayError::malformed(format!(
                "{} players exceeds the maximum of {MAX_RECORDED_PLAYERS}",
                self.players.len()
            )));
        }

        w.write_all(&MAGIC)?;
        write_u8(w, FORMAT_VERSION)?;

        write_u32_le(w, self.initial_frame)?;
        write_u32_le(w, self.length_in_frames)?;
        write_u32_le(w, self.update_rate)?;
        write_i64_le(w, self.created_at)?;
        encode_rules(w, &self.rules)?;
        write_compressed(w, &self.configs.runtime_config)?;
        write_compressed(w, &self.configs.session_config)?;

        write_u8(w, self.players.len() as u8)?;
        for player in &self.players {
            write_u8(w, player.player)?;
            write_u8(w, player.team)?;
            write_str(w, &player.nickname)?;
        }

        for player in &self.players {
            write_u8(w, player.stars)?;
        }
        write_i8(w, self.winner)?;

        write_compressed(w, &self.initial_frame_data)?;
        write_compressed(w, &self.inputs.to_bytes()?)?;
        Ok(())
    }

    pub fn read_from(r: &mut dyn Read) -> Result<Self, ReplayError> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(ReplayError::InvalidMagic);
        }
        let version = read_u8(r)?;
        if version != FORMAT_VERSION {
            return Err(ReplayError::UnsupportedVersion { found: version });
        }

        let initial_frame = read_u32_le(r)?;
        let length_in_frames = read_u32_le(r)?;
        let update_rate = read_u32_le(r)?;
        let created_at = read_i64_le(r)?;
        let rules = decode_rules(r)?;
        let configs = ReplayConfigs {
            runtime_config: read_compressed(r)?,
            session_config: read_compressed(r)?,
        };

        let player_count = read_u8(r)? as usize;
        if player_count > MAX_RECORDED_PLAYERS {
            return Err(ReplayError::malformed(format!(
                "player count {player_count} exceeds the maximum of {MAX_RECORDED_PLAYERS}"
            )));
        }
        let mut players = Vec::with_capacity(player_count);
        for _ in 0..player_count {
            players.push(ReplayPlayer {
                player: read_u8(r)?,
                team: read_u8(r)?,
                nickname: read_str(r)?,
                stars: 0,
            });
        }

        for player in &mut players {
            player.stars = read_u8(r)?;
        }
        let winner = read_i8(r)?;

        let initial_frame_data = read_compressed(r)?;
        let inputs = InputLog::from_bytes(&read_compressed(r)?)?;

        Ok(Self {
            initial_frame,
            length_in_frames,
            update_rate,
            created_at,
            rules,
            configs,
            players,
            winner,
            initial_frame_data,
            inputs,
        })
    }

    pub fn from_bytes(mut data: &[u8]) -> Result<Self, ReplayError> {
        Self::read_from(&mut data)
    }
}

fn encode_rules(w: &mut dyn Write, rules: &GameRules) -> Result<(), ReplayError> {
    write_u8(w, rules.stars_to_win)?;
    write_u8(w, rules.coins_for_powerup)?;
    write_u8(w, rules.lives)?;
    write_u16_le(w, rules.timer_seconds)?;

    let mut flags = 0;
    if rules.teams_enabled {
        flags |= RULE_TEAMS;
    }
    if rules.custom_powerups_enabled {
        flags |= RULE_CUSTOM_POWERUPS;
    }
    if rules.draw_on_time_up {
        flags |= RULE_DRAW_ON_TIME_UP;
    }
    write_u8(w, flags)?;
    write_str(w, &rules.stage_id)
}

fn decode_rules(r: &mut dyn Read) -> Result<GameRules, ReplayError> {
    let stars_to_win = read_u8(r)?;
    let coins_for_powerup = read_u8(r)?;
    let lives = read_u8(r)?;
    let timer_seconds = read_u16_le(r)?;
    let flags = read_u8(r)?;
    Ok(GameRules {
        stars_to_win,
        coins_for_powerup,
        lives,
        timer_seconds,
        teams_enabled: flags & RULE_TEAMS != 0,
        custom_powerups_enabled: flags & RULE_CUSTOM_POWERUPS != 0,
        draw_on_time_up: flags & RULE_DRAW_ON_TIME_UP != 0,
        stage_id: read_str(r)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::input::InputRecord;

    fn sample() -> ReplayFile {
        let mut inputs = InputLog::new();
        inputs.push(InputRecord {
            frame: 121,
            player: 0,
            payload: vec![1, 2, 3],
        });
        ReplayFile {
            initial_frame: 120,
            length_in_frames: 600,
            update_rate: 60,
            created_at: 1_700_000_000,
            rules: GameRules {
                stars_to_win: 10,
                coins_for_powerup: 8,
                lives: 3,
                timer_seconds: 300,
                teams_enabled: true,
                custom_powerups_enabled: false,
                draw_on_time_up: true,
                stage_id: "stage-grassland".into(),
            },
            configs: ReplayConfigs {
                runtime_config: b"runtime".to_vec(),
                session_config: b"session".to_vec(),
            },
            players: vec![
                ReplayPlayer {
                    player: 0,
                    nickname: "Mario".into(),
                    team: 0,
                    stars: 5,
                },
                ReplayPlayer {
                    player: 2,
                    nickname: "Luigi".into(),
                    team: 1,
                    stars: 3,
                },
            ],
            winner: 0,
            initial_frame_data: vec![9; 2048],
            inputs,
        }
    }

    #[test]
    fn test_written_file_reads_back() {
        let replay = sample();
        let mut buf: Vec<u8> = Vec::new();
        let written = replay.write_to(&mut buf).unwrap();
        assert_eq!(written as usize, buf.len());
        assert_eq!(ReplayFile::from_bytes(&buf).unwrap(), replay);
    }

    #[test]
    fn test_sections_are_in_fixed_order() {
        let mut buf: Vec<u8> = Vec::new();
        sample().write_to(&mut buf).unwrap();
        assert_eq!(&buf[..4], b"MVLR");
        assert_eq!(buf[4], FORMAT_VERSION);
        let nickname = buf.windows(5).position(|w| w == b"Mario").unwrap();
        let stage = buf.windows(15).position(|w| w == b"stage-grassland").unwrap();
        assert!(stage < nickname, "ruleset precedes the player table");
    }

    #[test]
    fn test_bad_magic() {
        let mut buf: Vec<u8> = Vec::new();
        sample().write_to(&mut buf).unwrap();
        buf[0] = b'X';
        assert!(matches!(ReplayFile::from_bytes(&buf), Err(ReplayError::InvalidMagic)));
    }

    #[test]
    fn test_unsupported_version() {
        let mut buf: Vec<u8> = Vec::new();
        sample().write_to(&mut buf).unwrap();
        buf[4] = FORMAT_VERSION + 1;
        assert!(matches!(
            ReplayFile::from_bytes(&buf),
            Err(ReplayError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_truncated_file_fails() {
        let mut buf: Vec<u8> = Vec::new();
        sample().write_to(&mut buf).unwrap();
        buf.truncate(buf.len() - 10);
        assert!(ReplayFile::from_bytes(&buf).is_err());
    }

    #[test]
    fn test_too_many_players_rejected() {
        let mut replay = sample();
        let extra = replay.players[0].clone();
        replay.players = vec![extra; MAX_RECORDED_PLAYERS + 1];
        assert!(replay.write_to(&mut Vec::<u8>::new()).is_err());
    }

    #[test]
    fn test_end_frame_and_winner() {
        let mut replay = sample();
        assert_eq!(replay.end_frame(), 720);
        assert!(replay.has_winner());
        replay.winner = NO_WINNER;
        assert!(!replay.has_winner());
    }
}
