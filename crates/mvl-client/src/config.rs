use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

pub const DEFAULT_SERVER: &str = "127.0.0.1:9876";
pub const DEFAULT_RESULTS_URL: &str = "http://localhost:3000/match-results";

pub const MAX_QUICKPLAY_ATTEMPTS: u32 = 3;
pub const QUICKPLAY_RETRY_DELAY: Duration = Duration::from_millis(3000);
pub const DEFAULT_MAX_PLAYERS: u8 = 10;
pub const DEFAULT_MAX_TEMP_REPLAYS: usize = 50;

/// MVL Client - matchmaking and replay capture for multiplayer matches
#[derive(Parser, Debug)]
#[command(name = "mvl", version, about)]
pub struct Args {
    /// Lobby server address to connect to
    #[arg(short = 's', long, default_value = DEFAULT_SERVER)]
    pub server: String,

    /// Player nickname
    #[arg(short, long)]
    pub name: Option<String>,

    /// Preferred region code (e.g. "eu")
    #[arg(short, long)]
    pub region: Option<String>,

    /// Directory replays are written to
    #[arg(long, default_value = "replays")]
    pub replay_dir: PathBuf,

    /// Disable replay recording
    #[arg(long)]
    pub no_replays: bool,

    /// Number of temporary replays to keep (0 behaves like 1)
    #[arg(long, default_value_t = DEFAULT_MAX_TEMP_REPLAYS)]
    pub max_temp_replays: usize,

    /// Endpoint match results are posted to
    #[arg(long, default_value = DEFAULT_RESULTS_URL)]
    pub results_url: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Join an open quickplay room or create one
    Quickplay {
        /// Room size to match on
        #[arg(short, long, default_value_t = DEFAULT_MAX_PLAYERS)]
        players: u8,
    },
    /// Create a private room
    Create {
        #[arg(short, long, default_value_t = DEFAULT_MAX_PLAYERS)]
        players: u8,
    },
    /// Join a room by its 8-character code
    Join { code: String },
    /// Print the header of a saved replay
    ReplayInfo { path: PathBuf },
}

/// Runtime settings shared by the session components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub server: String,
    pub nickname: String,
    pub region: Option<String>,
    pub replay_dir: PathBuf,
    pub replays_enabled: bool,
    pub max_temp_replays: usize,
    pub results_url: String,
    pub max_quickplay_attempts: u32,
    pub quickplay_retry_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            nickname: "Player".to_string(),
            region: None,
            replay_dir: PathBuf::from("replays"),
            replays_enabled: true,
            max_temp_replays: DEFAULT_MAX_TEMP_REPLAYS,
            results_url: DEFAULT_RESULTS_URL.to_string(),
            max_quickplay_attempts: MAX_QUICKPLAY_ATTEMPTS,
            quickplay_retry_delay: QUICKPLAY_RETRY_DELAY,
        }
    }
}

impl From<&Args> for ClientConfig {
    fn from(args: &Args) -> Self {
        Self {
            server: args.server.clone(),
            nickname: args.name.clone().unwrap_or_else(|| "Player".to_string()),
            region: args.region.clone(),
            replay_dir: args.replay_dir.clone(),
            replays_enabled: !args.no_replays,
            max_temp_replays: args.max_temp_replays,
            results_url: args.results_url.clone(),
            ..Self::default()
        }
    }
}

impl ClientConfig {
    /// Directory for replays that are subject to the temporary quota.
    pub fn temp_replay_dir(&self) -> PathBuf {
        self.replay_dir.join("temp")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_into_config() {
        let args = Args::parse_from([
            "mvl",
            "--name",
            "Mario",
            "--region",
            "eu",
            "--no-replays",
            "quickplay",
            "--players",
            "4",
        ]);
        assert_eq!(args.command, Command::Quickplay { players: 4 });

        let config = ClientConfig::from(&args);
        assert_eq!(config.nickname, "Mario");
        assert_eq!(config.region.as_deref(), Some("eu"));
        assert!(!config.replays_enabled);
        assert_eq!(config.max_quickplay_attempts, 3);
        assert_eq!(config.temp_replay_dir(), PathBuf::from("replays").join("temp"));
    }

    #[test]
    fn test_join_takes_code() {
        let args = Args::parse_from(["mvl", "join", "bcdfghjk"]);
        assert_eq!(
            args.command,
            Command::Join {
                code: "bcdfghjk".into()
            }
        );
        assert_eq!(args.server, DEFAULT_SERVER);
    }
}
