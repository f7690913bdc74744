use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::{broadcast, RwLock};

use mvl_client::config::{Args, ClientConfig, Command};
use mvl_client::network::{LobbyConnection, LobbyService};
use mvl_client::results_client::ResultsClient;
use mvl_client::session::{SessionAction, SessionContext, SessionOrchestrator};
use mvl_common::directory::RoomDirectory;
use mvl_common::replay::ReplayFile;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mvl_client=debug,mvl_common=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = ClientConfig::from(&args);

    let request = match args.command {
        Command::ReplayInfo { path } => return print_replay_info(&path),
        Command::Quickplay { players } => RoomRequest::Quickplay(players),
        Command::Create { players } => RoomRequest::Create(players),
        Command::Join { code } => RoomRequest::Join(code),
    };
    run_online(config, request).await
}

/// How long quickplay waits for the first room list before matching.
const ROOM_LIST_WAIT: Duration = Duration::from_secs(3);

enum RoomRequest {
    Quickplay(u8),
    Create(u8),
    Join(String),
}

fn print_replay_info(path: &Path) -> anyhow::Result<()> {
    let mut reader = BufReader::new(File::open(path)?);
    let replay = ReplayFile::read_from(&mut reader)?;

    println!("{}", path.display());
    println!(
        "  frames {}..{} ({} at {} ticks/s)",
        replay.initial_frame,
        replay.end_frame(),
        replay.length_in_frames,
        replay.update_rate
    );
    println!("  stage {}", replay.rules.stage_id);
    println!("  inputs {}", replay.inputs.len());
    if replay.has_winner() {
        println!("  winner {}", replay.winner);
    } else {
        println!("  no winner");
    }
    for player in &replay.players {
        println!(
            "  [{}] {} team {} stars {}",
            player.player, player.nickname, player.team, player.stars
        );
    }
    Ok(())
}

async fn run_online(config: ClientConfig, request: RoomRequest) -> anyhow::Result<()> {
    let directory = Arc::new(RwLock::new(RoomDirectory::new()));
    let connection = Arc::new(LobbyConnection::new(
        config.server.clone(),
        config.nickname.clone(),
        directory.clone(),
    ));
    let mut lobby_events = connection.subscribe();
    let lobby: Arc<dyn LobbyService> = connection;

    let results = ResultsClient::new(config.results_url.clone());
    let ctx = SessionContext::new(config, lobby, directory).with_results(results);
    let mut session = SessionOrchestrator::new(ctx);

    session.connect(None).await?;

    let joined = match request {
        RoomRequest::Quickplay(players) => {
            if !session.wait_for_room_list(&mut lobby_events, ROOM_LIST_WAIT).await? {
                tracing::warn!("no room list from the lobby yet, matching anyway");
            }
            session.quickplay(players).await
        }
        RoomRequest::Create(players) => session.create_private_room(players).await,
        RoomRequest::Join(code) => session.join_by_code(&code).await,
    };
    let room = match joined {
        Ok(room) => room,
        Err(e) => {
            session.disconnect().await;
            anyhow::bail!("matchmaking failed: {} (code {})", e, e.short_code());
        }
    };
    println!(
        "In room {} ({}/{} players)",
        room.name, room.player_count, room.max_players
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
            event = lobby_events.recv() => match event {
                Ok(event) => {
                    if session.handle_lobby_event(event).await == SessionAction::ShutdownSimulation {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "lobby events lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    session.disconnect().await;
    Ok(())
}
