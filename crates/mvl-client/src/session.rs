use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};

use mvl_common::directory::RoomDirectory;
use mvl_common::props::{IntProperties, RoomFlag, RoomProperties};
use mvl_common::replay::{ReplayConfigs, ReplayRecorder, NO_WINNER};
use mvl_common::results::{self, MatchResult};
use mvl_common::room::RoomRecord;
use mvl_common::sim::{GamePhase, PlayerRef, SimulationFrame};

use crate::config::ClientConfig;
use crate::matchmaking::{Delay, MatchmakingError, QuickplayMatcher, TokioDelay};
use crate::network::{LobbyError, LobbyEvent, LobbyService};
use crate::replay_store::ReplayStore;
use crate::results_client::ResultsClient;

/// Everything a session needs, passed in explicitly.
pub struct SessionContext {
    pub config: ClientConfig,
    pub lobby: Arc<dyn LobbyService>,
    pub directory: Arc<RwLock<RoomDirectory>>,
    pub delay: Arc<dyn Delay>,
    pub results: Option<ResultsClient>,
}

impl SessionContext {
    pub fn new(
        config: ClientConfig,
        lobby: Arc<dyn LobbyService>,
        directory: Arc<RwLock<RoomDirectory>>,
    ) -> Self {
        Self {
            config,
            lobby,
            directory,
            delay: Arc::new(TokioDelay),
            results: None,
        }
    }

    pub fn with_delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_results(mut self, results: ResultsClient) -> Self {
        self.results = Some(results);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Authenticating,
    ConnectingToMaster,
    JoiningLobby,
    InLobby,
    Joining,
    InRoom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged {
        old: ConnectionState,
        new: ConnectionState,
    },
    Error(String),
    ReplaySaved(PathBuf),
}

/// Lifecycle notifications from the running simulation.
pub enum SimulationEvent<'a> {
    RecordingStarted {
        frame: &'a dyn SimulationFrame,
        configs: ReplayConfigs,
    },
    InputApplied {
        frame: u32,
        player: PlayerRef,
        payload: Vec<u8>,
    },
    StepCompleted {
        frame: &'a dyn SimulationFrame,
    },
    Resynced {
        frame: &'a dyn SimulationFrame,
        configs: ReplayConfigs,
    },
    GameEnded {
        frame: &'a dyn SimulationFrame,
        winner: i8,
    },
    GameDestroyed {
        frame: &'a dyn SimulationFrame,
    },
    RulesChanged {
        frame: &'a dyn SimulationFrame,
    },
    GameStateChanged {
        frame: &'a dyn SimulationFrame,
    },
    PluginDisconnect {
        reason: String,
    },
    PlayerAdded {
        frame: &'a dyn SimulationFrame,
        player: PlayerRef,
    },
    PlayerRemoved {
        frame: &'a dyn SimulationFrame,
        player: PlayerRef,
    },
}

/// What the caller should do with the simulation after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    Continue,
    ShutdownSimulation,
}

/// Drives connect -> lobby -> room, and turns simulation lifecycle events
/// into replay recording, replay saves and results submissions.
pub struct SessionOrchestrator {
    ctx: SessionContext,
    state: ConnectionState,
    events: broadcast::Sender<SessionEvent>,
    room: Option<RoomRecord>,
    recorder: ReplayRecorder,
    store: ReplayStore,
    last_region: Option<String>,
}

impl SessionOrchestrator {
    pub fn new(ctx: SessionContext) -> Self {
        let (events, _) = broadcast::channel(64);
        let recorder = ReplayRecorder::new(ctx.config.replays_enabled);
        let store = ReplayStore::with_limit(ctx.config.temp_replay_dir(), ctx.config.max_temp_replays);
        let last_region = ctx.config.region.clone();
        Self {
            ctx,
            state: ConnectionState::Disconnected,
            events,
            room: None,
            recorder,
            store,
            last_region,
        }
    }

    pub fn with_store(mut self, store: ReplayStore) -> Self {
        self.store = store;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn room(&self) -> Option<&RoomRecord> {
        self.room.as_ref()
    }

    pub fn recorder(&self) -> &ReplayRecorder {
        &self.recorder
    }

    pub fn last_saved_replay(&self) -> Option<&Path> {
        self.store.last_saved_path()
    }

    pub fn last_region(&self) -> Option<&str> {
        self.last_region.as_deref()
    }

    fn set_state(&mut self, new: ConnectionState) {
        let old = self.state;
        if old == new {
            return;
        }
        tracing::debug!(?old, ?new, "session state");
        self.state = new;
        let _ = self.events.send(SessionEvent::StateChanged { old, new });
    }

    fn report(&self, message: String) {
        tracing::warn!(%message, "session error");
        let _ = self.events.send(SessionEvent::Error(message));
    }

    // -- Connection --

    /// Connect to the lobby and join it. Without an explicit region the last
    /// used one is reused.
    pub async fn connect(&mut self, region: Option<String>) -> Result<(), LobbyError> {
        self.ctx.directory.write().await.clear();
        self.room = None;

        self.set_state(ConnectionState::Authenticating);
        let wanted = region.or_else(|| self.last_region.clone());
        let connected = match self.ctx.lobby.connect(wanted).await {
            Ok(region) => region,
            Err(e) => return Err(self.fail_connect(e)),
        };
        self.set_state(ConnectionState::ConnectingToMaster);
        tracing::info!(region = %connected, "connected");
        self.last_region = Some(connected);

        self.set_state(ConnectionState::JoiningLobby);
        if let Err(e) = self.ctx.lobby.join_lobby().await {
            return Err(self.fail_connect(e));
        }
        self.set_state(ConnectionState::InLobby);
        Ok(())
    }

    fn fail_connect(&mut self, e: LobbyError) -> LobbyError {
        self.report(e.to_string());
        self.set_state(ConnectionState::Disconnected);
        e
    }

    pub async fn disconnect(&mut self) {
        self.ctx.lobby.disconnect().await;
        self.ctx.directory.write().await.clear();
        self.room = None;
        self.set_state(ConnectionState::Disconnected);
    }

    pub async fn leave_lobby(&mut self) -> Result<(), LobbyError> {
        self.ctx.lobby.leave_lobby().await?;
        self.ctx.directory.write().await.clear();
        Ok(())
    }

    pub async fn handle_lobby_event(&mut self, event: LobbyEvent) -> SessionAction {
        match event {
            LobbyEvent::Directory(change) => {
                tracing::trace!(?change, "room list changed");
                SessionAction::Continue
            }
            LobbyEvent::RoomListSynced { rooms } => {
                tracing::debug!(rooms, "room list synced");
                SessionAction::Continue
            }
            LobbyEvent::CommandRejected { code, message } => {
                self.report(format!("{message} (code {})", code.short_code()));
                SessionAction::Continue
            }
            LobbyEvent::RoomPropertiesChanged(properties) => {
                if let Some(room) = self.room.as_mut() {
                    room.properties.merge(&properties);
                }
                SessionAction::Continue
            }
            LobbyEvent::Disconnected { reason } => {
                tracing::info!(%reason, "disconnected");
                self.report(reason);
                self.ctx.directory.write().await.clear();
                self.room = None;
                self.set_state(ConnectionState::Disconnected);
                SessionAction::ShutdownSimulation
            }
        }
    }

    /// Handle lobby events until the first room list batch has been applied,
    /// so quickplay sees the rooms that already exist. Returns `false` when
    /// `limit` passes first.
    pub async fn wait_for_room_list(
        &mut self,
        events: &mut broadcast::Receiver<LobbyEvent>,
        limit: Duration,
    ) -> Result<bool, LobbyError> {
        let deadline = tokio::time::sleep(limit);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => return Ok(false),
                event = events.recv() => match event {
                    Ok(LobbyEvent::RoomListSynced { rooms }) => {
                        tracing::debug!(rooms, "room list received");
                        return Ok(true);
                    }
                    Ok(event) => {
                        if self.handle_lobby_event(event).await == SessionAction::ShutdownSimulation {
                            return Err(LobbyError::Disconnected);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "lobby events lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return Err(LobbyError::Disconnected),
                },
            }
        }
    }

    // -- Rooms --

    fn matcher(&self) -> QuickplayMatcher {
        QuickplayMatcher::new(
            self.ctx.lobby.clone(),
            self.ctx.directory.clone(),
            self.ctx.config.nickname.as_str(),
        )
        .with_delay(self.ctx.delay.clone())
        .with_retry_policy(
            self.ctx.config.max_quickplay_attempts,
            self.ctx.config.quickplay_retry_delay,
        )
    }

    fn entered(
        &mut self,
        result: Result<RoomRecord, MatchmakingError>,
    ) -> Result<RoomRecord, MatchmakingError> {
        match &result {
            Ok(room) => {
                tracing::info!(room = %room.name, "joined room");
                self.room = Some(room.clone());
                self.set_state(ConnectionState::InRoom);
            }
            Err(e) => {
                self.report(format!("{e} (code {})", e.short_code()));
                self.set_state(ConnectionState::InLobby);
            }
        }
        result
    }

    pub async fn quickplay(&mut self, max_players: u8) -> Result<RoomRecord, MatchmakingError> {
        self.set_state(ConnectionState::Joining);
        let result = self.matcher().find_or_create_room(max_players).await;
        self.entered(result)
    }

    pub async fn create_private_room(
        &mut self,
        max_players: u8,
    ) -> Result<RoomRecord, MatchmakingError> {
        self.set_state(ConnectionState::Joining);
        let result = self.matcher().create_private_room(max_players).await;
        self.entered(result)
    }

    /// Join a room by code. A code from another region reconnects through
    /// [`connect`](Self::connect) first, so the directory reset and the
    /// lobby join happen the same way as for a fresh connection.
    pub async fn join_by_code(&mut self, code: &str) -> Result<RoomRecord, MatchmakingError> {
        let mut matcher = self.matcher();
        let (code, switch_to) = match matcher.resolve_code(code).await {
            Ok(resolved) => resolved,
            Err(e) => return self.entered(Err(e)),
        };
        if let Some(region) = switch_to {
            tracing::info!(%region, room = %code, "switching region to join room");
            self.connect(Some(region)).await?;
        }

        self.set_state(ConnectionState::Joining);
        let result = matcher.join_code(&code).await;
        self.entered(result)
    }

    pub async fn leave_room(&mut self) -> Result<(), LobbyError> {
        self.ctx.lobby.leave_room().await?;
        self.room = None;
        self.set_state(ConnectionState::InLobby);
        Ok(())
    }

    // -- Simulation --

    pub async fn handle_simulation(&mut self, event: SimulationEvent<'_>) -> SessionAction {
        match event {
            SimulationEvent::RecordingStarted { frame, configs } => {
                self.recorder.start(frame, configs);
            }
            SimulationEvent::InputApplied {
                frame,
                player,
                payload,
            } => {
                self.recorder.record_input(frame, player, payload);
            }
            SimulationEvent::StepCompleted { frame } => {
                self.recorder.on_step(frame);
            }
            SimulationEvent::Resynced { frame, configs } => {
                self.recorder.on_resync(frame, configs);
            }
            SimulationEvent::GameEnded { frame, winner } => {
                self.save_replay(frame, winner);
                self.submit_results(frame);
            }
            SimulationEvent::GameDestroyed { frame } => {
                self.save_replay(frame, NO_WINNER);
            }
            SimulationEvent::RulesChanged { frame } => {
                self.publish_room_properties(frame).await;
            }
            SimulationEvent::GameStateChanged { frame } => {
                self.publish_game_started(frame).await;
            }
            SimulationEvent::PluginDisconnect { reason } => {
                tracing::info!(%reason, "disconnected by server plugin");
                self.report(reason);
                return SessionAction::ShutdownSimulation;
            }
            SimulationEvent::PlayerAdded { frame, player } => {
                if let Some(slot) = frame.player(player) {
                    tracing::info!(nickname = %slot.nickname, user_id = %slot.user_id, "player joined the game");
                }
            }
            SimulationEvent::PlayerRemoved { frame, player } => {
                if let Some(slot) = frame.player(player) {
                    tracing::info!(nickname = %slot.nickname, user_id = %slot.user_id, "player left the game");
                }
            }
        }
        SessionAction::Continue
    }

    /// Turning replays on mid-match starts recording from `frame` if the
    /// match is under way. Turning them off drops the current recording.
    pub fn set_replays_enabled(
        &mut self,
        enabled: bool,
        frame: Option<&dyn SimulationFrame>,
        configs: ReplayConfigs,
    ) {
        self.recorder.set_enabled(enabled);
        if !enabled {
            return;
        }
        if let Some(frame) = frame {
            let phase = frame.phase();
            if phase >= GamePhase::Starting && phase < GamePhase::Ended {
                self.recorder.start(frame, configs);
            }
        }
    }

    fn save_replay(&mut self, frame: &dyn SimulationFrame, winner: i8) {
        let Some(replay) = self.recorder.finish(frame, winner, Utc::now().timestamp()) else {
            return;
        };
        if let Some(path) = self.store.save(&replay) {
            let _ = self.events.send(SessionEvent::ReplaySaved(path));
        }
    }

    fn submit_results(&self, frame: &dyn SimulationFrame) {
        let Some(client) = &self.ctx.results else {
            return;
        };
        if !results::should_submit(frame) {
            tracing::debug!("not submitting results: no winner or not host");
            return;
        }
        let _ = client.submit(MatchResult::from_frame(frame, Utc::now()));
    }

    /// Host-only: mirror the rules into the room's lobby properties. The
    /// quickplay bit is carried over from the current room state.
    async fn publish_room_properties(&mut self, frame: &dyn SimulationFrame) {
        if !frame.host_is_local() {
            return;
        }
        let Some(room) = self.room.as_mut() else {
            return;
        };

        let rules = frame.rules();
        let mut flags = room.properties.flags();
        flags.set(RoomFlag::GameStarted, frame.phase() != GamePhase::PreGameRoom);
        flags.set(RoomFlag::CustomPowerups, rules.custom_powerups_enabled);
        flags.set(RoomFlag::Teams, rules.teams_enabled);
        flags.set(RoomFlag::DrawOnTimeUp, rules.draw_on_time_up);

        let update = RoomProperties {
            host_name: Some(self.ctx.config.nickname.clone()),
            int_properties: Some(IntProperties {
                star_requirement: rules.stars_to_win,
                coin_requirement: rules.coins_for_powerup,
                lives: rules.lives,
                timer_seconds: rules.timer_seconds,
            }),
            bool_properties: Some(flags),
            stage_guid: Some(rules.stage_id),
        };
        room.properties.merge(&update);
        if let Err(e) = self.ctx.lobby.set_room_properties(update).await {
            tracing::warn!(error = %e, "could not update room properties");
        }
    }

    /// Host-only: flip the game-started bit, leaving every other bit alone.
    async fn publish_game_started(&mut self, frame: &dyn SimulationFrame) {
        if !frame.host_is_local() || self.state != ConnectionState::InRoom {
            return;
        }
        let Some(room) = self.room.as_mut() else {
            return;
        };

        room.properties
            .set_flag(RoomFlag::GameStarted, frame.phase() != GamePhase::PreGameRoom);
        let update = RoomProperties {
            bool_properties: room.properties.bool_properties,
            ..RoomProperties::default()
        };
        if let Err(e) = self.ctx.lobby.set_room_properties(update).await {
            tracing::warn!(error = %e, "could not update room properties");
        }
    }
}
