use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use mvl_common::directory::RoomDirectory;
use mvl_common::props::{RoomFlag, RoomProperties};
use mvl_common::protocol::ErrorCode;
use mvl_common::room::{EnterRoomArgs, RoomOptions, RoomRecord};
use mvl_common::room_code::RoomCode;

use crate::config::{DEFAULT_MAX_PLAYERS, MAX_QUICKPLAY_ATTEMPTS, QUICKPLAY_RETRY_DELAY};
use crate::network::{LobbyError, LobbyService};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchmakingError {
    #[error("join rejected: {0}")]
    JoinRejected(ErrorCode),
    #[error("invalid room code")]
    InvalidRoomCode,
    #[error("lobby unreachable: {0}")]
    Transport(String),
}

impl MatchmakingError {
    /// Numeric code shown to the player.
    pub fn short_code(&self) -> i16 {
        match self {
            MatchmakingError::JoinRejected(code) => code.short_code(),
            MatchmakingError::InvalidRoomCode => ErrorCode::GameDoesNotExist.short_code(),
            MatchmakingError::Transport(_) => ErrorCode::InternalError.short_code(),
        }
    }
}

impl From<LobbyError> for MatchmakingError {
    fn from(err: LobbyError) -> Self {
        match err {
            LobbyError::RoomGone => MatchmakingError::JoinRejected(ErrorCode::GameDoesNotExist),
            LobbyError::Rejected(code) => MatchmakingError::JoinRejected(code),
            LobbyError::Disconnected => MatchmakingError::Transport("disconnected".into()),
            LobbyError::Transport(reason) => MatchmakingError::Transport(reason),
        }
    }
}

/// Sleep between quickplay rounds. Injected so tests run without real time.
#[async_trait]
pub trait Delay: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    Idle,
    Searching,
    Joining,
    Creating,
    Done,
    Failed,
}

/// Finds a joinable quickplay room or creates one.
pub struct QuickplayMatcher {
    lobby: Arc<dyn LobbyService>,
    directory: Arc<RwLock<RoomDirectory>>,
    delay: Arc<dyn Delay>,
    nickname: String,
    max_attempts: u32,
    retry_delay: Duration,
    phase: MatchPhase,
}

impl QuickplayMatcher {
    pub fn new(
        lobby: Arc<dyn LobbyService>,
        directory: Arc<RwLock<RoomDirectory>>,
        nickname: impl Into<String>,
    ) -> Self {
        Self {
            lobby,
            directory,
            delay: Arc::new(TokioDelay),
            nickname: nickname.into(),
            max_attempts: MAX_QUICKPLAY_ATTEMPTS,
            retry_delay: QUICKPLAY_RETRY_DELAY,
            phase: MatchPhase::Idle,
        }
    }

    pub fn with_delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_retry_policy(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    fn enter(&mut self, phase: MatchPhase) {
        tracing::debug!(from = ?self.phase, to = ?phase, "quickplay phase");
        self.phase = phase;
    }

    fn settle<T>(&mut self, result: Result<T, MatchmakingError>) -> Result<T, MatchmakingError> {
        self.enter(if result.is_ok() {
            MatchPhase::Done
        } else {
            MatchPhase::Failed
        });
        result
    }

    /// Join an open quickplay room of size `max_players`, or create one.
    ///
    /// A room that disappears between listing and joining is retried up to
    /// the attempt limit. Any other rejection ends the search. When no room is
    /// listed, or every attempt found a vanished room, a new quickplay room is
    /// created.
    pub async fn find_or_create_room(
        &mut self,
        max_players: u8,
    ) -> Result<RoomRecord, MatchmakingError> {
        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                self.delay.sleep(self.retry_delay).await;
            }
            self.enter(MatchPhase::Searching);

            let candidate = self
                .directory
                .read()
                .await
                .available_quickplay_room(max_players)
                .cloned();
            let Some(room) = candidate else {
                tracing::info!(max_players, "no open quickplay room, creating one");
                break;
            };

            self.enter(MatchPhase::Joining);
            tracing::info!(room = %room.name, attempt = attempt + 1, "joining quickplay room");
            let args = EnterRoomArgs::join(room.name.as_str(), RoomOptions::new(max_players));
            match self.lobby.join_room(args).await {
                Ok(joined) => return self.settle(Ok(joined)),
                Err(LobbyError::RoomGone) => {
                    tracing::warn!(room = %room.name, attempt = attempt + 1, "quickplay room vanished");
                }
                Err(e) => {
                    tracing::warn!(room = %room.name, error = %e, "quickplay join failed");
                    return self.settle(Err(e.into()));
                }
            }
        }

        let result = self.create_quickplay_room(max_players).await;
        self.settle(result)
    }

    async fn create_quickplay_room(&mut self, max_players: u8) -> Result<RoomRecord, MatchmakingError> {
        self.enter(MatchPhase::Creating);
        let mut properties = RoomProperties::defaults(self.nickname.as_str());
        properties.set_flag(RoomFlag::QuickPlay, true);
        properties.set_flag(RoomFlag::Teams, true);
        self.create(max_players, properties).await
    }

    /// Create a private room, advertised like a quickplay room but without
    /// the quickplay bit.
    pub async fn create_private_room(
        &mut self,
        max_players: u8,
    ) -> Result<RoomRecord, MatchmakingError> {
        self.enter(MatchPhase::Creating);
        let properties = RoomProperties::defaults(self.nickname.as_str());
        let result = self.create(max_players, properties).await;
        self.settle(result)
    }

    async fn create(
        &self,
        max_players: u8,
        properties: RoomProperties,
    ) -> Result<RoomRecord, MatchmakingError> {
        let code = self.new_room_code().await;
        let mut options = RoomOptions::new(max_players);
        options.properties = properties;
        options.advertise_lobby_properties();

        tracing::info!(room = %code, max_players, "creating room");
        Ok(self
            .lobby
            .create_room(EnterRoomArgs::join(code.as_str(), options))
            .await?)
    }

    async fn new_room_code(&self) -> RoomCode {
        let regions = self.lobby.regions().await;
        let index = match self.lobby.current_region().await {
            Some(region) => regions.index_of(&region),
            None => None,
        };
        if index.is_none() {
            tracing::warn!("current region is not in the known list, using the first prefix");
        }
        RoomCode::generate_now(index)
    }

    /// Validate a typed room code. Alongside the code, returns the region to
    /// switch to when the room lives outside the current one.
    pub async fn resolve_code(
        &mut self,
        input: &str,
    ) -> Result<(RoomCode, Option<String>), MatchmakingError> {
        let regions = self.lobby.regions().await;
        let code = match RoomCode::parse(input, regions.len()) {
            Ok(code) => code,
            Err(e) => {
                tracing::info!(input, error = %e, "rejected room code");
                return self.settle(Err(MatchmakingError::InvalidRoomCode));
            }
        };

        let current = self.lobby.current_region().await;
        let switch_to = regions
            .get(code.region_index())
            .filter(|target| !current.is_some_and(|c| c.eq_ignore_ascii_case(&target.code)))
            .map(|target| target.code.clone());
        Ok((code, switch_to))
    }

    /// Join a room by its already validated code in the current region.
    pub async fn join_code(&mut self, code: &RoomCode) -> Result<RoomRecord, MatchmakingError> {
        self.enter(MatchPhase::Joining);
        let args = EnterRoomArgs::join(code.as_str(), RoomOptions::new(DEFAULT_MAX_PLAYERS));
        let result = self.lobby.join_room(args).await.map_err(Into::into);
        self.settle(result)
    }

    /// Join a room by its code, switching region first when the code belongs
    /// to another one. Malformed codes are rejected before any request.
    pub async fn join_by_code(&mut self, input: &str) -> Result<RoomRecord, MatchmakingError> {
        let (code, switch_to) = self.resolve_code(input).await?;

        if let Some(region) = switch_to {
            tracing::info!(%region, room = %code, "switching region to join room");
            self.directory.write().await.clear();
            let switched = match self.lobby.connect(Some(region)).await {
                Ok(_) => self.lobby.join_lobby().await,
                Err(e) => Err(e),
            };
            if let Err(e) = switched {
                return self.settle(Err(e.into()));
            }
        }

        self.join_code(&code).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use mvl_common::region::RegionList;

    #[derive(Default)]
    struct FakeLobby {
        join_results: Mutex<VecDeque<Result<RoomRecord, LobbyError>>>,
        joins: Mutex<Vec<EnterRoomArgs>>,
        creates: Mutex<Vec<EnterRoomArgs>>,
        connects: Mutex<Vec<Option<String>>>,
        lobby_joins: Mutex<u32>,
        lobby_join_error: Option<LobbyError>,
        region: Mutex<Option<String>>,
    }

    impl FakeLobby {
        fn with_joins(results: Vec<Result<RoomRecord, LobbyError>>) -> Self {
            let lobby = Self::default();
            *lobby.join_results.lock().unwrap() = results.into();
            *lobby.region.lock().unwrap() = Some("eu".into());
            lobby
        }
    }

    #[async_trait]
    impl LobbyService for FakeLobby {
        async fn connect(&self, region: Option<String>) -> Result<String, LobbyError> {
            self.connects.lock().unwrap().push(region.clone());
            let region = region.unwrap_or_else(|| "eu".into());
            *self.region.lock().unwrap() = Some(region.clone());
            Ok(region)
        }
        async fn join_lobby(&self) -> Result<(), LobbyError> {
            *self.lobby_joins.lock().unwrap() += 1;
            match &self.lobby_join_error {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            }
        }
        async fn leave_lobby(&self) -> Result<(), LobbyError> {
            Ok(())
        }
        async fn join_room(&self, args: EnterRoomArgs) -> Result<RoomRecord, LobbyError> {
            let name = args.room_name.clone();
            self.joins.lock().unwrap().push(args);
            self.join_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(RoomRecord::new(name, 1, 10)))
        }
        async fn create_room(&self, args: EnterRoomArgs) -> Result<RoomRecord, LobbyError> {
            let room = RoomRecord::new(args.room_name.clone(), 1, args.options.max_players);
            self.creates.lock().unwrap().push(args);
            Ok(room)
        }
        async fn set_room_properties(&self, _: RoomProperties) -> Result<(), LobbyError> {
            Ok(())
        }
        async fn leave_room(&self) -> Result<(), LobbyError> {
            Ok(())
        }
        async fn disconnect(&self) {}
        async fn current_region(&self) -> Option<String> {
            self.region.lock().unwrap().clone()
        }
        async fn regions(&self) -> RegionList {
            RegionList::from_codes(["asia", "eu", "us"])
        }
    }

    #[derive(Default)]
    struct CountingDelay {
        calls: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Delay for CountingDelay {
        async fn sleep(&self, duration: Duration) {
            self.calls.lock().unwrap().push(duration);
        }
    }

    fn quickplay_room(name: &str) -> RoomRecord {
        let mut room = RoomRecord::new(name, 2, 4);
        room.properties.set_flag(RoomFlag::QuickPlay, true);
        room
    }

    async fn directory_with(rooms: Vec<RoomRecord>) -> Arc<RwLock<RoomDirectory>> {
        let directory = Arc::new(RwLock::new(RoomDirectory::new()));
        directory.write().await.apply_update(rooms);
        directory
    }

    fn matcher(
        lobby: Arc<FakeLobby>,
        directory: Arc<RwLock<RoomDirectory>>,
        delay: Arc<CountingDelay>,
    ) -> QuickplayMatcher {
        QuickplayMatcher::new(lobby, directory, "Mario").with_delay(delay)
    }

    #[tokio::test]
    async fn test_no_room_creates_once_without_joining() {
        let lobby = Arc::new(FakeLobby::with_joins(vec![]));
        let delay = Arc::new(CountingDelay::default());
        let mut m = matcher(lobby.clone(), directory_with(vec![]).await, delay.clone());

        let room = m.find_or_create_room(4).await.unwrap();

        assert_eq!(lobby.joins.lock().unwrap().len(), 0);
        let creates = lobby.creates.lock().unwrap();
        assert_eq!(creates.len(), 1);
        assert_eq!(creates[0].room_name, room.name);
        // "eu" is index 1 of the sorted region list
        assert!(room.name.starts_with('C'));
        let props = &creates[0].options.properties;
        assert!(props.is_quick_play());
        assert!(props.flags().teams());
        assert_eq!(creates[0].options.lobby_properties.len(), 4);
        assert!(delay.calls.lock().unwrap().is_empty());
        assert_eq!(m.phase(), MatchPhase::Done);
    }

    #[tokio::test]
    async fn test_vanished_room_is_retried_until_join_succeeds() {
        let lobby = Arc::new(FakeLobby::with_joins(vec![
            Err(LobbyError::RoomGone),
            Err(LobbyError::RoomGone),
            Ok(quickplay_room("BCDFGHJK")),
        ]));
        let delay = Arc::new(CountingDelay::default());
        let directory = directory_with(vec![quickplay_room("BCDFGHJK")]).await;
        let mut m = matcher(lobby.clone(), directory, delay.clone());

        let room = m.find_or_create_room(4).await.unwrap();

        assert_eq!(room.name, "BCDFGHJK");
        assert_eq!(lobby.joins.lock().unwrap().len(), 3);
        assert!(lobby.creates.lock().unwrap().is_empty());
        assert_eq!(
            *delay.calls.lock().unwrap(),
            vec![QUICKPLAY_RETRY_DELAY, QUICKPLAY_RETRY_DELAY]
        );
    }

    #[tokio::test]
    async fn test_exhausted_attempts_fall_through_to_one_create() {
        let lobby = Arc::new(FakeLobby::with_joins(vec![
            Err(LobbyError::RoomGone),
            Err(LobbyError::RoomGone),
            Err(LobbyError::RoomGone),
        ]));
        let delay = Arc::new(CountingDelay::default());
        let directory = directory_with(vec![quickplay_room("BCDFGHJK")]).await;
        let mut m = matcher(lobby.clone(), directory, delay.clone());

        m.find_or_create_room(4).await.unwrap();

        assert_eq!(lobby.joins.lock().unwrap().len(), 3);
        assert_eq!(lobby.creates.lock().unwrap().len(), 1);
        assert_eq!(delay.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_other_rejection_is_terminal() {
        let lobby = Arc::new(FakeLobby::with_joins(vec![Err(LobbyError::Rejected(
            ErrorCode::GameFull,
        ))]));
        let delay = Arc::new(CountingDelay::default());
        let directory = directory_with(vec![quickplay_room("BCDFGHJK")]).await;
        let mut m = matcher(lobby.clone(), directory, delay.clone());

        let err = m.find_or_create_room(4).await.unwrap_err();

        assert_eq!(err, MatchmakingError::JoinRejected(ErrorCode::GameFull));
        assert_eq!(err.short_code(), 32765);
        assert!(lobby.creates.lock().unwrap().is_empty());
        assert_eq!(m.phase(), MatchPhase::Failed);
    }

    #[tokio::test]
    async fn test_room_of_other_size_is_ignored() {
        let lobby = Arc::new(FakeLobby::with_joins(vec![]));
        let delay = Arc::new(CountingDelay::default());
        let directory = directory_with(vec![quickplay_room("BCDFGHJK")]).await;
        let mut m = matcher(lobby.clone(), directory, delay);

        m.find_or_create_room(8).await.unwrap();

        assert!(lobby.joins.lock().unwrap().is_empty());
        assert_eq!(lobby.creates.lock().unwrap()[0].options.max_players, 8);
    }

    #[tokio::test]
    async fn test_unknown_region_uses_first_prefix() {
        let lobby = Arc::new(FakeLobby::with_joins(vec![]));
        *lobby.region.lock().unwrap() = Some("mars".into());
        let mut m = matcher(
            lobby.clone(),
            directory_with(vec![]).await,
            Arc::new(CountingDelay::default()),
        );

        let room = m.find_or_create_room(4).await.unwrap();
        assert!(room.name.starts_with('B'));
    }

    #[tokio::test]
    async fn test_private_room_has_no_quickplay_bit() {
        let lobby = Arc::new(FakeLobby::with_joins(vec![]));
        let mut m = matcher(
            lobby.clone(),
            directory_with(vec![]).await,
            Arc::new(CountingDelay::default()),
        );

        m.create_private_room(6).await.unwrap();
        let creates = lobby.creates.lock().unwrap();
        assert!(!creates[0].options.properties.is_quick_play());
        assert_eq!(creates[0].options.lobby_properties.len(), 4);
    }

    #[tokio::test]
    async fn test_invalid_code_is_rejected_before_any_request() {
        let lobby = Arc::new(FakeLobby::with_joins(vec![]));
        let mut m = matcher(
            lobby.clone(),
            directory_with(vec![]).await,
            Arc::new(CountingDelay::default()),
        );

        for input in ["BCDFGHJ", "BCDFGHJKL", "BCDFGHJA", "ZCDFGHJK"] {
            let err = m.join_by_code(input).await.unwrap_err();
            assert_eq!(err, MatchmakingError::InvalidRoomCode, "{input}");
        }
        assert!(lobby.joins.lock().unwrap().is_empty());
        assert!(lobby.connects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_join_by_code_switches_region() {
        let lobby = Arc::new(FakeLobby::with_joins(vec![]));
        let directory = directory_with(vec![RoomRecord::new("CDFGHJKL", 1, 4)]).await;
        let mut m = matcher(lobby.clone(), directory.clone(), Arc::new(CountingDelay::default()));

        // 'D' is index 2: "us"
        let room = m.join_by_code("dfghjklm").await.unwrap();

        assert_eq!(room.name, "DFGHJKLM");
        assert_eq!(*lobby.connects.lock().unwrap(), vec![Some("us".to_string())]);
        assert_eq!(*lobby.lobby_joins.lock().unwrap(), 1);
        assert_eq!(directory.read().await.room_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_lobby_join_after_switch_aborts_join() {
        let lobby = Arc::new(FakeLobby {
            lobby_join_error: Some(LobbyError::Disconnected),
            ..FakeLobby::with_joins(vec![])
        });
        let mut m = matcher(
            lobby.clone(),
            directory_with(vec![]).await,
            Arc::new(CountingDelay::default()),
        );

        let err = m.join_by_code("DFGHJKLM").await.unwrap_err();

        assert!(matches!(err, MatchmakingError::Transport(_)));
        assert!(lobby.joins.lock().unwrap().is_empty());
        assert_eq!(m.phase(), MatchPhase::Failed);
    }

    #[tokio::test]
    async fn test_resolve_code_reports_region_switch() {
        let lobby = Arc::new(FakeLobby::with_joins(vec![]));
        let mut m = matcher(
            lobby.clone(),
            directory_with(vec![]).await,
            Arc::new(CountingDelay::default()),
        );

        let (code, switch_to) = m.resolve_code("BCDFGHJK").await.unwrap();
        assert_eq!(code.as_str(), "BCDFGHJK");
        assert_eq!(switch_to.as_deref(), Some("asia"));

        let (_, switch_to) = m.resolve_code("cdfghjkl").await.unwrap();
        assert!(switch_to.is_none());
        assert!(lobby.connects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_join_by_code_in_current_region_stays_connected() {
        let lobby = Arc::new(FakeLobby::with_joins(vec![]));
        let mut m = matcher(
            lobby.clone(),
            directory_with(vec![]).await,
            Arc::new(CountingDelay::default()),
        );

        m.join_by_code("CDFGHJKL").await.unwrap();
        assert!(lobby.connects.lock().unwrap().is_empty());
        assert_eq!(lobby.joins.lock().unwrap()[0].room_name, "CDFGHJKL");
    }
}
