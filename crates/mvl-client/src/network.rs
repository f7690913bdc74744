use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;

use mvl_common::directory::{DirectoryChange, RoomDirectory};
use mvl_common::props::RoomProperties;
use mvl_common::protocol::{
    deserialize_message, framed_transport, recv_message, send_message, serialize_message,
    ClientMessage, ErrorCode, ServerMessage,
};
use mvl_common::region::RegionList;
use mvl_common::room::{EnterRoomArgs, RoomRecord};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DISCONNECT_FLUSH: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LobbyError {
    #[error("room no longer exists")]
    RoomGone,
    #[error("rejected by lobby: {0}")]
    Rejected(ErrorCode),
    #[error("not connected to the lobby")]
    Disconnected,
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<ErrorCode> for LobbyError {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::GameDoesNotExist => LobbyError::RoomGone,
            other => LobbyError::Rejected(other),
        }
    }
}

/// Notifications pushed by the lobby outside of any request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobbyEvent {
    Directory(DirectoryChange),
    /// A room list batch was applied; `rooms` is the listed count after it.
    RoomListSynced { rooms: usize },
    RoomPropertiesChanged(RoomProperties),
    /// A command sent without waiting was refused.
    CommandRejected { code: ErrorCode, message: String },
    Disconnected { reason: String },
}

/// Operations the client issues against the lobby backend.
///
/// Requests that expect a reply suspend until the reply arrives. Callers
/// issue them one at a time.
#[async_trait]
pub trait LobbyService: Send + Sync {
    /// Connect (or reconnect) to the lobby, optionally pinned to `region`.
    /// Returns the region the backend placed us in.
    async fn connect(&self, region: Option<String>) -> Result<String, LobbyError>;
    async fn join_lobby(&self) -> Result<(), LobbyError>;
    async fn leave_lobby(&self) -> Result<(), LobbyError>;
    async fn join_room(&self, args: EnterRoomArgs) -> Result<RoomRecord, LobbyError>;
    async fn create_room(&self, args: EnterRoomArgs) -> Result<RoomRecord, LobbyError>;
    async fn set_room_properties(&self, properties: RoomProperties) -> Result<(), LobbyError>;
    async fn leave_room(&self) -> Result<(), LobbyError>;
    async fn disconnect(&self);
    async fn current_region(&self) -> Option<String>;
    async fn regions(&self) -> RegionList;
}

type PendingReply = Arc<Mutex<Option<oneshot::Sender<ServerMessage>>>>;

struct Link {
    outbound: mpsc::Sender<ClientMessage>,
    pending: PendingReply,
    region: String,
    regions: RegionList,
    tasks: [JoinHandle<()>; 2],
}

/// TCP connection to the lobby backend.
///
/// Directory updates are applied to the shared [`RoomDirectory`] by the
/// reader task; replies are routed to the single in-flight request.
pub struct LobbyConnection {
    addr: String,
    player_name: String,
    directory: Arc<RwLock<RoomDirectory>>,
    events: broadcast::Sender<LobbyEvent>,
    link: Mutex<Option<Link>>,
}

impl LobbyConnection {
    pub fn new(
        addr: impl Into<String>,
        player_name: impl Into<String>,
        directory: Arc<RwLock<RoomDirectory>>,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            addr: addr.into(),
            player_name: player_name.into(),
            directory,
            events,
            link: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LobbyEvent> {
        self.events.subscribe()
    }

    /// Handles of the live link. The link lock is released before any await
    /// on the network.
    async fn handles(&self) -> Result<(mpsc::Sender<ClientMessage>, PendingReply), LobbyError> {
        let link = self.link.lock().await;
        let link = link.as_ref().ok_or(LobbyError::Disconnected)?;
        Ok((link.outbound.clone(), link.pending.clone()))
    }

    async fn send(&self, msg: ClientMessage) -> Result<(), LobbyError> {
        let (outbound, _) = self.handles().await?;
        outbound.send(msg).await.map_err(|_| LobbyError::Disconnected)
    }

    /// Send `msg` and wait for the reply routed back by the reader task.
    async fn request(&self, msg: ClientMessage) -> Result<ServerMessage, LobbyError> {
        let (outbound, pending) = self.handles().await?;

        let (tx, rx) = oneshot::channel();
        *pending.lock().await = Some(tx);
        outbound.send(msg).await.map_err(|_| LobbyError::Disconnected)?;
        drop(outbound);

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(LobbyError::Disconnected),
            Err(_) => {
                pending.lock().await.take();
                Err(LobbyError::Transport("request timed out".into()))
            }
        }
    }

    async fn enter_room(&self, msg: ClientMessage) -> Result<RoomRecord, LobbyError> {
        match self.request(msg).await? {
            ServerMessage::RoomJoined { room } => Ok(room),
            ServerMessage::Error { code, message } => {
                tracing::debug!(%code, %message, "room request rejected");
                Err(code.into())
            }
            other => Err(unexpected(&other)),
        }
    }
}

#[async_trait]
impl LobbyService for LobbyConnection {
    async fn connect(&self, region: Option<String>) -> Result<String, LobbyError> {
        self.disconnect().await;

        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| LobbyError::Transport(e.to_string()))?;
        let mut transport = framed_transport(stream);

        let hello = ClientMessage::Hello {
            player_name: self.player_name.clone(),
            version: mvl_common::VERSION.to_string(),
            region,
        };
        send_message(&mut transport, &hello)
            .await
            .map_err(|e| LobbyError::Transport(e.to_string()))?;

        let (region, regions) = match recv_message::<ServerMessage>(&mut transport).await {
            Ok(Some(ServerMessage::Welcome {
                player_id,
                region,
                regions,
            })) => {
                tracing::info!(%player_id, %region, regions = regions.len(), "connected to lobby");
                (region, RegionList::new(regions))
            }
            Ok(Some(ServerMessage::HandshakeError { reason })) => {
                return Err(LobbyError::Transport(format!("handshake rejected: {reason}")));
            }
            Ok(Some(other)) => return Err(unexpected(&other)),
            Ok(None) => return Err(LobbyError::Disconnected),
            Err(e) => return Err(LobbyError::Transport(e.to_string())),
        };

        let (mut sink, mut stream) = transport.split();
        let (outbound, mut outbound_rx) = mpsc::channel::<ClientMessage>(64);
        let pending: PendingReply = Arc::new(Mutex::new(None));

        // Writer task: outbound -> TCP sink
        let writer = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                match serialize_message(&msg) {
                    Ok(bytes) => {
                        if sink.send(bytes).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("Failed to serialize client message: {}", e);
                    }
                }
            }
        });

        // Reader task: TCP stream -> directory / pending reply / events
        let reader = {
            let pending = pending.clone();
            let directory = self.directory.clone();
            let events = self.events.clone();
            tokio::spawn(async move {
                while let Some(Ok(frame)) = stream.next().await {
                    let msg = match deserialize_message::<ServerMessage>(&frame) {
                        Ok(msg) => msg,
                        Err(e) => {
                            tracing::warn!("Failed to parse server message: {}", e);
                            continue;
                        }
                    };
                    match msg {
                        ServerMessage::RoomListUpdate { rooms } => {
                            let (changes, listed) = {
                                let mut directory = directory.write().await;
                                let changes = directory.apply_update(rooms);
                                (changes, directory.room_count())
                            };
                            for change in changes {
                                let _ = events.send(LobbyEvent::Directory(change));
                            }
                            let _ = events.send(LobbyEvent::RoomListSynced { rooms: listed });
                        }
                        ServerMessage::RoomPropertiesChanged { properties } => {
                            let _ = events.send(LobbyEvent::RoomPropertiesChanged(properties));
                        }
                        ServerMessage::CommandRejected { code, message } => {
                            tracing::warn!(%code, %message, "lobby command rejected");
                            let _ = events.send(LobbyEvent::CommandRejected { code, message });
                        }
                        ServerMessage::RoomLeft => tracing::debug!("left room"),
                        ServerMessage::Pong => tracing::trace!("pong"),
                        reply @ (ServerMessage::LobbyJoined
                        | ServerMessage::RoomJoined { .. }
                        | ServerMessage::Error { .. }) => match pending.lock().await.take() {
                            Some(tx) => {
                                let _ = tx.send(reply);
                            }
                            None => tracing::warn!(?reply, "unsolicited lobby reply"),
                        },
                        other => tracing::warn!(?other, "unexpected lobby message"),
                    }
                }
                tracing::info!("lobby connection closed");
                pending.lock().await.take();
                let _ = events.send(LobbyEvent::Disconnected {
                    reason: "connection closed".into(),
                });
            })
        };

        *self.link.lock().await = Some(Link {
            outbound,
            pending,
            region: region.clone(),
            regions,
            tasks: [writer, reader],
        });
        Ok(region)
    }

    async fn join_lobby(&self) -> Result<(), LobbyError> {
        match self.request(ClientMessage::JoinLobby).await? {
            ServerMessage::LobbyJoined => Ok(()),
            ServerMessage::Error { code, .. } => Err(LobbyError::Rejected(code)),
            other => Err(unexpected(&other)),
        }
    }

    async fn leave_lobby(&self) -> Result<(), LobbyError> {
        self.send(ClientMessage::LeaveLobby).await
    }

    async fn join_room(&self, args: EnterRoomArgs) -> Result<RoomRecord, LobbyError> {
        self.enter_room(ClientMessage::JoinRoom { args }).await
    }

    async fn create_room(&self, args: EnterRoomArgs) -> Result<RoomRecord, LobbyError> {
        self.enter_room(ClientMessage::CreateRoom { args }).await
    }

    async fn set_room_properties(&self, properties: RoomProperties) -> Result<(), LobbyError> {
        self.send(ClientMessage::SetRoomProperties { properties }).await
    }

    async fn leave_room(&self) -> Result<(), LobbyError> {
        self.send(ClientMessage::LeaveRoom).await
    }

    async fn disconnect(&self) {
        let Some(link) = self.link.lock().await.take() else {
            return;
        };
        // fail the in-flight request so it lets go of its outbound handle
        link.pending.lock().await.take();
        let _ = link.outbound.send(ClientMessage::Disconnect).await;
        drop(link.outbound);
        // Let the writer flush the goodbye before the reader is torn down.
        let [mut writer, reader] = link.tasks;
        if tokio::time::timeout(DISCONNECT_FLUSH, &mut writer).await.is_err() {
            writer.abort();
        }
        reader.abort();
        tracing::info!(region = %link.region, "disconnected from lobby");
    }

    async fn current_region(&self) -> Option<String> {
        self.link.lock().await.as_ref().map(|l| l.region.clone())
    }

    async fn regions(&self) -> RegionList {
        self.link
            .lock()
            .await
            .as_ref()
            .map(|l| l.regions.clone())
            .unwrap_or_default()
    }
}

fn unexpected(msg: &ServerMessage) -> LobbyError {
    LobbyError::Transport(format!("unexpected reply: {msg:?}"))
}
