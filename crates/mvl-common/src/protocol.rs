use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use uuid::Uuid;

use crate::props::RoomProperties;
use crate::region::Region;
use crate::room::{EnterRoomArgs, RoomRecord};

// -- Framing --

pub type Transport = Framed<TcpStream, LengthDelimitedCodec>;

pub fn framed_transport(stream: TcpStream) -> Transport {
    LengthDelimitedCodec::builder()
        .max_frame_length(256 * 1024)
        .new_framed(stream)
}

// -- Client -> Lobby Messages --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientMessage {
    // Handshake
    Hello {
        player_name: String,
        version: String,
        /// Preferred region code; the backend picks one when absent.
        region: Option<String>,
    },

    // Lobby
    JoinLobby,
    LeaveLobby,

    // Rooms
    JoinRoom {
        args: EnterRoomArgs,
    },
    CreateRoom {
        args: EnterRoomArgs,
    },
    SetRoomProperties {
        properties: RoomProperties,
    },
    LeaveRoom,

    // Connection
    Ping,
    Disconnect,
}

// -- Lobby -> Client Messages --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerMessage {
    // Handshake
    Welcome {
        player_id: Uuid,
        region: String,
        regions: Vec<Region>,
    },
    HandshakeError {
        reason: String,
    },

    // Lobby
    LobbyJoined,
    /// Directory update batch. Removed rooms carry `removed_from_list`.
    RoomListUpdate {
        rooms: Vec<RoomRecord>,
    },

    // Rooms
    RoomJoined {
        room: RoomRecord,
    },
    RoomLeft,
    RoomPropertiesChanged {
        properties: RoomProperties,
    },

    // Errors
    /// Rejection of a request that waits for its reply: `JoinLobby`,
    /// `JoinRoom` or `CreateRoom`.
    Error {
        code: ErrorCode,
        message: String,
    },
    /// Rejection of a command sent without waiting: `SetRoomProperties`,
    /// `LeaveRoom` or `LeaveLobby`.
    CommandRejected {
        code: ErrorCode,
        message: String,
    },

    // Connection
    Pong,
}

/// Backend rejection reasons. The numeric form is what the UI shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    GameDoesNotExist,
    GameFull,
    GameClosed,
    GameIdAlreadyExists,
    ServerFull,
    InternalError,
}

impl ErrorCode {
    pub const fn short_code(self) -> i16 {
        match self {
            ErrorCode::GameDoesNotExist => 32758,
            ErrorCode::GameFull => 32765,
            ErrorCode::GameClosed => 32764,
            ErrorCode::GameIdAlreadyExists => 32766,
            ErrorCode::ServerFull => 32762,
            ErrorCode::InternalError => -1,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} ({})", self, self.short_code())
    }
}

// -- Serialization helpers --

pub fn serialize_message<T: Serialize>(msg: &T) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_vec(msg)?;
    Ok(Bytes::from(json))
}

pub fn deserialize_message<T: for<'de> Deserialize<'de>>(
    data: &[u8],
) -> Result<T, serde_json::Error> {
    serde_json::from_slice(data)
}

// -- Transport helpers --

pub async fn send_message<T: Serialize>(
    transport: &mut Transport,
    msg: &T,
) -> anyhow::Result<()> {
    let bytes = serialize_message(msg).map_err(|e| anyhow::anyhow!("serialize error: {}", e))?;
    transport
        .send(bytes)
        .await
        .map_err(|e| anyhow::anyhow!("send error: {}", e))
}

pub async fn recv_message<T: for<'de> Deserialize<'de>>(
    transport: &mut Transport,
) -> anyhow::Result<Option<T>> {
    match transport.next().await {
        Some(Ok(frame)) => {
            let msg = deserialize_message(&frame)
                .map_err(|e| anyhow::anyhow!("deserialize error: {}", e))?;
            Ok(Some(msg))
        }
        Some(Err(e)) => Err(anyhow::anyhow!("recv error: {}", e)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props::RoomFlag;
    use crate::room::RoomOptions;

    #[test]
    fn test_hello_serialization() {
        let msg = ClientMessage::Hello {
            player_name: "Mario".into(),
            version: "0.1.0".into(),
            region: Some("eu".into()),
        };
        let bytes = serialize_message(&msg).unwrap();
        let deserialized: ClientMessage = deserialize_message(&bytes).unwrap();
        match deserialized {
            ClientMessage::Hello {
                player_name,
                region,
                ..
            } => {
                assert_eq!(player_name, "Mario");
                assert_eq!(region.as_deref(), Some("eu"));
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_create_room_carries_lobby_whitelist() {
        let mut options = RoomOptions::new(4);
        options.properties.set_flag(RoomFlag::QuickPlay, true);
        options.advertise_lobby_properties();
        let msg = ClientMessage::CreateRoom {
            args: EnterRoomArgs::join("bcdfghjk", options),
        };
        let json: serde_json::Value =
            serde_json::from_slice(&serialize_message(&msg).unwrap()).unwrap();
        let args = &json["CreateRoom"]["args"];
        assert_eq!(args["room_name"], "BCDFGHJK");
        assert_eq!(args["options"]["lobby_properties"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_room_list_update_serialization() {
        let mut removed = RoomRecord::new("BCDFGHJK", 0, 4);
        removed.removed_from_list = true;
        let msg = ServerMessage::RoomListUpdate {
            rooms: vec![RoomRecord::new("CDFGHJKL", 2, 4), removed],
        };
        let bytes = serialize_message(&msg).unwrap();
        match deserialize_message::<ServerMessage>(&bytes).unwrap() {
            ServerMessage::RoomListUpdate { rooms } => {
                assert_eq!(rooms.len(), 2);
                assert!(rooms[1].removed_from_list);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_error_short_codes() {
        assert_eq!(ErrorCode::GameDoesNotExist.short_code(), 32758);
        assert_eq!(ErrorCode::GameFull.short_code(), 32765);
        assert_eq!(ErrorCode::InternalError.short_code(), -1);
    }

    #[test]
    fn test_all_client_messages_serialize() {
        let messages = vec![
            ClientMessage::JoinLobby,
            ClientMessage::LeaveLobby,
            ClientMessage::JoinRoom {
                args: EnterRoomArgs::join("BCDFGHJK", RoomOptions::new(10)),
            },
            ClientMessage::SetRoomProperties {
                properties: RoomProperties::defaults("Mario"),
            },
            ClientMessage::LeaveRoom,
            ClientMessage::Ping,
            ClientMessage::Disconnect,
        ];

        for msg in &messages {
            let bytes = serialize_message(msg).unwrap();
            let _: ClientMessage = deserialize_message(&bytes).unwrap();
        }
    }
}
