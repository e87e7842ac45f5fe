//! Wire message definitions and the JSON envelope codec.
//!
//! Every logical event travels as one `{"type": ..., ...}` text frame. Each
//! `type` value is one enum variant, decoded exactly once here; nothing past
//! this boundary touches raw frames.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::world::{
    ChatMessage, GeoPosition, Pin, PinId, Player, PlayerId, Team, TeamId, WorldDelta,
    WorldSnapshot,
};

/// Error code the peer uses when a join code does not resolve.
pub const ERR_SESSION_NOT_FOUND: &str = "sessionNotFound";

/// Full session payload carried by create/join confirmations and resyncs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub host_id: PlayerId,
    #[serde(rename = "createdAt")]
    pub created_at_ms: u64,
    pub players: Vec<Player>,
    pub teams: Vec<Team>,
    pub pins: Vec<Pin>,
    pub messages: Vec<ChatMessage>,
}

/// Messages sent from client to the authoritative peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    CreateSession {
        player_name: String,
        player_id: PlayerId,
    },
    JoinSession {
        session_code: String,
        player_name: String,
        player_id: PlayerId,
    },
    LeaveSession {
        player_id: PlayerId,
    },
    /// Position report for the local player. `seq` ties it to the input
    /// sequencer's sliding window.
    LocationUpdate {
        seq: u64,
        player_id: PlayerId,
        location: GeoPosition,
    },
    AddPin {
        seq: u64,
        pin: Pin,
    },
    RemovePin {
        seq: u64,
        pin_id: PinId,
    },
    SendMessage {
        message: ChatMessage,
    },
    /// Host-only.
    AssignTeam {
        player_id: PlayerId,
        team_id: TeamId,
    },
    Ping {
        timestamp: u64,
    },
    Pong {
        timestamp: u64,
    },
    /// Ask for a full state replacement after a detected gap or reconnect.
    SyncRequest {
        player_id: PlayerId,
    },
}

/// Messages sent from the authoritative peer to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    SessionCreated {
        session: SessionState,
    },
    SessionJoined {
        session: SessionState,
    },
    PlayerJoined {
        player: Player,
    },
    PlayerLeft {
        player_id: PlayerId,
        reason: String,
    },
    LocationUpdate {
        player_id: PlayerId,
        location: GeoPosition,
    },
    PinAdded {
        pin: Pin,
    },
    PinRemoved {
        pin_id: PinId,
    },
    MessageReceived {
        message: ChatMessage,
    },
    TeamAssigned {
        player_id: PlayerId,
        team_id: TeamId,
    },
    GameSnapshot(WorldSnapshot),
    GameDelta(WorldDelta),
    /// Response to a sync request: both layers replaced wholesale.
    FullSync {
        session: SessionState,
        snapshot: WorldSnapshot,
    },
    Ping {
        timestamp: u64,
    },
    Pong {
        timestamp: u64,
    },
    Error {
        code: String,
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("encoding failed: {0}")]
    Encode(serde_json::Error),
    #[error("malformed frame: {0}")]
    Decode(serde_json::Error),
}

pub fn encode_client(message: &ClientMessage) -> Result<String, WireError> {
    serde_json::to_string(message).map_err(WireError::Encode)
}

pub fn encode_server(message: &ServerMessage) -> Result<String, WireError> {
    serde_json::to_string(message).map_err(WireError::Encode)
}

pub fn decode_client(frame: &str) -> Result<ClientMessage, WireError> {
    serde_json::from_str(frame).map_err(WireError::Decode)
}

pub fn decode_server(frame: &str) -> Result<ServerMessage, WireError> {
    serde_json::from_str(frame).map_err(WireError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_tag_is_camel_case() {
        let msg = ClientMessage::JoinSession {
            session_code: "ABC123".to_string(),
            player_name: "raven".to_string(),
            player_id: Uuid::nil(),
        };

        let frame = encode_client(&msg).unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "joinSession");
        assert_eq!(value["sessionCode"], "ABC123");
    }

    #[test]
    fn snapshot_fields_inline_with_tag() {
        let msg = ServerMessage::GameSnapshot(WorldSnapshot::new(7, 1234));
        let frame = encode_server(&msg).unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "gameSnapshot");
        assert_eq!(value["tick"], 7);
        assert_eq!(value["timestamp"], 1234);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let result = decode_server(r#"{"type":"teleportPlayer","playerId":"x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn missing_field_is_rejected() {
        let result = decode_client(r#"{"type":"joinSession","playerName":"raven"}"#);
        assert!(result.is_err());
    }
}
