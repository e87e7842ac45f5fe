//! Shared world-state types carried on the wire and held in the merged view.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type PlayerId = Uuid;
pub type TeamId = Uuid;
pub type PinId = Uuid;
pub type MessageId = Uuid;

/// A plain map coordinate, for entities that never move.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

/// A captured device position. The timestamp is the authoritative capture
/// time in unix milliseconds when the peer supplies one, the device clock
/// otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoPosition {
    pub latitude: f64,
    pub longitude: f64,
    /// Compass heading in degrees, 0..360, circular.
    pub heading: Option<f32>,
    /// Ground speed in m/s.
    pub speed: Option<f32>,
    pub altitude: Option<f64>,
    pub accuracy: Option<f64>,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
}

impl GeoPosition {
    pub fn new(latitude: f64, longitude: f64, timestamp_ms: u64) -> Self {
        Self {
            latitude,
            longitude,
            heading: None,
            speed: None,
            altitude: None,
            accuracy: None,
            timestamp_ms,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// A player in the roster of the merged session view.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub team_id: Option<TeamId>,
    pub location: Option<GeoPosition>,
    pub is_host: bool,
}

impl Player {
    pub fn new(id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            team_id: None,
            location: None,
            is_host: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinKind {
    Enemy,
    Friendly,
    Objective,
    Hazard,
    Waypoint,
    Cover,
}

/// A map marker. Immutable once placed; the only lifecycle transition is
/// removal. Identity is the id, so re-delivered pins merge to one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pin {
    pub id: PinId,
    #[serde(rename = "type")]
    pub kind: PinKind,
    pub name: String,
    pub coordinate: Coordinate,
    #[serde(rename = "playerId")]
    pub owner_id: PlayerId,
    pub team_id: Option<TeamId>,
    #[serde(rename = "timestamp")]
    pub created_at_ms: u64,
}

/// A chat line. Append-only per session; duplicate ids are dropped on merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    pub text: String,
    #[serde(rename = "playerId")]
    pub sender_id: PlayerId,
    #[serde(rename = "playerName")]
    pub sender_name: String,
    pub team_id: Option<TeamId>,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
}

/// Static reference data; two teams exist from session start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GamePhase {
    #[default]
    Lobby,
    Active,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamScore {
    pub team_id: TeamId,
    pub score: u32,
}

/// Per-player slice of an authoritative snapshot. Narrower than [`Player`]:
/// the reconciler layer tracks positions and team membership only, never the
/// full roster entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub player_id: PlayerId,
    pub location: Option<GeoPosition>,
    pub team_id: Option<TeamId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_wire_field_names() {
        let pin = Pin {
            id: Uuid::nil(),
            kind: PinKind::Enemy,
            name: "contact".to_string(),
            coordinate: Coordinate {
                latitude: 48.2,
                longitude: 16.4,
            },
            owner_id: Uuid::nil(),
            team_id: None,
            created_at_ms: 1000,
        };

        let json = serde_json::to_value(&pin).unwrap();
        assert_eq!(json["type"], "enemy");
        assert!(json.get("playerId").is_some());
        assert!(json.get("timestamp").is_some());
        assert!(json.get("kind").is_none());
    }
}
