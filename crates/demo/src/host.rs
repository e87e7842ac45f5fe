//! A minimal authoritative peer for the offline simulator: answers the
//! protocol over the loopback transport and publishes periodic snapshots.

use std::collections::HashMap;

use uuid::Uuid;

use tacnet::net::{
    decode_client, encode_server, ClientMessage, LoopbackPeer, ServerMessage, SessionState,
};
use tacnet::session::{MemoryDirectory, SessionDirectory};
use tacnet::time::unix_millis;
use tacnet::{GeoPosition, Pin, PinId, Player, PlayerId, PlayerState, Team, TeamId, WorldSnapshot};

pub const JOIN_CODE: &str = "FIELD1";

struct Roster {
    name: String,
    location: Option<GeoPosition>,
    team_id: Option<TeamId>,
    is_host: bool,
}

pub struct ScriptedHost {
    peer: LoopbackPeer,
    directory: MemoryDirectory,
    session_id: Uuid,
    session_name: String,
    host_id: Option<PlayerId>,
    players: HashMap<PlayerId, Roster>,
    teams: Vec<Team>,
    pins: Vec<Pin>,
    tick: u64,
    last_input_seq: Option<u64>,
}

impl ScriptedHost {
    pub fn new(peer: LoopbackPeer) -> Self {
        let teams = vec![
            Team {
                id: Uuid::new_v4(),
                name: "red".to_string(),
                color: "#D64545".to_string(),
            },
            Team {
                id: Uuid::new_v4(),
                name: "blue".to_string(),
                color: "#3B6FD4".to_string(),
            },
        ];
        Self {
            peer,
            directory: MemoryDirectory::new(),
            session_id: Uuid::new_v4(),
            session_name: "simulated op".to_string(),
            host_id: None,
            players: HashMap::new(),
            teams,
            pins: Vec::new(),
            tick: 0,
            last_input_seq: None,
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Drains client frames and answers them.
    pub fn pump(&mut self) {
        for frame in self.peer.take_frames() {
            let message = match decode_client(&frame) {
                Ok(message) => message,
                Err(e) => {
                    log::warn!("host: discarding frame: {e}");
                    continue;
                }
            };
            self.handle(message);
        }
    }

    fn handle(&mut self, message: ClientMessage) {
        match message {
            ClientMessage::Ping { timestamp } => {
                self.reply(&ServerMessage::Pong { timestamp });
            }
            ClientMessage::Pong { .. } => {}
            ClientMessage::CreateSession {
                player_name,
                player_id,
            } => {
                self.host_id = Some(player_id);
                self.players.insert(
                    player_id,
                    Roster {
                        name: player_name,
                        location: None,
                        team_id: None,
                        is_host: true,
                    },
                );
                let state = self.session_state();
                self.directory.store(state.clone());
                self.reply(&ServerMessage::SessionCreated { session: state });
            }
            ClientMessage::JoinSession {
                session_code,
                player_name,
                player_id,
            } => {
                if self.directory.find(&session_code).is_none() {
                    self.reply(&ServerMessage::Error {
                        code: "sessionNotFound".to_string(),
                        message: format!("no session with code {session_code}"),
                    });
                    return;
                }
                self.players.entry(player_id).or_insert(Roster {
                    name: player_name,
                    location: None,
                    team_id: None,
                    is_host: false,
                });
                let state = self.session_state();
                self.directory.store(state.clone());
                self.reply(&ServerMessage::SessionJoined { session: state });
            }
            ClientMessage::LeaveSession { player_id } => {
                self.players.remove(&player_id);
                if self.players.is_empty() {
                    self.directory.remove(JOIN_CODE);
                }
            }
            ClientMessage::LocationUpdate {
                seq,
                player_id,
                location,
            } => {
                if let Some(entry) = self.players.get_mut(&player_id) {
                    entry.location = Some(location);
                }
                self.note_seq(seq);
            }
            ClientMessage::AddPin { seq, pin } => {
                if !self.pins.iter().any(|p| p.id == pin.id) {
                    self.pins.push(pin);
                }
                self.note_seq(seq);
            }
            ClientMessage::RemovePin { seq, pin_id } => {
                self.pins.retain(|p| p.id != pin_id);
                self.note_seq(seq);
            }
            ClientMessage::SendMessage { message } => {
                self.reply(&ServerMessage::MessageReceived { message });
            }
            ClientMessage::AssignTeam { player_id, team_id } => {
                if let Some(entry) = self.players.get_mut(&player_id) {
                    entry.team_id = Some(team_id);
                }
                self.reply(&ServerMessage::TeamAssigned { player_id, team_id });
            }
            ClientMessage::SyncRequest { .. } => {
                let message = ServerMessage::FullSync {
                    session: self.session_state(),
                    snapshot: self.snapshot(),
                };
                self.reply(&message);
            }
        }
    }

    /// Publishes the next authoritative snapshot.
    pub fn publish_snapshot(&mut self) {
        self.tick += 1;
        let snapshot = self.snapshot();
        self.reply(&ServerMessage::GameSnapshot(snapshot));
    }

    /// Drops a simulated teammate into the world so the demo has something
    /// to interpolate besides the local player.
    pub fn spawn_walker(&mut self, name: &str) -> PlayerId {
        let id = Uuid::new_v4();
        self.players.insert(
            id,
            Roster {
                name: name.to_string(),
                location: Some(GeoPosition::new(48.210, 16.370, unix_millis())),
                team_id: None,
                is_host: false,
            },
        );
        self.reply(&ServerMessage::PlayerJoined {
            player: Player {
                id,
                name: name.to_string(),
                team_id: None,
                location: None,
                is_host: false,
            },
        });
        id
    }

    pub fn walk(&mut self, id: PlayerId, step: u64) {
        if let Some(entry) = self.players.get_mut(&id) {
            let angle = (step as f64) * 0.2;
            let mut location = GeoPosition::new(
                48.210 + 0.0005 * angle.sin(),
                16.370 + 0.0005 * angle.cos(),
                unix_millis(),
            );
            location.heading = Some(((angle.to_degrees()) % 360.0) as f32);
            location.speed = Some(1.4);
            entry.location = Some(location);
        }
    }

    pub fn drop_pin(&mut self, owner: PlayerId) -> PinId {
        let pin = Pin {
            id: Uuid::new_v4(),
            kind: tacnet::PinKind::Waypoint,
            name: "rally".to_string(),
            coordinate: tacnet::Coordinate {
                latitude: 48.211,
                longitude: 16.372,
            },
            owner_id: owner,
            team_id: None,
            created_at_ms: unix_millis(),
        };
        let id = pin.id;
        self.pins.push(pin.clone());
        self.reply(&ServerMessage::PinAdded { pin });
        id
    }

    fn note_seq(&mut self, seq: u64) {
        if self.last_input_seq.map(|s| seq > s).unwrap_or(true) {
            self.last_input_seq = Some(seq);
        }
    }

    fn snapshot(&self) -> WorldSnapshot {
        let mut snapshot = WorldSnapshot::new(self.tick, unix_millis());
        snapshot.players = self
            .players
            .iter()
            .map(|(&id, entry)| PlayerState {
                player_id: id,
                location: entry.location,
                team_id: entry.team_id,
            })
            .collect();
        snapshot.pins = self.pins.clone();
        snapshot.last_input_seq = self.last_input_seq;
        snapshot
    }

    fn session_state(&self) -> SessionState {
        SessionState {
            id: self.session_id,
            code: JOIN_CODE.to_string(),
            name: self.session_name.clone(),
            host_id: self.host_id.unwrap_or(Uuid::nil()),
            created_at_ms: unix_millis(),
            players: self
                .players
                .iter()
                .map(|(&id, entry)| Player {
                    id,
                    name: entry.name.clone(),
                    team_id: entry.team_id,
                    location: entry.location,
                    is_host: entry.is_host,
                })
                .collect(),
            teams: self.teams.clone(),
            pins: self.pins.clone(),
            messages: Vec::new(),
        }
    }

    fn reply(&mut self, message: &ServerMessage) {
        match encode_server(message) {
            Ok(frame) => self.peer.send(frame),
            Err(e) => log::error!("host: failed to encode reply: {e}"),
        }
    }
}
