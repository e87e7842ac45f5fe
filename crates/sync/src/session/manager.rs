use std::collections::{HashMap, VecDeque};

use thiserror::Error;
use uuid::Uuid;

use crate::net::wire::SessionState;
use crate::world::{
    ChatMessage, GamePhase, GeoPosition, MessageId, Pin, PinId, Player, PlayerId, Team, TeamId,
    WorldSnapshot,
};

/// The merged, application-facing session view. Owned exclusively by the
/// [`SessionManager`]; the reconciler layer below never holds one.
#[derive(Debug, Clone)]
pub struct GameSession {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub host_id: PlayerId,
    pub created_at_ms: u64,
    pub players: HashMap<PlayerId, Player>,
    pub teams: Vec<Team>,
    pub pins: Vec<Pin>,
    pub messages: Vec<ChatMessage>,
    pub phase: GamePhase,
}

impl GameSession {
    pub fn from_state(state: SessionState) -> Self {
        Self {
            id: state.id,
            code: state.code,
            name: state.name,
            host_id: state.host_id,
            created_at_ms: state.created_at_ms,
            players: state.players.into_iter().map(|p| (p.id, p)).collect(),
            teams: state.teams,
            pins: state.pins,
            messages: state.messages,
            phase: GamePhase::default(),
        }
    }

    pub fn to_state(&self) -> SessionState {
        SessionState {
            id: self.id,
            code: self.code.clone(),
            name: self.name.clone(),
            host_id: self.host_id,
            created_at_ms: self.created_at_ms,
            players: self.players.values().cloned().collect(),
            teams: self.teams.clone(),
            pins: self.pins.clone(),
            messages: self.messages.clone(),
        }
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn pin(&self, id: PinId) -> Option<&Pin> {
        self.pins.iter().find(|p| p.id == id)
    }
}

/// Targeted change notifications, one per applied mutation. Consumers drain
/// these instead of polling the whole view on a timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SessionStarted,
    /// A full resync or rejoin replaced the view wholesale.
    SessionReplaced,
    SessionEnded,
    PlayerJoined(PlayerId),
    PlayerLeft(PlayerId),
    PlayerMoved(PlayerId),
    PinAdded(PinId),
    PinRemoved(PinId),
    MessageReceived(MessageId),
    TeamAssigned {
        player_id: PlayerId,
        team_id: TeamId,
    },
    PhaseChanged(GamePhase),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("no active session")]
    NoSession,
    #[error("only the host can do that")]
    NotHost,
    #[error("session {code} was not found")]
    NotFound { code: String },
}

/// Bridges raw network state to the merged view: session lifecycle,
/// optimistic local mutations, and idempotent merge of authoritative
/// events.
#[derive(Debug)]
pub struct SessionManager {
    local_player_id: PlayerId,
    session: Option<GameSession>,
    pending_join_code: Option<String>,
    events: VecDeque<SessionEvent>,
}

impl SessionManager {
    pub fn new(local_player_id: PlayerId) -> Self {
        Self {
            local_player_id,
            session: None,
            pending_join_code: None,
            events: VecDeque::new(),
        }
    }

    pub fn local_player_id(&self) -> PlayerId {
        self.local_player_id
    }

    pub fn session(&self) -> Option<&GameSession> {
        self.session.as_ref()
    }

    pub fn is_host(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| s.host_id == self.local_player_id)
            .unwrap_or(false)
    }

    pub fn pending_join_code(&self) -> Option<&str> {
        self.pending_join_code.as_deref()
    }

    pub fn begin_join(&mut self, code: &str) {
        self.pending_join_code = Some(code.to_string());
    }

    /// Authoritative confirmation of create/join, or a wholesale
    /// replacement on resync.
    pub fn confirm(&mut self, state: SessionState) {
        let replacing = self.session.is_some();
        self.session = Some(GameSession::from_state(state));
        self.pending_join_code = None;
        self.events.push_back(if replacing {
            SessionEvent::SessionReplaced
        } else {
            SessionEvent::SessionStarted
        });
    }

    pub fn leave(&mut self) {
        if self.session.take().is_some() {
            self.events.push_back(SessionEvent::SessionEnded);
        }
        self.pending_join_code = None;
    }

    pub fn poll_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain(..).collect()
    }

    // Authoritative appliers. All idempotent; duplicate or late re-delivery
    // changes nothing and emits nothing.

    pub fn apply_player_joined(&mut self, player: Player) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let id = player.id;
        let fresh = !session.players.contains_key(&id);
        session.players.insert(id, player);
        if fresh {
            self.events.push_back(SessionEvent::PlayerJoined(id));
        }
    }

    pub fn apply_player_left(&mut self, player_id: PlayerId) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.players.remove(&player_id).is_some() {
            self.events.push_back(SessionEvent::PlayerLeft(player_id));
        }
    }

    pub fn apply_location(&mut self, player_id: PlayerId, location: GeoPosition) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match session.players.get_mut(&player_id) {
            Some(player) => {
                player.location = Some(location);
                self.events.push_back(SessionEvent::PlayerMoved(player_id));
            }
            None => log::debug!("location update for unknown player {player_id}"),
        }
    }

    pub fn apply_pin_added(&mut self, pin: Pin) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.pins.iter().any(|p| p.id == pin.id) {
            return;
        }
        let id = pin.id;
        session.pins.push(pin);
        self.events.push_back(SessionEvent::PinAdded(id));
    }

    pub fn apply_pin_removed(&mut self, pin_id: PinId) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let before = session.pins.len();
        session.pins.retain(|p| p.id != pin_id);
        if session.pins.len() != before {
            self.events.push_back(SessionEvent::PinRemoved(pin_id));
        }
    }

    pub fn apply_message(&mut self, message: ChatMessage) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.messages.iter().any(|m| m.id == message.id) {
            return;
        }
        let id = message.id;
        session.messages.push(message);
        self.events.push_back(SessionEvent::MessageReceived(id));
    }

    pub fn apply_team_assigned(&mut self, player_id: PlayerId, team_id: TeamId) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if let Some(player) = session.players.get_mut(&player_id) {
            if player.team_id != Some(team_id) {
                player.team_id = Some(team_id);
                self.events
                    .push_back(SessionEvent::TeamAssigned { player_id, team_id });
            }
        }
    }

    /// Folds a reconciled world snapshot into the merged view. Positions,
    /// team membership, pins and phase are authoritative; roster entries
    /// are not touched (players leave via explicit events, not by absence
    /// from one snapshot).
    pub fn merge_world(&mut self, world: &WorldSnapshot) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let mut moved = Vec::new();
        for state in &world.players {
            if let Some(player) = session.players.get_mut(&state.player_id) {
                if state.location.is_some() && player.location != state.location {
                    player.location = state.location;
                    moved.push(state.player_id);
                }
                if let Some(team_id) = state.team_id {
                    player.team_id = Some(team_id);
                }
            }
        }

        let added: Vec<PinId> = world
            .pins
            .iter()
            .filter(|p| !session.pins.iter().any(|q| q.id == p.id))
            .map(|p| p.id)
            .collect();
        let removed: Vec<PinId> = session
            .pins
            .iter()
            .filter(|p| !world.pins.iter().any(|q| q.id == p.id))
            .map(|p| p.id)
            .collect();
        if !added.is_empty() || !removed.is_empty() {
            session.pins = world.pins.clone();
        }

        let phase_changed = session.phase != world.phase;
        session.phase = world.phase;

        for id in moved {
            self.events.push_back(SessionEvent::PlayerMoved(id));
        }
        for id in added {
            self.events.push_back(SessionEvent::PinAdded(id));
        }
        for id in removed {
            self.events.push_back(SessionEvent::PinRemoved(id));
        }
        if phase_changed {
            self.events.push_back(SessionEvent::PhaseChanged(world.phase));
        }
    }

    // Optimistic local mutations, applied immediately for responsiveness
    // and superseded by the next authoritative update covering the same
    // change.

    pub fn optimistic_location(&mut self, location: GeoPosition) -> Result<(), SessionError> {
        if self.session.is_none() {
            return Err(SessionError::NoSession);
        }
        self.apply_location(self.local_player_id, location);
        Ok(())
    }

    pub fn optimistic_add_pin(&mut self, pin: Pin) -> Result<(), SessionError> {
        if self.session.is_none() {
            return Err(SessionError::NoSession);
        }
        self.apply_pin_added(pin);
        Ok(())
    }

    pub fn optimistic_remove_pin(&mut self, pin_id: PinId) -> Result<(), SessionError> {
        if self.session.is_none() {
            return Err(SessionError::NoSession);
        }
        self.apply_pin_removed(pin_id);
        Ok(())
    }

    pub fn optimistic_message(&mut self, message: ChatMessage) -> Result<(), SessionError> {
        if self.session.is_none() {
            return Err(SessionError::NoSession);
        }
        self.apply_message(message);
        Ok(())
    }

    /// Host-only; non-hosts are rejected here, before any network traffic.
    pub fn optimistic_assign_team(
        &mut self,
        player_id: PlayerId,
        team_id: TeamId,
    ) -> Result<(), SessionError> {
        if self.session.is_none() {
            return Err(SessionError::NoSession);
        }
        if !self.is_host() {
            return Err(SessionError::NotHost);
        }
        self.apply_team_assigned(player_id, team_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{Coordinate, PinKind, PlayerState};

    fn session_state(host_id: PlayerId, players: Vec<Player>) -> SessionState {
        SessionState {
            id: Uuid::new_v4(),
            code: "ABC123".to_string(),
            name: "night-op".to_string(),
            host_id,
            created_at_ms: 0,
            players,
            teams: Vec::new(),
            pins: Vec::new(),
            messages: Vec::new(),
        }
    }

    fn pin(id: PinId) -> Pin {
        Pin {
            id,
            kind: PinKind::Objective,
            name: "bridge".to_string(),
            coordinate: Coordinate {
                latitude: 48.0,
                longitude: 16.0,
            },
            owner_id: Uuid::new_v4(),
            team_id: None,
            created_at_ms: 0,
        }
    }

    #[test]
    fn duplicate_pin_merges_to_one() {
        let me = Uuid::new_v4();
        let mut manager = SessionManager::new(me);
        manager.confirm(session_state(me, vec![Player::new(me, "raven")]));

        let pin_id = Uuid::new_v4();
        manager.apply_pin_added(pin(pin_id));
        manager.apply_pin_added(pin(pin_id));

        assert_eq!(manager.session().unwrap().pins.len(), 1);
        let events = manager.poll_events();
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, SessionEvent::PinAdded(_)))
                .count(),
            1
        );
    }

    #[test]
    fn duplicate_chat_message_suppressed() {
        let me = Uuid::new_v4();
        let mut manager = SessionManager::new(me);
        manager.confirm(session_state(me, vec![Player::new(me, "raven")]));

        let message = ChatMessage {
            id: Uuid::new_v4(),
            text: "moving up".to_string(),
            sender_id: me,
            sender_name: "raven".to_string(),
            team_id: None,
            timestamp_ms: 10,
        };
        manager.apply_message(message.clone());
        manager.apply_message(message);

        assert_eq!(manager.session().unwrap().messages.len(), 1);
    }

    #[test]
    fn non_host_team_assignment_fails_fast() {
        let me = Uuid::new_v4();
        let host = Uuid::new_v4();
        let mut manager = SessionManager::new(me);
        manager.confirm(session_state(
            host,
            vec![Player::new(me, "raven"), Player::new(host, "lead")],
        ));

        let result = manager.optimistic_assign_team(me, Uuid::new_v4());
        assert_eq!(result, Err(SessionError::NotHost));
    }

    #[test]
    fn world_merge_diffs_pins_and_positions() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut manager = SessionManager::new(me);
        manager.confirm(session_state(
            me,
            vec![Player::new(me, "raven"), Player::new(other, "crow")],
        ));
        manager.poll_events();

        let mut world = WorldSnapshot::new(4, 400);
        world.players.push(PlayerState {
            player_id: other,
            location: Some(GeoPosition::new(48.1, 16.1, 400)),
            team_id: None,
        });
        world.pins.push(pin(Uuid::new_v4()));
        manager.merge_world(&world);

        let session = manager.session().unwrap();
        assert!(session.players[&other].location.is_some());
        assert_eq!(session.pins.len(), 1);

        let events = manager.poll_events();
        assert!(events.contains(&SessionEvent::PlayerMoved(other)));
        assert!(events.iter().any(|e| matches!(e, SessionEvent::PinAdded(_))));
    }

    #[test]
    fn roster_survives_snapshot_absence() {
        let me = Uuid::new_v4();
        let mut manager = SessionManager::new(me);
        manager.confirm(session_state(me, vec![Player::new(me, "raven")]));

        // A snapshot that does not mention the local player must not drop
        // them from the roster.
        manager.merge_world(&WorldSnapshot::new(1, 100));
        assert!(manager.session().unwrap().player(me).is_some());
    }
}
