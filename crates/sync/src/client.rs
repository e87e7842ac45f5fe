use std::time::Instant;

use uuid::Uuid;

use crate::alert::{Alert, AlertKind, AlertSink, AlertUrgency, LogAlertSink};
use crate::config::SyncConfig;
use crate::net::wire::ERR_SESSION_NOT_FOUND;
use crate::net::{
    ClientMessage, ConnectionController, ConnectionState, InputPayload, InputSequencer,
    LinkEvent, LinkStats, MessageTransport, OutboundQueue, ServerMessage,
};
use crate::session::{GameSession, SessionError, SessionEvent, SessionManager};
use crate::time::unix_millis;
use crate::world::{
    ChatMessage, Coordinate, GeoPosition, InterpolatedWorld, Pin, PinId, PinKind, PlayerId,
    ReconcileOutcome, StateReconciler, TeamId,
};

/// The session operations a transport-backed client exposes to the
/// application. One contract, one production implementation.
pub trait GameTransportClient {
    fn create_session(&mut self, player_name: &str) -> Result<(), SessionError>;
    fn join_session(&mut self, code: &str, player_name: &str) -> Result<(), SessionError>;
    fn leave_session(&mut self) -> Result<(), SessionError>;
    fn update_location(&mut self, location: GeoPosition) -> Result<u64, SessionError>;
    fn add_pin(
        &mut self,
        kind: PinKind,
        name: &str,
        coordinate: Coordinate,
    ) -> Result<PinId, SessionError>;
    fn remove_pin(&mut self, pin_id: PinId) -> Result<u64, SessionError>;
    fn send_chat(&mut self, text: &str) -> Result<(), SessionError>;
    fn assign_team(&mut self, player_id: PlayerId, team_id: TeamId) -> Result<(), SessionError>;
}

/// The reconciling client: turns the unreliable message stream into the
/// consistent session view and render state, and reconciles locally-issued
/// actions against the authoritative peer.
///
/// Drive it by calling [`SyncClient::update`] on a fixed schedule; each call
/// pumps the link once and processes inbound messages in arrival order.
pub struct SyncClient {
    config: SyncConfig,
    connection: ConnectionController,
    outbound: OutboundQueue,
    sequencer: InputSequencer,
    reconciler: StateReconciler,
    session: SessionManager,
    alerts: Box<dyn AlertSink>,
    player_id: PlayerId,
    player_name: String,
    resync_on_connect: bool,
}

impl SyncClient {
    pub fn new(transport: Box<dyn MessageTransport>, config: SyncConfig) -> Self {
        let player_id = Uuid::new_v4();
        Self {
            connection: ConnectionController::new(transport, &config),
            outbound: OutboundQueue::new(config.max_send_attempts),
            sequencer: InputSequencer::new(),
            reconciler: StateReconciler::new(
                config.snapshot_horizon_ms,
                config.interpolation_delay_ms,
            ),
            session: SessionManager::new(player_id),
            alerts: Box::new(LogAlertSink),
            player_id,
            player_name: String::new(),
            resync_on_connect: false,
            config,
        }
    }

    pub fn with_alert_sink(mut self, alerts: Box<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub fn connection_state(&self) -> &ConnectionState {
        self.connection.state()
    }

    pub fn link_stats(&self) -> &LinkStats {
        self.connection.stats()
    }

    pub fn session(&self) -> Option<&GameSession> {
        self.session.session()
    }

    pub fn is_host(&self) -> bool {
        self.session.is_host()
    }

    pub fn world_tick(&self) -> u64 {
        self.reconciler.tick()
    }

    pub fn pending_inputs(&self) -> usize {
        self.sequencer.pending_count()
    }

    /// Render view sampled at now minus the interpolation delay.
    pub fn interpolated(&self) -> Option<InterpolatedWorld> {
        self.reconciler.sample(unix_millis())
    }

    pub fn poll_session_events(&mut self) -> Vec<SessionEvent> {
        self.session.poll_events()
    }

    pub fn connect(&mut self, address: &str) {
        self.connection.connect(address, Instant::now());
    }

    /// Tears the link down. A manual disconnect also clears the session and
    /// every queued action; nothing fires afterwards.
    pub fn disconnect(&mut self, manual: bool) {
        self.connection.disconnect(manual);
        if manual {
            self.session.leave();
            self.outbound.clear();
            self.sequencer.reset();
            self.reconciler.reset();
            self.resync_on_connect = false;
        }
    }

    pub fn enter_background(&mut self) {
        self.connection.set_backgrounded(true);
    }

    /// The platform may have silently killed the socket while backgrounded;
    /// reconnect fresh and resynchronize once the link is back.
    pub fn enter_foreground(&mut self) {
        if self.session.session().is_some() {
            self.resync_on_connect = true;
        }
        self.connection.resume_foreground(Instant::now());
    }

    /// One pump of the network event loop.
    pub fn update(&mut self) {
        let events = self.connection.poll(Instant::now());
        for event in events {
            match event {
                LinkEvent::StateChanged(state) => self.on_state_changed(state),
                LinkEvent::Message(message) => self.on_message(message),
            }
        }
    }

    fn on_state_changed(&mut self, state: ConnectionState) {
        match state {
            ConnectionState::Connected => {
                if self.resync_on_connect {
                    self.resync_on_connect = false;
                    self.replay_membership();
                }
                self.flush_outbound();
            }
            ConnectionState::Reconnecting { .. } | ConnectionState::Disconnected => {
                // The peer may have advanced past us while the link was
                // down; resynchronize once it is back.
                if self.session.session().is_some() {
                    self.resync_on_connect = true;
                }
            }
            ConnectionState::Failed { ref reason } => {
                self.alerts.notify(Alert::new(
                    AlertKind::ConnectionLost,
                    AlertUrgency::Critical,
                    format!("connection lost: {reason}"),
                ));
            }
            ConnectionState::Connecting => {}
        }
    }

    /// Rejoin with the existing player id, replay unacknowledged inputs,
    /// then ask for a full state replacement. The replayed inputs go out
    /// ahead of the sync request so nothing transient is lost to the
    /// resync.
    fn replay_membership(&mut self) {
        let Some(code) = self.session.session().map(|s| s.code.clone()) else {
            return;
        };
        log::info!("rejoining session {code} and requesting resync");

        self.outbound.enqueue(ClientMessage::JoinSession {
            session_code: code,
            player_name: self.player_name.clone(),
            player_id: self.player_id,
        });
        for message in self
            .sequencer
            .replay_messages(self.player_id, self.config.max_send_attempts)
        {
            self.outbound.enqueue(message);
        }
        self.outbound.enqueue(ClientMessage::SyncRequest {
            player_id: self.player_id,
        });
    }

    fn on_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::SessionCreated { session }
            | ServerMessage::SessionJoined { session } => {
                self.session.confirm(session);
            }
            ServerMessage::FullSync { session, snapshot } => {
                self.session.confirm(session);
                if let ReconcileOutcome::Applied {
                    acked_seq: Some(seq),
                } = self.reconciler.reset_to(snapshot)
                {
                    self.sequencer.acknowledge(seq);
                }
                self.merge_latest_world();
            }
            ServerMessage::PlayerJoined { player } => self.session.apply_player_joined(player),
            ServerMessage::PlayerLeft { player_id, reason } => {
                log::debug!("player {player_id} left: {reason}");
                self.session.apply_player_left(player_id);
            }
            ServerMessage::LocationUpdate {
                player_id,
                location,
            } => self.session.apply_location(player_id, location),
            ServerMessage::PinAdded { pin } => self.session.apply_pin_added(pin),
            ServerMessage::PinRemoved { pin_id } => self.session.apply_pin_removed(pin_id),
            ServerMessage::MessageReceived { message } => self.session.apply_message(message),
            ServerMessage::TeamAssigned { player_id, team_id } => {
                self.session.apply_team_assigned(player_id, team_id)
            }
            ServerMessage::GameSnapshot(snapshot) => {
                if let ReconcileOutcome::Applied { acked_seq } =
                    self.reconciler.apply_snapshot(snapshot)
                {
                    if let Some(seq) = acked_seq {
                        self.sequencer.acknowledge(seq);
                    }
                    self.merge_latest_world();
                }
            }
            ServerMessage::GameDelta(delta) => match self.reconciler.apply_delta(delta) {
                Ok(ReconcileOutcome::Applied { acked_seq }) => {
                    if let Some(seq) = acked_seq {
                        self.sequencer.acknowledge(seq);
                    }
                    self.merge_latest_world();
                }
                Ok(ReconcileOutcome::Duplicate) => {}
                Err(e) => {
                    log::warn!("{e}; requesting resync");
                    self.send_or_queue(ClientMessage::SyncRequest {
                        player_id: self.player_id,
                    });
                }
            },
            ServerMessage::Error { code, message } => self.on_server_error(&code, message),
            // Heartbeat traffic is consumed by the connection controller.
            ServerMessage::Ping { .. } | ServerMessage::Pong { .. } => {}
        }
    }

    fn on_server_error(&mut self, code: &str, message: String) {
        if code == ERR_SESSION_NOT_FOUND {
            let text = match self.session.pending_join_code() {
                Some(join_code) => format!("session {join_code} was not found"),
                None => message,
            };
            self.session.leave();
            self.alerts.notify(Alert::new(
                AlertKind::SessionError,
                AlertUrgency::Warning,
                text,
            ));
        } else {
            log::warn!("peer error {code}: {message}");
            self.alerts.notify(Alert::new(
                AlertKind::SessionError,
                AlertUrgency::Warning,
                message,
            ));
        }
    }

    fn merge_latest_world(&mut self) {
        if let Some(world) = self.reconciler.latest() {
            self.session.merge_world(world);
        }
    }

    fn send_or_queue(&mut self, message: ClientMessage) {
        self.outbound.enqueue(message);
        if self.connection.state().is_connected() {
            self.flush_outbound();
        }
    }

    fn flush_outbound(&mut self) {
        let Self {
            outbound,
            connection,
            ..
        } = self;
        let dropped = outbound.flush(|message| connection.send(message));
        for _ in &dropped {
            self.alerts.notify(Alert::new(
                AlertKind::MessageDropped,
                AlertUrgency::Warning,
                "an action could not be delivered and was dropped",
            ));
        }
    }

    fn submit_input(&mut self, payload: InputPayload) -> u64 {
        let now_ms = unix_millis();
        let seq = self.sequencer.submit(payload, now_ms);
        let message = self
            .sequencer
            .pending()
            .last()
            .map(|input| input.to_message(self.player_id));
        if let Some(message) = message {
            self.send_or_queue(message);
        }
        seq
    }
}

impl GameTransportClient for SyncClient {
    fn create_session(&mut self, player_name: &str) -> Result<(), SessionError> {
        self.player_name = player_name.to_string();
        self.send_or_queue(ClientMessage::CreateSession {
            player_name: player_name.to_string(),
            player_id: self.player_id,
        });
        Ok(())
    }

    fn join_session(&mut self, code: &str, player_name: &str) -> Result<(), SessionError> {
        self.player_name = player_name.to_string();
        self.session.begin_join(code);
        self.send_or_queue(ClientMessage::JoinSession {
            session_code: code.to_string(),
            player_name: player_name.to_string(),
            player_id: self.player_id,
        });
        Ok(())
    }

    fn leave_session(&mut self) -> Result<(), SessionError> {
        if self.session.session().is_none() {
            return Err(SessionError::NoSession);
        }
        // Best-effort goodbye, then tear everything down; a leave must
        // cancel heartbeats and any pending reconnect.
        let _ = self.connection.send(&ClientMessage::LeaveSession {
            player_id: self.player_id,
        });
        self.disconnect(true);
        Ok(())
    }

    fn update_location(&mut self, location: GeoPosition) -> Result<u64, SessionError> {
        self.session.optimistic_location(location)?;
        Ok(self.submit_input(InputPayload::Location(location)))
    }

    fn add_pin(
        &mut self,
        kind: PinKind,
        name: &str,
        coordinate: Coordinate,
    ) -> Result<PinId, SessionError> {
        let team_id = self
            .session
            .session()
            .and_then(|s| s.player(self.player_id))
            .and_then(|p| p.team_id);
        let pin = Pin {
            id: Uuid::new_v4(),
            kind,
            name: name.to_string(),
            coordinate,
            owner_id: self.player_id,
            team_id,
            created_at_ms: unix_millis(),
        };
        let pin_id = pin.id;
        self.session.optimistic_add_pin(pin.clone())?;
        self.submit_input(InputPayload::Pin(pin));
        Ok(pin_id)
    }

    fn remove_pin(&mut self, pin_id: PinId) -> Result<u64, SessionError> {
        self.session.optimistic_remove_pin(pin_id)?;
        Ok(self.submit_input(InputPayload::PinRemoval(pin_id)))
    }

    fn send_chat(&mut self, text: &str) -> Result<(), SessionError> {
        let team_id = self
            .session
            .session()
            .and_then(|s| s.player(self.player_id))
            .and_then(|p| p.team_id);
        let message = ChatMessage {
            id: Uuid::new_v4(),
            text: text.to_string(),
            sender_id: self.player_id,
            sender_name: self.player_name.clone(),
            team_id,
            timestamp_ms: unix_millis(),
        };
        self.session.optimistic_message(message.clone())?;
        self.send_or_queue(ClientMessage::SendMessage { message });
        Ok(())
    }

    fn assign_team(&mut self, player_id: PlayerId, team_id: TeamId) -> Result<(), SessionError> {
        self.session.optimistic_assign_team(player_id, team_id)?;
        self.send_or_queue(ClientMessage::AssignTeam { player_id, team_id });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::transport::LoopbackTransport;
    use crate::net::wire::{self, SessionState};
    use crate::world::Player;

    fn joined_client() -> (SyncClient, crate::net::LoopbackPeer) {
        let (transport, peer) = LoopbackTransport::pair();
        let mut client = SyncClient::new(Box::new(transport), SyncConfig::default());

        let me = client.player_id();
        let mut player = Player::new(me, "raven");
        player.is_host = false;
        let state = SessionState {
            id: Uuid::new_v4(),
            code: "ABC123".to_string(),
            name: "night-op".to_string(),
            host_id: Uuid::new_v4(),
            created_at_ms: 0,
            players: vec![player],
            teams: Vec::new(),
            pins: Vec::new(),
            messages: Vec::new(),
        };

        client.connect("loopback");
        client.update();
        for frame in peer.take_frames() {
            if let Ok(ClientMessage::Ping { timestamp }) = wire::decode_client(&frame) {
                peer.send(wire::encode_server(&ServerMessage::Pong { timestamp }).unwrap());
            }
        }
        peer.send(wire::encode_server(&ServerMessage::SessionJoined { session: state }).unwrap());
        client.update();
        assert!(client.connection_state().is_connected());
        assert!(client.session().is_some());
        (client, peer)
    }

    #[test]
    fn optimistic_pin_appears_immediately() {
        let (mut client, _peer) = joined_client();

        let pin_id = client
            .add_pin(
                PinKind::Enemy,
                "contact",
                Coordinate {
                    latitude: 48.0,
                    longitude: 16.0,
                },
            )
            .unwrap();

        assert!(client.session().unwrap().pin(pin_id).is_some());
        assert_eq!(client.pending_inputs(), 1);
    }

    #[test]
    fn non_host_team_assignment_never_hits_the_wire() {
        let (mut client, peer) = joined_client();
        peer.take_frames();

        let result = client.assign_team(client.player_id(), Uuid::new_v4());
        assert_eq!(result, Err(SessionError::NotHost));
        assert!(peer.take_frames().is_empty());
    }

    #[test]
    fn actions_without_session_are_rejected() {
        let (transport, _peer) = LoopbackTransport::pair();
        let mut client = SyncClient::new(Box::new(transport), SyncConfig::default());

        let result = client.update_location(GeoPosition::new(48.0, 16.0, 0));
        assert_eq!(result, Err(SessionError::NoSession));
    }

    #[test]
    fn delta_gap_triggers_sync_request() {
        let (mut client, peer) = joined_client();

        let mut snapshot = crate::world::WorldSnapshot::new(3, unix_millis());
        snapshot.players = Vec::new();
        peer.send(wire::encode_server(&ServerMessage::GameSnapshot(snapshot)).unwrap());
        client.update();
        peer.take_frames();

        let delta = crate::world::WorldDelta {
            from_tick: 5,
            to_tick: 6,
            timestamp_ms: unix_millis(),
            players: Vec::new(),
            pins_added: Vec::new(),
            pins_removed: Vec::new(),
            events: Vec::new(),
            last_input_seq: None,
        };
        peer.send(wire::encode_server(&ServerMessage::GameDelta(delta)).unwrap());
        client.update();

        assert_eq!(client.world_tick(), 3);
        let requested_sync = peer.take_frames().iter().any(|f| {
            matches!(
                wire::decode_client(f),
                Ok(ClientMessage::SyncRequest { .. })
            )
        });
        assert!(requested_sync);
    }

    #[test]
    fn snapshot_ack_clears_pending_inputs() {
        let (mut client, peer) = joined_client();

        client
            .update_location(GeoPosition::new(48.0, 16.0, unix_millis()))
            .unwrap();
        assert_eq!(client.pending_inputs(), 1);

        let mut snapshot = crate::world::WorldSnapshot::new(7, unix_millis());
        snapshot.last_input_seq = Some(1);
        peer.send(wire::encode_server(&ServerMessage::GameSnapshot(snapshot)).unwrap());
        client.update();

        assert_eq!(client.pending_inputs(), 0);
        assert_eq!(client.world_tick(), 7);
    }
}
