use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::config::SyncConfig;
use crate::time::unix_millis;

use super::transport::{
    MessageTransport, TransportError, TransportEvent, CLOSE_GOING_AWAY, CLOSE_NORMAL,
};
use super::wire::{self, ClientMessage, ServerMessage};

const RTT_EWMA_ALPHA: f32 = 0.125;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Failed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max_attempts: u32,
}

impl BackoffPolicy {
    /// Linear growth: the delay before attempt `n` is `base * n`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base * attempt
    }

    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt > self.max_attempts
    }
}

#[derive(Debug, Clone, Default)]
pub struct LinkStats {
    /// Smoothed round-trip estimate from heartbeat echoes.
    pub rtt_ms: f32,
    pub pings_sent: u64,
    pub pongs_received: u64,
    pub frames_sent: u64,
    pub frames_received: u64,
    /// Times the link came back up after an involuntary drop.
    pub reconnects: u32,
}

impl LinkStats {
    fn record_rtt(&mut self, sample_ms: f32) {
        if self.pongs_received <= 1 {
            self.rtt_ms = sample_ms;
        } else {
            self.rtt_ms = (1.0 - RTT_EWMA_ALPHA) * self.rtt_ms + RTT_EWMA_ALPHA * sample_ms;
        }
    }
}

#[derive(Debug)]
pub enum LinkEvent {
    StateChanged(ConnectionState),
    Message(ServerMessage),
}

/// Owns the transport life-cycle: probe-confirmed connects, heartbeat,
/// linear-backoff reconnects, background/foreground transitions, and the
/// manual/involuntary disconnect distinction. Physical reconnections are
/// invisible above this layer; consumers observe one logical connection
/// plus a state indicator.
pub struct ConnectionController {
    transport: Box<dyn MessageTransport>,
    state: ConnectionState,
    backoff: BackoffPolicy,
    heartbeat_interval: Duration,
    background_heartbeat_interval: Duration,
    probe_timeout: Duration,
    backgrounded: bool,
    manual_stop: bool,
    address: Option<String>,
    attempts: u32,
    next_attempt_at: Option<Instant>,
    probe_deadline: Option<Instant>,
    last_heartbeat: Option<Instant>,
    events: VecDeque<LinkEvent>,
    stats: LinkStats,
}

impl ConnectionController {
    pub fn new(transport: Box<dyn MessageTransport>, config: &SyncConfig) -> Self {
        Self {
            transport,
            state: ConnectionState::Disconnected,
            backoff: BackoffPolicy {
                base: config.reconnect_base_delay,
                max_attempts: config.max_reconnect_attempts,
            },
            heartbeat_interval: config.heartbeat_interval,
            background_heartbeat_interval: config.background_heartbeat_interval,
            probe_timeout: config.probe_timeout,
            backgrounded: false,
            manual_stop: false,
            address: None,
            attempts: 0,
            next_attempt_at: None,
            probe_deadline: None,
            last_heartbeat: None,
            events: VecDeque::new(),
            stats: LinkStats::default(),
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay until the next scheduled reconnect attempt, if one is pending.
    pub fn next_attempt_in(&self, now: Instant) -> Option<Duration> {
        self.next_attempt_at
            .map(|at| at.saturating_duration_since(now))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        if self.backgrounded {
            self.background_heartbeat_interval
        } else {
            self.heartbeat_interval
        }
    }

    pub fn connect(&mut self, address: &str, now: Instant) {
        self.address = Some(address.to_string());
        self.manual_stop = false;
        self.attempts = 0;
        self.set_state(ConnectionState::Connecting);
        self.try_open(now);
    }

    /// Tears the link down. A manual disconnect suppresses auto-reconnect
    /// and cancels every pending timer so nothing fires after the user has
    /// left.
    pub fn disconnect(&mut self, manual: bool) {
        if manual {
            self.manual_stop = true;
            self.address = None;
        }
        self.transport.close(CLOSE_NORMAL);
        self.cancel_timers();
        self.attempts = 0;
        self.set_state(ConnectionState::Disconnected);
    }

    pub fn set_backgrounded(&mut self, backgrounded: bool) {
        self.backgrounded = backgrounded;
    }

    /// Foreground resume. The platform may have silently killed the socket
    /// while the app slept, so the existing connection is assumed dead and
    /// replaced with a fresh one regardless of its apparent state.
    pub fn resume_foreground(&mut self, now: Instant) {
        self.backgrounded = false;
        if self.manual_stop || self.address.is_none() {
            return;
        }

        log::info!("foreground resume, forcing a fresh connection");
        self.transport.close(CLOSE_GOING_AWAY);
        self.cancel_timers();
        self.attempts = 0;
        self.set_state(ConnectionState::Connecting);
        self.try_open(now);
    }

    /// Encodes and sends one message. Failures are returned, not retried;
    /// queueing is the outbound layer's concern.
    pub fn send(&mut self, message: &ClientMessage) -> Result<(), TransportError> {
        let frame =
            wire::encode_client(message).map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.transport.send(&frame)?;
        self.stats.frames_sent += 1;
        Ok(())
    }

    /// Pumps the transport and the controller timers once. Inbound frames
    /// are decoded here and handed up in arrival order; heartbeat traffic
    /// never leaves this layer.
    pub fn poll(&mut self, now: Instant) -> Vec<LinkEvent> {
        for event in self.transport.poll() {
            match event {
                TransportEvent::Opened => self.on_opened(now),
                TransportEvent::Frame(frame) => self.on_frame(now, &frame),
                TransportEvent::Closed(reason) => {
                    if self.manual_stop {
                        self.cancel_timers();
                        self.set_state(ConnectionState::Disconnected);
                    } else if reason.is_expected() {
                        // Expected for a backgrounded app; not a failure and
                        // not charged against the attempt budget.
                        log::debug!("link closed ({}), treating as benign", reason.code);
                        self.cancel_timers();
                        self.set_state(ConnectionState::Disconnected);
                    } else {
                        log::warn!("link lost: {} ({})", reason.reason, reason.code);
                        self.fail(now, reason.reason);
                    }
                }
            }
        }

        if let Some(deadline) = self.probe_deadline {
            if now >= deadline {
                self.probe_deadline = None;
                self.transport.close(CLOSE_NORMAL);
                self.fail(now, "liveness probe timed out".to_string());
            }
        }

        if let Some(at) = self.next_attempt_at {
            if now >= at {
                self.next_attempt_at = None;
                self.try_open(now);
            }
        }

        if self.state.is_connected() {
            let due = self
                .last_heartbeat
                .map(|last| now.duration_since(last) >= self.heartbeat_interval())
                .unwrap_or(true);
            if due {
                self.send_ping();
                self.last_heartbeat = Some(now);
            }
        }

        self.events.drain(..).collect()
    }

    fn on_opened(&mut self, now: Instant) {
        // Transport is up; the connection only counts once the peer answers
        // the liveness probe.
        self.send_ping();
        self.probe_deadline = Some(now + self.probe_timeout);
    }

    fn on_frame(&mut self, now: Instant, frame: &str) {
        self.stats.frames_received += 1;
        let message = match wire::decode_server(frame) {
            Ok(message) => message,
            Err(e) => {
                // One bad frame must never wedge the pipeline.
                log::warn!("discarding inbound frame: {e}");
                return;
            }
        };

        match message {
            ServerMessage::Ping { timestamp } => {
                let _ = self.send(&ClientMessage::Pong { timestamp });
            }
            ServerMessage::Pong { timestamp } => self.on_pong(now, timestamp),
            other => self.events.push_back(LinkEvent::Message(other)),
        }
    }

    fn on_pong(&mut self, now: Instant, echoed_ms: u64) {
        self.stats.pongs_received += 1;
        let rtt = unix_millis().saturating_sub(echoed_ms);
        self.stats.record_rtt(rtt as f32);

        if self.probe_deadline.take().is_some() && !self.state.is_connected() {
            if matches!(self.state, ConnectionState::Reconnecting { .. }) {
                self.stats.reconnects += 1;
            }
            self.attempts = 0;
            self.last_heartbeat = Some(now);
            self.set_state(ConnectionState::Connected);
        }
    }

    fn send_ping(&mut self) {
        let ping = ClientMessage::Ping {
            timestamp: unix_millis(),
        };
        if self.send(&ping).is_ok() {
            self.stats.pings_sent += 1;
        }
    }

    fn try_open(&mut self, now: Instant) {
        let Some(address) = self.address.clone() else {
            return;
        };
        match self.transport.open(&address) {
            Ok(()) => {
                // Opened event arrives on the next poll; the probe starts
                // there.
            }
            Err(e) => self.fail(now, e.to_string()),
        }
    }

    fn fail(&mut self, now: Instant, reason: String) {
        self.probe_deadline = None;
        self.last_heartbeat = None;
        self.attempts += 1;

        if self.backoff.exhausted(self.attempts) {
            log::error!("giving up after {} attempts: {reason}", self.attempts);
            self.next_attempt_at = None;
            self.set_state(ConnectionState::Failed { reason });
        } else {
            let delay = self.backoff.delay_for(self.attempts);
            log::info!(
                "reconnect attempt {} in {:?}: {reason}",
                self.attempts,
                delay
            );
            self.next_attempt_at = Some(now + delay);
            self.set_state(ConnectionState::Reconnecting {
                attempt: self.attempts,
            });
        }
    }

    fn cancel_timers(&mut self) {
        self.probe_deadline = None;
        self.next_attempt_at = None;
        self.last_heartbeat = None;
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            self.state = state.clone();
            self.events.push_back(LinkEvent::StateChanged(state));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::transport::{LoopbackPeer, LoopbackTransport};

    fn controller_with_peer() -> (ConnectionController, LoopbackPeer) {
        let (transport, peer) = LoopbackTransport::pair();
        let config = SyncConfig {
            reconnect_base_delay: Duration::from_millis(100),
            max_reconnect_attempts: 3,
            ..SyncConfig::default()
        };
        (ConnectionController::new(Box::new(transport), &config), peer)
    }

    fn pong_frame(peer: &LoopbackPeer) {
        let frames = peer.take_frames();
        for frame in frames {
            if let Ok(ClientMessage::Ping { timestamp }) = wire::decode_client(&frame) {
                peer.send(wire::encode_server(&ServerMessage::Pong { timestamp }).unwrap());
            }
        }
    }

    fn drive_to_connected(
        controller: &mut ConnectionController,
        peer: &LoopbackPeer,
        now: Instant,
    ) {
        controller.poll(now);
        pong_frame(peer);
        controller.poll(now);
        assert!(controller.state().is_connected());
    }

    #[test]
    fn probe_ack_declares_connected() {
        let (mut controller, peer) = controller_with_peer();
        let now = Instant::now();

        controller.connect("loopback", now);
        assert_eq!(*controller.state(), ConnectionState::Connecting);
        drive_to_connected(&mut controller, &peer, now);
    }

    #[test]
    fn backoff_delays_grow_and_reset() {
        let (mut controller, peer) = controller_with_peer();
        let mut now = Instant::now();
        peer.refuse_next_opens(3);

        controller.connect("loopback", now);
        let mut delays = Vec::new();
        for _ in 0..3 {
            let delay = controller
                .next_attempt_in(now)
                .expect("retry should be scheduled");
            delays.push(delay);
            now += delay + Duration::from_millis(1);
            controller.poll(now);
        }

        assert!(delays[0] < delays[1] && delays[1] < delays[2]);

        // Fourth attempt is allowed through and succeeds.
        controller.poll(now);
        pong_frame(&peer);
        controller.poll(now);
        assert!(controller.state().is_connected());
        assert_eq!(controller.attempts(), 0);
    }

    #[test]
    fn attempt_budget_exhaustion_is_terminal() {
        let (mut controller, peer) = controller_with_peer();
        let mut now = Instant::now();
        peer.refuse_next_opens(10);

        controller.connect("loopback", now);
        for _ in 0..4 {
            if let Some(delay) = controller.next_attempt_in(now) {
                now += delay + Duration::from_millis(1);
                controller.poll(now);
            }
        }

        assert!(controller.state().is_terminal());
        assert!(controller.next_attempt_in(now).is_none());
    }

    #[test]
    fn manual_disconnect_suppresses_reconnect() {
        let (mut controller, peer) = controller_with_peer();
        let now = Instant::now();

        controller.connect("loopback", now);
        drive_to_connected(&mut controller, &peer, now);

        controller.disconnect(true);
        assert_eq!(*controller.state(), ConnectionState::Disconnected);
        assert!(controller.next_attempt_in(now).is_none());

        controller.poll(now + Duration::from_secs(60));
        assert_eq!(*controller.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn expected_close_is_benign() {
        let (mut controller, peer) = controller_with_peer();
        let now = Instant::now();

        controller.connect("loopback", now);
        drive_to_connected(&mut controller, &peer, now);

        peer.close(CLOSE_GOING_AWAY, "app backgrounded");
        controller.poll(now);
        assert_eq!(*controller.state(), ConnectionState::Disconnected);
        assert_eq!(controller.attempts(), 0);
    }

    #[test]
    fn unexpected_close_schedules_reconnect() {
        let (mut controller, peer) = controller_with_peer();
        let now = Instant::now();

        controller.connect("loopback", now);
        drive_to_connected(&mut controller, &peer, now);

        peer.close(4000, "carrier dropped");
        controller.poll(now);
        assert_eq!(
            *controller.state(),
            ConnectionState::Reconnecting { attempt: 1 }
        );
        assert!(controller.next_attempt_in(now).is_some());
    }

    #[test]
    fn background_widens_heartbeat() {
        let (mut controller, _peer) = controller_with_peer();
        let foreground = controller.heartbeat_interval();
        controller.set_backgrounded(true);
        assert!(controller.heartbeat_interval() > foreground);
    }

    #[test]
    fn foreground_resume_forces_fresh_connect() {
        let (mut controller, peer) = controller_with_peer();
        let now = Instant::now();

        controller.connect("loopback", now);
        drive_to_connected(&mut controller, &peer, now);

        controller.resume_foreground(now);
        assert_eq!(*controller.state(), ConnectionState::Connecting);
        drive_to_connected(&mut controller, &peer, now);
    }
}
