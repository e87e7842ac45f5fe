//! Transport seam between the connection controller and whatever carries
//! frames: a websocket in production, the in-memory loopback here for tests
//! and the offline simulator.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use thiserror::Error;

pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_GOING_AWAY: u16 = 1001;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Whether this close is an expected one. 1000 is a clean shutdown and
    /// 1001 is what mobile platforms produce when suspending the socket for
    /// a backgrounded app; neither counts as a connection failure.
    pub fn is_expected(&self) -> bool {
        matches!(self.code, CLOSE_NORMAL | CLOSE_GOING_AWAY)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Frame(String),
    Closed(CloseReason),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not open")]
    NotOpen,
    #[error("open failed: {0}")]
    OpenFailed(String),
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// One bidirectional message channel. Implementations never block: `send` is
/// fire-and-forget and `poll` drains whatever arrived since the last call,
/// in arrival order.
pub trait MessageTransport: Send {
    fn open(&mut self, address: &str) -> Result<(), TransportError>;
    fn send(&mut self, frame: &str) -> Result<(), TransportError>;
    fn poll(&mut self) -> Vec<TransportEvent>;
    fn close(&mut self, code: u16);
    fn is_open(&self) -> bool;
}

#[derive(Debug, Default)]
struct Shared {
    to_peer: VecDeque<String>,
    client_events: VecDeque<TransportEvent>,
    open: bool,
    refuse_opens: u32,
    drop_client_frames: bool,
}

/// In-memory transport pair. The [`LoopbackTransport`] side plugs into the
/// connection controller; the [`LoopbackPeer`] side is driven by a test or
/// the simulator playing the authoritative peer, with knobs to refuse opens
/// and drop frames for failure injection.
#[derive(Debug)]
pub struct LoopbackTransport {
    shared: Arc<Mutex<Shared>>,
}

#[derive(Debug, Clone)]
pub struct LoopbackPeer {
    shared: Arc<Mutex<Shared>>,
}

impl LoopbackTransport {
    pub fn pair() -> (Self, LoopbackPeer) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        (
            Self {
                shared: Arc::clone(&shared),
            },
            LoopbackPeer { shared },
        )
    }
}

impl MessageTransport for LoopbackTransport {
    fn open(&mut self, _address: &str) -> Result<(), TransportError> {
        let mut shared = self.shared.lock().unwrap();
        if shared.refuse_opens > 0 {
            shared.refuse_opens -= 1;
            return Err(TransportError::OpenFailed("connection refused".to_string()));
        }
        shared.to_peer.clear();
        shared.client_events.clear();
        shared.open = true;
        shared.client_events.push_back(TransportEvent::Opened);
        Ok(())
    }

    fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        let mut shared = self.shared.lock().unwrap();
        if !shared.open {
            return Err(TransportError::NotOpen);
        }
        if shared.drop_client_frames {
            return Ok(());
        }
        shared.to_peer.push_back(frame.to_string());
        Ok(())
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        let mut shared = self.shared.lock().unwrap();
        shared.client_events.drain(..).collect()
    }

    fn close(&mut self, _code: u16) {
        let mut shared = self.shared.lock().unwrap();
        shared.open = false;
        shared.to_peer.clear();
        shared.client_events.clear();
    }

    fn is_open(&self) -> bool {
        self.shared.lock().unwrap().open
    }
}

impl LoopbackPeer {
    /// Frames the client has sent, in order.
    pub fn take_frames(&self) -> Vec<String> {
        let mut shared = self.shared.lock().unwrap();
        shared.to_peer.drain(..).collect()
    }

    pub fn send(&self, frame: impl Into<String>) {
        let mut shared = self.shared.lock().unwrap();
        if shared.open {
            shared
                .client_events
                .push_back(TransportEvent::Frame(frame.into()));
        }
    }

    /// Closes the link from the peer side; the client observes a `Closed`
    /// event with this code on its next poll.
    pub fn close(&self, code: u16, reason: impl Into<String>) {
        let mut shared = self.shared.lock().unwrap();
        if shared.open {
            shared.open = false;
            shared
                .client_events
                .push_back(TransportEvent::Closed(CloseReason::new(code, reason)));
        }
    }

    pub fn refuse_next_opens(&self, count: u32) {
        self.shared.lock().unwrap().refuse_opens = count;
    }

    pub fn set_drop_client_frames(&self, drop: bool) {
        self.shared.lock().unwrap().drop_client_frames = drop;
    }

    pub fn is_open(&self) -> bool {
        self.shared.lock().unwrap().open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_travel_both_ways() {
        let (mut transport, peer) = LoopbackTransport::pair();
        transport.open("loopback").unwrap();
        assert_eq!(transport.poll(), vec![TransportEvent::Opened]);

        transport.send("hello").unwrap();
        assert_eq!(peer.take_frames(), vec!["hello".to_string()]);

        peer.send("world");
        assert_eq!(
            transport.poll(),
            vec![TransportEvent::Frame("world".to_string())]
        );
    }

    #[test]
    fn refused_open_reports_error() {
        let (mut transport, peer) = LoopbackTransport::pair();
        peer.refuse_next_opens(1);

        assert!(transport.open("loopback").is_err());
        assert!(transport.open("loopback").is_ok());
    }

    #[test]
    fn peer_close_surfaces_code() {
        let (mut transport, peer) = LoopbackTransport::pair();
        transport.open("loopback").unwrap();
        transport.poll();

        peer.close(CLOSE_GOING_AWAY, "suspending");
        let events = transport.poll();
        match &events[0] {
            TransportEvent::Closed(reason) => {
                assert_eq!(reason.code, CLOSE_GOING_AWAY);
                assert!(reason.is_expected());
            }
            other => panic!("expected close, got {other:?}"),
        }
    }

    #[test]
    fn send_without_open_fails() {
        let (mut transport, _peer) = LoopbackTransport::pair();
        assert!(matches!(
            transport.send("hello"),
            Err(TransportError::NotOpen)
        ));
    }
}
