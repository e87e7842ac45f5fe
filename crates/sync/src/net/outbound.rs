use std::collections::VecDeque;

use super::transport::TransportError;
use super::wire::ClientMessage;

#[derive(Debug, Clone)]
struct OutboundMessage {
    message: ClientMessage,
    attempts: u32,
}

/// Holds messages that cannot be sent yet. `enqueue` always succeeds;
/// session lifetimes are short and the message rate is seconds-scale, so an
/// unbounded queue is fine. Each message gets a bounded number of send
/// attempts and is then dropped rather than flooding a recovering link with
/// stale state.
#[derive(Debug)]
pub struct OutboundQueue {
    pending: VecDeque<OutboundMessage>,
    max_attempts: u32,
}

impl OutboundQueue {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            pending: VecDeque::new(),
            max_attempts,
        }
    }

    pub fn enqueue(&mut self, message: ClientMessage) {
        self.pending.push_back(OutboundMessage {
            message,
            attempts: 0,
        });
    }

    /// Tries to send every queued message in FIFO order. Messages whose
    /// attempt budget ran out are dropped and handed back so the caller can
    /// report them.
    pub fn flush<F>(&mut self, mut send: F) -> Vec<ClientMessage>
    where
        F: FnMut(&ClientMessage) -> Result<(), TransportError>,
    {
        let mut dropped = Vec::new();
        let mut kept = VecDeque::new();

        while let Some(mut item) = self.pending.pop_front() {
            item.attempts += 1;
            match send(&item.message) {
                Ok(()) => {}
                Err(e) if item.attempts >= self.max_attempts => {
                    log::warn!(
                        "dropping outbound message after {} attempts: {e}",
                        item.attempts
                    );
                    dropped.push(item.message);
                }
                Err(_) => kept.push_back(item),
            }
        }

        self.pending = kept;
        dropped
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
