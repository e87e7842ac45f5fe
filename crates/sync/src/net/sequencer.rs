use std::collections::VecDeque;

use crate::world::{GeoPosition, Pin, PinId, PlayerId};

use super::wire::ClientMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    LocationUpdate,
    AddPin,
    RemovePin,
}

#[derive(Debug, Clone)]
pub enum InputPayload {
    Location(GeoPosition),
    Pin(Pin),
    PinRemoval(PinId),
}

impl InputPayload {
    pub fn kind(&self) -> InputKind {
        match self {
            InputPayload::Location(_) => InputKind::LocationUpdate,
            InputPayload::Pin(_) => InputKind::AddPin,
            InputPayload::PinRemoval(_) => InputKind::RemovePin,
        }
    }
}

/// A locally-issued action awaiting authoritative acknowledgment.
#[derive(Debug, Clone)]
pub struct QueuedInput {
    pub seq: u64,
    pub kind: InputKind,
    pub payload: InputPayload,
    pub timestamp_ms: u64,
    pub retries: u32,
}

impl QueuedInput {
    pub fn to_message(&self, player_id: PlayerId) -> ClientMessage {
        match &self.payload {
            InputPayload::Location(location) => ClientMessage::LocationUpdate {
                seq: self.seq,
                player_id,
                location: *location,
            },
            InputPayload::Pin(pin) => ClientMessage::AddPin {
                seq: self.seq,
                pin: pin.clone(),
            },
            InputPayload::PinRemoval(pin_id) => ClientMessage::RemovePin {
                seq: self.seq,
                pin_id: *pin_id,
            },
        }
    }
}

/// Assigns a strictly increasing sequence number to every locally-issued
/// action and tracks the peer's sliding acknowledgment window. Sequence
/// numbers start at 1 and are never reused within a session.
#[derive(Debug)]
pub struct InputSequencer {
    next_seq: u64,
    pending: VecDeque<QueuedInput>,
    last_acked: u64,
}

impl Default for InputSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl InputSequencer {
    pub fn new() -> Self {
        Self {
            next_seq: 1,
            pending: VecDeque::new(),
            last_acked: 0,
        }
    }

    pub fn submit(&mut self, payload: InputPayload, timestamp_ms: u64) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push_back(QueuedInput {
            seq,
            kind: payload.kind(),
            payload,
            timestamp_ms,
            retries: 0,
        });
        seq
    }

    /// Cumulative acknowledgment: resolving N resolves every pending
    /// sequence ≤ N. Returns how many inputs were resolved.
    pub fn acknowledge(&mut self, seq: u64) -> usize {
        if seq <= self.last_acked {
            return 0;
        }
        self.last_acked = seq;

        let before = self.pending.len();
        self.pending.retain(|input| input.seq > seq);
        before - self.pending.len()
    }

    /// Rebuilds wire messages for every still-unacknowledged input so they
    /// can be re-sent after a reconnect, charging one retry each. Inputs
    /// past the retry bound are dropped instead of replayed forever.
    pub fn replay_messages(
        &mut self,
        player_id: PlayerId,
        max_retries: u32,
    ) -> Vec<ClientMessage> {
        let before = self.pending.len();
        self.pending.retain_mut(|input| {
            input.retries += 1;
            input.retries <= max_retries
        });
        let dropped = before - self.pending.len();
        if dropped > 0 {
            log::warn!("dropped {dropped} unacknowledged inputs past the retry bound");
        }

        self.pending
            .iter()
            .map(|input| input.to_message(player_id))
            .collect()
    }

    pub fn pending(&self) -> impl Iterator<Item = &QueuedInput> {
        self.pending.iter()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn last_acked(&self) -> u64 {
        self.last_acked
    }

    /// New session, fresh window.
    pub fn reset(&mut self) {
        self.next_seq = 1;
        self.pending.clear();
        self.last_acked = 0;
    }
}
