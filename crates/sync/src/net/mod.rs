pub mod connection;
pub mod outbound;
pub mod sequencer;
pub mod transport;
pub mod wire;

pub use connection::{BackoffPolicy, ConnectionController, ConnectionState, LinkEvent, LinkStats};
pub use outbound::OutboundQueue;
pub use sequencer::{InputKind, InputPayload, InputSequencer, QueuedInput};
pub use transport::{
    CloseReason, LoopbackPeer, LoopbackTransport, MessageTransport, TransportError,
    TransportEvent, CLOSE_GOING_AWAY, CLOSE_NORMAL,
};
pub use wire::{
    decode_client, decode_server, encode_client, encode_server, ClientMessage, ServerMessage,
    SessionState, WireError, ERR_SESSION_NOT_FOUND,
};
