pub mod alert;
pub mod client;
pub mod config;
pub mod net;
pub mod session;
pub mod time;
pub mod world;

pub use alert::{Alert, AlertKind, AlertSink, AlertUrgency, LogAlertSink};
pub use client::{GameTransportClient, SyncClient};
pub use config::SyncConfig;
pub use net::{
    BackoffPolicy, ClientMessage, CloseReason, ConnectionController, ConnectionState, InputKind,
    InputPayload, InputSequencer, LinkEvent, LinkStats, LoopbackPeer, LoopbackTransport,
    MessageTransport, OutboundQueue, QueuedInput, ServerMessage, SessionState, TransportError,
    TransportEvent, WireError,
};
pub use session::{
    GameSession, MemoryDirectory, SessionDirectory, SessionError, SessionEvent, SessionManager,
};
pub use world::{
    ChatMessage, Coordinate, GamePhase, GeoPosition, InterpolatedPlayer, InterpolatedWorld,
    Interpolator, MessageId, Pin, PinId, PinKind, Player, PlayerId, PlayerState, ReconcileError,
    ReconcileOutcome, SnapshotBuffer, StateReconciler, Team, TeamId, TeamScore, WorldDelta,
    WorldEvent, WorldSnapshot,
};
