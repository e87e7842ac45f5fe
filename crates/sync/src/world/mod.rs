pub mod interpolation;
pub mod model;
pub mod reconciler;
pub mod snapshot;

pub use interpolation::{
    lerp_heading, InterpolatedPlayer, InterpolatedWorld, Interpolator,
    DEFAULT_INTERPOLATION_DELAY_MS,
};
pub use model::{
    ChatMessage, Coordinate, GamePhase, GeoPosition, MessageId, Pin, PinId, PinKind, Player,
    PlayerId, PlayerState, Team, TeamId, TeamScore,
};
pub use reconciler::{ReconcileError, ReconcileOutcome, StateReconciler};
pub use snapshot::{
    Bracket, SnapshotBuffer, WorldDelta, WorldEvent, WorldSnapshot, DEFAULT_SNAPSHOT_HORIZON_MS,
};
