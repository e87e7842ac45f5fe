use super::model::{GamePhase, Pin, PlayerId, PlayerState, TeamId, TeamScore};
use super::snapshot::{Bracket, SnapshotBuffer};

pub const DEFAULT_INTERPOLATION_DELAY_MS: u64 = 100;

/// A player marker ready for rendering, produced by sampling the snapshot
/// buffer at a render timestamp. Players without a known location are not
/// emitted; there is nothing to draw for them.
#[derive(Debug, Clone)]
pub struct InterpolatedPlayer {
    pub id: PlayerId,
    pub latitude: f64,
    pub longitude: f64,
    pub heading: Option<f32>,
    pub speed: Option<f32>,
    pub team_id: Option<TeamId>,
}

impl InterpolatedPlayer {
    fn passthrough(state: &PlayerState) -> Option<Self> {
        let location = state.location.as_ref()?;
        Some(Self {
            id: state.player_id,
            latitude: location.latitude,
            longitude: location.longitude,
            heading: location.heading,
            speed: location.speed,
            team_id: state.team_id,
        })
    }
}

#[derive(Debug, Clone)]
pub struct InterpolatedWorld {
    pub tick: u64,
    pub render_ms: u64,
    pub players: Vec<InterpolatedPlayer>,
    pub pins: Vec<Pin>,
    pub phase: GamePhase,
    pub scores: Vec<TeamScore>,
}

/// Samples the snapshot buffer at `now - delay`, smoothing over the discrete
/// arrival times of network updates. The delay deliberately renders slightly
/// in the past so jitter stays inside the buffered window.
#[derive(Debug, Clone)]
pub struct Interpolator {
    delay_ms: u64,
}

impl Interpolator {
    pub fn new(delay_ms: u64) -> Self {
        Self { delay_ms }
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay_ms
    }

    pub fn sample(&self, buffer: &SnapshotBuffer, now_ms: u64) -> Option<InterpolatedWorld> {
        let render_ms = now_ms.saturating_sub(self.delay_ms);
        self.sample_at(buffer, render_ms)
    }

    /// Samples at an explicit render timestamp.
    pub fn sample_at(&self, buffer: &SnapshotBuffer, render_ms: u64) -> Option<InterpolatedWorld> {
        match buffer.bracket(render_ms) {
            Bracket::Empty => None,
            Bracket::Latest(snapshot) => Some(InterpolatedWorld {
                tick: snapshot.tick,
                render_ms,
                players: snapshot
                    .players
                    .iter()
                    .filter_map(InterpolatedPlayer::passthrough)
                    .collect(),
                pins: snapshot.pins.clone(),
                phase: snapshot.phase,
                scores: snapshot.scores.clone(),
            }),
            Bracket::Pair { from, to, alpha } => {
                let mut players = Vec::with_capacity(to.players.len());
                for to_state in &to.players {
                    let interpolated = match from.player(to_state.player_id) {
                        Some(from_state) => interpolate_player(from_state, to_state, alpha),
                        // Just appeared in the newer snapshot; nothing to
                        // interpolate from.
                        None => InterpolatedPlayer::passthrough(to_state),
                    };
                    if let Some(player) = interpolated {
                        players.push(player);
                    }
                }

                // Pins and scores are discrete; take them from the newer side.
                Some(InterpolatedWorld {
                    tick: to.tick,
                    render_ms,
                    players,
                    pins: to.pins.clone(),
                    phase: to.phase,
                    scores: to.scores.clone(),
                })
            }
        }
    }
}

impl Default for Interpolator {
    fn default() -> Self {
        Self::new(DEFAULT_INTERPOLATION_DELAY_MS)
    }
}

fn interpolate_player(
    from: &PlayerState,
    to: &PlayerState,
    alpha: f32,
) -> Option<InterpolatedPlayer> {
    let to_loc = to.location.as_ref()?;
    let Some(from_loc) = from.location.as_ref() else {
        return InterpolatedPlayer::passthrough(to);
    };

    let t = alpha as f64;
    let heading = match (from_loc.heading, to_loc.heading) {
        (Some(a), Some(b)) => Some(lerp_heading(a, b, alpha)),
        _ => to_loc.heading,
    };
    let speed = match (from_loc.speed, to_loc.speed) {
        (Some(a), Some(b)) => Some(a + (b - a) * alpha),
        _ => to_loc.speed,
    };

    Some(InterpolatedPlayer {
        id: to.player_id,
        latitude: from_loc.latitude + (to_loc.latitude - from_loc.latitude) * t,
        longitude: from_loc.longitude + (to_loc.longitude - from_loc.longitude) * t,
        heading,
        speed,
        team_id: to.team_id,
    })
}

/// Interpolates a compass heading along the shortest arc, so 350° to 10°
/// passes through north instead of sweeping the long way around.
pub fn lerp_heading(from: f32, to: f32, t: f32) -> f32 {
    let mut delta = (to - from) % 360.0;
    if delta > 180.0 {
        delta -= 360.0;
    } else if delta < -180.0 {
        delta += 360.0;
    }
    (from + delta * t).rem_euclid(360.0)
}
