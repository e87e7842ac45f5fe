use thiserror::Error;

use super::interpolation::{InterpolatedWorld, Interpolator};
use super::snapshot::{SnapshotBuffer, WorldDelta, WorldEvent, WorldSnapshot};

/// The consistency engine. Owns the authoritative snapshot/delta buffer and
/// the interpolation state; the session layer reads from it and never
/// mutates it.
#[derive(Debug)]
pub struct StateReconciler {
    buffer: SnapshotBuffer,
    current: Option<WorldSnapshot>,
    interpolator: Interpolator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied { acked_seq: Option<u64> },
    /// Tick already applied; re-delivery changed nothing.
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("delta continues tick {got} but current tick is {expected}")]
    TickGap { expected: u64, got: u64 },
    #[error("delta received before any snapshot")]
    NoBaseSnapshot,
}

impl StateReconciler {
    pub fn new(snapshot_horizon_ms: u64, interpolation_delay_ms: u64) -> Self {
        Self {
            buffer: SnapshotBuffer::new(snapshot_horizon_ms),
            current: None,
            interpolator: Interpolator::new(interpolation_delay_ms),
        }
    }

    pub fn tick(&self) -> u64 {
        self.current.as_ref().map(|s| s.tick).unwrap_or(0)
    }

    pub fn latest(&self) -> Option<&WorldSnapshot> {
        self.current.as_ref()
    }

    /// Replaces the authoritative state wholesale. Stale or re-delivered
    /// ticks are ignored.
    pub fn apply_snapshot(&mut self, snapshot: WorldSnapshot) -> ReconcileOutcome {
        if let Some(current) = &self.current {
            if snapshot.tick <= current.tick {
                log::debug!(
                    "ignoring snapshot tick {} at current tick {}",
                    snapshot.tick,
                    current.tick
                );
                return ReconcileOutcome::Duplicate;
            }
        }

        let acked_seq = snapshot.last_input_seq;
        self.buffer.push(snapshot.clone());
        self.current = Some(snapshot);
        ReconcileOutcome::Applied { acked_seq }
    }

    /// Applies an incremental diff on top of the current tick. A delta whose
    /// `from_tick` does not match mutates nothing; the caller is expected to
    /// request a full resync instead.
    pub fn apply_delta(&mut self, delta: WorldDelta) -> Result<ReconcileOutcome, ReconcileError> {
        let Some(current) = &self.current else {
            return Err(ReconcileError::NoBaseSnapshot);
        };

        if delta.to_tick <= current.tick {
            return Ok(ReconcileOutcome::Duplicate);
        }
        if delta.from_tick != current.tick {
            return Err(ReconcileError::TickGap {
                expected: current.tick,
                got: delta.from_tick,
            });
        }

        let mut next = current.clone();
        next.tick = delta.to_tick;
        next.timestamp_ms = delta.timestamp_ms;
        if delta.last_input_seq.is_some() {
            next.last_input_seq = delta.last_input_seq;
        }

        // Whole-state replacement per player id.
        for changed in delta.players {
            match next
                .players
                .iter_mut()
                .find(|p| p.player_id == changed.player_id)
            {
                Some(existing) => *existing = changed,
                None => next.players.push(changed),
            }
        }

        for pin in delta.pins_added {
            if !next.pins.iter().any(|p| p.id == pin.id) {
                next.pins.push(pin);
            }
        }
        next.pins.retain(|p| !delta.pins_removed.contains(&p.id));

        for event in delta.events {
            match event {
                WorldEvent::PhaseChanged { phase } => next.phase = phase,
                WorldEvent::ScoreUpdated { team_id, score } => {
                    match next.scores.iter_mut().find(|s| s.team_id == team_id) {
                        Some(entry) => entry.score = score,
                        None => next.scores.push(super::model::TeamScore { team_id, score }),
                    }
                }
                WorldEvent::PlayerDisconnected { player_id } => {
                    next.players.retain(|p| p.player_id != player_id);
                }
            }
        }

        let acked_seq = next.last_input_seq;
        self.buffer.push(next.clone());
        self.current = Some(next);
        Ok(ReconcileOutcome::Applied { acked_seq })
    }

    /// Full resync: the buffered history predates the replacement state and
    /// is discarded with it.
    pub fn reset_to(&mut self, snapshot: WorldSnapshot) -> ReconcileOutcome {
        self.buffer.clear();
        let acked_seq = snapshot.last_input_seq;
        self.buffer.push(snapshot.clone());
        self.current = Some(snapshot);
        ReconcileOutcome::Applied { acked_seq }
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.current = None;
    }

    /// Interpolated render view for `now`, delayed by the configured
    /// interpolation delay.
    pub fn sample(&self, now_ms: u64) -> Option<InterpolatedWorld> {
        self.interpolator.sample(&self.buffer, now_ms)
    }

    pub fn sample_at(&self, render_ms: u64) -> Option<InterpolatedWorld> {
        self.interpolator.sample_at(&self.buffer, render_ms)
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::model::{Coordinate, Pin, PinKind, PlayerState};
    use uuid::Uuid;

    fn pin(id: Uuid) -> Pin {
        Pin {
            id,
            kind: PinKind::Waypoint,
            name: "rally".to_string(),
            coordinate: Coordinate {
                latitude: 48.0,
                longitude: 16.0,
            },
            owner_id: Uuid::new_v4(),
            team_id: None,
            created_at_ms: 0,
        }
    }

    fn delta(from: u64, to: u64) -> WorldDelta {
        WorldDelta {
            from_tick: from,
            to_tick: to,
            timestamp_ms: to * 100,
            players: Vec::new(),
            pins_added: Vec::new(),
            pins_removed: Vec::new(),
            events: Vec::new(),
            last_input_seq: None,
        }
    }

    #[test]
    fn delta_gap_mutates_nothing() {
        let mut reconciler = StateReconciler::new(2000, 100);
        reconciler.apply_snapshot(WorldSnapshot::new(3, 300));

        let result = reconciler.apply_delta(delta(5, 6));
        assert_eq!(
            result,
            Err(ReconcileError::TickGap {
                expected: 3,
                got: 5
            })
        );
        assert_eq!(reconciler.tick(), 3);
    }

    #[test]
    fn delta_before_snapshot_is_a_gap() {
        let mut reconciler = StateReconciler::new(2000, 100);
        assert_eq!(
            reconciler.apply_delta(delta(0, 1)),
            Err(ReconcileError::NoBaseSnapshot)
        );
    }

    #[test]
    fn duplicate_delta_is_noop() {
        let mut reconciler = StateReconciler::new(2000, 100);
        reconciler.apply_snapshot(WorldSnapshot::new(3, 300));
        reconciler.apply_delta(delta(3, 4)).unwrap();

        assert_eq!(
            reconciler.apply_delta(delta(3, 4)),
            Ok(ReconcileOutcome::Duplicate)
        );
        assert_eq!(reconciler.tick(), 4);
    }

    #[test]
    fn duplicate_snapshot_is_noop() {
        let mut reconciler = StateReconciler::new(2000, 100);
        reconciler.apply_snapshot(WorldSnapshot::new(3, 300));
        assert_eq!(
            reconciler.apply_snapshot(WorldSnapshot::new(3, 300)),
            ReconcileOutcome::Duplicate
        );
    }

    #[test]
    fn pin_insert_is_idempotent() {
        let mut reconciler = StateReconciler::new(2000, 100);
        let pin_id = Uuid::new_v4();

        let mut base = WorldSnapshot::new(1, 100);
        base.pins.push(pin(pin_id));
        reconciler.apply_snapshot(base);

        let mut d = delta(1, 2);
        d.pins_added.push(pin(pin_id));
        reconciler.apply_delta(d).unwrap();

        assert_eq!(reconciler.latest().unwrap().pins.len(), 1);
    }

    #[test]
    fn delta_players_replace_whole_state() {
        let mut reconciler = StateReconciler::new(2000, 100);
        let id = Uuid::new_v4();

        let mut base = WorldSnapshot::new(1, 100);
        base.players.push(PlayerState {
            player_id: id,
            location: None,
            team_id: Some(Uuid::new_v4()),
        });
        reconciler.apply_snapshot(base);

        let mut d = delta(1, 2);
        d.players.push(PlayerState {
            player_id: id,
            location: None,
            team_id: None,
        });
        reconciler.apply_delta(d).unwrap();

        let merged = reconciler.latest().unwrap();
        assert_eq!(merged.players.len(), 1);
        assert!(merged.players[0].team_id.is_none());
    }

    #[test]
    fn snapshot_carries_implied_ack() {
        let mut reconciler = StateReconciler::new(2000, 100);
        let mut snap = WorldSnapshot::new(1, 100);
        snap.last_input_seq = Some(4);

        assert_eq!(
            reconciler.apply_snapshot(snap),
            ReconcileOutcome::Applied {
                acked_seq: Some(4)
            }
        );
    }
}
