use serde::{Deserialize, Serialize};

use super::model::{GamePhase, Pin, PinId, PlayerId, PlayerState, TeamId, TeamScore};

pub const DEFAULT_SNAPSHOT_HORIZON_MS: u64 = 2000;

/// Complete authoritative world state at one server tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldSnapshot {
    pub tick: u64,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
    pub players: Vec<PlayerState>,
    pub pins: Vec<Pin>,
    #[serde(default)]
    pub phase: GamePhase,
    #[serde(default)]
    pub scores: Vec<TeamScore>,
    /// Highest locally-issued input sequence the peer has folded in, if the
    /// peer reports one. Used as an implied cumulative acknowledgment.
    #[serde(default)]
    pub last_input_seq: Option<u64>,
}

impl WorldSnapshot {
    pub fn new(tick: u64, timestamp_ms: u64) -> Self {
        Self {
            tick,
            timestamp_ms,
            players: Vec::new(),
            pins: Vec::new(),
            phase: GamePhase::default(),
            scores: Vec::new(),
            last_input_seq: None,
        }
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerState> {
        self.players.iter().find(|p| p.player_id == id)
    }

    pub fn pin(&self, id: PinId) -> Option<&Pin> {
        self.pins.iter().find(|p| p.id == id)
    }
}

/// Incremental diff between two ticks. Player entries are whole-state
/// replacements per id, not field-level merges.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldDelta {
    pub from_tick: u64,
    pub to_tick: u64,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
    #[serde(default)]
    pub players: Vec<PlayerState>,
    #[serde(default)]
    pub pins_added: Vec<Pin>,
    #[serde(default)]
    pub pins_removed: Vec<PinId>,
    #[serde(default)]
    pub events: Vec<WorldEvent>,
    #[serde(default)]
    pub last_input_seq: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum WorldEvent {
    PhaseChanged { phase: GamePhase },
    ScoreUpdated { team_id: TeamId, score: u32 },
    PlayerDisconnected { player_id: PlayerId },
}

/// Which buffered snapshots surround a render timestamp.
#[derive(Debug)]
pub enum Bracket<'a> {
    Pair {
        from: &'a WorldSnapshot,
        to: &'a WorldSnapshot,
        alpha: f32,
    },
    Latest(&'a WorldSnapshot),
    Empty,
}

/// Time-ordered snapshot history for interpolation. Entries older than
/// `newest - horizon` are evicted on every push, bounding memory no matter
/// how long a session runs.
#[derive(Debug)]
pub struct SnapshotBuffer {
    snapshots: Vec<WorldSnapshot>,
    horizon_ms: u64,
}

impl SnapshotBuffer {
    pub fn new(horizon_ms: u64) -> Self {
        Self {
            snapshots: Vec::new(),
            horizon_ms,
        }
    }

    /// Records a snapshot, keeping the buffer ordered by timestamp. A tick
    /// already present is a duplicate delivery and is not recorded again.
    pub fn push(&mut self, snapshot: WorldSnapshot) -> bool {
        if self.snapshots.iter().any(|s| s.tick == snapshot.tick) {
            return false;
        }

        let insert_pos = self
            .snapshots
            .iter()
            .position(|s| s.timestamp_ms > snapshot.timestamp_ms)
            .unwrap_or(self.snapshots.len());
        self.snapshots.insert(insert_pos, snapshot);

        if let Some(newest) = self.snapshots.last().map(|s| s.timestamp_ms) {
            let cutoff = newest.saturating_sub(self.horizon_ms);
            self.snapshots.retain(|s| s.timestamp_ms >= cutoff);
        }

        true
    }

    pub fn latest(&self) -> Option<&WorldSnapshot> {
        self.snapshots.last()
    }

    /// Finds the pair of snapshots whose timestamps bracket `render_ms` and
    /// the fractional position between them. With fewer than two entries, or
    /// a render time outside the buffered range, the latest snapshot is
    /// handed back unmodified.
    pub fn bracket(&self, render_ms: u64) -> Bracket<'_> {
        if self.snapshots.len() < 2 {
            return match self.snapshots.last() {
                Some(snapshot) => Bracket::Latest(snapshot),
                None => Bracket::Empty,
            };
        }

        for pair in self.snapshots.windows(2) {
            let (from, to) = (&pair[0], &pair[1]);
            if from.timestamp_ms <= render_ms && render_ms <= to.timestamp_ms {
                let span = to.timestamp_ms - from.timestamp_ms;
                let alpha = if span > 0 {
                    (render_ms - from.timestamp_ms) as f32 / span as f32
                } else {
                    0.0
                };
                return Bracket::Pair {
                    from,
                    to,
                    alpha: alpha.clamp(0.0, 1.0),
                };
            }
        }

        match self.snapshots.last() {
            Some(snapshot) => Bracket::Latest(snapshot),
            None => Bracket::Empty,
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn horizon_eviction() {
        let mut buffer = SnapshotBuffer::new(2000);

        buffer.push(WorldSnapshot::new(1, 1000));
        buffer.push(WorldSnapshot::new(2, 1500));
        buffer.push(WorldSnapshot::new(9, 2500));
        buffer.push(WorldSnapshot::new(10, 4000));

        // entries at t=1000 and t=1500 fell outside the 2000ms horizon
        // behind t=4000
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.latest().unwrap().tick, 10);
        match buffer.bracket(1200) {
            Bracket::Latest(s) => assert_eq!(s.tick, 10),
            other => panic!("expected latest fallback, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_tick_not_recorded() {
        let mut buffer = SnapshotBuffer::new(2000);

        assert!(buffer.push(WorldSnapshot::new(5, 100)));
        assert!(!buffer.push(WorldSnapshot::new(5, 100)));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn bracket_selects_surrounding_pair() {
        let mut buffer = SnapshotBuffer::new(10_000);
        buffer.push(WorldSnapshot::new(1, 1000));
        buffer.push(WorldSnapshot::new(2, 2000));
        buffer.push(WorldSnapshot::new(3, 3000));

        match buffer.bracket(2500) {
            Bracket::Pair { from, to, alpha } => {
                assert_eq!(from.tick, 2);
                assert_eq!(to.tick, 3);
                assert!((alpha - 0.5).abs() < f32::EPSILON);
            }
            other => panic!("expected pair, got {other:?}"),
        }
    }

    #[test]
    fn bracket_falls_back_to_latest() {
        let mut buffer = SnapshotBuffer::new(10_000);
        assert!(matches!(buffer.bracket(500), Bracket::Empty));

        buffer.push(WorldSnapshot::new(1, 1000));
        match buffer.bracket(500) {
            Bracket::Latest(snapshot) => assert_eq!(snapshot.tick, 1),
            other => panic!("expected latest, got {other:?}"),
        }
    }
}
