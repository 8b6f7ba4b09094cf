//! Peer-side session replica.
//!
//! A peer never mutates session state on its own: it replaces this
//! mirror wholesale from each `game_state_sync` and tracks the highest
//! envelope sequence it has applied, so stale or duplicated messages on
//! a reordered path are discarded instead of rewinding state.

use emberlink_protocol::{ParticipantId, SessionPhase, SessionSnapshot};

/// Read-only replica of the host's session state.
#[derive(Debug, Default)]
pub struct SessionMirror {
    state: Option<SessionSnapshot>,
    last_seq: u64,
}

impl SessionMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Option<&SessionSnapshot> {
        self.state.as_ref()
    }

    pub fn phase(&self) -> Option<SessionPhase> {
        self.state.as_ref().map(|s| s.phase)
    }

    pub fn turn_owner(&self) -> Option<ParticipantId> {
        self.state.as_ref().and_then(|s| s.turn_owner)
    }

    /// Highest envelope sequence applied so far.
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// Records an envelope sequence number. Returns `false` when the
    /// envelope is stale (older than one already applied) and must be
    /// discarded by the caller.
    pub fn observe_seq(&mut self, seq: u64) -> bool {
        if seq < self.last_seq {
            tracing::debug!(seq, last = self.last_seq, "stale envelope discarded");
            return false;
        }
        self.last_seq = seq;
        true
    }

    /// Replaces the replica with a full snapshot. Idempotent: applying
    /// the same snapshot twice leaves the mirror unchanged.
    pub fn apply_snapshot(&mut self, snapshot: SessionSnapshot) {
        tracing::trace!(
            session = %snapshot.session,
            phase = %snapshot.phase,
            sequence = snapshot.sequence,
            "session snapshot applied"
        );
        self.state = Some(snapshot);
    }

    /// Patches turn order and sequence from a `turn_order` broadcast,
    /// ahead of the next full snapshot. Dropped when nothing is
    /// mirrored yet.
    pub fn apply_turn_order(&mut self, order: Vec<ParticipantId>, sequence: u64) {
        let Some(state) = self.state.as_mut() else { return };
        state.turn_order = order;
        state.sequence = sequence;
        state.turn_owner = if state.turn_order.is_empty() {
            None
        } else {
            let idx = (sequence % state.turn_order.len() as u64) as usize;
            Some(state.turn_order[idx])
        };
    }

    pub fn clear(&mut self) {
        self.state = None;
        self.last_seq = 0;
    }
}
