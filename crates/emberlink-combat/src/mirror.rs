//! Peer-side combat replica.
//!
//! Peers never simulate. The mirror holds the last state the host
//! broadcast, patched by incremental `atb_update` and `damage_dealt`
//! messages in between full snapshots. Every full snapshot replaces the
//! mirror wholesale, so applying the same snapshot twice is a no-op and
//! a missed incremental heals on the next broadcast.

use emberlink_protocol::{ActorId, CombatPhase, CombatSnapshot, GaugeEntry};

/// Replica of the host's combat state on a peer.
#[derive(Debug, Default)]
pub struct CombatMirror {
    state: Option<CombatSnapshot>,
    log: Vec<String>,
}

impl CombatMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an encounter is currently mirrored.
    pub fn in_combat(&self) -> bool {
        self.state
            .as_ref()
            .is_some_and(|s| s.phase != CombatPhase::CombatEnd)
    }

    pub fn state(&self) -> Option<&CombatSnapshot> {
        self.state.as_ref()
    }

    /// Log lines accumulated from resolved actions, oldest first.
    pub fn log(&self) -> &[String] {
        &self.log
    }

    /// Replaces the replica with a full snapshot. Idempotent.
    pub fn apply_snapshot(&mut self, snapshot: CombatSnapshot) {
        tracing::trace!(
            combat = %snapshot.combat,
            phase = ?snapshot.phase,
            turn = snapshot.turn,
            "combat snapshot applied"
        );
        self.state = Some(snapshot);
    }

    /// Patches gauge levels from an incremental `atb_update`. Dropped
    /// silently when no encounter is mirrored; the next full snapshot
    /// carries the same data anyway.
    pub fn apply_gauges(&mut self, gauges: &[GaugeEntry]) {
        let Some(state) = self.state.as_mut() else { return };
        for entry in gauges {
            if let Some(actor) = state
                .party
                .iter_mut()
                .chain(state.enemies.iter_mut())
                .find(|c| c.id == entry.actor)
            {
                actor.gauge = entry.gauge;
            }
        }
    }

    /// Patches a target's hit points from a `damage_dealt` message and
    /// records the line in the local log.
    pub fn apply_damage(&mut self, target: ActorId, target_hp: i32, line: String) {
        if let Some(state) = self.state.as_mut() {
            if let Some(actor) = state
                .party
                .iter_mut()
                .chain(state.enemies.iter_mut())
                .find(|c| c.id == target)
            {
                actor.hp = target_hp.clamp(0, actor.max_hp);
            }
        }
        self.log.push(line);
    }

    /// Marks the encounter ended and appends the host's summary tail.
    pub fn apply_end(&mut self, log_tail: &[String]) {
        if let Some(state) = self.state.as_mut() {
            state.phase = CombatPhase::CombatEnd;
            state.awaiting = None;
        }
        for line in log_tail {
            if !self.log.contains(line) {
                self.log.push(line.clone());
            }
        }
    }

    /// Drops the replica entirely (session left, new encounter coming).
    pub fn clear(&mut self) {
        self.state = None;
        self.log.clear();
    }
}
