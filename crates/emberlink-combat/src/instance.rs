//! Host-side combat instance: the authoritative encounter state machine.
//!
//! The instance is driven entirely by its owner (the session
//! coordinator): gauge ticks come in through [`CombatInstance::tick`],
//! peer actions through [`CombatInstance::submit_action`], and timeouts
//! or disconnects through [`CombatInstance::force_default_action`].
//! Every input returns the [`CombatEvent`]s it produced; the owner turns
//! those into wire messages and listener callbacks.
//!
//! Phase walk, per spec:
//!
//! ```text
//! WaitingForPlayers → CombatSetup → AtbProcessing ⇄ ActionSelection
//!                                        ▲              │
//!                                        │              ▼
//!                                  TurnResolution ← ActionExecution
//!                                        │
//!                                        └──→ CombatEnd (once)
//! ```

use std::collections::HashMap;
use std::time::{Duration, Instant};

use emberlink_protocol::{
    ActionKind, ActorId, CharacterSnapshot, CombatId, CombatPhase,
    CombatSnapshot, Controller, GAUGE_MAX, GaugeEntry, ParticipantId,
};

use crate::{ChosenAction, CombatError, EventLog, RuleEngine};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunables for one combat encounter.
#[derive(Debug, Clone)]
pub struct CombatConfig {
    /// Gauge level that grants the right to act.
    pub gauge_threshold: u32,
    /// Gauge points gained per point of speed per second.
    pub gauge_rate: f32,
    /// Minimum gauge drift since the last broadcast before another
    /// `atb_update` goes out. Bounds bandwidth.
    pub drift_threshold: u32,
    /// How long a prompted participant gets before the host defends on
    /// their behalf. Enforced by the coordinator's timer.
    pub action_timeout: Duration,
    /// Retained log lines.
    pub log_capacity: usize,
    /// Log lines included in the `combat_end` summary.
    pub summary_tail: usize,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            gauge_threshold: GAUGE_MAX,
            gauge_rate: 20.0,
            drift_threshold: 50,
            action_timeout: Duration::from_secs(30),
            log_capacity: EventLog::DEFAULT_CAPACITY,
            summary_tail: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Events and pending actions
// ---------------------------------------------------------------------------

/// What a combat input produced. The coordinator maps these onto wire
/// messages; `synthesized` never reaches the wire, so remote
/// participants cannot tell a default action from a real one.
#[derive(Debug, Clone, PartialEq)]
pub enum CombatEvent {
    /// The encounter left setup and gauges are running.
    Started,

    /// Gauges drifted past the broadcast threshold; contains every
    /// living actor's current level so one update heals all peers.
    GaugesDrifted(Vec<GaugeEntry>),

    /// A peer-controlled actor is ready; the host now awaits that
    /// participant's `combat_action` (bounded by the action timeout).
    AwaitingAction {
        actor: ActorId,
        participant: ParticipantId,
    },

    /// An action resolved through the rule engine.
    ActionResolved {
        actor: ActorId,
        target: ActorId,
        action: ActionKind,
        skill_name: Option<String>,
        damage: i32,
        target_hp: i32,
        /// Host-local bookkeeping only — identical on the wire.
        synthesized: bool,
    },

    /// An actor dropped to zero hit points.
    ActorDown { actor: ActorId },

    /// The encounter is over. Emitted exactly once.
    Ended { victory: bool, log_tail: Vec<String> },
}

/// An action between submission and resolution or timeout. Short-lived
/// by design; it never outlives the input that created it.
#[derive(Debug, Clone)]
pub struct PendingAction {
    pub participant: ParticipantId,
    pub actor: ActorId,
    pub action: ChosenAction,
    pub submitted_at: Instant,
}

// ---------------------------------------------------------------------------
// CombatInstance
// ---------------------------------------------------------------------------

/// Authoritative state for one encounter. Exists only on the host and
/// is dropped when the encounter ends.
pub struct CombatInstance {
    id: CombatId,
    host: ParticipantId,
    config: CombatConfig,
    phase: CombatPhase,
    turn: u32,
    party: Vec<CharacterSnapshot>,
    enemies: Vec<CharacterSnapshot>,
    /// Fractional gauge carry per actor; snapshots expose the integer.
    gauge_acc: HashMap<ActorId, f32>,
    /// Set while a peer actor is in `ActionSelection`.
    awaiting: Option<(ActorId, ParticipantId)>,
    pending: Option<PendingAction>,
    /// Gauge levels as of the last `GaugesDrifted` event.
    last_broadcast: HashMap<ActorId, u32>,
    log: EventLog,
    ended: bool,
}

impl CombatInstance {
    pub fn new(
        id: CombatId,
        host: ParticipantId,
        party: Vec<CharacterSnapshot>,
        enemies: Vec<CharacterSnapshot>,
        config: CombatConfig,
    ) -> Self {
        let gauge_acc = party
            .iter()
            .chain(enemies.iter())
            .map(|c| (c.id, c.gauge as f32))
            .collect();
        let log = EventLog::new(config.log_capacity);
        Self {
            id,
            host,
            config,
            phase: CombatPhase::WaitingForPlayers,
            turn: 0,
            party,
            enemies,
            gauge_acc,
            awaiting: None,
            pending: None,
            last_broadcast: HashMap::new(),
            log,
            ended: false,
        }
    }

    // -- Accessors --------------------------------------------------------

    pub fn id(&self) -> CombatId {
        self.id
    }

    pub fn phase(&self) -> CombatPhase {
        self.phase
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn is_over(&self) -> bool {
        self.phase == CombatPhase::CombatEnd
    }

    /// The actor/participant pair whose action is awaited, if any.
    pub fn awaiting(&self) -> Option<(ActorId, ParticipantId)> {
        self.awaiting
    }

    /// The action currently mid-resolution. Only ever `Some` while a
    /// rule-engine callback is on the stack.
    pub fn pending_action(&self) -> Option<&PendingAction> {
        self.pending.as_ref()
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn action_timeout(&self) -> Duration {
        self.config.action_timeout
    }

    /// Full state for the periodic `combat_state` broadcast.
    pub fn snapshot(&self) -> CombatSnapshot {
        CombatSnapshot {
            combat: self.id,
            phase: self.phase,
            turn: self.turn,
            party: self.party.clone(),
            enemies: self.enemies.clone(),
            awaiting: self.awaiting.map(|(actor, _)| actor),
        }
    }

    pub fn party(&self) -> &[CharacterSnapshot] {
        &self.party
    }

    pub fn enemies(&self) -> &[CharacterSnapshot] {
        &self.enemies
    }

    fn actor(&self, id: ActorId) -> Option<&CharacterSnapshot> {
        self.party
            .iter()
            .chain(self.enemies.iter())
            .find(|c| c.id == id)
    }

    fn actor_mut(&mut self, id: ActorId) -> Option<&mut CharacterSnapshot> {
        self.party
            .iter_mut()
            .chain(self.enemies.iter_mut())
            .find(|c| c.id == id)
    }

    // -- Inputs -----------------------------------------------------------

    /// Leaves setup: gauges start running. The coordinator broadcasts
    /// `combat_start` and resumes the gauge clock on the `Started`
    /// event.
    pub fn begin(&mut self) -> Vec<CombatEvent> {
        if self.phase != CombatPhase::WaitingForPlayers {
            return Vec::new();
        }
        self.phase = CombatPhase::CombatSetup;
        self.log.push(format!(
            "combat begins: {} against {}",
            self.party.len(),
            self.enemies.len()
        ));
        self.phase = CombatPhase::AtbProcessing;
        tracing::info!(combat = %self.id, "combat started");
        vec![CombatEvent::Started]
    }

    /// Advances every living actor's gauge by one fixed timestep and
    /// resolves or prompts whoever became ready.
    pub fn tick(
        &mut self,
        engine: &mut dyn RuleEngine,
        dt: Duration,
    ) -> Vec<CombatEvent> {
        if self.phase != CombatPhase::AtbProcessing {
            return Vec::new();
        }

        let mut events = Vec::new();
        self.fill_gauges(dt);

        // Party before enemies, stable within each side: ties resolve
        // deterministically so host and tests agree.
        let ready: Vec<ActorId> = self
            .party
            .iter()
            .chain(self.enemies.iter())
            .filter(|c| c.is_alive() && c.gauge >= self.config.gauge_threshold)
            .map(|c| c.id)
            .collect();

        for actor_id in ready {
            if self.phase != CombatPhase::AtbProcessing {
                break;
            }
            // May have died to an earlier resolution this tick.
            let Some(actor) = self.actor(actor_id) else { continue };
            if !actor.is_alive() {
                continue;
            }

            match actor.controller {
                Controller::Npc => {
                    events.extend(self.auto_resolve(actor_id, None, engine));
                }
                Controller::Participant(pid) if pid == self.host => {
                    events.extend(self.auto_resolve(actor_id, Some(pid), engine));
                }
                Controller::Participant(pid) => {
                    self.phase = CombatPhase::ActionSelection;
                    self.awaiting = Some((actor_id, pid));
                    tracing::debug!(
                        combat = %self.id,
                        actor = %actor_id,
                        participant = %pid,
                        "awaiting peer action"
                    );
                    events.push(CombatEvent::AwaitingAction {
                        actor: actor_id,
                        participant: pid,
                    });
                }
            }
        }

        if let Some(drift) = self.take_drifted_gauges() {
            events.push(CombatEvent::GaugesDrifted(drift));
        }

        events
    }

    /// Applies a participant's submitted action.
    ///
    /// # Errors
    /// Returns [`CombatError::ActionRejected`] — and mutates nothing —
    /// unless the sender is the awaited participant, the actor is alive
    /// with a full gauge, and the target exists. The reason goes back
    /// to the sender only.
    pub fn submit_action(
        &mut self,
        sender: ParticipantId,
        action: ChosenAction,
        engine: &mut dyn RuleEngine,
    ) -> Result<Vec<CombatEvent>, CombatError> {
        if self.phase != CombatPhase::ActionSelection {
            return Err(CombatError::ActionRejected(
                "no action is being awaited".into(),
            ));
        }
        let (actor_id, expected) =
            self.awaiting.ok_or_else(|| {
                CombatError::ActionRejected("no action is being awaited".into())
            })?;
        if sender != expected {
            return Err(CombatError::ActionRejected(format!(
                "it is not {sender}'s turn to act"
            )));
        }
        if action.kind == ActionKind::Skill && action.skill_name.is_none() {
            return Err(CombatError::ActionRejected(
                "skill action requires a skill name".into(),
            ));
        }

        let actor = self
            .actor(actor_id)
            .ok_or_else(|| CombatError::ActionRejected("unknown actor".into()))?;
        if !actor.is_alive() {
            return Err(CombatError::ActionRejected("actor is down".into()));
        }
        if actor.gauge < self.config.gauge_threshold {
            return Err(CombatError::ActionRejected(
                "readiness gauge is not full".into(),
            ));
        }
        if self.actor(action.target).is_none() {
            return Err(CombatError::ActionRejected(format!(
                "unknown target {}",
                action.target
            )));
        }

        Ok(self.execute(actor_id, sender, action, engine, false))
    }

    /// Resolves the awaited actor with the synthesized default action.
    ///
    /// Called on exactly one of: action timeout, the awaited
    /// participant disconnecting, or session end. The resulting events
    /// broadcast identically to a real action.
    pub fn force_default_action(
        &mut self,
        engine: &mut dyn RuleEngine,
    ) -> Vec<CombatEvent> {
        let Some((actor_id, participant)) = self.awaiting else {
            return Vec::new();
        };
        tracing::info!(
            combat = %self.id,
            actor = %actor_id,
            %participant,
            "synthesizing default action"
        );
        let action = ChosenAction::default_for(actor_id);
        self.execute(actor_id, participant, action, engine, true)
    }

    /// Reacts to a participant dropping out mid-combat: any awaited
    /// action resolves as a timeout-default (never silently dropped),
    /// and their actors fall to rule-engine control.
    pub fn participant_disconnected(
        &mut self,
        participant: ParticipantId,
        engine: &mut dyn RuleEngine,
    ) -> Vec<CombatEvent> {
        let mut events = Vec::new();
        if matches!(self.awaiting, Some((_, pid)) if pid == participant) {
            events.extend(self.force_default_action(engine));
        }
        for actor in self
            .party
            .iter_mut()
            .chain(self.enemies.iter_mut())
            .filter(|c| c.controller == Controller::Participant(participant))
        {
            actor.controller = Controller::Npc;
        }
        events
    }

    // -- Internals --------------------------------------------------------

    fn fill_gauges(&mut self, dt: Duration) {
        let rate = self.config.gauge_rate;
        let threshold = self.config.gauge_threshold;
        for actor in self.party.iter_mut().chain(self.enemies.iter_mut()) {
            if !actor.is_alive() {
                continue;
            }
            let acc = self.gauge_acc.entry(actor.id).or_insert(0.0);
            *acc += actor.speed as f32 * rate * dt.as_secs_f32();
            actor.gauge = (*acc as u32).min(threshold);
        }
    }

    /// Resolves an actor the host controls directly (NPC, enemy, or the
    /// host's own character) without entering `ActionSelection`.
    fn auto_resolve(
        &mut self,
        actor_id: ActorId,
        participant: Option<ParticipantId>,
        engine: &mut dyn RuleEngine,
    ) -> Vec<CombatEvent> {
        let is_party = self.party.iter().any(|c| c.id == actor_id);
        let Some(actor) = self.actor(actor_id).cloned() else {
            return Vec::new();
        };
        let (allies, foes) = if is_party {
            (&self.party, &self.enemies)
        } else {
            (&self.enemies, &self.party)
        };
        let action = engine.auto_action(&actor, allies, foes);
        let participant = participant.unwrap_or(self.host);
        self.execute(actor_id, participant, action, engine, false)
    }

    fn execute(
        &mut self,
        actor_id: ActorId,
        participant: ParticipantId,
        action: ChosenAction,
        engine: &mut dyn RuleEngine,
        synthesized: bool,
    ) -> Vec<CombatEvent> {
        let Some(actor) = self.actor(actor_id).cloned() else {
            return Vec::new();
        };
        // Engines can return a stale target; fall back to self rather
        // than dropping the turn.
        let mut action = action;
        if self.actor(action.target).is_none() {
            action.target = actor_id;
        }
        let target = match self.actor(action.target) {
            Some(t) => t.clone(),
            None => actor.clone(),
        };

        self.phase = CombatPhase::ActionExecution;
        self.pending = Some(PendingAction {
            participant,
            actor: actor_id,
            action: action.clone(),
            submitted_at: Instant::now(),
        });

        let outcome = engine.resolve(&actor, &target, &action);

        let mut events = Vec::new();

        // Apply the outcome.
        let mut target_hp = target.hp;
        if let Some(t) = self.actor_mut(action.target) {
            t.hp = (t.hp - outcome.damage).clamp(0, t.max_hp);
            target_hp = t.hp;
        }
        if let Some(a) = self.actor_mut(actor_id) {
            a.gauge = outcome.actor_gauge;
        }
        self.gauge_acc.insert(actor_id, outcome.actor_gauge as f32);

        self.log.push(describe_action(
            &actor.name,
            &target.name,
            &action,
            outcome.damage,
        ));
        for effect in &outcome.effects {
            self.log.push(effect.clone());
        }

        events.push(CombatEvent::ActionResolved {
            actor: actor_id,
            target: action.target,
            action: action.kind,
            skill_name: action.skill_name.clone(),
            damage: outcome.damage,
            target_hp,
            synthesized,
        });

        if target_hp == 0 && target.hp > 0 {
            self.log.push(format!("{} is down", target.name));
            events.push(CombatEvent::ActorDown {
                actor: action.target,
            });
        }

        self.phase = CombatPhase::TurnResolution;
        self.turn += 1;
        self.pending = None;
        self.awaiting = None;

        if let Some(victory) = self.outcome_if_decided() {
            events.extend(self.finish(victory));
        } else {
            self.phase = CombatPhase::AtbProcessing;
        }

        events
    }

    /// `Some(victory)` once either side has no living members.
    fn outcome_if_decided(&self) -> Option<bool> {
        if !self.enemies.iter().any(|c| c.is_alive()) {
            Some(true)
        } else if !self.party.iter().any(|c| c.is_alive()) {
            Some(false)
        } else {
            None
        }
    }

    fn finish(&mut self, victory: bool) -> Vec<CombatEvent> {
        if self.ended {
            return Vec::new();
        }
        self.ended = true;
        self.phase = CombatPhase::CombatEnd;
        self.log.push(if victory {
            "the party is victorious".to_string()
        } else {
            "the party has fallen".to_string()
        });
        tracing::info!(combat = %self.id, victory, "combat ended");
        vec![CombatEvent::Ended {
            victory,
            log_tail: self.log.tail(self.config.summary_tail),
        }]
    }

    /// Gauges for a drift-triggered broadcast, or `None` while every
    /// actor is within the threshold of its last broadcast value.
    fn take_drifted_gauges(&mut self) -> Option<Vec<GaugeEntry>> {
        let drifted = self
            .party
            .iter()
            .chain(self.enemies.iter())
            .filter(|c| c.is_alive())
            .any(|c| {
                let last = self.last_broadcast.get(&c.id).copied().unwrap_or(0);
                c.gauge.abs_diff(last) >= self.config.drift_threshold
            });
        if !drifted {
            return None;
        }

        let entries: Vec<GaugeEntry> = self
            .party
            .iter()
            .chain(self.enemies.iter())
            .filter(|c| c.is_alive())
            .map(|c| GaugeEntry {
                actor: c.id,
                gauge: c.gauge,
            })
            .collect();
        for entry in &entries {
            self.last_broadcast.insert(entry.actor, entry.gauge);
        }
        Some(entries)
    }
}

/// One log line per resolved action. Synthesized defaults read exactly
/// like chosen ones.
fn describe_action(
    actor: &str,
    target: &str,
    action: &ChosenAction,
    damage: i32,
) -> String {
    match action.kind {
        ActionKind::Attack => {
            format!("{actor} attacks {target} for {damage}")
        }
        ActionKind::Skill => {
            let skill = action.skill_name.as_deref().unwrap_or("?");
            format!("{actor} uses {skill} on {target} for {damage}")
        }
        ActionKind::Item => format!("{actor} uses an item on {target}"),
        ActionKind::Defend => format!("{actor} defends"),
        ActionKind::Escape => format!("{actor} tries to escape"),
    }
}
