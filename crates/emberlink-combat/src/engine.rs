//! The `RuleEngine` trait — the seam to the external combat rule system.
//!
//! Damage formulas, skill effects, and enemy AI live outside this
//! repository. The synchronizer hands the engine fully populated
//! snapshots and applies whatever comes back; it never inspects how the
//! numbers were produced.

use emberlink_protocol::{ActionKind, ActorId, CharacterSnapshot};

/// A concrete action choice: what to do, to whom, with which skill.
#[derive(Debug, Clone, PartialEq)]
pub struct ChosenAction {
    pub kind: ActionKind,
    pub target: ActorId,
    pub skill_name: Option<String>,
}

impl ChosenAction {
    /// The synthesized default used when a participant never answers:
    /// defend, targeting the actor itself.
    pub fn default_for(actor: ActorId) -> Self {
        Self {
            kind: ActionKind::Defend,
            target: actor,
            skill_name: None,
        }
    }
}

/// What the rule engine decided an action does.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    /// Hit points removed from the target (negative values heal).
    pub damage: i32,
    /// Human-readable side-effect descriptions, opaque to this layer.
    pub effects: Vec<String>,
    /// The actor's gauge after acting. Usually 0; engines may grant a
    /// head start for fast actions.
    pub actor_gauge: u32,
}

/// The external combat rule collaborator.
///
/// `&mut self` because real engines carry RNG state; `Send + 'static`
/// because the instance that owns it lives inside a tokio task.
pub trait RuleEngine: Send + 'static {
    /// Resolves one action into its outcome.
    fn resolve(
        &mut self,
        actor: &CharacterSnapshot,
        target: &CharacterSnapshot,
        action: &ChosenAction,
    ) -> ActionOutcome;

    /// Picks an action for an actor the host controls directly (its own
    /// character, and NPC/enemy actors).
    fn auto_action(
        &mut self,
        actor: &CharacterSnapshot,
        allies: &[CharacterSnapshot],
        foes: &[CharacterSnapshot],
    ) -> ChosenAction;
}
