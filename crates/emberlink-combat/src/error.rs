//! Error types for the combat layer.

/// Errors that can occur while driving a combat encounter.
#[derive(Debug, thiserror::Error)]
pub enum CombatError {
    /// The submitted action was refused — wrong actor, wrong phase,
    /// gauge not ready, or a dead participant in the formula. The
    /// reason goes back to the sender only; nothing is broadcast and
    /// no state changes.
    #[error("action rejected: {0}")]
    ActionRejected(String),

    /// No encounter is currently running.
    #[error("no active combat")]
    NotActive,
}
