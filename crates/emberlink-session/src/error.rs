//! Error types for the session layer.

use emberlink_protocol::{ParticipantId, SessionPhase};

/// Errors that can occur during session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The requested phase change is not an edge of the lifecycle
    /// graph. Rejected with no state change.
    #[error("invalid session transition: {from} -> {to}")]
    InvalidTransition {
        from: SessionPhase,
        to: SessionPhase,
    },

    /// No participant slots left.
    #[error("session is full ({max} participants)")]
    SessionFull { max: usize },

    /// The participant is already a member.
    #[error("participant {0} already joined")]
    AlreadyJoined(ParticipantId),

    /// The participant is not a member.
    #[error("participant {0} is not a member")]
    NotAMember(ParticipantId),

    /// Too few ready participants to start. The host is notified; the
    /// session stays in the lobby.
    #[error("need {need} participants to start, have {have}")]
    InsufficientParticipants { have: usize, need: usize },

    /// The coordinator task is gone or its channel is full.
    #[error("session coordinator is unavailable")]
    Unavailable,

    #[error(transparent)]
    Combat(#[from] emberlink_combat::CombatError),
}
