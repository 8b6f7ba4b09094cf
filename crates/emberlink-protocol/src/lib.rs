//! Wire protocol for Emberlink.
//!
//! This crate defines the "language" that the host and its peers speak:
//!
//! - **Types** ([`Envelope`], [`Payload`], [`MessageKind`], snapshots) —
//!   the message structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how those messages are
//!   converted to/from bytes, including the two-phase envelope decode
//!   that distinguishes malformed input from unknown-but-well-formed
//!   message kinds.
//! - **Validation** — per-kind semantic checks that run before any
//!   message is applied to state.
//! - **Errors** ([`ProtocolError`]) — what can go wrong on the boundary.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and the session
//! coordinator (participant context). It doesn't know about connections,
//! turn order, or combat rules — only message shapes.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Coordinator (session context)
//! ```

mod codec;
mod error;
mod types;
mod validate;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    ActionKind, ActorId, CharacterSnapshot, CombatId, CombatPhase,
    CombatSnapshot, Controller, Envelope, GaugeEntry, MessageKind,
    ParticipantEntry, ParticipantId, Payload, Role, SessionId,
    SessionPhase, SessionSnapshot,
};
pub use validate::validate;

/// Readiness gauges run on a fixed 0–1000 scale; crossing the top grants
/// the right to act.
pub const GAUGE_MAX: u32 = 1000;

/// The current protocol version. Carried in the handshake; mismatched
/// peers are rejected before joining.
pub const PROTOCOL_VERSION: u32 = 1;
