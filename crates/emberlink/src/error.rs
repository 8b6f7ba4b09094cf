//! Unified error type for the Emberlink stack.

use emberlink_combat::CombatError;
use emberlink_protocol::ProtocolError;
use emberlink_session::SessionError;
use emberlink_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// Users of the `emberlink` meta-crate deal with this single type; the
/// `#[from]` impls let `?` convert sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum EmberlinkError {
    /// A transport-level error (bind, connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, validation).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (membership, lifecycle).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A combat-level error (rejected action, no active combat).
    #[error(transparent)]
    Combat(#[from] CombatError),

    /// The remote side refused the handshake.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// An I/O error outside the transport layer (e.g. querying the
    /// listener's local address).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
