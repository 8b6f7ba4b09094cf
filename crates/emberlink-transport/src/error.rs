//! Error types for the transport layer.
//!
//! All of these are non-fatal to the process: the coordinator reacts by
//! removing a participant (and possibly handing off the host role),
//! never by tearing the session down.

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding the listening endpoint failed (port in use, permission).
    #[error("bind failed: {0}")]
    Bind(#[source] std::io::Error),

    /// An outbound connection could not be established.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Sending data failed after the single retry.
    #[error("send failed: {0}")]
    Send(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    Receive(#[source] std::io::Error),

    /// The remote side is gone.
    #[error("disconnected: {0}")]
    Disconnected(String),
}
