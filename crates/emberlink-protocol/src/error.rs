//! Error types for the protocol layer.

/// Errors that can occur on the protocol boundary.
///
/// The three decode outcomes deliberately differ in how callers react:
/// `Malformed` is logged and dropped, `UnknownKind` is dropped silently
/// (forward compatibility with newer peers), and `Validation` earns the
/// sender an explicit `rejected` reply.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The bytes could not be decoded into an envelope at all —
    /// truncated input, invalid JSON, or a shape mismatch.
    #[cfg(feature = "json")]
    #[error("malformed message: {0}")]
    Malformed(serde_json::Error),

    /// A structurally valid envelope whose `type` tag is not a declared
    /// kind. Dropped without a reply so older hosts tolerate newer peers.
    #[error("unknown message kind: {0}")]
    UnknownKind(String),

    /// Decoded cleanly but semantically invalid — wrong field domain,
    /// missing conditional field, and so on. Never applied to state.
    #[error("validation failed: {0}")]
    Validation(String),
}
