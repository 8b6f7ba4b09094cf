//! Codec trait and the JSON implementation.
//!
//! A codec converts between Rust values and raw bytes. The interesting
//! part here is [`Codec::decode_envelope`]: incoming envelopes are read
//! in two phases so an unknown `type` tag can be told apart from a
//! malformed message. Unknown kinds are dropped silently (a newer peer
//! may speak kinds we don't know yet); malformed bytes are logged and
//! dropped; everything else decodes into a fully typed [`Envelope`].

use serde::{Serialize, de::DeserializeOwned};

use crate::{Envelope, MessageKind, ProtocolError};

/// A codec that can encode values to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because codecs are stored in long-lived
/// server state shared across tokio tasks.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes into a value of a known type.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Malformed`] on any decode failure.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;

    /// Decodes an incoming envelope with unknown-kind classification.
    ///
    /// # Errors
    /// - [`ProtocolError::Malformed`] — the bytes are not a well-formed
    ///   envelope of any kind.
    /// - [`ProtocolError::UnknownKind`] — well-formed, but the `type`
    ///   tag is not declared in this protocol version.
    fn decode_envelope(&self, data: &[u8]) -> Result<Envelope, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// Human-readable, which keeps wire captures debuggable during
/// development. Behind the default `json` feature so a binary codec can
/// replace it without touching this crate's dependents.
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Malformed)
    }

    fn decode_envelope(&self, data: &[u8]) -> Result<Envelope, ProtocolError> {
        // Phase 1: parse to a raw value and classify the kind tag.
        let raw: serde_json::Value =
            serde_json::from_slice(data).map_err(ProtocolError::Malformed)?;

        if let Some(tag) = raw.get("type").and_then(|t| t.as_str()) {
            if MessageKind::from_wire_tag(tag).is_none() {
                return Err(ProtocolError::UnknownKind(tag.to_string()));
            }
        }

        // Phase 2: typed decode. A declared tag with the wrong field
        // shape still counts as malformed.
        serde_json::from_value(raw).map_err(ProtocolError::Malformed)
    }
}
