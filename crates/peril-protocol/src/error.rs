//! Error types for the protocol layer.
//!
//! Each Peril crate defines its own error enum. A `ProtocolError` always
//! means the problem is in turning values into bytes or bytes back into
//! values, never in the broker connection or the game rules.

/// Errors that can occur while encoding or decoding a message body.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// JSON serialization failed.
    #[error("json encode failed: {0}")]
    JsonEncode(#[source] serde_json::Error),

    /// JSON deserialization failed: malformed text, missing fields,
    /// or a body that belongs to another message type.
    #[error("json decode failed: {0}")]
    JsonDecode(#[source] serde_json::Error),

    /// Binary serialization failed.
    #[error("binary encode failed: {0}")]
    BinaryEncode(#[source] bincode::Error),

    /// Binary deserialization failed (truncated or foreign bytes).
    #[error("binary decode failed: {0}")]
    BinaryDecode(#[source] bincode::Error),

    /// The delivery carried a content type no codec understands,
    /// or no content type at all.
    #[error("unsupported content type: {0:?}")]
    UnknownContentType(Option<String>),
}

impl ProtocolError {
    /// Returns `true` for errors raised while reading a body.
    ///
    /// Decode failures are the ones a subscriber sees; they are
    /// resolved by discarding the delivery.
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            Self::JsonDecode(_)
                | Self::BinaryDecode(_)
                | Self::UnknownContentType(_)
        )
    }
}
