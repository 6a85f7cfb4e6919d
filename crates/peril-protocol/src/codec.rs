//! Codec trait and implementations for message bodies.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! The broker never looks inside a body; it only carries the bytes and a
//! content-type tag. The publisher picks an [`Encoding`], the tag travels
//! with the message, and the subscriber picks the matching codec from the
//! tag instead of assuming one format.
//!
//! Two encodings are provided:
//!
//! - [`Encoding::Json`] via [`JsonCodec`]: human-readable, easy to inspect
//!   in the broker's management UI.
//! - [`Encoding::Binary`] via [`BincodeCodec`]: compact, used for the
//!   append-only game log stream.

use std::fmt;

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// Content type tag for JSON bodies.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Content type tag for bincode bodies.
pub const CONTENT_TYPE_BINARY: &str = "application/octet-stream+bincode";

/// Older tag for the binary stream, still accepted on decode.
pub const CONTENT_TYPE_GOB: &str = "application/gob";

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// ## Trait bounds
///
/// - `Send + Sync + 'static` so a codec can live inside a spawned
///   subscription task.
///
/// `DeserializeOwned` (vs plain `Deserialize`) means the decoded value
/// owns all its data, so the delivery buffer can be dropped right after
/// decoding.
pub trait Codec: Send + Sync + 'static {
    /// The content type tag written next to bodies produced by this codec.
    fn content_type(&self) -> &'static str;

    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns an encode variant of [`ProtocolError`] if the value can't be
    /// represented in this format.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns a decode variant of [`ProtocolError`] if the bytes are
    /// malformed, truncated, or describe a different type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ```rust
/// use peril_protocol::{Codec, JsonCodec, PlayingState};
///
/// let bytes = JsonCodec.encode(&PlayingState { is_paused: true }).unwrap();
/// let back: PlayingState = JsonCodec.decode(&bytes).unwrap();
/// assert!(back.is_paused);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn content_type(&self) -> &'static str {
        CONTENT_TYPE_JSON
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::JsonEncode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::JsonDecode)
    }
}

// ---------------------------------------------------------------------------
// BincodeCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses bincode's compact binary layout.
///
/// Not self-describing: both sides must agree on the type, which the
/// routing key already guarantees.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn content_type(&self) -> &'static str {
        CONTENT_TYPE_BINARY
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        bincode::serialize(value).map_err(ProtocolError::BinaryEncode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        bincode::deserialize(data).map_err(ProtocolError::BinaryDecode)
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Which codec produced (or should produce) a body.
///
/// Publishers choose one; the choice is written on the message as its
/// content type so subscribers can select the decoder at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Encoding {
    /// Structured text, see [`JsonCodec`].
    #[default]
    Json,
    /// Compact binary, see [`BincodeCodec`].
    Binary,
}

impl Encoding {
    /// The content type tag for this encoding.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Json => JsonCodec.content_type(),
            Self::Binary => BincodeCodec.content_type(),
        }
    }

    /// Maps a content type tag back to an encoding.
    ///
    /// Parameters after `;` (e.g. `; charset=utf-8`) are ignored.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            CONTENT_TYPE_JSON => Some(Self::Json),
            CONTENT_TYPE_BINARY | CONTENT_TYPE_GOB => Some(Self::Binary),
            _ => None,
        }
    }

    /// Encodes `value` with this encoding.
    pub fn encode<T: Serialize>(self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        match self {
            Self::Json => JsonCodec.encode(value),
            Self::Binary => BincodeCodec.encode(value),
        }
    }

    /// Decodes `data` with this encoding.
    pub fn decode<T: DeserializeOwned>(self, data: &[u8]) -> Result<T, ProtocolError> {
        match self {
            Self::Json => JsonCodec.decode(data),
            Self::Binary => BincodeCodec.decode(data),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.content_type())
    }
}

/// Encodes a value and returns the body together with its content type.
pub fn encode<T: Serialize>(
    value: &T,
    encoding: Encoding,
) -> Result<(Vec<u8>, &'static str), ProtocolError> {
    let body = encoding.encode(value)?;
    Ok((body, encoding.content_type()))
}

/// Decodes a body, selecting the codec from the delivery's content type.
///
/// # Errors
/// [`ProtocolError::UnknownContentType`] when the tag is missing or not
/// recognised, otherwise whatever the selected codec reports.
pub fn decode<T: DeserializeOwned>(
    data: &[u8],
    content_type: Option<&str>,
) -> Result<T, ProtocolError> {
    let encoding = content_type
        .and_then(Encoding::from_content_type)
        .ok_or_else(|| ProtocolError::UnknownContentType(content_type.map(str::to_owned)))?;
    encoding.decode(data)
}
