//! Wire protocol for Peril.
//!
//! This crate defines what clients and the server put on the broker:
//!
//! - **Types** ([`PlayingState`], [`ArmyMove`], [`RecognitionOfWar`],
//!   [`GameLog`]): the message bodies.
//! - **Routing** ([`routing`]): exchange names and routing keys.
//! - **Codec** ([`Codec`], [`Encoding`]): how bodies are converted to and
//!   from bytes, and how the content-type tag selects the decoder.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Broker (bytes + content type) → Protocol (typed message) → Game
//! ```

mod codec;
mod error;
pub mod routing;
mod types;

pub use codec::{
    decode, encode, BincodeCodec, Codec, Encoding, JsonCodec, CONTENT_TYPE_BINARY,
    CONTENT_TYPE_GOB, CONTENT_TYPE_JSON,
};
pub use error::ProtocolError;
pub use types::{ArmyMove, GameLog, PlayerSnapshot, PlayingState, RecognitionOfWar};
