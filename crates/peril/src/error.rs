//! Unified error type for Peril.

use peril_broker::{TopologyError, TransportError};
use peril_game::GameError;
use peril_protocol::ProtocolError;
use peril_pubsub::PubSubError;

use crate::shell::CommandError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum PerilError {
    /// Encoding or decoding a message body.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Broker connection, channel, publish or ack failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Declaring or binding exchanges and queues.
    #[error(transparent)]
    Topology(#[from] TopologyError),

    /// Publishing or subscribing.
    #[error(transparent)]
    PubSub(#[from] PubSubError),

    /// A rejected local command or an unavailable game state.
    #[error(transparent)]
    Game(#[from] GameError),

    /// A shell line that could not be parsed.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Writing the game log archive.
    #[error("game log archive: {0}")]
    Io(#[from] std::io::Error),
}
