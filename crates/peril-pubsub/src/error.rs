//! Error types for the dispatcher.

use peril_broker::{TopologyError, TransportError};
use peril_protocol::ProtocolError;

/// Errors surfaced by [`publish`](crate::publish) and
/// [`subscribe`](crate::subscribe).
///
/// Errors inside a running subscription never reach the caller: a bad
/// delivery is logged and discarded, and a broken stream ends only that
/// subscription.
#[derive(Debug, thiserror::Error)]
pub enum PubSubError {
    /// Encoding a value before publishing failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The broker connection or channel failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Declaring or binding the subscription's queue failed.
    #[error(transparent)]
    Topology(#[from] TopologyError),

    /// The subscription task panicked or was aborted.
    #[error("subscription task for {queue:?} failed: {reason}")]
    TaskFailed { queue: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err: PubSubError = TransportError::Closed("gone".into()).into();
        assert!(matches!(err, PubSubError::Transport(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_topology_error() {
        let err: PubSubError = TopologyError::DurabilityMismatch {
            queue: "war".into(),
        }
        .into();
        assert!(matches!(err, PubSubError::Topology(_)));
    }

    #[test]
    fn test_from_protocol_error() {
        let err: PubSubError = ProtocolError::UnknownContentType(None).into();
        assert!(matches!(err, PubSubError::Protocol(_)));
    }
}
