//! Handler outcomes and how they map onto broker acknowledgments.

use std::fmt;

use peril_broker::{Delivery, TransportError};

/// What a handler wants done with the delivery it just processed.
///
/// Handlers never touch the broker's acknowledgment primitives; they return
/// one of these and the dispatcher resolves the delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AckType {
    /// Processed. Remove it from the queue.
    Ack,
    /// Not processed now, try again. Used when a follow-up action failed
    /// transiently or the message belongs to another consumer.
    NackRequeue,
    /// Valid but inapplicable, or malformed. Never redeliver; route to the
    /// dead-letter exchange.
    NackDiscard,
}

impl fmt::Display for AckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ack => write!(f, "ack"),
            Self::NackRequeue => write!(f, "nack-requeue"),
            Self::NackDiscard => write!(f, "nack-discard"),
        }
    }
}

/// Resolves `delivery` according to `outcome`. Consumes the delivery, so
/// it is resolved exactly once.
pub async fn resolve<D: Delivery>(delivery: D, outcome: AckType) -> Result<(), TransportError> {
    match outcome {
        AckType::Ack => delivery.ack().await,
        AckType::NackRequeue => delivery.nack(true).await,
        AckType::NackDiscard => delivery.nack(false).await,
    }
}
