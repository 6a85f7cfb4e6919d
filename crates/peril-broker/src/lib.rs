//! Broker abstraction layer for Peril.
//!
//! Provides the [`Broker`], [`BrokerChannel`], [`DeliveryStream`] and
//! [`Delivery`] traits that the dispatcher is written against, plus the
//! topology declarator ([`declare_and_bind`]) and two implementations:
//!
//! - [`AmqpBroker`]: a real AMQP 0-9-1 broker via `lapin`
//!   (feature `amqp`, on by default).
//! - [`MemoryBroker`]: an in-process broker with the same exchange,
//!   queue, acknowledgment, and dead-letter semantics, used by tests.
//!
//! Every async trait method returns a `Send` future so callers can drive
//! them from tasks spawned on the multi-threaded Tokio runtime.

#[cfg(feature = "amqp")]
mod amqp;
mod error;
mod memory;
mod topic;
mod topology;

#[cfg(feature = "amqp")]
pub use amqp::{AmqpBroker, AmqpChannel, AmqpDeliveries, AmqpDelivery};
pub use error::{BoxError, TopologyError, TransportError};
pub use memory::{
    MemoryBroker, MemoryChannel, MemoryConnection, MemoryDeliveries, MemoryDelivery,
    Resolution, ResolutionRecord, StoredMessage,
};
pub use topic::topic_matches;
pub use topology::{declare_and_bind, declare_peril_topology};

use std::fmt;
use std::future::Future;

// ---------------------------------------------------------------------------
// Topology parameters
// ---------------------------------------------------------------------------

/// How long a declared queue lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Durability {
    /// Named queue that survives broker restarts and is never
    /// auto-deleted. Used for shared work queues and archival.
    Durable,
    /// Queue exclusive to the declaring connection and deleted when that
    /// connection closes. Used for per-client state.
    Transient,
}

impl Durability {
    /// Survives a broker restart.
    pub fn is_durable(self) -> bool {
        matches!(self, Self::Durable)
    }

    /// Only the declaring connection may consume from it.
    pub fn is_exclusive(self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Removed once the declaring connection goes away.
    pub fn is_auto_delete(self) -> bool {
        matches!(self, Self::Transient)
    }
}

impl fmt::Display for Durability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Durable => write!(f, "durable"),
            Self::Transient => write!(f, "transient"),
        }
    }
}

/// Exchange routing behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeKind {
    /// Routing key must equal the binding key.
    Direct,
    /// Binding keys may use `*` (one word) and `#` (zero or more words).
    Topic,
    /// Every bound queue receives every message.
    Fanout,
}

/// Limits on unacknowledged deliveries held by a consumer.
///
/// Bounds consumer memory and gives basic backpressure: once `count`
/// deliveries are outstanding the broker stops pushing until some are
/// resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prefetch {
    /// Maximum outstanding deliveries.
    pub count: u16,
    /// Maximum outstanding bytes (0 = unlimited). Enforced by
    /// [`MemoryBroker`]; RabbitMQ does not implement a byte ceiling, so
    /// [`AmqpBroker`] sends only the count.
    pub size: u32,
    /// Apply the limit across the whole channel rather than per consumer.
    pub global: bool,
}

impl Default for Prefetch {
    fn default() -> Self {
        Self {
            count: 10,
            size: 1000,
            global: true,
        }
    }
}

/// What the broker reports after declaring a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueInfo {
    pub name: String,
    pub message_count: u32,
    pub consumer_count: u32,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// A connection to a message broker. One per process.
pub trait Broker: Send + Sync + 'static {
    /// The logical channel type multiplexed over this connection.
    type Channel: BrokerChannel;

    /// Opens a new channel. Each subscription gets its own.
    fn open_channel(&self) -> impl Future<Output = Result<Self::Channel, TransportError>> + Send;
}

/// A logical channel: declares topology, publishes, and consumes.
pub trait BrokerChannel: Send + Sync + 'static {
    /// The stream of deliveries returned by [`consume`](Self::consume).
    type Deliveries: DeliveryStream;

    /// Declares an exchange (idempotent if it already exists with the same
    /// kind).
    fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
    ) -> impl Future<Output = Result<(), TopologyError>> + Send;

    /// Declares a queue with the given durability class. When
    /// `dead_letter_exchange` is set, rejected messages are re-published
    /// there instead of being dropped.
    fn declare_queue(
        &self,
        name: &str,
        durability: Durability,
        dead_letter_exchange: Option<&str>,
    ) -> impl Future<Output = Result<QueueInfo, TopologyError>> + Send;

    /// Binds `queue` to `exchange` under `binding_key`.
    fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        binding_key: &str,
    ) -> impl Future<Output = Result<(), TopologyError>> + Send;

    /// Sets the unacknowledged-delivery limit for consumers started later
    /// on this channel.
    fn set_prefetch(
        &self,
        prefetch: Prefetch,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Publishes a body to an exchange. No mandatory or immediate flags:
    /// unroutable messages are dropped by the broker.
    fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        content_type: &str,
        body: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Starts consuming from `queue` with manual acknowledgment.
    fn consume(
        &self,
        queue: &str,
    ) -> impl Future<Output = Result<Self::Deliveries, TransportError>> + Send;

    /// Closes the channel. Unacknowledged deliveries return to their queue.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// A continuous stream of deliveries from one consumer.
pub trait DeliveryStream: Send + 'static {
    /// A single delivery.
    type Delivery: Delivery;

    /// Waits for the next delivery.
    ///
    /// Returns `None` once the consumer is cancelled or its channel closes.
    fn next(
        &mut self,
    ) -> impl Future<Output = Option<Result<Self::Delivery, TransportError>>> + Send;
}

/// One message handed to a consumer, awaiting resolution.
///
/// `ack` and `nack` take `self` by value: a delivery can be resolved at
/// most once, and the compiler enforces it.
pub trait Delivery: Send + 'static {
    /// The raw message body.
    fn body(&self) -> &[u8];

    /// The content type tag set by the publisher, if any.
    fn content_type(&self) -> Option<&str>;

    /// The routing key the message was published with.
    fn routing_key(&self) -> &str;

    /// `true` if this message was delivered before and not acknowledged.
    fn redelivered(&self) -> bool;

    /// Positive acknowledgment: remove the message from the queue.
    fn ack(self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Negative acknowledgment. `requeue = true` asks for redelivery;
    /// `false` routes the message to the queue's dead-letter exchange.
    fn nack(self, requeue: bool) -> impl Future<Output = Result<(), TransportError>> + Send;
}
