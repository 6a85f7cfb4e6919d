//! Error types for the broker layer.

/// Boxed source error from a concrete broker client.
///
/// The AMQP and in-memory brokers raise different error types; boxing
/// keeps `TransportError` the same whichever one is compiled in.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors talking to the broker: connection, channel, publish, consume,
/// and acknowledgment failures.
///
/// These are fatal to the affected publish call or subscription. The
/// core never retries them on its own.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Opening the connection failed (bad URL, refused, auth).
    #[error("connect failed: {0}")]
    Connect(#[source] BoxError),

    /// Opening, configuring, or closing a channel failed.
    #[error("channel error: {0}")]
    Channel(#[source] BoxError),

    /// The broker did not accept a published message.
    #[error("publish to {exchange:?} with key {routing_key:?} failed: {source}")]
    Publish {
        exchange: String,
        routing_key: String,
        #[source]
        source: BoxError,
    },

    /// Starting a consumer or receiving a delivery failed.
    #[error("consume from {queue:?} failed: {source}")]
    Consume {
        queue: String,
        #[source]
        source: BoxError,
    },

    /// Sending an ack or nack failed.
    #[error("acknowledgment failed: {0}")]
    Ack(#[source] BoxError),

    /// The connection or channel is already closed.
    #[error("connection closed: {0}")]
    Closed(String),
}

/// Errors declaring broker-side routing (exchanges, queues, bindings).
///
/// Fatal to the subscription attempt that triggered the declaration.
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    /// The broker refused to declare an exchange.
    #[error("declare exchange {exchange:?} failed: {source}")]
    Exchange {
        exchange: String,
        #[source]
        source: BoxError,
    },

    /// The broker refused to declare a queue.
    #[error("declare queue {queue:?} failed: {source}")]
    Declare {
        queue: String,
        #[source]
        source: BoxError,
    },

    /// The queue exists with a different durability class.
    #[error("queue {queue:?} already exists with incompatible durability")]
    DurabilityMismatch { queue: String },

    /// The queue is exclusive to another connection.
    #[error("queue {queue:?} is locked by another connection")]
    Locked { queue: String },

    /// Binding the queue to the exchange failed.
    #[error("bind {queue:?} to {exchange:?} with {binding_key:?} failed: {source}")]
    Bind {
        queue: String,
        exchange: String,
        binding_key: String,
        #[source]
        source: BoxError,
    },
}
