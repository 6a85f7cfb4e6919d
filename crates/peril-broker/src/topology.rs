//! Topology declarator: queues, bindings, and the well-known exchanges.

use peril_protocol::routing::{
    EXCHANGE_PERIL_DIRECT, EXCHANGE_PERIL_DLX, EXCHANGE_PERIL_TOPIC, QUEUE_PERIL_DLQ,
};

use crate::{BrokerChannel, Durability, ExchangeKind, QueueInfo, TopologyError};

/// Ensures `queue_name` exists with `durability` and is bound to `exchange`
/// under `binding_key`.
///
/// Every queue is declared with [`EXCHANGE_PERIL_DLX`] as its dead-letter
/// exchange, so discarded messages leave the main flow instead of being
/// lost. Declaration failures are returned as-is; nothing is retried.
pub async fn declare_and_bind<C: BrokerChannel>(
    channel: &C,
    exchange: &str,
    queue_name: &str,
    binding_key: &str,
    durability: Durability,
) -> Result<QueueInfo, TopologyError> {
    let queue = channel
        .declare_queue(queue_name, durability, Some(EXCHANGE_PERIL_DLX))
        .await?;
    channel
        .bind_queue(&queue.name, exchange, binding_key)
        .await?;
    tracing::debug!(
        queue = %queue.name,
        exchange,
        binding_key,
        %durability,
        "queue declared and bound"
    );
    Ok(queue)
}

/// Declares the exchanges Peril publishes to, plus the dead-letter queue.
///
/// - `peril_direct` (direct): pause / resume broadcasts
/// - `peril_topic` (topic): moves, war recognitions, game logs
/// - `peril_dlx` (fanout) → durable `peril_dlq`: discarded messages
///
/// Safe to call from every process on startup.
pub async fn declare_peril_topology<C: BrokerChannel>(channel: &C) -> Result<(), TopologyError> {
    channel
        .declare_exchange(EXCHANGE_PERIL_DIRECT, ExchangeKind::Direct)
        .await?;
    channel
        .declare_exchange(EXCHANGE_PERIL_TOPIC, ExchangeKind::Topic)
        .await?;
    channel
        .declare_exchange(EXCHANGE_PERIL_DLX, ExchangeKind::Fanout)
        .await?;
    // The dead-letter queue itself has no dead-letter exchange.
    channel
        .declare_queue(QUEUE_PERIL_DLQ, Durability::Durable, None)
        .await?;
    channel
        .bind_queue(QUEUE_PERIL_DLQ, EXCHANGE_PERIL_DLX, "")
        .await?;
    tracing::info!("peril exchanges declared");
    Ok(())
}
