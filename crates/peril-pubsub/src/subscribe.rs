//! Typed subscriptions: one background task per queue.
//!
//! ```text
//! declare_and_bind → set_prefetch → consume → spawn loop:
//!     next delivery → decode (by content type) → handler → resolve
//! ```
//!
//! Deliveries within one subscription are processed strictly one after
//! another, preserving the queue's order. Separate subscriptions run
//! concurrently with no ordering between them.

use std::future::Future;
use std::sync::Arc;

use peril_broker::{
    declare_and_bind, Broker, BrokerChannel, Delivery, DeliveryStream, Durability, Prefetch,
};
use peril_protocol::ProtocolError;
use serde::de::DeserializeOwned;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::{resolve, AckType, PubSubError};

/// Where a subscription reads from and how its queue is declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOptions {
    pub exchange: String,
    pub queue: String,
    pub binding_key: String,
    pub durability: Durability,
    pub prefetch: Prefetch,
}

impl SubscribeOptions {
    /// Options with the default prefetch limit.
    pub fn new(
        exchange: impl Into<String>,
        queue: impl Into<String>,
        binding_key: impl Into<String>,
        durability: Durability,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            queue: queue.into(),
            binding_key: binding_key.into(),
            durability,
            prefetch: Prefetch::default(),
        }
    }

    /// Overrides the prefetch limit.
    pub fn prefetch(mut self, prefetch: Prefetch) -> Self {
        self.prefetch = prefetch;
        self
    }
}

/// Handle to a running subscription.
///
/// Dropping the handle detaches the task; it keeps consuming until the
/// process exits or the broker closes the stream. Call
/// [`unsubscribe`](Self::unsubscribe) to stop it cleanly.
#[derive(Debug)]
pub struct Subscription {
    queue: String,
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// The queue this subscription consumes.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// `true` once the delivery loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops consuming and waits for the loop to exit.
    ///
    /// A delivery already being handled is finished and resolved first.
    /// Deliveries prefetched but not yet handled go back to the queue
    /// when the channel closes.
    pub async fn unsubscribe(self) -> Result<(), PubSubError> {
        self.shutdown.notify_one();
        self.task.await.map_err(|e| PubSubError::TaskFailed {
            queue: self.queue.clone(),
            reason: e.to_string(),
        })?;
        tracing::info!(queue = %self.queue, "unsubscribed");
        Ok(())
    }
}

/// Subscribes `handler` to a queue, decoding each body with the codec named
/// by its content type.
///
/// Declares and binds the queue, applies the prefetch limit, and spawns
/// the delivery loop; returns as soon as the loop is running. Setup
/// failures (channel, topology, consume) are returned to the caller.
///
/// Delivery is at-least-once: `handler` may see the same message more than
/// once and must tolerate it.
pub async fn subscribe<B, T, F, Fut>(
    broker: &B,
    options: SubscribeOptions,
    handler: F,
) -> Result<Subscription, PubSubError>
where
    B: Broker,
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AckType> + Send + 'static,
{
    subscribe_with_decoder(broker, options, peril_protocol::decode::<T>, handler).await
}

/// Like [`subscribe`], with a caller-supplied decoder.
///
/// The decoder receives the raw body and the delivery's content type.
/// If it fails, the failure is logged and the delivery is discarded;
/// malformed messages are never requeued.
pub async fn subscribe_with_decoder<B, T, D, F, Fut>(
    broker: &B,
    options: SubscribeOptions,
    decoder: D,
    handler: F,
) -> Result<Subscription, PubSubError>
where
    B: Broker,
    T: Send + 'static,
    D: Fn(&[u8], Option<&str>) -> Result<T, ProtocolError> + Send + Sync + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AckType> + Send + 'static,
{
    let channel = broker.open_channel().await?;
    declare_and_bind(
        &channel,
        &options.exchange,
        &options.queue,
        &options.binding_key,
        options.durability,
    )
    .await?;
    channel.set_prefetch(options.prefetch).await?;
    let deliveries = channel.consume(&options.queue).await?;

    let shutdown = Arc::new(Notify::new());
    let task = tokio::spawn(run(
        options.queue.clone(),
        channel,
        deliveries,
        decoder,
        handler,
        Arc::clone(&shutdown),
    ));

    tracing::info!(
        queue = %options.queue,
        exchange = %options.exchange,
        binding_key = %options.binding_key,
        durability = %options.durability,
        "subscribed"
    );

    Ok(Subscription {
        queue: options.queue,
        shutdown,
        task,
    })
}

/// The delivery loop. Exits on shutdown, end of stream, or a transport
/// error; a bad message only costs that one delivery.
async fn run<C, S, T, D, F, Fut>(
    queue: String,
    channel: C,
    mut deliveries: S,
    decoder: D,
    handler: F,
    shutdown: Arc<Notify>,
) where
    C: BrokerChannel,
    S: DeliveryStream,
    D: Fn(&[u8], Option<&str>) -> Result<T, ProtocolError>,
    F: Fn(T) -> Fut,
    Fut: Future<Output = AckType>,
{
    loop {
        let next = tokio::select! {
            biased;
            () = shutdown.notified() => break,
            next = deliveries.next() => next,
        };

        let delivery = match next {
            Some(Ok(delivery)) => delivery,
            Some(Err(e)) => {
                tracing::error!(%queue, error = %e, "delivery stream failed");
                break;
            }
            None => {
                tracing::info!(%queue, "delivery stream ended");
                break;
            }
        };

        let outcome = match decoder(delivery.body(), delivery.content_type()) {
            Ok(value) => handler(value).await,
            Err(e) => {
                tracing::warn!(
                    %queue,
                    routing_key = delivery.routing_key(),
                    error = %e,
                    "undecodable delivery, discarding"
                );
                AckType::NackDiscard
            }
        };

        let routing_key = delivery.routing_key().to_string();
        let redelivered = delivery.redelivered();
        if let Err(e) = resolve(delivery, outcome).await {
            tracing::error!(%queue, %routing_key, %outcome, error = %e, "failed to resolve delivery");
            break;
        }
        tracing::debug!(%queue, %routing_key, redelivered, %outcome, "delivery resolved");
    }

    if let Err(e) = channel.close().await {
        tracing::debug!(%queue, error = %e, "closing subscription channel failed");
    }
}
