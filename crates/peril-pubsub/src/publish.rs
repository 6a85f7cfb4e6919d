//! Typed publishing.

use std::sync::Arc;

use peril_broker::BrokerChannel;
use peril_protocol::Encoding;
use serde::Serialize;

use crate::PubSubError;

/// Encodes `value` with `encoding` and publishes it to `exchange` under
/// `routing_key`, tagging the message with the encoding's content type.
///
/// Best-effort routing: if no queue is bound for the key the broker drops
/// the message and this still returns `Ok`. Errors come only from
/// encoding or the transport.
pub async fn publish<C, T>(
    channel: &C,
    exchange: &str,
    routing_key: &str,
    encoding: Encoding,
    value: &T,
) -> Result<(), PubSubError>
where
    C: BrokerChannel,
    T: Serialize + Sync,
{
    let (body, content_type) = peril_protocol::encode(value, encoding)?;
    channel
        .publish(exchange, routing_key, content_type, &body)
        .await?;
    tracing::trace!(exchange, routing_key, %encoding, bytes = body.len(), "published");
    Ok(())
}

/// A channel dedicated to publishing, with a default encoding.
///
/// Cheap to clone; clones share the channel. Handlers capture one of these
/// to publish follow-up messages.
pub struct Publisher<C> {
    channel: Arc<C>,
    encoding: Encoding,
}

impl<C> Clone for Publisher<C> {
    fn clone(&self) -> Self {
        Self {
            channel: Arc::clone(&self.channel),
            encoding: self.encoding,
        }
    }
}

impl<C: BrokerChannel> Publisher<C> {
    /// Wraps a channel, publishing with `encoding` by default.
    pub fn new(channel: C, encoding: Encoding) -> Self {
        Self {
            channel: Arc::new(channel),
            encoding,
        }
    }

    /// The underlying channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Publishes with the default encoding.
    pub async fn publish<T: Serialize + Sync>(
        &self,
        exchange: &str,
        routing_key: &str,
        value: &T,
    ) -> Result<(), PubSubError> {
        publish(self.channel.as_ref(), exchange, routing_key, self.encoding, value).await
    }

    /// Publishes as JSON regardless of the default.
    pub async fn publish_json<T: Serialize + Sync>(
        &self,
        exchange: &str,
        routing_key: &str,
        value: &T,
    ) -> Result<(), PubSubError> {
        publish(self.channel.as_ref(), exchange, routing_key, Encoding::Json, value).await
    }

    /// Publishes as binary regardless of the default.
    pub async fn publish_binary<T: Serialize + Sync>(
        &self,
        exchange: &str,
        routing_key: &str,
        value: &T,
    ) -> Result<(), PubSubError> {
        publish(self.channel.as_ref(), exchange, routing_key, Encoding::Binary, value).await
    }

    /// Closes the underlying channel.
    pub async fn close(&self) -> Result<(), PubSubError> {
        self.channel.close().await?;
        Ok(())
    }
}
