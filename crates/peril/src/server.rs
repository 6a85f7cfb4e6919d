//! The server process: pause control and game log archival.

use std::sync::Arc;

use peril_broker::{declare_peril_topology, Broker, Durability};
use peril_protocol::routing::{
    wildcard_key, EXCHANGE_PERIL_DIRECT, EXCHANGE_PERIL_TOPIC, GAME_LOG_SLUG, PAUSE_KEY,
};
use peril_protocol::{Encoding, GameLog, PlayingState};
use peril_pubsub::{subscribe, Publisher, SubscribeOptions, Subscription};

use crate::handlers::handle_game_log;
use crate::log_sink::LogSink;
use crate::{PerilConfig, PerilError};

/// A running Peril server.
pub struct PerilServer<B: Broker> {
    publisher: Publisher<B::Channel>,
    game_logs: Subscription,
}

impl<B: Broker> PerilServer<B> {
    /// Declares the exchanges, broadcasts an initial pause, and starts
    /// archiving game logs from the durable `game_logs` queue into `sink`.
    pub async fn start<S: LogSink>(
        broker: &B,
        config: &PerilConfig,
        sink: S,
    ) -> Result<Self, PerilError> {
        let channel = broker.open_channel().await?;
        declare_peril_topology(&channel).await?;
        let publisher = Publisher::new(channel, Encoding::Json);

        publisher
            .publish(EXCHANGE_PERIL_DIRECT, PAUSE_KEY, &PlayingState { is_paused: true })
            .await?;

        let sink = Arc::new(sink);
        let game_logs = subscribe(
            broker,
            SubscribeOptions::new(
                EXCHANGE_PERIL_TOPIC,
                GAME_LOG_SLUG,
                wildcard_key(GAME_LOG_SLUG),
                Durability::Durable,
            )
            .prefetch(config.prefetch),
            move |log: GameLog| {
                let sink = Arc::clone(&sink);
                async move { handle_game_log(sink.as_ref(), log).await }
            },
        )
        .await?;

        tracing::info!("server started");
        Ok(Self {
            publisher,
            game_logs,
        })
    }

    /// Tells every client to stop accepting local commands.
    pub async fn pause(&self) -> Result<(), PerilError> {
        self.set_paused(true).await
    }

    /// Lets clients accept local commands again.
    pub async fn resume(&self) -> Result<(), PerilError> {
        self.set_paused(false).await
    }

    async fn set_paused(&self, is_paused: bool) -> Result<(), PerilError> {
        self.publisher
            .publish(EXCHANGE_PERIL_DIRECT, PAUSE_KEY, &PlayingState { is_paused })
            .await?;
        tracing::info!(paused = is_paused, "pause state broadcast");
        Ok(())
    }

    /// Stops archiving and closes the publishing channel.
    pub async fn shutdown(self) -> Result<(), PerilError> {
        self.game_logs.unsubscribe().await?;
        self.publisher.close().await?;
        tracing::info!("server stopped");
        Ok(())
    }
}
