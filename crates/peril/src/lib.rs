//! # Peril
//!
//! A multiplayer strategy game with no central game state. Every player
//! runs a [`PerilClient`] holding its own view of the board; a
//! [`PerilServer`] broadcasts pause/resume and archives game logs. All
//! coordination happens over a message broker.
//!
//! ```rust,no_run
//! use peril::prelude::*;
//!
//! # async fn run() -> Result<(), PerilError> {
//! let config = PerilConfig::from_env();
//! let broker = AmqpBroker::connect(&config.amqp_url).await?;
//! let client = PerilClient::start(&broker, &config, "alice").await?;
//! client.spawn("gaul", 3).await?;
//! client.move_units("gaul", vec!["iberia".into()], 1).await?;
//! client.shutdown().await
//! # }
//! ```

mod client;
mod config;
mod error;
pub mod handlers;
mod log_sink;
mod server;
pub mod shell;

pub use client::{PerilClient, WAR_QUEUE};
pub use config::{
    PerilConfig, DEFAULT_ACTOR_CHANNEL_SIZE, DEFAULT_AMQP_URL, DEFAULT_GAME_LOG_PATH,
    ENV_AMQP_URL, ENV_GAME_LOG_PATH, ENV_PREFETCH_COUNT, ENV_PREFETCH_SIZE,
};
pub use error::PerilError;
pub use log_sink::{FileLogSink, LogSink};
pub use server::PerilServer;

pub mod prelude {
    //! Re-exports of the most commonly used types.

    pub use peril_broker::{AmqpBroker, Broker, Durability, MemoryBroker, Prefetch};
    pub use peril_game::{GameError, GameHandle, GameState, MoveOutcome, WarOutcome};
    pub use peril_protocol::{ArmyMove, Encoding, GameLog, PlayerSnapshot, PlayingState, RecognitionOfWar};
    pub use peril_pubsub::{AckType, Publisher, SubscribeOptions, Subscription};

    pub use crate::{FileLogSink, LogSink, PerilClient, PerilConfig, PerilError, PerilServer};
}
