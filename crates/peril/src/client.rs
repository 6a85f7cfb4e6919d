//! A player's process: game state plus its four subscriptions.
//!
//! ```text
//! pause.<user>        (transient, peril_direct, "pause")               → handle_pause
//! army_moves.<user>   (transient, peril_topic,  "army_moves.*")        → handle_move
//! war                 (durable,   peril_topic,  "war.*")               → handle_war
//! war_results.<user>  (transient, peril_topic,  "war_results.<user>")  → handle_war_result
//! ```
//!
//! The `war` queue is shared by every client, so each recognition is
//! worked by one consumer at a time and requeued until an involved
//! player picks it up. That player forwards it to the other side's
//! `war_results` queue, so both participants apply the same result.

use peril_broker::{declare_peril_topology, Broker, Durability};
use peril_game::{spawn_game, GameHandle, GameState};
use peril_protocol::routing::{
    player_key, wildcard_key, ARMY_MOVES_PREFIX, EXCHANGE_PERIL_DIRECT, EXCHANGE_PERIL_TOPIC,
    PAUSE_KEY, WAR_RECOGNITIONS_PREFIX, WAR_RESULTS_PREFIX,
};
use peril_protocol::{ArmyMove, Encoding, PlayingState, RecognitionOfWar};
use peril_pubsub::{subscribe, Publisher, SubscribeOptions, Subscription};

use crate::handlers::{handle_move, handle_pause, handle_war, handle_war_result};
use crate::{PerilConfig, PerilError};

/// Name of the queue all clients share for war recognitions.
pub const WAR_QUEUE: &str = "war";

/// A connected player.
pub struct PerilClient<B: Broker> {
    game: GameHandle,
    publisher: Publisher<B::Channel>,
    subscriptions: Vec<Subscription>,
}

impl<B: Broker> PerilClient<B> {
    /// Validates `username`, starts the game state and subscribes.
    pub async fn start(
        broker: &B,
        config: &PerilConfig,
        username: &str,
    ) -> Result<Self, PerilError> {
        let state = GameState::new(username)?;
        let game = spawn_game(state, config.actor_channel_size);
        Self::start_with_game(broker, config, game).await
    }

    /// Subscribes an already running game state.
    pub async fn start_with_game(
        broker: &B,
        config: &PerilConfig,
        game: GameHandle,
    ) -> Result<Self, PerilError> {
        let username = game.username().to_string();
        let channel = broker.open_channel().await?;
        declare_peril_topology(&channel).await?;
        let publisher = Publisher::new(channel, Encoding::Json);

        let mut client = Self {
            game,
            publisher,
            subscriptions: Vec::with_capacity(4),
        };

        let pause = {
            let game = client.game.clone();
            subscribe(
                broker,
                SubscribeOptions::new(
                    EXCHANGE_PERIL_DIRECT,
                    player_key(PAUSE_KEY, &username),
                    PAUSE_KEY,
                    Durability::Transient,
                )
                .prefetch(config.prefetch),
                move |state: PlayingState| {
                    let game = game.clone();
                    async move { handle_pause(&game, state).await }
                },
            )
            .await
        };
        client.track(pause).await?;

        let moves = {
            let game = client.game.clone();
            let publisher = client.publisher.clone();
            subscribe(
                broker,
                SubscribeOptions::new(
                    EXCHANGE_PERIL_TOPIC,
                    player_key(ARMY_MOVES_PREFIX, &username),
                    wildcard_key(ARMY_MOVES_PREFIX),
                    Durability::Transient,
                )
                .prefetch(config.prefetch),
                move |mv: ArmyMove| {
                    let game = game.clone();
                    let publisher = publisher.clone();
                    async move { handle_move(&game, &publisher, mv).await }
                },
            )
            .await
        };
        client.track(moves).await?;

        let wars = {
            let game = client.game.clone();
            let publisher = client.publisher.clone();
            subscribe(
                broker,
                SubscribeOptions::new(
                    EXCHANGE_PERIL_TOPIC,
                    WAR_QUEUE,
                    wildcard_key(WAR_RECOGNITIONS_PREFIX),
                    Durability::Durable,
                )
                .prefetch(config.prefetch),
                move |war: RecognitionOfWar| {
                    let game = game.clone();
                    let publisher = publisher.clone();
                    async move { handle_war(&game, &publisher, war).await }
                },
            )
            .await
        };
        client.track(wars).await?;

        let results = {
            let game = client.game.clone();
            let key = player_key(WAR_RESULTS_PREFIX, &username);
            subscribe(
                broker,
                SubscribeOptions::new(EXCHANGE_PERIL_TOPIC, key.clone(), key, Durability::Transient)
                    .prefetch(config.prefetch),
                move |war: RecognitionOfWar| {
                    let game = game.clone();
                    async move { handle_war_result(&game, war).await }
                },
            )
            .await
        };
        client.track(results).await?;

        tracing::info!(player = %username, "client started");
        Ok(client)
    }

    /// Keeps a new subscription, or tears down everything started so far.
    async fn track(
        &mut self,
        result: Result<Subscription, peril_pubsub::PubSubError>,
    ) -> Result<(), PerilError> {
        match result {
            Ok(subscription) => {
                self.subscriptions.push(subscription);
                Ok(())
            }
            Err(e) => {
                self.stop().await;
                Err(e.into())
            }
        }
    }

    pub fn username(&self) -> &str {
        self.game.username()
    }

    /// The game state shared with the handlers.
    pub fn game(&self) -> &GameHandle {
        &self.game
    }

    /// Places new units in a territory. Nothing is broadcast.
    pub async fn spawn(&self, territory: &str, units: u32) -> Result<(), PerilError> {
        self.game.spawn(territory, units).await?;
        Ok(())
    }

    /// Moves units and broadcasts the move to `army_moves.<user>`.
    ///
    /// The local state is updated even if the broadcast fails; the error
    /// is still returned.
    pub async fn move_units(
        &self,
        from: &str,
        to: Vec<String>,
        units: u32,
    ) -> Result<ArmyMove, PerilError> {
        let mv = self.game.move_units(from, to, units).await?;
        let key = player_key(ARMY_MOVES_PREFIX, self.username());
        self.publisher
            .publish_json(EXCHANGE_PERIL_TOPIC, &key, &mv)
            .await?;
        tracing::info!(
            player = self.username(),
            from = %mv.territories_from,
            to = ?mv.territories_to,
            "move published"
        );
        Ok(mv)
    }

    /// A copy of the local game state.
    pub async fn status(&self) -> Result<GameState, PerilError> {
        Ok(self.game.status().await?)
    }

    /// Unsubscribes everything, stops the game state and closes the
    /// publishing channel.
    pub async fn shutdown(mut self) -> Result<(), PerilError> {
        let username = self.username().to_string();
        let mut first_error = None;
        for subscription in self.subscriptions.drain(..) {
            if let Err(e) = subscription.unsubscribe().await {
                first_error.get_or_insert(PerilError::from(e));
            }
        }
        if let Err(e) = self.publisher.close().await {
            first_error.get_or_insert(PerilError::from(e));
        }
        // Already stopped is fine.
        let _ = self.game.shutdown().await;
        tracing::info!(player = %username, "client stopped");
        first_error.map_or(Ok(()), Err)
    }

    /// Best-effort teardown after a failed start.
    async fn stop(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            let _ = subscription.unsubscribe().await;
        }
        let _ = self.publisher.close().await;
        let _ = self.game.shutdown().await;
    }
}
