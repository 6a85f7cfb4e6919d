//! Subscription handlers: glue between the dispatcher and the game state.
//!
//! Each handler applies one message to the local game and tells the
//! dispatcher what to do with the delivery. None of them acknowledge
//! anything themselves.

use chrono::Utc;
use peril_broker::BrokerChannel;
use peril_game::{GameHandle, MoveOutcome, WarOutcome};
use peril_protocol::routing::{
    player_key, EXCHANGE_PERIL_TOPIC, GAME_LOG_SLUG, WAR_RECOGNITIONS_PREFIX, WAR_RESULTS_PREFIX,
};
use peril_protocol::{ArmyMove, GameLog, PlayingState, RecognitionOfWar};
use peril_pubsub::{AckType, Publisher};

use crate::log_sink::LogSink;

/// Applies a pause broadcast.
pub async fn handle_pause(game: &GameHandle, state: PlayingState) -> AckType {
    match game.handle_pause(state).await {
        Ok(()) => AckType::Ack,
        Err(e) => {
            tracing::warn!(player = game.username(), error = %e, "pause not applied");
            AckType::NackRequeue
        }
    }
}

/// Applies another player's move. If it lands on our territory, publishes
/// a war recognition to `war.<us>`.
pub async fn handle_move<C: BrokerChannel>(
    game: &GameHandle,
    publisher: &Publisher<C>,
    mv: ArmyMove,
) -> AckType {
    let mover = mv.player.username.clone();
    let result = match game.handle_move(mv).await {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(player = game.username(), error = %e, "move not applied");
            return AckType::NackRequeue;
        }
    };

    match (result.outcome, result.war) {
        (MoveOutcome::Safe, _) => {
            tracing::debug!(player = game.username(), %mover, "move observed");
            AckType::Ack
        }
        (MoveOutcome::SamePlayer, _) => AckType::NackDiscard,
        (MoveOutcome::MakeWar, Some(war)) => {
            let key = player_key(WAR_RECOGNITIONS_PREFIX, game.username());
            match publisher.publish_json(EXCHANGE_PERIL_TOPIC, &key, &war).await {
                Ok(()) => {
                    tracing::info!(player = game.username(), attacker = %mover, "war declared");
                    AckType::Ack
                }
                Err(e) => {
                    tracing::warn!(
                        player = game.username(),
                        attacker = %mover,
                        error = %e,
                        "failed to publish war recognition"
                    );
                    AckType::NackRequeue
                }
            }
        }
        (MoveOutcome::MakeWar, None) => {
            tracing::error!(player = game.username(), %mover, "war detected without a recognition");
            AckType::NackRequeue
        }
    }
}

/// Resolves a war we are part of. The recognition is forwarded to the
/// other side on `war_results.<opponent>` so it applies the same seeded
/// result, then the outcome is published as a game log to
/// `game_logs.<attacker>`.
pub async fn handle_war<C: BrokerChannel>(
    game: &GameHandle,
    publisher: &Publisher<C>,
    war: RecognitionOfWar,
) -> AckType {
    let attacker = war.attacker.username.clone();
    let opponent = if attacker == game.username() {
        war.defender.username.clone()
    } else {
        attacker.clone()
    };
    let resolution = match game.handle_war(war.clone()).await {
        Ok(resolution) => resolution,
        Err(e) => {
            tracing::warn!(player = game.username(), error = %e, "war not applied");
            return AckType::NackRequeue;
        }
    };

    let Some(message) = resolution.log_message() else {
        if resolution.outcome == WarOutcome::NotInvolved {
            return AckType::NackRequeue;
        }
        tracing::warn!(player = game.username(), %attacker, "war with no units committed, discarding");
        return AckType::NackDiscard;
    };
    // Forward before logging: a requeue may repeat the forward, never the log.
    let result_key = player_key(WAR_RESULTS_PREFIX, &opponent);
    if let Err(e) = publisher.publish_json(EXCHANGE_PERIL_TOPIC, &result_key, &war).await {
        tracing::warn!(player = game.username(), %opponent, error = %e, "failed to forward war result");
        return AckType::NackRequeue;
    }

    let log = GameLog {
        current_time: Utc::now(),
        message,
        username: game.username().to_string(),
    };
    let key = player_key(GAME_LOG_SLUG, &attacker);
    match publisher.publish_binary(EXCHANGE_PERIL_TOPIC, &key, &log).await {
        Ok(()) => {
            tracing::info!(
                player = game.username(),
                outcome = %resolution.outcome,
                winner = %resolution.winner,
                loser = %resolution.loser,
                "war outcome logged"
            );
            AckType::Ack
        }
        Err(e) => {
            tracing::warn!(player = game.username(), error = %e, "failed to publish game log");
            AckType::NackRequeue
        }
    }
}

/// Applies a war the other side already resolved. The dice are seeded
/// from the same message, so both sides reach the same outcome. No game
/// log is published; the resolver has done that.
pub async fn handle_war_result(game: &GameHandle, war: RecognitionOfWar) -> AckType {
    match game.handle_war(war).await {
        Ok(resolution) if resolution.log_message().is_some() => {
            tracing::info!(
                player = game.username(),
                outcome = %resolution.outcome,
                winner = %resolution.winner,
                loser = %resolution.loser,
                "war result applied"
            );
            AckType::Ack
        }
        Ok(resolution) => {
            tracing::warn!(
                player = game.username(),
                outcome = %resolution.outcome,
                "forwarded war result does not apply here, discarding"
            );
            AckType::NackDiscard
        }
        Err(e) => {
            tracing::warn!(player = game.username(), error = %e, "war result not applied");
            AckType::NackRequeue
        }
    }
}

/// Archives a game log on the server.
pub async fn handle_game_log<S: LogSink>(sink: &S, log: GameLog) -> AckType {
    match sink.write(&log).await {
        Ok(()) => AckType::Ack,
        Err(e) => {
            tracing::warn!(username = %log.username, error = %e, "failed to archive game log");
            AckType::NackRequeue
        }
    }
}
