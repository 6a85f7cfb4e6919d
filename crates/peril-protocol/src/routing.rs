//! Well-known exchange names and routing keys.
//!
//! Routing keys are dot-separated. Publishers append the player's username
//! as the last segment; subscribers bind with a `*` in that position to
//! receive every player's messages.

/// Direct exchange carrying control broadcasts (pause / resume).
pub const EXCHANGE_PERIL_DIRECT: &str = "peril_direct";

/// Topic exchange carrying moves, war recognitions and game logs.
pub const EXCHANGE_PERIL_TOPIC: &str = "peril_topic";

/// Fanout exchange receiving every discarded message unchanged.
pub const EXCHANGE_PERIL_DLX: &str = "peril_dlx";

/// Durable queue bound to the dead-letter exchange, for offline inspection.
pub const QUEUE_PERIL_DLQ: &str = "peril_dlq";

/// Routing key for [`PlayingState`](crate::PlayingState) broadcasts.
pub const PAUSE_KEY: &str = "pause";

/// Prefix for [`ArmyMove`](crate::ArmyMove) routing keys.
pub const ARMY_MOVES_PREFIX: &str = "army_moves";

/// Prefix for [`RecognitionOfWar`](crate::RecognitionOfWar) routing keys,
/// and the name of the shared war queue.
pub const WAR_RECOGNITIONS_PREFIX: &str = "war";

/// Prefix for resolved [`RecognitionOfWar`](crate::RecognitionOfWar)s
/// forwarded to the participant that did not resolve them. Each player
/// binds only its own key, `war_results.<username>`.
pub const WAR_RESULTS_PREFIX: &str = "war_results";

/// Prefix for [`GameLog`](crate::GameLog) routing keys, and the name of
/// the durable archival queue.
pub const GAME_LOG_SLUG: &str = "game_logs";

/// Builds `<prefix>.<username>`.
pub fn player_key(prefix: &str, username: &str) -> String {
    format!("{prefix}.{username}")
}

/// Builds the binding key `<prefix>.*` matching every player.
pub fn wildcard_key(prefix: &str) -> String {
    format!("{prefix}.*")
}

/// Returns `true` if `username` can be used as a single routing key segment.
///
/// Dots would split the segment; `*` and `#` are binding wildcards.
pub fn is_valid_segment(username: &str) -> bool {
    !username.is_empty()
        && !username
            .chars()
            .any(|c| matches!(c, '.' | '*' | '#') || c.is_whitespace())
}
