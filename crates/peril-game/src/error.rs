//! Error types for local game commands.

/// Errors from local commands (spawn, move) and from talking to the state
/// actor.
///
/// These are reported to whoever issued the command and never affect a
/// subscription.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// The username can't be used as a routing key segment.
    #[error("invalid username {0:?}: must be non-empty without '.', '*', '#' or spaces")]
    InvalidUsername(String),

    /// Territory names must be non-empty.
    #[error("invalid territory name {0:?}")]
    InvalidTerritory(String),

    /// The server has paused the game.
    #[error("the game is paused")]
    Paused,

    /// A command must involve at least one unit.
    #[error("unit count must be at least 1")]
    ZeroUnits,

    /// Another player holds the territory.
    #[error("{territory} is held by {owner}")]
    Occupied { territory: String, owner: String },

    /// The local player does not hold the territory.
    #[error("you do not hold {0}")]
    NotOwned(String),

    /// Not enough units at the origin.
    #[error("{territory} has {available} units, {requested} needed")]
    InsufficientUnits {
        territory: String,
        available: u32,
        requested: u32,
    },

    /// The territory cannot hold that many units.
    #[error("{territory} would exceed the maximum of {max} units", max = u32::MAX)]
    TooManyUnits { territory: String },

    /// A move needs at least one destination.
    #[error("a move needs at least one destination")]
    NoDestination,

    /// Origin and destination are the same territory.
    #[error("cannot move from {0} into itself")]
    SameTerritory(String),

    /// The state actor has stopped.
    #[error("game state is unavailable")]
    Unavailable,
}
