//! Message types that travel through the broker.
//!
//! Every struct here is serialized into a message body by one client and
//! deserialized by others. Nothing in this module knows about queues or
//! game rules; these are plain data.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Broadcast by the server on the direct exchange: pause or resume play.
///
/// Each message fully replaces the previous one; there is no history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayingState {
    pub is_paused: bool,
}

/// A point-in-time copy of one player's holdings.
///
/// `territories` maps territory name to unit count. A `BTreeMap` keeps the
/// serialized form stable, so two clients encoding the same snapshot produce
/// the same bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub username: String,
    pub territories: BTreeMap<String, u32>,
}

impl PlayerSnapshot {
    /// Creates a snapshot with no territories.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            territories: BTreeMap::new(),
        }
    }

    /// Units this player holds in `territory` (0 if none).
    pub fn units_in(&self, territory: &str) -> u32 {
        self.territories.get(territory).copied().unwrap_or(0)
    }
}

impl fmt::Display for PlayerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.username)
    }
}

/// Published by a client after it moves units.
///
/// `player` is the mover's snapshot taken *after* the move, so the units
/// now sitting in each of `territories_to` can be read from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmyMove {
    pub player: PlayerSnapshot,
    pub territories_from: String,
    pub territories_to: Vec<String>,
}

/// Published by the client that detects a move into territory it holds.
///
/// `seed` is drawn once by the declaring client. Whoever resolves the war
/// rolls dice from this seed, so every resolution of the same message
/// reaches the same result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionOfWar {
    pub attacker: PlayerSnapshot,
    pub defender: PlayerSnapshot,
    pub seed: u64,
}

impl RecognitionOfWar {
    /// Territories both sides have units committed to.
    pub fn battlefield(&self) -> Vec<&str> {
        self.attacker
            .territories
            .keys()
            .filter(|t| self.defender.territories.contains_key(*t))
            .map(String::as_str)
            .collect()
    }

    /// Returns `true` if `username` is the attacker or the defender.
    pub fn involves(&self, username: &str) -> bool {
        self.attacker.username == username || self.defender.username == username
    }
}

/// Append-only audit record of a resolved war.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameLog {
    pub current_time: DateTime<Utc>,
    pub message: String,
    pub username: String,
}

impl fmt::Display for GameLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {}",
            self.current_time.to_rfc3339(),
            self.username,
            self.message
        )
    }
}
