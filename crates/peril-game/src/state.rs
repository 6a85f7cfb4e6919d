//! The local player's view of the game.
//!
//! A `GameState` is owned by exactly one client. It changes only through the
//! functions here, which are memoryless: the result depends on the current
//! state and the incoming message, never on what arrived before.

use std::collections::BTreeMap;

use peril_protocol::routing::is_valid_segment;
use peril_protocol::{ArmyMove, PlayerSnapshot, PlayingState};
use serde::{Deserialize, Serialize};

use crate::GameError;

/// Another player's presence in a territory, as last broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub owner: String,
    pub units: u32,
}

/// Result of applying an incoming [`ArmyMove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveOutcome {
    /// The move touches nothing we hold. Our view of the mover is updated.
    Safe,
    /// The mover entered one of our territories.
    MakeWar,
    /// Our own move echoed back by the broker.
    SamePlayer,
}

/// One client's game state: its own holdings plus what it has learned about
/// everyone else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    username: String,
    paused: bool,
    pub(crate) own: BTreeMap<String, u32>,
    pub(crate) world: BTreeMap<String, Holding>,
}

impl GameState {
    /// Creates an empty, unpaused state for `username`.
    ///
    /// The username becomes a routing key segment, so it must be non-empty
    /// and free of `.`, wildcards and whitespace.
    pub fn new(username: impl Into<String>) -> Result<Self, GameError> {
        let username = username.into();
        if !is_valid_segment(&username) {
            return Err(GameError::InvalidUsername(username));
        }
        Ok(Self {
            username,
            paused: false,
            own: BTreeMap::new(),
            world: BTreeMap::new(),
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Territories held by the local player.
    pub fn territories(&self) -> &BTreeMap<String, u32> {
        &self.own
    }

    /// Other players' territories as last observed.
    pub fn world(&self) -> &BTreeMap<String, Holding> {
        &self.world
    }

    /// Units the local player has in `territory`, if held.
    pub fn units_in(&self, territory: &str) -> Option<u32> {
        self.own.get(territory).copied()
    }

    /// Who holds `territory`, as far as this client knows.
    pub fn owner_of(&self, territory: &str) -> Option<&str> {
        if self.own.contains_key(territory) {
            Some(&self.username)
        } else {
            self.world.get(territory).map(|h| h.owner.as_str())
        }
    }

    /// Copy of the local player's holdings, suitable for publishing.
    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            username: self.username.clone(),
            territories: self.own.clone(),
        }
    }

    /// Applies a pause broadcast. The flag simply replaces the old one.
    pub fn handle_pause(&mut self, state: PlayingState) {
        self.paused = state.is_paused;
    }

    /// Applies another player's move.
    ///
    /// On [`MoveOutcome::Safe`] every world entry of the mover is replaced by
    /// the snapshot carried in the move, so applying the same move twice
    /// leaves the same state as applying it once. The other outcomes leave
    /// the state untouched.
    pub fn handle_move(&mut self, mv: &ArmyMove) -> MoveOutcome {
        let mover = &mv.player.username;
        if *mover == self.username {
            return MoveOutcome::SamePlayer;
        }
        if mv
            .territories_to
            .iter()
            .any(|t| self.own.contains_key(t))
        {
            return MoveOutcome::MakeWar;
        }

        self.world.retain(|_, h| h.owner != *mover);
        for (territory, units) in &mv.player.territories {
            if self.own.contains_key(territory) {
                continue;
            }
            self.world.insert(
                territory.clone(),
                Holding {
                    owner: mover.clone(),
                    units: *units,
                },
            );
        }
        MoveOutcome::Safe
    }

    /// Places `units` new units in `territory`.
    ///
    /// Claims the territory if nobody holds it, reinforces it if we do.
    pub fn spawn(&mut self, territory: &str, units: u32) -> Result<(), GameError> {
        self.ensure_playing()?;
        if territory.is_empty() {
            return Err(GameError::InvalidTerritory(territory.to_string()));
        }
        if units == 0 {
            return Err(GameError::ZeroUnits);
        }
        if !self.own.contains_key(territory) {
            if let Some(holding) = self.world.get(territory) {
                return Err(GameError::Occupied {
                    territory: territory.to_string(),
                    owner: holding.owner.clone(),
                });
            }
        }
        let held = self.own.get(territory).copied().unwrap_or(0);
        let total = held
            .checked_add(units)
            .ok_or_else(|| GameError::TooManyUnits {
                territory: territory.to_string(),
            })?;
        self.own.insert(territory.to_string(), total);
        Ok(())
    }

    /// Sends `units` from `from` into every territory in `to`.
    ///
    /// The origin loses `units * to.len()`. Each destination gains `units`,
    /// whoever holds it; moving into a foreign territory is how wars start.
    /// Returns the move to broadcast, carrying the post-move snapshot.
    pub fn move_units(
        &mut self,
        from: &str,
        to: &[String],
        units: u32,
    ) -> Result<ArmyMove, GameError> {
        self.ensure_playing()?;
        if units == 0 {
            return Err(GameError::ZeroUnits);
        }
        if to.is_empty() {
            return Err(GameError::NoDestination);
        }
        if let Some(bad) = to.iter().find(|t| t.is_empty()) {
            return Err(GameError::InvalidTerritory(bad.clone()));
        }
        if to.iter().any(|t| t == from) {
            return Err(GameError::SameTerritory(from.to_string()));
        }
        let available = self
            .units_in(from)
            .ok_or_else(|| GameError::NotOwned(from.to_string()))?;
        let requested = u32::try_from(to.len())
            .ok()
            .and_then(|n| n.checked_mul(units))
            .unwrap_or(u32::MAX);
        if requested > available {
            return Err(GameError::InsufficientUnits {
                territory: from.to_string(),
                available,
                requested,
            });
        }

        // Destinations are checked before anything changes so a failed
        // move leaves the state as it was.
        let mut gains: BTreeMap<&str, u32> = BTreeMap::new();
        for territory in to {
            let held = *gains
                .entry(territory.as_str())
                .or_insert_with(|| self.units_in(territory).unwrap_or(0));
            let total = held
                .checked_add(units)
                .ok_or_else(|| GameError::TooManyUnits {
                    territory: territory.clone(),
                })?;
            gains.insert(territory.as_str(), total);
        }

        self.own.insert(from.to_string(), available - requested);
        for (territory, total) in gains {
            self.own.insert(territory.to_string(), total);
        }
        tracing::debug!(
            player = %self.username,
            from,
            to = ?to,
            units,
            "units moved"
        );
        Ok(ArmyMove {
            player: self.snapshot(),
            territories_from: from.to_string(),
            territories_to: to.to_vec(),
        })
    }

    fn ensure_playing(&self) -> Result<(), GameError> {
        if self.paused {
            Err(GameError::Paused)
        } else {
            Ok(())
        }
    }
}
