//! War resolution.
//!
//! Both involved clients may see the same [`RecognitionOfWar`]. The dice
//! are seeded from the message, so whichever of them resolves it reaches
//! the same result, and re-resolving it changes nothing.

use std::fmt;

use peril_protocol::{PlayerSnapshot, RecognitionOfWar};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::state::{GameState, Holding};

/// A source of six-sided die rolls.
pub trait DiceRoller {
    /// Returns a value in `1..=6`.
    fn roll(&mut self) -> u8;
}

/// Dice driven by a seeded [`StdRng`]. The same seed always produces the
/// same sequence of rolls.
#[derive(Debug, Clone)]
pub struct SeededDice {
    rng: StdRng,
}

impl SeededDice {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl DiceRoller for SeededDice {
    fn roll(&mut self) -> u8 {
        self.rng.random_range(1..=6)
    }
}

/// How a war turned out from the resolving client's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarOutcome {
    /// Neither side is the local player. Someone else must resolve it.
    NotInvolved,
    /// No territory where both sides have units.
    NoUnits,
    OpponentWon,
    YouWon,
    Draw,
}

impl fmt::Display for WarOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInvolved => write!(f, "not involved"),
            Self::NoUnits => write!(f, "no units"),
            Self::OpponentWon => write!(f, "opponent won"),
            Self::YouWon => write!(f, "you won"),
            Self::Draw => write!(f, "draw"),
        }
    }
}

/// The outcome of [`GameState::handle_war`] with the names of both sides.
///
/// For a decisive war `winner` and `loser` are what they say. For a draw
/// they are the attacker and the defender. Both are empty when the war
/// was not fought.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarResolution {
    pub outcome: WarOutcome,
    pub winner: String,
    pub loser: String,
}

impl WarResolution {
    fn unfought(outcome: WarOutcome) -> Self {
        Self {
            outcome,
            winner: String::new(),
            loser: String::new(),
        }
    }

    /// Text for the game log, or `None` if the war was not fought.
    pub fn log_message(&self) -> Option<String> {
        match self.outcome {
            WarOutcome::YouWon | WarOutcome::OpponentWon => {
                Some(format!("{} won a war against {}", self.winner, self.loser))
            }
            WarOutcome::Draw => Some(format!(
                "A war between {} and {} resulted in a draw",
                self.winner, self.loser
            )),
            WarOutcome::NotInvolved | WarOutcome::NoUnits => None,
        }
    }
}

/// Pair-wins scored by each side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tally {
    pub attacker: u32,
    pub defender: u32,
}

/// Most unit pairs fought in one war. Larger armies are decided by their
/// first `MAX_ROLLED_PAIRS` pairs so a war never holds up the state actor.
pub const MAX_ROLLED_PAIRS: u32 = 10_000;

/// Rolls one die per side for each unit pair, up to the smaller army and
/// at most [`MAX_ROLLED_PAIRS`]. The strictly higher roll wins the pair.
pub fn roll_battle(attacking: u32, defending: u32, dice: &mut dyn DiceRoller) -> Tally {
    let mut tally = Tally::default();
    for _ in 0..attacking.min(defending).min(MAX_ROLLED_PAIRS) {
        let a = dice.roll();
        let d = dice.roll();
        match a.cmp(&d) {
            std::cmp::Ordering::Greater => tally.attacker += 1,
            std::cmp::Ordering::Less => tally.defender += 1,
            std::cmp::Ordering::Equal => {}
        }
    }
    tally
}

/// Units committed to the battlefield. Counts come off the wire, so the
/// total saturates instead of overflowing.
fn committed(snapshot: &PlayerSnapshot, battlefield: &[&str]) -> u32 {
    battlefield
        .iter()
        .fold(0u32, |total, t| total.saturating_add(snapshot.units_in(t)))
}

impl GameState {
    /// Resolves a war and applies its result to the local state.
    ///
    /// Territory updates are plain assignments derived from the message,
    /// so resolving the same recognition twice gives the same state.
    pub fn handle_war(
        &mut self,
        war: &RecognitionOfWar,
        dice: &mut dyn DiceRoller,
    ) -> WarResolution {
        if !war.involves(self.username()) {
            return WarResolution::unfought(WarOutcome::NotInvolved);
        }
        let attacker = &war.attacker;
        let defender = &war.defender;
        if attacker.username == defender.username {
            return WarResolution::unfought(WarOutcome::NoUnits);
        }

        let battlefield = war.battlefield();
        let attacking = committed(attacker, &battlefield);
        let defending = committed(defender, &battlefield);
        if battlefield.is_empty() || attacking == 0 || defending == 0 {
            return WarResolution::unfought(WarOutcome::NoUnits);
        }

        let tally = roll_battle(attacking, defending, dice);
        let (winner, loser) = match tally.attacker.cmp(&tally.defender) {
            std::cmp::Ordering::Greater => (attacker, defender),
            std::cmp::Ordering::Less => (defender, attacker),
            std::cmp::Ordering::Equal => {
                self.apply_draw(attacker, defender, &battlefield);
                tracing::info!(
                    attacker = %attacker,
                    defender = %defender,
                    ?battlefield,
                    "war ended in a draw"
                );
                return WarResolution {
                    outcome: WarOutcome::Draw,
                    winner: attacker.username.clone(),
                    loser: defender.username.clone(),
                };
            }
        };

        self.apply_victory(winner, loser, &battlefield);
        let outcome = if winner.username == self.username() {
            WarOutcome::YouWon
        } else {
            WarOutcome::OpponentWon
        };
        tracing::info!(
            winner = %winner,
            loser = %loser,
            ?battlefield,
            attacker_wins = tally.attacker,
            defender_wins = tally.defender,
            "war resolved"
        );
        WarResolution {
            outcome,
            winner: winner.username.clone(),
            loser: loser.username.clone(),
        }
    }

    fn apply_victory(
        &mut self,
        winner: &PlayerSnapshot,
        loser: &PlayerSnapshot,
        battlefield: &[&str],
    ) {
        let me_won = winner.username == self.username();
        for territory in battlefield {
            let units = winner.units_in(territory) / 2;
            if me_won {
                self.own.insert((*territory).to_string(), units);
                self.world.remove(*territory);
            } else {
                self.own.remove(*territory);
                self.world.insert(
                    (*territory).to_string(),
                    Holding {
                        owner: winner.username.clone(),
                        units,
                    },
                );
            }
        }
        tracing::debug!(loser = %loser, "battlefield transferred");
    }

    fn apply_draw(
        &mut self,
        attacker: &PlayerSnapshot,
        defender: &PlayerSnapshot,
        battlefield: &[&str],
    ) {
        let me_defending = defender.username == self.username();
        for territory in battlefield {
            if me_defending {
                self.own.insert((*territory).to_string(), 0);
                self.world.remove(*territory);
            } else {
                self.own.remove(*territory);
                self.world.insert(
                    (*territory).to_string(),
                    Holding {
                        owner: defender.username.clone(),
                        units: 0,
                    },
                );
            }
        }
        tracing::debug!(attacker = %attacker, "attacking units removed");
    }
}
