//! Per-client game state for Peril.
//!
//! There is no central game server holding the board. Each client keeps
//! its own [`GameState`] and moves it forward from the messages it
//! receives:
//!
//! - pause broadcasts toggle whether local commands are accepted;
//! - other players' moves either update our view of them or start a war;
//! - war recognitions are fought out with dice seeded from the message.
//!
//! [`spawn_game`] wraps a state in an actor so concurrent subscription
//! handlers can share it.

mod actor;
mod combat;
mod error;
mod state;

pub use actor::{spawn_game, spawn_game_with_dice, DiceFactory, GameHandle, MoveResult};
pub use combat::{
    roll_battle, DiceRoller, SeededDice, Tally, WarOutcome, WarResolution, MAX_ROLLED_PAIRS,
};
pub use error::GameError;
pub use state::{GameState, Holding, MoveOutcome};
