//! State actor: a Tokio task that owns one client's [`GameState`].
//!
//! Every subscription handler and the local command shell share the state
//! through a [`GameHandle`]. Commands are applied one at a time in arrival
//! order, so handlers running on different subscriptions never interleave
//! inside a state transition.

use peril_protocol::{ArmyMove, PlayingState, RecognitionOfWar};
use tokio::sync::{mpsc, oneshot};

use crate::combat::{DiceRoller, SeededDice, WarResolution};
use crate::state::{GameState, MoveOutcome};
use crate::GameError;

/// Builds the dice used to resolve a war from the war's seed.
pub type DiceFactory = Box<dyn Fn(u64) -> Box<dyn DiceRoller + Send> + Send>;

/// Result of handing an incoming move to the actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveResult {
    pub outcome: MoveOutcome,
    /// Set on [`MoveOutcome::MakeWar`]: the recognition to publish, with
    /// the mover as attacker, our snapshot as defender and a fresh seed.
    pub war: Option<RecognitionOfWar>,
}

enum GameCommand {
    Pause {
        state: PlayingState,
        reply: oneshot::Sender<()>,
    },
    Move {
        mv: ArmyMove,
        reply: oneshot::Sender<MoveResult>,
    },
    War {
        war: RecognitionOfWar,
        reply: oneshot::Sender<WarResolution>,
    },
    Spawn {
        territory: String,
        units: u32,
        reply: oneshot::Sender<Result<(), GameError>>,
    },
    MoveUnits {
        from: String,
        to: Vec<String>,
        units: u32,
        reply: oneshot::Sender<Result<ArmyMove, GameError>>,
    },
    Status {
        reply: oneshot::Sender<GameState>,
    },
    Shutdown,
}

/// Handle to a running state actor. Cheap to clone.
#[derive(Clone)]
pub struct GameHandle {
    username: String,
    sender: mpsc::Sender<GameCommand>,
}

impl GameHandle {
    /// The local player's name.
    pub fn username(&self) -> &str {
        &self.username
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> GameCommand,
    ) -> Result<T, GameError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(build(reply_tx))
            .await
            .map_err(|_| GameError::Unavailable)?;
        reply_rx.await.map_err(|_| GameError::Unavailable)
    }

    /// Applies a pause broadcast.
    pub async fn handle_pause(&self, state: PlayingState) -> Result<(), GameError> {
        self.request(|reply| GameCommand::Pause { state, reply }).await
    }

    /// Applies another player's move.
    pub async fn handle_move(&self, mv: ArmyMove) -> Result<MoveResult, GameError> {
        self.request(|reply| GameCommand::Move { mv, reply }).await
    }

    /// Resolves a war with dice seeded from the message.
    pub async fn handle_war(&self, war: RecognitionOfWar) -> Result<WarResolution, GameError> {
        self.request(|reply| GameCommand::War { war, reply }).await
    }

    /// Local command: place new units.
    pub async fn spawn(&self, territory: impl Into<String>, units: u32) -> Result<(), GameError> {
        let territory = territory.into();
        self.request(|reply| GameCommand::Spawn {
            territory,
            units,
            reply,
        })
        .await?
    }

    /// Local command: move units. Returns the move to broadcast.
    pub async fn move_units(
        &self,
        from: impl Into<String>,
        to: Vec<String>,
        units: u32,
    ) -> Result<ArmyMove, GameError> {
        let from = from.into();
        self.request(|reply| GameCommand::MoveUnits {
            from,
            to,
            units,
            reply,
        })
        .await?
    }

    /// A copy of the current state.
    pub async fn status(&self) -> Result<GameState, GameError> {
        self.request(|reply| GameCommand::Status { reply }).await
    }

    /// Stops the actor. Commands sent afterwards fail with
    /// [`GameError::Unavailable`].
    pub async fn shutdown(&self) -> Result<(), GameError> {
        self.sender
            .send(GameCommand::Shutdown)
            .await
            .map_err(|_| GameError::Unavailable)
    }
}

struct GameActor {
    state: GameState,
    dice: DiceFactory,
    receiver: mpsc::Receiver<GameCommand>,
}

impl GameActor {
    async fn run(mut self) {
        tracing::info!(player = %self.state.username(), "game actor started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                GameCommand::Pause { state, reply } => {
                    self.state.handle_pause(state);
                    tracing::info!(
                        player = %self.state.username(),
                        paused = state.is_paused,
                        "pause state applied"
                    );
                    let _ = reply.send(());
                }
                GameCommand::Move { mv, reply } => {
                    let _ = reply.send(self.apply_move(mv));
                }
                GameCommand::War { war, reply } => {
                    let mut dice = (self.dice)(war.seed);
                    let _ = reply.send(self.state.handle_war(&war, dice.as_mut()));
                }
                GameCommand::Spawn {
                    territory,
                    units,
                    reply,
                } => {
                    let _ = reply.send(self.state.spawn(&territory, units));
                }
                GameCommand::MoveUnits {
                    from,
                    to,
                    units,
                    reply,
                } => {
                    let _ = reply.send(self.state.move_units(&from, &to, units));
                }
                GameCommand::Status { reply } => {
                    let _ = reply.send(self.state.clone());
                }
                GameCommand::Shutdown => {
                    tracing::info!(player = %self.state.username(), "game actor shutting down");
                    break;
                }
            }
        }

        tracing::info!(player = %self.state.username(), "game actor stopped");
    }

    fn apply_move(&mut self, mv: ArmyMove) -> MoveResult {
        let outcome = self.state.handle_move(&mv);
        let war = match outcome {
            MoveOutcome::MakeWar => Some(RecognitionOfWar {
                attacker: mv.player,
                defender: self.state.snapshot(),
                seed: rand::random(),
            }),
            MoveOutcome::Safe | MoveOutcome::SamePlayer => None,
        };
        MoveResult { outcome, war }
    }
}

/// Spawns a state actor with [`SeededDice`].
pub fn spawn_game(state: GameState, channel_size: usize) -> GameHandle {
    spawn_game_with_dice(state, channel_size, Box::new(|seed| Box::new(SeededDice::new(seed))))
}

/// Spawns a state actor that builds its dice with `dice`.
pub fn spawn_game_with_dice(
    state: GameState,
    channel_size: usize,
    dice: DiceFactory,
) -> GameHandle {
    let (tx, rx) = mpsc::channel(channel_size);
    let username = state.username().to_string();
    let actor = GameActor {
        state,
        dice,
        receiver: rx,
    };
    tokio::spawn(actor.run());
    GameHandle {
        username,
        sender: tx,
    }
}
