//! Move sources: where the local side's next move comes from.

mod engine;
mod human;

pub use engine::EngineSource;
pub use human::HumanInput;

use async_trait::async_trait;
use chess_core::{Game, Move};
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// What a move source decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    Move(Move),
    Resign,
    /// The wait was cancelled before a move was chosen.
    Cancelled,
}

/// Producer of the local side's moves.
#[async_trait]
pub trait MoveSource: Send {
    /// Choose a move in `game`. Must return [`Choice::Cancelled`] promptly
    /// once `cancel` fires.
    async fn choose_move(&mut self, game: &Game, cancel: &CancellationToken) -> Result<Choice>;

    /// Shown next to the player's colour, e.g. `" (engine)"`.
    fn describe(&self) -> &str {
        ""
    }

    /// Release any resources held by the source.
    async fn close(&mut self) {}
}
