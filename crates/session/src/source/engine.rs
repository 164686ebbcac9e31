use std::time::Duration;

use async_trait::async_trait;
use chess_core::Game;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{Choice, MoveSource};
use crate::error::{Result, SessionError};
use crate::uci::UciEngine;

/// Moves chosen by a UCI engine with a fixed time budget. Never resigns.
pub struct EngineSource {
    engine: UciEngine,
    movetime: Duration,
}

impl EngineSource {
    pub async fn spawn(path: &str, movetime: Duration) -> Result<Self> {
        let engine = UciEngine::new(path, num_cpus::get()).await?;
        info!(path, movetime_ms = movetime.as_millis() as u64, "Engine ready");
        Ok(Self { engine, movetime })
    }
}

#[async_trait]
impl MoveSource for EngineSource {
    async fn choose_move(&mut self, game: &Game, cancel: &CancellationToken) -> Result<Choice> {
        let fen = game.snapshot();
        let search = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(Choice::Cancelled),
            search = self.engine.best_move(&fen, self.movetime) => search?,
        };

        info!(
            best_move = %search.best_move,
            depth = ?search.depth,
            nodes = ?search.nodes,
            time_ms = ?search.time_ms,
            nps = ?search.nps,
            "Engine search finished"
        );

        let mv = game.decode_uci(&search.best_move).map_err(|e| {
            SessionError::Engine(format!("engine chose an unusable move: {e}"))
        })?;
        Ok(Choice::Move(mv))
    }

    fn describe(&self) -> &str {
        " (engine)"
    }

    async fn close(&mut self) {
        self.engine.quit().await;
    }
}
