//! Session error types

use chess_core::ChessError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Config(&'static str),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Wire format error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Desynchronised from opponent: {0}")]
    Desync(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Input error: {0}")]
    Input(#[from] std::io::Error),

    #[error("Opponent {peer} has left the game")]
    PeerDeparted { peer: String },

    #[error(transparent)]
    Chess(#[from] ChessError),
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
