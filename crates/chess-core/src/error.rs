use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChessError {
    #[error("can not decode move '{text}': {reason}")]
    Notation { text: String, reason: String },

    #[error("illegal move '{text}': {reason}")]
    IllegalMove { text: String, reason: String },

    #[error("invalid snapshot '{fen}': {reason}")]
    Snapshot { fen: String, reason: String },
}
