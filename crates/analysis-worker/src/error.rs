//! Worker error types

use chess_core::ChessError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(&'static str),

    #[error("Invalid game: {0}")]
    Chess(#[from] ChessError),

    #[error("No moves given")]
    NoMoves,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
