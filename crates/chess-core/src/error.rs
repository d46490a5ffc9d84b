use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChessError {
    #[error("Invalid move '{mv}' at ply {ply}: {reason}")]
    InvalidMove {
        mv: String,
        ply: usize,
        reason: String,
    },
}
