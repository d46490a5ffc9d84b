//! Pipeline and engine error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Failed to spawn engine: {0}")]
    Spawn(String),

    #[error("Engine I/O error: {0}")]
    Io(String),

    #[error("Engine protocol error: {0}")]
    Protocol(String),

    #[error("Engine is not running")]
    NotRunning,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Cooperative cancellation. Never converted into a fallback transition.
    #[error("Analysis task cancelled")]
    Cancelled,

    #[error("Engine could not be restarted")]
    EngineRestart,

    #[error("Engine still unavailable after retrying move {index}")]
    EngineUnavailable { index: usize },

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}
