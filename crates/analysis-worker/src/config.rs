//! Worker configuration from environment variables

use std::env;
use std::path::PathBuf;

use analysis_pipeline::AnalysisConfig;

use crate::error::WorkerError;

/// Notation of the move list handed to the worker
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveFormat {
    Uci,
    San,
}

impl MoveFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "uci" => Some(Self::Uci),
            "san" => Some(Self::San),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Path to Stockfish binary
    pub stockfish_path: String,

    /// JSON-lines file completed games are appended to; logged when unset
    pub record_path: Option<PathBuf>,

    /// Forced move notation; detected from the moves when unset
    pub move_format: Option<MoveFormat>,

    /// Engine budgets and quality thresholds
    pub analysis: AnalysisConfig,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, WorkerError> {
        let stockfish_path = env::var("STOCKFISH_PATH")
            .unwrap_or_else(|_| "/usr/local/bin/stockfish".to_string());

        let record_path = env::var("GAME_RECORD_PATH")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let move_format = match env::var("MOVE_FORMAT") {
            Ok(value) => Some(
                MoveFormat::parse(&value)
                    .ok_or(WorkerError::Config("MOVE_FORMAT must be 'uci' or 'san'"))?,
            ),
            Err(_) => None,
        };

        Ok(Self {
            stockfish_path,
            record_path,
            move_format,
            analysis: AnalysisConfig::from_env(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_format_parse() {
        assert_eq!(MoveFormat::parse("UCI"), Some(MoveFormat::Uci));
        assert_eq!(MoveFormat::parse(" san "), Some(MoveFormat::San));
        assert_eq!(MoveFormat::parse("pgn"), None);
    }
}
