//! Game review analysis pipeline
//!
//! Drives an external UCI-style engine through the Preview → Analyse → Manual
//! stages, accumulates per-move scores and derives move-quality labels.

pub mod analysis;
pub mod analyzer;
pub mod config;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod score;
pub mod stage;
pub mod state;

mod manual;
mod pipeline;
mod task;

pub use analysis::{
    classify_adjusted_change, classify_moves, find_biggest_score_change_move, MoveQuality,
    QualityCounts, QualityThresholds, SideCounts,
};
pub use analyzer::Analyzer;
pub use config::{AnalysisConfig, ManualSettings, StageSettings};
pub use engine::{EngineAdapter, EngineOptions, EngineOutput, PvLine};
pub use error::{EngineError, PipelineError};
pub use hooks::{CompletedGame, GameRecorder, NoopFetcher, SupplementaryFetcher};
pub use pipeline::visiting_order;
pub use score::{merged_scores, MoveScore, ScoreMap, MATE_SCORE_PAWNS};
pub use stage::Stage;
pub use state::{AnalysisState, ManualLine, StateStore};
