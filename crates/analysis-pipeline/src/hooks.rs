//! Collaborators the pipeline notifies but never waits on

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analysis::{classify_moves, MoveQuality, QualityThresholds, SideCounts};
use crate::score::ScoreMap;
use crate::state::AnalysisState;

/// Analysed-game record handed to persistence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedGame {
    pub move_count: usize,
    pub preview_scores: ScoreMap,
    pub analyse_scores: ScoreMap,
    pub qualities: BTreeMap<usize, MoveQuality>,
    pub biggest_swing: usize,
    pub counts: SideCounts,
    pub completed_at: DateTime<Utc>,
}

impl CompletedGame {
    pub fn from_state(
        state: &AnalysisState,
        move_count: usize,
        thresholds: &QualityThresholds,
    ) -> Self {
        let qualities = classify_moves(&state.preview_scores, &state.analyse_scores, thresholds);
        Self {
            move_count,
            preview_scores: state.preview_scores.clone(),
            analyse_scores: state.analyse_scores.clone(),
            biggest_swing: state.biggest_score_change_move(),
            counts: SideCounts::tally(&qualities),
            qualities,
            completed_at: Utc::now(),
        }
    }
}

/// Persistence hook. Fire-and-forget: implementations must not block.
pub trait GameRecorder: Send + Sync {
    fn save_completed_game(&self, record: CompletedGame);
}

/// Fired once Manual-stage analysis of the current position has been kicked
/// off. Fire-and-forget.
pub trait SupplementaryFetcher: Send + Sync {
    fn fetch_supplementary_data(&self);
}

/// Fetcher for setups without supplementary data.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFetcher;

impl SupplementaryFetcher for NoopFetcher {
    fn fetch_supplementary_data(&self) {}
}
