//! Pipeline state projection and its copy-on-write store

use std::collections::BTreeMap;
use std::sync::Arc;

use chess_core::Board;
use serde::Serialize;
use tokio::sync::watch;

use crate::analysis::{classify_moves, find_biggest_score_change_move, MoveQuality, QualityThresholds};
use crate::engine::PvLine;
use crate::score::{merged_scores, MoveScore, ScoreMap};
use crate::stage::Stage;

/// One multi-PV line from interactive analysis, scored like the move maps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManualLine {
    pub rank: u32,
    pub pv: Vec<String>,
    pub score: MoveScore,
}

impl ManualLine {
    pub fn from_engine(line: &PvLine, board: &Board) -> Self {
        Self {
            rank: line.multipv,
            pv: line.pv.clone(),
            score: MoveScore::from_engine(line, board.side_to_move()),
        }
    }
}

/// Everything downstream consumers see. Never mutated in place: every change
/// produces a new value through [`StateStore::update`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisState {
    pub stage: Stage,
    pub preview_scores: ScoreMap,
    pub analyse_scores: ScoreMap,
    pub qualities: BTreeMap<usize, MoveQuality>,

    /// Move being analysed (automated stages) or selected (Manual)
    pub current_index: Option<usize>,
    pub current_board: Option<Board>,
    /// Indices the running automated stage has yet to visit
    pub remaining: Vec<usize>,
    pub current_score: Option<MoveScore>,

    pub manual_lines: Vec<ManualLine>,
    /// Request token the manual lines belong to
    pub manual_token: u64,

    pub biggest_swing: Option<usize>,
    pub engine_ready: bool,
    pub is_analysing: bool,
}

impl Default for AnalysisState {
    fn default() -> Self {
        Self {
            stage: Stage::Preview,
            preview_scores: ScoreMap::new(),
            analyse_scores: ScoreMap::new(),
            qualities: BTreeMap::new(),
            current_index: None,
            current_board: None,
            remaining: Vec::new(),
            current_score: None,
            manual_lines: Vec::new(),
            manual_token: 0,
            biggest_swing: None,
            engine_ready: false,
            is_analysing: false,
        }
    }
}

impl AnalysisState {
    /// State for a fresh pipeline run. This starts a new session rather than
    /// transitioning the old one.
    pub fn starting() -> Self {
        Self {
            is_analysing: true,
            ..Self::default()
        }
    }

    pub fn merged_scores(&self) -> ScoreMap {
        merged_scores(&self.preview_scores, &self.analyse_scores)
    }

    pub fn biggest_score_change_move(&self) -> usize {
        find_biggest_score_change_move(&self.preview_scores, &self.analyse_scores)
    }

    pub(crate) fn entering_stage(&self, stage: Stage, order: Vec<usize>) -> Self {
        debug_assert!(self.stage.can_advance_to(stage));
        Self {
            stage,
            remaining: order,
            current_index: None,
            current_score: None,
            is_analysing: true,
            ..self.clone()
        }
    }

    pub(crate) fn with_progress(&self, index: usize, board: Board, remaining: Vec<usize>) -> Self {
        Self {
            current_index: Some(index),
            current_board: Some(board),
            remaining,
            ..self.clone()
        }
    }

    pub(crate) fn with_stage_score(&self, stage: Stage, index: usize, score: MoveScore) -> Self {
        let mut next = self.clone();
        match stage {
            Stage::Preview => {
                next.preview_scores.insert(index, score);
            }
            Stage::Analyse => {
                next.analyse_scores.insert(index, score);
            }
            Stage::Manual => return next,
        }
        next.current_score = Some(score);
        next
    }

    pub(crate) fn with_engine_ready(&self, engine_ready: bool) -> Self {
        Self {
            engine_ready,
            ..self.clone()
        }
    }

    pub(crate) fn with_stage_finished(&self) -> Self {
        Self {
            remaining: Vec::new(),
            ..self.clone()
        }
    }

    /// Manual-stage projection: gaps in the Analyse map are filled from
    /// Preview and qualities are recomputed, so consumers never need to know
    /// whether the automated stages ran to completion.
    pub(crate) fn entering_manual(
        &self,
        index: Option<usize>,
        board: Option<Board>,
        thresholds: &QualityThresholds,
    ) -> Self {
        let analyse_scores = merged_scores(&self.preview_scores, &self.analyse_scores);
        let qualities = classify_moves(&self.preview_scores, &analyse_scores, thresholds);
        let biggest_swing = Some(find_biggest_score_change_move(
            &self.preview_scores,
            &analyse_scores,
        ));
        let current_score = index.and_then(|i| analyse_scores.get(&i).copied());

        Self {
            stage: Stage::Manual,
            analyse_scores,
            qualities,
            current_index: index,
            current_board: board,
            remaining: Vec::new(),
            current_score,
            manual_lines: Vec::new(),
            biggest_swing,
            engine_ready: false,
            is_analysing: false,
            ..self.clone()
        }
    }

    pub(crate) fn exploring(&self, index: Option<usize>, board: Board, token: u64) -> Self {
        let current_score = index.and_then(|i| self.merged_scores().get(&i).copied());
        Self {
            current_index: index,
            current_board: Some(board),
            current_score,
            manual_lines: Vec::new(),
            manual_token: token,
            is_analysing: true,
            ..self.clone()
        }
    }

    pub(crate) fn with_manual_lines(&self, token: u64, lines: Vec<ManualLine>) -> Self {
        Self {
            current_score: lines.first().map(|l| l.score).or(self.current_score),
            manual_lines: lines,
            manual_token: token,
            engine_ready: true,
            ..self.clone()
        }
    }

    pub(crate) fn with_analysis_finished(&self) -> Self {
        Self {
            is_analysing: false,
            ..self.clone()
        }
    }
}

/// Single shared record of pipeline state.
///
/// Updates replace the whole value under the channel lock, so a transformation
/// always starts from the latest state and readers never observe a partial
/// update. Rendering subscribes to changes.
#[derive(Clone, Debug)]
pub struct StateStore {
    tx: Arc<watch::Sender<Arc<AnalysisState>>>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(AnalysisState::default())
    }
}

impl StateStore {
    pub fn new(initial: AnalysisState) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(initial));
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> Arc<AnalysisState> {
        self.tx.borrow().clone()
    }

    /// Replace the state with `f(current)` and return the new value.
    pub fn update<F>(&self, f: F) -> Arc<AnalysisState>
    where
        F: FnOnce(&AnalysisState) -> AnalysisState,
    {
        let mut published = None;
        self.tx.send_modify(|current| {
            let next = Arc::new(f(&**current));
            published = Some(next.clone());
            *current = next;
        });
        published.unwrap_or_else(|| self.snapshot())
    }

    /// Like [`update`](Self::update), but `f` may decline by returning `None`.
    /// Returns whether the state changed.
    pub fn update_if<F>(&self, f: F) -> bool
    where
        F: FnOnce(&AnalysisState) -> Option<AnalysisState>,
    {
        self.tx.send_if_modified(|current| match f(&**current) {
            Some(next) => {
                *current = Arc::new(next);
                true
            }
            None => false,
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<AnalysisState>> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess_core::Side;

    #[test]
    fn test_update_replaces_whole_value() {
        let store = StateStore::default();
        let before = store.snapshot();
        let after = store.update(|s| s.with_stage_score(Stage::Preview, 0, MoveScore::pawns(0.4)));

        assert!(before.preview_scores.is_empty());
        assert_eq!(after.preview_scores.len(), 1);
        assert_eq!(store.snapshot().current_score, Some(MoveScore::pawns(0.4)));
    }

    #[test]
    fn test_update_if_declines() {
        let store = StateStore::default();
        let mut rx = store.subscribe();
        assert!(!store.update_if(|_| None));
        assert!(!rx.has_changed().unwrap());

        assert!(store.update_if(|s| Some(s.with_engine_ready(true))));
        assert!(rx.has_changed().unwrap());
        assert!(store.snapshot().engine_ready);
    }

    #[test]
    fn test_entering_manual_fills_analyse_from_preview() {
        let state = AnalysisState {
            preview_scores: ScoreMap::from([
                (0, MoveScore::pawns(0.2)),
                (1, MoveScore::pawns(0.1)),
                (2, MoveScore::pawns(-2.5)),
            ]),
            analyse_scores: ScoreMap::from([(1, MoveScore::pawns(0.0))]),
            ..AnalysisState::starting()
        };

        let board = Board::new("fen", Side::Black);
        let manual = state.entering_manual(Some(2), Some(board.clone()), &QualityThresholds::default());

        assert_eq!(manual.stage, Stage::Manual);
        assert_eq!(manual.analyse_scores.len(), 3);
        assert_eq!(manual.analyse_scores[&1].score, 0.0);
        assert_eq!(manual.preview_scores, state.preview_scores);
        assert_eq!(manual.qualities[&2], MoveQuality::Blunder);
        assert_eq!(manual.current_board, Some(board));
        assert!(!manual.is_analysing);
        assert!(manual.remaining.is_empty());
    }

    #[test]
    fn test_entering_manual_is_idempotent() {
        let state = AnalysisState {
            preview_scores: ScoreMap::from([(0, MoveScore::pawns(0.2)), (1, MoveScore::pawns(0.9))]),
            ..AnalysisState::starting()
        };
        let t = QualityThresholds::default();
        let board = Board::new("fen", Side::White);
        let once = state.entering_manual(Some(1), Some(board.clone()), &t);
        let twice = once.entering_manual(Some(1), Some(board), &t);
        assert_eq!(once, twice);
    }
}
