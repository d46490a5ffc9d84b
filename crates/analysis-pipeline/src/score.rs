//! Per-move scores and score maps

use std::collections::BTreeMap;

use chess_core::Side;
use serde::{Deserialize, Serialize};

use crate::engine::PvLine;

/// Pawn value standing in for a forced mate, minus the distance to mate.
pub const MATE_SCORE_PAWNS: f64 = 300.0;

/// Half-move index (0-based, White on even indices) to score.
pub type ScoreMap = BTreeMap<usize, MoveScore>;

/// Evaluation of the position reached by one half-move.
///
/// `score` and `mate_in` are stored on a single fixed scale for every index
/// (positive favors White) so that neighbouring moves can be compared
/// directly. [`MoveScore::for_mover`] gives the view of the side that played
/// the move.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoveScore {
    /// Pawns
    pub score: f64,
    pub is_mate: bool,
    /// Plies to mate, signed like `score`
    pub mate_in: i32,
    pub depth: u32,
    pub nodes: u64,
    pub nps: u64,
}

impl MoveScore {
    pub fn pawns(score: f64) -> Self {
        Self {
            score,
            is_mate: false,
            mate_in: 0,
            depth: 0,
            nodes: 0,
            nps: 0,
        }
    }

    /// Convert a side-to-move-relative engine line for a position where
    /// `side_to_move` is on turn. The engine's sign is flipped for Black.
    pub fn from_engine(line: &PvLine, side_to_move: Side) -> Self {
        let sign = match side_to_move {
            Side::White => 1,
            Side::Black => -1,
        };

        let (score, is_mate, mate_in) = match (line.mate, line.cp) {
            (Some(mate), _) => {
                let plies = mate_plies(mate);
                let distance = f64::from(plies.abs()).min(MATE_SCORE_PAWNS - 1.0);
                let for_side_to_move = if mate > 0 {
                    MATE_SCORE_PAWNS - distance
                } else {
                    -(MATE_SCORE_PAWNS - distance)
                };
                (f64::from(sign) * for_side_to_move, true, sign * plies)
            }
            (None, Some(cp)) => (f64::from(sign * cp) / 100.0, false, 0),
            (None, None) => (0.0, false, 0),
        };

        Self {
            score,
            is_mate,
            mate_in,
            depth: line.depth,
            nodes: line.nodes,
            nps: line.nps,
        }
    }

    /// Score as seen by the side that played half-move `index`.
    pub fn for_mover(&self, index: usize) -> f64 {
        match Side::of_move(index) {
            Side::White => self.score,
            Side::Black => -self.score,
        }
    }

    /// Mate distance as seen by the side that played half-move `index`.
    pub fn mate_for_mover(&self, index: usize) -> Option<i32> {
        if !self.is_mate {
            return None;
        }
        Some(match Side::of_move(index) {
            Side::White => self.mate_in,
            Side::Black => -self.mate_in,
        })
    }
}

/// UCI `mate N` counts the side to move's full moves. Convert to signed plies:
/// mating in N takes 2N-1 plies, being mated in N takes 2N. "mate 0" means the
/// side to move is already mated.
fn mate_plies(mate: i32) -> i32 {
    if mate > 0 {
        2 * mate - 1
    } else {
        2 * mate
    }
}

/// Analyse entries take precedence; Preview fills the gaps.
pub fn merged_scores(preview: &ScoreMap, analyse: &ScoreMap) -> ScoreMap {
    let mut merged = preview.clone();
    merged.extend(analyse.iter().map(|(index, score)| (*index, *score)));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cp_line(cp: i32) -> PvLine {
        PvLine {
            multipv: 1,
            pv: vec!["e7e5".into()],
            cp: Some(cp),
            depth: 12,
            nodes: 50_000,
            nps: 1_000_000,
            ..Default::default()
        }
    }

    fn mate_line(mate: i32) -> PvLine {
        PvLine {
            multipv: 1,
            pv: vec!["d8h4".into()],
            mate: Some(mate),
            ..Default::default()
        }
    }

    #[test]
    fn test_white_move_good_for_white_is_positive_for_mover() {
        // After White's move 0, Black is on turn and the engine says Black is -80
        let score = MoveScore::from_engine(&cp_line(-80), Side::Black);
        assert!((score.score - 0.8).abs() < 1e-9);
        assert!(score.for_mover(0) > 0.0);
        assert_eq!(score.depth, 12);
        assert_eq!(score.nodes, 50_000);
    }

    #[test]
    fn test_black_move_good_for_black_is_positive_for_mover() {
        // After Black's move 1, White is on turn and the engine says White is -120
        let score = MoveScore::from_engine(&cp_line(-120), Side::White);
        assert!((score.score + 1.2).abs() < 1e-9);
        assert!(score.for_mover(1) > 0.0);
        assert!((score.for_mover(1) - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_mate_scores_keep_sign_per_mover() {
        // Black just moved and White is getting mated in 2 moves: 4 plies
        let score = MoveScore::from_engine(&mate_line(-2), Side::White);
        assert!(score.is_mate);
        assert_eq!(score.mate_in, -4);
        assert!((score.score + (MATE_SCORE_PAWNS - 4.0)).abs() < 1e-9);
        assert_eq!(score.mate_for_mover(1), Some(4));
        assert!(score.for_mover(1) > 0.0);

        // Black just moved into a mate in 1: one ply, against the mover
        let blunder = MoveScore::from_engine(&mate_line(1), Side::White);
        assert_eq!(blunder.mate_in, 1);
        assert_eq!(blunder.mate_for_mover(1), Some(-1));
        assert!(blunder.for_mover(1) < 0.0);

        // White just delivered mate: Black to move, "mate 0"
        let mated = MoveScore::from_engine(&mate_line(0), Side::Black);
        assert!((mated.for_mover(0) - MATE_SCORE_PAWNS).abs() < 1e-9);
        assert_eq!(mated.mate_for_mover(0), Some(0));
        assert_eq!(MoveScore::pawns(1.0).mate_for_mover(0), None);
    }

    #[test]
    fn test_shorter_mate_scores_higher() {
        let near = MoveScore::from_engine(&mate_line(1), Side::White);
        let far = MoveScore::from_engine(&mate_line(7), Side::White);
        assert!(near.score > far.score);
    }

    #[test]
    fn test_merge_prefers_analyse() {
        let preview = ScoreMap::from([(0, MoveScore::pawns(0.3)), (1, MoveScore::pawns(0.1))]);
        let analyse = ScoreMap::from([(1, MoveScore::pawns(0.5)), (2, MoveScore::pawns(0.4))]);
        let merged = merged_scores(&preview, &analyse);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[&0].score, 0.3);
        assert_eq!(merged[&1].score, 0.5);
        assert_eq!(merged[&2].score, 0.4);
    }
}
