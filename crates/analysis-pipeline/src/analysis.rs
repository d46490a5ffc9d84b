//! Score aggregation and move-quality classification
//! (pure functions over score maps, no engine or state access)

use std::collections::BTreeMap;

use chess_core::Side;
use serde::{Deserialize, Serialize};

use crate::score::{merged_scores, ScoreMap};

/// Default classification thresholds (pawns, on the mover-relative change)
pub const BLUNDER_THRESHOLD: f64 = 2.0;
pub const MISTAKE_THRESHOLD: f64 = 1.0;
pub const DUBIOUS_THRESHOLD: f64 = 0.5;
pub const GOOD_THRESHOLD: f64 = 0.75;
pub const BRILLIANT_THRESHOLD: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveQuality {
    Blunder,
    Mistake,
    Dubious,
    Normal,
    Good,
    Brilliant,
}

impl MoveQuality {
    pub fn as_str(self) -> &'static str {
        match self {
            MoveQuality::Blunder => "blunder",
            MoveQuality::Mistake => "mistake",
            MoveQuality::Dubious => "dubious",
            MoveQuality::Normal => "normal",
            MoveQuality::Good => "good",
            MoveQuality::Brilliant => "brilliant",
        }
    }
}

/// Magnitudes are positive; downside checks compare against their negation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    pub blunder: f64,
    pub mistake: f64,
    pub dubious: f64,
    pub good: f64,
    pub brilliant: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            blunder: BLUNDER_THRESHOLD,
            mistake: MISTAKE_THRESHOLD,
            dubious: DUBIOUS_THRESHOLD,
            good: GOOD_THRESHOLD,
            brilliant: BRILLIANT_THRESHOLD,
        }
    }
}

/// Classify a change in the mover's evaluation. First match wins; downside
/// bounds are inclusive with `<=`, upside bounds inclusive with `>=`.
pub fn classify_adjusted_change(adjusted: f64, t: &QualityThresholds) -> MoveQuality {
    if adjusted <= -t.blunder {
        MoveQuality::Blunder
    } else if adjusted <= -t.mistake {
        MoveQuality::Mistake
    } else if adjusted <= -t.dubious {
        MoveQuality::Dubious
    } else if adjusted >= t.brilliant {
        MoveQuality::Brilliant
    } else if adjusted >= t.good {
        MoveQuality::Good
    } else {
        MoveQuality::Normal
    }
}

/// Quality of every scored move, compared with the same side's previous move
/// (`index - 2`). The first move of each side is always Normal.
pub fn classify_moves(
    preview: &ScoreMap,
    analyse: &ScoreMap,
    thresholds: &QualityThresholds,
) -> BTreeMap<usize, MoveQuality> {
    let merged = merged_scores(preview, analyse);

    merged
        .iter()
        .map(|(&index, current)| {
            let prior = index.checked_sub(2).and_then(|i| merged.get(&i));
            let quality = match prior {
                None => MoveQuality::Normal,
                Some(prior) => {
                    let change = current.score - prior.score;
                    let adjusted = match Side::of_move(index) {
                        Side::White => change,
                        Side::Black => -change,
                    };
                    classify_adjusted_change(adjusted, thresholds)
                }
            };
            (index, quality)
        })
        .collect()
}

/// Index of the move after which the evaluation swung the most.
///
/// Compares each scored move with the previous scored move over the merged
/// maps. Returns 0 when fewer than two moves are scored; ties keep the
/// earliest index.
pub fn find_biggest_score_change_move(preview: &ScoreMap, analyse: &ScoreMap) -> usize {
    let merged = merged_scores(preview, analyse);
    if merged.len() < 2 {
        return 0;
    }

    let mut best_index = 0;
    let mut best_change = f64::NEG_INFINITY;
    let mut previous: Option<f64> = None;

    for (&index, score) in &merged {
        if let Some(prev) = previous {
            let change = (score.score - prev).abs();
            if change > best_change {
                best_change = change;
                best_index = index;
            }
        }
        previous = Some(score.score);
    }

    best_index
}

/// Per-quality tallies for one side
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityCounts {
    pub blunder: u32,
    pub mistake: u32,
    pub dubious: u32,
    pub normal: u32,
    pub good: u32,
    pub brilliant: u32,
}

impl QualityCounts {
    fn add(&mut self, quality: MoveQuality) {
        match quality {
            MoveQuality::Blunder => self.blunder += 1,
            MoveQuality::Mistake => self.mistake += 1,
            MoveQuality::Dubious => self.dubious += 1,
            MoveQuality::Normal => self.normal += 1,
            MoveQuality::Good => self.good += 1,
            MoveQuality::Brilliant => self.brilliant += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideCounts {
    pub white: QualityCounts,
    pub black: QualityCounts,
}

impl SideCounts {
    pub fn tally(qualities: &BTreeMap<usize, MoveQuality>) -> Self {
        let mut counts = Self::default();
        for (&index, &quality) in qualities {
            match Side::of_move(index) {
                Side::White => counts.white.add(quality),
                Side::Black => counts.black.add(quality),
            }
        }
        counts
    }
}
