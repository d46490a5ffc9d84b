//! Immutable board snapshots

use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::{Chess, Color, EnPassantMode, Position};

pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    /// Side that played the half-move at `index` (White plays even indices).
    pub fn of_move(index: usize) -> Self {
        if index % 2 == 0 {
            Side::White
        } else {
            Side::Black
        }
    }
}

impl From<Color> for Side {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }
}

/// One position of a game: its FEN encoding and whose turn it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    fen: String,
    side_to_move: Side,
}

impl Board {
    pub fn new(fen: impl Into<String>, side_to_move: Side) -> Self {
        Self {
            fen: fen.into(),
            side_to_move,
        }
    }

    pub fn from_position(pos: &Chess) -> Self {
        Self {
            fen: Fen::from_position(pos, EnPassantMode::Legal).to_string(),
            side_to_move: pos.turn().into(),
        }
    }

    pub fn starting() -> Self {
        Self::new(STARTING_FEN, Side::White)
    }

    pub fn fen(&self) -> &str {
        &self.fen
    }

    pub fn side_to_move(&self) -> Side {
        self.side_to_move
    }
}
