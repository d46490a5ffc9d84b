//! Board history: one snapshot per half-move, plus the starting position

use std::sync::{Arc, RwLock};

use shakmaty::san::San;
use shakmaty::uci::UciMove;
use shakmaty::{Chess, Move, Position};

use crate::board::Board;
use crate::error::ChessError;

/// Ordered, length-observable sequence of boards.
///
/// Index 0 is the starting position, index `i + 1` the position after
/// half-move `i`. The length doubles as a generation marker: callers that
/// captured it earlier compare against it to detect that the game was swapped.
pub trait BoardHistory: Send + Sync {
    fn len(&self) -> usize;

    fn board(&self, index: usize) -> Option<Board>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of half-moves (boards minus the starting position).
    fn move_count(&self) -> usize {
        self.len().saturating_sub(1)
    }
}

/// In-memory history that can be replaced wholesale when another game loads.
#[derive(Debug, Default)]
pub struct GameHistory {
    boards: RwLock<Arc<Vec<Board>>>,
}

impl GameHistory {
    pub fn new(boards: Vec<Board>) -> Self {
        Self {
            boards: RwLock::new(Arc::new(boards)),
        }
    }

    /// Build from UCI moves (`e2e4`, `e7e8q`) played from the standard start.
    pub fn from_uci_moves<S: AsRef<str>>(moves: &[S]) -> Result<Self, ChessError> {
        Self::replay(moves, |pos, token| {
            let uci: UciMove = token.parse().map_err(|e| format!("{e}"))?;
            uci.to_move(pos).map_err(|e| format!("{e}"))
        })
    }

    /// Build from SAN moves (`e4`, `Nf3`, `O-O`) played from the standard start.
    pub fn from_san_moves<S: AsRef<str>>(moves: &[S]) -> Result<Self, ChessError> {
        Self::replay(moves, |pos, token| {
            let san: San = token.parse().map_err(|e| format!("{e}"))?;
            san.to_move(pos).map_err(|e| format!("{e}"))
        })
    }

    fn replay<S, F>(moves: &[S], mut decode: F) -> Result<Self, ChessError>
    where
        S: AsRef<str>,
        F: FnMut(&Chess, &str) -> Result<Move, String>,
    {
        let mut pos = Chess::default();
        let mut boards = Vec::with_capacity(moves.len() + 1);
        boards.push(Board::from_position(&pos));

        for (ply, token) in moves.iter().enumerate() {
            let token = token.as_ref().trim();
            let mv = decode(&pos, token).map_err(|reason| ChessError::InvalidMove {
                mv: token.to_string(),
                ply,
                reason,
            })?;
            pos.play_unchecked(mv);
            boards.push(Board::from_position(&pos));
        }

        Ok(Self::new(boards))
    }

    /// Swap in a different game. Readers holding the old length will notice.
    pub fn replace(&self, boards: Vec<Board>) {
        let mut guard = self.boards.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(boards);
    }

    /// Keep only the first `len` boards.
    pub fn truncate(&self, len: usize) {
        let mut guard = self.boards.write().unwrap_or_else(|e| e.into_inner());
        if len < guard.len() {
            let kept = guard[..len].to_vec();
            *guard = Arc::new(kept);
        }
    }

    pub fn snapshot(&self) -> Arc<Vec<Board>> {
        self.boards.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl BoardHistory for GameHistory {
    fn len(&self) -> usize {
        self.snapshot().len()
    }

    fn board(&self, index: usize) -> Option<Board> {
        self.snapshot().get(index).cloned()
    }
}
