//! Move-list input: tokenizing and replaying into a board history

use chess_core::GameHistory;
use tracing::debug;

use crate::config::MoveFormat;
use crate::error::WorkerError;

/// Split a move list into move tokens, dropping move numbers (`12.`, `12...`)
/// and game results.
pub fn tokenize(input: &str) -> Vec<String> {
    input
        .split(|c: char| c.is_whitespace() || c == ',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .filter_map(|t| {
            // "1.e4" style: keep what follows the number
            let t = match t.rfind('.') {
                Some(i) if t[..i].chars().all(|c| c.is_ascii_digit() || c == '.') => &t[i + 1..],
                _ => t,
            };
            (!t.is_empty()).then_some(t)
        })
        .filter(|t| !matches!(*t, "1-0" | "0-1" | "1/2-1/2" | "*"))
        .map(str::to_string)
        .collect()
}

/// Replay `moves` from the standard start. Without a forced format UCI is
/// tried first, then SAN.
pub fn build_history(
    moves: &[String],
    format: Option<MoveFormat>,
) -> Result<GameHistory, WorkerError> {
    if moves.is_empty() {
        return Err(WorkerError::NoMoves);
    }

    match format {
        Some(MoveFormat::Uci) => Ok(GameHistory::from_uci_moves(moves)?),
        Some(MoveFormat::San) => Ok(GameHistory::from_san_moves(moves)?),
        None => match GameHistory::from_uci_moves(moves) {
            Ok(history) => Ok(history),
            Err(uci_err) => {
                debug!(error = %uci_err, "Not a UCI move list, trying SAN");
                Ok(GameHistory::from_san_moves(moves)?)
            }
        },
    }
}
