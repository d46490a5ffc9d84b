//! Board model shared by the analysis pipeline and the worker.
//!
//! Positions are opaque FEN snapshots tagged with the side to move; a
//! [`BoardHistory`] is the ordered, length-observable list of them for one game.

pub mod board;
pub mod error;
pub mod history;

pub use board::{Board, Side};
pub use error::ChessError;
pub use history::{BoardHistory, GameHistory};
