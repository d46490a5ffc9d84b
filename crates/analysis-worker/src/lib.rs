pub mod config;
pub mod error;
pub mod moves;
pub mod recorder;
pub mod stockfish;
