//! Engine adapter contract
//!
//! The pipeline only ever talks to the engine through [`EngineAdapter`]; the
//! worker crate provides a UCI implementation over a child process and the
//! tests provide scripted fakes.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOptions {
    pub threads: u32,
    pub hash_mb: u32,
    pub multi_pv: u32,
    pub use_nnue: bool,
}

/// One principal variation as reported by the engine.
///
/// Scores are from the side to move's perspective, as UCI reports them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PvLine {
    /// 1-based multi-PV rank
    pub multipv: u32,
    pub pv: Vec<String>,
    pub cp: Option<i32>,
    pub mate: Option<i32>,
    pub depth: u32,
    pub nodes: u64,
    pub nps: u64,
}

/// Latest analysis of the submitted position, lines ordered by rank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOutput {
    pub lines: Vec<PvLine>,
}

impl EngineOutput {
    /// Best line, if the engine has produced one with a principal variation.
    pub fn principal(&self) -> Option<&PvLine> {
        self.lines.iter().find(|line| !line.pv.is_empty())
    }
}

/// A stateful, asynchronous analysis engine.
///
/// `analyze_*` only begin a search; completion is observed through
/// [`wait_for_completion`](EngineAdapter::wait_for_completion) and
/// [`latest_result`](EngineAdapter::latest_result). Submitting a new position
/// discards the previous result.
#[async_trait]
pub trait EngineAdapter: Send + Sync {
    /// Whether an engine binary is available at all.
    fn is_installed(&self) -> bool;

    /// Whether the engine process is alive and accepting work.
    fn is_ready(&self) -> bool;

    fn mark_not_ready(&self);

    async fn configure(&self, options: EngineOptions) -> Result<(), EngineError>;

    async fn new_game(&self) -> Result<(), EngineError>;

    /// Ask the current search to stop. Never fails; a dead engine is a no-op.
    async fn stop(&self);

    /// Kill and relaunch the engine process.
    async fn restart(&self) -> bool;

    async fn analyze_for_time(&self, fen: &str, budget: Duration) -> Result<(), EngineError>;

    async fn analyze_to_depth(&self, fen: &str, depth: u32) -> Result<(), EngineError>;

    /// Wait until the current search finishes. Returns false on timeout.
    async fn wait_for_completion(&self, timeout: Duration) -> bool;

    fn latest_result(&self) -> Option<EngineOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_skips_empty_lines() {
        let output = EngineOutput {
            lines: vec![
                PvLine {
                    multipv: 1,
                    cp: Some(10),
                    ..Default::default()
                },
                PvLine {
                    multipv: 2,
                    pv: vec!["e2e4".into()],
                    cp: Some(5),
                    ..Default::default()
                },
            ],
        };
        assert_eq!(output.principal().map(|l| l.multipv), Some(2));
        assert!(EngineOutput::default().principal().is_none());
    }
}
