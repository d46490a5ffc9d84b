//! Automated Preview and Analyse stages

use std::time::Duration;

use chess_core::Board;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::analyzer::{lock, Analyzer};
use crate::config::StageSettings;
use crate::engine::EngineOutput;
use crate::error::PipelineError;
use crate::hooks::CompletedGame;
use crate::score::MoveScore;
use crate::stage::Stage;
use crate::state::AnalysisState;
use crate::task::{checkpoint, guarded, pause, TaskHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageOutcome {
    Completed,
    /// Board history changed under the stage
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineOutcome {
    Completed { entry: usize },
    Interrupted { stage: Stage },
}

/// Half-move indices in the order a stage visits them.
///
/// Preview walks forward from the opening; Analyse walks backward so that an
/// early interruption still leaves the end of the game analysed in depth.
pub fn visiting_order(stage: Stage, move_count: usize) -> Vec<usize> {
    match stage {
        Stage::Preview => (0..move_count).collect(),
        Stage::Analyse => (0..move_count).rev().collect(),
        Stage::Manual => Vec::new(),
    }
}

impl Analyzer {
    /// Start (or restart) the automated pipeline for the current board history.
    ///
    /// No-op when the engine is not installed. A pipeline that is already
    /// running is cancelled and awaited first.
    pub async fn start_analysis(&self) {
        if !self.engine.is_installed() {
            warn!("Engine not installed, analysis not started");
            return;
        }

        let _guard = self.transition.lock().await;

        let previous = lock(&self.pipeline_task).take();
        if let Some(task) = previous {
            debug!("Cancelling previous pipeline");
            task.cancel_and_wait().await;
        }
        self.next_request_token();
        self.cancel_manual_task().await;

        let expected_len = self.history.len();
        self.state.update(|_| AnalysisState::starting());
        info!(move_count = expected_len.saturating_sub(1), "Starting analysis pipeline");

        let this = self.clone();
        let task = TaskHandle::spawn(move |cancel| async move {
            this.run_pipeline(expected_len, cancel).await;
        });
        *lock(&self.pipeline_task) = Some(task);
    }

    async fn run_pipeline(self, expected_len: usize, cancel: CancellationToken) {
        match self.run_stages(expected_len, &cancel).await {
            Ok(PipelineOutcome::Completed { entry }) => {
                info!(entry, "Pipeline complete");
                self.transition_to_manual(Some(entry), Some(&cancel)).await;
            }
            Ok(PipelineOutcome::Interrupted { stage }) => {
                info!(?stage, "Board history changed, pipeline stopped");
                self.state.update_if(|s| {
                    s.stage
                        .is_automated()
                        .then(|| s.with_analysis_finished())
                });
            }
            Err(PipelineError::Cancelled) => {
                debug!("Pipeline cancelled");
            }
            Err(e) => {
                error!(error = %e, "Pipeline failed, falling back to manual stage");
                self.transition_to_manual(None, Some(&cancel)).await;
            }
        }
    }

    async fn run_stages(
        &self,
        expected_len: usize,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome, PipelineError> {
        for stage in [Stage::Preview, Stage::Analyse] {
            let Some(settings) = self.config.stage_settings(stage) else {
                continue;
            };
            let outcome = self.run_stage(stage, settings, expected_len, cancel).await?;
            if outcome == StageOutcome::Interrupted {
                return Ok(PipelineOutcome::Interrupted { stage });
            }
        }

        let move_count = expected_len.saturating_sub(1);
        let snapshot = self.state.snapshot();
        self.recorder.save_completed_game(CompletedGame::from_state(
            &snapshot,
            move_count,
            &self.config.thresholds,
        ));

        Ok(PipelineOutcome::Completed {
            entry: snapshot.biggest_score_change_move(),
        })
    }

    async fn run_stage(
        &self,
        stage: Stage,
        settings: &StageSettings,
        expected_len: usize,
        cancel: &CancellationToken,
    ) -> Result<StageOutcome, PipelineError> {
        let order = visiting_order(stage, expected_len.saturating_sub(1));
        info!(?stage, moves = order.len(), "Entering stage");
        self.state.update(|s| s.entering_stage(stage, order.clone()));

        if !self.restart_engine(settings.engine_options(), cancel).await? {
            return Err(PipelineError::EngineRestart);
        }

        for (position, &index) in order.iter().enumerate() {
            checkpoint(cancel).await?;

            if self.history.len() != expected_len {
                return Ok(StageOutcome::Interrupted);
            }

            let Some(board) = self.history.board(index + 1) else {
                warn!(index, "No board for move, skipping");
                continue;
            };

            let remaining = order[position + 1..].to_vec();
            self.state
                .update(|s| s.with_progress(index, board.clone(), remaining));

            let mut output = self.evaluate(&board, settings.move_time, cancel).await?;

            if !self.engine.is_ready() {
                warn!(index, ?stage, "Engine stopped responding, restarting");
                if !self.restart_engine(settings.engine_options(), cancel).await? {
                    return Err(PipelineError::EngineRestart);
                }
                output = self.evaluate(&board, settings.move_time, cancel).await?;
                if !self.engine.is_ready() {
                    return Err(PipelineError::EngineUnavailable { index });
                }
            }

            if self.history.len() != expected_len {
                return Ok(StageOutcome::Interrupted);
            }

            let score = output
                .as_ref()
                .and_then(EngineOutput::principal)
                .map(|line| MoveScore::from_engine(line, board.side_to_move()));

            match score {
                Some(score) => {
                    debug!(index, ?stage, score = score.score, depth = score.depth, "Move scored");
                    self.state.update(|s| s.with_stage_score(stage, index, score));
                }
                None => debug!(index, ?stage, "No result for move"),
            }
        }

        self.state.update(|s| s.with_stage_finished());
        Ok(StageOutcome::Completed)
    }

    /// Submit one position and wait up to the budget plus grace period.
    async fn evaluate(
        &self,
        board: &Board,
        budget: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<EngineOutput>, PipelineError> {
        if let Err(e) = self.engine.analyze_for_time(board.fen(), budget).await {
            warn!(error = %e, fen = board.fen(), "Failed to submit position");
            return Ok(None);
        }

        let timeout = budget + self.config.grace_period;
        let completed = match guarded(cancel, self.engine.wait_for_completion(timeout)).await {
            Ok(completed) => completed,
            Err(e) => {
                self.engine.stop().await;
                return Err(e);
            }
        };

        if !completed {
            debug!(fen = board.fen(), "Engine timed out, stopping search");
            self.engine.stop().await;
            // Engines may still flush a result after the stop
            pause(cancel, self.config.stop_pause).await?;
        }

        Ok(self.engine.latest_result())
    }
}
