//! Manual stage: entry, on-demand single-position analysis and request tokens

use chess_core::Board;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analyzer::{lock, Analyzer};
use crate::engine::EngineOutput;
use crate::error::PipelineError;
use crate::hooks::CompletedGame;
use crate::stage::Stage;
use crate::state::ManualLine;
use crate::task::{guarded, TaskHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ManualOutcome {
    /// Engine finished or at least one result was published
    Done,
    /// A newer request or a stage change made this one irrelevant
    Obsolete,
    /// Every attempt ended without a result
    Exhausted,
}

impl Analyzer {
    /// Enter Manual stage at `requested` (clamped to the game), or with no move
    /// selected. Safe to call from any stage and repeatedly.
    pub async fn enter_manual(&self, requested: Option<usize>) {
        self.transition_to_manual(requested, None).await;
    }

    /// Skip the remaining automated work, keeping the move currently shown.
    pub async fn skip_to_manual(&self) {
        let current = self.state.snapshot().current_index;
        self.enter_manual(current).await;
    }

    /// Enter Manual stage at the move with the biggest evaluation swing.
    pub async fn jump_to_biggest_swing(&self) {
        let entry = self.state.snapshot().biggest_score_change_move();
        self.enter_manual(Some(entry)).await;
    }

    /// Analyse a position the user navigated to while in Manual stage.
    /// `index` is the game move it corresponds to, if any.
    pub async fn explore_position(&self, board: Board, index: Option<usize>) {
        let _guard = self.transition.lock().await;
        if self.state.snapshot().stage != Stage::Manual {
            debug!("Ignoring position change outside manual stage");
            return;
        }

        let token = self.next_request_token();
        self.state
            .update(|s| s.exploring(index, board.clone(), token));
        self.replace_manual_task(board, token).await;
    }

    /// Re-run analysis of the position currently shown.
    pub async fn restart_manual_analysis(&self) {
        let _guard = self.transition.lock().await;
        let snapshot = self.state.snapshot();
        if snapshot.stage != Stage::Manual {
            return;
        }
        let Some(board) = snapshot.current_board.clone() else {
            return;
        };

        let token = self.next_request_token();
        self.state
            .update(|s| s.exploring(snapshot.current_index, board.clone(), token));
        self.replace_manual_task(board, token).await;
    }

    /// The whole Manual entry runs under the transition lock, as do explore and
    /// restart requests, so concurrent callers see one complete request after
    /// another. The entry's own token is only taken once the engine restart
    /// has settled.
    ///
    /// `origin` is the pipeline's own token when the pipeline itself hands
    /// over; its task handle is then dropped rather than awaited.
    pub(crate) async fn transition_to_manual(
        &self,
        requested: Option<usize>,
        origin: Option<&CancellationToken>,
    ) {
        let _guard = match origin {
            Some(cancel) => tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                guard = self.transition.lock() => guard,
            },
            None => self.transition.lock().await,
        };

        let pipeline = lock(&self.pipeline_task).take();
        if let Some(task) = pipeline {
            if origin.is_none() {
                task.cancel_and_wait().await;
            }
        }

        self.cancel_manual_task().await;
        self.engine.stop().await;

        let move_count = self.history.move_count();
        let index = clamp_index(requested, move_count);
        let board = index
            .and_then(|i| self.history.board(i + 1))
            .or_else(|| self.history.board(0));

        let thresholds = self.config.thresholds;
        let entered = self
            .state
            .update(|s| s.entering_manual(index, board.clone(), &thresholds));
        info!(?index, move_count, "Entered manual stage");

        self.recorder
            .save_completed_game(CompletedGame::from_state(&entered, move_count, &thresholds));

        let fresh = CancellationToken::new();
        match self
            .restart_engine(self.config.manual.engine_options(), &fresh)
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!("Engine unavailable on manual entry, analysis will retry"),
            Err(e) => {
                warn!(error = %e, "Engine setup failed on manual entry");
                self.engine.mark_not_ready();
            }
        }

        let Some(board) = board else {
            return;
        };
        let token = self.next_request_token();
        let current = self.state.update_if(|s| {
            (self.is_current_request(token) && s.stage == Stage::Manual)
                .then(|| s.exploring(index, board.clone(), token))
        });
        if !current {
            debug!(token, "Manual entry superseded before analysis started");
            return;
        }
        self.replace_manual_task(board, token).await;
        self.fetcher.fetch_supplementary_data();
    }

    /// Cancel any in-flight manual request and start one for `board`.
    async fn replace_manual_task(&self, board: Board, token: u64) {
        let mut slot = self.manual_task.lock().await;
        if let Some(previous) = slot.take() {
            previous.cancel_and_wait().await;
        }
        if !self.is_current_request(token) {
            // A newer request was issued while we waited
            return;
        }

        let this = self.clone();
        *slot = Some(TaskHandle::spawn(move |cancel| async move {
            this.ensure_engine_analysis(board, token, cancel).await;
        }));
    }

    async fn ensure_engine_analysis(self, board: Board, token: u64, cancel: CancellationToken) {
        match self.analyse_position(&board, token, &cancel).await {
            Ok(ManualOutcome::Done) => {
                self.state.update_if(|s| {
                    self.is_current_request(token)
                        .then(|| s.with_analysis_finished())
                });
            }
            Ok(ManualOutcome::Obsolete) | Err(PipelineError::Cancelled) => {
                debug!(token, "Manual analysis superseded");
            }
            Ok(ManualOutcome::Exhausted) => {
                warn!(
                    token,
                    attempts = self.config.manual.retries,
                    fen = board.fen(),
                    "Manual analysis gave up"
                );
                self.state.update_if(|s| {
                    self.is_current_request(token)
                        .then(|| s.with_analysis_finished())
                });
            }
            Err(e) => warn!(token, error = %e, "Manual analysis failed"),
        }
    }

    async fn analyse_position(
        &self,
        board: &Board,
        token: u64,
        cancel: &CancellationToken,
    ) -> Result<ManualOutcome, PipelineError> {
        let manual = &self.config.manual;

        for attempt in 1..=manual.retries {
            if self.is_obsolete(token) {
                return Ok(ManualOutcome::Obsolete);
            }

            if !self.engine.is_ready() {
                match self.restart_engine(manual.engine_options(), cancel).await {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(attempt, "Engine restart failed");
                        continue;
                    }
                    Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
                    Err(e) => {
                        warn!(attempt, error = %e, "Engine setup failed");
                        self.engine.mark_not_ready();
                        continue;
                    }
                }
            }

            if let Err(e) = self.engine.analyze_to_depth(board.fen(), manual.depth).await {
                warn!(attempt, error = %e, "Failed to submit position");
                self.engine.mark_not_ready();
                continue;
            }

            let deadline = Instant::now() + manual.wait_window;
            let mut published = false;

            loop {
                let finished =
                    guarded(cancel, self.engine.wait_for_completion(manual.poll_interval)).await?;

                if self.is_obsolete(token) {
                    return Ok(ManualOutcome::Obsolete);
                }

                if let Some(output) = self.engine.latest_result() {
                    published |= self.publish_manual_result(token, board, &output);
                }

                if finished {
                    return Ok(ManualOutcome::Done);
                }
                if !self.engine.is_ready() || Instant::now() >= deadline {
                    break;
                }
            }

            self.engine.stop().await;
            if published {
                return Ok(ManualOutcome::Done);
            }

            warn!(attempt, fen = board.fen(), "No engine result in time, restarting engine");
            self.engine.mark_not_ready();
        }

        Ok(ManualOutcome::Exhausted)
    }

    fn is_obsolete(&self, token: u64) -> bool {
        !self.is_current_request(token) || self.state.snapshot().stage != Stage::Manual
    }

    /// Publish engine lines for `board` if `token` is still the newest request.
    /// The token is checked inside the state update, so a request that turns
    /// stale while its result is in flight never overwrites a newer one.
    pub(crate) fn publish_manual_result(
        &self,
        token: u64,
        board: &Board,
        output: &EngineOutput,
    ) -> bool {
        let lines: Vec<ManualLine> = output
            .lines
            .iter()
            .filter(|line| !line.pv.is_empty())
            .map(|line| ManualLine::from_engine(line, board))
            .collect();
        if lines.is_empty() {
            return false;
        }

        self.state.update_if(|s| {
            if !self.is_current_request(token) || s.stage != Stage::Manual {
                return None;
            }
            Some(s.with_manual_lines(token, lines))
        })
    }
}

fn clamp_index(requested: Option<usize>, move_count: usize) -> Option<usize> {
    if move_count == 0 {
        return None;
    }
    requested.map(|i| i.min(move_count - 1))
}
