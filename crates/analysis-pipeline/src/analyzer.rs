//! Analysis controller: owns the engine, the board history and the state store,
//! and runs at most one pipeline task and one manual-analysis task at a time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chess_core::BoardHistory;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::AnalysisConfig;
use crate::engine::{EngineAdapter, EngineOptions};
use crate::error::PipelineError;
use crate::hooks::{GameRecorder, SupplementaryFetcher};
use crate::state::{AnalysisState, StateStore};
use crate::task::{guarded, pause, TaskHandle};

#[derive(Clone)]
pub struct Analyzer {
    pub(crate) engine: Arc<dyn EngineAdapter>,
    pub(crate) history: Arc<dyn BoardHistory>,
    pub(crate) recorder: Arc<dyn GameRecorder>,
    pub(crate) fetcher: Arc<dyn SupplementaryFetcher>,
    pub(crate) state: StateStore,
    pub(crate) config: Arc<AnalysisConfig>,

    /// Generation of the newest manual-analysis request
    pub(crate) request_token: Arc<AtomicU64>,

    pub(crate) pipeline_task: Arc<Mutex<Option<TaskHandle>>>,
    /// Held across cancel-then-spawn so two requests cannot both leave a task running
    pub(crate) manual_task: Arc<tokio::sync::Mutex<Option<TaskHandle>>>,
    /// Serializes stage transitions (pipeline start, Manual entry)
    pub(crate) transition: Arc<tokio::sync::Mutex<()>>,
}

impl Analyzer {
    pub fn new(
        engine: Arc<dyn EngineAdapter>,
        history: Arc<dyn BoardHistory>,
        recorder: Arc<dyn GameRecorder>,
        fetcher: Arc<dyn SupplementaryFetcher>,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            engine,
            history,
            recorder,
            fetcher,
            state: StateStore::new(AnalysisState::default()),
            config: Arc::new(config),
            request_token: Arc::new(AtomicU64::new(0)),
            pipeline_task: Arc::new(Mutex::new(None)),
            manual_task: Arc::new(tokio::sync::Mutex::new(None)),
            transition: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn state(&self) -> Arc<AnalysisState> {
        self.state.snapshot()
    }

    pub fn store(&self) -> &StateStore {
        &self.state
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn current_request_token(&self) -> u64 {
        self.request_token.load(Ordering::SeqCst)
    }

    pub(crate) fn next_request_token(&self) -> u64 {
        self.request_token.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn is_current_request(&self, token: u64) -> bool {
        self.request_token.load(Ordering::SeqCst) == token
    }

    /// Wait for the running pipeline task, if any, to finish on its own.
    pub async fn join_pipeline(&self) {
        let task = lock(&self.pipeline_task).take();
        if let Some(task) = task {
            task.join().await;
        }
    }

    /// Wait for the running manual-analysis task, if any, to finish on its own.
    pub async fn join_manual_analysis(&self) {
        let task = self.manual_task.lock().await.take();
        if let Some(task) = task {
            task.join().await;
        }
    }

    /// Cancel everything and stop the engine.
    pub async fn shutdown(&self) {
        let _guard = self.transition.lock().await;
        let pipeline = lock(&self.pipeline_task).take();
        if let Some(task) = pipeline {
            task.cancel_and_wait().await;
        }
        self.next_request_token();
        self.cancel_manual_task().await;
        self.engine.stop().await;
        self.state.update(|s| s.with_engine_ready(false));
    }

    pub(crate) async fn cancel_manual_task(&self) {
        let task = self.manual_task.lock().await.take();
        if let Some(task) = task {
            task.cancel_and_wait().await;
        }
    }

    /// Stop, relaunch and configure the engine.
    ///
    /// `Ok(false)` means the process could not be relaunched. Configuration
    /// failures surface as [`PipelineError::Engine`].
    pub(crate) async fn restart_engine(
        &self,
        options: EngineOptions,
        cancel: &CancellationToken,
    ) -> Result<bool, PipelineError> {
        self.engine.stop().await;

        let restarted = guarded(cancel, self.engine.restart()).await?;
        if !restarted {
            warn!("Engine restart failed");
            self.state.update(|s| s.with_engine_ready(false));
            return Ok(false);
        }

        self.engine.configure(options).await?;
        self.engine.new_game().await?;
        pause(cancel, self.config.settle_delay).await?;

        debug!(
            threads = options.threads,
            hash_mb = options.hash_mb,
            multi_pv = options.multi_pv,
            use_nnue = options.use_nnue,
            "Engine restarted"
        );
        self.state.update(|s| s.with_engine_ready(true));
        Ok(true)
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
