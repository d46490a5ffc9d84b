//! Shared fakes for pipeline integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use analysis_pipeline::{
    AnalysisConfig, Analyzer, CompletedGame, EngineAdapter, EngineError, EngineOptions,
    EngineOutput, GameRecorder, PvLine, SupplementaryFetcher,
};
use async_trait::async_trait;
use chess_core::GameHistory;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Timed,
    Depth,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub fen: String,
    pub kind: SearchKind,
}

type SubmitHook = Box<dyn Fn(usize, &str) + Send + Sync>;

struct Pending {
    output: Option<EngineOutput>,
    ready_at: Instant,
}

struct Inner {
    installed: bool,
    ready: bool,
    fail_restart: bool,
    /// Restarts beyond this many fail
    restart_limit: Option<usize>,
    restarts: usize,
    submissions: Vec<Submission>,
    /// Side-to-move centipawns per FEN; unlisted positions score 0
    scores: HashMap<String, i32>,
    /// Submission numbers at which the engine dies without answering
    die_on: HashSet<usize>,
    /// Depth searches never produce output
    silent_depth: bool,
    depth_delay: Duration,
    /// Timed searches run this long instead of their budget
    timed_delay: Option<Duration>,
    /// `stop` releases an unfinished search's result instead of dropping it
    flush_on_stop: bool,
    pending: Option<Pending>,
}

/// Scripted in-process engine. Results are computed at submission time and
/// released on tokio's clock: timed searches use their whole budget unless
/// overridden, depth searches take `depth_delay`.
pub struct FakeEngine {
    inner: Mutex<Inner>,
    on_submit: Mutex<Option<SubmitHook>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                installed: true,
                ready: false,
                fail_restart: false,
                restart_limit: None,
                restarts: 0,
                submissions: Vec::new(),
                scores: HashMap::new(),
                die_on: HashSet::new(),
                silent_depth: false,
                depth_delay: Duration::ZERO,
                timed_delay: None,
                flush_on_stop: false,
                pending: None,
            }),
            on_submit: Mutex::new(None),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        f(&mut self.inner.lock().unwrap())
    }

    pub fn uninstalled(self) -> Self {
        self.with(|i| i.installed = false);
        self
    }

    pub fn failing_restarts(self) -> Self {
        self.with(|i| i.fail_restart = true);
        self
    }

    pub fn failing_restarts_after(self, successes: usize) -> Self {
        self.with(|i| i.restart_limit = Some(successes));
        self
    }

    pub fn dying_on(self, submissions: &[usize]) -> Self {
        self.with(|i| i.die_on.extend(submissions));
        self
    }

    pub fn silent_depth(self) -> Self {
        self.with(|i| i.silent_depth = true);
        self
    }

    pub fn depth_delay(self, delay: Duration) -> Self {
        self.with(|i| i.depth_delay = delay);
        self
    }

    pub fn overrunning_timed(self, delay: Duration) -> Self {
        self.with(|i| i.timed_delay = Some(delay));
        self
    }

    pub fn flushing_on_stop(self) -> Self {
        self.with(|i| i.flush_on_stop = true);
        self
    }

    pub fn score(self, fen: &str, cp: i32) -> Self {
        self.with(|i| i.scores.insert(fen.to_string(), cp));
        self
    }

    pub fn on_submit(self, hook: impl Fn(usize, &str) + Send + Sync + 'static) -> Self {
        *self.on_submit.lock().unwrap() = Some(Box::new(hook));
        self
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.with(|i| i.submissions.clone())
    }

    pub fn submitted(&self, kind: SearchKind) -> Vec<String> {
        self.submissions()
            .into_iter()
            .filter(|s| s.kind == kind)
            .map(|s| s.fen)
            .collect()
    }

    pub fn restarts(&self) -> usize {
        self.with(|i| i.restarts)
    }

    fn submit(&self, fen: &str, kind: SearchKind, budget: Duration) -> Result<(), EngineError> {
        let number = self.with(|i| {
            if !i.ready {
                return Err(EngineError::NotRunning);
            }
            let number = i.submissions.len();
            i.submissions.push(Submission {
                fen: fen.to_string(),
                kind,
            });

            if i.die_on.contains(&number) {
                i.ready = false;
                i.pending = None;
                return Ok(number);
            }

            let cp = i.scores.get(fen).copied().unwrap_or(0);
            let silent = kind == SearchKind::Depth && i.silent_depth;
            let delay = match kind {
                SearchKind::Depth => i.depth_delay,
                SearchKind::Timed => i.timed_delay.unwrap_or(budget),
            };
            i.pending = Some(Pending {
                output: (!silent).then(|| output(cp)),
                ready_at: Instant::now() + delay,
            });
            Ok(number)
        })?;

        if let Some(hook) = self.on_submit.lock().unwrap().as_ref() {
            hook(number, fen);
        }
        Ok(())
    }
}

pub fn output(cp: i32) -> EngineOutput {
    EngineOutput {
        lines: vec![PvLine {
            multipv: 1,
            pv: vec!["a2a3".to_string()],
            cp: Some(cp),
            depth: 12,
            ..Default::default()
        }],
    }
}

#[async_trait]
impl EngineAdapter for FakeEngine {
    fn is_installed(&self) -> bool {
        self.with(|i| i.installed)
    }

    fn is_ready(&self) -> bool {
        self.with(|i| i.ready)
    }

    fn mark_not_ready(&self) {
        self.with(|i| i.ready = false);
    }

    async fn configure(&self, _options: EngineOptions) -> Result<(), EngineError> {
        Ok(())
    }

    async fn new_game(&self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn stop(&self) {
        self.with(|i| {
            let flush = i.flush_on_stop;
            if let Some(pending) = i.pending.as_mut() {
                let now = Instant::now();
                if now < pending.ready_at {
                    if flush {
                        pending.ready_at = now;
                    } else {
                        pending.output = None;
                    }
                }
            }
        });
    }

    async fn restart(&self) -> bool {
        self.with(|i| {
            i.pending = None;
            let exhausted = i.restart_limit.is_some_and(|limit| i.restarts >= limit);
            if i.fail_restart || exhausted {
                i.ready = false;
                return false;
            }
            i.ready = true;
            i.restarts += 1;
            true
        })
    }

    async fn analyze_for_time(&self, fen: &str, budget: Duration) -> Result<(), EngineError> {
        self.submit(fen, SearchKind::Timed, budget)
    }

    async fn analyze_to_depth(&self, fen: &str, _depth: u32) -> Result<(), EngineError> {
        self.submit(fen, SearchKind::Depth, Duration::ZERO)
    }

    async fn wait_for_completion(&self, timeout: Duration) -> bool {
        let (ready, ready_at) = self.with(|i| {
            let at = i.pending.as_ref().filter(|p| p.output.is_some()).map(|p| p.ready_at);
            (i.ready, at)
        });
        if !ready {
            return false;
        }

        match ready_at {
            Some(at) if at <= Instant::now() + timeout => {
                tokio::time::sleep_until(at).await;
                self.is_ready()
            }
            _ => {
                tokio::time::sleep(timeout).await;
                false
            }
        }
    }

    fn latest_result(&self) -> Option<EngineOutput> {
        self.with(|i| {
            i.pending
                .as_ref()
                .filter(|p| p.ready_at <= Instant::now())
                .and_then(|p| p.output.clone())
        })
    }
}

/// Keeps every record handed to persistence
#[derive(Default)]
pub struct RecordingRecorder {
    pub records: Mutex<Vec<CompletedGame>>,
}

impl RecordingRecorder {
    pub fn records(&self) -> Vec<CompletedGame> {
        self.records.lock().unwrap().clone()
    }
}

impl GameRecorder for RecordingRecorder {
    fn save_completed_game(&self, record: CompletedGame) {
        self.records.lock().unwrap().push(record);
    }
}

#[derive(Default)]
pub struct CountingFetcher {
    pub calls: AtomicUsize,
}

impl CountingFetcher {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SupplementaryFetcher for CountingFetcher {
    fn fetch_supplementary_data(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Knights out and back, ten times over: 40 plies with distinct FENs.
pub fn knight_shuffle() -> GameHistory {
    let cycle = ["g1f3", "g8f6", "f3g1", "f6g8"];
    let moves: Vec<&str> = cycle.iter().copied().cycle().take(40).collect();
    GameHistory::from_uci_moves(moves.as_slice()).unwrap()
}

pub fn short_game() -> GameHistory {
    GameHistory::from_uci_moves(&["e2e4", "e7e5", "g1f3", "b8c6", "f1c4", "g8f6"]).unwrap()
}

pub struct Harness {
    pub analyzer: Analyzer,
    pub engine: Arc<FakeEngine>,
    pub history: Arc<GameHistory>,
    pub recorder: Arc<RecordingRecorder>,
    pub fetcher: Arc<CountingFetcher>,
}

pub fn harness(engine: FakeEngine, history: Arc<GameHistory>) -> Harness {
    let engine = Arc::new(engine);
    let recorder = Arc::new(RecordingRecorder::default());
    let fetcher = Arc::new(CountingFetcher::default());
    let analyzer = Analyzer::new(
        engine.clone(),
        history.clone(),
        recorder.clone(),
        fetcher.clone(),
        AnalysisConfig::default(),
    );
    Harness {
        analyzer,
        engine,
        history,
        recorder,
        fetcher,
    }
}
