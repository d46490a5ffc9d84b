//! Stockfish engine adapter using UCI protocol (async I/O)
//!
//! A background reader task parses engine output into the latest PV lines and
//! tracks whether a search is running, so the pipeline can submit a position
//! and poll for results without owning the process I/O.

use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use analysis_pipeline::{EngineAdapter, EngineError, EngineOptions, EngineOutput, PvLine};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const SYNC_TIMEOUT: Duration = Duration::from_secs(5);
const STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// State written by the reader task
struct Shared {
    ready: AtomicBool,
    lines: Mutex<Vec<PvLine>>,
    searching: watch::Sender<bool>,
    /// Bumped on every `readyok`
    readyok: watch::Sender<u64>,
}

impl Shared {
    fn set_lines(&self, lines: Vec<PvLine>) {
        *self.lines.lock().unwrap_or_else(|e| e.into_inner()) = lines;
    }

    fn record_line(&self, line: PvLine) {
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        let slot = line.multipv.max(1) as usize - 1;
        if lines.len() <= slot {
            lines.resize(slot + 1, PvLine::default());
        }
        lines[slot] = line;
    }
}

struct Process {
    child: Child,
    stdin: ChildStdin,
    reader: JoinHandle<()>,
}

impl Process {
    fn kill(mut self) {
        self.reader.abort();
        let _ = self.child.start_kill();
    }
}

/// Stockfish process supervised as an [`EngineAdapter`]
pub struct StockfishEngine {
    path: String,
    process: tokio::sync::Mutex<Option<Process>>,
    shared: Arc<Shared>,
}

impl StockfishEngine {
    /// Create the adapter. The process is launched by the first `restart`.
    pub fn new(path: impl Into<String>) -> Self {
        let (searching, _) = watch::channel(false);
        let (readyok, _) = watch::channel(0);
        Self {
            path: path.into(),
            process: tokio::sync::Mutex::new(None),
            shared: Arc::new(Shared {
                ready: AtomicBool::new(false),
                lines: Mutex::new(Vec::new()),
                searching,
                readyok,
            }),
        }
    }

    /// Spawn a Stockfish process, perform the UCI handshake and hand stdout
    /// to the reader task.
    async fn spawn(&self) -> Result<Process, EngineError> {
        let mut child = Command::new(&self.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Spawn(format!("Failed to spawn Stockfish: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Spawn("Stockfish stdin unavailable".into()))?;
        let mut stdout = BufReader::new(
            child
                .stdout
                .take()
                .ok_or_else(|| EngineError::Spawn("Stockfish stdout unavailable".into()))?,
        );

        write_line(&mut stdin, "uci").await?;
        tokio::time::timeout(HANDSHAKE_TIMEOUT, wait_for(&mut stdout, "uciok"))
            .await
            .map_err(|_| EngineError::Protocol("Timed out waiting for uciok".into()))??;
        write_line(&mut stdin, "setoption name UCI_AnalyseMode value true").await?;

        let reader = tokio::spawn(read_output(stdout, self.shared.clone()));
        Ok(Process {
            child,
            stdin,
            reader,
        })
    }

    /// Send a command to Stockfish
    async fn send(&self, cmd: &str) -> Result<(), EngineError> {
        let mut guard = self.process.lock().await;
        let process = guard.as_mut().ok_or(EngineError::NotRunning)?;
        if let Err(e) = write_line(&mut process.stdin, cmd).await {
            self.mark_not_ready();
            return Err(e);
        }
        Ok(())
    }

    /// `isready` round-trip, so options are applied before the next command
    async fn sync(&self) -> Result<(), EngineError> {
        let mut rx = self.shared.readyok.subscribe();
        rx.borrow_and_update();
        self.send("isready").await?;
        match tokio::time::timeout(SYNC_TIMEOUT, rx.changed()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(EngineError::NotRunning),
            Err(_) => {
                self.mark_not_ready();
                Err(EngineError::Protocol("Timed out waiting for readyok".into()))
            }
        }
    }

    /// Start a search, first settling any search still in flight so its
    /// `bestmove` is not mistaken for this one's.
    async fn go(&self, fen: &str, limit: &str) -> Result<(), EngineError> {
        if *self.shared.searching.borrow() {
            self.stop().await;
        }
        self.shared.set_lines(Vec::new());
        self.send(&format!("position fen {fen}")).await?;
        self.shared.searching.send_replace(true);
        if let Err(e) = self.send(&format!("go {limit}")).await {
            self.shared.searching.send_replace(false);
            return Err(e);
        }
        Ok(())
    }
}

#[async_trait]
impl EngineAdapter for StockfishEngine {
    fn is_installed(&self) -> bool {
        let path = Path::new(&self.path);
        if path.components().count() > 1 {
            return path.is_file();
        }
        std::env::var_os("PATH")
            .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(path).is_file()))
            .unwrap_or(false)
    }

    fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::SeqCst)
    }

    fn mark_not_ready(&self) {
        self.shared.ready.store(false, Ordering::SeqCst);
    }

    async fn configure(&self, options: EngineOptions) -> Result<(), EngineError> {
        self.send(&format!("setoption name Threads value {}", options.threads))
            .await?;
        self.send(&format!("setoption name Hash value {}", options.hash_mb))
            .await?;
        self.send(&format!("setoption name MultiPV value {}", options.multi_pv.max(1)))
            .await?;
        self.send(&format!("setoption name Use NNUE value {}", options.use_nnue))
            .await?;
        self.sync().await
    }

    async fn new_game(&self) -> Result<(), EngineError> {
        self.send("ucinewgame").await?;
        self.sync().await
    }

    async fn stop(&self) {
        if !*self.shared.searching.borrow() {
            return;
        }
        if self.send("stop").await.is_err() {
            self.shared.searching.send_replace(false);
            return;
        }
        let mut rx = self.shared.searching.subscribe();
        let stopped = rx.wait_for(|searching| !*searching);
        let acknowledged = tokio::time::timeout(STOP_TIMEOUT, stopped).await.is_ok();
        if !acknowledged {
            warn!("Stockfish did not acknowledge stop");
            self.shared.searching.send_replace(false);
        }
    }

    async fn restart(&self) -> bool {
        let mut guard = self.process.lock().await;
        if let Some(old) = guard.take() {
            old.kill();
        }
        self.shared.searching.send_replace(false);
        self.shared.set_lines(Vec::new());

        match self.spawn().await {
            Ok(process) => {
                *guard = Some(process);
                self.shared.ready.store(true, Ordering::SeqCst);
                info!(path = %self.path, "Stockfish started");
                true
            }
            Err(e) => {
                self.mark_not_ready();
                warn!(path = %self.path, error = %e, "Stockfish failed to start");
                false
            }
        }
    }

    async fn analyze_for_time(&self, fen: &str, budget: Duration) -> Result<(), EngineError> {
        self.go(fen, &format!("movetime {}", budget.as_millis().max(1)))
            .await
    }

    async fn analyze_to_depth(&self, fen: &str, depth: u32) -> Result<(), EngineError> {
        self.go(fen, &format!("depth {depth}")).await
    }

    async fn wait_for_completion(&self, timeout: Duration) -> bool {
        let mut rx = self.shared.searching.subscribe();
        let done = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|searching| !*searching)).await,
            Ok(Ok(_))
        );
        done && self.is_ready()
    }

    fn latest_result(&self) -> Option<EngineOutput> {
        let lines = self.shared.lines.lock().unwrap_or_else(|e| e.into_inner());
        if lines.iter().all(|line| line.pv.is_empty()) {
            return None;
        }
        Some(EngineOutput {
            lines: lines.clone(),
        })
    }
}

impl Drop for StockfishEngine {
    fn drop(&mut self) {
        // Best-effort synchronous kill in drop
        if let Some(process) = self.process.get_mut().take() {
            process.kill();
        }
    }
}

async fn write_line(stdin: &mut ChildStdin, cmd: &str) -> Result<(), EngineError> {
    debug!(cmd, "SF <");
    stdin
        .write_all(format!("{cmd}\n").as_bytes())
        .await
        .map_err(|e| EngineError::Io(format!("Failed to write to Stockfish: {e}")))?;
    stdin
        .flush()
        .await
        .map_err(|e| EngineError::Io(format!("Failed to flush stdin: {e}")))
}

/// Wait for a specific response line during the handshake
async fn wait_for(stdout: &mut BufReader<ChildStdout>, expected: &str) -> Result<(), EngineError> {
    let mut line = String::new();
    loop {
        line.clear();
        let read = stdout
            .read_line(&mut line)
            .await
            .map_err(|e| EngineError::Io(format!("Failed to read from Stockfish: {e}")))?;
        if read == 0 {
            return Err(EngineError::Protocol(format!("Stockfish exited before {expected}")));
        }
        let trimmed = line.trim();
        debug!(line = trimmed, "SF >");
        if trimmed == expected {
            return Ok(());
        }
    }
}

async fn read_output(mut stdout: BufReader<ChildStdout>, shared: Arc<Shared>) {
    let mut line = String::new();
    loop {
        line.clear();
        match stdout.read_line(&mut line).await {
            Ok(0) => {
                warn!("Stockfish closed its output");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Failed to read from Stockfish");
                break;
            }
        }

        let trimmed = line.trim();
        if trimmed.starts_with("info") && trimmed.contains(" pv ") {
            shared.record_line(parse_info_line(trimmed));
        } else if trimmed.starts_with("bestmove") {
            debug!(line = trimmed, "SF >");
            shared.searching.send_replace(false);
        } else if trimmed == "readyok" {
            shared.readyok.send_modify(|count| *count += 1);
        }
    }

    shared.ready.store(false, Ordering::SeqCst);
    shared.searching.send_replace(false);
}

/// Parse one `info ... pv ...` line
fn parse_info_line(line: &str) -> PvLine {
    let parts: Vec<&str> = line.split_whitespace().collect();
    PvLine {
        multipv: parse_field(&parts, "multipv").unwrap_or(1),
        pv: parse_pv(line),
        cp: parse_cp(line),
        mate: parse_mate(line),
        depth: parse_field(&parts, "depth").unwrap_or(0),
        nodes: parse_field(&parts, "nodes").unwrap_or(0),
        nps: parse_field(&parts, "nps").unwrap_or(0),
    }
}

/// Value following `key` in a whitespace-split info line
fn parse_field<T: std::str::FromStr>(parts: &[&str], key: &str) -> Option<T> {
    parts
        .iter()
        .position(|part| *part == key)
        .and_then(|i| parts.get(i + 1))
        .and_then(|value| value.parse().ok())
}

/// Parse centipawn score from info line
fn parse_cp(line: &str) -> Option<i32> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    parse_field(&parts, "cp")
}

/// Parse mate score from info line
fn parse_mate(line: &str) -> Option<i32> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    parse_field(&parts, "mate")
}

/// Parse PV moves from info line
fn parse_pv(line: &str) -> Vec<String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let mut in_pv = false;
    let mut moves = Vec::new();

    for part in parts {
        if part == "pv" {
            in_pv = true;
            continue;
        }
        if in_pv {
            // PV ends at next keyword or end of line
            if part.starts_with("bmc") || part == "string" {
                break;
            }
            moves.push(part.to_string());
        }
    }

    moves
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cp() {
        let line = "info depth 20 seldepth 25 multipv 1 score cp 35 nodes 100000 pv e2e4";
        assert_eq!(parse_cp(line), Some(35));
        assert_eq!(parse_mate(line), None);
    }

    #[test]
    fn test_parse_mate() {
        let line = "info depth 20 score mate -3 nodes 100000 pv e2e4";
        assert_eq!(parse_mate(line), Some(-3));
    }

    #[test]
    fn test_parse_pv() {
        let line = "info depth 20 score cp 35 pv e2e4 e7e5 g1f3";
        let pv = parse_pv(line);
        assert_eq!(pv, vec!["e2e4", "e7e5", "g1f3"]);
    }

    #[test]
    fn test_parse_info_line() {
        let line = "info depth 18 seldepth 24 multipv 2 score cp -12 nodes 812345 nps 1450000 hashfull 120 tbhits 0 time 560 pv d7d5 e4d5 d8d5";
        let parsed = parse_info_line(line);
        assert_eq!(parsed.multipv, 2);
        assert_eq!(parsed.depth, 18);
        assert_eq!(parsed.nodes, 812_345);
        assert_eq!(parsed.nps, 1_450_000);
        assert_eq!(parsed.cp, Some(-12));
        assert_eq!(parsed.pv, vec!["d7d5", "e4d5", "d8d5"]);
    }

    #[test]
    fn test_record_line_orders_by_rank() {
        let engine = StockfishEngine::new("stockfish");
        engine.shared.record_line(parse_info_line("info depth 5 multipv 2 score cp 10 pv a2a3"));
        engine.shared.record_line(parse_info_line("info depth 5 multipv 1 score cp 40 pv e2e4"));

        let output = engine.latest_result().unwrap();
        assert_eq!(output.lines.len(), 2);
        assert_eq!(output.principal().unwrap().pv, vec!["e2e4"]);
        assert_eq!(output.lines[1].cp, Some(10));
    }

    #[test]
    fn test_missing_binary_is_not_installed() {
        let engine = StockfishEngine::new("/definitely/not/here/stockfish");
        assert!(!engine.is_installed());
        assert!(!engine.is_ready());
    }

    #[tokio::test]
    async fn test_completion_waits_on_search_flag() {
        let engine = StockfishEngine::new("/definitely/not/here/stockfish");
        engine.shared.searching.send_replace(true);
        assert!(!engine.wait_for_completion(Duration::from_millis(20)).await);

        // No process to send "stop" to, so the flag is cleared directly
        engine.stop().await;
        assert!(!*engine.shared.searching.borrow());
        assert!(!engine.wait_for_completion(Duration::from_millis(20)).await);

        engine.shared.ready.store(true, Ordering::SeqCst);
        assert!(engine.wait_for_completion(Duration::from_millis(20)).await);
    }
}
