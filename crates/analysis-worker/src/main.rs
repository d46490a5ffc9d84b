//! Game review worker
//!
//! Replays a move list, runs the Preview and Analyse stages with native
//! Stockfish, then analyses the biggest-swing position in the Manual stage
//! and prints a per-move summary.

use std::sync::Arc;

use analysis_pipeline::{AnalysisState, Analyzer, EngineAdapter, GameRecorder, NoopFetcher};
use analysis_worker::config::{MoveFormat, WorkerConfig};
use analysis_worker::moves::{build_history, tokenize};
use analysis_worker::recorder::{JsonLinesRecorder, LogRecorder};
use analysis_worker::stockfish::StockfishEngine;
use chess_core::{BoardHistory, Side};
use tokio::io::AsyncReadExt;
use tracing::info;

/// Parse `--uci` / `--san` and the move list from CLI args
fn parse_args() -> (Option<MoveFormat>, Vec<String>) {
    let mut format = None;
    let mut rest = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--uci" => format = Some(MoveFormat::Uci),
            "--san" => format = Some(MoveFormat::San),
            _ => rest.push(arg),
        }
    }
    (format, rest)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    let config = WorkerConfig::load()?;
    let (cli_format, args) = parse_args();

    // Moves from argv, else stdin
    let input = if args.is_empty() {
        let mut buf = String::new();
        tokio::io::stdin().read_to_string(&mut buf).await?;
        buf
    } else {
        args.join(" ")
    };

    let moves = tokenize(&input);
    let history = Arc::new(build_history(&moves, cli_format.or(config.move_format))?);
    info!(
        stockfish_path = %config.stockfish_path,
        move_count = history.move_count(),
        "Worker config loaded"
    );

    let engine = Arc::new(StockfishEngine::new(config.stockfish_path.clone()));
    if !engine.is_installed() {
        anyhow::bail!("Stockfish not found at {}", config.stockfish_path);
    }

    let (recorder, writer) = match config.record_path.clone() {
        Some(path) => {
            let (recorder, writer) = JsonLinesRecorder::spawn(path);
            (Arc::new(recorder) as Arc<dyn GameRecorder>, Some(writer))
        }
        None => (Arc::new(LogRecorder) as Arc<dyn GameRecorder>, None),
    };

    let analyzer = Analyzer::new(
        engine,
        history.clone(),
        recorder,
        Arc::new(NoopFetcher),
        config.analysis.clone(),
    );

    analyzer.start_analysis().await;
    analyzer.join_pipeline().await;
    analyzer.join_manual_analysis().await;

    let state = analyzer.state();
    analyzer.shutdown().await;
    print_summary(&state, history.move_count());

    // Last recorder handle goes with the analyzer; the writer then drains
    drop(analyzer);
    if let Some(writer) = writer {
        let written = writer.await??;
        info!(written, "Game records flushed");
    }

    Ok(())
}

fn print_summary(state: &AnalysisState, move_count: usize) {
    let scores = state.merged_scores();

    println!("{}", "=".repeat(40));
    for index in 0..move_count {
        let number = index / 2 + 1;
        let label = match Side::of_move(index) {
            Side::White => format!("{number}."),
            Side::Black => format!("{number}..."),
        };
        let score = match scores.get(&index) {
            Some(s) => match s.mate_for_mover(index) {
                Some(plies) => format!("#{plies:+}"),
                None => format!("{:+.2}", s.for_mover(index)),
            },
            None => "-".to_string(),
        };
        let quality = state
            .qualities
            .get(&index)
            .map(|q| q.as_str())
            .unwrap_or("-");
        println!("{index:>4}  {label:<7} {score:>8}  {quality}");
    }
    println!("{}", "=".repeat(40));

    if let Some(index) = state.current_index {
        println!("Reviewing move {index}");
        for line in &state.manual_lines {
            println!(
                "  {}. {:+.2} (depth {}) {}",
                line.rank,
                line.score.score,
                line.score.depth,
                line.pv.join(" ")
            );
        }
    }
}
