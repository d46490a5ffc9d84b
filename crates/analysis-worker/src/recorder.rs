//! Completed-game persistence

use std::path::PathBuf;

use analysis_pipeline::{CompletedGame, GameRecorder};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::WorkerError;

/// Appends each completed game as one JSON line.
///
/// Saving only queues the record; a writer task owns the file. The writer
/// finishes once every recorder clone is dropped.
#[derive(Clone)]
pub struct JsonLinesRecorder {
    tx: mpsc::UnboundedSender<CompletedGame>,
}

impl JsonLinesRecorder {
    pub fn spawn(path: PathBuf) -> (Self, JoinHandle<Result<u64, WorkerError>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_records(path, rx));
        (Self { tx }, writer)
    }
}

impl GameRecorder for JsonLinesRecorder {
    fn save_completed_game(&self, record: CompletedGame) {
        if self.tx.send(record).is_err() {
            error!("Game record writer has stopped, record dropped");
        }
    }
}

async fn write_records(
    path: PathBuf,
    mut rx: mpsc::UnboundedReceiver<CompletedGame>,
) -> Result<u64, WorkerError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;

    let mut written = 0u64;
    while let Some(record) = rx.recv().await {
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        file.write_all(&line).await?;
        file.flush().await?;
        written += 1;
        info!(path = %path.display(), move_count = record.move_count, "Game record saved");
    }
    Ok(written)
}

/// Recorder used when no record file is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRecorder;

impl GameRecorder for LogRecorder {
    fn save_completed_game(&self, record: CompletedGame) {
        info!(
            move_count = record.move_count,
            biggest_swing = record.biggest_swing,
            white_blunders = record.counts.white.blunder,
            black_blunders = record.counts.black.blunder,
            "Game analysis completed"
        );
    }
}
