//! Cancellable background tasks and cooperative suspension points

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::PipelineError;

/// A spawned task paired with the token that asks it to stop.
pub(crate) struct TaskHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl TaskHandle {
    pub(crate) fn spawn<F, Fut>(f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(f(cancel.clone()));
        Self { cancel, handle }
    }

    /// Request cancellation and wait for the task to reach a suspension point
    /// and exit.
    pub(crate) async fn cancel_and_wait(self) {
        self.cancel.cancel();
        self.join().await;
    }

    pub(crate) async fn join(self) {
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                warn!(error = %e, "Analysis task panicked");
            }
        }
    }
}

/// Loop-top suspension point: yield, then honour a pending cancellation.
pub(crate) async fn checkpoint(cancel: &CancellationToken) -> Result<(), PipelineError> {
    tokio::task::yield_now().await;
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    Ok(())
}

pub(crate) async fn pause(cancel: &CancellationToken, duration: Duration) -> Result<(), PipelineError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Run `fut` unless cancellation arrives first.
pub(crate) async fn guarded<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, PipelineError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        out = fut => Ok(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_checkpoint_reports_cancellation() {
        let cancel = CancellationToken::new();
        assert!(checkpoint(&cancel).await.is_ok());
        cancel.cancel();
        assert_eq!(checkpoint(&cancel).await, Err(PipelineError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_is_interrupted_by_cancel() {
        let cancel = CancellationToken::new();
        let child = cancel.clone();
        let sleeper = tokio::spawn(async move { pause(&child, Duration::from_secs(3600)).await });
        cancel.cancel();
        assert_eq!(sleeper.await.unwrap(), Err(PipelineError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_and_wait_stops_task() {
        let task = TaskHandle::spawn(|cancel| async move {
            let _ = pause(&cancel, Duration::from_secs(3600)).await;
        });
        task.cancel_and_wait().await;
    }
}
