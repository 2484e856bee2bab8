//! Two-phase task shutdown: signal, wait a bounded time, then abort.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How often a stopping task's liveness is checked.
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// There was no task to stop.
    NotRunning,
    /// The task observed the stop signal and returned.
    Exited,
    /// The task outlived its grace period and was aborted.
    Aborted,
}

/// Cancel `stop`, then poll `task` every [`STOP_POLL_INTERVAL`] until it
/// finishes or `grace` elapses.  A task still running after `grace` is
/// aborted.
pub async fn stop_task(
    name: &str,
    task: Option<JoinHandle<()>>,
    stop: &CancellationToken,
    grace: Duration,
) -> StopOutcome {
    let Some(task) = task else {
        return StopOutcome::NotRunning;
    };

    stop.cancel();
    let deadline = Instant::now() + grace;
    loop {
        if task.is_finished() {
            tracing::debug!(task = name, "task exited");
            return StopOutcome::Exited;
        }
        if Instant::now() >= deadline {
            task.abort();
            tracing::warn!(
                task = name,
                grace_ms = grace.as_millis() as u64,
                "task did not exit in time, aborting"
            );
            return StopOutcome::Aborted;
        }
        tokio::time::sleep(STOP_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_task_is_not_running() {
        let stop = CancellationToken::new();
        let outcome = stop_task("none", None, &stop, Duration::from_millis(50)).await;
        assert_eq!(outcome, StopOutcome::NotRunning);
        assert!(!stop.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn cooperative_task_exits() {
        let stop = CancellationToken::new();
        let token = stop.clone();
        let task = tokio::spawn(async move { token.cancelled().await });

        let started = Instant::now();
        let outcome = stop_task("worker", Some(task), &stop, Duration::from_secs(2)).await;
        assert_eq!(outcome, StopOutcome::Exited);
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_task_is_aborted_after_grace() {
        let stop = CancellationToken::new();
        let task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        let started = Instant::now();
        let outcome = stop_task("stuck", Some(task), &stop, Duration::from_millis(2000)).await;
        let elapsed = started.elapsed();

        assert_eq!(outcome, StopOutcome::Aborted);
        assert!(elapsed >= Duration::from_millis(2000));
        assert!(elapsed < Duration::from_millis(2100));
    }
}
