//! Deferred cleanup and supervised background tasks for a single devnet run.
//!
//! Every resource the pipeline acquires (listeners, stores, log files, child
//! processes) is released through a [`Lifecycle`]. Cleanups run in reverse
//! registration order when [`Lifecycle::release`] is called, after all
//! background tasks have observed the shutdown signal.

use std::{
    future::Future,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use futures::future::BoxFuture;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::Instrument;

/// Upper bound on how long [`Lifecycle::release`] waits for background tasks.
const TASK_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

type CleanupFn = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

struct Cleanup {
    label: String,
    run: CleanupFn,
}

/// A cleanup that returned an error during release.
#[derive(Debug)]
pub struct CleanupFailure {
    pub label: String,
    pub error: anyhow::Error,
}

/// Outcome of [`Lifecycle::release`].
#[derive(Debug, Default)]
pub struct ReleaseReport {
    /// Labels of every cleanup that ran, in execution order.
    pub ran: Vec<String>,
    /// Cleanups that failed. Each is also listed in `ran`.
    pub failures: Vec<CleanupFailure>,
}

impl ReleaseReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Registry of deferred cleanups and background tasks.
pub struct Lifecycle {
    cleanups: Mutex<Vec<Cleanup>>,
    tasks: TaskTracker,
    shutdown: CancellationToken,
}

impl Lifecycle {
    /// Create a lifecycle whose shutdown signal also fires when `parent` is cancelled.
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            cleanups: Mutex::new(Vec::new()),
            tasks: TaskTracker::new(),
            shutdown: parent.child_token(),
        }
    }

    /// Token cancelled when the lifecycle starts releasing.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Register a synchronous cleanup.
    pub fn defer_err<F>(&self, label: impl Into<String>, cleanup: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.defer_err_async(label, move || async move { cleanup() });
    }

    /// Register a cleanup that needs to await.
    pub fn defer_err_async<F, Fut>(&self, label: impl Into<String>, cleanup: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let label = label.into();
        tracing::trace!(%label, "Registered cleanup");
        self.cleanups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Cleanup {
                label,
                run: Box::new(move || Box::pin(cleanup())),
            });
    }

    /// Launch a background task tracked by this lifecycle.
    ///
    /// Tasks are expected to watch [`Self::shutdown_token`] and return once it fires.
    pub fn go<F>(&self, name: &str, task: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let span = tracing::debug_span!("task", name = %name);
        let name = name.to_string();
        self.tasks.spawn(
            async move {
                if let Err(error) = task.await {
                    tracing::error!(task = %name, error = %format!("{error:#}"), "Background task failed");
                }
            }
            .instrument(span),
        );
    }

    /// Number of cleanups that have not run yet.
    pub fn pending_cleanups(&self) -> usize {
        self.cleanups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Stop background tasks, then run every registered cleanup once, newest first.
    ///
    /// Cleanup errors are logged and collected in the report, never returned.
    pub async fn release(&self) -> ReleaseReport {
        self.shutdown.cancel();
        self.tasks.close();

        if tokio::time::timeout(TASK_DRAIN_TIMEOUT, self.tasks.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = self.tasks.len(),
                "Background tasks still running, releasing resources anyway"
            );
        }

        let cleanups =
            std::mem::take(&mut *self.cleanups.lock().unwrap_or_else(PoisonError::into_inner));

        let mut report = ReleaseReport::default();
        for Cleanup { label, run } in cleanups.into_iter().rev() {
            match run().await {
                Ok(()) => tracing::debug!(%label, "Cleanup done"),
                Err(error) => {
                    tracing::warn!(%label, error = %format!("{error:#}"), "Cleanup failed");
                    report.failures.push(CleanupFailure {
                        label: label.clone(),
                        error,
                    });
                }
            }
            report.ran.push(label);
        }

        tracing::info!(
            cleanups = report.ran.len(),
            failures = report.failures.len(),
            "Lifecycle released"
        );
        report
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        let pending = self
            .cleanups
            .get_mut()
            .map(|c| c.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len());
        if pending > 0 {
            tracing::warn!(pending, "Lifecycle dropped without release");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    #[tokio::test]
    async fn test_release_runs_cleanups_in_reverse_order() {
        let lifecycle = Lifecycle::new(&CancellationToken::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let order = order.clone();
            lifecycle.defer_err(name, move || {
                order.lock().unwrap().push(name);
                Ok(())
            });
        }

        let report = lifecycle.release().await;

        assert!(report.is_clean());
        assert_eq!(report.ran, vec!["third", "second", "first"]);
        assert_eq!(*order.lock().unwrap(), vec!["third", "second", "first"]);
    }

    #[tokio::test]
    async fn test_failing_cleanup_does_not_stop_the_rest() {
        let lifecycle = Lifecycle::new(&CancellationToken::new());
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        lifecycle.defer_err("counted", move || {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        lifecycle.defer_err("broken", || Err(anyhow::anyhow!("disk on fire")));

        let report = lifecycle.release().await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].label, "broken");
        assert_eq!(report.ran.len(), 2);
    }

    #[tokio::test]
    async fn test_cleanups_run_exactly_once() {
        let lifecycle = Lifecycle::new(&CancellationToken::new());
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        lifecycle.defer_err_async("async", move || async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        lifecycle.release().await;
        let second = lifecycle.release().await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(second.ran.is_empty());
        assert_eq!(lifecycle.pending_cleanups(), 0);
    }

    #[tokio::test]
    async fn test_tasks_stop_before_cleanups_run() {
        let lifecycle = Lifecycle::new(&CancellationToken::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        lifecycle.defer_err("cleanup", move || {
            o.lock().unwrap().push("cleanup");
            Ok(())
        });

        let o = order.clone();
        let shutdown = lifecycle.shutdown_token();
        lifecycle.go("waiter", async move {
            shutdown.cancelled().await;
            o.lock().unwrap().push("task");
            Ok(())
        });

        lifecycle.release().await;

        assert_eq!(*order.lock().unwrap(), vec!["task", "cleanup"]);
    }

    #[tokio::test]
    async fn test_parent_cancellation_reaches_shutdown_token() {
        let parent = CancellationToken::new();
        let lifecycle = Lifecycle::new(&parent);

        parent.cancel();

        assert!(lifecycle.shutdown_token().is_cancelled());
        lifecycle.release().await;
    }
}
