use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Task scope tied to the lifetime of the hosting view.
///
/// Work launched here is dropped at its next suspension point once the scope
/// is destroyed.
#[derive(Debug, Clone, Default)]
pub struct LifecycleScope {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl LifecycleScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Yields `None` when the scope was destroyed before `fut` completed.
    pub fn launch<F>(&self, fut: F) -> JoinHandle<Option<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let token = self.token.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => None,
                out = fut => Some(out),
            }
        })
    }

    pub fn is_destroyed(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Cancels everything launched and waits for those tasks to unwind.
    pub async fn destroy(&self) {
        self.tracker.close();
        self.token.cancel();
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_launch_completes() {
        let scope = LifecycleScope::new();
        let out = scope.launch(async { 41 + 1 }).await.unwrap();
        assert_eq!(out, Some(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_drops_pending_work() {
        let scope = LifecycleScope::new();
        let ran = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&ran);
        let handle = scope.launch(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            flag.store(true, Ordering::SeqCst);
        });

        scope.destroy().await;

        assert_eq!(handle.await.unwrap(), None);
        assert!(!ran.load(Ordering::SeqCst));
        assert!(scope.is_destroyed());
        assert_eq!(scope.pending(), 0);
    }

    #[tokio::test]
    async fn test_launch_after_destroy_never_runs() {
        let scope = LifecycleScope::new();
        scope.destroy().await;

        let out = scope.launch(async { "late" }).await.unwrap();
        assert_eq!(out, None);
    }
}
