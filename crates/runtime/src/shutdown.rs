use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

/// Tracks in-flight memory write-backs so a shutdown handler can wait for
/// them to drain instead of cutting them off mid-write. Step 9 of the
/// turn orchestrator registers a guard for the duration of its write-back
/// task; the guard's `Drop` notifies when the count reaches zero.
#[derive(Clone)]
pub struct DrainTracker {
    inner: Arc<Inner>,
}

struct Inner {
    count: AtomicUsize,
    notify: Notify,
}

impl Default for DrainTracker {
    fn default() -> Self {
        Self { inner: Arc::new(Inner { count: AtomicUsize::new(0), notify: Notify::new() }) }
    }
}

impl DrainTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guard(&self) -> DrainGuard {
        self.inner.count.fetch_add(1, Ordering::SeqCst);
        DrainGuard { inner: self.inner.clone() }
    }

    /// Waits for all in-flight write-backs to finish, up to `timeout`.
    /// Returns `true` if the drain completed cleanly.
    pub async fn wait(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.inner.count.load(Ordering::SeqCst) == 0 {
                return true;
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return false;
            }
            tokio::select! {
                _ = self.inner.notify.notified() => {}
                _ = tokio::time::sleep(remaining) => {}
            }
        }
    }
}

pub struct DrainGuard {
    inner: Arc<Inner>,
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        if self.inner.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.notify.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_returns_immediately_with_no_in_flight_work() {
        let tracker = DrainTracker::new();
        assert!(tracker.wait(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn wait_completes_once_guard_drops() {
        let tracker = DrainTracker::new();
        let guard = tracker.guard();
        let tracker2 = tracker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            drop(guard);
        });
        assert!(tracker2.wait(Duration::from_millis(500)).await);
    }

    #[tokio::test]
    async fn wait_times_out_if_work_never_finishes() {
        let tracker = DrainTracker::new();
        let _guard = tracker.guard();
        assert!(!tracker.wait(Duration::from_millis(20)).await);
    }
}
