//! A single reusable waitable flag (the "baton" pattern used throughout
//! §4.E/§4.F/§4.K): `responseBaton`, `startDone`, and the per-request
//! completion signal are all instances of this one primitive rather than
//! three bespoke ones.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

pub struct SingleShotBaton {
    notify: Notify,
    posted: AtomicBool,
}

impl Default for SingleShotBaton {
    fn default() -> Self {
        Self::new()
    }
}

impl SingleShotBaton {
    #[must_use]
    pub fn new() -> Self {
        Self {
            notify: Notify::new(),
            posted: AtomicBool::new(false),
        }
    }

    /// Clears the posted flag so the baton can be waited on again.
    pub fn reset(&self) {
        self.posted.store(false, Ordering::SeqCst);
    }

    /// Posts the baton, waking any current or future waiter exactly once.
    pub fn post(&self) {
        self.posted.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Waits indefinitely for the baton to be posted.
    pub async fn wait(&self) {
        if self.posted.load(Ordering::SeqCst) {
            return;
        }
        self.notify.notified().await;
    }

    /// Waits up to `timeout` for the baton to be posted. Returns `true` if
    /// posted before the deadline.
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.posted.load(Ordering::SeqCst) {
            return true;
        }
        tokio::time::timeout(timeout, self.notify.notified())
            .await
            .is_ok()
            || self.posted.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn post_before_wait_does_not_deadlock() {
        let baton = SingleShotBaton::new();
        baton.post();
        baton.wait().await; // must return immediately
    }

    #[tokio::test]
    async fn wait_timeout_reports_false_on_expiry() {
        let baton = SingleShotBaton::new();
        let posted = baton.wait_timeout(Duration::from_millis(20)).await;
        assert!(!posted);
    }

    #[tokio::test]
    async fn reset_allows_reuse() {
        let baton = SingleShotBaton::new();
        baton.post();
        baton.wait().await;
        baton.reset();
        assert!(!baton.wait_timeout(Duration::from_millis(10)).await);
        baton.post();
        assert!(baton.wait_timeout(Duration::from_millis(10)).await);
    }
}
