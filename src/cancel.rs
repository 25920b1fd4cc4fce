use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Caller-owned cancellation signal shared with a running `process_turn`.
///
/// Cloning shares the same flag. `cancel()` wakes any pending model call or
/// retry backoff immediately; renderers poll [`CancelFlag::is_cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Completes once `cancel()` has been called.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel() can't slip between.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancel_wakes_waiter() {
        let flag = CancelFlag::new();
        let waiter = flag.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        flag.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(flag.is_cancelled());
    }

    #[tokio::test]
    async fn already_cancelled_returns_immediately() {
        let flag = CancelFlag::new();
        flag.cancel();
        tokio::time::timeout(Duration::from_millis(50), flag.cancelled())
            .await
            .expect("should not wait");
    }
}
