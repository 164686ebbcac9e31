//! One-shot signal: released at most once, never re-armed.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

#[derive(Debug, Default)]
pub struct Latch {
    released: AtomicBool,
    notify: Notify,
}

impl Latch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Release every current and future waiter. Returns `false` if the latch
    /// had already been released.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.notify.notify_waiters();
        true
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Wait until released. Returns immediately if it already was.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a release in between is not lost.
            notified.as_mut().enable();
            if self.is_released() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_release_fires_once() {
        let latch = Latch::new();
        assert!(!latch.is_released());
        assert!(latch.release());
        assert!(!latch.release());
        assert!(latch.is_released());
    }

    #[tokio::test]
    async fn test_wait_after_release_returns() {
        let latch = Latch::new();
        latch.release();
        tokio::time::timeout(Duration::from_millis(100), latch.wait())
            .await
            .expect("released latch must not block");
    }

    #[tokio::test]
    async fn test_waiters_wake_on_release() {
        let latch = Arc::new(Latch::new());
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let latch = latch.clone();
                tokio::spawn(async move { latch.wait().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        latch.release();

        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .expect("waiter should wake")
                .unwrap();
        }
    }
}
