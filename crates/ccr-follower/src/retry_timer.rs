//! Fire-once, cancellable scheduled callback.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

/// A callback scheduled to run once after a delay.
#[derive(Debug)]
pub struct RetryTimer {
    deadline: Instant,
    handle: JoinHandle<()>,
}

impl RetryTimer {
    /// Schedule `callback` to run after `delay` on the current runtime.
    pub fn schedule<F>(delay: Duration, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let deadline = Instant::now() + delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            callback();
        });
        Self { deadline, handle }
    }

    /// Time left before the callback fires; zero once due.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Returns true while the callback is still waiting to fire.
    pub fn is_pending(&self) -> bool {
        !self.remaining().is_zero() && !self.handle.is_finished()
    }

    /// Cancel the callback if it has not fired yet.
    pub fn cancel(&self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        let timer = RetryTimer::schedule(Duration::from_secs(60), move || {
            f.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timer.is_pending());
        assert_eq!(timer.remaining(), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(timer.is_pending());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_pending());
        assert_eq!(timer.remaining(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_callback() {
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        let timer = RetryTimer::schedule(Duration::from_secs(5), move || {
            f.fetch_add(1, Ordering::SeqCst);
        });
        timer.cancel();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!timer.is_pending());
    }
}
