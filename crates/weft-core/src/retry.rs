//! Bounded exponential backoff and cooperative cancellation.
//!
//! Both retry loops of a run (connecting to the graph store and flushing
//! deferred relationships) sleep through [`CancelToken::sleep`], so a
//! cancelled run stops waiting at the next backoff point.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Exponential backoff: `base_delay` before the first retry, doubling after
/// every further failure, for at most `max_attempts` tries in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    /// Delay to wait after `failures` consecutive failures (1-based).
    pub fn delay_after(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(20);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

/// Requests cancellation of a run.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        // send_replace never fails, even with no live receivers.
        self.tx.send_replace(true);
    }
}

/// Observes cancellation. Cheap to clone into every worker.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
    // Keeps the channel open for tokens that can never be cancelled.
    _anchor: Option<Arc<watch::Sender<bool>>>,
}

impl CancelToken {
    /// A connected handle/token pair.
    pub fn pair() -> (CancelHandle, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelToken { rx, _anchor: None })
    }

    /// A token that is never cancelled.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _anchor: Some(Arc::new(tx)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Sleep for `delay`. Returns `false` as soon as cancellation is
    /// requested, `true` once the full delay has elapsed.
    pub async fn sleep(&self, delay: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        let deadline = now
            .checked_add(delay)
            .unwrap_or_else(|| now + Duration::from_secs(365 * 24 * 3600));
        let mut rx = self.rx.clone();

        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => true,
            cancelled = async { rx.wait_for(|cancelled| *cancelled).await.is_ok() } => {
                if cancelled {
                    false
                } else {
                    // Handle dropped without cancelling: nothing can cancel us now.
                    tokio::time::sleep_until(deadline).await;
                    true
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::new(Duration::from_secs(5), 4);
        assert_eq!(policy.delay_after(1), Duration::from_secs(5));
        assert_eq!(policy.delay_after(2), Duration::from_secs(10));
        assert_eq!(policy.delay_after(3), Duration::from_secs(20));
    }

    #[test]
    fn test_delay_saturates() {
        let policy = RetryPolicy::new(Duration::from_secs(u64::MAX / 2), 100);
        assert_eq!(policy.delay_after(90), Duration::MAX);
    }

    #[tokio::test]
    async fn test_cancelled_sleep_returns_early() {
        let (handle, token) = CancelToken::pair();
        handle.cancel();
        assert!(token.is_cancelled());
        assert!(!token.sleep(Duration::from_secs(3600)).await);
    }

    #[tokio::test]
    async fn test_never_token_sleeps_fully() {
        let token = CancelToken::never();
        assert!(token.sleep(Duration::from_millis(5)).await);
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_during_sleep() {
        let (handle, token) = CancelToken::pair();
        let sleeper = tokio::spawn(async move { token.sleep(Duration::from_secs(60)).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();
        assert!(!sleeper.await.unwrap());
    }
}
