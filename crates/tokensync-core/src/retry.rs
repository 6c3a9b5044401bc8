//! Fixed-delay retry loops for transient I/O errors.
//!
//! Node and store calls on the block path are retried until they succeed.
//! Every loop observes a `CancellationToken` so shutdown is never blocked by
//! an unreachable node.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::SyncError;

/// Default delay between attempts.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(200);

/// A constant delay between attempts.
#[derive(Debug, Clone, Copy)]
pub struct FixedBackoff {
    delay: Duration,
}

impl FixedBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Sleep for one backoff period, returning early with
    /// [`SyncError::Cancelled`] if the token fires.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), SyncError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(SyncError::Cancelled),
            _ = tokio::time::sleep(self.delay) => Ok(()),
        }
    }
}

impl Default for FixedBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF)
    }
}

/// Run `op` until it returns `Ok`, sleeping `backoff` between failures.
///
/// Returns [`SyncError::Cancelled`] once `cancel` fires; no other error
/// escapes the loop.
pub async fn retry_until_ok<T, E, F, Fut>(
    backoff: &FixedBackoff,
    cancel: &CancellationToken,
    what: &str,
    mut op: F,
) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        attempt += 1;
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(attempt, op = what, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => {
                tracing::warn!(
                    attempt,
                    delay_ms = backoff.delay().as_millis() as u64,
                    error = %e,
                    op = what,
                    "retrying"
                );
                backoff.wait(cancel).await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let backoff = FixedBackoff::new(Duration::from_millis(1));
        let out = retry_until_ok(&backoff, &CancellationToken::new(), "test", || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 4 {
                Err(format!("attempt {n} failed"))
            } else {
                Ok(n)
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 4);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn cancellation_interrupts_backoff() {
        let cancel = CancellationToken::new();
        let backoff = FixedBackoff::new(Duration::from_secs(3600));
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let res: Result<(), SyncError> =
            retry_until_ok(&backoff, &cancel, "never", || async { Err::<(), _>("down") }).await;
        assert!(res.unwrap_err().is_cancelled());
    }

    #[test]
    fn default_backoff_is_200ms() {
        assert_eq!(FixedBackoff::default().delay(), Duration::from_millis(200));
    }
}
