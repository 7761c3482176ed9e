use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::error::RetryError;

/// No pause between attempts
pub const NO_DELAY: Duration = Duration::ZERO;

/// Retry until success or cancellation
pub const UNLIMITED: usize = 0;

/// Re-runs a fallible async operation until it succeeds.
///
/// # Example
///
/// ```rust
/// use retention_core::{CancelToken, Retrier, UNLIMITED};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let retrier = Retrier::new(Duration::from_millis(10), UNLIMITED);
///     let token = CancelToken::with_timeout(Duration::from_secs(1));
///
///     let mut calls = 0;
///     let result = retrier
///         .run(&token, || {
///             calls += 1;
///             let attempt = calls;
///             async move { if attempt >= 3 { Ok(attempt) } else { Err("not yet") } }
///         })
///         .await;
///
///     assert_eq!(result.unwrap(), 3);
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Retrier {
    delay: Duration,
    max_attempts: usize,
}

impl Retrier {
    /// Creates a retrier pausing `delay` between attempts and giving up after
    /// `max_attempts` ([`UNLIMITED`] for no cap).
    pub fn new(delay: Duration, max_attempts: usize) -> Self {
        Self { delay, max_attempts }
    }

    /// Calls `op` until it returns `Ok`, the attempt cap is hit, or `cancel` fires.
    ///
    /// The token is checked before every attempt and observed while waiting
    /// between attempts; a running attempt is never interrupted.
    pub async fn run<F, Fut, T, E>(&self, cancel: &CancelToken, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempts = 0;

        loop {
            cancel.check()?;
            attempts += 1;

            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            tracing::debug!(attempts, error = %err, "attempt failed");

            if self.max_attempts != UNLIMITED && attempts >= self.max_attempts {
                return Err(RetryError::Exhausted { attempts, last: err });
            }

            if self.delay.is_zero() {
                tokio::task::yield_now().await;
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = cancel.cancelled() => {}
            }
        }
    }
}
