//! Cancellation tokens observed by blocked consumers.
//!
//! A [`CancelToken`] wraps a [`tokio_util::sync::CancellationToken`] and records
//! *why* it fired, so waiters can tell an explicit cancel from an expired deadline.
//! Child tokens fire with their parent and inherit its cause.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::PopError;

/// The reason a token fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    /// Explicit call to [`CancelToken::cancel`]
    Cancelled,
    /// The token's deadline passed
    TimedOut,
}

impl From<CancelCause> for PopError {
    fn from(cause: CancelCause) -> Self {
        match cause {
            CancelCause::Cancelled => PopError::Cancelled,
            CancelCause::TimedOut => PopError::TimedOut,
        }
    }
}

#[derive(Debug, Default)]
struct CauseCell {
    cause: OnceLock<CancelCause>,
    parent: Option<Arc<CauseCell>>,
}

impl CauseCell {
    fn resolve(&self) -> Option<CancelCause> {
        let mut cell = Some(self);
        while let Some(current) = cell {
            if let Some(cause) = current.cause.get() {
                return Some(*cause);
            }
            cell = current.parent.as_deref();
        }
        None
    }
}

/// Cloneable handle that can be triggered manually or by a deadline.
///
/// Clones share state: cancelling any clone cancels all of them.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    token: CancellationToken,
    cause: Arc<CauseCell>,
}

impl CancelToken {
    /// Creates a token that only fires on an explicit [`cancel`](Self::cancel).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token that fires with [`CancelCause::TimedOut`] at `deadline`.
    ///
    /// # Panics
    ///
    /// Panics if `deadline` is in the future and no Tokio runtime is available,
    /// since the deadline is watched by a spawned task. A deadline that has already
    /// passed fires synchronously and needs no runtime.
    ///
    /// The watcher task holds its own clone of the token and exits when the token
    /// fires, whichever way. Dropping every user handle does not stop it early: it
    /// lingers until the deadline, then fires a token nobody observes.
    pub fn with_deadline(deadline: Instant) -> Self {
        let token = Self::new();
        token.arm_deadline(deadline);
        token
    }

    /// Creates a token that fires with [`CancelCause::TimedOut`] after `timeout`.
    ///
    /// See [`with_deadline`](Self::with_deadline) for the runtime requirement.
    pub fn with_timeout(timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => Self::with_deadline(deadline),
            None => Self::new(),
        }
    }

    /// Creates a token that fires when this one fires, or when cancelled on its own.
    ///
    /// Cancelling the child never affects the parent.
    pub fn child_token(&self) -> Self {
        Self {
            token: self.token.child_token(),
            cause: Arc::new(CauseCell {
                cause: OnceLock::new(),
                parent: Some(Arc::clone(&self.cause)),
            }),
        }
    }

    /// Creates a child token that additionally times out at `deadline`.
    pub fn child_with_deadline(&self, deadline: Instant) -> Self {
        let child = self.child_token();
        child.arm_deadline(deadline);
        child
    }

    /// Fires the token with [`CancelCause::Cancelled`]. No-op if already fired.
    pub fn cancel(&self) {
        self.fire(CancelCause::Cancelled);
    }

    /// Returns `true` once the token (or any ancestor) has fired
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns why the token fired, or `None` while it is still live.
    pub fn cause(&self) -> Option<CancelCause> {
        if !self.token.is_cancelled() {
            return None;
        }
        // Every fire records a cause first, so the fallback is never taken in practice.
        Some(self.cause.resolve().unwrap_or(CancelCause::Cancelled))
    }

    /// Returns `Err` with the matching [`PopError`] if the token has fired.
    pub fn check(&self) -> Result<(), PopError> {
        match self.cause() {
            Some(cause) => Err(cause.into()),
            None => Ok(()),
        }
    }

    /// Completes when the token fires
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Runs `callback` exactly once with the cause when the token fires.
    ///
    /// The callback runs on a spawned task that keeps a clone of the token until it
    /// fires, so a token that never fires keeps that task parked for the life of the
    /// runtime. Abort the returned handle to unsubscribe. Requires a Tokio runtime.
    pub fn on_cancel<F>(&self, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(CancelCause) + Send + 'static,
    {
        let this = self.clone();
        tokio::spawn(async move {
            this.cancelled().await;
            callback(this.cause().unwrap_or(CancelCause::Cancelled));
        })
    }

    fn fire(&self, cause: CancelCause) {
        if self.token.is_cancelled() {
            return;
        }
        // Record the cause before waking anyone so waiters never observe a bare cancel.
        let _ = self.cause.cause.set(cause);
        self.token.cancel();
    }

    fn arm_deadline(&self, deadline: Instant) {
        if deadline <= Instant::now() {
            self.fire(CancelCause::TimedOut);
            return;
        }

        let this = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => this.fire(CancelCause::TimedOut),
                _ = this.token.cancelled() => {}
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_new_token_is_live() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert_eq!(token.cause(), None);
        assert!(token.check().is_ok());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancelToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.cause(), Some(CancelCause::Cancelled));
        assert_eq!(token.check(), Err(PopError::Cancelled));
    }

    #[test]
    fn test_past_deadline_fires_without_runtime() {
        let token = CancelToken::with_timeout(Duration::ZERO);
        assert!(token.is_cancelled());
        assert_eq!(token.cause(), Some(CancelCause::TimedOut));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fires_timed_out() {
        let token = CancelToken::with_timeout(Duration::from_millis(50));
        assert!(!token.is_cancelled());

        token.cancelled().await;
        assert_eq!(token.cause(), Some(CancelCause::TimedOut));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_deadline_wins() {
        let token = CancelToken::with_timeout(Duration::from_secs(10));
        token.cancel();

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(token.cause(), Some(CancelCause::Cancelled));
    }

    #[test]
    fn test_child_inherits_parent_cause() {
        let parent = CancelToken::new();
        let child = parent.child_token();
        let grandchild = child.child_token();

        parent.cancel();
        assert!(child.is_cancelled());
        assert_eq!(grandchild.cause(), Some(CancelCause::Cancelled));
    }

    #[test]
    fn test_child_cancel_leaves_parent_live() {
        let parent = CancelToken::new();
        let child = parent.child_token();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_deadline_reports_timeout() {
        let parent = CancelToken::new();
        let child = parent.child_with_deadline(Instant::now() + Duration::from_millis(20));

        child.cancelled().await;
        assert_eq!(child.cause(), Some(CancelCause::TimedOut));
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn test_on_cancel_runs_once() {
        let token = CancelToken::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let handle = token.on_cancel(move |cause| {
            assert_eq!(cause, CancelCause::Cancelled);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        token.cancel();
        token.cancel();
        handle.await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_aborted_on_cancel_never_runs() {
        let token = CancelToken::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let handle = token.on_cancel(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());

        token.cancel();
        tokio::task::yield_now().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
