//! Error types returned by blocking operations.

use thiserror::Error;

/// Why a blocking [`pop`](crate::BlockingQueue::pop) gave up.
///
/// Both variants leave the queue untouched.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopError {
    /// The token was cancelled explicitly (directly or through a parent)
    #[error("pop cancelled")]
    Cancelled,

    /// The token's deadline passed before an item became available
    #[error("pop timed out")]
    TimedOut,
}

impl PopError {
    /// Returns `true` if the wait ended because of a deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PopError::TimedOut)
    }
}

/// Errors returned by [`Retrier::run`](crate::Retrier::run).
#[derive(Error, Debug)]
pub enum RetryError<E> {
    /// Every allowed attempt failed; carries the error of the last one
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        /// Number of attempts made
        attempts: usize,
        /// Error returned by the final attempt
        last: E,
    },

    /// The token was cancelled before the operation succeeded
    #[error("retry cancelled")]
    Cancelled,

    /// The token's deadline passed before the operation succeeded
    #[error("retry timed out")]
    TimedOut,
}

impl<E> From<PopError> for RetryError<E> {
    fn from(err: PopError) -> Self {
        match err {
            PopError::Cancelled => RetryError::Cancelled,
            PopError::TimedOut => RetryError::TimedOut,
        }
    }
}
