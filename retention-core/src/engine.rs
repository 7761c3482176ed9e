use std::hash::Hash;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::cancel::CancelToken;
use crate::config::RetentionConfig;
use crate::deadline::Deadline;
use crate::queue::BlockingQueue;
use crate::ttl_table::TtlTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Running,
    Destroyed,
}

/// Internal shared state for the engine
struct EngineInner<T> {
    table: TtlTable<T>,
    /// Values whose deadline has passed, waiting for a consumer
    ready: Arc<BlockingQueue<T>>,
    /// Serialises add/sweep/clean/destroy so nothing lands in the stores after destroy
    lifecycle: Mutex<Lifecycle>,
    /// Master token: stops the sweep task and every consumer stream
    shutdown: CancelToken,
    stream_buffer: usize,
}

impl<T> EngineInner<T> {
    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Eq + Hash> EngineInner<T> {
    /// Moves every value due at `now` from the table to the ready queue.
    ///
    /// The table lock is released before the queue lock is taken.
    fn sweep(&self, now: Instant) -> usize {
        let lifecycle = self.lifecycle();
        if *lifecycle == Lifecycle::Destroyed {
            return 0;
        }

        let expired = self.table.drain_expired(now);
        let promoted = expired.len();
        for value in expired {
            self.ready.push(value);
        }

        if promoted > 0 {
            tracing::trace!(promoted, "sweep promoted expired values");
        }
        promoted
    }
}

impl<T> Drop for EngineInner<T> {
    fn drop(&mut self) {
        // Stop the sweep task and every consumer worker when the last handle goes away
        self.shutdown.cancel();
    }
}

/// Holds values until their individual retain duration elapses, then hands each
/// one to exactly one consumer stream.
///
/// A background sweep task promotes due values from the TTL table into a ready
/// queue every [`sweep_interval`](RetentionConfig::sweep_interval). Any number of
/// consumer streams compete for that queue, so expired values are distributed
/// among them rather than broadcast.
///
/// The engine starts running at construction and stops for good on
/// [`destroy`](Self::destroy). Clones share the same engine.
///
/// # Example
///
/// ```rust,no_run
/// use retention_core::RetentionEngine;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let engine = RetentionEngine::new();
///     engine.add("session:42", Duration::from_millis(200));
///
///     let (mut stream, cancel) = engine.consumer_stream().unwrap();
///     if let Some(expired) = stream.recv().await {
///         println!("expired: {}", expired);
///     }
///
///     cancel.cancel();
///     engine.destroy();
/// }
/// ```
pub struct RetentionEngine<T> {
    inner: Arc<EngineInner<T>>,
}

impl<T> Clone for RetentionEngine<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> RetentionEngine<T>
where
    T: Eq + Hash + Send + 'static,
{
    /// Creates an engine with the default 100 ms sweep interval
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context. The engine requires
    /// a runtime to spawn its background sweep task.
    pub fn new() -> Self {
        Self::with_config(RetentionConfig::default())
    }

    /// Creates an engine with custom configuration
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context. The engine requires
    /// a runtime to spawn its background sweep task.
    pub fn with_config(config: RetentionConfig) -> Self {
        if tokio::runtime::Handle::try_current().is_err() {
            panic!(
                "retention_core::RetentionEngine requires a Tokio runtime. \
                 Create the engine from within a #[tokio::main] or #[tokio::test] \
                 context, or from code running on a Tokio runtime."
            );
        }

        let inner = Arc::new(EngineInner {
            table: TtlTable::new(),
            ready: Arc::new(BlockingQueue::new()),
            lifecycle: Mutex::new(Lifecycle::Running),
            shutdown: CancelToken::new(),
            stream_buffer: config.stream_buffer.max(1),
        });

        tokio::spawn(Self::sweep_task(
            Arc::downgrade(&inner),
            config.sweep_interval,
            inner.shutdown.clone(),
        ));
        tracing::debug!(interval = ?config.sweep_interval, "retention engine started");

        Self { inner }
    }

    /// Background task that periodically promotes expired values
    async fn sweep_task(inner: Weak<EngineInner<T>>, interval: Duration, shutdown: CancelToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the first immediate tick - we want to wait for the interval first
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(inner) = inner.upgrade() else {
                        break;
                    };
                    inner.sweep(Instant::now());
                }
                _ = shutdown.cancelled() => break,
            }
        }

        tracing::debug!("sweep task stopped");
    }

    /// Retains `value` for `retain`, after which it is delivered to one consumer.
    ///
    /// Re-adding a value that is still pending replaces its deadline. A zero retain
    /// makes the value due on the next sweep. No-op once destroyed.
    pub fn add(&self, value: T, retain: Duration) {
        self.add_until(value, Deadline::after(retain));
    }

    /// Retains `value` until `deadline`. Past deadlines are due on the next sweep.
    ///
    /// No-op once destroyed.
    pub fn add_until(&self, value: T, deadline: impl Into<Deadline>) {
        let lifecycle = self.inner.lifecycle();
        if *lifecycle == Lifecycle::Destroyed {
            return;
        }
        self.inner.table.add(value, deadline.into());
    }

    /// Drops a pending value before it expires. Returns `true` if it was pending.
    ///
    /// Values already promoted to the ready queue are not affected.
    pub fn forget(&self, value: &T) -> bool {
        self.inner.table.remove(value)
    }

    /// Runs one sweep pass immediately. Returns the number of values promoted.
    ///
    /// Note: This is also done automatically by the background task.
    pub fn sweep(&self) -> usize {
        self.inner.sweep(Instant::now())
    }

    /// Opens a new consumer stream backed by its own draining worker.
    ///
    /// The stream yields expired values until the returned [`StreamCancel`] fires,
    /// the engine is destroyed, or the engine's last handle is dropped. Dropping the
    /// stream also stops its worker. Returns `None` once the engine is destroyed.
    pub fn consumer_stream(&self) -> Option<(ConsumerStream<T>, StreamCancel)> {
        let lifecycle = self.inner.lifecycle();
        if *lifecycle == Lifecycle::Destroyed {
            return None;
        }

        let token = self.inner.shutdown.child_token();
        let (tx, rx) = mpsc::channel(self.inner.stream_buffer);
        tokio::spawn(drain_worker(Arc::clone(&self.inner.ready), tx, token.clone()));

        Some((ConsumerStream { rx }, StreamCancel { token }))
    }

    /// Discards every pending value and every expired value not yet handed to a stream.
    ///
    /// Open consumer streams stay open and simply see no deliveries until new values
    /// expire. No-op once destroyed.
    pub fn clean(&self) {
        let lifecycle = self.inner.lifecycle();
        if *lifecycle == Lifecycle::Destroyed {
            return;
        }

        let pending = self.inner.table.clear();
        let ready = self.inner.ready.len();
        self.inner.ready.clear();
        tracing::trace!(pending, ready, "retention engine cleaned");
    }

    /// Stops the sweep task, closes every consumer stream and discards all values.
    ///
    /// The engine stays inert afterwards; calling this again does nothing.
    pub fn destroy(&self) {
        let mut lifecycle = self.inner.lifecycle();
        if *lifecycle == Lifecycle::Destroyed {
            return;
        }
        *lifecycle = Lifecycle::Destroyed;

        self.inner.shutdown.cancel();
        self.inner.table.clear();
        self.inner.ready.clear();
        tracing::debug!("retention engine destroyed");
    }

    /// Returns `true` once [`destroy`](Self::destroy) has been called
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        *self.inner.lifecycle() == Lifecycle::Destroyed
    }

    /// Returns the number of values still waiting for their deadline
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.table.len()
    }

    /// Returns the number of expired values not yet taken by a stream
    #[must_use]
    pub fn ready(&self) -> usize {
        self.inner.ready.len()
    }
}

impl<T> Default for RetentionEngine<T>
where
    T: Eq + Hash + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Pops from the ready queue into one stream until cancelled or the stream is dropped.
async fn drain_worker<T: Send + 'static>(
    ready: Arc<BlockingQueue<T>>,
    tx: mpsc::Sender<T>,
    token: CancelToken,
) {
    loop {
        // Reserve a slot first so a popped value always has somewhere to go
        let permit = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            permit = tx.reserve() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let value = tokio::select! {
            biased;
            result = ready.pop(&token) => match result {
                Ok(value) => value,
                Err(err) => {
                    tracing::trace!(%err, "consumer stream closing");
                    break;
                }
            },
            _ = tx.closed() => break,
        };

        if tx.is_closed() {
            // Reader went away mid-pop; give the value to another stream
            ready.push(value);
            break;
        }
        permit.send(value);
    }
}

/// Cancels one consumer stream. Clones cancel the same stream.
#[derive(Debug, Clone)]
pub struct StreamCancel {
    token: CancelToken,
}

impl StreamCancel {
    /// Stops the stream's worker. Values already buffered can still be read.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns `true` once the stream was cancelled or its engine destroyed
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Values delivered to one consumer, in the order its worker popped them.
///
/// Ends (`None`) after the stream is cancelled or the engine destroyed.
#[derive(Debug)]
pub struct ConsumerStream<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> ConsumerStream<T> {
    /// Waits for the next delivered value. `None` once the stream is closed.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Returns an already delivered value without waiting
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

impl<T> Stream for ConsumerStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}
