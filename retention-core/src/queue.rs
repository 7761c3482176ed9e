//! Unbounded FIFO queue with a cancellable blocking pop.
//!
//! Nodes live in an index arena owned by the queue and are only touched while the
//! queue's mutex is held. Waiters park on a [`Notify`]: every `push` wakes exactly one
//! of them, and `clear` wakes all of them so they re-check their own tokens.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::cancel::CancelToken;
use crate::error::PopError;

struct Node<T> {
    value: Option<T>,
    next: Option<usize>,
}

/// Singly linked chain stored in a slab. Popped slots go on a free list.
struct Chain<T> {
    nodes: Vec<Node<T>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<T> Chain<T> {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    fn push_back(&mut self, value: T) {
        let node = Node {
            value: Some(value),
            next: None,
        };
        let index = match self.free.pop() {
            Some(index) => {
                self.nodes[index] = node;
                index
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };

        match self.tail {
            Some(tail) => self.nodes[tail].next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.len += 1;
    }

    fn pop_front(&mut self) -> Option<T> {
        let index = self.head?;
        let node = &mut self.nodes[index];
        let value = node.value.take();
        self.head = node.next.take();
        if self.head.is_none() {
            self.tail = None;
        }
        self.free.push(index);
        self.len -= 1;

        debug_assert_eq!(self.len == 0, self.head.is_none() && self.tail.is_none());
        value
    }

    fn front(&self) -> Option<&T> {
        self.head.and_then(|index| self.nodes[index].value.as_ref())
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }
}

/// Thread-safe FIFO queue whose [`pop`](Self::pop) suspends until an item arrives
/// or the caller's [`CancelToken`] fires.
///
/// Items are handed out in insertion order. When several poppers are waiting, which
/// one receives the next item depends on scheduling, not on who started waiting first.
///
/// # Example
///
/// ```rust
/// use retention_core::{BlockingQueue, CancelToken};
///
/// #[tokio::main]
/// async fn main() {
///     let queue = BlockingQueue::new();
///     queue.push("job");
///
///     let token = CancelToken::new();
///     assert_eq!(queue.pop(&token).await, Ok("job"));
/// }
/// ```
pub struct BlockingQueue<T> {
    chain: Mutex<Chain<T>>,
    available: Notify,
}

impl<T> BlockingQueue<T> {
    /// Creates an empty queue
    pub fn new() -> Self {
        Self {
            chain: Mutex::new(Chain::new()),
            available: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Chain<T>> {
        // The chain is consistent between statements, so a poisoned lock is safe to reuse.
        self.chain.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `value` at the tail and wakes one waiting popper.
    pub fn push(&self, value: T) {
        self.lock().push_back(value);
        self.available.notify_one();
    }

    /// Removes and returns the head item without waiting.
    pub fn try_pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Waits for the head item and removes it.
    ///
    /// Returns [`PopError::Cancelled`] or [`PopError::TimedOut`] as soon as `cancel`
    /// fires, including when it has already fired at call time, without touching the
    /// queue.
    pub async fn pop(&self, cancel: &CancelToken) -> Result<T, PopError> {
        let mut woken = false;
        loop {
            self.check_token(cancel, woken)?;

            let notified = self.available.notified();
            tokio::pin!(notified);
            // Register before looking so a push between the check and the wait is not missed.
            notified.as_mut().enable();

            if let Some(value) = self.try_pop() {
                return Ok(value);
            }

            // A wakeup is only a hint: loop and re-check both the token and the chain.
            // An abandoned, still pending notification is forwarded by Notify on drop.
            woken = tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                _ = &mut notified => true,
            };
        }
    }

    /// Fails if `cancel` has fired. A waiter that gives up right after consuming a
    /// `notify_one` passes the wakeup on so another waiter sees the pushed item.
    fn check_token(&self, cancel: &CancelToken, woken: bool) -> Result<(), PopError> {
        let result = cancel.check();
        if result.is_err() && woken {
            self.available.notify_one();
        }
        result
    }

    /// Discards every queued item and wakes all waiters.
    ///
    /// Waiters whose token is still live go back to waiting.
    pub fn clear(&self) {
        self.lock().clear();
        self.available.notify_waiters();
    }

    /// Returns the number of queued items
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len
    }

    /// Returns `true` if no items are queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().len == 0
    }
}

impl<T: Clone> BlockingQueue<T> {
    /// Returns a copy of the head item without removing it
    pub fn peek(&self) -> Option<T> {
        self.lock().front().cloned()
    }
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
