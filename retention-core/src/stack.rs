//! Unbounded LIFO stack shared between threads.
//!
//! Same storage as the queue: nodes sit in an index arena and freed slots are
//! reused, so a long-lived stack does not allocate once it has reached its peak size.

use std::sync::{Mutex, MutexGuard, PoisonError};

struct Node<T> {
    value: Option<T>,
    below: Option<usize>,
}

struct Pile<T> {
    nodes: Vec<Node<T>>,
    free: Vec<usize>,
    top: Option<usize>,
    len: usize,
}

impl<T> Pile<T> {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            top: None,
            len: 0,
        }
    }

    fn push(&mut self, value: T) {
        let node = Node {
            value: Some(value),
            below: self.top,
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
        self.top = Some(index);
        self.len += 1;
    }

    fn pop(&mut self) -> Option<T> {
        let index = self.top?;
        let node = &mut self.nodes[index];
        let value = node.value.take();
        self.top = node.below.take();
        self.free.push(index);
        self.len -= 1;

        debug_assert_eq!(self.len == 0, self.top.is_none());
        value
    }

    fn top(&self) -> Option<&T> {
        self.top.and_then(|index| self.nodes[index].value.as_ref())
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.top = None;
        self.len = 0;
    }
}

/// Thread-safe last-in first-out stack. Every operation takes one short lock.
///
/// # Example
///
/// ```rust
/// use retention_core::Stack;
///
/// let stack = Stack::new();
/// stack.push(1);
/// stack.push(2);
///
/// assert_eq!(stack.peek(), Some(2));
/// assert_eq!(stack.pop(), Some(2));
/// assert_eq!(stack.len(), 1);
/// ```
pub struct Stack<T> {
    pile: Mutex<Pile<T>>,
}

impl<T> Stack<T> {
    /// Creates an empty stack
    pub fn new() -> Self {
        Self {
            pile: Mutex::new(Pile::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Pile<T>> {
        self.pile.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Places `value` on top
    pub fn push(&self, value: T) {
        self.lock().push(value);
    }

    /// Removes and returns the top value, or `None` if the stack is empty.
    pub fn pop(&self) -> Option<T> {
        self.lock().pop()
    }

    /// Removes every value
    pub fn clear(&self) {
        self.lock().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().len == 0
    }
}

impl<T: Clone> Stack<T> {
    /// Returns a copy of the top value without removing it
    pub fn peek(&self) -> Option<T> {
        self.lock().top().cloned()
    }
}

impl<T> Default for Stack<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_pop_returns_last_pushed() {
        let stack = Stack::new();
        for i in 0..5 {
            stack.push(i);
        }

        let popped: Vec<_> = std::iter::from_fn(|| stack.pop()).collect();
        assert_eq!(popped, vec![4, 3, 2, 1, 0]);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_empty_stack() {
        let stack: Stack<String> = Stack::default();
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.peek(), None);
        assert_eq!(stack.len(), 0);
    }

    #[test]
    fn test_peek_leaves_value() {
        let stack = Stack::new();
        stack.push("bottom".to_string());
        stack.push("top".to_string());

        assert_eq!(stack.peek().as_deref(), Some("top"));
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.pop().as_deref(), Some("top"));
        assert_eq!(stack.peek().as_deref(), Some("bottom"));
    }

    #[test]
    fn test_freed_slots_are_reused() {
        let stack = Stack::new();
        stack.push(1);
        stack.push(2);
        stack.pop();
        stack.pop();
        stack.push(3);
        stack.push(4);

        assert_eq!(stack.lock().nodes.len(), 2);
        assert_eq!(stack.pop(), Some(4));
        assert_eq!(stack.pop(), Some(3));
    }

    #[test]
    fn test_clear() {
        let stack = Stack::new();
        stack.push(1);
        stack.push(2);

        stack.clear();
        assert!(stack.is_empty());
        assert_eq!(stack.pop(), None);

        stack.push(7);
        assert_eq!(stack.peek(), Some(7));
    }

    #[test]
    fn test_concurrent_push_and_pop() {
        let stack = Arc::new(Stack::new());
        let mut handles = vec![];

        for thread_id in 0..8 {
            let stack = Arc::clone(&stack);
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    stack.push(thread_id * 100 + i);
                }
            }));
        }
        for handle in handles {
            handle.join().expect("Thread panicked");
        }
        assert_eq!(stack.len(), 800);

        let mut handles = vec![];
        for _ in 0..8 {
            let stack = Arc::clone(&stack);
            handles.push(thread::spawn(move || {
                let mut popped = Vec::new();
                while let Some(value) = stack.pop() {
                    popped.push(value);
                }
                popped
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for value in handle.join().expect("Thread panicked") {
                assert!(seen.insert(value), "{} popped twice", value);
            }
        }
        assert_eq!(seen.len(), 800);
        assert!(stack.is_empty());
    }
}
