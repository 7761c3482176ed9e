use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::time::Instant;

use crate::deadline::Deadline;

/// Mutex-guarded mapping from value to its deadline.
///
/// Holds at most one deadline per distinct value: re-adding a value replaces its
/// deadline (last write wins). Never blocks beyond its own short critical sections.
pub struct TtlTable<T> {
    deadlines: Mutex<HashMap<T, Deadline>>,
}

impl<T: Eq + Hash> TtlTable<T> {
    /// Creates an empty table
    pub fn new() -> Self {
        Self {
            deadlines: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<T, Deadline>> {
        self.deadlines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `deadline` for `value`, returning the deadline it replaced.
    pub fn add(&self, value: T, deadline: Deadline) -> Option<Deadline> {
        self.lock().insert(value, deadline)
    }

    /// Removes `value`. Returns `true` if it was present.
    pub fn remove(&self, value: &T) -> bool {
        self.lock().remove(value).is_some()
    }

    /// Returns the deadline currently stored for `value`
    pub fn deadline(&self, value: &T) -> Option<Deadline> {
        self.lock().get(value).copied()
    }

    /// Removes and returns every value whose deadline is due at `now`.
    ///
    /// The whole scan happens under a single lock acquisition, so each entry is
    /// classified exactly once. The returned order is unspecified.
    pub fn drain_expired(&self, now: Instant) -> Vec<T> {
        let mut deadlines = self.lock();
        if deadlines.is_empty() {
            return Vec::new();
        }

        let (expired, live): (HashMap<_, _>, HashMap<_, _>) = std::mem::take(&mut *deadlines)
            .into_iter()
            .partition(|(_, deadline)| deadline.has_passed_at(now));
        *deadlines = live;

        expired.into_keys().collect()
    }

    /// Returns the earliest stored deadline
    pub fn next_deadline(&self) -> Option<Deadline> {
        self.lock().values().min().copied()
    }

    /// Discards all entries. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut deadlines = self.lock();
        let count = deadlines.len();
        deadlines.clear();
        count
    }

    /// Returns the number of stored entries (due or not)
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if the table holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<T: Eq + Hash> Default for TtlTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
