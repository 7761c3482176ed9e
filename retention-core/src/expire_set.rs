use dashmap::DashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

use crate::deadline::Deadline;

/// Concurrent set whose members expire after their own retain duration.
///
/// Unlike [`RetentionEngine`](crate::RetentionEngine) it has no background task:
/// expiry is only checked when a member is looked up or counted, and expired
/// members are removed lazily at that point. Uses `DashMap`, so reads never block
/// other reads and writes only lock the shard holding the member.
///
/// # Example
///
/// ```rust
/// use retention_core::ExpireSet;
/// use std::time::Duration;
///
/// let seen = ExpireSet::new();
/// seen.add("request-1", Duration::from_secs(30));
///
/// assert!(seen.has(&"request-1").is_some());
/// assert!(seen.has(&"request-2").is_none());
/// ```
pub struct ExpireSet<T> {
    members: DashMap<T, Deadline>,
}

impl<T: Eq + Hash + Clone> ExpireSet<T> {
    /// Creates an empty set
    pub fn new() -> Self {
        Self {
            members: DashMap::new(),
        }
    }

    /// Adds `value` for `retain`. Re-adding replaces the previous deadline.
    pub fn add(&self, value: T, retain: Duration) {
        self.members.insert(value, Deadline::after(retain));
    }

    /// Returns the member's deadline if it is present and not expired.
    ///
    /// An expired member is removed as a side effect.
    pub fn has(&self, value: &T) -> Option<Deadline> {
        let deadline = *self.members.get(value)?;

        if deadline.has_passed() {
            // remove_if re-checks under the shard lock so a concurrent re-add survives
            self.members.remove_if(value, |_, deadline| deadline.has_passed());
            return None;
        }

        Some(deadline)
    }

    /// Removes `value`. Returns `true` if it was stored (expired or not).
    #[must_use = "returns whether the value was stored"]
    pub fn delete(&self, value: &T) -> bool {
        self.members.remove(value).is_some()
    }

    /// Removes every member
    pub fn clear(&self) {
        self.members.clear();
    }

    /// Removes all expired members. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.members.retain(|_, deadline| {
            if deadline.has_passed_at(now) {
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    /// Returns the number of live members, purging expired ones first
    #[must_use]
    pub fn len(&self) -> usize {
        self.purge_expired();
        self.members.len()
    }

    /// Returns `true` if there are no live members
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let now = Instant::now();
        !self.members.iter().any(|member| !member.value().has_passed_at(now))
    }

    /// Returns all live members
    pub fn members(&self) -> Vec<T> {
        let now = Instant::now();
        self.members
            .iter()
            .filter(|member| !member.value().has_passed_at(now))
            .map(|member| member.key().clone())
            .collect()
    }
}

impl<T: Eq + Hash + Clone> Default for ExpireSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    impl<T: Eq + Hash + Clone> ExpireSet<T> {
        /// Stores a member that is already expired
        fn add_expired(&self, value: T) {
            self.members.insert(value, Deadline::at(Instant::now() - Duration::from_secs(1)));
        }
    }

    #[test]
    fn test_add_and_has() {
        let set = ExpireSet::new();
        set.add("a", Duration::from_secs(60));

        assert!(set.has(&"a").is_some());
        assert!(set.has(&"b").is_none());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_expired_member_is_removed_on_lookup() {
        let set = ExpireSet::new();
        set.add_expired("old");

        assert!(set.has(&"old").is_none());
        assert!(!set.delete(&"old")); // Already removed by the lookup
    }

    #[test]
    fn test_zero_retain_expires_immediately() {
        let set = ExpireSet::new();
        set.add(1, Duration::ZERO);

        assert!(set.has(&1).is_none());
        assert!(set.is_empty());
    }

    #[test]
    fn test_readd_extends_deadline() {
        let set = ExpireSet::new();
        set.add_expired("k");
        set.add("k", Duration::from_secs(60));

        assert!(set.has(&"k").is_some());
    }

    #[test]
    fn test_len_ignores_expired() {
        let set = ExpireSet::new();
        set.add(1, Duration::from_secs(60));
        set.add(2, Duration::from_secs(60));
        set.add_expired(3);

        assert!(!set.is_empty());
        assert_eq!(set.len(), 2);

        let mut members = set.members();
        members.sort();
        assert_eq!(members, vec![1, 2]);
    }

    #[test]
    fn test_purge_expired() {
        let set = ExpireSet::new();
        set.add_expired("e1");
        set.add_expired("e2");
        set.add("live", Duration::from_secs(60));

        assert_eq!(set.purge_expired(), 2);
        assert_eq!(set.purge_expired(), 0);
        assert_eq!(set.members(), vec!["live"]);
    }

    #[test]
    fn test_delete_and_clear() {
        let set = ExpireSet::new();
        set.add("a", Duration::from_secs(60));
        set.add("b", Duration::from_secs(60));

        assert!(set.delete(&"a"));
        assert!(set.has(&"a").is_none());

        set.clear();
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn test_short_retain_expires_after_sleep() {
        let set = ExpireSet::new();
        set.add("brief", Duration::from_millis(20));
        assert!(set.has(&"brief").is_some());

        thread::sleep(Duration::from_millis(40));
        assert!(set.has(&"brief").is_none());
    }

    #[test]
    fn test_concurrent_adds() {
        let set = Arc::new(ExpireSet::new());
        let mut handles = vec![];

        for thread_id in 0..10 {
            let set = Arc::clone(&set);
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    set.add(format!("thread{}:value{}", thread_id, i), Duration::from_secs(60));
                }
            }));
        }

        for handle in handles {
            handle.join().expect("Thread panicked");
        }

        assert_eq!(set.len(), 1000);
    }
}
