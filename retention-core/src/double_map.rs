use dashmap::DashMap;
use std::hash::Hash;

/// Concurrent two-level map: each root key owns its own child map.
///
/// A root key appears on the first `set` under it and stays until
/// [`clear_root`](Self::clear_root), even once its child map is empty.
/// Both levels are `DashMap`s, so work on different root keys rarely contends.
///
/// # Example
///
/// ```rust
/// use retention_core::DoubleMap;
///
/// let sessions = DoubleMap::new();
/// sessions.set("tenant-a", 1, "alice");
/// sessions.set("tenant-a", 2, "bob");
///
/// assert_eq!(sessions.get(&"tenant-a", &2), Some("bob"));
/// assert_eq!(sessions.child_len(&"tenant-a"), Some(2));
/// assert_eq!(sessions.child_len(&"tenant-b"), None);
/// ```
pub struct DoubleMap<K1, K2, V> {
    roots: DashMap<K1, DashMap<K2, V>>,
}

impl<K1, K2, V> DoubleMap<K1, K2, V>
where
    K1: Eq + Hash + Clone,
    K2: Eq + Hash + Clone,
{
    /// Creates an empty map
    pub fn new() -> Self {
        Self {
            roots: DashMap::new(),
        }
    }

    /// Stores `value` under `(root, child)`. Returns the value it replaced.
    pub fn set(&self, root: K1, child: K2, value: V) -> Option<V> {
        self.roots.entry(root).or_default().insert(child, value)
    }

    /// Returns `true` if `(root, child)` holds a value
    #[must_use]
    pub fn has(&self, root: &K1, child: &K2) -> bool {
        self.roots
            .get(root)
            .is_some_and(|children| children.contains_key(child))
    }

    /// Removes the value under `(root, child)` and returns it.
    ///
    /// The root key is kept even if this empties its child map.
    pub fn delete(&self, root: &K1, child: &K2) -> Option<V> {
        let children = self.roots.get(root)?;
        children.remove(child).map(|(_, value)| value)
    }

    /// Returns every root key, in no particular order
    pub fn root_keys(&self) -> Vec<K1> {
        self.roots.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Returns the child keys under `root`, or `None` if `root` is unknown.
    pub fn child_keys(&self, root: &K1) -> Option<Vec<K2>> {
        let children = self.roots.get(root)?;
        let keys = children.iter().map(|entry| entry.key().clone()).collect();
        Some(keys)
    }

    /// Returns the number of root keys
    #[must_use]
    pub fn root_len(&self) -> usize {
        self.roots.len()
    }

    /// Returns the number of values under `root`, or `None` if `root` is unknown.
    #[must_use]
    pub fn child_len(&self, root: &K1) -> Option<usize> {
        self.roots.get(root).map(|children| children.len())
    }

    /// Removes every root key along with its values
    pub fn clear_root(&self) {
        self.roots.clear();
    }

    /// Removes every value under `root` but keeps the root key itself.
    /// Returns `false` if `root` is unknown.
    pub fn clear_child(&self, root: &K1) -> bool {
        match self.roots.get(root) {
            Some(children) => {
                children.clear();
                true
            }
            None => false,
        }
    }
}

impl<K1, K2, V> DoubleMap<K1, K2, V>
where
    K1: Eq + Hash + Clone,
    K2: Eq + Hash + Clone,
    V: Clone,
{
    /// Returns a copy of the value under `(root, child)`
    pub fn get(&self, root: &K1, child: &K2) -> Option<V> {
        let children = self.roots.get(root)?;
        let value = children.get(child).map(|value| value.clone());
        value
    }
}

impl<K1, K2, V> Default for DoubleMap<K1, K2, V>
where
    K1: Eq + Hash + Clone,
    K2: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
