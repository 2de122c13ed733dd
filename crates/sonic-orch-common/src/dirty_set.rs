//! Dirty-key tracking for reconciliation loops.
//!
//! A [`DirtySet`] holds the keys whose dataplane entry is not known to match
//! the desired state. Keys leave the set only when a caller reports them as
//! resolved; a failed apply simply leaves the key where it is, so the next
//! pass picks it up again.

use std::collections::HashSet;
use std::hash::Hash;

/// Set of keys pending verification against the dataplane.
///
/// # Example
///
/// ```
/// use sonic_orch_common::DirtySet;
///
/// let mut dirty: DirtySet<u32> = DirtySet::new();
/// dirty.mark(1);
/// dirty.mark(2);
///
/// // Only even keys "apply" successfully; odd ones stay dirty.
/// let resolved = dirty.resolve_with(|k| k % 2 == 0);
/// assert_eq!(resolved, 1);
/// assert!(dirty.contains(&1));
/// ```
#[derive(Debug, Clone)]
pub struct DirtySet<K> {
    inner: HashSet<K>,
}

impl<K> DirtySet<K>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            inner: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.contains(key)
    }

    /// Marks a key dirty. Returns true if it was not already dirty.
    pub fn mark(&mut self, key: K) -> bool {
        self.inner.insert(key)
    }

    /// Marks every key from the iterator dirty.
    pub fn mark_all<I>(&mut self, keys: I)
    where
        I: IntoIterator<Item = K>,
    {
        self.inner.extend(keys);
    }

    /// Drops a key without applying it. Returns true if it was dirty.
    pub fn discard(&mut self, key: &K) -> bool {
        self.inner.remove(key)
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &K> {
        self.inner.iter()
    }

    /// Visits every dirty key once, removing those for which `apply`
    /// returns true.
    ///
    /// Returns the number of keys removed. Keys for which `apply` returns
    /// false stay dirty.
    pub fn resolve_with<F>(&mut self, mut apply: F) -> usize
    where
        F: FnMut(&K) -> bool,
    {
        let before = self.inner.len();
        self.inner.retain(|key| !apply(key));
        before - self.inner.len()
    }
}

impl<K> Default for DirtySet<K>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> FromIterator<K> for DirtySet<K>
where
    K: Eq + Hash,
{
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_mark_and_discard() {
        let mut dirty: DirtySet<&str> = DirtySet::new();
        assert!(dirty.is_empty());

        assert!(dirty.mark("10.0.0.0/24"));
        assert!(!dirty.mark("10.0.0.0/24"));
        assert_eq!(dirty.len(), 1);

        assert!(dirty.discard(&"10.0.0.0/24"));
        assert!(!dirty.discard(&"10.0.0.0/24"));
        assert!(dirty.is_empty());
    }

    #[test]
    fn test_mark_all() {
        let mut dirty: DirtySet<u32> = DirtySet::new();
        dirty.mark(1);
        dirty.mark_all([1, 2, 3]);
        assert_eq!(dirty.len(), 3);

        dirty.clear();
        assert!(dirty.is_empty());
    }

    #[test]
    fn test_resolve_with_keeps_failures() {
        let mut dirty: DirtySet<u32> = (1..=5).collect();
        let mut visited = Vec::new();

        let removed = dirty.resolve_with(|k| {
            visited.push(*k);
            *k != 3
        });

        visited.sort_unstable();
        assert_eq!(visited, vec![1, 2, 3, 4, 5]);
        assert_eq!(removed, 4);
        assert_eq!(dirty.iter().copied().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_resolve_with_on_empty_set() {
        let mut dirty: DirtySet<u32> = DirtySet::default();
        assert_eq!(dirty.resolve_with(|_| true), 0);
    }
}
