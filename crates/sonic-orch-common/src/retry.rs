//! Per-key failure accounting for bounded retries.
//!
//! A [`RetryTracker`] counts consecutive failures per key so a manager can
//! retry a single key a few times before escalating to a more expensive
//! recovery (for example a full dataplane resync).

use std::collections::HashMap;
use std::hash::Hash;

/// Consecutive failure counts, indexed by key.
#[derive(Debug, Clone)]
pub struct RetryTracker<K> {
    failures: HashMap<K, u32>,
}

impl<K> RetryTracker<K>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            failures: HashMap::new(),
        }
    }

    /// Returns the number of keys with at least one recorded failure.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Records a failure for `key` and returns its consecutive failure count.
    pub fn record_failure(&mut self, key: K) -> u32 {
        let count = self.failures.entry(key).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Forgets a key's failures (called on success or after escalation).
    ///
    /// Returns the count that was cleared.
    pub fn clear(&mut self, key: &K) -> u32 {
        self.failures.remove(key).unwrap_or(0)
    }

    /// Returns the consecutive failure count for `key`.
    pub fn attempts(&self, key: &K) -> u32 {
        self.failures.get(key).copied().unwrap_or(0)
    }

    /// Forgets every key.
    pub fn reset(&mut self) {
        self.failures.clear();
    }
}

impl<K> Default for RetryTracker<K>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
