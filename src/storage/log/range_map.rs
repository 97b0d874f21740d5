//! Open-ended range map used to route log indices to segment files.
//!
//! Every installed key starts a range that runs until the next key; the last
//! key's range is unbounded. Keys below the first range map to nothing.

use std::{
    collections::BTreeMap,
    ops::Bound::{Excluded, Unbounded},
};

/// Result of a lookup: the value covering the key (if any) and the first key
/// of the following range (if any).
#[derive(Debug)]
pub struct ValueRange<K, V> {
    pub limit: Option<K>,
    pub value: Option<V>,
}

#[derive(Debug)]
pub struct RangeMap<K, V> {
    tree: BTreeMap<K, V>,
}

impl<K: Ord + Copy, V: Clone> RangeMap<K, V> {
    pub fn new() -> Self {
        Self {
            tree: BTreeMap::new(),
        }
    }

    /// Map `[from, +inf)` to `value`, returning every value whose range
    /// started at or after `from`.
    pub fn replace_from(&mut self, from: K, value: V) -> Vec<V> {
        let removed = self.tree.split_off(&from);
        self.tree.insert(from, value);
        removed.into_values().collect()
    }

    pub fn lookup(&self, at: K) -> ValueRange<K, V> {
        let value = self.tree.range(..=at).next_back().map(|(_, v)| v.clone());
        let limit = self
            .tree
            .range((Excluded(at), Unbounded))
            .next()
            .map(|(k, _)| *k);
        ValueRange { limit, value }
    }

    /// Remove every range that ends at or before the start of the range
    /// containing `key`, returning their values. A range is only ever dropped
    /// whole.
    ///
    /// `key` need not be a range start: it may fall inside a range, in which
    /// case that range is kept along with everything after it. Pruning uses
    /// this to drop every range below the oldest surviving file in one call.
    pub fn remove(&mut self, key: K) -> Vec<V> {
        let floor = match self.tree.range(..=key).next_back() {
            Some((k, _)) => *k,
            None => return Vec::new(),
        };
        let retained = self.tree.split_off(&floor);
        let removed = std::mem::replace(&mut self.tree, retained);
        removed.into_values().collect()
    }

    /// Start key and value of the lowest range.
    pub fn first(&self) -> Option<(K, V)> {
        self.tree.iter().next().map(|(k, v)| (*k, v.clone()))
    }

    pub fn last(&self) -> Option<V> {
        self.tree.values().next_back().cloned()
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

impl<K: Ord + Copy, V: Clone> Default for RangeMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
