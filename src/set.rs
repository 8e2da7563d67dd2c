use crate::Transaction;
use alloy::primitives::{map::HashMap, B256};
use core::{fmt, hash::Hash};
use std::collections::BTreeMap;

/// Extracts the logical identity of an item. Two items with equal keys are
/// the same item as far as an [`OrderedSet`] is concerned.
pub trait Distinct<T> {
    /// The identity key.
    type Key: Hash + Eq;

    /// Get the identity key of an item.
    fn key(&self, item: &T) -> Self::Key;
}

impl<T, K, F> Distinct<T> for F
where
    F: Fn(&T) -> K,
    K: Hash + Eq,
{
    type Key = K;

    fn key(&self, item: &T) -> K {
        self(item)
    }
}

/// Identifies transactions by their hash.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByTxHash;

impl Distinct<Transaction> for ByTxHash {
    type Key = B256;

    fn key(&self, item: &Transaction) -> B256 {
        item.hash()
    }
}

/// A set that preserves first-insertion order.
///
/// Each logical item (as decided by `D`) appears at most once. Removing an
/// item and inserting it again moves it to the end.
pub struct OrderedSet<T, D: Distinct<T> = ByTxHash> {
    distinct: D,
    items: BTreeMap<u64, T>,
    positions: HashMap<D::Key, u64>,
    next: u64,
}

impl<T: fmt::Debug, D: Distinct<T>> fmt::Debug for OrderedSet<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.values()).finish()
    }
}

impl<T, D> Default for OrderedSet<T, D>
where
    D: Distinct<T> + Default,
{
    fn default() -> Self {
        Self::new(D::default())
    }
}

impl<T, D: Distinct<T>> OrderedSet<T, D> {
    /// Create an empty set using the given identity.
    pub fn new(distinct: D) -> Self {
        Self { distinct, items: BTreeMap::new(), positions: HashMap::default(), next: 0 }
    }

    /// Number of items in the set.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True if an item with the same identity is in the set.
    pub fn contains(&self, item: &T) -> bool {
        self.positions.contains_key(&self.distinct.key(item))
    }

    /// Append an item. Returns `false` and leaves the set untouched if an
    /// item with the same identity is already present.
    pub fn insert(&mut self, item: T) -> bool {
        let key = self.distinct.key(&item);
        if self.positions.contains_key(&key) {
            return false;
        }
        let position = self.next;
        self.next += 1;
        self.positions.insert(key, position);
        self.items.insert(position, item);
        true
    }

    /// Remove the item with the same identity. Returns `false` if absent.
    pub fn remove(&mut self, item: &T) -> bool {
        self.positions
            .remove(&self.distinct.key(item))
            .and_then(|position| self.items.remove(&position))
            .is_some()
    }

    /// Iterate over the items in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.items.values()
    }

    /// Copy the items into a vector, in insertion order.
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.items.values().cloned().collect()
    }

    /// Consume the set, returning the items in insertion order.
    pub fn into_vec(self) -> Vec<T> {
        self.items.into_values().collect()
    }
}
