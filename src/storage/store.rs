use std::collections::BTreeMap;

use crate::ring::types::{Key, KeyRange};

/// Key-sorted snapshot of a slice of the store, as carried in handoff messages.
pub type KeySlice = BTreeMap<Key, String>;

/// Ordered mapping from key to value for the keys a node currently serves.
///
/// The store itself does not know the node's range. Callers test ownership
/// before mutating and use [`split_off_range`](Self::split_off_range) /
/// [`merge`](Self::merge) to move whole slices during join and leave.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRangeStore {
    entries: BTreeMap<Key, String>,
}

impl KeyRangeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: KeySlice) -> Self {
        Self { entries }
    }

    pub fn get(&self, key: Key) -> Option<&String> {
        self.entries.get(&key)
    }

    /// Upsert. Returns the previous value, if any.
    pub fn insert(&mut self, key: Key, value: String) -> Option<String> {
        self.entries.insert(key, value)
    }

    pub fn remove(&mut self, key: Key) -> Option<String> {
        self.entries.remove(&key)
    }

    pub fn contains_key(&self, key: Key) -> bool {
        self.entries.contains_key(&key)
    }

    /// Removes and returns every entry whose key falls in `range` (circular rule).
    pub fn split_off_range(&mut self, range: &KeyRange) -> KeySlice {
        let moved: Vec<Key> = self
            .entries
            .keys()
            .copied()
            .filter(|key| range.contains(*key))
            .collect();

        let mut slice = KeySlice::new();
        for key in moved {
            if let Some(value) = self.entries.remove(&key) {
                slice.insert(key, value);
            }
        }
        slice
    }

    /// Bulk insertion of a slice received from a neighbour. Incoming values win.
    pub fn merge(&mut self, slice: KeySlice) {
        self.entries.extend(slice);
    }

    /// Empties the store, handing back everything it held.
    pub fn drain_all(&mut self) -> KeySlice {
        std::mem::take(&mut self.entries)
    }

    pub fn snapshot(&self) -> KeySlice {
        self.entries.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &String)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
