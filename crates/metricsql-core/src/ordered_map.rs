//! Insertion-ordered map with case-insensitive string keys
//!
//! Re-inserting an existing key replaces the value in place and keeps the
//! position of the first insertion.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V> {
    entries: Vec<(String, V)>,
    index: HashMap<String, usize>,
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Normalize a key the way every lookup does
    pub fn fold_key(key: &str) -> String {
        key.to_lowercase()
    }

    /// Insert a value, returning the previous value stored under the same key
    pub fn insert(&mut self, key: &str, value: V) -> Option<V> {
        let key = Self::fold_key(key);
        match self.index.get(&key) {
            Some(&position) => Some(std::mem::replace(&mut self.entries[position].1, value)),
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.index
            .get(&Self::fold_key(key))
            .map(|&position| &self.entries[position].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(&Self::fold_key(key))
    }

    /// Remove a key, shifting later entries down to preserve order
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let position = self.index.remove(&Self::fold_key(key))?;
        let (_, value) = self.entries.remove(position);
        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Folded keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn into_values(self) -> impl Iterator<Item = V> {
        self.entries.into_iter().map(|(_, value)| value)
    }
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}
