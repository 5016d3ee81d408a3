//! Dense-id interner
//!
//! Assigns contiguous `u32` ids to values at first encounter. Safe for
//! concurrent insertion: the front end may build IR on multiple threads
//! and plugins may intern lazily, so interning must be idempotent
//! (compute-if-absent) without ever duplicating an id.

use dashmap::DashMap;
use parking_lot::RwLock;
use rustc_hash::FxBuildHasher;
use std::hash::Hash;

/// Concurrent value-to-dense-id interner.
///
/// Ids are assigned in insertion order and never change; `get` resolves an
/// id back to its value. Iteration via `snapshot` is in id order, which
/// keeps every consumer deterministic.
pub struct Indexer<T> {
    map: DashMap<T, u32, FxBuildHasher>,
    items: RwLock<Vec<T>>,
}

impl<T: Eq + Hash + Clone> Indexer<T> {
    pub fn new() -> Self {
        Self {
            map: DashMap::with_hasher(FxBuildHasher),
            items: RwLock::new(Vec::new()),
        }
    }

    /// Intern a value, returning its dense id. Repeated calls with an
    /// equal value return the same id.
    pub fn intern(&self, value: T) -> u32 {
        if let Some(id) = self.map.get(&value) {
            return *id;
        }
        let stored = value.clone();
        *self.map.entry(value).or_insert_with(|| {
            let mut items = self.items.write();
            let id = items.len() as u32;
            items.push(stored);
            id
        })
    }

    /// Look up the id of a value without interning it.
    pub fn lookup(&self, value: &T) -> Option<u32> {
        self.map.get(value).map(|r| *r)
    }

    /// Resolve an id back to its value.
    ///
    /// Panics if the id was never assigned by this indexer.
    pub fn get(&self, id: u32) -> T {
        self.items.read()[id as usize].clone()
    }

    /// Borrow the value for an id without cloning.
    pub fn get_with<R>(&self, id: u32, f: impl FnOnce(&T) -> R) -> R {
        f(&self.items.read()[id as usize])
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All interned values in id order.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.read().clone()
    }
}

impl<T: Eq + Hash + Clone> Default for Indexer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_idempotent() {
        let idx = Indexer::new();
        let a = idx.intern("a".to_string());
        let b = idx.intern("b".to_string());
        assert_ne!(a, b);
        assert_eq!(idx.intern("a".to_string()), a);
        assert_eq!(idx.len(), 2);
    }

    #[test]
    fn test_ids_are_dense() {
        let idx = Indexer::new();
        for i in 0..100u32 {
            assert_eq!(idx.intern(i * 7), i);
        }
        assert_eq!(idx.get(3), 21);
        assert_eq!(idx.lookup(&21), Some(3));
        assert_eq!(idx.lookup(&22), None);
    }

    #[test]
    fn test_concurrent_interning_never_duplicates() {
        use std::sync::Arc;
        let idx = Arc::new(Indexer::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let idx = Arc::clone(&idx);
            handles.push(std::thread::spawn(move || {
                (0..500).map(|i| idx.intern(i % 50)).collect::<Vec<_>>()
            }));
        }
        let results: Vec<Vec<u32>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(idx.len(), 50);
        // Every thread must have observed the same id for the same value.
        for r in &results[1..] {
            assert_eq!(r, &results[0]);
        }
        // Ids resolve back to their values.
        for i in 0..50 {
            let id = idx.lookup(&i).unwrap();
            assert_eq!(idx.get(id), i);
        }
    }
}
