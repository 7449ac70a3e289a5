//! A dynamically-grown, dense NodeId-indexed container.
//!
//! Node ids are dense-ish starting at zero; this covers the common case
//! with an atomic-ish `RwLock<Vec<T>>` where the read lock guards ordinary
//! slot access (cheap — callers clone the `T` out and release the lock
//! immediately) and the write lock is only taken to grow the backing
//! vector when a new id exceeds current capacity. A sparse hash-map
//! fallback isn't needed here: this crate's ids are always assigned
//! densely by the builder.

use parking_lot::RwLock;

use crate::types::NodeId;

pub struct DenseIntMap<T> {
    slots: RwLock<Vec<T>>,
}

impl<T: Clone> DenseIntMap<T> {
    pub fn new() -> Self {
        DenseIntMap { slots: RwLock::new(Vec::new()) }
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Returns a clone of the slot at `id`, or `None` if `id` is beyond
    /// the current capacity.
    pub fn get(&self, id: NodeId) -> Option<T> {
        self.slots.read().get(id.as_usize()).cloned()
    }

    /// Grows the backing vector (if needed) so that `id` is addressable,
    /// filling new slots with `default()`, then stores `value` at `id`.
    /// Takes the write lock only for the duration of the grow + store.
    pub fn ensure_and_set(&self, id: NodeId, value: T, default: impl Fn() -> T) {
        let idx = id.as_usize();
        let mut guard = self.slots.write();
        if idx >= guard.len() {
            guard.resize_with(idx + 1, &default);
        }
        guard[idx] = value;
    }

    /// Grows the backing vector so `id` is addressable, without touching
    /// any existing or new slot's contents beyond filling with `default`.
    pub fn ensure_capacity(&self, id: NodeId, default: impl Fn() -> T) {
        let idx = id.as_usize();
        let guard = self.slots.read();
        if idx < guard.len() {
            return;
        }
        drop(guard);
        let mut guard = self.slots.write();
        if idx >= guard.len() {
            guard.resize_with(idx + 1, &default);
        }
    }

    /// Runs `f` over every occupied slot, taking only the read lock for
    /// the duration of the snapshot clone (the closure itself runs
    /// outside any lock).
    pub fn for_each(&self, mut f: impl FnMut(usize, &T)) {
        let snapshot = self.slots.read().clone();
        for (idx, value) in snapshot.iter().enumerate() {
            f(idx, value);
        }
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.slots.read().clone()
    }
}

impl<T: Clone> Default for DenseIntMap<T> {
    fn default() -> Self {
        Self::new()
    }
}
