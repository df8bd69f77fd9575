use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Mutex;

use crossbeam_epoch::{self as epoch, Atomic};

use crate::sequence::{grow_and_append, Sequence};

/// Concurrent growable vector with stable indices.
///
/// Pushes are lock-free while the tail segment has room; growth takes a
/// mutex that only growers contend on. Indices are never invalidated: the
/// segment an index lands in is kept alive by every later descriptor, so a
/// published index can be loaded and updated for the lifetime of the vector.
///
/// There is no removal — the vector only grows. For deletion with index
/// reuse, see [`Bag`](crate::Bag).
pub struct AppendVec<T> {
    /// Current descriptor. Null until the first push; replaced on growth.
    store: Atomic<Sequence<T>>,
    /// Serializes growers; pushes on a non-full tail and readers never take it.
    grow_lock: Mutex<()>,
}

impl<T> AppendVec<T> {
    /// Creates an empty vector.
    pub fn new() -> Self {
        Self {
            store: Atomic::null(),
            grow_lock: Mutex::new(()),
        }
    }

    /// Appends `value`, growing if needed, and returns its index.
    ///
    /// In a single-threaded run indices come out as `0, 1, 2, …`; concurrent
    /// pushes each get a distinct index with no gaps once all of them return.
    pub fn push(&self, value: T) -> usize {
        let guard = &epoch::pin();
        let snapshot = self.store.load(Ordering::Acquire, guard);
        let mut value = value;
        // SAFETY: the descriptor stays reachable while `guard` is pinned.
        if let Some(sequence) = unsafe { snapshot.as_ref() } {
            match sequence.try_append(value) {
                Ok(index) => return index,
                Err(rejected) => value = rejected,
            }
        }
        grow_and_append(&self.store, &self.grow_lock, snapshot, value, guard)
    }

    /// Returns a clone of the value at `index`.
    ///
    /// # Panics
    ///
    /// Panics if nothing was ever pushed, or if `index` was never returned by
    /// [`push`](AppendVec::push).
    pub fn load(&self, index: usize) -> T
    where
        T: Clone,
    {
        let guard = &epoch::pin();
        let store = self.store.load(Ordering::Acquire, guard);
        // SAFETY: as in `push`.
        let Some(sequence) = (unsafe { store.as_ref() }) else {
            panic!("load from a vector that was never pushed to");
        };
        sequence.load(index, guard).clone()
    }

    /// Replaces the value at `index`, returning the previous one.
    ///
    /// # Panics
    ///
    /// Panics if nothing was ever pushed, or if `index` was never returned by
    /// [`push`](AppendVec::push).
    pub fn update_at(&self, index: usize, value: T) -> T
    where
        T: Clone,
    {
        let guard = &epoch::pin();
        let store = self.store.load(Ordering::Acquire, guard);
        // SAFETY: as in `push`.
        let Some(sequence) = (unsafe { store.as_ref() }) else {
            panic!("update of a vector that was never pushed to");
        };
        sequence.update_at(index, value, guard).clone()
    }

    /// Visits every published value in index order. Return `true` from `f`
    /// to stop the scan.
    ///
    /// The scan observes the descriptor current at entry; a slot whose push
    /// has reserved an index but not yet published its value is skipped.
    pub fn range<F>(&self, f: F)
    where
        F: FnMut(usize, &T) -> bool,
    {
        let guard = &epoch::pin();
        let store = self.store.load(Ordering::Acquire, guard);
        // SAFETY: as in `push`.
        let Some(sequence) = (unsafe { store.as_ref() }) else {
            return;
        };
        sequence.range(f, guard);
    }

    /// Number of published values, derived by a full scan.
    pub fn len(&self) -> usize {
        let mut length = 0;
        self.range(|_, _| {
            length += 1;
            false
        });
        length
    }

    /// Whether nothing has been published yet.
    pub fn is_empty(&self) -> bool {
        let mut empty = true;
        self.range(|_, _| {
            empty = false;
            true
        });
        empty
    }
}

impl<T> Default for AppendVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for AppendVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("AppendVec { .. }")
    }
}

impl<T> Drop for AppendVec<T> {
    fn drop(&mut self) {
        // SAFETY: exclusive access; the descriptor is only reachable from
        // here, and earlier descriptors were already retired on growth.
        unsafe {
            let store = self.store.load(Ordering::Relaxed, epoch::unprotected());
            if !store.is_null() {
                drop(store.into_owned());
            }
        }
    }
}
