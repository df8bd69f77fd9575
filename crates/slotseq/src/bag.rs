use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Mutex;

use crossbeam_epoch::{self as epoch, Atomic};

use crate::queue::LinkedQueue;
use crate::sequence::{grow_and_append, Sequence};

/// A stored slot: either a live user value or the marker left behind by
/// [`Bag::delete_at`]. The marker is a dedicated variant, so any user value —
/// including `None`-like ones — stays distinguishable from a deletion.
#[derive(Debug)]
enum Entry<T> {
    Live(T),
    Tombstone,
}

/// Concurrent set with stable, recyclable indices.
///
/// [`add`](Bag::add) returns the index the value landed on; the index stays
/// valid until [`delete_at`](Bag::delete_at) retires it, after which a later
/// `add` may hand the same index to a new value. Consumers must therefore not
/// assume an index keeps naming the same logical element over time.
///
/// Deletion tombstones the slot in place — storage is never removed from the
/// middle — and parks the index on an internal free list for reuse once the
/// tail segment fills up.
pub struct Bag<T> {
    /// Current descriptor. Null until the first `add`; replaced on growth.
    store: Atomic<Sequence<Entry<T>>>,
    /// Indices freed by `delete_at`, awaiting reuse.
    recycled: LinkedQueue<usize>,
    /// Serializes growers; adds on a non-full tail and readers never take it.
    grow_lock: Mutex<()>,
}

impl<T> Bag<T> {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self {
            store: Atomic::null(),
            recycled: LinkedQueue::new(),
            grow_lock: Mutex::new(()),
        }
    }

    /// Adds `value` and returns its index.
    ///
    /// The index may have belonged to a previously deleted value.
    pub fn add(&self, value: T) -> usize {
        let guard = &epoch::pin();
        let snapshot = self.store.load(Ordering::Acquire, guard);
        let mut entry = Entry::Live(value);
        // SAFETY: the descriptor stays reachable while `guard` is pinned.
        if let Some(sequence) = unsafe { snapshot.as_ref() } {
            match sequence.try_append(entry) {
                Ok(index) => return index,
                Err(rejected) => entry = rejected,
            }
            // Tail full: try a recycled index before paying for growth.
            if let Some(index) = self.recycled.left_pop() {
                // The index may postdate `snapshot` if another thread grew
                // the sequence; address it through the newest descriptor.
                let current = self.store.load(Ordering::Acquire, guard);
                // SAFETY: the descriptor is never unpublished once set.
                let sequence = unsafe { current.deref() };
                sequence.update_at(index, entry, guard);
                return index;
            }
        }
        grow_and_append(&self.store, &self.grow_lock, snapshot, entry, guard)
    }

    /// Deletes the value at `index`, releasing the index for reuse.
    ///
    /// Deleting an already-deleted index is a no-op: the index is parked for
    /// recycling only once.
    ///
    /// # Panics
    ///
    /// Panics if nothing was ever added, or if `index` was never returned by
    /// [`add`](Bag::add).
    pub fn delete_at(&self, index: usize) {
        let guard = &epoch::pin();
        let store = self.store.load(Ordering::Acquire, guard);
        // SAFETY: as in `add`.
        let Some(sequence) = (unsafe { store.as_ref() }) else {
            panic!("delete from a bag that was never added to");
        };
        let previous = sequence.update_at(index, Entry::Tombstone, guard);
        if matches!(previous, Entry::Live(_)) {
            // The first delete of this slot owns the recycling.
            self.recycled.right_push(index);
        }
    }

    /// Visits every live value in index order; deleted slots are skipped
    /// without invoking `f`. Return `true` from `f` to stop the scan.
    ///
    /// The scan observes the descriptor current at entry; concurrent appends
    /// into newer segments are not guaranteed to be visible.
    pub fn range<F>(&self, mut f: F)
    where
        F: FnMut(usize, &T) -> bool,
    {
        let guard = &epoch::pin();
        let store = self.store.load(Ordering::Acquire, guard);
        // SAFETY: as in `add`.
        let Some(sequence) = (unsafe { store.as_ref() }) else {
            return;
        };
        sequence.range(
            |index, entry| match entry {
                Entry::Live(value) => f(index, value),
                Entry::Tombstone => false,
            },
            guard,
        );
    }

    /// Number of live values, derived by a full scan.
    pub fn len(&self) -> usize {
        let mut length = 0;
        self.range(|_, _| {
            length += 1;
            false
        });
        length
    }

    /// Whether the bag holds no live value.
    pub fn is_empty(&self) -> bool {
        let mut empty = true;
        self.range(|_, _| {
            empty = false;
            true
        });
        empty
    }
}

impl<T> Default for Bag<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Bag<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("Bag { .. }")
    }
}

impl<T> Drop for Bag<T> {
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
