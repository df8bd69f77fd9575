use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use crossbeam_utils::{Backoff, CachePadded};

use crate::invariants::debug_assert_reserved_bounded;

// =============================================================================
// APPEND PROTOCOL
// =============================================================================
//
// An append happens in two steps:
//
// 1. *Reserve*: CAS `next_append` from `i` to `i + 1`. The winner owns
//    offset `i` and the pre-allocated envelope `pool[i]`.
// 2. *Publish*: write the value into `pool[i]`, then Release-store the
//    envelope pointer into `slots[i]`.
//
// Readers Acquire-load `slots[i]`; the Release/Acquire pair on the slot makes
// the envelope contents visible. Between the two steps a reader can observe a
// null slot at an offset below `next_append` — that is the reservation-publish
// gap, and every reader must treat such a slot as not yet visible.
//
// Once a slot is non-null it never returns to null. `update_at` swaps in a
// freshly allocated envelope and retires the previous one through the epoch
// collector: a reader that already dereferenced the old envelope keeps a
// valid reference until its guard drops.
//
// =============================================================================

/// Bounded lock-free array: the fixed-capacity building block of a
/// [`Sequence`](crate::Sequence).
///
/// Supports concurrent append, random load, random atomic update, and scan.
/// The capacity is fixed at construction; when the segment fills up,
/// [`try_append`](Segment::try_append) hands the value back and the caller is
/// expected to grow the containing sequence instead.
pub struct Segment<T> {
    /// Next free offset. Monotonic, never exceeds the capacity.
    next_append: CachePadded<AtomicUsize>,
    /// One atomic envelope pointer per slot. Null means unwritten.
    slots: Box<[Atomic<T>]>,
    /// Pre-allocated first envelope for every slot, consumed by the appending
    /// write so an uncontended append performs no allocation.
    pool: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

// Safety: slots hand out `&T` across threads and values move in from any
// thread, so both impls require `T: Send + Sync`.
unsafe impl<T: Send + Sync> Send for Segment<T> {}
unsafe impl<T: Send + Sync> Sync for Segment<T> {}

impl<T> Segment<T> {
    /// Creates a segment with room for `capacity` values.
    pub fn new(capacity: usize) -> Self {
        Self {
            next_append: CachePadded::new(AtomicUsize::new(0)),
            slots: (0..capacity).map(|_| Atomic::null()).collect(),
            pool: (0..capacity)
                .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
                .collect(),
        }
    }

    /// Returns the fixed capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Appends `value`, returning its offset.
    ///
    /// When the segment is full the value is handed back in `Err` and the
    /// segment is permanently closed to appends.
    pub fn try_append(&self, value: T) -> Result<usize, T> {
        let backoff = Backoff::new();
        let mut reserved = self.next_append.load(Ordering::Acquire);
        loop {
            if reserved == self.capacity() {
                return Err(value);
            }
            match self.next_append.compare_exchange_weak(
                reserved,
                reserved + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    debug_assert_reserved_bounded!(reserved + 1, self.capacity());
                    // The reservation owns `pool[reserved]`. Fill it, then
                    // publish; a reader racing in between sees null and skips.
                    let envelope = self.pool[reserved].get();
                    unsafe { (*envelope).write(value) };
                    let envelope = Shared::from(envelope.cast_const().cast::<T>());
                    self.slots[reserved].store(envelope, Ordering::Release);
                    return Ok(reserved);
                }
                Err(current) => {
                    reserved = current;
                    backoff.spin();
                }
            }
        }
    }

    /// Returns the value at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset` was never appended — callers must only pass offsets
    /// previously returned by [`try_append`](Segment::try_append), after the
    /// append completed.
    pub fn load<'g>(&self, offset: usize, guard: &'g Guard) -> &'g T {
        let entry = self.slots[offset].load(Ordering::Acquire, guard);
        // SAFETY: a non-null slot points at a live envelope: superseded
        // envelopes are retired through the collector and cannot be freed
        // while `guard` is pinned; pooled envelopes die with the segment.
        let Some(value) = (unsafe { entry.as_ref() }) else {
            panic!("load of slot {offset} before its append was published");
        };
        value
    }

    /// Replaces the value at `offset`, returning the previous one.
    ///
    /// The previous value stays borrowable for the lifetime of `guard`; its
    /// envelope is retired, never reused, because a concurrent reader may
    /// have just loaded it.
    ///
    /// # Panics
    ///
    /// Panics if `offset` was never appended.
    pub fn update_at<'g>(&self, offset: usize, value: T, guard: &'g Guard) -> &'g T {
        let fresh = Owned::new(value);
        let previous = self.slots[offset].swap(fresh, Ordering::AcqRel, guard);
        // SAFETY: as in `load`.
        let Some(old) = (unsafe { previous.as_ref() }) else {
            panic!("update of slot {offset} before its append was published");
        };
        if !self.is_pooled(previous) {
            // SAFETY: the swap above unlinked `previous`; no new reader can
            // reach it, and existing readers hold guards.
            unsafe { guard.defer_destroy(previous) };
        }
        old
    }

    /// Visits every published slot in offset order.
    ///
    /// The length is snapshotted on entry; slots inside the
    /// reservation-publish gap are skipped. Returns `true` if `f` stopped the
    /// scan by returning `true`.
    pub fn range<F>(&self, mut f: F, guard: &Guard) -> bool
    where
        F: FnMut(usize, &T) -> bool,
    {
        let visible = self.next_append.load(Ordering::Acquire);
        debug_assert_reserved_bounded!(visible, self.capacity());
        for (offset, slot) in self.slots.iter().enumerate().take(visible) {
            let entry = slot.load(Ordering::Acquire, guard);
            // SAFETY: as in `load`.
            let Some(value) = (unsafe { entry.as_ref() }) else {
                // Reserved but not yet published.
                continue;
            };
            if f(offset, value) {
                return true;
            }
        }
        false
    }

    /// Number of published slots, derived by scan.
    pub fn len(&self, guard: &Guard) -> usize {
        let mut length = 0;
        self.range(
            |_, _| {
                length += 1;
                false
            },
            guard,
        );
        length
    }

    /// Whether no slot has been published yet.
    pub fn is_empty(&self, guard: &Guard) -> bool {
        self.len(guard) == 0
    }

    /// Whether `entry` points into the segment-owned envelope pool.
    fn is_pooled(&self, entry: Shared<'_, T>) -> bool {
        let base = self.pool.as_ptr() as usize;
        let end = base + self.pool.len() * std::mem::size_of::<T>();
        (base..end).contains(&(entry.as_raw() as usize))
    }
}

impl<T> Drop for Segment<T> {
    fn drop(&mut self) {
        let reserved = self.next_append.load(Ordering::Relaxed);
        // SAFETY: exclusive access — no thread can be appending or reading.
        let guard = unsafe { epoch::unprotected() };
        for slot in &*self.slots {
            let entry = slot.load(Ordering::Relaxed, guard);
            if !entry.is_null() && !self.is_pooled(entry) {
                // Envelope installed by `update_at`, still owned by the slot.
                drop(unsafe { entry.into_owned() });
            }
        }
        for envelope in &self.pool[..reserved] {
            // Every reserved offset completed its pool write before
            // `try_append` returned.
            unsafe { (*envelope.get()).assume_init_drop() };
        }
    }
}

impl<T> fmt::Debug for Segment<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("capacity", &self.capacity())
            .field("reserved", &self.next_append.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
