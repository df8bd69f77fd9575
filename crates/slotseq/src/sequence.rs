use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use crossbeam_epoch::{Atomic, Guard, Owned, Shared};

use crate::invariants::{
    debug_assert_position, debug_assert_tail_capacity, debug_assert_translation,
};
use crate::segment::Segment;

/// Capacity of the first segment.
const FIRST_CAPACITY: usize = 8;

/// Ceiling of the growth schedule; every later segment stays at this size.
const FLAT_CAPACITY: usize = 1024;

/// Next tail capacity given the current tail's (0 when there is no tail).
///
/// The match spells out the whole schedule: seven doubling steps, then flat.
fn next_capacity(tail_capacity: usize) -> usize {
    match tail_capacity {
        0 => FIRST_CAPACITY,
        8 => 16,
        16 => 32,
        32 => 64,
        64 => 128,
        128 => 256,
        256 => 512,
        _ => FLAT_CAPACITY,
    }
}

/// Maps a global index to its `(segment, offset)` position.
///
/// The mapping is a pure function of the capacity schedule — it does not
/// depend on any particular [`Sequence`] — so an index handed out once stays
/// valid in every grown successor.
pub fn position(index: usize) -> (usize, usize) {
    match index {
        0..=7 => (0, index),
        8..=23 => (1, index - 8),
        24..=55 => (2, index - 24),
        56..=119 => (3, index - 56),
        120..=247 => (4, index - 120),
        248..=503 => (5, index - 248),
        504..=1015 => (6, index - 504),
        _ => (7 + (index - 1016) / FLAT_CAPACITY, (index - 1016) % FLAT_CAPACITY),
    }
}

/// Immutable descriptor of chained [`Segment`]s.
///
/// A sequence never changes after construction: growth builds a successor
/// that shares every existing segment and appends one larger tail. Publishing
/// the successor — and keeping the old descriptor alive for readers still
/// holding it — is the caller's job; the concurrent wrappers do it through an
/// epoch-protected atomic pointer.
#[derive(Debug)]
pub struct Sequence<T> {
    /// Ordered segments; the tail is the newest and largest.
    segments: Vec<Arc<Segment<T>>>,
    /// Global index of each segment's first slot.
    start_index: Vec<usize>,
    /// Sum of all segment capacities.
    capacity: usize,
}

impl<T> Sequence<T> {
    /// Creates an empty descriptor with no segments.
    pub fn new() -> Self {
        Self {
            segments: Vec::new(),
            start_index: Vec::new(),
            capacity: 0,
        }
    }

    /// Returns a successor descriptor with one additional tail segment.
    ///
    /// The receiver is left untouched; both descriptors share the existing
    /// segments.
    pub fn grow(&self) -> Self {
        let tail_capacity =
            next_capacity(self.segments.last().map_or(0, |segment| segment.capacity()));
        debug_assert_tail_capacity!(tail_capacity);

        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.extend(self.segments.iter().cloned());
        segments.push(Arc::new(Segment::new(tail_capacity)));
        let mut start_index = Vec::with_capacity(self.start_index.len() + 1);
        start_index.extend_from_slice(&self.start_index);
        start_index.push(self.capacity);

        Self {
            segments,
            start_index,
            capacity: self.capacity + tail_capacity,
        }
    }

    /// Appends to the tail segment, returning the global index.
    ///
    /// Hands the value back in `Err` when the descriptor is empty or the tail
    /// is full; the caller is expected to grow and retry on a successor.
    pub fn try_append(&self, value: T) -> Result<usize, T> {
        let Some(tail) = self.segments.last() else {
            return Err(value);
        };
        let offset = tail.try_append(value)?;
        let tail_index = self.segments.len() - 1;
        let index = self.start_index[tail_index] + offset;
        debug_assert_position!(index, tail_index, offset);
        Ok(index)
    }

    /// Returns the value at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` was never returned by an append on this descriptor
    /// or one of its predecessors.
    pub fn load<'g>(&self, index: usize, guard: &'g Guard) -> &'g T {
        let (segment, offset) = position(index);
        debug_assert_translation!(self.start_index[segment], offset, index);
        self.segments[segment].load(offset, guard)
    }

    /// Replaces the value at `index`, returning the previous one.
    ///
    /// # Panics
    ///
    /// Panics if `index` was never appended.
    pub fn update_at<'g>(&self, index: usize, value: T, guard: &'g Guard) -> &'g T {
        let (segment, offset) = position(index);
        debug_assert_translation!(self.start_index[segment], offset, index);
        self.segments[segment].update_at(offset, value, guard)
    }

    /// Visits every published slot in global index order.
    ///
    /// Returns `true` if `f` stopped the scan.
    pub fn range<F>(&self, mut f: F, guard: &Guard) -> bool
    where
        F: FnMut(usize, &T) -> bool,
    {
        for (segment_index, segment) in self.segments.iter().enumerate() {
            let start = self.start_index[segment_index];
            if segment.range(|offset, value| f(start + offset, value), guard) {
                return true;
            }
        }
        false
    }

    /// Total capacity across all segments.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of segments in the descriptor.
    #[inline]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}

impl<T> Default for Sequence<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Grow path shared by the concurrent wrappers.
///
/// Serializes growers on `lock`; readers and appenders never take it. The
/// descriptor is re-loaded with Acquire ordering *inside* the critical
/// section — freshness is decided here, not by the unlocked load that
/// produced `snapshot` — and an append is retried first when another grower
/// already published a successor while this thread waited.
pub(crate) fn grow_and_append<T>(
    store: &Atomic<Sequence<T>>,
    lock: &Mutex<()>,
    snapshot: Shared<'_, Sequence<T>>,
    mut value: T,
    guard: &Guard,
) -> usize {
    let _growers = lock.lock().unwrap();

    let current = store.load(Ordering::Acquire, guard);
    if current != snapshot {
        if let Some(sequence) = unsafe { current.as_ref() } {
            match sequence.try_append(value) {
                Ok(index) => return index,
                Err(rejected) => value = rejected,
            }
        }
    }

    // SAFETY: `current` stays reachable while `guard` is pinned.
    let grown = match unsafe { current.as_ref() } {
        Some(sequence) => sequence.grow(),
        None => Sequence::new().grow(),
    };
    let index = match grown.try_append(value) {
        Ok(index) => index,
        Err(_) => unreachable!("freshly grown tail rejected an append"),
    };
    store.store(Owned::new(grown), Ordering::Release);
    if !current.is_null() {
        // SAFETY: the replaced descriptor is unreachable for new readers;
        // readers that already hold it are protected by their guards.
        unsafe { guard.defer_destroy(current) };
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_epoch as epoch;

    #[test]
    fn capacities_follow_the_schedule() {
        let mut sequence = Sequence::<u32>::new();
        let mut expected = vec![];
        for capacity in [8usize, 16, 32, 64, 128, 256, 512, 1024, 1024, 1024] {
            sequence = sequence.grow();
            expected.push(capacity);
            assert_eq!(sequence.segment_count(), expected.len());
            assert_eq!(sequence.capacity(), expected.iter().sum::<usize>());
        }
    }

    #[test]
    fn grow_leaves_the_receiver_untouched() {
        let sequence = Sequence::<u32>::new().grow();
        let grown = sequence.grow();
        assert_eq!(sequence.segment_count(), 1);
        assert_eq!(sequence.capacity(), 8);
        assert_eq!(grown.segment_count(), 2);
        assert_eq!(grown.capacity(), 24);
    }

    #[test]
    fn position_covers_the_band_boundaries() {
        assert_eq!(position(0), (0, 0));
        assert_eq!(position(7), (0, 7));
        assert_eq!(position(8), (1, 0));
        assert_eq!(position(23), (1, 15));
        assert_eq!(position(24), (2, 0));
        assert_eq!(position(503), (5, 255));
        assert_eq!(position(504), (6, 0));
        assert_eq!(position(1015), (6, 511));
        assert_eq!(position(1016), (7, 0));
        assert_eq!(position(2039), (7, 1023));
        assert_eq!(position(2040), (8, 0));
    }

    #[test]
    fn empty_descriptor_rejects_appends() {
        let sequence = Sequence::new();
        assert_eq!(sequence.try_append(1), Err(1));
    }

    #[test]
    fn appends_continue_across_growth() {
        let mut sequence = Sequence::new().grow();
        let mut appended = 0;
        while appended < 40 {
            match sequence.try_append(appended) {
                Ok(index) => {
                    assert_eq!(index, appended);
                    appended += 1;
                }
                Err(_) => sequence = sequence.grow(),
            }
        }
        let guard = &epoch::pin();
        for index in 0..40 {
            assert_eq!(*sequence.load(index, guard), index);
        }
    }

    #[test]
    fn range_translates_offsets_to_global_indices() {
        let mut sequence = Sequence::new().grow();
        let mut appended = 0;
        while appended < 20 {
            match sequence.try_append(appended * 2) {
                Ok(_) => appended += 1,
                Err(_) => sequence = sequence.grow(),
            }
        }
        let guard = &epoch::pin();
        let mut seen = Vec::new();
        sequence.range(
            |index, value| {
                seen.push((index, *value));
                false
            },
            guard,
        );
        assert_eq!(seen.len(), 20);
        for (index, value) in seen {
            assert_eq!(value, index * 2);
        }
    }

    #[test]
    fn update_through_the_descriptor() {
        let sequence = Sequence::new().grow();
        let index = sequence.try_append(String::from("old")).unwrap();
        let guard = &epoch::pin();
        assert_eq!(sequence.update_at(index, String::from("new"), guard), "old");
        assert_eq!(sequence.load(index, guard), "new");
    }
}
