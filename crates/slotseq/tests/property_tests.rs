//! Property-based tests for the index schedule and the container contracts.
//!
//! The `position` mapping is checked against a straightforward reference
//! model that walks the capacity schedule band by band; the containers are
//! checked for dense indices, update round-trips, and tombstone hiding.

use proptest::prelude::*;
use slotseq::{position, AppendVec, Bag};

/// Reference model of the schedule: segments of 8, 16, …, 512, then 1024
/// forever, walked until the band containing `index`.
fn reference_position(index: usize) -> (usize, usize) {
    let mut segment = 0;
    let mut start = 0;
    let mut capacity = 8;
    loop {
        if index < start + capacity {
            return (segment, index - start);
        }
        start += capacity;
        segment += 1;
        if capacity < 1024 {
            capacity *= 2;
        }
    }
}

proptest! {
    #[test]
    fn prop_position_matches_the_reference_model(index in 0usize..5_000_000) {
        prop_assert_eq!(position(index), reference_position(index));
    }

    /// Consecutive indices either advance one offset or start the next
    /// segment at offset zero — the mapping has no holes or overlaps.
    #[test]
    fn prop_position_is_monotonic(index in 0usize..5_000_000) {
        let (segment, offset) = position(index);
        let (next_segment, next_offset) = position(index + 1);
        if next_segment == segment {
            prop_assert_eq!(next_offset, offset + 1);
        } else {
            prop_assert_eq!(next_segment, segment + 1);
            prop_assert_eq!(next_offset, 0);
        }
    }

    #[test]
    fn prop_pushes_are_dense(count in 0usize..400) {
        let vec = AppendVec::new();
        for expected in 0..count {
            prop_assert_eq!(vec.push(expected), expected);
        }
        let mut seen = Vec::new();
        vec.range(|index, value| {
            seen.push((index, *value));
            false
        });
        prop_assert_eq!(seen.len(), count);
        for (index, value) in seen {
            prop_assert_eq!(index, value);
        }
        prop_assert_eq!(vec.len(), count);
    }

    #[test]
    fn prop_update_round_trip(
        values in proptest::collection::vec(any::<u64>(), 1..64),
        replacement in any::<u64>(),
    ) {
        let vec = AppendVec::new();
        for &value in &values {
            vec.push(value);
        }
        let index = values.len() / 2;
        let old = vec.update_at(index, replacement);
        prop_assert_eq!(old, values[index]);
        let restored = vec.update_at(index, old);
        prop_assert_eq!(restored, replacement);
        prop_assert_eq!(vec.load(index), values[index]);
    }

    #[test]
    fn prop_deleted_indices_stay_hidden(count in 1usize..200, mask in any::<u64>()) {
        let bag = Bag::new();
        for value in 0..count {
            bag.add(value);
        }
        let mut deleted = vec![false; count];
        for index in 0..count {
            if mask & (1u64 << (index % 64)) != 0 {
                bag.delete_at(index);
                deleted[index] = true;
            }
        }
        let mut live = 0;
        bag.range(|index, value| {
            assert!(!deleted[index], "range visited deleted index {index}");
            assert_eq!(index, *value);
            live += 1;
            false
        });
        prop_assert_eq!(live, deleted.iter().filter(|&&gone| !gone).count());
        prop_assert_eq!(bag.len(), live);
    }
}
