//! Debug assertion macros for container invariants.
//!
//! These macros provide runtime checks for the invariants documented on each
//! container. They are only active in debug builds, so there is zero overhead
//! in release builds.

// =============================================================================
// Reservation bound
// =============================================================================

/// Assert that the append counter stays within the segment capacity.
///
/// **Invariant**: `0 ≤ next_append ≤ capacity`
///
/// Used in: `Segment::try_append()` after a successful reservation and
/// `Segment::range()` when snapshotting the visible length.
macro_rules! debug_assert_reserved_bounded {
    ($reserved:expr, $capacity:expr) => {
        debug_assert!(
            $reserved <= $capacity,
            "append counter {} exceeds segment capacity {}",
            $reserved,
            $capacity
        )
    };
}

// =============================================================================
// Index translation
// =============================================================================

/// Assert that the static index schedule agrees with the dynamic segment
/// layout: translating a global index must land on the segment and offset it
/// was derived from.
///
/// **Invariant**: `position(start_index[s] + o) == (s, o)`
///
/// Used in: `Sequence::try_append()` for the index handed back to the caller.
macro_rules! debug_assert_position {
    ($index:expr, $segment:expr, $offset:expr) => {
        debug_assert!(
            crate::sequence::position($index) == ($segment, $offset),
            "index {} does not translate to segment {} offset {}",
            $index,
            $segment,
            $offset
        )
    };
}

/// Assert the reverse direction: a `(segment, offset)` pair produced by the
/// schedule recombines into the index it came from.
///
/// **Invariant**: `start_index[s] + o == index`
///
/// Used in: `Sequence::load()` and `Sequence::update_at()`.
macro_rules! debug_assert_translation {
    ($start:expr, $offset:expr, $index:expr) => {
        debug_assert!(
            $start + $offset == $index,
            "segment start {} and offset {} do not recombine into index {}",
            $start,
            $offset,
            $index
        )
    };
}

// =============================================================================
// Capacity schedule
// =============================================================================

/// Assert that a grown tail capacity is on the fixed schedule: a power of two
/// between the initial segment size and the flat 1024 ceiling.
///
/// Used in: `Sequence::grow()`.
macro_rules! debug_assert_tail_capacity {
    ($capacity:expr) => {
        debug_assert!(
            $capacity.is_power_of_two() && (8..=1024).contains(&$capacity),
            "tail capacity {} is off the growth schedule",
            $capacity
        )
    };
}

// =============================================================================
// Re-exports for crate-internal use
// =============================================================================

pub(crate) use debug_assert_position;
pub(crate) use debug_assert_reserved_bounded;
pub(crate) use debug_assert_tail_capacity;
pub(crate) use debug_assert_translation;
