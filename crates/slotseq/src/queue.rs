use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::Ordering;

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use crossbeam_utils::{Backoff, CachePadded};

// =============================================================================
// LIST DISCIPLINE
// =============================================================================
//
// The leftmost node is a permanent placeholder: pops remove its *successor*,
// never the placeholder itself. The rightmost position is only a hint — an
// atomic pointer updated after a push links its node, so it may lag behind
// the true tail (or, before the first push, designate an unlinked
// placeholder). `follow_tail` therefore chases `next` links to the real tail,
// restarting from the head placeholder while the hint is still a placeholder.
//
// A push linearizes on the CAS of the tail's `next` from null. A pop
// linearizes on the CAS of `head.next`. A pop refuses to remove the last
// user node: if it did, a concurrent push that already chose that node as its
// tail would splice behind the list. One anchor node therefore stays behind
// forever; consumers must tolerate one value per queue remaining parked.
//
// A node's value is written before the node is linked and never mutated
// afterwards; pops and peeks clone it out. Unlinked nodes are retired through
// the epoch collector, which also rules out the classic ABA on `head.next`:
// a node's memory cannot be reused while any thread still holds a guard from
// before the unlink.
//
// =============================================================================

struct Node<T> {
    /// Written once, before the node is linked.
    value: MaybeUninit<T>,
    next: Atomic<Node<T>>,
    /// Sentinel nodes carry no value.
    placeholder: bool,
}

impl<T> Node<T> {
    fn new(value: T) -> Self {
        Self {
            value: MaybeUninit::new(value),
            next: Atomic::null(),
            placeholder: false,
        }
    }

    fn placeholder() -> Self {
        Self {
            value: MaybeUninit::uninit(),
            next: Atomic::null(),
            placeholder: true,
        }
    }
}

impl<T> Drop for Node<T> {
    fn drop(&mut self) {
        if !self.placeholder {
            // SAFETY: user nodes are always constructed with a value, and the
            // value is never moved out while the node is alive.
            unsafe { self.value.assume_init_drop() };
        }
    }
}

/// Lock-free singly-linked FIFO with right-push and left-pop.
///
/// Used by [`Bag`](crate::Bag) to park freed slot indices until an `add`
/// recycles them. The pop refuses to take the last remaining value (see the
/// module notes above), so one pushed value per queue may stay parked
/// indefinitely — for the bag that merely delays one index's reuse.
pub struct LinkedQueue<T> {
    /// Permanent leftmost placeholder; pops remove its successor.
    head: CachePadded<Node<T>>,
    /// Advisory hint for the rightmost node.
    tail: CachePadded<Atomic<Node<T>>>,
}

impl<T> LinkedQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            head: CachePadded::new(Node::placeholder()),
            tail: CachePadded::new(Atomic::new(Node::placeholder())),
        }
    }

    /// Follows `next` links to the current true tail.
    fn follow_tail<'g>(&self, guard: &'g Guard) -> Shared<'g, Node<T>> {
        let hint = self.tail.load(Ordering::Acquire, guard);
        // SAFETY: the hint always designates a live node — the initial
        // placeholder is retired only after a push replaces it, and linked
        // nodes are retired only after being unlinked, both behind `guard`.
        let mut current = if unsafe { hint.deref() }.placeholder {
            // Nothing pushed yet; the chain starts at the head placeholder.
            Shared::from(&*self.head as *const Node<T>)
        } else {
            hint
        };
        loop {
            // SAFETY: reached through live links under `guard`.
            let next = unsafe { current.deref() }.next.load(Ordering::Acquire, guard);
            if next.is_null() {
                return current;
            }
            current = next;
        }
    }

    /// Pushes `value` onto the right end.
    pub fn right_push(&self, value: T) {
        let guard = &epoch::pin();
        let mut node = Owned::new(Node::new(value));
        let backoff = Backoff::new();
        loop {
            let tail = self.follow_tail(guard);
            // SAFETY: as in `follow_tail`.
            let tail_ref = unsafe { tail.deref() };
            match tail_ref.next.compare_exchange(
                Shared::null(),
                node,
                Ordering::Release,
                Ordering::Relaxed,
                guard,
            ) {
                Ok(linked) => {
                    // Publish the hint. Losing this race against a later push
                    // only makes the hint lag; `follow_tail` recovers.
                    let previous = self.tail.swap(linked, Ordering::AcqRel, guard);
                    // SAFETY: as in `follow_tail`.
                    if unsafe { previous.deref() }.placeholder {
                        // First push: retire the initial placeholder hint.
                        // SAFETY: unreachable once swapped out; guarded
                        // readers may still be inspecting it.
                        unsafe { guard.defer_destroy(previous) };
                    }
                    return;
                }
                Err(race) => {
                    node = race.new;
                    backoff.spin();
                }
            }
        }
    }

    /// Pops the leftmost value.
    ///
    /// Returns `None` when the queue is empty *or* holds a single value: the
    /// last user node is the anchor and is never removed.
    pub fn left_pop(&self) -> Option<T>
    where
        T: Clone,
    {
        let guard = &epoch::pin();
        let backoff = Backoff::new();
        loop {
            let first = self.head.next.load(Ordering::Acquire, guard);
            // SAFETY: `head.next` only ever designates live user nodes.
            let first_ref = unsafe { first.as_ref() }?;
            let second = first_ref.next.load(Ordering::Acquire, guard);
            if second.is_null() {
                // The anchor stays behind.
                return None;
            }
            match self.head.next.compare_exchange(
                first,
                second,
                Ordering::Release,
                Ordering::Relaxed,
                guard,
            ) {
                Ok(_) => {
                    debug_assert!(!first_ref.placeholder, "popped a placeholder node");
                    // Cloned, not moved: a concurrent peek may still be
                    // reading this node.
                    // SAFETY: value written before the node was linked.
                    let value = unsafe { first_ref.value.assume_init_ref() }.clone();
                    // SAFETY: unlinked by the CAS above; guarded readers keep
                    // it alive until their pins drop.
                    unsafe { guard.defer_destroy(first) };
                    return Some(value);
                }
                Err(_) => backoff.spin(),
            }
        }
    }

    /// Returns (without removing) the rightmost value, or `None` while the
    /// queue has never been pushed to.
    pub fn right_peek(&self) -> Option<T>
    where
        T: Clone,
    {
        let guard = &epoch::pin();
        let tail = self.follow_tail(guard);
        // SAFETY: as in `follow_tail`.
        let tail_ref = unsafe { tail.deref() };
        if tail_ref.placeholder {
            return None;
        }
        // SAFETY: value written before the node was linked.
        Some(unsafe { tail_ref.value.assume_init_ref() }.clone())
    }
}

impl<T> Default for LinkedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for LinkedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("LinkedQueue { .. }")
    }
}

impl<T> Drop for LinkedQueue<T> {
    fn drop(&mut self) {
        // SAFETY: exclusive access — nothing is concurrently linking or
        // popping, and already-popped nodes belong to the collector.
        unsafe {
            let guard = epoch::unprotected();
            let hint = self.tail.load(Ordering::Relaxed, guard);
            if hint.deref().placeholder {
                // Never replaced by a push; still owned here.
                drop(hint.into_owned());
            }
            let mut current = self.head.next.load(Ordering::Relaxed, guard);
            while !current.is_null() {
                let next = current.deref().next.load(Ordering::Relaxed, guard);
                drop(current.into_owned());
                current = next;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_on_empty_returns_none() {
        let queue = LinkedQueue::<usize>::new();
        assert_eq!(queue.left_pop(), None);
        assert_eq!(queue.right_peek(), None);
    }

    #[test]
    fn single_value_is_the_anchor() {
        let queue = LinkedQueue::new();
        queue.right_push(7);
        // The only user node is never popped.
        assert_eq!(queue.left_pop(), None);
        assert_eq!(queue.right_peek(), Some(7));
    }

    #[test]
    fn pops_come_out_in_push_order() {
        let queue = LinkedQueue::new();
        for value in 0..5 {
            queue.right_push(value);
        }
        for expected in 0..4 {
            assert_eq!(queue.left_pop(), Some(expected));
        }
        // Value 4 is the anchor now.
        assert_eq!(queue.left_pop(), None);
        assert_eq!(queue.right_peek(), Some(4));
    }

    #[test]
    fn peek_follows_the_latest_push() {
        let queue = LinkedQueue::new();
        queue.right_push("a");
        assert_eq!(queue.right_peek(), Some("a"));
        queue.right_push("b");
        assert_eq!(queue.right_peek(), Some("b"));
    }

    #[test]
    fn anchor_survives_balanced_push_pop_cycles() {
        let queue = LinkedQueue::new();
        for round in 0..3 {
            for value in 0..10 {
                queue.right_push(round * 10 + value);
            }
            for _ in 0..10 {
                if queue.left_pop().is_none() {
                    break;
                }
            }
        }
        // Exactly one value stays parked across every cycle.
        assert!(queue.right_peek().is_some());
        assert_eq!(queue.left_pop(), None);
    }

    #[test]
    fn drop_frees_remaining_nodes() {
        let queue = LinkedQueue::new();
        for value in 0..4 {
            queue.right_push(format!("value-{value}"));
        }
        queue.left_pop();
        drop(queue);
    }
}
