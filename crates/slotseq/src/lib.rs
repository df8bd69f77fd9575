//! Concurrent index-addressed containers.
//!
//! Two front-line collaborators sit on one storage core:
//!
//! - [`AppendVec`] — a concurrent growable vector: lock-free append with a
//!   stable index back, wait-free loads and atomic in-place updates at any
//!   returned index, ordered scans.
//! - [`Bag`] — a concurrent set with stable indices: adds return an index,
//!   deletes tombstone the slot and recycle the index through a lock-free
//!   free list, scans skip deleted slots.
//!
//! The core is exposed as well: [`Segment`] (bounded lock-free array),
//! [`Sequence`] (immutable descriptor chaining segments on a fixed capacity
//! schedule — 8, 16, 32, 64, 128, 256, 512, then 1024 forever), and
//! [`LinkedQueue`] (the free list). Growth never moves existing values:
//! a new descriptor shares every old segment and adds one larger tail, which
//! is what keeps indices stable without write serialization.
//!
//! Superseded envelopes, replaced descriptors, and popped free-list nodes
//! are reclaimed through `crossbeam-epoch`, so readers are never exposed to
//! freed memory and writers never block on readers.
//!
//! # Example
//!
//! ```
//! use slotseq::{AppendVec, Bag};
//!
//! let vec = AppendVec::new();
//! assert_eq!(vec.push("a"), 0);
//! assert_eq!(vec.push("b"), 1);
//! assert_eq!(vec.load(0), "a");
//!
//! let bag = Bag::new();
//! let index = bag.add(7);
//! bag.delete_at(index);
//! assert_eq!(bag.len(), 0);
//! ```
//!
//! # Length is a scan
//!
//! None of the containers maintain an element counter — `len` walks the
//! slots. A counter would put every writer back on one contended cache line,
//! which is exactly what the segmented design avoids; callers that need a
//! cheap count under mutation should track it themselves.

mod append_vec;
mod bag;
mod invariants;
mod queue;
mod segment;
mod sequence;

pub use append_vec::AppendVec;
pub use bag::Bag;
pub use queue::LinkedQueue;
pub use segment::Segment;
pub use sequence::{position, Sequence};
