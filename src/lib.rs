//! Cache-tuned, in-memory ordered maps with a compile-time shape.
//!
//! This crate provides two ordered map implementations built on the same
//! fixed-capacity node skeleton, meant for measuring how node layout and
//! search strategy affect real lookup and insert cost:
//!
//! - [`BTreeMap`] - a classic B-tree; key-value pairs live at every level
//!   and a lookup can stop at an internal node.
//! - [`BPlusTreeMap`] - a B+-tree; pairs live only in leaves, branches hold
//!   separator keys, and leaves may defer sorting until a split (the lazy
//!   policy).
//!
//! The shape is fixed at compile time: node capacities are `typenum`
//! parameters backing inline `generic-array` storage, and node search is a
//! zero-sized strategy type ([`Linear`], [`LinearBranchless`],
//! [`BinaryBranchless`], [`Dynamic`], and - for lazy leaves -
//! [`LinearLazy`]). Each combination monomorphises into a dedicated map, so
//! there is no dynamic dispatch anywhere on the hot path.
//!
//! # Quick start
//!
//! ```
//! use btree_lab::{BPlusTreeMap, PutOutcome};
//!
//! let mut map = BPlusTreeMap::<u64, &str>::new();
//! map.put(1, "one")?;
//! map.put(2, "two")?;
//! assert_eq!(map.put(2, "deux")?, PutOutcome::Replaced);
//!
//! assert_eq!(map.get(&2), Some(&"deux"));
//! assert_eq!(map.len(), 2);
//! # Ok::<(), btree_lab::TreeError>(())
//! ```
//!
//! # Tuning the shape
//!
//! ```
//! use btree_lab::{BPlusTreeMap, BinaryBranchless, LinearLazy};
//! use typenum::{U16, U32};
//!
//! // Wide leaves appended lazily, branches bisected branchlessly.
//! type HotMap = BPlusTreeMap<u64, u64, U32, U16, BinaryBranchless, LinearLazy>;
//!
//! let mut map = HotMap::new();
//! for k in 0..1000u64 {
//!     map.put(k, k * 2).unwrap();
//! }
//! assert_eq!(map.get(&999), Some(&1998));
//! ```
//!
//! # Allocators
//!
//! Every node is obtained from an [`allocator_api2`] allocator owned by the
//! map (`Global` by default; pass another via `new_in`). Allocation failure
//! is an ordinary error: a `put` that cannot reserve the nodes its splits
//! need returns [`TreeError::OutOfMemory`] and leaves the map untouched.
//!
//! # Scope
//!
//! These maps are insert-and-lookup structures: there is no deletion, no
//! range iteration, and no internal synchronisation. The `selfcheck` cargo
//! feature re-validates every structural invariant after each mutation,
//! which is invaluable under test and far too slow for measurement runs.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(any(feature = "std", test))]
extern crate std;

extern crate alloc;

mod common;
mod error;

/// The classic B-tree variant: key-value pairs at every level.
pub mod btree;
/// The B+-tree variant: key-value pairs only in leaves.
pub mod bptree;
/// Node search strategies, selected as map type parameters.
pub mod search;

#[cfg(test)]
pub(crate) mod test_alloc;

pub use bptree::BPlusTreeMap;
pub use btree::BTreeMap;
pub use error::TreeError;
pub use search::{
    BinaryBranchless, Dynamic, LeafSearch, Linear, LinearBranchless, LinearLazy, Search,
};

/// What a successful `put` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The key was absent; a new pair was stored and the map grew by one.
    Inserted,
    /// The key was present; its value was overwritten in place.
    Replaced,
}
