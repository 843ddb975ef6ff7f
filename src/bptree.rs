//! The B+-tree map: key-value pairs only in leaves.
//!
//! Branches carry separator keys and child pointers and nothing else, so
//! they pack far more fan-out per cache line than B-tree branches; every
//! lookup runs to a leaf. Leaf and branch fan-outs are tuned independently,
//! and leaves can defer sorting until a split forces it (the lazy policy,
//! selected through the [`LinearLazy`](crate::LinearLazy) leaf strategy).

use core::borrow::Borrow;
use core::marker::PhantomData;
use core::ops::Add;
use core::ptr::NonNull;

#[cfg(feature = "std")]
use core::fmt::Debug;
#[cfg(feature = "std")]
use std::io::Write;

use allocator_api2::alloc::{Allocator, Global};
use generic_array::ArrayLength;
use log::trace;
use smallvec::SmallVec;
use typenum::{Sum, U1, U8};

use crate::common::{self, MAX_DEPTH};
use crate::error::TreeError;
use crate::search::{LeafSearch, Linear, Search};
use crate::PutOutcome;

mod node;


use node::{BranchNode, ChildPtr, LeafNode};

/// An ordered map backed by a B+-tree with compile-time shape.
///
/// # Type parameters
///
/// - `K`: key type; `Ord` supplies the total order, and `Clone` lets leaf
///   splits copy their separator into the parent while the key stays live
///   in the leaf.
/// - `V`: value type.
/// - `CL` / `CB`: leaf and branch capacities, `typenum` unsigneds in
///   `2..=255`.
/// - `BS`: lower-bound strategy for branches.
/// - `LS`: leaf strategy. Picking [`LinearLazy`](crate::LinearLazy) switches
///   the leaves to lazy ordering: inserts append, lookups scan, and leaves
///   sort themselves only when a split needs the order.
/// - `A`: the allocator every node is obtained from. The map owns it.
///
/// # Example
///
/// ```
/// use btree_lab::{BPlusTreeMap, PutOutcome};
///
/// let mut map = BPlusTreeMap::<u64, u64>::new();
/// assert_eq!(map.put(1, 10)?, PutOutcome::Inserted);
/// assert_eq!(map.put(1, 11)?, PutOutcome::Replaced);
/// assert_eq!(map.get(&1), Some(&11));
/// assert_eq!(map.len(), 1);
/// # Ok::<(), btree_lab::TreeError>(())
/// ```
pub struct BPlusTreeMap<K, V, CL = U8, CB = U8, BS = Linear, LS = Linear, A = Global>
where
    K: Ord + Clone,
    CL: ArrayLength,
    CB: ArrayLength + Add<U1>,
    Sum<CB, U1>: ArrayLength,
    BS: Search,
    LS: LeafSearch,
    A: Allocator,
{
    alloc: A,
    root: ChildPtr,
    count: usize,
    depth: usize,
    _shape: PhantomData<(K, V, CL, CB, BS, LS)>,
}

impl<K, V, CL, CB, BS, LS, A> BPlusTreeMap<K, V, CL, CB, BS, LS, A>
where
    K: Ord + Clone,
    CL: ArrayLength,
    CB: ArrayLength + Add<U1>,
    Sum<CB, U1>: ArrayLength,
    BS: Search,
    LS: LeafSearch,
    A: Allocator,
{
    /// Create an empty map using the allocator's default value.
    ///
    /// # Panics
    ///
    /// Panics if allocating the root leaf fails.
    pub fn new() -> Self
    where
        A: Default,
    {
        Self::new_in(A::default()).expect("failed to allocate the root leaf")
    }

    /// Create an empty map owning `alloc`. The map starts as a single empty
    /// leaf at depth 0.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::OutOfMemory`] if the root leaf cannot be
    /// allocated.
    pub fn new_in(alloc: A) -> Result<Self, TreeError> {
        assert!(CL::USIZE >= 2, "leaf capacity must be at least 2");
        assert!(CB::USIZE >= 2, "branch capacity must be at least 2");
        assert!(
            CL::USIZE <= usize::from(u8::MAX) && CB::USIZE <= usize::from(u8::MAX),
            "key counts are stored in a single byte"
        );
        let root = common::alloc_node(&alloc, LeafNode::<K, V, CL>::empty())?;
        trace!(
            "bptree: created, leaf capacity {}, branch capacity {}",
            CL::USIZE,
            CB::USIZE
        );
        Ok(BPlusTreeMap {
            alloc,
            root: ChildPtr::from_leaf(root),
            count: 0,
            depth: 0,
            _shape: PhantomData,
        })
    }

    /// Number of distinct keys currently stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of branch levels above the leaves; 0 means the root is a
    /// leaf.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Insert `key`/`value`, or overwrite the value if the key is present.
    ///
    /// Branches are never consulted for equality: the descent always runs
    /// to a leaf, and only the leaf decides between insert and overwrite.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::OutOfMemory`] if a split cannot reserve its new
    /// nodes; the map is left unchanged in that case.
    pub fn put(&mut self, key: K, value: V) -> Result<PutOutcome, TreeError> {
        let mut stack: SmallVec<[(NonNull<BranchNode<K, CB>>, usize); MAX_DEPTH]> =
            SmallVec::new();
        let mut current = self.root;
        for _ in 0..self.depth {
            // SAFETY: nodes above the leaf level carry the branch tag and
            // are live; no other reference to them exists.
            let branch = unsafe { current.as_branch_mut::<K, CB>() };
            let ix = BS::lower_bound(branch.keys(), &key);
            stack.push((current.branch_ptr(), ix));
            current = branch.child(ix);
        }

        // SAFETY: after `depth` branch hops the pointer is leaf-tagged and
        // live.
        let leaf = unsafe { current.as_leaf_mut::<K, V, CL>() };
        let (ix, found) = LS::find(leaf.keys(), &key);
        if found {
            leaf.set_value(ix, value);
            return Ok(PutOutcome::Replaced);
        }
        if !leaf.is_full() {
            if LS::SORTED {
                leaf.insert_at(ix, key, value);
            } else {
                leaf.push(key, value);
            }
            self.count += 1;
            self.post_mutation_check();
            return Ok(PutOutcome::Inserted);
        }

        // The full leaf splits, and the split ripples through every full
        // ancestor on the recorded path. Reserve the new sibling for each
        // split (and the root, when the run reaches it) before touching any
        // node, so an allocation failure leaves the map exactly as it was.
        let mut splits = 1usize;
        for (anc, _) in stack.iter().rev() {
            // SAFETY: ancestor pointers recorded during descent are live
            // and all distinct.
            if unsafe { anc.as_ref() }.is_full() {
                splits += 1;
            } else {
                break;
            }
        }
        let grows_root = splits == stack.len() + 1;
        let new_branches = splits - 1 + usize::from(grows_root);

        let right_leaf = common::alloc_node(&self.alloc, LeafNode::<K, V, CL>::empty())?;
        let mut branch_pool: SmallVec<[NonNull<BranchNode<K, CB>>; MAX_DEPTH]> = SmallVec::new();
        for _ in 0..new_branches {
            match common::alloc_node(&self.alloc, BranchNode::<K, CB>::empty()) {
                Ok(ptr) => branch_pool.push(ptr),
                Err(e) => {
                    for ptr in branch_pool {
                        // SAFETY: reserved above, still empty, unlinked.
                        unsafe { common::dealloc_node(&self.alloc, ptr) };
                    }
                    // SAFETY: as above.
                    unsafe { common::dealloc_node(&self.alloc, right_leaf) };
                    return Err(e);
                }
            }
        }
        trace!("bptree: splitting {splits} node(s), grows root: {grows_root}");

        // A lazy leaf sorts itself before any split. Its equality scan
        // produced no insertion index either way, so recompute the lower
        // bound against the sorted arrangement.
        let ix = if LS::SORTED {
            ix
        } else {
            if !leaf.is_sorted() {
                leaf.sort_pairs();
            }
            Linear::lower_bound(leaf.keys(), &key)
        };

        let mut right_leaf = right_leaf;
        // SAFETY: fresh pool node, not aliased.
        let mut sep_key = leaf.split_insert(ix, key, value, unsafe { right_leaf.as_mut() });
        let mut right_child = ChildPtr::from_leaf(right_leaf);

        while let Some((mut anc, aix)) = stack.pop() {
            // SAFETY: recorded ancestor, live and distinct from every node
            // borrowed so far in this call.
            let parent = unsafe { anc.as_mut() };
            if !parent.is_full() {
                parent.insert_at(aix, sep_key, right_child);
                self.count += 1;
                self.post_mutation_check();
                return Ok(PutOutcome::Inserted);
            }
            let mut new_right = branch_pool.pop().expect("one reserved branch per split");
            // SAFETY: fresh pool node, not aliased.
            sep_key = parent.split_insert(aix, sep_key, right_child, unsafe {
                new_right.as_mut()
            });
            right_child = ChildPtr::from_branch(new_right);
        }

        let mut new_root = branch_pool.pop().expect("reserved branch for the new root");
        // SAFETY: fresh pool node, not aliased.
        unsafe { new_root.as_mut() }.init_root(sep_key, self.root, right_child);
        self.root = ChildPtr::from_branch(new_root);
        self.depth += 1;
        self.count += 1;
        trace!("bptree: depth grew to {}", self.depth);
        self.post_mutation_check();
        Ok(PutOutcome::Inserted)
    }

    /// Look up `key`, returning a reference to its current value.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut current = self.root;
        for _ in 0..self.depth {
            // SAFETY: nodes above the leaf level carry the branch tag and
            // are live; shared access only.
            let branch = unsafe { current.as_branch::<K, CB>() };
            current = branch.child(BS::lower_bound(branch.keys(), key));
        }
        // SAFETY: after `depth` branch hops the pointer is leaf-tagged and
        // live; shared access only.
        let leaf = unsafe { current.as_leaf::<K, V, CL>() };
        let (ix, found) = LS::find(leaf.keys(), key);
        found.then(|| leaf.value_at(ix))
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Walk the whole tree and assert every structural invariant: key
    /// ordering (or distinctness, for unsorted lazy leaves), separator
    /// bounds over children, minimum fill below the root, uniform leaf
    /// level, and the pair count.
    ///
    /// # Panics
    ///
    /// Panics on the first violation found.
    pub fn validate(&self) {
        let total = self.validate_node(self.root, self.depth, None, None, true);
        assert_eq!(
            total, self.count,
            "live pair count disagrees with the map counter"
        );
    }

    fn validate_node(
        &self,
        ptr: ChildPtr,
        level: usize,
        lower: Option<&K>,
        upper: Option<&K>,
        is_root: bool,
    ) -> usize {
        if level > 0 {
            assert!(ptr.is_branch(), "leaf found above leaf level");
            // SAFETY: branch-tagged pointers reachable from the root are
            // live branches of this map; traversal is shared.
            let branch = unsafe { ptr.as_branch::<K, CB>() };
            assert!(branch.len() <= CB::USIZE, "key_count exceeds capacity");
            let min_fill = if is_root { 1 } else { CB::USIZE / 2 };
            assert!(branch.len() >= min_fill, "branch below minimum fill");

            let keys = branch.keys();
            for pair in keys.windows(2) {
                assert!(pair[0] < pair[1], "branch separators out of order");
            }
            if let (Some(lo), Some(first)) = (lower, keys.first()) {
                assert!(lo < first, "separator at or below the left bound");
            }
            if let (Some(hi), Some(last)) = (upper, keys.last()) {
                assert!(last < hi, "separator at or above the right bound");
            }

            let mut total = 0;
            for i in 0..=branch.len() {
                let lo = if i == 0 {
                    lower
                } else {
                    Some(branch.key_at(i - 1))
                };
                let hi = if i == branch.len() {
                    upper
                } else {
                    Some(branch.key_at(i))
                };
                total += self.validate_node(branch.child(i), level - 1, lo, hi, false);
            }
            total
        } else {
            assert!(!ptr.is_branch(), "branch found at leaf level");
            // SAFETY: leaf-tagged pointers reachable from the root are live
            // leaves of this map; traversal is shared.
            let leaf = unsafe { ptr.as_leaf::<K, V, CL>() };
            assert!(leaf.len() <= CL::USIZE, "key_count exceeds capacity");
            let min_fill = if is_root { 0 } else { CL::USIZE / 2 };
            assert!(leaf.len() >= min_fill, "leaf below minimum fill");
            if LS::SORTED {
                assert!(leaf.is_sorted(), "strict leaf lost its sorted flag");
            }

            let keys = leaf.keys();
            if leaf.is_sorted() {
                for pair in keys.windows(2) {
                    assert!(pair[0] < pair[1], "leaf keys out of order");
                }
            } else {
                for (i, a) in keys.iter().enumerate() {
                    for b in &keys[i + 1..] {
                        assert!(a != b, "duplicate key in lazy leaf");
                    }
                }
            }
            for k in keys {
                if let Some(lo) = lower {
                    assert!(lo < k, "leaf key at or below the left separator");
                }
                if let Some(hi) = upper {
                    assert!(k <= hi, "leaf key above the right separator");
                }
            }
            leaf.len()
        }
    }

    #[inline]
    fn post_mutation_check(&self) {
        #[cfg(feature = "selfcheck")]
        self.validate();
    }
}

#[cfg(feature = "std")]
impl<K, V, CL, CB, BS, LS, A> BPlusTreeMap<K, V, CL, CB, BS, LS, A>
where
    K: Ord + Clone + Debug,
    V: Debug,
    CL: ArrayLength,
    CB: ArrayLength + Add<U1>,
    Sum<CB, U1>: ArrayLength,
    BS: Search,
    LS: LeafSearch,
    A: Allocator,
{
    /// Write an indented structural dump, one node per line, children
    /// indented below their parent. Branches show separators only; leaves
    /// show their pairs. Diagnostic output only.
    pub fn print<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        self.print_node(self.root, self.depth, 0, out)
    }

    fn print_node<W: Write>(
        &self,
        ptr: ChildPtr,
        level: usize,
        indent: usize,
        out: &mut W,
    ) -> std::io::Result<()> {
        if level > 0 {
            // SAFETY: live branch of this map; shared access only.
            let branch = unsafe { ptr.as_branch::<K, CB>() };
            write!(out, "{:indent$}branch", "")?;
            for i in 0..branch.len() {
                write!(out, " {:?}", branch.key_at(i))?;
            }
            writeln!(out)?;
            for i in 0..=branch.len() {
                self.print_node(branch.child(i), level - 1, indent + 2, out)?;
            }
        } else {
            // SAFETY: live leaf of this map; shared access only.
            let leaf = unsafe { ptr.as_leaf::<K, V, CL>() };
            write!(out, "{:indent$}leaf", "")?;
            if !leaf.is_sorted() {
                write!(out, " (unsorted)")?;
            }
            for i in 0..leaf.len() {
                write!(out, " {:?}={:?}", leaf.key_at(i), leaf.value_at(i))?;
            }
            writeln!(out)?;
        }
        Ok(())
    }
}

impl<K, V, CL, CB, BS, LS, A> Default for BPlusTreeMap<K, V, CL, CB, BS, LS, A>
where
    K: Ord + Clone,
    CL: ArrayLength,
    CB: ArrayLength + Add<U1>,
    Sum<CB, U1>: ArrayLength,
    BS: Search,
    LS: LeafSearch,
    A: Allocator + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, CL, CB, BS, LS, A> Drop for BPlusTreeMap<K, V, CL, CB, BS, LS, A>
where
    K: Ord + Clone,
    CL: ArrayLength,
    CB: ArrayLength + Add<U1>,
    Sum<CB, U1>: ArrayLength,
    BS: Search,
    LS: LeafSearch,
    A: Allocator,
{
    fn drop(&mut self) {
        // SAFETY: the root subtree is owned by this map and never touched
        // again.
        unsafe { node::drop_subtree::<K, V, CL, CB, A>(self.root, &self.alloc) };
    }
}
