//! The classic B-tree map: key-value pairs at every level.
//!
//! Because branches carry values, a lookup that hits a separator key
//! terminates at that branch instead of descending to a leaf, which is the
//! variant's main cache advantage for hot keys high in the tree. The cost is
//! wider branch nodes and a split that moves the median pair up a level.

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

#[cfg(test)]
mod tests;

use node::Node;

/// An ordered map backed by a B-tree with compile-time shape.
///
/// # Type parameters
///
/// - `K`: key type; `Ord` supplies the total order.
/// - `V`: value type.
/// - `C`: node capacity (keys per node), a `typenum` unsigned; must be in
///   `2..=255`.
/// - `BS`: lower-bound strategy for nodes above the leaf level.
/// - `LS`: lower-bound strategy for leaves. B-tree leaves are always kept
///   sorted, so only the sorted strategies apply here.
/// - `A`: the allocator every node is obtained from. The map owns it.
///
/// # Example
///
/// ```
/// use btree_lab::{BTreeMap, PutOutcome};
///
/// let mut map = BTreeMap::<u64, u64>::new();
/// assert_eq!(map.put(1, 10)?, PutOutcome::Inserted);
/// assert_eq!(map.put(1, 11)?, PutOutcome::Replaced);
/// assert_eq!(map.get(&1), Some(&11));
/// assert_eq!(map.len(), 1);
/// # Ok::<(), btree_lab::TreeError>(())
/// ```
pub struct BTreeMap<K, V, C = U8, BS = Linear, LS = Linear, A = Global>
where
    K: Ord,
    C: ArrayLength + Add<U1>,
    Sum<C, U1>: ArrayLength,
    BS: Search,
    LS: Search,
    A: Allocator,
{
    alloc: A,
    root: NonNull<Node<K, V, C>>,
    count: usize,
    depth: usize,
    _strategies: PhantomData<(BS, LS)>,
}

impl<K, V, C, BS, LS, A> BTreeMap<K, V, C, BS, LS, A>
where
    K: Ord,
    C: ArrayLength + Add<U1>,
    Sum<C, U1>: ArrayLength,
    BS: Search,
    LS: Search,
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
        assert!(C::USIZE >= 2, "node capacity must be at least 2");
        assert!(
            C::USIZE <= usize::from(u8::MAX),
            "key counts are stored in a single byte"
        );
        let root = common::alloc_node(&alloc, Node::empty())?;
        trace!("btree: created, capacity {}", C::USIZE);
        Ok(BTreeMap {
            alloc,
            root,
            count: 0,
            depth: 0,
            _strategies: PhantomData,
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
    /// # Errors
    ///
    /// Returns [`TreeError::OutOfMemory`] if a split cannot reserve its new
    /// nodes; the map is left unchanged in that case.
    pub fn put(&mut self, key: K, value: V) -> Result<PutOutcome, TreeError> {
        let mut stack: SmallVec<[(NonNull<Node<K, V, C>>, usize); MAX_DEPTH]> = SmallVec::new();
        let mut current = self.root;
        let ix = loop {
            // SAFETY: `current` points at a live node owned by this map and
            // no other reference to it exists.
            let node = unsafe { current.as_mut() };
            let (ix, found) = if node.is_leaf() {
                <LS as LeafSearch>::find(node.keys(), &key)
            } else {
                <BS as LeafSearch>::find(node.keys(), &key)
            };
            if found {
                node.set_value(ix, value);
                return Ok(PutOutcome::Replaced);
            }
            if node.is_leaf() {
                break ix;
            }
            stack.push((current, ix));
            current = node.child(ix).expect("branch child below key_count");
        };

        // SAFETY: `current` is the leaf the descent ended on; the loop
        // borrow has ended.
        let leaf = unsafe { current.as_mut() };
        if !leaf.is_full() {
            leaf.insert_at(ix, key, value, None);
            self.count += 1;
            self.post_mutation_check();
            return Ok(PutOutcome::Inserted);
        }

        // The full leaf splits, and the split ripples through every full
        // ancestor on the recorded path. Reserve the sibling for each split
        // (and the root, when the run reaches it) before touching any node,
        // so an allocation failure leaves the map exactly as it was.
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
        let mut pool: SmallVec<[NonNull<Node<K, V, C>>; MAX_DEPTH]> = SmallVec::new();
        for _ in 0..splits + usize::from(grows_root) {
            match common::alloc_node(&self.alloc, Node::empty()) {
                Ok(ptr) => pool.push(ptr),
                Err(e) => {
                    for ptr in pool {
                        // SAFETY: reserved above, still empty, unlinked.
                        unsafe { common::dealloc_node(&self.alloc, ptr) };
                    }
                    return Err(e);
                }
            }
        }
        trace!("btree: splitting {splits} node(s), grows root: {grows_root}");

        let mut right = pool.pop().expect("one reserved node per split");
        // SAFETY: fresh pool node, not aliased.
        let (mut sep_key, mut sep_value) =
            leaf.split_insert(ix, key, value, None, unsafe { right.as_mut() });

        while let Some((mut anc, aix)) = stack.pop() {
            // SAFETY: recorded ancestor, live and distinct from every node
            // borrowed so far in this call.
            let parent = unsafe { anc.as_mut() };
            if !parent.is_full() {
                parent.insert_at(aix, sep_key, sep_value, Some(right));
                self.count += 1;
                self.post_mutation_check();
                return Ok(PutOutcome::Inserted);
            }
            let mut new_right = pool.pop().expect("one reserved node per split");
            // SAFETY: fresh pool node, not aliased.
            let (k, v) = parent.split_insert(aix, sep_key, sep_value, Some(right), unsafe {
                new_right.as_mut()
            });
            sep_key = k;
            sep_value = v;
            right = new_right;
        }

        let mut new_root = pool.pop().expect("reserved node for the new root");
        // SAFETY: fresh pool node, not aliased.
        unsafe { new_root.as_mut() }.init_root(sep_key, sep_value, self.root, right);
        self.root = new_root;
        self.depth += 1;
        self.count += 1;
        trace!("btree: depth grew to {}", self.depth);
        self.post_mutation_check();
        Ok(PutOutcome::Inserted)
    }

    /// Look up `key`, returning a reference to its current value.
    ///
    /// A branch hit returns without descending further.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut current = self.root;
        loop {
            // SAFETY: live node owned by this map; shared access only.
            let node = unsafe { current.as_ref() };
            let (ix, found) = if node.is_leaf() {
                <LS as LeafSearch>::find(node.keys(), key)
            } else {
                <BS as LeafSearch>::find(node.keys(), key)
            };
            if found {
                return Some(node.value_at(ix));
            }
            if node.is_leaf() {
                return None;
            }
            current = node.child(ix).expect("branch child below key_count");
        }
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Walk the whole tree and assert every structural invariant: key
    /// ordering inside nodes, separator bounds over children, minimum fill
    /// below the root, uniform leaf level, and the pair count.
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
        ptr: NonNull<Node<K, V, C>>,
        level: usize,
        lower: Option<&K>,
        upper: Option<&K>,
        is_root: bool,
    ) -> usize {
        // SAFETY: every pointer reachable from the root is a live node of
        // this map; traversal is shared.
        let node = unsafe { ptr.as_ref() };

        assert!(node.len() <= C::USIZE, "key_count exceeds capacity");
        let min_fill = if is_root {
            // A root branch always keeps the key its split promoted.
            usize::from(level > 0)
        } else {
            C::USIZE / 2
        };
        assert!(node.len() >= min_fill, "node below minimum fill");
        if level == 0 {
            assert!(node.is_leaf(), "non-leaf found at leaf level");
        } else {
            assert!(!node.is_leaf(), "leaf found above leaf level");
        }

        let keys = node.keys();
        for pair in keys.windows(2) {
            assert!(pair[0] < pair[1], "node keys out of order");
        }
        if let (Some(lo), Some(first)) = (lower, keys.first()) {
            assert!(lo < first, "key at or below the left separator");
        }
        if let (Some(hi), Some(last)) = (upper, keys.last()) {
            assert!(last < hi, "key at or above the right separator");
        }

        let mut total = node.len();
        if level > 0 {
            for i in 0..=node.len() {
                let child = node.child(i);
                assert!(child.is_some(), "branch child slot empty");
                let lo = if i == 0 { lower } else { Some(node.key_at(i - 1)) };
                let hi = if i == node.len() {
                    upper
                } else {
                    Some(node.key_at(i))
                };
                total += self.validate_node(child.unwrap(), level - 1, lo, hi, false);
            }
        } else {
            for i in 0..=node.len() {
                assert!(node.child(i).is_none(), "leaf owns a child");
            }
        }
        total
    }

    #[inline]
    fn post_mutation_check(&self) {
        #[cfg(feature = "selfcheck")]
        self.validate();
    }
}

#[cfg(feature = "std")]
impl<K, V, C, BS, LS, A> BTreeMap<K, V, C, BS, LS, A>
where
    K: Ord + Debug,
    V: Debug,
    C: ArrayLength + Add<U1>,
    Sum<C, U1>: ArrayLength,
    BS: Search,
    LS: Search,
    A: Allocator,
{
    /// Write an indented structural dump, one node per line, children
    /// indented below their parent. Diagnostic output only.
    pub fn print<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        self.print_node(self.root, 0, out)
    }

    fn print_node<W: Write>(
        &self,
        ptr: NonNull<Node<K, V, C>>,
        indent: usize,
        out: &mut W,
    ) -> std::io::Result<()> {
        // SAFETY: live node owned by this map; shared access only.
        let node = unsafe { ptr.as_ref() };
        write!(out, "{:indent$}", "")?;
        write!(out, "{}", if node.is_leaf() { "leaf" } else { "node" })?;
        for i in 0..node.len() {
            write!(out, " {:?}={:?}", node.key_at(i), node.value_at(i))?;
        }
        writeln!(out)?;
        if !node.is_leaf() {
            for i in 0..=node.len() {
                self.print_node(node.child(i).unwrap(), indent + 2, out)?;
            }
        }
        Ok(())
    }
}

impl<K, V, C, BS, LS, A> Default for BTreeMap<K, V, C, BS, LS, A>
where
    K: Ord,
    C: ArrayLength + Add<U1>,
    Sum<C, U1>: ArrayLength,
    BS: Search,
    LS: Search,
    A: Allocator + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, C, BS, LS, A> Drop for BTreeMap<K, V, C, BS, LS, A>
where
    K: Ord,
    C: ArrayLength + Add<U1>,
    Sum<C, U1>: ArrayLength,
    BS: Search,
    LS: Search,
    A: Allocator,
{
    fn drop(&mut self) {
        // SAFETY: the root subtree is owned by this map and never touched
        // again.
        unsafe { Node::drop_subtree(self.root, &self.alloc) };
    }
}
