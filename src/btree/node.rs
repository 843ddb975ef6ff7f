use core::mem::MaybeUninit;
use core::ops::Add;
use core::ptr::NonNull;
use core::slice;

use allocator_api2::alloc::Allocator;
use generic_array::sequence::GenericSequence;
use generic_array::{ArrayLength, GenericArray};
use typenum::{Sum, U1};

use crate::common::{self, InsertExt};

pub(crate) type ChildSlot<K, V, C> = Option<NonNull<Node<K, V, C>>>;

type Keys<K, C> = GenericArray<MaybeUninit<K>, C>;
type Values<V, C> = GenericArray<MaybeUninit<V>, C>;
type Children<K, V, C> = GenericArray<ChildSlot<K, V, C>, Sum<C, U1>>;

/// A B-tree node. Every node carries key-value pairs; a node is a leaf
/// exactly when its child slots are empty, so no tag is stored.
///
/// The key and value arrays are inline and fixed at `C` cells; only the
/// first `key_count` cells of each are initialised. `key_count` is a single
/// byte, which caps `C` at 255.
pub(crate) struct Node<K, V, C>
where
    C: ArrayLength + Add<U1>,
    Sum<C, U1>: ArrayLength,
{
    keys: Keys<K, C>,
    values: Values<V, C>,
    children: Children<K, V, C>,
    key_count: u8,
}

impl<K, V, C> Node<K, V, C>
where
    C: ArrayLength + Add<U1>,
    Sum<C, U1>: ArrayLength,
{
    pub(crate) fn empty() -> Self {
        Node {
            keys: GenericArray::uninit(),
            values: GenericArray::uninit(),
            children: GenericArray::generate(|_| None),
            key_count: 0,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        usize::from(self.key_count)
    }

    #[inline]
    pub(crate) fn is_full(&self) -> bool {
        self.len() == C::USIZE
    }

    #[inline]
    pub(crate) fn is_leaf(&self) -> bool {
        self.children[self.len()].is_none()
    }

    /// The live, sorted prefix of the key array.
    #[inline]
    pub(crate) fn keys(&self) -> &[K] {
        // SAFETY: the first `key_count` cells are initialised.
        unsafe { slice::from_raw_parts(self.keys.as_ptr().cast::<K>(), self.len()) }
    }

    pub(crate) fn key_at(&self, i: usize) -> &K {
        assert!(i < self.len());
        // SAFETY: i < key_count, so the cell is initialised.
        unsafe { self.keys[i].assume_init_ref() }
    }

    pub(crate) fn value_at(&self, i: usize) -> &V {
        assert!(i < self.len());
        // SAFETY: i < key_count, so the cell is initialised.
        unsafe { self.values[i].assume_init_ref() }
    }

    /// Test hook: overwrite a key in place, bypassing every ordering rule.
    #[cfg(test)]
    pub(crate) fn set_key(&mut self, i: usize, key: K) {
        assert!(i < self.len());
        // SAFETY: i < key_count, so the cell is initialised; assigning
        // through the reference drops the old key.
        unsafe {
            *self.keys[i].assume_init_mut() = key;
        }
    }

    /// Overwrite the value at `i`, dropping the previous one.
    pub(crate) fn set_value(&mut self, i: usize, value: V) {
        assert!(i < self.len());
        // SAFETY: i < key_count, so the cell is initialised; assigning
        // through the reference drops the old value.
        unsafe {
            *self.values[i].assume_init_mut() = value;
        }
    }

    pub(crate) fn child(&self, i: usize) -> ChildSlot<K, V, C> {
        assert!(i <= self.len());
        self.children[i]
    }

    /// Shift-insert `key`/`value` at `ix` with `child` as the new entry's
    /// right child. The node must have room.
    pub(crate) fn insert_at(&mut self, ix: usize, key: K, value: V, child: ChildSlot<K, V, C>) {
        assert!(!self.is_full());
        let len = self.len();
        self.keys.insert(ix, len, key);
        self.values.insert(ix, len, value);
        self.children.insert(ix + 1, len + 1, child);
        self.key_count += 1;
    }

    /// Split a full node and place the inbound entry, promoting the median
    /// of the combined run.
    ///
    /// The node's `C` pairs and the inbound pair form a virtual run of
    /// `C + 1` ordered entries, with the inbound pair at its lower-bound
    /// index `ix`. The run's entry at `C / 2` is promoted and returned, the
    /// entries below it stay in `self` and the entries above it move into
    /// `right` (an empty node supplied by the caller), so both halves end
    /// with at least `C / 2` pairs. `child` is the inbound entry's right
    /// child and follows it.
    pub(crate) fn split_insert(
        &mut self,
        ix: usize,
        key: K,
        value: V,
        child: ChildSlot<K, V, C>,
        right: &mut Self,
    ) -> (K, V) {
        assert!(self.is_full());
        assert_eq!(right.len(), 0);

        let c = C::USIZE;
        let h = c / 2;
        let branch = !self.is_leaf();

        if ix < h {
            // The inbound entry lands below the median, which is the pair
            // at h - 1 of the existing cells.
            let moved = c - h;
            // SAFETY: cells [h, c) are initialised and are not read as live
            // values from `self` again (key_count drops below h).
            unsafe {
                common::move_cells(&mut self.keys[h..], &mut right.keys, moved);
                common::move_cells(&mut self.values[h..], &mut right.values, moved);
            }
            if branch {
                right.children[..moved + 1].copy_from_slice(&self.children[h..c + 1]);
            }
            right.key_count = moved as u8;

            // SAFETY: cell h - 1 is initialised; ownership moves to the
            // caller and key_count is cut below it.
            let sep_key = unsafe { self.keys[h - 1].assume_init_read() };
            // SAFETY: as above.
            let sep_value = unsafe { self.values[h - 1].assume_init_read() };
            self.key_count = (h - 1) as u8;
            self.insert_at(ix, key, value, child);
            (sep_key, sep_value)
        } else if ix == h {
            // The inbound entry is the median itself; its right child
            // leads the new sibling.
            let moved = c - h;
            // SAFETY: cells [h, c) are initialised and are not read as live
            // values from `self` again (key_count drops to h).
            unsafe {
                common::move_cells(&mut self.keys[h..], &mut right.keys, moved);
                common::move_cells(&mut self.values[h..], &mut right.values, moved);
            }
            if branch {
                right.children[0] = child;
                right.children[1..moved + 1].copy_from_slice(&self.children[h + 1..c + 1]);
            }
            right.key_count = moved as u8;
            self.key_count = h as u8;
            (key, value)
        } else {
            // The inbound entry lands above the median at h.
            let moved = c - h - 1;
            // SAFETY: cells [h + 1, c) are initialised and are not read as
            // live values from `self` again (key_count drops to h).
            unsafe {
                common::move_cells(&mut self.keys[h + 1..], &mut right.keys, moved);
                common::move_cells(&mut self.values[h + 1..], &mut right.values, moved);
            }
            if branch {
                right.children[..moved + 1].copy_from_slice(&self.children[h + 1..c + 1]);
            }
            right.key_count = moved as u8;

            // SAFETY: cell h is initialised; ownership moves to the caller
            // and key_count is cut below it.
            let sep_key = unsafe { self.keys[h].assume_init_read() };
            // SAFETY: as above.
            let sep_value = unsafe { self.values[h].assume_init_read() };
            self.key_count = h as u8;
            right.insert_at(ix - h - 1, key, value, child);
            (sep_key, sep_value)
        }
    }

    /// Turn an empty node into the root produced by a full-height split.
    pub(crate) fn init_root(
        &mut self,
        key: K,
        value: V,
        left: NonNull<Self>,
        right: NonNull<Self>,
    ) {
        assert_eq!(self.len(), 0);
        self.keys[0].write(key);
        self.values[0].write(value);
        self.children[0] = Some(left);
        self.children[1] = Some(right);
        self.key_count = 1;
    }

    /// Drop every pair in the subtree and release its nodes.
    ///
    /// # Safety
    ///
    /// `ptr` must own a live subtree allocated from `alloc`, and must not be
    /// used again.
    pub(crate) unsafe fn drop_subtree<A: Allocator>(mut ptr: NonNull<Self>, alloc: &A) {
        // SAFETY: `ptr` is live and uniquely owned per the contract.
        let node = unsafe { ptr.as_mut() };
        for i in 0..=node.len() {
            if let Some(child) = node.children[i] {
                // SAFETY: child slots below `key_count` own live subtrees
                // from the same allocator.
                unsafe { Self::drop_subtree(child, alloc) };
            }
        }
        for i in 0..node.len() {
            // SAFETY: cells below `key_count` are initialised and dropped
            // exactly once here.
            unsafe {
                node.keys[i].assume_init_drop();
                node.values[i].assume_init_drop();
            }
        }
        // SAFETY: allocated by `alloc_node` with the same allocator; all
        // live contents were dropped above.
        unsafe { common::dealloc_node(alloc, ptr) };
    }
}
