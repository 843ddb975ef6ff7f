use core::mem::MaybeUninit;
use core::ops::Add;
use core::slice;

use generic_array::sequence::GenericSequence;
use generic_array::{ArrayLength, GenericArray};
use typenum::{Sum, U1};

use crate::common::{self, InsertExt};

use super::ChildPtr;

/// A B+-tree branch: separator keys and child pointers, no values.
///
/// `key_count` separators partition `key_count + 1` children; the subtree
/// under child `i` holds keys in `(key[i-1], key[i]]`.
pub(crate) struct BranchNode<K, CB>
where
    CB: ArrayLength + Add<U1>,
    Sum<CB, U1>: ArrayLength,
{
    keys: GenericArray<MaybeUninit<K>, CB>,
    children: GenericArray<ChildPtr, Sum<CB, U1>>,
    key_count: u8,
}

impl<K, CB> BranchNode<K, CB>
where
    CB: ArrayLength + Add<U1>,
    Sum<CB, U1>: ArrayLength,
{
    pub(crate) fn empty() -> Self {
        BranchNode {
            keys: GenericArray::uninit(),
            children: GenericArray::generate(|_| ChildPtr::null()),
            key_count: 0,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        usize::from(self.key_count)
    }

    #[inline]
    pub(crate) fn is_full(&self) -> bool {
        self.len() == CB::USIZE
    }

    /// The live, sorted prefix of the separator array.
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

    /// Test hook: overwrite a separator in place, bypassing every ordering
    /// rule.
    #[cfg(test)]
    pub(crate) fn set_key(&mut self, i: usize, key: K) {
        assert!(i < self.len());
        // SAFETY: i < key_count, so the cell is initialised; assigning
        // through the reference drops the old key.
        unsafe {
            *self.keys[i].assume_init_mut() = key;
        }
    }

    pub(crate) fn child(&self, i: usize) -> ChildPtr {
        assert!(i <= self.len());
        self.children[i]
    }

    /// Shift-insert separator `key` at `ix` with `child` as its right
    /// child. The branch must have room.
    pub(crate) fn insert_at(&mut self, ix: usize, key: K, child: ChildPtr) {
        assert!(!self.is_full());
        let len = self.len();
        self.keys.insert(ix, len, key);
        self.children.insert(ix + 1, len + 1, child);
        self.key_count += 1;
    }

    /// Split a full branch and place the inbound separator, promoting the
    /// median of the combined run.
    ///
    /// The branch's `CB` separators and the inbound one form a virtual run
    /// of `CB + 1` ordered entries, with the inbound separator at its
    /// lower-bound index `ix`. The run's entry at `CB / 2` is promoted and
    /// returned, the entries below it stay in `self` and the entries above
    /// it move into `right` (an empty branch supplied by the caller), so
    /// both halves end with at least `CB / 2` separators. Unlike a leaf
    /// split the promoted separator is *moved* up: branches hold no data of
    /// their own, so nothing needs to stay behind. `child` is the inbound
    /// separator's right child and follows it.
    pub(crate) fn split_insert(
        &mut self,
        ix: usize,
        key: K,
        child: ChildPtr,
        right: &mut Self,
    ) -> K {
        assert!(self.is_full());
        assert_eq!(right.len(), 0);

        let c = CB::USIZE;
        let h = c / 2;

        if ix < h {
            // The inbound separator lands below the median, which is the
            // cell at h - 1 of the existing separators.
            let moved = c - h;
            // SAFETY: cells [h, c) are initialised and are not read as live
            // values from `self` again (key_count drops below h).
            unsafe {
                common::move_cells(&mut self.keys[h..], &mut right.keys, moved);
            }
            right.children[..moved + 1].copy_from_slice(&self.children[h..c + 1]);
            right.key_count = moved as u8;

            // SAFETY: cell h - 1 is initialised; ownership moves to the
            // caller and key_count is cut below it.
            let separator = unsafe { self.keys[h - 1].assume_init_read() };
            self.key_count = (h - 1) as u8;
            self.insert_at(ix, key, child);
            separator
        } else if ix == h {
            // The inbound separator is the median itself; its right child
            // leads the new sibling.
            let moved = c - h;
            // SAFETY: cells [h, c) are initialised and are not read as live
            // values from `self` again (key_count drops to h).
            unsafe {
                common::move_cells(&mut self.keys[h..], &mut right.keys, moved);
            }
            right.children[0] = child;
            right.children[1..moved + 1].copy_from_slice(&self.children[h + 1..c + 1]);
            right.key_count = moved as u8;
            self.key_count = h as u8;
            key
        } else {
            // The inbound separator lands above the median at h.
            let moved = c - h - 1;
            // SAFETY: cells [h + 1, c) are initialised and are not read as
            // live values from `self` again (key_count drops to h).
            unsafe {
                common::move_cells(&mut self.keys[h + 1..], &mut right.keys, moved);
            }
            right.children[..moved + 1].copy_from_slice(&self.children[h + 1..c + 1]);
            right.key_count = moved as u8;

            // SAFETY: cell h is initialised; ownership moves to the caller
            // and key_count is cut below it.
            let separator = unsafe { self.keys[h].assume_init_read() };
            self.key_count = h as u8;
            right.insert_at(ix - h - 1, key, child);
            separator
        }
    }

    /// Turn an empty branch into the root produced by a full-height split.
    pub(crate) fn init_root(&mut self, key: K, left: ChildPtr, right: ChildPtr) {
        assert_eq!(self.len(), 0);
        self.keys[0].write(key);
        self.children[0] = left;
        self.children[1] = right;
        self.key_count = 1;
    }

    /// Drop every live separator. Children are not touched; the caller
    /// walks them first.
    pub(crate) fn drop_contents(&mut self) {
        for i in 0..self.len() {
            // SAFETY: cells below `key_count` are initialised and dropped
            // exactly once here.
            unsafe {
                self.keys[i].assume_init_drop();
            }
        }
        self.key_count = 0;
    }
}
