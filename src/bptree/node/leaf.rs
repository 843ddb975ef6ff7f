use core::mem::MaybeUninit;
use core::slice;

use generic_array::{ArrayLength, GenericArray};

use crate::common::{self, InsertExt};

/// A B+-tree leaf: the only node kind that owns key-value pairs.
///
/// `sorted` records whether the live prefix is currently in key order. Under
/// strict leaf policies it never becomes false; under the lazy policy
/// inserts append and clear it, and the leaf is re-sorted in place before it
/// is ever split.
///
/// Nodes are at least 2-aligned so the low bit of a child pointer can carry
/// the branch tag.
#[repr(align(2))]
pub(crate) struct LeafNode<K, V, CL: ArrayLength> {
    keys: GenericArray<MaybeUninit<K>, CL>,
    values: GenericArray<MaybeUninit<V>, CL>,
    key_count: u8,
    sorted: bool,
}

impl<K, V, CL: ArrayLength> LeafNode<K, V, CL> {
    pub(crate) fn empty() -> Self {
        LeafNode {
            keys: GenericArray::uninit(),
            values: GenericArray::uninit(),
            key_count: 0,
            sorted: true,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        usize::from(self.key_count)
    }

    #[inline]
    pub(crate) fn is_full(&self) -> bool {
        self.len() == CL::USIZE
    }

    #[inline]
    pub(crate) fn is_sorted(&self) -> bool {
        self.sorted
    }

    /// The live prefix of the key array. Sorted only if
    /// [`is_sorted`](Self::is_sorted) says so.
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

    /// Shift-insert at `ix`, keeping the leaf sorted. The leaf must be
    /// sorted already and have room.
    pub(crate) fn insert_at(&mut self, ix: usize, key: K, value: V) {
        assert!(!self.is_full());
        debug_assert!(self.sorted);
        let len = self.len();
        self.keys.insert(ix, len, key);
        self.values.insert(ix, len, value);
        self.key_count += 1;
    }

    /// Append at the tail without ordering; the lazy insert path. Existing
    /// order, if any, is forfeited.
    pub(crate) fn push(&mut self, key: K, value: V) {
        assert!(!self.is_full());
        let len = self.len();
        self.keys[len].write(key);
        self.values[len].write(value);
        self.key_count += 1;
        self.sorted = false;
    }

    /// Sort the live prefix in place, keys and values in tandem. Insertion
    /// sort: the prefix is at most `CL` cells.
    pub(crate) fn sort_pairs(&mut self)
    where
        K: Ord,
    {
        let n = self.len();
        for i in 1..n {
            let mut j = i;
            // SAFETY: cells below `key_count` are initialised; swapping
            // whole cells keeps them so.
            while j > 0
                && unsafe { self.keys[j].assume_init_ref() < self.keys[j - 1].assume_init_ref() }
            {
                self.keys.swap(j - 1, j);
                self.values.swap(j - 1, j);
                j -= 1;
            }
        }
        self.sorted = true;
    }

    /// Split a full, sorted leaf and place the inbound pair.
    ///
    /// Cells from `CL / 2` upward move into `right` (an empty leaf supplied
    /// by the caller); the separator is a *copy* of the last key left
    /// behind, so it stays addressable through this leaf. `ix` is the
    /// inbound key's lower-bound index and selects its half.
    pub(crate) fn split_insert(&mut self, ix: usize, key: K, value: V, right: &mut Self) -> K
    where
        K: Clone,
    {
        assert!(self.is_full());
        assert!(self.sorted);
        assert_eq!(right.len(), 0);

        let c = CL::USIZE;
        let m = c / 2;
        let upper = c - m;

        // SAFETY: cells [m, c) are initialised and are not read as live
        // values from `self` again (key_count drops to m below).
        unsafe {
            common::move_cells(&mut self.keys[m..], &mut right.keys, upper);
            common::move_cells(&mut self.values[m..], &mut right.values, upper);
        }
        right.key_count = upper as u8;
        right.sorted = true;
        self.key_count = m as u8;

        let separator = self.key_at(m - 1).clone();

        if ix < m {
            self.insert_at(ix, key, value);
        } else {
            right.insert_at(ix - m, key, value);
        }

        separator
    }

    /// Drop every live pair. The leaf is logically empty afterwards.
    pub(crate) fn drop_contents(&mut self) {
        for i in 0..self.len() {
            // SAFETY: cells below `key_count` are initialised and dropped
            // exactly once here.
            unsafe {
                self.keys[i].assume_init_drop();
                self.values[i].assume_init_drop();
            }
        }
        self.key_count = 0;
    }
}
