use core::mem::MaybeUninit;
use core::ptr;
use core::ptr::NonNull;

use allocator_api2::alloc::{Allocator, Layout};
use generic_array::GenericArray;

use crate::error::TreeError;

/// Upper bound on the number of branch levels any tree in this crate can
/// grow. A post-split branch always has at least two children, so the leaf
/// count doubles per level and `usize::BITS` levels already exceed the
/// address space; the slack covers the root and the leaf level.
pub(crate) const MAX_DEPTH: usize = usize::BITS as usize + 2;

/// Shift-insert into a fixed-capacity array whose first `len` slots are
/// live.
pub(crate) trait InsertExt<V> {
    fn insert(&mut self, idx: usize, len: usize, value: V);
}

impl<V, B: generic_array::ArrayLength> InsertExt<V> for GenericArray<V, B> {
    fn insert(&mut self, idx: usize, len: usize, value: V) {
        assert!(len < B::to_usize());
        assert!(idx <= len);
        // SAFETY: idx <= len < capacity, so both offsets are in bounds.
        let src = unsafe { self.as_mut_ptr().add(idx) };
        // SAFETY: idx + 1 <= len + 1 <= capacity.
        let dst = unsafe { self.as_mut_ptr().add(idx + 1) };
        // SAFETY: the regions overlap and ptr::copy handles that; the
        // element shifted out of `idx` is rewritten below.
        unsafe {
            ptr::copy(src, dst, len - idx);
        }
        // SAFETY: slot `idx` was shifted out above and is now dead.
        unsafe {
            ptr::write(&mut self[idx], value);
        }
    }
}

impl<V, B: generic_array::ArrayLength> InsertExt<V> for GenericArray<MaybeUninit<V>, B> {
    fn insert(&mut self, idx: usize, len: usize, value: V) {
        assert!(len < B::to_usize());
        assert!(idx <= len);
        // SAFETY: idx <= len < capacity, so both offsets are in bounds.
        let src = unsafe { self.as_mut_ptr().add(idx) };
        // SAFETY: idx + 1 <= len + 1 <= capacity.
        let dst = unsafe { self.as_mut_ptr().add(idx + 1) };
        // SAFETY: MaybeUninit cells are plain bytes to ptr::copy; overlap is
        // handled.
        unsafe {
            ptr::copy(src, dst, len - idx);
        }
        self[idx].write(value);
    }
}

/// Move the first `n` cells of `src` into the front of `dst`, leaving the
/// source cells logically dead.
///
/// # Safety
///
/// The first `n` cells of `src` must be initialised and must not be read as
/// live values again; `dst` must have room for `n` cells.
pub(crate) unsafe fn move_cells<T>(
    src: &mut [MaybeUninit<T>],
    dst: &mut [MaybeUninit<T>],
    n: usize,
) {
    debug_assert!(n <= src.len());
    debug_assert!(n <= dst.len());
    // SAFETY: distinct arrays, both at least `n` cells per the contract.
    unsafe {
        ptr::copy_nonoverlapping(src.as_ptr(), dst.as_mut_ptr(), n);
    }
}

/// Heap-allocate `node` through `alloc`.
pub(crate) fn alloc_node<T, A: Allocator>(alloc: &A, node: T) -> Result<NonNull<T>, TreeError> {
    let ptr = alloc
        .allocate(Layout::new::<T>())
        .map_err(TreeError::from)?
        .cast::<T>();
    // SAFETY: freshly allocated for T's layout, so properly sized and
    // aligned, and not aliased.
    unsafe {
        ptr.as_ptr().write(node);
    }
    Ok(ptr)
}

/// Release a node allocated by [`alloc_node`] without running its
/// destructor.
///
/// # Safety
///
/// `ptr` must have been returned by [`alloc_node`] with the same allocator
/// and must not be used again. Any live keys or values inside the node must
/// already have been dropped or moved out.
pub(crate) unsafe fn dealloc_node<T, A: Allocator>(alloc: &A, ptr: NonNull<T>) {
    // SAFETY: same allocator and layout as the allocation site.
    unsafe {
        alloc.deallocate(ptr.cast(), Layout::new::<T>());
    }
}
