use core::ops::Add;
use core::ptr::NonNull;

use allocator_api2::alloc::Allocator;
use generic_array::ArrayLength;
use typenum::{Sum, U1};

use crate::common;

mod branch;
mod leaf;

pub(crate) use branch::BranchNode;
pub(crate) use leaf::LeafNode;

const BRANCH_BIT: usize = 1;
const PTR_MASK: usize = !BRANCH_BIT;

/// An owning, type-erased pointer to a leaf or branch node.
///
/// Branch and leaf nodes have different shapes, so child slots cannot name a
/// single node type. Instead of a per-slot enum tag, the discriminator lives
/// in the low bit of the address: nodes are at least 2-aligned, so the bit
/// is always free, and a child slot stays one machine word.
///
/// A `ChildPtr` does not know its key/value/capacity types; every access
/// re-supplies them. All accessors require that the pointer was created from
/// a node of those exact types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChildPtr(usize);

impl ChildPtr {
    pub(crate) fn null() -> Self {
        Self(0)
    }

    #[inline]
    pub(crate) fn is_branch(&self) -> bool {
        self.0 & BRANCH_BIT != 0
    }

    pub(crate) fn from_leaf<K, V, CL: ArrayLength>(node: NonNull<LeafNode<K, V, CL>>) -> Self {
        let addr = node.as_ptr() as usize;
        debug_assert_eq!(addr & BRANCH_BIT, 0);
        Self(addr)
    }

    pub(crate) fn from_branch<K, CB>(node: NonNull<BranchNode<K, CB>>) -> Self
    where
        CB: ArrayLength + Add<U1>,
        Sum<CB, U1>: ArrayLength,
    {
        let addr = node.as_ptr() as usize;
        debug_assert_eq!(addr & BRANCH_BIT, 0);
        Self(addr | BRANCH_BIT)
    }

    pub(crate) fn leaf_ptr<K, V, CL: ArrayLength>(self) -> NonNull<LeafNode<K, V, CL>> {
        debug_assert!(!self.is_branch());
        NonNull::new(self.0 as *mut LeafNode<K, V, CL>).expect("live child pointer")
    }

    pub(crate) fn branch_ptr<K, CB>(self) -> NonNull<BranchNode<K, CB>>
    where
        CB: ArrayLength + Add<U1>,
        Sum<CB, U1>: ArrayLength,
    {
        debug_assert!(self.is_branch());
        NonNull::new((self.0 & PTR_MASK) as *mut BranchNode<K, CB>).expect("live child pointer")
    }

    /// # Safety
    ///
    /// The pointer must have been created by [`from_leaf`](Self::from_leaf)
    /// with these exact types, the node must still be live, and no mutable
    /// reference to it may exist for the chosen lifetime.
    pub(crate) unsafe fn as_leaf<'a, K, V, CL: ArrayLength>(self) -> &'a LeafNode<K, V, CL> {
        // SAFETY: per the contract.
        unsafe { self.leaf_ptr().as_ref() }
    }

    /// # Safety
    ///
    /// As [`as_leaf`](Self::as_leaf), and the access must be exclusive.
    pub(crate) unsafe fn as_leaf_mut<'a, K, V, CL: ArrayLength>(
        self,
    ) -> &'a mut LeafNode<K, V, CL> {
        // SAFETY: per the contract.
        unsafe { self.leaf_ptr().as_mut() }
    }

    /// # Safety
    ///
    /// The pointer must have been created by
    /// [`from_branch`](Self::from_branch) with these exact types, the node
    /// must still be live, and no mutable reference to it may exist for the
    /// chosen lifetime.
    pub(crate) unsafe fn as_branch<'a, K, CB>(self) -> &'a BranchNode<K, CB>
    where
        CB: ArrayLength + Add<U1>,
        Sum<CB, U1>: ArrayLength,
    {
        // SAFETY: per the contract.
        unsafe { self.branch_ptr().as_ref() }
    }

    /// # Safety
    ///
    /// As [`as_branch`](Self::as_branch), and the access must be exclusive.
    pub(crate) unsafe fn as_branch_mut<'a, K, CB>(self) -> &'a mut BranchNode<K, CB>
    where
        CB: ArrayLength + Add<U1>,
        Sum<CB, U1>: ArrayLength,
    {
        // SAFETY: per the contract.
        unsafe { self.branch_ptr().as_mut() }
    }
}

/// Drop every pair in the subtree under `ptr` and release its nodes.
///
/// # Safety
///
/// `ptr` must own a live subtree whose nodes were built with these exact
/// type parameters and allocated from `alloc`, and must not be used again.
pub(crate) unsafe fn drop_subtree<K, V, CL, CB, A>(ptr: ChildPtr, alloc: &A)
where
    CL: ArrayLength,
    CB: ArrayLength + Add<U1>,
    Sum<CB, U1>: ArrayLength,
    A: Allocator,
{
    if ptr.is_branch() {
        let mut raw = ptr.branch_ptr::<K, CB>();
        // SAFETY: live, uniquely owned node per the contract.
        let branch = unsafe { raw.as_mut() };
        for i in 0..=branch.len() {
            // SAFETY: child slots below `key_count` own live subtrees from
            // the same allocator.
            unsafe { drop_subtree::<K, V, CL, CB, A>(branch.child(i), alloc) };
        }
        branch.drop_contents();
        // SAFETY: allocated from `alloc`; contents dropped above.
        unsafe { common::dealloc_node(alloc, raw) };
    } else {
        let mut raw = ptr.leaf_ptr::<K, V, CL>();
        // SAFETY: live, uniquely owned node per the contract.
        let leaf = unsafe { raw.as_mut() };
        leaf.drop_contents();
        // SAFETY: allocated from `alloc`; contents dropped above.
        unsafe { common::dealloc_node(alloc, raw) };
    }
}
