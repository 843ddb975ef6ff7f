use allocator_api2::alloc::AllocError;
use thiserror::Error;

/// Errors surfaced by fallible map operations.
///
/// Structural invariant violations are not represented here: they are bugs,
/// reported by [`validate`](crate::BTreeMap::validate) assertions, and abort
/// the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TreeError {
    /// The backing allocator declined a node allocation.
    ///
    /// Surfaced unchanged from map construction and from `put`. A failed
    /// `put` leaves the tree exactly as it was: sibling nodes for a split
    /// chain are reserved up front and released again on failure.
    #[error("out of memory: node allocation failed")]
    OutOfMemory,
}

impl From<AllocError> for TreeError {
    fn from(_: AllocError) -> Self {
        Self::OutOfMemory
    }
}
