//! Recoverable error surfaces returned by the allocation engine.
//!
//! Anything *not* represented here (calling an operation in the wrong
//! lifecycle state, the verifier catching a broken invariant, an internal
//! precondition failing inside the split/descent loop) is a contract
//! violation, not a recoverable error, and is reported by panicking instead -
//! see the module docs on [`crate::page_allocator`].

/// `page_alloc`/`mem_alloc` failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The request can never be satisfied regardless of fragmentation: it
    /// asks for more pages than the whole tree could ever hold.
    Invalid,
    /// Capacity exists in principle, but no single free block is large
    /// enough right now.
    NoMemory,
}

/// `page_free`/`mem_free` failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeError {
    /// The page id does not point at the start of a currently-live
    /// allocation (never allocated, already freed, or mid-block).
    NoSuchAllocation,
}
