//! A binary buddy allocator for pages.
//!
//! This crate provides a binary buddy allocator, the same algorithm real
//! kernels use to hand out physical memory: it tracks free space over an
//! implicit complete binary tree, packed into a flat array of `N = 2 * pages
//! - 1` single-byte nodes rather than a pointer structure, and can therefore
//! run in a `#![no_std]`, allocation-free context.
//!
//! Two layers are exposed:
//!
//! - [`PageAllocator`], the core type: it deals in page ids and works over
//!   any `&mut [Entry]` buffer you provide (static array, arena, mapped
//!   memory - the allocator doesn't care). Use this if you need to reserve
//!   unusable ranges, address by byte offset into some external region via
//!   [`PageAllocator::mem_alloc`]/[`PageAllocator::mem_free`], or just want
//!   full control over where the metadata lives.
//! - [`Allocator`], a convenience wrapper implementing
//!   [`core::alloc::GlobalAlloc`] for power-of-two page counts, usable as a
//!   `#[global_allocator]` the same way [emballoc], the crate this one grew
//!   out of, is used.
//!
//! # Usage
//! ```no_run
//! #[global_allocator]
//! static ALLOCATOR: pagebuddy::Allocator<1024, { pagebuddy::node_count_for(1024) }, { pagebuddy::data_bytes_for(1024, 4096) }> =
//!     pagebuddy::Allocator::new();
//!
//! extern crate alloc;
//! ```
//! `PAGES` must be a power of two; `NODE_COUNT` and `DATA_BYTES` are meant to
//! be computed from it with [`node_count_for`]/[`data_bytes_for`] rather than
//! written by hand, since [`Allocator::new`] asserts they're consistent.
//!
//! # Implementation
//! Every node stores a single byte: either the smallest "free level" still
//! reachable below it (0 at the root's own depth means the whole subtree is
//! free), or one of three sentinels - [`Entry::ALLOCATED`],
//! [`Entry::UNUSABLE`] and [`Entry::FILLED`] (no free space left at all,
//! neither child has any). An allocation descends from the root, splitting
//! blocks that are too big, always preferring the tightest-fitting child, and
//! stops at the first wholly-free node at the right depth. Freeing reverses
//! this: the freed node is marked wholly free, then merged with its buddy
//! for as long as the buddy is also wholly free, and the free-level change is
//! propagated back up to the root.
//!
//! [emballoc]: https://crates.io/crates/emballoc
#![no_std]

mod buffer;
mod entry;
mod error;
mod math;
mod page_allocator;
mod topology;
mod verify;

pub use entry::Entry;
pub use error::{AllocError, FreeError};
pub use page_allocator::{required_len, PageAllocator};

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::addr_of_mut;
use page_allocator::{Header, Lifecycle};
use spin::Mutex;

/// Number of heap-array entries a power-of-two allocator over `pages` pages
/// needs - the constant-context counterpart of [`required_len`].
///
/// # Panics
/// Panics if `pages` is not a power of two.
pub const fn node_count_for(pages: usize) -> usize {
    assert!(pages.is_power_of_two(), "pages must be a power of two");
    2 * pages - 1
}

/// Number of payload bytes backing `pages` pages of `page_size` bytes each.
pub const fn data_bytes_for(pages: usize, page_size: usize) -> usize {
    pages * page_size
}

/// The largest `PAGE_SIZE` [`Allocator`] can keep its payload storage aligned
/// to. `repr(align(N))` requires a literal, so unlike `node_count_for`/
/// `data_bytes_for` this bound can't be derived from the `PAGE_SIZE` const
/// generic; it is fixed to the crate's default page size and asserted
/// against in [`Allocator::new`]. [`PageAllocator`] has no such limit, since
/// callers there supply and align their own buffer.
const MAX_SUPPORTED_PAGE_SIZE: usize = 4096;

/// Payload storage aligned to [`MAX_SUPPORTED_PAGE_SIZE`].
///
/// Without this, `data` would inherit whatever offset it happens to land at
/// inside `Storage` (after `header` and an odd-length `heap` array), which is
/// not generally page-aligned, let alone aligned to every smaller power of
/// two a request might ask for.
#[repr(C, align(4096))]
struct PageAligned<const DATA_BYTES: usize>([u8; DATA_BYTES]);

struct Storage<const NODE_COUNT: usize, const DATA_BYTES: usize> {
    header: Header,
    heap: [Entry; NODE_COUNT],
    data: PageAligned<DATA_BYTES>,
}

/// A ready-to-use, statically-sized buddy allocator over `PAGES` pages of
/// `PAGE_SIZE` bytes each, suitable for `#[global_allocator]`.
///
/// Unlike [`PageAllocator`], which borrows its node buffer and leaves payload
/// memory entirely up to the caller, this type owns both: a `[Entry;
/// NODE_COUNT]` metadata array and a page-aligned `[u8; DATA_BYTES]` payload
/// array (see [`PageAligned`]), both embedded directly in the `static`.
/// `PAGES` must be a power of two so that
/// [`Allocator::new`] can build a fully-free tree with a closed-form const
/// expression rather than running the general split/merge machinery at
/// const-eval time; allocators over non-power-of-two page counts, or ones
/// that need to reserve unusable ranges up front, should use
/// [`PageAllocator`] directly instead.
///
/// `NODE_COUNT` and `DATA_BYTES` are separate const parameters (rather than
/// derived from `PAGES`) only because Rust does not yet let a const generic
/// depend on another in a struct definition; compute them with
/// [`node_count_for`]/[`data_bytes_for`] and `Allocator::new` will verify
/// they're consistent.
pub struct Allocator<const PAGES: usize, const NODE_COUNT: usize, const DATA_BYTES: usize, const PAGE_SIZE: usize = 4096>(
    Mutex<Storage<NODE_COUNT, DATA_BYTES>>,
);

impl<const PAGES: usize, const NODE_COUNT: usize, const DATA_BYTES: usize, const PAGE_SIZE: usize>
    Allocator<PAGES, NODE_COUNT, DATA_BYTES, PAGE_SIZE>
{
    /// Create a new [`Allocator`] with every page free.
    ///
    /// # Panics
    /// Panics if `PAGES` is not a power of two, if `NODE_COUNT`/`DATA_BYTES`
    /// don't match [`node_count_for`]/[`data_bytes_for`], or if `PAGE_SIZE`
    /// is not a power of two.
    #[must_use = "assign the allocator to a static variable and apply the `#[global_allocator]`-attribute to make it the global allocator"]
    pub const fn new() -> Self {
        assert!(PAGES.is_power_of_two(), "PAGES must be a power of two");
        assert!(NODE_COUNT == 2 * PAGES - 1, "NODE_COUNT must equal node_count_for(PAGES)");
        assert!(DATA_BYTES == PAGES * PAGE_SIZE, "DATA_BYTES must equal data_bytes_for(PAGES, PAGE_SIZE)");
        assert!(PAGE_SIZE.is_power_of_two(), "PAGE_SIZE must be a power of two");
        assert!(
            PAGE_SIZE <= MAX_SUPPORTED_PAGE_SIZE,
            "PAGE_SIZE must not exceed 4096, the size this wrapper keeps payload storage aligned to; \
             use PageAllocator directly with your own aligned buffer for larger pages"
        );
        assert!(
            PAGES.trailing_zeros() <= Entry::MAX_VALID_LEVEL as u32,
            "PAGES is too large to address with this node encoding"
        );

        // For a fully-free, hole-free, power-of-two tree the bottom-up
        // collapse in `ready` telescopes all the way to the root: every
        // node's byte equals its own depth. That identity is what lets this
        // run as a flat const loop instead of the general recursive pass.
        let mut heap = [Entry::free_at_level(0); NODE_COUNT];
        let mut i = 0;
        while i < NODE_COUNT {
            heap[i] = Entry::free_at_level(topology::level(i as u64));
            i += 1;
        }

        let max_level = PAGES.trailing_zeros() as u8;
        Self(Mutex::new(Storage {
            header: Header {
                n_pages: PAGES as u64,
                max_level,
                page_size: PAGE_SIZE as u32,
                log2_page_size: PAGE_SIZE.trailing_zeros(),
                offset: 0,
                state: Lifecycle::Ready,
            },
            heap,
            data: PageAligned([0u8; DATA_BYTES]),
        }))
    }
}

impl<const PAGES: usize, const NODE_COUNT: usize, const DATA_BYTES: usize, const PAGE_SIZE: usize> Default
    for Allocator<PAGES, NODE_COUNT, DATA_BYTES, PAGE_SIZE>
{
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl<const PAGES: usize, const NODE_COUNT: usize, const DATA_BYTES: usize, const PAGE_SIZE: usize> GlobalAlloc
    for Allocator<PAGES, NODE_COUNT, DATA_BYTES, PAGE_SIZE>
{
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let mut guard = self.0.lock();
        let page_size = PAGE_SIZE as u64;
        // Layouts with an alignment coarser than a page cannot be served by
        // page-granular placement; anything else rides on `data` being
        // aligned to PAGE_SIZE (PageAligned) and every page offset being a
        // multiple of it.
        if layout.align() as u64 > page_size {
            return core::ptr::null_mut();
        }

        let size = layout.size() as u64;
        let n_pages = ((size + page_size - 1) / page_size).max(1);
        let header = guard.header;
        let mut pa = PageAllocator::from_raw_parts(header, &mut guard.heap);
        let page_id = match pa.page_alloc(n_pages) {
            Ok(id) => id,
            Err(_) => return core::ptr::null_mut(),
        };
        guard.header = pa.into_header();

        let data_ptr = addr_of_mut!(guard.data) as *mut u8;
        data_ptr.add((page_id * page_size) as usize)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        let mut guard = self.0.lock();
        let data_ptr = addr_of_mut!(guard.data) as *mut u8;
        let page_id = (ptr.offset_from(data_ptr) as u64) >> guard.header.log2_page_size;

        let header = guard.header;
        let mut pa = PageAllocator::from_raw_parts(header, &mut guard.heap);
        pa.page_free(page_id).expect("dealloc called with a pointer this allocator never handed out");
        guard.header = pa.into_header();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizing_helpers_agree_with_manual_math() {
        assert_eq!(node_count_for(8), 15);
        assert_eq!(data_bytes_for(8, 4096), 32768);
    }

    #[test]
    fn global_alloc_round_trips_a_block() {
        const PAGES: usize = 8;
        let alloc: Allocator<PAGES, { node_count_for(PAGES) }, { data_bytes_for(PAGES, 64) }, 64> = Allocator::new();

        unsafe {
            let layout = Layout::from_size_align(64, 8).unwrap();
            let ptr = GlobalAlloc::alloc(&alloc, layout);
            assert!(!ptr.is_null());
            ptr.write_bytes(0xAB, 64);
            alloc.dealloc(ptr, layout);
        }
    }

    #[test]
    fn global_alloc_reports_exhaustion_as_null() {
        const PAGES: usize = 2;
        let alloc: Allocator<PAGES, { node_count_for(PAGES) }, { data_bytes_for(PAGES, 64) }, 64> = Allocator::new();

        unsafe {
            let layout = Layout::from_size_align(64, 8).unwrap();
            let a = GlobalAlloc::alloc(&alloc, layout);
            let b = GlobalAlloc::alloc(&alloc, layout);
            let c = GlobalAlloc::alloc(&alloc, layout);
            assert!(!a.is_null());
            assert!(!b.is_null());
            assert!(c.is_null());
            alloc.dealloc(a, layout);
            alloc.dealloc(b, layout);
        }
    }

    #[test]
    fn returned_pointers_satisfy_every_alignment_up_to_page_size() {
        const PAGES: usize = 4;
        const PAGE_SIZE: usize = 64;
        let alloc: Allocator<PAGES, { node_count_for(PAGES) }, { data_bytes_for(PAGES, PAGE_SIZE) }, PAGE_SIZE> =
            Allocator::new();

        unsafe {
            for align in [1, 2, 4, 8, 16, 32, 64] {
                let layout = Layout::from_size_align(1, align).unwrap();
                let ptr = GlobalAlloc::alloc(&alloc, layout);
                assert!(!ptr.is_null());
                assert_eq!(ptr as usize % align, 0, "misaligned for align={align}");
                alloc.dealloc(ptr, layout);
            }
        }
    }

    #[test]
    fn alignment_above_page_size_is_rejected_as_null() {
        const PAGES: usize = 4;
        const PAGE_SIZE: usize = 64;
        let alloc: Allocator<PAGES, { node_count_for(PAGES) }, { data_bytes_for(PAGES, PAGE_SIZE) }, PAGE_SIZE> =
            Allocator::new();

        unsafe {
            let layout = Layout::from_size_align(1, PAGE_SIZE * 2).unwrap();
            assert!(GlobalAlloc::alloc(&alloc, layout).is_null());
        }
    }
}
