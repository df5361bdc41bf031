//! Integer and bit-twiddling helpers shared by the rest of the crate.
//!
//! Nothing in here knows about pages, levels or trees: these are the raw
//! `u64`/`u8` operations the heap-index algebra in [`crate::topology`] is
//! built out of.

/// `⌊log₂ v⌋` for `v >= 1`.
///
/// # Panics
/// Panics (via the arithmetic overflow built into `leading_zeros`) if `v == 0`;
/// callers must never ask for the logarithm of zero.
pub const fn log2_floor(v: u64) -> u32 {
    debug_assert!(v >= 1, "log2_floor is undefined for 0");
    63 - v.leading_zeros()
}

/// `⌈log₂ v⌉` for `v >= 1`.
///
/// Earlier revisions of the reference allocator used the flooring variant
/// here, which under-counts the level needed for non-power-of-two requests.
/// This crate always rounds up.
pub const fn log2_ceil(v: u64) -> u32 {
    debug_assert!(v >= 1, "log2_ceil is undefined for 0");
    if v <= 1 {
        0
    } else {
        log2_floor(v - 1) + 1
    }
}

/// `2^exp`.
pub const fn pow2(exp: u32) -> u64 {
    1u64 << exp
}

/// Whether `v` is an exact power of two (popcount == 1).
pub const fn is_power_of_two(v: u64) -> bool {
    v != 0 && v.count_ones() == 1
}
