//! Alignment arithmetic for padded allocations.
//!
//! Every tracked allocation over-allocates by `alignment - 1` slack bytes so
//! that an address with the requested alignment is guaranteed to exist inside
//! the raw buffer. The aligned address is carved out of the padded buffer
//! after allocation rather than asking the system allocator for alignment,
//! which keeps the bookkeeping independent of allocator internals.

/// Smallest backing size for any allocation.
///
/// Zero-byte requests still get a one-byte buffer so every live allocation
/// owns a distinct, non-dangling address.
pub const MIN_BACKING_SIZE: usize = 1;

/// Returns true if `alignment` is usable: nonzero and a power of two.
#[must_use]
pub fn is_valid_alignment(alignment: usize) -> bool {
    alignment.is_power_of_two()
}

/// Padded buffer size for a `size`-byte request at `alignment`.
///
/// `max(size, 1) + (alignment - 1)` with overflow checked. Returns `None`
/// for an invalid alignment or arithmetic overflow; both are treated as an
/// allocation failure by the caller, never a panic.
#[must_use]
pub fn padded_size(size: usize, alignment: usize) -> Option<usize> {
    if !is_valid_alignment(alignment) {
        return None;
    }
    size.max(MIN_BACKING_SIZE).checked_add(alignment - 1)
}

/// Rounds `addr` up to the next multiple of `alignment` (a power of two).
///
/// Returns `None` on overflow.
#[must_use]
pub fn align_up(addr: usize, alignment: usize) -> Option<usize> {
    debug_assert!(is_valid_alignment(alignment));
    let aligned = addr.checked_add(alignment - 1)? & !(alignment - 1);
    Some(aligned)
}
