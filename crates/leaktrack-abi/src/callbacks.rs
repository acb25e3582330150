//! The five-slot allocation-callback table and its trampolines.
//!
//! Hosts receive an [`AllocationCallbacks`] value (they conventionally copy
//! it) and call through the function slots with the embedded `user_data`
//! context pointer. The trampolines cast that pointer back to the
//! `MemoryTracker` the table was built from and forward into its safe API,
//! translating null pointers to and from the core's address-`0` encoding.

use std::ffi::c_void;

use leaktrack_core::{AllocationScope, FailureConfig, InternalAllocationKind, MemoryTracker};

/// `allocate(user_data, size, alignment, scope) -> address | null`.
pub type AllocationFn = unsafe extern "C" fn(
    user_data: *mut c_void,
    size: usize,
    alignment: usize,
    scope: AllocationScope,
) -> *mut c_void;

/// `reallocate(user_data, original, size, alignment, scope) -> address | null`.
pub type ReallocationFn = unsafe extern "C" fn(
    user_data: *mut c_void,
    original: *mut c_void,
    size: usize,
    alignment: usize,
    scope: AllocationScope,
) -> *mut c_void;

/// `free(user_data, memory)`.
pub type FreeFn = unsafe extern "C" fn(user_data: *mut c_void, memory: *mut c_void);

/// `internal_allocation(user_data, size, kind, scope)` notification.
pub type InternalAllocationFn = unsafe extern "C" fn(
    user_data: *mut c_void,
    size: usize,
    kind: InternalAllocationKind,
    scope: AllocationScope,
);

/// `internal_free(user_data, size, kind, scope)` notification.
pub type InternalFreeFn = unsafe extern "C" fn(
    user_data: *mut c_void,
    size: usize,
    kind: InternalAllocationKind,
    scope: AllocationScope,
);

/// The fixed callback table handed to the host.
///
/// `user_data` is the opaque context pointer passed back on every call, so
/// one tracker instance can back multiple independent host objects.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct AllocationCallbacks {
    pub user_data: *mut c_void,
    pub pfn_allocation: AllocationFn,
    pub pfn_reallocation: ReallocationFn,
    pub pfn_free: FreeFn,
    pub pfn_internal_allocation: InternalAllocationFn,
    pub pfn_internal_free: InternalFreeFn,
}

// SAFETY: trampoline contract below — `user_data` must point to a live
// `MemoryTracker`, whose whole API is lock-serialized and thread-safe.

unsafe extern "C" fn tracked_allocation(
    user_data: *mut c_void,
    size: usize,
    alignment: usize,
    scope: AllocationScope,
) -> *mut c_void {
    // SAFETY: `user_data` was set by `CallbackAllocator::callbacks` to the
    // boxed tracker, which outlives every table built from it.
    let tracker = unsafe { &*user_data.cast::<MemoryTracker>() };
    match tracker.allocate(size, alignment, scope) {
        Some(address) => address as *mut c_void,
        None => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn tracked_reallocation(
    user_data: *mut c_void,
    original: *mut c_void,
    size: usize,
    alignment: usize,
    scope: AllocationScope,
) -> *mut c_void {
    // SAFETY: see `tracked_allocation`.
    let tracker = unsafe { &*user_data.cast::<MemoryTracker>() };
    match tracker.reallocate(original as usize, size, alignment, scope) {
        Some(address) => address as *mut c_void,
        None => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn tracked_free(user_data: *mut c_void, memory: *mut c_void) {
    // SAFETY: see `tracked_allocation`.
    let tracker = unsafe { &*user_data.cast::<MemoryTracker>() };
    tracker.free(memory as usize);
}

unsafe extern "C" fn tracked_internal_allocation(
    user_data: *mut c_void,
    size: usize,
    kind: InternalAllocationKind,
    scope: AllocationScope,
) {
    // SAFETY: see `tracked_allocation`.
    let tracker = unsafe { &*user_data.cast::<MemoryTracker>() };
    tracker.notify_internal_allocation(size, kind, scope);
}

unsafe extern "C" fn tracked_internal_free(
    user_data: *mut c_void,
    size: usize,
    kind: InternalAllocationKind,
    scope: AllocationScope,
) {
    // SAFETY: see `tracked_allocation`.
    let tracker = unsafe { &*user_data.cast::<MemoryTracker>() };
    tracker.notify_internal_free(size, kind, scope);
}

/// Owns a tracker and vends callback tables wired to it.
///
/// The tracker is boxed so its address is stable even if the
/// `CallbackAllocator` value moves; tables built by [`callbacks`]
/// (`Self::callbacks`) stay valid for the allocator's lifetime.
pub struct CallbackAllocator {
    tracker: Box<MemoryTracker>,
}

impl CallbackAllocator {
    #[must_use]
    pub fn new(config: FailureConfig) -> Self {
        Self {
            tracker: Box::new(MemoryTracker::new(config)),
        }
    }

    /// Builds a callback table pointing at this allocator's tracker.
    ///
    /// The table (and any host copy of it) must not be called after `self`
    /// is dropped.
    #[must_use]
    pub fn callbacks(&self) -> AllocationCallbacks {
        AllocationCallbacks {
            user_data: std::ptr::from_ref::<MemoryTracker>(&self.tracker)
                .cast_mut()
                .cast::<c_void>(),
            pfn_allocation: tracked_allocation,
            pfn_reallocation: tracked_reallocation,
            pfn_free: tracked_free,
            pfn_internal_allocation: tracked_internal_allocation,
            pfn_internal_free: tracked_internal_free,
        }
    }

    /// The backing tracker, for introspection and configuration.
    #[must_use]
    pub fn tracker(&self) -> &MemoryTracker {
        &self.tracker
    }
}

impl Default for CallbackAllocator {
    fn default() -> Self {
        Self::new(FailureConfig::none())
    }
}
