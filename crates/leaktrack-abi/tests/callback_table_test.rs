//! End-to-end tests calling through the C callback table the way a host
//! would: raw pointers in, raw pointers out, bytes written through the
//! returned addresses.

use std::ffi::c_void;
use std::ptr;

use leaktrack_abi::{AllocationCallbacks, AllocationScope, CallbackAllocator, FailureConfig};
use leaktrack_core::InternalAllocationKind;

const SCOPE: AllocationScope = AllocationScope(7);
const KIND: InternalAllocationKind = InternalAllocationKind(1);

unsafe fn host_allocate(cbs: &AllocationCallbacks, size: usize, alignment: usize) -> *mut c_void {
    unsafe { (cbs.pfn_allocation)(cbs.user_data, size, alignment, SCOPE) }
}

unsafe fn host_reallocate(
    cbs: &AllocationCallbacks,
    original: *mut c_void,
    size: usize,
    alignment: usize,
) -> *mut c_void {
    unsafe { (cbs.pfn_reallocation)(cbs.user_data, original, size, alignment, SCOPE) }
}

unsafe fn host_free(cbs: &AllocationCallbacks, memory: *mut c_void) {
    unsafe { (cbs.pfn_free)(cbs.user_data, memory) }
}

#[test]
fn allocate_returns_aligned_writable_memory() {
    let allocator = CallbackAllocator::default();
    let cbs = allocator.callbacks();

    let ptr = unsafe { host_allocate(&cbs, 16, 8) };
    assert!(!ptr.is_null());
    assert_eq!(ptr as usize % 8, 0);
    assert_eq!(allocator.tracker().allocation_count(), 1);

    // The host owns the bytes until free.
    unsafe { ptr::write_bytes(ptr.cast::<u8>(), 0xAB, 16) };

    unsafe { host_free(&cbs, ptr) };
    assert!(allocator.tracker().is_empty());
    assert!(allocator.tracker().check_empty().is_ok());
}

#[test]
fn injected_allocation_returns_null_through_the_table() {
    let allocator = CallbackAllocator::new(FailureConfig::fail_at_allocation_count(0));
    let cbs = allocator.callbacks();
    let ptr = unsafe { host_allocate(&cbs, 64, 16) };
    assert!(ptr.is_null());
    assert!(allocator.tracker().is_empty());
}

#[test]
fn grow_copies_host_written_bytes() {
    let allocator = CallbackAllocator::default();
    let cbs = allocator.callbacks();

    let old = unsafe { host_allocate(&cbs, 8, 8) };
    assert!(!old.is_null());
    let payload = [0x10u8, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70, 0x80];
    unsafe { ptr::copy_nonoverlapping(payload.as_ptr(), old.cast::<u8>(), 8) };

    let grown = unsafe { host_reallocate(&cbs, old, 32, 8) };
    assert!(!grown.is_null());
    assert_ne!(grown, old);

    let mut readback = [0u8; 8];
    unsafe { ptr::copy_nonoverlapping(grown.cast::<u8>(), readback.as_mut_ptr(), 8) };
    assert_eq!(readback, payload);

    unsafe { host_free(&cbs, grown) };
    assert!(allocator.tracker().is_empty());
}

#[test]
fn failed_grow_leaves_old_pointer_valid_and_freeable() {
    let allocator = CallbackAllocator::default();
    let cbs = allocator.callbacks();

    let old = unsafe { host_allocate(&cbs, 8, 8) };
    assert!(!old.is_null());
    unsafe { ptr::write_bytes(old.cast::<u8>(), 0x5A, 8) };

    // Arm the call-trigger on the next allocate/grow attempt.
    let tracker = allocator.tracker();
    tracker.update_config(FailureConfig::fail_at_call_count(tracker.call_count()));

    let grown = unsafe { host_reallocate(&cbs, old, 64, 8) };
    assert!(grown.is_null());

    // Untouched: same record, same contents, still freeable.
    assert_eq!(tracker.lookup_size(old as usize), Some(8));
    let mut readback = [0u8; 8];
    unsafe { ptr::copy_nonoverlapping(old.cast::<u8>(), readback.as_mut_ptr(), 8) };
    assert_eq!(readback, [0x5A; 8]);

    tracker.update_config(FailureConfig::none());
    unsafe { host_free(&cbs, old) };
    assert!(tracker.is_empty());
}

#[test]
fn shrink_through_the_table_returns_the_same_pointer() {
    let allocator = CallbackAllocator::default();
    let cbs = allocator.callbacks();

    let ptr = unsafe { host_allocate(&cbs, 16, 8) };
    let shrunk = unsafe { host_reallocate(&cbs, ptr, 4, 8) };
    assert_eq!(shrunk, ptr);

    unsafe { host_free(&cbs, ptr) };
    assert!(allocator.tracker().is_empty());
}

#[test]
fn null_and_zero_size_reallocate_follow_the_contract() {
    let allocator = CallbackAllocator::default();
    let cbs = allocator.callbacks();

    // realloc(null, n) allocates.
    let ptr = unsafe { host_reallocate(&cbs, ptr::null_mut(), 24, 8) };
    assert!(!ptr.is_null());
    assert_eq!(allocator.tracker().allocation_count(), 1);

    // realloc(ptr, 0) frees and returns null.
    let out = unsafe { host_reallocate(&cbs, ptr, 0, 8) };
    assert!(out.is_null());
    assert!(allocator.tracker().is_empty());
}

#[test]
fn free_tolerates_null_and_foreign_pointers() {
    let allocator = CallbackAllocator::default();
    let cbs = allocator.callbacks();

    unsafe { host_free(&cbs, ptr::null_mut()) };
    let mut not_ours = 0u64;
    unsafe { host_free(&cbs, (&raw mut not_ours).cast::<c_void>()) };

    let ptr = unsafe { host_allocate(&cbs, 8, 8) };
    unsafe { host_free(&cbs, ptr) };
    unsafe { host_free(&cbs, ptr) }; // double free through the table
    assert!(allocator.tracker().is_empty());
}

#[test]
fn internal_notification_slots_only_observe() {
    let allocator = CallbackAllocator::default();
    let cbs = allocator.callbacks();

    unsafe { (cbs.pfn_internal_allocation)(cbs.user_data, 4096, KIND, SCOPE) };
    unsafe { (cbs.pfn_internal_free)(cbs.user_data, 4096, KIND, SCOPE) };

    let tracker = allocator.tracker();
    assert_eq!(tracker.internal_allocation_count(), 1);
    assert_eq!(tracker.internal_free_count(), 1);
    assert!(tracker.is_empty());
    assert_eq!(tracker.call_count(), 0);
}

#[test]
fn one_tracker_backs_multiple_host_objects() {
    let allocator = CallbackAllocator::default();
    // Each host object copies its own table; both feed one ledger.
    let instance_cbs = allocator.callbacks();
    let device_cbs = allocator.callbacks();

    let a = unsafe { host_allocate(&instance_cbs, 32, 8) };
    let b = unsafe { host_allocate(&device_cbs, 32, 8) };
    assert_eq!(allocator.tracker().allocation_count(), 2);

    // Cross-table free is fine: the ledger is keyed by address.
    unsafe { host_free(&instance_cbs, b) };
    unsafe { host_free(&device_cbs, a) };
    assert!(allocator.tracker().is_empty());
}

#[test]
fn threaded_hosts_share_the_table_safely() {
    use std::thread;

    const THREADS: usize = 4;
    const ROUNDS: usize = 100;

    let allocator = CallbackAllocator::default();
    thread::scope(|scope| {
        for _ in 0..THREADS {
            let allocator = &allocator;
            scope.spawn(move || {
                let cbs = allocator.callbacks();
                for i in 0..ROUNDS {
                    let ptr = unsafe { host_allocate(&cbs, 16 + i % 32, 8) };
                    assert!(!ptr.is_null());
                    unsafe { ptr::write_bytes(ptr.cast::<u8>(), i as u8, 16) };
                    unsafe { host_free(&cbs, ptr) };
                }
            });
        }
    });

    let tracker = allocator.tracker();
    assert!(tracker.check_empty().is_ok());
    assert_eq!(tracker.call_count(), THREADS * ROUNDS);
}
