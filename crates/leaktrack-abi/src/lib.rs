//! # leaktrack-abi
//!
//! The C-ABI boundary for the leaktrack allocation tracker: a fixed
//! five-slot callback table (`allocate`, `reallocate`, `free`, and the two
//! internal-allocation notification hooks) plus an opaque context pointer,
//! in the shape loader-style hosts consume. Static trampoline functions
//! bridge the context pointer back to the tracker instance.
//!
//! All `unsafe` in the workspace lives here; the tracker itself is safe
//! Rust in `leaktrack-core`.

mod callbacks;

pub use callbacks::{
    AllocationCallbacks, AllocationFn, CallbackAllocator, FreeFn, InternalAllocationFn,
    InternalFreeFn, ReallocationFn,
};
pub use leaktrack_core::{
    AllocationScope, FailureConfig, InternalAllocationKind, LeakError, MemoryTracker,
};
