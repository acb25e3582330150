//! # leaktrack-core
//!
//! A bookkeeping, alignment-aware, fault-injecting allocation tracker for
//! proving that a loader-style host releases every byte it allocates, even
//! when individual allocation attempts are made to fail.
//!
//! The tracker emulates aligned allocation with padded buffers, records
//! every live allocation by address, and injects out-of-memory failures
//! from two independently-configurable triggers, all serialized under one
//! lock. A sweeping driver walks the injected failure through every
//! allocation call site of the host and asserts the ledger is empty after
//! each unwind.
//!
//! No `unsafe` code is permitted at the crate level; the raw callback-table
//! ABI lives in `leaktrack-abi`.

#![deny(unsafe_code)]

pub mod align;
pub mod config;
pub mod ledger;
pub mod tracker;

pub use config::{FailureConfig, FailureInjector};
pub use ledger::{AllocationRecord, AllocationScope, Ledger};
pub use tracker::{
    InternalAllocationKind, LeakError, MemoryTracker, TrackerLogLevel, TrackerLogRecord,
};
