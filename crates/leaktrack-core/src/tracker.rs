//! The serialized allocation tracker.
//!
//! `MemoryTracker` composes the failure injector, the alignment-padded
//! ledger, and the counters behind one coarse `parking_lot::Mutex`. Every
//! operation — the five host-facing entry points, configuration updates,
//! and introspection — runs under that lock for its full duration, so the
//! live-count/leak view is globally consistent no matter how many threads
//! the host spawns. The tracker is test infrastructure: total ordering is
//! deliberate and throughput is not a goal.
//!
//! Addresses cross this API as `usize`, with `0` as the null equivalent;
//! the ABI crate maps raw pointers to and from that encoding.

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use crate::config::{FailureConfig, FailureInjector};
use crate::ledger::{AllocationRecord, AllocationScope, Ledger};

/// Opaque classification tag for internal-allocation notifications.
///
/// Passed through uninterpreted, like [`AllocationScope`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct InternalAllocationKind(pub u32);

/// Tracker lifecycle log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrackerLogLevel {
    Trace,
    Debug,
    Warn,
}

/// Structured tracker lifecycle record.
///
/// Buffered in the tracker and drained by the driving harness; each record
/// snapshots the counters as they stood after the event. Serializable so
/// sweep drivers can dump the drained history alongside their reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackerLogRecord {
    /// Monotonic event id.
    pub decision_id: u64,
    /// Severity level.
    pub level: TrackerLogLevel,
    /// Entry point (`allocate`, `reallocate`, `free`, ...).
    pub symbol: &'static str,
    /// Event kind (`alloc`, `fault_injected`, `shrink_noop`, ...).
    pub event: &'static str,
    /// Address involved in the event, if any.
    pub address: Option<usize>,
    /// Size involved in the event, if any.
    pub size: Option<usize>,
    /// Machine-readable outcome label.
    pub outcome: &'static str,
    /// Snapshot: currently live allocations.
    pub allocation_count: usize,
    /// Snapshot: allocate/grow attempts counted so far.
    pub call_count: usize,
}

/// Teardown found live allocations still in the ledger.
///
/// This signals a leak in the *host* under test, not in the tracker; the
/// tracker's own inconsistencies abort instead of returning errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("allocation ledger not empty at teardown: {live_allocations} live allocation(s) totalling {live_bytes} byte(s)")]
pub struct LeakError {
    /// Number of records still live.
    pub live_allocations: usize,
    /// Sum of their requested sizes.
    pub live_bytes: usize,
}

struct TrackerInner {
    injector: FailureInjector,
    ledger: Ledger,
    allocation_count: usize,
    call_count: usize,
    internal_allocation_count: usize,
    internal_free_count: usize,
    next_decision_id: u64,
    lifecycle_logs: Vec<TrackerLogRecord>,
}

impl TrackerInner {
    fn record_lifecycle(
        &mut self,
        level: TrackerLogLevel,
        symbol: &'static str,
        event: &'static str,
        address: Option<usize>,
        size: Option<usize>,
        outcome: &'static str,
    ) {
        let decision_id = self.next_decision_id;
        self.next_decision_id = self.next_decision_id.wrapping_add(1);
        self.lifecycle_logs.push(TrackerLogRecord {
            decision_id,
            level,
            symbol,
            event,
            address,
            size,
            outcome,
            allocation_count: self.allocation_count,
            call_count: self.call_count,
        });
    }

    fn allocate(&mut self, size: usize, alignment: usize, scope: AllocationScope) -> Option<usize> {
        if self.injector.should_inject(self.allocation_count, self.call_count) {
            self.record_lifecycle(
                TrackerLogLevel::Debug,
                "allocate",
                "fault_injected",
                None,
                Some(size),
                "oom",
            );
            return None;
        }
        self.call_count += 1;

        let Some(record) = AllocationRecord::new(size, alignment, scope) else {
            self.record_lifecycle(
                TrackerLogLevel::Warn,
                "allocate",
                "backing_alloc_failed",
                None,
                Some(size),
                "oom",
            );
            return None;
        };
        let address = self.ledger.add(record);
        self.allocation_count += 1;
        self.record_lifecycle(
            TrackerLogLevel::Trace,
            "allocate",
            "alloc",
            Some(address),
            Some(size),
            "success",
        );
        Some(address)
    }

    fn reallocate(
        &mut self,
        old_address: usize,
        new_size: usize,
        alignment: usize,
        scope: AllocationScope,
    ) -> Option<usize> {
        // realloc(null, size) is a fresh allocation.
        if old_address == 0 {
            return self.allocate(new_size, alignment, scope);
        }

        let Some(old_record) = self.ledger.find(old_address) else {
            self.record_lifecycle(
                TrackerLogLevel::Warn,
                "reallocate",
                "unknown_address",
                Some(old_address),
                Some(new_size),
                "rejected",
            );
            return None;
        };
        let old_size = old_record.requested_size();

        // realloc(ptr, 0) is a free: release semantics, never injected and
        // never counted as an allocate/grow attempt.
        if new_size == 0 {
            self.ledger
                .remove(old_address)
                .expect("record found above must still be present");
            assert!(
                self.allocation_count != 0,
                "live-allocation count underflow on zero-size reallocate of {old_address:#x}"
            );
            self.allocation_count -= 1;
            self.record_lifecycle(
                TrackerLogLevel::Trace,
                "reallocate",
                "zero_size_free",
                Some(old_address),
                Some(new_size),
                "freed",
            );
            return None;
        }

        // Shrink (or equal size): no reallocation, same address, recorded
        // size intentionally left at its original value.
        if new_size <= old_size {
            self.record_lifecycle(
                TrackerLogLevel::Trace,
                "reallocate",
                "shrink_noop",
                Some(old_address),
                Some(new_size),
                "success",
            );
            return Some(old_address);
        }

        // Grow: injected exactly as a fresh allocate would be.
        if self.injector.should_inject(self.allocation_count, self.call_count) {
            self.record_lifecycle(
                TrackerLogLevel::Debug,
                "reallocate",
                "fault_injected",
                Some(old_address),
                Some(new_size),
                "oom",
            );
            return None;
        }
        self.call_count += 1;

        // Materialize the replacement first; on failure the old record and
        // its buffer stay completely untouched.
        let Some(mut new_record) = AllocationRecord::new(new_size, alignment, scope) else {
            self.record_lifecycle(
                TrackerLogLevel::Warn,
                "reallocate",
                "backing_alloc_failed",
                Some(old_address),
                Some(new_size),
                "oom",
            );
            return None;
        };

        let old_record = self
            .ledger
            .remove(old_address)
            .expect("record found above must still be present");
        new_record.copy_from(&old_record, new_size.min(old_size));
        let new_address = self.ledger.add(new_record);
        // Net live count is unchanged: one record out, one in.
        self.record_lifecycle(
            TrackerLogLevel::Trace,
            "reallocate",
            "grow_move",
            Some(new_address),
            Some(new_size),
            "success",
        );
        Some(new_address)
    }

    fn free(&mut self, address: usize) {
        if address == 0 {
            self.record_lifecycle(
                TrackerLogLevel::Trace,
                "free",
                "free_null",
                None,
                None,
                "noop",
            );
            return;
        }
        let Some(record) = self.ledger.remove(address) else {
            // Tolerate foreign or already-freed pointers without crashing.
            self.record_lifecycle(
                TrackerLogLevel::Warn,
                "free",
                "unknown_address",
                Some(address),
                None,
                "noop",
            );
            return;
        };
        assert!(
            self.allocation_count != 0,
            "live-allocation count underflow on free of {address:#x}"
        );
        self.allocation_count -= 1;
        self.record_lifecycle(
            TrackerLogLevel::Trace,
            "free",
            "free",
            Some(address),
            Some(record.requested_size()),
            "success",
        );
    }
}

/// Fault-injecting allocation tracker backing one callback table.
///
/// One instance owns its ledger, counters, and configuration exclusively,
/// so multiple independent trackers can coexist in one process.
pub struct MemoryTracker {
    inner: Mutex<TrackerInner>,
}

impl MemoryTracker {
    #[must_use]
    pub fn new(config: FailureConfig) -> Self {
        Self {
            inner: Mutex::new(TrackerInner {
                injector: FailureInjector::new(config),
                ledger: Ledger::new(),
                allocation_count: 0,
                call_count: 0,
                internal_allocation_count: 0,
                internal_free_count: 0,
                next_decision_id: 1,
                lifecycle_logs: Vec::new(),
            }),
        }
    }

    /// Allocates `size` bytes at `alignment` and returns the aligned
    /// address, or `None` when failure injection fires, the alignment is
    /// invalid, or backing memory is exhausted.
    pub fn allocate(&self, size: usize, alignment: usize, scope: AllocationScope) -> Option<usize> {
        self.inner.lock().allocate(size, alignment, scope)
    }

    /// Reallocates the block at `old_address` (`0` for null) to `new_size`.
    ///
    /// Null delegates to [`allocate`](Self::allocate); zero size frees;
    /// shrink returns the same address unchanged; grow moves the block and
    /// is subject to failure injection, leaving the old block untouched on
    /// failure.
    pub fn reallocate(
        &self,
        old_address: usize,
        new_size: usize,
        alignment: usize,
        scope: AllocationScope,
    ) -> Option<usize> {
        self.inner.lock().reallocate(old_address, new_size, alignment, scope)
    }

    /// Releases the block at `address`. Null and unknown addresses are
    /// no-ops.
    pub fn free(&self, address: usize) {
        self.inner.lock().free(address);
    }

    /// Observes an internal-allocation notification from the host. Not
    /// size-accounted into the ledger.
    pub fn notify_internal_allocation(
        &self,
        size: usize,
        _kind: InternalAllocationKind,
        _scope: AllocationScope,
    ) {
        let mut inner = self.inner.lock();
        inner.internal_allocation_count += 1;
        inner.record_lifecycle(
            TrackerLogLevel::Trace,
            "internal_allocation",
            "notified",
            None,
            Some(size),
            "observed",
        );
    }

    /// Observes an internal-free notification from the host.
    pub fn notify_internal_free(
        &self,
        size: usize,
        _kind: InternalAllocationKind,
        _scope: AllocationScope,
    ) {
        let mut inner = self.inner.lock();
        inner.internal_free_count += 1;
        inner.record_lifecycle(
            TrackerLogLevel::Trace,
            "internal_free",
            "notified",
            None,
            Some(size),
            "observed",
        );
    }

    /// Replaces the failure configuration, ordered with allocation traffic.
    pub fn update_config(&self, config: FailureConfig) {
        self.inner.lock().injector.set_config(config);
    }

    /// Current failure configuration.
    #[must_use]
    pub fn config(&self) -> FailureConfig {
        self.inner.lock().injector.config()
    }

    /// Number of currently-live allocations.
    #[must_use]
    pub fn allocation_count(&self) -> usize {
        self.inner.lock().allocation_count
    }

    /// Number of allocate/grow attempts counted so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.inner.lock().call_count
    }

    /// Internal-allocation notifications observed.
    #[must_use]
    pub fn internal_allocation_count(&self) -> usize {
        self.inner.lock().internal_allocation_count
    }

    /// Internal-free notifications observed.
    #[must_use]
    pub fn internal_free_count(&self) -> usize {
        self.inner.lock().internal_free_count
    }

    /// True iff no allocations are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock();
        debug_assert_eq!(inner.allocation_count, inner.ledger.len());
        inner.allocation_count == 0
    }

    /// Teardown check: `Ok` iff the ledger is empty, otherwise a
    /// [`LeakError`] carrying what the host left behind.
    pub fn check_empty(&self) -> Result<(), LeakError> {
        let inner = self.inner.lock();
        if inner.ledger.is_empty() {
            Ok(())
        } else {
            Err(LeakError {
                live_allocations: inner.ledger.len(),
                live_bytes: inner.ledger.live_bytes(),
            })
        }
    }

    /// Requested size of the live allocation at `address`, if any.
    #[must_use]
    pub fn lookup_size(&self, address: usize) -> Option<usize> {
        self.inner
            .lock()
            .ledger
            .find(address)
            .map(AllocationRecord::requested_size)
    }

    /// Snapshot of the host-visible bytes of the live allocation at
    /// `address`, if any.
    #[must_use]
    pub fn lookup_contents(&self, address: usize) -> Option<Vec<u8>> {
        self.inner
            .lock()
            .ledger
            .find(address)
            .map(|record| record.contents().to_vec())
    }

    /// Drains buffered lifecycle log records.
    pub fn drain_lifecycle_logs(&self) -> Vec<TrackerLogRecord> {
        std::mem::take(&mut self.inner.lock().lifecycle_logs)
    }
}

impl Default for MemoryTracker {
    fn default() -> Self {
        Self::new(FailureConfig::none())
    }
}
