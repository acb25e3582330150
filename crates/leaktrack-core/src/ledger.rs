//! Live-allocation ledger.
//!
//! The ledger owns every raw backing buffer handed out to the host and keys
//! the records by their aligned address. It is pure bookkeeping: the tracker
//! decides *whether* an operation proceeds, the ledger records *what* is
//! live. Holding at most one record per address is a hard invariant; a
//! duplicate insertion means the harness's own bookkeeping is broken and
//! aborts loudly rather than corrupting counts.

use std::collections::HashMap;

use crate::align::{self, MIN_BACKING_SIZE};

/// Pre-reserved ledger capacity; loader-style hosts routinely make a few
/// hundred allocations per construction sequence.
const LEDGER_INITIAL_CAPACITY: usize = 512;

/// Opaque allocation-scope tag supplied by the host on every call.
///
/// Passed through to records and notifications uninterpreted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct AllocationScope(pub u32);

/// One live allocation: the owned backing buffer plus its metadata.
///
/// The backing buffer is `padded_size` bytes; the host-visible region starts
/// at the aligned offset inside it. The buffer's heap storage never moves
/// while the record lives, so the aligned address is stable.
#[derive(Debug)]
pub struct AllocationRecord {
    backing: Vec<u8>,
    address: usize,
    aligned_offset: usize,
    requested_size: usize,
    padded_size: usize,
    scope: AllocationScope,
}

impl AllocationRecord {
    /// Materializes a new padded backing buffer for a `size`-byte request.
    ///
    /// This is the only place raw buffers are born. Returns `None` when the
    /// alignment is invalid, the padded size overflows, or the system
    /// allocator itself is out of memory (`try_reserve_exact`); all three
    /// surface to the host as a null result, independent of failure
    /// injection.
    #[must_use]
    pub fn new(size: usize, alignment: usize, scope: AllocationScope) -> Option<Self> {
        let padded = align::padded_size(size, alignment)?;
        let mut backing: Vec<u8> = Vec::new();
        backing.try_reserve_exact(padded).ok()?;
        backing.resize(padded, 0);
        let base = backing.as_ptr() as usize;
        let aligned = align::align_up(base, alignment)?;
        debug_assert!(aligned - base < alignment.max(1));
        Some(Self {
            backing,
            address: aligned,
            aligned_offset: aligned - base,
            requested_size: size,
            padded_size: padded,
            scope,
        })
    }

    /// The aligned, host-visible address of this allocation.
    ///
    /// The `Vec`'s heap storage never moves once materialized, so the
    /// address recorded at construction stays valid for the record's life.
    #[must_use]
    pub fn address(&self) -> usize {
        self.address
    }

    /// Size the host asked for. Deliberately *not* updated by a shrinking
    /// reallocate; shrink is a pure no-op on the existing buffer.
    #[must_use]
    pub fn requested_size(&self) -> usize {
        self.requested_size
    }

    /// Backing-buffer size including alignment slack.
    #[must_use]
    pub fn padded_size(&self) -> usize {
        self.padded_size
    }

    /// Scope tag recorded at allocation time.
    #[must_use]
    pub fn scope(&self) -> AllocationScope {
        self.scope
    }

    /// Host-visible bytes of this allocation.
    #[must_use]
    pub fn contents(&self) -> &[u8] {
        let len = self.requested_size.max(MIN_BACKING_SIZE);
        &self.backing[self.aligned_offset..self.aligned_offset + len]
    }

    /// Copies the first `len` bytes of `old`'s host-visible region into this
    /// record's host-visible region. `len` must not exceed either requested
    /// size; the growing-reallocate path passes `min(new, old)`.
    pub(crate) fn copy_from(&mut self, old: &AllocationRecord, len: usize) {
        debug_assert!(len <= self.requested_size.max(MIN_BACKING_SIZE));
        debug_assert!(len <= old.requested_size.max(MIN_BACKING_SIZE));
        let dst_start = self.aligned_offset;
        self.backing[dst_start..dst_start + len]
            .copy_from_slice(&old.backing[old.aligned_offset..old.aligned_offset + len]);
    }
}

/// The set of currently-live allocation records, keyed by aligned address.
#[derive(Debug)]
pub struct Ledger {
    records: HashMap<usize, AllocationRecord>,
}

impl Ledger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: HashMap::with_capacity(LEDGER_INITIAL_CAPACITY),
        }
    }

    /// Inserts a record, returning its address.
    ///
    /// Two live records with one address means the harness itself is broken;
    /// this aborts rather than silently continuing.
    pub fn add(&mut self, record: AllocationRecord) -> usize {
        let address = record.address();
        let previous = self.records.insert(address, record);
        assert!(
            previous.is_none(),
            "allocation ledger already holds a record for address {address:#x}"
        );
        address
    }

    /// Looks up a live record by address.
    #[must_use]
    pub fn find(&self, address: usize) -> Option<&AllocationRecord> {
        self.records.get(&address)
    }

    /// Removes and returns the record at `address`, if live.
    pub fn remove(&mut self, address: usize) -> Option<AllocationRecord> {
        self.records.remove(&address)
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sum of the requested sizes of all live records.
    #[must_use]
    pub fn live_bytes(&self) -> usize {
        self.records.values().map(AllocationRecord::requested_size).sum()
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}
