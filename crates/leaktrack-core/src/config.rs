//! Failure-injection configuration.
//!
//! Two independent triggers decide whether an allocate or growing-reallocate
//! attempt is made to fail, simulating host out-of-memory:
//!
//! - the *count-trigger* fires when the number of currently-live allocations
//!   equals its threshold ("out of memory once N allocations coexist");
//! - the *call-trigger* fires when the attempt ordinal equals its threshold
//!   ("fail exactly the Nth allocate-or-grow call").
//!
//! A sweeping driver typically re-runs a fixed host call sequence with the
//! call-trigger threshold incremented each iteration, which walks the
//! injected failure through every allocation call site in the host.
//!
//! Release-class operations (free, shrinking or zero-size reallocate) are
//! never subject to either trigger.

use serde::{Deserialize, Serialize};

/// Failure-injection thresholds. Both triggers are independently toggleable
/// and may be replaced at any time; the tracker serializes updates with
/// allocation traffic under its lock.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureConfig {
    /// Fail the allocation that would make the live count reach the threshold.
    pub fail_on_allocation_count: bool,
    /// Live-allocation count at which the count-trigger fires.
    pub allocation_count_threshold: usize,
    /// Fail the Nth attempted allocate-or-grow call.
    pub fail_on_call_count: bool,
    /// Attempt ordinal at which the call-trigger fires.
    pub call_count_threshold: usize,
}

impl FailureConfig {
    /// Configuration with both triggers disabled.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Count-trigger only: fail once `threshold` allocations are live.
    #[must_use]
    pub fn fail_at_allocation_count(threshold: usize) -> Self {
        Self {
            fail_on_allocation_count: true,
            allocation_count_threshold: threshold,
            ..Self::default()
        }
    }

    /// Call-trigger only: fail the `threshold`-th allocate-or-grow attempt.
    #[must_use]
    pub fn fail_at_call_count(threshold: usize) -> Self {
        Self {
            fail_on_call_count: true,
            call_count_threshold: threshold,
            ..Self::default()
        }
    }
}

/// Evaluates the configured triggers against the tracker's counters.
#[derive(Debug, Default, Clone)]
pub struct FailureInjector {
    config: FailureConfig,
}

impl FailureInjector {
    #[must_use]
    pub fn new(config: FailureConfig) -> Self {
        Self { config }
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> FailureConfig {
        self.config
    }

    /// Replaces the configuration. The caller holds the tracker lock, so the
    /// swap is ordered with respect to allocation traffic.
    pub fn set_config(&mut self, config: FailureConfig) {
        self.config = config;
    }

    /// Whether the attempt about to proceed should be failed instead.
    ///
    /// Evaluated with the counters as they stand *before* the attempt
    /// mutates anything; a firing trigger therefore leaves the counters
    /// unchanged and keeps firing until the configuration changes.
    #[must_use]
    pub fn should_inject(&self, allocation_count: usize, call_count: usize) -> bool {
        (self.config.fail_on_allocation_count
            && allocation_count == self.config.allocation_count_threshold)
            || (self.config.fail_on_call_count && call_count == self.config.call_count_threshold)
    }
}
