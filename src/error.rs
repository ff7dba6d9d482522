//! Error types for fuseshard operations.
//!
//! Two layers of errors exist:
//!
//! - [`FilterError`] is what a single shard filter (the collaborator behind
//!   [`ShardFilter`](crate::filter::ShardFilter)) reports for one allocate or
//!   populate call.
//! - [`FuseShardError`] is what the planner, the executor and the shard pool
//!   report to their callers. Per-shard populate failures are aggregated into one
//!   [`FuseShardError::Populate`] value after every worker has returned.
//!
//! # Error Propagation
//!
//! ```
//! use fuseshard::{Result, FuseShardError};
//! use fuseshard::core::PartitionPlan;
//!
//! fn plan_for(total: usize, shards: usize) -> Result<PartitionPlan> {
//!     let plan = PartitionPlan::new(total, shards, 1_000)?;
//!     Ok(plan)
//! }
//! # assert!(plan_for(4_000, 4).is_ok());
//! # assert!(matches!(plan_for(4_000, 2), Err(FuseShardError::ShardCapacityExceeded { .. })));
//! ```

#![allow(clippy::module_name_repetitions)]

use std::fmt;

/// Result type alias for fuseshard operations.
pub type Result<T> = std::result::Result<T, FuseShardError>;

/// Failure reported by a single shard filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// The filter could not reserve storage for the requested capacity.
    AllocationFailed {
        /// Requested capacity in keys.
        capacity: usize,
        /// Why the allocation was refused.
        reason: String,
    },

    /// Construction from the key slice failed (e.g. the peeling never converged).
    ConstructionFailed {
        /// Description reported by the filter implementation.
        reason: String,
    },

    /// The key slice handed to `populate` does not match the allocated capacity.
    CapacityMismatch {
        /// Capacity the filter was allocated with.
        expected: usize,
        /// Number of keys actually supplied.
        actual: usize,
    },

    /// The filter was already built; filters are immutable once populated.
    AlreadyPopulated,

    /// The shard was never dispatched because population was cancelled.
    Cancelled,
}

impl FilterError {
    /// Create an `AllocationFailed` error.
    #[must_use]
    pub fn allocation_failed(capacity: usize, reason: impl Into<String>) -> Self {
        Self::AllocationFailed {
            capacity,
            reason: reason.into(),
        }
    }

    /// Create a `ConstructionFailed` error.
    #[must_use]
    pub fn construction_failed(reason: impl Into<String>) -> Self {
        Self::ConstructionFailed {
            reason: reason.into(),
        }
    }

    /// Create a `CapacityMismatch` error.
    #[must_use]
    pub fn capacity_mismatch(expected: usize, actual: usize) -> Self {
        Self::CapacityMismatch { expected, actual }
    }
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocationFailed { capacity, reason } => {
                write!(f, "could not allocate filter for {} keys: {}", capacity, reason)
            }
            Self::ConstructionFailed { reason } => {
                write!(f, "filter construction failed: {}", reason)
            }
            Self::CapacityMismatch { expected, actual } => {
                write!(
                    f,
                    "filter allocated for {} keys was given {} keys",
                    expected, actual
                )
            }
            Self::AlreadyPopulated => write!(f, "filter is already populated"),
            Self::Cancelled => write!(f, "population cancelled before this shard started"),
        }
    }
}

impl std::error::Error for FilterError {}

/// One shard that failed to populate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardFailure {
    /// Shard index.
    pub shard: usize,
    /// First key index of the shard's range.
    pub offset: usize,
    /// Number of keys in the shard's range.
    pub capacity: usize,
    /// What the filter reported.
    pub error: FilterError,
}

impl fmt::Display for ShardFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "shard {} (keys [{}..{})): {}",
            self.shard,
            self.offset,
            self.offset + self.capacity,
            self.error
        )
    }
}

/// Errors that can occur while planning, building or querying a shard pool.
#[derive(Debug, Clone, PartialEq)]
pub enum FuseShardError {
    /// Invalid configuration detected before any resource was allocated.
    Configuration {
        /// Human-readable description of what's invalid.
        message: String,
    },

    /// The base shard size exceeds the configured per-shard ceiling.
    ///
    /// The caller must pick a larger shard count or a smaller input.
    ShardCapacityExceeded {
        /// `total_keys / shard_count`.
        base_capacity: usize,
        /// Configured maximum keys per shard.
        max_capacity: usize,
        /// Smallest shard count that satisfies the ceiling.
        min_shard_count: usize,
    },

    /// A shard's filter could not be allocated. Earlier shards were rolled back.
    Allocation {
        /// Index of the shard whose allocation failed.
        shard: usize,
        /// Cause reported by the filter allocator.
        error: FilterError,
    },

    /// The key buffer for a run could not be reserved.
    KeyBuffer {
        /// Number of keys requested.
        requested: usize,
    },

    /// At least one shard failed to populate. Every failing shard is listed.
    Populate {
        /// Failures in shard index order.
        failures: Vec<ShardFailure>,
    },

    /// Population was cancelled before every shard was dispatched.
    Cancelled {
        /// Shards built before cancellation was observed.
        completed: usize,
        /// Shards never started.
        skipped: usize,
    },

    /// The key slice supplied to `populate` does not match the allocated total.
    KeyCountMismatch {
        /// Total the pool was allocated for.
        expected: usize,
        /// Length of the slice supplied.
        actual: usize,
    },

    /// Operation not valid in the pool's current lifecycle state.
    InvalidState {
        /// Operation attempted.
        operation: &'static str,
        /// State the pool was in.
        state: &'static str,
    },

    /// The worker pool could not be started.
    Executor {
        /// Description from the thread pool builder.
        message: String,
    },
}

impl fmt::Display for FuseShardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration { message } => {
                write!(f, "Invalid configuration: {}.", message)
            }
            Self::ShardCapacityExceeded {
                base_capacity,
                max_capacity,
                min_shard_count,
            } => {
                write!(
                    f,
                    "Shard capacity {} exceeds the maximum of {} keys per shard. \
                     Use at least {} shards.",
                    base_capacity, max_capacity, min_shard_count
                )
            }
            Self::Allocation { shard, error } => {
                write!(f, "Allocation of shard {} failed: {}.", shard, error)
            }
            Self::KeyBuffer { requested } => {
                write!(f, "Could not reserve a key buffer for {} keys.", requested)
            }
            Self::Populate { failures } => {
                write!(f, "{} shard(s) failed to populate", failures.len())?;
                for failure in failures {
                    write!(f, "; {}", failure)?;
                }
                write!(f, ".")
            }
            Self::Cancelled { completed, skipped } => {
                write!(
                    f,
                    "Population cancelled: {} shard(s) built, {} skipped.",
                    completed, skipped
                )
            }
            Self::KeyCountMismatch { expected, actual } => {
                write!(
                    f,
                    "Pool was allocated for {} keys but {} keys were supplied.",
                    expected, actual
                )
            }
            Self::InvalidState { operation, state } => {
                write!(f, "Cannot {} a pool in state '{}'.", operation, state)
            }
            Self::Executor { message } => {
                write!(f, "Worker pool error: {}.", message)
            }
        }
    }
}

impl std::error::Error for FuseShardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Allocation { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl FuseShardError {
    /// Create a `Configuration` error with a formatted message.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an `Allocation` error for `shard`.
    #[must_use]
    pub fn allocation(shard: usize, error: FilterError) -> Self {
        Self::Allocation { shard, error }
    }

    /// Create an `InvalidState` error.
    #[must_use]
    pub fn invalid_state(operation: &'static str, state: &'static str) -> Self {
        Self::InvalidState { operation, state }
    }

    /// Create an `Executor` error.
    #[must_use]
    pub fn executor(message: impl Into<String>) -> Self {
        Self::Executor {
            message: message.into(),
        }
    }

    /// True for errors raised before any resource was committed.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::ShardCapacityExceeded { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_configuration() {
        let err = FuseShardError::configuration("shard count must be greater than 0");
        let display = format!("{err}");
        assert!(display.contains("Invalid configuration"));
        assert!(display.contains("greater than 0"));
        assert!(display.ends_with('.'));
    }

    #[test]
    fn test_error_display_capacity_exceeded() {
        let err = FuseShardError::ShardCapacityExceeded {
            base_capacity: 500,
            max_capacity: 250,
            min_shard_count: 8,
        };
        let display = format!("{err}");
        assert!(display.contains("500"));
        assert!(display.contains("250"));
        assert!(display.contains("at least 8 shards"));
    }

    #[test]
    fn test_error_display_populate_lists_every_shard() {
        let err = FuseShardError::Populate {
            failures: vec![
                ShardFailure {
                    shard: 1,
                    offset: 25,
                    capacity: 25,
                    error: FilterError::construction_failed("peeling stalled"),
                },
                ShardFailure {
                    shard: 3,
                    offset: 75,
                    capacity: 27,
                    error: FilterError::capacity_mismatch(27, 26),
                },
            ],
        };
        let display = format!("{err}");
        assert!(display.starts_with("2 shard(s)"));
        assert!(display.contains("shard 1 (keys [25..50))"));
        assert!(display.contains("peeling stalled"));
        assert!(display.contains("shard 3 (keys [75..102))"));
    }

    #[test]
    fn test_allocation_error_has_source() {
        use std::error::Error;

        let err = FuseShardError::allocation(2, FilterError::allocation_failed(10, "oom"));
        assert!(err.source().is_some());
        assert!(format!("{err}").contains("shard 2"));
    }

    #[test]
    fn test_is_configuration() {
        assert!(FuseShardError::configuration("x").is_configuration());
        assert!(!FuseShardError::invalid_state("query", "empty").is_configuration());
    }

    #[test]
    fn test_filter_error_display() {
        let err = FilterError::capacity_mismatch(10, 9);
        assert_eq!(format!("{err}"), "filter allocated for 10 keys was given 9 keys");
        assert!(format!("{}", FilterError::Cancelled).contains("cancelled"));
    }

    #[test]
    fn test_error_propagation_with_question_mark() {
        fn inner() -> Result<()> {
            Err(FuseShardError::configuration("thread count must be greater than 0"))
        }

        fn outer() -> Result<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}
