//! Partition planning for sharded fuse filters.
//!
//! A plan splits `total_keys` into `shard_count` contiguous key ranges. Every
//! shard except the last receives `total_keys / shard_count` keys; the last shard
//! also absorbs the remainder `total_keys % shard_count`:
//!
//! ```text
//! total_keys = 102, shard_count = 4, base = 25, remainder = 2
//!
//! shard 0        shard 1        shard 2        shard 3
//! [0 .. 25)      [25 .. 50)     [50 .. 75)     [75 .. 102)
//!  cap 25         cap 25         cap 25         cap 27
//! ```
//!
//! Shard `i` always starts at `i * base`, so allocation and population derive the
//! same range from nothing but the shard index.
//!
//! # Capacity Ceiling
//!
//! A single filter is bounded by `max_shard_capacity`. A plan is rejected before any
//! allocation when the base size exceeds it:
//!
//! ```
//! use fuseshard::core::PartitionPlan;
//! use fuseshard::FuseShardError;
//!
//! let err = PartitionPlan::new(1_000, 2, 100).unwrap_err();
//! assert!(matches!(err, FuseShardError::ShardCapacityExceeded { min_shard_count: 10, .. }));
//! ```

#![allow(clippy::module_name_repetitions)]

use crate::error::{FuseShardError, Result};
use std::ops::Range;

/// Number of keys the benchmark driver generates when none is configured.
pub const DEFAULT_TOTAL_KEYS: usize = 10_000_000_000;

/// Largest base shard size accepted when none is configured.
pub const DEFAULT_MAX_SHARD_CAPACITY: usize = 250_000_000;

/// The key range and capacity assigned to one shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ShardRange {
    /// Shard index in `[0, shard_count)`.
    pub index: usize,
    /// First key index owned by the shard.
    pub offset: usize,
    /// Number of keys owned by the shard.
    pub capacity: usize,
}

impl ShardRange {
    /// One past the last key index owned by the shard.
    #[inline]
    #[must_use]
    pub fn end(&self) -> usize {
        self.offset + self.capacity
    }

    /// Half-open key index range `[offset, offset + capacity)`.
    #[inline]
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.offset..self.end()
    }
}

/// A validated split of `total_keys` into `shard_count` shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PartitionPlan {
    total_keys: usize,
    shard_count: usize,
    base_capacity: usize,
    remainder: usize,
    max_shard_capacity: usize,
}

impl PartitionPlan {
    /// Plan `total_keys` across `shard_count` shards of at most `max_shard_capacity`
    /// base keys each.
    ///
    /// # Errors
    ///
    /// - [`FuseShardError::Configuration`] if `shard_count == 0` or `max_shard_capacity == 0`
    /// - [`FuseShardError::ShardCapacityExceeded`] if `total_keys / shard_count > max_shard_capacity`
    ///
    /// # Examples
    ///
    /// ```
    /// use fuseshard::core::PartitionPlan;
    ///
    /// let plan = PartitionPlan::new(102, 4, 1_000).unwrap();
    /// assert_eq!(plan.capacities(), vec![25, 25, 25, 27]);
    /// assert_eq!(plan.shard(3).unwrap().range(), 75..102);
    /// ```
    pub fn new(total_keys: usize, shard_count: usize, max_shard_capacity: usize) -> Result<Self> {
        if shard_count == 0 {
            return Err(FuseShardError::configuration(
                "shard count must be greater than 0",
            ));
        }

        if max_shard_capacity == 0 {
            return Err(FuseShardError::configuration(
                "maximum shard capacity must be greater than 0",
            ));
        }

        let base_capacity = total_keys / shard_count;
        if base_capacity > max_shard_capacity {
            return Err(FuseShardError::ShardCapacityExceeded {
                base_capacity,
                max_capacity: max_shard_capacity,
                min_shard_count: Self::min_shard_count(total_keys, max_shard_capacity),
            });
        }

        Ok(Self {
            total_keys,
            shard_count,
            base_capacity,
            remainder: total_keys % shard_count,
            max_shard_capacity,
        })
    }

    /// Smallest shard count whose base size fits under `max_shard_capacity`.
    ///
    /// Returns at least 1. `max_shard_capacity` of 0 is treated as 1.
    ///
    /// ```
    /// use fuseshard::core::PartitionPlan;
    ///
    /// assert_eq!(PartitionPlan::min_shard_count(10_000_000_000, 250_000_000), 40);
    /// assert_eq!(PartitionPlan::min_shard_count(1_000, 100), 10);
    /// assert_eq!(PartitionPlan::min_shard_count(0, 100), 1);
    /// ```
    #[must_use]
    pub fn min_shard_count(total_keys: usize, max_shard_capacity: usize) -> usize {
        let max = max_shard_capacity.max(1);
        // total / n <= max  <=>  n > total / (max + 1)
        total_keys / max.saturating_add(1) + 1
    }

    /// Total number of keys covered by the plan.
    #[inline]
    #[must_use]
    pub fn total_keys(&self) -> usize {
        self.total_keys
    }

    /// Number of shards.
    #[inline]
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shard_count
    }

    /// `total_keys / shard_count`, the capacity of every shard but the last.
    #[inline]
    #[must_use]
    pub fn base_capacity(&self) -> usize {
        self.base_capacity
    }

    /// `total_keys % shard_count`, absorbed by the last shard.
    #[inline]
    #[must_use]
    pub fn remainder(&self) -> usize {
        self.remainder
    }

    /// Per-shard ceiling the plan was validated against.
    #[inline]
    #[must_use]
    pub fn max_shard_capacity(&self) -> usize {
        self.max_shard_capacity
    }

    /// Capacity of shard `index`. Out-of-range indices have capacity 0.
    #[inline]
    #[must_use]
    pub fn capacity_of(&self, index: usize) -> usize {
        if index >= self.shard_count {
            0
        } else if index == self.shard_count - 1 {
            self.base_capacity + self.remainder
        } else {
            self.base_capacity
        }
    }

    /// Range owned by shard `index`, or `None` if the index is out of range.
    #[must_use]
    pub fn shard(&self, index: usize) -> Option<ShardRange> {
        if index >= self.shard_count {
            return None;
        }
        Some(ShardRange {
            index,
            offset: index * self.base_capacity,
            capacity: self.capacity_of(index),
        })
    }

    /// All shard ranges in index order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = ShardRange> + '_ {
        (0..self.shard_count).map(move |i| ShardRange {
            index: i,
            offset: i * self.base_capacity,
            capacity: self.capacity_of(i),
        })
    }

    /// Capacities in shard index order.
    #[must_use]
    pub fn capacities(&self) -> Vec<usize> {
        self.iter().map(|r| r.capacity).collect()
    }

    /// Offsets in shard index order.
    #[must_use]
    pub fn offsets(&self) -> Vec<usize> {
        self.iter().map(|r| r.offset).collect()
    }

    /// Capacity of the largest shard (always the last one).
    #[must_use]
    pub fn largest_capacity(&self) -> usize {
        self.base_capacity + self.remainder
    }
}
