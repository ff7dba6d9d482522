//! Shard pool: a fixed array of independently built filters.
//!
//! # Architecture
//!
//! ```text
//! keys: [ 0 ............................................ total )
//!        │ shard 0 │ shard 1 │ shard 2 │ ... │ shard n-1 (+rem) │
//!             │         │         │                 │
//!        ┌────┴───┐┌────┴───┐┌────┴───┐       ┌────┴───┐
//!        │filter 0││filter 1││filter 2│  ...  │filter n-1│   built in parallel
//!        └────────┘└────────┘└────────┘       └────────┘
//!
//! query(key) = filter 0 ∨ filter 1 ∨ ... ∨ filter n-1   (first hit wins)
//! ```
//!
//! # Lifecycle
//!
//! ```text
//! Empty ──allocate──► Allocated ──populate──► Populated ──query──► (repeat)
//!   │                     │
//!   └── alloc failure ──► Failed ◄── populate failure
//! ```
//!
//! Every transition is one-way. A `Failed` pool holds no filters and must be
//! discarded; rebuilding means creating a new pool.
//!
//! # Failure Policy
//!
//! - Allocation stops at the first failing shard and releases every shard
//!   allocated before it.
//! - Population runs every shard to completion, then fails the whole call if
//!   any shard failed, listing all of them. Built shards are released so that a
//!   partially populated pool can never answer queries.
//!
//! # Examples
//!
//! ```
//! use fuseshard::filter::FuseAllocator;
//! use fuseshard::sync::ShardPool;
//! use xorf::BinaryFuse32;
//!
//! let keys: Vec<u64> = (0..1_000u64).map(|i| i.wrapping_mul(0x9E37_79B9_7F4A_7C15)).collect();
//!
//! let mut pool = ShardPool::new(5, FuseAllocator::<BinaryFuse32>::new()).unwrap();
//! pool.allocate(keys.len()).unwrap();
//! pool.populate(&keys, 2).unwrap();
//! assert_eq!(pool.query(&keys).unwrap(), 1_000);
//! ```

use crate::core::plan::{PartitionPlan, ShardRange, DEFAULT_MAX_SHARD_CAPACITY};
use crate::error::{FilterError, FuseShardError, Result, ShardFailure};
use crate::filter::{FilterAllocator, ShardFilter};
use crate::sync::executor::{CancellationToken, ParallelExecutor};
use tracing::{debug, info, warn};
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

/// Lifecycle state of a [`ShardPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolState {
    /// Created, no capacity committed.
    Empty,
    /// Every shard allocated, none populated.
    Allocated,
    /// Every shard populated; queries allowed.
    Populated,
    /// Allocation or population failed; all filters were released.
    Failed,
}

impl PoolState {
    /// Lowercase name used in errors and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Allocated => "allocated",
            Self::Populated => "populated",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of a successful populate call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulateReport {
    /// Shards built.
    pub shard_count: usize,
    /// Keys inserted across all shards.
    pub total_keys: usize,
    /// Worker threads requested.
    pub thread_count: usize,
    /// Distinct workers that built at least one shard.
    pub workers_used: usize,
    /// Wall time for the whole call.
    pub elapsed: Duration,
}

/// Per-shard statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardStats {
    /// Shard index.
    pub shard_id: usize,
    /// Key range assigned to the shard, if the pool has a plan.
    pub range: Option<ShardRange>,
    /// Whether a filter is currently held for this shard.
    pub allocated: bool,
    /// Whether that filter has been populated.
    pub populated: bool,
    /// Filter storage in bytes.
    pub size_in_bytes: usize,
}

/// Owns `shard_count` filters and coordinates bulk allocate/populate/query.
///
/// The slot array always has exactly `shard_count` entries; a slot is `None`
/// until allocated and again after release.
pub struct ShardPool<A: FilterAllocator> {
    allocator: A,
    max_shard_capacity: usize,
    plan: Option<PartitionPlan>,
    shards: Box<[Option<A::Filter>]>,
    state: PoolState,
}

impl<A: FilterAllocator> ShardPool<A> {
    /// Create an empty pool of `shard_count` shards.
    ///
    /// The per-shard ceiling defaults to [`DEFAULT_MAX_SHARD_CAPACITY`].
    ///
    /// # Errors
    ///
    /// [`FuseShardError::Configuration`] if `shard_count == 0`.
    pub fn new(shard_count: usize, allocator: A) -> Result<Self> {
        if shard_count == 0 {
            return Err(FuseShardError::configuration(
                "shard count must be greater than 0",
            ));
        }

        let shards: Box<[Option<A::Filter>]> = (0..shard_count).map(|_| None).collect();
        Ok(Self {
            allocator,
            max_shard_capacity: DEFAULT_MAX_SHARD_CAPACITY,
            plan: None,
            shards,
            state: PoolState::Empty,
        })
    }

    /// Set the largest base shard size `allocate` will accept.
    #[must_use]
    pub fn with_max_shard_capacity(mut self, max_shard_capacity: usize) -> Self {
        self.max_shard_capacity = max_shard_capacity;
        self
    }

    /// Number of shards.
    #[inline]
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> PoolState {
        self.state
    }

    /// Plan committed by `allocate`, if any.
    #[must_use]
    pub fn plan(&self) -> Option<&PartitionPlan> {
        self.plan.as_ref()
    }

    /// The allocator shards are created with.
    #[must_use]
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Per-shard ceiling used by `allocate`.
    #[must_use]
    pub fn max_shard_capacity(&self) -> usize {
        self.max_shard_capacity
    }

    /// Plan `total_keys` across the shards and allocate every filter.
    ///
    /// # Errors
    ///
    /// - [`FuseShardError::InvalidState`] unless the pool is `Empty`
    /// - planner errors ([`FuseShardError::Configuration`],
    ///   [`FuseShardError::ShardCapacityExceeded`]); nothing is allocated and the
    ///   pool stays `Empty`
    /// - [`FuseShardError::Allocation`] if a shard's filter cannot be allocated;
    ///   shards allocated before it are released and the pool becomes `Failed`
    pub fn allocate(&mut self, total_keys: usize) -> Result<()> {
        if self.state != PoolState::Empty {
            return Err(FuseShardError::invalid_state("allocate", self.state.as_str()));
        }

        let plan = PartitionPlan::new(total_keys, self.shard_count(), self.max_shard_capacity)?;
        info!(
            "Allocating {} {} filters ({} keys each, last shard {})",
            plan.shard_count(),
            self.allocator.name(),
            plan.base_capacity(),
            plan.largest_capacity()
        );

        for range in plan.iter() {
            match self.allocator.allocate(range.capacity) {
                Ok(filter) => self.shards[range.index] = Some(filter),
                Err(error) => {
                    let released = self.release_all();
                    warn!(
                        "shard {} allocation of {} keys failed: {}; released {} shard(s)",
                        range.index, range.capacity, error, released
                    );
                    self.state = PoolState::Failed;
                    return Err(FuseShardError::allocation(range.index, error));
                }
            }
        }

        self.plan = Some(plan);
        self.state = PoolState::Allocated;
        Ok(())
    }

    /// Populate every shard from its key range using `thread_count` workers.
    ///
    /// `keys` is only borrowed for the duration of the call.
    ///
    /// # Errors
    ///
    /// - [`FuseShardError::InvalidState`] unless the pool is `Allocated`
    /// - [`FuseShardError::KeyCountMismatch`] if `keys.len()` differs from the
    ///   allocated total; no shard is touched
    /// - [`FuseShardError::Configuration`] if `thread_count == 0`
    /// - [`FuseShardError::Populate`] if any shard failed; the pool becomes `Failed`
    pub fn populate(&mut self, keys: &[u64], thread_count: usize) -> Result<PopulateReport> {
        self.populate_with_cancel(keys, thread_count, &CancellationToken::new())
    }

    /// Like [`populate`](Self::populate), observing `cancel` before each shard starts.
    ///
    /// A shard already being built finishes. If cancellation skipped any shard the
    /// call returns [`FuseShardError::Cancelled`] and the pool becomes `Failed`.
    pub fn populate_with_cancel(
        &mut self,
        keys: &[u64],
        thread_count: usize,
        cancel: &CancellationToken,
    ) -> Result<PopulateReport> {
        let plan = match (self.state, self.plan) {
            (PoolState::Allocated, Some(plan)) => plan,
            (state, _) => {
                return Err(FuseShardError::invalid_state("populate", state.as_str()));
            }
        };

        if keys.len() != plan.total_keys() {
            return Err(FuseShardError::KeyCountMismatch {
                expected: plan.total_keys(),
                actual: keys.len(),
            });
        }

        let executor = ParallelExecutor::new(thread_count)?;
        info!(
            "Populating {} shards from {} keys on {} thread(s)",
            plan.shard_count(),
            keys.len(),
            executor.thread_count()
        );

        let started = Instant::now();
        let outcomes = executor.run_mut(&mut self.shards, |index, slot, worker| {
            (populate_shard(&plan, index, slot, keys, cancel), worker)
        });
        let elapsed = started.elapsed();

        let mut workers = HashSet::new();
        let mut failures = Vec::new();
        for (index, (outcome, worker)) in outcomes.into_iter().enumerate() {
            if let Err(error) = outcome {
                let range = plan.shard(index).unwrap_or(ShardRange {
                    index,
                    offset: 0,
                    capacity: 0,
                });
                failures.push(ShardFailure {
                    shard: index,
                    offset: range.offset,
                    capacity: range.capacity,
                    error,
                });
            } else {
                workers.insert(worker);
            }
        }

        if !failures.is_empty() {
            return Err(self.fail_populate(failures));
        }

        self.state = PoolState::Populated;
        info!(
            "Populated {} shards in {:.3}s",
            plan.shard_count(),
            elapsed.as_secs_f64()
        );
        Ok(PopulateReport {
            shard_count: plan.shard_count(),
            total_keys: plan.total_keys(),
            thread_count: executor.thread_count(),
            workers_used: workers.len(),
            elapsed,
        })
    }

    fn fail_populate(&mut self, failures: Vec<ShardFailure>) -> FuseShardError {
        let released = self.release_all();
        self.state = PoolState::Failed;

        let skipped = failures
            .iter()
            .filter(|f| f.error == FilterError::Cancelled)
            .count();
        if skipped == failures.len() {
            warn!(
                "population cancelled: {} shard(s) skipped, {} released",
                skipped, released
            );
            return FuseShardError::Cancelled {
                completed: self.shard_count() - skipped,
                skipped,
            };
        }

        for failure in &failures {
            warn!("populate failed for {}", failure);
        }
        warn!(
            "{} of {} shard(s) failed to populate; released {} filter(s)",
            failures.len(),
            self.shard_count(),
            released
        );
        FuseShardError::Populate { failures }
    }

    /// Returns `true` if any shard reports `key` present.
    ///
    /// Shards are probed in index order and probing stops at the first hit.
    /// A pool that is not populated never reports containment.
    #[inline]
    #[must_use]
    pub fn contains(&self, key: u64) -> bool {
        self.shards.iter().flatten().any(|filter| filter.contains(key))
    }

    /// Count the keys for which at least one shard reports containment.
    ///
    /// Sequential scan; read-only and repeatable.
    ///
    /// # Errors
    ///
    /// [`FuseShardError::InvalidState`] unless the pool is `Populated`.
    pub fn query(&self, keys: &[u64]) -> Result<u64> {
        self.ensure_queryable()?;
        Ok(count_found(self, keys))
    }

    /// Same result as [`query`](Self::query), with the key array split across
    /// `thread_count` workers.
    ///
    /// # Errors
    ///
    /// - [`FuseShardError::InvalidState`] unless the pool is `Populated`
    /// - [`FuseShardError::Configuration`] if `thread_count == 0`
    pub fn query_parallel(&self, keys: &[u64], thread_count: usize) -> Result<u64> {
        self.ensure_queryable()?;
        let executor = ParallelExecutor::new(thread_count)?;
        if keys.is_empty() {
            return Ok(0);
        }

        let chunks: Vec<&[u64]> = keys
            .chunks(query_chunk_len(keys.len(), thread_count))
            .collect();
        let counts = executor.run(chunks.len(), |i, _| count_found(self, chunks[i]));
        Ok(counts.into_iter().sum())
    }

    fn ensure_queryable(&self) -> Result<()> {
        if self.state == PoolState::Populated {
            Ok(())
        } else {
            Err(FuseShardError::invalid_state("query", self.state.as_str()))
        }
    }

    /// Statistics for every shard, in index order.
    #[must_use]
    pub fn shard_stats(&self) -> Vec<ShardStats> {
        self.shards
            .iter()
            .enumerate()
            .map(|(index, slot)| ShardStats {
                shard_id: index,
                range: self.plan.and_then(|plan| plan.shard(index)),
                allocated: slot.is_some(),
                populated: slot.as_ref().map_or(false, ShardFilter::is_populated),
                size_in_bytes: slot.as_ref().map_or(0, ShardFilter::size_in_bytes),
            })
            .collect()
    }

    /// Total filter storage in bytes.
    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.shards
            .iter()
            .flatten()
            .map(ShardFilter::size_in_bytes)
            .sum()
    }

    /// Release every filter and the pool. Returns how many filters were released.
    ///
    /// Dropping the pool has the same effect; this form reports the count.
    pub fn destroy(mut self) -> usize {
        self.release_all()
    }

    fn release_all(&mut self) -> usize {
        let mut released = 0;
        for slot in self.shards.iter_mut() {
            if slot.take().is_some() {
                released += 1;
            }
        }
        released
    }
}

impl<A: FilterAllocator> Drop for ShardPool<A> {
    fn drop(&mut self) {
        let released = self.release_all();
        if released > 0 {
            debug!("released {} shard filter(s)", released);
        }
    }
}

impl<A: FilterAllocator> fmt::Debug for ShardPool<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardPool")
            .field("shard_count", &self.shard_count())
            .field("state", &self.state)
            .field("plan", &self.plan)
            .field("allocator", &self.allocator.name())
            .finish()
    }
}

fn populate_shard<F: ShardFilter>(
    plan: &PartitionPlan,
    index: usize,
    slot: &mut Option<F>,
    keys: &[u64],
    cancel: &CancellationToken,
) -> std::result::Result<(), FilterError> {
    if cancel.is_cancelled() {
        return Err(FilterError::Cancelled);
    }

    let range = plan
        .shard(index)
        .ok_or_else(|| FilterError::construction_failed("shard index outside plan"))?;
    let Some(filter) = slot.as_mut() else {
        return Err(FilterError::construction_failed("shard was not allocated"));
    };

    let slice = &keys[range.range()];
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| filter.populate(slice)))
        .unwrap_or_else(|payload| {
            Err(FilterError::construction_failed(format!(
                "panicked: {}",
                panic_message(payload.as_ref())
            )))
        });

    if outcome.is_ok() {
        debug!(
            "shard {} populated from keys [{}..{})",
            index,
            range.offset,
            range.end()
        );
    }
    outcome
}

/// Chunk length giving each worker about four chunks of the key array.
fn query_chunk_len(key_count: usize, thread_count: usize) -> usize {
    let target_chunks = thread_count.saturating_mul(4).max(1);
    let chunk_len = key_count / target_chunks + usize::from(key_count % target_chunks != 0);
    chunk_len.max(1)
}

fn count_found<A: FilterAllocator>(pool: &ShardPool<A>, keys: &[u64]) -> u64 {
    keys.iter().filter(|&&key| pool.contains(key)).count() as u64
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
