//! End-to-end benchmark pipeline.
//!
//! [`Pipeline`] owns one run of the sharded-filter workload:
//!
//! ```text
//! plan ──► allocate pool ──► generate keys ──► populate ──► mutate odd keys ──► query
//! ```
//!
//! Every resource (pool, key buffer) is owned by the run and released on every
//! exit path, including early errors. Nothing is kept in global state.
//!
//! The query workload keeps the even-indexed keys and replaces the odd-indexed
//! ones with fresh random keys, so about half the queries are present. The
//! found-count is therefore `retained_keys` plus the false positives among the
//! replaced keys.
//!
//! ```
//! use fuseshard::pipeline::{Pipeline, PipelineConfig};
//!
//! let config = PipelineConfig::new(4, 2)
//!     .with_total_keys(10_000)
//!     .with_max_shard_capacity(5_000)
//!     .with_seed(7);
//!
//! let report = Pipeline::new(config).unwrap().run().unwrap();
//! assert_eq!(report.retained_keys, 5_000);
//! assert!(report.found >= report.retained_keys as u64);
//! ```

use crate::core::plan::{PartitionPlan, DEFAULT_MAX_SHARD_CAPACITY, DEFAULT_TOTAL_KEYS};
use crate::error::{FuseShardError, Result};
use crate::filter::{FilterAllocator, FingerprintWidth, FuseAllocator};
use crate::sync::pool::ShardPool;
use tracing::info;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::time::{Duration, Instant};
use xorf::{BinaryFuse16, BinaryFuse32, BinaryFuse8};

/// Configuration for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PipelineConfig {
    /// Keys to generate and insert.
    pub total_keys: usize,
    /// Largest base shard size accepted by the planner.
    pub max_shard_capacity: usize,
    /// Number of sub-filters.
    pub shard_count: usize,
    /// Worker threads used to populate.
    pub thread_count: usize,
    /// RNG seed; `None` draws one from OS entropy.
    pub seed: Option<u64>,
    /// Fingerprint width of every shard filter.
    pub fingerprint: FingerprintWidth,
}

impl PipelineConfig {
    /// Configuration with the default key count and shard ceiling.
    #[must_use]
    pub fn new(shard_count: usize, thread_count: usize) -> Self {
        Self {
            total_keys: DEFAULT_TOTAL_KEYS,
            max_shard_capacity: DEFAULT_MAX_SHARD_CAPACITY,
            shard_count,
            thread_count,
            seed: None,
            fingerprint: FingerprintWidth::default(),
        }
    }

    /// Set the number of keys.
    #[must_use]
    pub fn with_total_keys(mut self, total_keys: usize) -> Self {
        self.total_keys = total_keys;
        self
    }

    /// Set the per-shard ceiling.
    #[must_use]
    pub fn with_max_shard_capacity(mut self, max_shard_capacity: usize) -> Self {
        self.max_shard_capacity = max_shard_capacity;
        self
    }

    /// Fix the RNG seed so the key workload can be regenerated.
    ///
    /// Filter construction draws its own randomness, so the false-positive part
    /// of `found` can still differ between runs with the same seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the fingerprint width.
    #[must_use]
    pub fn with_fingerprint(mut self, fingerprint: FingerprintWidth) -> Self {
        self.fingerprint = fingerprint;
        self
    }

    /// Check thread count and plan the shards without allocating anything.
    ///
    /// # Errors
    ///
    /// - [`FuseShardError::Configuration`] for a zero shard or thread count
    /// - [`FuseShardError::ShardCapacityExceeded`] if shards would be too large
    pub fn validate(&self) -> Result<PartitionPlan> {
        if self.thread_count == 0 {
            return Err(FuseShardError::configuration(
                "thread count must be greater than 0",
            ));
        }
        PartitionPlan::new(self.total_keys, self.shard_count, self.max_shard_capacity)
    }
}

/// Outcome of a pipeline run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PipelineReport {
    /// Queried keys reported present by at least one shard.
    pub found: u64,
    /// Keys inserted and queried.
    pub total_keys: usize,
    /// Queried keys that were also inserted (the even indices).
    pub retained_keys: usize,
    /// Number of shards.
    pub shard_count: usize,
    /// Worker threads used to populate.
    pub thread_count: usize,
    /// Seed the keys were drawn from.
    pub seed: u64,
    /// Filter storage across all shards.
    pub memory_bytes: usize,
    /// Time spent allocating shard filters.
    pub allocate_time: Duration,
    /// Time spent generating keys.
    pub generate_time: Duration,
    /// Time spent populating shards.
    pub populate_time: Duration,
    /// Time spent querying.
    pub query_time: Duration,
}

impl PipelineReport {
    /// Keys replaced before querying.
    #[must_use]
    pub fn replaced_keys(&self) -> usize {
        self.total_keys - self.retained_keys
    }

    /// Observed false-positive rate among the replaced keys.
    ///
    /// Assumes the retained keys were all found, which a correctly built pool
    /// guarantees. Returns 0 when nothing was replaced.
    #[must_use]
    pub fn false_positive_rate(&self) -> f64 {
        let replaced = self.replaced_keys();
        if replaced == 0 {
            return 0.0;
        }
        let false_positives = self.found.saturating_sub(self.retained_keys as u64);
        false_positives as f64 / replaced as f64
    }
}

/// One validated benchmark run.
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    plan: PartitionPlan,
}

impl Pipeline {
    /// Validate `config` and prepare a run.
    ///
    /// # Errors
    ///
    /// Any error from [`PipelineConfig::validate`]; nothing is allocated.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let plan = config.validate()?;
        Ok(Self { config, plan })
    }

    /// The validated configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The shard plan the run will use.
    #[must_use]
    pub fn plan(&self) -> &PartitionPlan {
        &self.plan
    }

    /// Execute the run with the configured fingerprint width.
    ///
    /// # Errors
    ///
    /// [`FuseShardError::Allocation`], [`FuseShardError::KeyBuffer`] or
    /// [`FuseShardError::Populate`] from the corresponding phase.
    pub fn run(&self) -> Result<PipelineReport> {
        match self.config.fingerprint {
            FingerprintWidth::Bits8 => self.run_with(FuseAllocator::<BinaryFuse8>::new()),
            FingerprintWidth::Bits16 => self.run_with(FuseAllocator::<BinaryFuse16>::new()),
            FingerprintWidth::Bits32 => self.run_with(FuseAllocator::<BinaryFuse32>::new()),
        }
    }

    /// Execute the run with a caller-supplied filter allocator.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub fn run_with<A: FilterAllocator>(&self, allocator: A) -> Result<PipelineReport> {
        let config = &self.config;
        let total = self.plan.total_keys();
        info!(
            "Dividing input data into {} chunks of size: {}",
            self.plan.shard_count(),
            self.plan.base_capacity()
        );

        let mut pool = ShardPool::new(self.plan.shard_count(), allocator)?
            .with_max_shard_capacity(self.plan.max_shard_capacity());

        let started = Instant::now();
        pool.allocate(total)?;
        let allocate_time = started.elapsed();

        let seed = config.seed.unwrap_or_else(rand::random);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let started = Instant::now();
        let mut keys = generate_keys(&mut rng, total)?;
        let generate_time = started.elapsed();

        let populated = pool.populate(&keys, config.thread_count)?;

        info!("Creating queries");
        let retained_keys = replace_odd_keys(&mut rng, &mut keys);

        info!("Querying");
        let started = Instant::now();
        let found = pool.query(&keys)?;
        let query_time = started.elapsed();
        info!("Found {} queries", found);

        Ok(PipelineReport {
            found,
            total_keys: total,
            retained_keys,
            shard_count: pool.shard_count(),
            thread_count: populated.thread_count,
            seed,
            memory_bytes: pool.memory_usage(),
            allocate_time,
            generate_time,
            populate_time: populated.elapsed,
            query_time,
        })
    }
}

/// Fill a freshly reserved buffer with `count` random keys.
///
/// # Errors
///
/// [`FuseShardError::KeyBuffer`] if the buffer cannot be reserved.
pub fn generate_keys<R: Rng>(rng: &mut R, count: usize) -> Result<Vec<u64>> {
    let mut keys = Vec::new();
    keys.try_reserve_exact(count)
        .map_err(|_| FuseShardError::KeyBuffer { requested: count })?;
    keys.extend((0..count).map(|_| rng.gen::<u64>()));
    Ok(keys)
}

/// Keep even-indexed keys, replace odd-indexed keys with fresh ones.
///
/// Returns how many keys were kept.
pub fn replace_odd_keys<R: Rng>(rng: &mut R, keys: &mut [u64]) -> usize {
    for key in keys.iter_mut().skip(1).step_by(2) {
        *key = rng.gen();
    }
    (keys.len() + 1) / 2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config(shards: usize, threads: usize) -> PipelineConfig {
        PipelineConfig::new(shards, threads)
            .with_total_keys(20_000)
            .with_max_shard_capacity(10_000)
            .with_seed(42)
    }

    #[test]
    fn test_defaults_follow_benchmark_constants() {
        let config = PipelineConfig::new(40, 8);
        assert_eq!(config.total_keys, DEFAULT_TOTAL_KEYS);
        assert_eq!(config.max_shard_capacity, DEFAULT_MAX_SHARD_CAPACITY);
        assert_eq!(config.fingerprint, FingerprintWidth::Bits32);
        assert!(config.validate().is_ok());
        assert!(PipelineConfig::new(39, 8).validate().is_err());
    }

    #[test]
    fn test_zero_counts_rejected() {
        assert!(Pipeline::new(small_config(0, 1)).unwrap_err().is_configuration());
        assert!(Pipeline::new(small_config(2, 0)).unwrap_err().is_configuration());
    }

    #[test]
    fn test_oversized_shards_rejected_before_work() {
        let err = Pipeline::new(small_config(1, 1)).unwrap_err();
        assert!(matches!(err, FuseShardError::ShardCapacityExceeded { .. }));
    }

    #[test]
    fn test_replace_odd_keys() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let original: Vec<u64> = (0..9).collect();
        let mut keys = original.clone();
        let retained = replace_odd_keys(&mut rng, &mut keys);

        assert_eq!(retained, 5);
        for (i, (&before, &after)) in original.iter().zip(&keys).enumerate() {
            if i % 2 == 0 {
                assert_eq!(before, after);
            } else {
                assert_ne!(before, after);
            }
        }
    }

    #[test]
    fn test_generate_keys_reproducible() {
        let a = generate_keys(&mut ChaCha8Rng::seed_from_u64(5), 100).unwrap();
        let b = generate_keys(&mut ChaCha8Rng::seed_from_u64(5), 100).unwrap();
        assert_eq!(a.len(), 100);
        assert_eq!(a, b);
    }

    #[test]
    fn test_run_finds_retained_keys() {
        let report = Pipeline::new(small_config(3, 2)).unwrap().run().unwrap();
        assert_eq!(report.total_keys, 20_000);
        assert_eq!(report.retained_keys, 10_000);
        assert_eq!(report.shard_count, 3);
        assert_eq!(report.seed, 42);
        assert!(report.found >= 10_000);
        // 32-bit fingerprints across 3 shards: false positives are vanishingly rare.
        assert!(report.found <= 10_001);
        assert!(report.memory_bytes >= 20_000 * 4);
    }

    #[test]
    fn test_seed_fixes_the_workload() {
        let config = small_config(4, 3).with_fingerprint(FingerprintWidth::Bits16);
        let first = Pipeline::new(config.clone()).unwrap().run().unwrap();
        let second = Pipeline::new(config).unwrap().run().unwrap();

        assert_eq!(first.seed, second.seed);
        assert_eq!(first.retained_keys, second.retained_keys);
        assert!(first.found >= first.retained_keys as u64);
        assert!(second.found >= second.retained_keys as u64);
    }

    #[test]
    fn test_unreservable_key_buffer() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let err = generate_keys(&mut rng, usize::MAX).unwrap_err();
        assert_eq!(err, FuseShardError::KeyBuffer { requested: usize::MAX });
    }

    #[test]
    fn test_false_positive_rate_8_bit() {
        let config = small_config(2, 2).with_fingerprint(FingerprintWidth::Bits8);
        let report = Pipeline::new(config).unwrap().run().unwrap();
        let rate = report.false_positive_rate();
        // Two shards at ~0.39% each.
        assert!(rate < 0.03, "rate {}", rate);
    }

    #[test]
    fn test_false_positive_rate_no_replaced_keys() {
        let report = PipelineReport {
            found: 1,
            total_keys: 1,
            retained_keys: 1,
            shard_count: 1,
            thread_count: 1,
            seed: 0,
            memory_bytes: 0,
            allocate_time: Duration::ZERO,
            generate_time: Duration::ZERO,
            populate_time: Duration::ZERO,
            query_time: Duration::ZERO,
        };
        assert_eq!(report.replaced_keys(), 0);
        assert_eq!(report.false_positive_rate(), 0.0);
    }
}
