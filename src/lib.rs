//! fuseshard: sharded binary fuse filters for very large key sets.
//!
//! A single binary fuse filter is built once from a fixed key set and has a
//! practical size ceiling. fuseshard splits billions of keys into contiguous
//! ranges, builds one filter per range in parallel, and answers membership by
//! probing every shard: a key is found if **any** shard reports it.
//!
//! # Quick Start
//!
//! ```
//! use fuseshard::filter::FuseAllocator;
//! use fuseshard::sync::ShardPool;
//! use xorf::BinaryFuse32;
//!
//! let keys: Vec<u64> = (0..10_000u64).map(|i| i.wrapping_mul(0x9E37_79B9_7F4A_7C15)).collect();
//!
//! let mut pool = ShardPool::new(4, FuseAllocator::<BinaryFuse32>::new()).unwrap();
//! pool.allocate(keys.len()).unwrap();      // plan + allocate every shard
//! pool.populate(&keys, 4).unwrap();        // build shards on 4 workers
//!
//! assert_eq!(pool.query(&keys).unwrap(), 10_000);
//! assert!(pool.contains(keys[1234]));
//! ```
//!
//! # Components
//!
//! | Component | Type | Role |
//! |-----------|------|------|
//! | Partition planner | [`PartitionPlan`](crate::core::PartitionPlan) | key range and capacity per shard, capacity ceiling |
//! | Single filter | [`filter::ShardFilter`] | opaque allocate / populate / contains |
//! | Parallel executor | [`sync::ParallelExecutor`] | bounded worker pool over `0..n` |
//! | Shard pool | [`sync::ShardPool`] | owns the filters, coordinates bulk operations |
//! | Driver | [`pipeline::Pipeline`] | end-to-end benchmark run |
//!
//! # False Positives
//!
//! Probing `s` shards compounds the per-filter false-positive rate `ε` to roughly
//! `1 - (1 - ε)^s ≈ s·ε`. Populated keys are never missed.
//!
//! # Features
//!
//! - `serde` - `Serialize`/`Deserialize` for plans, configs and reports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Partition planning
pub mod core;

/// Error types and result aliases
pub mod error;

/// Single-filter contract and the binary fuse implementation
pub mod filter;

/// Parallel executor and shard pool
pub mod sync;

/// End-to-end benchmark pipeline
pub mod pipeline;

// Re-export commonly used types at crate root
pub use error::{FilterError, FuseShardError, Result, ShardFailure};

pub use crate::core::{PartitionPlan, ShardRange};
pub use filter::{FilterAllocator, FingerprintWidth, FuseAllocator, ShardFilter};
pub use pipeline::{Pipeline, PipelineConfig, PipelineReport};
pub use sync::{CancellationToken, ParallelExecutor, PoolState, ShardPool};

/// Prelude module for convenient imports.
///
/// ```
/// use fuseshard::prelude::*;
///
/// let plan = PartitionPlan::new(102, 4, 100).unwrap();
/// assert_eq!(plan.capacities(), vec![25, 25, 25, 27]);
/// ```
pub mod prelude {
    pub use crate::core::{PartitionPlan, ShardRange};
    pub use crate::error::{FilterError, FuseShardError, Result};
    pub use crate::filter::{FilterAllocator, FingerprintWidth, FuseAllocator, ShardFilter};
    pub use crate::pipeline::{Pipeline, PipelineConfig, PipelineReport};
    pub use crate::sync::{CancellationToken, ParallelExecutor, PoolState, ShardPool};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use xorf::BinaryFuse16;

    #[test]
    fn test_prelude_imports() {
        let keys: Vec<u64> = (0..500u64).map(|i| i ^ 0xA5A5_A5A5).collect();
        let mut pool = ShardPool::new(3, FuseAllocator::<BinaryFuse16>::new()).unwrap();
        pool.allocate(keys.len()).unwrap();
        pool.populate(&keys, 2).unwrap();
        assert_eq!(pool.state(), PoolState::Populated);
        assert_eq!(pool.query(&keys).unwrap(), 500);
    }

    #[test]
    fn test_trait_usage() {
        fn build<A: FilterAllocator>(allocator: A, keys: &[u64]) -> A::Filter {
            let mut filter = allocator.allocate(keys.len()).unwrap();
            filter.populate(keys).unwrap();
            filter
        }

        let keys: Vec<u64> = (1..=64u64).map(|i| i * 1_000_003).collect();
        let filter = build(FuseAllocator::<BinaryFuse16>::new(), &keys);
        assert!(keys.iter().all(|&k| filter.contains(k)));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serialization() {
        let plan = PartitionPlan::new(102, 4, 100).unwrap();
        let json = serde_json::to_string(&plan).unwrap();
        let restored: PartitionPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(plan, restored);

        let config = PipelineConfig::new(4, 2).with_fingerprint(FingerprintWidth::Bits8);
        let json = serde_json::to_string(&config).unwrap();
        let restored: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, restored);
    }
}
