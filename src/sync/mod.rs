//! Parallel construction and querying of sharded filters.
//!
//! # Module Organization
//!
//! - [`ParallelExecutor`] - fixed-size worker pool running `f(index, worker)` over `0..n`
//! - [`ShardPool`] - owns the shard filters; bulk allocate, parallel populate, query
//! - [`CancellationToken`] - cooperative cancellation observed between shard dispatches
//!
//! # Concurrency Model
//!
//! Population is the only parallel write phase. Each worker receives exclusive
//! access to one shard slot plus a read-only slice of the key array; the slices
//! are disjoint by construction, so neither the keys nor the shards need locks.
//!
//! Queries take `&self` and only read. They may run concurrently with each other
//! but never with population: `populate` takes `&mut self`, so the borrow checker
//! serializes the allocate → populate → query phases.
//!
//! | Phase | Receiver | Threads |
//! |-------|----------|---------|
//! | `allocate` | `&mut self` | caller |
//! | `populate` | `&mut self` | `thread_count` workers |
//! | `query` | `&self` | caller |
//! | `query_parallel` | `&self` | `thread_count` workers |
//!
//! # Examples
//!
//! ```
//! use fuseshard::filter::FuseAllocator;
//! use fuseshard::sync::ShardPool;
//! use std::sync::Arc;
//! use std::thread;
//! use xorf::BinaryFuse8;
//!
//! let keys: Vec<u64> = (1..=4_000u64).map(|i| i.wrapping_mul(0xD6E8_FEB8_6659_FD93)).collect();
//! let mut pool = ShardPool::new(4, FuseAllocator::<BinaryFuse8>::new()).unwrap();
//! pool.allocate(keys.len()).unwrap();
//! pool.populate(&keys, 4).unwrap();
//!
//! let pool = Arc::new(pool);
//! let keys = Arc::new(keys);
//! let handles: Vec<_> = (0..2)
//!     .map(|_| {
//!         let pool = Arc::clone(&pool);
//!         let keys = Arc::clone(&keys);
//!         thread::spawn(move || pool.query(&keys).unwrap())
//!     })
//!     .collect();
//!
//! for h in handles {
//!     assert_eq!(h.join().unwrap(), 4_000);
//! }
//! ```

pub mod executor;
pub mod pool;

pub use executor::{CancellationToken, ParallelExecutor};
pub use pool::{PoolState, PopulateReport, ShardPool, ShardStats};
