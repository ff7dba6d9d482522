//! Core planning types for fuseshard.
//!
//! # Module Organization
//!
//! ```text
//! core/
//! ├── plan.rs    - Partition planner (key ranges and capacities per shard)
//! └── mod.rs     - This file (public API)
//! ```
//!
//! The planner is the single source of truth for the shard index → key range
//! mapping. Allocation and population both derive a shard's `(offset, capacity)`
//! from the same [`PartitionPlan`], so the two steps cannot disagree.

pub mod plan;

pub use plan::{PartitionPlan, ShardRange, DEFAULT_MAX_SHARD_CAPACITY, DEFAULT_TOTAL_KEYS};
