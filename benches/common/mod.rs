//! Shared key generators and sizes for the benchmarks.
#![allow(dead_code)]

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub const SMALL_N: usize = 100_000;
pub const MEDIUM_N: usize = 1_000_000;
pub const LARGE_N: usize = 4_000_000;

pub const THREAD_COUNTS: &[usize] = &[1, 2, 4, 8];
pub const SHARD_COUNTS: &[usize] = &[1, 4, 16, 64];

/// Deterministic random keys.
pub fn random_keys(count: usize, seed: u64) -> Vec<u64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count).map(|_| rng.gen()).collect()
}

/// Query workload where every other key was inserted.
pub fn half_hit_queries(keys: &[u64], seed: u64) -> Vec<u64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    keys.iter()
        .enumerate()
        .map(|(i, &k)| if i % 2 == 0 { k } else { rng.gen() })
        .collect()
}
