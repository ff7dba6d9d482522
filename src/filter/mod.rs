//! The single-filter contract consumed by the shard pool.
//!
//! The pool never looks inside a filter. It relies on four capabilities:
//!
//! | Capability | Method |
//! |------------|--------|
//! | allocate(capacity) | [`FilterAllocator::allocate`] |
//! | populate(keys) | [`ShardFilter::populate`] |
//! | contains(key) | [`ShardFilter::contains`] |
//! | release() | `Drop` |
//!
//! Allocation goes through a separate [`FilterAllocator`] value instead of a
//! constructor on the filter type so that an allocator can carry state: a memory
//! budget, a resource ledger in tests, or the fingerprint width.
//!
//! [`FuseAllocator`] is the production implementation, backed by the binary fuse
//! filters of the `xorf` crate.

pub mod fuse;

pub use fuse::{FuseAllocator, FuseShard, FuseVariant};

use crate::error::FilterError;
use std::fmt;
use std::str::FromStr;

/// Result of a single filter operation.
pub type FilterResult<T> = std::result::Result<T, FilterError>;

/// A fixed-capacity membership filter, built once and queried many times.
///
/// # Contract
///
/// - `populate` is called at most once, with exactly `capacity()` keys.
/// - After a successful `populate`, `contains` returns `true` for every key that
///   was supplied (no false negatives). Absent keys may report `true` at the
///   filter's false-positive rate.
/// - Before `populate` succeeds, `contains` returns `false`.
/// - Dropping the filter releases its storage.
pub trait ShardFilter: Send + Sync {
    /// Build the filter from `keys`.
    ///
    /// # Errors
    ///
    /// - [`FilterError::CapacityMismatch`] if `keys.len() != self.capacity()`
    /// - [`FilterError::AlreadyPopulated`] on a second call
    /// - [`FilterError::ConstructionFailed`] if the underlying construction fails
    fn populate(&mut self, keys: &[u64]) -> FilterResult<()>;

    /// Returns `true` if the filter probably contains `key`.
    fn contains(&self, key: u64) -> bool;

    /// Number of keys the filter was allocated for.
    fn capacity(&self) -> usize;

    /// Whether `populate` has succeeded.
    fn is_populated(&self) -> bool;

    /// Bytes of filter storage currently held.
    fn size_in_bytes(&self) -> usize {
        0
    }
}

/// Creates [`ShardFilter`] instances of a given capacity.
pub trait FilterAllocator: Send + Sync {
    /// Filter type produced by this allocator.
    type Filter: ShardFilter;

    /// Allocate a filter sized for `capacity` keys.
    ///
    /// # Errors
    ///
    /// [`FilterError::AllocationFailed`] if the filter cannot be created.
    fn allocate(&self, capacity: usize) -> FilterResult<Self::Filter>;

    /// Short name for logs and stats.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self::Filter>()
    }
}

/// Fingerprint width of the binary fuse filter backing each shard.
///
/// Wider fingerprints lower the false-positive rate (about `2^-bits`) at the cost
/// of proportionally more memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FingerprintWidth {
    /// 8-bit fingerprints, ~0.39% false positives.
    Bits8,
    /// 16-bit fingerprints, ~0.0015% false positives.
    Bits16,
    /// 32-bit fingerprints, ~2.3e-10 false positives.
    #[default]
    Bits32,
}

impl FingerprintWidth {
    /// Width in bits.
    #[must_use]
    pub fn bits(self) -> u32 {
        match self {
            Self::Bits8 => 8,
            Self::Bits16 => 16,
            Self::Bits32 => 32,
        }
    }

    /// Theoretical false-positive probability of one filter, `2^-bits`.
    #[must_use]
    pub fn false_positive_rate(self) -> f64 {
        (-f64::from(self.bits())).exp2()
    }
}

impl fmt::Display for FingerprintWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

impl FromStr for FingerprintWidth {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "8" => Ok(Self::Bits8),
            "16" => Ok(Self::Bits16),
            "32" => Ok(Self::Bits32),
            other => Err(format!(
                "unsupported fingerprint width '{}', expected 8, 16 or 32",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_width_parse() {
        assert_eq!("8".parse::<FingerprintWidth>().unwrap(), FingerprintWidth::Bits8);
        assert_eq!("16".parse::<FingerprintWidth>().unwrap(), FingerprintWidth::Bits16);
        assert_eq!(" 32 ".parse::<FingerprintWidth>().unwrap(), FingerprintWidth::Bits32);
        assert!("64".parse::<FingerprintWidth>().is_err());
    }

    #[test]
    fn test_fingerprint_width_default_is_32() {
        assert_eq!(FingerprintWidth::default().bits(), 32);
        assert_eq!(FingerprintWidth::Bits16.to_string(), "16");
    }

    #[test]
    fn test_fingerprint_false_positive_rate() {
        let fp8 = FingerprintWidth::Bits8.false_positive_rate();
        assert!((fp8 - 1.0 / 256.0).abs() < 1e-12);
        assert!(FingerprintWidth::Bits32.false_positive_rate() < 1e-9);
    }
}
