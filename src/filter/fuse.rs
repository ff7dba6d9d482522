//! Binary fuse filters from the `xorf` crate as shard filters.
//!
//! `xorf` builds a filter in one step from the full key slice, so "allocation"
//! here only validates the capacity and records it. The fingerprint array is sized
//! and filled during [`ShardFilter::populate`].
//!
//! ```
//! use fuseshard::filter::{FilterAllocator, FuseAllocator, ShardFilter};
//! use xorf::BinaryFuse16;
//!
//! let allocator = FuseAllocator::<BinaryFuse16>::new();
//! let keys: Vec<u64> = (0..1_000).map(|i| i * 7_919).collect();
//!
//! let mut filter = allocator.allocate(keys.len()).unwrap();
//! filter.populate(&keys).unwrap();
//! assert!(keys.iter().all(|&k| filter.contains(k)));
//! ```

use super::{FilterAllocator, FilterResult, ShardFilter};
use crate::error::FilterError;
use std::marker::PhantomData;
use xorf::{BinaryFuse16, BinaryFuse32, BinaryFuse8, Filter};

/// Largest key count a binary fuse filter can index (segment math is 32-bit).
pub const MAX_FUSE_CAPACITY: usize = u32::MAX as usize;

/// A binary fuse filter type usable as a shard.
pub trait FuseVariant: Filter<u64> + Send + Sync + Sized + 'static {
    /// Fingerprint width in bits.
    const FINGERPRINT_BITS: usize;

    /// Build the filter from `keys`.
    fn build(keys: &[u64]) -> Result<Self, &'static str>;
}

macro_rules! impl_fuse_variant {
    ($ty:ty, $bits:expr) => {
        impl FuseVariant for $ty {
            const FINGERPRINT_BITS: usize = $bits;

            #[inline]
            fn build(keys: &[u64]) -> Result<Self, &'static str> {
                <$ty>::try_from(keys)
            }
        }
    };
}

impl_fuse_variant!(BinaryFuse8, 8);
impl_fuse_variant!(BinaryFuse16, 16);
impl_fuse_variant!(BinaryFuse32, 32);

/// One shard backed by a binary fuse filter.
///
/// A zero-capacity shard is valid: it populates from an empty slice and never
/// reports containment.
#[derive(Debug)]
pub struct FuseShard<F> {
    capacity: usize,
    filter: Option<F>,
    populated: bool,
}

impl<F: FuseVariant> FuseShard<F> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            filter: None,
            populated: false,
        }
    }

    /// Number of fingerprints stored, 0 before population.
    #[must_use]
    pub fn fingerprint_count(&self) -> usize {
        self.filter.as_ref().map_or(0, |f| Filter::<u64>::len(f))
    }
}

impl<F: FuseVariant> ShardFilter for FuseShard<F> {
    fn populate(&mut self, keys: &[u64]) -> FilterResult<()> {
        if self.populated {
            return Err(FilterError::AlreadyPopulated);
        }
        if keys.len() != self.capacity {
            return Err(FilterError::capacity_mismatch(self.capacity, keys.len()));
        }

        if !keys.is_empty() {
            let filter = F::build(&distinct(keys)).map_err(FilterError::construction_failed)?;
            self.filter = Some(filter);
        }
        self.populated = true;
        Ok(())
    }

    #[inline]
    fn contains(&self, key: u64) -> bool {
        match &self.filter {
            Some(filter) => filter.contains(&key),
            None => false,
        }
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn is_populated(&self) -> bool {
        self.populated
    }

    fn size_in_bytes(&self) -> usize {
        self.fingerprint_count() * F::FINGERPRINT_BITS / 8
    }
}

/// Sorted copy of `keys` with repeats removed.
///
/// Construction requires distinct keys; a shard's range may repeat a key.
fn distinct(keys: &[u64]) -> Vec<u64> {
    let mut unique = keys.to_vec();
    unique.sort_unstable();
    unique.dedup();
    unique
}

/// Allocates [`FuseShard`]s of fingerprint type `F`.
#[derive(Debug)]
pub struct FuseAllocator<F> {
    _marker: PhantomData<fn() -> F>,
}

impl<F> FuseAllocator<F> {
    /// Create an allocator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<F> Default for FuseAllocator<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> Clone for FuseAllocator<F> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<F: FuseVariant> FilterAllocator for FuseAllocator<F> {
    type Filter = FuseShard<F>;

    fn allocate(&self, capacity: usize) -> FilterResult<Self::Filter> {
        if capacity > MAX_FUSE_CAPACITY {
            return Err(FilterError::allocation_failed(
                capacity,
                format!("binary fuse filters index at most {} keys", MAX_FUSE_CAPACITY),
            ));
        }
        Ok(FuseShard::with_capacity(capacity))
    }

    fn name(&self) -> &'static str {
        match F::FINGERPRINT_BITS {
            8 => "binary_fuse8",
            16 => "binary_fuse16",
            _ => "binary_fuse32",
        }
    }
}
