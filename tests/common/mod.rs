//! Shared test doubles for the integration tests.
//!
//! [`TrackingAllocator`] stands in for the fuse filter collaborator. Its filters
//! store keys exactly (no false positives) and report every allocation, release
//! and populate call to a shared [`Ledger`], so tests can check for leaks and for
//! the exact key range each shard received.
#![allow(dead_code)]

use fuseshard::filter::{FilterAllocator, FilterResult, ShardFilter};
use fuseshard::sync::CancellationToken;
use fuseshard::FilterError;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// What one populate call received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulateCall {
    pub filter_id: usize,
    pub len: usize,
    pub first: Option<u64>,
    pub last: Option<u64>,
}

/// Resource accounting shared by an allocator and all of its filters.
#[derive(Debug, Default)]
pub struct Ledger {
    allocated: AtomicUsize,
    released: AtomicUsize,
    populate_calls: Mutex<Vec<PopulateCall>>,
}

impl Ledger {
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.allocated() - self.released()
    }

    /// Populate calls sorted by filter id.
    pub fn populate_calls(&self) -> Vec<PopulateCall> {
        let mut calls = self.populate_calls.lock().unwrap().clone();
        calls.sort_by_key(|c| c.filter_id);
        calls
    }
}

/// Allocator whose filters can be told to fail.
///
/// Filter ids follow allocation order, which the pool guarantees is shard order.
#[derive(Debug, Default)]
pub struct TrackingAllocator {
    ledger: Arc<Ledger>,
    next_id: AtomicUsize,
    fail_allocation_at: Option<usize>,
    fail_populate: HashSet<usize>,
    panic_populate: HashSet<usize>,
    cancel_on_populate: Option<(usize, CancellationToken)>,
}

impl TrackingAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ledger(&self) -> Arc<Ledger> {
        Arc::clone(&self.ledger)
    }

    pub fn failing_allocation_at(mut self, id: usize) -> Self {
        self.fail_allocation_at = Some(id);
        self
    }

    pub fn failing_populate(mut self, id: usize) -> Self {
        self.fail_populate.insert(id);
        self
    }

    pub fn panicking_populate(mut self, id: usize) -> Self {
        self.panic_populate.insert(id);
        self
    }

    /// Filter `id` cancels `token` while it is being populated, then succeeds.
    pub fn cancelling_during_populate(mut self, id: usize, token: &CancellationToken) -> Self {
        self.cancel_on_populate = Some((id, token.clone()));
        self
    }
}

impl FilterAllocator for TrackingAllocator {
    type Filter = TrackingFilter;

    fn allocate(&self, capacity: usize) -> FilterResult<TrackingFilter> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        if self.fail_allocation_at == Some(id) {
            return Err(FilterError::allocation_failed(capacity, "injected allocation failure"));
        }

        self.ledger.allocated.fetch_add(1, Ordering::SeqCst);
        Ok(TrackingFilter {
            id,
            capacity,
            keys: None,
            fail: self.fail_populate.contains(&id),
            panic: self.panic_populate.contains(&id),
            cancel: self
                .cancel_on_populate
                .as_ref()
                .filter(|(target, _)| *target == id)
                .map(|(_, token)| token.clone()),
            ledger: Arc::clone(&self.ledger),
        })
    }

    fn name(&self) -> &'static str {
        "tracking"
    }
}

/// Exact-set filter that reports its lifetime to a [`Ledger`].
#[derive(Debug)]
pub struct TrackingFilter {
    id: usize,
    capacity: usize,
    keys: Option<HashSet<u64>>,
    fail: bool,
    panic: bool,
    cancel: Option<CancellationToken>,
    ledger: Arc<Ledger>,
}

impl ShardFilter for TrackingFilter {
    fn populate(&mut self, keys: &[u64]) -> FilterResult<()> {
        self.ledger.populate_calls.lock().unwrap().push(PopulateCall {
            filter_id: self.id,
            len: keys.len(),
            first: keys.first().copied(),
            last: keys.last().copied(),
        });

        if let Some(token) = &self.cancel {
            token.cancel();
        }
        if self.panic {
            panic!("injected panic in filter {}", self.id);
        }
        if self.fail {
            return Err(FilterError::construction_failed("injected construction failure"));
        }
        if self.keys.is_some() {
            return Err(FilterError::AlreadyPopulated);
        }
        if keys.len() != self.capacity {
            return Err(FilterError::capacity_mismatch(self.capacity, keys.len()));
        }

        self.keys = Some(keys.iter().copied().collect());
        Ok(())
    }

    fn contains(&self, key: u64) -> bool {
        self.keys.as_ref().map_or(false, |keys| keys.contains(&key))
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn is_populated(&self) -> bool {
        self.keys.is_some()
    }

    fn size_in_bytes(&self) -> usize {
        self.keys.as_ref().map_or(0, |keys| keys.len() * 8)
    }
}

impl Drop for TrackingFilter {
    fn drop(&mut self) {
        self.ledger.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Keys equal to their own index, so a shard's range is visible in its keys.
pub fn identity_keys(count: usize) -> Vec<u64> {
    (0..count as u64).collect()
}
