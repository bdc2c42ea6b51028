#![forbid(unsafe_code)]

//! Bounded pool of reusable payload records.
//!
//! Each publish call leases one record for its whole duration, including the
//! bubble chain. A subscriber that publishes again leases a second record, so
//! the number of records lent out at once equals the current publish nesting
//! depth. The pool holds a fixed number of records (16 by default); leasing
//! beyond that fails with [`BindError::PoolExhausted`], which indicates a
//! notification cycle.
//!
//! # Invariants
//!
//! 1. Records are created on first use, `capacity` at a time, and never again.
//! 2. `depth()` equals the number of live [`PoolLease`] guards.
//! 3. Every lease is returned exactly once, in `Drop`, so unwinding out of a
//!    panicking subscriber still releases it.
//! 4. A returned record is [`reset`](Poolable::reset) before reuse; values a
//!    subscriber saw are not kept alive by the pool.

use std::cell::{Cell, RefCell};
use std::ops::Deref;

use crate::error::BindError;

/// A record type that can live in a [`PayloadPool`].
pub trait Poolable: Default {
    /// Clear the record before it returns to the pool.
    fn reset(&mut self);
}

/// Counters describing pool traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Leases handed out.
    pub acquired: u64,
    /// Leases returned.
    pub released: u64,
    /// Deepest nesting observed.
    pub high_water: usize,
    /// Lease attempts rejected for exceeding capacity.
    pub exhausted: u64,
}

impl PoolStats {
    /// Whether every lease handed out has come back.
    #[must_use]
    pub const fn is_balanced(&self) -> bool {
        self.acquired == self.released
    }
}

/// A fixed-capacity stack of reusable records.
#[derive(Debug)]
pub struct PayloadPool<P> {
    free: RefCell<Vec<Box<P>>>,
    capacity: usize,
    primed: Cell<bool>,
    depth: Cell<usize>,
    stats: Cell<PoolStats>,
}

impl<P: Poolable> PayloadPool<P> {
    /// Create an empty pool; records are allocated on first lease.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            free: RefCell::new(Vec::new()),
            capacity: capacity.max(1),
            primed: Cell::new(false),
            depth: Cell::new(0),
            stats: Cell::new(PoolStats::default()),
        }
    }

    /// Maximum number of simultaneous leases.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of leases currently outstanding.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    /// Traffic counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.stats.get()
    }

    /// Lease a record.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::PoolExhausted`] when `capacity` leases are
    /// already outstanding.
    pub fn acquire(&self) -> Result<PoolLease<'_, P>, BindError> {
        self.prime();
        let record = self.free.borrow_mut().pop();
        let Some(record) = record else {
            let mut stats = self.stats.get();
            stats.exhausted += 1;
            self.stats.set(stats);
            return Err(BindError::PoolExhausted {
                capacity: self.capacity,
            });
        };

        let depth = self.depth.get() + 1;
        self.depth.set(depth);
        let mut stats = self.stats.get();
        stats.acquired += 1;
        stats.high_water = stats.high_water.max(depth);
        self.stats.set(stats);

        Ok(PoolLease {
            pool: self,
            record: Some(record),
        })
    }

    fn prime(&self) {
        if self.primed.replace(true) {
            return;
        }
        let mut free = self.free.borrow_mut();
        free.reserve_exact(self.capacity);
        free.extend((0..self.capacity).map(|_| Box::new(P::default())));
    }

    fn release(&self, mut record: Box<P>) {
        record.reset();
        self.free.borrow_mut().push(record);
        self.depth.set(self.depth.get().saturating_sub(1));
        let mut stats = self.stats.get();
        stats.released += 1;
        self.stats.set(stats);
    }
}

/// RAII guard for a leased record.
///
/// Dropping the guard resets the record and returns it to its pool.
pub struct PoolLease<'a, P: Poolable> {
    pool: &'a PayloadPool<P>,
    record: Option<Box<P>>,
}

impl<P: Poolable> PoolLease<'_, P> {
    /// Mutable access for filling the record before delivery.
    pub fn record_mut(&mut self) -> &mut P {
        self.record
            .as_deref_mut()
            .unwrap_or_else(|| unreachable!("lease record taken before drop"))
    }
}

impl<P: Poolable> Deref for PoolLease<'_, P> {
    type Target = P;

    fn deref(&self) -> &P {
        self.record
            .as_deref()
            .unwrap_or_else(|| unreachable!("lease record taken before drop"))
    }
}

impl<P: Poolable> Drop for PoolLease<'_, P> {
    fn drop(&mut self) {
        if let Some(record) = self.record.take() {
            self.pool.release(record);
        }
    }
}

impl<P: Poolable> std::fmt::Debug for PoolLease<'_, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolLease")
            .field("depth", &self.pool.depth())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Slot {
        value: u32,
    }

    impl Poolable for Slot {
        fn reset(&mut self) {
            self.value = 0;
        }
    }

    #[test]
    fn lease_and_return() {
        let pool: PayloadPool<Slot> = PayloadPool::new(2);
        {
            let mut lease = pool.acquire().unwrap();
            lease.record_mut().value = 9;
            assert_eq!(lease.value, 9);
            assert_eq!(pool.depth(), 1);
        }
        assert_eq!(pool.depth(), 0);
        let stats = pool.stats();
        assert_eq!(stats.acquired, 1);
        assert_eq!(stats.released, 1);
        assert!(stats.is_balanced());
    }

    #[test]
    fn returned_records_are_reset() {
        let pool: PayloadPool<Slot> = PayloadPool::new(1);
        pool.acquire().unwrap().record_mut().value = 5;
        assert_eq!(pool.acquire().unwrap().value, 0);
    }

    #[test]
    fn nesting_beyond_capacity_fails() {
        let pool: PayloadPool<Slot> = PayloadPool::new(3);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        let c = pool.acquire().unwrap();
        let err = pool.acquire().unwrap_err();
        assert_eq!(err, BindError::PoolExhausted { capacity: 3 });
        assert_eq!(pool.stats().exhausted, 1);
        drop((a, b, c));
        assert_eq!(pool.depth(), 0);
        assert_eq!(pool.stats().high_water, 3);
        assert!(pool.acquire().is_ok());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let pool: PayloadPool<Slot> = PayloadPool::new(0);
        assert_eq!(pool.capacity(), 1);
        assert!(pool.acquire().is_ok());
    }

    #[test]
    fn lease_released_on_unwind() {
        let pool: PayloadPool<Slot> = PayloadPool::new(2);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _lease = pool.acquire().unwrap();
            panic!("subscriber fault");
        }));
        assert!(result.is_err());
        assert_eq!(pool.depth(), 0);
        assert!(pool.stats().is_balanced());
    }
}
