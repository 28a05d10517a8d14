//! The shared counter.
//!
//! [`CounterCell`] is the only place the counter value lives. Reads and
//! increments are lock-free atomic operations so request handlers on any
//! worker thread can share one cell through an [`Arc`](std::sync::Arc).

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counter with atomic read and increment.
#[derive(Debug, Default)]
pub struct CounterCell {
    value: AtomicU64,
}

impl CounterCell {
    /// Create a cell holding `initial`.
    pub const fn new(initial: u64) -> Self {
        Self {
            value: AtomicU64::new(initial),
        }
    }

    /// Return the current value.
    pub fn read(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    /// Add one and return the value this call produced.
    ///
    /// Concurrent callers each observe a distinct result. The counter
    /// saturates at [`u64::MAX`] instead of wrapping back to zero.
    pub fn increment(&self) -> u64 {
        let previous = self
            .value
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                Some(v.saturating_add(1))
            })
            .unwrap_or_else(|v| v);
        previous.saturating_add(1)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn starts_at_zero_by_default() {
        let cell = CounterCell::default();
        assert_eq!(cell.read(), 0);
    }

    #[test]
    fn increment_returns_new_value() {
        let cell = CounterCell::new(41);
        assert_eq!(cell.increment(), 42);
        assert_eq!(cell.read(), 42);
    }

    #[test]
    fn increment_saturates() {
        let cell = CounterCell::new(u64::MAX);
        assert_eq!(cell.increment(), u64::MAX);
        assert_eq!(cell.read(), u64::MAX);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        const THREADS: u64 = 8;
        const PER_THREAD: u64 = 1_000;

        let initial = 10;
        let cell = Arc::new(CounterCell::new(initial));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let cell = Arc::clone(&cell);
                std::thread::spawn(move || {
                    (0..PER_THREAD).map(|_| cell.increment()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = BTreeSet::new();
        for handle in handles {
            for value in handle.join().unwrap() {
                assert!(seen.insert(value), "value {value} returned twice");
            }
        }

        let total = THREADS * PER_THREAD;
        assert_eq!(cell.read(), initial + total);
        let expected: BTreeSet<u64> = (initial + 1..=initial + total).collect();
        assert_eq!(seen, expected);
    }
}
