//! Thread-safe sequence counter for stamping outgoing datagrams.
//!
//! Every message carries a monotonically increasing sequence number in its
//! header.  The transport itself never retransmits or reorders, but the
//! counter lets a receiver detect dropped or duplicated datagrams and lets
//! the connection monitor correlate a Pong with the Ping that caused it.

use std::sync::atomic::{AtomicU64, Ordering};

/// A lock-free, monotonically increasing counter for sequence numbers.
///
/// Numbers start at 0 and increment by 1 per [`next`](Self::next) call,
/// wrapping at `u64::MAX` without panicking.
///
/// # Examples
///
/// ```rust
/// use buttonbox_core::protocol::SequenceCounter;
///
/// let counter = SequenceCounter::new();
/// assert_eq!(counter.next(), 0);
/// assert_eq!(counter.next(), 1);
/// ```
pub struct SequenceCounter {
    inner: AtomicU64,
}

impl SequenceCounter {
    /// Creates a new counter starting at 0.
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(0),
        }
    }

    /// Returns the next sequence number and atomically increments the counter.
    ///
    /// `Relaxed` ordering is sufficient: sequence numbers only label
    /// messages, they are not used to synchronise memory between threads.
    pub fn next(&self) -> u64 {
        self.inner.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the current value without incrementing (for diagnostics).
    pub fn current(&self) -> u64 {
        self.inner.load(Ordering::Relaxed)
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_sequence_counter_starts_at_zero() {
        let counter = SequenceCounter::new();
        assert_eq!(counter.next(), 0);
    }

    #[test]
    fn test_sequence_counter_increments_monotonically() {
        let counter = SequenceCounter::new();
        let values: Vec<u64> = (0..100).map(|_| counter.next()).collect();
        for window in values.windows(2) {
            assert!(window[1] > window[0], "values must increase");
        }
    }

    #[test]
    fn test_sequence_counter_wraps_at_u64_max() {
        let counter = SequenceCounter {
            inner: AtomicU64::new(u64::MAX),
        };
        assert_eq!(counter.next(), u64::MAX);
        assert_eq!(counter.next(), 0, "counter must wrap to 0 after u64::MAX");
    }

    #[test]
    fn test_sequence_counter_is_thread_safe() {
        let counter = Arc::new(SequenceCounter::new());
        let thread_count = 8;
        let increments_per_thread = 1000;

        let handles: Vec<_> = (0..thread_count)
            .map(|_| {
                let c = Arc::clone(&counter);
                thread::spawn(move || (0..increments_per_thread).map(|_| c.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut all_values: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread panicked"))
            .collect();

        all_values.sort_unstable();
        all_values.dedup();
        assert_eq!(
            all_values.len(),
            thread_count * increments_per_thread,
            "every sequence number must be unique across threads"
        );
    }

    #[test]
    fn test_current_does_not_increment() {
        let counter = SequenceCounter::new();
        counter.next();
        assert_eq!(counter.current(), 1);
        assert_eq!(counter.next(), 1);
    }
}
