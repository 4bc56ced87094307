use std::sync::atomic::{AtomicU64, Ordering};

/// A source of monotonically increasing sequence numbers.
///
/// Every call to [`SequenceNumber::get_next`] returns a value that was never
/// returned before by the same generator (until the counter wraps, which at one
/// billion calls per second takes several centuries).
///
/// The constructor is `const`, so a generator can live in a `static`.
#[derive(Debug)]
pub struct SequenceNumber {
    /// The next value to hand out.
    next: AtomicU64,
}

impl SequenceNumber {
    /// Create a generator whose first value is `start`.
    pub const fn new(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }

    /// Return the current value and advance the counter.
    pub fn get_next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Peek at the value the next call to `get_next` will return.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for SequenceNumber {
    fn default() -> Self {
        Self::new(1)
    }
}
