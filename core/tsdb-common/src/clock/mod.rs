//! Clock abstraction
//!
//! 현재 시각과, 그 시각을 기준으로 블록하는 대기 primitive를 제공합니다.
//!
//! Components that need to wait for a point in time never read the OS clock
//! directly. They go through a [`Clock`], which is either the [`RealClock`] or,
//! in tests, a [`MockClock`] whose time only moves when the test says so.
//!
//! # Waiting with a deadline
//!
//! A timed wait is expressed as "a mutex already held plus a predicate over the
//! data it guards". The predicate must be a pure function of that locked data:
//! it is not allowed to read the clock, because with a simulated clock the
//! passage of time is delivered by the clock itself through [`Notify`].
//!
//! ```rust
//! use std::sync::Arc;
//! use tsdb_common::clock::{Clock, MockClock};
//! use tsdb_common::sync::Monitor;
//!
//! let clock = MockClock::new();
//! let monitor = Arc::new(Monitor::new(false));
//! let mut guard = monitor.lock();
//!
//! // Deadline already reached: returns immediately with the predicate value.
//! let deadline = clock.now();
//! let ready = monitor.await_with_deadline(&clock, &mut guard, |flag| *flag, deadline);
//! assert!(!ready);
//! ```

mod mock;
mod real;

pub use mock::MockClock;
pub use real::RealClock;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Absolute point in time.
pub type Timestamp = SystemTime;

/// Wakes a blocked waiter so that it re-evaluates its predicate.
pub trait Notify: Send + Sync {
    fn notify(&self);
}

/// Object-safe view of a thread that holds a mutex and waits on a predicate.
///
/// Implementations own the lock guard; [`Clock`] implementations drive them.
pub trait Await {
    /// Evaluates the predicate against the locked state.
    fn is_ready(&mut self) -> bool;

    /// Releases the lock, blocks until notified, and re-acquires the lock.
    fn wait(&mut self);

    /// Like [`Await::wait`] but gives up after `timeout`.
    fn wait_for(&mut self, timeout: Duration);

    /// Handle that wakes this waiter from another thread.
    fn notifier(&self) -> Arc<dyn Notify>;
}

/// A source of time plus blocking primitives that respect that time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time according to this clock.
    fn now(&self) -> Timestamp;

    /// Blocks the calling thread for `duration` of this clock's time.
    fn sleep_for(&self, duration: Duration) {
        self.sleep_until(add_saturating(self.now(), duration));
    }

    /// Blocks the calling thread until this clock reaches `deadline`.
    fn sleep_until(&self, deadline: Timestamp);

    /// Blocks until `wait` becomes ready or `deadline` passes.
    ///
    /// Returns the value of the predicate at return time, i.e. `true` iff
    /// the wait ended because the condition was met.
    fn await_with_deadline(&self, wait: &mut dyn Await, deadline: Timestamp) -> bool;

    /// Same as [`Clock::await_with_deadline`] with a deadline of `now() + timeout`.
    fn await_with_timeout(&self, wait: &mut dyn Await, timeout: Duration) -> bool {
        let deadline = add_saturating(self.now(), timeout);
        self.await_with_deadline(wait, deadline)
    }
}

/// A timestamp far enough in the future to stand in for "never".
pub fn far_future() -> Timestamp {
    // ~34,000 years; representable on every supported platform
    UNIX_EPOCH + Duration::from_secs(1 << 40)
}

/// `time + duration`, clamped to [`far_future`] instead of panicking on overflow.
pub fn add_saturating(time: Timestamp, duration: Duration) -> Timestamp {
    match time.checked_add(duration) {
        Some(result) => result.min(far_future().max(time)),
        None => far_future().max(time),
    }
}

/// Next due time of a recurring action that was due at `due` and finished at `now`.
///
/// Missed ticks are skipped rather than replayed: the result is the first
/// boundary `due + k * period` (k ≥ 1) that lies strictly after `now`.
pub fn next_period_boundary(due: Timestamp, now: Timestamp, period: Duration) -> Timestamp {
    debug_assert!(!period.is_zero(), "period must be non-zero");
    let period_nanos = period.as_nanos().max(1);
    let elapsed = now.duration_since(due).unwrap_or(Duration::ZERO).as_nanos();
    let step = (elapsed / period_nanos + 1).saturating_mul(period_nanos);
    add_saturating(due, duration_from_nanos(step))
}

fn duration_from_nanos(nanos: u128) -> Duration {
    const NANOS_PER_SEC: u128 = 1_000_000_000;
    let secs = u64::try_from(nanos / NANOS_PER_SEC).unwrap_or(u64::MAX);
    Duration::new(secs, (nanos % NANOS_PER_SEC) as u32)
}
