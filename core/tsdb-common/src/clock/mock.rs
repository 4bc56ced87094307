//! Simulated clock for deterministic tests.
//!
//! 시뮬레이션 시간은 `set_time`/`advance_time` 호출로만 바뀝니다.

use super::{Await, Clock, Notify, Timestamp, add_saturating};
use ahash::AHashMap;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, UNIX_EPOCH};

/// A thread blocked in [`MockClock::await_with_deadline`].
struct Listener {
    deadline: Timestamp,
    /// Set once simulated time reaches `deadline`.
    fired: AtomicBool,
    notifier: Arc<dyn Notify>,
}

struct MockState {
    time: Timestamp,
    listeners: AHashMap<u64, Arc<Listener>>,
    next_listener_id: u64,
}

/// Clock whose time never advances on its own.
///
/// Every timed wait registers a listener carrying its deadline. Moving the
/// time forward marks the listeners whose deadline has been reached and then
/// wakes every registered waiter so it re-evaluates its condition. Waiters are
/// notified outside the clock's own lock, so the lock order is always
/// "waiter's mutex, then clock mutex".
///
/// # Example
///
/// ```rust
/// use std::time::{Duration, UNIX_EPOCH};
/// use tsdb_common::clock::{Clock, MockClock};
///
/// let clock = MockClock::new();
/// assert_eq!(clock.now(), UNIX_EPOCH);
///
/// clock.advance_time(Duration::from_secs(42));
/// assert_eq!(clock.now(), UNIX_EPOCH + Duration::from_secs(42));
/// ```
pub struct MockClock {
    state: Mutex<MockState>,
    /// Signals `sleep_until` callers.
    sleepers: Condvar,
}

impl MockClock {
    /// Creates a clock set to the Unix epoch.
    pub fn new() -> Self {
        Self::with_start(UNIX_EPOCH)
    }

    /// Creates a clock set to `start`.
    pub fn with_start(start: Timestamp) -> Self {
        Self {
            state: Mutex::new(MockState {
                time: start,
                listeners: AHashMap::new(),
                next_listener_id: 0,
            }),
            sleepers: Condvar::new(),
        }
    }

    /// Sets the simulated time and synchronously notifies every waiter.
    pub fn set_time(&self, time: Timestamp) {
        let listeners: Vec<Arc<Listener>> = {
            let mut state = self.state.lock();
            state.time = time;
            state
                .listeners
                .values()
                .inspect(|listener| {
                    if listener.deadline <= time {
                        listener.fired.store(true, Ordering::Release);
                    }
                })
                .cloned()
                .collect()
        };
        self.sleepers.notify_all();
        for listener in listeners {
            listener.notifier.notify();
        }
    }

    /// Moves the simulated time forward by `delta`.
    pub fn advance_time(&self, delta: Duration) {
        let target = add_saturating(self.now(), delta);
        self.set_time(target);
    }

    /// Number of threads currently blocked in a timed wait on this clock.
    pub fn num_listeners(&self) -> usize {
        self.state.lock().listeners.len()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MockClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockClock")
            .field("time", &state.time)
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Timestamp {
        self.state.lock().time
    }

    fn sleep_until(&self, deadline: Timestamp) {
        let mut state = self.state.lock();
        while state.time < deadline {
            self.sleepers.wait(&mut state);
        }
    }

    fn await_with_deadline(&self, wait: &mut dyn Await, deadline: Timestamp) -> bool {
        let (id, listener) = {
            let mut state = self.state.lock();
            if state.time >= deadline {
                drop(state);
                return wait.is_ready();
            }
            let id = state.next_listener_id;
            state.next_listener_id += 1;
            let listener = Arc::new(Listener {
                deadline,
                fired: AtomicBool::new(false),
                notifier: wait.notifier(),
            });
            state.listeners.insert(id, Arc::clone(&listener));
            (id, listener)
        };

        let ready = loop {
            if wait.is_ready() {
                break true;
            }
            if listener.fired.load(Ordering::Acquire) {
                break false;
            }
            wait.wait();
        };

        self.state.lock().listeners.remove(&id);
        ready
    }
}
