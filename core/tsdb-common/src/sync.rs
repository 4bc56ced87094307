//! Mutex + condition variable pair with predicate waits.
//!
//! `Monitor<T>` is the locking primitive used by the scheduler and the
//! periodic thread. Every state change that could satisfy a waiter's predicate
//! must be followed by [`Monitor::notify_all`].

use crate::clock::{Await, Clock, Notify, Timestamp};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::Arc;
use std::time::Duration;

/// Data guarded by a mutex, plus the condition variable its waiters block on.
#[derive(Debug, Default)]
pub struct Monitor<T> {
    state: Mutex<T>,
    cond: Condvar,
}

impl<T> Monitor<T> {
    pub fn new(value: T) -> Self {
        Self {
            state: Mutex::new(value),
            cond: Condvar::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.state.lock()
    }

    /// Wakes every waiter so it re-evaluates its predicate.
    pub fn notify_all(&self) {
        self.cond.notify_all();
    }

    /// Blocks until `predicate` holds. No deadline, no clock involved.
    pub fn await_condition<F>(&self, guard: &mut MutexGuard<'_, T>, mut predicate: F)
    where
        F: FnMut(&T) -> bool,
    {
        while !predicate(&**guard) {
            self.cond.wait(guard);
        }
    }
}

impl<T: Send + 'static> Monitor<T> {
    /// Blocks until `predicate` holds or `clock` reaches `deadline`.
    ///
    /// Returns `true` iff the predicate held when the wait ended.
    pub fn await_with_deadline<F>(
        self: &Arc<Self>,
        clock: &dyn Clock,
        guard: &mut MutexGuard<'_, T>,
        predicate: F,
        deadline: Timestamp,
    ) -> bool
    where
        F: FnMut(&T) -> bool,
    {
        let mut wait = MonitorWait {
            monitor: self,
            guard,
            predicate,
        };
        clock.await_with_deadline(&mut wait, deadline)
    }

    /// Blocks until `predicate` holds or `timeout` of clock time elapses.
    pub fn await_with_timeout<F>(
        self: &Arc<Self>,
        clock: &dyn Clock,
        guard: &mut MutexGuard<'_, T>,
        predicate: F,
        timeout: Duration,
    ) -> bool
    where
        F: FnMut(&T) -> bool,
    {
        let mut wait = MonitorWait {
            monitor: self,
            guard,
            predicate,
        };
        clock.await_with_timeout(&mut wait, timeout)
    }
}

impl<T: Send> Notify for Monitor<T> {
    fn notify(&self) {
        // 락을 한 번 잡았다 놓아야 predicate 검사와 wait 사이의 wakeup 유실이 없음
        drop(self.state.lock());
        self.cond.notify_all();
    }
}

/// A locked monitor plus predicate, driven by a [`Clock`].
struct MonitorWait<'a, 'g, T, F> {
    monitor: &'a Arc<Monitor<T>>,
    guard: &'a mut MutexGuard<'g, T>,
    predicate: F,
}

impl<T, F> Await for MonitorWait<'_, '_, T, F>
where
    T: Send + 'static,
    F: FnMut(&T) -> bool,
{
    fn is_ready(&mut self) -> bool {
        (self.predicate)(&**self.guard)
    }

    fn wait(&mut self) {
        self.monitor.cond.wait(&mut *self.guard);
    }

    fn wait_for(&mut self, timeout: Duration) {
        let _ = self.monitor.cond.wait_for(&mut *self.guard, timeout);
    }

    fn notifier(&self) -> Arc<dyn Notify> {
        Arc::clone(self.monitor) as Arc<dyn Notify>
    }
}
