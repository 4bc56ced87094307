//! Periodic Thread
//!
//! 전용 스레드에서 하나의 클로저를 일정 주기로 실행합니다.
//!
//! Unlike a recurring [`Scheduler`](crate::scheduler::Scheduler) task, a
//! `PeriodicThread` owns its thread, so a slow run never delays unrelated
//! work. Missed ticks are skipped the same way the scheduler skips them.

use crate::clock::{Clock, RealClock, Timestamp, add_saturating, next_period_boundary};
use crate::error::{CommonError, CommonResult};
use crate::scheduler::State;
use crate::sync::Monitor;
use parking_lot::MutexGuard;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

type Closure = Box<dyn FnMut() + Send + 'static>;

/// Options of a [`PeriodicThread`].
#[derive(Debug, Clone)]
pub struct PeriodicOptions {
    /// Time between two runs. Must be non-zero.
    pub period: Duration,

    /// Time source. `None` selects [`RealClock::instance`].
    pub clock: Option<Arc<dyn Clock>>,

    /// Start the thread right away from `PeriodicThread::new`.
    pub start_now: bool,
}

impl PeriodicOptions {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            clock: None,
            start_now: false,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_start_now(mut self, start_now: bool) -> Self {
        self.start_now = start_now;
        self
    }

    pub fn validate(&self) -> CommonResult<()> {
        if self.period.is_zero() {
            return Err(CommonError::InvalidConfig(
                "period must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

struct PeriodicInner {
    state: State,
    closure: Option<Closure>,
    thread: Option<JoinHandle<()>>,

    /// The thread is blocked waiting for `next_run`.
    asleep: bool,
    next_run: Option<Timestamp>,

    /// Set by `wait_until_asleep` when it sees `next_run` already reached.
    due: bool,

    /// The thread has exited, possibly by unwinding out of the closure.
    exited: bool,
}

struct PeriodicShared {
    monitor: Arc<Monitor<PeriodicInner>>,
    clock: Arc<dyn Clock>,
    period: Duration,
}

/// Runs a closure on a dedicated thread once every `period`.
///
/// The first run happens one period after [`PeriodicThread::start`].
pub struct PeriodicThread {
    shared: Arc<PeriodicShared>,
}

impl PeriodicThread {
    pub fn new<F>(options: PeriodicOptions, closure: F) -> CommonResult<Self>
    where
        F: FnMut() + Send + 'static,
    {
        options.validate()?;
        let clock = options.clock.clone().unwrap_or_else(RealClock::instance);
        let periodic = Self {
            shared: Arc::new(PeriodicShared {
                monitor: Arc::new(Monitor::new(PeriodicInner {
                    state: State::Idle,
                    closure: Some(Box::new(closure)),
                    thread: None,
                    asleep: false,
                    next_run: None,
                    due: false,
                    exited: false,
                })),
                clock,
                period: options.period,
            }),
        };
        if options.start_now {
            periodic.start()?;
        }
        Ok(periodic)
    }

    pub fn period(&self) -> Duration {
        self.shared.period
    }

    pub fn state(&self) -> State {
        self.shared.monitor.lock().state
    }

    /// Spawns the thread. No-op unless `Idle`.
    pub fn start(&self) -> CommonResult<()> {
        let monitor = &self.shared.monitor;
        let mut inner = monitor.lock();
        if inner.state != State::Idle {
            return Ok(());
        }
        let Some(closure) = inner.closure.take() else {
            return Ok(());
        };

        let first_run = add_saturating(self.shared.clock.now(), self.shared.period);
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("tsdb-periodic".to_string())
            .spawn(move || run(shared, closure, first_run));
        match spawned {
            Ok(handle) => {
                inner.thread = Some(handle);
                inner.state.transition(State::Idle, State::Started);
                monitor.notify_all();
                info!(period = ?self.shared.period, "periodic thread started");
                Ok(())
            }
            Err(source) => {
                error!(error = %source, "failed to spawn periodic thread");
                inner.state.transition(State::Idle, State::Stopped);
                monitor.notify_all();
                Err(CommonError::from(source))
            }
        }
    }

    /// Stops the thread, letting an in-flight run finish first.
    pub fn stop(&self) {
        let monitor = &self.shared.monitor;
        let thread = {
            let mut inner = monitor.lock();
            match inner.state {
                State::Idle => {
                    inner.state.transition(State::Idle, State::Stopped);
                    let closure = inner.closure.take();
                    monitor.notify_all();
                    drop(inner);
                    drop(closure);
                    return;
                }
                State::Stopping | State::Stopped => {
                    monitor.await_condition(&mut inner, |inner| inner.state == State::Stopped);
                    return;
                }
                State::Started => {
                    inner.state.transition(State::Started, State::Stopping);
                    monitor.notify_all();
                    inner.thread.take()
                }
            }
        };

        if let Some(thread) = thread {
            if thread.join().is_err() {
                error!("periodic thread panicked");
            }
        }

        let mut inner = monitor.lock();
        inner.state = State::Stopped;
        monitor.notify_all();
        debug!("periodic thread stopped");
    }

    /// Test hook: blocks until the thread is waiting for a run that is not
    /// due yet.
    ///
    /// Returns `Ok` right away when never started, and
    /// [`CommonError::Cancelled`] once stopping or after the thread died.
    pub fn wait_until_asleep(&self) -> CommonResult<()> {
        let monitor = &self.shared.monitor;
        let mut inner = monitor.lock();
        loop {
            monitor.await_condition(&mut inner, |inner| {
                inner.state != State::Started || inner.exited || (inner.asleep && !inner.due)
            });
            if inner.state == State::Idle {
                return Ok(());
            }
            if inner.state.is_shutting_down() || inner.exited {
                return Err(CommonError::Cancelled);
            }
            let now = self.shared.clock.now();
            if inner.next_run.is_none_or(|next_run| now < next_run) {
                return Ok(());
            }
            // 실행 시각이 지났으므로 스레드가 깨어날 때까지 대기
            inner.due = true;
            monitor.notify_all();
        }
    }
}

impl Drop for PeriodicThread {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for PeriodicThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicThread")
            .field("period", &self.shared.period)
            .field("state", &self.state())
            .finish()
    }
}

/// Marks the thread as exited on the way out, including on unwind.
struct ExitGuard<'a>(&'a PeriodicShared);

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.0.monitor.lock();
        inner.exited = true;
        inner.asleep = false;
        self.0.monitor.notify_all();
    }
}

fn run(shared: Arc<PeriodicShared>, mut closure: Closure, first_run: Timestamp) {
    let _exit = ExitGuard(&shared);
    let clock = &*shared.clock;
    let mut next_run = first_run;
    let mut inner = shared.monitor.lock();
    loop {
        inner.asleep = true;
        inner.next_run = Some(next_run);
        shared.monitor.notify_all();
        shared.monitor.await_with_deadline(
            clock,
            &mut inner,
            |inner| inner.state.is_shutting_down(),
            next_run,
        );
        inner.asleep = false;
        inner.due = false;
        shared.monitor.notify_all();
        if inner.state.is_shutting_down() {
            break;
        }

        MutexGuard::unlocked(&mut inner, || closure());
        next_run = next_period_boundary(next_run, clock.now(), shared.period);
    }
}
