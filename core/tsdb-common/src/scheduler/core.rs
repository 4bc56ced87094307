//! Scheduler Engine
//!
//! 고정 크기 워커 풀 위에서 due time 순서로 콜백을 실행하는 스케줄러

use super::options::SchedulerOptions;
use super::queue::TaskQueue;
use super::state::State;
use super::task::{Callback, Handle, Task};
use super::worker;
use crate::clock::{Clock, Timestamp, add_saturating};
use crate::error::{CommonError, CommonResult};
use crate::sync::Monitor;
use std::any::Any;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace};

/// Everything guarded by the scheduler mutex.
pub(super) struct Inner {
    pub(super) state: State,
    pub(super) queue: TaskQueue,

    /// Cached "the front of the heap is due". Wait predicates read this
    /// instead of the clock.
    pub(super) task_due: bool,

    /// Join handles of every worker spawned while `Started`, replacements
    /// included.
    pub(super) workers: Vec<JoinHandle<()>>,

    /// Workers that have not exited (or unwound) yet.
    pub(super) live_workers: usize,

    /// Workers currently blocked in the fetch step.
    pub(super) sleeping_workers: usize,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: State::Idle,
            queue: TaskQueue::new(),
            task_due: false,
            workers: Vec::new(),
            live_workers: 0,
            sleeping_workers: 0,
        }
    }

    /// Re-reads the clock and updates `task_due`. Never call from a predicate.
    pub(super) fn refresh_task_due(&mut self, clock: &dyn Clock) {
        self.task_due = match self.queue.front_due() {
            Some(due) => due <= clock.now(),
            None => false,
        };
    }

    /// Books a completed run: periodic tasks go back into the heap, everything
    /// else leaves the registry. Returns the callback when it must be dropped,
    /// which the caller does after releasing the lock.
    pub(super) fn finish_task(
        &mut self,
        handle: Handle,
        callback: Callback,
        clock: &dyn Clock,
    ) -> Option<Callback> {
        let Some(task) = self.queue.get_mut(handle) else {
            return Some(callback);
        };
        if task.is_cancelled() || !task.is_periodic() {
            self.queue.erase(handle);
            return Some(callback);
        }
        task.restore_callback(callback);
        task.advance_due_time(clock.now());
        self.queue.requeue(handle);
        self.refresh_task_due(clock);
        trace!(%handle, "periodic task requeued");
        None
    }

    /// Final transition to `Stopped`. Returns the discarded tasks.
    fn shut_down(&mut self) -> Vec<Task> {
        self.state = State::Stopped;
        self.task_due = false;
        self.queue.clear()
    }
}

/// State shared between the façade and its worker threads.
pub(super) struct Shared {
    pub(super) monitor: Arc<Monitor<Inner>>,
    pub(super) clock: Arc<dyn Clock>,
}

impl Shared {
    pub(super) fn spawn_worker(self: &Arc<Self>, name: String) -> io::Result<JoinHandle<()>> {
        let shared = Arc::clone(self);
        thread::Builder::new()
            .name(name)
            .spawn(move || worker::run(shared))
    }
}

/// Runs callbacks at (or after) their due time on a fixed pool of workers.
///
/// Tasks are ordered by due time in a min-heap whose entries carry
/// backlinks, so both scheduling and cancellation are O(log n). Recurring
/// tasks skip missed ticks instead of replaying them.
///
/// Callbacks run without the scheduler lock held; they may schedule or cancel
/// other tasks. A callback must not call [`Scheduler::blocking_cancel`] on its
/// own handle or [`Scheduler::stop`], both of which wait for it to return.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::time::Duration;
/// use tsdb_common::clock::MockClock;
/// use tsdb_common::scheduler::{Scheduler, SchedulerOptions};
///
/// # fn main() -> tsdb_common::CommonResult<()> {
/// let clock = Arc::new(MockClock::new());
/// let scheduler = Scheduler::new(
///     SchedulerOptions::new()
///         .with_clock(clock.clone())
///         .with_start_now(true),
/// )?;
///
/// let runs = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&runs);
/// scheduler.schedule_in(move || { counter.fetch_add(1, Ordering::SeqCst); }, Duration::from_secs(5));
///
/// clock.advance_time(Duration::from_secs(5));
/// scheduler.wait_until_all_workers_asleep()?;
/// assert_eq!(runs.load(Ordering::SeqCst), 1);
/// # Ok(())
/// # }
/// ```
pub struct Scheduler {
    shared: Arc<Shared>,
    num_workers: u16,
}

impl Scheduler {
    /// 새 스케줄러 생성
    ///
    /// `options.start_now`가 설정되어 있으면 워커도 바로 시작합니다.
    pub fn new(options: SchedulerOptions) -> CommonResult<Self> {
        options.validate()?;
        let scheduler = Self {
            shared: Arc::new(Shared {
                monitor: Arc::new(Monitor::new(Inner::new())),
                clock: options.clock_or_default(),
            }),
            num_workers: options.num_workers,
        };
        debug!(num_workers = options.num_workers, "scheduler created");
        if options.start_now {
            scheduler.start()?;
        }
        Ok(scheduler)
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.shared.clock
    }

    pub fn num_workers(&self) -> u16 {
        self.num_workers
    }

    pub fn state(&self) -> State {
        self.shared.monitor.lock().state
    }

    /// Worker threads currently alive. Equals `num_workers` while `Started`,
    /// unless a replacement for a panicked worker could not be spawned.
    pub fn num_live_workers(&self) -> usize {
        self.shared.monitor.lock().live_workers
    }

    /// Registered tasks, including the ones currently running.
    pub fn num_pending(&self) -> usize {
        self.shared.monitor.lock().queue.len()
    }

    /// 가능한 빨리 실행
    pub fn schedule_now<F>(&self, callback: F) -> Handle
    where
        F: FnMut() + Send + 'static,
    {
        self.schedule_internal(Box::new(callback), self.shared.clock.now(), None)
    }

    /// `due_time` 시각 이후에 실행
    pub fn schedule_at<F>(&self, callback: F, due_time: Timestamp) -> Handle
    where
        F: FnMut() + Send + 'static,
    {
        self.schedule_internal(Box::new(callback), due_time, None)
    }

    /// `delay` 후에 실행
    pub fn schedule_in<F>(&self, callback: F, delay: Duration) -> Handle
    where
        F: FnMut() + Send + 'static,
    {
        let due_time = add_saturating(self.shared.clock.now(), delay);
        self.schedule_internal(Box::new(callback), due_time, None)
    }

    /// Runs ASAP, then every `period`.
    ///
    /// # Panics
    ///
    /// Panics if `period` is zero.
    pub fn schedule_recurring<F>(&self, callback: F, period: Duration) -> Handle
    where
        F: FnMut() + Send + 'static,
    {
        self.schedule_internal(Box::new(callback), self.shared.clock.now(), Some(period))
    }

    /// Runs at `due_time`, then every `period`.
    ///
    /// # Panics
    ///
    /// Panics if `period` is zero.
    pub fn schedule_recurring_at<F>(&self, callback: F, due_time: Timestamp, period: Duration) -> Handle
    where
        F: FnMut() + Send + 'static,
    {
        self.schedule_internal(Box::new(callback), due_time, Some(period))
    }

    /// Runs after `delay`, then every `period`.
    ///
    /// # Panics
    ///
    /// Panics if `period` is zero.
    pub fn schedule_recurring_in<F>(&self, callback: F, delay: Duration, period: Duration) -> Handle
    where
        F: FnMut() + Send + 'static,
    {
        let due_time = add_saturating(self.shared.clock.now(), delay);
        self.schedule_internal(Box::new(callback), due_time, Some(period))
    }

    fn schedule_internal(&self, callback: Callback, due_time: Timestamp, period: Option<Duration>) -> Handle {
        if let Some(period) = period {
            assert!(!period.is_zero(), "recurring task period must be non-zero");
        }
        let task = Task::new(callback, due_time, period);
        let monitor = &self.shared.monitor;
        let mut inner = monitor.lock();
        if inner.state == State::Stopped {
            // 정지된 스케줄러는 작업을 보관하지 않음
            drop(inner);
            let handle = task.handle();
            drop(task);
            trace!(%handle, "task discarded, scheduler is stopped");
            return handle;
        }
        let handle = inner.queue.insert(task);
        inner.refresh_task_due(&*self.shared.clock);
        monitor.notify_all();
        trace!(%handle, periodic = period.is_some(), "task scheduled");
        handle
    }

    /// Cancels a task that has not started running yet.
    ///
    /// Returns `true` iff the task was removed before it could start. A task
    /// that is already running is marked so that it won't be rescheduled, and
    /// `false` is returned without waiting for it.
    pub fn cancel(&self, handle: Handle) -> bool {
        self.cancel_internal(handle, false)
    }

    /// Like [`Scheduler::cancel`], but when the task is already running this
    /// blocks until its callback has returned.
    pub fn blocking_cancel(&self, handle: Handle) -> bool {
        self.cancel_internal(handle, true)
    }

    fn cancel_internal(&self, handle: Handle, blocking: bool) -> bool {
        let monitor = &self.shared.monitor;
        let mut inner = monitor.lock();
        let Some(task) = inner.queue.get_mut(handle) else {
            return false;
        };
        task.cancel();
        if task.is_queued() {
            let removed = inner.queue.remove_queued(handle);
            inner.refresh_task_due(&*self.shared.clock);
            monitor.notify_all();
            drop(inner);
            // 콜백의 소멸자는 락 밖에서 실행
            drop(removed);
            debug!(%handle, "task cancelled");
            return true;
        }
        debug!(%handle, blocking, "task is running, cancellation only stops rescheduling");
        if blocking {
            monitor.await_condition(&mut inner, |inner| !inner.queue.contains(handle));
        }
        false
    }

    /// Spawns the workers. No-op unless the scheduler is `Idle`.
    ///
    /// If a worker thread cannot be spawned, the already spawned ones are
    /// joined, the scheduler ends up `Stopped`, and the error is returned.
    pub fn start(&self) -> CommonResult<()> {
        let monitor = &self.shared.monitor;
        let mut inner = monitor.lock();
        if inner.state != State::Idle {
            return Ok(());
        }

        let mut workers = Vec::with_capacity(usize::from(self.num_workers));
        for index in 0..self.num_workers {
            let spawned = self
                .shared
                .spawn_worker(format!("tsdb-scheduler-{}", index));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(source) => {
                    error!(index, error = %source, "failed to spawn scheduler worker");
                    inner.live_workers = workers.len();
                    inner.state.transition(State::Idle, State::Stopping);
                    monitor.notify_all();
                    drop(inner);

                    join_workers(workers);
                    let discarded = {
                        let mut inner = monitor.lock();
                        let discarded = inner.shut_down();
                        monitor.notify_all();
                        discarded
                    };
                    drop(discarded);
                    return Err(CommonError::from(source));
                }
            }
        }

        inner.live_workers = workers.len();
        inner.workers = workers;
        inner.state.transition(State::Idle, State::Started);
        monitor.notify_all();
        info!(num_workers = self.num_workers, "scheduler started");
        Ok(())
    }

    /// Stops the workers and discards every pending task.
    ///
    /// Running callbacks are allowed to finish. Blocks until the scheduler is
    /// `Stopped`; concurrent callers all wait for the same shutdown.
    pub fn stop(&self) {
        let monitor = &self.shared.monitor;
        let workers = {
            let mut inner = monitor.lock();
            match inner.state {
                State::Idle => {
                    let discarded = inner.shut_down();
                    monitor.notify_all();
                    drop(inner);
                    drop(discarded);
                    debug!("scheduler stopped before it was started");
                    return;
                }
                State::Stopping | State::Stopped => {
                    monitor.await_condition(&mut inner, |inner| inner.state == State::Stopped);
                    return;
                }
                State::Started => {
                    inner.state.transition(State::Started, State::Stopping);
                    monitor.notify_all();
                    std::mem::take(&mut inner.workers)
                }
            }
        };

        info!("stopping scheduler");
        join_workers(workers);

        let discarded = {
            let mut inner = monitor.lock();
            let discarded = inner.shut_down();
            monitor.notify_all();
            discarded
        };
        debug!(discarded = discarded.len(), "scheduler stopped");
        drop(discarded);
    }

    /// Test hook: blocks until every live worker is waiting for work and no
    /// task is due.
    ///
    /// Returns `Ok` right away when the scheduler was never started,
    /// [`CommonError::Cancelled`] once it is stopping, and
    /// [`CommonError::NoLiveWorkers`] when tasks are queued but no worker is
    /// left to run them.
    pub fn wait_until_all_workers_asleep(&self) -> CommonResult<()> {
        let monitor = &self.shared.monitor;
        let mut inner = monitor.lock();
        loop {
            monitor.await_condition(&mut inner, |inner| {
                inner.state != State::Started
                    || (inner.live_workers == 0 && !inner.queue.is_empty())
                    || (inner.sleeping_workers == inner.live_workers && !inner.task_due)
            });
            match inner.state {
                State::Idle => return Ok(()),
                State::Stopping | State::Stopped => return Err(CommonError::Cancelled),
                State::Started => {}
            }
            if inner.live_workers == 0 && !inner.queue.is_empty() {
                return Err(CommonError::NoLiveWorkers);
            }
            // the clock may have moved since the flag was last computed
            inner.refresh_task_due(&*self.shared.clock);
            if !inner.task_due {
                return Ok(());
            }
            monitor.notify_all();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.monitor.lock();
        f.debug_struct("Scheduler")
            .field("state", &inner.state)
            .field("num_workers", &self.num_workers)
            .field("pending", &inner.queue.len())
            .finish()
    }
}

fn join_workers(workers: Vec<JoinHandle<()>>) {
    for worker in workers {
        let name = worker.thread().name().unwrap_or("<unnamed>").to_owned();
        if let Err(payload) = worker.join() {
            error!(worker = %name, panic = panic_message(&*payload), "scheduler worker panicked");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}
