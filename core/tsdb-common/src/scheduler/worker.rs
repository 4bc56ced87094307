//! Worker thread loop
//!
//! 각 워커는 `fetch_task` → 콜백 실행 → `fetch_task` ... 를 반복하며,
//! 스케줄러가 `Started` 상태를 벗어나면 종료합니다.

use super::core::{Inner, Shared};
use super::state::State;
use super::task::{Callback, Handle, Task};
use parking_lot::MutexGuard;
use std::sync::Arc;
use std::thread;
use tracing::{error, trace, warn};

/// Body of a worker thread.
pub(super) fn run(shared: Arc<Shared>) {
    let mut guard = WorkerGuard {
        shared: Arc::clone(&shared),
        running: None,
    };
    let mut finished: Option<(Handle, Callback)> = None;
    while let Some((handle, mut callback)) = shared.fetch_task(finished.take()) {
        guard.running = Some(handle);
        callback();
        guard.running = None;
        finished = Some((handle, callback));
    }
    trace!("scheduler worker exiting");
}

/// Retires the worker from the bookkeeping when it exits. When it unwinds out
/// of a panicking callback while the scheduler is `Started`, a replacement
/// worker takes its place instead.
struct WorkerGuard {
    shared: Arc<Shared>,
    running: Option<Handle>,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        let monitor = &self.shared.monitor;
        let mut inner = monitor.lock();
        // 패닉한 작업은 재스케줄하지 않고 레지스트리에서 제거
        let orphan = self.running.and_then(|handle| inner.queue.erase(handle));

        let mut replaced = false;
        if thread::panicking() && inner.state == State::Started {
            let name = thread::current()
                .name()
                .unwrap_or("tsdb-scheduler")
                .to_owned();
            // stop()은 같은 락 아래에서 workers를 가져가므로 여기서 추가한 핸들도 join됨
            match self.shared.spawn_worker(name) {
                Ok(handle) => {
                    inner.workers.push(handle);
                    replaced = true;
                }
                Err(source) => {
                    warn!(error = %source, "failed to spawn replacement scheduler worker");
                }
            }
        }
        if !replaced {
            inner.live_workers = inner.live_workers.saturating_sub(1);
        }
        monitor.notify_all();
        drop(inner);

        if let Some(task) = orphan {
            error!(
                handle = %task.handle(),
                replaced,
                "scheduled callback panicked, task dropped"
            );
        }
    }
}

impl Shared {
    /// Books the previous run (if any), then blocks until a task is due or
    /// the scheduler is shutting down. `None` means "exit the loop".
    fn fetch_task(&self, finished: Option<(Handle, Callback)>) -> Option<(Handle, Callback)> {
        let clock = &*self.clock;
        let mut inner = self.monitor.lock();
        let stale =
            finished.and_then(|(handle, callback)| inner.finish_task(handle, callback, clock));
        inner.sleeping_workers += 1;
        self.monitor.notify_all();

        let next = self.next_due_task(&mut inner);

        inner.sleeping_workers -= 1;
        drop(inner);
        drop(stale);
        next
    }

    fn next_due_task(&self, inner: &mut MutexGuard<'_, Inner>) -> Option<(Handle, Callback)> {
        let clock = &*self.clock;
        loop {
            self.monitor.await_condition(inner, |inner| {
                inner.state.is_shutting_down() || !inner.queue.is_empty()
            });
            if inner.state.is_shutting_down() {
                return None;
            }
            let Some(deadline) = inner.queue.front_due() else {
                continue;
            };

            // 더 이른 작업이 들어와 front가 바뀌면 대기를 다시 시작
            self.monitor.await_with_deadline(
                clock,
                inner,
                |inner| {
                    inner.state.is_shutting_down()
                        || inner.task_due
                        || inner.queue.front_due() != Some(deadline)
                },
                deadline,
            );
            if inner.state.is_shutting_down() {
                return None;
            }
            if !inner.task_due {
                inner.refresh_task_due(clock);
                if !inner.task_due {
                    continue;
                }
            }

            let Some(handle) = inner.queue.pop_front() else {
                inner.task_due = false;
                continue;
            };
            inner.refresh_task_due(clock);
            // front가 바뀌었으므로 다른 워커도 재평가해야 함
            self.monitor.notify_all();

            match inner.queue.get_mut(handle).and_then(Task::take_callback) {
                Some(callback) => {
                    trace!(%handle, "task dequeued");
                    return Some((handle, callback));
                }
                None => {
                    debug_assert!(false, "queued task {} has no callback", handle);
                    inner.queue.erase(handle);
                }
            }
        }
    }
}
