//! Scheduled Task
//!
//! 스케줄된 작업 레코드와 핸들 정의

use crate::clock::{Timestamp, next_period_boundary};
use crate::sequence::SequenceNumber;
use std::fmt;
use std::time::Duration;

/// Type of the functions that can be scheduled.
pub type Callback = Box<dyn FnMut() + Send + 'static>;

/// Unique, process-wide task ID returned by the `schedule_*` methods.
///
/// Handles are never reused. `Handle::INVALID` (0) is never handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

// 0은 INVALID 핸들로 예약되어 있으므로 1부터 시작
static HANDLE_GENERATOR: SequenceNumber = SequenceNumber::new(1);

impl Handle {
    pub const INVALID: Handle = Handle(0);

    fn next() -> Self {
        Handle(HANDLE_GENERATOR.get_next())
    }

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A pending or in-flight unit of work. Guarded by the scheduler mutex.
pub(crate) struct Task {
    handle: Handle,
    /// `None` while a worker is running the callback.
    callback: Option<Callback>,
    due_time: Timestamp,
    period: Option<Duration>,
    cancelled: bool,
    /// Backlink: index of this task in the heap, `None` when not queued.
    slot: Option<usize>,
}

impl Task {
    pub(crate) fn new(callback: Callback, due_time: Timestamp, period: Option<Duration>) -> Self {
        Self {
            handle: Handle::next(),
            callback: Some(callback),
            due_time,
            period,
            cancelled: false,
            slot: None,
        }
    }

    pub(crate) fn handle(&self) -> Handle {
        self.handle
    }

    pub(crate) fn due_time(&self) -> Timestamp {
        self.due_time
    }

    pub(crate) fn is_periodic(&self) -> bool {
        self.period.is_some()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub(crate) fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub(crate) fn slot(&self) -> Option<usize> {
        self.slot
    }

    pub(crate) fn set_slot(&mut self, slot: Option<usize>) {
        self.slot = slot;
    }

    pub(crate) fn is_queued(&self) -> bool {
        self.slot.is_some()
    }

    /// Hands the callback to a worker. The task stays registered meanwhile.
    pub(crate) fn take_callback(&mut self) -> Option<Callback> {
        self.callback.take()
    }

    pub(crate) fn restore_callback(&mut self, callback: Callback) {
        debug_assert!(self.callback.is_none(), "callback restored twice");
        self.callback = Some(callback);
    }

    /// Moves the due time of a periodic task past `now`, skipping missed ticks.
    pub(crate) fn advance_due_time(&mut self, now: Timestamp) {
        if let Some(period) = self.period {
            self.due_time = next_period_boundary(self.due_time, now, period);
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("handle", &self.handle)
            .field("due_time", &self.due_time)
            .field("period", &self.period)
            .field("cancelled", &self.cancelled)
            .field("slot", &self.slot)
            .field("running", &self.callback.is_none())
            .finish()
    }
}
