//! Scheduler System
//!
//! 시간 기반 작업 스케줄링 시스템
//!
//! A [`Scheduler`] owns a fixed pool of worker threads, a registry of tasks
//! keyed by [`Handle`], and a min-heap of those tasks ordered by due time.
//! All of it sits behind one mutex; callbacks run with the mutex released.

mod core;
mod integration_tests;
mod options;
mod queue;
mod state;
mod task;
mod worker;

pub use self::core::Scheduler;
pub use options::{SchedulerConfig, SchedulerOptions};
pub use state::State;
pub use task::{Callback, Handle};
