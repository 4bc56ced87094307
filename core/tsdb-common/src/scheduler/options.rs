//! Scheduler configuration
//!
//! `SchedulerOptions`는 생성 시점 옵션(빌더), `SchedulerConfig`는 JSON 등에서
//! 읽어오는 순수 데이터 설정입니다.

use crate::clock::{Clock, RealClock};
use crate::error::{CommonError, CommonResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DEFAULT_NUM_WORKERS: u16 = 2;

/// Construction-time options of a [`Scheduler`](super::Scheduler).
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Number of worker threads, at least 1.
    pub num_workers: u16,

    /// Time source. `None` selects [`RealClock::instance`].
    pub clock: Option<Arc<dyn Clock>>,

    /// Start the workers right away from `Scheduler::new`.
    pub start_now: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            num_workers: DEFAULT_NUM_WORKERS,
            clock: None,
            start_now: false,
        }
    }
}

impl SchedulerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_num_workers(mut self, num_workers: u16) -> Self {
        self.num_workers = num_workers;
        self
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
        if self.num_workers == 0 {
            return Err(CommonError::InvalidConfig(
                "num_workers must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// The configured clock, or the shared real clock.
    pub(crate) fn clock_or_default(&self) -> Arc<dyn Clock> {
        self.clock.clone().unwrap_or_else(RealClock::instance)
    }
}

fn default_num_workers() -> usize {
    usize::from(DEFAULT_NUM_WORKERS)
}

/// Plain-data scheduler configuration, e.g. loaded from a JSON file.
///
/// `num_workers = 0` means "one worker per available CPU".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,

    #[serde(default)]
    pub start_now: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            num_workers: default_num_workers(),
            start_now: false,
        }
    }
}

impl SchedulerConfig {
    pub fn from_json(json: &str) -> CommonResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Worker count after resolving 0 to the number of CPUs.
    pub fn resolved_num_workers(&self) -> u16 {
        let requested = if self.num_workers == 0 {
            num_cpus::get()
        } else {
            self.num_workers
        };
        u16::try_from(requested).unwrap_or(u16::MAX).max(1)
    }

    /// Converts into options using the real clock.
    pub fn into_options(self) -> SchedulerOptions {
        SchedulerOptions::new()
            .with_num_workers(self.resolved_num_workers())
            .with_start_now(self.start_now)
    }
}
