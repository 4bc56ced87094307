//! Real-time clock backed by the OS.

use super::{Await, Clock, Timestamp};
use std::sync::{Arc, OnceLock};
use std::time::SystemTime;

/// Clock that reads the system time and blocks with OS timed waits.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealClock;

impl RealClock {
    /// Shared process-wide instance, used wherever no clock is injected.
    pub fn instance() -> Arc<dyn Clock> {
        static INSTANCE: OnceLock<Arc<dyn Clock>> = OnceLock::new();
        Arc::clone(INSTANCE.get_or_init(|| Arc::new(RealClock)))
    }
}

impl Clock for RealClock {
    fn now(&self) -> Timestamp {
        SystemTime::now()
    }

    fn sleep_until(&self, deadline: Timestamp) {
        // thread::sleep은 조기 기상이 가능하므로 반복
        while let Ok(remaining) = deadline.duration_since(SystemTime::now()) {
            if remaining.is_zero() {
                break;
            }
            std::thread::sleep(remaining);
        }
    }

    fn await_with_deadline(&self, wait: &mut dyn Await, deadline: Timestamp) -> bool {
        loop {
            if wait.is_ready() {
                return true;
            }
            match deadline.duration_since(SystemTime::now()) {
                Ok(remaining) if !remaining.is_zero() => wait.wait_for(remaining),
                _ => return false,
            }
        }
    }
}
