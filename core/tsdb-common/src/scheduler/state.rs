//! Lifecycle state shared by the scheduler and the periodic thread.

use std::fmt;

/// Lifecycle state. Transitions only move forward:
/// `Idle → Started → Stopping → Stopped`, or `Idle → Stopped` directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum State {
    /// Constructed but not yet started.
    #[default]
    Idle = 0,

    /// Worker threads are processing tasks.
    Started = 1,

    /// Stop requested: running callbacks may finish, nothing new starts.
    Stopping = 2,

    /// All workers joined, nothing will ever run again.
    Stopped = 3,
}

impl State {
    /// Moves `self` from `from` to `to`. Returns `false` (and leaves `self`
    /// untouched) when the current state is not `from`.
    pub fn transition(&mut self, from: State, to: State) -> bool {
        debug_assert!(to > from, "state transitions never go backwards");
        if *self != from {
            return false;
        }
        *self = to;
        true
    }

    /// `true` once a stop has been requested.
    pub fn is_shutting_down(self) -> bool {
        self > State::Started
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Idle => "IDLE",
            State::Started => "STARTED",
            State::Stopping => "STOPPING",
            State::Stopped => "STOPPED",
        };
        f.write_str(name)
    }
}
