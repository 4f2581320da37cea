use std::time::{Duration, Instant};

/// State of an interval timer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TimerState {
    /// Waiting to capture a start time on the next evaluation.
    Reset,
    /// Counting from the captured start time.
    Running,
    /// The interval elapsed.
    Fired,
}

/// A polled interval timer.
///
/// The engine owns three of these (network timeout, reconnect delay,
/// keepalive) and evaluates them once per step against a single time
/// sample. A disabled timer (no interval) never leaves its current
/// state.
#[derive(Debug)]
pub struct IntervalTimer {
    interval: Option<Duration>,
    state: TimerState,
    started: Instant,
}

impl IntervalTimer {
    pub fn new(interval: Option<Duration>) -> Self {
        Self {
            interval,
            state: TimerState::Reset,
            started: Instant::now(),
        }
    }

    /// A timer that is already fired, so the first evaluation of the
    /// guarded action runs immediately.
    pub fn expired(interval: Option<Duration>) -> Self {
        Self {
            state: TimerState::Fired,
            ..Self::new(interval)
        }
    }

    pub fn reset(&mut self) {
        self.state = TimerState::Reset;
    }

    /// Advance the state against `now`.
    pub fn evaluate(&mut self, now: Instant) {
        let Some(interval) = self.interval else {
            return;
        };

        match self.state {
            TimerState::Reset => {
                self.started = now;
                self.state = TimerState::Running;
            }
            TimerState::Running if now.duration_since(self.started) > interval => {
                self.state = TimerState::Fired;
            }
            _ => {}
        }
    }

    pub fn is_fired(&self) -> bool {
        self.state == TimerState::Fired
    }

    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }
}
