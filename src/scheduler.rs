//! Duty-cycle gate that decides when a monitoring window may run.
//!
//! The scheduler is a pure state machine over millisecond timestamps. The
//! engine asks it whether a window is due, arms it when the hardware comes
//! up, and disarms it when the window elapses. Only one window can be armed
//! at a time.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    Armed { started_at_ms: u64 },
}

#[derive(Debug, Clone)]
pub struct DutyCycleScheduler {
    interval_ms: u64,
    window_ms: u64,
    last_cycle_ms: Option<u64>,
    phase: SchedulerPhase,
}

impl DutyCycleScheduler {
    /// Start idle at `now_ms`. Without `arm_on_start` the first window is
    /// due one full interval later.
    pub fn new(interval_ms: u64, window_ms: u64, now_ms: u64, arm_on_start: bool) -> Self {
        Self {
            interval_ms: interval_ms.max(1),
            window_ms: window_ms.max(1),
            last_cycle_ms: if arm_on_start { None } else { Some(now_ms) },
            phase: SchedulerPhase::Idle,
        }
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.phase, SchedulerPhase::Armed { .. })
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// True when idle and a full interval has passed since the last attempt.
    pub fn is_due(&self, now_ms: u64) -> bool {
        if self.is_armed() {
            return false;
        }
        match self.last_cycle_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.interval_ms,
        }
    }

    /// Time left until the next window is due; zero when due or armed.
    pub fn until_due(&self, now_ms: u64) -> Duration {
        if self.is_armed() {
            return Duration::ZERO;
        }
        let wait_ms = match self.last_cycle_ms {
            None => 0,
            Some(last) => (last + self.interval_ms).saturating_sub(now_ms),
        };
        Duration::from_millis(wait_ms)
    }

    /// Claim this interval's cycle. Returns false (and changes nothing) if a
    /// window is already armed or the interval has not elapsed.
    ///
    /// The cycle is consumed even if the caller then fails to bring the
    /// hardware up; see [`stand_down`](Self::stand_down).
    pub fn try_arm(&mut self, now_ms: u64) -> bool {
        if !self.is_due(now_ms) {
            return false;
        }
        self.last_cycle_ms = Some(now_ms);
        self.phase = SchedulerPhase::Armed {
            started_at_ms: now_ms,
        };
        true
    }

    /// Abandon an armed cycle that never got going. The next attempt waits
    /// for the following interval.
    pub fn stand_down(&mut self) {
        self.phase = SchedulerPhase::Idle;
    }

    /// Restart the window timer once the hardware is actually up.
    pub fn mark_window_start(&mut self, now_ms: u64) {
        if self.is_armed() {
            self.phase = SchedulerPhase::Armed {
                started_at_ms: now_ms,
            };
        }
    }

    pub fn window_elapsed(&self, now_ms: u64) -> bool {
        match self.phase {
            SchedulerPhase::Idle => true,
            SchedulerPhase::Armed { started_at_ms } => {
                now_ms.saturating_sub(started_at_ms) >= self.window_ms
            }
        }
    }

    /// Armed -> Idle. Returns how long the window ran, if one was armed.
    pub fn disarm(&mut self, now_ms: u64) -> Option<u64> {
        match self.phase {
            SchedulerPhase::Idle => None,
            SchedulerPhase::Armed { started_at_ms } => {
                self.phase = SchedulerPhase::Idle;
                Some(now_ms.saturating_sub(started_at_ms))
            }
        }
    }
}
