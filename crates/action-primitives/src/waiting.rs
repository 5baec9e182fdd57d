//! Polling cadence for element waits

use std::time::Duration;

/// Growing poll interval: `initial`, then multiplied by `factor` until `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub initial: Duration,
    pub factor: u32,
    pub max: Duration,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(25),
            factor: 2,
            max: Duration::from_millis(400),
        }
    }
}

impl PollSchedule {
    pub fn delays(&self) -> PollDelays {
        PollDelays {
            next: self.initial.min(self.max),
            schedule: *self,
        }
    }
}

/// Endless iterator over poll delays.
#[derive(Debug, Clone)]
pub struct PollDelays {
    next: Duration,
    schedule: PollSchedule,
}

impl Iterator for PollDelays {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        self.next = current
            .checked_mul(self.schedule.factor.max(1))
            .unwrap_or(self.schedule.max)
            .min(self.schedule.max);
        Some(current)
    }
}
