//! Cancellable timers driven by an explicit clock.
//!
//! Nothing here sleeps or registers callbacks: the owner passes `now` (in
//! milliseconds) and asks whether the timer is due. Production code feeds wall
//! time, tests feed a virtual clock.

/// One-shot timer. Re-arming replaces the previous deadline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Deadline {
    at: Option<u64>,
}

impl Deadline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, now: u64, delay_ms: u64) {
        self.at = Some(now.saturating_add(delay_ms));
    }

    pub fn cancel(&mut self) {
        self.at = None;
    }

    pub fn is_armed(&self) -> bool {
        self.at.is_some()
    }

    pub fn due_at(&self) -> Option<u64> {
        self.at
    }

    /// Returns true once when the deadline has passed, disarming the timer.
    pub fn fire(&mut self, now: u64) -> bool {
        match self.at {
            Some(at) if now >= at => {
                self.at = None;
                true
            }
            _ => false,
        }
    }
}

/// Fixed-period timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Interval {
    period_ms: u64,
    next: Option<u64>,
}

impl Interval {
    pub fn new(period_ms: u64) -> Self {
        Self {
            period_ms: period_ms.max(1),
            next: None,
        }
    }

    pub fn start(&mut self, now: u64) {
        self.next = Some(now.saturating_add(self.period_ms));
    }

    pub fn stop(&mut self) {
        self.next = None;
    }

    pub fn due_at(&self) -> Option<u64> {
        self.next
    }

    /// Returns true if at least one period boundary was crossed since the last
    /// fire. Missed periods collapse into a single fire.
    pub fn fire(&mut self, now: u64) -> bool {
        let Some(next) = self.next else {
            return false;
        };
        if now < next {
            return false;
        }
        let missed = (now - next) / self.period_ms;
        self.next = Some(next + (missed + 1) * self.period_ms);
        true
    }
}
