//! Reconnect delay schedule.
//!
//! The delay starts at a base value, doubles after every failed attempt up to a
//! cap, and returns to the base once a connection opens.

use std::time::Duration;

/// Shortest delay the schedule will ever produce
pub const MIN_DELAY: Duration = Duration::from_millis(1);

/// Delay to use after `previous`: double it, never exceeding `cap`.
pub fn next_delay(previous: Duration, cap: Duration) -> Duration {
    previous.saturating_mul(2).min(cap)
}

/// Stateful reconnect schedule.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    current: Duration,
    jitter: f64,
}

impl Backoff {
    /// Both `base` and `cap` are raised to at least [`MIN_DELAY`].
    pub fn new(base: Duration, cap: Duration) -> Self {
        let cap = cap.max(MIN_DELAY);
        let base = base.clamp(MIN_DELAY, cap);
        Self {
            base,
            cap,
            current: base,
            jitter: 0.0,
        }
    }

    /// Add up to `jitter * delay` of random slack to each delay
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay before the upcoming retry, advancing the schedule
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = next_delay(self.current, self.cap);
        self.apply_jitter(delay)
    }

    /// Delay the upcoming retry would use, without jitter
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Back to the base delay
    pub fn reset(&mut self) {
        self.current = self.base;
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return delay;
        }
        let slack = delay.mul_f64(self.jitter * rand::random::<f64>());
        // jitter never pushes past the cap
        (delay + slack).min(self.cap)
    }
}
