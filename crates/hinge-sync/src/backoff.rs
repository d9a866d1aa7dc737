//! Exponential reconnect backoff with a retry ceiling.
//!
//! A [`Backoff`] hands out one delay per failed attempt and returns `None`
//! once the attempt budget is spent, at which point the connection reports
//! itself `unreachable` instead of retrying forever.

use std::time::Duration;

use rand::Rng as _;

use crate::config::BackoffConfig;

/// Stateful retry schedule for one connection.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    /// Start a fresh schedule.
    pub const fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Number of consecutive failures recorded so far.
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Forget previous failures after a successful handshake.
    pub const fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Record a failure and return how long to wait before the next try.
    ///
    /// Returns `None` once `max_attempts` failures have been recorded, so
    /// the first failed handshake already counts against the budget.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let failed = self.attempt;
        self.attempt = self.attempt.saturating_add(1);
        if self.exhausted() {
            return None;
        }
        let ceiling = self.ceiling_for(failed);
        if self.config.jitter && ceiling > 0 {
            Some(Duration::from_millis(rand::rng().random_range(0..=ceiling)))
        } else {
            Some(Duration::from_millis(ceiling))
        }
    }

    /// Whether the recorded failures have used up the budget.
    pub const fn exhausted(&self) -> bool {
        self.config.max_attempts != 0 && self.attempt >= self.config.max_attempts
    }

    /// Un-jittered delay after the zero-based `attempt`-th failure.
    pub fn ceiling_for(&self, attempt: u32) -> u64 {
        let factor = u64::from(self.config.multiplier).saturating_pow(attempt);
        self.config
            .initial_delay_ms
            .saturating_mul(factor)
            .min(self.config.max_delay_ms)
    }
}
