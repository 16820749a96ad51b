//! Retry policy for conflicting transactions
//!
//! Exponential backoff with jitter: attempt `n` sleeps for a random duration
//! in `[nominal / 2, nominal * 3 / 2]`, where `nominal` doubles from
//! `base_backoff_us` up to `max_backoff_us`.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How often and how patiently to retry a conflicting transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Nominal delay before the first retry, in microseconds
    pub base_backoff_us: u64,
    /// Cap on the nominal delay, in microseconds
    pub max_backoff_us: u64,
    /// Give up after this many attempts; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Default base delay
    pub const BASE_BACKOFF_US: u64 = 10;
    /// Default delay cap
    pub const MAX_BACKOFF_US: u64 = 4_000;

    /// Retry forever with the default delays
    pub const fn unbounded() -> Self {
        RetryPolicy {
            base_backoff_us: Self::BASE_BACKOFF_US,
            max_backoff_us: Self::MAX_BACKOFF_US,
            max_attempts: None,
        }
    }

    /// Give up after `attempts` attempts
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Never back off (tests, single-threaded loads)
    pub const fn no_backoff(mut self) -> Self {
        self.base_backoff_us = 0;
        self.max_backoff_us = 0;
        self
    }

    /// Check if `attempts` attempts used up the budget
    pub fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }

    fn nominal_us(&self, attempt: u32) -> u64 {
        let shift = attempt.min(31);
        self.base_backoff_us
            .saturating_mul(1_u64 << shift)
            .min(self.max_backoff_us)
    }

    /// Jittered delay before retry number `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let nominal = self.nominal_us(attempt);
        if nominal == 0 {
            return Duration::ZERO;
        }
        let low = nominal / 2;
        let high = nominal.saturating_add(nominal / 2);
        Duration::from_micros(rand::thread_rng().gen_range(low..=high))
    }

    /// Sleep before retry number `attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let delay = self.delay(attempt);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unbounded()
    }
}
