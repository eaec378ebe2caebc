// ABOUTME: Bounded retry policy for conflicting store transactions
// ABOUTME: Exponential backoff with jitter, capped by attempts and delay ceiling
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use crate::constants::defaults;
use rand::Rng;
use std::time::Duration;

/// How often and how patiently a conflicting transaction is re-run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay after the first conflict
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::TRANSACTION_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(defaults::TRANSACTION_BASE_DELAY_MS),
            max_delay: Duration::from_millis(defaults::TRANSACTION_MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Policy with a custom attempt budget and default delays
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Backoff before attempt `attempt + 1`, where `attempt` starts at 1
    ///
    /// Doubles per attempt up to `max_delay`; the returned delay lies in
    /// `[ceiling / 2, ceiling]` so concurrent losers spread out.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling_for(attempt);
        let ceiling_ms = ceiling.as_millis() as u64;
        if ceiling_ms < 2 {
            return ceiling;
        }
        let half = ceiling_ms / 2;
        Duration::from_millis(half + rand::thread_rng().gen_range(0..=ceiling_ms - half))
    }

    fn ceiling_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1_u32 << exponent)
            .min(self.max_delay)
    }
}
