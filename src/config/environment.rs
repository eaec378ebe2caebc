// ABOUTME: Environment-based configuration for the chat persistence layer
// ABOUTME: Loads store location, rate limit window and transaction retry budget
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use super::database::DatabaseConfig;
use crate::constants::{defaults, env_vars};
use crate::store::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use tracing::{info, warn};

/// Fixed-window rate limiter settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Requests allowed per key per window
    pub max_requests: u32,
    /// Whether `enforce` schedules background sweeps of expired windows
    pub cleanup_enabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: defaults::RATE_LIMIT_WINDOW_MS,
            max_requests: defaults::RATE_LIMIT_MAX_REQUESTS,
            cleanup_enabled: true,
        }
    }
}

impl RateLimitConfig {
    /// Load rate limit settings from environment
    ///
    /// Missing, unparseable or non-positive values fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            window_ms: positive_env_or(
                env_vars::RATE_LIMIT_WINDOW_MS,
                defaults::RATE_LIMIT_WINDOW_MS,
            ),
            max_requests: positive_env_or(
                env_vars::RATE_LIMIT_MAX_REQUESTS,
                defaults::RATE_LIMIT_MAX_REQUESTS,
            ),
            cleanup_enabled: env::var(env_vars::RATE_LIMIT_CLEANUP_ENABLED)
                .ok()
                .and_then(|raw| raw.trim().parse().ok())
                .unwrap_or(true),
        }
    }

    /// Window length as signed epoch-millisecond arithmetic operand
    #[must_use]
    pub fn window_ms_i64(&self) -> i64 {
        i64::try_from(self.window_ms).unwrap_or(i64::MAX)
    }
}

/// Top-level configuration for the persistence services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Store location
    pub database: DatabaseConfig,
    /// Rate limiter settings
    pub rate_limit: RateLimitConfig,
    /// Attempts per transaction before a conflict is surfaced
    pub transaction_max_attempts: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            rate_limit: RateLimitConfig::default(),
            transaction_max_attempts: defaults::TRANSACTION_MAX_ATTEMPTS,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        info!("Loading configuration from environment variables");

        let config = Self {
            database: DatabaseConfig::from_env(),
            rate_limit: RateLimitConfig::from_env(),
            transaction_max_attempts: positive_env_or(
                env_vars::TRANSACTION_MAX_ATTEMPTS,
                defaults::TRANSACTION_MAX_ATTEMPTS,
            ),
        };

        info!(
            database = %config.database.url,
            window_ms = config.rate_limit.window_ms,
            max_requests = config.rate_limit.max_requests,
            "Configuration loaded"
        );
        config
    }

    /// Retry policy for store transactions
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_max_attempts(self.transaction_max_attempts)
    }
}

/// Parse a strictly positive number from the environment, warning on bad input
fn positive_env_or<T>(key: &str, default: T) -> T
where
    T: FromStr + PartialOrd + Default + Copy,
{
    let Ok(raw) = env::var(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => value,
        _ => {
            warn!(key, value = %raw, "Ignoring non-positive or invalid value, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            env_vars::RATE_LIMIT_WINDOW_MS,
            env_vars::RATE_LIMIT_MAX_REQUESTS,
            env_vars::RATE_LIMIT_CLEANUP_ENABLED,
            env_vars::TRANSACTION_MAX_ATTEMPTS,
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_rate_limit_defaults_when_unset() {
        clear_env();
        assert_eq!(RateLimitConfig::from_env(), RateLimitConfig::default());
    }

    #[test]
    #[serial]
    fn test_rate_limit_reads_positive_overrides() {
        clear_env();
        env::set_var(env_vars::RATE_LIMIT_WINDOW_MS, "5000");
        env::set_var(env_vars::RATE_LIMIT_MAX_REQUESTS, "3");
        env::set_var(env_vars::RATE_LIMIT_CLEANUP_ENABLED, "false");

        let config = RateLimitConfig::from_env();
        assert_eq!(config.window_ms, 5000);
        assert_eq!(config.max_requests, 3);
        assert!(!config.cleanup_enabled);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_rate_limit_rejects_non_positive_values() {
        clear_env();
        env::set_var(env_vars::RATE_LIMIT_WINDOW_MS, "0");
        env::set_var(env_vars::RATE_LIMIT_MAX_REQUESTS, "-4");

        let config = RateLimitConfig::from_env();
        assert_eq!(config.window_ms, defaults::RATE_LIMIT_WINDOW_MS);
        assert_eq!(config.max_requests, defaults::RATE_LIMIT_MAX_REQUESTS);

        env::set_var(env_vars::RATE_LIMIT_WINDOW_MS, "soon");
        assert_eq!(
            RateLimitConfig::from_env().window_ms,
            defaults::RATE_LIMIT_WINDOW_MS
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn test_transaction_attempts_from_env() {
        clear_env();
        env::set_var(env_vars::TRANSACTION_MAX_ATTEMPTS, "2");
        assert_eq!(ServerConfig::from_env().retry_policy().max_attempts, 2);
        clear_env();
    }
}
