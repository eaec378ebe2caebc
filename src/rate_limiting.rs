// ABOUTME: Per-key fixed-window request quota backed by durable window documents
// ABOUTME: Transactional read-check-write per key with an opportunistic sweep of expired windows
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Rate Limiting
//!
//! Each caller key maps to one document in the global `_rateLimitWindows`
//! collection holding `count`, `windowStart` and `expiresAt` (epoch millis).
//! The read-check-write runs in a store transaction, so two concurrent
//! requests can never both take the last slot of a window.
//!
//! Expired windows are removed by a sweep that `enforce` schedules at most
//! once per `max(window, 60s)`; only one sweep runs at a time per limiter.

use crate::clock::Clock;
use crate::config::RateLimitConfig;
use crate::constants::{batch_sizes, collections, defaults, fields, limits};
use crate::errors::{AppError, AppResult};
use crate::store::value::get_i64;
use crate::store::{
    load_or_init, run_transaction, CollectionPath, Document, DocumentPath, DocumentStore, Loaded,
    Query, RetryPolicy, Transaction, TransactionBody, Value, WriteBatch,
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

const COUNT: &str = "count";
const WINDOW_START: &str = "windowStart";

/// Map a caller key to a storage-safe document id
///
/// Characters outside `[a-zA-Z0-9_-]` become `_`, the result is cut to 150
/// characters, and an empty result becomes `default`. Distinct keys that
/// sanitize to the same id share one quota bucket.
#[must_use]
pub fn sanitize_key(key: &str) -> String {
    let sanitized: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(limits::RATE_LIMIT_KEY_MAX_CHARS)
        .collect();

    if sanitized.is_empty() {
        limits::RATE_LIMIT_DEFAULT_KEY.to_owned()
    } else {
        sanitized
    }
}

/// Persisted state of one quota window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitWindow {
    /// Requests recorded in the current window
    pub count: i64,
    /// Window start in epoch milliseconds
    pub window_start: i64,
    /// Instant after which the record may be pruned
    pub expires_at: i64,
}

impl RateLimitWindow {
    /// Fresh window starting at `now`
    #[must_use]
    pub const fn empty(now: i64) -> Self {
        Self {
            count: 0,
            window_start: now,
            expires_at: now,
        }
    }

    /// Read a window document, treating missing fields as a fresh window
    #[must_use]
    pub fn from_document(doc: &Document, now: i64) -> Self {
        let window_start = get_i64(doc, WINDOW_START).unwrap_or(now);
        Self {
            count: get_i64(doc, COUNT).unwrap_or(0),
            window_start,
            expires_at: get_i64(doc, fields::EXPIRES_AT).unwrap_or(window_start),
        }
    }

    /// Fields written back to the store
    #[must_use]
    pub fn to_document(&self) -> Document {
        Document::from([
            (COUNT.to_owned(), Value::Integer(self.count)),
            (WINDOW_START.to_owned(), Value::Integer(self.window_start)),
            (fields::EXPIRES_AT.to_owned(), Value::Integer(self.expires_at)),
        ])
    }

    /// Whether the window no longer covers `now`
    #[must_use]
    pub const fn has_elapsed(&self, now: i64, window_ms: i64) -> bool {
        now.saturating_sub(self.window_start) >= window_ms
    }
}

/// Quota state after a recorded request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    /// Requests allowed per window
    pub limit: u32,
    /// Requests left in the current window
    pub remaining: u32,
    /// When the current window ends
    pub reset_at: DateTime<Utc>,
}

/// Cleanup bookkeeping owned by one limiter instance
#[derive(Debug)]
struct CleanupState {
    in_flight: AtomicBool,
    last_run_ms: AtomicI64,
}

impl Default for CleanupState {
    fn default() -> Self {
        Self {
            in_flight: AtomicBool::new(false),
            last_run_ms: AtomicI64::new(i64::MIN),
        }
    }
}

impl CleanupState {
    /// Claim the sweep slot if the interval has elapsed and nothing runs
    fn try_claim(&self, now: i64, interval_ms: i64) -> bool {
        if now.saturating_sub(self.last_run_ms.load(Ordering::Acquire)) < interval_ms {
            return false;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.last_run_ms.store(now, Ordering::Release);
        true
    }

    fn release(&self) {
        self.in_flight.store(false, Ordering::Release);
    }
}

/// Fixed-window request limiter
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
    retry: RetryPolicy,
    cleanup: Arc<CleanupState>,
}

impl RateLimiter {
    /// Create a limiter over `store`
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        config: RateLimitConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            retry,
            cleanup: Arc::new(CleanupState::default()),
        }
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Whether a background sweep is currently running
    #[must_use]
    pub fn cleanup_in_flight(&self) -> bool {
        self.cleanup.in_flight.load(Ordering::Acquire)
    }

    /// Record one request for `key`, or fail once the window's quota is used up
    ///
    /// # Errors
    ///
    /// Returns `RateLimitExceeded` when the quota is exhausted, or the store
    /// error if the window cannot be read or written
    pub async fn enforce(&self, key: &str) -> AppResult<RateLimitStatus> {
        let now = self.clock.now_millis();
        self.maybe_schedule_cleanup(now);

        let storage_key = sanitize_key(key);
        let body = EnforceWindow {
            path: window_collection()?.doc(&storage_key)?,
            now,
            window_ms: self.config.window_ms_i64(),
            max_requests: self.config.max_requests,
        };

        match run_transaction(self.store.as_ref(), &self.retry, &body).await {
            Ok(status) => {
                debug!(
                    key = %storage_key,
                    remaining = status.remaining,
                    "Rate limit request recorded"
                );
                Ok(status)
            }
            Err(err) => {
                if err.is_rate_limited() {
                    info!(
                        key = %storage_key,
                        limit = self.config.max_requests,
                        "Rate limit exceeded"
                    );
                }
                Err(err)
            }
        }
    }

    /// Delete up to one batch of expired windows now
    ///
    /// # Errors
    ///
    /// Returns the store error if the query or batch delete fails
    pub async fn prune_expired(&self) -> AppResult<usize> {
        sweep_expired(self.store.as_ref(), self.clock.now_millis()).await
    }

    fn maybe_schedule_cleanup(&self, now: i64) {
        if !self.config.cleanup_enabled {
            return;
        }
        let interval = self
            .config
            .window_ms_i64()
            .max(defaults::RATE_LIMIT_MIN_SWEEP_INTERVAL_MS);
        if !self.cleanup.try_claim(now, interval) {
            return;
        }

        let store = Arc::clone(&self.store);
        let cleanup = Arc::clone(&self.cleanup);
        tokio::spawn(async move {
            match sweep_expired(store.as_ref(), now).await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "Pruned expired rate limit windows"),
                Err(e) => warn!(error = %e, "Rate limit window cleanup failed"),
            }
            cleanup.release();
        });
    }
}

fn window_collection() -> AppResult<CollectionPath> {
    Ok(CollectionPath::root(collections::RATE_LIMIT_WINDOWS)?)
}

/// Delete windows whose `expiresAt <= now`, at most one batch
async fn sweep_expired(store: &dyn DocumentStore, now: i64) -> AppResult<usize> {
    let collection = window_collection()?;
    let query = Query::new(collection.clone())
        .where_lte(fields::EXPIRES_AT, now)
        .limit(batch_sizes::RATE_LIMIT_SWEEP);
    let expired = store.query(&query).await?;
    if expired.is_empty() {
        return Ok(0);
    }

    let mut batch = WriteBatch::new();
    for snapshot in &expired {
        batch.delete(collection.doc(&snapshot.id)?);
    }
    store.commit_batch(batch).await?;
    Ok(expired.len())
}

/// Read-check-write of one window
struct EnforceWindow {
    path: DocumentPath,
    now: i64,
    window_ms: i64,
    max_requests: u32,
}

#[async_trait]
impl TransactionBody for EnforceWindow {
    type Output = RateLimitStatus;

    async fn run(&self, tx: &mut dyn Transaction) -> AppResult<RateLimitStatus> {
        let mut window = match load_or_init(tx, &self.path).await? {
            Loaded::Existing(doc) => RateLimitWindow::from_document(&doc, self.now),
            Loaded::Absent => RateLimitWindow::empty(self.now),
        };

        if window.has_elapsed(self.now, self.window_ms) {
            window = RateLimitWindow::empty(self.now);
        }

        let window_end = window.window_start.saturating_add(self.window_ms);
        if window.count >= i64::from(self.max_requests) {
            return Err(AppError::rate_limit_exceeded(
                self.max_requests,
                window_end.saturating_sub(self.now).max(0),
            ));
        }

        window.count += 1;
        window.expires_at = window
            .window_start
            .saturating_add(self.window_ms.saturating_mul(2));
        tx.set_merge(&self.path, window.to_document());

        let remaining = i64::from(self.max_requests) - window.count;
        Ok(RateLimitStatus {
            limit: self.max_requests,
            remaining: u32::try_from(remaining).unwrap_or(0),
            reset_at: Utc
                .timestamp_millis_opt(window_end)
                .single()
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_key_replaces_unsafe_characters() {
        assert_eq!(sanitize_key("user@example.com"), "user_example_com");
        assert_eq!(sanitize_key("a.b"), sanitize_key("a_b"));
        assert_eq!(sanitize_key("ok-key_1"), "ok-key_1");
        assert_eq!(sanitize_key(""), "default");
        assert_eq!(sanitize_key("日本"), "__");
    }

    #[test]
    fn test_sanitize_key_truncates_by_characters() {
        let long = "é".repeat(400);
        let sanitized = sanitize_key(&long);
        assert_eq!(sanitized.chars().count(), 150);
        assert!(sanitized.chars().all(|c| c == '_'));
    }

    #[test]
    fn test_window_elapsed_boundary() {
        let window = RateLimitWindow::empty(1_000);
        assert!(!window.has_elapsed(60_999, 60_000));
        assert!(window.has_elapsed(61_000, 60_000));
    }

    #[test]
    fn test_cleanup_claim_is_exclusive_and_throttled() {
        let state = CleanupState::default();
        assert!(state.try_claim(1_000, 60_000));
        assert!(!state.try_claim(200_000, 60_000));
        state.release();
        assert!(!state.try_claim(30_000, 60_000));
        assert!(state.try_claim(61_000, 60_000));
    }

    #[test]
    fn test_window_document_roundtrip_defaults() {
        let doc = RateLimitWindow {
            count: 3,
            window_start: 10,
            expires_at: 20,
        }
        .to_document();
        assert_eq!(RateLimitWindow::from_document(&doc, 99).count, 3);
        assert_eq!(
            RateLimitWindow::from_document(&Document::new(), 99),
            RateLimitWindow {
                count: 0,
                window_start: 99,
                expires_at: 99
            }
        );
    }
}
