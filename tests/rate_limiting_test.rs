// ABOUTME: Integration tests for the fixed-window rate limiter
// ABOUTME: Window arithmetic, key sanitization, concurrent quota and expired window sweeps
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use anyhow::Result;
use chrono::Duration;
use common::{
    memory_store, sqlite_memory_store, start_clock, test_config, FaultyStore, RecordingStore,
};
use lyric_chat_store::clock::{Clock, ManualClock};
use lyric_chat_store::errors::{ErrorCode, RATE_LIMIT_MESSAGE_KEY};
use lyric_chat_store::rate_limiting::RateLimiter;
use lyric_chat_store::resources::ChatPersistence;
use lyric_chat_store::store::value::get_i64;
use lyric_chat_store::store::{Document, DocumentPath, DocumentStore, Value, WriteBatch};
use std::sync::Arc;

const WINDOWS: &str = "_rateLimitWindows";

fn build_limiter(
    store: Arc<dyn DocumentStore>,
    max: u32,
    cleanup: bool,
) -> (RateLimiter, Arc<ManualClock>) {
    let clock = start_clock();
    let chat =
        ChatPersistence::with_store(store, clock.clone(), test_config(max, 60_000, cleanup));
    (chat.rate_limiter, clock)
}

fn window_path(id: &str) -> DocumentPath {
    DocumentPath::parse(&format!("{WINDOWS}/{id}")).unwrap()
}

fn expiring_at(expires_at: i64) -> Document {
    Document::from([
        ("count".to_owned(), Value::Integer(1)),
        ("windowStart".to_owned(), Value::Integer(expires_at - 120_000)),
        ("expiresAt".to_owned(), Value::Integer(expires_at)),
    ])
}

async fn wait_for_sweep(limiter: &RateLimiter) {
    for _ in 0..200 {
        if !limiter.cleanup_in_flight() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("cleanup sweep did not finish");
}

// ============================================================================
// Window arithmetic
// ============================================================================

#[tokio::test]
async fn test_window_allows_quota_then_rejects_until_reset() -> Result<()> {
    let store = memory_store();
    let (limiter, clock) = build_limiter(store.clone(), 2, false);
    let start = clock.now_millis();

    let first = limiter.enforce("caller").await?;
    assert_eq!(first.limit, 2);
    assert_eq!(first.remaining, 1);
    assert_eq!(first.reset_at.timestamp_millis(), start + 60_000);

    clock.advance(Duration::seconds(1));
    assert_eq!(limiter.enforce("caller").await?.remaining, 0);

    clock.advance(Duration::seconds(1));
    let err = limiter.enforce("caller").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::RateLimitExceeded);
    assert!(err.is_rate_limited());
    assert_eq!(err.message_key(), Some(RATE_LIMIT_MESSAGE_KEY));
    assert_eq!(err.context.details["retryAfterMs"], 58_000);

    // Exactly one window length after the start a fresh window opens.
    clock.advance(Duration::seconds(58));
    let reopened = limiter.enforce("caller").await?;
    assert_eq!(reopened.remaining, 1);

    let doc = store.get(&window_path("caller")).await?.unwrap();
    assert_eq!(get_i64(&doc, "count"), Some(1));
    assert_eq!(get_i64(&doc, "windowStart"), Some(start + 60_000));
    assert_eq!(get_i64(&doc, "expiresAt"), Some(start + 60_000 + 120_000));
    Ok(())
}

#[tokio::test]
async fn test_rejected_requests_do_not_consume_quota() -> Result<()> {
    let store = memory_store();
    let (limiter, clock) = build_limiter(store.clone(), 1, false);

    limiter.enforce("caller").await?;
    for _ in 0..3 {
        assert!(limiter.enforce("caller").await.is_err());
    }

    let doc = store.get(&window_path("caller")).await?.unwrap();
    assert_eq!(get_i64(&doc, "count"), Some(1));

    clock.advance(Duration::seconds(60));
    assert!(limiter.enforce("caller").await.is_ok());
    Ok(())
}

#[tokio::test]
async fn test_sanitized_keys_share_a_bucket() -> Result<()> {
    let store = memory_store();
    let (limiter, _clock) = build_limiter(store.clone(), 2, false);

    limiter.enforce("a.b").await?;
    limiter.enforce("a_b").await?;
    let err = limiter.enforce("a.b").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::RateLimitExceeded);

    limiter.enforce("user@example.com").await?;
    assert!(store.get(&window_path("user_example_com")).await?.is_some());

    limiter.enforce("").await?;
    assert!(store.get(&window_path("default")).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn test_sqlite_backend_enforces_the_same_window() -> Result<()> {
    let store = sqlite_memory_store().await;
    let (limiter, clock) = build_limiter(store.clone(), 2, false);

    limiter.enforce("caller").await?;
    limiter.enforce("caller").await?;
    assert!(limiter.enforce("caller").await.is_err());

    clock.advance(Duration::seconds(60));
    assert_eq!(limiter.enforce("caller").await?.remaining, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_never_exceed_the_quota() -> Result<()> {
    let store = memory_store();
    let (limiter, _clock) = build_limiter(store.clone(), 5, false);

    let mut handles = Vec::new();
    for _ in 0..20 {
        let limiter = limiter.clone();
        handles.push(tokio::spawn(async move { limiter.enforce("hot-key").await }));
    }

    let mut allowed = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => allowed += 1,
            Err(err) => assert_eq!(err.code, ErrorCode::RateLimitExceeded),
        }
    }
    assert_eq!(allowed, 5);

    let doc = store.get(&window_path("hot-key")).await?.unwrap();
    assert_eq!(get_i64(&doc, "count"), Some(5));
    Ok(())
}

// ============================================================================
// Expired window cleanup
// ============================================================================

#[tokio::test]
async fn test_enforce_sweeps_expired_windows_in_background() -> Result<()> {
    let store = memory_store();
    let (limiter, clock) = build_limiter(store.clone(), 5, true);
    let now = clock.now_millis();

    store.set_merge(&window_path("stale"), expiring_at(now - 1)).await?;
    store.set_merge(&window_path("boundary"), expiring_at(now)).await?;
    store.set_merge(&window_path("fresh"), expiring_at(now + 1_000)).await?;

    limiter.enforce("caller").await?;
    wait_for_sweep(&limiter).await;

    assert!(store.get(&window_path("stale")).await?.is_none());
    assert!(store.get(&window_path("boundary")).await?.is_none());
    assert!(store.get(&window_path("fresh")).await?.is_some());
    assert!(store.get(&window_path("caller")).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn test_sweeps_are_throttled_per_limiter() -> Result<()> {
    let recording = RecordingStore::new(memory_store());
    let (limiter, clock) = build_limiter(recording.clone(), 50, true);

    limiter.enforce("caller").await?;
    wait_for_sweep(&limiter).await;
    assert_eq!(recording.query_count(WINDOWS), 1);

    clock.advance(Duration::seconds(30));
    limiter.enforce("caller").await?;
    wait_for_sweep(&limiter).await;
    assert_eq!(recording.query_count(WINDOWS), 1);

    clock.advance(Duration::seconds(31));
    limiter.enforce("caller").await?;
    wait_for_sweep(&limiter).await;
    assert_eq!(recording.query_count(WINDOWS), 2);

    // A second limiter keeps its own schedule.
    let (other, _other_clock) = build_limiter(recording.clone(), 50, true);
    other.enforce("caller").await?;
    wait_for_sweep(&other).await;
    assert_eq!(recording.query_count(WINDOWS), 3);
    Ok(())
}

#[tokio::test]
async fn test_disabled_cleanup_never_queries() -> Result<()> {
    let recording = RecordingStore::new(memory_store());
    let (limiter, _clock) = build_limiter(recording.clone(), 5, false);

    limiter.enforce("caller").await?;
    assert!(!limiter.cleanup_in_flight());
    assert_eq!(recording.query_count(WINDOWS), 0);
    Ok(())
}

#[tokio::test]
async fn test_failed_sweep_does_not_fail_the_request() -> Result<()> {
    let faulty = FaultyStore::new(memory_store());
    faulty.fail_queries_on(WINDOWS);
    let (limiter, _clock) = build_limiter(faulty.clone(), 5, true);

    let status = limiter.enforce("caller").await?;
    assert_eq!(status.remaining, 4);
    wait_for_sweep(&limiter).await;
    Ok(())
}

#[tokio::test]
async fn test_prune_removes_one_batch_per_call() -> Result<()> {
    let store = memory_store();
    let (limiter, clock) = build_limiter(store.clone(), 5, false);
    let now = clock.now_millis();

    let mut batch = WriteBatch::new();
    for i in 0..250 {
        batch.set_merge(window_path(&format!("k{i:03}")), expiring_at(now - 10));
    }
    store.commit_batch(batch).await?;

    assert_eq!(limiter.prune_expired().await?, 200);
    assert_eq!(limiter.prune_expired().await?, 50);
    assert_eq!(limiter.prune_expired().await?, 0);
    assert!(store.is_empty().await);
    Ok(())
}
