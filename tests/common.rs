// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Store constructors, service bundles and recording/fault-injecting store wrappers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org
#![allow(
    dead_code,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::unwrap_used,
    clippy::expect_used
)]
//! Shared test utilities for `lyric_chat_store`

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use lyric_chat_store::clock::ManualClock;
use lyric_chat_store::config::{RateLimitConfig, ServerConfig};
use lyric_chat_store::database::{ChatUser, IncomingMessage, MessageRole, TurnInput};
use lyric_chat_store::errors::{StoreError, StoreResult};
use lyric_chat_store::resources::ChatPersistence;
use lyric_chat_store::store::memory::InMemoryStore;
use lyric_chat_store::store::sqlite::SqliteStore;
use lyric_chat_store::store::{
    Document, DocumentPath, DocumentSnapshot, DocumentStore, Query, Transaction, WriteBatch,
    WriteOp,
};
use lyric_chat_store::config::DatabaseUrl;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Once};

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// Fixed starting instant for manual clocks
pub fn start_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0).unwrap(),
    ))
}

/// Empty in-memory store
pub fn memory_store() -> Arc<InMemoryStore> {
    init_test_logging();
    Arc::new(InMemoryStore::new())
}

/// Empty in-memory `SQLite` store
pub async fn sqlite_memory_store() -> Arc<SqliteStore> {
    init_test_logging();
    Arc::new(SqliteStore::connect(&DatabaseUrl::SQLiteMemory).await.unwrap())
}

/// Configuration with an explicit rate limit and generous retry budget
pub fn test_config(max_requests: u32, window_ms: u64, cleanup_enabled: bool) -> ServerConfig {
    ServerConfig {
        rate_limit: RateLimitConfig {
            window_ms,
            max_requests,
            cleanup_enabled,
        },
        transaction_max_attempts: 50,
        ..ServerConfig::default()
    }
}

/// Services over `store` with a manual clock and default limits
pub fn services(store: Arc<dyn DocumentStore>, clock: Arc<ManualClock>) -> ChatPersistence {
    ChatPersistence::with_store(store, clock, test_config(20, 60_000, false))
}

/// Message helper
pub fn msg(id: &str, role: MessageRole, content: &str) -> IncomingMessage {
    IncomingMessage::new(id, role, content)
}

/// Turn helper without character or song
pub fn turn(uid: &str, thread_id: &str, messages: Vec<IncomingMessage>) -> TurnInput {
    TurnInput {
        user: ChatUser {
            uid: uid.to_owned(),
            email: Some(format!("{uid}@example.com")),
            display_name: None,
        },
        thread_id: thread_id.to_owned(),
        messages,
        character_id: None,
        song_draft: None,
    }
}

/// `count` alternating user/assistant messages with ids `m0000..`
pub fn numbered_messages(count: usize) -> Vec<IncomingMessage> {
    (0..count)
        .map(|i| {
            let role = if i % 2 == 0 {
                MessageRole::User
            } else {
                MessageRole::Assistant
            };
            msg(&format!("m{i:04}"), role, &format!("message {i}"))
        })
        .collect()
}

// ============================================================================
// Recording store
// ============================================================================

/// Store wrapper that records every query and every deleted path
pub struct RecordingStore {
    inner: Arc<dyn DocumentStore>,
    queries: Mutex<Vec<String>>,
    deletes: Mutex<Vec<String>>,
}

impl RecordingStore {
    pub fn new(inner: Arc<dyn DocumentStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            queries: Mutex::new(Vec::new()),
            deletes: Mutex::new(Vec::new()),
        })
    }

    /// Number of queries issued against `collection`
    pub fn query_count(&self, collection: &str) -> usize {
        self.queries
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == collection)
            .count()
    }

    /// Every path deleted, single deletes and batch deletes alike
    pub fn deleted_paths(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn get(&self, path: &DocumentPath) -> StoreResult<Option<Document>> {
        self.inner.get(path).await
    }

    async fn set_merge(&self, path: &DocumentPath, fields: Document) -> StoreResult<()> {
        self.inner.set_merge(path, fields).await
    }

    async fn delete(&self, path: &DocumentPath) -> StoreResult<()> {
        self.deletes.lock().unwrap().push(path.to_string());
        self.inner.delete(path).await
    }

    async fn query(&self, query: &Query) -> StoreResult<Vec<DocumentSnapshot>> {
        self.queries
            .lock()
            .unwrap()
            .push(query.collection.to_string());
        self.inner.query(query).await
    }

    async fn commit_batch(&self, batch: WriteBatch) -> StoreResult<()> {
        {
            let mut deletes = self.deletes.lock().unwrap();
            for op in batch.clone().into_ops() {
                if let WriteOp::Delete { path } = op {
                    deletes.push(path.to_string());
                }
            }
        }
        self.inner.commit_batch(batch).await
    }

    async fn begin(&self) -> StoreResult<Box<dyn Transaction>> {
        self.inner.begin().await
    }
}

// ============================================================================
// Fault-injecting store
// ============================================================================

/// Store wrapper injecting commit conflicts and failing selected operations
pub struct FaultyStore {
    inner: Arc<dyn DocumentStore>,
    conflicts_remaining: AtomicU32,
    fail_delete_suffix: Mutex<Option<String>>,
    fail_query_collection: Mutex<Option<String>>,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn DocumentStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            conflicts_remaining: AtomicU32::new(0),
            fail_delete_suffix: Mutex::new(None),
            fail_query_collection: Mutex::new(None),
        })
    }

    /// The next `n` transaction commits fail with a conflict
    pub fn inject_conflicts(&self, n: u32) {
        self.conflicts_remaining.store(n, Ordering::SeqCst);
    }

    /// Single deletes of paths ending with `suffix` fail with a backend error
    pub fn fail_deletes_ending_with(&self, suffix: &str) {
        *self.fail_delete_suffix.lock().unwrap() = Some(suffix.to_owned());
    }

    /// Queries against `collection` fail with a backend error
    pub fn fail_queries_on(&self, collection: &str) {
        *self.fail_query_collection.lock().unwrap() = Some(collection.to_owned());
    }

    fn take_conflict(&self) -> bool {
        self.conflicts_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl DocumentStore for FaultyStore {
    async fn get(&self, path: &DocumentPath) -> StoreResult<Option<Document>> {
        self.inner.get(path).await
    }

    async fn set_merge(&self, path: &DocumentPath, fields: Document) -> StoreResult<()> {
        self.inner.set_merge(path, fields).await
    }

    async fn delete(&self, path: &DocumentPath) -> StoreResult<()> {
        let failing = self.fail_delete_suffix.lock().unwrap().clone();
        if failing.is_some_and(|suffix| path.to_string().ends_with(&suffix)) {
            return Err(StoreError::backend("injected delete failure"));
        }
        self.inner.delete(path).await
    }

    async fn query(&self, query: &Query) -> StoreResult<Vec<DocumentSnapshot>> {
        let failing = self.fail_query_collection.lock().unwrap().clone();
        if failing.is_some_and(|collection| query.collection.to_string() == collection) {
            return Err(StoreError::backend("injected query failure"));
        }
        self.inner.query(query).await
    }

    async fn commit_batch(&self, batch: WriteBatch) -> StoreResult<()> {
        self.inner.commit_batch(batch).await
    }

    async fn begin(&self) -> StoreResult<Box<dyn Transaction>> {
        let inner = self.inner.begin().await?;
        Ok(Box::new(FaultyTransaction {
            inner,
            conflict: self.take_conflict(),
        }))
    }
}

struct FaultyTransaction {
    inner: Box<dyn Transaction>,
    conflict: bool,
}

#[async_trait]
impl Transaction for FaultyTransaction {
    async fn get(&mut self, path: &DocumentPath) -> StoreResult<Option<Document>> {
        self.inner.get(path).await
    }

    fn set_merge(&mut self, path: &DocumentPath, fields: Document) {
        self.inner.set_merge(path, fields);
    }

    fn delete(&mut self, path: &DocumentPath) {
        self.inner.delete(path);
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        if self.conflict {
            return Err(StoreError::Conflict {
                path: "injected".to_owned(),
            });
        }
        self.inner.commit().await
    }
}
