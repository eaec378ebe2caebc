// ABOUTME: Shared service bundle built once from configuration
// ABOUTME: One store handle shared by the writer, rate limiter, deleter and read side
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use crate::clock::{Clock, SystemClock};
use crate::config::ServerConfig;
use crate::database::{ChatHistory, ConversationDeleter, ThreadSnapshotWriter};
use crate::errors::AppResult;
use crate::rate_limiting::RateLimiter;
use crate::store::factory::Store;
use crate::store::DocumentStore;
use std::sync::Arc;

/// All persistence services sharing one store
///
/// Cloning is cheap; every field is reference counted.
#[derive(Clone)]
pub struct ChatPersistence {
    /// Underlying document store
    pub store: Arc<dyn DocumentStore>,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Configuration the services were built from
    pub config: Arc<ServerConfig>,
    /// Chat turn writer
    pub writer: ThreadSnapshotWriter,
    /// Per-key request quota
    pub rate_limiter: RateLimiter,
    /// Cascading deletes
    pub deleter: ConversationDeleter,
    /// Read side
    pub history: ChatHistory,
}

impl ChatPersistence {
    /// Open the configured store and build every service on top of it
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened
    pub async fn from_config(config: ServerConfig) -> AppResult<Self> {
        let store = Store::new(&config.database.url).await?;
        Ok(Self::with_store(
            Arc::new(store),
            Arc::new(SystemClock),
            config,
        ))
    }

    /// Build the services over an existing store and clock
    #[must_use]
    pub fn with_store(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        config: ServerConfig,
    ) -> Self {
        let retry = config.retry_policy();
        Self {
            writer: ThreadSnapshotWriter::new(
                Arc::clone(&store),
                Arc::clone(&clock),
                retry.clone(),
            ),
            rate_limiter: RateLimiter::new(
                Arc::clone(&store),
                Arc::clone(&clock),
                config.rate_limit.clone(),
                retry,
            ),
            deleter: ConversationDeleter::new(Arc::clone(&store)),
            history: ChatHistory::new(Arc::clone(&store)),
            store,
            clock,
            config: Arc::new(config),
        }
    }
}
