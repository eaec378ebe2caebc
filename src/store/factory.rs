// ABOUTME: Store factory selecting a document store backend from configuration
// ABOUTME: Delegating enum over the in-memory and SQLite backends
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Store factory for creating document store backends
//!
//! The backend is picked from the [`DatabaseUrl`] variant, so callers never
//! name a concrete store type.

use super::memory::InMemoryStore;
use super::path::DocumentPath;
use super::query::{DocumentSnapshot, Query};
use super::sqlite::SqliteStore;
use super::value::Document;
use super::{DocumentStore, Transaction, WriteBatch};
use crate::config::database::DatabaseUrl;
use crate::errors::StoreResult;
use async_trait::async_trait;
use tracing::{debug, info};

/// Supported store backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreType {
    /// In-process map
    Memory,
    /// `SQLite` database
    SQLite,
}

/// Store instance wrapper that delegates to the appropriate implementation
#[derive(Clone)]
pub enum Store {
    /// In-process map
    Memory(InMemoryStore),
    /// `SQLite` database
    SQLite(SqliteStore),
}

impl Store {
    /// Create a store for the given location
    ///
    /// # Errors
    ///
    /// Returns an error if the `SQLite` database cannot be opened or migrated
    pub async fn new(url: &DatabaseUrl) -> StoreResult<Self> {
        debug!("Creating document store for {}", url);
        let store = match url {
            DatabaseUrl::Memory => Self::Memory(InMemoryStore::new()),
            DatabaseUrl::SQLiteMemory | DatabaseUrl::SQLite { .. } => {
                Self::SQLite(SqliteStore::connect(url).await?)
            }
        };
        info!("Document store initialized: {}", store.backend_info());
        Ok(store)
    }

    /// Get a descriptive string for the current backend
    #[must_use]
    pub const fn backend_info(&self) -> &'static str {
        match self {
            Self::Memory(_) => "In-memory (ephemeral)",
            Self::SQLite(_) => "SQLite",
        }
    }

    /// Get the store type enum
    #[must_use]
    pub const fn store_type(&self) -> StoreType {
        match self {
            Self::Memory(_) => StoreType::Memory,
            Self::SQLite(_) => StoreType::SQLite,
        }
    }
}

#[async_trait]
impl DocumentStore for Store {
    async fn get(&self, path: &DocumentPath) -> StoreResult<Option<Document>> {
        match self {
            Self::Memory(store) => store.get(path).await,
            Self::SQLite(store) => store.get(path).await,
        }
    }

    async fn set_merge(&self, path: &DocumentPath, fields: Document) -> StoreResult<()> {
        match self {
            Self::Memory(store) => store.set_merge(path, fields).await,
            Self::SQLite(store) => store.set_merge(path, fields).await,
        }
    }

    async fn delete(&self, path: &DocumentPath) -> StoreResult<()> {
        match self {
            Self::Memory(store) => store.delete(path).await,
            Self::SQLite(store) => store.delete(path).await,
        }
    }

    async fn query(&self, query: &Query) -> StoreResult<Vec<DocumentSnapshot>> {
        match self {
            Self::Memory(store) => store.query(query).await,
            Self::SQLite(store) => store.query(query).await,
        }
    }

    async fn commit_batch(&self, batch: WriteBatch) -> StoreResult<()> {
        match self {
            Self::Memory(store) => store.commit_batch(batch).await,
            Self::SQLite(store) => store.commit_batch(batch).await,
        }
    }

    async fn begin(&self) -> StoreResult<Box<dyn Transaction>> {
        match self {
            Self::Memory(store) => store.begin().await,
            Self::SQLite(store) => store.begin().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_backend_selected_from_url() {
        let memory = Store::new(&DatabaseUrl::Memory).await.unwrap();
        assert_eq!(memory.store_type(), StoreType::Memory);

        let sqlite = Store::new(&DatabaseUrl::SQLiteMemory).await.unwrap();
        assert_eq!(sqlite.store_type(), StoreType::SQLite);
    }
}
