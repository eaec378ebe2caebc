// ABOUTME: In-memory document store with versioned documents and optimistic transactions
// ABOUTME: Backs tests and single-process deployments using the memory: URL
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use super::path::DocumentPath;
use super::query::{DocumentSnapshot, Query};
use super::value::{merge_fields, Document};
use super::{DocumentStore, Transaction, WriteBatch, WriteOp};
use crate::errors::{StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Stored document with the version of its last write
#[derive(Debug, Clone)]
struct StoredDocument {
    data: Document,
    version: u64,
}

#[derive(Debug, Default)]
struct MemoryState {
    docs: BTreeMap<String, StoredDocument>,
    next_version: u64,
}

impl MemoryState {
    fn version_of(&self, path: &str) -> Option<u64> {
        self.docs.get(path).map(|doc| doc.version)
    }

    fn apply(&mut self, op: WriteOp) {
        self.next_version += 1;
        let version = self.next_version;
        match op {
            WriteOp::SetMerge { path, fields } => {
                let stored = self
                    .docs
                    .entry(path.to_string())
                    .or_insert_with(|| StoredDocument {
                        data: Document::new(),
                        version,
                    });
                merge_fields(&mut stored.data, fields);
                stored.version = version;
            }
            WriteOp::Delete { path } => {
                self.docs.remove(&path.to_string());
            }
        }
    }
}

/// In-memory document store
///
/// Uses `Arc<RwLock<..>>` so clones share one dataset; every write bumps a
/// global version counter that transactions validate against on commit.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents across all collections
    pub async fn len(&self) -> usize {
        self.state.read().await.docs.len()
    }

    /// Whether the store holds no documents
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.docs.is_empty()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get(&self, path: &DocumentPath) -> StoreResult<Option<Document>> {
        let state = self.state.read().await;
        Ok(state.docs.get(&path.to_string()).map(|doc| doc.data.clone()))
    }

    async fn set_merge(&self, path: &DocumentPath, fields: Document) -> StoreResult<()> {
        self.state.write().await.apply(WriteOp::SetMerge {
            path: path.clone(),
            fields,
        });
        Ok(())
    }

    async fn delete(&self, path: &DocumentPath) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.version_of(&path.to_string()).is_none() {
            return Err(StoreError::NotFound {
                path: path.to_string(),
            });
        }
        state.apply(WriteOp::Delete { path: path.clone() });
        Ok(())
    }

    async fn query(&self, query: &Query) -> StoreResult<Vec<DocumentSnapshot>> {
        let prefix = format!("{}/", query.collection);
        let state = self.state.read().await;

        let results = state
            .docs
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(key, doc)| {
                let id = &key[prefix.len()..];
                (!id.contains('/') && query.accepts(id, &doc.data)).then(|| DocumentSnapshot {
                    id: id.to_owned(),
                    data: doc.data.clone(),
                })
            })
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();
        drop(state);

        Ok(results)
    }

    async fn commit_batch(&self, batch: WriteBatch) -> StoreResult<()> {
        batch.check_size()?;
        let mut state = self.state.write().await;
        for op in batch.into_ops() {
            state.apply(op);
        }
        Ok(())
    }

    async fn begin(&self) -> StoreResult<Box<dyn Transaction>> {
        Ok(Box::new(MemoryTransaction {
            state: Arc::clone(&self.state),
            reads: HashMap::new(),
            writes: Vec::new(),
        }))
    }
}

/// Optimistic transaction over an [`InMemoryStore`]
struct MemoryTransaction {
    state: Arc<RwLock<MemoryState>>,
    /// Version observed per path at first read, `None` for absent documents
    reads: HashMap<String, Option<u64>>,
    writes: Vec<WriteOp>,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn get(&mut self, path: &DocumentPath) -> StoreResult<Option<Document>> {
        let key = path.to_string();
        if !self.writes.is_empty() {
            return Err(StoreError::ReadAfterWrite { path: key });
        }
        let state = self.state.read().await;
        let stored = state.docs.get(&key).cloned();
        drop(state);

        self.reads
            .entry(key)
            .or_insert_with(|| stored.as_ref().map(|doc| doc.version));
        Ok(stored.map(|doc| doc.data))
    }

    fn set_merge(&mut self, path: &DocumentPath, fields: Document) {
        self.writes.push(WriteOp::SetMerge {
            path: path.clone(),
            fields,
        });
    }

    fn delete(&mut self, path: &DocumentPath) {
        self.writes.push(WriteOp::Delete { path: path.clone() });
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let Self {
            state,
            reads,
            writes,
        } = *self;
        let mut state = state.write().await;

        if let Some((path, _)) = reads
            .iter()
            .find(|(path, seen)| state.version_of(path) != **seen)
        {
            return Err(StoreError::Conflict { path: path.clone() });
        }

        for op in writes {
            state.apply(op);
        }
        Ok(())
    }
}
