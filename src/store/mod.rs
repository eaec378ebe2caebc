// ABOUTME: Document store abstraction with transactions and bounded batch mutations
// ABOUTME: Pluggable backend support (in-memory, SQLite) following the provider pattern
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Document Store
//!
//! The persistence services talk to storage only through [`DocumentStore`].
//! The contract is narrow: keyed get, top-level merge writes,
//! deletes, id-ordered collection queries, atomic batches capped at
//! [`MAX_BATCH_OPERATIONS`](crate::constants::limits::MAX_BATCH_OPERATIONS), and
//! optimistic read-then-write transactions.
//!
//! Backends do not retry conflicting transactions on their own; callers go
//! through [`run_transaction`], which re-runs the whole body under a bounded
//! [`RetryPolicy`].

/// Store factory for creating backends from configuration
pub mod factory;
/// In-memory backend
pub mod memory;
/// Collection and document paths
pub mod path;
/// Collection queries
pub mod query;
/// Transaction retry policy
pub mod retry;
/// `SQLite` backend
pub mod sqlite;
/// Store-native values
pub mod value;

pub use path::{CollectionPath, DocumentPath};
pub use query::{DocumentSnapshot, FieldFilter, FilterOp, Query};
pub use retry::RetryPolicy;
pub use value::{Document, Value};

use crate::constants::limits::MAX_BATCH_OPERATIONS;
use crate::errors::{AppError, AppResult, StoreError, StoreResult};
use async_trait::async_trait;
use tracing::{debug, warn};

/// Core document store trait
///
/// All backends implement this trait to provide a consistent interface to the
/// persistence services.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document, `None` when absent
    async fn get(&self, path: &DocumentPath) -> StoreResult<Option<Document>>;

    /// Merge fields into a document, creating it when absent
    async fn set_merge(&self, path: &DocumentPath, fields: Document) -> StoreResult<()>;

    /// Delete a document
    ///
    /// Fails with [`StoreError::NotFound`] when nothing exists at `path`.
    async fn delete(&self, path: &DocumentPath) -> StoreResult<()>;

    /// Run a collection query
    async fn query(&self, query: &Query) -> StoreResult<Vec<DocumentSnapshot>>;

    /// Apply every operation of the batch atomically
    async fn commit_batch(&self, batch: WriteBatch) -> StoreResult<()>;

    /// Start an optimistic transaction
    async fn begin(&self) -> StoreResult<Box<dyn Transaction>>;
}

/// Read-then-write transaction
///
/// Every read records the version it observed; `commit` fails with
/// [`StoreError::Conflict`] if any of those documents changed since.
#[async_trait]
pub trait Transaction: Send {
    /// Read a document; not allowed after the first buffered write
    async fn get(&mut self, path: &DocumentPath) -> StoreResult<Option<Document>>;

    /// Buffer a merge write
    fn set_merge(&mut self, path: &DocumentPath, fields: Document);

    /// Buffer a delete
    fn delete(&mut self, path: &DocumentPath);

    /// Validate reads and apply buffered writes atomically
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// One mutation inside a batch or transaction
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Merge fields into the document
    SetMerge {
        /// Target document
        path: DocumentPath,
        /// Fields to merge
        fields: Document,
    },
    /// Remove the document if it exists
    Delete {
        /// Target document
        path: DocumentPath,
    },
}

impl WriteOp {
    /// Target document of the operation
    #[must_use]
    pub const fn path(&self) -> &DocumentPath {
        match self {
            Self::SetMerge { path, .. } | Self::Delete { path } => path,
        }
    }
}

/// Bounded set of mutations applied atomically
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Empty batch
    #[must_use]
    pub const fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Queue a merge write
    pub fn set_merge(&mut self, path: DocumentPath, fields: Document) -> &mut Self {
        self.ops.push(WriteOp::SetMerge { path, fields });
        self
    }

    /// Queue a delete
    pub fn delete(&mut self, path: DocumentPath) -> &mut Self {
        self.ops.push(WriteOp::Delete { path });
        self
    }

    /// Number of queued operations
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether nothing is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Reject batches above the per-mutation ceiling
    ///
    /// # Errors
    ///
    /// Returns `BatchTooLarge` when the batch holds too many operations
    pub fn check_size(&self) -> StoreResult<()> {
        if self.ops.len() > MAX_BATCH_OPERATIONS {
            return Err(StoreError::BatchTooLarge {
                size: self.ops.len(),
                max: MAX_BATCH_OPERATIONS,
            });
        }
        Ok(())
    }

    /// Consume the batch into its operations
    #[must_use]
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Result of reading a document that may not exist yet
///
/// Turns the create-versus-merge decision into an exhaustive match.
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded {
    /// The document exists with these fields
    Existing(Document),
    /// Nothing is stored at the path
    Absent,
}

impl Loaded {
    /// Whether the document exists
    #[must_use]
    pub const fn exists(&self) -> bool {
        matches!(self, Self::Existing(_))
    }

    /// Stored fields, if any
    #[must_use]
    pub const fn document(&self) -> Option<&Document> {
        match self {
            Self::Existing(doc) => Some(doc),
            Self::Absent => None,
        }
    }
}

impl From<Option<Document>> for Loaded {
    fn from(doc: Option<Document>) -> Self {
        doc.map_or(Self::Absent, Self::Existing)
    }
}

/// Read a document inside a transaction as [`Loaded`]
///
/// # Errors
///
/// Propagates store read failures
pub async fn load_or_init(tx: &mut dyn Transaction, path: &DocumentPath) -> StoreResult<Loaded> {
    Ok(tx.get(path).await?.into())
}

/// Body of a transaction that [`run_transaction`] may execute several times
///
/// `run` must only stage writes on the transaction; side effects outside the
/// store would be repeated on every retry.
#[async_trait]
pub trait TransactionBody: Send + Sync {
    /// Value produced by a committed run
    type Output: Send;

    /// Perform all reads, then stage all writes
    async fn run(&self, tx: &mut dyn Transaction) -> AppResult<Self::Output>;
}

/// Execute a transaction body, retrying the whole body on write conflicts
///
/// An error returned by the body aborts without committing and is never
/// retried.
///
/// # Errors
///
/// Returns the body's error, the first non-conflict store error, or a
/// conflict once the retry policy is exhausted
pub async fn run_transaction<B: TransactionBody>(
    store: &dyn DocumentStore,
    policy: &RetryPolicy,
    body: &B,
) -> AppResult<B::Output> {
    let mut attempt: u32 = 1;
    loop {
        let mut tx = store.begin().await?;
        let output = body.run(tx.as_mut()).await?;
        match tx.commit().await {
            Ok(()) => return Ok(output),
            Err(err) if err.is_conflict() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transaction conflict, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if err.is_conflict() {
                    warn!(
                        attempts = attempt,
                        error = %err,
                        "Transaction conflict persisted after retries"
                    );
                }
                return Err(AppError::from(err));
            }
        }
    }
}
