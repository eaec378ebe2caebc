// ABOUTME: Structured error types for document store operations
// ABOUTME: Distinguishes absent documents, write conflicts and backend failures
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use thiserror::Error;

/// Errors raised by document store backends
#[derive(Error, Debug)]
pub enum StoreError {
    /// Document does not exist
    #[error("document not found: {path}")]
    NotFound {
        /// Full document path
        path: String,
    },

    /// A document read inside a transaction changed before commit
    #[error("transaction conflict on {path}")]
    Conflict {
        /// Path whose version moved underneath the transaction
        path: String,
    },

    /// Path segment failed validation
    #[error("invalid path {path}: {reason}")]
    InvalidPath {
        /// Offending path or segment
        path: String,
        /// Why it was rejected
        reason: String,
    },

    /// Batch exceeded the per-mutation document ceiling
    #[error("batch of {size} operations exceeds limit of {max}")]
    BatchTooLarge {
        /// Operations in the rejected batch
        size: usize,
        /// Maximum operations per batch
        max: usize,
    },

    /// Transaction read issued after a buffered write
    #[error("read of {path} after a transaction write")]
    ReadAfterWrite {
        /// Path that was read
        path: String,
    },

    /// Stored document could not be encoded or decoded
    #[error("serialization failed: {context}")]
    Serialization {
        /// What was being (de)serialized
        context: String,
    },

    /// Underlying storage engine failed or is unavailable
    #[error("storage backend error: {context}")]
    Backend {
        /// Backend error description
        context: String,
    },
}

impl StoreError {
    /// Document path the error refers to, when it has one
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::NotFound { path }
            | Self::Conflict { path }
            | Self::InvalidPath { path, .. }
            | Self::ReadAfterWrite { path } => Some(path),
            Self::BatchTooLarge { .. } | Self::Serialization { .. } | Self::Backend { .. } => None,
        }
    }

    /// Whether the failure only means the document was already gone
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether retrying the whole transaction may succeed
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Backend failure with context
    pub fn backend(context: impl Into<String>) -> Self {
        Self::Backend {
            context: context.into(),
        }
    }
}

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
