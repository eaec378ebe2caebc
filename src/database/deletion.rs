// ABOUTME: Cascading deletes of conversations, their messages and songs in bounded batches
// ABOUTME: Single, bulk, all-conversation and account variants over one batched-query primitive
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Cascading Delete Engine
//!
//! Children are always removed before parents: messages and songs first, then
//! the conversation and thread documents. A crash part way through can leave
//! an empty parent behind but never a child whose parent is gone.

use super::paths::UserPaths;
use crate::constants::{batch_sizes, fields, limits};
use crate::errors::{AppError, AppResult};
use crate::store::{CollectionPath, DocumentPath, DocumentStore, Query, WriteBatch};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ops::AddAssign;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Counts of documents removed by a delete operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionReport {
    /// Conversation documents removed
    pub conversations: usize,
    /// Thread documents removed
    pub threads: usize,
    /// Message documents removed
    pub messages: usize,
    /// Song documents removed
    pub songs: usize,
    /// Whether the user document was removed
    pub user_document: bool,
}

impl AddAssign for DeletionReport {
    fn add_assign(&mut self, other: Self) {
        self.conversations += other.conversations;
        self.threads += other.threads;
        self.messages += other.messages;
        self.songs += other.songs;
        self.user_document |= other.user_document;
    }
}

/// Delete a document, treating "already gone" as success
///
/// Returns whether a document was removed. Failures other than not-found are
/// logged and swallowed.
pub async fn delete_if_present(store: &dyn DocumentStore, path: &DocumentPath) -> bool {
    match store.delete(path).await {
        Ok(()) => true,
        Err(e) if e.is_not_found() => {
            debug!(path = %path, "Document already absent");
            false
        }
        Err(e) => {
            warn!(path = %path, error = %e, "Best-effort delete failed");
            false
        }
    }
}

/// Cascading delete operations over one store
#[derive(Clone)]
pub struct ConversationDeleter {
    store: Arc<dyn DocumentStore>,
}

impl ConversationDeleter {
    /// Create a deleter
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Delete everything `query` matches, `batch_size` documents per batch
    ///
    /// Stops after a fetch returns fewer than `batch_size` documents.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a batch size of zero or above the batch
    /// ceiling, or the store error of a failed fetch or batch
    pub async fn delete_batched_query(&self, query: &Query, batch_size: usize) -> AppResult<usize> {
        if batch_size == 0 || batch_size > limits::MAX_BATCH_OPERATIONS {
            return Err(AppError::invalid_input(format!(
                "batch size must be between 1 and {}, got {batch_size}",
                limits::MAX_BATCH_OPERATIONS
            )));
        }

        let page = query.clone().limit(batch_size);
        let mut deleted = 0;
        loop {
            let snapshots = self.store.query(&page).await?;
            if snapshots.is_empty() {
                break;
            }

            let fetched = snapshots.len();
            let mut batch = WriteBatch::new();
            for snapshot in &snapshots {
                batch.delete(query.collection.doc(&snapshot.id)?);
            }
            self.store.commit_batch(batch).await?;
            deleted += fetched;
            debug!(collection = %query.collection, fetched, "Deleted batch");

            if fetched < batch_size {
                break;
            }
        }
        Ok(deleted)
    }

    /// Delete one conversation with its messages, songs and thread log
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for unusable ids, or the store error of a failed
    /// child delete; parent delete failures are logged and ignored
    pub async fn delete_conversation(
        &self,
        uid: &str,
        thread_id: &str,
    ) -> AppResult<DeletionReport> {
        let paths = UserPaths::new(uid)?;

        let messages = self
            .delete_batched_query(&Query::new(paths.messages(thread_id)?), batch_sizes::MESSAGES)
            .await?;
        let songs = self
            .delete_batched_query(
                &Query::new(paths.songs()?).where_eq(fields::THREAD_ID, thread_id),
                batch_sizes::SONGS,
            )
            .await?;

        let conversation =
            delete_if_present(self.store.as_ref(), &paths.conversation(thread_id)?).await;
        let thread = delete_if_present(self.store.as_ref(), &paths.thread(thread_id)?).await;

        let report = DeletionReport {
            conversations: usize::from(conversation),
            threads: usize::from(thread),
            messages,
            songs,
            user_document: false,
        };
        info!(uid, thread_id, messages, songs, "Conversation deleted");
        Ok(report)
    }

    /// Delete several conversations one after another, ignoring duplicate ids
    ///
    /// # Errors
    ///
    /// Stops at and returns the first failing conversation's error
    pub async fn delete_conversations<S: AsRef<str> + Sync>(
        &self,
        uid: &str,
        thread_ids: &[S],
    ) -> AppResult<DeletionReport> {
        let mut seen = HashSet::new();
        let mut report = DeletionReport::default();
        for thread_id in thread_ids.iter().map(AsRef::as_ref) {
            if !seen.insert(thread_id) {
                continue;
            }
            report += self.delete_conversation(uid, thread_id).await?;
        }
        Ok(report)
    }

    /// Delete every conversation of a user
    ///
    /// # Errors
    ///
    /// Returns the store error of a failed page fetch or conversation delete
    pub async fn delete_all_conversations(&self, uid: &str) -> AppResult<DeletionReport> {
        let paths = UserPaths::new(uid)?;
        let ids = self
            .collect_ids(&paths.conversations()?, batch_sizes::CONVERSATION_PAGE)
            .await?;
        info!(uid, conversations = ids.len(), "Deleting all conversations");
        self.delete_conversations(uid, &ids).await
    }

    /// Remove everything stored for a user
    ///
    /// Deletes all conversations, then threads left without a conversation,
    /// then remaining songs, and finally the user document itself.
    ///
    /// # Errors
    ///
    /// Returns the store error of any failed fetch or child delete
    pub async fn delete_account_data(&self, uid: &str) -> AppResult<DeletionReport> {
        let paths = UserPaths::new(uid)?;
        let mut report = self.delete_all_conversations(uid).await?;

        let orphan_threads = self
            .collect_ids(&paths.threads()?, batch_sizes::THREADS)
            .await?;
        report += self.delete_conversations(uid, &orphan_threads).await?;

        report.songs += self
            .delete_batched_query(&Query::new(paths.songs()?), batch_sizes::SONGS)
            .await?;
        report.user_document = delete_if_present(self.store.as_ref(), paths.user()).await;

        info!(
            uid,
            conversations = report.conversations,
            threads = report.threads,
            messages = report.messages,
            songs = report.songs,
            "Account data deleted"
        );
        Ok(report)
    }

    /// Page through a collection by document id and collect every id
    async fn collect_ids(
        &self,
        collection: &CollectionPath,
        page_size: usize,
    ) -> AppResult<Vec<String>> {
        let mut ids = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut query = Query::new(collection.clone()).limit(page_size);
            if let Some(after) = cursor.take() {
                query = query.start_after(after);
            }
            let page = self.store.query(&query).await?;
            let fetched = page.len();
            cursor = page.last().map(|snapshot| snapshot.id.clone());
            ids.extend(page.into_iter().map(|snapshot| snapshot.id));

            if fetched < page_size {
                break;
            }
        }
        Ok(ids)
    }
}
