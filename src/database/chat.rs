// ABOUTME: Read-side operations for chat conversations, threads, messages and songs
// ABOUTME: Cursor-paginated listings with all timestamps converted to RFC 3339 strings
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use super::models::{ConversationSummary, MessageRecord, SongRecord, ThreadRecord};
use super::paths::UserPaths;
use crate::constants::{fields, limits};
use crate::errors::{AppError, AppResult};
use crate::pagination::{Cursor, CursorPage, PaginationParams};
use crate::store::{DocumentStore, Query, Value};
use std::sync::Arc;

/// Chat history reader
#[derive(Clone)]
pub struct ChatHistory {
    store: Arc<dyn DocumentStore>,
}

impl ChatHistory {
    /// Create a reader
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    // ========================================================================
    // Conversation Operations
    // ========================================================================

    /// List a user's conversations ordered by thread id
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a malformed cursor, or the store error
    pub async fn list_conversations(
        &self,
        uid: &str,
        params: &PaginationParams,
    ) -> AppResult<CursorPage<ConversationSummary>> {
        let paths = UserPaths::new(uid)?;
        let limit = params.limit.min(limits::MAX_PAGE_SIZE);
        if limit == 0 {
            return Ok(CursorPage::empty());
        }

        // One extra row tells whether another page exists.
        let mut query = Query::new(paths.conversations()?).limit(limit + 1);
        if let Some(cursor) = &params.cursor {
            let after = cursor
                .decode()
                .ok_or_else(|| AppError::invalid_input("Invalid pagination cursor"))?;
            query = query.start_after(after);
        }

        let mut snapshots = self.store.query(&query).await?;
        let has_more = snapshots.len() > limit;
        snapshots.truncate(limit);

        let next_cursor = if has_more {
            snapshots.last().map(|snapshot| Cursor::new(&snapshot.id))
        } else {
            None
        };
        let items = snapshots
            .iter()
            .map(|snapshot| ConversationSummary::from_document(&snapshot.id, &snapshot.data))
            .collect();

        Ok(CursorPage::new(items, next_cursor, has_more))
    }

    /// Get one conversation summary
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for unusable ids, or the store error
    pub async fn get_conversation(
        &self,
        uid: &str,
        thread_id: &str,
    ) -> AppResult<Option<ConversationSummary>> {
        let path = UserPaths::new(uid)?.conversation(thread_id)?;
        Ok(self
            .store
            .get(&path)
            .await?
            .map(|doc| ConversationSummary::from_document(thread_id, &doc)))
    }

    /// Get the raw thread log
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for unusable ids, or the store error
    pub async fn get_thread(&self, uid: &str, thread_id: &str) -> AppResult<Option<ThreadRecord>> {
        let path = UserPaths::new(uid)?.thread(thread_id)?;
        Ok(self
            .store
            .get(&path)
            .await?
            .map(|doc| ThreadRecord::from_document(thread_id, &doc)))
    }

    // ========================================================================
    // Message Operations
    // ========================================================================

    /// All messages of a conversation, oldest first
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for unusable ids, or the store error
    pub async fn list_messages(&self, uid: &str, thread_id: &str) -> AppResult<Vec<MessageRecord>> {
        let collection = UserPaths::new(uid)?.messages(thread_id)?;
        let snapshots = self.store.query(&Query::new(collection)).await?;

        let mut ordered: Vec<_> = snapshots
            .iter()
            .map(|snapshot| {
                let created = snapshot
                    .data
                    .get(fields::CREATED_AT)
                    .and_then(Value::as_timestamp);
                (created, MessageRecord::from_document(&snapshot.id, &snapshot.data))
            })
            .collect();
        ordered.sort_by(|(a_time, a), (b_time, b)| {
            a_time.cmp(b_time).then_with(|| a.id.cmp(&b.id))
        });

        Ok(ordered.into_iter().map(|(_, record)| record).collect())
    }

    // ========================================================================
    // Song Operations
    // ========================================================================

    /// Songs of a user, optionally only those drafted in one thread
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for unusable ids, or the store error
    pub async fn list_songs(
        &self,
        uid: &str,
        thread_id: Option<&str>,
    ) -> AppResult<Vec<SongRecord>> {
        let mut query = Query::new(UserPaths::new(uid)?.songs()?);
        if let Some(thread_id) = thread_id {
            query = query.where_eq(fields::THREAD_ID, thread_id);
        }
        Ok(self
            .store
            .query(&query)
            .await?
            .iter()
            .map(|snapshot| SongRecord::from_document(&snapshot.id, &snapshot.data))
            .collect())
    }

    /// Get one song
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for unusable ids, or the store error
    pub async fn get_song(&self, uid: &str, song_id: &str) -> AppResult<Option<SongRecord>> {
        let path = UserPaths::new(uid)?.song(song_id)?;
        Ok(self
            .store
            .get(&path)
            .await?
            .map(|doc| SongRecord::from_document(song_id, &doc)))
    }
}
