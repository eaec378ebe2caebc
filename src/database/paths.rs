// ABOUTME: Document paths of one user's chat subtree
// ABOUTME: Every thread, conversation, message and song reference is built under users/{uid}
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use crate::constants::collections;
use crate::errors::StoreResult;
use crate::store::{CollectionPath, DocumentPath};

/// Path builder scoped to a single user
///
/// Ids are validated as single path segments, so no reference built here can
/// escape the user's own subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPaths {
    root: DocumentPath,
}

impl UserPaths {
    /// Paths under `users/{uid}`
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` if `uid` is not a valid document id
    pub fn new(uid: &str) -> StoreResult<Self> {
        Ok(Self {
            root: CollectionPath::root(collections::USERS)?.doc(uid)?,
        })
    }

    /// The user document itself
    #[must_use]
    pub const fn user(&self) -> &DocumentPath {
        &self.root
    }

    /// `users/{uid}/threads`
    ///
    /// # Errors
    ///
    /// Never fails for the fixed collection name; kept fallible for uniformity
    pub fn threads(&self) -> StoreResult<CollectionPath> {
        self.root.collection(collections::THREADS)
    }

    /// `users/{uid}/threads/{threadId}`
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` if `thread_id` is not a valid document id
    pub fn thread(&self, thread_id: &str) -> StoreResult<DocumentPath> {
        self.threads()?.doc(thread_id)
    }

    /// `users/{uid}/conversations`
    ///
    /// # Errors
    ///
    /// Never fails for the fixed collection name; kept fallible for uniformity
    pub fn conversations(&self) -> StoreResult<CollectionPath> {
        self.root.collection(collections::CONVERSATIONS)
    }

    /// `users/{uid}/conversations/{threadId}`
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` if `thread_id` is not a valid document id
    pub fn conversation(&self, thread_id: &str) -> StoreResult<DocumentPath> {
        self.conversations()?.doc(thread_id)
    }

    /// `users/{uid}/conversations/{threadId}/messages`
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` if `thread_id` is not a valid document id
    pub fn messages(&self, thread_id: &str) -> StoreResult<CollectionPath> {
        self.conversation(thread_id)?
            .collection(collections::MESSAGES)
    }

    /// `users/{uid}/conversations/{threadId}/messages/{messageId}`
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` if either id is not a valid document id
    pub fn message(&self, thread_id: &str, message_id: &str) -> StoreResult<DocumentPath> {
        self.messages(thread_id)?.doc(message_id)
    }

    /// `users/{uid}/songs`
    ///
    /// # Errors
    ///
    /// Never fails for the fixed collection name; kept fallible for uniformity
    pub fn songs(&self) -> StoreResult<CollectionPath> {
        self.root.collection(collections::SONGS)
    }

    /// `users/{uid}/songs/{songId}`
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` if `song_id` is not a valid document id
    pub fn song(&self, song_id: &str) -> StoreResult<DocumentPath> {
        self.songs()?.doc(song_id)
    }
}
