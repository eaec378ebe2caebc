// ABOUTME: Chat persistence services built on the document store
// ABOUTME: Turn writer, cascading deletes, read side and the per-user path layout
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Chat Persistence
//!
//! Persisted state layout, per user:
//!
//! ```text
//! users/{uid}/threads/{threadId}
//! users/{uid}/conversations/{threadId}
//! users/{uid}/conversations/{threadId}/messages/{messageId}
//! users/{uid}/songs/{songId}
//! ```

/// Read-side queries
pub mod chat;
/// Cascading delete engine
pub mod deletion;
/// Input and record types
pub mod models;
/// Per-user document paths
pub mod paths;
/// Atomic turn writer
pub mod thread_writer;

pub use chat::ChatHistory;
pub use deletion::{delete_if_present, ConversationDeleter, DeletionReport};
pub use models::{
    ChatUser, ConversationSummary, IncomingMessage, MessageRecord, MessageRole, SongDraft,
    SongRecord, ThreadMessage, ThreadRecord, TurnInput, TurnOutcome,
};
pub use paths::UserPaths;
pub use thread_writer::{truncate_preview, ThreadSnapshotWriter};
