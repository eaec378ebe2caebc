// ABOUTME: Constants module with domain-separated organization
// ABOUTME: Collection names, store limits, batch sizes and configuration defaults
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Constants module
//!
//! Constants are grouped into logical domains rather than being in a single
//! flat list.

/// Collection names of the persisted state layout
pub mod collections {
    /// Root collection of per-user subtrees
    pub const USERS: &str = "users";
    /// Raw thread logs, one per thread id
    pub const THREADS: &str = "threads";
    /// Conversation summary records, one per thread id
    pub const CONVERSATIONS: &str = "conversations";
    /// Per-message records nested under a conversation
    pub const MESSAGES: &str = "messages";
    /// Song lyric drafts
    pub const SONGS: &str = "songs";
    /// Global rate limit windows keyed by sanitized caller key
    pub const RATE_LIMIT_WINDOWS: &str = "_rateLimitWindows";
}

/// Field names shared between writers, readers and queries
pub mod fields {
    /// Creation timestamp, written once
    pub const CREATED_AT: &str = "createdAt";
    /// Last modification timestamp
    pub const UPDATED_AT: &str = "updatedAt";
    /// Owning thread id on song documents
    pub const THREAD_ID: &str = "threadId";
    /// Rate limit window expiry in epoch millis
    pub const EXPIRES_AT: &str = "expiresAt";
}

/// Hard limits of the storage layer and derived data
pub mod limits {
    /// Maximum operations in one batch mutation
    pub const MAX_BATCH_OPERATIONS: usize = 500;
    /// Maximum characters kept in a conversation preview before the ellipsis
    pub const PREVIEW_MAX_CHARS: usize = 200;
    /// Suffix appended to truncated previews
    pub const PREVIEW_ELLIPSIS: &str = "...";
    /// Maximum characters of a sanitized rate limit key
    pub const RATE_LIMIT_KEY_MAX_CHARS: usize = 150;
    /// Storage key used when sanitization leaves nothing
    pub const RATE_LIMIT_DEFAULT_KEY: &str = "default";
    /// Largest page a conversation listing returns
    pub const MAX_PAGE_SIZE: usize = 200;
}

/// Batch sizes used by cascading deletes and cleanup sweeps
pub mod batch_sizes {
    /// Messages deleted per round
    pub const MESSAGES: usize = 200;
    /// Songs deleted per round
    pub const SONGS: usize = 100;
    /// Orphaned threads deleted per round during account purge
    pub const THREADS: usize = 200;
    /// Conversation ids fetched per page when deleting everything
    pub const CONVERSATION_PAGE: usize = 50;
    /// Expired rate limit windows removed per sweep
    pub const RATE_LIMIT_SWEEP: usize = 200;
}

/// Default values for configuration settings
pub mod defaults {
    /// Rate limit window length in milliseconds
    pub const RATE_LIMIT_WINDOW_MS: u64 = 60_000;
    /// Requests allowed per window per key
    pub const RATE_LIMIT_MAX_REQUESTS: u32 = 20;
    /// Minimum spacing between opportunistic sweeps in milliseconds
    pub const RATE_LIMIT_MIN_SWEEP_INTERVAL_MS: i64 = 60_000;
    /// Transaction attempts before a conflict is surfaced
    pub const TRANSACTION_MAX_ATTEMPTS: u32 = 5;
    /// First backoff delay after a transaction conflict
    pub const TRANSACTION_BASE_DELAY_MS: u64 = 20;
    /// Backoff ceiling between transaction attempts
    pub const TRANSACTION_MAX_DELAY_MS: u64 = 500;
    /// Database used when `DATABASE_URL` is unset
    pub const DATABASE_URL: &str = "sqlite:./data/lyric_chat.db";
    /// Page size used by conversation listings when unspecified
    pub const CONVERSATION_LIST_LIMIT: usize = 20;
}

/// Environment variable names
pub mod env_vars {
    /// Store connection string
    pub const DATABASE_URL: &str = "DATABASE_URL";
    /// Rate limit window length in milliseconds
    pub const RATE_LIMIT_WINDOW_MS: &str = "RATE_LIMIT_WINDOW_MS";
    /// Requests allowed per window
    pub const RATE_LIMIT_MAX_REQUESTS: &str = "RATE_LIMIT_MAX_REQUESTS";
    /// Toggle for opportunistic window cleanup
    pub const RATE_LIMIT_CLEANUP_ENABLED: &str = "RATE_LIMIT_CLEANUP_ENABLED";
    /// Transaction attempts before giving up on conflicts
    pub const TRANSACTION_MAX_ATTEMPTS: &str = "TRANSACTION_MAX_ATTEMPTS";
}

/// Service identity used in structured logs
pub mod service_names {
    /// Name reported by the logging layer
    pub const LYRIC_CHAT_STORE: &str = "lyric-chat-store";
}
