// ABOUTME: Main library entry point for the lyric chat persistence layer
// ABOUTME: Turn writer, rate limiter, cascading deletes and read side over a document store
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![deny(unsafe_code)]

//! # Lyric Chat Store
//!
//! Conversation persistence and lifecycle for a character chat application.
//! Chat turns, conversation summaries, per-message records and song lyric
//! drafts are kept consistent on top of a document store that only offers
//! optimistic transactions and size-capped batch mutations.
//!
//! ## Architecture
//!
//! - **Store**: document store trait with in-memory and `SQLite` backends
//! - **Database**: turn writer, cascading delete engine and read side
//! - **Rate limiting**: per-key fixed window quota with self-cleaning state
//! - **Config**: environment-driven settings resolved once at startup
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use lyric_chat_store::config::ServerConfig;
//! use lyric_chat_store::database::{ChatUser, IncomingMessage, MessageRole, TurnInput};
//! use lyric_chat_store::errors::AppResult;
//! use lyric_chat_store::resources::ChatPersistence;
//!
//! #[tokio::main]
//! async fn main() -> AppResult<()> {
//!     let services = ChatPersistence::from_config(ServerConfig::from_env()).await?;
//!     services.rate_limiter.enforce("user@example.com").await?;
//!
//!     let turn = TurnInput {
//!         user: ChatUser::new("u1"),
//!         thread_id: "t1".into(),
//!         messages: vec![IncomingMessage::new("m1", MessageRole::User, "Write me a song")],
//!         character_id: Some("bard".into()),
//!         song_draft: None,
//!     };
//!     services.writer.write_turn(&turn).await?;
//!     Ok(())
//! }
//! ```

/// Time source abstraction
pub mod clock;

/// Configuration management
pub mod config;

/// Application constants
pub mod constants;

/// Chat persistence services
pub mod database;

/// Unified error handling
pub mod errors;

/// Structured logging setup
pub mod logging;

/// Cursor-based pagination
pub mod pagination;

/// Per-key request quotas
pub mod rate_limiting;

/// Shared service bundle
pub mod resources;

/// Store-native to wire conversions
pub mod serialization;

/// Document store abstraction and backends
pub mod store;
