// ABOUTME: lyric-admin - command-line tool for chat store maintenance
// ABOUTME: Prunes rate limit windows, deletes conversations and accounts, lists conversations
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org
//!
//! Usage:
//! ```bash
//! # Remove expired rate limit windows
//! lyric-admin prune-rate-limits
//!
//! # Delete one conversation with its messages and songs
//! lyric-admin delete-conversation --user u1 --thread t1
//!
//! # Delete several conversations
//! lyric-admin delete-conversations --user u1 --thread t1 --thread t2
//!
//! # Delete every conversation, or everything, of a user
//! lyric-admin delete-all --user u1
//! lyric-admin delete-account --user u1
//!
//! # List conversations
//! lyric-admin list-conversations --user u1 --limit 10
//! ```

use clap::{Parser, Subcommand};
use lyric_chat_store::config::{DatabaseUrl, ServerConfig};
use lyric_chat_store::constants::defaults;
use lyric_chat_store::errors::{AppError, AppResult};
use lyric_chat_store::logging::{LogFormat, LoggingConfig};
use lyric_chat_store::pagination::{Cursor, PaginationParams};
use lyric_chat_store::resources::ChatPersistence;
use serde::Serialize;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "lyric-admin",
    about = "Lyric chat store maintenance CLI",
    long_about = "Maintenance commands for conversation data and rate limit state."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Database URL override
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[non_exhaustive]
#[derive(Subcommand)]
enum Command {
    /// Delete expired rate limit windows (one sweep)
    PruneRateLimits,

    /// Delete one conversation with its messages and songs
    DeleteConversation {
        /// Owner user id
        #[arg(long)]
        user: String,

        /// Thread id
        #[arg(long)]
        thread: String,
    },

    /// Delete several conversations
    DeleteConversations {
        /// Owner user id
        #[arg(long)]
        user: String,

        /// Thread ids (repeatable)
        #[arg(long = "thread", required = true)]
        threads: Vec<String>,
    },

    /// Delete every conversation of a user
    DeleteAll {
        /// Owner user id
        #[arg(long)]
        user: String,
    },

    /// Delete all data stored for a user
    DeleteAccount {
        /// Owner user id
        #[arg(long)]
        user: String,
    },

    /// List conversations of a user
    ListConversations {
        /// Owner user id
        #[arg(long)]
        user: String,

        /// Page size
        #[arg(long, default_value_t = defaults::CONVERSATION_LIST_LIMIT)]
        limit: usize,

        /// Cursor from a previous page
        #[arg(long)]
        cursor: Option<String>,
    },
}

fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::from_env();
    logging.format = LogFormat::Compact;
    if cli.verbose {
        logging.level = "debug".into();
    }
    logging
        .init()
        .map_err(|e| AppError::internal(e.to_string()))?;

    let mut config = ServerConfig::from_env();
    if let Some(url) = cli.database_url.as_deref() {
        config.database.url = DatabaseUrl::parse_url(url);
    }
    info!("Connecting to store: {}", config.database.url);
    let services = ChatPersistence::from_config(config).await?;

    match cli.command {
        Command::PruneRateLimits => {
            let removed = services.rate_limiter.prune_expired().await?;
            print_json(&serde_json::json!({ "removed": removed }))?;
        }
        Command::DeleteConversation { user, thread } => {
            let report = services.deleter.delete_conversation(&user, &thread).await?;
            print_json(&report)?;
        }
        Command::DeleteConversations { user, threads } => {
            let report = services.deleter.delete_conversations(&user, &threads).await?;
            print_json(&report)?;
        }
        Command::DeleteAll { user } => {
            let report = services.deleter.delete_all_conversations(&user).await?;
            print_json(&report)?;
        }
        Command::DeleteAccount { user } => {
            let report = services.deleter.delete_account_data(&user).await?;
            print_json(&report)?;
        }
        Command::ListConversations {
            user,
            limit,
            cursor,
        } => {
            let params = PaginationParams::forward(cursor.map(Cursor::from_string), limit);
            let page = services.history.list_conversations(&user, &params).await?;
            print_json(&page)?;
        }
    }

    Ok(())
}
