// ABOUTME: Database configuration types for document store backends
// ABOUTME: Parses DATABASE_URL into in-memory, SQLite memory or SQLite file targets
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use crate::constants::{defaults, env_vars};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;

/// Type-safe store location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatabaseUrl {
    /// In-process document map, nothing persisted
    Memory,
    /// In-memory `SQLite` (for testing)
    SQLiteMemory,
    /// `SQLite` database with file path
    SQLite {
        /// Path to `SQLite` database file
        path: PathBuf,
    },
}

impl DatabaseUrl {
    /// Parse from string
    ///
    /// `memory:` selects the in-process store, `sqlite::memory:` an in-memory
    /// `SQLite` database, `sqlite:<path>` or any other string a database file.
    #[must_use]
    pub fn parse_url(s: &str) -> Self {
        let trimmed = s.trim();
        if trimmed == "memory:" || trimmed == "memory://" {
            return Self::Memory;
        }
        match trimmed.strip_prefix("sqlite:") {
            Some(":memory:") => Self::SQLiteMemory,
            Some(path) => Self::SQLite {
                path: PathBuf::from(path.trim_start_matches("//")),
            },
            // Fallback: treat as SQLite file path
            None => Self::SQLite {
                path: PathBuf::from(trimmed),
            },
        }
    }

    /// Convert to connection string
    #[must_use]
    pub fn to_connection_string(&self) -> String {
        match self {
            Self::Memory => "memory:".into(),
            Self::SQLiteMemory => "sqlite::memory:".into(),
            Self::SQLite { path } => format!("sqlite:{}", path.display()),
        }
    }

    /// Check if nothing survives a restart
    #[must_use]
    pub const fn is_ephemeral(&self) -> bool {
        matches!(self, Self::Memory | Self::SQLiteMemory)
    }
}

impl Default for DatabaseUrl {
    fn default() -> Self {
        Self::parse_url(defaults::DATABASE_URL)
    }
}

impl Display for DatabaseUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.to_connection_string())
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    /// Store location
    pub url: DatabaseUrl,
}

impl DatabaseConfig {
    /// Load database configuration from environment
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            url: DatabaseUrl::parse_url(&env_var_or(
                env_vars::DATABASE_URL,
                defaults::DATABASE_URL,
            )),
        }
    }
}

/// Get environment variable or default value
fn env_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}
