// ABOUTME: Cursor-based pagination module for conversation listings
// ABOUTME: Provides opaque cursor encoding over document ids
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::fmt::{self, Display, Formatter};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

/// Opaque pagination cursor containing the id of the last item served
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cursor(String);

impl Cursor {
    /// Create a new cursor positioned after the given document id
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self(base64::Engine::encode(&URL_SAFE_NO_PAD, id.as_bytes()))
    }

    /// Decode cursor into the document id it points after
    ///
    /// Returns `None` if cursor is invalid or malformed
    #[must_use]
    pub fn decode(&self) -> Option<String> {
        let decoded = base64::Engine::decode(&URL_SAFE_NO_PAD, &self.0).ok()?;
        let id = String::from_utf8(decoded).ok()?;
        if id.is_empty() {
            return None;
        }
        Some(id)
    }

    /// Get the raw cursor string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Create cursor from raw string (for deserialization)
    #[must_use]
    pub const fn from_string(s: String) -> Self {
        Self(s)
    }
}

impl Display for Cursor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Paginated response containing items and pagination metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorPage<T> {
    /// The items in this page
    pub items: Vec<T>,

    /// Cursor pointing to the next page (if available)
    pub next_cursor: Option<Cursor>,

    /// Whether there are more items after this page
    pub has_more: bool,

    /// Total number of items in this page
    pub count: usize,
}

impl<T> CursorPage<T> {
    /// Create a new cursor page
    #[must_use]
    pub fn new(items: Vec<T>, next_cursor: Option<Cursor>, has_more: bool) -> Self {
        let count = items.len();
        Self {
            items,
            next_cursor,
            has_more,
            count,
        }
    }

    /// Create an empty page
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
            has_more: false,
            count: 0,
        }
    }
}

/// Pagination parameters for cursor-based queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationParams {
    /// Cursor to start from (exclusive)
    pub cursor: Option<Cursor>,

    /// Maximum number of items to return
    pub limit: usize,
}

impl PaginationParams {
    /// Create new forward pagination parameters
    #[must_use]
    pub const fn forward(cursor: Option<Cursor>, limit: usize) -> Self {
        Self { cursor, limit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_roundtrips_ids_with_separators() {
        let cursor = Cursor::new("thread:2025-01-01");
        assert_eq!(cursor.decode().as_deref(), Some("thread:2025-01-01"));
    }

    #[test]
    fn test_garbage_cursor_decodes_to_none() {
        assert!(Cursor::from_string("%%%".to_owned()).decode().is_none());
        assert!(Cursor::from_string(String::new()).decode().is_none());
    }
}
