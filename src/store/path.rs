// ABOUTME: Validated collection and document paths for the document store
// ABOUTME: Rejects segments that could escape a user's subtree
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use crate::errors::{StoreError, StoreResult};
use std::fmt::{self, Display, Formatter};

/// Check one path segment supplied by a caller
fn validate_segment(segment: &str) -> StoreResult<()> {
    let reason = if segment.is_empty() {
        "segment is empty"
    } else if segment.contains('/') {
        "segment contains '/'"
    } else if segment == "." || segment == ".." {
        "segment is a relative reference"
    } else if segment.chars().any(char::is_control) {
        "segment contains control characters"
    } else {
        return Ok(());
    };
    Err(StoreError::InvalidPath {
        path: segment.to_owned(),
        reason: reason.to_owned(),
    })
}

/// Path to a collection: an odd number of segments
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath {
    segments: Vec<String>,
}

impl CollectionPath {
    /// Top-level collection
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` if the name is not a valid segment
    pub fn root(name: &str) -> StoreResult<Self> {
        validate_segment(name)?;
        Ok(Self {
            segments: vec![name.to_owned()],
        })
    }

    /// Document with the given id inside this collection
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` if the id is not a valid segment
    pub fn doc(&self, id: &str) -> StoreResult<DocumentPath> {
        validate_segment(id)?;
        let mut segments = self.segments.clone();
        segments.push(id.to_owned());
        Ok(DocumentPath { segments })
    }

    /// Collection name (last segment)
    #[must_use]
    pub fn name(&self) -> &str {
        self.segments.last().map_or("", String::as_str)
    }

    /// Path of the document owning this collection, `None` for top-level ones
    #[must_use]
    pub fn parent(&self) -> Option<DocumentPath> {
        if self.segments.len() < 3 {
            return None;
        }
        Some(DocumentPath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }
}

impl Display for CollectionPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

/// Path to a document: an even number of segments
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentPath {
    segments: Vec<String>,
}

impl DocumentPath {
    /// Parse a full slash-separated document path
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` for odd segment counts or invalid segments
    pub fn parse(path: &str) -> StoreResult<Self> {
        let segments: Vec<String> = path.split('/').map(ToOwned::to_owned).collect();
        if segments.len() % 2 != 0 {
            return Err(StoreError::InvalidPath {
                path: path.to_owned(),
                reason: "document paths need an even number of segments".to_owned(),
            });
        }
        for segment in &segments {
            validate_segment(segment)?;
        }
        Ok(Self { segments })
    }

    /// Subcollection nested under this document
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` if the name is not a valid segment
    pub fn collection(&self, name: &str) -> StoreResult<CollectionPath> {
        validate_segment(name)?;
        let mut segments = self.segments.clone();
        segments.push(name.to_owned());
        Ok(CollectionPath { segments })
    }

    /// Document id (last segment)
    #[must_use]
    pub fn id(&self) -> &str {
        self.segments.last().map_or("", String::as_str)
    }

    /// Collection containing this document
    #[must_use]
    pub fn parent(&self) -> CollectionPath {
        CollectionPath {
            segments: self.segments[..self.segments.len().saturating_sub(1)].to_vec(),
        }
    }
}

impl Display for DocumentPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}
