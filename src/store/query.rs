// ABOUTME: Collection queries with field filters, id ordering and cursors
// ABOUTME: Shared by every backend so filtering semantics stay identical
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use super::path::CollectionPath;
use super::value::{Document, Value};
use std::cmp::Ordering;

/// Comparison applied by a field filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    /// Field equals the value
    Equal,
    /// Field is ordered at or below the value
    LessThanOrEqual,
}

/// A single `field <op> value` predicate
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    /// Top-level field name
    pub field: String,
    /// Comparison
    pub op: FilterOp,
    /// Operand
    pub value: Value,
}

impl FieldFilter {
    /// Whether a document satisfies this filter; missing fields never match
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        let Some(actual) = doc.get(&self.field) else {
            return false;
        };
        match self.op {
            FilterOp::Equal => actual == &self.value,
            FilterOp::LessThanOrEqual => matches!(
                actual.compare(&self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
        }
    }
}

/// Query over the direct children of one collection
///
/// Results are always ordered by document id ascending.
#[derive(Debug, Clone)]
pub struct Query {
    /// Collection being scanned
    pub collection: CollectionPath,
    /// Conjunction of filters
    pub filters: Vec<FieldFilter>,
    /// Exclusive lower bound on document id
    pub start_after: Option<String>,
    /// Maximum number of results
    pub limit: Option<usize>,
}

impl Query {
    /// Unfiltered, unbounded query over a collection
    #[must_use]
    pub const fn new(collection: CollectionPath) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            start_after: None,
            limit: None,
        }
    }

    /// Add an equality filter
    #[must_use]
    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(FieldFilter {
            field: field.to_owned(),
            op: FilterOp::Equal,
            value: value.into(),
        });
        self
    }

    /// Add a less-than-or-equal filter
    #[must_use]
    pub fn where_lte(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(FieldFilter {
            field: field.to_owned(),
            op: FilterOp::LessThanOrEqual,
            value: value.into(),
        });
        self
    }

    /// Continue after the given document id
    #[must_use]
    pub fn start_after(mut self, id: impl Into<String>) -> Self {
        self.start_after = Some(id.into());
        self
    }

    /// Cap the number of results
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a document with this id and data belongs in the result set,
    /// ignoring the limit
    #[must_use]
    pub fn accepts(&self, id: &str, doc: &Document) -> bool {
        if let Some(after) = &self.start_after {
            if id <= after.as_str() {
                return false;
            }
        }
        self.filters.iter().all(|filter| filter.matches(doc))
    }
}

/// A document returned by a query
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    /// Document id
    pub id: String,
    /// Stored fields
    pub data: Document,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(pairs: &[(&str, Value)]) -> Document {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn test_lte_filter_on_integers() {
        let query = Query::new(CollectionPath::root("_rateLimitWindows").unwrap())
            .where_lte("expiresAt", 100_i64);

        assert!(query.accepts("a", &doc(&[("expiresAt", Value::Integer(100))])));
        assert!(!query.accepts("b", &doc(&[("expiresAt", Value::Integer(101))])));
        assert!(!query.accepts("c", &doc(&[])));
    }

    #[test]
    fn test_start_after_is_exclusive() {
        let query = Query::new(CollectionPath::root("users").unwrap()).start_after("m");
        assert!(!query.accepts("m", &Document::new()));
        assert!(query.accepts("n", &Document::new()));
    }
}
