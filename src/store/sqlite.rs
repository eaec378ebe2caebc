// ABOUTME: SQLite document store keeping JSON documents in a single table
// ABOUTME: Transactions validate read versions inside BEGIN IMMEDIATE before writing
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use super::path::DocumentPath;
use super::query::{DocumentSnapshot, FieldFilter, FilterOp, Query};
use super::value::{merge_fields, Document, Value};
use super::{DocumentStore, Transaction, WriteBatch, WriteOp};
use crate::config::database::DatabaseUrl;
use crate::errors::{StoreError, StoreResult};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// `SQLite` result codes meaning another writer holds the lock
const SQLITE_BUSY_CODES: [&str; 2] = ["5", "6"];

fn backend_error(context: &str, err: &sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = err {
        if db_err
            .code()
            .is_some_and(|code| SQLITE_BUSY_CODES.contains(&&*code))
        {
            return StoreError::Conflict {
                path: "<database lock>".to_owned(),
            };
        }
    }
    StoreError::backend(format!("{context}: {err}"))
}

fn encode(doc: &Document) -> StoreResult<String> {
    serde_json::to_string(doc).map_err(|e| StoreError::Serialization {
        context: format!("encode document: {e}"),
    })
}

fn decode(raw: &str) -> StoreResult<Document> {
    serde_json::from_str(raw).map_err(|e| StoreError::Serialization {
        context: format!("decode document: {e}"),
    })
}

/// Bound parameter of a pushed-down filter
#[derive(Debug, PartialEq)]
enum SqlParam {
    Text(String),
    Integer(i64),
    Real(f64),
}

/// JSON path of a field's tagged payload inside the stored document
fn field_path(field: &str, part: &str) -> Option<String> {
    if field.contains(['"', '\\']) {
        return None;
    }
    Some(format!("$.\"{field}\".{part}"))
}

/// Append `filter` to `sql` as a `json_extract` predicate
///
/// Returns `false` when the filter has no exact SQL form (timestamps, nested
/// values, nulls); the caller then filters those rows after decoding.
fn push_filter(sql: &mut String, params: &mut Vec<SqlParam>, filter: &FieldFilter) -> bool {
    let (Some(type_path), Some(value_path)) = (
        field_path(&filter.field, "type"),
        field_path(&filter.field, "value"),
    ) else {
        return false;
    };
    let operand = match &filter.value {
        Value::String(text) => SqlParam::Text(text.clone()),
        Value::Integer(n) => SqlParam::Integer(*n),
        Value::Double(f) => SqlParam::Real(*f),
        Value::Bool(b) if filter.op == FilterOp::Equal => SqlParam::Integer(i64::from(*b)),
        _ => return false,
    };

    match (filter.op, &filter.value) {
        (FilterOp::Equal, value) => {
            sql.push_str(" AND json_extract(data, ?) = ? AND json_extract(data, ?) = ?");
            params.push(SqlParam::Text(type_path));
            params.push(SqlParam::Text(value_type_tag(value).to_owned()));
        }
        (FilterOp::LessThanOrEqual, Value::String(_)) => {
            sql.push_str(" AND json_extract(data, ?) = 'string' AND json_extract(data, ?) <= ?");
            params.push(SqlParam::Text(type_path));
        }
        (FilterOp::LessThanOrEqual, _) => {
            sql.push_str(" AND json_extract(data, ?) IN ('integer', 'double')");
            sql.push_str(" AND json_extract(data, ?) <= ?");
            params.push(SqlParam::Text(type_path));
        }
    }
    params.push(SqlParam::Text(value_path));
    params.push(operand);
    true
}

/// SQL text, filter parameters and SQL `LIMIT` for a collection query
///
/// Filters SQL cannot express exactly are applied after decoding, so the
/// limit only moves into SQL when every filter did; -1 means unbounded.
fn plan_query(query: &Query) -> (String, Vec<SqlParam>, i64) {
    let mut sql =
        "SELECT doc_id, data FROM documents WHERE collection = ? AND doc_id > ?".to_owned();
    let mut params = Vec::new();
    let mut all_pushed = true;
    for filter in &query.filters {
        all_pushed &= push_filter(&mut sql, &mut params, filter);
    }
    sql.push_str(" ORDER BY doc_id ASC LIMIT ?");

    let sql_limit = match (all_pushed, query.limit) {
        (true, Some(limit)) => i64::try_from(limit).unwrap_or(i64::MAX),
        _ => -1,
    };
    (sql, params, sql_limit)
}

/// Serialized `type` tag of a value
const fn value_type_tag(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Integer(_) => "integer",
        Value::Double(_) => "double",
        Value::String(_) => "string",
        Value::Timestamp(_) => "timestamp",
        Value::Array(_) => "array",
        Value::Map(_) => "map",
    }
}

/// Document store persisted in `SQLite`
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (and create if needed) the database behind `url`
    ///
    /// In-memory databases are pinned to a single connection that is never
    /// recycled, since every new connection would see an empty database.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not a `SQLite` URL, the connection fails or
    /// the schema cannot be created
    pub async fn connect(url: &DatabaseUrl) -> StoreResult<Self> {
        let pool = match url {
            DatabaseUrl::SQLiteMemory => {
                let options = SqliteConnectOptions::from_str("sqlite::memory:")
                    .map_err(|e| backend_error("parse sqlite options", &e))?;
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .min_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect_with(options)
                    .await
                    .map_err(|e| backend_error("connect sqlite memory database", &e))?
            }
            DatabaseUrl::SQLite { path } => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StoreError::backend(format!(
                            "create database directory {}: {e}",
                            parent.display()
                        ))
                    })?;
                }
                let options = SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .busy_timeout(Duration::from_secs(5));
                SqlitePoolOptions::new()
                    .connect_with(options)
                    .await
                    .map_err(|e| backend_error("connect sqlite database", &e))?
            }
            DatabaseUrl::Memory => {
                return Err(StoreError::backend(
                    "memory: URLs are served by the in-memory store",
                ))
            }
        };

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Create the documents table and version sequence
    ///
    /// # Errors
    ///
    /// Returns an error if a schema statement fails
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS documents (
                path TEXT PRIMARY KEY,
                collection TEXT NOT NULL,
                doc_id TEXT NOT NULL,
                data TEXT NOT NULL,
                version INTEGER NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| backend_error("create documents table", &e))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection, doc_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| backend_error("create documents index", &e))?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS store_sequence (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                value INTEGER NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| backend_error("create sequence table", &e))?;

        sqlx::query("INSERT OR IGNORE INTO store_sequence (id, value) VALUES (1, 0)")
            .execute(&self.pool)
            .await
            .map_err(|e| backend_error("seed sequence", &e))?;

        Ok(())
    }

    /// Get a reference to the pool for diagnostics
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn read_versioned(&self, path: &str) -> StoreResult<Option<(Document, i64)>> {
        let row = sqlx::query("SELECT data, version FROM documents WHERE path = ?1")
            .bind(path)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| backend_error("read document", &e))?;

        row.map(|r| {
            let raw: String = r.get("data");
            let version: i64 = r.get("version");
            decode(&raw).map(|doc| (doc, version))
        })
        .transpose()
    }

    /// Validate `reads` and apply `ops` under an immediate write lock
    async fn commit_ops(
        &self,
        reads: &HashMap<String, Option<i64>>,
        ops: Vec<WriteOp>,
    ) -> StoreResult<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| backend_error("acquire connection", &e))?;

        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(|e| backend_error("begin transaction", &e))?;

        let outcome = match Self::validate_and_apply(&mut conn, reads, ops).await {
            Ok(()) => sqlx::query("COMMIT")
                .execute(&mut *conn)
                .await
                .map(|_| ())
                .map_err(|e| backend_error("commit transaction", &e)),
            Err(err) => Err(err),
        };

        if outcome.is_err() {
            if let Err(rollback_err) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                warn!(error = %rollback_err, "Failed to roll back document transaction");
            }
        }
        outcome
    }

    async fn validate_and_apply(
        conn: &mut SqliteConnection,
        reads: &HashMap<String, Option<i64>>,
        ops: Vec<WriteOp>,
    ) -> StoreResult<()> {
        for (path, seen) in reads {
            let current: Option<i64> =
                sqlx::query_scalar("SELECT version FROM documents WHERE path = ?1")
                    .bind(path)
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(|e| backend_error("validate read", &e))?;
            if current != *seen {
                return Err(StoreError::Conflict { path: path.clone() });
            }
        }

        if ops.is_empty() {
            return Ok(());
        }

        sqlx::query("UPDATE store_sequence SET value = value + 1 WHERE id = 1")
            .execute(&mut *conn)
            .await
            .map_err(|e| backend_error("advance sequence", &e))?;
        let version: i64 = sqlx::query_scalar("SELECT value FROM store_sequence WHERE id = 1")
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| backend_error("read sequence", &e))?;

        for op in ops {
            Self::apply_op(conn, op, version).await?;
        }
        Ok(())
    }

    async fn apply_op(conn: &mut SqliteConnection, op: WriteOp, version: i64) -> StoreResult<()> {
        match op {
            WriteOp::SetMerge { path, fields } => {
                let key = path.to_string();
                let existing: Option<String> =
                    sqlx::query_scalar("SELECT data FROM documents WHERE path = ?1")
                        .bind(&key)
                        .fetch_optional(&mut *conn)
                        .await
                        .map_err(|e| backend_error("load document for merge", &e))?;
                let mut data = existing.as_deref().map_or_else(|| Ok(Document::new()), decode)?;
                merge_fields(&mut data, fields);

                sqlx::query(
                    r"
                    INSERT INTO documents (path, collection, doc_id, data, version)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    ON CONFLICT(path) DO UPDATE SET data = excluded.data, version = excluded.version
                    ",
                )
                .bind(&key)
                .bind(path.parent().to_string())
                .bind(path.id())
                .bind(encode(&data)?)
                .bind(version)
                .execute(&mut *conn)
                .await
                .map_err(|e| backend_error("write document", &e))?;
            }
            WriteOp::Delete { path } => {
                sqlx::query("DELETE FROM documents WHERE path = ?1")
                    .bind(path.to_string())
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| backend_error("delete document", &e))?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, path: &DocumentPath) -> StoreResult<Option<Document>> {
        Ok(self
            .read_versioned(&path.to_string())
            .await?
            .map(|(doc, _)| doc))
    }

    async fn set_merge(&self, path: &DocumentPath, fields: Document) -> StoreResult<()> {
        self.commit_ops(
            &HashMap::new(),
            vec![WriteOp::SetMerge {
                path: path.clone(),
                fields,
            }],
        )
        .await
    }

    async fn delete(&self, path: &DocumentPath) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM documents WHERE path = ?1")
            .bind(path.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| backend_error("delete document", &e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                path: path.to_string(),
            });
        }
        Ok(())
    }

    async fn query(&self, query: &Query) -> StoreResult<Vec<DocumentSnapshot>> {
        let after = query.start_after.clone().unwrap_or_default();
        let (sql, params, sql_limit) = plan_query(query);

        let mut statement = sqlx::query(&sql)
            .bind(query.collection.to_string())
            .bind(&after);
        for param in params {
            statement = match param {
                SqlParam::Text(text) => statement.bind(text),
                SqlParam::Integer(n) => statement.bind(n),
                SqlParam::Real(f) => statement.bind(f),
            };
        }
        let rows = statement
            .bind(sql_limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| backend_error("query collection", &e))?;

        let mut results = Vec::new();
        for row in rows {
            let id: String = row.get("doc_id");
            let raw: String = row.get("data");
            let data = decode(&raw)?;
            if query.accepts(&id, &data) {
                results.push(DocumentSnapshot { id, data });
                if query.limit.is_some_and(|limit| results.len() >= limit) {
                    break;
                }
            }
        }
        debug!(collection = %query.collection, returned = results.len(), "Collection query");
        Ok(results)
    }

    async fn commit_batch(&self, batch: WriteBatch) -> StoreResult<()> {
        batch.check_size()?;
        self.commit_ops(&HashMap::new(), batch.into_ops()).await
    }

    async fn begin(&self) -> StoreResult<Box<dyn Transaction>> {
        Ok(Box::new(SqliteTransaction {
            store: self.clone(),
            reads: HashMap::new(),
            writes: Vec::new(),
        }))
    }
}

/// Optimistic transaction over a [`SqliteStore`]
struct SqliteTransaction {
    store: SqliteStore,
    reads: HashMap<String, Option<i64>>,
    writes: Vec<WriteOp>,
}

#[async_trait]
impl Transaction for SqliteTransaction {
    async fn get(&mut self, path: &DocumentPath) -> StoreResult<Option<Document>> {
        let key = path.to_string();
        if !self.writes.is_empty() {
            return Err(StoreError::ReadAfterWrite { path: key });
        }
        let found = self.store.read_versioned(&key).await?;
        self.reads
            .entry(key)
            .or_insert_with(|| found.as_ref().map(|(_, version)| *version));
        Ok(found.map(|(doc, _)| doc))
    }

    fn set_merge(&mut self, path: &DocumentPath, fields: Document) {
        self.writes.push(WriteOp::SetMerge {
            path: path.clone(),
            fields,
        });
    }

    fn delete(&mut self, path: &DocumentPath) {
        self.writes.push(WriteOp::Delete { path: path.clone() });
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let Self {
            store,
            reads,
            writes,
        } = *self;
        store.commit_ops(&reads, writes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::path::CollectionPath;
    use chrono::Utc;

    fn windows() -> Query {
        Query::new(CollectionPath::root("_rateLimitWindows").unwrap())
    }

    #[test]
    fn test_range_filter_and_limit_reach_sql() {
        let (sql, params, limit) = plan_query(&windows().where_lte("expiresAt", 10_i64).limit(200));
        assert!(sql.contains("json_extract(data, ?) <= ?"));
        assert_eq!(limit, 200);
        assert_eq!(
            params,
            vec![
                SqlParam::Text("$.\"expiresAt\".type".to_owned()),
                SqlParam::Text("$.\"expiresAt\".value".to_owned()),
                SqlParam::Integer(10),
            ]
        );
    }

    #[test]
    fn test_equality_checks_the_type_tag() {
        let (_, params, limit) = plan_query(&windows().where_eq("threadId", "t1").limit(100));
        assert_eq!(limit, 100);
        assert_eq!(params[1], SqlParam::Text("string".to_owned()));
        assert_eq!(params[3], SqlParam::Text("t1".to_owned()));
    }

    #[test]
    fn test_inexpressible_filters_keep_the_limit_in_rust() {
        let (_, params, limit) = plan_query(&windows().where_eq("createdAt", Utc::now()).limit(5));
        assert!(params.is_empty());
        assert_eq!(limit, -1);

        let (_, _, unbounded) = plan_query(&windows().where_eq("a\"b", "x").limit(5));
        assert_eq!(unbounded, -1);
    }
}
