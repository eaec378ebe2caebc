// ABOUTME: Contract tests run against every document store backend
// ABOUTME: Merge writes, queries, batch ceilings, optimistic conflicts and file persistence
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use anyhow::Result;
use common::{init_test_logging, msg, numbered_messages, start_clock, turn};
use lyric_chat_store::config::DatabaseUrl;
use lyric_chat_store::database::MessageRole;
use lyric_chat_store::errors::StoreError;
use lyric_chat_store::resources::ChatPersistence;
use lyric_chat_store::store::factory::{Store, StoreType};
use lyric_chat_store::store::{
    CollectionPath, Document, DocumentPath, DocumentStore, Query, Value, WriteBatch,
};
use std::sync::Arc;

fn path(raw: &str) -> DocumentPath {
    DocumentPath::parse(raw).unwrap()
}

fn fields(pairs: &[(&str, Value)]) -> Document {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), v.clone()))
        .collect()
}

async fn backends() -> Vec<(StoreType, Arc<dyn DocumentStore>)> {
    init_test_logging();
    let mut stores: Vec<(StoreType, Arc<dyn DocumentStore>)> = Vec::new();
    for url in [DatabaseUrl::Memory, DatabaseUrl::SQLiteMemory] {
        let store = Store::new(&url).await.unwrap();
        stores.push((store.store_type(), Arc::new(store)));
    }
    stores
}

#[tokio::test]
async fn test_merge_only_touches_named_fields() -> Result<()> {
    for (backend, store) in backends().await {
        let doc = path("users/u1/songs/s1");
        store
            .set_merge(
                &doc,
                fields(&[("title", Value::from("a")), ("lyrics", Value::from("b"))]),
            )
            .await?;
        store
            .set_merge(&doc, fields(&[("title", Value::from("c"))]))
            .await?;

        let stored = store.get(&doc).await?.unwrap();
        assert_eq!(stored.get("title"), Some(&Value::from("c")), "{backend:?}");
        assert_eq!(stored.get("lyrics"), Some(&Value::from("b")), "{backend:?}");
    }
    Ok(())
}

#[tokio::test]
async fn test_query_orders_filters_and_pages_by_id() -> Result<()> {
    for (backend, store) in backends().await {
        let songs = path("users/u1").collection("songs")?;
        let mut batch = WriteBatch::new();
        for (id, thread) in [("s3", "t1"), ("s1", "t1"), ("s2", "t2"), ("s4", "t1")] {
            batch.set_merge(songs.doc(id)?, fields(&[("threadId", Value::from(thread))]));
        }
        // Nested documents are not children of the songs collection.
        batch.set_merge(
            path("users/u1/songs/s1/versions/v1"),
            fields(&[("threadId", Value::from("t1"))]),
        );
        store.commit_batch(batch).await?;

        let ids = |snapshots: Vec<lyric_chat_store::store::DocumentSnapshot>| {
            snapshots.into_iter().map(|s| s.id).collect::<Vec<_>>()
        };

        let all = store.query(&Query::new(songs.clone())).await?;
        assert_eq!(ids(all), ["s1", "s2", "s3", "s4"], "{backend:?}");

        let in_t1 = store
            .query(&Query::new(songs.clone()).where_eq("threadId", "t1"))
            .await?;
        assert_eq!(ids(in_t1), ["s1", "s3", "s4"], "{backend:?}");

        let page = store
            .query(&Query::new(songs.clone()).start_after("s1").limit(2))
            .await?;
        assert_eq!(ids(page), ["s2", "s3"], "{backend:?}");
    }
    Ok(())
}

#[tokio::test]
async fn test_range_filter_on_integers() -> Result<()> {
    for (backend, store) in backends().await {
        let windows = CollectionPath::root("_rateLimitWindows")?;
        for (id, expires) in [("a", 5_i64), ("b", 10), ("c", 15)] {
            store
                .set_merge(&windows.doc(id)?, fields(&[("expiresAt", Value::Integer(expires))]))
                .await?;
        }
        let expired = store
            .query(&Query::new(windows).where_lte("expiresAt", 10_i64))
            .await?;
        assert_eq!(expired.len(), 2, "{backend:?}");
    }
    Ok(())
}

#[tokio::test]
async fn test_filters_compare_values_of_the_same_kind() -> Result<()> {
    for (backend, store) in backends().await {
        let items = CollectionPath::root("items")?;
        let mut batch = WriteBatch::new();
        for (id, value) in [
            ("a", Value::Integer(1)),
            ("b", Value::from("1")),
            ("c", Value::Bool(true)),
            ("d", Value::Double(0.5)),
            ("e", Value::Integer(7)),
            ("f", Value::Null),
        ] {
            batch.set_merge(items.doc(id)?, fields(&[("n", value)]));
        }
        store.commit_batch(batch).await?;

        let ids = |snapshots: Vec<lyric_chat_store::store::DocumentSnapshot>| {
            snapshots.into_iter().map(|s| s.id).collect::<Vec<_>>()
        };
        let equal_one = store
            .query(&Query::new(items.clone()).where_eq("n", 1_i64))
            .await?;
        assert_eq!(ids(equal_one), ["a"], "{backend:?}");

        let equal_true = store
            .query(&Query::new(items.clone()).where_eq("n", true))
            .await?;
        assert_eq!(ids(equal_true), ["c"], "{backend:?}");

        let small = store
            .query(&Query::new(items.clone()).where_lte("n", 1_i64))
            .await?;
        assert_eq!(ids(small), ["a", "d"], "{backend:?}");

        let first_small = store
            .query(&Query::new(items.clone()).where_lte("n", 7_i64).start_after("a").limit(1))
            .await?;
        assert_eq!(ids(first_small), ["d"], "{backend:?}");
    }
    Ok(())
}

#[tokio::test]
async fn test_oversized_batch_is_rejected_whole() -> Result<()> {
    for (backend, store) in backends().await {
        let mut batch = WriteBatch::new();
        for i in 0..501 {
            batch.set_merge(
                path(&format!("users/u1/songs/s{i}")),
                fields(&[("n", Value::Integer(i))]),
            );
        }
        let err = store.commit_batch(batch).await.unwrap_err();
        assert!(
            matches!(err, StoreError::BatchTooLarge { size: 501, max: 500 }),
            "{backend:?}"
        );
        assert!(store.get(&path("users/u1/songs/s0")).await?.is_none());
    }
    Ok(())
}

#[tokio::test]
async fn test_deleting_a_missing_document_is_not_found() -> Result<()> {
    for (backend, store) in backends().await {
        let err = store.delete(&path("users/u1/threads/none")).await.unwrap_err();
        assert!(err.is_not_found(), "{backend:?}");
    }
    Ok(())
}

#[tokio::test]
async fn test_stale_transaction_reads_conflict() -> Result<()> {
    for (backend, store) in backends().await {
        let doc = path("users/u1/conversations/t1");
        store
            .set_merge(&doc, fields(&[("messageCount", Value::Integer(1))]))
            .await?;

        let mut tx = store.begin().await?;
        let seen = tx.get(&doc).await?;
        assert!(seen.is_some());

        store
            .set_merge(&doc, fields(&[("messageCount", Value::Integer(2))]))
            .await?;

        tx.set_merge(&doc, fields(&[("messageCount", Value::Integer(99))]));
        let err = tx.commit().await.unwrap_err();
        assert!(err.is_conflict(), "{backend:?}");

        let stored = store.get(&doc).await?.unwrap();
        assert_eq!(stored.get("messageCount"), Some(&Value::Integer(2)));
    }
    Ok(())
}

#[tokio::test]
async fn test_timestamps_survive_storage() -> Result<()> {
    for (backend, store) in backends().await {
        let when = chrono::DateTime::parse_from_rfc3339("2024-02-29T23:59:59.123Z")?
            .with_timezone(&chrono::Utc);
        let doc = path("users/u1/threads/t1");
        store
            .set_merge(&doc, fields(&[("createdAt", Value::Timestamp(when))]))
            .await?;
        let stored = store.get(&doc).await?.unwrap();
        assert_eq!(stored.get("createdAt"), Some(&Value::Timestamp(when)), "{backend:?}");
    }
    Ok(())
}

#[tokio::test]
async fn test_sqlite_file_survives_reopen() -> Result<()> {
    init_test_logging();
    let dir = tempfile::tempdir()?;
    let url = DatabaseUrl::parse_url(&format!("sqlite:{}", dir.path().join("chat.db").display()));
    assert!(!url.is_ephemeral());

    {
        let store = Store::new(&url).await?;
        assert_eq!(store.store_type(), StoreType::SQLite);
        let chat = ChatPersistence::with_store(
            Arc::new(store),
            start_clock(),
            common::test_config(20, 60_000, false),
        );
        chat.writer
            .write_turn(&turn(
                "u1",
                "t1",
                vec![msg("m1", MessageRole::User, "remember me")],
            ))
            .await?;
        chat.writer
            .write_turn(&turn("u1", "t2", numbered_messages(2)))
            .await?;
    }

    let reopened = ChatPersistence::with_store(
        Arc::new(Store::new(&url).await?),
        start_clock(),
        common::test_config(20, 60_000, false),
    );
    let summary = reopened.history.get_conversation("u1", "t1").await?.unwrap();
    assert_eq!(summary.last_message_preview.as_deref(), Some("remember me"));

    let report = reopened.deleter.delete_all_conversations("u1").await?;
    assert_eq!(report.conversations, 2);
    assert!(reopened.history.list_messages("u1", "t2").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_sqlite_creates_missing_parent_directories() -> Result<()> {
    init_test_logging();
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("data").join("nested").join("chat.db");
    let url = DatabaseUrl::parse_url(&format!("sqlite:{}", db_path.display()));

    let store = Store::new(&url).await?;
    store
        .set_merge(&path("users/u1"), fields(&[("email", Value::from("u1@example.com"))]))
        .await?;
    assert!(db_path.exists());
    Ok(())
}
