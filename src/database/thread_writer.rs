// ABOUTME: Atomic persistence of one chat turn across thread, conversation, message and song docs
// ABOUTME: First-write-versus-merge decisions, incremental message counting and preview derivation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Thread Snapshot Writer
//!
//! One call to [`ThreadSnapshotWriter::write_turn`] is one transaction:
//! every involved document is read first, then the thread log, the
//! conversation summary, each message and the optional song are merged.
//! `createdAt` fields are only written when the document did not exist, and
//! `messageCount` grows by the number of message documents this write created.

use super::models::{non_blank, IncomingMessage, SongDraft, TurnInput, TurnOutcome};
use super::paths::UserPaths;
use crate::clock::Clock;
use crate::constants::{fields, limits};
use crate::errors::AppResult;
use crate::serialization::parse_client_timestamp;
use crate::store::value::get_i64;
use crate::store::{
    load_or_init, run_transaction, Document, DocumentPath, DocumentStore, Loaded, RetryPolicy,
    Transaction, TransactionBody, Value,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Truncate a preview to 200 characters, appending `...` when cut
#[must_use]
pub fn truncate_preview(content: &str) -> String {
    match content.char_indices().nth(limits::PREVIEW_MAX_CHARS) {
        Some((cut, _)) => format!("{}{}", &content[..cut], limits::PREVIEW_ELLIPSIS),
        None => content.to_owned(),
    }
}

/// Writes chat turns for one store
#[derive(Clone)]
pub struct ThreadSnapshotWriter {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl ThreadSnapshotWriter {
    /// Create a writer
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self {
            store,
            clock,
            retry,
        }
    }

    /// Persist one turn atomically
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when an id cannot be used as a document id, or
    /// the store error if the transaction fails
    pub async fn write_turn(&self, input: &TurnInput) -> AppResult<TurnOutcome> {
        let now = self.clock.now();
        let body = TurnWrite::prepare(input, now)?;
        let outcome = run_transaction(self.store.as_ref(), &self.retry, &body).await?;

        debug!(
            uid = %input.user.uid,
            thread_id = %input.thread_id,
            message_count = outcome.message_count,
            new_messages = outcome.new_messages,
            song_id = outcome.song_id.as_deref().unwrap_or(""),
            "Chat turn persisted"
        );
        Ok(outcome)
    }
}

/// Message after timestamp sanitization
struct PreparedMessage {
    path: DocumentPath,
    id: String,
    role: &'static str,
    content: String,
    created_at: DateTime<Utc>,
}

impl PreparedMessage {
    fn thread_entry(&self) -> Value {
        Value::Map(Document::from([
            ("id".to_owned(), Value::from(self.id.as_str())),
            ("role".to_owned(), Value::from(self.role)),
            ("content".to_owned(), Value::from(self.content.as_str())),
            (fields::CREATED_AT.to_owned(), Value::Timestamp(self.created_at)),
        ]))
    }
}

/// Song write that passed the content gate
struct PreparedSong {
    path: DocumentPath,
    id: String,
    fields: Document,
}

/// Everything one turn writes, computed before the transaction starts
struct TurnWrite {
    thread_path: DocumentPath,
    conversation_path: DocumentPath,
    thread_id: String,
    user_snapshot: Value,
    character_id: Option<String>,
    /// Full sanitized list, in input order
    messages: Vec<PreparedMessage>,
    /// Index of the last occurrence of each distinct message id
    distinct: Vec<usize>,
    song: Option<PreparedSong>,
    now: DateTime<Utc>,
}

impl TurnWrite {
    fn prepare(input: &TurnInput, now: DateTime<Utc>) -> AppResult<Self> {
        let paths = UserPaths::new(&input.user.uid)?;
        let thread_id = input.thread_id.as_str();

        let messages = input
            .messages
            .iter()
            .map(|message| prepare_message(&paths, thread_id, message, now))
            .collect::<AppResult<Vec<_>>>()?;

        let mut slots: HashMap<&str, usize> = HashMap::new();
        let mut distinct: Vec<usize> = Vec::new();
        for (index, message) in messages.iter().enumerate() {
            match slots.get(message.id.as_str()) {
                Some(&slot) => distinct[slot] = index,
                None => {
                    slots.insert(message.id.as_str(), distinct.len());
                    distinct.push(index);
                }
            }
        }

        let song = input
            .song_draft
            .as_ref()
            .filter(|draft| draft.has_content())
            .map(|draft| prepare_song(&paths, input, draft))
            .transpose()?;

        Ok(Self {
            thread_path: paths.thread(thread_id)?,
            conversation_path: paths.conversation(thread_id)?,
            thread_id: thread_id.to_owned(),
            user_snapshot: input.user.snapshot(),
            character_id: input.character_id.clone(),
            messages,
            distinct,
            song,
            now,
        })
    }

    fn thread_fields(&self, loaded: &Loaded) -> Document {
        let mut doc = Document::from([
            (
                "messages".to_owned(),
                Value::Array(self.messages.iter().map(PreparedMessage::thread_entry).collect()),
            ),
            (fields::THREAD_ID.to_owned(), Value::from(self.thread_id.as_str())),
            ("user".to_owned(), self.user_snapshot.clone()),
            (fields::UPDATED_AT.to_owned(), Value::Timestamp(self.now)),
        ]);
        if let Some(character_id) = &self.character_id {
            doc.insert("characterId".to_owned(), Value::from(character_id.as_str()));
        }
        if !loaded.exists() {
            doc.insert(fields::CREATED_AT.to_owned(), Value::Timestamp(self.now));
        }
        doc
    }

    fn message_fields(&self, message: &PreparedMessage, existed: bool) -> Document {
        let mut doc = Document::from([
            ("role".to_owned(), Value::from(message.role)),
            ("content".to_owned(), Value::from(message.content.as_str())),
            (fields::UPDATED_AT.to_owned(), Value::Timestamp(self.now)),
        ]);
        if let Some(character_id) = &self.character_id {
            doc.insert("characterId".to_owned(), Value::from(character_id.as_str()));
        }
        if !existed {
            doc.insert(
                fields::CREATED_AT.to_owned(),
                Value::Timestamp(message.created_at),
            );
        }
        doc
    }

    fn conversation_fields(&self, loaded: &Loaded, message_count: i64) -> Document {
        let mut doc = Document::from([
            (fields::THREAD_ID.to_owned(), Value::from(self.thread_id.as_str())),
            ("messageCount".to_owned(), Value::Integer(message_count)),
            (fields::UPDATED_AT.to_owned(), Value::Timestamp(self.now)),
        ]);
        if let Some(last) = self.messages.last() {
            doc.insert("lastMessageId".to_owned(), Value::from(last.id.as_str()));
            doc.insert("lastMessageRole".to_owned(), Value::from(last.role));
            doc.insert(
                "lastMessagePreview".to_owned(),
                Value::String(truncate_preview(&last.content)),
            );
            doc.insert("lastMessageAt".to_owned(), Value::Timestamp(last.created_at));
        }
        if let Some(character_id) = &self.character_id {
            doc.insert("characterId".to_owned(), Value::from(character_id.as_str()));
        }
        if !loaded.exists() {
            doc.insert(fields::CREATED_AT.to_owned(), Value::Timestamp(self.now));
        }
        doc
    }
}

#[async_trait]
impl TransactionBody for TurnWrite {
    type Output = TurnOutcome;

    async fn run(&self, tx: &mut dyn Transaction) -> AppResult<TurnOutcome> {
        let thread = load_or_init(tx, &self.thread_path).await?;
        let conversation = load_or_init(tx, &self.conversation_path).await?;
        let song = match &self.song {
            Some(song) => Some(load_or_init(tx, &song.path).await?),
            None => None,
        };
        let mut existed = Vec::with_capacity(self.distinct.len());
        for &index in &self.distinct {
            existed.push(load_or_init(tx, &self.messages[index].path).await?.exists());
        }

        let previous_count = match &conversation {
            Loaded::Existing(doc) => get_i64(doc, "messageCount").unwrap_or(0),
            Loaded::Absent => 0,
        };
        let new_messages = existed.iter().filter(|&&found| !found).count();
        let new_messages = i64::try_from(new_messages).unwrap_or(i64::MAX);
        let message_count = previous_count.saturating_add(new_messages);

        tx.set_merge(&self.thread_path, self.thread_fields(&thread));
        for (&index, &found) in self.distinct.iter().zip(&existed) {
            let message = &self.messages[index];
            tx.set_merge(&message.path, self.message_fields(message, found));
        }
        tx.set_merge(
            &self.conversation_path,
            self.conversation_fields(&conversation, message_count),
        );

        if let (Some(prepared), Some(loaded)) = (&self.song, &song) {
            let mut doc = prepared.fields.clone();
            doc.insert(fields::UPDATED_AT.to_owned(), Value::Timestamp(self.now));
            if !loaded.exists() {
                doc.insert(fields::CREATED_AT.to_owned(), Value::Timestamp(self.now));
            }
            tx.set_merge(&prepared.path, doc);
        }

        Ok(TurnOutcome {
            message_count,
            new_messages,
            conversation_created: !conversation.exists(),
            song_id: self.song.as_ref().map(|song| song.id.clone()),
        })
    }
}

fn prepare_message(
    paths: &UserPaths,
    thread_id: &str,
    message: &IncomingMessage,
    now: DateTime<Utc>,
) -> AppResult<PreparedMessage> {
    Ok(PreparedMessage {
        path: paths.message(thread_id, &message.id)?,
        id: message.id.clone(),
        role: message.role.as_str(),
        content: message.content.clone(),
        created_at: message
            .created_at
            .as_deref()
            .and_then(parse_client_timestamp)
            .unwrap_or(now),
    })
}

/// Normalize a draft; the id is fixed here so retries rewrite the same song
fn prepare_song(
    paths: &UserPaths,
    input: &TurnInput,
    draft: &SongDraft,
) -> AppResult<PreparedSong> {
    let id = non_blank(draft.id.as_deref())
        .map_or_else(|| Uuid::new_v4().to_string(), ToOwned::to_owned);

    let metadata = match &draft.metadata {
        Some(meta @ serde_json::Value::Object(_)) => Value::from(meta.clone()),
        _ => Value::Map(Document::new()),
    };

    let mut doc = Document::from([
        ("title".to_owned(), Value::from(non_blank(draft.title.as_deref()))),
        ("lyrics".to_owned(), Value::from(non_blank(draft.lyrics.as_deref()))),
        ("prompt".to_owned(), Value::from(non_blank(draft.prompt.as_deref()))),
        ("metadata".to_owned(), metadata),
        (fields::THREAD_ID.to_owned(), Value::from(input.thread_id.as_str())),
    ]);
    if let Some(character_id) = draft.character_id.as_ref().or(input.character_id.as_ref()) {
        doc.insert("characterId".to_owned(), Value::from(character_id.as_str()));
    }

    Ok(PreparedSong {
        path: paths.song(&id)?,
        id,
        fields: doc,
    })
}
