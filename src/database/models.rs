// ABOUTME: Chat persistence input and record types
// ABOUTME: Turn inputs from the chat handler and wire-safe records read back from the store
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use crate::serialization::{
    deserialize_lenient_timestamp, document_to_json, timestamp_to_wire, value_to_json,
};
use crate::store::value::{get_i64, get_str};
use crate::store::{Document, Value};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt::{Display, Formatter, Result as FmtResult};

// ============================================================================
// Inputs
// ============================================================================

/// Authenticated caller whose subtree is written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatUser {
    /// User id, root of every document reference
    pub uid: String,
    /// Email snapshot
    #[serde(default)]
    pub email: Option<String>,
    /// Display name snapshot
    #[serde(default)]
    pub display_name: Option<String>,
}

impl ChatUser {
    /// User with only an id
    #[must_use]
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            display_name: None,
        }
    }

    /// Denormalized identity stored on the thread document
    #[must_use]
    pub fn snapshot(&self) -> Value {
        Value::Map(Document::from([
            ("uid".to_owned(), Value::from(self.uid.as_str())),
            ("email".to_owned(), Value::from(self.email.clone())),
            ("displayName".to_owned(), Value::from(self.display_name.clone())),
        ]))
    }
}

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Human input
    User,
    /// Character reply
    Assistant,
}

impl MessageRole {
    /// Stored string form
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Parse the stored string form
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

impl Display for MessageRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// One message of a turn as sent by the chat handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    /// Message id, unique within the thread
    pub id: String,
    /// Author
    pub role: MessageRole,
    /// Text content
    pub content: String,
    /// Client timestamp; missing or malformed values become the write time
    #[serde(default, deserialize_with = "deserialize_lenient_timestamp")]
    pub created_at: Option<String>,
}

impl IncomingMessage {
    /// Message without a client timestamp
    #[must_use]
    pub fn new(id: impl Into<String>, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            created_at: None,
        }
    }
}

/// Song lyric draft attached to a turn
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongDraft {
    /// Existing song id to update; a new id is generated when absent
    #[serde(default)]
    pub id: Option<String>,
    /// Title
    #[serde(default)]
    pub title: Option<String>,
    /// Lyrics text
    #[serde(default)]
    pub lyrics: Option<String>,
    /// Prompt the lyrics were generated from
    #[serde(default)]
    pub prompt: Option<String>,
    /// Opaque client metadata
    #[serde(default)]
    pub metadata: Option<JsonValue>,
    /// Character override for this song
    #[serde(default)]
    pub character_id: Option<String>,
}

impl SongDraft {
    /// Whether the draft carries lyrics or a prompt after trimming
    #[must_use]
    pub fn has_content(&self) -> bool {
        non_blank(self.lyrics.as_deref()).is_some() || non_blank(self.prompt.as_deref()).is_some()
    }
}

/// Trimmed text, `None` when empty or whitespace only
#[must_use]
pub fn non_blank(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

/// Everything persisted for one chat turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnInput {
    /// Owner of the thread
    pub user: ChatUser,
    /// Thread (and conversation) id
    pub thread_id: String,
    /// Ordered messages of the exchange
    #[serde(default)]
    pub messages: Vec<IncomingMessage>,
    /// Active character
    #[serde(default)]
    pub character_id: Option<String>,
    /// Optional song draft
    #[serde(default)]
    pub song_draft: Option<SongDraft>,
}

/// Result of a committed turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    /// Conversation message count after the write
    pub message_count: i64,
    /// Messages created by this write
    pub new_messages: i64,
    /// Whether the conversation was created by this write
    pub conversation_created: bool,
    /// Song written, if the draft passed the content gate
    pub song_id: Option<String>,
}

// ============================================================================
// Records
// ============================================================================

fn wire_time(doc: &Document, field: &str) -> Option<String> {
    doc.get(field).and_then(timestamp_to_wire)
}

fn owned_str(doc: &Document, field: &str) -> Option<String> {
    get_str(doc, field).map(ToOwned::to_owned)
}

/// Conversation summary for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    /// Thread id
    pub id: String,
    /// Number of stored messages
    pub message_count: i64,
    /// Id of the latest message
    pub last_message_id: Option<String>,
    /// Role of the latest message
    pub last_message_role: Option<String>,
    /// Truncated content of the latest message
    pub last_message_preview: Option<String>,
    /// Timestamp of the latest message
    pub last_message_at: Option<String>,
    /// Active character
    pub character_id: Option<String>,
    /// First write
    pub created_at: Option<String>,
    /// Last write
    pub updated_at: Option<String>,
}

impl ConversationSummary {
    /// Build from a stored conversation document
    #[must_use]
    pub fn from_document(id: &str, doc: &Document) -> Self {
        Self {
            id: id.to_owned(),
            message_count: get_i64(doc, "messageCount").unwrap_or(0),
            last_message_id: owned_str(doc, "lastMessageId"),
            last_message_role: owned_str(doc, "lastMessageRole"),
            last_message_preview: owned_str(doc, "lastMessagePreview"),
            last_message_at: wire_time(doc, "lastMessageAt"),
            character_id: owned_str(doc, "characterId"),
            created_at: wire_time(doc, "createdAt"),
            updated_at: wire_time(doc, "updatedAt"),
        }
    }
}

/// Message as stored in a thread's message array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadMessage {
    /// Message id
    pub id: String,
    /// Author
    pub role: String,
    /// Text content
    pub content: String,
    /// Sanitized message time
    pub created_at: Option<String>,
}

/// Raw thread log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadRecord {
    /// Thread id
    pub id: String,
    /// Full message array of the last write
    pub messages: Vec<ThreadMessage>,
    /// Active character
    pub character_id: Option<String>,
    /// Identity snapshot of the owner
    pub user: JsonValue,
    /// First write
    pub created_at: Option<String>,
    /// Last write
    pub updated_at: Option<String>,
}

impl ThreadRecord {
    /// Build from a stored thread document
    #[must_use]
    pub fn from_document(id: &str, doc: &Document) -> Self {
        let messages = doc
            .get("messages")
            .and_then(Value::as_array)
            .unwrap_or_default()
            .iter()
            .filter_map(Value::as_map)
            .map(|entry| ThreadMessage {
                id: owned_str(entry, "id").unwrap_or_default(),
                role: owned_str(entry, "role").unwrap_or_default(),
                content: owned_str(entry, "content").unwrap_or_default(),
                created_at: wire_time(entry, "createdAt"),
            })
            .collect();

        Self {
            id: id.to_owned(),
            messages,
            character_id: owned_str(doc, "characterId"),
            user: doc.get("user").map_or(JsonValue::Null, value_to_json),
            created_at: wire_time(doc, "createdAt"),
            updated_at: wire_time(doc, "updatedAt"),
        }
    }
}

/// Individual message record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    /// Message id
    pub id: String,
    /// Author
    pub role: String,
    /// Text content
    pub content: String,
    /// Character active when the message was written
    pub character_id: Option<String>,
    /// First write
    pub created_at: Option<String>,
    /// Last write
    pub updated_at: Option<String>,
}

impl MessageRecord {
    /// Build from a stored message document
    #[must_use]
    pub fn from_document(id: &str, doc: &Document) -> Self {
        Self {
            id: id.to_owned(),
            role: owned_str(doc, "role").unwrap_or_default(),
            content: owned_str(doc, "content").unwrap_or_default(),
            character_id: owned_str(doc, "characterId"),
            created_at: wire_time(doc, "createdAt"),
            updated_at: wire_time(doc, "updatedAt"),
        }
    }
}

/// Song lyric draft record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongRecord {
    /// Song id
    pub id: String,
    /// Title
    pub title: Option<String>,
    /// Lyrics text
    pub lyrics: Option<String>,
    /// Source prompt
    pub prompt: Option<String>,
    /// Opaque client metadata
    pub metadata: JsonValue,
    /// Character
    pub character_id: Option<String>,
    /// Thread the song was drafted in
    pub thread_id: Option<String>,
    /// First write
    pub created_at: Option<String>,
    /// Last write
    pub updated_at: Option<String>,
}

impl SongRecord {
    /// Build from a stored song document
    #[must_use]
    pub fn from_document(id: &str, doc: &Document) -> Self {
        Self {
            id: id.to_owned(),
            title: owned_str(doc, "title"),
            lyrics: owned_str(doc, "lyrics"),
            prompt: owned_str(doc, "prompt"),
            metadata: doc
                .get("metadata")
                .and_then(Value::as_map)
                .map_or_else(|| JsonValue::Object(serde_json::Map::new()), document_to_json),
            character_id: owned_str(doc, "characterId"),
            thread_id: owned_str(doc, "threadId"),
            created_at: wire_time(doc, "createdAt"),
            updated_at: wire_time(doc, "updatedAt"),
        }
    }
}
