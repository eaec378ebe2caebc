// ABOUTME: Conversion of store-native values into wire-safe JSON
// ABOUTME: Timestamps leave as RFC 3339 strings; client timestamps are parsed leniently
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use crate::store::{Document, Value};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Number, Value as JsonValue};

/// Render a timestamp-like value as RFC 3339 UTC with millisecond precision
///
/// Integers are read as epoch milliseconds and strings pass through
/// unchanged. Anything else has no textual timestamp form.
#[must_use]
pub fn timestamp_to_wire(value: &Value) -> Option<String> {
    match value {
        Value::Timestamp(ts) => Some(format_timestamp(ts)),
        Value::Integer(millis) => Utc
            .timestamp_millis_opt(*millis)
            .single()
            .map(|ts| format_timestamp(&ts)),
        Value::String(raw) => Some(raw.clone()),
        _ => None,
    }
}

/// RFC 3339 with millisecond precision and `Z` suffix
#[must_use]
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a client-supplied timestamp
///
/// Accepts RFC 3339 strings and epoch milliseconds; returns `None` for
/// anything else so callers can fall back to the current time.
#[must_use]
pub fn parse_client_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(ts.with_timezone(&Utc));
    }
    trimmed
        .parse::<i64>()
        .ok()
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
}

/// Deserialize a client timestamp field without ever rejecting the payload
///
/// Strings pass through and integral numbers (epoch milliseconds) keep their
/// digits, both later read by [`parse_client_timestamp`]. Any other JSON shape
/// becomes `None`.
///
/// # Errors
///
/// Only fails when the input is not valid JSON
pub fn deserialize_lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match JsonValue::deserialize(deserializer)? {
        JsonValue::String(raw) => Some(raw),
        JsonValue::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .map(|millis| millis.to_string()),
        _ => None,
    })
}

/// Convert a single value to JSON, timestamps as RFC 3339 strings
#[must_use]
pub fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Integer(n) => JsonValue::Number((*n).into()),
        Value::Double(f) => Number::from_f64(*f).map_or(JsonValue::Null, JsonValue::Number),
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Timestamp(ts) => JsonValue::String(format_timestamp(ts)),
        Value::Array(items) => JsonValue::Array(items.iter().map(value_to_json).collect()),
        Value::Map(fields) => document_to_json(fields),
    }
}

/// Convert a whole document to a JSON object
#[must_use]
pub fn document_to_json(doc: &Document) -> JsonValue {
    JsonValue::Object(
        doc.iter()
            .map(|(key, value)| (key.clone(), value_to_json(value)))
            .collect::<Map<String, JsonValue>>(),
    )
}
