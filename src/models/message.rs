//! Message model

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{Document, FieldValue, Fields};

/// A chat message as displayed.
///
/// The serde form is the serialized message list accepted as fallback data:
/// `[{"id": "...", "user": "+1555...", "message": "hi", "photoURL": null,
/// "timestamp": 1705314600000}]` with `timestamp` in epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    /// Sender identifier (phone number).
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "photoURL", default)]
    pub photo_url: Option<String>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    pub fn from_document(doc: &Document) -> Self {
        Self {
            id: doc.id.clone(),
            user: doc.get_str("user").map(String::from),
            message: doc.get_str("message").unwrap_or_default().to_string(),
            photo_url: doc.get_str("photoURL").map(String::from),
            timestamp: doc.get("timestamp").and_then(FieldValue::as_timestamp),
        }
    }
}

/// Fields of a new message document. The timestamp is assigned by the store.
pub fn new_message_fields(text: &str, sender: Option<&str>, photo_url: Option<&str>) -> Fields {
    let mut fields = Fields::new();
    fields.insert("timestamp".into(), FieldValue::ServerTimestamp);
    fields.insert("message".into(), text.into());
    fields.insert("user".into(), sender.map(String::from).into());
    fields.insert("photoURL".into(), photo_url.map(String::from).into());
    fields
}

/// Parse a serialized message list.
pub fn parse_message_list(json: &str) -> Result<Vec<Message>> {
    serde_json::from_str(json).context("Failed to parse serialized message list")
}

/// Serialize messages in the fallback-list format.
pub fn serialize_message_list(messages: &[Message]) -> Result<String> {
    serde_json::to_string_pretty(messages).context("Failed to serialize message list")
}
