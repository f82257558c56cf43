//! User-related models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{Document, FieldValue, Fields};

/// The signed-in user, as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub uid: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub photo_url: Option<String>,
}

impl CurrentUser {
    /// Path of this user's record.
    pub fn record_path(&self) -> String {
        format!("users/{}", self.uid)
    }

    /// Identifier stamped on outgoing messages: the phone number, or the
    /// email for accounts without one.
    pub fn sender_id(&self) -> &str {
        self.phone_number.as_deref().unwrap_or(&self.email)
    }
}

/// A `users/{uid}` record.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub uid: String,
    pub email: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub photo_url: Option<String>,
    pub phone_number: Option<String>,
}

impl UserRecord {
    pub fn from_document(doc: &Document) -> Self {
        Self {
            uid: doc.id.clone(),
            email: doc.get_str("email").map(String::from),
            last_seen: doc.get("lastSeen").and_then(FieldValue::as_timestamp),
            photo_url: doc.get_str("photoURL").map(String::from),
            phone_number: doc.get_str("phoneNumber").map(String::from),
        }
    }
}

/// Presence marker merged into the user's record on activity.
pub fn presence_fields() -> Fields {
    let mut fields = Fields::new();
    fields.insert("lastSeen".into(), FieldValue::ServerTimestamp);
    fields
}
