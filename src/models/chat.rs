//! Conversation model

use crate::store::{Document, FieldValue};

/// A conversation (`chats/{id}`) and its participant emails.
#[derive(Debug, Clone, PartialEq)]
pub struct Chat {
    pub id: String,
    pub users: Vec<String>,
}

impl Chat {
    pub fn from_document(doc: &Document) -> Self {
        let users = doc
            .get("users")
            .and_then(FieldValue::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(FieldValue::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id: doc.id.clone(),
            users,
        }
    }

    /// Collection holding this conversation's messages.
    pub fn messages_collection(&self) -> String {
        messages_collection(&self.id)
    }

    /// The other participant, from `me`'s point of view.
    pub fn recipient_email(&self, me: &str) -> Option<&str> {
        recipient_email(&self.users, me)
    }
}

pub fn messages_collection(chat_id: &str) -> String {
    format!("chats/{}/messages", chat_id)
}

/// First participant that is not `me`.
pub fn recipient_email<'a>(users: &'a [String], me: &str) -> Option<&'a str> {
    users.iter().map(String::as_str).find(|u| *u != me)
}
