//! Chat operations outside the interactive screen: listing conversations,
//! reading history, and one-shot sends.

use anyhow::{Context, Result};

use super::client::ChatClient;
use crate::models::{
    messages_collection, new_message_fields, presence_fields, serialize_message_list, Chat,
    CurrentUser, Message,
};
use crate::store::{Direction, DocumentStore, Query};

/// Chat metadata for display.
pub struct ChatInfo {
    pub id: String,
    /// The other participant, or the chat id for self-chats.
    pub name: String,
}

/// List conversations the user takes part in (prints to stdout).
pub async fn list_chats(limit: usize) -> Result<()> {
    let client = ChatClient::new().await?;
    let chats = list_chats_data(client.store().as_ref(), client.me(), limit).await?;

    println!("\nChats:");
    println!("{:-<60}", "");

    if chats.is_empty() {
        println!("  (no chats found)");
        return Ok(());
    }

    for chat in &chats {
        println!("{}", chat.name);
        println!("  ID: {}", chat.id);
        println!();
    }

    Ok(())
}

/// Read messages from a conversation (prints to stdout).
///
/// With `json`, prints the serialized message list accepted by `tui --fallback`.
pub async fn read_messages(chat_id: &str, limit: usize, json: bool) -> Result<()> {
    let client = ChatClient::new().await?;
    let msgs = read_messages_data(client.store().as_ref(), chat_id, limit).await?;

    if json {
        println!("{}", serialize_message_list(&msgs)?);
        return Ok(());
    }

    if msgs.is_empty() {
        println!("(no messages)");
        return Ok(());
    }

    for msg in &msgs {
        let time = msg
            .timestamp
            .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "pending".to_string());
        println!(
            "[{}] {}: {}",
            time,
            msg.user.as_deref().unwrap_or("?"),
            msg.message
        );
    }

    Ok(())
}

/// Send a message to a conversation.
pub async fn send_message(chat_id: &str, message: &str) -> Result<()> {
    anyhow::ensure!(!message.is_empty(), "Refusing to send an empty message");
    let client = ChatClient::new().await?;
    let id = send_message_with_store(client.store().as_ref(), client.me(), chat_id, message).await?;
    tracing::debug!("Sent message {}", id);
    println!("Message sent.");
    Ok(())
}

/// Conversations containing `me`, keyed by the other participant.
pub async fn list_chats_data(
    store: &dyn DocumentStore,
    me: &CurrentUser,
    limit: usize,
) -> Result<Vec<ChatInfo>> {
    let query = Query::collection("chats")
        .where_array_contains("users", me.email.as_str())
        .limit(limit);
    let docs = store
        .run_query(&query)
        .await
        .context("Failed to list chats")?;

    Ok(docs
        .iter()
        .map(Chat::from_document)
        .map(|chat| ChatInfo {
            name: chat
                .recipient_email(&me.email)
                .unwrap_or(chat.id.as_str())
                .to_string(),
            id: chat.id,
        })
        .collect())
}

/// Fetch a conversation record.
pub async fn load_chat(store: &dyn DocumentStore, chat_id: &str) -> Result<Chat> {
    let doc = store
        .get(&format!("chats/{}", chat_id))
        .await
        .with_context(|| format!("Failed to load chat {}", chat_id))?;
    Ok(Chat::from_document(&doc))
}

/// The most recent `limit` messages, oldest first.
pub async fn read_messages_data(
    store: &dyn DocumentStore,
    chat_id: &str,
    limit: usize,
) -> Result<Vec<Message>> {
    // Newest `limit` from the store, then flipped to reading order.
    let query = Query::collection(messages_collection(chat_id))
        .order_by("timestamp", Direction::Descending)
        .limit(limit);
    let docs = store
        .run_query(&query)
        .await
        .with_context(|| format!("Failed to read messages of {}", chat_id))?;

    Ok(docs.iter().rev().map(Message::from_document).collect())
}

/// Presence update plus message append, both awaited. Returns the new
/// message id.
pub async fn send_message_with_store(
    store: &dyn DocumentStore,
    me: &CurrentUser,
    chat_id: &str,
    message: &str,
) -> Result<String> {
    let path = me.record_path();
    let collection = messages_collection(chat_id);
    let fields = new_message_fields(message, Some(me.sender_id()), me.photo_url.as_deref());

    let (_, id) = tokio::try_join!(
        async {
            store
                .merge(&path, presence_fields())
                .await
                .context("Failed to update presence")
        },
        async {
            store
                .add(&collection, fields)
                .await
                .context("Failed to send message")
        },
    )?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FieldValue, Fields, MemoryStore};

    fn me() -> CurrentUser {
        CurrentUser {
            uid: "u-me".into(),
            email: "me@x.com".into(),
            phone_number: None,
            photo_url: None,
        }
    }

    async fn seed_chat(store: &MemoryStore, id: &str, users: &[&str]) {
        let mut fields = Fields::new();
        fields.insert(
            "users".into(),
            FieldValue::Array(users.iter().map(|u| FieldValue::from(*u)).collect()),
        );
        store.merge(&format!("chats/{}", id), fields).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_chats_filters_by_membership() {
        let store = MemoryStore::new();
        seed_chat(&store, "c1", &["me@x.com", "bob@x.com"]).await;
        seed_chat(&store, "c2", &["alice@x.com", "bob@x.com"]).await;
        seed_chat(&store, "c3", &["carol@x.com", "me@x.com"]).await;

        let chats = list_chats_data(&store, &me(), 10).await.unwrap();
        let names: Vec<&str> = chats.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["bob@x.com", "carol@x.com"]);
    }

    #[tokio::test]
    async fn test_load_chat() {
        let store = MemoryStore::new();
        seed_chat(&store, "c1", &["me@x.com", "bob@x.com"]).await;
        let chat = load_chat(&store, "c1").await.unwrap();
        assert_eq!(chat.users.len(), 2);
        assert!(load_chat(&store, "missing").await.is_err());
    }

    #[tokio::test]
    async fn test_read_takes_newest_by_timestamp() {
        let store = MemoryStore::new();
        for (text, secs) in [("c", 300), ("a", 100), ("d", 400), ("b", 200)] {
            let mut fields = Fields::new();
            fields.insert("message".into(), text.into());
            fields.insert(
                "timestamp".into(),
                FieldValue::Timestamp(chrono::DateTime::from_timestamp(secs, 0).unwrap()),
            );
            store.add("chats/c1/messages", fields).await.unwrap();
        }

        let msgs = read_messages_data(&store, "c1", 3).await.unwrap();
        let bodies: Vec<&str> = msgs.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(bodies, vec!["b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_send_then_read_last_n() {
        let store = MemoryStore::new();
        for text in ["one", "two", "three"] {
            send_message_with_store(&store, &me(), "c1", text).await.unwrap();
        }

        let msgs = read_messages_data(&store, "c1", 2).await.unwrap();
        let bodies: Vec<&str> = msgs.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(bodies, vec!["two", "three"]);
        // No phone number: the email identifies the sender.
        assert_eq!(msgs[0].user.as_deref(), Some("me@x.com"));

        let me_doc = store.get("users/u-me").await.unwrap();
        assert!(me_doc.get("lastSeen").is_some());
    }
}
