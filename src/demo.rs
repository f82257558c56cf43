//! Offline demo: the chat screen against a seeded in-memory store.
//!
//! A scripted contact answers every message, so sending, live updates and
//! the last-active header can be tried without a Firebase project.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::task::JoinHandle;

use crate::api::{load_chat, send_message_with_store};
use crate::models::{new_message_fields, presence_fields, Chat, CurrentUser, Message};
use crate::screen::ChatScreen;
use crate::store::{subscribe, Direction, DocumentStore, FieldValue, Fields, MemoryStore, Query};
use crate::tui::{self, LogBuffer};

const CHAT_ID: &str = "demo";
const CONTACT_UID: &str = "ada";
const CONTACT_EMAIL: &str = "ada@firechat.demo";
const CONTACT_PHONE: &str = "+15550123";

/// Pause before the contact answers.
const REPLY_DELAY: Duration = Duration::from_millis(1500);

/// Poll period; unused by the in-memory store, which pushes changes.
const POLL: Duration = Duration::from_secs(2);

fn demo_user() -> CurrentUser {
    CurrentUser {
        uid: "me".into(),
        email: "me@firechat.demo".into(),
        phone_number: Some("+15550100".into()),
        photo_url: None,
    }
}

fn contact() -> CurrentUser {
    CurrentUser {
        uid: CONTACT_UID.into(),
        email: CONTACT_EMAIL.into(),
        phone_number: Some(CONTACT_PHONE.into()),
        photo_url: None,
    }
}

/// Seed the conversation, both user records and a short history.
async fn seed(store: &MemoryStore) -> Result<Chat> {
    let me = demo_user();
    let ada = contact();

    let mut chat = Fields::new();
    chat.insert(
        "users".into(),
        FieldValue::Array(vec![me.email.as_str().into(), ada.email.as_str().into()]),
    );
    store.merge(&format!("chats/{}", CHAT_ID), chat).await?;

    let now = Utc::now();
    for (user, seen_mins) in [(&me, 0), (&ada, 7)] {
        let mut record = Fields::new();
        record.insert("email".into(), user.email.as_str().into());
        if let Some(ref phone) = user.phone_number {
            record.insert("phoneNumber".into(), phone.as_str().into());
        }
        record.insert(
            "lastSeen".into(),
            (now - chrono::Duration::minutes(seen_mins)).into(),
        );
        store.merge(&user.record_path(), record).await?;
    }

    let history = [
        (&ada, "Hi! Did the build go through?", 42),
        (&me, "Yes, all green", 40),
        (&ada, "Great. Try typing something, I'll answer.", 8),
    ];
    let collection = format!("chats/{}/messages", CHAT_ID);
    for (user, text, mins_ago) in history {
        let mut fields = new_message_fields(text, Some(user.sender_id()), None);
        fields.insert(
            "timestamp".into(),
            (now - chrono::Duration::minutes(mins_ago)).into(),
        );
        store.add(&collection, fields).await?;
    }

    load_chat(store, CHAT_ID).await
}

/// Answer each new message from `me` as the contact.
fn spawn_responder(store: Arc<MemoryStore>, chat: Chat, me: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        let query = Query::collection(chat.messages_collection())
            .order_by("timestamp", Direction::Ascending);
        let mut sub = subscribe(store.clone(), query, POLL);
        let mut answered: Option<String> = None;
        let ada = contact();

        while sub.changed().await {
            let Some(last) = sub
                .latest()
                .and_then(|snap| snap.docs.last().map(Message::from_document))
            else {
                continue;
            };
            if last.user.as_deref() != Some(me.as_str())
                || answered.as_deref() == Some(last.id.as_str())
            {
                continue;
            }
            answered = Some(last.id.clone());

            tokio::time::sleep(REPLY_DELAY).await;
            let reply = format!("You said: {}", last.message.trim());
            match send_message_with_store(store.as_ref(), &ada, &chat.id, &reply).await {
                Ok(id) => tracing::debug!("Demo contact replied with {}", id),
                Err(e) => tracing::warn!("Demo contact failed to reply: {:#}", e),
            }
        }
    })
}

/// Run the demo until the user quits.
pub async fn run(log_buffer: LogBuffer) -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let chat = seed(&store).await?;
    let me = demo_user();
    tracing::info!("Demo store seeded with chat {}", chat.id);

    let responder = spawn_responder(store.clone(), chat.clone(), me.sender_id().to_string());

    // Mark ourselves present on entry, as a real session would on send.
    store.merge(&me.record_path(), presence_fields()).await?;

    let screen = ChatScreen::open(store, chat, me, None, POLL)?;
    let result = tui::run(screen, log_buffer).await;
    responder.abort();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::read_messages_data;

    #[test]
    fn test_seed_builds_conversation() {
        let store = MemoryStore::new();
        let chat = tokio_test::block_on(seed(&store)).unwrap();
        assert_eq!(chat.id, CHAT_ID);
        assert_eq!(chat.recipient_email(&demo_user().email), Some(CONTACT_EMAIL));

        let msgs = tokio_test::block_on(read_messages_data(&store, CHAT_ID, 10)).unwrap();
        let users: Vec<Option<&str>> = msgs.iter().map(|m| m.user.as_deref()).collect();
        assert_eq!(
            users,
            vec![Some(CONTACT_PHONE), Some("+15550100"), Some(CONTACT_PHONE)]
        );
        assert_eq!(msgs[0].message, "Hi! Did the build go through?");
    }

    #[tokio::test(start_paused = true)]
    async fn test_contact_replies_once() {
        let store = Arc::new(MemoryStore::new());
        let chat = seed(&store).await.unwrap();
        let me = demo_user();
        let responder =
            spawn_responder(store.clone(), chat.clone(), me.sender_id().to_string());

        send_message_with_store(store.as_ref(), &me, CHAT_ID, "ping ")
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let msgs = read_messages_data(store.as_ref(), CHAT_ID, 10).await.unwrap();
                if msgs.len() == 5 {
                    assert_eq!(msgs[4].message, "You said: ping");
                    assert_eq!(msgs[4].user.as_deref(), Some(CONTACT_PHONE));
                    break;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        })
        .await
        .expect("contact replied");

        // The reply itself does not trigger another one.
        tokio::time::sleep(Duration::from_secs(5)).await;
        let msgs = read_messages_data(store.as_ref(), CHAT_ID, 10).await.unwrap();
        assert_eq!(msgs.len(), 5);
        responder.abort();
    }
}
