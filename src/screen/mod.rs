//! The chat screen: one conversation, its live message list, the recipient's
//! last-active status, and the composer.
//!
//! Two live subscriptions feed the screen. Until the message subscription
//! delivers its first snapshot, rows come from a fallback message list
//! supplied by the caller; afterwards the snapshot replaces it entirely.
//! Sending performs two independent fire-and-forget writes.

pub mod draft;
pub mod timeago;

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::models::{
    new_message_fields, parse_message_list, presence_fields, Chat, CurrentUser, Message,
    UserRecord,
};
use crate::store::{subscribe, Direction, DocumentStore, Query, Snapshot, Subscription};

pub use draft::Draft;
pub use timeago::time_ago;

/// Recipient's last-active status.
#[derive(Debug, Clone, PartialEq)]
pub enum LastActive {
    /// No recipient snapshot yet.
    Loading,
    /// Snapshot arrived without a `lastSeen` value.
    Unavailable,
    Seen(DateTime<Utc>),
}

impl LastActive {
    pub fn from_snapshot(snapshot: Option<&Snapshot>) -> Self {
        match snapshot {
            None => LastActive::Loading,
            Some(snap) => snap
                .first()
                .map(UserRecord::from_document)
                .and_then(|rec| rec.last_seen)
                .map_or(LastActive::Unavailable, LastActive::Seen),
        }
    }

    /// Header text.
    pub fn label(&self, now: DateTime<Utc>) -> String {
        match self {
            LastActive::Loading => "Loading last active...".to_string(),
            LastActive::Unavailable => "Last active: Unavailable".to_string(),
            LastActive::Seen(ts) => format!("Last active: {}", time_ago(*ts, now)),
        }
    }
}

/// Rows to display: the live snapshot when present, else the fallback list.
pub fn select_rows(live: Option<&Snapshot>, fallback: &[Message]) -> Vec<Message> {
    match live {
        Some(snap) => snap.docs.iter().map(Message::from_document).collect(),
        None => fallback.to_vec(),
    }
}

/// Handles to the two writes issued by a send.
pub struct PendingWrites {
    presence: JoinHandle<()>,
    message: JoinHandle<()>,
}

impl PendingWrites {
    pub fn is_finished(&self) -> bool {
        self.presence.is_finished() && self.message.is_finished()
    }

    /// Wait for both writes to finish, successfully or not.
    pub async fn settled(self) {
        let _ = tokio::join!(self.presence, self.message);
    }
}

pub struct ChatScreen {
    chat: Chat,
    me: CurrentUser,
    store: Arc<dyn DocumentStore>,
    recipient_email: Option<String>,
    fallback: Vec<Message>,
    messages: Subscription,
    /// Absent when the conversation has no other participant.
    recipient: Option<Subscription>,
    pub draft: Draft,
    scroll_to_end: bool,
}

impl ChatScreen {
    /// Open the screen and its live subscriptions.
    ///
    /// `fallback_json` is a serialized message list shown until the first
    /// message snapshot arrives.
    pub fn open(
        store: Arc<dyn DocumentStore>,
        chat: Chat,
        me: CurrentUser,
        fallback_json: Option<&str>,
        poll_interval: Duration,
    ) -> Result<Self> {
        let fallback = match fallback_json {
            Some(json) => parse_message_list(json).context("Invalid fallback message list")?,
            None => Vec::new(),
        };

        let recipient_email = chat.recipient_email(&me.email).map(String::from);

        let messages_query =
            Query::collection(chat.messages_collection()).order_by("timestamp", Direction::Ascending);
        let messages = subscribe(Arc::clone(&store), messages_query, poll_interval);

        let recipient = match recipient_email {
            Some(ref email) => {
                let query = Query::collection("users").where_eq("email", email.as_str());
                Some(subscribe(Arc::clone(&store), query, poll_interval))
            }
            None => {
                tracing::warn!("Chat {} has no other participant", chat.id);
                None
            }
        };

        tracing::info!(
            "Opened chat {} with {}",
            chat.id,
            recipient_email.as_deref().unwrap_or("(nobody)")
        );

        Ok(Self {
            chat,
            me,
            store,
            recipient_email,
            fallback,
            messages,
            recipient,
            draft: Draft::default(),
            scroll_to_end: true,
        })
    }

    pub fn chat(&self) -> &Chat {
        &self.chat
    }

    pub fn me(&self) -> &CurrentUser {
        &self.me
    }

    pub fn recipient_email(&self) -> Option<&str> {
        self.recipient_email.as_deref()
    }

    /// Message rows in display order.
    pub fn rows(&self) -> Vec<Message> {
        select_rows(self.messages.latest().as_ref(), &self.fallback)
    }

    /// Whether rows come from the live subscription.
    pub fn is_live(&self) -> bool {
        self.messages.has_snapshot()
    }

    pub fn last_active(&self) -> LastActive {
        match self.recipient {
            Some(ref sub) => LastActive::from_snapshot(sub.latest().as_ref()),
            None => LastActive::Unavailable,
        }
    }

    /// Send is enabled exactly when the draft is non-empty.
    pub fn can_send(&self) -> bool {
        !self.draft.is_empty()
    }

    /// Send the draft: merge a presence marker into the sender's record and
    /// append the message, both in the background. Clears the draft and
    /// requests a scroll to the newest message.
    pub fn send(&mut self) -> Option<PendingWrites> {
        let text = self.draft.take()?;

        let presence = {
            let store = Arc::clone(&self.store);
            let path = self.me.record_path();
            tokio::spawn(async move {
                if let Err(e) = store.merge(&path, presence_fields()).await {
                    tracing::warn!("Presence update for {} failed: {}", path, e);
                }
            })
        };

        let message = {
            let store = Arc::clone(&self.store);
            let collection = self.chat.messages_collection();
            let fields = new_message_fields(
                &text,
                Some(self.me.sender_id()),
                self.me.photo_url.as_deref(),
            );
            tokio::spawn(async move {
                match store.add(&collection, fields).await {
                    Ok(id) => tracing::debug!("Message {} added to {}", id, collection),
                    Err(e) => tracing::warn!("Sending message to {} failed: {}", collection, e),
                }
            })
        };

        self.scroll_to_end = true;
        Some(PendingWrites { presence, message })
    }

    /// Consume a pending scroll-to-newest request.
    pub fn take_scroll_request(&mut self) -> bool {
        std::mem::take(&mut self.scroll_to_end)
    }

    /// Resolve when either subscription publishes a new snapshot.
    pub async fn updated(&mut self) {
        let Self {
            messages,
            recipient,
            ..
        } = self;

        let messages_changed = async {
            if !messages.changed().await {
                pending::<()>().await;
            }
        };
        let recipient_changed = async {
            match recipient {
                Some(sub) => {
                    if !sub.changed().await {
                        pending::<()>().await;
                    }
                }
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            _ = messages_changed => {}
            _ = recipient_changed => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FieldValue, Fields, MemoryStore};
    use chrono::TimeZone;

    const POLL: Duration = Duration::from_secs(60);

    fn me() -> CurrentUser {
        CurrentUser {
            uid: "u-me".into(),
            email: "me@x.com".into(),
            phone_number: Some("+15550100".into()),
            photo_url: Some("https://example.com/me.png".into()),
        }
    }

    fn chat() -> Chat {
        Chat {
            id: "c1".into(),
            users: vec!["me@x.com".into(), "bob@x.com".into()],
        }
    }

    const FALLBACK: &str = r#"[
        {"id": "f1", "user": "+15550199", "message": "from server", "timestamp": 1000},
        {"id": "f2", "user": "+15550100", "message": "cached reply", "timestamp": 2000}
    ]"#;

    async fn wait_until(screen: &mut ChatScreen, cond: impl Fn(&ChatScreen) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !cond(screen) {
                screen.updated().await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[test]
    fn test_select_rows_fallback_without_snapshot() {
        let fallback = parse_message_list(FALLBACK).unwrap();
        let rows = select_rows(None, &fallback);
        assert_eq!(rows, fallback);
    }

    #[test]
    fn test_select_rows_snapshot_overrides_fallback() {
        let fallback = parse_message_list(FALLBACK).unwrap();
        let snap = Snapshot { docs: vec![] };
        assert!(select_rows(Some(&snap), &fallback).is_empty());
    }

    #[test]
    fn test_last_active_states() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        assert_eq!(LastActive::from_snapshot(None), LastActive::Loading);
        assert_eq!(LastActive::Loading.label(now), "Loading last active...");

        let empty = Snapshot { docs: vec![] };
        assert_eq!(LastActive::from_snapshot(Some(&empty)), LastActive::Unavailable);
        assert_eq!(LastActive::Unavailable.label(now), "Last active: Unavailable");

        let seen = LastActive::Seen(now - chrono::Duration::minutes(3));
        assert_eq!(seen.label(now), "Last active: 3 minutes ago");
    }

    #[tokio::test]
    async fn test_can_send_tracks_draft() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let mut screen = ChatScreen::open(store, chat(), me(), None, POLL).unwrap();
        assert!(!screen.can_send());
        for text in ["a", " ", "\n", "hello world"] {
            screen.draft.clear();
            screen.draft.insert_str(text);
            assert!(screen.can_send(), "should be sendable: {:?}", text);
        }
        screen.draft.clear();
        assert!(!screen.can_send());
        assert!(screen.send().is_none());
    }

    #[tokio::test]
    async fn test_fallback_until_live_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let mut screen =
            ChatScreen::open(store.clone(), chat(), me(), Some(FALLBACK), POLL).unwrap();

        // Nothing published yet: the fallback list is shown as given.
        if !screen.is_live() {
            let ids: Vec<String> = screen.rows().into_iter().map(|m| m.id).collect();
            assert_eq!(ids, vec!["f1", "f2"]);
        }

        wait_until(&mut screen, |s| s.is_live()).await;
        // Live but empty collection: fallback is gone.
        assert!(screen.rows().is_empty());
    }

    #[tokio::test]
    async fn test_live_rows_in_timestamp_order() {
        let store = Arc::new(MemoryStore::new());
        let coll = "chats/c1/messages";
        for (body, secs) in [("late", 300), ("early", 100), ("middle", 200)] {
            let mut f = Fields::new();
            f.insert("message".into(), body.into());
            f.insert("user".into(), "+15550199".into());
            f.insert(
                "timestamp".into(),
                FieldValue::Timestamp(Utc.timestamp_opt(secs, 0).unwrap()),
            );
            store.add(coll, f).await.unwrap();
        }

        let mut screen =
            ChatScreen::open(store.clone(), chat(), me(), Some(FALLBACK), POLL).unwrap();
        wait_until(&mut screen, |s| s.rows().len() == 3).await;

        let bodies: Vec<String> = screen.rows().into_iter().map(|m| m.message).collect();
        assert_eq!(bodies, vec!["early", "middle", "late"]);
    }

    #[tokio::test]
    async fn test_recipient_last_seen() {
        let store = Arc::new(MemoryStore::new());
        let mut bob = Fields::new();
        bob.insert("email".into(), "bob@x.com".into());
        store.merge("users/u-bob", bob).await.unwrap();

        let mut screen = ChatScreen::open(store.clone(), chat(), me(), None, POLL).unwrap();
        wait_until(&mut screen, |s| s.last_active() != LastActive::Loading).await;
        assert_eq!(screen.last_active(), LastActive::Unavailable);

        let seen_at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut presence = Fields::new();
        presence.insert("lastSeen".into(), seen_at.into());
        store.merge("users/u-bob", presence).await.unwrap();

        wait_until(&mut screen, |s| s.last_active() != LastActive::Unavailable).await;
        assert_eq!(screen.last_active(), LastActive::Seen(seen_at));
        assert_eq!(
            screen
                .last_active()
                .label(seen_at + chrono::Duration::hours(2)),
            "Last active: 2 hours ago"
        );
    }

    #[tokio::test]
    async fn test_send_writes_and_resets_draft() {
        let store = Arc::new(MemoryStore::new());
        let mut screen = ChatScreen::open(store.clone(), chat(), me(), None, POLL).unwrap();
        assert!(screen.take_scroll_request());
        assert!(!screen.take_scroll_request());

        screen.draft.insert_str("hi bob");
        let pending = screen.send().expect("non-empty draft sends");
        assert!(screen.draft.is_empty());
        assert!(!screen.can_send());
        assert!(screen.take_scroll_request());

        pending.settled().await;

        let me_doc = store.get("users/u-me").await.unwrap();
        assert!(me_doc.get("lastSeen").and_then(FieldValue::as_timestamp).is_some());

        let msgs = store
            .run_query(&Query::collection("chats/c1/messages"))
            .await
            .unwrap();
        assert_eq!(msgs.len(), 1);
        let sent = Message::from_document(&msgs[0]);
        assert_eq!(sent.message, "hi bob");
        assert_eq!(sent.user.as_deref(), Some("+15550100"));
        assert_eq!(sent.photo_url.as_deref(), Some("https://example.com/me.png"));
        assert!(sent.timestamp.is_some());

        wait_until(&mut screen, |s| s.rows().len() == 1).await;
        assert_eq!(screen.rows()[0].message, "hi bob");
    }

    #[tokio::test]
    async fn test_malformed_fallback_is_an_error() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let result = ChatScreen::open(store, chat(), me(), Some("[{oops"), POLL);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_self_chat_has_no_recipient() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let solo = Chat {
            id: "c2".into(),
            users: vec!["me@x.com".into()],
        };
        let screen = ChatScreen::open(store, solo, me(), None, POLL).unwrap();
        assert_eq!(screen.recipient_email(), None);
        assert_eq!(screen.last_active(), LastActive::Unavailable);
    }
}
