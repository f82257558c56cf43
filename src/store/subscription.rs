//! Live query subscriptions.
//!
//! A subscription is a background task that re-runs a query whenever the
//! store reports a change (or every poll interval for stores without a change
//! feed) and publishes the result into a `watch` channel when it differs from
//! the last published snapshot. Readers see `None` until the first snapshot
//! arrives. Dropping the `Subscription` cancels the task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;

use super::{DocumentStore, Query, Snapshot};

/// Maximum delay between retries after a failed query.
const MAX_BACKOFF_SECS: u64 = 64;

pub struct Subscription {
    rx: watch::Receiver<Option<Snapshot>>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Latest snapshot, if any has arrived.
    pub fn latest(&self) -> Option<Snapshot> {
        self.rx.borrow().clone()
    }

    /// Whether a snapshot has arrived at all.
    pub fn has_snapshot(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Wait until a snapshot newer than the last one seen by this handle is
    /// published. Returns `false` if the subscription task has ended.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Open a live subscription to `query`.
pub fn subscribe(
    store: Arc<dyn DocumentStore>,
    query: Query,
    poll_interval: Duration,
) -> Subscription {
    let (tx, rx) = watch::channel(None);
    let task = tokio::spawn(run(store, query, poll_interval, tx));
    Subscription { rx, task }
}

async fn run(
    store: Arc<dyn DocumentStore>,
    query: Query,
    poll_interval: Duration,
    tx: watch::Sender<Option<Snapshot>>,
) {
    let mut feed = store.change_feed();
    let mut backoff = 1u64;

    loop {
        // Mark the feed as seen before querying so a write landing during
        // the query triggers another round.
        if let Some(ref mut feed) = feed {
            feed.borrow_and_update();
        }

        match store.run_query(&query).await {
            Ok(docs) => {
                backoff = 1;
                let snapshot = Snapshot { docs };
                let changed = tx.send_if_modified(|current| {
                    if current.as_ref() == Some(&snapshot) {
                        false
                    } else {
                        *current = Some(snapshot);
                        true
                    }
                });
                if changed {
                    tracing::debug!("Snapshot updated for {}", query.collection);
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Query on {} failed: {}. Retrying in {}s...",
                    query.collection,
                    e,
                    backoff
                );
                time::sleep(Duration::from_secs(backoff)).await;
                backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
                continue;
            }
        }

        if tx.is_closed() {
            tracing::debug!("No readers left for {}, stopping", query.collection);
            return;
        }

        match feed {
            Some(ref mut feed) => {
                if feed.changed().await.is_err() {
                    // Store dropped; nothing more will change.
                    return;
                }
            }
            None => time::sleep(poll_interval).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Direction, FieldValue, Fields, MemoryStore, StoreError};
    use crate::store::Document;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn message(body: &str) -> Fields {
        let mut f = Fields::new();
        f.insert("message".into(), body.into());
        f.insert("timestamp".into(), FieldValue::ServerTimestamp);
        f
    }

    async fn next_snapshot(sub: &mut Subscription) -> Snapshot {
        time::timeout(Duration::from_secs(5), sub.changed())
            .await
            .expect("timed out waiting for snapshot");
        sub.latest().expect("snapshot published")
    }

    #[tokio::test]
    async fn test_initial_snapshot_then_live_update() {
        let store = Arc::new(MemoryStore::new());
        store.add("chats/c1/messages", message("one")).await.unwrap();

        let query = Query::collection("chats/c1/messages").order_by("timestamp", Direction::Ascending);
        let mut sub = subscribe(store.clone(), query, Duration::from_secs(60));

        let first = next_snapshot(&mut sub).await;
        assert_eq!(first.docs.len(), 1);

        store.add("chats/c1/messages", message("two")).await.unwrap();
        let second = next_snapshot(&mut sub).await;
        let bodies: Vec<&str> = second.docs.iter().filter_map(|d| d.get_str("message")).collect();
        assert_eq!(bodies, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_unrelated_write_does_not_republish() {
        let store = Arc::new(MemoryStore::new());
        let mut sub = subscribe(store.clone(), Query::collection("users"), Duration::from_secs(60));
        let first = next_snapshot(&mut sub).await;
        assert!(first.docs.is_empty());

        store.add("other", Fields::new()).await.unwrap();
        let republished = time::timeout(Duration::from_millis(200), sub.changed()).await;
        assert!(republished.is_err());
    }

    /// Fails the first query, then delegates.
    struct Flaky {
        inner: MemoryStore,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DocumentStore for Flaky {
        async fn run_query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(StoreError::Decode("boom".into()));
            }
            self.inner.run_query(query).await
        }
        async fn get(&self, path: &str) -> Result<Document, StoreError> {
            self.inner.get(path).await
        }
        async fn merge(&self, path: &str, fields: Fields) -> Result<(), StoreError> {
            self.inner.merge(path, fields).await
        }
        async fn add(&self, collection: &str, fields: Fields) -> Result<String, StoreError> {
            self.inner.add(collection, fields).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_after_query_error() {
        let store = Arc::new(Flaky {
            inner: MemoryStore::new(),
            calls: AtomicUsize::new(0),
        });
        let mut sub = subscribe(store.clone(), Query::collection("users"), Duration::from_secs(60));
        assert!(!sub.has_snapshot());

        // Paused clock auto-advances through the 1s backoff.
        let snap = next_snapshot(&mut sub).await;
        assert!(snap.docs.is_empty());
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_without_change_feed() {
        let store = Arc::new(Flaky {
            inner: MemoryStore::new(),
            calls: AtomicUsize::new(1),
        });
        let _sub = subscribe(store.clone(), Query::collection("users"), Duration::from_secs(2));
        time::sleep(Duration::from_secs(5)).await;
        // Initial query plus polls at 2s and 4s.
        assert!(store.calls.load(Ordering::SeqCst) >= 4);
    }
}
