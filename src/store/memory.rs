//! In-process document store.
//!
//! Mirrors the query and write semantics of the Firestore backend closely
//! enough to drive the chat screen without a network: equality and
//! array-contains filters, `orderBy` (documents lacking the field are
//! excluded), merge writes, and server timestamps. Every write bumps a
//! revision counter exposed as a change feed, so subscriptions wake
//! immediately instead of polling.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;

use super::{
    check_collection_path, new_document_id, split_document_path, Direction, Document,
    DocumentStore, FieldValue, Fields, Query, StoreError,
};

#[derive(Default)]
struct Inner {
    /// Documents per collection path, in insertion order.
    collections: HashMap<String, Vec<Document>>,
    /// Last server timestamp handed out; keeps request times strictly increasing.
    last_server_time: Option<DateTime<Utc>>,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
    revision: watch::Sender<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Mutex::new(Inner::default()),
            revision,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A panicked writer leaves whole documents behind, never half-written
        // ones, so the data is still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn request_time(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_server_time {
            if now <= last {
                now = last + Duration::microseconds(1);
            }
        }
        self.last_server_time = Some(now);
        now
    }

    /// Replace `ServerTimestamp` sentinels with the commit time.
    fn resolve(&mut self, fields: Fields) -> Fields {
        if !fields.values().any(|v| *v == FieldValue::ServerTimestamp) {
            return fields;
        }
        let now = self.request_time();
        fields
            .into_iter()
            .map(|(k, v)| match v {
                FieldValue::ServerTimestamp => (k, FieldValue::Timestamp(now)),
                other => (k, other),
            })
            .collect()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn run_query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let collection = check_collection_path(&query.collection)?;
        let inner = self.lock();

        let mut docs: Vec<Document> = inner
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|d| query.filter.as_ref().map_or(true, |f| f.matches(d)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some((field, direction)) = &query.order_by {
            docs.retain(|d| d.fields.contains_key(field));
            // Stable sort: equal keys keep insertion order.
            docs.sort_by(|a, b| {
                let ord = a.fields[field].cmp_for_order(&b.fields[field]);
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }

        if let Some(limit) = query.limit {
            docs.truncate(limit);
        }

        Ok(docs)
    }

    async fn get(&self, path: &str) -> Result<Document, StoreError> {
        let (collection, id) = split_document_path(path)?;
        let inner = self.lock();
        inner
            .collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id == id))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn merge(&self, path: &str, fields: Fields) -> Result<(), StoreError> {
        let (collection, id) = split_document_path(path)?;
        {
            let mut inner = self.lock();
            let fields = inner.resolve(fields);
            let docs = inner.collections.entry(collection.to_string()).or_default();
            match docs.iter_mut().find(|d| d.id == id) {
                Some(existing) => existing.fields.extend(fields),
                None => docs.push(Document {
                    id: id.to_string(),
                    path: format!("{}/{}", collection, id),
                    fields,
                }),
            }
        }
        tracing::debug!("memory store: merged {}", path);
        self.bump();
        Ok(())
    }

    async fn add(&self, collection: &str, fields: Fields) -> Result<String, StoreError> {
        let collection = check_collection_path(collection)?;
        let id = new_document_id();
        {
            let mut inner = self.lock();
            let fields = inner.resolve(fields);
            let path = format!("{}/{}", collection, id);
            let docs = inner.collections.entry(collection.to_string()).or_default();
            if docs.iter().any(|d| d.id == id) {
                return Err(StoreError::AlreadyExists(path));
            }
            docs.push(Document {
                id: id.clone(),
                path,
                fields,
            });
        }
        tracing::debug!("memory store: added {}/{}", collection, id);
        self.bump();
        Ok(id)
    }

    fn change_feed(&self) -> Option<watch::Receiver<u64>> {
        Some(self.revision.subscribe())
    }
}
