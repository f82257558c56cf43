//! Document store abstraction.
//!
//! Chat data lives in a hierarchical document database: collections hold
//! documents, documents hold fields and may own subcollections
//! (`chats/{id}/messages/{messageId}`). The screen only needs filtered and
//! ordered collection queries plus two kinds of writes, so that is all the
//! `DocumentStore` trait exposes.

pub mod firestore;
pub mod memory;
pub mod subscription;
pub mod value;

use async_trait::async_trait;
use tokio::sync::watch;

pub use firestore::{FirestoreStore, TokenSource};
pub use memory::MemoryStore;
pub use subscription::{subscribe, Subscription};
pub use value::{FieldValue, Fields};

/// Errors returned by store backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("401 Unauthorized for {0}. ID token may be invalid -- run 'firechat login'.")]
    Unauthorized(String),
    #[error("could not renew ID token: {0}")]
    TokenRefresh(String),
    #[error("HTTP {status} for {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("document already exists: {0}")]
    AlreadyExists(String),
    #[error("malformed store response: {0}")]
    Decode(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
}

/// A stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Last path segment.
    pub id: String,
    /// Full path relative to the database root, e.g. `chats/abc/messages/xyz`.
    pub path: String,
    pub fields: Fields,
}

impl Document {
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_str)
    }
}

/// Comparison operator for a single-field filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Equal,
    ArrayContains,
}

impl FilterOp {
    /// Operator name used by the REST `structuredQuery`.
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Equal => "EQUAL",
            FilterOp::ArrayContains => "ARRAY_CONTAINS",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub op: FilterOp,
    pub value: FieldValue,
}

impl FieldFilter {
    /// Whether a document satisfies this filter.
    pub fn matches(&self, doc: &Document) -> bool {
        let Some(actual) = doc.get(&self.field) else {
            return false;
        };
        match self.op {
            FilterOp::Equal => *actual == self.value,
            FilterOp::ArrayContains => actual
                .as_array()
                .map_or(false, |items| items.contains(&self.value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Ascending => "ASCENDING",
            Direction::Descending => "DESCENDING",
        }
    }
}

/// A query over the documents of one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Collection path, e.g. `users` or `chats/abc/messages`.
    pub collection: String,
    pub filter: Option<FieldFilter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(path: impl Into<String>) -> Self {
        Self {
            collection: path.into(),
            filter: None,
            order_by: None,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.filter = Some(FieldFilter {
            field: field.to_string(),
            op: FilterOp::Equal,
            value: value.into(),
        });
        self
    }

    pub fn where_array_contains(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.filter = Some(FieldFilter {
            field: field.to_string(),
            op: FilterOp::ArrayContains,
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Point-in-time result of a query.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub docs: Vec<Document>,
}

impl Snapshot {
    pub fn first(&self) -> Option<&Document> {
        self.docs.first()
    }
}

/// Backend-agnostic document database operations.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Run a collection query and return matching documents.
    async fn run_query(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Fetch one document by path.
    async fn get(&self, path: &str) -> Result<Document, StoreError>;

    /// Merge `fields` into the document at `path`, creating it if missing.
    /// Fields not named are left untouched.
    async fn merge(&self, path: &str, fields: Fields) -> Result<(), StoreError>;

    /// Append a new document with a generated id to `collection`.
    /// Returns the new document id.
    async fn add(&self, collection: &str, fields: Fields) -> Result<String, StoreError>;

    /// Revision counter bumped on every write, for stores that can push
    /// changes. `None` means subscribers must poll.
    fn change_feed(&self) -> Option<watch::Receiver<u64>> {
        None
    }
}

/// Split a document path into `(parent collection, document id)`.
pub fn split_document_path(path: &str) -> Result<(&str, &str), StoreError> {
    let trimmed = path.trim_matches('/');
    let segments = trimmed.split('/').count();
    if trimmed.is_empty() || segments % 2 != 0 {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    // Even segment count guarantees at least one '/'.
    let idx = trimmed.rfind('/').unwrap_or(0);
    Ok((&trimmed[..idx], &trimmed[idx + 1..]))
}

/// Validate a collection path (odd number of segments).
pub fn check_collection_path(path: &str) -> Result<&str, StoreError> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() || trimmed.split('/').count() % 2 != 1 {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(trimmed)
}

/// Generate a new document id.
pub fn new_document_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
