//! Firestore REST (v1) backend.
//!
//! Queries go through `:runQuery` with a `structuredQuery`; writes go through
//! `documents:commit` so server timestamps can be requested with field
//! transforms. Authentication is a Firebase ID token sent as a bearer token,
//! taken from a `TokenSource` so long-lived stores survive token expiry.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::value::{decode_fields, encode_fields, encode_value, split_transforms};
use super::{
    check_collection_path, new_document_id, split_document_path, Document, DocumentStore,
    Fields, Query, StoreError,
};

pub const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com/v1";

/// Bearer tokens for Firestore requests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Token for the next request; `None` sends the request unauthenticated.
    async fn token(&self) -> Result<Option<String>, StoreError>;

    /// Replacement for a token the server rejected, or `None` when no
    /// better token can be obtained.
    async fn refresh(&self, rejected: &str) -> Result<Option<String>, StoreError>;
}

/// A fixed token that is never renewed.
pub struct StaticToken(pub Option<String>);

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<Option<String>, StoreError> {
        Ok(self.0.clone())
    }

    async fn refresh(&self, _rejected: &str) -> Result<Option<String>, StoreError> {
        Ok(None)
    }
}

pub struct FirestoreStore {
    http: reqwest::Client,
    base_url: String,
    project_id: String,
    tokens: Arc<dyn TokenSource>,
}

impl FirestoreStore {
    /// Build a store for `project_id` with a fixed ID token. Without one
    /// requests are unauthenticated (only useful against the local emulator).
    pub fn new(base_url: Option<&str>, project_id: &str, id_token: Option<String>) -> Self {
        Self::with_tokens(base_url, project_id, Arc::new(StaticToken(id_token)))
    }

    /// Build a store whose requests take their token from `tokens`. A 401 is
    /// retried once with a refreshed token.
    pub fn with_tokens(
        base_url: Option<&str>,
        project_id: &str,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            project_id: project_id.to_string(),
            tokens,
        }
    }

    /// `projects/{p}/databases/(default)`
    fn database(&self) -> String {
        format!("projects/{}/databases/(default)", self.project_id)
    }

    /// Full resource name of a document path.
    fn document_name(&self, path: &str) -> String {
        format!("{}/documents/{}", self.database(), path.trim_matches('/'))
    }

    /// Path relative to the database root, from a full resource name.
    fn relative_path<'a>(&self, name: &'a str) -> &'a str {
        name.split_once("/documents/").map_or(name, |(_, rest)| rest)
    }

    fn decode_document(&self, raw: &Value) -> Result<Document, StoreError> {
        let name = raw
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::Decode("document without name".to_string()))?;
        let path = self.relative_path(name).to_string();
        let id = path.rsplit('/').next().unwrap_or_default().to_string();
        let fields = match raw.get("fields") {
            Some(fields) => decode_fields(fields)?,
            None => Fields::new(),
        };
        Ok(Document { id, path, fields })
    }

    async fn post(&self, url: &str, body: &Value) -> Result<reqwest::Response, StoreError> {
        tracing::debug!("Firestore POST {}", url);
        self.send(url, || self.http.post(url).json(body)).await
    }

    async fn get_url(&self, url: &str) -> Result<reqwest::Response, StoreError> {
        tracing::debug!("Firestore GET {}", url);
        self.send(url, || self.http.get(url)).await
    }

    /// Send with the current token; on 401 renew it and send once more.
    async fn send(
        &self,
        url: &str,
        request: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, StoreError> {
        let token = self.tokens.token().await?;
        let result = send_once(request(), url, token.as_deref()).await;

        match (result, token) {
            (Err(StoreError::Unauthorized(_)), Some(rejected)) => {
                match self.tokens.refresh(&rejected).await? {
                    Some(fresh) => {
                        tracing::info!("ID token rejected, retrying with a renewed one");
                        send_once(request(), url, Some(&fresh)).await
                    }
                    None => Err(StoreError::Unauthorized(url.to_string())),
                }
            }
            (result, _) => result,
        }
    }

    async fn commit(&self, write: Value) -> Result<(), StoreError> {
        let url = format!("{}/{}/documents:commit", self.base_url, self.database());
        self.post(&url, &json!({ "writes": [write] })).await?;
        Ok(())
    }
}

async fn send_once(
    req: reqwest::RequestBuilder,
    url: &str,
    token: Option<&str>,
) -> Result<reqwest::Response, StoreError> {
    let req = match token {
        Some(token) => req.bearer_auth(token),
        None => req,
    };
    let resp = req.send().await.map_err(|source| StoreError::Transport {
        url: url.to_string(),
        source,
    })?;
    check_response(resp, url).await
}

/// Map HTTP failures to store errors.
async fn check_response(resp: reqwest::Response, url: &str) -> Result<reqwest::Response, StoreError> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(StoreError::Unauthorized(url.to_string()));
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(StoreError::NotFound(url.to_string()));
    }
    if status == reqwest::StatusCode::CONFLICT {
        return Err(StoreError::AlreadyExists(url.to_string()));
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(StoreError::Status {
            status: status.as_u16(),
            url: url.to_string(),
            body,
        });
    }
    Ok(resp)
}

/// Build the `structuredQuery` body for a query whose collection is the last
/// segment of `query.collection`.
pub fn structured_query(query: &Query, collection_id: &str) -> Value {
    let mut sq = json!({ "from": [{ "collectionId": collection_id }] });

    if let Some(ref filter) = query.filter {
        sq["where"] = json!({
            "fieldFilter": {
                "field": { "fieldPath": quote_field_path(&filter.field) },
                "op": filter.op.as_str(),
                "value": encode_value(&filter.value),
            }
        });
    }
    if let Some((ref field, direction)) = query.order_by {
        sq["orderBy"] = json!([{
            "field": { "fieldPath": quote_field_path(field) },
            "direction": direction.as_str(),
        }]);
    }
    if let Some(limit) = query.limit {
        sq["limit"] = json!(limit);
    }

    json!({ "structuredQuery": sq })
}

/// Quote a field name for use in a field path when it is not a plain
/// identifier.
pub fn quote_field_path(field: &str) -> String {
    let mut chars = field.chars();
    let simple = chars
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple {
        field.to_string()
    } else {
        format!("`{}`", field.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

/// A commit `write` for `name` with plain fields plus server-time transforms.
fn build_write(name: String, fields: &Fields) -> Value {
    let (plain, server_time) = split_transforms(fields);
    let mut write = json!({
        "update": { "name": name, "fields": encode_fields(&plain) },
    });
    if !server_time.is_empty() {
        let transforms: Vec<Value> = server_time
            .iter()
            .map(|f| json!({ "fieldPath": quote_field_path(f), "setToServerValue": "REQUEST_TIME" }))
            .collect();
        write["updateTransforms"] = Value::Array(transforms);
    }
    write
}

/// Merge write: only the named plain fields are replaced; the document is
/// created if it does not exist.
pub fn merge_write(name: String, fields: &Fields) -> Value {
    let (plain, _) = split_transforms(fields);
    let mask: Vec<String> = plain.keys().map(|k| quote_field_path(k)).collect();
    let mut write = build_write(name, fields);
    write["updateMask"] = json!({ "fieldPaths": mask });
    write
}

/// Create write: fails if the document already exists.
pub fn create_write(name: String, fields: &Fields) -> Value {
    let mut write = build_write(name, fields);
    write["currentDocument"] = json!({ "exists": false });
    write
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn run_query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let collection = check_collection_path(&query.collection)?;
        let (parent, collection_id) = match collection.rsplit_once('/') {
            Some((parent, id)) => (Some(parent), id),
            None => (None, collection),
        };

        let url = match parent {
            Some(parent) => format!(
                "{}/{}/documents/{}:runQuery",
                self.base_url,
                self.database(),
                parent
            ),
            None => format!("{}/{}/documents:runQuery", self.base_url, self.database()),
        };

        let body = structured_query(query, collection_id);
        let resp = self.post(&url, &body).await?;
        let rows: Vec<Value> = resp
            .json()
            .await
            .map_err(|e| StoreError::Decode(format!("runQuery response: {}", e)))?;

        // Each row carries `readTime`; only some carry a `document`.
        rows.iter()
            .filter_map(|row| row.get("document"))
            .map(|doc| self.decode_document(doc))
            .collect()
    }

    async fn get(&self, path: &str) -> Result<Document, StoreError> {
        split_document_path(path)?;
        let url = format!("{}/{}", self.base_url, self.document_name(path));
        let resp = self.get_url(&url).await.map_err(|e| match e {
            StoreError::NotFound(_) => StoreError::NotFound(path.to_string()),
            other => other,
        })?;
        let raw: Value = resp
            .json()
            .await
            .map_err(|e| StoreError::Decode(format!("document {}: {}", path, e)))?;
        self.decode_document(&raw)
    }

    async fn merge(&self, path: &str, fields: Fields) -> Result<(), StoreError> {
        split_document_path(path)?;
        self.commit(merge_write(self.document_name(path), &fields))
            .await
    }

    async fn add(&self, collection: &str, fields: Fields) -> Result<String, StoreError> {
        let collection = check_collection_path(collection)?;
        let id = new_document_id();
        let name = self.document_name(&format!("{}/{}", collection, id));
        self.commit(create_write(name, &fields)).await?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::{Json, Router};

    use crate::store::{subscribe, Direction, FieldValue};

    fn store() -> FirestoreStore {
        FirestoreStore::new(None, "demo-chat", Some("tok".into()))
    }

    #[test]
    fn test_document_name_and_relative_path() {
        let s = store();
        let name = s.document_name("chats/c1/messages/m1");
        assert_eq!(
            name,
            "projects/demo-chat/databases/(default)/documents/chats/c1/messages/m1"
        );
        assert_eq!(s.relative_path(&name), "chats/c1/messages/m1");
    }

    #[test]
    fn test_decode_run_query_document() {
        let raw = json!({
            "name": "projects/demo-chat/databases/(default)/documents/users/u1",
            "fields": {
                "email": { "stringValue": "bob@example.com" },
                "lastSeen": { "timestampValue": "2024-01-15T10:30:00Z" }
            },
            "createTime": "2024-01-01T00:00:00Z",
            "updateTime": "2024-01-15T10:30:00Z"
        });
        let doc = store().decode_document(&raw).unwrap();
        assert_eq!(doc.id, "u1");
        assert_eq!(doc.path, "users/u1");
        assert_eq!(doc.get_str("email"), Some("bob@example.com"));
    }

    #[test]
    fn test_structured_query_messages() {
        let query = Query::collection("chats/c1/messages").order_by("timestamp", Direction::Ascending);
        let body = structured_query(&query, "messages");
        assert_eq!(
            body,
            json!({ "structuredQuery": {
                "from": [{ "collectionId": "messages" }],
                "orderBy": [{ "field": { "fieldPath": "timestamp" }, "direction": "ASCENDING" }]
            } })
        );
    }

    #[test]
    fn test_structured_query_email_filter() {
        let query = Query::collection("users").where_eq("email", "bob@example.com").limit(1);
        let body = structured_query(&query, "users");
        let sq = &body["structuredQuery"];
        assert_eq!(sq["where"]["fieldFilter"]["op"], "EQUAL");
        assert_eq!(
            sq["where"]["fieldFilter"]["value"],
            json!({ "stringValue": "bob@example.com" })
        );
        assert_eq!(sq["limit"], 1);
    }

    #[test]
    fn test_merge_write_presence_only_transform() {
        let mut fields = Fields::new();
        fields.insert("lastSeen".into(), FieldValue::ServerTimestamp);
        let write = merge_write("projects/p/databases/(default)/documents/users/u1".into(), &fields);

        assert_eq!(write["updateMask"], json!({ "fieldPaths": [] }));
        assert_eq!(write["update"]["fields"], json!({}));
        assert_eq!(
            write["updateTransforms"],
            json!([{ "fieldPath": "lastSeen", "setToServerValue": "REQUEST_TIME" }])
        );
    }

    #[test]
    fn test_create_write_message() {
        let mut fields = Fields::new();
        fields.insert("timestamp".into(), FieldValue::ServerTimestamp);
        fields.insert("message".into(), "hi".into());
        fields.insert("photoURL".into(), FieldValue::Null);
        let write = create_write("n".into(), &fields);

        assert_eq!(write["currentDocument"], json!({ "exists": false }));
        assert_eq!(write["update"]["fields"]["message"], json!({ "stringValue": "hi" }));
        assert!(write["update"]["fields"].get("timestamp").is_none());
        assert!(write.get("updateMask").is_none());
    }

    /// A token source that hands out `stale` until asked to refresh.
    struct Rotating {
        current: std::sync::Mutex<String>,
        refreshes: AtomicUsize,
    }

    #[async_trait]
    impl TokenSource for Rotating {
        async fn token(&self) -> Result<Option<String>, StoreError> {
            Ok(Some(self.current.lock().unwrap().clone()))
        }

        async fn refresh(&self, _rejected: &str) -> Result<Option<String>, StoreError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            *self.current.lock().unwrap() = "fresh".into();
            Ok(Some("fresh".into()))
        }
    }

    /// Firestore stand-in that only accepts `Bearer fresh`. Returns the base
    /// URL and a request counter.
    async fn fake_firestore() -> (String, Arc<AtomicUsize>) {
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = requests.clone();
        let app = Router::new().fallback(move |headers: HeaderMap| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                let authorized = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    == Some("Bearer fresh");
                if !authorized {
                    return StatusCode::UNAUTHORIZED.into_response();
                }
                Json(json!([{
                    "document": {
                        "name": "projects/demo-chat/databases/(default)/documents/users/u-bob",
                        "fields": { "email": { "stringValue": "bob@x.com" } }
                    },
                    "readTime": "2024-01-15T10:30:00Z"
                }]))
                .into_response()
            }
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/v1", addr), requests)
    }

    #[tokio::test]
    async fn test_subscription_survives_rejected_token() {
        let (base, requests) = fake_firestore().await;
        let tokens = Arc::new(Rotating {
            current: std::sync::Mutex::new("stale".into()),
            refreshes: AtomicUsize::new(0),
        });
        let store = FirestoreStore::with_tokens(Some(&base), "demo-chat", tokens.clone());

        let mut sub = subscribe(
            Arc::new(store),
            Query::collection("users").where_eq("email", "bob@x.com"),
            Duration::from_secs(60),
        );
        tokio::time::timeout(Duration::from_secs(5), sub.changed())
            .await
            .expect("timed out waiting for snapshot");

        let snapshot = sub.latest().expect("snapshot published");
        assert_eq!(snapshot.docs.len(), 1);
        assert_eq!(snapshot.docs[0].get_str("email"), Some("bob@x.com"));
        assert_eq!(tokens.refreshes.load(Ordering::SeqCst), 1);
        // One rejected request, one retry.
        assert_eq!(requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fixed_token_is_not_retried() {
        let (base, requests) = fake_firestore().await;
        let store = FirestoreStore::new(Some(&base), "demo-chat", Some("stale".into()));

        let err = store.run_query(&Query::collection("users")).await.unwrap_err();
        assert!(matches!(err, StoreError::Unauthorized(_)));
        assert_eq!(requests.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_quote_field_path() {
        assert_eq!(quote_field_path("photoURL"), "photoURL");
        assert_eq!(quote_field_path("_x1"), "_x1");
        assert_eq!(quote_field_path("last-seen"), "`last-seen`");
        assert_eq!(quote_field_path("1st"), "`1st`");
    }
}
