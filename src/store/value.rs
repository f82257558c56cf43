//! Firestore typed values and their REST JSON encoding.
//!
//! The REST API wraps every field in a single-key object naming its type,
//! e.g. `{"stringValue": "hi"}` or `{"timestampValue": "2024-01-15T10:30:00Z"}`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use super::StoreError;

/// Document fields keyed by field name.
pub type Fields = BTreeMap<String, FieldValue>;

/// A single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Array(Vec<FieldValue>),
    Map(Fields),
    /// Write-only sentinel: the store substitutes its own clock at commit time.
    ServerTimestamp,
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Ordering used by `orderBy`. Values of different types order by type
    /// rank (null < bool < number < timestamp < string < array < map).
    pub fn cmp_for_order(&self, other: &FieldValue) -> std::cmp::Ordering {
        use std::cmp::Ordering;

        fn rank(v: &FieldValue) -> u8 {
            match v {
                FieldValue::Null => 0,
                FieldValue::Bool(_) => 1,
                FieldValue::Integer(_) | FieldValue::Double(_) => 2,
                FieldValue::Timestamp(_) | FieldValue::ServerTimestamp => 3,
                FieldValue::String(_) => 4,
                FieldValue::Array(_) => 5,
                FieldValue::Map(_) => 6,
            }
        }

        match (self, other) {
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a.cmp(b),
            (FieldValue::Integer(a), FieldValue::Integer(b)) => a.cmp(b),
            (FieldValue::Integer(a), FieldValue::Double(b)) => {
                (*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (FieldValue::Double(a), FieldValue::Integer(b)) => {
                a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal)
            }
            (FieldValue::Double(a), FieldValue::Double(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => a.cmp(b),
            (FieldValue::String(a), FieldValue::String(b)) => a.cmp(b),
            _ => rank(self).cmp(&rank(other)),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<Option<String>> for FieldValue {
    fn from(s: Option<String>) -> Self {
        s.map(FieldValue::String).unwrap_or(FieldValue::Null)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(ts: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(ts)
    }
}

/// Encode a value as Firestore REST JSON.
///
/// `ServerTimestamp` has no value encoding; callers must lift it into a field
/// transform (see [`split_transforms`]) before encoding.
pub fn encode_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null | FieldValue::ServerTimestamp => json!({ "nullValue": null }),
        FieldValue::Bool(b) => json!({ "booleanValue": b }),
        // int64 travels as a decimal string
        FieldValue::Integer(i) => json!({ "integerValue": i.to_string() }),
        FieldValue::Double(d) => json!({ "doubleValue": d }),
        FieldValue::String(s) => json!({ "stringValue": s }),
        FieldValue::Timestamp(ts) => json!({ "timestampValue": ts.to_rfc3339() }),
        FieldValue::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        FieldValue::Map(fields) => json!({ "mapValue": { "fields": encode_fields(fields) } }),
    }
}

/// Encode a field map as the `fields` object of a REST document.
pub fn encode_fields(fields: &Fields) -> Value {
    let map: Map<String, Value> = fields
        .iter()
        .map(|(k, v)| (k.clone(), encode_value(v)))
        .collect();
    Value::Object(map)
}

/// Decode a Firestore REST JSON value.
pub fn decode_value(value: &Value) -> Result<FieldValue, StoreError> {
    let obj = value
        .as_object()
        .ok_or_else(|| StoreError::Decode(format!("expected typed value object, got {}", value)))?;

    let (kind, inner) = obj
        .iter()
        .next()
        .ok_or_else(|| StoreError::Decode("empty typed value".to_string()))?;

    match kind.as_str() {
        "nullValue" => Ok(FieldValue::Null),
        "booleanValue" => inner
            .as_bool()
            .map(FieldValue::Bool)
            .ok_or_else(|| StoreError::Decode(format!("bad booleanValue: {}", inner))),
        "integerValue" => {
            let parsed = match inner {
                Value::String(s) => s.parse::<i64>().ok(),
                Value::Number(n) => n.as_i64(),
                _ => None,
            };
            parsed
                .map(FieldValue::Integer)
                .ok_or_else(|| StoreError::Decode(format!("bad integerValue: {}", inner)))
        }
        "doubleValue" => inner
            .as_f64()
            .map(FieldValue::Double)
            .ok_or_else(|| StoreError::Decode(format!("bad doubleValue: {}", inner))),
        "stringValue" | "referenceValue" => inner
            .as_str()
            .map(FieldValue::from)
            .ok_or_else(|| StoreError::Decode(format!("bad {}: {}", kind, inner))),
        "timestampValue" => {
            let raw = inner
                .as_str()
                .ok_or_else(|| StoreError::Decode(format!("bad timestampValue: {}", inner)))?;
            DateTime::parse_from_rfc3339(raw)
                .map(|ts| FieldValue::Timestamp(ts.with_timezone(&Utc)))
                .map_err(|e| StoreError::Decode(format!("bad timestampValue {}: {}", raw, e)))
        }
        "arrayValue" => {
            let items = match inner.get("values").and_then(Value::as_array) {
                Some(values) => values.iter().map(decode_value).collect::<Result<_, _>>()?,
                // An empty array is sent as `{"arrayValue": {}}`.
                None => Vec::new(),
            };
            Ok(FieldValue::Array(items))
        }
        "mapValue" => {
            let fields = match inner.get("fields") {
                Some(fields) => decode_fields(fields)?,
                None => Fields::new(),
            };
            Ok(FieldValue::Map(fields))
        }
        other => Err(StoreError::Decode(format!("unsupported value type {}", other))),
    }
}

/// Decode the `fields` object of a REST document.
pub fn decode_fields(value: &Value) -> Result<Fields, StoreError> {
    let obj = value
        .as_object()
        .ok_or_else(|| StoreError::Decode("document fields is not an object".to_string()))?;
    obj.iter()
        .map(|(k, v)| Ok((k.clone(), decode_value(v)?)))
        .collect()
}

/// Separate `ServerTimestamp` sentinels from plain fields.
///
/// Returns the plain fields and the names of fields to set to request time.
pub fn split_transforms(fields: &Fields) -> (Fields, Vec<String>) {
    let mut plain = Fields::new();
    let mut server_time = Vec::new();
    for (name, value) in fields {
        if *value == FieldValue::ServerTimestamp {
            server_time.push(name.clone());
        } else {
            plain.insert(name.clone(), value.clone());
        }
    }
    (plain, server_time)
}
