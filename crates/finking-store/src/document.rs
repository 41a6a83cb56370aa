//! Documents, writes, and query ordering.

use std::cmp::Ordering;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::path::{DocumentId, DocumentPath};

/// Top-level fields of a document.
pub type Fields = Map<String, Value>;

/// A document snapshot as delivered by the store.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub path: DocumentPath,
    pub fields: Fields,
}

impl Document {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Deserialize the document's fields into a typed body.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(serde_json::from_value(Value::Object(self.fields.clone()))?)
    }
}

// ─────────────────────────────────────────────
// Write
// ─────────────────────────────────────────────

/// Fields to create or merge, plus fields the store stamps with its own clock.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Write {
    fields: Fields,
    server_timestamps: Vec<String>,
}

impl Write {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a plain JSON field.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Set a field from any serializable value.
    pub fn set_serialized<T: Serialize>(
        self,
        field: impl Into<String>,
        value: &T,
    ) -> Result<Self, StoreError> {
        let value = serde_json::to_value(value)?;
        Ok(self.set(field, value))
    }

    /// Ask the store to fill `field` with its own timestamp.
    pub fn server_timestamp(mut self, field: impl Into<String>) -> Self {
        self.server_timestamps.push(field.into());
        self
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.server_timestamps.is_empty()
    }

    /// Final field values, with server timestamps taken from `now`.
    pub fn resolve(self, now: DateTime<Utc>) -> Fields {
        let mut fields = self.fields;
        let stamp = now.to_rfc3339_opts(SecondsFormat::Micros, true);
        for field in self.server_timestamps {
            fields.insert(field, Value::String(stamp.clone()));
        }
        fields
    }
}

// ─────────────────────────────────────────────
// Ordering
// ─────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Sort order for a collection query.
///
/// As with hosted document databases, documents lacking the order field are
/// left out of the result entirely.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        OrderBy {
            field: field.into(),
            direction: Direction::Ascending,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        OrderBy {
            field: field.into(),
            direction: Direction::Descending,
        }
    }
}

/// Type rank used when comparing values of different JSON types.
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(s) if DateTime::parse_from_rfc3339(s).is_ok() => 3,
        Value::String(_) => 4,
        Value::Array(_) => 5,
        Value::Object(_) => 6,
    }
}

/// Total order over field values. RFC 3339 strings compare as instants.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let (ra, rb) = (type_rank(a), type_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => {
            match (DateTime::parse_from_rfc3339(x), DateTime::parse_from_rfc3339(y)) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        (Value::Array(x), Value::Array(y)) => x.len().cmp(&y.len()),
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_write_resolves_server_timestamps() {
        let now = DateTime::parse_from_rfc3339("2024-07-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let fields = Write::new()
            .set("title", "New Chat")
            .set("messages", json!([]))
            .server_timestamp("createdAt")
            .resolve(now);

        assert_eq!(fields["title"], "New Chat");
        assert_eq!(fields["messages"], json!([]));
        assert_eq!(fields["createdAt"], "2024-07-01T10:00:00.000000Z");
    }

    #[test]
    fn test_write_is_empty() {
        assert!(Write::new().is_empty());
        assert!(!Write::new().server_timestamp("t").is_empty());
    }

    #[test]
    fn test_set_serialized() {
        let write = Write::new().set_serialized("tags", &vec!["a", "b"]).unwrap();
        assert_eq!(write.fields()["tags"], json!(["a", "b"]));
    }

    #[test]
    fn test_compare_timestamps_with_mixed_precision() {
        let a = json!("2024-07-01T10:00:00.5Z");
        let b = json!("2024-07-01T10:00:00.123456Z");
        assert_eq!(compare_values(&a, &b), Ordering::Greater);
    }

    #[test]
    fn test_compare_numbers_and_strings() {
        assert_eq!(compare_values(&json!(1), &json!(2.5)), Ordering::Less);
        assert_eq!(compare_values(&json!("b"), &json!("a")), Ordering::Greater);
        assert_eq!(compare_values(&json!(10), &json!("a")), Ordering::Less);
    }

    #[test]
    fn test_document_decode() {
        #[derive(serde::Deserialize)]
        struct Body {
            title: String,
        }
        let doc = Document {
            id: DocumentId::new("d1"),
            path: DocumentPath::parse("c/d1").unwrap(),
            fields: json!({"title": "hello"}).as_object().unwrap().clone(),
        };
        let body: Body = doc.decode().unwrap();
        assert_eq!(body.title, "hello");
        assert!(doc.get("missing").is_none());
    }
}
