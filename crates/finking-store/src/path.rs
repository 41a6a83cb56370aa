//! Collection and document addressing.
//!
//! Paths alternate collection and document segments:
//! `artifacts/{appId}/users/{userId}/chats` is a collection (odd segment
//! count), `artifacts/{appId}/users/{userId}/chats/{sessionId}` a document
//! (even segment count).

use std::fmt;

use crate::error::StoreError;

/// Store-assigned document identifier (the last path segment).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        DocumentId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn validate_segments(segments: &[String], raw: &str) -> Result<(), StoreError> {
    if segments.is_empty()
        || segments
            .iter()
            .any(|s| s.is_empty() || s.contains('/') || s.trim() != s)
    {
        return Err(StoreError::InvalidPath(raw.to_string()));
    }
    Ok(())
}

fn collect_segments<I, S>(segments: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    segments.into_iter().map(|s| s.as_ref().to_string()).collect()
}

// ─────────────────────────────────────────────
// CollectionPath
// ─────────────────────────────────────────────

/// Path to a collection of documents.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CollectionPath {
    segments: Vec<String>,
}

impl CollectionPath {
    pub fn new<I, S>(segments: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let segments = collect_segments(segments);
        let raw = segments.join("/");
        validate_segments(&segments, &raw)?;
        if segments.len() % 2 == 0 {
            return Err(StoreError::InvalidPath(raw));
        }
        Ok(CollectionPath { segments })
    }

    /// Parse a slash-separated path.
    pub fn parse(path: &str) -> Result<Self, StoreError> {
        let segments: Vec<String> = path.split('/').map(str::to_string).collect();
        validate_segments(&segments, path)?;
        Self::new(segments)
    }

    /// Address a document in this collection.
    pub fn doc(&self, id: &str) -> Result<DocumentPath, StoreError> {
        let mut segments = self.segments.clone();
        segments.push(id.to_string());
        DocumentPath::new(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

// ─────────────────────────────────────────────
// DocumentPath
// ─────────────────────────────────────────────

/// Path to a single document.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DocumentPath {
    segments: Vec<String>,
}

impl DocumentPath {
    pub fn new<I, S>(segments: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let segments = collect_segments(segments);
        let raw = segments.join("/");
        validate_segments(&segments, &raw)?;
        if segments.len() % 2 != 0 {
            return Err(StoreError::InvalidPath(raw));
        }
        Ok(DocumentPath { segments })
    }

    /// Parse a slash-separated path.
    pub fn parse(path: &str) -> Result<Self, StoreError> {
        let segments: Vec<String> = path.split('/').map(str::to_string).collect();
        validate_segments(&segments, path)?;
        Self::new(segments)
    }

    /// The document's id (last segment).
    pub fn id(&self) -> DocumentId {
        // Validated non-empty with an even count, so a last segment exists.
        DocumentId::new(self.segments.last().cloned().unwrap_or_default())
    }

    /// The collection holding this document.
    pub fn collection(&self) -> CollectionPath {
        CollectionPath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        }
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_path_parse() {
        let path = CollectionPath::parse("artifacts/app/users/u1/chats").unwrap();
        assert_eq!(path.segments().len(), 5);
        assert_eq!(path.to_string(), "artifacts/app/users/u1/chats");
    }

    #[test]
    fn test_collection_path_rejects_even_count() {
        assert!(CollectionPath::parse("artifacts/app").is_err());
    }

    #[test]
    fn test_rejects_empty_segments() {
        assert!(CollectionPath::parse("artifacts//users").is_err());
        assert!(CollectionPath::parse("").is_err());
        assert!(DocumentPath::parse("chats/").is_err());
    }

    #[test]
    fn test_rejects_slash_inside_segment() {
        assert!(CollectionPath::new(["artifacts", "a/b", "users"]).is_err());
    }

    #[test]
    fn test_doc_and_back() {
        let chats = CollectionPath::parse("artifacts/app/users/u1/chats").unwrap();
        let doc = chats.doc("s1").unwrap();
        assert_eq!(doc.to_string(), "artifacts/app/users/u1/chats/s1");
        assert_eq!(doc.id().as_str(), "s1");
        assert_eq!(doc.collection(), chats);
    }

    #[test]
    fn test_doc_with_bad_id() {
        let chats = CollectionPath::parse("chats").unwrap();
        assert!(chats.doc("").is_err());
        assert!(chats.doc("a/b").is_err());
    }

    #[test]
    fn test_document_path_rejects_odd_count() {
        assert!(DocumentPath::parse("artifacts/app/users").is_err());
    }
}
