//! Document store trait — the abstraction the chat core is written against.
//!
//! Any backend (hosted document database, local file, in-memory) implements
//! this trait. `MemoryStore` in `memory.rs` is the bundled implementation.

use async_trait::async_trait;

use crate::document::{Document, OrderBy, Write};
use crate::error::StoreError;
use crate::path::{CollectionPath, DocumentId, DocumentPath};
use crate::subscription::Subscription;

/// A push-based document database.
///
/// Subscriptions deliver the current state right away and then a fresh
/// snapshot after every change, until cancelled. A failed subscribe returns
/// `Err`; it is never reported through the stream.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Watch every document of a collection, ordered by `order`.
    async fn subscribe_collection(
        &self,
        path: &CollectionPath,
        order: OrderBy,
    ) -> Result<Subscription<Vec<Document>>, StoreError>;

    /// Watch one document. `None` snapshots mean the document does not exist.
    async fn subscribe_document(
        &self,
        path: &DocumentPath,
    ) -> Result<Subscription<Option<Document>>, StoreError>;

    /// Create a document with a store-assigned id.
    async fn create_document(
        &self,
        collection: &CollectionPath,
        write: Write,
    ) -> Result<DocumentId, StoreError>;

    /// Shallow-merge `write` into a document. Fields not named are kept;
    /// a missing document is created.
    async fn merge_write(&self, path: &DocumentPath, write: Write) -> Result<(), StoreError>;

    /// Display name for logging.
    fn display_name(&self) -> &str;
}
