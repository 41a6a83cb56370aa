//! Document store layer for Finking.
//!
//! # Architecture
//!
//! - [`traits::DocumentStore`] — trait the chat core is written against
//! - [`path`] — collection/document addressing with validation
//! - [`document`] — snapshots, merge writes, and query ordering
//! - [`subscription`] — push streams with idempotent cancellation
//! - [`memory::MemoryStore`] — in-memory store, optionally file-backed

pub mod document;
pub mod error;
pub mod memory;
pub mod path;
pub mod subscription;
pub mod traits;

// Re-export main types for convenience
pub use document::{Direction, Document, Fields, OrderBy, Write};
pub use error::StoreError;
pub use memory::MemoryStore;
pub use path::{CollectionPath, DocumentId, DocumentPath};
pub use subscription::{Subscription, SubscriptionHandle};
pub use traits::DocumentStore;
