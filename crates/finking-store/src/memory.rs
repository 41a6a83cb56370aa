//! In-process document store with push subscriptions.
//!
//! Documents live in a `BTreeMap` keyed by their full path. Every mutation
//! pushes fresh snapshots to the matching subscribers over unbounded
//! channels, so writers never wait on slow readers.
//!
//! With [`MemoryStore::open`] the documents are also written to a JSON file
//! after every mutation:
//!
//! ```json
//! { "artifacts/app/users/u1/chats/3f2a…": { "seq": 0, "fields": { "title": "…" } } }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::document::{compare_values, Direction, Document, Fields, OrderBy, Write};
use crate::error::StoreError;
use crate::path::{CollectionPath, DocumentId, DocumentPath};
use crate::subscription::{Subscription, SubscriptionHandle};
use crate::traits::DocumentStore;

// ─────────────────────────────────────────────
// Internal state
// ─────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredDoc {
    /// Insertion sequence; breaks ordering ties.
    seq: u64,
    fields: Fields,
}

struct CollectionListener {
    path: CollectionPath,
    order: OrderBy,
    tx: mpsc::UnboundedSender<Vec<Document>>,
}

struct DocumentListener {
    path: DocumentPath,
    tx: mpsc::UnboundedSender<Option<Document>>,
}

#[derive(Default)]
struct Inner {
    docs: BTreeMap<String, StoredDoc>,
    collection_listeners: HashMap<u64, CollectionListener>,
    document_listeners: HashMap<u64, DocumentListener>,
    next_subscription_id: u64,
    next_seq: u64,
    unavailable: bool,
    failing_writes: u32,
    write_count: u64,
    write_latency: Option<Duration>,
    file: Option<PathBuf>,
}

impl Inner {
    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::unavailable("store is offline"));
        }
        Ok(())
    }

    /// Count a write attempt and decide whether it is rejected.
    fn admit_write(&mut self) -> Result<(), StoreError> {
        self.write_count += 1;
        self.check_available()?;
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            return Err(StoreError::unavailable("write rejected"));
        }
        Ok(())
    }

    fn document(&self, path: &DocumentPath) -> Option<Document> {
        self.docs.get(&path.to_string()).map(|stored| Document {
            id: path.id(),
            path: path.clone(),
            fields: stored.fields.clone(),
        })
    }

    fn query(&self, collection: &CollectionPath, order: &OrderBy) -> Vec<Document> {
        let mut hits: Vec<(&StoredDoc, DocumentPath)> = self
            .docs
            .iter()
            .filter_map(|(key, stored)| {
                let path = DocumentPath::parse(key).ok()?;
                (path.collection() == *collection).then_some((stored, path))
            })
            .filter(|(stored, _)| stored.fields.contains_key(&order.field))
            .collect();

        hits.sort_by(|(a, _), (b, _)| {
            let ord = match (a.fields.get(&order.field), b.fields.get(&order.field)) {
                (Some(x), Some(y)) => compare_values(x, y),
                _ => std::cmp::Ordering::Equal,
            };
            ord.then(a.seq.cmp(&b.seq))
        });
        if order.direction == Direction::Descending {
            hits.reverse();
        }

        hits.into_iter()
            .map(|(stored, path)| Document {
                id: path.id(),
                path,
                fields: stored.fields.clone(),
            })
            .collect()
    }

    fn allocate_subscription_id(&mut self) -> u64 {
        self.next_subscription_id += 1;
        self.next_subscription_id
    }

    /// Push snapshots to everyone watching `changed` or its collection.
    fn notify(&mut self, changed: &DocumentPath) {
        let collection = changed.collection();

        let snapshots: Vec<(u64, Vec<Document>)> = self
            .collection_listeners
            .iter()
            .filter(|(_, l)| l.path == collection)
            .map(|(id, l)| (*id, self.query(&l.path, &l.order)))
            .collect();

        let mut dead = Vec::new();
        for (id, snapshot) in snapshots {
            if let Some(listener) = self.collection_listeners.get(&id) {
                if listener.tx.send(snapshot).is_err() {
                    dead.push(id);
                }
            }
        }

        let doc = self.document(changed);
        for (id, listener) in &self.document_listeners {
            if listener.path == *changed && listener.tx.send(doc.clone()).is_err() {
                dead.push(*id);
            }
        }

        for id in dead {
            self.collection_listeners.remove(&id);
            self.document_listeners.remove(&id);
            debug!(subscription = id, "dropped closed subscriber");
        }
    }

    fn persist(&self) {
        let Some(path) = &self.file else {
            return;
        };
        if let Err(e) = write_file(path, &self.docs) {
            warn!(path = %path.display(), error = %e, "failed to persist store");
        }
    }
}

fn write_file(path: &Path, docs: &BTreeMap<String, StoredDoc>) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(docs)?;
    std::fs::write(path, json)?;
    Ok(())
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─────────────────────────────────────────────
// MemoryStore
// ─────────────────────────────────────────────

/// Document store kept in memory, optionally mirrored to a JSON file.
///
/// Cloning shares the same underlying data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Create an empty, purely in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a file-backed store, loading existing documents if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let mut inner = Inner::default();

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if !content.trim().is_empty() {
                let docs: BTreeMap<String, StoredDoc> = serde_json::from_str(&content)?;
                for key in docs.keys() {
                    DocumentPath::parse(key)?;
                }
                inner.next_seq = docs.values().map(|d| d.seq + 1).max().unwrap_or(0);
                inner.docs = docs;
            }
            info!(
                path = %path.display(),
                documents = inner.docs.len(),
                "loaded document store"
            );
        } else {
            debug!(path = %path.display(), "no store file, starting empty");
        }

        inner.file = Some(path);
        Ok(Self {
            inner: Arc::new(Mutex::new(inner)),
        })
    }

    /// Take the store offline (`false`) or back online (`true`).
    /// While offline every call fails with `StoreError::Unavailable`.
    pub fn set_available(&self, available: bool) {
        lock(&self.inner).unavailable = !available;
    }

    /// Reject the next `n` create/merge-write calls.
    pub fn fail_next_writes(&self, n: u32) {
        lock(&self.inner).failing_writes = n;
    }

    /// Delay applied to every create/merge-write before it takes effect.
    pub fn set_write_latency(&self, latency: Option<Duration>) {
        lock(&self.inner).write_latency = latency;
    }

    /// Number of create/merge-write calls received, failed ones included.
    pub fn write_count(&self) -> u64 {
        lock(&self.inner).write_count
    }

    /// Number of live subscriptions of either kind.
    pub fn subscriber_count(&self) -> usize {
        let inner = lock(&self.inner);
        inner.collection_listeners.len() + inner.document_listeners.len()
    }

    pub fn document_count(&self) -> usize {
        lock(&self.inner).docs.len()
    }

    /// Read a document directly, bypassing subscriptions.
    pub fn get(&self, path: &DocumentPath) -> Option<Document> {
        lock(&self.inner).document(path)
    }

    /// Remove a document. Returns `true` if it existed.
    pub fn delete_document(&self, path: &DocumentPath) -> bool {
        let mut inner = lock(&self.inner);
        let existed = inner.docs.remove(&path.to_string()).is_some();
        if existed {
            inner.notify(path);
            inner.persist();
            info!(path = %path, "deleted document");
        }
        existed
    }

    fn cancel_fn(&self) -> impl Fn(u64) + Send + Sync + 'static {
        let weak = Arc::downgrade(&self.inner);
        move |id| {
            if let Some(inner) = weak.upgrade() {
                let mut inner = lock(&inner);
                inner.collection_listeners.remove(&id);
                inner.document_listeners.remove(&id);
                debug!(subscription = id, "subscription cancelled");
            }
        }
    }

    async fn simulate_latency(&self) {
        let latency = lock(&self.inner).write_latency;
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn subscribe_collection(
        &self,
        path: &CollectionPath,
        order: OrderBy,
    ) -> Result<Subscription<Vec<Document>>, StoreError> {
        let mut inner = lock(&self.inner);
        inner.check_available()?;

        let id = inner.allocate_subscription_id();
        let (tx, rx) = mpsc::unbounded_channel();
        // Initial snapshot; the receiver is alive, so this cannot fail.
        let _ = tx.send(inner.query(path, &order));
        inner.collection_listeners.insert(
            id,
            CollectionListener {
                path: path.clone(),
                order,
                tx,
            },
        );
        debug!(subscription = id, collection = %path, "collection subscription opened");
        drop(inner);

        Ok(Subscription::new(rx, SubscriptionHandle::new(id, self.cancel_fn())))
    }

    async fn subscribe_document(
        &self,
        path: &DocumentPath,
    ) -> Result<Subscription<Option<Document>>, StoreError> {
        let mut inner = lock(&self.inner);
        inner.check_available()?;

        let id = inner.allocate_subscription_id();
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(inner.document(path));
        inner.document_listeners.insert(
            id,
            DocumentListener {
                path: path.clone(),
                tx,
            },
        );
        debug!(subscription = id, document = %path, "document subscription opened");
        drop(inner);

        Ok(Subscription::new(rx, SubscriptionHandle::new(id, self.cancel_fn())))
    }

    async fn create_document(
        &self,
        collection: &CollectionPath,
        write: Write,
    ) -> Result<DocumentId, StoreError> {
        lock(&self.inner).admit_write()?;
        self.simulate_latency().await;

        let mut inner = lock(&self.inner);
        // Re-check: the store may have gone offline during the latency window.
        inner.check_available()?;

        let path = loop {
            let candidate = collection.doc(&uuid::Uuid::new_v4().simple().to_string())?;
            if !inner.docs.contains_key(&candidate.to_string()) {
                break candidate;
            }
        };

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.docs.insert(
            path.to_string(),
            StoredDoc {
                seq,
                fields: write.resolve(Utc::now()),
            },
        );
        inner.notify(&path);
        inner.persist();

        debug!(document = %path, "document created");
        Ok(path.id())
    }

    async fn merge_write(&self, path: &DocumentPath, write: Write) -> Result<(), StoreError> {
        lock(&self.inner).admit_write()?;
        self.simulate_latency().await;

        let mut inner = lock(&self.inner);
        inner.check_available()?;

        let fields = write.resolve(Utc::now());
        let key = path.to_string();
        if let Some(stored) = inner.docs.get_mut(&key) {
            for (field, value) in fields {
                stored.fields.insert(field, value);
            }
        } else {
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.docs.insert(key, StoredDoc { seq, fields });
        }
        inner.notify(path);
        inner.persist();

        debug!(document = %path, "merge-write applied");
        Ok(())
    }

    fn display_name(&self) -> &str {
        "memory"
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
