use crate::document::Document;
use crate::error::Result;
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::error;

/// An insertion-ordered set persisted as a JSON array.
///
/// Every change rewrites the document before returning. Writers are
/// serialized; readers only take the in-memory lock. A failed write leaves
/// the change in memory and marks the set dirty so the next change (or
/// [`flush()`](Self::flush)) writes it.
pub(crate) struct PersistedSet<T> {
    items: RwLock<Vec<T>>,
    document: Document,
    writer: Mutex<()>,
    dirty: AtomicBool,
}

impl<T> PersistedSet<T>
where
    T: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync,
{
    pub async fn open(document: Document) -> Result<Self> {
        let stored: Vec<T> = document.load().await?;
        let mut items: Vec<T> = Vec::with_capacity(stored.len());
        for item in stored {
            if !items.contains(&item) {
                items.push(item);
            }
        }
        Ok(Self { items: RwLock::new(items), document, writer: Mutex::new(()), dirty: AtomicBool::new(false) })
    }

    pub fn contains(&self, item: &T) -> bool {
        self.items.read().contains(item)
    }

    pub fn list(&self) -> Vec<T> {
        self.items.read().clone()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Apply `change` and persist when it reports a modification.
    pub async fn update<R>(&self, change: impl FnOnce(&mut Vec<T>) -> (bool, R)) -> Result<R> {
        let _writer = self.writer.lock().await;
        let (changed, result) = change(&mut self.items.write());
        if changed {
            self.dirty.store(true, Ordering::SeqCst);
        }
        self.persist_if_dirty().await?;
        Ok(result)
    }

    /// Persist a change whose earlier write failed.
    pub async fn flush(&self) -> Result<()> {
        let _writer = self.writer.lock().await;
        self.persist_if_dirty().await
    }

    async fn persist_if_dirty(&self) -> Result<()> {
        if !self.dirty.load(Ordering::SeqCst) {
            return Ok(());
        }
        let snapshot = self.list();
        match self.document.save(&snapshot).await {
            Ok(()) => {
                self.dirty.store(false, Ordering::SeqCst);
                Ok(())
            },
            Err(err) => {
                error!(document = %self.document.path().display(), error = %err, "failed to persist, keeping change in memory");
                Err(err)
            },
        }
    }
}

/// Append `item` unless already present.
pub(crate) fn insert<T: PartialEq>(items: &mut Vec<T>, item: T) -> (bool, bool) {
    if items.contains(&item) {
        return (false, false);
    }
    items.push(item);
    (true, true)
}

/// Remove `item` if present, keeping the order of the rest.
pub(crate) fn remove<T: PartialEq>(items: &mut Vec<T>, item: &T) -> (bool, bool) {
    let before = items.len();
    items.retain(|existing| existing != item);
    let removed = items.len() != before;
    (removed, removed)
}
