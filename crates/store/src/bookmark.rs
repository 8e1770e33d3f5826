//! Per-volume reading positions with debounced persistence.

use crate::document::Document;
use crate::error::{Error, ErrorKind, Result};
use hondana_library::VolumeId;
use hondana_storage::BackendHandle;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, instrument};

pub const BOOKMARKS_FILE: &str = "bookmarks.json";
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Last page viewed in a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub last_page: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Clamp a requested page into `[0, page_count - 1]`.
///
/// Negative pages become the first page; a volume without pages only has
/// page `0`.
///
/// ```
/// use hondana_store::clamp_page;
/// assert_eq!(clamp_page(-1, 20), 0);
/// assert_eq!(clamp_page(20, 20), 19);
/// assert_eq!(clamp_page(7, 0), 0);
/// ```
pub fn clamp_page(page: i64, page_count: u32) -> u32 {
    let last = i64::from(page_count.saturating_sub(1));
    // Infallible: the clamped value always fits in a u32.
    u32::try_from(page.clamp(0, last)).unwrap_or(0)
}

type Entries = HashMap<VolumeId, Bookmark>;

enum Command {
    Dirty,
    Flush(oneshot::Sender<Result<()>>),
    Shutdown(oneshot::Sender<Result<()>>),
}

struct Shared {
    entries: RwLock<Entries>,
    last_failure: Mutex<Option<String>>,
}

/// Reading positions keyed by [`VolumeId`].
///
/// Reads and updates touch memory only. A background writer task persists
/// the whole map: the first change after a write arms a timer of one
/// debounce window, and every change until it fires rides along in the same
/// write. [`flush()`](Self::flush), [`clear()`](Self::clear) and
/// [`shutdown()`](Self::shutdown) write immediately.
///
/// The store is cheap to clone; all clones share one writer. When the last
/// clone is dropped the writer persists anything pending and exits.
#[derive(Clone)]
pub struct BookmarkStore {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
}

impl BookmarkStore {
    /// Load `bookmarks.json` from `backend` and start the writer task.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn open(backend: BackendHandle, debounce: Duration) -> Result<Self> {
        let document = Document::new(backend, BOOKMARKS_FILE);
        let stored: BTreeMap<VolumeId, Bookmark> = document.load().await?;
        debug!(bookmarks = stored.len(), "loaded bookmarks");
        let shared = Arc::new(Shared {
            entries: RwLock::new(stored.into_iter().collect()),
            last_failure: Mutex::new(None),
        });
        let (commands, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(Arc::clone(&shared), document, debounce, receiver));
        Ok(Self { shared, commands })
    }

    pub fn get(&self, id: &VolumeId) -> Option<Bookmark> {
        self.shared.entries.read().get(id).copied()
    }

    /// Record `page` as the last page viewed, clamped to the volume.
    ///
    /// Returns the bookmark as stored. Never blocks on I/O.
    pub fn set(&self, id: &VolumeId, page: i64, page_count: u32) -> Bookmark {
        self.set_at(id, page, page_count, OffsetDateTime::now_utc())
    }

    fn set_at(&self, id: &VolumeId, page: i64, page_count: u32, at: OffsetDateTime) -> Bookmark {
        let candidate = Bookmark { last_page: clamp_page(page, page_count), updated_at: at };
        let stored = {
            let mut entries = self.shared.entries.write();
            let entry = entries.entry(id.clone()).or_insert(candidate);
            // Last write wins by timestamp, not by arrival order.
            if entry.updated_at <= candidate.updated_at {
                *entry = candidate;
            }
            *entry
        };
        self.notify(Command::Dirty);
        stored
    }

    /// All bookmarks, most recently updated first.
    pub fn list(&self) -> Vec<(VolumeId, Bookmark)> {
        let mut bookmarks: Vec<_> = self.shared.entries.read().iter().map(|(id, b)| (id.clone(), *b)).collect();
        bookmarks.sort_by(|(a_id, a), (b_id, b)| b.updated_at.cmp(&a.updated_at).then_with(|| a_id.cmp(b_id)));
        bookmarks
    }

    /// Remove one bookmark and persist immediately.
    ///
    /// Returns whether a bookmark existed.
    pub async fn clear(&self, id: &VolumeId) -> Result<bool> {
        let removed = self.shared.entries.write().remove(id).is_some();
        if removed {
            self.notify(Command::Dirty);
            self.flush().await?;
        }
        Ok(removed)
    }

    /// Forget every bookmark and persist immediately.
    ///
    /// Returns how many bookmarks were removed.
    pub async fn clear_all(&self) -> Result<usize> {
        let removed = std::mem::take(&mut *self.shared.entries.write()).len();
        info!(removed, "clearing reading history");
        self.notify(Command::Dirty);
        self.flush().await?;
        Ok(removed)
    }

    /// Write pending changes now, skipping the debounce window.
    pub async fn flush(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.request(Command::Flush(reply), response).await
    }

    /// Flush and stop the writer task. Later updates stay in memory only.
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.request(Command::Shutdown(reply), response).await
    }

    /// Description of the most recent failed write, cleared by the next
    /// successful one.
    pub fn last_failure(&self) -> Option<String> {
        self.shared.last_failure.lock().clone()
    }

    fn notify(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("bookmark writer stopped, change kept in memory only");
        }
    }

    async fn request(&self, command: Command, response: oneshot::Receiver<Result<()>>) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::from(ErrorKind::Closed))?;
        response.await.map_err(|_| Error::from(ErrorKind::Closed))?
    }
}

async fn run_writer(
    shared: Arc<Shared>,
    document: Document,
    debounce: Duration,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let mut dirty = false;
    let mut deadline: Option<Instant> = None;
    loop {
        let command = match deadline {
            Some(at) => tokio::select! {
                command = commands.recv() => command,
                () = sleep_until(at) => {
                    deadline = None;
                    dirty = persist(&shared, &document).await.is_err();
                    continue;
                }
            },
            None => commands.recv().await,
        };
        match command {
            Some(Command::Dirty) => {
                dirty = true;
                // Later changes ride along; the window is never extended.
                deadline.get_or_insert_with(|| Instant::now() + debounce);
            },
            Some(Command::Flush(reply)) => {
                deadline = None;
                let result = if dirty { persist(&shared, &document).await } else { Ok(()) };
                dirty = result.is_err();
                let _ = reply.send(result);
            },
            Some(Command::Shutdown(reply)) => {
                let result = if dirty { persist(&shared, &document).await } else { Ok(()) };
                let _ = reply.send(result);
                break;
            },
            None => {
                if dirty {
                    let _ = persist(&shared, &document).await;
                }
                break;
            },
        }
    }
    debug!("bookmark writer stopped");
}

#[instrument(skip_all, fields(document = %document.path().display()))]
async fn persist(shared: &Shared, document: &Document) -> Result<()> {
    let snapshot: BTreeMap<VolumeId, Bookmark> =
        shared.entries.read().iter().map(|(id, bookmark)| (id.clone(), *bookmark)).collect();
    match document.save(&snapshot).await {
        Ok(()) => {
            debug!(bookmarks = snapshot.len(), "bookmarks persisted");
            *shared.last_failure.lock() = None;
            Ok(())
        },
        Err(err) => {
            error!(error = %err, "failed to persist bookmarks, keeping them in memory");
            *shared.last_failure.lock() = Some(err.to_string());
            Err(err)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hondana_library::identify;
    use hondana_storage::backend::MockBackend;
    use rstest::rstest;

    const WINDOW: Duration = Duration::from_millis(500);

    fn vol(n: u32) -> VolumeId {
        identify(format!("/library/Series-A/vol{n}.pdf")).unwrap()
    }

    async fn store(backend: &Arc<MockBackend>) -> BookmarkStore {
        BookmarkStore::open(Arc::clone(backend) as BackendHandle, WINDOW).await.unwrap()
    }

    async fn persisted(backend: &MockBackend) -> BTreeMap<VolumeId, Bookmark> {
        let raw = backend.contents(BOOKMARKS_FILE).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        serde_json::from_value(value["data"].clone()).unwrap()
    }

    #[rstest]
    #[case(0, 20, 0)]
    #[case(5, 20, 5)]
    #[case(19, 20, 19)]
    #[case(20, 20, 19)]
    #[case(-1, 20, 0)]
    #[case(i64::MIN, 20, 0)]
    #[case(i64::MAX, 20, 19)]
    #[case(3, 0, 0)]
    #[case(3, 1, 0)]
    fn test_clamp_page(#[case] page: i64, #[case] count: u32, #[case] expected: u32) {
        assert_eq!(clamp_page(page, count), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_is_visible_immediately_and_debounced() {
        let backend = Arc::new(MockBackend::default());
        let store = store(&backend).await;
        for page in 0..10 {
            store.set(&vol(1), page, 20);
        }
        assert_eq!(store.get(&vol(1)).unwrap().last_page, 9);
        tokio::task::yield_now().await;
        assert_eq!(backend.write_count(), 0);

        tokio::time::sleep(WINDOW * 2).await;
        assert_eq!(backend.write_count(), 1);
        assert_eq!(persisted(&backend).await[&vol(1)].last_page, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_is_not_extended() {
        let backend = Arc::new(MockBackend::default());
        let store = store(&backend).await;
        store.set(&vol(1), 1, 20);
        tokio::time::sleep(WINDOW / 2).await;
        store.set(&vol(1), 2, 20);
        tokio::time::sleep(WINDOW / 2 + Duration::from_millis(10)).await;
        assert_eq!(backend.write_count(), 1);
        tokio::time::sleep(WINDOW * 2).await;
        assert_eq!(backend.write_count(), 1);
        assert_eq!(persisted(&backend).await[&vol(1)].last_page, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_writes_mid_window() {
        let backend = Arc::new(MockBackend::default());
        let store = store(&backend).await;
        store.set(&vol(1), 4, 20);
        store.flush().await.unwrap();
        assert_eq!(backend.write_count(), 1);
        assert_eq!(persisted(&backend).await[&vol(1)].last_page, 4);

        // Nothing pending: no timer fires, no second write.
        tokio::time::sleep(WINDOW * 2).await;
        assert_eq!(backend.write_count(), 1);
        store.flush().await.unwrap();
        assert_eq!(backend.write_count(), 1);
    }

    #[tokio::test]
    async fn test_reload_after_shutdown() {
        let backend = Arc::new(MockBackend::default());
        let first = store(&backend).await;
        first.set(&vol(1), 7, 20);
        first.set(&vol(2), 30, 12);
        first.shutdown().await.unwrap();
        assert!(matches!(&*first.flush().await.unwrap_err(), ErrorKind::Closed));

        let second = store(&backend).await;
        assert_eq!(second.get(&vol(1)).unwrap().last_page, 7);
        assert_eq!(second.get(&vol(2)).unwrap().last_page, 11);
    }

    #[tokio::test]
    async fn test_last_write_wins_by_timestamp() {
        let backend = Arc::new(MockBackend::default());
        let store = store(&backend).await;
        let now = OffsetDateTime::now_utc();
        store.set_at(&vol(1), 8, 20, now);
        let stored = store.set_at(&vol(1), 2, 20, now - time::Duration::seconds(5));
        assert_eq!(stored.last_page, 8);
        assert_eq!(store.get(&vol(1)).unwrap().last_page, 8);
    }

    #[tokio::test]
    async fn test_list_most_recent_first() {
        let backend = Arc::new(MockBackend::default());
        let store = store(&backend).await;
        let now = OffsetDateTime::now_utc();
        store.set_at(&vol(1), 1, 20, now - time::Duration::minutes(2));
        store.set_at(&vol(2), 1, 20, now);
        store.set_at(&vol(3), 1, 20, now - time::Duration::minutes(1));
        let order: Vec<_> = store.list().into_iter().map(|(id, _)| id).collect();
        assert_eq!(order, vec![vol(2), vol(3), vol(1)]);
    }

    #[tokio::test]
    async fn test_clear_writes_immediately() {
        let backend = Arc::new(MockBackend::default());
        let store = store(&backend).await;
        store.set(&vol(1), 3, 20);
        store.set(&vol(2), 3, 20);
        assert!(store.clear(&vol(1)).await.unwrap());
        assert!(!store.clear(&vol(1)).await.unwrap());
        let on_disk = persisted(&backend).await;
        assert!(!on_disk.contains_key(&vol(1)));
        assert!(on_disk.contains_key(&vol(2)));

        assert_eq!(store.clear_all().await.unwrap(), 1);
        assert!(persisted(&backend).await.is_empty());
        assert!(store.list().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_stays_dirty() {
        let backend = Arc::new(MockBackend::default());
        let store = store(&backend).await;
        store.set(&vol(1), 5, 20);
        backend.fail_next_writes(3);
        let err = store.flush().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::WriteFailure(_)));
        assert!(store.last_failure().is_some());
        assert_eq!(store.get(&vol(1)).unwrap().last_page, 5);

        store.flush().await.unwrap();
        assert!(store.last_failure().is_none());
        assert_eq!(persisted(&backend).await[&vol(1)].last_page, 5);
    }

    #[tokio::test]
    async fn test_drop_persists_pending() {
        let backend = Arc::new(MockBackend::default());
        let store = store(&backend).await;
        store.set(&vol(1), 6, 20);
        drop(store);
        // The writer task owns the last reference to the document; wait for it.
        for _ in 0..100 {
            if backend.write_count() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(persisted(&backend).await[&vol(1)].last_page, 6);
    }
}
