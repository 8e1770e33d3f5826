//! In-memory storage backend for testing.

use super::FileInfoStream;
use crate::StorageBackend;
use crate::error::{ErrorKind, Result};
use crate::file::FileInfo;
use crate::path::validate as validate_path;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use time::OffsetDateTime;
use tokio::sync::RwLock;

/// In-memory storage backend for testing.
///
/// Files are stored in a `HashMap` behind a [`RwLock`]. On top of plain
/// storage it can simulate the failures the stores and the library index
/// have to survive: failing writes and folders that cannot be listed.
///
/// # Examples
///
/// ```ignore
/// use hondana_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([("Series-A/vol1.pdf", b"%PDF")]);
/// assert!(backend.exists(Path::new("Series-A/vol1.pdf")).await?);
///
/// backend.fail_next_writes(1);
/// assert!(backend.write(Path::new("favorites.json"), b"[]").await.is_err());
/// assert!(backend.write(Path::new("favorites.json"), b"[]").await.is_ok());
/// assert_eq!(backend.write_count(), 1);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    storage: RwLock<HashMap<PathBuf, (OffsetDateTime, Vec<u8>)>>,
    denied: std::sync::RwLock<HashSet<PathBuf>>,
    failing_writes: AtomicUsize,
    writes: AtomicUsize,
}

impl MockBackend {
    /// Create a mock backend pre-populated with files.
    ///
    /// Panics if any path fails validation. If test setup is wrong, then the
    /// test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = HashMap::new();
        let now = OffsetDateTime::now_utc();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                panic!("MockBackend::with_files: invalid path {}", path.display());
            };
            map.insert(validated, (now, data.into()));
        }
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(map),
            denied: std::sync::RwLock::new(HashSet::new()),
            failing_writes: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Change the name of the mock backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make listings of `folder` fail with
    /// [`PermissionDenied`](ErrorKind::PermissionDenied).
    pub fn deny_listing(&self, folder: impl Into<PathBuf>) {
        let folder = folder.into();
        self.denied.write().unwrap_or_else(|e| e.into_inner()).insert(folder);
    }

    /// Make the next `count` writes fail with an I/O error.
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Number of writes that succeeded so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Override the modification time of an existing file.
    pub async fn set_modified(&self, path: impl AsRef<Path>, modified: OffsetDateTime) {
        let Ok(path) = validate_path(path.as_ref()) else {
            return;
        };
        if let Some(entry) = self.storage.write().await.get_mut(&path) {
            entry.0 = modified;
        }
    }

    /// Current contents of a file, for assertions.
    pub async fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let path = validate_path(path.as_ref()).ok()?;
        self.storage.read().await.get(&path).map(|(_, data)| data.clone())
    }

    fn is_denied(&self, path: &Path) -> Option<PathBuf> {
        let denied = self.denied.read().unwrap_or_else(|e| e.into_inner());
        denied.iter().find(|d| path.starts_with(d)).cloned()
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>, max_depth: Option<usize>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };

        Box::pin(stream! {
            // Snapshot under the read lock; never hold it across a yield.
            let mut entries: Vec<FileInfo> = {
                let guard = self.storage.read().await;
                guard
                    .iter()
                    .filter(|(path, _)| validated_prefix.as_ref().is_none_or(|pfx| path.starts_with(pfx)))
                    .filter(|(path, _)| max_depth.is_none_or(|max| path.components().count() <= max))
                    .map(|(path, (modified, data))| FileInfo::new(path.clone(), data.len() as u64, *modified))
                    .collect()
            };
            entries.sort_by(|a, b| a.path.cmp(&b.path));
            let mut reported = HashSet::new();
            for info in entries {
                if let Some(folder) = self.is_denied(&info.path) {
                    if reported.insert(folder.clone()) {
                        yield Err(exn::Exn::from(ErrorKind::PermissionDenied(folder)));
                    }
                    continue;
                }
                yield Ok(info);
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        Ok(self.storage.read().await.contains_key(&path))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = validate_path(path)?;
        let (_modified, data) =
            self.storage.read().await.get(&path).cloned().ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))?;
        Ok(data)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let path = validate_path(path)?;
        let failing = self.failing_writes.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            exn::bail!(ErrorKind::Io(std::io::Error::other("simulated write failure")));
        }
        self.storage.write().await.insert(path, (OffsetDateTime::now_utc(), data.to_vec()));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        self.storage.write().await.remove(&path).map(|_| ()).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let path = validate_path(path)?;
        let guard = self.storage.read().await;
        let (modified, data) = guard.get(&path).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path.clone())))?;
        Ok(FileInfo::new(path.clone(), data.len() as u64, *modified))
    }
}
