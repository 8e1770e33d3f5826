//! Local filesystem storage backend.
//!
//! Files live below a configured root directory and are accessed through
//! `tokio::fs`. Writes go to a sibling temporary file which is synced and
//! then renamed over the target.

use crate::backend::FileInfoStream;
use crate::error::ErrorKind;
use crate::{FileInfo, StorageBackend, error::Result, path::validate as validate_path};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use std::fs::{Metadata, create_dir_all as sync_create_dir};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::{self, DirEntry};
use tokio::io::AsyncWriteExt;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

enum WalkEntry {
    File(FileInfo),
    Descend(PathBuf, usize),
    Skip,
}

/// Local filesystem storage backend.
///
/// # Examples
///
/// ```no_run
/// use hondana_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let state = LocalBackend::new("state", "/home/reader/.local/share/hondana")?;
/// let library = LocalBackend::existing("Manga", "/media/manga")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalBackend {
    name: String,
    root: PathBuf,
}
impl LocalBackend {
    /// Create a backend rooted at `root`, creating the directory if missing.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPath`](ErrorKind::InvalidPath) if the path is not
    /// absolute or exists but is not a directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = Self::check_root(root.as_ref())?;
        if !root.exists() {
            // Only happens once at startup; not worth an async constructor.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
        }
        Ok(Self { name: name.into(), root })
    }

    /// Create a backend over a directory that must already exist.
    ///
    /// Library roots use this: a configured root that vanished is reported,
    /// never silently recreated.
    pub fn existing(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = Self::check_root(root.as_ref())?;
        if !root.exists() {
            exn::bail!(ErrorKind::NotFound(root));
        }
        Ok(Self { name: name.into(), root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn check_root(root: &Path) -> Result<PathBuf> {
        let root = root.to_path_buf();
        if !root.is_absolute() || (root.exists() && !root.is_dir()) {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        Ok(root)
    }

    fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    fn relative_path(&self, absolute: impl AsRef<Path>) -> Result<PathBuf> {
        let absolute = absolute.as_ref();
        let relative = absolute.strip_prefix(&self.root).or_raise(|| {
            ErrorKind::BackendError(format!("path `{:?}` is not within root `{:?}`", absolute, self.root))
        })?;
        validate_path(relative)
    }

    fn metadata(path: &Path, metadata: Metadata) -> Result<FileInfo> {
        let modified = metadata.modified().map_err(ErrorKind::Io)?.into();
        Ok(FileInfo::new(PathBuf::from(path), metadata.len(), modified))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    /// Classify one directory entry. Pulled out of the stream so `?` works.
    async fn process_entry(
        &self,
        entry: DirEntry,
        depth: usize,
        prefix: Option<&Path>,
        max_depth: Option<usize>,
    ) -> Result<WalkEntry> {
        let path = entry.path();
        let metadata = entry.metadata().await.map_err(|e| Self::map_io_error(e, &path))?;
        let relative = self.relative_path(&path)?;
        if let Some(pfx) = prefix
            && !relative.starts_with(pfx)
            && !pfx.starts_with(&relative)
        {
            return Ok(WalkEntry::Skip);
        }
        if metadata.is_dir() {
            return match max_depth {
                Some(max) if depth >= max => Ok(WalkEntry::Skip),
                _ => Ok(WalkEntry::Descend(path, depth)),
            };
        }
        if metadata.is_file() && prefix.is_none_or(|pfx| relative.starts_with(pfx)) {
            return Ok(WalkEntry::File(Self::metadata(&relative, metadata)?));
        }
        // Most likely a broken symlink.
        Ok(WalkEntry::Skip)
    }

    fn temp_sibling(target: &Path) -> PathBuf {
        let name = target.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let counter = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        target.with_file_name(format!(".{name}.{}.{counter}.tmp", std::process::id()))
    }

    async fn write_replace(temp: &Path, target: &Path, data: &[u8]) -> std::io::Result<()> {
        let mut file = fs::File::create(temp).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(temp, target).await
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>, max_depth: Option<usize>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Result::Err(e) })),
        };
        let mut stack = vec![(self.root.clone(), 0usize)];

        Box::pin(stream! {
            'dirs: while let Some((current, depth)) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    Err(err) => {
                        yield Err(exn::Exn::from(Self::map_io_error(err, &current)));
                        continue 'dirs;
                    }
                };

                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => { yield Err(exn::Exn::from(Self::map_io_error(e, &current))); continue 'dirs; },
                    };
                    match self.process_entry(entry, depth + 1, validated_prefix.as_deref(), max_depth).await {
                        Ok(WalkEntry::File(f)) => yield Ok(f),
                        Ok(WalkEntry::Descend(d, depth)) => stack.push((d, depth)),
                        Ok(WalkEntry::Skip) => {},
                        Err(e) => yield Err(e),
                    };
                }
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::try_exists(&abs_path).await.map_err(ErrorKind::Io)?)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::read(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        if let Some(parent) = abs_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, path))?;
        }
        let temp = Self::temp_sibling(&abs_path);
        if let Err(e) = Self::write_replace(&temp, &abs_path, data).await {
            // The target is untouched; only the half-written sibling needs to go.
            _ = fs::remove_file(&temp).await;
            exn::bail!(Self::map_io_error(e, path));
        }
        tracing::trace!(backend = self.name, path = %path.display(), bytes = data.len(), "Replaced file");
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::remove_file(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let abs_path = self.absolute_path(path)?;
        let metadata = fs::metadata(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?;
        Self::metadata(path, metadata)
    }
}
