//! Storage backend trait and implementations.
//!
//! [`StorageBackend`] is the seam between hondana and the filesystem. The
//! library index lists volumes through it, and the persistent stores and the
//! thumbnail disk cache read and write through it. Tests swap in
//! [`MockBackend`] to inject failures and count writes.

mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
use crate::error::Result;
use crate::file::FileInfo;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::path::Path;
use std::pin::Pin;

pub type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;

/// Unified interface for storage backends.
///
/// # Path Handling
/// All paths are relative to the storage root and must be validated using
/// [`validate_path`](crate::validate_path) before use. Implementations
/// enforce this validation.
///
/// # Atomicity
/// [`write()`](Self::write) must replace the target in one step: a crash in
/// the middle of a write leaves either the old complete file or the new
/// complete file, never a truncated one.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use hondana_storage::{backend::StorageBackend, error::Result};
///
/// async fn favorites_size(backend: &dyn StorageBackend) -> Result<u64> {
///     let path = Path::new("favorites.json");
///     if backend.exists(path).await? {
///         Ok(backend.stat(path).await?.size)
///     } else {
///         Ok(0)
///     }
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the backend, used for logging only.
    fn name(&self) -> &str;

    /// List all files below an optional prefix, down to `max_depth` path
    /// components (unlimited when `None`).
    ///
    /// Default implementation collects [`list_stream()`](Self::list_stream)
    /// and fails on the first error.
    async fn list(&self, prefix: Option<&Path>, max_depth: Option<usize>) -> Result<Vec<FileInfo>> {
        self.list_stream(prefix, max_depth).try_collect().await
    }

    /// Stream file metadata below an optional prefix.
    ///
    /// A directory that cannot be read yields an `Err` item and the walk
    /// continues with its siblings, so callers can report per-folder
    /// failures without losing the rest of the listing.
    ///
    /// `max_depth` counts path components relative to the root: a depth of
    /// `2` yields `Title/volume.pdf` but never descends into
    /// `Title/extras/`.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::StreamExt;
    /// # use hondana_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) {
    /// let mut stream = backend.list_stream(None, Some(2));
    /// while let Some(item) = stream.next().await {
    ///     match item {
    ///         Ok(info) => println!("{}: {} bytes", info.path.display(), info.size),
    ///         Err(e) => eprintln!("skipping: {e}"),
    ///     }
    /// }
    /// # }
    /// ```
    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>, max_depth: Option<usize>) -> FileInfoStream<'a>;

    /// Check if a file exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Read file contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Atomically create or replace a file.
    ///
    /// Implementations create parent directories as needed.
    ///
    /// ```no_run
    /// use std::path::Path;
    /// # use hondana_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// backend.write(Path::new("bookmarks.json"), br#"{"version":1,"data":{}}"#).await?;
    /// # Ok(())
    /// # }
    /// ```
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Delete a file.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn delete(&self, path: &Path) -> Result<()>;

    /// Get file metadata without reading contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn stat(&self, path: &Path) -> Result<FileInfo>;
}
