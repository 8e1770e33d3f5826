//! Library root folders chosen by the user.

use crate::document::Document;
use crate::error::{ErrorKind, Result};
use crate::set::{PersistedSet, insert, remove};
use exn::ResultExt;
use hondana_storage::BackendHandle;
use std::path::{Path, PathBuf};

pub const ROOTS_FILE: &str = "library.json";

/// Ordered list of library roots, persisted as `library.json`.
///
/// Roots are stored normalized, so `/media/manga/` and `/media/./manga`
/// are the same root. Removing a root never touches bookmarks or favorites.
pub struct RootRegistry {
    set: PersistedSet<PathBuf>,
}

impl RootRegistry {
    pub async fn open(backend: BackendHandle) -> Result<Self> {
        Ok(Self { set: PersistedSet::open(Document::new(backend, ROOTS_FILE)).await? })
    }

    /// Returns `false` when the root is already registered.
    ///
    /// # Errors
    ///
    /// [`InvalidRoot`](ErrorKind::InvalidRoot) for relative paths.
    pub async fn add(&self, path: impl AsRef<Path>) -> Result<bool> {
        let root = normalize(path.as_ref())?;
        self.set.update(|items| insert(items, root)).await
    }

    /// Returns `false` when the root was not registered.
    pub async fn remove(&self, path: impl AsRef<Path>) -> Result<bool> {
        let root = normalize(path.as_ref())?;
        self.set.update(|items| remove(items, &root)).await
    }

    pub fn list(&self) -> Vec<PathBuf> {
        self.set.list()
    }
}

fn normalize(path: &Path) -> Result<PathBuf> {
    hondana_library::normalize(path).or_raise(|| ErrorKind::InvalidRoot(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hondana_storage::backend::MockBackend;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_add_remove_list() {
        let backend = Arc::new(MockBackend::default());
        let roots = RootRegistry::open(Arc::clone(&backend) as BackendHandle).await.unwrap();
        assert!(roots.add("/media/manga").await.unwrap());
        assert!(roots.add("/media/comics").await.unwrap());
        assert!(!roots.add("/media/./manga/").await.unwrap());
        assert_eq!(roots.list(), vec![PathBuf::from("/media/manga"), PathBuf::from("/media/comics")]);

        assert!(roots.remove("/media/manga").await.unwrap());
        assert!(!roots.remove("/media/manga").await.unwrap());

        let reloaded = RootRegistry::open(backend as BackendHandle).await.unwrap();
        assert_eq!(reloaded.list(), vec![PathBuf::from("/media/comics")]);
    }

    #[tokio::test]
    async fn test_relative_root_rejected() {
        let roots = RootRegistry::open(Arc::new(MockBackend::default()) as BackendHandle).await.unwrap();
        let err = roots.add("manga").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidRoot(_)));
    }
}
