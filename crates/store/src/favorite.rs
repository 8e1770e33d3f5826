//! The user's favorite volumes.

use crate::document::Document;
use crate::error::Result;
use crate::set::{PersistedSet, insert, remove};
use hondana_library::VolumeId;
use hondana_storage::BackendHandle;
use tracing::debug;

pub const FAVORITES_FILE: &str = "favorites.json";

/// Favorite volumes in the order they were added.
///
/// All operations are idempotent. Favorites survive their volume going
/// stale; only an explicit [`remove()`](Self::remove) drops them.
pub struct FavoritesRegistry {
    set: PersistedSet<VolumeId>,
}

impl FavoritesRegistry {
    /// Load `favorites.json` from `backend`.
    pub async fn open(backend: BackendHandle) -> Result<Self> {
        let set = PersistedSet::open(Document::new(backend, FAVORITES_FILE)).await?;
        debug!(favorites = set.len(), "loaded favorites");
        Ok(Self { set })
    }

    /// Returns `true` when the volume was not a favorite before.
    pub async fn add(&self, id: &VolumeId) -> Result<bool> {
        self.set.update(|items| insert(items, id.clone())).await
    }

    /// Returns `true` when the volume was a favorite before.
    pub async fn remove(&self, id: &VolumeId) -> Result<bool> {
        self.set.update(|items| remove(items, id)).await
    }

    /// Flip the favorite state. Returns whether the volume is now a favorite.
    pub async fn toggle(&self, id: &VolumeId) -> Result<bool> {
        self.set
            .update(|items| match remove(items, id) {
                (true, _) => (true, false),
                (false, _) => insert(items, id.clone()),
            })
            .await
    }

    pub fn contains(&self, id: &VolumeId) -> bool {
        self.set.contains(id)
    }

    pub fn list(&self) -> Vec<VolumeId> {
        self.set.list()
    }

    /// Retry a write that failed earlier.
    pub async fn flush(&self) -> Result<()> {
        self.set.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use hondana_library::identify;
    use hondana_storage::backend::MockBackend;
    use std::sync::Arc;

    fn vol(n: u32) -> VolumeId {
        identify(format!("/library/Series-A/vol{n}.pdf")).unwrap()
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let backend = Arc::new(MockBackend::default());
        let favorites = FavoritesRegistry::open(Arc::clone(&backend) as BackendHandle).await.unwrap();
        assert!(favorites.add(&vol(1)).await.unwrap());
        assert!(!favorites.add(&vol(1)).await.unwrap());
        assert_eq!(favorites.list(), vec![vol(1)]);
        assert_eq!(backend.write_count(), 1);
    }

    #[tokio::test]
    async fn test_remove_absent_is_noop() {
        let backend = Arc::new(MockBackend::default());
        let favorites = FavoritesRegistry::open(Arc::clone(&backend) as BackendHandle).await.unwrap();
        assert!(!favorites.remove(&vol(1)).await.unwrap());
        assert_eq!(backend.write_count(), 0);
    }

    #[tokio::test]
    async fn test_insertion_order_survives_reload() {
        let backend = Arc::new(MockBackend::default());
        let favorites = FavoritesRegistry::open(Arc::clone(&backend) as BackendHandle).await.unwrap();
        for n in [3, 1, 2] {
            favorites.add(&vol(n)).await.unwrap();
        }
        favorites.remove(&vol(1)).await.unwrap();
        drop(favorites);

        let reloaded = FavoritesRegistry::open(backend as BackendHandle).await.unwrap();
        assert_eq!(reloaded.list(), vec![vol(3), vol(2)]);
        assert!(reloaded.contains(&vol(2)));
        assert!(!reloaded.contains(&vol(1)));
    }

    #[tokio::test]
    async fn test_toggle() {
        let backend = Arc::new(MockBackend::default());
        let favorites = FavoritesRegistry::open(backend as BackendHandle).await.unwrap();
        assert!(favorites.toggle(&vol(1)).await.unwrap());
        assert!(favorites.contains(&vol(1)));
        assert!(!favorites.toggle(&vol(1)).await.unwrap());
        assert!(favorites.list().is_empty());
    }

    #[tokio::test]
    async fn test_duplicates_on_disk_are_collapsed() {
        let id = vol(1);
        let raw = format!(r#"{{"version":1,"data":["{id}","{id}"]}}"#);
        let backend = Arc::new(MockBackend::with_files([(FAVORITES_FILE, raw.into_bytes())]));
        let favorites = FavoritesRegistry::open(backend as BackendHandle).await.unwrap();
        assert_eq!(favorites.list(), vec![id]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_is_retried_by_flush() {
        let backend = Arc::new(MockBackend::default());
        let favorites = FavoritesRegistry::open(Arc::clone(&backend) as BackendHandle).await.unwrap();
        backend.fail_next_writes(3);
        let err = favorites.add(&vol(1)).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::WriteFailure(_)));
        assert!(favorites.contains(&vol(1)));

        favorites.flush().await.unwrap();
        assert_eq!(backend.write_count(), 1);
    }
}
