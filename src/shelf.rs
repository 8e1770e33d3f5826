use crate::error::{ErrorKind, Result};
use crate::view::{TitleView, VolumeView};
use exn::ResultExt;
use hondana_cache::{Request, ThumbnailCache, ThumbnailEvent, ThumbnailSource};
use hondana_config::Config;
use hondana_library::{LibraryIndex, ScanReport, Title, Volume, VolumeId};
use hondana_render::DecoderHandle;
use hondana_session::{Position, ReadingSession};
use hondana_storage::BackendHandle;
use hondana_storage::backend::LocalBackend;
use hondana_store::{Bookmark, BookmarkStore, FavoritesRegistry, RootRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

/// Everything a reader interacts with, wired together.
///
/// Owns the library index, the persisted reading state, the thumbnail
/// cache and the reading session. Views returned from here are snapshots
/// annotated with favorite and bookmark state.
pub struct Shelf {
    config: Config,
    index: LibraryIndex,
    bookmarks: BookmarkStore,
    favorites: FavoritesRegistry,
    roots: RootRegistry,
    thumbnails: ThumbnailCache,
    session: ReadingSession,
}

impl Shelf {
    /// Open the stores under `storage.data_dir` and the thumbnail cache
    /// under `storage.cache_dir`, creating both if needed. Nothing is
    /// scanned yet.
    pub async fn open(config: Config, decoder: DecoderHandle) -> Result<Self> {
        let data: BackendHandle =
            Arc::new(LocalBackend::new("data", &config.storage.data_dir).or_raise(|| ErrorKind::Storage)?);
        let bookmarks = BookmarkStore::open(Arc::clone(&data), config.debounce()).await.or_raise(|| ErrorKind::Store)?;
        let favorites = FavoritesRegistry::open(Arc::clone(&data)).await.or_raise(|| ErrorKind::Store)?;
        let roots = RootRegistry::open(data).await.or_raise(|| ErrorKind::Store)?;
        let thumbnails = ThumbnailCache::open(&config.storage.cache_dir, Arc::clone(&decoder), config.cache_settings())
            .await
            .or_raise(|| ErrorKind::Cache)?;
        let session = ReadingSession::new(decoder, bookmarks.clone(), config.session_settings());
        let index = LibraryIndex::new(config.extensions());
        info!(data = %config.storage.data_dir.display(), cache = %config.storage.cache_dir.display(), "shelf opened");
        Ok(Self { config, index, bookmarks, favorites, roots, thumbnails, session })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn library(&self) -> &LibraryIndex {
        &self.index
    }

    /// Registered roots first, then configured ones not registered.
    pub fn library_roots(&self) -> Vec<PathBuf> {
        let mut roots = self.roots.list();
        for root in &self.config.library.roots {
            if !roots.contains(root) {
                roots.push(root.clone());
            }
        }
        roots
    }

    pub async fn add_root(&self, path: impl AsRef<Path>) -> Result<bool> {
        self.roots.add(path).await.or_raise(|| ErrorKind::Store)
    }

    /// Forget a root. Bookmarks and favorites of its volumes are kept.
    pub async fn remove_root(&self, path: impl AsRef<Path>) -> Result<bool> {
        self.roots.remove(path).await.or_raise(|| ErrorKind::Store)
    }

    /// Walk the current roots and drop thumbnails of changed volumes.
    ///
    /// Roots added or removed since the last scan take effect here.
    #[instrument(skip(self))]
    pub async fn scan(&mut self) -> ScanReport {
        let roots = self.library_roots();
        let report = self.index.scan(roots).await;
        self.invalidate_changed().await;
        info!(titles = report.titles, volumes = report.volumes, errors = report.errors.len(), "library scanned");
        report
    }

    /// Scan the roots of the previous scan again.
    #[instrument(skip(self))]
    pub async fn rescan(&mut self) -> ScanReport {
        let report = self.index.rescan().await;
        self.invalidate_changed().await;
        info!(
            added = report.added.len(),
            stale = report.stale.len(),
            invalidated = report.invalidated.len(),
            "library rescanned"
        );
        report
    }

    async fn invalidate_changed(&mut self) {
        for id in self.index.take_invalidated() {
            if let Err(err) = self.thumbnails.invalidate(&id).await {
                warn!(volume = %id, error = ?err, "could not drop outdated thumbnail");
            }
        }
    }

    /// Titles with their live volumes, annotated with reading state.
    pub fn titles(&self) -> Vec<TitleView> {
        self.index
            .titles()
            .into_iter()
            .map(|title| TitleView {
                name: title.name.clone(),
                path: title.path.clone(),
                volumes: self.index.volumes(title).map(|volume| self.annotate(title, volume)).collect(),
            })
            .collect()
    }

    /// A single volume, stale or not, if the index knows it.
    pub fn volume(&self, id: &VolumeId) -> Option<VolumeView> {
        let volume = self.index.volume(id)?;
        let title = self.index.title_of(id)?;
        Some(self.annotate(title, volume))
    }

    fn annotate(&self, title: &Title, volume: &Volume) -> VolumeView {
        VolumeView::new(title, volume, self.favorites.contains(&volume.id), self.bookmarks.get(&volume.id))
    }

    /// Favorite ids in the order they were added. Ids of volumes not found
    /// by the last scan are listed too.
    pub fn favorites(&self) -> Vec<VolumeId> {
        self.favorites.list()
    }

    pub async fn add_favorite(&self, id: &VolumeId) -> Result<bool> {
        self.favorites.add(id).await.or_raise(|| ErrorKind::Store)
    }

    pub async fn remove_favorite(&self, id: &VolumeId) -> Result<bool> {
        self.favorites.remove(id).await.or_raise(|| ErrorKind::Store)
    }

    /// Returns whether the volume is a favorite afterwards.
    pub async fn toggle_favorite(&self, id: &VolumeId) -> Result<bool> {
        self.favorites.toggle(id).await.or_raise(|| ErrorKind::Store)
    }

    /// Bookmarks, most recently read first.
    pub fn bookmarks(&self) -> Vec<(VolumeId, Bookmark)> {
        self.bookmarks.list()
    }

    pub async fn clear_bookmark(&self, id: &VolumeId) -> Result<bool> {
        self.bookmarks.clear(id).await.or_raise(|| ErrorKind::Store)
    }

    /// Forget every bookmark. Returns how many there were.
    pub async fn clear_history(&self) -> Result<usize> {
        self.bookmarks.clear_all().await.or_raise(|| ErrorKind::Store)
    }

    /// Ask for the thumbnail of a live volume.
    pub fn request_thumbnail(&self, id: &VolumeId) -> Result<Request> {
        let volume = self.index.live_volume(id).or_raise(|| ErrorKind::Library)?;
        Ok(self.thumbnails.request(ThumbnailSource::from(volume)))
    }

    /// Withdraw a thumbnail request for a volume scrolled out of view.
    pub fn cancel_thumbnail(&self, id: &VolumeId) -> bool {
        self.thumbnails.cancel(id)
    }

    pub fn subscribe_thumbnails(&self) -> broadcast::Receiver<ThumbnailEvent> {
        self.thumbnails.subscribe()
    }

    /// Open a live volume in the reading session and remember its page
    /// count.
    pub async fn open_volume(&mut self, id: &VolumeId) -> Result<Position> {
        let path = self.index.live_volume(id).or_raise(|| ErrorKind::Library)?.path.clone();
        let position = self.session.open(id, &path).await.or_raise(|| ErrorKind::Session)?;
        self.index.set_page_count(id, position.page_count).or_raise(|| ErrorKind::Library)?;
        Ok(position)
    }

    pub async fn close_volume(&mut self) -> Result<()> {
        self.session.close().await.or_raise(|| ErrorKind::Session)
    }

    pub fn session(&self) -> &ReadingSession {
        &self.session
    }

    /// Navigation and view controls of the open volume.
    pub fn session_mut(&mut self) -> &mut ReadingSession {
        &mut self.session
    }

    /// Close the session, persist all reading state and stop the thumbnail
    /// workers.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Err(err) = self.session.close().await {
            warn!(error = ?err, "could not flush bookmarks when closing the session");
        }
        self.thumbnails.shutdown().await;
        self.favorites.flush().await.or_raise(|| ErrorKind::Store)?;
        self.bookmarks.shutdown().await.or_raise(|| ErrorKind::Store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hondana_config::StorageConfig;
    use hondana_library::identify;
    use hondana_render::MockDecoder;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        library: PathBuf,
        config: Config,
        decoder: Arc<MockDecoder>,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = tempfile::tempdir().unwrap();
            let library = temp.path().join("library");
            let config = Config {
                storage: StorageConfig { data_dir: temp.path().join("data"), cache_dir: temp.path().join("cache") },
                ..Config::default()
            };
            let fixture = Self { library, config, decoder: Arc::new(MockDecoder::default()), _temp: temp };
            fixture.add_volume("Series-A/vol1.pdf", 20);
            fixture.add_volume("Series-A/vol2.pdf", 12);
            fixture
        }

        fn add_volume(&self, relative: &str, pages: u32) -> VolumeId {
            let path = self.library.join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, b"%PDF-1.7").unwrap();
            self.decoder.add_volume(&path, pages);
            identify(&path).unwrap()
        }

        fn id(&self, relative: &str) -> VolumeId {
            identify(self.library.join(relative)).unwrap()
        }

        async fn shelf(&self) -> Shelf {
            Shelf::open(self.config.clone(), self.decoder.clone()).await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_scan_and_annotated_titles() {
        let f = Fixture::new();
        let mut shelf = f.shelf().await;
        assert!(shelf.add_root(&f.library).await.unwrap());
        let report = shelf.scan().await;
        assert_eq!((report.titles, report.volumes), (1, 2));
        assert!(report.errors.is_empty());

        let vol1 = f.id("Series-A/vol1.pdf");
        assert!(shelf.toggle_favorite(&vol1).await.unwrap());
        let position = shelf.open_volume(&vol1).await.unwrap();
        assert_eq!(position.page, 0);
        for _ in 0..5 {
            shelf.session_mut().next().unwrap();
        }

        let titles = shelf.titles();
        assert_eq!(titles.len(), 1);
        assert_eq!(titles[0].name, "Series-A");
        let names: Vec<_> = titles[0].volumes.iter().map(|v| v.file_name.as_str()).collect();
        assert_eq!(names, ["vol1.pdf", "vol2.pdf"]);
        let first = &titles[0].volumes[0];
        assert!(first.favorite);
        assert_eq!(first.page_count, Some(20));
        assert_eq!(first.bookmark.unwrap().last_page, 5);
        assert!(!titles[0].volumes[1].favorite);
        assert!(titles[0].volumes[1].bookmark.is_none());
        shelf.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_reading_state_survives_restart() {
        let f = Fixture::new();
        let vol2 = f.id("Series-A/vol2.pdf");
        let mut shelf = f.shelf().await;
        shelf.add_root(&f.library).await.unwrap();
        shelf.scan().await;
        shelf.add_favorite(&vol2).await.unwrap();
        shelf.open_volume(&vol2).await.unwrap();
        shelf.session_mut().goto(7).unwrap();
        shelf.shutdown().await.unwrap();

        let mut shelf = f.shelf().await;
        assert_eq!(shelf.library_roots(), vec![f.library.clone()]);
        assert_eq!(shelf.favorites(), vec![vol2.clone()]);
        shelf.scan().await;
        assert_eq!(shelf.open_volume(&vol2).await.unwrap().page, 7);
        shelf.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_thumbnails_follow_the_library() {
        let f = Fixture::new();
        let mut shelf = f.shelf().await;
        shelf.add_root(&f.library).await.unwrap();
        shelf.scan().await;
        let vol1 = f.id("Series-A/vol1.pdf");
        let vol2 = f.id("Series-A/vol2.pdf");

        let thumbnail = shelf.request_thumbnail(&vol1).unwrap().resolve().await.unwrap();
        assert!(thumbnail.bitmap().is_some());
        assert!(matches!(shelf.request_thumbnail(&vol1).unwrap(), Request::Ready(_)));

        // Deleted after the scan: the cache answers with a placeholder.
        let vol2_path = f.library.join("Series-A/vol2.pdf");
        fs::remove_file(&vol2_path).unwrap();
        f.decoder.remove_volume(&vol2_path);
        assert!(shelf.request_thumbnail(&vol2).unwrap().resolve().await.unwrap().is_placeholder());

        // A changed file loses its thumbnail on rescan.
        fs::write(f.library.join("Series-A/vol1.pdf"), b"%PDF-1.7 with more bytes").unwrap();
        let report = shelf.rescan().await;
        assert_eq!(report.stale, vec![vol2.clone()]);
        assert_eq!(report.invalidated, vec![vol1.clone()]);
        assert!(matches!(shelf.request_thumbnail(&vol1).unwrap(), Request::Pending(_)));

        let err = shelf.request_thumbnail(&vol2).err().unwrap();
        assert!(matches!(&*err, ErrorKind::Library));
        assert!(shelf.volume(&vol2).unwrap().stale);
        shelf.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_removing_root_keeps_reading_state() {
        let f = Fixture::new();
        let vol1 = f.id("Series-A/vol1.pdf");
        let mut shelf = f.shelf().await;
        shelf.add_root(&f.library).await.unwrap();
        shelf.scan().await;
        shelf.add_favorite(&vol1).await.unwrap();
        shelf.open_volume(&vol1).await.unwrap();
        shelf.close_volume().await.unwrap();

        assert!(shelf.remove_root(&f.library).await.unwrap());
        let report = shelf.scan().await;
        assert_eq!(report.volumes, 0);
        assert!(shelf.titles().is_empty());
        assert_eq!(shelf.favorites(), vec![vol1.clone()]);
        assert!(shelf.bookmarks().iter().any(|(id, _)| id == &vol1));
        assert_eq!(shelf.clear_history().await.unwrap(), 1);
        shelf.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_configured_roots_are_scanned() {
        let f = Fixture::new();
        let mut config = f.config.clone();
        config.library.roots = vec![f.library.clone()];
        let mut shelf = Shelf::open(config, f.decoder.clone()).await.unwrap();
        assert_eq!(shelf.scan().await.volumes, 2);
        shelf.shutdown().await.unwrap();
    }
}
