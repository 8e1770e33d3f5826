//! The in-memory library: titles and volumes below the configured roots.

use crate::DEFAULT_EXTENSION;
use crate::error::{Error, ErrorKind, Result};
use crate::identity::{VolumeId, identify};
use crate::models::{Title, Volume};
use crate::scan::{Discovered, is_missing, walk};
use crate::sort::natural_cmp;
use futures::StreamExt;
use hondana_storage::BackendHandle;
use hondana_storage::backend::LocalBackend;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// A configured library root.
///
/// Roots given as plain paths get a fresh [`LocalBackend`] on every walk, so
/// a root that appears or vanishes between scans is picked up.
#[derive(Clone)]
struct Root {
    path: PathBuf,
    backend: Option<BackendHandle>,
}
impl Root {
    fn backend(&self) -> hondana_storage::error::Result<BackendHandle> {
        match &self.backend {
            Some(backend) => Ok(Arc::clone(backend)),
            None => Ok(Arc::new(LocalBackend::existing(self.path.display().to_string(), &self.path)?)),
        }
    }
}

/// A folder or file the scan could not read.
#[derive(Debug)]
pub struct ScanFailure {
    pub path: PathBuf,
    pub error: Error,
}

/// Outcome of one scan or rescan.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Titles with at least one live volume.
    pub titles: usize,
    /// Live volumes.
    pub volumes: usize,
    /// Volumes seen for the first time.
    pub added: Vec<VolumeId>,
    /// Volumes whose file vanished during this scan.
    pub stale: Vec<VolumeId>,
    /// Previously stale volumes whose file is back.
    pub restored: Vec<VolumeId>,
    /// Volumes whose `(mtime, size)` changed; their thumbnails must go.
    pub invalidated: Vec<VolumeId>,
    /// Per-folder failures. None of them stopped the scan.
    pub errors: Vec<ScanFailure>,
}

/// Titles and volumes stored in flat arenas.
///
/// Volumes point at their title by arena index and are looked up by
/// [`VolumeId`] through a hash index. Nothing is ever removed from the
/// arenas: a volume whose file disappears is marked stale so bookmarks and
/// favorites keyed by its id keep resolving.
///
/// # Examples
///
/// ```no_run
/// use hondana_library::LibraryIndex;
///
/// # async fn example() {
/// let mut library = LibraryIndex::new(vec!["pdf".to_string()]);
/// let report = library.scan(["/media/manga"]).await;
/// for failure in &report.errors {
///     eprintln!("skipped {}: {}", failure.path.display(), failure.error);
/// }
/// for title in library.titles() {
///     println!("{} ({} volumes)", title.name, library.volumes(title).count());
/// }
/// # }
/// ```
pub struct LibraryIndex {
    extensions: Vec<String>,
    roots: Vec<Root>,
    titles: Vec<Title>,
    volumes: Vec<Volume>,
    by_id: HashMap<VolumeId, usize>,
    by_title_path: HashMap<PathBuf, usize>,
}

impl Default for LibraryIndex {
    fn default() -> Self {
        Self::new(vec![DEFAULT_EXTENSION.to_string()])
    }
}

impl LibraryIndex {
    /// Create an empty index accepting files with the given extensions
    /// (compared case-insensitively, leading dot optional).
    pub fn new(extensions: Vec<String>) -> Self {
        Self {
            extensions,
            roots: Vec::new(),
            titles: Vec::new(),
            volumes: Vec::new(),
            by_id: HashMap::new(),
            by_title_path: HashMap::new(),
        }
    }

    /// Replace the configured roots with local folders and scan them.
    ///
    /// Volumes below roots that are no longer configured become stale.
    pub async fn scan<P: Into<PathBuf>>(&mut self, roots: impl IntoIterator<Item = P>) -> ScanReport {
        self.roots = roots.into_iter().map(|path| Root { path: path.into(), backend: None }).collect();
        self.reconcile().await
    }

    /// Replace the configured roots with explicit backends and scan them.
    ///
    /// Each pair is the absolute path the root represents and the backend
    /// listing it; volume paths and identities derive from the former.
    pub async fn scan_backends(&mut self, roots: impl IntoIterator<Item = (PathBuf, BackendHandle)>) -> ScanReport {
        self.roots = roots.into_iter().map(|(path, backend)| Root { path, backend: Some(backend) }).collect();
        self.reconcile().await
    }

    /// Walk the roots of the previous scan again and reconcile.
    pub async fn rescan(&mut self) -> ScanReport {
        self.reconcile().await
    }

    /// Roots of the most recent scan, in configured order.
    pub fn roots(&self) -> impl Iterator<Item = &Path> {
        self.roots.iter().map(|root| root.path.as_path())
    }

    #[instrument(skip(self), fields(roots = self.roots.len()))]
    async fn reconcile(&mut self) -> ScanReport {
        let mut report = ScanReport::default();
        let mut seen = HashSet::new();
        // Volumes below these folders keep their state: they may still exist.
        let mut unknown = Vec::new();
        let roots = self.roots.clone();
        let extensions = self.extensions.clone();

        for root in &roots {
            let backend = match root.backend() {
                Ok(backend) => backend,
                Err(err) => {
                    warn!(root = %root.path.display(), error = %err, "library root unavailable");
                    if !is_missing(&err) {
                        unknown.push(root.path.clone());
                    }
                    let error = err.raise(ErrorKind::Listing(root.path.clone()));
                    report.errors.push(ScanFailure { path: root.path.clone(), error });
                    continue;
                },
            };
            let mut found = std::pin::pin!(walk(&root.path, &backend, &extensions));
            while let Some(item) = found.next().await {
                match item {
                    Ok(discovered) => match identify(&discovered.path) {
                        Ok(id) => {
                            seen.insert(id.clone());
                            self.upsert(&root.path, id, discovered, &mut report);
                        },
                        Err(error) => report.errors.push(ScanFailure { path: discovered.path, error }),
                    },
                    Err(error) => {
                        let folder = match &*error {
                            ErrorKind::Listing(folder) => folder.clone(),
                            _ => root.path.clone(),
                        };
                        warn!(folder = %folder.display(), error = %error, "cannot list folder");
                        unknown.push(folder.clone());
                        report.errors.push(ScanFailure { path: folder, error });
                    },
                }
            }
        }

        for volume in &mut self.volumes {
            let keep = seen.contains(&volume.id) || unknown.iter().any(|folder| volume.path.starts_with(folder));
            if !keep && !volume.stale {
                debug!(volume = %volume.id, path = %volume.path.display(), "volume vanished");
                volume.stale = true;
                report.stale.push(volume.id.clone());
            }
        }
        self.sort_titles();

        report.titles = self.titles().len();
        report.volumes = self.volumes.iter().filter(|v| !v.stale).count();
        info!(
            titles = report.titles,
            volumes = report.volumes,
            added = report.added.len(),
            stale = report.stale.len(),
            invalidated = report.invalidated.len(),
            errors = report.errors.len(),
            "library scan complete"
        );
        report
    }

    fn upsert(&mut self, root: &Path, id: VolumeId, found: Discovered, report: &mut ScanReport) {
        if let Some(&index) = self.by_id.get(&id) {
            let volume = &mut self.volumes[index];
            if volume.stale {
                volume.stale = false;
                report.restored.push(id.clone());
            }
            if volume.mtime != found.mtime || volume.size != found.size {
                debug!(volume = %id, "volume changed on disk");
                volume.mtime = found.mtime;
                volume.size = found.size;
                volume.page_count = None;
                volume.thumbnail_dirty = true;
                report.invalidated.push(id);
            }
            return;
        }

        let title = match self.by_title_path.get(&found.title_path) {
            Some(&title) => title,
            None => {
                self.titles.push(Title {
                    name: found.title_name,
                    root: root.to_path_buf(),
                    path: found.title_path.clone(),
                    volumes: Vec::new(),
                });
                self.by_title_path.insert(found.title_path, self.titles.len() - 1);
                self.titles.len() - 1
            },
        };
        self.titles[title].volumes.push(id.clone());
        self.by_id.insert(id.clone(), self.volumes.len());
        self.volumes.push(Volume {
            id: id.clone(),
            title,
            path: found.path,
            file_name: found.file_name,
            page_count: None,
            mtime: found.mtime,
            size: found.size,
            stale: false,
            thumbnail_dirty: false,
        });
        report.added.push(id);
    }

    fn sort_titles(&mut self) {
        let Self { titles, volumes, by_id, .. } = self;
        for title in titles.iter_mut() {
            title.volumes.sort_by(|a, b| {
                let name = |id: &VolumeId| by_id.get(id).map(|&i| volumes[i].file_name.as_str()).unwrap_or_default();
                natural_cmp(name(a), name(b))
            });
        }
    }

    /// Titles with at least one live volume: configured root order first,
    /// then natural order of the folder name.
    pub fn titles(&self) -> Vec<&Title> {
        let mut titles: Vec<(usize, &Title)> = self
            .titles
            .iter()
            .filter(|title| self.volumes(title).next().is_some())
            .map(|title| (self.roots.iter().position(|r| r.path == title.root).unwrap_or(usize::MAX), title))
            .collect();
        titles.sort_by(|(ra, a), (rb, b)| ra.cmp(rb).then_with(|| natural_cmp(&a.name, &b.name)));
        titles.into_iter().map(|(_, title)| title).collect()
    }

    /// Live volumes of a title in natural order.
    pub fn volumes<'a>(&'a self, title: &'a Title) -> impl Iterator<Item = &'a Volume> + 'a {
        title.volumes.iter().filter_map(|id| self.volume(id)).filter(|volume| !volume.stale)
    }

    /// Look up a volume, stale or not.
    pub fn volume(&self, id: &VolumeId) -> Option<&Volume> {
        self.by_id.get(id).map(|&index| &self.volumes[index])
    }

    /// Look up a volume that must still exist on disk.
    pub fn live_volume(&self, id: &VolumeId) -> Result<&Volume> {
        let volume = self.volume(id).ok_or_else(|| Error::from(ErrorKind::UnknownVolume(id.clone())))?;
        if volume.stale {
            exn::bail!(ErrorKind::StaleVolume(id.clone()));
        }
        Ok(volume)
    }

    /// The title a volume belongs to.
    pub fn title_of(&self, id: &VolumeId) -> Option<&Title> {
        self.volume(id).map(|volume| &self.titles[volume.title])
    }

    /// Record the page count learned when the volume was first opened.
    pub fn set_page_count(&mut self, id: &VolumeId, pages: u32) -> Result<()> {
        let index = *self.by_id.get(id).ok_or_else(|| Error::from(ErrorKind::UnknownVolume(id.clone())))?;
        self.volumes[index].page_count = Some(pages);
        Ok(())
    }

    /// Drain the set of volumes whose thumbnails must be regenerated.
    pub fn take_invalidated(&mut self) -> Vec<VolumeId> {
        self.volumes
            .iter_mut()
            .filter(|volume| volume.thumbnail_dirty)
            .map(|volume| {
                volume.thumbnail_dirty = false;
                volume.id.clone()
            })
            .collect()
    }
}
