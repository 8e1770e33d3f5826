use crate::identity::VolumeId;
use std::path::PathBuf;
use time::OffsetDateTime;

/// A folder directly below a library root, holding volume files.
#[derive(Debug, Clone)]
pub struct Title {
    /// Folder name, used for display and ordering.
    pub name: String,
    /// Library root the folder was found under.
    pub root: PathBuf,
    /// Absolute path of the folder.
    pub path: PathBuf,
    /// Volumes in natural filename order, stale ones included.
    pub volumes: Vec<VolumeId>,
}

/// One document file inside a title folder.
#[derive(Debug, Clone)]
pub struct Volume {
    pub id: VolumeId,
    /// Index of the owning [`Title`] in the library arena.
    pub title: usize,
    /// Absolute path of the file.
    pub path: PathBuf,
    pub file_name: String,
    /// Unknown until the volume is first opened.
    pub page_count: Option<u32>,
    pub mtime: OffsetDateTime,
    pub size: u64,
    /// The file was missing from the last scan.
    pub stale: bool,
    /// The file changed since its thumbnail was generated.
    pub thumbnail_dirty: bool,
}
