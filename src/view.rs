use hondana_library::{Title, Volume, VolumeId};
use hondana_store::Bookmark;
use std::path::PathBuf;

/// A volume as the shell shows it: library data plus reading state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeView {
    pub id: VolumeId,
    pub title: String,
    pub file_name: String,
    pub path: PathBuf,
    pub page_count: Option<u32>,
    pub stale: bool,
    pub favorite: bool,
    pub bookmark: Option<Bookmark>,
}

impl VolumeView {
    pub(crate) fn new(title: &Title, volume: &Volume, favorite: bool, bookmark: Option<Bookmark>) -> Self {
        Self {
            id: volume.id.clone(),
            title: title.name.clone(),
            file_name: volume.file_name.clone(),
            path: volume.path.clone(),
            page_count: volume.page_count,
            stale: volume.stale,
            favorite,
            bookmark,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleView {
    pub name: String,
    pub path: PathBuf,
    /// Live volumes in natural order.
    pub volumes: Vec<VolumeView>,
}
