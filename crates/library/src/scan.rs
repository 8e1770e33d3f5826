//! Walking one library root for title folders and volume files.

use crate::error::{ErrorKind, Result};
use async_stream::stream;
use futures::Stream;
use hondana_storage::error::ErrorKind as StorageErrorKind;
use hondana_storage::{BackendHandle, FileInfo};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// Title folder plus volume file: the only depth the walk descends to.
const VOLUME_DEPTH: usize = 2;

/// A volume file found below a root.
#[derive(Debug)]
pub(crate) struct Discovered {
    pub title_name: String,
    pub title_path: PathBuf,
    pub file_name: String,
    /// Absolute path of the volume file.
    pub path: PathBuf,
    pub size: u64,
    pub mtime: OffsetDateTime,
}

/// Whether a storage failure means the listed folder is gone, rather than
/// merely unreadable right now.
pub(crate) fn is_missing(err: &hondana_storage::error::Error) -> bool {
    matches!(&**err, StorageErrorKind::NotFound(_))
}

/// Stream every volume file below `root`.
///
/// Folders that cannot be listed yield a [`Listing`](ErrorKind::Listing)
/// error naming the absolute folder path; the walk carries on with the
/// remaining folders. Files directly inside the root, files deeper than one
/// folder, and files with other extensions are ignored.
pub(crate) fn walk<'a>(
    root: &'a Path,
    backend: &'a BackendHandle,
    extensions: &'a [String],
) -> impl Stream<Item = Result<Discovered>> + 'a {
    stream!({
        for await item in backend.list_stream(None, Some(VOLUME_DEPTH)) {
            match item {
                Ok(info) => {
                    if let Some(discovered) = classify(root, info, extensions) {
                        yield Ok(discovered);
                    }
                },
                Err(err) => {
                    // Local listings report absolute folders, others relative ones.
                    let folder = err.path().map(|p| root.join(p)).unwrap_or_else(|| root.to_path_buf());
                    yield Err(err.raise(ErrorKind::Listing(folder)));
                },
            }
        }
    })
}

fn classify(root: &Path, info: FileInfo, extensions: &[String]) -> Option<Discovered> {
    if info.depth() != VOLUME_DEPTH || !has_extension(&info.path, extensions) {
        return None;
    }
    let mut components = info.path.iter();
    let title_name = components.next()?.to_string_lossy().into_owned();
    let file_name = components.next()?.to_string_lossy().into_owned();
    Some(Discovered {
        title_path: root.join(&title_name),
        path: root.join(&info.path),
        title_name,
        file_name,
        size: info.size,
        mtime: info.modified,
    })
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions.iter().any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use hondana_storage::backend::MockBackend;
    use rstest::rstest;
    use std::sync::Arc;

    #[rstest]
    #[case("Series-A/vol1.pdf", true)]
    #[case("Series-A/VOL1.PDF", true)]
    #[case("Series-A/notes.txt", false)]
    #[case("Series-A/pdf", false)]
    fn test_has_extension(#[case] path: &str, #[case] expected: bool) {
        assert_eq!(has_extension(Path::new(path), &["pdf".to_string()]), expected);
    }

    #[test]
    fn test_extension_with_leading_dot() {
        assert!(has_extension(Path::new("a/b.cbz"), &[".CBZ".to_string()]));
    }

    #[tokio::test]
    async fn test_walk_keeps_volume_depth_only() {
        let backend: BackendHandle = Arc::new(MockBackend::with_files([
            ("loose.pdf", Vec::from(*b"x")),
            ("Series-A/vol1.pdf", Vec::from(*b"x")),
            ("Series-A/cover.jpg", Vec::from(*b"x")),
            ("Series-A/extras/art.pdf", Vec::from(*b"x")),
        ]));
        let root = Path::new("/library");
        let extensions = vec!["pdf".to_string()];
        let found: Vec<_> = walk(root, &backend, &extensions).collect().await;
        assert_eq!(found.len(), 1);
        let volume = found.into_iter().next().unwrap().unwrap();
        assert_eq!(volume.title_name, "Series-A");
        assert_eq!(volume.title_path, Path::new("/library/Series-A"));
        assert_eq!(volume.path, Path::new("/library/Series-A/vol1.pdf"));
        assert_eq!(volume.file_name, "vol1.pdf");
    }

    #[tokio::test]
    async fn test_walk_reports_unreadable_folder() {
        let mock = MockBackend::with_files([("Locked/vol1.pdf", Vec::from(*b"x")), ("Open/vol1.pdf", Vec::from(*b"x"))]);
        mock.deny_listing("Locked");
        let backend: BackendHandle = Arc::new(mock);
        let extensions = vec!["pdf".to_string()];
        let found: Vec<_> = walk(Path::new("/library"), &backend, &extensions).collect().await;
        let errors: Vec<_> = found.iter().filter_map(|r| r.as_ref().err()).collect();
        assert_eq!(errors.len(), 1);
        assert!(matches!(&**errors[0], ErrorKind::Listing(p) if p == Path::new("/library/Locked")));
        assert_eq!(found.iter().filter(|r| r.is_ok()).count(), 1);
    }
}
