//! File metadata returned by storage backends.

use std::path::PathBuf;
use time::OffsetDateTime;

/// Metadata about one file in storage, as produced by listing or stat.
///
/// `size` and `modified` together form the fingerprint used to decide
/// whether derived data (thumbnails, page counts) is still valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Relative path from storage root
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: OffsetDateTime,
}
impl FileInfo {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: OffsetDateTime) -> Self {
        Self { path: path.into(), size, modified }
    }

    /// Number of path components below the storage root.
    pub fn depth(&self) -> usize {
        self.path.components().count()
    }

    /// Whether another listing of the same path describes identical content.
    pub fn same_fingerprint(&self, other: &FileInfo) -> bool {
        self.size == other.size && self.modified == other.modified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(FileInfo::new("vol1.pdf", 1, now).depth(), 1);
        assert_eq!(FileInfo::new("Series-A/vol1.pdf", 1, now).depth(), 2);
    }

    #[test]
    fn test_fingerprint() {
        let now = OffsetDateTime::now_utc();
        let a = FileInfo::new("Series-A/vol1.pdf", 10, now);
        assert!(a.same_fingerprint(&FileInfo::new("Series-A/vol1.pdf", 10, now)));
        assert!(!a.same_fingerprint(&FileInfo::new("Series-A/vol1.pdf", 11, now)));
        assert!(!a.same_fingerprint(&FileInfo::new("Series-A/vol1.pdf", 10, now + time::Duration::SECOND)));
    }
}
