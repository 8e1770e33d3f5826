//! Relative storage path validation.
//!
//! Every path handed to a backend is relative to that backend's root. This
//! module resolves such a path lexically and rejects anything that would
//! leave the root.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates and normalizes a path relative to a storage root.
///
/// `.` components and repeated separators are dropped, `..` is resolved
/// against the components seen so far. Nothing touches the filesystem.
///
/// > **Note:** Null bytes are rejected; backslashes and non-UTF8 bytes are
/// >           left alone.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use hondana_storage::validate_path;
/// assert!(validate_path("Series-A/vol1.pdf").is_ok());
/// assert!(validate_path("thumbnails/../bookmarks.json").is_ok());
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("a\0b").is_err());
/// assert_eq!(
///     validate_path("Series-A/./extras/../vol1.pdf/").unwrap(),
///     Path::new("Series-A/vol1.pdf")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let invalid = || ErrorKind::InvalidPath(original.to_path_buf());
    let mut components = Vec::new();
    for component in original.components() {
        match component {
            Component::Normal(s) => {
                // Path::components() lets NUL through on Unix; syscalls would
                // silently truncate at it.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(invalid());
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(invalid()),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(invalid());
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(invalid()),
        false => Ok(components.into_iter().collect()),
    }
}
