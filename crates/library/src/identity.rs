//! Stable volume identifiers derived from file paths.

use crate::error::{ErrorKind, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// Length of a lowercase hex BLAKE3 digest.
const HEX_LEN: usize = blake3::OUT_LEN * 2;

/// Opaque identifier of a volume: the lowercase hex BLAKE3 digest of its
/// normalized absolute path.
///
/// The same path always produces the same identifier, across rescans and
/// restarts, so bookmarks, favorites and thumbnails keyed by it survive both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VolumeId(String);

impl VolumeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for VolumeId {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        let well_formed = s.len() == HEX_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !well_formed {
            exn::bail!(ErrorKind::InvalidPath(PathBuf::from(s)));
        }
        Ok(Self(s.to_string()))
    }
}

impl Serialize for VolumeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for VolumeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(|_| serde::de::Error::custom(format!("malformed volume id `{s}`")))
    }
}

/// Normalize an absolute path lexically.
///
/// `.` components are dropped, `..` pops the previous component and
/// repeated separators collapse. The filesystem is never consulted, so
/// symlinks are not resolved.
///
/// # Errors
///
/// [`InvalidPath`](ErrorKind::InvalidPath) when the path is relative, empty,
/// names the filesystem root itself, contains a NUL byte, or uses `..` to
/// climb above the root.
pub fn normalize(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let invalid = || ErrorKind::InvalidPath(original.to_path_buf());
    if !original.is_absolute() {
        exn::bail!(invalid());
    }
    let mut anchor = PathBuf::new();
    let mut names = Vec::new();
    for component in original.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => anchor.push(component.as_os_str()),
            Component::CurDir => {},
            Component::ParentDir => {
                if names.pop().is_none() {
                    exn::bail!(invalid());
                }
            },
            Component::Normal(name) => {
                if name.as_encoded_bytes().contains(&0) {
                    exn::bail!(invalid());
                }
                names.push(name);
            },
        }
    }
    if names.is_empty() {
        exn::bail!(invalid());
    }
    anchor.extend(names);
    Ok(anchor)
}

/// Compute the identifier of the volume stored at `path`.
///
/// ```
/// use hondana_library::identify;
/// let a = identify("/media/manga/Series-A/vol1.pdf").unwrap();
/// let b = identify("/media/manga/./Series-A//extras/../vol1.pdf").unwrap();
/// assert_eq!(a, b);
/// assert!(identify("Series-A/vol1.pdf").is_err());
/// ```
pub fn identify(path: impl AsRef<Path>) -> Result<VolumeId> {
    let normalized = normalize(path)?;
    let digest = blake3::hash(normalized.as_os_str().as_encoded_bytes());
    Ok(VolumeId(digest.to_hex().to_string()))
}
