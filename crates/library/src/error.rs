//! Library Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use crate::identity::VolumeId;
use derive_more::{Display, Error};
use std::path::PathBuf;

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies library failures.
///
/// ### Operational Errors
/// - [`ErrorKind::InvalidPath`]
/// - [`ErrorKind::StaleVolume`]
/// - [`ErrorKind::UnknownVolume`]
///
/// ### Dependency Errors
/// - [`ErrorKind::Listing`] - the storage backend could not list a root or
///   title folder.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Path is relative, empty, contains NUL, or escapes the filesystem root.
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// A root or title folder could not be listed.
    #[display("cannot list folder: {}", _0.display())]
    Listing(#[error(not(source))] PathBuf),
    /// The volume's file disappeared during the last rescan.
    #[display("volume {_0} is stale")]
    StaleVolume(#[error(not(source))] VolumeId),
    /// No volume with this identifier was ever scanned.
    #[display("unknown volume {_0}")]
    UnknownVolume(#[error(not(source))] VolumeId),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Listing(_))
    }
}
