//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// File or folder does not exist
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Access denied
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Path contains invalid characters or escapes root
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::BackendError(_))
    }

    /// The path this error is about, when there is one.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::NotFound(p) | Self::PermissionDenied(p) | Self::InvalidPath(p) => Some(p),
            Self::Io(_) | Self::BackendError(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(ErrorKind::Io(IoError::other("disk full")).is_retryable());
        assert!(!ErrorKind::NotFound(PathBuf::from("a")).is_retryable());
        assert!(!ErrorKind::InvalidPath(PathBuf::from("../a")).is_retryable());
    }

    #[test]
    fn test_path_accessor() {
        let kind = ErrorKind::PermissionDenied(PathBuf::from("Series-A"));
        assert_eq!(kind.path(), Some(std::path::Path::new("Series-A")));
        assert_eq!(ErrorKind::BackendError("x".to_string()).path(), None);
    }
}
