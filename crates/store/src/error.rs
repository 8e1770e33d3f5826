//! Store Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Persisting a document failed after all retries. The in-memory state
    /// is still authoritative and will be written by the next flush.
    #[display("failed to write {}", _0.display())]
    WriteFailure(#[error(not(source))] PathBuf),
    /// The document exists but could not be read.
    #[display("failed to read {}", _0.display())]
    ReadFailure(#[error(not(source))] PathBuf),
    /// The document is not valid JSON or does not match the expected shape.
    #[display("corrupt document {}", _0.display())]
    Corrupt(#[error(not(source))] PathBuf),
    /// The document was written by a newer version of hondana.
    #[display("unsupported document version {_0}")]
    UnsupportedVersion(#[error(not(source))] u32),
    /// Library roots must be absolute folder paths.
    #[display("invalid library root: {}", _0.display())]
    InvalidRoot(#[error(not(source))] PathBuf),
    /// The background writer has been shut down.
    #[display("store is shut down")]
    Closed,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::WriteFailure(_) | Self::ReadFailure(_))
    }
}
