//! Cache Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// A stored row could not be converted back into a model.
    #[display("invalid cache data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
    /// Reading or writing a thumbnail file failed.
    #[display("thumbnail storage error")]
    Storage,
    /// The decoder could not produce a preview.
    #[display("thumbnail render failed")]
    Render,
    /// Rendering took longer than the configured timeout.
    #[display("thumbnail render timed out")]
    Timeout,
    /// The request was cancelled before a worker picked it up.
    #[display("thumbnail request cancelled")]
    Cancelled,
    /// The cache has been shut down.
    #[display("thumbnail cache is shut down")]
    Closed,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage | Self::Timeout | Self::Cancelled)
    }
}
