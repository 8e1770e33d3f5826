//! Shelf Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Each kind names the component that
//! failed; the component's own error sits below it in the tree.

use derive_more::{Display, Error};

/// A shelf error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for shelf operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("configuration error")]
    Config,
    /// A data or cache directory could not be prepared.
    #[display("storage error")]
    Storage,
    #[display("library error")]
    Library,
    /// Bookmarks, favorites or roots could not be loaded or written.
    #[display("reading state error")]
    Store,
    #[display("thumbnail cache error")]
    Cache,
    #[display("reading session error")]
    Session,
    /// A command-line argument is neither a volume id nor a usable path.
    #[display("invalid argument: {_0}")]
    InvalidArgument(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store | Self::Cache)
    }
}
