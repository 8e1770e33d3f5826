//! Session Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;
use std::time::Duration;

/// A session error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The volume is missing, corrupt or has no pages. The session is closed.
    #[display("cannot read volume: {}", _0.display())]
    Unreadable(#[error(not(source))] PathBuf),
    /// Navigation needs an open volume.
    #[display("no volume is open")]
    NotOpen,
    /// A page of the open volume failed to render.
    #[display("failed to render page {_0}")]
    Render(#[error(not(source))] u32),
    /// Auto-advance intervals are whole seconds between 1 and 60.
    #[display("auto-advance interval out of range: {_0:?}")]
    InvalidInterval(#[error(not(source))] Duration),
    /// Flushing the bookmark store failed. The position is kept in memory.
    #[display("failed to persist reading position")]
    Bookmarks,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Render(_) | Self::Bookmarks)
    }
}
