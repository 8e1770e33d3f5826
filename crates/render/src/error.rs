//! Render Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A render error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for render operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The file cannot be opened as a document. Show it as unavailable.
    #[display("unreadable document: {}", _0.display())]
    Unreadable(#[error(not(source))] PathBuf),
    /// The document opened but this page failed to render.
    #[display("failed to render page {_0}")]
    Render(#[error(not(source))] u32),
    #[display("page {_0} is out of range")]
    PageOutOfRange(#[error(not(source))] u32),
    /// Pixel buffer length does not match `width * height * 4`.
    #[display("invalid bitmap {_0}x{_1}")]
    InvalidBitmap(#[error(not(source))] u32, #[error(not(source))] u32),
    /// PNG encoding or decoding failed.
    Codec,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
