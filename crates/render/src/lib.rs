//! The boundary to the page-decoding engine.
//!
//! Hondana never parses documents itself. A [`Decoder`] opens a file and
//! hands back a [`Document`] that knows its page count and renders single
//! pages into RGBA [`Bitmap`]s. Both calls block, so callers run them on
//! tokio's blocking pool.

mod bitmap;
pub mod error;
#[cfg(feature = "mock")]
mod mock;

pub use crate::bitmap::Bitmap;
use crate::error::Result;
#[cfg(feature = "mock")]
pub use crate::mock::MockDecoder;
use std::path::Path;
use std::sync::Arc;

pub type DecoderHandle = Arc<dyn Decoder + Send + Sync>;

/// Opens paginated documents.
pub trait Decoder: Send + Sync {
    /// Open the document at `path`.
    ///
    /// # Errors
    ///
    /// [`Unreadable`](error::ErrorKind::Unreadable) when the file is
    /// missing, corrupt, encrypted or not a supported document.
    fn open(&self, path: &Path) -> Result<Box<dyn Document>>;
}

/// An opened document.
pub trait Document: Send {
    fn page_count(&self) -> u32;

    /// Render one zero-based page at its natural size.
    fn render_page(&mut self, index: u32) -> Result<Bitmap>;
}
