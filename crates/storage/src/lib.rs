//! Storage backends for everything hondana persists or reads from disk.
//!
//! Library roots are listed through a [`StorageBackend`], and the bookmark,
//! favorites and thumbnail stores write through one. Every write is atomic:
//! readers observe either the previous complete file or the new one.

pub mod backend;
pub mod error;
pub mod file;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::file::FileInfo;
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
