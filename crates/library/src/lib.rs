//! The bookshelf: stable volume identities and the in-memory index of
//! titles and volumes found below the configured library roots.

pub mod error;
mod identity;
mod index;
mod models;
mod scan;
mod sort;

pub use crate::identity::{VolumeId, identify, normalize};
pub use crate::index::{LibraryIndex, ScanFailure, ScanReport};
pub use crate::models::{Title, Volume};
pub use crate::sort::natural_cmp;

/// Volume file extension used when none is configured.
pub const DEFAULT_EXTENSION: &str = "pdf";
