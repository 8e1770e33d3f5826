//! Reading state that outlives a session.
//!
//! Every store keeps its state in memory and persists it as a small
//! versioned JSON document through a [`BackendHandle`]. Writes replace the
//! whole document atomically, so a crash mid-write never corrupts it.
//!
//! [`BackendHandle`]: hondana_storage::BackendHandle

mod bookmark;
mod document;
pub mod error;
mod favorite;
mod roots;
mod set;

pub use crate::bookmark::{BOOKMARKS_FILE, Bookmark, BookmarkStore, DEFAULT_DEBOUNCE, clamp_page};
pub use crate::document::{DOCUMENT_VERSION, Document};
pub use crate::favorite::{FAVORITES_FILE, FavoritesRegistry};
pub use crate::roots::{ROOTS_FILE, RootRegistry};
