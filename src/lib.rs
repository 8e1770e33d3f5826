//! Hondana keeps a personal library of paginated document volumes: it
//! indexes titles and volumes below a set of root folders, remembers where
//! the reader stopped in each volume, keeps a favorites list and renders
//! thumbnails in the background.
//!
//! [`Shelf`] wires the workspace crates together:
//! - `hondana-library` finds titles and volumes and gives each a stable id
//! - `hondana-store` persists bookmarks, favorites and library roots
//! - `hondana-cache` renders and caches thumbnails off the interactive path
//! - `hondana-session` drives page navigation in the open volume
//! - `hondana-config` layers defaults, a config file and the environment

pub mod cli;
pub mod error;
mod shelf;
mod view;

pub use crate::shelf::Shelf;
pub use crate::view::{TitleView, VolumeView};
