//! Thumbnail cache for library volumes.
//!
//! Thumbnails live in two tiers. The memory tier is a strict LRU bounded by
//! entry count and pixel bytes. The disk tier keeps PNG files under
//! `thumbnails/` in the cache directory, indexed by a small SQLite table
//! recording what each file was rendered from. Neither tier is a source of
//! truth: deleting the cache directory only costs re-renders.
//!
//! # Architecture
//! [`ThumbnailCache::request()`] answers from memory synchronously, or
//! queues a job for a fixed pool of worker tasks. Workers check the disk
//! tier, then render the first page through the [`Decoder`] on tokio's
//! blocking pool, bounded by a timeout. Failed renders become placeholders
//! that are kept in memory for a short while so a broken file is not
//! re-decoded on every repaint.
//!
//! [`Decoder`]: hondana_render::Decoder

mod cache;
mod db;
mod disk;
pub mod error;
mod memory;
mod models;
mod repo;
mod thumbnail;

pub use crate::cache::{CacheSettings, ThumbnailCache};
pub use crate::db::{DATABASE_FILE, Database};
pub use crate::disk::DiskCache;
pub use crate::models::ThumbnailRecord;
pub use crate::repo::Repository;
pub use crate::thumbnail::{Pending, Preview, Request, Thumbnail, ThumbnailEvent, ThumbnailSource};
