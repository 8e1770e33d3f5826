use crate::error::{ErrorKind, Result};
use crate::models::ThumbnailRecord;
use crate::repo::Repository;
use exn::ResultExt;
use hondana_library::VolumeId;
use hondana_render::Bitmap;
use hondana_storage::BackendHandle;
use hondana_storage::error::ErrorKind as StorageErrorKind;
use std::path::PathBuf;
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};

const THUMBNAIL_DIR: &str = "thumbnails";
// Rows fetched per purge round.
const PURGE_BATCH: u32 = 16;

/// PNG thumbnails under `thumbnails/`, indexed by the SQLite table.
///
/// A row without its file, a file that no longer decodes, or a row rendered
/// from another modification time are all cleaned up and reported as a miss.
#[derive(Clone)]
pub struct DiskCache {
    repo: Repository,
    backend: BackendHandle,
    capacity: Option<u64>,
}

impl DiskCache {
    /// `capacity` bounds the combined PNG size; `None` means unbounded.
    pub fn new(repo: Repository, backend: BackendHandle, capacity: Option<u64>) -> Self {
        Self { repo, backend, capacity }
    }

    pub fn file_path(id: &VolumeId) -> PathBuf {
        PathBuf::from(THUMBNAIL_DIR).join(format!("{id}.png"))
    }

    /// The stored thumbnail for `id` if it was rendered from `mtime`.
    pub async fn load(&self, id: &VolumeId, mtime: OffsetDateTime) -> Result<Option<(ThumbnailRecord, Bitmap)>> {
        let Some(record) = self.repo.get(id).await? else {
            return Ok(None);
        };
        if record.source_mtime != mtime {
            debug!(volume = %id, "disk thumbnail is stale");
            self.remove(id).await?;
            return Ok(None);
        }
        let bytes = match self.backend.read(&Self::file_path(id)).await {
            Ok(bytes) => bytes,
            Err(err) if matches!(&*err, StorageErrorKind::NotFound(_)) => {
                warn!(volume = %id, "thumbnail file missing, dropping index row");
                self.repo.delete(id).await?;
                return Ok(None);
            },
            Err(err) => return Err(err.raise(ErrorKind::Storage)),
        };
        match Bitmap::from_png(&bytes) {
            Ok(bitmap) => Ok(Some((record, bitmap))),
            Err(err) => {
                warn!(volume = %id, error = %err, "corrupt thumbnail file, dropping it");
                self.remove(id).await?;
                Ok(None)
            },
        }
    }

    /// Write the PNG, index it, then purge the oldest thumbnails while over
    /// capacity.
    #[instrument(skip(self, bitmap), fields(volume = %id))]
    pub async fn store(&self, id: &VolumeId, mtime: OffsetDateTime, bitmap: &Bitmap) -> Result<ThumbnailRecord> {
        let png = bitmap.to_png().or_raise(|| ErrorKind::Render)?;
        self.backend.write(&Self::file_path(id), &png).await.or_raise(|| ErrorKind::Storage)?;
        let record = ThumbnailRecord {
            volume_id: id.clone(),
            source_mtime: mtime,
            generated_at: OffsetDateTime::now_utc(),
            byte_size: png.len() as u64,
            width: bitmap.width(),
            height: bitmap.height(),
        };
        self.repo.upsert(&record).await?;
        self.purge(id).await?;
        Ok(record)
    }

    /// Drop the file and row for `id`. Returns whether a row existed.
    pub async fn remove(&self, id: &VolumeId) -> Result<bool> {
        match self.backend.delete(&Self::file_path(id)).await {
            Ok(()) => {},
            Err(err) if matches!(&*err, StorageErrorKind::NotFound(_)) => {},
            Err(err) => return Err(err.raise(ErrorKind::Storage)),
        }
        self.repo.delete(id).await
    }

    /// Combined size of every stored PNG.
    pub async fn total_bytes(&self) -> Result<u64> {
        self.repo.total_bytes().await
    }

    async fn purge(&self, keep: &VolumeId) -> Result<()> {
        let Some(capacity) = self.capacity else {
            return Ok(());
        };
        let mut total = self.repo.total_bytes().await?;
        while total > capacity {
            let candidates = self.repo.oldest(PURGE_BATCH).await?;
            let mut purged = false;
            for record in candidates.iter().filter(|r| &r.volume_id != keep) {
                self.remove(&record.volume_id).await?;
                total = total.saturating_sub(record.byte_size);
                purged = true;
                debug!(volume = %record.volume_id, bytes = record.byte_size, "purged thumbnail");
                if total <= capacity {
                    break;
                }
            }
            // Only the newest thumbnail is left; it stays even over capacity.
            if !purged {
                break;
            }
        }
        Ok(())
    }
}
