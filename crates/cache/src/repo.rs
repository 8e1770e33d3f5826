//! Queries over the `thumbnails` table.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{ThumbnailRecord, ThumbnailRow};
use exn::ResultExt;
use hondana_library::VolumeId;
use sqlx::SqlitePool;

/// Repository for thumbnail index rows.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl Repository {
    pub async fn get(&self, id: &VolumeId) -> Result<Option<ThumbnailRecord>> {
        let row: Option<ThumbnailRow> = sqlx::query_as(include_str!("../queries/get_thumbnail.sql"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(ThumbnailRecord::try_from).transpose()
    }

    /// Insert or replace the row for `record.volume_id`.
    pub async fn upsert(&self, record: &ThumbnailRecord) -> Result<()> {
        let row = ThumbnailRow::try_from(record)?;
        sqlx::query(include_str!("../queries/upsert_thumbnail.sql"))
            .bind(row.volume_id)
            .bind(row.source_mtime)
            .bind(row.generated_at)
            .bind(row.byte_size)
            .bind(row.width)
            .bind(row.height)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Returns whether a row existed.
    pub async fn delete(&self, id: &VolumeId) -> Result<bool> {
        let result = sqlx::query(include_str!("../queries/delete_thumbnail.sql"))
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Combined size of every indexed PNG file.
    pub async fn total_bytes(&self) -> Result<u64> {
        let (total,): (i64,) = sqlx::query_as(include_str!("../queries/total_bytes.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(total).or_raise(|| ErrorKind::InvalidData("total size"))
    }

    /// The `limit` least recently generated thumbnails, oldest first.
    pub async fn oldest(&self, limit: u32) -> Result<Vec<ThumbnailRecord>> {
        let rows: Vec<ThumbnailRow> = sqlx::query_as(include_str!("../queries/list_oldest.sql"))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(ThumbnailRecord::try_from).collect()
    }
}
