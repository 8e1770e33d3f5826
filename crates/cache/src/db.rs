//! SQLite pool for the thumbnail index.

use crate::error::{ErrorKind, Result};
use crate::repo::Repository;
use exn::ResultExt;
use sqlx::SqliteConnection;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::sqlite::SqliteSynchronous;
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
/// File name of the index inside the cache directory.
pub const DATABASE_FILE: &str = "thumbnails.db";
// One writer per finished render, reads from every worker.
const MAX_CONNECTIONS: u32 = 4;

/// Connection pool for the thumbnail index.
///
/// The index only describes which PNG files exist and what they were
/// rendered from. Deleting it costs a re-render, nothing more.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the index at `path` and apply migrations.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let options = Self::options().filename(path.as_ref()).create_if_missing(true);
        Self::with_options(options, MAX_CONNECTIONS).await
    }

    /// An index that lives as long as the pool.
    ///
    /// Not `#[cfg(test)]`: other crates' tests use it too.
    pub async fn connect_in_memory() -> Result<Self> {
        // Every connection to ":memory:" is a separate database.
        Self::with_options(Self::options().filename(":memory:"), 1).await
    }

    async fn with_options(options: SqliteConnectOptions, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            // Query-based PRAGMAs must run on every pooled connection, not
            // only the first one.
            .after_connect(|conn, meta| Box::pin(async move { Self::apply_pragmas(conn, meta).await }))
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    fn options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // Workers finishing together all write at once; WAL allows a
            // single writer.
            .busy_timeout(Duration::from_millis(1500))
            .auto_vacuum(SqliteAutoVacuum::None)
    }

    async fn apply_pragmas(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        sqlx::query(
            r#"
                PRAGMA wal_autocheckpoint = 800;
                PRAGMA cache_size = -2048;
                PRAGMA temp_store = MEMORY;
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    #[instrument("migrating thumbnail index", skip(self))]
    async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.or_raise(|| ErrorKind::Migration)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn repository(&self) -> Repository {
        Repository::from(self)
    }

    /// Close the pool after returning all connections.
    pub async fn close(&self) {
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_in_memory() {
        let db = Database::connect_in_memory().await.unwrap();
        assert!(!db.pool().is_closed());
        db.close().await;
        assert!(db.pool().is_closed());
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Database::connect_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        db.close().await;
    }

    #[tokio::test]
    async fn test_pragmas_are_applied() {
        let db = Database::connect_in_memory().await.unwrap();
        let row: (i64,) = sqlx::query_as("PRAGMA wal_autocheckpoint").fetch_one(db.pool()).await.unwrap();
        assert_eq!(row.0, 800);
        db.close().await;
    }

    #[tokio::test]
    async fn test_connect_creates_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join(DATABASE_FILE);
        let db = Database::connect(&path).await.unwrap();
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM thumbnails").fetch_one(db.pool()).await.unwrap();
        assert_eq!(row.0, 0);
        db.close().await;
        assert!(path.exists());
    }
}
