//! SQLite backend.
//!
//! Uses a single SQLite database file with one table:
//! - `kv_records`: one row per record, ordered by an autoincrement id
//!
//! Appends and replacements run inside a transaction so a record batch is
//! either fully visible or not at all.

use async_trait::async_trait;
use memoria_core::error::StorageError;
use memoria_core::store::KvStore;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

/// A SQLite-backed key-value store.
pub struct SqliteKv {
    pool: SqlitePool,
}

impl SqliteKv {
    /// Create a new SQLite backend from a file path.
    ///
    /// The database and table are created automatically.
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StorageError::io(path, format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::io(path, format!("Failed to open SQLite: {e}")))?;

        let backend = Self { pool };
        backend.run_migrations().await?;
        info!("SQLite key-value backend initialized at {path}");
        Ok(backend)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StorageError> {
        let backend = Self { pool };
        backend.run_migrations().await?;
        Ok(backend)
    }

    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_records (
                iid    INTEGER PRIMARY KEY AUTOINCREMENT,
                key    TEXT NOT NULL,
                value  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::io("kv_records", format!("migration: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_kv_records_key ON kv_records(key, iid)")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::io("kv_records", format!("key index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    async fn count(conn: &mut SqliteConnection, key: &str) -> Result<usize, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM kv_records WHERE key = ?1")
            .bind(key)
            .fetch_one(conn)
            .await
            .map_err(|e| StorageError::io(key, e))?;
        let n: i64 = row.try_get("n").map_err(|e| StorageError::io(key, e))?;
        Ok(n as usize)
    }
}

#[async_trait]
impl KvStore for SqliteKv {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get(&self, key: &str) -> Result<Vec<String>, StorageError> {
        let rows = sqlx::query("SELECT value FROM kv_records WHERE key = ?1 ORDER BY iid ASC")
            .bind(key)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::io(key, e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("value")
                    .map_err(|e| StorageError::Corrupt {
                        key: key.to_string(),
                        reason: e.to_string(),
                    })
            })
            .collect()
    }

    async fn append(&self, key: &str, values: Vec<String>) -> Result<usize, StorageError> {
        let mut tx = self.pool.begin().await.map_err(|e| StorageError::io(key, e))?;
        for value in values {
            sqlx::query("INSERT INTO kv_records (key, value) VALUES (?1, ?2)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::io(key, e))?;
        }
        // Counted before commit so a failed count never re-runs the insert.
        let len = Self::count(&mut *tx, key).await?;
        tx.commit().await.map_err(|e| StorageError::io(key, e))?;
        Ok(len)
    }

    async fn replace(&self, key: &str, values: Vec<String>) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(|e| StorageError::io(key, e))?;
        sqlx::query("DELETE FROM kv_records WHERE key = ?1")
            .bind(key)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::io(key, e))?;
        for value in values {
            sqlx::query("INSERT INTO kv_records (key, value) VALUES (?1, ?2)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::io(key, e))?;
        }
        tx.commit().await.map_err(|e| StorageError::io(key, e))
    }

    async fn remove(&self, key: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM kv_records WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::io(key, e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let rows = sqlx::query(
            "SELECT DISTINCT key FROM kv_records WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::io(prefix, e))?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("key").map_err(|e| StorageError::io(prefix, e)))
            .collect()
    }
}
