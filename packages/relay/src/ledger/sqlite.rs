//! SQLite ledger.
//!
//! One table keyed by item id. Concurrent writers rely on `INSERT OR IGNORE`
//! being atomic; no application-level locking is involved.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::debug;

use crate::error::Result;
use crate::traits::Ledger;

/// SQLite-backed ledger.
pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    /// Open (creating if missing) the database file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let ledger = Self { pool };
        ledger.run_migrations().await?;
        debug!(path = %path.as_ref().display(), "Ledger opened");
        Ok(ledger)
    }

    /// Create an in-memory ledger (for testing).
    ///
    /// Each SQLite in-memory connection is its own database, so the pool is
    /// pinned to one connection that never expires.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let ledger = Self { pool };
        ledger.run_migrations().await?;
        Ok(ledger)
    }

    /// Safe to run on every startup.
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sent_images (
                id TEXT PRIMARY KEY
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Number of committed ids.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sent_images")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Ledger for SqliteLedger {
    async fn is_sent(&self, id: &str) -> Result<bool> {
        let row: Option<String> = sqlx::query_scalar("SELECT id FROM sent_images WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    async fn mark_sent(&self, id: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO sent_images (id) VALUES (?)")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_is_sent_absent() {
        let ledger = SqliteLedger::in_memory().await.unwrap();
        assert!(!ledger.is_sent("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_mark_sent_twice_keeps_one_row() {
        let ledger = SqliteLedger::in_memory().await.unwrap();

        ledger.mark_sent("a1").await.unwrap();
        ledger.mark_sent("a1").await.unwrap();

        assert!(ledger.is_sent("a1").await.unwrap());
        assert_eq!(ledger.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_marks_same_and_distinct_ids() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(SqliteLedger::open(dir.path().join("ledger.db")).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..20 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                // Every id is written by several tasks at once
                ledger.mark_sent(&format!("id-{}", i % 5)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(ledger.count().await.unwrap(), 5);
        for i in 0..5 {
            assert!(ledger.is_sent(&format!("id-{}", i)).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_reopen_keeps_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");

        {
            let ledger = SqliteLedger::open(&path).await.unwrap();
            ledger.mark_sent("persisted").await.unwrap();
            ledger.pool().close().await;
        }

        let reopened = SqliteLedger::open(&path).await.unwrap();
        assert!(reopened.is_sent("persisted").await.unwrap());
        assert_eq!(reopened.count().await.unwrap(), 1);
    }
}
