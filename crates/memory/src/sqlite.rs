//! SQLite session storage.
//!
//! A single `sessions` table holding the JSON-encoded record next to its
//! last-activity timestamp, so retention sweeps can be answered by an index.

use async_trait::async_trait;
use filachat_core::Session;
use filachat_core::error::StorageError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use crate::storage::SessionStorage;

/// SQLite-backed [`SessionStorage`].
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a database from a connection string.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database.
    pub async fn new(url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StorageError::Backend(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // One connection: an in-memory database is per-connection
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to open SQLite: {e}")))?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        info!("SQLite session storage initialized at {url}");
        Ok(storage)
    }

    /// Open `sessions.db` inside `dir`, creating the directory if needed.
    pub async fn open_dir(dir: &Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(dir).map_err(|e| StorageError::Io {
            key: dir.display().to_string(),
            reason: e.to_string(),
        })?;
        let url = format!("sqlite://{}", dir.join("sessions.db").display());
        Self::new(&url).await
    }

    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id            TEXT PRIMARY KEY NOT NULL,
                data          TEXT NOT NULL,
                last_activity TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(format!("sessions table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sessions_last_activity ON sessions(last_activity)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(format!("last_activity index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }
}

#[async_trait]
impl SessionStorage for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn list_keys(&self) -> Result<Vec<String>, StorageError> {
        let rows = sqlx::query("SELECT id FROM sessions ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("SELECT failed: {e}")))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("id")
                    .map_err(|e| StorageError::Backend(e.to_string()))
            })
            .collect()
    }

    async fn load(&self, key: &str) -> Result<Option<Session>, StorageError> {
        let row = sqlx::query("SELECT data FROM sessions WHERE id = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("SELECT failed: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let data: String = row
            .try_get("data")
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        serde_json::from_str(&data)
            .map(Some)
            .map_err(|e| StorageError::Corrupted {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    async fn save(&self, session: &Session) -> Result<(), StorageError> {
        let data = serde_json::to_string(session)
            .map_err(|e| StorageError::Backend(format!("serialization failed: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO sessions (id, data, last_activity)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                data = excluded.data,
                last_activity = excluded.last_activity
            "#,
        )
        .bind(session.id.as_str())
        .bind(&data)
        .bind(session.last_activity.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(format!("INSERT failed: {e}")))?;

        debug!(session_id = %session.id, "Session saved");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("DELETE failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filachat_core::{DefaultDevice, SessionId, Turn};

    async fn test_storage() -> SqliteStorage {
        SqliteStorage::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn save_and_load() {
        let db = test_storage().await;
        let mut session = Session::new(SessionId::from("sql-1"));
        session.append_turn(Turn::user("Qual minha posição na fila?"));
        session.set_default_device(DefaultDevice {
            access_key: "k".into(),
            provider_id: 11,
            location_id: 11,
        });
        db.save(&session).await.unwrap();

        let loaded = db.load("sql-1").await.unwrap().unwrap();
        assert_eq!(loaded.transcript, session.transcript);
        assert_eq!(loaded.default_device, session.default_device);
    }

    #[tokio::test]
    async fn upsert_on_conflict() {
        let db = test_storage().await;
        let mut session = Session::new(SessionId::from("sql-1"));
        db.save(&session).await.unwrap();
        session.increment_interactions();
        session.increment_interactions();
        db.save(&session).await.unwrap();

        assert_eq!(db.list_keys().await.unwrap(), vec!["sql-1".to_string()]);
        assert_eq!(db.load("sql-1").await.unwrap().unwrap().interaction_count, 2);
    }

    #[tokio::test]
    async fn delete_and_missing() {
        let db = test_storage().await;
        db.save(&Session::new(SessionId::from("sql-1"))).await.unwrap();
        assert!(db.delete("sql-1").await.unwrap());
        assert!(!db.delete("sql-1").await.unwrap());
        assert!(db.load("sql-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn open_dir_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let db = SqliteStorage::open_dir(&dir.path().join("data")).await.unwrap();
        db.save(&Session::new(SessionId::from("x"))).await.unwrap();
        assert!(dir.path().join("data").join("sessions.db").exists());
    }
}
