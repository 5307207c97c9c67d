//! Session memory for filachat.
//!
//! - [`SessionStore`]: the in-memory working set with per-session locks
//! - [`SessionStorage`] backends: [`FileStorage`], [`InMemoryStorage`] and,
//!   with the `sqlite` feature, `SqliteStorage`
//! - [`ContextEnricher`]: renders what a session remembers for the model
//! - autosave: the background save/evict timer

pub mod autosave;
pub mod enricher;
pub mod file_backend;
pub mod in_memory;
pub mod storage;
pub mod store;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use autosave::AutosaveHandle;
pub use enricher::ContextEnricher;
pub use file_backend::FileStorage;
pub use in_memory::InMemoryStorage;
pub use storage::SessionStorage;
pub use store::{SaveReport, SessionHandle, SessionStore, StoreConfig, StoreStats};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;

use filachat_config::MemoryConfig;
use filachat_core::error::StorageError;
use std::sync::Arc;

/// Build the storage backend named by `config.backend`.
pub async fn storage_from_config(
    config: &MemoryConfig,
) -> Result<Arc<dyn SessionStorage>, StorageError> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryStorage::new())),
        "file" => Ok(Arc::new(FileStorage::new(config.resolved_data_dir()))),
        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Arc::new(
            SqliteStorage::open_dir(&config.resolved_data_dir()).await?,
        )),
        other => Err(StorageError::Backend(format!(
            "memory backend '{other}' is not available in this build"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_memory_backend() {
        let config = MemoryConfig {
            backend: "memory".into(),
            ..Default::default()
        };
        let storage = storage_from_config(&config).await.unwrap();
        assert_eq!(storage.name(), "memory");
    }

    #[tokio::test]
    async fn builds_file_backend_in_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = MemoryConfig {
            backend: "file".into(),
            data_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let storage = storage_from_config(&config).await.unwrap();
        assert_eq!(storage.name(), "file");
    }

    #[tokio::test]
    async fn unknown_backend_is_error() {
        let config = MemoryConfig {
            backend: "redis".into(),
            ..Default::default()
        };
        assert!(storage_from_config(&config).await.is_err());
    }
}
