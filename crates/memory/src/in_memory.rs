//! In-memory session storage: for testing and ephemeral deployments.
//!
//! Records are kept serialized so a round-trip behaves like a real backend.

use async_trait::async_trait;
use filachat_core::Session;
use filachat_core::error::StorageError;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::storage::SessionStorage;

/// A process-local map of serialized sessions.
#[derive(Default)]
pub struct InMemoryStorage {
    records: RwLock<BTreeMap<String, String>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw record as-is (used to simulate damaged data in tests).
    pub async fn insert_raw(&self, key: impl Into<String>, raw: impl Into<String>) {
        self.records.write().await.insert(key.into(), raw.into());
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStorage for InMemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.records.read().await.keys().cloned().collect())
    }

    async fn load(&self, key: &str) -> Result<Option<Session>, StorageError> {
        let records = self.records.read().await;
        let Some(raw) = records.get(key) else {
            return Ok(None);
        };
        serde_json::from_str(raw)
            .map(Some)
            .map_err(|e| StorageError::Corrupted {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    async fn save(&self, session: &Session) -> Result<(), StorageError> {
        let raw = serde_json::to_string(session)
            .map_err(|e| StorageError::Backend(format!("serialization failed: {e}")))?;
        self.records
            .write()
            .await
            .insert(session.id.as_str().to_string(), raw);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.records.write().await.remove(key).is_some())
    }
}
