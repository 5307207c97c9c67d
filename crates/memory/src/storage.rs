//! Durable storage boundary for session records.

use async_trait::async_trait;
use filachat_core::Session;
use filachat_core::error::StorageError;

/// Key-value persistence for [`Session`] records, keyed by session id.
///
/// Implementations must make `save` an upsert and `delete` of a missing key
/// a no-op. A record that exists but cannot be decoded is reported as
/// [`StorageError::Corrupted`] so callers can skip it.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Backend name (e.g. "file", "sqlite", "memory").
    fn name(&self) -> &str;

    /// Every stored session id.
    async fn list_keys(&self) -> Result<Vec<String>, StorageError>;

    /// Load one record. `Ok(None)` when no record exists.
    async fn load(&self, key: &str) -> Result<Option<Session>, StorageError>;

    /// Insert or replace a record.
    async fn save(&self, session: &Session) -> Result<(), StorageError>;

    /// Remove a record. Returns whether one existed.
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;
}
