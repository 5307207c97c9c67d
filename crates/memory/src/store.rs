//! The session store: the in-memory working set of sessions over a
//! [`SessionStorage`] backend.
//!
//! Locking is two-level. The map lock is held only to look up or insert a
//! handle. Each session has its own `tokio::sync::Mutex`; the orchestrator
//! holds it for a whole turn, so turns on one session are serialized while
//! turns on different sessions never wait on each other.

use chrono::{DateTime, Utc};
use filachat_config::MemoryConfig;
use filachat_core::error::StorageError;
use filachat_core::{
    CompletedEntity, DefaultDevice, DomainEvent, EventBus, ProfilePatch, ServicesPatch, Session,
    SessionConfiguration, SessionId, SetupPatch,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::enricher::ContextEnricher;
use crate::storage::SessionStorage;

/// Shared, lockable session.
pub type SessionHandle = Arc<Mutex<Session>>;

/// Lifecycle settings for a [`SessionStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Sessions idle longer than this leave the working set.
    pub idle_eviction: Duration,
    /// Records idle longer than this are deleted from storage.
    pub disk_retention: Duration,
    /// Completed entities kept per session.
    pub entity_history: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::from(&MemoryConfig::default())
    }
}

impl From<&MemoryConfig> for StoreConfig {
    fn from(config: &MemoryConfig) -> Self {
        Self {
            idle_eviction: config.idle_eviction(),
            disk_retention: config.disk_retention(),
            entity_history: config.entity_history,
        }
    }
}

/// Outcome of a save pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    pub saved: usize,
    /// Sessions locked by an in-flight turn (non-blocking passes only)
    pub skipped: usize,
    pub failed: usize,
}

/// Aggregate statistics over the working set.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub backend: String,
    pub active_sessions: usize,
    /// Sessions that know the user's name
    pub sessions_with_user_data: usize,
    pub total_interactions: u64,
    pub average_interactions_per_session: f64,
    pub total_entities: usize,
    pub oldest_activity: Option<DateTime<Utc>>,
    pub newest_activity: Option<DateTime<Utc>>,
}

/// The session registry.
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    storage: Arc<dyn SessionStorage>,
    config: StoreConfig,
    enricher: ContextEnricher,
    events: Option<Arc<EventBus>>,
}

fn age(last_activity: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - last_activity).to_std().unwrap_or_default()
}

impl SessionStore {
    /// Open a store over `storage`, loading every retained record.
    ///
    /// Records idle beyond the retention window are deleted. Records that
    /// fail to decode are logged and skipped.
    pub async fn open(
        storage: Arc<dyn SessionStorage>,
        config: StoreConfig,
    ) -> Result<Self, StorageError> {
        let now = Utc::now();
        let mut sessions = HashMap::new();
        let mut expired = 0usize;

        for key in storage.list_keys().await? {
            match storage.load(&key).await {
                Ok(Some(session)) => {
                    if age(session.last_activity, now) > config.disk_retention {
                        expired += 1;
                        if let Err(e) = storage.delete(&key).await {
                            warn!(
                                session_id = %key,
                                error = %e,
                                "Failed to delete expired session"
                            );
                        }
                    } else {
                        sessions.insert(session.id.clone(), Arc::new(Mutex::new(session)));
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(session_id = %key, error = %e, "Skipping unreadable session"),
            }
        }

        info!(
            backend = storage.name(),
            loaded = sessions.len(),
            expired,
            "Session store opened"
        );

        Ok(Self {
            sessions: RwLock::new(sessions),
            storage,
            config,
            enricher: ContextEnricher::default(),
            events: None,
        })
    }

    /// Use a specific enricher (labels come from the domain config).
    pub fn with_enricher(mut self, enricher: ContextEnricher) -> Self {
        self.enricher = enricher;
        self
    }

    /// Publish eviction events on `bus`.
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn enricher(&self) -> &ContextEnricher {
        &self.enricher
    }

    pub fn backend_name(&self) -> &str {
        self.storage.name()
    }

    fn retained(&self, session: &Session, now: DateTime<Utc>) -> bool {
        age(session.last_activity, now) <= self.config.disk_retention
    }

    /// Get the handle for `id`, creating the session if needed.
    ///
    /// A session missing from the working set is rehydrated from storage
    /// when a retained record exists, so eviction is invisible to callers.
    pub async fn acquire(&self, id: &SessionId) -> SessionHandle {
        if let Some(handle) = self.sessions.read().await.get(id) {
            return handle.clone();
        }

        // Storage I/O happens outside the map lock
        let loaded = match self.storage.load(id.as_str()).await {
            Ok(Some(session)) if self.retained(&session, Utc::now()) => {
                debug!(session_id = %id, "Session rehydrated from storage");
                Some(session)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(session_id = %id, error = %e, "Stored session unreadable, starting fresh");
                None
            }
        };

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(id.clone())
            .or_insert_with(|| {
                if loaded.is_none() {
                    debug!(session_id = %id, "Session created");
                }
                Arc::new(Mutex::new(
                    loaded.unwrap_or_else(|| Session::new(id.clone())),
                ))
            })
            .clone()
    }

    async fn existing(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Snapshot of the session, creating it if needed.
    pub async fn get_or_create(&self, id: &SessionId) -> Session {
        self.acquire(id).await.lock().await.clone()
    }

    /// Snapshot of a session in the working set.
    pub async fn snapshot(&self, id: &SessionId) -> Option<Session> {
        let handle = self.existing(id).await?;
        let session = handle.lock().await;
        Some(session.clone())
    }

    /// Merge profile attributes. Returns whether anything changed.
    pub async fn update_user_data(&self, id: &SessionId, patch: ProfilePatch) -> bool {
        self.acquire(id).await.lock().await.merge_profile(patch)
    }

    pub async fn add_completed_entity(&self, id: &SessionId, entity: CompletedEntity) {
        let capacity = self.config.entity_history;
        self.acquire(id)
            .await
            .lock()
            .await
            .record_entity(entity, capacity);
    }

    pub async fn set_default_device(&self, id: &SessionId, device: DefaultDevice) {
        self.acquire(id).await.lock().await.set_default_device(device);
    }

    /// Increment and return the interaction counter.
    pub async fn increment_interaction_count(&self, id: &SessionId) -> u64 {
        self.acquire(id).await.lock().await.increment_interactions()
    }

    pub async fn update_summary(&self, id: &SessionId, summary: impl Into<String>) {
        self.acquire(id).await.lock().await.set_summary(summary);
    }

    pub async fn update_setup_status(&self, id: &SessionId, patch: SetupPatch) {
        self.acquire(id).await.lock().await.update_setup(patch);
    }

    /// Merge monitored-service flags; marks services as configured.
    pub async fn update_monitored_services(&self, id: &SessionId, patch: ServicesPatch) {
        self.acquire(id).await.lock().await.update_services(patch);
    }

    /// Merge system details; marks system info as collected.
    pub async fn update_system_info(&self, id: &SessionId, details: BTreeMap<String, Value>) {
        self.acquire(id).await.lock().await.update_system_info(details);
    }

    /// Services, system info and setup flags of a session in the working set.
    pub async fn session_configuration(&self, id: &SessionId) -> Option<SessionConfiguration> {
        let handle = self.existing(id).await?;
        let session = handle.lock().await;
        Some(session.configuration())
    }

    pub async fn is_setup_complete(&self, id: &SessionId) -> bool {
        match self.existing(id).await {
            Some(handle) => handle.lock().await.setup.setup_complete,
            None => false,
        }
    }

    /// The enrichment block for a session. Empty for unknown sessions.
    pub async fn enriched_context(&self, id: &SessionId) -> String {
        match self.existing(id).await {
            Some(handle) => self.enricher.render(&*handle.lock().await),
            None => String::new(),
        }
    }

    /// Forget a session, in memory and in storage.
    pub async fn reset(&self, id: &SessionId) -> Result<bool, StorageError> {
        let in_memory = self.sessions.write().await.remove(id).is_some();
        let on_disk = self.storage.delete(id.as_str()).await?;
        info!(session_id = %id, in_memory, on_disk, "Session reset");
        Ok(in_memory || on_disk)
    }

    /// Persist one session now.
    pub async fn save(&self, id: &SessionId) -> Result<bool, StorageError> {
        let Some(handle) = self.existing(id).await else {
            return Ok(false);
        };
        let snapshot = handle.lock().await.clone();
        self.storage.save(&snapshot).await?;
        Ok(true)
    }

    async fn handles(&self) -> Vec<(SessionId, SessionHandle)> {
        self.sessions
            .read()
            .await
            .iter()
            .map(|(id, handle)| (id.clone(), handle.clone()))
            .collect()
    }

    /// Persist every session in the working set.
    ///
    /// With `wait = false` sessions locked by an in-flight turn are skipped;
    /// with `wait = true` every lock is awaited.
    pub async fn save_all(&self, wait: bool) -> SaveReport {
        let mut report = SaveReport::default();

        for (id, handle) in self.handles().await {
            let snapshot = if wait {
                handle.lock().await.clone()
            } else {
                match handle.try_lock() {
                    Ok(session) => session.clone(),
                    Err(_) => {
                        report.skipped += 1;
                        continue;
                    }
                }
            };

            match self.storage.save(&snapshot).await {
                Ok(()) => report.saved += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(session_id = %id, error = %e, "Failed to save session");
                }
            }
        }

        debug!(
            saved = report.saved,
            skipped = report.skipped,
            failed = report.failed,
            "Save pass complete"
        );
        report
    }

    /// Drop sessions idle beyond the eviction window, saving them first.
    ///
    /// A session is kept when its save fails, when it is locked, or when it
    /// gained activity or another holder while being saved.
    pub async fn evict_idle(&self) -> usize {
        let now = Utc::now();
        let mut evicted = 0;

        for (id, handle) in self.handles().await {
            let snapshot = match handle.try_lock() {
                Ok(session) if age(session.last_activity, now) > self.config.idle_eviction => {
                    session.clone()
                }
                _ => continue,
            };

            if let Err(e) = self.storage.save(&snapshot).await {
                warn!(session_id = %id, error = %e, "Keeping idle session, save failed");
                continue;
            }

            let mut sessions = self.sessions.write().await;
            let unchanged = sessions
                .get(&id)
                .is_some_and(|current| Arc::ptr_eq(current, &handle))
                // map + this loop
                && Arc::strong_count(&handle) == 2
                && handle
                    .try_lock()
                    .is_ok_and(|s| s.last_activity == snapshot.last_activity);

            if unchanged {
                sessions.remove(&id);
                evicted += 1;
                debug!(session_id = %id, "Idle session evicted");
                if let Some(bus) = &self.events {
                    bus.publish(DomainEvent::SessionEvicted {
                        session_id: id.to_string(),
                        timestamp: Utc::now(),
                    });
                }
            }
        }

        if evicted > 0 {
            info!(evicted, "Evicted idle sessions");
        }
        evicted
    }

    /// Delete stored records of sessions outside the working set whose
    /// last activity is past the retention window.
    pub async fn purge_expired(&self) -> usize {
        let keys = match self.storage.list_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Retention sweep could not list sessions");
                return 0;
            }
        };

        let now = Utc::now();
        let mut purged = 0;
        for key in keys {
            let id = SessionId::from(key.as_str());
            if self.sessions.read().await.contains_key(&id) {
                continue;
            }
            match self.storage.load(&key).await {
                Ok(Some(session)) if !self.retained(&session, now) => {
                    match self.storage.delete(&key).await {
                        Ok(_) => purged += 1,
                        Err(e) => warn!(
                            session_id = %key,
                            error = %e,
                            "Failed to delete expired session"
                        ),
                    }
                }
                Ok(_) => {}
                Err(e) => debug!(session_id = %key, error = %e, "Skipping unreadable record"),
            }
        }

        if purged > 0 {
            info!(purged, "Expired session records deleted");
        }
        purged
    }

    /// Ids of every session in the working set, sorted.
    pub async fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn stats(&self) -> StoreStats {
        let mut stats = StoreStats {
            backend: self.storage.name().to_string(),
            active_sessions: 0,
            sessions_with_user_data: 0,
            total_interactions: 0,
            average_interactions_per_session: 0.0,
            total_entities: 0,
            oldest_activity: None,
            newest_activity: None,
        };

        for (_, handle) in self.handles().await {
            let session = handle.lock().await;
            stats.active_sessions += 1;
            if session.profile.name.is_some() {
                stats.sessions_with_user_data += 1;
            }
            stats.total_interactions += session.interaction_count;
            stats.total_entities += session.completed.len();
            stats.oldest_activity = Some(
                stats
                    .oldest_activity
                    .map_or(session.last_activity, |t| t.min(session.last_activity)),
            );
            stats.newest_activity = Some(
                stats
                    .newest_activity
                    .map_or(session.last_activity, |t| t.max(session.last_activity)),
            );
        }

        stats.average_interactions_per_session =
            stats.total_interactions as f64 / stats.active_sessions.max(1) as f64;
        stats
    }
}
