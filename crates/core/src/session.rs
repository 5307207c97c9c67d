//! Session domain types.
//!
//! A [`Session`] is the durable per-user record: the transcript, what the
//! assistant learned about the user, the entities created on their behalf and
//! a few remembered defaults. It is owned by the memory store and mutated
//! under a per-session lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Unique identifier for a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Use the caller's id when it is present and non-blank, otherwise generate one.
    pub fn resolve(requested: Option<&str>) -> Self {
        match requested.map(str::trim) {
            Some(id) if !id.is_empty() => Self(id.to_string()),
            _ => Self::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Who produced a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    Tool,
}

/// One entry in a session transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,

    /// Null for assistant turns that only carried tool requests.
    #[serde(default)]
    pub content: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: Some(content.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: Some(content.into()),
            timestamp: Utc::now(),
        }
    }
}

/// Attributes extracted from what the user said.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl UserProfile {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.phone.is_none() && self.email.is_none()
    }
}

/// A partial profile update. Only non-empty values are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilePatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl ProfilePatch {
    pub fn is_empty(&self) -> bool {
        [&self.name, &self.phone, &self.email]
            .iter()
            .all(|v| v.as_deref().is_none_or(|s| s.trim().is_empty()))
    }
}

/// An entity (queue ticket) created through a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedEntity {
    /// Backend numeric id. Never shown to the user.
    pub id: u64,

    /// Short human-facing code (e.g. "GB7SH"). May be empty.
    pub code: String,

    /// Category label (service name)
    pub category: String,

    pub created_at: DateTime<Utc>,
}

impl CompletedEntity {
    pub fn new(id: u64, code: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id,
            code: code.into(),
            category: category.into(),
            created_at: Utc::now(),
        }
    }
}

/// The remembered default device/location.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultDevice {
    pub access_key: String,
    pub provider_id: u64,
    pub location_id: u64,
}

impl std::fmt::Debug for DefaultDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultDevice")
            .field("access_key", &"[REDACTED]")
            .field("provider_id", &self.provider_id)
            .field("location_id", &self.location_id)
            .finish()
    }
}

/// Progress of the optional per-session setup steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupStatus {
    #[serde(default)]
    pub setup_complete: bool,
    #[serde(default)]
    pub services_configured: bool,
    #[serde(default)]
    pub system_info_collected: bool,
    #[serde(default = "default_step")]
    pub current_step: String,
}

fn default_step() -> String {
    "initial".into()
}

impl Default for SetupStatus {
    fn default() -> Self {
        Self {
            setup_complete: false,
            services_configured: false,
            system_info_collected: false,
            current_step: default_step(),
        }
    }
}

/// Backend service areas the user asked to follow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoredServices {
    pub tickets: bool,
    pub terminals: bool,
    pub queues: bool,
    pub providers: bool,
    pub sessions: bool,
    pub customers: bool,
    pub reports: bool,
}

/// A partial [`MonitoredServices`] update.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesPatch {
    pub tickets: Option<bool>,
    pub terminals: Option<bool>,
    pub queues: Option<bool>,
    pub providers: Option<bool>,
    pub sessions: Option<bool>,
    pub customers: Option<bool>,
    pub reports: Option<bool>,
}

impl MonitoredServices {
    fn apply(&mut self, patch: ServicesPatch) {
        let slots = [
            (&mut self.tickets, patch.tickets),
            (&mut self.terminals, patch.terminals),
            (&mut self.queues, patch.queues),
            (&mut self.providers, patch.providers),
            (&mut self.sessions, patch.sessions),
            (&mut self.customers, patch.customers),
            (&mut self.reports, patch.reports),
        ];
        for (slot, value) in slots {
            if let Some(v) = value {
                *slot = v;
            }
        }
    }
}

/// Facts about the user's environment, collected during setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    #[serde(default = "Utc::now")]
    pub session_start_time: DateTime<Utc>,
    /// Free-form attributes, merged key by key
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, Value>,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            session_start_time: Utc::now(),
            details: BTreeMap::new(),
        }
    }
}

/// Read-only view of a session's setup state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionConfiguration {
    pub services: MonitoredServices,
    pub system_info: SystemInfo,
    pub setup: SetupStatus,
}

/// A partial setup-status update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetupPatch {
    #[serde(default)]
    pub setup_complete: Option<bool>,
    #[serde(default)]
    pub services_configured: Option<bool>,
    #[serde(default)]
    pub system_info_collected: Option<bool>,
    #[serde(default)]
    pub current_step: Option<String>,
}

/// The durable per-user conversation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,

    /// Append-only, ordered
    #[serde(default)]
    pub transcript: Vec<Turn>,

    pub created_at: DateTime<Utc>,

    /// Monotonically non-decreasing
    pub last_activity: DateTime<Utc>,

    #[serde(default)]
    pub interaction_count: u64,

    #[serde(default)]
    pub profile: UserProfile,

    /// Oldest first, bounded
    #[serde(default)]
    pub completed: Vec<CompletedEntity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_device: Option<DefaultDevice>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default)]
    pub setup: SetupStatus,

    #[serde(default)]
    pub services: MonitoredServices,

    #[serde(default)]
    pub system_info: SystemInfo,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            transcript: Vec::new(),
            created_at: now,
            last_activity: now,
            interaction_count: 0,
            profile: UserProfile::default(),
            completed: Vec::new(),
            default_device: None,
            summary: None,
            setup: SetupStatus::default(),
            services: MonitoredServices::default(),
            system_info: SystemInfo {
                session_start_time: now,
                details: BTreeMap::new(),
            },
        }
    }

    /// Advance last-activity to now. Never moves it backwards.
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    /// Append a turn to the transcript.
    pub fn append_turn(&mut self, turn: Turn) {
        self.transcript.push(turn);
        self.touch();
    }

    /// Increment and return the interaction counter.
    pub fn increment_interactions(&mut self) -> u64 {
        self.interaction_count += 1;
        self.touch();
        self.interaction_count
    }

    /// Merge a partial profile. Blank values never overwrite or unset a field.
    ///
    /// Returns `true` when something changed.
    pub fn merge_profile(&mut self, patch: ProfilePatch) -> bool {
        fn apply(slot: &mut Option<String>, value: Option<String>) -> bool {
            match value.map(|v| v.trim().to_string()) {
                Some(v) if !v.is_empty() && slot.as_deref() != Some(v.as_str()) => {
                    *slot = Some(v);
                    true
                }
                _ => false,
            }
        }

        let mut changed = apply(&mut self.profile.name, patch.name);
        changed |= apply(&mut self.profile.phone, patch.phone);
        changed |= apply(&mut self.profile.email, patch.email);
        if changed {
            self.touch();
        }
        changed
    }

    /// Record a completed entity, dropping the oldest beyond `capacity`.
    pub fn record_entity(&mut self, entity: CompletedEntity, capacity: usize) {
        self.completed.push(entity);
        if self.completed.len() > capacity {
            let excess = self.completed.len() - capacity;
            self.completed.drain(..excess);
        }
        self.touch();
    }

    /// The `n` most recent entities, oldest first.
    pub fn recent_entities(&self, n: usize) -> &[CompletedEntity] {
        let start = self.completed.len().saturating_sub(n);
        &self.completed[start..]
    }

    pub fn set_default_device(&mut self, device: DefaultDevice) {
        self.default_device = Some(device);
        self.touch();
    }

    pub fn set_summary(&mut self, summary: impl Into<String>) {
        self.summary = Some(summary.into());
        self.touch();
    }

    pub fn update_setup(&mut self, patch: SetupPatch) {
        if let Some(v) = patch.setup_complete {
            self.setup.setup_complete = v;
        }
        if let Some(v) = patch.services_configured {
            self.setup.services_configured = v;
        }
        if let Some(v) = patch.system_info_collected {
            self.setup.system_info_collected = v;
        }
        if let Some(step) = patch.current_step {
            self.setup.current_step = step;
        }
        self.touch();
    }

    /// Merge monitored-service flags and mark services as configured.
    pub fn update_services(&mut self, patch: ServicesPatch) {
        self.services.apply(patch);
        self.setup.services_configured = true;
        self.touch();
    }

    /// Merge system details and mark them as collected.
    pub fn update_system_info(&mut self, details: BTreeMap<String, Value>) {
        self.system_info.details.extend(details);
        self.setup.system_info_collected = true;
        self.touch();
    }

    pub fn configuration(&self) -> SessionConfiguration {
        SessionConfiguration {
            services: self.services,
            system_info: self.system_info.clone(),
            setup: self.setup.clone(),
        }
    }

    /// Whether anything worth summarizing has been recorded yet.
    pub fn has_memory(&self) -> bool {
        !self.profile.is_empty()
            || self.default_device.is_some()
            || !self.completed.is_empty()
            || self.summary.is_some()
            || self.interaction_count > 1
    }
}
