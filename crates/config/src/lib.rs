//! Configuration loading, validation, and management for filachat.
//!
//! Loads configuration from `~/.filachat/config.toml` with environment
//! variable overrides. Validates all settings at startup.
//!
//! The `[domain]` table is the single source of the verified backend values
//! (access credential, provider/location/service ids). Both the argument
//! corrector and the context enricher read it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.filachat/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the completion service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default completion provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Max tokens per completion
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Provider-specific overrides (api_url, api_key, model)
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub domain: DomainConfig,

    #[serde(default)]
    pub sanitizer: SanitizerConfig,

    #[serde(default)]
    pub identity: IdentityConfig,
}

fn default_provider() -> String {
    "groq".into()
}
fn default_model() -> String {
    "llama-3.1-8b-instant".into()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    1000
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("providers", &self.providers)
            .field("gateway", &self.gateway)
            .field("memory", &self.memory)
            .field("tools", &self.tools)
            .field("domain", &self.domain)
            .field("sanitizer", &self.sanitizer)
            .field("identity", &self.identity)
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Maximum accepted request body, in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit: usize,
}

fn default_port() -> u16 {
    3000
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_body_limit() -> usize {
    64 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            body_limit: default_body_limit(),
        }
    }
}

/// Session persistence and lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "file", "sqlite" or "memory"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// Directory for session files / the sqlite database.
    /// Defaults to `~/.filachat/sessions`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub auto_save: bool,

    #[serde(default = "default_save_interval")]
    pub save_interval_secs: u64,

    #[serde(default = "default_idle_eviction")]
    pub idle_eviction_secs: u64,

    #[serde(default = "default_disk_retention")]
    pub disk_retention_secs: u64,

    /// Completed entities kept per session
    #[serde(default = "default_entity_history")]
    pub entity_history: usize,
}

fn default_memory_backend() -> String {
    "file".into()
}
fn default_true() -> bool {
    true
}
fn default_save_interval() -> u64 {
    30
}
fn default_idle_eviction() -> u64 {
    24 * 60 * 60
}
fn default_disk_retention() -> u64 {
    7 * 24 * 60 * 60
}
fn default_entity_history() -> usize {
    10
}

impl MemoryConfig {
    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs)
    }

    pub fn idle_eviction(&self) -> Duration {
        Duration::from_secs(self.idle_eviction_secs)
    }

    pub fn disk_retention(&self) -> Duration {
        Duration::from_secs(self.disk_retention_secs)
    }

    /// The configured data directory, or `~/.filachat/sessions`.
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("sessions"))
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            data_dir: None,
            auto_save: true,
            save_interval_secs: default_save_interval(),
            idle_eviction_secs: default_idle_eviction(),
            disk_retention_secs: default_disk_retention(),
            entity_history: default_entity_history(),
        }
    }
}

/// The remote tool-execution service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// JSON-RPC endpoint of the tool service
    #[serde(default = "default_tools_url")]
    pub url: String,

    #[serde(default = "default_tools_timeout")]
    pub timeout_secs: u64,

    /// Operations that receive the access credential as `accessKey`
    #[serde(default = "default_credential_operations")]
    pub credential_operations: Vec<String>,
}

fn default_tools_url() -> String {
    "http://127.0.0.1:3001/mcp".into()
}
fn default_tools_timeout() -> u64 {
    30
}
fn default_credential_operations() -> Vec<String> {
    vec!["get_terminal".into()]
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            url: default_tools_url(),
            timeout_secs: default_tools_timeout(),
            credential_operations: default_credential_operations(),
        }
    }
}

/// Verified backend values and the known-bad values the model tends to invent.
#[derive(Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    #[serde(default = "default_access_key")]
    pub access_key: String,

    #[serde(default = "default_provider_id")]
    pub provider_id: u64,
    #[serde(default = "default_provider_label")]
    pub provider_label: String,

    #[serde(default = "default_location_id")]
    pub location_id: u64,
    #[serde(default = "default_location_label")]
    pub location_label: String,

    #[serde(default = "default_service_id")]
    pub service_id: u64,
    #[serde(default = "default_service_label")]
    pub service_label: String,

    #[serde(default = "default_schedule_session_id")]
    pub schedule_session_id: u64,

    #[serde(default)]
    pub priority: u64,

    #[serde(default = "default_bad_provider_ids")]
    pub known_bad_provider_ids: Vec<u64>,
    #[serde(default = "default_bad_location_ids")]
    pub known_bad_location_ids: Vec<u64>,
    #[serde(default = "default_bad_service_ids")]
    pub known_bad_service_ids: Vec<u64>,
    #[serde(default = "default_bad_session_ids")]
    pub known_bad_session_ids: Vec<u64>,
}

fn default_access_key() -> String {
    "d6779a60360d455b9af96c1b68e066c5".into()
}
fn default_provider_id() -> u64 {
    11
}
fn default_provider_label() -> String {
    "Filazero".into()
}
fn default_location_id() -> u64 {
    11
}
fn default_location_label() -> String {
    "AGENCIA-001".into()
}
fn default_service_id() -> u64 {
    21
}
fn default_service_label() -> String {
    "FISIOTERAPIA".into()
}
fn default_schedule_session_id() -> u64 {
    2056332
}
fn default_bad_provider_ids() -> Vec<u64> {
    vec![906, 730, 777, 769]
}
fn default_bad_location_ids() -> Vec<u64> {
    vec![0]
}
fn default_bad_service_ids() -> Vec<u64> {
    vec![2, 123]
}
fn default_bad_session_ids() -> Vec<u64> {
    vec![123]
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            access_key: default_access_key(),
            provider_id: default_provider_id(),
            provider_label: default_provider_label(),
            location_id: default_location_id(),
            location_label: default_location_label(),
            service_id: default_service_id(),
            service_label: default_service_label(),
            schedule_session_id: default_schedule_session_id(),
            priority: 0,
            known_bad_provider_ids: default_bad_provider_ids(),
            known_bad_location_ids: default_bad_location_ids(),
            known_bad_service_ids: default_bad_service_ids(),
            known_bad_session_ids: default_bad_session_ids(),
        }
    }
}

impl std::fmt::Debug for DomainConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainConfig")
            .field("access_key", &"[REDACTED]")
            .field("provider_id", &self.provider_id)
            .field("provider_label", &self.provider_label)
            .field("location_id", &self.location_id)
            .field("location_label", &self.location_label)
            .field("service_id", &self.service_id)
            .field("service_label", &self.service_label)
            .field("schedule_session_id", &self.schedule_session_id)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Terms that must never reach the user, plus the reply used when
/// sanitization leaves nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizerConfig {
    #[serde(default = "default_forbidden_terms")]
    pub forbidden_terms: Vec<String>,

    #[serde(default = "default_fallback")]
    pub fallback: String,
}

fn default_forbidden_terms() -> Vec<String> {
    [
        "pid",
        "locationId",
        "serviceId",
        "sessionId",
        "publicAccessKey",
        "browserUuid",
        "providerId",
        "ticketId",
        "tool",
        "get_terminal",
        "create_ticket",
        "function",
        "arguments",
        "JSON",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_fallback() -> String {
    "Certo! Vamos continuar. Como posso ajudar no seu agendamento?".into()
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            forbidden_terms: default_forbidden_terms(),
            fallback: default_fallback(),
        }
    }
}

/// The instruction preamble sent at the head of every completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.into()
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = "Você é o Assistente Filazero para gestão de filas e agendamentos.

FERRAMENTAS DISPONÍVEIS:
get_terminal, create_ticket, get_ticket, get_queue_position, get_ticket_prevision, cancel_ticket, checkin_ticket, confirm_presence, update_feedback, get_service, get_company_template

REGRA CRÍTICA PARA CRIAR TICKETS:
1. SEMPRE use get_terminal PRIMEIRO para obter IDs corretos
2. NUNCA invente Provider ID, Location ID ou Service ID
3. USE APENAS os IDs retornados pelo get_terminal

FLUXO OBRIGATÓRIO:
Usuário quer criar ticket → get_terminal(accessKey) → obter pid, locationId, serviceId corretos → create_ticket com IDs reais

ESTRUTURA create_ticket:
- terminalSchedule: do get_terminal (sessionId, publicAccessKey)
- pid, locationId, serviceId: do get_terminal
- customer: { name, phone, email }
- browserUuid: auto-gerado

INSTRUÇÕES:
- Responda em português
- Use ferramentas automaticamente
- Para tickets: peça nome, telefone, email
- Para consultas: peça ID ou smart code
- Nunca mostre IDs internos, nomes de ferramentas ou JSON ao usuário
- Seja prestativo e claro";

impl AppConfig {
    /// Load configuration from the default location.
    ///
    /// Environment variables override the file:
    /// - `FILACHAT_API_KEY`, then `GROQ_API_KEY` (only when no key is configured)
    /// - `FILACHAT_PROVIDER`
    /// - `FILACHAT_MODEL`
    /// - `FILACHAT_TOOLS_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific file path, then apply environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply overrides from an environment lookup.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("FILACHAT_API_KEY").or_else(|| lookup("GROQ_API_KEY"));
        }
        if let Some(provider) = lookup("FILACHAT_PROVIDER") {
            self.default_provider = provider;
        }
        if let Some(model) = lookup("FILACHAT_MODEL") {
            self.default_model = model;
        }
        if let Some(url) = lookup("FILACHAT_TOOLS_URL") {
            self.tools.url = url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".filachat")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.default_temperature) {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.memory.save_interval_secs == 0 || self.memory.idle_eviction_secs == 0 {
            return Err(ConfigError::ValidationError(
                "memory intervals must be greater than zero".into(),
            ));
        }

        if self.memory.disk_retention_secs < self.memory.idle_eviction_secs {
            return Err(ConfigError::ValidationError(
                "memory.disk_retention_secs must be >= memory.idle_eviction_secs".into(),
            ));
        }

        if self.memory.entity_history == 0 {
            return Err(ConfigError::ValidationError(
                "memory.entity_history must be at least 1".into(),
            ));
        }

        if !matches!(self.memory.backend.as_str(), "file" | "sqlite" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "unknown memory backend '{}'",
                self.memory.backend
            )));
        }

        if self.domain.access_key.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "domain.access_key must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// API key for the given provider: its own entry first, then the global key.
    pub fn api_key_for(&self, provider: &str) -> Option<String> {
        self.providers
            .get(provider)
            .and_then(|p| p.api_key.clone())
            .or_else(|| self.api_key.clone())
    }

    /// Check if an API key is available.
    pub fn has_api_key(&self) -> bool {
        self.api_key_for(&self.default_provider).is_some()
    }

    /// Generate a default config TOML string (for `init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            providers: HashMap::new(),
            gateway: GatewayConfig::default(),
            memory: MemoryConfig::default(),
            tools: ToolsConfig::default(),
            domain: DomainConfig::default(),
            sanitizer: SanitizerConfig::default(),
            identity: IdentityConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for filachat_core::Error {
    fn from(e: ConfigError) -> Self {
        filachat_core::Error::Config {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, "groq");
        assert_eq!(config.default_model, "llama-3.1-8b-instant");
        assert_eq!(config.gateway.body_limit, 65536);
        assert_eq!(config.domain.provider_id, 11);
        assert_eq!(config.domain.schedule_session_id, 2056332);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_model, config.default_model);
        assert_eq!(parsed.domain.access_key, config.domain.access_key);
        assert_eq!(parsed.sanitizer.forbidden_terms, config.sanitizer.forbidden_terms);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
            default_model = "llama-3.3-70b-versatile"

            [domain]
            provider_id = 42
            "#,
        )
        .unwrap();
        assert_eq!(parsed.default_model, "llama-3.3-70b-versatile");
        assert_eq!(parsed.domain.provider_id, 42);
        assert_eq!(parsed.domain.location_id, 11);
        assert_eq!(parsed.memory.save_interval_secs, 30);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn retention_shorter_than_eviction_rejected() {
        let mut config = AppConfig::default();
        config.memory.disk_retention_secs = 60;
        config.memory.idle_eviction_secs = 120;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_backend_rejected() {
        let mut config = AppConfig::default();
        config.memory.backend = "redis".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::read_file(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.default_provider, "groq");
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "default_temperature = \"hot\"").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config.apply_env(|key| match key {
            "GROQ_API_KEY" => Some("gsk_test".into()),
            "FILACHAT_TOOLS_URL" => Some("http://tools.local/mcp".into()),
            _ => None,
        });
        assert_eq!(config.api_key.as_deref(), Some("gsk_test"));
        assert_eq!(config.tools.url, "http://tools.local/mcp");
        assert_eq!(config.default_model, "llama-3.1-8b-instant");
    }

    #[test]
    fn configured_key_wins_over_env() {
        let mut config = AppConfig {
            api_key: Some("from-file".into()),
            ..AppConfig::default()
        };
        config.apply_env(|_| Some("from-env".into()));
        assert_eq!(config.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn provider_key_takes_precedence() {
        let mut config = AppConfig {
            api_key: Some("global".into()),
            ..AppConfig::default()
        };
        config.providers.insert(
            "groq".into(),
            ProviderConfig {
                api_key: Some("groq-only".into()),
                ..Default::default()
            },
        );
        assert_eq!(config.api_key_for("groq").as_deref(), Some("groq-only"));
        assert_eq!(config.api_key_for("openai").as_deref(), Some("global"));
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = AppConfig {
            api_key: Some("gsk_secret".into()),
            ..AppConfig::default()
        };
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("gsk_secret"));
        assert!(!dbg.contains("d6779a60360d455b9af96c1b68e066c5"));
    }

    #[test]
    fn default_toml_generation() {
        let toml = AppConfig::default_toml();
        assert!(toml.contains("default_provider"));
        assert!(toml.contains("[domain]"));
        assert!(toml.contains("[sanitizer]"));
    }
}
