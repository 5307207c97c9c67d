//! Process wiring shared by the HTTP server and the CLI chat.

use filachat_agent::Orchestrator;
use filachat_config::AppConfig;
use filachat_core::event::EventBus;
use filachat_memory::{AutosaveHandle, ContextEnricher, SessionStore, StoreConfig};
use filachat_tools::McpInvoker;
use std::sync::Arc;
use tracing::info;

/// Everything a running filachat process owns.
pub struct Runtime {
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<SessionStore>,
    autosave: Option<AutosaveHandle>,
}

impl Runtime {
    /// Build the provider, tool client, session store and orchestrator.
    ///
    /// Starts the autosave timer when `memory.auto_save` is set.
    pub async fn from_config(config: &AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let router = filachat_providers::build_from_config(config);
        let provider = router.default().ok_or_else(|| {
            format!("Default provider '{}' is not registered", config.default_provider)
        })?;

        let invoker = Arc::new(McpInvoker::from_config(&config.tools)?);
        let event_bus = Arc::new(EventBus::default());

        let storage = filachat_memory::storage_from_config(&config.memory).await?;
        let store = Arc::new(
            SessionStore::open(storage, StoreConfig::from(&config.memory))
                .await?
                .with_enricher(ContextEnricher::from_domain(&config.domain))
                .with_events(event_bus.clone()),
        );

        let autosave = config
            .memory
            .auto_save
            .then(|| store.spawn_autosave(config.memory.save_interval()));

        let orchestrator = Arc::new(
            Orchestrator::from_config(config, provider, invoker, store.clone())
                .with_event_bus(event_bus),
        );

        info!(
            provider = orchestrator.provider_name(),
            model = orchestrator.model(),
            backend = store.backend_name(),
            tools = %config.tools.url,
            "Runtime ready"
        );

        Ok(Self {
            orchestrator,
            store,
            autosave,
        })
    }

    /// Stop the timer and write every session out.
    pub async fn shutdown(self) {
        let report = match self.autosave {
            Some(handle) => handle.shutdown().await,
            None => self.store.save_all(true).await,
        };
        info!(
            saved = report.saved,
            failed = report.failed,
            "Sessions saved on shutdown"
        );
    }
}
