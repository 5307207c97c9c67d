//! The turn orchestrator.
//!
//! One call to [`Orchestrator::handle`] is one user turn:
//!
//! 1. resolve the session and lock it for the whole turn
//! 2. count the interaction and fold extracted attributes into the profile
//! 3. phase 1: send preamble + enrichment + transcript + the new message,
//!    with the tool catalog attached
//! 4. run any proposed tool calls in order, correcting their arguments first
//! 5. phase 2 (only after tools ran): ask for the final reply, no catalog
//! 6. sanitize, commit the user and assistant turns, reply
//!
//! A failure anywhere becomes an apologetic reply. The user turn is only
//! committed to the transcript when the turn succeeds.

use chrono::{DateTime, Utc};
use filachat_config::{AppConfig, DomainConfig};
use filachat_core::Message;
use filachat_core::error::ToolError;
use filachat_core::event::{DomainEvent, EventBus};
use filachat_core::provider::{Provider, ProviderRequest};
use filachat_core::session::{CompletedEntity, DefaultDevice, Session, SessionId, Turn, TurnRole};
use filachat_core::tool::{ToolCall, ToolCatalog, ToolInvoker};
use filachat_memory::SessionStore;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::extract::ExtractorChain;
use crate::guard::{ArgumentCorrector, Sanitizer};

/// Reply used when the final completion comes back empty.
pub const EMPTY_REPLY: &str = "Desculpe, não consegui processar sua solicitação.";

const ERROR_PREFIX: &str = "Desculpe, ocorreu um erro ao processar sua mensagem";

/// The result of one turn.
#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    pub text: String,
    pub session_id: SessionId,
    /// Operations that completed successfully, in call order
    pub tools_used: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Reachability of the two remote services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub provider: bool,
    pub tools: bool,
}

/// Drives completion phases and tool dispatch for every turn.
pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    catalog: ToolCatalog,
    invoker: Arc<dyn ToolInvoker>,
    store: Arc<SessionStore>,
    corrector: ArgumentCorrector,
    sanitizer: Sanitizer,
    extractors: ExtractorChain,
    domain: DomainConfig,
    system_prompt: String,
    event_bus: Arc<EventBus>,
}

impl Orchestrator {
    /// Create an orchestrator with default guards and domain values.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        catalog: ToolCatalog,
        invoker: Arc<dyn ToolInvoker>,
        store: Arc<SessionStore>,
    ) -> Self {
        let config = AppConfig::default();
        Self {
            provider,
            model: model.into(),
            temperature: config.default_temperature,
            max_tokens: Some(config.default_max_tokens),
            catalog,
            invoker,
            store,
            corrector: ArgumentCorrector::default(),
            sanitizer: Sanitizer::default(),
            extractors: ExtractorChain::default(),
            domain: config.domain,
            system_prompt: config.identity.system_prompt,
            event_bus: Arc::new(EventBus::default()),
        }
    }

    /// Wire everything that comes from configuration.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        invoker: Arc<dyn ToolInvoker>,
        store: Arc<SessionStore>,
    ) -> Self {
        Self {
            temperature: config.default_temperature,
            max_tokens: Some(config.default_max_tokens),
            corrector: ArgumentCorrector::from_config(&config.domain, &config.tools),
            sanitizer: Sanitizer::new(&config.sanitizer),
            domain: config.domain.clone(),
            system_prompt: config.identity.system_prompt.clone(),
            ..Self::new(
                provider,
                config.default_model.clone(),
                filachat_tools::default_catalog(&config.domain),
                invoker,
                store,
            )
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_corrector(mut self, corrector: ArgumentCorrector) -> Self {
        self.corrector = corrector;
        self
    }

    pub fn with_sanitizer(mut self, sanitizer: Sanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn with_extractors(mut self, extractors: ExtractorChain) -> Self {
        self.extractors = extractors;
        self
    }

    pub fn with_domain(mut self, domain: DomainConfig) -> Self {
        self.domain = domain;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = bus;
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Process one user message. Never fails: errors become the reply text.
    pub async fn handle(&self, session_id: Option<&str>, text: &str) -> Reply {
        let id = SessionId::resolve(session_id);
        let handle = self.store.acquire(&id).await;
        let mut session = handle.lock().await;

        self.event_bus.publish(DomainEvent::MessageReceived {
            session_id: id.to_string(),
            content_preview: text.chars().take(50).collect(),
            timestamp: Utc::now(),
        });

        let count = session.increment_interactions();
        let patch = self.extractors.extract(text);
        if !patch.is_empty() && session.merge_profile(patch) {
            debug!(session_id = %id, "Profile updated from message");
        }
        info!(session_id = %id, interaction = count, "Processing message");

        match self.run_turn(&mut session, text).await {
            Ok((reply, tools_used)) => {
                session.append_turn(Turn::user(text));
                session.append_turn(Turn::assistant(reply.clone()));
                session.touch();

                self.event_bus.publish(DomainEvent::ResponseGenerated {
                    session_id: id.to_string(),
                    model: self.model.clone(),
                    tools_used: tools_used.clone(),
                    timestamp: Utc::now(),
                });

                Reply {
                    text: reply,
                    session_id: id,
                    tools_used,
                    timestamp: Utc::now(),
                }
            }
            Err(e) => {
                warn!(session_id = %id, error = %e, "Turn failed");
                self.event_bus.publish(DomainEvent::ErrorOccurred {
                    context: format!("session {id}"),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });

                Reply {
                    text: self
                        .sanitizer
                        .filter_terms(&format!("{ERROR_PREFIX}: {e}")),
                    session_id: id,
                    tools_used: Vec::new(),
                    timestamp: Utc::now(),
                }
            }
        }
    }

    /// Probe both remote services.
    pub async fn health(&self) -> HealthReport {
        let (provider, tools) =
            tokio::join!(self.provider.health_check(), self.invoker.health_check());
        HealthReport {
            provider: provider.unwrap_or(false),
            tools,
        }
    }

    /// Everything up to and including sanitization. The session's transcript
    /// is only read here.
    async fn run_turn(
        &self,
        session: &mut Session,
        text: &str,
    ) -> Result<(String, Vec<String>), filachat_core::Error> {
        let mut messages = self.build_messages(session, text);

        let first = self
            .provider
            .complete(self.request(messages.clone(), true))
            .await?;

        let mut tools_used = Vec::new();
        let candidate = if first.message.tool_calls.is_empty() {
            first.message.text().to_string()
        } else {
            debug!(
                count = first.message.tool_calls.len(),
                "Executing proposed tool calls"
            );
            let proposed = first.message.tool_calls.clone();
            messages.push(Message::tool_intent(proposed.clone()));

            for tc in &proposed {
                let call = ToolCall::from_raw(&tc.id, &tc.name, &tc.arguments);
                let content = match self.execute(call.clone()).await {
                    Ok(result) => {
                        tools_used.push(call.name.clone());
                        self.observe(session, &call.name, &result);
                        serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string())
                    }
                    Err(e) => {
                        warn!(tool = %call.name, error = %e, "Tool execution failed");
                        format!("Erro ao executar {}: {}", call.name, failure_reason(&e))
                    }
                };
                messages.push(Message::tool_result(&call.id, content));
            }

            let second = self
                .provider
                .complete(self.request(messages, false))
                .await?;
            let reply = second.message.text().trim();
            if reply.is_empty() {
                EMPTY_REPLY.to_string()
            } else {
                reply.to_string()
            }
        };

        Ok((self.sanitizer.sanitize(&candidate), tools_used))
    }

    fn request(&self, messages: Vec<Message>, with_tools: bool) -> ProviderRequest {
        ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: if with_tools {
                self.catalog.definitions()
            } else {
                Vec::new()
            },
        }
    }

    /// Preamble with the enrichment block, replayed transcript, new message.
    fn build_messages(&self, session: &Session, text: &str) -> Vec<Message> {
        let enrichment = self.store.enricher().render(session);
        let mut messages = Vec::with_capacity(session.transcript.len() + 2);
        messages.push(Message::system(format!("{}{enrichment}", self.system_prompt)));

        for turn in &session.transcript {
            match (turn.role, turn.content.as_deref()) {
                (TurnRole::User, Some(content)) => messages.push(Message::user(content)),
                (TurnRole::Assistant, Some(content)) => messages.push(Message::assistant(content)),
                _ => {}
            }
        }

        messages.push(Message::user(text));
        messages
    }

    /// Correct and dispatch one call.
    async fn execute(&self, call: ToolCall) -> Result<Value, ToolError> {
        if !self.catalog.contains(&call.name) {
            self.publish_tool(&call.name, false, 0);
            return Err(ToolError::NotFound(call.name));
        }

        let correction = self.corrector.correct_with_report(&call.name, call.arguments);
        if correction.changed() {
            self.event_bus.publish(DomainEvent::ArgumentsCorrected {
                tool_name: call.name.clone(),
                fields: correction.fields.clone(),
                timestamp: Utc::now(),
            });
        }

        let start = std::time::Instant::now();
        let result = self.invoker.invoke(&call.name, correction.arguments).await;
        self.publish_tool(
            &call.name,
            result.is_ok(),
            start.elapsed().as_millis() as u64,
        );
        result
    }

    fn publish_tool(&self, name: &str, success: bool, duration_ms: u64) {
        self.event_bus.publish(DomainEvent::ToolExecuted {
            tool_name: name.to_string(),
            success,
            duration_ms,
            timestamp: Utc::now(),
        });
    }

    /// Fold facts from a successful result into the session.
    fn observe(&self, session: &mut Session, operation: &str, result: &Value) {
        match operation {
            filachat_tools::GET_TERMINAL => {
                let provider = result.pointer("/provider/id").and_then(as_u64);
                let location = result.pointer("/location/id").and_then(as_u64);
                if let (Some(provider_id), Some(location_id)) = (provider, location) {
                    session.set_default_device(DefaultDevice {
                        access_key: self.domain.access_key.clone(),
                        provider_id,
                        location_id,
                    });
                    debug!(provider_id, location_id, "Default device remembered");
                }
            }
            filachat_tools::CREATE_TICKET => {
                let Some(data) = result.get("responseData") else {
                    return;
                };
                let first = data
                    .get("tickets")
                    .and_then(Value::as_array)
                    .and_then(|tickets| tickets.first());
                let id = first.and_then(|t| as_u64(t).or_else(|| t.get("id").and_then(as_u64)));
                if let Some(id) = id {
                    let code = data
                        .get("smartCode")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    let capacity = self.store.config().entity_history;
                    session.record_entity(
                        CompletedEntity::new(id, code, &self.domain.service_label),
                        capacity,
                    );
                    info!(entity_id = id, code, "Entity recorded");
                }
            }
            _ => {}
        }
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// The part of a tool error worth showing the model.
fn failure_reason(error: &ToolError) -> String {
    match error {
        ToolError::ExecutionFailed { reason, .. } => reason.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filachat_core::error::ProviderError;
    use filachat_core::message::{MessageToolCall, Role};
    use filachat_core::provider::ProviderResponse;
    use filachat_memory::{InMemoryStorage, StoreConfig};
    use serde_json::json;
    use filachat_config::SanitizerConfig;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays scripted responses and records every request.
    struct ScriptedProvider {
        responses: Mutex<VecDeque<Result<Message, ProviderError>>>,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<Result<Message, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<ProviderRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            self.requests.lock().unwrap().push(request);
            let message = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Message::assistant("")))?;
            Ok(ProviderResponse {
                message,
                usage: None,
                model: "scripted-model".into(),
            })
        }
    }

    /// Returns canned results per operation and records the arguments it saw.
    #[derive(Default)]
    struct RecordingInvoker {
        results: HashMap<String, Result<Value, ToolError>>,
        calls: Mutex<Vec<(String, Value)>>,
    }

    impl RecordingInvoker {
        fn with(mut self, op: &str, result: Result<Value, ToolError>) -> Self {
            self.results.insert(op.into(), result);
            self
        }

        fn calls(&self) -> Vec<(String, Value)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl ToolInvoker for RecordingInvoker {
        fn name(&self) -> &str {
            "recording"
        }

        async fn invoke(&self, operation: &str, arguments: Value) -> Result<Value, ToolError> {
            self.calls
                .lock()
                .unwrap()
                .push((operation.to_string(), arguments));
            self.results
                .get(operation)
                .cloned()
                .unwrap_or_else(|| Ok(json!({"ok": true})))
        }
    }

    fn tool_call(id: &str, name: &str, arguments: Value) -> Message {
        Message::tool_intent(vec![MessageToolCall {
            id: id.into(),
            name: name.into(),
            arguments: arguments.to_string(),
        }])
    }

    async fn store() -> Arc<SessionStore> {
        Arc::new(
            SessionStore::open(Arc::new(InMemoryStorage::new()), StoreConfig::default())
                .await
                .unwrap(),
        )
    }

    async fn orchestrator(
        provider: Arc<ScriptedProvider>,
        invoker: Arc<RecordingInvoker>,
    ) -> Orchestrator {
        let config = AppConfig::default();
        Orchestrator::from_config(&config, provider, invoker, store().await)
    }

    #[tokio::test]
    async fn plain_reply_commits_both_turns() {
        let provider =
            ScriptedProvider::new(vec![Ok(Message::assistant("Olá! Como posso ajudar?"))]);
        let invoker = Arc::new(RecordingInvoker::default());
        let orch = orchestrator(provider.clone(), invoker.clone()).await;

        let reply = orch.handle(Some("s1"), "Oi").await;
        assert_eq!(reply.text, "Olá! Como posso ajudar?");
        assert_eq!(reply.session_id.as_str(), "s1");
        assert!(reply.tools_used.is_empty());

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].tools.len(), 11);
        assert_eq!(requests[0].messages[0].role, Role::System);
        assert_eq!(requests[0].messages.last().unwrap().text(), "Oi");
        assert!(invoker.calls().is_empty());

        let session = orch.store().snapshot(&"s1".into()).await.unwrap();
        assert_eq!(session.transcript.len(), 2);
        assert_eq!(session.interaction_count, 1);
    }

    #[tokio::test]
    async fn missing_session_id_is_generated() {
        let provider = ScriptedProvider::new(vec![Ok(Message::assistant("Oi"))]);
        let orch = orchestrator(provider, Arc::new(RecordingInvoker::default())).await;
        let reply = orch.handle(None, "Olá").await;
        assert!(!reply.session_id.as_str().is_empty());
        assert!(orch.store().snapshot(&reply.session_id).await.is_some());
    }

    #[tokio::test]
    async fn tool_call_is_corrected_and_recorded() {
        let provider = ScriptedProvider::new(vec![
            Ok(tool_call(
                "call_1",
                "create_ticket",
                json!({"pid": 730, "customer": {"name": "Maria", "phone": "11987654321", "email": "m@x.com"}}),
            )),
            Ok(Message::assistant("Seu ticket foi criado! Código GB7SH.")),
        ]);
        let invoker = Arc::new(RecordingInvoker::default().with(
            "create_ticket",
            Ok(json!({"responseData": {"tickets": [98765], "smartCode": "GB7SH"}})),
        ));
        let orch = orchestrator(provider.clone(), invoker.clone()).await;

        let reply = orch.handle(Some("s2"), "Quero agendar").await;
        assert_eq!(reply.tools_used, vec!["create_ticket".to_string()]);
        assert_eq!(reply.text, "Seu ticket foi criado! Código GB7SH.");

        let calls = invoker.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1["pid"], 11);
        assert_eq!(calls[0].1["locationId"], 11);

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].tools.is_empty());
        let second = &requests[1].messages;
        let intent = &second[second.len() - 2];
        assert_eq!(intent.role, Role::Assistant);
        assert!(intent.content.is_none());
        let result = second.last().unwrap();
        assert_eq!(result.role, Role::Tool);
        assert_eq!(result.tool_call_id.as_deref(), Some("call_1"));
        assert!(result.text().contains("GB7SH"));

        let session = orch.store().snapshot(&"s2".into()).await.unwrap();
        assert_eq!(session.completed.len(), 1);
        assert_eq!(session.completed[0].id, 98765);
        assert_eq!(session.completed[0].code, "GB7SH");
        assert_eq!(session.completed[0].category, "FISIOTERAPIA");
    }

    #[tokio::test]
    async fn terminal_lookup_sets_default_device() {
        let provider = ScriptedProvider::new(vec![
            Ok(tool_call("call_1", "get_terminal", json!({}))),
            Ok(Message::assistant("Terminal encontrado.")),
        ]);
        let invoker = Arc::new(RecordingInvoker::default().with(
            "get_terminal",
            Ok(json!({"provider": {"id": 11}, "location": {"id": 12}})),
        ));
        let orch = orchestrator(provider, invoker.clone()).await;

        orch.handle(Some("s3"), "Qual terminal?").await;
        assert_eq!(
            invoker.calls()[0].1["accessKey"],
            "d6779a60360d455b9af96c1b68e066c5"
        );
        let device = orch
            .store()
            .snapshot(&"s3".into())
            .await
            .unwrap()
            .default_device
            .unwrap();
        assert_eq!(device.provider_id, 11);
        assert_eq!(device.location_id, 12);
    }

    #[tokio::test]
    async fn tool_failure_does_not_abort_turn() {
        let provider = ScriptedProvider::new(vec![
            Ok(Message::tool_intent(vec![
                MessageToolCall {
                    id: "a".into(),
                    name: "get_ticket".into(),
                    arguments: "{\"id\": 1}".into(),
                },
                MessageToolCall {
                    id: "b".into(),
                    name: "get_queue_position".into(),
                    arguments: "not json".into(),
                },
            ])),
            Ok(Message::assistant("Sua posição é 3.")),
        ]);
        let invoker = Arc::new(RecordingInvoker::default().with(
            "get_ticket",
            Err(ToolError::ExecutionFailed {
                tool_name: "get_ticket".into(),
                reason: "Ticket não encontrado".into(),
            }),
        ));
        let orch = orchestrator(provider.clone(), invoker.clone()).await;

        let reply = orch.handle(Some("s4"), "posição?").await;
        assert_eq!(reply.tools_used, vec!["get_queue_position".to_string()]);
        assert_eq!(reply.text, "Sua posição é 3.");

        let calls = invoker.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].1, json!({}));

        let messages = &provider.requests()[1].messages;
        let failure = messages
            .iter()
            .find(|m| m.tool_call_id.as_deref() == Some("a"))
            .unwrap();
        assert_eq!(failure.text(), "Erro ao executar get_ticket: Ticket não encontrado");
    }

    #[tokio::test]
    async fn unknown_operation_is_not_dispatched() {
        let provider = ScriptedProvider::new(vec![
            Ok(tool_call("x", "delete_everything", json!({}))),
            Ok(Message::assistant("Não posso fazer isso.")),
        ]);
        let invoker = Arc::new(RecordingInvoker::default());
        let orch = orchestrator(provider, invoker.clone()).await;

        let reply = orch.handle(Some("s5"), "apague tudo").await;
        assert!(invoker.calls().is_empty());
        assert!(reply.tools_used.is_empty());
    }

    #[tokio::test]
    async fn empty_final_reply_uses_fixed_sentence() {
        let provider = ScriptedProvider::new(vec![
            Ok(tool_call("c", "get_service", json!({"id": 21}))),
            Ok(Message::assistant("   ")),
        ]);
        let orch = orchestrator(provider, Arc::new(RecordingInvoker::default())).await;
        let reply = orch.handle(Some("s6"), "serviço?").await;
        assert_eq!(reply.text, EMPTY_REPLY);
    }

    #[tokio::test]
    async fn provider_error_becomes_apology_and_discards_turn() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::Network(
            "connection refused".into(),
        ))]);
        let orch = orchestrator(provider, Arc::new(RecordingInvoker::default())).await;
        let created = orch.store().get_or_create(&"s7".into()).await.last_activity;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let reply = orch.handle(Some("s7"), "Oi").await;
        assert!(reply.text.starts_with(ERROR_PREFIX));
        assert!(reply.text.contains("connection refused"));
        assert_eq!(reply.session_id.as_str(), "s7");

        let session = orch.store().snapshot(&"s7".into()).await.unwrap();
        assert!(session.transcript.is_empty());
        assert_eq!(session.interaction_count, 1);
        // Counting the interaction already touched the session
        assert!(session.last_activity > created);
    }

    #[tokio::test]
    async fn reply_is_sanitized() {
        let provider = ScriptedProvider::new(vec![Ok(Message::assistant(
            "Pronto, usei o pid correto. ```json\n{\"pid\": 11}\n```",
        ))]);
        let orch = orchestrator(provider, Arc::new(RecordingInvoker::default())).await;
        let reply = orch.handle(Some("s8"), "ok").await;
        assert_eq!(reply.text, "Pronto, usei o correto.");
    }

    #[tokio::test]
    async fn enrichment_and_transcript_reach_the_model() {
        let provider = ScriptedProvider::new(vec![
            Ok(Message::assistant("Anotado.")),
            Ok(Message::assistant("Certo.")),
        ]);
        let orch = orchestrator(provider.clone(), Arc::new(RecordingInvoker::default())).await;

        orch.handle(Some("s9"), "meu telefone é 11987654321").await;
        orch.handle(Some("s9"), "e agora?").await;

        let second = &provider.requests()[1];
        let system = second.messages[0].text();
        assert!(system.contains("CONTEXTO DA SESSÃO"));
        assert!(system.contains("Telefone: 11987654321"));
        assert!(system.contains("2ª interação"));
        // system, user, assistant, new user
        assert_eq!(second.messages.len(), 4);
        assert_eq!(second.messages[2].text(), "Anotado.");
    }

    #[tokio::test]
    async fn events_are_published() {
        let provider = ScriptedProvider::new(vec![
            Ok(tool_call("c", "create_ticket", json!({"pid": 906}))),
            Ok(Message::assistant("Feito.")),
        ]);
        let orch = orchestrator(provider, Arc::new(RecordingInvoker::default())).await;
        let mut rx = orch.event_bus().subscribe();

        orch.handle(Some("s10"), "agendar").await;

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(match &*event {
                DomainEvent::MessageReceived { .. } => "received",
                DomainEvent::ArgumentsCorrected { fields, .. } => {
                    assert!(fields.contains(&"pid".to_string()));
                    "corrected"
                }
                DomainEvent::ToolExecuted { success, .. } => {
                    assert!(success);
                    "tool"
                }
                DomainEvent::ResponseGenerated { .. } => "response",
                _ => "other",
            });
        }
        assert_eq!(kinds, vec!["received", "corrected", "tool", "response"]);
    }

    /// Answers after a delay and tracks how many completions overlap.
    #[derive(Default)]
    struct SlowProvider {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Provider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(ProviderResponse {
                message: Message::assistant("Pronto."),
                usage: None,
                model: "slow-model".into(),
            })
        }
    }

    async fn slow_orchestrator() -> (Arc<SlowProvider>, Orchestrator) {
        let provider = Arc::new(SlowProvider::default());
        let orch = Orchestrator::from_config(
            &AppConfig::default(),
            provider.clone(),
            Arc::new(RecordingInvoker::default()),
            store().await,
        );
        (provider, orch)
    }

    #[tokio::test(start_paused = true)]
    async fn same_session_turns_run_one_at_a_time() {
        let (provider, orch) = slow_orchestrator().await;

        tokio::join!(
            orch.handle(Some("same"), "primeira"),
            orch.handle(Some("same"), "segunda"),
        );

        assert_eq!(provider.peak.load(Ordering::SeqCst), 1);
        let session = orch.store().snapshot(&"same".into()).await.unwrap();
        assert_eq!(session.transcript.len(), 4);
        assert_eq!(session.interaction_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn different_sessions_run_concurrently() {
        let (provider, orch) = slow_orchestrator().await;

        tokio::join!(
            orch.handle(Some("a"), "primeira"),
            orch.handle(Some("b"), "segunda"),
        );

        assert_eq!(provider.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn builders_override_config_defaults() {
        let domain = DomainConfig {
            provider_id: 99,
            service_label: "ODONTOLOGIA".into(),
            ..DomainConfig::default()
        };
        let provider = ScriptedProvider::new(vec![
            Ok(tool_call("c1", "create_ticket", json!({"pid": 730}))),
            Ok(Message::assistant("segredo")),
        ]);
        let invoker = Arc::new(RecordingInvoker::default().with(
            "create_ticket",
            Ok(json!({"responseData": {"tickets": [5], "smartCode": "AB1"}})),
        ));
        let sanitizer = Sanitizer::new(&SanitizerConfig {
            forbidden_terms: vec!["segredo".into()],
            fallback: "Nada a mostrar.".into(),
        });

        let orch = Orchestrator::new(
            provider.clone(),
            "custom-model",
            filachat_tools::default_catalog(&domain),
            invoker.clone(),
            store().await,
        )
        .with_temperature(0.2)
        .with_max_tokens(256)
        .with_system_prompt("Você é um assistente de testes.")
        .with_corrector(ArgumentCorrector::new(domain.clone(), "create_ticket", Vec::new()))
        .with_sanitizer(sanitizer)
        .with_extractors(ExtractorChain::new(Vec::new()))
        .with_domain(domain);

        let reply = orch.handle(Some("b1"), "meu telefone é 11987654321").await;
        assert_eq!(reply.text, "Nada a mostrar.");

        let request = &provider.requests()[0];
        assert_eq!(request.model, "custom-model");
        assert!((request.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(request.max_tokens, Some(256));
        assert!(request.messages[0].text().starts_with("Você é um assistente de testes."));

        assert_eq!(invoker.calls()[0].1["pid"], 99);

        let session = orch.store().snapshot(&"b1".into()).await.unwrap();
        assert!(session.profile.phone.is_none());
        assert_eq!(session.completed[0].category, "ODONTOLOGIA");
    }

    #[tokio::test]
    async fn health_reports_both_services() {
        let provider = ScriptedProvider::new(vec![]);
        let orch = orchestrator(provider, Arc::new(RecordingInvoker::default())).await;
        assert_eq!(
            orch.health().await,
            HealthReport {
                provider: true,
                tools: true
            }
        );
    }
}
