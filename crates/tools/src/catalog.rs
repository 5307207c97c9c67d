//! The queue backend's operation catalog.
//!
//! These definitions are advertised to the model in the first completion
//! phase. Descriptions quote the configured defaults so the model has the
//! verified values in front of it.

use filachat_config::DomainConfig;
use filachat_core::{ToolCatalog, ToolDefinition};
use serde_json::json;

/// Name of the operation that creates an entity (a queue ticket).
pub const CREATE_TICKET: &str = "create_ticket";

/// Name of the operation that resolves the device/location.
pub const GET_TERMINAL: &str = "get_terminal";

fn def(
    name: &str,
    description: impl Into<String>,
    parameters: serde_json::Value,
) -> ToolDefinition {
    ToolDefinition {
        name: name.into(),
        description: description.into(),
        parameters,
    }
}

/// Build the catalog of every backend operation.
pub fn default_catalog(domain: &DomainConfig) -> ToolCatalog {
    let mut catalog = ToolCatalog::new();

    catalog.register(def(
        GET_TERMINAL,
        "Busca informações do terminal Filazero padrão. Use sempre o accessKey padrão.",
        json!({
            "type": "object",
            "properties": {
                "accessKey": {
                    "type": "string",
                    "description": format!("Chave de acesso do terminal (padrão: {})", domain.access_key)
                }
            },
            "required": ["accessKey"]
        }),
    ));

    catalog.register(def(
        CREATE_TICKET,
        format!(
            "Cria um novo ticket de {} na fila. Use valores padrão para agendamento rápido.",
            domain.service_label
        ),
        json!({
            "type": "object",
            "properties": {
                "terminalSchedule": {
                    "type": "object",
                    "description": format!(
                        "Sessão do terminal (padrão: sessionId {}, publicAccessKey {})",
                        domain.schedule_session_id, domain.access_key
                    ),
                    "properties": {
                        "sessionId": { "type": "number", "description": format!("ID da sessão (padrão: {})", domain.schedule_session_id) },
                        "publicAccessKey": { "type": "string", "description": "Chave pública do terminal" }
                    }
                },
                "pid": {
                    "type": "number",
                    "description": format!("ID do provider (padrão: {} = {})", domain.provider_id, domain.provider_label)
                },
                "locationId": {
                    "type": "number",
                    "description": format!("ID da localização (padrão: {} = {})", domain.location_id, domain.location_label)
                },
                "serviceId": {
                    "type": "number",
                    "description": format!("ID do serviço (padrão: {} = {})", domain.service_id, domain.service_label)
                },
                "customer": {
                    "type": "object",
                    "description": "Dados do cliente (OBRIGATÓRIOS)",
                    "properties": {
                        "name": { "type": "string", "description": "Nome completo do cliente" },
                        "phone": { "type": "string", "description": "Telefone do cliente com DDD" },
                        "email": { "type": "string", "description": "Email do cliente" }
                    },
                    "required": ["name", "phone", "email"]
                },
                "browserUuid": {
                    "type": "string",
                    "description": "Identificador único da sessão do navegador (gerado automaticamente)"
                },
                "priority": {
                    "type": "number",
                    "description": format!("Prioridade do ticket (padrão: {})", domain.priority),
                    "default": domain.priority
                }
            },
            "required": ["customer"]
        }),
    ));

    catalog.register(def(
        "get_ticket",
        "Consulta informações detalhadas de um ticket específico pelo ID.",
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "number", "description": "ID numérico do ticket" }
            },
            "required": ["id"]
        }),
    ));

    catalog.register(def(
        "get_queue_position",
        "Consulta a posição atual de um ticket na fila de atendimento.",
        json!({
            "type": "object",
            "properties": {
                "providerId": { "type": "number", "description": "ID do provider/empresa" },
                "ticketId": { "type": "number", "description": "ID do ticket" }
            },
            "required": ["providerId", "ticketId"]
        }),
    ));

    catalog.register(def(
        "get_ticket_prevision",
        "Consulta a previsão de horário de atendimento de um ticket.",
        json!({
            "type": "object",
            "properties": {
                "ticketId": { "type": "number", "description": "ID do ticket" }
            },
            "required": ["ticketId"]
        }),
    ));

    catalog.register(def(
        "cancel_ticket",
        "Cancela um ticket existente na fila.",
        json!({
            "type": "object",
            "properties": {
                "ticketId": { "type": "number", "description": "ID do ticket a ser cancelado" },
                "providerId": { "type": "number", "description": "ID do provider" },
                "cancellation": {
                    "type": "string",
                    "description": "Motivo do cancelamento",
                    "default": "Cancelado pelo assistente"
                }
            },
            "required": ["ticketId", "providerId"]
        }),
    ));

    catalog.register(def(
        "checkin_ticket",
        "Realiza check-in de um ticket usando o código smart.",
        json!({
            "type": "object",
            "properties": {
                "smartCode": { "type": "string", "description": "Código smart do ticket (ex: GB7SH)" },
                "providerId": { "type": "number", "description": "ID do provider" }
            },
            "required": ["smartCode", "providerId"]
        }),
    ));

    catalog.register(def(
        "confirm_presence",
        "Confirma a presença do cliente para atendimento.",
        json!({
            "type": "object",
            "properties": {
                "ticketId": { "type": "number", "description": "ID do ticket" },
                "providerId": { "type": "number", "description": "ID do provider" }
            },
            "required": ["ticketId", "providerId"]
        }),
    ));

    catalog.register(def(
        "update_feedback",
        "Atualiza o feedback/avaliação de um atendimento.",
        json!({
            "type": "object",
            "properties": {
                "feedbackId": { "type": "number", "description": "ID do feedback" },
                "guid": { "type": "string", "description": "GUID único do feedback" },
                "rate": { "type": "number", "description": "Nota de 1 a 5", "minimum": 1, "maximum": 5 },
                "comment": { "type": "string", "description": "Comentário opcional sobre o atendimento" }
            },
            "required": ["feedbackId", "guid", "rate"]
        }),
    ));

    catalog.register(def(
        "get_service",
        "Busca informações detalhadas de um serviço específico.",
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "number", "description": "ID do serviço" }
            },
            "required": ["id"]
        }),
    ));

    catalog.register(def(
        "get_company_template",
        "Busca o template visual e configurações de uma empresa.",
        json!({
            "type": "object",
            "properties": {
                "slug": { "type": "string", "description": "Slug da empresa (ex: filazero)" }
            },
            "required": ["slug"]
        }),
    ));

    catalog
}
