//! Argument correction for proposed tool calls.
//!
//! The model regularly invents provider/location/service ids, or forgets
//! the credential and schedule fields entirely. Before an entity-creation
//! call is dispatched, every such field is checked against the verified
//! values in the `[domain]` config and repaired. Correction never fails and
//! applying it twice changes nothing the second time.

use filachat_config::DomainConfig;
use rand::Rng;
use rand::distr::Alphanumeric;
use serde_json::{Map, Value, json};
use tracing::{info, warn};

/// Result of correcting one call.
#[derive(Debug, Clone, PartialEq)]
pub struct Correction {
    pub arguments: Value,
    /// Names of the fields that were filled or replaced
    pub fields: Vec<String>,
}

impl Correction {
    pub fn changed(&self) -> bool {
        !self.fields.is_empty()
    }
}

/// Repairs tool-call arguments using the verified domain values.
#[derive(Debug, Clone)]
pub struct ArgumentCorrector {
    domain: DomainConfig,
    entity_operation: String,
    credential_operations: Vec<String>,
}

/// Read an id that may arrive as a number or a numeric string.
fn as_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}

/// `agent-<unix ms>-<9 random lowercase alphanumerics>`
pub fn generate_browser_uuid() -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("agent-{}-{suffix}", chrono::Utc::now().timestamp_millis())
}

impl ArgumentCorrector {
    pub fn new(
        domain: DomainConfig,
        entity_operation: impl Into<String>,
        credential_operations: Vec<String>,
    ) -> Self {
        Self {
            domain,
            entity_operation: entity_operation.into(),
            credential_operations,
        }
    }

    /// Corrector for the queue backend: `create_ticket` is the entity operation.
    pub fn from_config(domain: &DomainConfig, tools: &filachat_config::ToolsConfig) -> Self {
        Self::new(
            domain.clone(),
            filachat_tools::CREATE_TICKET,
            tools.credential_operations.clone(),
        )
    }

    /// Correct `arguments` for `operation`.
    pub fn correct(&self, operation: &str, arguments: Value) -> Value {
        self.correct_with_report(operation, arguments).arguments
    }

    /// Correct `arguments` for `operation`, reporting which fields changed.
    pub fn correct_with_report(&self, operation: &str, arguments: Value) -> Correction {
        let mut fields = Vec::new();
        let mut args = match arguments {
            Value::Object(map) => map,
            other => {
                warn!(operation, value = %other, "Non-object arguments replaced with empty object");
                fields.push("arguments".to_string());
                Map::new()
            }
        };

        if operation == self.entity_operation {
            self.correct_entity(&mut args, &mut fields);
        } else if self.credential_operations.iter().any(|op| op == operation)
            && is_blank(args.get("accessKey"))
        {
            info!(operation, "Injecting default access key");
            args.insert("accessKey".into(), json!(self.domain.access_key));
            fields.push("accessKey".to_string());
        }

        Correction {
            arguments: Value::Object(args),
            fields,
        }
    }

    fn correct_entity(&self, args: &mut Map<String, Value>, fields: &mut Vec<String>) {
        let d = &self.domain;

        if is_blank(args.get("browserUuid")) {
            let uuid = generate_browser_uuid();
            info!(browser_uuid = %uuid, "Generated browserUuid");
            args.insert("browserUuid".into(), json!(uuid));
            fields.push("browserUuid".into());
        }

        Self::fix_id(args, fields, "pid", d.provider_id, &d.known_bad_provider_ids);
        Self::fix_id(args, fields, "locationId", d.location_id, &d.known_bad_location_ids);
        Self::fix_id(args, fields, "serviceId", d.service_id, &d.known_bad_service_ids);

        if !args.contains_key("priority") || args.get("priority").is_some_and(Value::is_null) {
            args.insert("priority".into(), json!(d.priority));
            fields.push("priority".into());
        }

        let schedule = args
            .entry("terminalSchedule")
            .or_insert_with(|| Value::Object(Map::new()));
        if !schedule.is_object() {
            warn!(value = %schedule, "Replacing malformed terminalSchedule");
            *schedule = Value::Object(Map::new());
            fields.push("terminalSchedule".into());
        }
        if let Value::Object(schedule) = schedule {
            let mut nested = Vec::new();
            Self::fix_id(
                schedule,
                &mut nested,
                "sessionId",
                d.schedule_session_id,
                &d.known_bad_session_ids,
            );
            if schedule.get("publicAccessKey").and_then(Value::as_str) != Some(d.access_key.as_str())
            {
                schedule.insert("publicAccessKey".into(), json!(d.access_key));
                nested.push("publicAccessKey".into());
            }
            fields.extend(nested.into_iter().map(|f| format!("terminalSchedule.{f}")));
        }
    }

    /// Fill `key` when absent, replace it when known-bad or unreadable.
    fn fix_id(
        args: &mut Map<String, Value>,
        fields: &mut Vec<String>,
        key: &str,
        default: u64,
        known_bad: &[u64],
    ) {
        match args.get(key) {
            None | Some(Value::Null) => {
                info!(field = key, default, "Filling missing id");
            }
            Some(value) => match as_id(value) {
                Some(id) if !known_bad.contains(&id) => return,
                Some(id) => {
                    warn!(field = key, invalid = id, corrected = default, "Replacing known-bad id");
                }
                None => {
                    warn!(field = key, value = %value, corrected = default, "Replacing unreadable id");
                }
            },
        }
        args.insert(key.into(), json!(default));
        fields.push(key.into());
    }
}

impl Default for ArgumentCorrector {
    fn default() -> Self {
        Self::from_config(
            &DomainConfig::default(),
            &filachat_config::ToolsConfig::default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corrector() -> ArgumentCorrector {
        ArgumentCorrector::default()
    }

    #[test]
    fn fills_every_missing_field() {
        let args = corrector().correct(
            "create_ticket",
            json!({"customer": {"name": "Maria", "phone": "11987654321", "email": "m@x.com"}}),
        );
        assert_eq!(args["pid"], 11);
        assert_eq!(args["locationId"], 11);
        assert_eq!(args["serviceId"], 21);
        assert_eq!(args["priority"], 0);
        assert_eq!(args["terminalSchedule"]["sessionId"], 2056332);
        assert_eq!(
            args["terminalSchedule"]["publicAccessKey"],
            "d6779a60360d455b9af96c1b68e066c5"
        );
        assert!(args["browserUuid"].as_str().unwrap().starts_with("agent-"));
        assert_eq!(args["customer"]["name"], "Maria");
    }

    #[test]
    fn replaces_known_bad_values() {
        let args = corrector().correct(
            "create_ticket",
            json!({
                "pid": 906,
                "locationId": 0,
                "serviceId": 123,
                "terminalSchedule": {"sessionId": 123, "publicAccessKey": "made-up"},
                "browserUuid": "keep-me"
            }),
        );
        assert_eq!(args["pid"], 11);
        assert_eq!(args["locationId"], 11);
        assert_eq!(args["serviceId"], 21);
        assert_eq!(args["terminalSchedule"]["sessionId"], 2056332);
        assert_eq!(
            args["terminalSchedule"]["publicAccessKey"],
            "d6779a60360d455b9af96c1b68e066c5"
        );
        assert_eq!(args["browserUuid"], "keep-me");
    }

    #[test]
    fn numeric_strings_are_recognized() {
        let args = corrector().correct("create_ticket", json!({"pid": "730", "serviceId": "2"}));
        assert_eq!(args["pid"], 11);
        assert_eq!(args["serviceId"], 21);
    }

    #[test]
    fn valid_ids_are_kept() {
        let args = corrector().correct("create_ticket", json!({"pid": 42, "locationId": "7"}));
        assert_eq!(args["pid"], 42);
        assert_eq!(args["locationId"], "7");
    }

    #[test]
    fn correction_is_idempotent() {
        let c = corrector();
        let once = c.correct("create_ticket", json!({"pid": 777, "locationId": 0}));
        let twice = c.correct_with_report("create_ticket", once.clone());
        assert_eq!(twice.arguments, once);
        assert!(!twice.changed());
    }

    #[test]
    fn report_lists_changed_fields() {
        let report = corrector().correct_with_report(
            "create_ticket",
            json!({
                "pid": 769,
                "locationId": 11,
                "serviceId": 21,
                "priority": 0,
                "browserUuid": "x",
                "terminalSchedule": {"sessionId": 2056332, "publicAccessKey": "d6779a60360d455b9af96c1b68e066c5"}
            }),
        );
        assert_eq!(report.fields, vec!["pid".to_string()]);
    }

    #[test]
    fn malformed_schedule_is_rebuilt() {
        let args = corrector().correct("create_ticket", json!({"terminalSchedule": "soon"}));
        assert_eq!(args["terminalSchedule"]["sessionId"], 2056332);
    }

    #[test]
    fn credential_operation_gets_access_key() {
        let args = corrector().correct("get_terminal", json!({}));
        assert_eq!(args["accessKey"], "d6779a60360d455b9af96c1b68e066c5");

        let args = corrector().correct("get_terminal", json!({"accessKey": ""}));
        assert_eq!(args["accessKey"], "d6779a60360d455b9af96c1b68e066c5");

        let args = corrector().correct("get_terminal", json!({"accessKey": "other"}));
        assert_eq!(args["accessKey"], "other");
    }

    #[test]
    fn other_operations_pass_through() {
        let input = json!({"ticketId": 5, "providerId": 906});
        assert_eq!(corrector().correct("cancel_ticket", input.clone()), input);
    }

    #[test]
    fn non_object_arguments_become_empty() {
        assert_eq!(corrector().correct("get_ticket", json!([1, 2])), json!({}));
        let report = corrector().correct_with_report("get_ticket", json!("id=3"));
        assert_eq!(report.fields, vec!["arguments".to_string()]);
    }

    #[test]
    fn browser_uuid_shape() {
        let uuid = generate_browser_uuid();
        let parts: Vec<&str> = uuid.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "agent");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2].chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }
}
