//! Tool boundary: remote operations the model may ask for.
//!
//! Operations (ticket creation, queue lookups, ...) are implemented by an
//! external tool-execution service. This module holds the call value, the
//! [`ToolInvoker`] trait the orchestrator dispatches through, and the
//! [`ToolCatalog`] of definitions advertised to the model.

use crate::error::ToolError;
use crate::provider::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A request to execute an operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the LLM's tool_call.id)
    pub id: String,

    /// Name of the operation to execute
    pub name: String,

    /// Arguments as a JSON object
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Build a call from the raw JSON-string arguments the model produced.
    ///
    /// Malformed or non-object arguments become an empty object.
    pub fn from_raw(id: impl Into<String>, name: impl Into<String>, raw_arguments: &str) -> Self {
        let arguments = match serde_json::from_str::<serde_json::Value>(raw_arguments) {
            Ok(value @ serde_json::Value::Object(_)) => value,
            _ => serde_json::Value::Object(serde_json::Map::new()),
        };
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Executes operations against the external tool-execution service.
///
/// A single blocking call per operation, no retry. The result is whatever
/// structured payload the service returned.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// A human-readable name for this invoker (e.g., "mcp").
    fn name(&self) -> &str;

    /// Execute `operation` with `arguments`.
    async fn invoke(
        &self,
        operation: &str,
        arguments: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, ToolError>;

    /// Health check: can we reach the tool service?
    async fn health_check(&self) -> bool {
        true
    }
}

/// The static set of operations advertised to the completion service.
///
/// Insertion order is preserved so the catalog sent to the model is stable.
pub struct ToolCatalog {
    definitions: Vec<ToolDefinition>,
    index: HashMap<String, usize>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self {
            definitions: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a definition. Replaces any existing one with the same name.
    pub fn register(&mut self, definition: ToolDefinition) {
        match self.index.get(&definition.name) {
            Some(&pos) => self.definitions[pos] = definition,
            None => {
                self.index
                    .insert(definition.name.clone(), self.definitions.len());
                self.definitions.push(definition);
            }
        }
    }

    /// Get a definition by name.
    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.index.get(name).map(|&pos| &self.definitions[pos])
    }

    /// Whether an operation with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All definitions, in registration order (for sending to the LLM).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.definitions.clone()
    }

    /// All operation names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.definitions.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::new()
    }
}
