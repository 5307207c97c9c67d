//! Tool-service client speaking MCP JSON-RPC over HTTP.
//!
//! Every operation is a `tools/call` request. The service answers with a
//! `result.content` array of `{type: "text", text}` items; the text is
//! parsed as JSON when it is JSON, so the orchestrator can read fields out
//! of the payload.

use async_trait::async_trait;
use filachat_core::ToolInvoker;
use filachat_core::error::ToolError;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// [`ToolInvoker`] for an HTTP MCP endpoint.
pub struct McpInvoker {
    endpoint: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl McpInvoker {
    /// Create a client for `endpoint`; each request gives up after `timeout`.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ToolError::Transport(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn from_config(config: &filachat_config::ToolsConfig) -> Result<Self, ToolError> {
        Self::new(&config.url, Duration::from_secs(config.timeout_secs))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post_json_rpc(&self, method: &str, params: Value) -> Result<Value, ToolError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": format!("filachat-{}-{id}", chrono::Utc::now().timestamp_millis()),
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ToolError::Transport(format!("MCP request failed: {e}")))?;

        let status = response.status();
        let payload = response
            .text()
            .await
            .map_err(|e| ToolError::Transport(format!("Failed to read MCP response: {e}")))?;

        if !status.is_success() {
            return Err(ToolError::Transport(format!(
                "MCP endpoint returned HTTP {}: {}",
                status.as_u16(),
                payload.chars().take(400).collect::<String>()
            )));
        }

        serde_json::from_str(&payload)
            .map_err(|e| ToolError::Transport(format!("Invalid MCP JSON response: {e}")))
    }
}

/// Concatenate the text items of an MCP `content` array.
fn render_content(content: &Value) -> Option<String> {
    let items = content.as_array()?;
    let chunks: Vec<String> = items
        .iter()
        .map(|item| match item.get("text").and_then(Value::as_str) {
            Some(text) => text.to_string(),
            None => item.to_string(),
        })
        .collect();
    if chunks.is_empty() {
        None
    } else {
        Some(chunks.join("\n"))
    }
}

/// Turn a `tools/call` result into the payload handed to the orchestrator.
fn decode_result(operation: &str, result: Value) -> Result<Value, ToolError> {
    let text = result.get("content").and_then(render_content);
    let is_error = result
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if is_error {
        return Err(ToolError::ExecutionFailed {
            tool_name: operation.to_string(),
            reason: text.unwrap_or_else(|| "operation reported an error".into()),
        });
    }

    match text {
        Some(text) => Ok(serde_json::from_str(&text).unwrap_or(Value::String(text))),
        None => Ok(result),
    }
}

#[async_trait]
impl ToolInvoker for McpInvoker {
    fn name(&self) -> &str {
        "mcp"
    }

    async fn invoke(&self, operation: &str, arguments: Value) -> Result<Value, ToolError> {
        debug!(operation, endpoint = %self.endpoint, "Calling tool service");
        let response = self
            .post_json_rpc(
                "tools/call",
                json!({
                    "name": operation,
                    "arguments": arguments,
                }),
            )
            .await?;

        if let Some(err) = response.get("error") {
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("MCP tools/call failed");
            warn!(operation, error = message, "Tool service returned an error");
            return Err(ToolError::ExecutionFailed {
                tool_name: operation.to_string(),
                reason: message.to_string(),
            });
        }

        decode_result(operation, response.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn health_check(&self) -> bool {
        match self.post_json_rpc("tools/list", json!({})).await {
            Ok(response) => response.get("error").is_none(),
            Err(e) => {
                debug!(error = %e, "Tool service health check failed");
                false
            }
        }
    }
}
