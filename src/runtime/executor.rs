/// Node runners for the five workflow node types
///
/// `run_node` dispatches a node to its type-specific runner. Every failure a
/// runner can hit (a bad config, a failing HTTP call, a script error) becomes
/// a failed `NodeRunResult` rather than an `Err`, so the engine can record it
/// and halt the run cleanly instead of unwinding.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};

use crate::config::Config;
use crate::runtime::context::{now_rfc3339, ExecutionSnapshot, NodeRunResult, RunStatus};
use crate::script::{ExpressionEvaluator, LuaEvaluator};
use crate::workflow::types::{
    decode_config, CodeConfig, ConditionConfig, HttpRequestConfig, NodeType, TriggerConfig,
    WorkflowNode,
};

/// Executes individual nodes against frozen context snapshots
///
/// Holds the shared HTTP client (one connection pool for the whole process)
/// and the script backend used by CONDITION and CODE nodes.
#[derive(Debug)]
pub struct NodeExecutor {
    /// Shared HTTP client for HTTP_REQUEST nodes
    http: reqwest::Client,
    /// Script backend for CONDITION and CODE nodes
    evaluator: Arc<dyn ExpressionEvaluator>,
}

impl NodeExecutor {
    /// Create an executor backed by the embedded Lua evaluator
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Self::with_evaluator(config, Arc::new(LuaEvaluator::new(config.script.budget_ms)))
    }

    /// Create an executor with a caller-supplied script backend
    pub fn with_evaluator(
        config: &Config,
        evaluator: Arc<dyn ExpressionEvaluator>,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.http.connect_timeout_ms))
            .build()?;
        Ok(Self { http, evaluator })
    }

    /// Run a single node against a frozen snapshot of the context
    pub async fn run_node(
        &self,
        node: &WorkflowNode,
        snapshot: &ExecutionSnapshot,
    ) -> NodeRunResult {
        tracing::info!("🚀 Executing node: {} (type: {})", node.id, node.node_type);
        let start_time = std::time::Instant::now();

        let result = match &node.node_type {
            NodeType::Trigger => self.run_trigger_node(node),
            NodeType::HttpRequest => self.run_http_node(node).await,
            NodeType::Condition => self.run_condition_node(node, snapshot).await,
            NodeType::DoNothing => self.run_do_nothing_node(node, snapshot),
            NodeType::Code => self.run_code_node(node, snapshot).await,
            NodeType::Other(other) => {
                NodeRunResult::failed(&node.id, format!("Unknown node type: {}", other))
            }
        };

        let duration = start_time.elapsed();
        match result.status {
            RunStatus::Success => {
                tracing::info!("✅ Node '{}' completed in {:?}", node.id, duration)
            }
            RunStatus::Failed => tracing::warn!(
                "❌ Node '{}' failed in {:?}: {}",
                node.id,
                duration,
                result.error.as_deref().unwrap_or("unknown error")
            ),
            RunStatus::Skipped => tracing::debug!("⏭️ Node '{}' reported skipped", node.id),
        }

        result
    }

    /// TRIGGER: run entry point, records how the run began
    fn run_trigger_node(&self, node: &WorkflowNode) -> NodeRunResult {
        let config: TriggerConfig = match decode_config(&node.data.config) {
            Ok(config) => config,
            Err(e) => {
                return NodeRunResult::failed(&node.id, format!("Invalid TRIGGER config: {}", e))
            }
        };

        NodeRunResult::success(
            &node.id,
            as_object(json!({
                "triggerType": config.trigger_type,
                "triggeredAt": now_rfc3339(),
            })),
        )
    }

    /// DO_NOTHING: passthrough that records what it saw
    fn run_do_nothing_node(
        &self,
        node: &WorkflowNode,
        snapshot: &ExecutionSnapshot,
    ) -> NodeRunResult {
        NodeRunResult::success(
            &node.id,
            as_object(json!({
                "note": "No operation performed",
                "snapshot": snapshot.to_value(),
                "executedAt": now_rfc3339(),
            })),
        )
    }

    /// HTTP_REQUEST: outbound call with per-node method, headers, query, body
    /// and timeout
    async fn run_http_node(&self, node: &WorkflowNode) -> NodeRunResult {
        let config: HttpRequestConfig = match decode_config(&node.data.config) {
            Ok(config) => config,
            Err(e) => {
                return NodeRunResult::failed(
                    &node.id,
                    format!("Invalid HTTP_REQUEST config: {}", e),
                )
            }
        };

        if config.url.trim().is_empty() {
            return NodeRunResult::failed(&node.id, "URL is required");
        }

        // Append query parameters; the request echo keeps the configured URL
        let mut url = config.url.clone();
        if !config.query.is_empty() {
            let pairs: Vec<String> = config
                .query
                .iter()
                .map(|(key, value)| format!("{}={}", key, value))
                .collect();
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&pairs.join("&"));
        }

        let method = config.method.to_uppercase();
        let mut request = match method.as_str() {
            "GET" => self.http.get(&url),
            "POST" => self.http.post(&url),
            "PUT" => self.http.put(&url),
            "PATCH" => self.http.patch(&url),
            "DELETE" => self.http.delete(&url),
            _ => {
                return NodeRunResult::failed(
                    &node.id,
                    format!("Unsupported HTTP method: {}", config.method),
                )
            }
        };

        let mut headers = config.headers.clone();
        let has_content_type = headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case("content-type"));
        if !has_content_type {
            headers.insert("Content-Type".to_string(), "application/json".to_string());
        }
        for (name, value) in &headers {
            request = request.header(name.as_str(), value.as_str());
        }

        if let Some(body) = &config.body {
            request =
                request.body(serde_json::to_string(body).unwrap_or_else(|_| "null".to_string()));
        }

        request = request.timeout(Duration::from_millis(config.timeout_ms));

        let request_echo = json!({
            "url": config.url,
            "method": method,
            "headers": headers,
            "query": config.query,
            "body": config.body.clone().unwrap_or(Value::Null),
            "timeoutMs": config.timeout_ms,
        });

        tracing::debug!("🌐 {} {}", method, url);
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let message = e.to_string();
                return NodeRunResult::failed_with_outputs(
                    &node.id,
                    as_object(json!({
                        "request": request_echo,
                        "response": {
                            "status": 0,
                            "statusText": message.clone(),
                            "data": Value::Null,
                            "error": message.clone(),
                        },
                    })),
                    message,
                );
            }
        };

        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or("OK").to_string();

        // Duplicate header names keep their first value
        let mut response_headers = BTreeMap::new();
        for (name, value) in response.headers() {
            if let Ok(text) = value.to_str() {
                response_headers
                    .entry(name.as_str().to_string())
                    .or_insert_with(|| text.to_string());
            }
        }

        let body_text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                let message = e.to_string();
                return NodeRunResult::failed_with_outputs(
                    &node.id,
                    as_object(json!({
                        "request": request_echo,
                        "response": {
                            "status": 0,
                            "statusText": message.clone(),
                            "data": Value::Null,
                            "error": message.clone(),
                        },
                    })),
                    message,
                );
            }
        };

        let data = if body_text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&body_text).unwrap_or(Value::String(body_text.clone()))
        };

        if status.is_client_error() || status.is_server_error() {
            tracing::warn!("📊 HTTP {} from {}", status.as_u16(), config.url);
            return NodeRunResult::failed_with_outputs(
                &node.id,
                as_object(json!({
                    "request": request_echo,
                    "response": {
                        "status": status.as_u16(),
                        "statusText": status_text.clone(),
                        "data": data,
                        "error": status_text.clone(),
                    },
                })),
                status_text,
            );
        }

        NodeRunResult::success(
            &node.id,
            as_object(json!({
                "request": request_echo,
                "response": {
                    "status": status.as_u16(),
                    "statusText": status_text,
                    "data": data,
                    "headers": response_headers,
                },
            })),
        )
    }

    /// CONDITION: evaluate an expression and record which branch was taken
    async fn run_condition_node(
        &self,
        node: &WorkflowNode,
        snapshot: &ExecutionSnapshot,
    ) -> NodeRunResult {
        let config: ConditionConfig = match decode_config(&node.data.config) {
            Ok(config) => config,
            Err(e) => {
                return NodeRunResult::failed(&node.id, format!("Invalid CONDITION config: {}", e))
            }
        };

        if config.expression.trim().is_empty() {
            return NodeRunResult::failed(&node.id, "Condition expression is required");
        }

        let cleaned = clean_expression(&config.expression);
        tracing::debug!("🧪 Evaluating condition '{}' as '{}'", config.expression, cleaned);

        match self
            .evaluator
            .evaluate_bool(&cleaned, script_bindings(snapshot))
            .await
        {
            Ok(result) => NodeRunResult::success(
                &node.id,
                as_object(json!({
                    "expression": config.expression,
                    "result": result,
                    "branch": if result { "true" } else { "false" },
                    "evaluatedAt": now_rfc3339(),
                })),
            ),
            Err(e) => NodeRunResult::failed(
                &node.id,
                with_nil_hint(format!("Invalid expression: {}", e)),
            ),
        }
    }

    /// CODE: run a script and record its final value
    async fn run_code_node(&self, node: &WorkflowNode, snapshot: &ExecutionSnapshot) -> NodeRunResult {
        let config: CodeConfig = match decode_config(&node.data.config) {
            Ok(config) => config,
            Err(e) => {
                return NodeRunResult::failed(&node.id, format!("Invalid CODE config: {}", e))
            }
        };

        if config.code.trim().is_empty() {
            return NodeRunResult::failed(&node.id, "Code is required");
        }

        // No `{{ }}` stripping here: braces are legal table syntax in code
        let source = config.code.replace("$json", "json");

        match self.evaluator.evaluate(&source, script_bindings(snapshot)).await {
            Ok(result) => NodeRunResult::success(
                &node.id,
                as_object(json!({
                    "result": result,
                    "inputSnapshot": snapshot.to_value(),
                    "executedAt": now_rfc3339(),
                })),
            ),
            Err(e) => NodeRunResult::failed(
                &node.id,
                with_nil_hint(format!("Code execution error: {}", e)),
            ),
        }
    }
}

/// Bindings shared by CONDITION and CODE: the full snapshot plus the merged
/// `json` convenience view
fn script_bindings(snapshot: &ExecutionSnapshot) -> Vec<(String, Value)> {
    vec![
        ("snapshot".to_string(), snapshot.to_value()),
        ("json".to_string(), Value::Object(snapshot.json_payload())),
    ]
}

/// Strip the `{{ }}` template wrapper and rewrite `$json` to the script-legal
/// `json` global
fn clean_expression(expression: &str) -> String {
    expression
        .trim()
        .replace("{{", "")
        .replace("}}", "")
        .trim()
        .to_string()
        .replace("$json", "json")
}

/// Point at the usual cause when a script indexed data that is not there
fn with_nil_hint(mut message: String) -> String {
    if message.contains("attempt to index a nil value") {
        message.push_str(
            ". Make sure previous nodes have been executed and contain the expected data structure.",
        );
    }
    message
}

fn as_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
