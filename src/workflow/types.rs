/// Core workflow graph type definitions
///
/// Defines the wire-shaped structures for nodes and edges as supplied by
/// workflow storage, plus the typed per-node configuration structs decoded
/// from the loosely typed `config` map at execution time.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// A single node in the workflow graph
///
/// Nodes are immutable inputs to a run: the engine never mutates them.
/// `position` is presentation-only and carried through for round-tripping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Unique node identifier within the graph (e.g., "trigger-1")
    pub id: String,
    /// The node type which determines execution behavior
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Canvas coordinates, ignored by the engine
    #[serde(default)]
    pub position: Position,
    /// Display label and per-type configuration
    #[serde(default)]
    pub data: NodeData,
}

impl WorkflowNode {
    /// Create a node with an empty config, labeled after its id
    pub fn new(id: impl Into<String>, node_type: NodeType) -> Self {
        let id = id.into();
        Self {
            node_type,
            position: Position::default(),
            data: NodeData {
                label: id.clone(),
                config: Map::new(),
            },
            id,
        }
    }

    /// Set one config key, consuming and returning the node for chaining
    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.config.insert(key.into(), value);
        self
    }
}

/// Canvas position of a node (presentation only)
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Node payload: a human-readable label plus the raw configuration map
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeData {
    /// Human-readable node label
    #[serde(default)]
    pub label: String,
    /// Per-type configuration, semantics defined by the node type
    #[serde(default)]
    pub config: Map<String, Value>,
}

/// Available node types for the execution engine
///
/// The closed set is matched exhaustively at dispatch; any other string on the
/// wire is carried through in `Other` and produces a failed result when run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    /// Run entry point, always succeeds
    /// Expected config: { "triggerType": "MANUAL" }
    Trigger,

    /// Outbound HTTP call
    /// Expected config: { "url": "...", "method": "GET", "headers": {...}, "query": {...}, "body": ..., "timeoutMs": 30000 }
    HttpRequest,

    /// Boolean branching via an embedded script expression
    /// Expected config: { "expression": "{{ $json.response.status }} == 200" }
    Condition,

    /// Passthrough used for graph shaping and testing
    DoNothing,

    /// Arbitrary script execution against prior node outputs
    /// Expected config: { "code": "return json.score * 2" }
    Code,

    /// Any node type string this engine does not recognize
    #[serde(untagged)]
    Other(String),
}

impl NodeType {
    pub fn as_str(&self) -> &str {
        match self {
            NodeType::Trigger => "TRIGGER",
            NodeType::HttpRequest => "HTTP_REQUEST",
            NodeType::Condition => "CONDITION",
            NodeType::DoNothing => "DO_NOTHING",
            NodeType::Code => "CODE",
            NodeType::Other(s) => s,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed connection between two nodes
///
/// Edges define ordering dependency and, when the source is a CONDITION node,
/// branch selection via `sourceHandle` (compared against the source's recorded
/// `branch` output; absent means "true").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEdge {
    /// Source node id
    pub source: String,
    /// Target node id
    pub target: String,
    /// Branch discriminator for conditional edges
    #[serde(rename = "sourceHandle", skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
}

impl WorkflowEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_handle: None,
        }
    }

    /// Set the branch discriminator, consuming and returning the edge
    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }
}

/// Decode a raw config map into a typed per-node configuration struct
///
/// Unknown keys are ignored; missing keys fall back to their serde defaults.
/// A present key of the wrong shape is a decode error, which runners surface
/// as a failed result rather than a panic.
pub fn decode_config<T: serde::de::DeserializeOwned>(
    config: &Map<String, Value>,
) -> Result<T, serde_json::Error> {
    serde_json::from_value(Value::Object(config.clone()))
}

/// TRIGGER node configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TriggerConfig {
    /// How the run was initiated (informational)
    pub trigger_type: String,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            trigger_type: "MANUAL".to_string(),
        }
    }
}

/// HTTP_REQUEST node configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestConfig {
    /// Request URL; validated non-blank before a run, re-checked by the runner
    #[serde(default)]
    pub url: String,
    /// HTTP method; GET/POST/PUT/PATCH/DELETE are supported
    #[serde(default = "default_http_method")]
    pub method: String,
    /// Request headers; Content-Type defaults to application/json when absent
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Query parameters appended to the URL as k=v pairs
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    /// Request body, JSON-serialized as-is
    #[serde(default)]
    pub body: Option<Value>,
    /// Per-request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_http_method() -> String {
    "POST".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

/// CONDITION node configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConditionConfig {
    /// Boolean expression, optionally wrapped in {{ }}
    pub expression: String,
}

/// CODE node configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CodeConfig {
    /// Script body; its final value becomes the node's `result` output
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn node_round_trips_through_json() {
        let raw = json!({
            "id": "http-1",
            "type": "HTTP_REQUEST",
            "position": { "x": 120.0, "y": 64.5 },
            "data": {
                "label": "Fetch scores",
                "config": { "url": "https://example.test/scores", "method": "GET" }
            }
        });

        let node: WorkflowNode = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(node.id, "http-1");
        assert_eq!(node.node_type, NodeType::HttpRequest);
        assert_eq!(node.data.label, "Fetch scores");

        let back = serde_json::to_value(&node).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn unknown_node_type_round_trips() {
        let raw = json!({
            "id": "x",
            "type": "TELEPORT",
            "position": { "x": 0.0, "y": 0.0 },
            "data": { "label": "x", "config": {} }
        });

        let node: WorkflowNode = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(node.node_type, NodeType::Other("TELEPORT".to_string()));
        assert_eq!(node.node_type.as_str(), "TELEPORT");

        let back = serde_json::to_value(&node).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn edge_source_handle_is_optional_on_the_wire() {
        let plain: WorkflowEdge = serde_json::from_value(json!({
            "source": "a",
            "target": "b"
        }))
        .unwrap();
        assert_eq!(plain.source_handle, None);
        // absent handle stays absent when serialized back
        let back = serde_json::to_value(&plain).unwrap();
        assert_eq!(back, json!({ "source": "a", "target": "b" }));

        let branched: WorkflowEdge = serde_json::from_value(json!({
            "source": "c",
            "target": "d",
            "sourceHandle": "false"
        }))
        .unwrap();
        assert_eq!(branched.source_handle.as_deref(), Some("false"));
    }

    #[test]
    fn http_config_defaults() {
        let node = WorkflowNode::new("h", NodeType::HttpRequest)
            .with_config("url", json!("https://example.test"));
        let config: HttpRequestConfig = decode_config(&node.data.config).unwrap();

        assert_eq!(config.method, "POST");
        assert_eq!(config.timeout_ms, 30_000);
        assert!(config.headers.is_empty());
        assert!(config.query.is_empty());
        assert_eq!(config.body, None);
    }

    #[test]
    fn trigger_config_defaults_to_manual() {
        let config: TriggerConfig = decode_config(&Map::new()).unwrap();
        assert_eq!(config.trigger_type, "MANUAL");

        let node = WorkflowNode::new("t", NodeType::Trigger)
            .with_config("triggerType", json!("WEBHOOK"));
        let config: TriggerConfig = decode_config(&node.data.config).unwrap();
        assert_eq!(config.trigger_type, "WEBHOOK");
    }

    #[test]
    fn malformed_config_value_is_a_decode_error() {
        let node = WorkflowNode::new("h", NodeType::HttpRequest)
            .with_config("url", json!("https://example.test"))
            .with_config("timeoutMs", json!("soon"));
        assert!(decode_config::<HttpRequestConfig>(&node.data.config).is_err());
    }
}
