/// Execution context and per-node results
///
/// The context is an append-only record of node outputs in completion order.
/// Runners never see the live context; they get an `ExecutionSnapshot`, a
/// deep copy frozen at dispatch time, so the engine can keep appending while
/// a node is in flight.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Timestamps on results and snapshots, RFC 3339 in UTC
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Accumulated state of a single run
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Node outputs in completion order (skipped nodes record empty outputs,
    /// which lets downstream gating tell "ran" from "never ran")
    node_outputs: Vec<(String, Map<String, Value>)>,
    /// Identifier of this run
    run_id: String,
    /// When the run started, RFC 3339
    start_time: String,
}

impl ExecutionContext {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            node_outputs: Vec::new(),
            run_id: run_id.into(),
            start_time: now_rfc3339(),
        }
    }

    /// Record a completed node's outputs
    pub fn add_node_result(&mut self, result: &NodeRunResult) {
        self.node_outputs
            .push((result.node_id.clone(), result.outputs.clone()));
    }

    /// Outputs of `node_id` if it has completed, `None` if it never ran
    pub fn outputs_for(&self, node_id: &str) -> Option<&Map<String, Value>> {
        self.node_outputs
            .iter()
            .find(|(id, _)| id == node_id)
            .map(|(_, outputs)| outputs)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Deep, independent copy of everything recorded so far
    pub fn snapshot(&self) -> ExecutionSnapshot {
        ExecutionSnapshot {
            node_outputs: self.node_outputs.clone(),
            run_id: self.run_id.clone(),
            start_time: self.start_time.clone(),
        }
    }
}

/// Frozen copy of the context handed to a node at dispatch time
#[derive(Debug, Clone)]
pub struct ExecutionSnapshot {
    pub node_outputs: Vec<(String, Map<String, Value>)>,
    pub run_id: String,
    pub start_time: String,
}

impl ExecutionSnapshot {
    /// The snapshot as a JSON value, outputs keyed by node id
    pub fn to_value(&self) -> Value {
        let mut node_outputs = Map::new();
        for (node_id, outputs) in &self.node_outputs {
            node_outputs.insert(node_id.clone(), Value::Object(outputs.clone()));
        }
        serde_json::json!({
            "nodeOutputs": node_outputs,
            "runId": self.run_id,
            "startTime": self.start_time,
        })
    }

    /// Convenience payload for scripts: all outputs merged in completion
    /// order (later wins), then rebound to the HTTP `response` object when
    /// one is present so scripts can reach for `$json.data` directly
    pub fn json_payload(&self) -> Map<String, Value> {
        let mut merged = Map::new();
        for (_, outputs) in &self.node_outputs {
            for (key, value) in outputs {
                merged.insert(key.clone(), value.clone());
            }
        }

        if let Some(Value::Object(response)) = merged.get("response") {
            if response.contains_key("data") {
                return response.clone();
            }
        }

        merged
    }
}

/// Terminal status of one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failed,
    Skipped,
}

/// Outcome of running (or skipping) one node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRunResult {
    pub node_id: String,
    #[serde(default)]
    pub outputs: Map<String, Value>,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
}

impl NodeRunResult {
    pub fn success(node_id: impl Into<String>, outputs: Map<String, Value>) -> Self {
        Self {
            node_id: node_id.into(),
            outputs,
            status: RunStatus::Success,
            error: None,
            timestamp: now_rfc3339(),
        }
    }

    pub fn failed(node_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            outputs: Map::new(),
            status: RunStatus::Failed,
            error: Some(error.into()),
            timestamp: now_rfc3339(),
        }
    }

    /// Failure that still carries outputs (an HTTP 500 keeps its response)
    pub fn failed_with_outputs(
        node_id: impl Into<String>,
        outputs: Map<String, Value>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            outputs,
            status: RunStatus::Failed,
            error: Some(error.into()),
            timestamp: now_rfc3339(),
        }
    }

    pub fn skipped(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            outputs: Map::new(),
            status: RunStatus::Skipped,
            error: None,
            timestamp: now_rfc3339(),
        }
    }
}

/// Final outcome of a run: every per-node result in completion order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub run_id: String,
    pub results: Vec<NodeRunResult>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outputs(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected a JSON object"),
        }
    }

    #[test]
    fn snapshot_is_independent_of_later_results() {
        let mut context = ExecutionContext::new("run-1");
        context.add_node_result(&NodeRunResult::success("a", outputs(json!({ "x": 1 }))));

        let snapshot = context.snapshot();
        context.add_node_result(&NodeRunResult::success("b", outputs(json!({ "x": 2 }))));

        assert_eq!(snapshot.node_outputs.len(), 1);
        assert_eq!(context.snapshot().node_outputs.len(), 2);
    }

    #[test]
    fn json_payload_merges_in_completion_order() {
        let mut context = ExecutionContext::new("run-1");
        context.add_node_result(&NodeRunResult::success("a", outputs(json!({ "x": 1, "y": 1 }))));
        context.add_node_result(&NodeRunResult::success("b", outputs(json!({ "x": 2 }))));

        let payload = context.snapshot().json_payload();
        assert_eq!(payload.get("x"), Some(&json!(2)));
        assert_eq!(payload.get("y"), Some(&json!(1)));
    }

    #[test]
    fn json_payload_rebinds_to_http_response() {
        let mut context = ExecutionContext::new("run-1");
        context.add_node_result(&NodeRunResult::success(
            "http",
            outputs(json!({
                "request": { "url": "http://example.test" },
                "response": { "status": 200, "data": { "score": 85 } }
            })),
        ));

        let payload = context.snapshot().json_payload();
        assert_eq!(payload.get("data"), Some(&json!({ "score": 85 })));
        assert_eq!(payload.get("status"), Some(&json!(200)));
        assert!(payload.get("request").is_none());
    }

    #[test]
    fn snapshot_value_carries_run_metadata() {
        let mut context = ExecutionContext::new("run-9");
        context.add_node_result(&NodeRunResult::success("a", outputs(json!({ "x": 1 }))));

        let value = context.snapshot().to_value();
        assert_eq!(value["runId"], json!("run-9"));
        assert_eq!(value["nodeOutputs"]["a"]["x"], json!(1));
        assert!(value["startTime"].as_str().is_some());
    }

    #[test]
    fn statuses_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&RunStatus::Success).unwrap(), "\"success\"");
        assert_eq!(serde_json::to_string(&RunStatus::Failed).unwrap(), "\"failed\"");
        assert_eq!(serde_json::to_string(&RunStatus::Skipped).unwrap(), "\"skipped\"");
    }

    #[test]
    fn result_wire_shape_is_camel_case_and_omits_null_error() {
        let value = serde_json::to_value(NodeRunResult::success("n1", Map::new())).unwrap();
        assert_eq!(value["nodeId"], json!("n1"));
        assert_eq!(value["status"], json!("success"));
        assert!(value.get("error").is_none());

        let value = serde_json::to_value(NodeRunResult::failed("n2", "boom")).unwrap();
        assert_eq!(value["error"], json!("boom"));
    }

    #[test]
    fn skipped_results_carry_empty_outputs() {
        let skipped = NodeRunResult::skipped("n3");
        assert_eq!(skipped.status, RunStatus::Skipped);
        assert!(skipped.outputs.is_empty());
        assert!(skipped.error.is_none());
    }
}
