/// Petgraph-based DAG execution engine
///
/// Validates a workflow, orders it with a deterministic topological sort, and
/// walks the order sequentially: snapshot, branch-gate, dispatch, record. A
/// failed node halts the run; everything recorded up to that point is
/// returned to the caller.

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::error::EngineError;
use crate::runtime::context::{ExecutionContext, ExecutionResult, NodeRunResult, RunStatus};
use crate::runtime::executor::NodeExecutor;
use crate::runtime::sort::{build_workflow_graph, topological_sort};
use crate::workflow::types::{NodeType, WorkflowEdge, WorkflowNode};

/// Orchestrates workflow runs over a shared node executor
#[derive(Debug)]
pub struct ExecutionEngine {
    /// Node executor handling individual node execution
    executor: Arc<NodeExecutor>,
}

impl ExecutionEngine {
    pub fn new(executor: Arc<NodeExecutor>) -> Self {
        Self { executor }
    }

    /// Execute a workflow from scratch
    ///
    /// Validation and sorting happen before any node runs, so an `Err` here
    /// means nothing executed. Once execution starts, node failures are
    /// recorded in the results rather than surfaced as errors.
    pub async fn execute(
        &self,
        nodes: &[WorkflowNode],
        edges: &[WorkflowEdge],
    ) -> Result<ExecutionResult, EngineError> {
        let run_id = generate_run_id();
        let mut context = ExecutionContext::new(run_id.clone());
        let start_time = std::time::Instant::now();

        tracing::info!(
            "🚀 Starting workflow run {}: {} nodes, {} edges",
            run_id,
            nodes.len(),
            edges.len()
        );

        validate_workflow(nodes)?;

        let graph = build_workflow_graph(nodes, edges);
        let outcome = topological_sort(&graph);
        if outcome.has_cycle {
            tracing::error!("❌ Run {} rejected: workflow graph contains a cycle", run_id);
            return Err(EngineError::CycleDetected);
        }
        let sorted = outcome.sorted;

        if !sorted.iter().any(|node| node.node_type == NodeType::Trigger) {
            return Err(EngineError::NoTriggerFound);
        }

        let order: Vec<&str> = sorted.iter().map(|node| node.id.as_str()).collect();
        tracing::debug!("📋 Execution order: {:?}", order);

        let mut results = Vec::with_capacity(sorted.len());
        for node in &sorted {
            let snapshot = context.snapshot();

            if !self.should_execute(node, edges, &context) {
                tracing::info!("⏭️ Skipping node '{}': branch condition not met", node.id);
                let skipped = NodeRunResult::skipped(&node.id);
                context.add_node_result(&skipped);
                results.push(skipped);
                continue;
            }

            let result = self.executor.run_node(node, &snapshot).await;
            context.add_node_result(&result);
            let failed = result.status == RunStatus::Failed;
            results.push(result);

            if failed {
                tracing::warn!("🛑 Run {} halted: node '{}' failed", run_id, node.id);
                break;
            }
        }

        tracing::info!(
            "🎉 Run {} finished with {} result(s) in {:?}",
            run_id,
            results.len(),
            start_time.elapsed()
        );

        Ok(ExecutionResult { run_id, results })
    }

    /// Run one node in isolation with a throwaway context (no validation, no
    /// branch gating)
    pub async fn execute_single_node(&self, node: &WorkflowNode) -> NodeRunResult {
        let run_id = format!("test-{}", chrono::Utc::now().timestamp_millis());
        let context = ExecutionContext::new(run_id);

        tracing::info!(
            "🧪 Single-node run {}: '{}' ({})",
            context.run_id(),
            node.id,
            node.node_type
        );

        self.executor.run_node(node, &context.snapshot()).await
    }

    /// Decide whether a node should run given its incoming edges
    ///
    /// Every incoming edge must pass: the source has recorded outputs, and
    /// when those outputs carry a `branch` key it must equal the edge's
    /// `sourceHandle` (absent means "true"). Nodes without incoming edges
    /// always run.
    fn should_execute(
        &self,
        node: &WorkflowNode,
        edges: &[WorkflowEdge],
        context: &ExecutionContext,
    ) -> bool {
        let incoming: Vec<&WorkflowEdge> = edges
            .iter()
            .filter(|edge| edge.target == node.id)
            .collect();
        if incoming.is_empty() {
            return true;
        }

        for edge in incoming {
            let outputs = match context.outputs_for(&edge.source) {
                Some(outputs) => outputs,
                None => {
                    tracing::warn!(
                        "⚠️ Node '{}' gated on '{}', which has not produced outputs",
                        node.id,
                        edge.source
                    );
                    return false;
                }
            };

            if let Some(branch) = outputs.get("branch") {
                let expected = edge.source_handle.as_deref().unwrap_or("true");
                let actual = match branch {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                if actual != expected {
                    return false;
                }
            }
        }

        true
    }
}

/// Reject workflows that cannot produce a meaningful run
fn validate_workflow(nodes: &[WorkflowNode]) -> Result<(), EngineError> {
    if !nodes.iter().any(|node| node.node_type == NodeType::Trigger) {
        return Err(EngineError::NoTriggerNode);
    }

    for node in nodes {
        match node.node_type {
            NodeType::HttpRequest => {
                if config_str(node, "url").trim().is_empty() {
                    return Err(EngineError::MissingUrl(node.id.clone()));
                }
            }
            NodeType::Condition => {
                if config_str(node, "expression").trim().is_empty() {
                    return Err(EngineError::MissingExpression(node.id.clone()));
                }
            }
            _ => {}
        }
    }

    Ok(())
}

/// Read a string config key, treating missing or non-string values as blank
fn config_str<'a>(node: &'a WorkflowNode, key: &str) -> &'a str {
    node.data
        .config
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or("")
}

/// `"run-"` + unix millis + `"-"` + first 8 hex of a v4 UUID
fn generate_run_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let uuid = Uuid::new_v4().simple().to_string();
    format!("run-{}-{}", millis, &uuid[..8])
}
