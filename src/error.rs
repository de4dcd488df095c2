/// Engine error taxonomy
///
/// Everything a caller can get back from `execute` besides an
/// `ExecutionResult`. Validation and cycle errors are surfaced before any node
/// runs; per-node failures are never errors, they travel as failed
/// `NodeRunResult`s inside the result list.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Graph validation: a runnable workflow needs an entry point
    #[error("Workflow must have at least one Trigger node")]
    NoTriggerNode,

    /// Graph validation: HTTP_REQUEST nodes need a non-blank url
    #[error("HTTP_REQUEST node {0} must have a URL")]
    MissingUrl(String),

    /// Graph validation: CONDITION nodes need a non-blank expression
    #[error("Condition node {0} must have an expression")]
    MissingExpression(String),

    /// The sorter could not place every node, so the graph is cyclic
    #[error("Cycle detected in workflow graph")]
    CycleDetected,

    /// No trigger present in the sorted order; validation makes this
    /// unreachable in practice but the walk re-checks before executing
    #[error("No trigger node found")]
    NoTriggerFound,
}
