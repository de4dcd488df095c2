/// Runtime Execution Engine
///
/// This module provides the petgraph-based DAG execution engine for workflows.
/// It handles:
/// - Converting workflows to petgraph DAGs
/// - Deterministic topological ordering of nodes
/// - Sequential node execution with branch gating
/// - Snapshot-based data flow between nodes

// Execution context, snapshots and per-node results
pub mod context;

// Orchestrator walking the sorted node order
pub mod engine;

// Individual node execution handlers
pub mod executor;

// Graph building and deterministic topological sort
pub mod sort;


// Re-export main types
pub use context::{ExecutionContext, ExecutionResult, ExecutionSnapshot, NodeRunResult, RunStatus};
pub use engine::ExecutionEngine;
pub use executor::NodeExecutor;
pub use sort::{build_workflow_graph, topological_sort, SortOutcome, WorkflowGraph};
