/// Dagrun: single-run DAG workflow execution engine
///
/// This library executes workflow graphs exactly once per call: validate,
/// sort deterministically, then walk the order sequentially with conditional
/// branch gating, an embedded Lua scripting sandbox, and outbound HTTP calls.

// Runtime configuration from environment variables
pub mod config;

// Engine error taxonomy for failures that prevent a run from starting
pub mod error;

// Embedded script evaluation - trait seam plus the Lua backend
pub mod script;

// Workflow definition layer - graph types and per-node configs
pub mod workflow;

// Runtime execution engine - petgraph DAG execution and node orchestration
pub mod runtime;

// Re-export commonly used types for external consumers
pub use config::Config;
pub use error::EngineError;
pub use runtime::{ExecutionEngine, ExecutionResult, NodeExecutor, NodeRunResult, RunStatus};
pub use workflow::{NodeType, WorkflowEdge, WorkflowNode};
