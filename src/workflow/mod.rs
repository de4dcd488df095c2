/// Workflow Definition Layer
///
/// This module holds the wire-shaped workflow definition types and the typed
/// per-node configuration structs decoded from them:
/// - Graph definitions (WorkflowNode, WorkflowEdge, NodeType)
/// - Per-type config structs (TriggerConfig, HttpRequestConfig, ...)

// Core workflow type definitions
pub mod types;

// Re-export commonly used types
pub use types::{NodeType, WorkflowEdge, WorkflowNode};
