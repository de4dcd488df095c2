/// Dagrun: single-run DAG workflow execution engine
///
/// CLI entry point: read a workflow definition (JSON with `nodes` and
/// `edges`), execute it once, and print every per-node result as pretty JSON.

use std::sync::Arc;

use anyhow::Context as _;
use serde::Deserialize;

use dagrun::{Config, ExecutionEngine, NodeExecutor, WorkflowEdge, WorkflowNode};

/// On-disk workflow definition accepted by the CLI
#[derive(Debug, Deserialize)]
struct WorkflowFile {
    nodes: Vec<WorkflowNode>,
    #[serde(default)]
    edges: Vec<WorkflowEdge>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    let path = std::env::args()
        .nth(1)
        .context("usage: dagrun <workflow.json>")?;
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read workflow file {}", path))?;
    let workflow: WorkflowFile = serde_json::from_str(&raw)
        .with_context(|| format!("invalid workflow JSON in {}", path))?;

    let config = Config::default();
    let executor = Arc::new(NodeExecutor::new(&config)?);
    let engine = ExecutionEngine::new(executor);

    let result = engine.execute(&workflow.nodes, &workflow.edges).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
