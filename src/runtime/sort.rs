/// Petgraph-backed workflow graph and deterministic topological sort
///
/// Workflows are converted into a DiGraph and ordered with Kahn's algorithm.
/// Ready nodes are dispensed from a FIFO queue seeded in insertion order, so
/// the same workflow always yields the same execution order: ties break by
/// input position, never by hash order.

use std::collections::{HashMap, VecDeque};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::workflow::types::{WorkflowEdge, WorkflowNode};

/// A workflow as a petgraph DAG with id/index mappings
#[derive(Debug)]
pub struct WorkflowGraph {
    /// The petgraph DiGraph structure
    pub graph: DiGraph<WorkflowNode, ()>,
    /// Mapping from node ID to graph node index
    pub node_id_to_index: HashMap<String, NodeIndex>,
    /// Mapping from graph node index to node ID
    pub index_to_node_id: HashMap<NodeIndex, String>,
}

/// Outcome of ordering a workflow graph
#[derive(Debug)]
pub struct SortOutcome {
    /// Nodes in execution order; incomplete when a cycle is present
    pub sorted: Vec<WorkflowNode>,
    /// True when at least one node sits on a cycle
    pub has_cycle: bool,
}

/// Build a petgraph DiGraph from workflow nodes and edges
///
/// Duplicate node ids keep their first occurrence and edges naming unknown
/// nodes are dropped; both are logged and tolerated so a sloppy canvas still
/// runs.
pub fn build_workflow_graph(nodes: &[WorkflowNode], edges: &[WorkflowEdge]) -> WorkflowGraph {
    tracing::debug!(
        "🏗️ Building workflow graph: {} nodes, {} edges",
        nodes.len(),
        edges.len()
    );

    let mut graph = DiGraph::new();
    let mut node_id_to_index: HashMap<String, NodeIndex> = HashMap::new();
    let mut index_to_node_id: HashMap<NodeIndex, String> = HashMap::new();

    for node in nodes {
        if node_id_to_index.contains_key(&node.id) {
            tracing::debug!("  ➕ Duplicate node id '{}', keeping the first", node.id);
            continue;
        }
        let node_index = graph.add_node(node.clone());
        node_id_to_index.insert(node.id.clone(), node_index);
        index_to_node_id.insert(node_index, node.id.clone());
    }

    for edge in edges {
        match (
            node_id_to_index.get(&edge.source),
            node_id_to_index.get(&edge.target),
        ) {
            (Some(&source), Some(&target)) => {
                graph.add_edge(source, target, ());
            }
            _ => {
                tracing::debug!(
                    "  🔗 Dropping edge '{}' → '{}': unknown endpoint",
                    edge.source,
                    edge.target
                );
            }
        }
    }

    WorkflowGraph {
        graph,
        node_id_to_index,
        index_to_node_id,
    }
}

/// Kahn's algorithm with input-order tie-breaking
///
/// In-degrees count every parallel edge and each pop decrements its targets
/// once per edge, so the bookkeeping stays balanced when a condition node has
/// both branch edges pointing at the same target.
pub fn topological_sort(workflow_graph: &WorkflowGraph) -> SortOutcome {
    let graph = &workflow_graph.graph;

    let mut in_degree = vec![0usize; graph.node_count()];
    for index in graph.node_indices() {
        in_degree[index.index()] = graph.neighbors_directed(index, Direction::Incoming).count();
    }

    // node_indices() yields insertion order, which is input order
    let mut ready: VecDeque<NodeIndex> = graph
        .node_indices()
        .filter(|index| in_degree[index.index()] == 0)
        .collect();

    let mut sorted = Vec::with_capacity(graph.node_count());
    while let Some(index) = ready.pop_front() {
        sorted.push(graph[index].clone());

        // neighbors() walks edges newest-first; reverse so targets unlock in
        // the order their edges were declared
        let mut successors: Vec<NodeIndex> = graph.neighbors(index).collect();
        successors.reverse();
        for successor in successors {
            in_degree[successor.index()] -= 1;
            if in_degree[successor.index()] == 0 {
                ready.push_back(successor);
            }
        }
    }

    let has_cycle = sorted.len() < graph.node_count();
    if has_cycle {
        tracing::debug!(
            "🔍 Sort left {} node(s) unordered: cycle present",
            graph.node_count() - sorted.len()
        );
    }

    SortOutcome { sorted, has_cycle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::NodeType;

    fn node(id: &str) -> WorkflowNode {
        WorkflowNode::new(id, NodeType::DoNothing)
    }

    fn ids(outcome: &SortOutcome) -> Vec<&str> {
        outcome.sorted.iter().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn linear_chain_sorts_by_dependency_not_input_position() {
        let nodes = vec![node("c"), node("a"), node("b")];
        let edges = vec![WorkflowEdge::new("a", "b"), WorkflowEdge::new("b", "c")];

        let outcome = topological_sort(&build_workflow_graph(&nodes, &edges));
        assert!(!outcome.has_cycle);
        assert_eq!(ids(&outcome), vec!["a", "b", "c"]);
    }

    #[test]
    fn diamond_breaks_ties_by_input_order() {
        let nodes = vec![node("a"), node("b"), node("c"), node("d")];
        let edges = vec![
            WorkflowEdge::new("a", "b"),
            WorkflowEdge::new("a", "c"),
            WorkflowEdge::new("b", "d"),
            WorkflowEdge::new("c", "d"),
        ];

        let outcome = topological_sort(&build_workflow_graph(&nodes, &edges));
        assert_eq!(ids(&outcome), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn roots_are_seeded_in_input_order() {
        let nodes = vec![node("a"), node("lonely"), node("b")];
        let edges = vec![WorkflowEdge::new("a", "b")];

        let outcome = topological_sort(&build_workflow_graph(&nodes, &edges));
        assert_eq!(ids(&outcome), vec!["a", "lonely", "b"]);
    }

    #[test]
    fn two_node_cycle_is_reported() {
        let nodes = vec![node("a"), node("b")];
        let edges = vec![WorkflowEdge::new("a", "b"), WorkflowEdge::new("b", "a")];

        let outcome = topological_sort(&build_workflow_graph(&nodes, &edges));
        assert!(outcome.has_cycle);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let nodes = vec![node("a")];
        let edges = vec![WorkflowEdge::new("a", "a")];

        let outcome = topological_sort(&build_workflow_graph(&nodes, &edges));
        assert!(outcome.has_cycle);
        assert!(outcome.sorted.is_empty());
    }

    #[test]
    fn dangling_edges_are_dropped() {
        let nodes = vec![node("a"), node("b")];
        let edges = vec![WorkflowEdge::new("a", "ghost"), WorkflowEdge::new("a", "b")];

        let graph = build_workflow_graph(&nodes, &edges);
        assert_eq!(graph.graph.edge_count(), 1);

        let outcome = topological_sort(&graph);
        assert_eq!(ids(&outcome), vec!["a", "b"]);
    }

    #[test]
    fn duplicate_node_ids_keep_the_first() {
        let mut second = node("a");
        second.data.label = "second".to_string();
        let nodes = vec![node("a"), second, node("b")];

        let graph = build_workflow_graph(&nodes, &[]);
        assert_eq!(graph.graph.node_count(), 2);
        assert_eq!(graph.graph[graph.node_id_to_index["a"]].data.label, "a");
    }

    #[test]
    fn parallel_branch_edges_stay_balanced() {
        let nodes = vec![node("cond"), node("next")];
        let edges = vec![
            WorkflowEdge::new("cond", "next").with_handle("true"),
            WorkflowEdge::new("cond", "next").with_handle("false"),
        ];

        let outcome = topological_sort(&build_workflow_graph(&nodes, &edges));
        assert!(!outcome.has_cycle);
        assert_eq!(ids(&outcome), vec!["cond", "next"]);
    }

    #[test]
    fn sort_is_deterministic_across_runs() {
        let nodes = vec![node("t"), node("x"), node("y"), node("z")];
        let edges = vec![
            WorkflowEdge::new("t", "x"),
            WorkflowEdge::new("t", "y"),
            WorkflowEdge::new("t", "z"),
        ];

        let first = topological_sort(&build_workflow_graph(&nodes, &edges));
        let second = topological_sort(&build_workflow_graph(&nodes, &edges));
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(ids(&first), vec!["t", "x", "y", "z"]);
    }
}
