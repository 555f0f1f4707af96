use petgraph::Direction;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;

use crate::graph::builder::InclusionGraph;

/// Returns the tests included by more than one parent.
pub fn shared_nodes(ig: &InclusionGraph) -> Vec<NodeIndex> {
    ig.node_indices
        .iter()
        .filter(|&&idx| ig.graph.edges_directed(idx, Direction::Incoming).count() > 1)
        .copied()
        .collect()
}

/// Number of levels below the root along the longest inclusion chain.
pub fn max_depth(ig: &InclusionGraph) -> usize {
    depth_from(ig, ig.root)
}

fn depth_from(ig: &InclusionGraph, idx: NodeIndex) -> usize {
    ig.graph
        .edges_directed(idx, Direction::Outgoing)
        .map(|edge| 1 + depth_from(ig, edge.target()))
        .max()
        .unwrap_or(0)
}

/// Total steps declared across every distinct test.
pub fn total_steps(ig: &InclusionGraph) -> usize {
    ig.node_indices.iter().map(|&idx| ig.graph[idx].steps).sum()
}
