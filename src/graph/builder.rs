use std::collections::HashMap;
use std::path::PathBuf;

use petgraph::graph::{DiGraph, NodeIndex};

use crate::loader::TreeNode;

/// One test in the inclusion graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    /// Stable identifier (`n0`, `n1`, ...) in discovery order.
    pub id: String,
    pub name: String,
    /// Resolved file for file-backed tests, `None` for inline children.
    pub path: Option<PathBuf>,
    /// Steps the test declares, navigation included.
    pub steps: usize,
}

/// A child reference from parent to child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inclusion {
    /// Position of the child in the parent's `children` list.
    pub order: usize,
}

/// The inclusion graph of a test tree, backed by petgraph.
///
/// File-backed tests appear once no matter how many parents include them,
/// so a file shared by two branches has two incoming edges. Inline
/// children are always distinct nodes.
pub struct InclusionGraph {
    pub name: String,
    pub graph: DiGraph<GraphNode, Inclusion>,
    pub root: NodeIndex,
    /// Node indices in discovery order.
    pub node_indices: Vec<NodeIndex>,
}

/// Build the inclusion graph of a loaded tree.
pub fn build(tree: &TreeNode) -> InclusionGraph {
    let mut builder = Builder {
        graph: DiGraph::new(),
        by_path: HashMap::new(),
        node_indices: Vec::new(),
    };
    let root = builder.add(tree);
    InclusionGraph {
        name: tree.definition.name.clone(),
        graph: builder.graph,
        root,
        node_indices: builder.node_indices,
    }
}

struct Builder {
    graph: DiGraph<GraphNode, Inclusion>,
    by_path: HashMap<PathBuf, NodeIndex>,
    node_indices: Vec<NodeIndex>,
}

impl Builder {
    fn add(&mut self, node: &TreeNode) -> NodeIndex {
        if let Some(idx) = node.path.as_ref().and_then(|p| self.by_path.get(p)) {
            return *idx;
        }

        let idx = self.graph.add_node(GraphNode {
            id: format!("n{}", self.node_indices.len()),
            name: node.definition.name.clone(),
            path: node.path.clone(),
            steps: node.definition.step_count(),
        });
        self.node_indices.push(idx);
        if let Some(path) = &node.path {
            self.by_path.insert(path.clone(), idx);
        }

        for (order, child) in node.children.iter().enumerate() {
            let child_idx = self.add(child);
            self.graph.add_edge(idx, child_idx, Inclusion { order });
        }
        idx
    }
}
