use petgraph::visit::EdgeRef;

use crate::emit::util::label_escape;
use crate::graph::builder::{GraphNode, InclusionGraph};

fn node_label(node: &GraphNode) -> String {
    match &node.path {
        Some(path) => {
            let file = path.file_name().map_or_else(
                || path.display().to_string(),
                |f| f.to_string_lossy().into_owned(),
            );
            format!("{}\\n{file}", label_escape(&node.name))
        }
        None => label_escape(&node.name),
    }
}

/// Emit an inclusion graph as a DOT (Graphviz) diagram.
///
/// File-backed tests are boxes, inline children are ellipses. Edges are
/// labelled with the child's position in its parent.
pub fn emit_dot(ig: &InclusionGraph) -> String {
    let mut out = format!("digraph \"{}\" {{\n", label_escape(&ig.name));

    for &idx in &ig.node_indices {
        let node = &ig.graph[idx];
        let shape = if node.path.is_some() { "box" } else { "ellipse" };
        out.push_str(&format!(
            "  {} [label=\"{}\", shape={shape}];\n",
            node.id,
            node_label(node)
        ));
    }

    for edge in ig.graph.edge_references() {
        let src = &ig.graph[edge.source()].id;
        let dst = &ig.graph[edge.target()].id;
        out.push_str(&format!(
            "  {src} -> {dst} [label=\"{}\"];\n",
            edge.weight().order + 1
        ));
    }

    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::builder::build;
    use crate::graph::builder::tests::{node, shared_tree};

    #[test]
    fn dot_single_node() {
        let dot = emit_dot(&build(&node("Login", Some("/t/login.yaml"), vec![])));
        assert!(dot.starts_with("digraph \"Login\" {"));
        assert!(dot.contains("n0 [label=\"Login\\nlogin.yaml\", shape=box];"));
        assert!(dot.ends_with("}\n"));
    }

    #[test]
    fn dot_shared_tree() {
        let dot = emit_dot(&build(&shared_tree()));
        assert!(dot.contains("n3 [label=\"Inline\", shape=ellipse];"));
        assert!(dot.contains("n0 -> n1 [label=\"1\"];"));
        assert!(dot.contains("n0 -> n2 [label=\"2\"];"));
        assert!(dot.contains("n2 -> n1 [label=\"1\"];"));
        assert!(dot.contains("n0 -> n3 [label=\"3\"];"));
    }

    #[test]
    fn dot_escapes_quotes() {
        let dot = emit_dot(&build(&node("Say \"hi\"", None, vec![])));
        assert!(dot.contains("label=\"Say \\\"hi\\\"\""));
    }
}
