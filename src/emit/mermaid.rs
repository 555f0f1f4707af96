use petgraph::visit::EdgeRef;

use crate::emit::util::label_escape;
use crate::graph::builder::InclusionGraph;

/// Emit an inclusion graph as a Mermaid flowchart diagram.
pub fn emit_mermaid(ig: &InclusionGraph) -> String {
    let mut out = String::from("graph TD\n");

    for &idx in &ig.node_indices {
        let node = &ig.graph[idx];
        let label = label_escape(&node.name).replace("\\\"", "#quot;");
        if node.path.is_some() {
            out.push_str(&format!("  {}[\"{label}\"]\n", node.id));
        } else {
            out.push_str(&format!("  {}(\"{label}\")\n", node.id));
        }
    }

    for edge in ig.graph.edge_references() {
        let src = &ig.graph[edge.source()].id;
        let dst = &ig.graph[edge.target()].id;
        out.push_str(&format!("  {src} -->|{}| {dst}\n", edge.weight().order + 1));
    }

    out
}
