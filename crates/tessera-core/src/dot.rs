//! DOT graph visualization for scheduling graphs.
//!
//! Generates Graphviz DOT format with one cluster per execution module and
//! connections labeled by memory space.

use crate::ir::Graph;
use crate::types::ModuleId;
use std::collections::BTreeMap;

impl Graph {
    /// Render the graph as Graphviz DOT.
    ///
    /// # Example
    ///
    /// ```ignore
    /// std::fs::write("graph.dot", graph.to_dot())?;
    /// // Render with: dot -Tpng graph.dot -o graph.png
    /// ```
    pub fn to_dot(&self) -> String {
        to_dot(self)
    }
}

/// Generate a DOT graph.
///
/// The output shows:
/// - Each node labeled with opcode and name, grouped by module
/// - Exchange nodes highlighted
/// - Connections labeled with the producer's memory space
pub fn to_dot(graph: &Graph) -> String {
    let mut dot = String::new();
    dot.push_str("digraph schedule_graph {\n");
    dot.push_str("  rankdir=TB;\n");
    dot.push_str("  node [shape=box, style=rounded];\n\n");

    let mut by_module: BTreeMap<ModuleId, Vec<String>> = BTreeMap::new();
    for id in graph.nodes() {
        let Ok(node) = graph.node(id) else {
            continue;
        };
        let style = if node.op.is_exchange() {
            ", style=\"rounded,filled\", fillcolor=lightyellow"
        } else {
            ""
        };
        by_module.entry(node.module).or_default().push(format!(
            "    n{} [label=\"{}\\n{}\"{}];\n",
            node.seq,
            node.op.opcode(),
            escape(&node.name),
            style
        ));
    }

    for (module, lines) in &by_module {
        dot.push_str(&format!("  subgraph cluster_{} {{\n", module.index()));
        dot.push_str(&format!("    label=\"{}\";\n", module));
        for line in lines {
            dot.push_str(line);
        }
        dot.push_str("  }\n");
    }
    dot.push('\n');

    for connection in graph.connections() {
        let (Ok(out), Ok(inp)) = (
            graph.connector(connection.output),
            graph.connector(connection.input),
        ) else {
            continue;
        };
        let (Ok(from), Ok(to)) = (graph.node(out.node), graph.node(inp.node)) else {
            continue;
        };
        let color = if out.space.is_host() { "black" } else { "blue" };
        dot.push_str(&format!(
            "  n{} -> n{} [label=\"{}\", color={}];\n",
            from.seq, to.seq, out.space, color
        ));
    }

    dot.push_str("}\n");
    dot
}

/// Escape a name for use inside a quoted DOT label.
fn escape(name: &str) -> String {
    name.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::NodeDef;
    use crate::op::Op;
    use crate::types::{ConnectorFlags, DataType};

    #[test]
    fn test_to_dot_generates_clusters_and_edges() {
        let mut graph = Graph::new();
        let mut x = NodeDef::new(Op::input(0), "x");
        x.add_output("out", DataType::F32, vec![4], ConnectorFlags::empty());
        let x = graph.add_node(x);
        let mut relu = NodeDef::new(Op::Relu, "relu").with_module(ModuleId::new(1));
        relu.add_input("x", DataType::F32, vec![4], ConnectorFlags::empty());
        relu.add_output("y", DataType::F32, vec![4], ConnectorFlags::empty());
        let relu = graph.add_node(relu);
        graph
            .connect(graph.output(x, 0).unwrap(), graph.input(relu, 0).unwrap())
            .unwrap();

        let dot = graph.to_dot();
        assert!(dot.contains("digraph schedule_graph"));
        assert!(dot.contains("cluster_0"));
        assert!(dot.contains("cluster_1"));
        assert!(dot.contains("Relu\\nrelu"));
        assert!(dot.contains("n0 -> n1 [label=\"host\""));
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("a\"b"), "a\\\"b");
    }
}
