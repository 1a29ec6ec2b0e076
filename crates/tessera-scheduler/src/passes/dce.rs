//! Dead code elimination.

use tessera_core::{Graph, NodeId, Op, Pass, Result, RewriteContext, Stage};

/// Pass that removes nodes none of whose outputs are read.
///
/// Graph boundary nodes (`Input`, `Output`) and nodes flagged `KEEP` are
/// never removed. Removing a node can orphan its producers, which the next
/// sweep picks up.
pub struct DeadCodeEliminationPass;

impl DeadCodeEliminationPass {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DeadCodeEliminationPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for DeadCodeEliminationPass {
    fn name(&self) -> &str {
        "dead_code_elimination"
    }

    fn stage(&self) -> Stage {
        Stage::Simplification
    }

    fn matches(&self, graph: &Graph, node: NodeId) -> Option<RewriteContext> {
        let n = graph.node(node).ok()?;
        if matches!(n.op, Op::Input { .. } | Op::Output { .. }) || n.flags.contains_keep() {
            return None;
        }
        if n.outputs().iter().any(|&out| graph.has_consumers(out)) {
            return None;
        }
        RewriteContext::capture_all(graph, node).ok()
    }

    fn process(&self, graph: &mut Graph, ctx: RewriteContext) -> Result<()> {
        ctx.validate(self.name(), graph)?;
        let node = ctx.matched[0];
        tracing::debug!(node = %graph.node(node)?.name, "removed dead node");
        graph.remove_node(node)
    }
}
