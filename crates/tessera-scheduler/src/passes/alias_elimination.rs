//! Alias elimination pass.
//!
//! Removes pure data-movement nodes whose output is indistinguishable from
//! their input's source.

use tessera_core::{Graph, NodeId, Pass, Result, RewriteContext, Stage};

/// Pass that bypasses `Identity`, `Copy` and same-shape `Reshape` nodes.
///
/// A node matches when it has one connected input and one output, and the
/// output has the same dtype, shape and memory space as the input's source.
/// Consumers of the output are reconnected to that source and the node is
/// removed. Nodes flagged `KEEP` are left alone.
pub struct AliasEliminationPass;

impl AliasEliminationPass {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AliasEliminationPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for AliasEliminationPass {
    fn name(&self) -> &str {
        "alias_elimination"
    }

    fn stage(&self) -> Stage {
        Stage::Simplification
    }

    fn matches(&self, graph: &Graph, node: NodeId) -> Option<RewriteContext> {
        let n = graph.node(node).ok()?;
        if !n.op.is_alias() || n.flags.contains_keep() {
            return None;
        }
        let (&[input], &[output]) = (n.inputs(), n.outputs()) else {
            return None;
        };

        let source = graph.connector(graph.source(input)?).ok()?;
        let result = graph.connector(output).ok()?;
        if !source.same_signature(result) {
            return None;
        }

        RewriteContext::capture_all(graph, node).ok()
    }

    fn process(&self, graph: &mut Graph, ctx: RewriteContext) -> Result<()> {
        ctx.validate(self.name(), graph)?;
        let node = ctx.matched[0];
        ctx.require_full_capture(self.name(), graph, node)?;

        let input = graph.input(node, 0)?;
        let output = graph.output(node, 0)?;
        let source = graph.source(input).ok_or_else(|| tessera_core::Error::MalformedRewrite {
            pass: self.name().to_string(),
            reason: "alias input lost its source".to_string(),
        })?;

        let moved = graph.redirect_consumers(output, source)?;
        tracing::debug!(node = %graph.node(node)?.name, consumers = moved, "eliminated alias");
        graph.remove_node(node)
    }
}
