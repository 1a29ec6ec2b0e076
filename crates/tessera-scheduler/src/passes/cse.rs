//! Common subexpression elimination.

use tessera_core::{Error, Graph, NodeId, Pass, Result, RewriteContext, Stage};

/// Pass that merges a node into an earlier structurally equal node.
///
/// Candidates are the other consumers of the node's first input source, or,
/// for nodes without inputs, every other input-less node. The earliest
/// declared equal candidate on the same module survives; the matched node's
/// consumers move to the survivor's outputs and the matched node is removed.
pub struct CommonSubexpressionPass;

impl CommonSubexpressionPass {
    pub fn new() -> Self {
        Self
    }

    /// Earliest declared node equal to `node`, if it was declared before it.
    fn find_survivor(graph: &Graph, node: NodeId) -> Option<NodeId> {
        let n = graph.node(node).ok()?;
        if n.flags.contains_keep() {
            return None;
        }

        let candidates: Vec<NodeId> = match n.inputs().first() {
            Some(&input) => {
                let source = graph.source(input)?;
                graph
                    .consumers(source)
                    .into_iter()
                    .filter_map(|c| graph.connector(c).ok().map(|c| c.node))
                    .collect()
            }
            None => graph
                .nodes()
                .into_iter()
                .filter(|&id| graph.node(id).is_ok_and(|m| m.inputs().is_empty()))
                .collect(),
        };

        candidates
            .into_iter()
            .filter(|&other| other != node)
            .filter_map(|other| graph.node(other).ok().map(|m| (m, other)))
            .filter(|(m, _)| m.module == n.module)
            .map(|(m, other)| (m.seq, other))
            .filter(|&(seq, _)| seq < n.seq)
            .filter(|&(_, other)| graph.equals(node, other))
            .min()
            .map(|(_, other)| other)
    }
}

impl Default for CommonSubexpressionPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for CommonSubexpressionPass {
    fn name(&self) -> &str {
        "common_subexpression"
    }

    fn stage(&self) -> Stage {
        Stage::Simplification
    }

    fn matches(&self, graph: &Graph, node: NodeId) -> Option<RewriteContext> {
        let survivor = Self::find_survivor(graph, node)?;
        let mut ctx = RewriteContext::capture_all(graph, node).ok()?;
        ctx.matched.push(survivor);
        ctx.outputs.extend(graph.node(survivor).ok()?.outputs.iter().copied());
        Some(ctx)
    }

    fn process(&self, graph: &mut Graph, ctx: RewriteContext) -> Result<()> {
        ctx.validate(self.name(), graph)?;
        let &[duplicate, survivor] = ctx.matched.as_slice() else {
            return Err(Error::MalformedRewrite {
                pass: self.name().to_string(),
                reason: format!("expected two matched nodes, got {}", ctx.matched.len()),
            });
        };

        let from = graph.node(duplicate)?.outputs.clone();
        let to = graph.node(survivor)?.outputs.clone();
        for (&old, &new) in from.iter().zip(&to) {
            graph.redirect_consumers(old, new)?;
        }

        tracing::debug!(
            duplicate = %graph.node(duplicate)?.name,
            survivor = %graph.node(survivor)?.name,
            "merged common subexpression"
        );
        graph.remove_node(duplicate)
    }
}
