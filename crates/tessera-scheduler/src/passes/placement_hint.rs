//! Benchmark placement of constants.

use tessera_core::{ConnectorFlags, Graph, MemorySpace, NodeId, Op, Pass, Result, RewriteContext, Stage};

/// Pass that moves constants out of the read-only host segment.
///
/// Benchmark builds reload constants between runs, so every `Constant`
/// output tagged `HostConst` moves to `Host` data memory and is flagged
/// `BENCHMARK_PLACED`. Outputs flagged `NO_BENCHMARK_PLACEMENT` stay put.
pub struct PlacementHintPass;

impl PlacementHintPass {
    pub fn new() -> Self {
        Self
    }

    fn movable(graph: &Graph, node: NodeId) -> Vec<tessera_core::ConnectorId> {
        let Ok(n) = graph.node(node) else {
            return Vec::new();
        };
        if !matches!(n.op, Op::Constant { .. }) {
            return Vec::new();
        }
        n.outputs()
            .iter()
            .copied()
            .filter(|&c| {
                graph.connector(c).is_ok_and(|c| {
                    c.space == MemorySpace::HostConst && !c.flags.contains_no_benchmark_placement()
                })
            })
            .collect()
    }
}

impl Default for PlacementHintPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for PlacementHintPass {
    fn name(&self) -> &str {
        "placement_hint"
    }

    fn stage(&self) -> Stage {
        Stage::Placement
    }

    fn matches(&self, graph: &Graph, node: NodeId) -> Option<RewriteContext> {
        let outputs = Self::movable(graph, node);
        if outputs.is_empty() {
            return None;
        }
        let mut ctx = RewriteContext::new(vec![node]);
        ctx.outputs = outputs;
        Some(ctx)
    }

    fn process(&self, graph: &mut Graph, ctx: RewriteContext) -> Result<()> {
        ctx.validate(self.name(), graph)?;
        for &output in &ctx.outputs {
            let connector = graph.connector_mut(output)?;
            connector.space = MemorySpace::Host;
            connector.flags = connector.flags.merge(ConnectorFlags::benchmark_placed());
            tracing::debug!(connector = %connector.name, "placed constant in data memory");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{ConnectorDef, DataType, NodeDef};

    #[test]
    fn test_moves_constants_unless_opted_out() {
        let mut graph = Graph::new();
        let mut def = NodeDef::new(Op::Constant { data: vec![0; 4] }, "w").in_space(MemorySpace::HostConst);
        def.add_output_def(ConnectorDef::new("a", DataType::U8, vec![4]));
        def.add_output_def(
            ConnectorDef::new("b", DataType::U8, vec![4])
                .with_flags(ConnectorFlags::no_benchmark_placement()),
        );
        let w = graph.add_node(def);
        let pass = PlacementHintPass::new();

        let ctx = pass.matches(&graph, w).unwrap();
        assert_eq!(ctx.outputs, vec![graph.output(w, 0).unwrap()]);
        pass.process(&mut graph, ctx).unwrap();

        let a = graph.connector(graph.output(w, 0).unwrap()).unwrap();
        assert_eq!(a.space, MemorySpace::Host);
        assert!(a.flags.contains_benchmark_placed());

        let b = graph.connector(graph.output(w, 1).unwrap()).unwrap();
        assert_eq!(b.space, MemorySpace::HostConst);
        assert!(!b.flags.contains_benchmark_placed());

        assert!(pass.matches(&graph, w).is_none());
    }
}
