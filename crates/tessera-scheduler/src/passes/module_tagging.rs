//! Execution module assignment.

use crate::target::TargetDescriptor;
use tessera_core::{Graph, ModuleId, NodeId, Pass, Result, RewriteContext, Stage};

/// Pass that moves supported host nodes onto one execution module.
///
/// A node matches when it is still on the host module, is not `PINNED`, its
/// opcode is supported by the module and every connector's dtype is
/// accepted. Retagging sets the node's module and moves all its connectors
/// to the module's default memory space. One instance runs per non-host
/// module; the module registered first claims a node.
pub struct ModuleTaggingPass {
    name: String,
    target: TargetDescriptor,
}

impl ModuleTaggingPass {
    pub fn new(target: TargetDescriptor) -> Self {
        Self {
            name: format!("module_tagging:{}", target.name),
            target,
        }
    }

    pub fn module(&self) -> ModuleId {
        self.target.module
    }
}

impl Pass for ModuleTaggingPass {
    fn name(&self) -> &str {
        &self.name
    }

    fn stage(&self) -> Stage {
        Stage::Tagging
    }

    fn matches(&self, graph: &Graph, node: NodeId) -> Option<RewriteContext> {
        let n = graph.node(node).ok()?;
        if n.module != ModuleId::HOST
            || n.flags.contains_pinned()
            || !self.target.supports(n.op.opcode())
        {
            return None;
        }

        let accepted = n
            .inputs()
            .iter()
            .chain(n.outputs())
            .all(|&c| graph.connector(c).is_ok_and(|c| self.target.accepts_dtype(c.dtype)));
        if !accepted {
            return None;
        }

        RewriteContext::capture_all(graph, node).ok()
    }

    fn process(&self, graph: &mut Graph, ctx: RewriteContext) -> Result<()> {
        ctx.validate(self.name(), graph)?;
        let node = ctx.matched[0];
        ctx.require_full_capture(self.name(), graph, node)?;

        graph.node_mut(node)?.module = self.target.module;
        for &connector in ctx.inputs.iter().chain(&ctx.outputs) {
            graph.connector_mut(connector)?.space = self.target.default_space;
        }

        tracing::debug!(
            node = %graph.node(node)?.name,
            module = %self.target.module,
            space = %self.target.default_space,
            "retagged node"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::TargetRegistry;
    use tessera_core::{ConnectorFlags, DataType, Error, MemorySpace, NodeDef, NodeFlags, Op};

    fn npu() -> ModuleTaggingPass {
        let targets = TargetRegistry::with_defaults();
        ModuleTaggingPass::new(targets.get(ModuleId::new(1)).unwrap().clone())
    }

    fn relu(graph: &mut Graph, dtype: DataType, flags: NodeFlags) -> NodeId {
        let mut def = NodeDef::new(Op::Relu, "relu").with_flags(flags);
        def.add_input("x", dtype, vec![16], ConnectorFlags::empty());
        def.add_output("y", dtype, vec![16], ConnectorFlags::empty());
        graph.add_node(def)
    }

    #[test]
    fn test_retags_supported_node() {
        let mut graph = Graph::new();
        let node = relu(&mut graph, DataType::I8, NodeFlags::empty());
        let pass = npu();

        let ctx = pass.matches(&graph, node).unwrap();
        pass.process(&mut graph, ctx).unwrap();

        assert_eq!(graph.node(node).unwrap().module, ModuleId::new(1));
        let out = graph.connector(graph.output(node, 0).unwrap()).unwrap();
        assert_eq!(out.space, MemorySpace::Scratchpad);
        // Already tagged: no second match.
        assert!(pass.matches(&graph, node).is_none());
    }

    #[test]
    fn test_skips_unaccepted_dtype_and_pinned() {
        let mut graph = Graph::new();
        let float = relu(&mut graph, DataType::F32, NodeFlags::empty());
        let pinned = relu(&mut graph, DataType::I8, NodeFlags::pinned());
        let pass = npu();

        assert!(pass.matches(&graph, float).is_none());
        assert!(pass.matches(&graph, pinned).is_none());
    }

    #[test]
    fn test_partial_capture_is_malformed() {
        let mut graph = Graph::new();
        let node = relu(&mut graph, DataType::I8, NodeFlags::empty());
        let pass = npu();

        let mut ctx = pass.matches(&graph, node).unwrap();
        ctx.outputs.clear();
        let err = pass.process(&mut graph, ctx).unwrap_err();
        assert!(matches!(err, Error::MalformedRewrite { .. }));
        assert_eq!(graph.node(node).unwrap().module, ModuleId::HOST);
    }
}
