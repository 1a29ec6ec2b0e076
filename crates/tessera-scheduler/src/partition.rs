//! Module partitioning and exchange insertion.
//!
//! After the transform passes every node carries a module id and every
//! connector a memory space. Wherever a connection crosses a memory space,
//! or joins nodes of two different modules, an exchange node is inserted to
//! move the value across.

use crate::target::TargetRegistry;
use tessera_core::{
    ConnectorDef, ConnectorFlags, ConnectorId, Error, ExchangeKind, Graph, MemorySpace, ModuleId,
    NodeDef, NodeId, Op, Result,
};

/// An exchange node inserted by partitioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeRecord {
    pub node: NodeId,
    pub name: String,
    pub kind: ExchangeKind,

    /// Module that runs the transfer.
    pub module: ModuleId,

    /// Output connector the exchange reads.
    pub source: ConnectorId,
    pub from: MemorySpace,
    pub to: MemorySpace,

    /// Input connectors now fed by the exchange.
    pub consumers: Vec<ConnectorId>,
}

/// Consumers of one source that need the same transfer.
struct Crossing {
    source: ConnectorId,
    module: ModuleId,
    space: MemorySpace,
    consumers: Vec<ConnectorId>,
}

/// Insert exchange nodes at every module or memory-space boundary.
///
/// Nodes are visited in declaration order. Consumers of one source that
/// share a module and memory space share one exchange. Running this on an
/// already partitioned graph inserts nothing.
///
/// # Errors
///
/// Returns `Unsupported` if a node is assigned to a module that is not in
/// `targets`, or to a module that does not support its opcode. Exchange
/// nodes are synthesized here and are exempt from the opcode check.
pub fn partition(graph: &mut Graph, targets: &TargetRegistry) -> Result<Vec<ExchangeRecord>> {
    let nodes = graph.nodes();
    for &id in &nodes {
        check_support(graph, id, targets)?;
    }

    let mut crossings: Vec<Crossing> = Vec::new();
    for &id in &nodes {
        let consumer = graph.node(id)?;
        for &input in consumer.inputs() {
            let Some(source) = graph.source(input) else {
                continue;
            };
            if !needs_exchange(graph, source, input)? {
                continue;
            }

            let space = graph.connector(input)?.space;
            match crossings
                .iter_mut()
                .find(|c| c.source == source && c.module == consumer.module && c.space == space)
            {
                Some(crossing) => crossing.consumers.push(input),
                None => crossings.push(Crossing {
                    source,
                    module: consumer.module,
                    space,
                    consumers: vec![input],
                }),
            }
        }
    }

    let mut records = Vec::with_capacity(crossings.len());
    for crossing in crossings {
        records.push(insert_exchange(graph, crossing)?);
    }

    if !records.is_empty() {
        tracing::debug!(exchanges = records.len(), "inserted exchange nodes");
    }
    Ok(records)
}

/// Verify that a node's module exists and supports its opcode.
fn check_support(graph: &Graph, id: NodeId, targets: &TargetRegistry) -> Result<()> {
    let node = graph.node(id)?;
    let opcode = node.op.opcode();
    let Some(target) = targets.get(node.module) else {
        return Err(Error::Unsupported(format!(
            "node '{}' ({}) is assigned to unknown {}",
            node.name, opcode, node.module
        )));
    };
    if node.op.is_exchange() {
        return Ok(());
    }
    if !target.supports(opcode) {
        return Err(Error::Unsupported(format!(
            "node '{}' ({}) is assigned to module '{}', which does not support it",
            node.name, opcode, target.name
        )));
    }
    Ok(())
}

/// Whether the connection `source -> input` crosses a boundary.
///
/// A space mismatch always does. Otherwise modules are compared, except
/// where either end is an exchange node, which bridges modules by design
/// of its placement.
pub fn needs_exchange(graph: &Graph, source: ConnectorId, input: ConnectorId) -> Result<bool> {
    let out = graph.connector(source)?;
    let inp = graph.connector(input)?;
    if out.space != inp.space {
        return Ok(true);
    }

    let producer = graph.node(out.node)?;
    let consumer = graph.node(inp.node)?;
    if producer.op.is_exchange() || consumer.op.is_exchange() {
        return Ok(false);
    }
    Ok(producer.module != consumer.module)
}

fn insert_exchange(graph: &mut Graph, crossing: Crossing) -> Result<ExchangeRecord> {
    let src = graph.connector(crossing.source)?.clone();
    let producer = graph.node(src.node)?;

    let kind = if crossing.space.is_host() {
        ExchangeKind::Download
    } else {
        ExchangeKind::Upload
    };
    let module = match kind {
        ExchangeKind::Upload => crossing.module,
        ExchangeKind::Download => producer.module,
    };
    let name = format!(
        "{}:{}:{}->{}@{}",
        match kind {
            ExchangeKind::Upload => "upload",
            ExchangeKind::Download => "download",
        },
        producer.name,
        src.name,
        crossing.space,
        crossing.module
    );

    let mut def = NodeDef::new(
        Op::Exchange {
            kind,
            from: src.space,
            to: crossing.space,
        },
        name.clone(),
    )
    .with_module(module);
    def.add_input_def(
        ConnectorDef::new("in", src.dtype, src.shape.clone())
            .with_strides(src.strides.clone())
            .with_space(src.space)
            .with_flags(ConnectorFlags::strides_irrelevant()),
    );
    def.add_output_def(
        ConnectorDef::new("out", src.dtype, src.shape.clone())
            .with_space(crossing.space)
            .with_flags(ConnectorFlags::strides_irrelevant()),
    );

    let exchange = graph.add_node(def);
    graph.connect(crossing.source, graph.input(exchange, 0)?)?;
    let output = graph.output(exchange, 0)?;
    for &input in &crossing.consumers {
        graph.connect(output, input)?;
    }

    tracing::trace!(
        exchange = %name,
        kind = ?kind,
        from = %src.space,
        to = %crossing.space,
        module = %module,
        consumers = crossing.consumers.len(),
        "inserted exchange"
    );

    Ok(ExchangeRecord {
        node: exchange,
        name,
        kind,
        module,
        source: crossing.source,
        from: src.space,
        to: crossing.space,
        consumers: crossing.consumers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{ConnectorFlags, DataType};

    fn node(
        graph: &mut Graph,
        op: Op,
        name: &str,
        module: ModuleId,
        space: MemorySpace,
        inputs: usize,
    ) -> NodeId {
        let mut def = NodeDef::new(op, name).with_module(module).in_space(space);
        for i in 0..inputs {
            def.add_input(format!("in{}", i), DataType::I8, vec![16], ConnectorFlags::empty());
        }
        def.add_output("out", DataType::I8, vec![16], ConnectorFlags::empty());
        graph.add_node(def)
    }

    fn link(graph: &mut Graph, from: NodeId, to: NodeId, input: usize) {
        graph
            .connect(graph.output(from, 0).unwrap(), graph.input(to, input).unwrap())
            .unwrap();
    }

    const NPU: ModuleId = ModuleId(1);

    #[test]
    fn test_inserts_upload_and_download() {
        let targets = TargetRegistry::with_defaults();
        let mut graph = Graph::new();
        let x = node(&mut graph, Op::input(0), "x", ModuleId::HOST, MemorySpace::Host, 0);
        let conv = node(&mut graph, Op::Relu, "relu", NPU, MemorySpace::Scratchpad, 1);
        let add = node(&mut graph, Op::Add, "add", ModuleId::HOST, MemorySpace::Host, 1);
        link(&mut graph, x, conv, 0);
        link(&mut graph, conv, add, 0);

        let records = partition(&mut graph, &targets).unwrap();
        assert_eq!(records.len(), 2);

        let upload = &records[0];
        assert_eq!(upload.kind, ExchangeKind::Upload);
        assert_eq!(upload.module, NPU);
        assert_eq!((upload.from, upload.to), (MemorySpace::Host, MemorySpace::Scratchpad));

        let download = &records[1];
        assert_eq!(download.kind, ExchangeKind::Download);
        assert_eq!(download.module, NPU);

        // Exchange connectors carry the spaces of their neighbours.
        let ex_in = graph.connector(graph.input(upload.node, 0).unwrap()).unwrap();
        let ex_out = graph.connector(graph.output(upload.node, 0).unwrap()).unwrap();
        assert_eq!(ex_in.space, MemorySpace::Host);
        assert_eq!(ex_out.space, MemorySpace::Scratchpad);
        assert!(ex_in.flags.contains_strides_irrelevant());
        assert!(ex_out.flags.contains_strides_irrelevant());

        assert_eq!(
            graph.source(graph.input(conv, 0).unwrap()),
            Some(graph.output(upload.node, 0).unwrap())
        );
    }

    #[test]
    fn test_consumers_share_exchange() {
        let targets = TargetRegistry::with_defaults();
        let mut graph = Graph::new();
        let x = node(&mut graph, Op::input(0), "x", ModuleId::HOST, MemorySpace::Host, 0);
        let a = node(&mut graph, Op::Relu, "a", NPU, MemorySpace::Scratchpad, 1);
        let b = node(&mut graph, Op::Relu, "b", NPU, MemorySpace::Scratchpad, 1);
        link(&mut graph, x, a, 0);
        link(&mut graph, x, b, 0);

        let records = partition(&mut graph, &targets).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].consumers.len(), 2);
    }

    #[test]
    fn test_rerun_inserts_nothing() {
        let targets = TargetRegistry::with_defaults();
        let mut graph = Graph::new();
        let x = node(&mut graph, Op::input(0), "x", ModuleId::HOST, MemorySpace::Host, 0);
        let a = node(&mut graph, Op::Relu, "a", NPU, MemorySpace::Scratchpad, 1);
        let b = node(&mut graph, Op::Relu, "b", ModuleId(2), MemorySpace::Device, 1);
        let c = node(&mut graph, Op::Add, "c", ModuleId::HOST, MemorySpace::Host, 2);
        link(&mut graph, x, a, 0);
        link(&mut graph, a, b, 0);
        link(&mut graph, b, c, 0);
        link(&mut graph, x, c, 1);

        partition(&mut graph, &targets).unwrap();
        let snapshot = graph.snapshot();
        assert!(partition(&mut graph, &targets).unwrap().is_empty());
        assert_eq!(graph.snapshot(), snapshot);
    }

    #[test]
    fn test_module_mismatch_in_same_space() {
        let targets = TargetRegistry::with_defaults();
        let mut graph = Graph::new();
        let x = node(&mut graph, Op::input(0), "x", ModuleId::HOST, MemorySpace::Host, 0);
        let pinned = node(&mut graph, Op::Relu, "pinned", ModuleId(2), MemorySpace::Host, 1);
        link(&mut graph, x, pinned, 0);

        let records = partition(&mut graph, &targets).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, ExchangeKind::Download);
        assert_eq!(records[0].module, ModuleId::HOST);
    }

    #[test]
    fn test_unknown_module_is_unsupported() {
        let targets = TargetRegistry::with_defaults();
        let mut graph = Graph::new();
        node(&mut graph, Op::input(0), "x", ModuleId(9), MemorySpace::Host, 0);
        assert!(matches!(
            partition(&mut graph, &targets),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn test_unsupported_opcode_is_rejected() {
        let targets = TargetRegistry::with_defaults();
        let mut graph = Graph::new();
        let x = node(&mut graph, Op::input(0), "x", ModuleId::HOST, MemorySpace::Host, 0);
        let softmax = node(
            &mut graph,
            Op::Softmax { axis: 0 },
            "softmax",
            NPU,
            MemorySpace::Scratchpad,
            1,
        );
        link(&mut graph, x, softmax, 0);
        let snapshot = graph.snapshot();

        match partition(&mut graph, &targets) {
            Err(Error::Unsupported(msg)) => {
                assert!(msg.contains("'softmax' (Softmax)"), "{msg}");
                assert!(msg.contains("module 'npu'"), "{msg}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        // Nothing is inserted before the check fails.
        assert_eq!(graph.snapshot(), snapshot);
    }
}
