//! Liveness analysis and logical buffer construction.
//!
//! Every output connector that feeds at least one consumer becomes one
//! logical buffer. Liveness intervals are measured in ages: a node's
//! position in the deterministic topological order.

use crate::alloc::AllocatorSet;
use std::collections::HashMap;
use tessera_core::{
    Connector, ConnectorId, DataType, Error, Graph, MemorySpace, Node, NodeId, Opcode, Result,
};

/// Identifier of a logical buffer, dense in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferId(pub usize);

/// One live tensor value that needs memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalBuffer {
    pub id: BufferId,

    /// "<node>:<connector>", used in diagnostics.
    pub name: String,

    /// Output connector producing the value.
    pub connector: ConnectorId,

    /// Producing node.
    pub node: NodeId,
    pub node_name: String,
    pub opcode: Opcode,

    pub space: MemorySpace,
    pub dtype: DataType,

    /// Bytes as reported by the space's allocator.
    pub size: usize,
    pub alignment: usize,

    /// Age of the producer.
    pub birth: usize,

    /// Largest age among consumers. The interval is inclusive.
    pub death: usize,
}

impl LogicalBuffer {
    /// Whether the two inclusive liveness intervals intersect.
    pub fn overlaps(&self, other: &LogicalBuffer) -> bool {
        self.birth <= other.death && other.birth <= self.death
    }
}

/// Scheduling order and buffers of one graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Liveness {
    /// Nodes in execution order; a node's age is its index here.
    pub order: Vec<NodeId>,
    pub buffers: Vec<LogicalBuffer>,
}

impl Liveness {
    /// Age of a node, if it is part of the order.
    pub fn age(&self, node: NodeId) -> Option<usize> {
        self.order.iter().position(|&n| n == node)
    }

    /// Buffers of one memory space.
    pub fn buffers_in(&self, space: MemorySpace) -> Vec<LogicalBuffer> {
        self.buffers
            .iter()
            .filter(|b| b.space == space)
            .cloned()
            .collect()
    }
}

/// Compute the execution order and the logical buffers of `graph`.
///
/// # Errors
///
/// Returns `InvalidGraph` for cyclic graphs, `Unsupported` when a connector
/// lives in a space without an allocator, and any error the allocator
/// raises while sizing a connector. Sizing errors name the producing node,
/// its opcode, the output and the memory space.
pub fn compute_liveness(graph: &Graph, allocators: &AllocatorSet) -> Result<Liveness> {
    let order = graph.topological_order()?;
    let ages: HashMap<NodeId, usize> = order
        .iter()
        .enumerate()
        .map(|(age, &node)| (node, age))
        .collect();

    let mut buffers = Vec::new();
    for (birth, &node_id) in order.iter().enumerate() {
        let node = graph.node(node_id)?;
        for &output in &node.outputs {
            let consumers = graph.consumers(output);
            if consumers.is_empty() {
                continue;
            }

            let mut death = birth;
            for input in consumers {
                let consumer = graph.connector(input)?.node;
                if let Some(&age) = ages.get(&consumer) {
                    death = death.max(age);
                }
            }

            let connector = graph.connector(output)?;
            let (size, alignment) = allocators
                .get(connector.space)
                .and_then(|allocator| Ok((allocator.size_of(connector)?, allocator.alignment())))
                .map_err(|err| located(err, node, connector))?;

            let buffer = LogicalBuffer {
                id: BufferId(buffers.len()),
                name: format!("{}:{}", node.name, connector.name),
                connector: output,
                node: node_id,
                node_name: node.name.clone(),
                opcode: node.op.opcode(),
                space: connector.space,
                dtype: connector.dtype,
                size,
                alignment,
                birth,
                death,
            };
            tracing::trace!(
                buffer = %buffer.name,
                space = %buffer.space,
                size,
                birth,
                death,
                "logical buffer"
            );
            buffers.push(buffer);
        }
    }

    Ok(Liveness { order, buffers })
}

/// Prefix an allocator error with the value it was raised for.
fn located(err: Error, node: &Node, connector: &Connector) -> Error {
    let at = format!(
        "node '{}' ({}) output '{}' in {}",
        node.name,
        node.op.opcode(),
        connector.name,
        connector.space
    );
    match err {
        Error::InvalidArgument(msg) => Error::InvalidArgument(format!("{}: {}", at, msg)),
        Error::Unsupported(msg) => Error::Unsupported(format!("{}: {}", at, msg)),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::GenericAllocator;
    use tessera_core::{ConnectorFlags, Error, NodeDef, Op};

    fn host_allocators() -> AllocatorSet {
        let mut set = AllocatorSet::new();
        set.insert(Box::new(GenericAllocator::new(MemorySpace::Host, 1 << 20)));
        set
    }

    fn unary(graph: &mut Graph, op: Op, name: &str, from: NodeId) -> NodeId {
        let mut def = NodeDef::new(op, name);
        def.add_input("x", DataType::F32, vec![4], ConnectorFlags::empty());
        def.add_output("y", DataType::F32, vec![4], ConnectorFlags::empty());
        let id = graph.add_node(def);
        graph
            .connect(graph.output(from, 0).unwrap(), graph.input(id, 0).unwrap())
            .unwrap();
        id
    }

    #[test]
    fn test_intervals_follow_topological_order() {
        let mut graph = Graph::new();
        let mut x = NodeDef::new(Op::input(0), "x");
        x.add_output("out", DataType::F32, vec![4], ConnectorFlags::empty());
        let x = graph.add_node(x);
        let a = unary(&mut graph, Op::Relu, "a", x);
        let b = unary(&mut graph, Op::Relu, "b", a);
        // x is read again at the end.
        let mut add = NodeDef::new(Op::Add, "add");
        add.add_input("lhs", DataType::F32, vec![4], ConnectorFlags::empty());
        add.add_input("rhs", DataType::F32, vec![4], ConnectorFlags::empty());
        add.add_output("sum", DataType::F32, vec![4], ConnectorFlags::empty());
        let add = graph.add_node(add);
        graph
            .connect(graph.output(x, 0).unwrap(), graph.input(add, 0).unwrap())
            .unwrap();
        graph
            .connect(graph.output(b, 0).unwrap(), graph.input(add, 1).unwrap())
            .unwrap();

        let liveness = compute_liveness(&graph, &host_allocators()).unwrap();
        assert_eq!(liveness.order, vec![x, a, b, add]);

        // The add output has no consumer, so it gets no buffer.
        let spans: Vec<(String, usize, usize, usize)> = liveness
            .buffers
            .iter()
            .map(|b| (b.name.clone(), b.birth, b.death, b.size))
            .collect();
        assert_eq!(
            spans,
            vec![
                ("x:out".to_string(), 0, 3, 16),
                ("a:y".to_string(), 1, 2, 16),
                ("b:y".to_string(), 2, 3, 16),
            ]
        );
        assert_eq!(liveness.age(add), Some(3));
        assert!(liveness.buffers[0].overlaps(&liveness.buffers[1]));
    }

    #[test]
    fn test_missing_allocator_is_unsupported() {
        let mut graph = Graph::new();
        let mut x = NodeDef::new(Op::input(0), "x").in_space(MemorySpace::Device);
        x.add_output("out", DataType::F32, vec![4], ConnectorFlags::empty());
        let x = graph.add_node(x);
        unary(&mut graph, Op::Relu, "a", x);

        let err = compute_liveness(&graph, &host_allocators()).unwrap_err();
        match err {
            Error::Unsupported(msg) => {
                assert!(msg.starts_with("node 'x' (Input) output 'out' in device:"), "{msg}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_oversized_value_names_its_producer() {
        let mut graph = Graph::new();
        let mut x = NodeDef::new(Op::input(0), "x");
        x.add_output("out", DataType::F32, vec![1 << 62], ConnectorFlags::empty());
        let x = graph.add_node(x);
        let mut relu = NodeDef::new(Op::Relu, "relu");
        relu.add_input("x", DataType::F32, vec![1 << 62], ConnectorFlags::empty());
        let relu = graph.add_node(relu);
        graph
            .connect(graph.output(x, 0).unwrap(), graph.input(relu, 0).unwrap())
            .unwrap();

        let err = compute_liveness(&graph, &host_allocators()).unwrap_err();
        match err {
            Error::InvalidArgument(msg) => {
                assert!(msg.starts_with("node 'x' (Input) output 'out' in host:"), "{msg}");
                assert!(msg.contains("overflows"), "{msg}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
