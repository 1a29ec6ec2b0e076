//! Intermediate representation for the scheduling graph.
//!
//! The IR is a directed graph where:
//! - **Nodes** (`Node`) are operations (e.g., Conv2d, Add, Exchange)
//! - **Connectors** (`Connector`) are the typed input/output ports of a node
//! - **Connections** are petgraph edges from an output connector to an input
//!   connector
//!
//! Nodes live in a `StableGraph`, so `NodeId`s stay valid while passes remove
//! other nodes. Connectors live in a side table indexed by `ConnectorId`.

use crate::op::Op;
use crate::types::{ConnectorFlags, DataType, MemorySpace, ModuleId, NodeFlags, contiguous_strides};
use crate::{Error, Result};
use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::visit::EdgeRef;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Type alias for node identifiers (backed by petgraph NodeIndex).
pub type NodeId = NodeIndex;

/// Unique identifier for a connector.
///
/// This is an index into the graph's connector table. Ids are never reused,
/// so a handle to a removed connector stays invalid forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectorId(pub usize);

impl ConnectorId {
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

/// Whether a connector consumes or produces a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Port {
    Input,
    Output,
}

/// A directed edge: output connector -> input connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub output: ConnectorId,
    pub input: ConnectorId,
}

// ──────────────────────────────── Graph ─────────────────────────────────

/// The dataflow graph handed to the scheduler.
#[derive(Debug, Clone)]
pub struct Graph {
    /// Nodes, with one petgraph edge per connection.
    graph: StableGraph<Node, Connection>,

    /// Connector side table. Removed connectors leave a `None` slot.
    connectors: Vec<Option<Connector>>,

    /// Next declaration sequence number.
    next_seq: u64,
}

impl Graph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            graph: StableGraph::new(),
            connectors: Vec::new(),
            next_seq: 0,
        }
    }

    // ── Node access ──

    /// Get an immutable reference to a node.
    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.graph
            .node_weight(id)
            .ok_or_else(|| Error::InvalidGraph(format!("Node {:?} not found", id)))
    }

    /// Get a mutable reference to a node.
    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.graph
            .node_weight_mut(id)
            .ok_or_else(|| Error::InvalidGraph(format!("Node {:?} not found", id)))
    }

    /// Whether the node still exists.
    pub fn contains(&self, id: NodeId) -> bool {
        self.graph.contains_node(id)
    }

    /// All live node ids in declaration order.
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.graph.node_indices().collect();
        ids.sort_by_key(|&id| self.graph[id].seq);
        ids
    }

    /// Get the number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the number of connections in the graph.
    pub fn connection_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Find a node by its name.
    ///
    /// # Errors
    ///
    /// Returns an error if no node with the given name exists.
    pub fn find_node_by_name(&self, name: &str) -> Result<NodeId> {
        self.nodes()
            .into_iter()
            .find(|&id| self.graph[id].name == name)
            .ok_or_else(|| Error::InvalidGraph(format!("Node '{}' not found", name)))
    }

    // ── Connector access ──

    /// Get an immutable reference to a connector.
    pub fn connector(&self, id: ConnectorId) -> Result<&Connector> {
        self.connectors
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::InvalidGraph(format!("Connector {:?} not found", id)))
    }

    /// Get a mutable reference to a connector.
    pub fn connector_mut(&mut self, id: ConnectorId) -> Result<&mut Connector> {
        self.connectors
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::InvalidGraph(format!("Connector {:?} not found", id)))
    }

    /// The `index`-th input connector of a node.
    pub fn input(&self, node: NodeId, index: usize) -> Result<ConnectorId> {
        let n = self.node(node)?;
        n.inputs.get(index).copied().ok_or_else(|| {
            Error::InvalidGraph(format!("Node '{}' has no input {}", n.name, index))
        })
    }

    /// The `index`-th output connector of a node.
    pub fn output(&self, node: NodeId, index: usize) -> Result<ConnectorId> {
        let n = self.node(node)?;
        n.outputs.get(index).copied().ok_or_else(|| {
            Error::InvalidGraph(format!("Node '{}' has no output {}", n.name, index))
        })
    }

    /// The output connector feeding `input`, if connected.
    pub fn source(&self, input: ConnectorId) -> Option<ConnectorId> {
        let owner = self.connector(input).ok()?.node;
        self.graph
            .edges_directed(owner, Direction::Incoming)
            .find(|edge| edge.weight().input == input)
            .map(|edge| edge.weight().output)
    }

    /// Input connectors fed by `output`, ordered by consumer declaration.
    pub fn consumers(&self, output: ConnectorId) -> Vec<ConnectorId> {
        let Ok(connector) = self.connector(output) else {
            return Vec::new();
        };
        let mut inputs: Vec<(u64, usize, ConnectorId)> = self
            .graph
            .edges_directed(connector.node, Direction::Outgoing)
            .filter(|edge| edge.weight().output == output)
            .map(|edge| {
                let input = edge.weight().input;
                (self.graph[edge.target()].seq, input.index(), input)
            })
            .collect();
        inputs.sort();
        inputs.into_iter().map(|(_, _, id)| id).collect()
    }

    /// Whether any input connector reads `output`.
    pub fn has_consumers(&self, output: ConnectorId) -> bool {
        let Ok(connector) = self.connector(output) else {
            return false;
        };
        self.graph
            .edges_directed(connector.node, Direction::Outgoing)
            .any(|edge| edge.weight().output == output)
    }

    /// All connections in a stable order (by consumer declaration, then input).
    pub fn connections(&self) -> Vec<Connection> {
        let mut edges: Vec<(u64, usize, Connection)> = self
            .graph
            .edge_indices()
            .filter_map(|edge| {
                let (_, target) = self.graph.edge_endpoints(edge)?;
                let weight = *self.graph.edge_weight(edge)?;
                Some((self.graph[target].seq, weight.input.index(), weight))
            })
            .collect();
        edges.sort_by_key(|(seq, input, _)| (*seq, *input));
        edges.into_iter().map(|(_, _, c)| c).collect()
    }

    // ── Graph mutation ──

    /// Add a node and materialize its declared connectors.
    pub fn add_node(&mut self, def: NodeDef) -> NodeId {
        let seq = self.next_seq;
        self.next_seq += 1;

        let node_id = self.graph.add_node(Node {
            name: def.name,
            op: def.op,
            module: def.module,
            flags: def.flags,
            inputs: Vec::new(),
            outputs: Vec::new(),
            seq,
        });

        let inputs: Vec<ConnectorId> = def
            .inputs
            .into_iter()
            .enumerate()
            .map(|(index, c)| self.push_connector(node_id, Port::Input, index, c, def.space))
            .collect();
        let outputs: Vec<ConnectorId> = def
            .outputs
            .into_iter()
            .enumerate()
            .map(|(index, c)| self.push_connector(node_id, Port::Output, index, c, def.space))
            .collect();

        let node = &mut self.graph[node_id];
        node.inputs = inputs;
        node.outputs = outputs;
        node_id
    }

    fn push_connector(
        &mut self,
        node: NodeId,
        port: Port,
        index: usize,
        def: ConnectorDef,
        default_space: MemorySpace,
    ) -> ConnectorId {
        let id = ConnectorId::new(self.connectors.len());
        let strides = def
            .strides
            .unwrap_or_else(|| contiguous_strides(&def.shape));
        self.connectors.push(Some(Connector {
            name: def.name,
            node,
            port,
            index,
            dtype: def.dtype,
            shape: def.shape,
            strides,
            space: def.space.unwrap_or(default_space),
            flags: def.flags,
        }));
        id
    }

    /// Remove a node together with its connectors and connections.
    ///
    /// Consumers of the removed node's outputs are left unconnected.
    pub fn remove_node(&mut self, id: NodeId) -> Result<()> {
        let node = self
            .graph
            .remove_node(id)
            .ok_or_else(|| Error::InvalidGraph(format!("Node {:?} not found", id)))?;
        for connector in node.inputs.iter().chain(&node.outputs) {
            if let Some(slot) = self.connectors.get_mut(connector.index()) {
                *slot = None;
            }
        }
        Ok(())
    }

    /// Connect `output` to `input`, replacing any previous source of `input`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the ports are the wrong way around or the
    /// two connectors disagree on dtype or shape.
    pub fn connect(&mut self, output: ConnectorId, input: ConnectorId) -> Result<()> {
        let out = self.connector(output)?;
        let inp = self.connector(input)?;
        if out.port != Port::Output || inp.port != Port::Input {
            return Err(Error::InvalidArgument(format!(
                "connect expects output -> input, got '{}' ({:?}) -> '{}' ({:?})",
                out.name, out.port, inp.name, inp.port
            )));
        }
        if out.dtype != inp.dtype || out.shape != inp.shape {
            return Err(Error::InvalidArgument(format!(
                "cannot connect '{}' ({} {:?}) to '{}' ({} {:?})",
                out.name, out.dtype, out.shape, inp.name, inp.dtype, inp.shape
            )));
        }
        let (from, to) = (out.node, inp.node);

        self.disconnect(input);
        self.graph.add_edge(from, to, Connection { output, input });
        Ok(())
    }

    /// Drop the source connection of `input`, returning the old source.
    pub fn disconnect(&mut self, input: ConnectorId) -> Option<ConnectorId> {
        let owner = self.connector(input).ok()?.node;
        let edge = self
            .graph
            .edges_directed(owner, Direction::Incoming)
            .find(|edge| edge.weight().input == input)
            .map(|edge| edge.id())?;
        self.graph.remove_edge(edge).map(|c| c.output)
    }

    /// Reconnect every consumer of `from` to `to`. Returns how many moved.
    pub fn redirect_consumers(&mut self, from: ConnectorId, to: ConnectorId) -> Result<usize> {
        let consumers = self.consumers(from);
        for &input in &consumers {
            self.connect(to, input)?;
        }
        Ok(consumers.len())
    }

    // ── Graph queries ──

    /// Topological order of all nodes, ties broken by declaration order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidGraph` if the graph contains a cycle.
    pub fn topological_order(&self) -> Result<Vec<NodeId>> {
        let mut in_degree: std::collections::HashMap<NodeId, usize> = self
            .graph
            .node_indices()
            .map(|id| (id, self.graph.edges_directed(id, Direction::Incoming).count()))
            .collect();

        let mut ready: BinaryHeap<Reverse<(u64, NodeId)>> = in_degree
            .iter()
            .filter(|&(_, &deg)| deg == 0)
            .map(|(&id, _)| Reverse((self.graph[id].seq, id)))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse((_, id))) = ready.pop() {
            order.push(id);
            for edge in self.graph.edges_directed(id, Direction::Outgoing) {
                let target = edge.target();
                if let Some(deg) = in_degree.get_mut(&target) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.push(Reverse((self.graph[target].seq, target)));
                    }
                }
            }
        }

        if order.len() != self.graph.node_count() {
            return Err(Error::InvalidGraph(
                "Graph contains cycles".to_string(),
            ));
        }
        Ok(order)
    }

    /// Topological order reversed: sinks first.
    pub fn reverse_topological_order(&self) -> Result<Vec<NodeId>> {
        let mut order = self.topological_order()?;
        order.reverse();
        Ok(order)
    }

    /// Structural equality of two nodes.
    ///
    /// Two nodes are equal when their opcodes, attribute flags and input
    /// sources are identical, their output signatures match and their
    /// operation payloads compare equal. A node is always equal to itself.
    pub fn equals(&self, a: NodeId, b: NodeId) -> bool {
        let (Ok(na), Ok(nb)) = (self.node(a), self.node(b)) else {
            return false;
        };
        if a == b {
            return true;
        }
        if na.op.opcode() != nb.op.opcode()
            || na.flags != nb.flags
            || na.inputs.len() != nb.inputs.len()
            || na.outputs.len() != nb.outputs.len()
        {
            return false;
        }

        let same_sources = na.inputs.iter().zip(&nb.inputs).all(|(&ia, &ib)| {
            matches!((self.source(ia), self.source(ib)), (Some(sa), Some(sb)) if sa == sb)
        });
        if !same_sources {
            return false;
        }

        let same_outputs = na.outputs.iter().zip(&nb.outputs).all(|(&oa, &ob)| {
            match (self.connector(oa), self.connector(ob)) {
                (Ok(ca), Ok(cb)) => ca.same_signature(cb),
                _ => false,
            }
        });

        same_outputs && na.op.properties_equal(&nb.op)
    }

    /// Capture a comparable description of the graph.
    ///
    /// Two snapshots are equal iff the graphs hold the same nodes in the same
    /// declaration order with the same connectors and connections.
    pub fn snapshot(&self) -> GraphSnapshot {
        let nodes = self
            .nodes()
            .into_iter()
            .map(|id| {
                let node = &self.graph[id];
                let describe = |cid: &ConnectorId| {
                    let c = self.connector(*cid).ok();
                    let source = self.source(*cid).and_then(|src| {
                        let sc = self.connector(src).ok()?;
                        Some((self.graph[sc.node].seq, sc.index))
                    });
                    ConnectorSnapshot {
                        name: c.map(|c| c.name.clone()).unwrap_or_default(),
                        dtype: c.map(|c| c.dtype),
                        shape: c.map(|c| c.shape.clone()).unwrap_or_default(),
                        space: c.map(|c| c.space),
                        flags: c.map(|c| c.flags.bits()).unwrap_or_default(),
                        source,
                    }
                };
                NodeSnapshot {
                    seq: node.seq,
                    name: node.name.clone(),
                    op: node.op.clone(),
                    module: node.module,
                    flags: node.flags.bits(),
                    inputs: node.inputs.iter().map(describe).collect(),
                    outputs: node.outputs.iter().map(describe).collect(),
                }
            })
            .collect();
        GraphSnapshot { nodes }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

// ──────────────────────────────── Node ──────────────────────────────────

/// A node in the graph: one operation assigned to one execution module.
#[derive(Debug, Clone)]
pub struct Node {
    /// Human-readable name.
    pub name: String,

    /// Operation and its payload.
    pub op: Op,

    /// Execution module that will run this node.
    pub module: ModuleId,

    /// Attribute bitmask.
    pub flags: NodeFlags,

    /// Input connectors, in operand order.
    pub inputs: Vec<ConnectorId>,

    /// Output connectors, in result order.
    pub outputs: Vec<ConnectorId>,

    /// Declaration sequence number; the deterministic tie-breaker.
    pub seq: u64,
}

impl Node {
    pub fn inputs(&self) -> &[ConnectorId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ConnectorId] {
        &self.outputs
    }
}

/// Declaration of a node, materialized by `Graph::add_node`.
#[derive(Debug, Clone)]
pub struct NodeDef {
    pub name: String,
    pub op: Op,
    pub module: ModuleId,
    pub flags: NodeFlags,
    /// Space used for connectors that do not name one.
    pub space: MemorySpace,
    pub inputs: Vec<ConnectorDef>,
    pub outputs: Vec<ConnectorDef>,
}

impl NodeDef {
    /// Declare a node on the host module with no connectors.
    pub fn new(op: Op, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            op,
            module: ModuleId::HOST,
            flags: NodeFlags::empty(),
            space: MemorySpace::Host,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_module(mut self, module: ModuleId) -> Self {
        self.module = module;
        self
    }

    pub fn with_flags(mut self, flags: NodeFlags) -> Self {
        self.flags = self.flags.merge(flags);
        self
    }

    pub fn in_space(mut self, space: MemorySpace) -> Self {
        self.space = space;
        self
    }

    /// Declare an input connector.
    pub fn add_input(
        &mut self,
        name: impl Into<String>,
        dtype: DataType,
        shape: Vec<usize>,
        flags: ConnectorFlags,
    ) -> &mut Self {
        self.inputs
            .push(ConnectorDef::new(name, dtype, shape).with_flags(flags));
        self
    }

    /// Declare an output connector.
    pub fn add_output(
        &mut self,
        name: impl Into<String>,
        dtype: DataType,
        shape: Vec<usize>,
        flags: ConnectorFlags,
    ) -> &mut Self {
        self.outputs
            .push(ConnectorDef::new(name, dtype, shape).with_flags(flags));
        self
    }

    pub fn add_input_def(&mut self, def: ConnectorDef) -> &mut Self {
        self.inputs.push(def);
        self
    }

    pub fn add_output_def(&mut self, def: ConnectorDef) -> &mut Self {
        self.outputs.push(def);
        self
    }
}

// ─────────────────────────────── Connector ──────────────────────────────

/// A typed port of exactly one node.
#[derive(Debug, Clone)]
pub struct Connector {
    pub name: String,

    /// Owning node.
    pub node: NodeId,

    pub port: Port,

    /// Position among the owner's inputs or outputs.
    pub index: usize,

    pub dtype: DataType,

    pub shape: Vec<usize>,

    /// Strides in elements.
    pub strides: Vec<usize>,

    pub space: MemorySpace,

    pub flags: ConnectorFlags,
}

impl Connector {
    /// Same dtype, shape and memory space.
    pub fn same_signature(&self, other: &Connector) -> bool {
        self.dtype == other.dtype && self.shape == other.shape && self.space == other.space
    }

    /// Whether the strides are the default row-major strides.
    pub fn is_contiguous(&self) -> bool {
        self.strides == contiguous_strides(&self.shape)
    }
}

/// Declaration of a connector inside a `NodeDef`.
#[derive(Debug, Clone)]
pub struct ConnectorDef {
    pub name: String,
    pub dtype: DataType,
    pub shape: Vec<usize>,
    /// `None` means contiguous row-major strides.
    pub strides: Option<Vec<usize>>,
    /// `None` means the node's default space.
    pub space: Option<MemorySpace>,
    pub flags: ConnectorFlags,
}

impl ConnectorDef {
    pub fn new(name: impl Into<String>, dtype: DataType, shape: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            dtype,
            shape,
            strides: None,
            space: None,
            flags: ConnectorFlags::empty(),
        }
    }

    pub fn with_strides(mut self, strides: Vec<usize>) -> Self {
        self.strides = Some(strides);
        self
    }

    pub fn with_space(mut self, space: MemorySpace) -> Self {
        self.space = Some(space);
        self
    }

    pub fn with_flags(mut self, flags: ConnectorFlags) -> Self {
        self.flags = self.flags.merge(flags);
        self
    }
}

// ─────────────────────────────── Snapshots ──────────────────────────────

/// Comparable description of a whole graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSnapshot {
    pub seq: u64,
    pub name: String,
    pub op: Op,
    pub module: ModuleId,
    pub flags: u8,
    pub inputs: Vec<ConnectorSnapshot>,
    pub outputs: Vec<ConnectorSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorSnapshot {
    pub name: String,
    pub dtype: Option<DataType>,
    pub shape: Vec<usize>,
    pub space: Option<MemorySpace>,
    pub flags: u8,
    /// (producer seq, output index) of the source connection.
    pub source: Option<(u64, usize)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::{Opcode, ReduceKind};

    fn unary(op: Op, name: &str, shape: Vec<usize>) -> NodeDef {
        let mut def = NodeDef::new(op, name);
        def.add_input("x", DataType::F32, shape.clone(), ConnectorFlags::empty());
        def.add_output("y", DataType::F32, shape, ConnectorFlags::empty());
        def
    }

    fn source(graph: &mut Graph, name: &str, shape: Vec<usize>) -> NodeId {
        let mut def = NodeDef::new(Op::input(graph.node_count()), name);
        def.add_output("out", DataType::F32, shape, ConnectorFlags::empty());
        graph.add_node(def)
    }

    #[test]
    fn test_create_empty_graph() {
        let graph = Graph::new();
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.connection_count(), 0);
        assert!(graph.topological_order().unwrap().is_empty());
    }

    #[test]
    fn test_add_node_materializes_connectors() {
        let mut graph = Graph::new();
        let id = graph.add_node(unary(Op::Relu, "relu", vec![1, 8]));

        let node = graph.node(id).unwrap();
        assert_eq!(node.op.opcode(), Opcode::Relu);
        assert_eq!(node.inputs().len(), 1);
        assert_eq!(node.outputs().len(), 1);

        let out = graph.connector(graph.output(id, 0).unwrap()).unwrap();
        assert_eq!(out.node, id);
        assert_eq!(out.port, Port::Output);
        assert_eq!(out.strides, vec![8, 1]);
        assert_eq!(out.space, MemorySpace::Host);
    }

    #[test]
    fn test_connect_overwrites_source() {
        let mut graph = Graph::new();
        let a = source(&mut graph, "a", vec![4]);
        let b = source(&mut graph, "b", vec![4]);
        let relu = graph.add_node(unary(Op::Relu, "relu", vec![4]));
        let input = graph.input(relu, 0).unwrap();

        graph.connect(graph.output(a, 0).unwrap(), input).unwrap();
        graph.connect(graph.output(b, 0).unwrap(), input).unwrap();

        assert_eq!(graph.source(input), Some(graph.output(b, 0).unwrap()));
        assert!(!graph.has_consumers(graph.output(a, 0).unwrap()));
        assert_eq!(graph.connection_count(), 1);

        assert_eq!(graph.disconnect(input), Some(graph.output(b, 0).unwrap()));
        assert_eq!(graph.source(input), None);
    }

    #[test]
    fn test_connect_rejects_mismatch() {
        let mut graph = Graph::new();
        let a = source(&mut graph, "a", vec![4]);
        let relu = graph.add_node(unary(Op::Relu, "relu", vec![8]));

        let err = graph
            .connect(graph.output(a, 0).unwrap(), graph.input(relu, 0).unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = graph
            .connect(graph.input(relu, 0).unwrap(), graph.output(a, 0).unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_remove_node_keeps_other_ids() {
        let mut graph = Graph::new();
        let a = source(&mut graph, "a", vec![2]);
        let b = graph.add_node(unary(Op::Relu, "b", vec![2]));
        let c = graph.add_node(unary(Op::Relu, "c", vec![2]));
        graph
            .connect(graph.output(a, 0).unwrap(), graph.input(b, 0).unwrap())
            .unwrap();
        graph
            .connect(graph.output(b, 0).unwrap(), graph.input(c, 0).unwrap())
            .unwrap();
        let c_in = graph.input(c, 0).unwrap();
        let b_out = graph.output(b, 0).unwrap();

        graph.remove_node(b).unwrap();

        assert!(graph.node(a).is_ok());
        assert!(graph.node(c).is_ok());
        assert!(graph.connector(b_out).is_err());
        assert_eq!(graph.source(c_in), None);
    }

    #[test]
    fn test_topological_order_breaks_ties_by_declaration() {
        let mut graph = Graph::new();
        let x = source(&mut graph, "x", vec![2]);
        let late = graph.add_node(unary(Op::Relu, "late", vec![2]));
        let early = graph.add_node(unary(Op::Relu, "early", vec![2]));
        let x_out = graph.output(x, 0).unwrap();
        graph.connect(x_out, graph.input(early, 0).unwrap()).unwrap();
        graph.connect(x_out, graph.input(late, 0).unwrap()).unwrap();

        // Both depend only on x; declaration order decides.
        assert_eq!(graph.topological_order().unwrap(), vec![x, late, early]);
        assert_eq!(
            graph.reverse_topological_order().unwrap(),
            vec![early, late, x]
        );
    }

    #[test]
    fn test_topological_order_detects_cycle() {
        let mut graph = Graph::new();
        let a = graph.add_node(unary(Op::Relu, "a", vec![2]));
        let b = graph.add_node(unary(Op::Relu, "b", vec![2]));
        graph
            .connect(graph.output(a, 0).unwrap(), graph.input(b, 0).unwrap())
            .unwrap();
        graph
            .connect(graph.output(b, 0).unwrap(), graph.input(a, 0).unwrap())
            .unwrap();

        assert!(matches!(
            graph.topological_order(),
            Err(Error::InvalidGraph(_))
        ));
    }

    #[test]
    fn test_equals_is_structural() {
        let mut graph = Graph::new();
        let x = source(&mut graph, "x", vec![2, 3]);
        let y = source(&mut graph, "y", vec![2, 3]);
        let r1 = graph.add_node(unary(
            Op::Reduce { kind: ReduceKind::Sum, axis: 1 },
            "r1",
            vec![2, 3],
        ));
        let r2 = graph.add_node(unary(
            Op::Reduce { kind: ReduceKind::Sum, axis: 1 },
            "r2",
            vec![2, 3],
        ));
        let r3 = graph.add_node(unary(
            Op::Reduce { kind: ReduceKind::Sum, axis: 0 },
            "r3",
            vec![2, 3],
        ));
        let r4 = graph.add_node(unary(
            Op::Reduce { kind: ReduceKind::Sum, axis: 1 },
            "r4",
            vec![2, 3],
        ));
        let x_out = graph.output(x, 0).unwrap();
        for node in [r1, r2, r3] {
            graph.connect(x_out, graph.input(node, 0).unwrap()).unwrap();
        }
        graph
            .connect(graph.output(y, 0).unwrap(), graph.input(r4, 0).unwrap())
            .unwrap();

        assert!(graph.equals(r1, r1));
        assert!(graph.equals(r1, r2));
        assert!(graph.equals(r2, r1));
        // Different axis.
        assert!(!graph.equals(r1, r3));
        // Different source.
        assert!(!graph.equals(r1, r4));
        // Distinct graph inputs are never merged.
        assert!(!graph.equals(x, y));
    }

    #[test]
    fn test_snapshot_tracks_changes() {
        let mut graph = Graph::new();
        let x = source(&mut graph, "x", vec![2]);
        let r = graph.add_node(unary(Op::Relu, "r", vec![2]));
        let before = graph.snapshot();
        assert_eq!(before, graph.snapshot());

        graph
            .connect(graph.output(x, 0).unwrap(), graph.input(r, 0).unwrap())
            .unwrap();
        let after = graph.snapshot();
        assert_ne!(before, after);
        assert_eq!(after.nodes[1].inputs[0].source, Some((0, 0)));
    }

    #[test]
    fn test_consumers_are_ordered() {
        let mut graph = Graph::new();
        let x = source(&mut graph, "x", vec![2]);
        let a = graph.add_node(unary(Op::Relu, "a", vec![2]));
        let b = graph.add_node(unary(Op::Relu, "b", vec![2]));
        let x_out = graph.output(x, 0).unwrap();
        graph.connect(x_out, graph.input(b, 0).unwrap()).unwrap();
        graph.connect(x_out, graph.input(a, 0).unwrap()).unwrap();

        assert_eq!(
            graph.consumers(x_out),
            vec![graph.input(a, 0).unwrap(), graph.input(b, 0).unwrap()]
        );
    }
}
