//! The finished schedule handed to code generation.

use crate::alloc::{Allocation, ArenaStats};
use crate::liveness::LogicalBuffer;
use crate::partition::ExchangeRecord;
use crate::pipeline::TransformReport;
use crate::profile::CompileProfile;
use std::collections::BTreeMap;
use tessera_core::{ConnectorId, Graph, MemorySpace, ModuleId, NodeId, Opcode};

/// One node in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledNode {
    pub node: NodeId,
    pub name: String,
    pub opcode: Opcode,
    /// Position in the global execution order.
    pub age: usize,
}

/// Immutable result of a scheduler run.
#[derive(Debug, Clone)]
pub struct ScheduleResult {
    /// The transformed and partitioned graph.
    pub graph: Graph,

    /// Global execution order.
    pub order: Vec<ScheduledNode>,

    /// Execution order per module.
    pub modules: BTreeMap<ModuleId, Vec<ScheduledNode>>,

    pub buffers: Vec<LogicalBuffer>,

    /// Output connector -> placement in its space's arena.
    pub allocations: BTreeMap<ConnectorId, Allocation>,

    pub exchanges: Vec<ExchangeRecord>,

    pub transform_report: TransformReport,

    /// Arena usage per memory space.
    pub arena_stats: BTreeMap<MemorySpace, ArenaStats>,

    /// Worker threads requested for the runtime.
    pub num_threads: usize,

    pub profile: CompileProfile,
}

impl ScheduleResult {
    /// Allocation of the value an output connector produces.
    pub fn allocation(&self, connector: ConnectorId) -> Option<&Allocation> {
        self.allocations.get(&connector)
    }

    /// Nodes a module runs, in execution order.
    pub fn nodes_for(&self, module: ModuleId) -> &[ScheduledNode] {
        self.modules.get(&module).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Peak reserved bytes in a space.
    pub fn peak_usage(&self, space: MemorySpace) -> usize {
        self.arena_stats.get(&space).map(|s| s.peak).unwrap_or(0)
    }

    /// Buffer of an output connector.
    pub fn buffer(&self, connector: ConnectorId) -> Option<&LogicalBuffer> {
        self.buffers.iter().find(|b| b.connector == connector)
    }
}
