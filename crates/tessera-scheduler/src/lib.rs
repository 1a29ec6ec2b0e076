//! Graph scheduling and buffer allocation for Tessera.
//!
//! This crate takes a dataflow `Graph` and a set of execution modules and
//! produces a `ScheduleResult`: which module runs each node, in what order,
//! and at which byte offset of which memory space every intermediate value
//! lives.
//!
//! The scheduler runs in fixed steps:
//! 1. **Transform** - Run rewrite passes (simplification, module tagging,
//!    placement) to a fixed point
//! 2. **Partition** - Insert exchange nodes where values cross a module or
//!    memory-space boundary
//! 3. **Liveness** - Order the graph and build one logical buffer per live value
//! 4. **Allocation** - Assign non-overlapping offsets per memory space
//! 5. **Finalize** - Package the result for code generation
//!
//! # Example
//!
//! ```
//! use tessera_core::{ConnectorFlags, DataType, Graph, NodeDef, Op};
//! use tessera_scheduler::{SchedulerConfig, TargetRegistry, compile};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut graph = Graph::new();
//! let mut x = NodeDef::new(Op::input(0), "x");
//! x.add_output("out", DataType::F32, vec![1, 16], ConnectorFlags::empty());
//! let x = graph.add_node(x);
//! let mut out = NodeDef::new(Op::output(0), "y");
//! out.add_input("in", DataType::F32, vec![1, 16], ConnectorFlags::empty());
//! let out = graph.add_node(out);
//! graph.connect(graph.output(x, 0)?, graph.input(out, 0)?)?;
//!
//! let targets = TargetRegistry::with_defaults();
//! let result = compile(graph, &targets, &SchedulerConfig::default())?;
//! println!("{} buffers allocated", result.allocations.len());
//! # Ok(())
//! # }
//! ```

pub mod alloc;
pub mod config;
pub mod error;
pub mod liveness;
pub mod partition;
pub mod passes;
pub mod pipeline;
pub mod profile;
pub mod schedule;
pub mod scheduler;
pub mod target;

pub use alloc::{
    Allocation, AllocatorSet, ArenaPlan, ArenaStats, BufferAllocator, FirstFitArena,
    GenericAllocator, ScratchpadAllocator,
};
pub use config::{PassLimitPolicy, SchedulerConfig};
pub use error::{Phase, Result, ScheduleError};
pub use liveness::{BufferId, Liveness, LogicalBuffer, compute_liveness};
pub use partition::{ExchangeRecord, partition};
pub use passes::{
    AliasEliminationPass, CommonSubexpressionPass, DeadCodeEliminationPass, ModuleTaggingPass,
    PlacementHintPass,
};
pub use pipeline::{PassManager, TransformReport};
pub use profile::CompileProfile;
pub use schedule::{ScheduleResult, ScheduledNode};
pub use scheduler::{Scheduler, SchedulerState};
pub use target::{AllocatorFactory, TargetDescriptor, TargetKind, TargetRegistry};

// Re-export commonly used types from tessera-core
pub use tessera_core::{Graph, Pass, Stage};

/// Schedule a graph with the built-in passes.
///
/// This is the main entry point. It runs every scheduler step in order and
/// returns the finished schedule.
///
/// # Errors
///
/// Returns a `ScheduleError` naming the failed step. Capacity overflows,
/// malformed rewrites, unknown modules and (under `PassLimitPolicy::Fail`)
/// non-converging passes are all fatal.
#[tracing::instrument(skip_all, fields(num_nodes = graph.node_count(), num_targets = targets.len()))]
pub fn compile(
    graph: Graph,
    targets: &TargetRegistry,
    config: &SchedulerConfig,
) -> Result<ScheduleResult> {
    let result = Scheduler::new(graph, targets, config.clone()).run()?;
    tracing::info!(
        nodes = result.order.len(),
        buffers = result.buffers.len(),
        exchanges = result.exchanges.len(),
        iterations = result.transform_report.iterations,
        "schedule complete"
    );
    Ok(result)
}
