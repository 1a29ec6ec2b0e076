//! Scheduler state machine.
//!
//! Drives one graph through transform, partition, liveness and allocation.
//! Each step may run exactly once, in order; the result is produced by
//! `finalize`.

use crate::alloc::{Allocation, AllocatorSet, ArenaStats};
use crate::config::SchedulerConfig;
use crate::error::{Phase, Result, ResultExt, ScheduleError};
use crate::liveness::{Liveness, compute_liveness};
use crate::partition::{ExchangeRecord, partition};
use crate::pipeline::{PassManager, TransformReport};
use crate::profile::CompileProfile;
use crate::schedule::{ScheduleResult, ScheduledNode};
use crate::target::TargetRegistry;
use std::collections::BTreeMap;
use tessera_core::{ConnectorId, Error, Graph, MemorySpace, ModuleId, Pass};

/// Progress of a scheduler run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Built,
    Transformed,
    Partitioned,
    LivenessComputed,
    Allocated,
    Finalized,
    /// A step failed; the run cannot continue.
    Failed,
}

/// Scheduler for one graph.
///
/// # Example
///
/// ```ignore
/// let mut scheduler = Scheduler::new(graph, &targets, SchedulerConfig::default());
/// scheduler.transform()?;
/// scheduler.partition()?;
/// scheduler.compute_liveness()?;
/// scheduler.allocate()?;
/// let result = scheduler.finalize()?;
/// ```
pub struct Scheduler<'a> {
    graph: Graph,
    targets: &'a TargetRegistry,
    config: SchedulerConfig,
    state: SchedulerState,
    passes: PassManager,
    allocators: AllocatorSet,
    profile: CompileProfile,

    report: TransformReport,
    exchanges: Vec<ExchangeRecord>,
    liveness: Option<Liveness>,
    allocations: BTreeMap<ConnectorId, Allocation>,
    arena_stats: BTreeMap<MemorySpace, ArenaStats>,
}

impl<'a> Scheduler<'a> {
    /// Create a scheduler with the built-in passes for `targets`.
    pub fn new(graph: Graph, targets: &'a TargetRegistry, config: SchedulerConfig) -> Self {
        let passes = PassManager::with_builtin_passes(targets, &config);
        Self {
            graph,
            targets,
            allocators: targets.allocators(),
            config,
            state: SchedulerState::Built,
            passes,
            profile: CompileProfile::new(),
            report: TransformReport::default(),
            exchanges: Vec::new(),
            liveness: None,
            allocations: BTreeMap::new(),
            arena_stats: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn profile(&self) -> &CompileProfile {
        &self.profile
    }

    /// Register an additional transform pass. Only valid before `transform`.
    pub fn add_pass(&mut self, pass: impl Pass + 'static) -> Result<&mut Self> {
        self.require_state(SchedulerState::Built, Phase::Transform)?;
        self.passes.add_pass(pass);
        Ok(self)
    }

    /// Run the transform passes to a fixed point.
    pub fn transform(&mut self) -> Result<TransformReport> {
        self.require_state(SchedulerState::Built, Phase::Transform)?;
        let _span = tracing::debug_span!("transform", passes = self.passes.len()).entered();

        let (graph, passes, profile) = (&mut self.graph, &mut self.passes, &mut self.profile);
        let started = std::time::Instant::now();
        let result = passes.run(graph, profile);
        profile.stages.push((Phase::Transform, started.elapsed()));

        self.report = self.settle(result, Phase::Transform, SchedulerState::Transformed)?;
        tracing::debug!(
            iterations = self.report.iterations,
            matches = self.report.matches,
            converged = self.report.converged,
            "transform finished"
        );
        Ok(self.report)
    }

    /// Insert exchange nodes at module and memory-space boundaries.
    pub fn partition(&mut self) -> Result<&[ExchangeRecord]> {
        self.require_state(SchedulerState::Transformed, Phase::Partition)?;
        let _span = tracing::debug_span!("partition").entered();

        let (graph, targets) = (&mut self.graph, self.targets);
        let result = self.profile.time(Phase::Partition, || partition(graph, targets));
        self.exchanges = self.settle(result, Phase::Partition, SchedulerState::Partitioned)?;
        Ok(&self.exchanges)
    }

    /// Compute the execution order and the logical buffers.
    pub fn compute_liveness(&mut self) -> Result<&Liveness> {
        self.require_state(SchedulerState::Partitioned, Phase::Liveness)?;
        let _span = tracing::debug_span!("liveness").entered();

        let (graph, allocators) = (&self.graph, &self.allocators);
        let result = self
            .profile
            .time(Phase::Liveness, || compute_liveness(graph, allocators));
        let liveness = self.settle(result, Phase::Liveness, SchedulerState::LivenessComputed)?;
        tracing::debug!(buffers = liveness.buffers.len(), "liveness computed");
        Ok(self.liveness.insert(liveness))
    }

    /// Assign every logical buffer an offset in its space's arena.
    pub fn allocate(&mut self) -> Result<&BTreeMap<ConnectorId, Allocation>> {
        self.require_state(SchedulerState::LivenessComputed, Phase::Allocation)?;
        let _span = tracing::debug_span!("allocate").entered();

        let (liveness, allocators) = (&self.liveness, &self.allocators);
        let result = self.profile.time(Phase::Allocation, || -> tessera_core::Result<_> {
            let liveness = liveness
                .as_ref()
                .ok_or_else(|| Error::InvalidState("liveness missing".to_string()))?;
            let mut allocations = BTreeMap::new();
            let mut stats = BTreeMap::new();
            for space in allocators.spaces() {
                let allocator = allocators.get(space)?;
                let plan = allocator.allocate(&liveness.buffers_in(space))?;
                tracing::debug!(
                    space = %space,
                    buffers = plan.stats.buffers,
                    peak = plan.stats.peak,
                    capacity = plan.stats.capacity,
                    "arena allocated"
                );
                for allocation in plan.allocations {
                    allocations.insert(allocation.connector, allocation);
                }
                stats.insert(space, plan.stats);
            }
            Ok((allocations, stats))
        });

        let (allocations, stats) = self.settle(result, Phase::Allocation, SchedulerState::Allocated)?;
        self.allocations = allocations;
        self.arena_stats = stats;
        Ok(&self.allocations)
    }

    /// Produce the schedule result.
    pub fn finalize(mut self) -> Result<ScheduleResult> {
        self.require_state(SchedulerState::Allocated, Phase::Finalize)?;
        let started = std::time::Instant::now();

        let Some(liveness) = self.liveness.take() else {
            return Err(ScheduleError::new(
                Phase::Finalize,
                Error::InvalidState("liveness missing".to_string()),
            ));
        };

        let mut order = Vec::with_capacity(liveness.order.len());
        let mut modules: BTreeMap<ModuleId, Vec<ScheduledNode>> = BTreeMap::new();
        for (age, &id) in liveness.order.iter().enumerate() {
            let node = self.graph.node(id).in_phase(Phase::Finalize)?;
            let scheduled = ScheduledNode {
                node: id,
                name: node.name.clone(),
                opcode: node.op.opcode(),
                age,
            };
            modules.entry(node.module).or_default().push(scheduled.clone());
            order.push(scheduled);
        }

        self.profile.stages.push((Phase::Finalize, started.elapsed()));
        self.state = SchedulerState::Finalized;

        Ok(ScheduleResult {
            graph: self.graph,
            order,
            modules,
            buffers: liveness.buffers,
            allocations: self.allocations,
            exchanges: self.exchanges,
            transform_report: self.report,
            arena_stats: self.arena_stats,
            num_threads: self.config.num_threads,
            profile: self.profile,
        })
    }

    /// Run every remaining step and finalize.
    pub fn run(mut self) -> Result<ScheduleResult> {
        self.transform()?;
        self.partition()?;
        self.compute_liveness()?;
        self.allocate()?;
        self.finalize()
    }

    fn require_state(&self, state: SchedulerState, stage: Phase) -> Result<()> {
        if self.state != state {
            return Err(ScheduleError::new(
                stage,
                Error::InvalidState(format!(
                    "{} requires state {:?}, scheduler is {:?}",
                    stage, state, self.state
                )),
            ));
        }
        Ok(())
    }

    /// Advance to `next` on success, or mark the run failed.
    fn settle<T>(
        &mut self,
        result: tessera_core::Result<T>,
        stage: Phase,
        next: SchedulerState,
    ) -> Result<T> {
        match result {
            Ok(value) => {
                self.state = next;
                Ok(value)
            }
            Err(source) => Err(self.fail(stage, source)),
        }
    }

    fn fail(&mut self, stage: Phase, source: Error) -> ScheduleError {
        tracing::error!(stage = %stage, error = %source, "scheduler step failed");
        self.state = SchedulerState::Failed;
        ScheduleError::new(stage, source)
    }
}
