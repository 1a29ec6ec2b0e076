//! Fixed-point driver for transform passes.

use crate::config::{PassLimitPolicy, SchedulerConfig};
use crate::passes::{
    AliasEliminationPass, CommonSubexpressionPass, DeadCodeEliminationPass, ModuleTaggingPass,
    PlacementHintPass,
};
use crate::profile::CompileProfile;
use crate::target::TargetRegistry;
use tessera_core::{Error, Graph, Pass, Result};

/// Outcome of running the transform passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransformReport {
    /// Full iterations run (each iteration runs every pass once).
    pub iterations: usize,

    /// Total matches over all iterations.
    pub matches: usize,

    /// Whether the last iteration produced no matches.
    pub converged: bool,
}

/// Transform pipeline with pluggable passes.
///
/// Passes run ordered by stage; within a stage, in registration order. One
/// iteration runs every pass over the whole graph, visiting nodes in reverse
/// topological order. Iterations repeat until one produces no matches or the
/// iteration cap is reached.
pub struct PassManager {
    /// All passes to run, ordered by (stage, registration order) before a run.
    passes: Vec<Box<dyn Pass>>,

    max_iterations: usize,

    policy: PassLimitPolicy,
}

impl PassManager {
    /// Create an empty pass manager.
    pub fn new(max_iterations: usize, policy: PassLimitPolicy) -> Self {
        Self {
            passes: Vec::new(),
            max_iterations,
            policy,
        }
    }

    /// Create a pass manager with the built-in passes.
    ///
    /// The built-in passes are:
    /// - `AliasEliminationPass`, `CommonSubexpressionPass` and
    ///   `DeadCodeEliminationPass` (Simplification stage)
    /// - one `ModuleTaggingPass` per non-host module, in registration order
    ///   (Tagging stage)
    /// - `PlacementHintPass` when benchmark placement is enabled
    ///   (Placement stage)
    pub fn with_builtin_passes(targets: &TargetRegistry, config: &SchedulerConfig) -> Self {
        let mut manager = Self::new(config.max_pass_iterations, config.pass_limit_policy);

        manager.add_pass(AliasEliminationPass::new());
        manager.add_pass(CommonSubexpressionPass::new());
        manager.add_pass(DeadCodeEliminationPass::new());

        for target in targets.iter().filter(|t| !t.is_host()) {
            manager.add_pass(ModuleTaggingPass::new(target.clone()));
        }

        if config.benchmark_placement {
            manager.add_pass(PlacementHintPass::new());
        }

        manager
    }

    /// Add a custom pass.
    ///
    /// The pass will be inserted into the appropriate stage (determined by
    /// `pass.stage()`).
    pub fn add_pass(&mut self, pass: impl Pass + 'static) -> &mut Self {
        self.passes.push(Box::new(pass));
        self
    }

    /// Add an already boxed pass.
    pub fn add_boxed(&mut self, pass: Box<dyn Pass>) -> &mut Self {
        self.passes.push(pass);
        self
    }

    /// Names of the registered passes, in execution order.
    pub fn pass_names(&self) -> Vec<&str> {
        let mut passes: Vec<&Box<dyn Pass>> = self.passes.iter().collect();
        passes.sort_by_key(|p| p.stage());
        passes.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Run passes until a fixed point or the iteration cap.
    ///
    /// # Errors
    ///
    /// Propagates pass errors (malformed rewrites are fatal) and returns
    /// `PassLimitExceeded` when the cap is hit under `PassLimitPolicy::Fail`.
    pub fn run(&mut self, graph: &mut Graph, profile: &mut CompileProfile) -> Result<TransformReport> {
        self.passes.sort_by_key(|p| p.stage());

        let mut report = TransformReport::default();
        for iteration in 1..=self.max_iterations {
            let _span = tracing::debug_span!("iteration", iteration).entered();
            let mut matches = 0;

            for pass in &self.passes {
                let _span =
                    tracing::debug_span!("pass", name = pass.name(), stage = ?pass.stage()).entered();
                let count = run_pass(pass.as_ref(), graph)?;
                if count > 0 {
                    tracing::debug!(matches = count, "pass rewrote graph");
                }
                profile.record_matches(pass.name(), count);
                matches += count;
            }

            report.iterations = iteration;
            report.matches += matches;
            profile.transform_iterations = iteration;

            if matches == 0 {
                report.converged = true;
                return Ok(report);
            }
        }

        match self.policy {
            PassLimitPolicy::Fail => Err(Error::PassLimitExceeded {
                iterations: self.max_iterations,
            }),
            PassLimitPolicy::BestEffort => {
                tracing::warn!(
                    iterations = self.max_iterations,
                    matches = report.matches,
                    "transform passes did not reach a fixed point, continuing with last graph"
                );
                Ok(report)
            }
        }
    }
}

/// Apply one pass to every node, outputs first. Returns the match count.
fn run_pass(pass: &dyn Pass, graph: &mut Graph) -> Result<usize> {
    let order = graph.reverse_topological_order()?;
    let mut count = 0;
    for node in order {
        if !graph.contains(node) {
            continue;
        }
        if let Some(ctx) = pass.matches(graph, node) {
            tracing::trace!(pass = pass.name(), node = ?node, "match");
            pass.process(graph, ctx)?;
            count += 1;
        }
    }
    Ok(count)
}
