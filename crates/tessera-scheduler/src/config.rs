//! Scheduler configuration.

/// What to do when the transform passes hit the iteration cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PassLimitPolicy {
    /// Log a warning and continue with the last graph.
    #[default]
    BestEffort,

    /// Abort compilation with `Error::PassLimitExceeded`.
    Fail,
}

/// Configuration for one scheduler run.
///
/// # Example
///
/// ```
/// use tessera_scheduler::{PassLimitPolicy, SchedulerConfig};
///
/// let config = SchedulerConfig::default()
///     .with_max_pass_iterations(8)
///     .with_pass_limit_policy(PassLimitPolicy::Fail);
/// assert_eq!(config.max_pass_iterations, 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Upper bound on full transform iterations.
    pub max_pass_iterations: usize,

    pub pass_limit_policy: PassLimitPolicy,

    /// Move constants out of the read-only segment into data memory so
    /// benchmark builds can reload them.
    pub benchmark_placement: bool,

    /// Worker threads for the generated runtime. Copied into the result.
    pub num_threads: usize,
}

impl SchedulerConfig {
    pub fn with_max_pass_iterations(mut self, iterations: usize) -> Self {
        self.max_pass_iterations = iterations;
        self
    }

    pub fn with_pass_limit_policy(mut self, policy: PassLimitPolicy) -> Self {
        self.pass_limit_policy = policy;
        self
    }

    pub fn with_benchmark_placement(mut self, enabled: bool) -> Self {
        self.benchmark_placement = enabled;
        self
    }

    pub fn with_num_threads(mut self, threads: usize) -> Self {
        self.num_threads = threads;
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_pass_iterations: 16,
            pass_limit_policy: PassLimitPolicy::BestEffort,
            benchmark_placement: false,
            num_threads: 1,
        }
    }
}
