//! Timing and pass statistics for one scheduler run.

use crate::error::Phase;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Statistics collected while a single graph is scheduled.
///
/// Owned by the scheduler and handed out with the result; nothing is shared
/// between runs.
#[derive(Debug, Clone, Default)]
pub struct CompileProfile {
    /// Wall time per scheduler step, in execution order.
    pub stages: Vec<(Phase, Duration)>,

    /// Matches per pass name, summed over all iterations.
    pub pass_matches: BTreeMap<String, usize>,

    /// Full transform iterations run.
    pub transform_iterations: usize,
}

impl CompileProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time `f` and record it under `stage`.
    pub fn time<T>(&mut self, stage: Phase, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let value = f();
        self.stages.push((stage, start.elapsed()));
        value
    }

    pub fn record_matches(&mut self, pass: &str, matches: usize) {
        *self.pass_matches.entry(pass.to_string()).or_default() += matches;
    }

    pub fn stage_duration(&self, stage: Phase) -> Option<Duration> {
        self.stages
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, d)| *d)
    }

    pub fn total(&self) -> Duration {
        self.stages.iter().map(|(_, d)| *d).sum()
    }
}

impl fmt::Display for CompileProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<12} {:>12}", "stage", "time")?;
        for (stage, duration) in &self.stages {
            writeln!(f, "{:<12} {:>12.3?}", stage.to_string(), duration)?;
        }
        writeln!(f, "transform iterations: {}", self.transform_iterations)?;
        for (pass, matches) in &self.pass_matches {
            writeln!(f, "  {:<28} {:>6}", pass, matches)?;
        }
        Ok(())
    }
}
