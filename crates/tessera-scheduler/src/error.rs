//! Error types for scheduler runs.

use std::fmt;
use thiserror::Error;

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, ScheduleError>;

/// Scheduler step that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Transform,
    Partition,
    Liveness,
    Allocation,
    Finalize,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Transform => "transform",
            Phase::Partition => "partition",
            Phase::Liveness => "liveness",
            Phase::Allocation => "allocation",
            Phase::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

/// A failed scheduler step.
#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct ScheduleError {
    pub stage: Phase,
    #[source]
    pub source: tessera_core::Error,
}

impl ScheduleError {
    pub fn new(stage: Phase, source: tessera_core::Error) -> Self {
        Self { stage, source }
    }

    /// The underlying core error.
    pub fn kind(&self) -> &tessera_core::Error {
        &self.source
    }
}

/// Attach a scheduler step to core results.
pub(crate) trait ResultExt<T> {
    fn in_phase(self, stage: Phase) -> Result<T>;
}

impl<T> ResultExt<T> for tessera_core::Result<T> {
    fn in_phase(self, stage: Phase) -> Result<T> {
        self.map_err(|source| ScheduleError::new(stage, source))
    }
}
