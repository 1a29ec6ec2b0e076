//! Per-memory-space buffer allocators.
//!
//! Each memory space is owned by exactly one `BufferAllocator`. The allocator
//! decides how many bytes a connector needs in its space, which alignment
//! offsets must respect, and how logical buffers are packed into the arena.

mod first_fit;
mod generic;
mod scratchpad;

pub use first_fit::FirstFitArena;
pub use generic::GenericAllocator;
pub use scratchpad::ScratchpadAllocator;

use crate::liveness::{BufferId, LogicalBuffer};
use std::collections::BTreeMap;
use tessera_core::types::{element_count, strided_extent};
use tessera_core::{Connector, ConnectorId, Error, MemorySpace, Result};

/// Allocation strategy for one memory space.
pub trait BufferAllocator {
    /// The memory space this allocator owns.
    fn space(&self) -> MemorySpace;

    /// Arena size in bytes.
    fn capacity(&self) -> usize;

    /// Required offset alignment in bytes.
    fn alignment(&self) -> usize {
        1
    }

    /// Bytes needed to hold the value of `connector` in this space.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the space cannot represent the value.
    fn size_of(&self, connector: &Connector) -> Result<usize>;

    /// Assign offsets to `buffers`, all of which live in this space.
    ///
    /// The default is first-fit over liveness intervals.
    fn allocate(&self, buffers: &[LogicalBuffer]) -> Result<ArenaPlan> {
        FirstFitArena::new(self.space(), self.capacity(), self.alignment()).allocate(buffers)
    }
}

/// Byte offset assigned to one logical buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub buffer: BufferId,
    pub connector: ConnectorId,
    pub space: MemorySpace,
    pub offset: usize,
    /// Reserved bytes, rounded up to the allocator's alignment.
    pub size: usize,
}

impl Allocation {
    /// One past the last reserved byte.
    pub fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// Usage figures for one arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaStats {
    pub space: MemorySpace,
    pub capacity: usize,
    /// Highest number of simultaneously reserved bytes.
    pub peak: usize,
    pub buffers: usize,
}

/// Result of allocating one arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArenaPlan {
    pub allocations: Vec<Allocation>,
    pub stats: ArenaStats,
}

/// Bytes spanned by a connector's value: the strided extent × dtype size,
/// or the plain element count × dtype size when the connector is flagged
/// strides-irrelevant.
///
/// # Errors
///
/// Returns `InvalidArgument` if the size does not fit in `usize`.
pub fn generic_size(connector: &Connector) -> Result<usize> {
    let elements = if connector.flags.contains_strides_irrelevant() {
        element_count(&connector.shape)
    } else {
        strided_extent(&connector.shape, &connector.strides)
    };
    elements
        .and_then(|n| n.checked_mul(connector.dtype.size()))
        .ok_or_else(|| size_overflow(connector))
}

/// Round `value` up to a multiple of `alignment` (alignment 0 is treated as 1).
///
/// Returns `None` if the result does not fit in `usize`.
pub fn align_up(value: usize, alignment: usize) -> Option<usize> {
    value.checked_next_multiple_of(alignment.max(1))
}

pub(crate) fn size_overflow(connector: &Connector) -> Error {
    Error::InvalidArgument(format!(
        "size of {} {:?} overflows the address space",
        connector.dtype, connector.shape
    ))
}

/// The allocators of one scheduler run, keyed by the space they own.
#[derive(Default)]
pub struct AllocatorSet {
    allocators: BTreeMap<MemorySpace, Box<dyn BufferAllocator>>,
}

impl AllocatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an allocator. The first allocator for a space wins.
    pub fn insert(&mut self, allocator: Box<dyn BufferAllocator>) -> bool {
        let space = allocator.space();
        if self.allocators.contains_key(&space) {
            return false;
        }
        self.allocators.insert(space, allocator);
        true
    }

    /// The allocator owning `space`.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` if no registered module provides the space.
    pub fn get(&self, space: MemorySpace) -> Result<&dyn BufferAllocator> {
        self.allocators
            .get(&space)
            .map(|a| a.as_ref())
            .ok_or_else(|| Error::Unsupported(format!("no allocator for memory space {}", space)))
    }

    pub fn spaces(&self) -> impl Iterator<Item = MemorySpace> + '_ {
        self.allocators.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.allocators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocators.is_empty()
    }
}
