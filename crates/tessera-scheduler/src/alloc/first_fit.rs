//! First-fit arena allocation over liveness intervals.

use super::{Allocation, ArenaPlan, ArenaStats, align_up};
use crate::liveness::LogicalBuffer;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use tessera_core::{Error, MemorySpace, Result};

/// First-fit allocator for one arena.
///
/// Buffers are placed in order of birth. Free space is a map from offset to
/// interval length; a buffer takes the lowest-offset interval it fits in.
/// Buffers whose liveness ended strictly before the next birth are returned
/// to the free map, merging with adjacent free intervals.
#[derive(Debug, Clone)]
pub struct FirstFitArena {
    space: MemorySpace,
    capacity: usize,
    alignment: usize,
    free: BTreeMap<usize, usize>,
    used: usize,
    peak: usize,
}

impl FirstFitArena {
    pub fn new(space: MemorySpace, capacity: usize, alignment: usize) -> Self {
        let mut free = BTreeMap::new();
        if capacity > 0 {
            free.insert(0, capacity);
        }
        Self {
            space,
            capacity,
            alignment: alignment.max(1),
            free,
            used: 0,
            peak: 0,
        }
    }

    /// Allocate every buffer, consuming the arena.
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` for the first buffer that fits in no free
    /// interval.
    pub fn allocate(mut self, buffers: &[LogicalBuffer]) -> Result<ArenaPlan> {
        let mut order: Vec<&LogicalBuffer> = buffers.iter().collect();
        order.sort_by_key(|b| (b.birth, b.id));

        // (death, position in `allocations`)
        let mut live: BinaryHeap<Reverse<(usize, usize)>> = BinaryHeap::new();
        let mut allocations = Vec::with_capacity(order.len());

        for buffer in order {
            while let Some(&Reverse((death, slot))) = live.peek() {
                if death >= buffer.birth {
                    break;
                }
                live.pop();
                let freed: &Allocation = &allocations[slot];
                self.release(freed.offset, freed.size);
            }

            let size = align_up(buffer.size, self.alignment);
            let offset = match size {
                Some(0) => Some(0),
                Some(size) => self.reserve(size),
                None => None,
            };
            let (Some(size), Some(offset)) = (size, offset) else {
                return Err(Error::CapacityExceeded {
                    space: self.space,
                    buffer: buffer.name.clone(),
                    node: buffer.node_name.clone(),
                    opcode: buffer.opcode,
                    requested: size.unwrap_or(buffer.size),
                    capacity: self.capacity,
                    largest_free: self.largest_free(),
                });
            };

            tracing::trace!(
                space = %self.space,
                buffer = %buffer.name,
                offset,
                size,
                birth = buffer.birth,
                death = buffer.death,
                "placed buffer"
            );

            if size > 0 {
                live.push(Reverse((buffer.death, allocations.len())));
            }
            allocations.push(Allocation {
                buffer: buffer.id,
                connector: buffer.connector,
                space: self.space,
                offset,
                size,
            });
        }

        allocations.sort_by_key(|a| a.buffer);
        Ok(ArenaPlan {
            stats: ArenaStats {
                space: self.space,
                capacity: self.capacity,
                peak: self.peak,
                buffers: allocations.len(),
            },
            allocations,
        })
    }

    /// Carve `size` bytes out of the lowest-offset interval that fits.
    fn reserve(&mut self, size: usize) -> Option<usize> {
        let (start, len, offset) = self.free.iter().find_map(|(&start, &len)| {
            let offset = align_up(start, self.alignment)?;
            let end = offset.checked_add(size)?;
            (end <= start + len).then_some((start, len, offset))
        })?;

        self.free.remove(&start);
        if offset > start {
            self.free.insert(start, offset - start);
        }
        let end = offset + size;
        if end < start + len {
            self.free.insert(end, start + len - end);
        }

        self.used += size;
        self.peak = self.peak.max(self.used);
        Some(offset)
    }

    /// Return an interval to the free map, merging with its neighbours.
    fn release(&mut self, offset: usize, size: usize) {
        self.used -= size;
        let mut start = offset;
        let mut len = size;

        if let Some(next_len) = self.free.remove(&(offset + size)) {
            len += next_len;
        }
        let prev = self.free.range(..offset).next_back().map(|(&o, &l)| (o, l));
        if let Some((prev, prev_len)) = prev {
            if prev + prev_len == offset {
                self.free.remove(&prev);
                start = prev;
                len += prev_len;
            }
        }
        self.free.insert(start, len);
    }

    fn largest_free(&self) -> usize {
        self.free.values().copied().max().unwrap_or(0)
    }
}
