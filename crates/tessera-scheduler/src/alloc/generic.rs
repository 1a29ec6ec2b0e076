use super::{BufferAllocator, generic_size};
use tessera_core::{Connector, MemorySpace, Result};

/// Allocator for plain byte-addressed memory of any element type.
#[derive(Debug, Clone)]
pub struct GenericAllocator {
    space: MemorySpace,
    capacity: usize,
    alignment: usize,
}

impl GenericAllocator {
    pub fn new(space: MemorySpace, capacity: usize) -> Self {
        Self {
            space,
            capacity,
            alignment: 1,
        }
    }

    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment.max(1);
        self
    }
}

impl BufferAllocator for GenericAllocator {
    fn space(&self) -> MemorySpace {
        self.space
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn alignment(&self) -> usize {
        self.alignment
    }

    fn size_of(&self, connector: &Connector) -> Result<usize> {
        generic_size(connector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::liveness::{BufferId, LogicalBuffer};
    use tessera_core::{ConnectorId, DataType, NodeId, Opcode};

    #[test]
    fn test_default_allocate_is_first_fit() {
        let allocator = GenericAllocator::new(MemorySpace::Device, 256).with_alignment(32);
        let buffers: Vec<LogicalBuffer> = (0..2)
            .map(|i| LogicalBuffer {
                id: BufferId(i),
                name: format!("b{}", i),
                connector: ConnectorId(i),
                node: NodeId::new(i),
                node_name: format!("n{}", i),
                opcode: Opcode::Add,
                space: MemorySpace::Device,
                dtype: DataType::F32,
                size: 40,
                alignment: 32,
                birth: i,
                death: i + 1,
            })
            .collect();

        let plan = allocator.allocate(&buffers).unwrap();
        assert_eq!(plan.allocations[0].offset, 0);
        assert_eq!(plan.allocations[1].offset, 64);
        assert_eq!(plan.stats.peak, 128);
        assert_eq!(plan.stats.capacity, 256);
    }
}
