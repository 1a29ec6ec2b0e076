//! Execution module descriptors and the target registry.

use crate::alloc::{AllocatorSet, BufferAllocator, GenericAllocator, ScratchpadAllocator};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tessera_core::{DataType, MemorySpace, ModuleId, Opcode};

/// Creates a fresh allocator for one scheduler run.
pub type AllocatorFactory = Arc<dyn Fn() -> Box<dyn BufferAllocator> + Send + Sync>;

/// Host arenas in the default registry.
pub const DEFAULT_HOST_CAPACITY: usize = 1 << 30;

/// Accelerator SRAM in the default registry.
pub const DEFAULT_SCRATCHPAD_CAPACITY: usize = 4 << 20;

/// GPU global memory in the default registry.
pub const DEFAULT_DEVICE_CAPACITY: usize = 256 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Cpu,
    Accelerator,
    Gpu,
}

/// What one execution module can run and which memory it brings.
#[derive(Clone)]
pub struct TargetDescriptor {
    pub module: ModuleId,
    pub name: String,
    pub kind: TargetKind,

    /// Space the module's connectors are retagged to.
    pub default_space: MemorySpace,

    pub supported_opcodes: BTreeSet<Opcode>,

    /// Accepted element types. `None` accepts every type.
    pub supported_dtypes: Option<BTreeSet<DataType>>,

    allocators: Vec<(MemorySpace, AllocatorFactory)>,
}

impl TargetDescriptor {
    pub fn new(
        module: ModuleId,
        name: impl Into<String>,
        kind: TargetKind,
        default_space: MemorySpace,
    ) -> Self {
        Self {
            module,
            name: name.into(),
            kind,
            default_space,
            supported_opcodes: BTreeSet::new(),
            supported_dtypes: None,
            allocators: Vec::new(),
        }
    }

    pub fn with_opcodes(mut self, opcodes: impl IntoIterator<Item = Opcode>) -> Self {
        self.supported_opcodes.extend(opcodes);
        self
    }

    pub fn with_dtypes(mut self, dtypes: impl IntoIterator<Item = DataType>) -> Self {
        self.supported_dtypes = Some(dtypes.into_iter().collect());
        self
    }

    /// Add an allocator factory for a space this module uses.
    pub fn with_allocator<F>(mut self, space: MemorySpace, factory: F) -> Self
    where
        F: Fn() -> Box<dyn BufferAllocator> + Send + Sync + 'static,
    {
        self.allocators.push((space, Arc::new(factory)));
        self
    }

    pub fn supports(&self, opcode: Opcode) -> bool {
        self.supported_opcodes.contains(&opcode)
    }

    pub fn accepts_dtype(&self, dtype: DataType) -> bool {
        self.supported_dtypes
            .as_ref()
            .is_none_or(|dtypes| dtypes.contains(&dtype))
    }

    /// Memory spaces this module provides allocators for.
    pub fn spaces(&self) -> impl Iterator<Item = MemorySpace> + '_ {
        self.allocators.iter().map(|(space, _)| *space)
    }

    pub fn is_host(&self) -> bool {
        self.module == ModuleId::HOST
    }
}

impl fmt::Debug for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetDescriptor")
            .field("module", &self.module)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("default_space", &self.default_space)
            .field("supported_opcodes", &self.supported_opcodes)
            .field("supported_dtypes", &self.supported_dtypes)
            .field("spaces", &self.spaces().collect::<Vec<_>>())
            .finish()
    }
}

/// Registry of execution modules, in registration order.
///
/// # Example
///
/// ```ignore
/// let mut targets = TargetRegistry::new();
/// targets.register(TargetDescriptor::new(ModuleId::HOST, "cpu", TargetKind::Cpu, MemorySpace::Host)
///     .with_allocator(MemorySpace::Host, || Box::new(GenericAllocator::new(MemorySpace::Host, 1 << 20))));
/// ```
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    targets: Vec<TargetDescriptor>,
}

impl TargetRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            targets: Vec::new(),
        }
    }

    /// Registry with a CPU host module, an int8 accelerator with a 4 MiB
    /// scratchpad and a GPU-like module with a device arena.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(cpu_target());
        registry.register(accelerator_target(ModuleId::new(1)));
        registry.register(gpu_target(ModuleId::new(2)));
        registry
    }

    /// Register a module. A descriptor with an already registered id
    /// replaces the old one in place.
    pub fn register(&mut self, target: TargetDescriptor) -> &mut Self {
        match self.targets.iter_mut().find(|t| t.module == target.module) {
            Some(slot) => *slot = target,
            None => self.targets.push(target),
        }
        self
    }

    pub fn get(&self, module: ModuleId) -> Option<&TargetDescriptor> {
        self.targets.iter().find(|t| t.module == module)
    }

    pub fn contains(&self, module: ModuleId) -> bool {
        self.get(module).is_some()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// All modules in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &TargetDescriptor> {
        self.targets.iter()
    }

    /// Instantiate one allocator per memory space.
    ///
    /// When several modules provide the same space, the first registered
    /// module's allocator is used.
    pub fn allocators(&self) -> AllocatorSet {
        let mut set = AllocatorSet::new();
        for target in &self.targets {
            for (space, factory) in &target.allocators {
                let allocator = factory();
                if allocator.space() != *space {
                    tracing::warn!(
                        module = %target.module,
                        declared = %space,
                        actual = %allocator.space(),
                        "allocator factory produced an allocator for a different space"
                    );
                }
                if !set.insert(allocator) {
                    tracing::debug!(module = %target.module, space = %space, "space already provided");
                }
            }
        }
        set
    }
}

fn cpu_target() -> TargetDescriptor {
    TargetDescriptor::new(ModuleId::HOST, "cpu", TargetKind::Cpu, MemorySpace::Host)
        .with_opcodes([
            Opcode::Input,
            Opcode::Output,
            Opcode::Constant,
            Opcode::Identity,
            Opcode::Copy,
            Opcode::Reshape,
            Opcode::Add,
            Opcode::Mul,
            Opcode::Relu,
            Opcode::Conv2d,
            Opcode::MatMul,
            Opcode::Pool,
            Opcode::Reduce,
            Opcode::Softmax,
            Opcode::Concat,
            Opcode::Exchange,
        ])
        .with_allocator(MemorySpace::Host, || {
            Box::new(GenericAllocator::new(MemorySpace::Host, DEFAULT_HOST_CAPACITY).with_alignment(16))
        })
        .with_allocator(MemorySpace::HostIo, || {
            Box::new(GenericAllocator::new(MemorySpace::HostIo, DEFAULT_HOST_CAPACITY).with_alignment(16))
        })
        .with_allocator(MemorySpace::HostConst, || {
            Box::new(GenericAllocator::new(MemorySpace::HostConst, DEFAULT_HOST_CAPACITY).with_alignment(16))
        })
}

fn accelerator_target(module: ModuleId) -> TargetDescriptor {
    TargetDescriptor::new(module, "npu", TargetKind::Accelerator, MemorySpace::Scratchpad)
        .with_opcodes([
            Opcode::Conv2d,
            Opcode::Add,
            Opcode::Relu,
            Opcode::Pool,
            Opcode::Concat,
            Opcode::MatMul,
        ])
        .with_dtypes([DataType::I8])
        .with_allocator(MemorySpace::Scratchpad, || {
            Box::new(ScratchpadAllocator::new(DEFAULT_SCRATCHPAD_CAPACITY))
        })
}

fn gpu_target(module: ModuleId) -> TargetDescriptor {
    TargetDescriptor::new(module, "gpu", TargetKind::Gpu, MemorySpace::Device)
        .with_opcodes([
            Opcode::Conv2d,
            Opcode::MatMul,
            Opcode::Add,
            Opcode::Mul,
            Opcode::Relu,
            Opcode::Softmax,
            Opcode::Reduce,
            Opcode::Concat,
        ])
        .with_dtypes([DataType::F32, DataType::F16])
        .with_allocator(MemorySpace::Device, || {
            Box::new(GenericAllocator::new(MemorySpace::Device, DEFAULT_DEVICE_CAPACITY).with_alignment(256))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry() {
        let registry = TargetRegistry::with_defaults();
        assert_eq!(registry.len(), 3);

        let cpu = registry.get(ModuleId::HOST).unwrap();
        assert_eq!(cpu.kind, TargetKind::Cpu);
        assert!(cpu.accepts_dtype(DataType::F32));

        let npu = registry.get(ModuleId::new(1)).unwrap();
        assert_eq!(npu.default_space, MemorySpace::Scratchpad);
        assert!(npu.supports(Opcode::Conv2d));
        assert!(!npu.supports(Opcode::Softmax));
        assert!(npu.accepts_dtype(DataType::I8));
        assert!(!npu.accepts_dtype(DataType::F32));

        let allocators = registry.allocators();
        assert_eq!(allocators.len(), 5);
        assert_eq!(
            allocators.get(MemorySpace::Scratchpad).unwrap().capacity(),
            DEFAULT_SCRATCHPAD_CAPACITY
        );
    }

    #[test]
    fn test_first_registered_space_wins() {
        let mut registry = TargetRegistry::new();
        registry.register(
            TargetDescriptor::new(ModuleId::HOST, "cpu", TargetKind::Cpu, MemorySpace::Host)
                .with_allocator(MemorySpace::Host, || {
                    Box::new(GenericAllocator::new(MemorySpace::Host, 100))
                }),
        );
        registry.register(
            TargetDescriptor::new(ModuleId::new(7), "other", TargetKind::Cpu, MemorySpace::Host)
                .with_allocator(MemorySpace::Host, || {
                    Box::new(GenericAllocator::new(MemorySpace::Host, 200))
                }),
        );

        let allocators = registry.allocators();
        assert_eq!(allocators.get(MemorySpace::Host).unwrap().capacity(), 100);
    }

    #[test]
    fn test_register_replaces_same_module() {
        let mut registry = TargetRegistry::with_defaults();
        registry.register(TargetDescriptor::new(
            ModuleId::new(1),
            "npu2",
            TargetKind::Accelerator,
            MemorySpace::Scratchpad,
        ));
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.get(ModuleId::new(1)).unwrap().name, "npu2");
    }
}
