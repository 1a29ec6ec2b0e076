//! Core types for element types, memory spaces, modules and attribute flags.

use std::fmt;

/// Element type carried by a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DataType {
    F32,
    F16,
    BF16,
    I64,
    I32,
    I16,
    I8,
    U8,
    Bool,
}

impl DataType {
    /// Size of one element in bytes.
    pub fn size(&self) -> usize {
        match self {
            DataType::I64 => 8,
            DataType::F32 | DataType::I32 => 4,
            DataType::F16 | DataType::BF16 | DataType::I16 => 2,
            DataType::I8 | DataType::U8 | DataType::Bool => 1,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::F32 => "f32",
            DataType::F16 => "f16",
            DataType::BF16 => "bf16",
            DataType::I64 => "i64",
            DataType::I32 => "i32",
            DataType::I16 => "i16",
            DataType::I8 => "i8",
            DataType::U8 => "u8",
            DataType::Bool => "bool",
        };
        f.write_str(name)
    }
}

/// A distinct addressable arena with its own capacity, alignment and legality rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MemorySpace {
    /// Host DRAM, normal data memory.
    Host,

    /// Host buffers handed in and out by the caller.
    HostIo,

    /// Read-only host segment for constants.
    HostConst,

    /// Private on-chip SRAM of an accelerator module.
    Scratchpad,

    /// Global memory of a GPU-like module.
    Device,
}

impl MemorySpace {
    /// Whether the space is directly addressable by the host CPU.
    pub fn is_host(&self) -> bool {
        matches!(
            self,
            MemorySpace::Host | MemorySpace::HostIo | MemorySpace::HostConst
        )
    }
}

impl fmt::Display for MemorySpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemorySpace::Host => "host",
            MemorySpace::HostIo => "host_io",
            MemorySpace::HostConst => "host_const",
            MemorySpace::Scratchpad => "scratchpad",
            MemorySpace::Device => "device",
        };
        f.write_str(name)
    }
}

/// Identifier of an execution module (CPU, accelerator, GPU-like).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ModuleId(pub u32);

impl ModuleId {
    /// The host CPU module. Every node starts out here.
    pub const HOST: ModuleId = ModuleId(0);

    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn index(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module{}", self.0)
    }
}

/// Tensor layout tag carried on graph boundary nodes.
///
/// The scheduler never interprets it; it is forwarded to codegen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Layout {
    ChannelsFirst,
    ChannelsLast,
    #[default]
    Opaque,
}

/// Node attribute bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NodeFlags(u8);

impl NodeFlags {
    const KEEP: u8 = 1;
    const PINNED: u8 = 2;

    pub fn empty() -> Self {
        NodeFlags(0)
    }

    /// Never removed by simplification passes.
    pub fn keep() -> Self {
        NodeFlags(Self::KEEP)
    }

    /// Stays on the module it was built for; module tagging skips it.
    pub fn pinned() -> Self {
        NodeFlags(Self::PINNED)
    }

    pub fn contains_keep(self) -> bool {
        (self.0 & Self::KEEP) != 0
    }

    pub fn contains_pinned(self) -> bool {
        (self.0 & Self::PINNED) != 0
    }

    pub fn merge(mut self, other: NodeFlags) -> Self {
        self.0 |= other.0;
        self
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

/// Per-connector attribute flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ConnectorFlags(u8);

impl ConnectorFlags {
    const STRIDES_IRRELEVANT: u8 = 1;
    const NO_BENCHMARK_PLACEMENT: u8 = 2;
    const BENCHMARK_PLACED: u8 = 4;

    pub fn empty() -> Self {
        ConnectorFlags(0)
    }

    /// The owning space uses its own addressing; strides carry no meaning.
    pub fn strides_irrelevant() -> Self {
        ConnectorFlags(Self::STRIDES_IRRELEVANT)
    }

    /// Opts the connector out of benchmark placement.
    pub fn no_benchmark_placement() -> Self {
        ConnectorFlags(Self::NO_BENCHMARK_PLACEMENT)
    }

    /// Set by the placement pass on values it moved into data memory.
    pub fn benchmark_placed() -> Self {
        ConnectorFlags(Self::BENCHMARK_PLACED)
    }

    pub fn contains_strides_irrelevant(self) -> bool {
        (self.0 & Self::STRIDES_IRRELEVANT) != 0
    }

    pub fn contains_no_benchmark_placement(self) -> bool {
        (self.0 & Self::NO_BENCHMARK_PLACEMENT) != 0
    }

    pub fn contains_benchmark_placed(self) -> bool {
        (self.0 & Self::BENCHMARK_PLACED) != 0
    }

    pub fn merge(mut self, other: ConnectorFlags) -> Self {
        self.0 |= other.0;
        self
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

/// Row-major strides (in elements) for a shape.
///
/// Strides saturate instead of wrapping; sizes derived from a saturated
/// stride overflow in `strided_extent` and are reported there.
pub fn contiguous_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1].saturating_mul(shape[i + 1]);
    }
    strides
}

/// Number of elements in a shape. Scalars have one element.
///
/// Returns `None` if the count does not fit in `usize`.
pub fn element_count(shape: &[usize]) -> Option<usize> {
    if shape.contains(&0) {
        return Some(0);
    }
    shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
}

/// Number of elements spanned by a strided view, including the gaps.
///
/// Returns `Some(0)` for shapes with a zero-sized dimension and `None` if
/// the extent does not fit in `usize`.
pub fn strided_extent(shape: &[usize], strides: &[usize]) -> Option<usize> {
    if shape.contains(&0) {
        return Some(0);
    }
    shape
        .iter()
        .zip(strides)
        .try_fold(1usize, |acc, (&dim, &stride)| {
            (dim - 1).checked_mul(stride)?.checked_add(acc)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_strides() {
        assert_eq!(contiguous_strides(&[2, 3, 4]), vec![12, 4, 1]);
        assert_eq!(contiguous_strides(&[5]), vec![1]);
        assert!(contiguous_strides(&[]).is_empty());
    }

    #[test]
    fn test_strided_extent_matches_count_for_contiguous() {
        let shape = [2, 3, 4];
        let strides = contiguous_strides(&shape);
        assert_eq!(strided_extent(&shape, &strides), element_count(&shape));
        assert_eq!(element_count(&[]), Some(1));
    }

    #[test]
    fn test_strided_extent_with_padding() {
        // Two rows of three, row pitch of eight elements.
        assert_eq!(strided_extent(&[2, 3], &[8, 1]), Some(11));
        assert_eq!(strided_extent(&[0, 3], &[8, 1]), Some(0));
    }

    #[test]
    fn test_sizes_overflow_to_none() {
        assert_eq!(element_count(&[1 << 40, 1 << 40]), None);
        assert_eq!(element_count(&[1 << 40, 0]), Some(0));
        assert_eq!(strided_extent(&[4, 2], &[usize::MAX / 2, 1]), None);

        let strides = contiguous_strides(&[2, 1 << 40, 1 << 40]);
        assert_eq!(strides[0], usize::MAX);
        assert_eq!(strided_extent(&[2, 1 << 40, 1 << 40], &strides), None);
    }

    #[test]
    fn test_flags_merge() {
        let flags = ConnectorFlags::strides_irrelevant().merge(ConnectorFlags::benchmark_placed());
        assert!(flags.contains_strides_irrelevant());
        assert!(flags.contains_benchmark_placed());
        assert!(!flags.contains_no_benchmark_placement());

        let node = NodeFlags::keep();
        assert!(node.contains_keep());
        assert!(!node.contains_pinned());
    }

    #[test]
    fn test_host_spaces() {
        assert!(MemorySpace::Host.is_host());
        assert!(MemorySpace::HostIo.is_host());
        assert!(!MemorySpace::Scratchpad.is_host());
        assert!(!MemorySpace::Device.is_host());
    }
}
