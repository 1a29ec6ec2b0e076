use super::{BufferAllocator, align_up, size_overflow};
use tessera_core::types::element_count;
use tessera_core::{Connector, DataType, Error, MemorySpace, Result};

/// Channels are stored in blocks of this many lanes.
const CHANNEL_BLOCK: usize = 16;

/// Row pitch and offset granularity in bytes.
const ROW_ALIGNMENT: usize = 64;

/// Allocator for an accelerator's on-chip SRAM.
///
/// The scratchpad stores a single element type. Tensors are packed as rows
/// of `width × padded_channels` elements, where the channel count (last
/// dimension) is padded to a multiple of 16 and every row starts on a
/// 64-byte boundary. The second-to-last dimension is the width; all outer
/// dimensions multiply into the row count.
#[derive(Debug, Clone)]
pub struct ScratchpadAllocator {
    capacity: usize,
    dtype: DataType,
}

impl ScratchpadAllocator {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            dtype: DataType::I8,
        }
    }

    /// Element type the scratchpad accepts.
    pub fn with_dtype(mut self, dtype: DataType) -> Self {
        self.dtype = dtype;
        self
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }
}

impl BufferAllocator for ScratchpadAllocator {
    fn space(&self) -> MemorySpace {
        MemorySpace::Scratchpad
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn alignment(&self) -> usize {
        ROW_ALIGNMENT
    }

    fn size_of(&self, connector: &Connector) -> Result<usize> {
        if connector.dtype != self.dtype {
            return Err(Error::InvalidArgument(format!(
                "scratchpad holds {} only, value is {}",
                self.dtype, connector.dtype
            )));
        }
        packed_size(&connector.shape, self.dtype.size()).ok_or_else(|| size_overflow(connector))
    }
}

/// Bytes of a channel-blocked, row-padded tensor, or `None` on overflow.
fn packed_size(shape: &[usize], element_size: usize) -> Option<usize> {
    if shape.contains(&0) {
        return Some(0);
    }
    let (channels, width, rows) = match shape.len() {
        0 => (1, 1, 1),
        1 => (shape[0], 1, 1),
        n => (shape[n - 1], shape[n - 2], element_count(&shape[..n - 2])?),
    };

    let padded_channels = align_up(channels, CHANNEL_BLOCK)?;
    let row = width.checked_mul(padded_channels)?.checked_mul(element_size)?;
    rows.checked_mul(align_up(row, ROW_ALIGNMENT)?)
}
