//! Operations carried by graph nodes.

use crate::types::{Layout, MemorySpace};
use std::fmt;

/// Fieldless operation key used for dispatch and target support sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Opcode {
    Input,
    Output,
    Constant,
    Identity,
    Copy,
    Reshape,
    Add,
    Mul,
    Relu,
    Conv2d,
    MatMul,
    Pool,
    Reduce,
    Softmax,
    Concat,
    Exchange,
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    Max,
    Avg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceKind {
    Sum,
    Max,
    Mean,
}

/// Direction of a synthesized data-movement node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeKind {
    /// Host memory to a module-private space.
    Upload,
    /// Module-private space back to host memory.
    Download,
}

/// An operation and its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Graph input, fed by the caller.
    Input { index: usize, layout: Layout },

    /// Graph output, read by the caller.
    Output { index: usize, layout: Layout },

    /// Constant tensor bytes.
    Constant { data: Vec<u8> },

    Identity,
    Copy,
    Reshape,
    Add,
    Mul,
    Relu,

    Conv2d { stride: [usize; 2], padding: [usize; 2] },

    MatMul { transpose_b: bool },

    Pool {
        kind: PoolKind,
        window: [usize; 2],
        stride: [usize; 2],
    },

    Reduce { kind: ReduceKind, axis: usize },

    Softmax { axis: usize },

    Concat { axis: usize },

    /// Data movement across a memory or module boundary.
    Exchange {
        kind: ExchangeKind,
        from: MemorySpace,
        to: MemorySpace,
    },
}

impl Op {
    /// Graph input with an opaque layout.
    pub fn input(index: usize) -> Self {
        Op::Input {
            index,
            layout: Layout::Opaque,
        }
    }

    /// Graph output with an opaque layout.
    pub fn output(index: usize) -> Self {
        Op::Output {
            index,
            layout: Layout::Opaque,
        }
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            Op::Input { .. } => Opcode::Input,
            Op::Output { .. } => Opcode::Output,
            Op::Constant { .. } => Opcode::Constant,
            Op::Identity => Opcode::Identity,
            Op::Copy => Opcode::Copy,
            Op::Reshape => Opcode::Reshape,
            Op::Add => Opcode::Add,
            Op::Mul => Opcode::Mul,
            Op::Relu => Opcode::Relu,
            Op::Conv2d { .. } => Opcode::Conv2d,
            Op::MatMul { .. } => Opcode::MatMul,
            Op::Pool { .. } => Opcode::Pool,
            Op::Reduce { .. } => Opcode::Reduce,
            Op::Softmax { .. } => Opcode::Softmax,
            Op::Concat { .. } => Opcode::Concat,
            Op::Exchange { .. } => Opcode::Exchange,
        }
    }

    /// Operation-specific property comparison.
    ///
    /// Graph inputs never compare equal to each other: two inputs are
    /// distinct values even with identical signatures.
    pub fn properties_equal(&self, other: &Op) -> bool {
        match (self, other) {
            (Op::Input { .. }, Op::Input { .. }) => false,
            (Op::Output { .. }, Op::Output { .. }) => false,
            (Op::Constant { data: a }, Op::Constant { data: b }) => a == b,
            (Op::Identity, Op::Identity)
            | (Op::Copy, Op::Copy)
            | (Op::Reshape, Op::Reshape)
            | (Op::Add, Op::Add)
            | (Op::Mul, Op::Mul)
            | (Op::Relu, Op::Relu) => true,
            (
                Op::Conv2d { stride: s1, padding: p1 },
                Op::Conv2d { stride: s2, padding: p2 },
            ) => s1 == s2 && p1 == p2,
            (Op::MatMul { transpose_b: a }, Op::MatMul { transpose_b: b }) => a == b,
            (
                Op::Pool { kind: k1, window: w1, stride: s1 },
                Op::Pool { kind: k2, window: w2, stride: s2 },
            ) => k1 == k2 && w1 == w2 && s1 == s2,
            (Op::Reduce { kind: k1, axis: a1 }, Op::Reduce { kind: k2, axis: a2 }) => {
                k1 == k2 && a1 == a2
            }
            (Op::Softmax { axis: a }, Op::Softmax { axis: b }) => a == b,
            (Op::Concat { axis: a }, Op::Concat { axis: b }) => a == b,
            (
                Op::Exchange { kind: k1, from: f1, to: t1 },
                Op::Exchange { kind: k2, from: f2, to: t2 },
            ) => k1 == k2 && f1 == f2 && t1 == t2,
            _ => false,
        }
    }

    /// Pure data movement with no numeric effect.
    pub fn is_alias(&self) -> bool {
        matches!(self, Op::Identity | Op::Copy | Op::Reshape)
    }

    pub fn is_exchange(&self) -> bool {
        matches!(self, Op::Exchange { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_mapping() {
        assert_eq!(Op::input(0).opcode(), Opcode::Input);
        assert_eq!(Op::Softmax { axis: 1 }.opcode(), Opcode::Softmax);
        assert_eq!(
            Op::Exchange {
                kind: ExchangeKind::Upload,
                from: MemorySpace::Host,
                to: MemorySpace::Scratchpad,
            }
            .opcode(),
            Opcode::Exchange
        );
    }

    #[test]
    fn test_properties_equal() {
        let a = Op::Reduce { kind: ReduceKind::Sum, axis: 1 };
        let b = Op::Reduce { kind: ReduceKind::Sum, axis: 1 };
        let c = Op::Reduce { kind: ReduceKind::Max, axis: 1 };
        assert!(a.properties_equal(&b));
        assert!(!a.properties_equal(&c));
        assert!(!Op::Relu.properties_equal(&Op::Add));
        assert!(!Op::input(0).properties_equal(&Op::input(0)));
        assert!(Op::Constant { data: vec![1, 2] }.properties_equal(&Op::Constant { data: vec![1, 2] }));
    }

    #[test]
    fn test_alias_ops() {
        assert!(Op::Identity.is_alias());
        assert!(Op::Reshape.is_alias());
        assert!(!Op::Relu.is_alias());
    }
}
