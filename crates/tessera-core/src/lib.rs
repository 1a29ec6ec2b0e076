//! Core intermediate representation and pass traits for Tessera.
//!
//! This crate provides the foundational abstractions the scheduler builds on:
//! - Graph-based IR (`Graph`, `Node`, `Connector`) with stable handles
//! - Operations (`Op`, `Opcode`) and attribute flags
//! - The `Pass` trait and `RewriteContext` for pattern-match/rewrite passes
//! - DOT rendering for debugging

pub mod dot;
pub mod ir;
pub mod op;
pub mod pass;
pub mod types;

// Re-export commonly used types
pub use ir::{
    Connection, Connector, ConnectorDef, ConnectorId, Graph, GraphSnapshot, Node, NodeDef, NodeId,
    Port,
};
pub use op::{ExchangeKind, Op, Opcode, PoolKind, ReduceKind};
pub use pass::{Pass, RewriteContext, Stage};
pub use types::{ConnectorFlags, DataType, Layout, MemorySpace, ModuleId, NodeFlags};

/// Result type using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for tessera operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Malformed rewrite in pass '{pass}': {reason}")]
    MalformedRewrite { pass: String, reason: String },

    #[error(
        "Out of {space} memory: buffer '{buffer}' of node '{node}' ({opcode}) needs {requested} bytes \
         (capacity {capacity}, largest free interval {largest_free})"
    )]
    CapacityExceeded {
        space: MemorySpace,
        buffer: String,
        node: String,
        opcode: Opcode,
        requested: usize,
        capacity: usize,
        largest_free: usize,
    },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Transform passes did not converge within {iterations} iterations")]
    PassLimitExceeded { iterations: usize },

    #[error("Invalid graph structure: {0}")]
    InvalidGraph(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}
