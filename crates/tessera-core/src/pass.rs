//! Transform pass trait, stage definitions and rewrite contexts.

use crate::ir::{ConnectorId, Graph, NodeId};
use crate::{Error, Result};

/// Transform stage for organizing passes.
///
/// Passes are grouped into stages and run in a fixed order. Within each stage,
/// passes run in the order they were registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Graph simplification (alias removal, CSE, dead code elimination).
    Simplification,

    /// Execution module assignment.
    ///
    /// Passes in this stage move nodes from the host module to the module
    /// that will run them and retag connector memory spaces accordingly.
    Tagging,

    /// Memory-space placement hints (latest stage).
    Placement,
}

/// Trait for implementing transform passes.
///
/// A pass is a pattern-match/rewrite rule. The pass manager walks the graph
/// in reverse topological order and asks every pass whether it matches at
/// each node; on a match, `process` rewrites the graph using the captured
/// context. A full sweep that produces no matches is the fixed point.
///
/// # Example
///
/// ```ignore
/// struct DropRelu;
///
/// impl Pass for DropRelu {
///     fn name(&self) -> &str {
///         "drop_relu"
///     }
///
///     fn stage(&self) -> Stage {
///         Stage::Simplification
///     }
///
///     fn matches(&self, graph: &Graph, node: NodeId) -> Option<RewriteContext> {
///         let n = graph.node(node).ok()?;
///         if n.op != Op::Relu {
///             return None;
///         }
///         RewriteContext::capture_all(graph, node).ok()
///     }
///
///     fn process(&self, graph: &mut Graph, ctx: RewriteContext) -> Result<()> {
///         ctx.validate(self.name(), graph)?;
///         graph.remove_node(ctx.matched[0])
///     }
/// }
/// ```
pub trait Pass: Send + Sync {
    /// Get the pass name (used for logging and debugging).
    fn name(&self) -> &str;

    /// Get the stage this pass belongs to.
    fn stage(&self) -> Stage;

    /// Check whether the pass applies at `node`.
    ///
    /// Must not mutate anything. Returns the captured context on a match.
    fn matches(&self, graph: &Graph, node: NodeId) -> Option<RewriteContext>;

    /// Rewrite the graph for a context returned by `matches`.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRewrite` if the context is inconsistent with the
    /// graph. This is a programming error in the pass and is never recovered.
    fn process(&self, graph: &mut Graph, ctx: RewriteContext) -> Result<()>;
}

/// Nodes and connectors captured by a successful match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteContext {
    /// Matched nodes. The first entry is the node the match was rooted at.
    pub matched: Vec<NodeId>,

    /// Captured input connectors of the matched nodes.
    pub inputs: Vec<ConnectorId>,

    /// Captured output connectors of the matched nodes.
    pub outputs: Vec<ConnectorId>,
}

impl RewriteContext {
    pub fn new(matched: Vec<NodeId>) -> Self {
        Self {
            matched,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Context for one node capturing all of its connectors.
    pub fn capture_all(graph: &Graph, node: NodeId) -> Result<Self> {
        let n = graph.node(node)?;
        Ok(Self {
            matched: vec![node],
            inputs: n.inputs.clone(),
            outputs: n.outputs.clone(),
        })
    }

    /// The node the match was rooted at.
    pub fn root(&self) -> Option<NodeId> {
        self.matched.first().copied()
    }

    /// Check that every captured connector belongs to a matched node.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRewrite` naming `pass` when the context is empty,
    /// refers to removed nodes, or captured a connector of a node it did
    /// not match.
    pub fn validate(&self, pass: &str, graph: &Graph) -> Result<()> {
        let malformed = |reason: String| Error::MalformedRewrite {
            pass: pass.to_string(),
            reason,
        };

        if self.matched.is_empty() {
            return Err(malformed("no matched nodes".to_string()));
        }
        for &node in &self.matched {
            if !graph.contains(node) {
                return Err(malformed(format!("matched node {:?} no longer exists", node)));
            }
        }
        for &id in self.inputs.iter().chain(&self.outputs) {
            let connector = graph
                .connector(id)
                .map_err(|_| malformed(format!("captured connector {:?} does not exist", id)))?;
            if !self.matched.contains(&connector.node) {
                return Err(malformed(format!(
                    "captured connector '{}' belongs to unmatched node {:?}",
                    connector.name, connector.node
                )));
            }
        }
        Ok(())
    }

    /// Check that the context captured every connector of `node`.
    pub fn require_full_capture(&self, pass: &str, graph: &Graph, node: NodeId) -> Result<()> {
        let n = graph.node(node)?;
        let complete = n.inputs.iter().all(|c| self.inputs.contains(c))
            && n.outputs.iter().all(|c| self.outputs.contains(c));
        if !complete {
            return Err(Error::MalformedRewrite {
                pass: pass.to_string(),
                reason: format!("connectors of '{}' were only partially captured", n.name),
            });
        }
        Ok(())
    }
}
