//! Built-in transform passes.

mod alias_elimination;
mod cse;
mod dce;
mod module_tagging;
mod placement_hint;

pub use alias_elimination::AliasEliminationPass;
pub use cse::CommonSubexpressionPass;
pub use dce::DeadCodeEliminationPass;
pub use module_tagging::ModuleTaggingPass;
pub use placement_hint::PlacementHintPass;
