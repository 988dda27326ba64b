//!
//! The functions in this mod flatten a nested `Workflow` into an ordered list of
//! task instances that can be run by structs in the `exec` mod.
//!
//! The traversal is created in 3 steps:
//! 1. Collect every leaf task across all nesting levels, and rewrite each edge
//!    to connect two leaves (passthrough `inputspec`/`outputspec` tasks stay as leaves).
//! 2. Sort the leaves topologically, failing if they contain a cycle.
//! 3. Step forward through the sorted leaves, expanding iterables: every leaf downstream
//!    of an iterable task gets one instance per compatible parameterization.
//!
//! In the end, you will have a list of instances in dependency order, each
//! knowing which upstream instance feeds each of its inputs.

/// collect leaves and leaf-level edges
mod flatten;
pub use flatten::{Leaf, LeafEdge};

/// struct returned by this mod
mod traversal;
pub use traversal::{InputSource, Instance, Traversal};

mod errors;
pub use errors::Errors;

util::id!(LeafId, u16);
util::id!(InstanceId, u32);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Workflow contains a cycle through: {0}")]
    Cycle(String),
    #[error("Edge refers to unknown task \"{0}\"")]
    UnknownLeaf(String),
    #[error("No instance of \"{0}\" matches parameterization [{1}]")]
    NoCompatibleSource(String, String),
}
