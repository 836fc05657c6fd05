//! The graph intermediate representation.
//!
//! Nodes live in an arena owned by [`graph::Graph`] and refer to each other
//! by [`NodeIndex`]. Inputs and successors are stored on the node that uses
//! them; usages and predecessors are the back-references the graph keeps in
//! sync.

use typed_generational_arena::StandardIndex;

pub mod canonicalizer;
pub mod edge;
pub mod errors;
pub mod fold;
pub mod graph;
pub mod location;
pub mod lowering;
pub mod memory;
pub mod node;
pub mod nodes;
pub mod stamp;
pub mod types;

/// Stable identity of a node. A deleted node's index is never reused for a
/// live node: the generation changes.
pub type NodeIndex = StandardIndex<node::Node>;
