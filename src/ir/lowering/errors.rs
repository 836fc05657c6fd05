use thiserror::Error;

use crate::ir::{NodeIndex, errors::GraphError};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LoweringError {
    #[error("node n{} ({kind}) was used before it produced an operand", node.to_idx())]
    MissingOperand { node: NodeIndex, kind: &'static str },
    #[error("node n{} ({kind}) can't be lowered", node.to_idx())]
    NotLowerable { node: NodeIndex, kind: &'static str },
    #[error("node n{} ({kind}) is missing its {slot:?} input", node.to_idx())]
    MissingInput {
        node: NodeIndex,
        kind: &'static str,
        slot: &'static str,
    },
    #[error("node n{} ({kind}) is missing its {successor:?} successor", node.to_idx())]
    MissingSuccessor {
        node: NodeIndex,
        kind: &'static str,
        successor: &'static str,
    },
    #[error("floating node n{} depends on itself", node.to_idx())]
    FloatingCycle { node: NodeIndex },
    #[error("node n{} is not a frame state", node.to_idx())]
    NotAFrameState { node: NodeIndex },
    #[error(transparent)]
    Graph(#[from] GraphError),
}
