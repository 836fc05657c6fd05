//! The concrete node kinds.
//!
//! Each kind is a plain struct holding the data that is not an edge, plus a
//! static [`NodeClass`] describing its slots. Behaviour shared between kinds
//! is expressed through the capability traits in [`crate::ir::node`], which
//! each kind implements selectively.

use std::fmt;

use super::{
    canonicalizer::Canonicalizable,
    edge::NodeClass,
    fold::FoldOp,
    lowering::Lowerable,
    node::{DeoptimizingDuring, MemoryAccess, MemoryKill, StateSplit, WithExceptionEdge},
};

mod arithmetic;
mod array_copy;
mod control;
mod foreign_call;
mod frame_state;
mod shuffle;
mod values;
mod write;

pub use arithmetic::{BinaryArithmeticNode, BinaryOp};
pub use array_copy::{ArrayCopyNode, select_component_kind};
pub use control::{ExceptionObjectNode, ReturnNode, StartNode, UnwindNode};
pub use foreign_call::ForeignCallNode;
pub use frame_state::FrameStateNode;
pub use shuffle::{ShuffleBitsNode, ShuffleMode};
pub use values::{ConstantNode, ParameterNode};
pub use write::WriteNode;

/// Slot of the left operand of a binary node.
pub const X_SLOT: usize = 0;
/// Slot of the right operand of a binary node.
pub const Y_SLOT: usize = 1;

/// A floating node whose stamp folds from its `x` and `y` inputs.
pub trait BinaryNode {
    fn fold_op(&self) -> FoldOp;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Start(StartNode),
    ExceptionObject(ExceptionObjectNode),
    Return(ReturnNode),
    Unwind(UnwindNode),
    Parameter(ParameterNode),
    Constant(ConstantNode),
    Binary(BinaryArithmeticNode),
    ShuffleBits(ShuffleBitsNode),
    FrameState(FrameStateNode),
    ArrayCopy(ArrayCopyNode),
    ForeignCall(ForeignCallNode),
    Write(WriteNode),
}

impl NodeKind {
    pub fn node_class(&self) -> &'static NodeClass {
        match self {
            NodeKind::Start(_) => &control::START_CLASS,
            NodeKind::ExceptionObject(_) => &control::EXCEPTION_OBJECT_CLASS,
            NodeKind::Return(_) => &control::RETURN_CLASS,
            NodeKind::Unwind(_) => &control::UNWIND_CLASS,
            NodeKind::Parameter(_) => &values::PARAMETER_CLASS,
            NodeKind::Constant(_) => &values::CONSTANT_CLASS,
            NodeKind::Binary(_) => &arithmetic::BINARY_CLASS,
            NodeKind::ShuffleBits(_) => &shuffle::SHUFFLE_BITS_CLASS,
            NodeKind::FrameState(_) => &frame_state::FRAME_STATE_CLASS,
            NodeKind::ArrayCopy(_) => &array_copy::ARRAY_COPY_CLASS,
            NodeKind::ForeignCall(_) => &foreign_call::FOREIGN_CALL_CLASS,
            NodeKind::Write(_) => &write::WRITE_CLASS,
        }
    }

    pub fn name(&self) -> &'static str {
        self.node_class().name
    }

    /// Whether the node is part of the control-flow chain.
    pub fn is_fixed(&self) -> bool {
        matches!(
            self,
            NodeKind::Start(_)
                | NodeKind::ExceptionObject(_)
                | NodeKind::Return(_)
                | NodeKind::Unwind(_)
                | NodeKind::ArrayCopy(_)
                | NodeKind::ForeignCall(_)
                | NodeKind::Write(_)
        )
    }

    /// Pure nodes that can be shared between equal occurrences.
    pub fn is_value_numberable(&self) -> bool {
        matches!(
            self,
            NodeKind::Constant(_) | NodeKind::Binary(_) | NodeKind::ShuffleBits(_)
        )
    }

    /// Floating nodes that dead-code elimination may remove once unused.
    /// Parameters stay: they belong to the signature.
    pub fn is_deletable_when_unused(&self) -> bool {
        !self.is_fixed() && !matches!(self, NodeKind::Parameter(_))
    }

    pub fn as_memory_access(&self) -> Option<&dyn MemoryAccess> {
        match self {
            NodeKind::ArrayCopy(node) => Some(node),
            NodeKind::ForeignCall(node) => Some(node),
            NodeKind::Write(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_memory_kill(&self) -> Option<&dyn MemoryKill> {
        match self {
            NodeKind::Start(node) => Some(node),
            NodeKind::ExceptionObject(node) => Some(node),
            NodeKind::ArrayCopy(node) => Some(node),
            NodeKind::ForeignCall(node) => Some(node),
            NodeKind::Write(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_state_split(&self) -> Option<&dyn StateSplit> {
        match self {
            NodeKind::Start(node) => Some(node),
            NodeKind::ExceptionObject(node) => Some(node),
            NodeKind::ArrayCopy(node) => Some(node),
            NodeKind::ForeignCall(node) => Some(node),
            NodeKind::Write(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_deoptimizing_during(&self) -> Option<&dyn DeoptimizingDuring> {
        match self {
            NodeKind::ArrayCopy(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_with_exception_edge(&self) -> Option<&dyn WithExceptionEdge> {
        match self {
            NodeKind::ArrayCopy(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&dyn BinaryNode> {
        match self {
            NodeKind::Binary(node) => Some(node),
            NodeKind::ShuffleBits(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_canonicalizable(&self) -> Option<&dyn Canonicalizable> {
        match self {
            NodeKind::Binary(node) => Some(node),
            NodeKind::ShuffleBits(node) => Some(node),
            NodeKind::ArrayCopy(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_lowerable(&self) -> Option<&dyn Lowerable> {
        match self {
            NodeKind::Start(node) => Some(node),
            NodeKind::ExceptionObject(node) => Some(node),
            NodeKind::Return(node) => Some(node),
            NodeKind::Unwind(node) => Some(node),
            NodeKind::Parameter(node) => Some(node),
            NodeKind::Constant(node) => Some(node),
            NodeKind::Binary(node) => Some(node),
            NodeKind::ShuffleBits(node) => Some(node),
            NodeKind::ArrayCopy(node) => Some(node),
            NodeKind::ForeignCall(node) => Some(node),
            NodeKind::Write(node) => Some(node),
            NodeKind::FrameState(_) => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Parameter(node) => write!(f, "Parameter({})", node.index),
            NodeKind::Constant(node) => write!(f, "Constant({})", node.value),
            NodeKind::Binary(node) => write!(f, "{}", node.op),
            NodeKind::ShuffleBits(node) => write!(f, "ShuffleBits({})", node.mode),
            NodeKind::FrameState(node) => write!(f, "FrameState(@{})", node.bci),
            NodeKind::ArrayCopy(node) => match node.element_kind {
                Some(kind) => write!(f, "ArrayCopy({kind})"),
                None => write!(f, "ArrayCopy(?)"),
            },
            NodeKind::ForeignCall(node) => write!(f, "ForeignCall({})", node.descriptor),
            NodeKind::Write(node) => write!(f, "Write({}, {})", node.location, node.barrier),
            _ => f.write_str(self.name()),
        }
    }
}
