use crate::ir::{
    NodeIndex,
    edge::{EdgeKind, NodeClass, SlotDescriptor},
    lowering::{LirGeneratorTool, Lowerable, LoweringError, NodeLirBuilder},
    node::{MemoryKill, NodeBuilder, StateSplit},
    stamp::{ObjectStamp, Stamp},
    types::TypeRef,
};

use super::NodeKind;

pub(super) static START_CLASS: NodeClass = NodeClass {
    name: "Start",
    inputs: &[SlotDescriptor::optional("state_after", EdgeKind::State)],
    successors: &["next"],
};

pub(super) static EXCEPTION_OBJECT_CLASS: NodeClass = NodeClass {
    name: "ExceptionObject",
    inputs: &[SlotDescriptor::optional("state_after", EdgeKind::State)],
    successors: &["next"],
};

pub(super) static RETURN_CLASS: NodeClass = NodeClass {
    name: "Return",
    inputs: &[SlotDescriptor::optional("result", EdgeKind::Value)],
    successors: &[],
};

pub(super) static UNWIND_CLASS: NodeClass = NodeClass {
    name: "Unwind",
    inputs: &[SlotDescriptor::input("exception", EdgeKind::Value)],
    successors: &[],
};

/// Entry of the graph. Every graph has exactly one, created with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartNode;

impl MemoryKill for StartNode {}

impl StateSplit for StartNode {
    fn state_after_slot(&self) -> usize {
        0
    }

    fn has_side_effect(&self) -> bool {
        false
    }
}

impl Lowerable for StartNode {
    fn generate(
        &self,
        _node: NodeIndex,
        _builder: &mut NodeLirBuilder<'_>,
        _lir: &mut dyn LirGeneratorTool,
    ) -> Result<(), LoweringError> {
        Ok(())
    }
}

/// Entry of an exception handler; produces the thrown object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionObjectNode;

impl ExceptionObjectNode {
    pub fn build() -> NodeBuilder {
        NodeBuilder::new(
            NodeKind::ExceptionObject(ExceptionObjectNode),
            Stamp::Object(ObjectStamp::for_type(TypeRef::root(), false, true)),
        )
    }
}

impl MemoryKill for ExceptionObjectNode {}

impl StateSplit for ExceptionObjectNode {
    fn state_after_slot(&self) -> usize {
        0
    }

    fn has_side_effect(&self) -> bool {
        false
    }
}

impl Lowerable for ExceptionObjectNode {
    fn generate(
        &self,
        node: NodeIndex,
        builder: &mut NodeLirBuilder<'_>,
        lir: &mut dyn LirGeneratorTool,
    ) -> Result<(), LoweringError> {
        let exception = lir.emit_exception_object();
        builder.set_result(node, exception);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnNode;

impl ReturnNode {
    pub fn build(result: Option<NodeIndex>) -> NodeBuilder {
        NodeBuilder::new(NodeKind::Return(ReturnNode), Stamp::Void).optional_input(0, result)
    }
}

impl Lowerable for ReturnNode {
    fn generate(
        &self,
        node: NodeIndex,
        builder: &mut NodeLirBuilder<'_>,
        lir: &mut dyn LirGeneratorTool,
    ) -> Result<(), LoweringError> {
        let result = builder.optional_input_operand(node, 0)?;
        lir.emit_return(result);
        Ok(())
    }
}

/// Leaves the method by rethrowing an exception.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnwindNode;

impl UnwindNode {
    pub fn build(exception: NodeIndex) -> NodeBuilder {
        NodeBuilder::new(NodeKind::Unwind(UnwindNode), Stamp::Void).input(0, exception)
    }
}

impl Lowerable for UnwindNode {
    fn generate(
        &self,
        node: NodeIndex,
        builder: &mut NodeLirBuilder<'_>,
        lir: &mut dyn LirGeneratorTool,
    ) -> Result<(), LoweringError> {
        let exception = builder.input_operand(node, 0)?;
        lir.emit_unwind(exception);
        Ok(())
    }
}
