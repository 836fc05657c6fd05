use std::sync::Arc;

use crate::{
    foreign::CallDescriptor,
    ir::{
        NodeIndex,
        edge::{EdgeKind, NodeClass, SlotDescriptor},
        errors::GraphError,
        graph::Graph,
        location::LocationIdentity,
        lowering::{LirGeneratorTool, Lowerable, LoweringError, NodeLirBuilder},
        node::{MemoryAccess, MemoryKill, NodeBuilder, StateSplit},
    },
};

use super::NodeKind;

pub(super) static FOREIGN_CALL_CLASS: NodeClass = NodeClass {
    name: "ForeignCall",
    inputs: &[
        SlotDescriptor::list("arguments", EdgeKind::Value),
        SlotDescriptor::optional("state_after", EdgeKind::State),
        SlotDescriptor::optional("last_location_access", EdgeKind::Memory),
    ],
    successors: &["next"],
};

/// A call into a runtime-resident function.
///
/// The callee is opaque: the call may read and write any memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignCallNode {
    pub descriptor: Arc<CallDescriptor>,
    pub bci: i32,
}

impl ForeignCallNode {
    pub const ARGUMENTS_SLOT: usize = 0;
    pub const STATE_AFTER_SLOT: usize = 1;
    pub const LAST_LOCATION_ACCESS_SLOT: usize = 2;

    pub fn build(
        graph: &Graph,
        descriptor: Arc<CallDescriptor>,
        bci: i32,
        arguments: &[NodeIndex],
    ) -> Result<NodeBuilder, GraphError> {
        let expected = descriptor.argument_types().len();
        if arguments.len() != expected {
            return Err(GraphError::ArityMismatch {
                name: descriptor.name().to_string(),
                expected,
                found: arguments.len(),
            });
        }
        for argument in arguments {
            graph.check_alive(*argument)?;
        }
        let stamp = descriptor.result_type().stamp();
        Ok(
            NodeBuilder::new(NodeKind::ForeignCall(Self { descriptor, bci }), stamp)
                .input_list(Self::ARGUMENTS_SLOT, arguments.iter().copied().map(Some)),
        )
    }
}

impl MemoryAccess for ForeignCallNode {
    fn location_identity(&self) -> LocationIdentity {
        LocationIdentity::Any
    }

    fn last_location_access_slot(&self) -> usize {
        Self::LAST_LOCATION_ACCESS_SLOT
    }
}

impl MemoryKill for ForeignCallNode {}

impl StateSplit for ForeignCallNode {
    fn state_after_slot(&self) -> usize {
        Self::STATE_AFTER_SLOT
    }

    fn has_side_effect(&self) -> bool {
        true
    }
}

impl Lowerable for ForeignCallNode {
    fn generate(
        &self,
        node: NodeIndex,
        builder: &mut NodeLirBuilder<'_>,
        lir: &mut dyn LirGeneratorTool,
    ) -> Result<(), LoweringError> {
        let arguments = builder.list_operands(node, Self::ARGUMENTS_SLOT)?;
        let state = builder.state_for(builder.graph()[node].state_after())?;
        if let Some(result) = lir.emit_foreign_call(&self.descriptor, &arguments, state.as_ref(), None) {
            builder.set_result(node, result);
        }
        Ok(())
    }
}
