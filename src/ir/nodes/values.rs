use crate::ir::{
    NodeIndex,
    edge::NodeClass,
    lowering::{LirGeneratorTool, Lowerable, LoweringError, NodeLirBuilder},
    node::NodeBuilder,
    stamp::Stamp,
};

use super::NodeKind;

pub(super) static PARAMETER_CLASS: NodeClass = NodeClass {
    name: "Parameter",
    inputs: &[],
    successors: &[],
};

pub(super) static CONSTANT_CLASS: NodeClass = NodeClass {
    name: "Constant",
    inputs: &[],
    successors: &[],
};

/// An incoming argument of the compiled method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterNode {
    pub index: u32,
}

impl ParameterNode {
    pub fn build(index: u32, stamp: Stamp) -> NodeBuilder {
        NodeBuilder::new(NodeKind::Parameter(ParameterNode { index }), stamp)
    }
}

impl Lowerable for ParameterNode {
    fn generate(
        &self,
        node: NodeIndex,
        builder: &mut NodeLirBuilder<'_>,
        lir: &mut dyn LirGeneratorTool,
    ) -> Result<(), LoweringError> {
        let stamp = builder.graph().stamp(node);
        let operand = lir.emit_incoming_parameter(self.index, stamp);
        builder.set_result(node, operand);
        Ok(())
    }
}

/// An integer constant. Created through [`crate::ir::graph::Graph::constant`],
/// which keeps one node per value and width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantNode {
    pub bits: u32,
    pub value: i64,
}

impl Lowerable for ConstantNode {
    fn generate(
        &self,
        node: NodeIndex,
        builder: &mut NodeLirBuilder<'_>,
        lir: &mut dyn LirGeneratorTool,
    ) -> Result<(), LoweringError> {
        let operand = lir.emit_constant(self.bits, self.value);
        builder.set_result(node, operand);
        Ok(())
    }
}
