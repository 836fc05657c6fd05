use std::fmt;

use crate::ir::{
    NodeIndex,
    canonicalizer::{Canonicalizable, CanonicalizerTool},
    edge::{EdgeKind, NodeClass, SlotDescriptor},
    errors::GraphError,
    fold::FoldOp,
    graph::Graph,
    lowering::{LirGeneratorTool, Lowerable, LoweringError, NodeLirBuilder},
    node::NodeBuilder,
};

use super::{BinaryNode, NodeKind, X_SLOT, Y_SLOT};

pub(super) static SHUFFLE_BITS_CLASS: NodeClass = NodeClass {
    name: "ShuffleBits",
    inputs: &[
        SlotDescriptor::input("value", EdgeKind::Value),
        SlotDescriptor::input("mask", EdgeKind::Value),
    ],
    successors: &[],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShuffleMode {
    /// Gathers the bits selected by the mask into the low bits.
    Compress,
    /// Scatters the low bits to the positions selected by the mask.
    Expand,
}

impl fmt::Display for ShuffleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShuffleMode::Compress => write!(f, "compress"),
            ShuffleMode::Expand => write!(f, "expand"),
        }
    }
}

/// Bit compress or expand of `value` under `mask`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShuffleBitsNode {
    pub mode: ShuffleMode,
}

impl ShuffleBitsNode {
    pub fn build(
        graph: &mut Graph,
        mode: ShuffleMode,
        value: NodeIndex,
        mask: NodeIndex,
    ) -> Result<NodeBuilder, GraphError> {
        graph.check_alive(value)?;
        graph.check_alive(mask)?;
        let node = Self { mode };
        let stamp = graph
            .fold(node.fold_op(), value, mask)
            .ok_or_else(|| GraphError::IncompatibleStamps {
                op: node.fold_op().name(),
                x: graph.stamp(value).clone(),
                y: graph.stamp(mask).clone(),
            })?;
        Ok(NodeBuilder::new(NodeKind::ShuffleBits(node), stamp)
            .input(X_SLOT, value)
            .input(Y_SLOT, mask))
    }
}

impl BinaryNode for ShuffleBitsNode {
    fn fold_op(&self) -> FoldOp {
        match self.mode {
            ShuffleMode::Compress => FoldOp::Compress,
            ShuffleMode::Expand => FoldOp::Expand,
        }
    }
}

impl Canonicalizable for ShuffleBitsNode {
    fn canonical(&self, node: NodeIndex, _tool: &mut CanonicalizerTool<'_>) -> NodeIndex {
        // Folding constant masks is left for later; the node is kept as is.
        node
    }
}

impl Lowerable for ShuffleBitsNode {
    fn generate(
        &self,
        node: NodeIndex,
        builder: &mut NodeLirBuilder<'_>,
        lir: &mut dyn LirGeneratorTool,
    ) -> Result<(), LoweringError> {
        let value = builder.input_operand(node, X_SLOT)?;
        let mask = builder.input_operand(node, Y_SLOT)?;
        let result = match self.mode {
            ShuffleMode::Compress => lir.arithmetic().emit_integer_compress(value, mask),
            ShuffleMode::Expand => lir.arithmetic().emit_integer_expand(value, mask),
        };
        builder.set_result(node, result);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        nodes::ParameterNode,
        stamp::{IntegerStamp, Stamp},
    };
    use test_case::test_case;

    #[test_case(ShuffleMode::Compress ; "compress")]
    #[test_case(ShuffleMode::Expand ; "expand")]
    fn stamp_is_unrestricted_and_canonical_is_identity(mode: ShuffleMode) {
        let mut graph = Graph::new("shuffle");
        let value = graph
            .add(ParameterNode::build(0, Stamp::Integer(IntegerStamp::range(64, 0, 15))))
            .unwrap();
        let mask = graph.constant(64, 0b1010);
        let builder = ShuffleBitsNode::build(&mut graph, mode, value, mask).unwrap();
        let node = graph.add(builder).unwrap();
        assert_eq!(graph.stamp(node), &Stamp::int(64));

        let shuffle = ShuffleBitsNode { mode };
        let mut tool = CanonicalizerTool::new(&mut graph);
        assert_eq!(shuffle.canonical(node, &mut tool), node);
        assert_eq!(shuffle.canonical(node, &mut tool), node);
    }

    #[test]
    fn operands_must_share_a_width() {
        let mut graph = Graph::new("shuffle");
        let value = graph.add(ParameterNode::build(0, Stamp::int(32))).unwrap();
        let mask = graph.constant(64, 1);
        assert!(ShuffleBitsNode::build(&mut graph, ShuffleMode::Compress, value, mask).is_err());
    }
}
