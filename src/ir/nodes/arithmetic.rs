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

pub(super) static BINARY_CLASS: NodeClass = NodeClass {
    name: "BinaryArithmetic",
    inputs: &[
        SlotDescriptor::input("x", EdgeKind::Value),
        SlotDescriptor::input("y", EdgeKind::Value),
    ],
    successors: &[],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
}

impl BinaryOp {
    pub fn fold_op(self) -> FoldOp {
        match self {
            BinaryOp::Add => FoldOp::Add,
            BinaryOp::Sub => FoldOp::Sub,
            BinaryOp::Mul => FoldOp::Mul,
            BinaryOp::And => FoldOp::And,
            BinaryOp::Or => FoldOp::Or,
            BinaryOp::Xor => FoldOp::Xor,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "add" => BinaryOp::Add,
            "sub" => BinaryOp::Sub,
            "mul" => BinaryOp::Mul,
            "and" => BinaryOp::And,
            "or" => BinaryOp::Or,
            "xor" => BinaryOp::Xor,
            _ => return None,
        })
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BinaryOp::Add => "Add",
            BinaryOp::Sub => "Sub",
            BinaryOp::Mul => "Mul",
            BinaryOp::And => "And",
            BinaryOp::Or => "Or",
            BinaryOp::Xor => "Xor",
        };
        f.write_str(name)
    }
}

/// Two's complement integer arithmetic on operands of equal width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryArithmeticNode {
    pub op: BinaryOp,
}

impl BinaryArithmeticNode {
    /// Prepares `x op y`, with its stamp folded from the operands.
    pub fn build(
        graph: &mut Graph,
        op: BinaryOp,
        x: NodeIndex,
        y: NodeIndex,
    ) -> Result<NodeBuilder, GraphError> {
        graph.check_alive(x)?;
        graph.check_alive(y)?;
        let stamp = graph
            .fold(op.fold_op(), x, y)
            .ok_or_else(|| GraphError::IncompatibleStamps {
                op: op.fold_op().name(),
                x: graph.stamp(x).clone(),
                y: graph.stamp(y).clone(),
            })?;
        Ok(NodeBuilder::new(NodeKind::Binary(Self { op }), stamp)
            .input(X_SLOT, x)
            .input(Y_SLOT, y))
    }
}

impl BinaryNode for BinaryArithmeticNode {
    fn fold_op(&self) -> FoldOp {
        self.op.fold_op()
    }
}

impl Canonicalizable for BinaryArithmeticNode {
    fn canonical(&self, node: NodeIndex, tool: &mut CanonicalizerTool<'_>) -> NodeIndex {
        let (Some(x), Some(y)) = (tool.node(node).input(X_SLOT), tool.node(node).input(Y_SLOT))
        else {
            return node;
        };
        let Some(bits) = tool.stamp(node).integer().map(|stamp| stamp.bits()) else {
            return node;
        };
        if let Some(value) = tool.stamp(node).as_constant() {
            return tool.constant(bits, value);
        }

        let (mut x, mut y) = (x, y);
        let (x_constant, y_constant) = (tool.stamp(x).as_constant(), tool.stamp(y).as_constant());
        if let (Some(a), Some(b)) = (x_constant, y_constant) {
            if let Some(value) = self.op.fold_op().evaluate(bits, a, b) {
                return tool.constant(bits, value);
            }
        }

        let swapped = self.op.fold_op().is_commutative() && x_constant.is_some() && y_constant.is_none();
        if swapped {
            std::mem::swap(&mut x, &mut y);
        }

        match (self.op, tool.stamp(y).as_constant()) {
            (BinaryOp::Add | BinaryOp::Sub | BinaryOp::Or | BinaryOp::Xor, Some(0)) => return x,
            (BinaryOp::Mul, Some(1)) | (BinaryOp::And, Some(-1)) => return x,
            (BinaryOp::Mul | BinaryOp::And, Some(0)) => return tool.constant(bits, 0),
            (BinaryOp::Or, Some(-1)) => return tool.constant(bits, -1),
            _ => {}
        }
        if x == y {
            match self.op {
                BinaryOp::Sub | BinaryOp::Xor => return tool.constant(bits, 0),
                BinaryOp::And | BinaryOp::Or => return x,
                _ => {}
            }
        }

        if swapped {
            let builder = NodeBuilder::new(NodeKind::Binary(self.clone()), tool.stamp(node).clone())
                .input(X_SLOT, x)
                .input(Y_SLOT, y);
            return tool.add_or_unique(builder).unwrap_or(node);
        }
        node
    }
}

impl Lowerable for BinaryArithmeticNode {
    fn generate(
        &self,
        node: NodeIndex,
        builder: &mut NodeLirBuilder<'_>,
        lir: &mut dyn LirGeneratorTool,
    ) -> Result<(), LoweringError> {
        let x = builder.input_operand(node, X_SLOT)?;
        let y = builder.input_operand(node, Y_SLOT)?;
        let arithmetic = lir.arithmetic();
        let result = match self.op {
            BinaryOp::Add => arithmetic.emit_add(x, y),
            BinaryOp::Sub => arithmetic.emit_sub(x, y),
            BinaryOp::Mul => arithmetic.emit_mul(x, y),
            BinaryOp::And => arithmetic.emit_and(x, y),
            BinaryOp::Or => arithmetic.emit_or(x, y),
            BinaryOp::Xor => arithmetic.emit_xor(x, y),
        };
        builder.set_result(node, result);
        Ok(())
    }
}
