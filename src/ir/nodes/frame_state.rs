use crate::ir::{
    NodeIndex,
    edge::{EdgeKind, NodeClass, SlotDescriptor},
    node::{Node, NodeBuilder},
    stamp::Stamp,
};

use super::NodeKind;

pub(super) static FRAME_STATE_CLASS: NodeClass = NodeClass {
    name: "FrameState",
    inputs: &[
        SlotDescriptor::optional_list("values", EdgeKind::Value),
        SlotDescriptor::list("monitors", EdgeKind::Association),
        SlotDescriptor::optional("outer", EdgeKind::State),
    ],
    successors: &[],
};

/// The interpreter state at a bytecode position, used to resume execution
/// after deoptimization.
///
/// `values` holds the locals followed by the expression stack. Absent
/// entries are dead or illegal slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameStateNode {
    pub bci: i32,
    pub locals_size: usize,
    pub stack_size: usize,
    /// The exception on top of the stack must be rethrown on resumption.
    pub rethrow_exception: bool,
    /// The state describes the middle of a call.
    pub during_call: bool,
}

impl FrameStateNode {
    pub const VALUES_SLOT: usize = 0;
    pub const MONITORS_SLOT: usize = 1;
    pub const OUTER_SLOT: usize = 2;

    pub fn new(bci: i32) -> Self {
        Self {
            bci,
            locals_size: 0,
            stack_size: 0,
            rethrow_exception: false,
            during_call: false,
        }
    }

    pub fn build(
        mut self,
        locals: Vec<Option<NodeIndex>>,
        stack: Vec<Option<NodeIndex>>,
        monitors: Vec<NodeIndex>,
        outer: Option<NodeIndex>,
    ) -> NodeBuilder {
        self.locals_size = locals.len();
        self.stack_size = stack.len();
        NodeBuilder::new(NodeKind::FrameState(self), Stamp::Void)
            .input_list(Self::VALUES_SLOT, locals.into_iter().chain(stack))
            .input_list(Self::MONITORS_SLOT, monitors.into_iter().map(Some))
            .optional_input(Self::OUTER_SLOT, outer)
    }

    pub fn locals<'n>(&self, node: &'n Node) -> &'n [Option<NodeIndex>] {
        let values = node.input_list(Self::VALUES_SLOT);
        &values[..self.locals_size.min(values.len())]
    }

    pub fn stack<'n>(&self, node: &'n Node) -> &'n [Option<NodeIndex>] {
        let values = node.input_list(Self::VALUES_SLOT);
        &values[self.locals_size.min(values.len())..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{errors::GraphError, graph::Graph, nodes::ParameterNode};

    #[test]
    fn values_split_into_locals_and_stack() {
        let mut graph = Graph::new("state");
        let x = graph.add(ParameterNode::build(0, Stamp::int(32))).unwrap();
        let state = graph
            .add(FrameStateNode::new(7).build(vec![Some(x), None], vec![Some(x)], vec![], None))
            .unwrap();
        let NodeKind::FrameState(frame) = graph[state].kind() else {
            panic!("not a frame state");
        };
        assert_eq!(frame.locals(&graph[state]), &[Some(x), None]);
        assert_eq!(frame.stack(&graph[state]), &[Some(x)]);
        assert_eq!(graph[x].usages(), &[state, state]);
    }

    #[test]
    fn outer_must_be_a_frame_state() {
        let mut graph = Graph::new("state");
        let x = graph.add(ParameterNode::build(0, Stamp::int(32))).unwrap();
        let result = graph.add(FrameStateNode::new(1).build(vec![], vec![], vec![], Some(x)));
        assert!(matches!(
            result,
            Err(GraphError::WrongEdgeTarget { slot: "outer", found: "Parameter", .. })
        ));
    }
}
