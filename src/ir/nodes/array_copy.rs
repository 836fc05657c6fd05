use crate::{
    foreign::runtime_calls,
    ir::{
        NodeIndex,
        canonicalizer::{Canonicalizable, CanonicalizerTool},
        edge::{EdgeKind, NodeClass, SlotDescriptor},
        errors::GraphError,
        graph::Graph,
        location::LocationIdentity,
        lowering::{ArrayCopyOperands, LirGeneratorTool, Lowerable, LoweringError, NodeLirBuilder},
        node::{
            DeoptimizingDuring, MemoryAccess, MemoryKill, NodeBuilder, StateSplit,
            WithExceptionEdge,
        },
        stamp::Stamp,
        types::ElementKind,
    },
};

use super::NodeKind;

pub(super) static ARRAY_COPY_CLASS: NodeClass = NodeClass {
    name: "ArrayCopy",
    inputs: &[
        SlotDescriptor::list("args", EdgeKind::Value),
        SlotDescriptor::optional("state_during", EdgeKind::State),
        SlotDescriptor::optional("last_location_access", EdgeKind::Memory),
        SlotDescriptor::optional("state_after", EdgeKind::State),
    ],
    successors: &["next", "exception_edge"],
};

/// Copies `length` elements from `src[src_pos..]` to `dest[dest_pos..]`.
///
/// The copy can fail after part of it has happened, so it carries both a
/// state during (for the exception path) and a state after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayCopyNode {
    /// The element kind, when the copy is provably between arrays of it.
    pub element_kind: Option<ElementKind>,
    pub bci: i32,
}

impl ArrayCopyNode {
    pub const ARGS_SLOT: usize = 0;
    pub const STATE_DURING_SLOT: usize = 1;
    pub const LAST_LOCATION_ACCESS_SLOT: usize = 2;
    pub const STATE_AFTER_SLOT: usize = 3;

    pub const SRC: usize = 0;
    pub const SRC_POS: usize = 1;
    pub const DEST: usize = 2;
    pub const DEST_POS: usize = 3;
    pub const LENGTH: usize = 4;

    /// Prepares a copy. `args` is `[src, src_pos, dest, dest_pos, length]`.
    pub fn build(graph: &Graph, bci: i32, args: [NodeIndex; 5]) -> Result<NodeBuilder, GraphError> {
        for arg in args {
            graph.check_alive(arg)?;
        }
        let node = Self {
            element_kind: select_component_kind(graph, &args),
            bci,
        };
        Ok(NodeBuilder::new(NodeKind::ArrayCopy(node), Stamp::Void)
            .input_list(Self::ARGS_SLOT, args.map(Some)))
    }

    /// The five arguments, if they are all present.
    pub fn args(node: NodeIndex, graph: &Graph) -> Option<[NodeIndex; 5]> {
        let list = graph[node].input_list(Self::ARGS_SLOT);
        if list.len() != 5 {
            return None;
        }
        Some([
            list[Self::SRC]?,
            list[Self::SRC_POS]?,
            list[Self::DEST]?,
            list[Self::DEST_POS]?,
            list[Self::LENGTH]?,
        ])
    }
}

/// The element kind of a copy between `args[SRC]` and `args[DEST]`, if the
/// stamps prove both are arrays of it and the copy is exact.
pub fn select_component_kind(graph: &Graph, args: &[NodeIndex; 5]) -> Option<ElementKind> {
    let src = args[ArrayCopyNode::SRC];
    let dest = args[ArrayCopyNode::DEST];
    let src_stamp = graph.stamp(src).object_stamp()?;
    let dest_stamp = graph.stamp(dest).object_stamp()?;
    let src_component = src_stamp.array_type()?.component_type()?;
    let dest_component = dest_stamp.array_type()?.component_type()?;
    if !dest_component.is_assignable_from(src_component) {
        return None;
    }

    let negative = [ArrayCopyNode::SRC_POS, ArrayCopyNode::DEST_POS, ArrayCopyNode::LENGTH]
        .iter()
        .any(|&arg| graph.stamp(args[arg]).as_constant().is_some_and(|value| value < 0));
    if negative {
        return None;
    }

    let exact = (src_component.element_kind().is_primitive() && src_component == dest_component)
        || src == dest
        || dest_stamp.is_exact();
    exact.then(|| dest_component.element_kind())
}

impl MemoryAccess for ArrayCopyNode {
    fn location_identity(&self) -> LocationIdentity {
        match self.element_kind {
            Some(kind) => LocationIdentity::array_location(kind),
            None => LocationIdentity::Any,
        }
    }

    fn last_location_access_slot(&self) -> usize {
        Self::LAST_LOCATION_ACCESS_SLOT
    }
}

impl MemoryKill for ArrayCopyNode {
    fn killed_location_identity(&self) -> LocationIdentity {
        self.location_identity()
    }
}

impl StateSplit for ArrayCopyNode {
    fn state_after_slot(&self) -> usize {
        Self::STATE_AFTER_SLOT
    }

    fn has_side_effect(&self) -> bool {
        true
    }
}

impl DeoptimizingDuring for ArrayCopyNode {
    fn state_during_slot(&self) -> usize {
        Self::STATE_DURING_SLOT
    }
}

impl WithExceptionEdge for ArrayCopyNode {}

impl Canonicalizable for ArrayCopyNode {
    fn canonical(&self, node: NodeIndex, tool: &mut CanonicalizerTool<'_>) -> NodeIndex {
        if self.element_kind.is_some() {
            return node;
        }
        let Some(args) = Self::args(node, tool.graph()) else {
            return node;
        };
        if let Some(kind) = select_component_kind(tool.graph(), &args) {
            tool.update_kind(
                node,
                NodeKind::ArrayCopy(Self {
                    element_kind: Some(kind),
                    ..self.clone()
                }),
            );
        }
        node
    }
}

impl Lowerable for ArrayCopyNode {
    fn generate(
        &self,
        node: NodeIndex,
        builder: &mut NodeLirBuilder<'_>,
        lir: &mut dyn LirGeneratorTool,
    ) -> Result<(), LoweringError> {
        let graph = builder.graph();
        let args = builder.list_operands(node, Self::ARGS_SLOT)?;
        let [src, src_pos, dest, dest_pos, length] = args[..] else {
            return Err(LoweringError::MissingInput {
                node,
                kind: graph[node].name(),
                slot: "args",
            });
        };
        let state = builder.state_for(graph[node].state_during())?;
        let exception = graph[node]
            .exception_edge()
            .ok_or(LoweringError::MissingSuccessor {
                node,
                kind: graph[node].name(),
                successor: "exception_edge",
            })?;
        let exception = builder.label_for(exception);

        match self.element_kind {
            Some(kind) => {
                let barrier = builder
                    .platform()
                    .barrier_set()
                    .array_copy_barrier_type(kind);
                let operands = ArrayCopyOperands {
                    src,
                    src_pos,
                    dest,
                    dest_pos,
                    length,
                };
                lir.emit_array_copy(kind, &operands, barrier, state.as_ref(), exception);
            }
            None => {
                let descriptor = runtime_calls().generic_array_copy();
                lir.emit_foreign_call(descriptor, &args, state.as_ref(), Some(exception));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        nodes::ParameterNode,
        stamp::ObjectStamp,
        types::TypeRef,
    };

    fn array(component: TypeRef, exact: bool) -> Stamp {
        Stamp::Object(ObjectStamp::for_type(TypeRef::array_of(component), exact, true))
    }

    fn copy_between(src: Stamp, dest: Stamp, length: i64) -> (Graph, NodeIndex) {
        let mut graph = Graph::new("copy");
        let src = graph.add(ParameterNode::build(0, src)).unwrap();
        let dest = graph.add(ParameterNode::build(1, dest)).unwrap();
        let zero = graph.constant(32, 0);
        let length = graph.constant(32, length);
        let builder = ArrayCopyNode::build(&graph, 3, [src, zero, dest, zero, length]).unwrap();
        let node = graph.add(builder).unwrap();
        (graph, node)
    }

    #[test]
    fn matching_primitive_arrays_get_a_specific_location() {
        let ints = TypeRef::Primitive(ElementKind::Int);
        let (graph, node) = copy_between(array(ints.clone(), false), array(ints, false), 4);
        assert_eq!(
            graph[node].location_identity(),
            Some(LocationIdentity::ArrayElements(ElementKind::Int))
        );
        assert_eq!(
            graph[node].killed_location_identity(),
            graph[node].location_identity()
        );
    }

    #[test]
    fn mismatched_primitive_arrays_are_any() {
        let (graph, node) = copy_between(
            array(TypeRef::Primitive(ElementKind::Int), false),
            array(TypeRef::Primitive(ElementKind::Long), false),
            4,
        );
        assert_eq!(graph[node].location_identity(), Some(LocationIdentity::Any));
    }

    #[test]
    fn unknown_types_are_any() {
        let (graph, node) = copy_between(Stamp::object(), Stamp::object(), 4);
        assert_eq!(graph[node].location_identity(), Some(LocationIdentity::Any));
    }

    #[test]
    fn object_arrays_need_an_exact_destination() {
        let shape = TypeRef::class("Shape", &[]);
        let circle = TypeRef::class("Circle", &["Shape"]);
        let (graph, node) = copy_between(array(circle.clone(), false), array(shape.clone(), false), 4);
        assert_eq!(graph[node].location_identity(), Some(LocationIdentity::Any));

        let (graph, node) = copy_between(array(circle, false), array(shape, true), 4);
        assert_eq!(
            graph[node].location_identity(),
            Some(LocationIdentity::ArrayElements(ElementKind::Object))
        );
    }

    #[test]
    fn negative_length_is_not_exact() {
        let ints = TypeRef::Primitive(ElementKind::Int);
        let (graph, node) = copy_between(array(ints.clone(), false), array(ints, false), -1);
        assert_eq!(graph[node].location_identity(), Some(LocationIdentity::Any));
    }

    #[test]
    fn copies_always_have_side_effects() {
        let (graph, node) = copy_between(Stamp::object(), Stamp::object(), 1);
        let split = graph[node].kind().as_state_split().unwrap();
        assert!(split.has_side_effect());
        assert!(graph[node].kind().as_deoptimizing_during().is_some());
        assert!(graph[node].kind().as_with_exception_edge().is_some());
    }

    #[test]
    fn improved_stamps_refine_the_element_kind() {
        let ints = TypeRef::Primitive(ElementKind::Int);
        let (mut graph, node) = copy_between(Stamp::object(), Stamp::object(), 2);
        let [src, _, dest, _, _] = ArrayCopyNode::args(node, &graph).unwrap();
        graph.improve_stamp(src, &array(ints.clone(), false));
        graph.improve_stamp(dest, &array(ints, false));

        let NodeKind::ArrayCopy(copy) = graph[node].kind().clone() else {
            unreachable!();
        };
        let mut tool = CanonicalizerTool::new(&mut graph);
        assert_eq!(copy.canonical(node, &mut tool), node);
        assert_eq!(
            graph[node].location_identity(),
            Some(LocationIdentity::ArrayElements(ElementKind::Int))
        );
    }
}
