use crate::{
    ir::{
        NodeIndex,
        edge::{EdgeKind, NodeClass, SlotDescriptor},
        errors::GraphError,
        graph::Graph,
        location::LocationIdentity,
        lowering::{LirGeneratorTool, Lowerable, LoweringError, NodeLirBuilder},
        node::{MemoryAccess, MemoryKill, NodeBuilder, StateSplit},
        stamp::Stamp,
    },
    platform::{BarrierType, PlatformConfiguration},
};

use super::NodeKind;

pub(super) static WRITE_CLASS: NodeClass = NodeClass {
    name: "Write",
    inputs: &[
        SlotDescriptor::input("object", EdgeKind::Value),
        SlotDescriptor::input("offset", EdgeKind::Value),
        SlotDescriptor::input("value", EdgeKind::Value),
        SlotDescriptor::optional("last_location_access", EdgeKind::Memory),
        SlotDescriptor::optional("state_after", EdgeKind::State),
    ],
    successors: &["next"],
};

/// Stores `value` at `object + offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteNode {
    pub location: LocationIdentity,
    /// Chosen by the platform's barrier set when the node is built.
    pub barrier: BarrierType,
}

impl WriteNode {
    pub const OBJECT_SLOT: usize = 0;
    pub const OFFSET_SLOT: usize = 1;
    pub const VALUE_SLOT: usize = 2;
    pub const LAST_LOCATION_ACCESS_SLOT: usize = 3;
    pub const STATE_AFTER_SLOT: usize = 4;

    pub fn build(
        graph: &Graph,
        platform: &dyn PlatformConfiguration,
        object: NodeIndex,
        offset: NodeIndex,
        value: NodeIndex,
        location: LocationIdentity,
    ) -> Result<NodeBuilder, GraphError> {
        for input in [object, offset, value] {
            graph.check_alive(input)?;
        }
        let barrier = platform
            .barrier_set()
            .write_barrier_type(&location, graph.stamp(value));
        Ok(
            NodeBuilder::new(NodeKind::Write(Self { location, barrier }), Stamp::Void)
                .input(Self::OBJECT_SLOT, object)
                .input(Self::OFFSET_SLOT, offset)
                .input(Self::VALUE_SLOT, value),
        )
    }
}

impl MemoryAccess for WriteNode {
    fn location_identity(&self) -> LocationIdentity {
        self.location.clone()
    }

    fn last_location_access_slot(&self) -> usize {
        Self::LAST_LOCATION_ACCESS_SLOT
    }
}

impl MemoryKill for WriteNode {
    fn killed_location_identity(&self) -> LocationIdentity {
        self.location.clone()
    }
}

impl StateSplit for WriteNode {
    fn state_after_slot(&self) -> usize {
        Self::STATE_AFTER_SLOT
    }

    fn has_side_effect(&self) -> bool {
        true
    }
}

impl Lowerable for WriteNode {
    fn generate(
        &self,
        node: NodeIndex,
        builder: &mut NodeLirBuilder<'_>,
        lir: &mut dyn LirGeneratorTool,
    ) -> Result<(), LoweringError> {
        let object = builder.input_operand(node, Self::OBJECT_SLOT)?;
        let offset = builder.input_operand(node, Self::OFFSET_SLOT)?;
        let value = builder.input_operand(node, Self::VALUE_SLOT)?;
        let state = builder.state_for(builder.graph()[node].state_after())?;
        lir.emit_store(object, offset, value, &self.location, self.barrier, state.as_ref());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{nodes::ParameterNode, stamp::ObjectStamp, types::ElementKind},
        platform::{BarrierSetKind, StaticPlatformConfiguration},
    };
    use test_case::test_case;

    #[test_case(BarrierSetKind::None, false, BarrierType::None ; "no barriers")]
    #[test_case(BarrierSetKind::CardTable, false, BarrierType::Field ; "card table object")]
    #[test_case(BarrierSetKind::CardTable, true, BarrierType::None ; "card table null")]
    #[test_case(BarrierSetKind::G1, true, BarrierType::Field ; "g1 null")]
    fn barrier_comes_from_the_platform(kind: BarrierSetKind, null: bool, expected: BarrierType) {
        let platform = StaticPlatformConfiguration::new(kind.build(), true);
        let mut graph = Graph::new("write");
        let object = graph.add(ParameterNode::build(0, Stamp::object())).unwrap();
        let value_stamp = if null {
            Stamp::Object(ObjectStamp::null())
        } else {
            Stamp::object()
        };
        let value = graph.add(ParameterNode::build(1, value_stamp)).unwrap();
        let offset = graph.constant(64, 16);
        let builder = WriteNode::build(
            &graph,
            &platform,
            object,
            offset,
            value,
            LocationIdentity::field("next"),
        )
        .unwrap();
        let NodeKind::Write(write) = builder.kind() else {
            unreachable!();
        };
        assert_eq!(write.barrier, expected);
    }

    #[test]
    fn primitive_stores_need_no_barrier() {
        let platform = StaticPlatformConfiguration::new(BarrierSetKind::G1.build(), true);
        let mut graph = Graph::new("write");
        let object = graph.add(ParameterNode::build(0, Stamp::object())).unwrap();
        let value = graph.add(ParameterNode::build(1, Stamp::int(32))).unwrap();
        let offset = graph.constant(64, 16);
        let location = LocationIdentity::array_location(ElementKind::Int);
        let builder = WriteNode::build(&graph, &platform, object, offset, value, location.clone()).unwrap();
        let node = graph.add(builder).unwrap();
        assert_eq!(graph[node].location_identity(), Some(location.clone()));
        assert_eq!(graph[node].killed_location_identity(), Some(location));
        assert!(matches!(
            graph[node].kind(),
            NodeKind::Write(WriteNode { barrier: BarrierType::None, .. })
        ));
    }
}
