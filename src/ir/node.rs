use super::{
    NodeIndex,
    edge::{Edge, InputPosition, InputSlot, NodeClass},
    location::LocationIdentity,
    nodes::NodeKind,
    stamp::Stamp,
};

/// A node as stored in the graph arena.
///
/// Inputs and successors are owned by the node; usages and the predecessor
/// are back-references maintained by the graph.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) stamp: Stamp,
    pub(crate) inputs: Vec<InputSlot>,
    pub(crate) successors: Vec<Option<NodeIndex>>,
    pub(crate) usages: Vec<NodeIndex>,
    pub(crate) predecessor: Option<NodeIndex>,
}

impl Node {
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn stamp(&self) -> &Stamp {
        &self.stamp
    }

    pub fn class(&self) -> &'static NodeClass {
        self.kind.node_class()
    }

    pub fn name(&self) -> &'static str {
        self.class().name
    }

    pub fn is_fixed(&self) -> bool {
        self.kind.is_fixed()
    }

    /// The target of a single input slot.
    pub fn input(&self, slot: usize) -> Option<NodeIndex> {
        match self.inputs.get(slot) {
            Some(InputSlot::Single(target)) => *target,
            _ => None,
        }
    }

    /// The entries of a list input slot.
    pub fn input_list(&self, slot: usize) -> &[Option<NodeIndex>] {
        match self.inputs.get(slot) {
            Some(InputSlot::List(targets)) => targets,
            _ => &[],
        }
    }

    pub(crate) fn input_at(&self, position: InputPosition) -> Option<Option<NodeIndex>> {
        match self.inputs.get(position.slot)? {
            InputSlot::Single(target) if position.index == 0 => Some(*target),
            InputSlot::Single(_) => None,
            InputSlot::List(targets) => targets.get(position.index).copied(),
        }
    }

    pub(crate) fn input_at_mut(&mut self, position: InputPosition) -> Option<&mut Option<NodeIndex>> {
        match self.inputs.get_mut(position.slot)? {
            InputSlot::Single(target) if position.index == 0 => Some(target),
            InputSlot::Single(_) => None,
            InputSlot::List(targets) => targets.get_mut(position.index),
        }
    }

    /// Every input edge, absent ones included, in slot order.
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        let class = self.class();
        self.inputs.iter().enumerate().flat_map(move |(slot, storage)| {
            let descriptor = &class.inputs[slot];
            storage
                .targets()
                .enumerate()
                .map(move |(index, target)| Edge {
                    position: InputPosition { slot, index },
                    descriptor,
                    target,
                })
        })
    }

    /// The present inputs, with repetitions.
    pub fn input_nodes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.inputs.iter().flat_map(|slot| slot.targets().flatten())
    }

    pub fn successor(&self, index: usize) -> Option<NodeIndex> {
        self.successors.get(index).copied().flatten()
    }

    pub fn successors(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.successors.iter().copied().flatten()
    }

    pub fn usages(&self) -> &[NodeIndex] {
        &self.usages
    }

    pub fn has_usages(&self) -> bool {
        !self.usages.is_empty()
    }

    pub fn predecessor(&self) -> Option<NodeIndex> {
        self.predecessor
    }

    /// The normal control successor of a fixed node.
    pub fn next(&self) -> Option<NodeIndex> {
        match self.kind.as_with_exception_edge() {
            Some(with_exception) => self.successor(with_exception.next_successor()),
            None => self.successor(0),
        }
    }

    pub fn exception_edge(&self) -> Option<NodeIndex> {
        self.kind
            .as_with_exception_edge()
            .and_then(|with_exception| self.successor(with_exception.exception_successor()))
    }

    pub fn state_after(&self) -> Option<NodeIndex> {
        self.kind
            .as_state_split()
            .and_then(|split| self.input(split.state_after_slot()))
    }

    pub fn state_during(&self) -> Option<NodeIndex> {
        self.kind
            .as_deoptimizing_during()
            .and_then(|deopt| self.input(deopt.state_during_slot()))
    }

    pub fn last_location_access(&self) -> Option<NodeIndex> {
        self.kind
            .as_memory_access()
            .and_then(|access| self.input(access.last_location_access_slot()))
    }

    pub fn location_identity(&self) -> Option<LocationIdentity> {
        self.kind.as_memory_access().map(|access| access.location_identity())
    }

    pub fn killed_location_identity(&self) -> Option<LocationIdentity> {
        self.kind.as_memory_kill().map(|kill| kill.killed_location_identity())
    }
}

/// Collects the kind, stamp and edges of a node before it is added.
///
/// Slots start out absent; the graph checks required slots when the node
/// is added.
#[derive(Debug, Clone)]
pub struct NodeBuilder {
    pub(crate) kind: NodeKind,
    pub(crate) stamp: Stamp,
    pub(crate) inputs: Vec<InputSlot>,
    pub(crate) successors: Vec<Option<NodeIndex>>,
}

impl NodeBuilder {
    pub fn new(kind: NodeKind, stamp: Stamp) -> Self {
        let class = kind.node_class();
        let inputs = class
            .inputs
            .iter()
            .map(|slot| {
                if slot.list {
                    InputSlot::List(Vec::new())
                } else {
                    InputSlot::Single(None)
                }
            })
            .collect();
        Self {
            kind,
            stamp,
            inputs,
            successors: vec![None; class.successors.len()],
        }
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn stamp(&self) -> &Stamp {
        &self.stamp
    }

    pub fn input(self, slot: usize, target: NodeIndex) -> Self {
        self.optional_input(slot, Some(target))
    }

    pub fn optional_input(mut self, slot: usize, target: Option<NodeIndex>) -> Self {
        self.inputs[slot] = InputSlot::Single(target);
        self
    }

    pub fn input_list(
        mut self,
        slot: usize,
        targets: impl IntoIterator<Item = Option<NodeIndex>>,
    ) -> Self {
        self.inputs[slot] = InputSlot::List(targets.into_iter().collect());
        self
    }

    pub fn successor(mut self, index: usize, target: NodeIndex) -> Self {
        self.successors[index] = Some(target);
        self
    }

    pub(crate) fn input_nodes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.inputs.iter().flat_map(|slot| slot.targets().flatten())
    }
}

/// A node that reads or writes memory.
pub trait MemoryAccess {
    fn location_identity(&self) -> LocationIdentity;
    fn last_location_access_slot(&self) -> usize;
}

/// A node that invalidates memory, ordering later accesses after it.
pub trait MemoryKill {
    fn killed_location_identity(&self) -> LocationIdentity {
        LocationIdentity::Any
    }
}

/// A node whose completion is a deoptimization point.
pub trait StateSplit {
    fn state_after_slot(&self) -> usize;
    fn has_side_effect(&self) -> bool;
}

/// A node that can fail after it has partially executed.
pub trait DeoptimizingDuring {
    fn state_during_slot(&self) -> usize;
}

pub trait WithExceptionEdge {
    fn next_successor(&self) -> usize {
        0
    }

    fn exception_successor(&self) -> usize {
        1
    }
}
