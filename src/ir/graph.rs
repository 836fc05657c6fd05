use std::{collections::HashMap, fmt, ops::Index};

use itertools::Itertools;
use tracing::trace;
use typed_generational_arena::StandardArena;

use super::{
    NodeIndex,
    edge::{EdgeKind, InputPosition, SlotDescriptor},
    errors::GraphError,
    fold::{FoldCache, FoldOp},
    node::{Node, NodeBuilder},
    nodes::{ConstantNode, NodeKind, StartNode},
    stamp::{Stamp, wrap},
};

/// The nodes of one compilation unit.
///
/// The arena owns every node; edges are plain indices. Every mutation goes
/// through the graph so that usages and predecessors stay consistent with
/// inputs and successors.
#[derive(Debug, Clone)]
pub struct Graph {
    name: String,
    nodes: StandardArena<Node>,
    start: NodeIndex,
    constants: HashMap<(u32, i64), NodeIndex>,
    fold_cache: FoldCache,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        let mut nodes = StandardArena::new();
        let start = nodes.insert(Self::materialize(NodeBuilder::new(
            NodeKind::Start(StartNode),
            Stamp::Void,
        )));
        Self {
            name: name.into(),
            nodes,
            start,
            constants: HashMap::new(),
            fold_cache: FoldCache::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) -> NodeIndex {
        self.start
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, node: NodeIndex) -> Option<&Node> {
        self.nodes.get(node)
    }

    pub fn is_alive(&self, node: NodeIndex) -> bool {
        self.nodes.contains(node)
    }

    pub fn stamp(&self, node: NodeIndex) -> &Stamp {
        &self.nodes[node].stamp
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &Node)> {
        self.nodes.iter()
    }

    pub fn node_indices(&self) -> Vec<NodeIndex> {
        self.nodes.iter().map(|(index, _)| index).collect()
    }

    pub fn fold_cache(&self) -> &FoldCache {
        &self.fold_cache
    }

    #[cfg(test)]
    pub(crate) fn node_mut(&mut self, node: NodeIndex) -> &mut Node {
        &mut self.nodes[node]
    }

    pub(crate) fn check_alive(&self, node: NodeIndex) -> Result<(), GraphError> {
        if self.nodes.contains(node) {
            Ok(())
        } else {
            Err(GraphError::DeadNode {
                graph: self.name.clone(),
                node,
            })
        }
    }

    fn materialize(builder: NodeBuilder) -> Node {
        Node {
            kind: builder.kind,
            stamp: builder.stamp,
            inputs: builder.inputs,
            successors: builder.successors,
            usages: Vec::new(),
            predecessor: None,
        }
    }

    /// Adds a node with its edges already wired.
    pub fn add(&mut self, builder: NodeBuilder) -> Result<NodeIndex, GraphError> {
        self.validate_builder(&builder)?;
        let id = self.nodes.insert(Self::materialize(builder));

        let inputs: Vec<NodeIndex> = self.nodes[id].input_nodes().collect();
        for input in inputs {
            self.nodes[input].usages.push(id);
        }
        let successors: Vec<NodeIndex> = self.nodes[id].successors().collect();
        for successor in successors {
            self.nodes[successor].predecessor = Some(id);
        }

        trace!(graph = %self.name, node = id.to_idx(), kind = self.nodes[id].name(), "added node");
        Ok(id)
    }

    /// Adds a node unless an equal one already exists, in which case that
    /// one is returned.
    pub fn add_or_unique(&mut self, builder: NodeBuilder) -> Result<NodeIndex, GraphError> {
        if let NodeKind::Constant(constant) = &builder.kind {
            return Ok(self.constant(constant.bits, constant.value));
        }
        if builder.kind.is_value_numberable() {
            if let Some(existing) = self.find_duplicate(&builder) {
                return Ok(existing);
            }
        }
        self.add(builder)
    }

    fn find_duplicate(&self, builder: &NodeBuilder) -> Option<NodeIndex> {
        let first = builder.input_nodes().next()?;
        let candidates = self.nodes.get(first)?.usages.iter().copied().unique();
        candidates
            .filter(|candidate| {
                let node = &self.nodes[*candidate];
                node.kind == builder.kind && node.inputs == builder.inputs
            })
            .min_by_key(|candidate| candidate.to_idx())
    }

    /// The unique constant node for `value`, wrapped to `bits`.
    pub fn constant(&mut self, bits: u32, value: i64) -> NodeIndex {
        let value = wrap(value, bits);
        if let Some(&existing) = self.constants.get(&(bits, value)) {
            if self.nodes.contains(existing) {
                return existing;
            }
        }
        let builder = NodeBuilder::new(
            NodeKind::Constant(ConstantNode { bits, value }),
            Stamp::constant(bits, value),
        );
        let id = self.nodes.insert(Self::materialize(builder));
        self.constants.insert((bits, value), id);
        id
    }

    fn validate_builder(&self, builder: &NodeBuilder) -> Result<(), GraphError> {
        let class = builder.kind.node_class();
        for (descriptor, storage) in class.inputs.iter().zip(&builder.inputs) {
            for target in storage.targets() {
                match target {
                    None if !descriptor.optional => {
                        return Err(GraphError::MissingInput {
                            node: None,
                            kind: class.name,
                            slot: descriptor.name,
                        });
                    }
                    None => {}
                    Some(target) => self.check_edge_target(None, class.name, descriptor, target)?,
                }
            }
        }

        let exception_successor = builder
            .kind
            .as_with_exception_edge()
            .map(|with_exception| with_exception.exception_successor());
        for (index, target) in builder.successors.iter().enumerate() {
            let Some(target) = *target else { continue };
            let Some(node) = self.nodes.get(target) else {
                return Err(GraphError::DanglingSuccessor {
                    node: None,
                    kind: class.name,
                    successor: class.successors[index],
                    target,
                });
            };
            if let Some(predecessor) = node.predecessor {
                return Err(GraphError::SuccessorAlreadyLinked {
                    target,
                    predecessor,
                });
            }
            if exception_successor == Some(index)
                && !matches!(node.kind, NodeKind::ExceptionObject(_))
            {
                return Err(GraphError::BadExceptionEdge {
                    node: None,
                    found: node.name(),
                });
            }
        }
        Ok(())
    }

    fn check_edge_target(
        &self,
        node: Option<NodeIndex>,
        kind: &'static str,
        descriptor: &SlotDescriptor,
        target: NodeIndex,
    ) -> Result<(), GraphError> {
        let Some(target_node) = self.nodes.get(target) else {
            return Err(GraphError::DanglingInput {
                node,
                kind,
                slot: descriptor.name,
                target,
            });
        };
        if !accepts_edge_target(descriptor.kind, target_node) {
            return Err(GraphError::WrongEdgeTarget {
                node,
                kind,
                edge: descriptor.kind,
                slot: descriptor.name,
                found: target_node.name(),
            });
        }
        Ok(())
    }

    fn remove_usage(&mut self, target: NodeIndex, user: NodeIndex) {
        if let Some(node) = self.nodes.get_mut(target) {
            if let Some(position) = node.usages.iter().position(|usage| *usage == user) {
                node.usages.remove(position);
            }
        }
    }

    /// Rewires one input edge, keeping usages consistent.
    pub fn set_input(
        &mut self,
        node: NodeIndex,
        position: InputPosition,
        target: Option<NodeIndex>,
    ) -> Result<(), GraphError> {
        self.check_alive(node)?;
        let class = self.nodes[node].class();
        let invalid = GraphError::InvalidPosition {
            kind: class.name,
            slot: position.slot,
            index: position.index,
        };
        let descriptor = class.inputs.get(position.slot).ok_or_else(|| invalid.clone())?;
        match target {
            None if !descriptor.optional => {
                return Err(GraphError::MissingInput {
                    node: Some(node),
                    kind: class.name,
                    slot: descriptor.name,
                });
            }
            None => {}
            Some(target) => self.check_edge_target(Some(node), class.name, descriptor, target)?,
        }

        let slot = self.nodes[node].input_at_mut(position).ok_or(invalid)?;
        let previous = std::mem::replace(slot, target);
        if let Some(previous) = previous {
            self.remove_usage(previous, node);
        }
        if let Some(target) = target {
            self.nodes[target].usages.push(node);
        }
        Ok(())
    }

    /// Rewires one successor edge, keeping predecessors consistent.
    pub fn set_successor(
        &mut self,
        node: NodeIndex,
        index: usize,
        target: Option<NodeIndex>,
    ) -> Result<(), GraphError> {
        self.check_alive(node)?;
        let class = self.nodes[node].class();
        if index >= self.nodes[node].successors.len() {
            return Err(GraphError::InvalidPosition {
                kind: class.name,
                slot: index,
                index: 0,
            });
        }
        if let Some(target) = target {
            let Some(target_node) = self.nodes.get(target) else {
                return Err(GraphError::DanglingSuccessor {
                    node: Some(node),
                    kind: class.name,
                    successor: class.successors[index],
                    target,
                });
            };
            if let Some(predecessor) = target_node.predecessor {
                return Err(GraphError::SuccessorAlreadyLinked {
                    target,
                    predecessor,
                });
            }
            let is_exception_edge = self.nodes[node]
                .kind
                .as_with_exception_edge()
                .is_some_and(|with_exception| with_exception.exception_successor() == index);
            if is_exception_edge && !matches!(target_node.kind, NodeKind::ExceptionObject(_)) {
                return Err(GraphError::BadExceptionEdge {
                    node: Some(node),
                    found: target_node.name(),
                });
            }
        }

        let previous = std::mem::replace(&mut self.nodes[node].successors[index], target);
        if let Some(previous) = previous {
            if let Some(previous) = self.nodes.get_mut(previous) {
                previous.predecessor = None;
            }
        }
        if let Some(target) = target {
            self.nodes[target].predecessor = Some(node);
        }
        Ok(())
    }

    /// Links `next` as the normal control successor of `node`.
    pub fn set_next(&mut self, node: NodeIndex, next: NodeIndex) -> Result<(), GraphError> {
        self.check_alive(node)?;
        let index = self.nodes[node]
            .kind
            .as_with_exception_edge()
            .map_or(0, |with_exception| with_exception.next_successor());
        self.set_successor(node, index, Some(next))
    }

    fn set_capability_input(
        &mut self,
        node: NodeIndex,
        capability: &'static str,
        slot: Option<usize>,
        target: Option<NodeIndex>,
    ) -> Result<(), GraphError> {
        self.check_alive(node)?;
        let slot = slot.ok_or_else(|| GraphError::MissingCapability {
            node,
            kind: self.nodes[node].name(),
            capability,
        })?;
        self.set_input(node, InputPosition::single(slot), target)
    }

    pub fn set_state_after(
        &mut self,
        node: NodeIndex,
        state: Option<NodeIndex>,
    ) -> Result<(), GraphError> {
        let slot = self
            .get(node)
            .and_then(|n| n.kind.as_state_split())
            .map(|split| split.state_after_slot());
        self.set_capability_input(node, "state split", slot, state)
    }

    pub fn set_state_during(
        &mut self,
        node: NodeIndex,
        state: Option<NodeIndex>,
    ) -> Result<(), GraphError> {
        let slot = self
            .get(node)
            .and_then(|n| n.kind.as_deoptimizing_during())
            .map(|deopt| deopt.state_during_slot());
        self.set_capability_input(node, "deoptimizing node", slot, state)
    }

    pub fn set_last_location_access(
        &mut self,
        node: NodeIndex,
        kill: Option<NodeIndex>,
    ) -> Result<(), GraphError> {
        let slot = self
            .get(node)
            .and_then(|n| n.kind.as_memory_access())
            .map(|access| access.last_location_access_slot());
        self.set_capability_input(node, "memory access", slot, kill)
    }

    /// Redirects every usage of `old` to `new`. Afterwards `old` is unused.
    ///
    /// Edges of `new` itself are left alone so that no cycle is introduced.
    pub fn replace_at_usages(&mut self, old: NodeIndex, new: NodeIndex) -> Result<(), GraphError> {
        if old == new {
            return Ok(());
        }
        self.check_alive(old)?;
        self.check_alive(new)?;

        let users: Vec<NodeIndex> = self.nodes[old].usages.iter().copied().unique().collect();
        let mut rewires = Vec::new();
        for &user in &users {
            if user == new {
                continue;
            }
            let user_node = &self.nodes[user];
            for edge in user_node.edges().filter(|edge| edge.target == Some(old)) {
                self.check_edge_target(Some(user), user_node.name(), edge.descriptor, new)?;
                rewires.push((user, edge.position));
            }
        }

        for (user, position) in rewires {
            if let Some(slot) = self.nodes[user].input_at_mut(position) {
                *slot = Some(new);
            }
            self.remove_usage(old, user);
            self.nodes[new].usages.push(user);
        }
        trace!(graph = %self.name, old = old.to_idx(), new = new.to_idx(), "replaced at usages");
        Ok(())
    }

    /// Deletes an unused node that is not linked into the control flow.
    pub fn delete(&mut self, node: NodeIndex) -> Result<Node, GraphError> {
        self.check_alive(node)?;
        let count = self.nodes[node].usages.len();
        if count > 0 {
            return Err(GraphError::NodeHasUsages { node, count });
        }
        if node == self.start || self.nodes[node].predecessor.is_some() {
            return Err(GraphError::StillLinked { node });
        }

        let removed = self
            .nodes
            .remove(node)
            .ok_or_else(|| GraphError::DeadNode {
                graph: self.name.clone(),
                node,
            })?;
        for input in removed.input_nodes() {
            self.remove_usage(input, node);
        }
        for successor in removed.successors() {
            if let Some(successor) = self.nodes.get_mut(successor) {
                successor.predecessor = None;
            }
        }
        trace!(graph = %self.name, node = node.to_idx(), kind = removed.name(), "deleted node");
        Ok(removed)
    }

    /// Deletes `node` and then every floating input left without usages.
    ///
    /// Returns the surviving former inputs, which callers may want to revisit.
    pub fn delete_with_unused_inputs(
        &mut self,
        node: NodeIndex,
    ) -> Result<Vec<NodeIndex>, GraphError> {
        let mut worklist = vec![node];
        let mut survivors = Vec::new();
        let mut first = true;
        while let Some(current) = worklist.pop() {
            if !self.nodes.contains(current) {
                continue;
            }
            let deletable = first || {
                let n = &self.nodes[current];
                !n.has_usages() && n.kind.is_deletable_when_unused()
            };
            first = false;
            if !deletable {
                survivors.push(current);
                continue;
            }
            let removed = self.delete(current)?;
            worklist.extend(removed.input_nodes().unique());
        }
        Ok(survivors.into_iter().unique().filter(|n| self.nodes.contains(*n)).collect())
    }

    /// Narrows the stamp of `node` by joining it with `stamp`.
    ///
    /// Returns whether the stamp changed. An empty join is ignored.
    pub fn improve_stamp(&mut self, node: NodeIndex, stamp: &Stamp) -> bool {
        let current = &self.nodes[node].stamp;
        let joined = current.join(stamp);
        if joined.is_empty() || &joined == current {
            return false;
        }
        debug_assert!(joined.is_subset_of(current));
        self.nodes[node].stamp = joined;
        true
    }

    /// Folds `op` over the current stamps of `x` and `y`, through the cache.
    pub fn fold(&mut self, op: FoldOp, x: NodeIndex, y: NodeIndex) -> Option<Stamp> {
        self.fold_cache
            .fold(op, &self.nodes[x].stamp, &self.nodes[y].stamp)
    }

    /// Replaces the data of a node with another of the same kind.
    pub(crate) fn update_kind(&mut self, node: NodeIndex, kind: NodeKind) {
        debug_assert!(std::ptr::eq(
            self.nodes[node].kind.node_class(),
            kind.node_class()
        ));
        self.nodes[node].kind = kind;
    }
}

impl Index<NodeIndex> for Graph {
    type Output = Node;

    fn index(&self, index: NodeIndex) -> &Self::Output {
        &self.nodes[index]
    }
}

/// Whether an edge of the given kind may point at `target`.
pub(crate) fn accepts_edge_target(kind: EdgeKind, target: &Node) -> bool {
    let is_frame_state = matches!(target.kind, NodeKind::FrameState(_));
    match kind {
        EdgeKind::State => is_frame_state,
        EdgeKind::Memory => target.kind.as_memory_kill().is_some(),
        EdgeKind::Value | EdgeKind::Association => {
            !is_frame_state && !matches!(target.stamp, Stamp::Void)
        }
    }
}

fn node_name(index: Option<NodeIndex>) -> String {
    match index {
        Some(index) => format!("n{}", index.to_idx()),
        None => "_".to_string(),
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "graph {} {{", self.name)?;
        let mut nodes: Vec<(NodeIndex, &Node)> = self.nodes.iter().collect();
        nodes.sort_by_key(|(index, _)| index.to_idx());
        for (index, node) in nodes {
            write!(f, "  n{} = {}", index.to_idx(), node.kind)?;
            if !matches!(node.stamp, Stamp::Void) {
                write!(f, " : {}", node.stamp)?;
            }
            let inputs = node
                .inputs
                .iter()
                .enumerate()
                .map(|(slot, storage)| {
                    let targets = storage.targets().map(node_name).join(" ");
                    format!("{}=[{targets}]", node.class().inputs[slot].name)
                })
                .join(", ");
            if !inputs.is_empty() {
                write!(f, " ({inputs})")?;
            }
            let successors = node
                .successors
                .iter()
                .enumerate()
                .filter(|(_, target)| target.is_some())
                .map(|(index, target)| format!("{}->{}", node.class().successors[index], node_name(*target)))
                .join(", ");
            if !successors.is_empty() {
                write!(f, " {{{successors}}}")?;
            }
            writeln!(f)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        nodes::{BinaryArithmeticNode, BinaryOp, ParameterNode},
        stamp::{IntegerStamp, Stamp},
    };

    fn parameter(graph: &mut Graph, index: u32) -> NodeIndex {
        graph
            .add(ParameterNode::build(index, Stamp::int(32)))
            .unwrap()
    }

    fn binary(graph: &mut Graph, op: BinaryOp, x: NodeIndex, y: NodeIndex) -> NodeBuilder {
        BinaryArithmeticNode::build(graph, op, x, y).unwrap()
    }

    #[test]
    fn adding_wires_usages() {
        let mut graph = Graph::new("usages");
        let x = parameter(&mut graph, 0);
        let builder = binary(&mut graph, BinaryOp::Add, x, x);
        let add = graph.add(builder).unwrap();
        assert_eq!(graph[x].usages(), &[add, add]);
        assert_eq!(graph[add].input_nodes().collect::<Vec<_>>(), vec![x, x]);
    }

    #[test]
    fn replace_at_usages_moves_every_edge() {
        let mut graph = Graph::new("replace");
        let x = parameter(&mut graph, 0);
        let y = parameter(&mut graph, 1);
        let builder = binary(&mut graph, BinaryOp::Add, x, x);
        let add = graph.add(builder).unwrap();
        graph.replace_at_usages(x, y).unwrap();
        assert!(graph[x].usages().is_empty());
        assert_eq!(graph[y].usages(), &[add, add]);
        assert_eq!(graph[add].input_nodes().collect::<Vec<_>>(), vec![y, y]);
    }

    #[test]
    fn deleted_nodes_stay_dead() {
        let mut graph = Graph::new("delete");
        let x = parameter(&mut graph, 0);
        let one = graph.constant(32, 1);
        let builder = binary(&mut graph, BinaryOp::Add, x, one);
        let add = graph.add(builder).unwrap();
        assert_eq!(
            graph.delete(x).unwrap_err(),
            GraphError::NodeHasUsages { node: x, count: 1 }
        );
        let survivors = graph.delete_with_unused_inputs(add).unwrap();
        assert!(!graph.is_alive(add));
        assert!(!graph.is_alive(one));
        assert_eq!(survivors, vec![x]);
        assert!(graph[x].usages().is_empty());

        let fresh = graph.constant(32, 1);
        assert_ne!(fresh, one);
        assert!(graph.get(one).is_none());
    }

    #[test]
    fn value_numbering_reuses_nodes() {
        let mut graph = Graph::new("gvn");
        let x = parameter(&mut graph, 0);
        let y = parameter(&mut graph, 1);
        let builder = binary(&mut graph, BinaryOp::Mul, x, y);
        let first = graph.add_or_unique(builder).unwrap();
        let builder = binary(&mut graph, BinaryOp::Mul, x, y);
        let second = graph.add_or_unique(builder).unwrap();
        let builder = binary(&mut graph, BinaryOp::Sub, x, y);
        let other = graph.add_or_unique(builder).unwrap();
        assert_eq!(first, second);
        assert_ne!(first, other);
        let seven = graph.constant(32, 7);
        assert_eq!(graph.constant(32, 7), seven);
        assert_ne!(graph.constant(64, 7), seven);
    }

    #[test]
    fn stamps_only_narrow() {
        let mut graph = Graph::new("stamps");
        let x = parameter(&mut graph, 0);
        let narrow = Stamp::Integer(IntegerStamp::range(32, 0, 10));
        assert!(graph.improve_stamp(x, &narrow));
        assert!(!graph.improve_stamp(x, &Stamp::int(32)));
        assert_eq!(graph.stamp(x), &narrow);
        assert!(!graph.improve_stamp(x, &Stamp::constant(32, 20)));
    }

    #[test]
    fn required_inputs_are_checked() {
        let mut graph = Graph::new("missing");
        let builder = NodeBuilder::new(
            NodeKind::Binary(BinaryArithmeticNode { op: BinaryOp::Add }),
            Stamp::int(32),
        );
        assert!(matches!(
            graph.add(builder),
            Err(GraphError::MissingInput { slot: "x", .. })
        ));
    }

    #[test]
    fn successors_keep_one_predecessor() {
        let mut graph = Graph::new("control");
        let start = graph.start();
        let ret = graph
            .add(crate::ir::nodes::ReturnNode::build(None))
            .unwrap();
        graph.set_next(start, ret).unwrap();
        assert_eq!(graph[ret].predecessor(), Some(start));
        assert_eq!(graph[start].next(), Some(ret));
        assert_eq!(
            graph.delete(ret).unwrap_err(),
            GraphError::StillLinked { node: ret }
        );
        let other = graph
            .add(crate::ir::nodes::ReturnNode::build(None))
            .unwrap();
        graph.set_next(start, other).unwrap();
        assert_eq!(graph[ret].predecessor(), None);
        graph.delete(ret).unwrap();
    }
}
