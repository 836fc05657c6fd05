//! Lowering of a canonical graph to backend operations.
//!
//! The lowering walks the fixed-node chain block by block, starting at
//! [`Graph::start`] and continuing at every exception handler it reaches.
//! Floating nodes are lowered on demand, right before the first fixed node
//! that needs them, in post-order. Each lowered node binds its result to an
//! [`Operand`] in the [`NodeLirBuilder`].

use std::collections::{HashMap, HashSet, VecDeque};

use educe::Educe;
use tracing::{debug, instrument};

use crate::platform::PlatformConfiguration;

use super::{
    NodeIndex,
    graph::Graph,
    nodes::{FrameStateNode, NodeKind},
};

mod errors;
mod generator;
mod text;

pub use errors::LoweringError;
pub use generator::{
    ArithmeticLirGenerator, ArrayCopyOperands, DebugState, Label, LirGeneratorTool, Operand,
};
pub use text::TextBackend;

/// A node kind that can emit itself through a backend.
pub trait Lowerable {
    fn generate(
        &self,
        node: NodeIndex,
        builder: &mut NodeLirBuilder<'_>,
        lir: &mut dyn LirGeneratorTool,
    ) -> Result<(), LoweringError>;
}

/// Binds nodes to the operands and labels the backend handed out for them.
#[derive(Educe)]
#[educe(Debug)]
pub struct NodeLirBuilder<'g> {
    #[educe(Debug(ignore))]
    graph: &'g Graph,
    #[educe(Debug(ignore))]
    platform: &'g dyn PlatformConfiguration,
    operands: HashMap<NodeIndex, Operand>,
    labels: HashMap<NodeIndex, Label>,
    lowered: HashSet<NodeIndex>,
}

impl<'g> NodeLirBuilder<'g> {
    pub fn new(graph: &'g Graph, platform: &'g dyn PlatformConfiguration) -> Self {
        Self {
            graph,
            platform,
            operands: HashMap::new(),
            labels: HashMap::new(),
            lowered: HashSet::new(),
        }
    }

    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    pub fn platform(&self) -> &'g dyn PlatformConfiguration {
        self.platform
    }

    pub fn operand(&self, node: NodeIndex) -> Option<Operand> {
        self.operands.get(&node).copied()
    }

    pub fn has_operand(&self, node: NodeIndex) -> bool {
        self.operands.contains_key(&node)
    }

    pub fn set_result(&mut self, node: NodeIndex, operand: Operand) {
        self.operands.insert(node, operand);
    }

    fn slot_name(&self, node: NodeIndex, slot: usize) -> &'static str {
        self.graph[node]
            .class()
            .inputs
            .get(slot)
            .map_or("?", |descriptor| descriptor.name)
    }

    fn operand_of(&self, input: NodeIndex) -> Result<Operand, LoweringError> {
        self.operand(input).ok_or_else(|| LoweringError::MissingOperand {
            node: input,
            kind: self.graph[input].name(),
        })
    }

    /// The operand of a required single input.
    pub fn input_operand(&self, node: NodeIndex, slot: usize) -> Result<Operand, LoweringError> {
        let input = self.graph[node]
            .input(slot)
            .ok_or_else(|| LoweringError::MissingInput {
                node,
                kind: self.graph[node].name(),
                slot: self.slot_name(node, slot),
            })?;
        self.operand_of(input)
    }

    pub fn optional_input_operand(
        &self,
        node: NodeIndex,
        slot: usize,
    ) -> Result<Option<Operand>, LoweringError> {
        self.graph[node]
            .input(slot)
            .map(|input| self.operand_of(input))
            .transpose()
    }

    /// The operands of a list input. Every entry must be present.
    pub fn list_operands(&self, node: NodeIndex, slot: usize) -> Result<Vec<Operand>, LoweringError> {
        self.graph[node]
            .input_list(slot)
            .iter()
            .map(|entry| {
                let input = entry.ok_or_else(|| LoweringError::MissingInput {
                    node,
                    kind: self.graph[node].name(),
                    slot: self.slot_name(node, slot),
                })?;
                self.operand_of(input)
            })
            .collect()
    }

    /// The label of the block starting at `node`.
    pub fn label_for(&mut self, node: NodeIndex) -> Label {
        let next = Label(self.labels.len() as u32);
        *self.labels.entry(node).or_insert(next)
    }

    pub fn labels(&self) -> impl Iterator<Item = (NodeIndex, Label)> + '_ {
        self.labels.iter().map(|(node, label)| (*node, *label))
    }

    /// Translates a frame state, and its outer states, to operands.
    pub fn state_for(&self, state: Option<NodeIndex>) -> Result<Option<DebugState>, LoweringError> {
        let Some(state) = state else {
            return Ok(None);
        };
        let node = &self.graph[state];
        let NodeKind::FrameState(frame_state) = node.kind() else {
            return Err(LoweringError::NotAFrameState { node: state });
        };
        let values = node
            .input_list(FrameStateNode::VALUES_SLOT)
            .iter()
            .map(|value| value.map(|value| self.operand_of(value)).transpose())
            .collect::<Result<Vec<_>, _>>()?;
        let monitors = self.list_operands(state, FrameStateNode::MONITORS_SLOT)?;
        let outer = self
            .state_for(node.input(FrameStateNode::OUTER_SLOT))?
            .map(Box::new);
        Ok(Some(DebugState {
            bci: frame_state.bci,
            values,
            monitors,
            outer,
            rethrow_exception: frame_state.rethrow_exception,
        }))
    }

    fn generate(
        &mut self,
        node: NodeIndex,
        lir: &mut dyn LirGeneratorTool,
    ) -> Result<(), LoweringError> {
        let graph = self.graph;
        let lowerable = graph[node]
            .kind()
            .as_lowerable()
            .ok_or_else(|| LoweringError::NotLowerable {
                node,
                kind: graph[node].name(),
            })?;
        lowerable.generate(node, self, lir)?;
        self.lowered.insert(node);
        Ok(())
    }

    /// Lowers the floating inputs of `node` that have no operand yet.
    ///
    /// Frame states produce no operand themselves; their values are lowered
    /// so that [`Self::state_for`] can translate them.
    fn lower_floating_inputs(
        &mut self,
        node: NodeIndex,
        lir: &mut dyn LirGeneratorTool,
        visiting: &mut HashSet<NodeIndex>,
    ) -> Result<(), LoweringError> {
        let graph = self.graph;
        for input in graph[node].input_nodes() {
            let input_node = &graph[input];
            if input_node.is_fixed() || self.lowered.contains(&input) {
                continue;
            }
            if !visiting.insert(input) {
                return Err(LoweringError::FloatingCycle { node: input });
            }
            self.lower_floating_inputs(input, lir, visiting)?;
            visiting.remove(&input);
            if !matches!(input_node.kind(), NodeKind::FrameState(_)) {
                self.generate(input, lir)?;
            } else {
                self.lowered.insert(input);
            }
        }
        Ok(())
    }
}

/// Lowers every block of `graph` through `lir`.
#[instrument(level = "debug", skip_all, fields(graph = %graph.name()))]
pub fn lower_graph<'g>(
    graph: &'g Graph,
    platform: &'g dyn PlatformConfiguration,
    lir: &mut dyn LirGeneratorTool,
) -> Result<NodeLirBuilder<'g>, LoweringError> {
    let mut builder = NodeLirBuilder::new(graph, platform);
    let mut blocks = VecDeque::from([graph.start()]);
    let mut emitted = HashSet::new();

    while let Some(entry) = blocks.pop_front() {
        if !emitted.insert(entry) {
            continue;
        }
        let label = builder.label_for(entry);
        debug!(block = %label, entry = entry.to_idx(), "lowering block");
        lir.emit_label(label);

        let mut current = Some(entry);
        while let Some(node) = current {
            builder.lower_floating_inputs(node, lir, &mut HashSet::new())?;
            builder.generate(node, lir)?;
            if let Some(handler) = graph[node].exception_edge() {
                blocks.push_back(handler);
            }
            current = graph[node].next();
        }
    }

    debug!(operands = builder.operands.len(), "lowered graph");
    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{
            nodes::{BinaryArithmeticNode, BinaryOp, ParameterNode, ReturnNode},
            stamp::Stamp,
        },
        platform::StaticPlatformConfiguration,
    };

    fn add_return(graph: &mut Graph, result: NodeIndex) {
        let ret = graph.add(ReturnNode::build(Some(result))).unwrap();
        graph.set_next(graph.start(), ret).unwrap();
    }

    #[test]
    fn floating_inputs_are_lowered_in_post_order() {
        let mut graph = Graph::new("lower");
        let x = graph.add(ParameterNode::build(0, Stamp::int(32))).unwrap();
        let y = graph.add(ParameterNode::build(1, Stamp::int(32))).unwrap();
        let builder = BinaryArithmeticNode::build(&mut graph, BinaryOp::Xor, x, y).unwrap();
        let xor = graph.add(builder).unwrap();
        add_return(&mut graph, xor);

        let platform = StaticPlatformConfiguration::default();
        let mut backend = TextBackend::default();
        let builder = lower_graph(&graph, &platform, &mut backend).unwrap();
        assert_eq!(
            backend.lines(),
            [
                "L0:",
                "  v0 = param 0 : i32",
                "  v1 = param 1 : i32",
                "  v2 = xor v0, v1",
                "  return v2",
            ]
        );
        assert_eq!(builder.operand(xor), Some(Operand(2)));
    }

    #[test]
    fn shared_inputs_are_lowered_once() {
        let mut graph = Graph::new("shared");
        let x = graph.add(ParameterNode::build(0, Stamp::int(32))).unwrap();
        let builder = BinaryArithmeticNode::build(&mut graph, BinaryOp::Mul, x, x).unwrap();
        let square = graph.add(builder).unwrap();
        add_return(&mut graph, square);

        let platform = StaticPlatformConfiguration::default();
        let mut backend = TextBackend::default();
        lower_graph(&graph, &platform, &mut backend).unwrap();
        assert_eq!(
            backend.lines(),
            ["L0:", "  v0 = param 0 : i32", "  v1 = mul v0, v0", "  return v1"]
        );
    }

    #[test]
    fn frame_states_translate_to_debug_states() {
        let mut graph = Graph::new("state");
        let x = graph.add(ParameterNode::build(0, Stamp::int(32))).unwrap();
        let outer = graph
            .add(FrameStateNode::new(1).build(vec![Some(x)], vec![], vec![], None))
            .unwrap();
        let state = graph
            .add(FrameStateNode::new(7).build(vec![Some(x), None], vec![Some(x)], vec![], Some(outer)))
            .unwrap();
        graph.set_state_after(graph.start(), Some(state)).unwrap();
        add_return(&mut graph, x);

        let platform = StaticPlatformConfiguration::default();
        let mut backend = TextBackend::default();
        let builder = lower_graph(&graph, &platform, &mut backend).unwrap();
        let debug = builder.state_for(Some(state)).unwrap().unwrap();
        assert_eq!(debug.to_string(), "@7 [v0 - v0] <- @1 [v0]");
        assert_eq!(
            builder.state_for(Some(x)),
            Err(LoweringError::NotAFrameState { node: x })
        );
    }
}
