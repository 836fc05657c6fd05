//! Worklist-driven local rewriting.
//!
//! Every node gets its stamp improved from its inputs and is then asked for
//! a simpler equivalent, first through its own rule and then through the
//! registered [`RewriteRule`]s. Replacements are substituted at all usages
//! and dead floating nodes are removed. The process repeats until a full
//! sweep over the graph changes nothing, within the configured bounds.

use std::{
    collections::{HashSet, VecDeque},
    fmt,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, instrument};

use super::{
    NodeIndex,
    errors::GraphError,
    fold::FoldOp,
    graph::Graph,
    node::{Node, NodeBuilder},
    nodes::{NodeKind, X_SLOT, Y_SLOT},
    stamp::Stamp,
};

/// A node kind's own simplification rule.
pub trait Canonicalizable {
    /// Returns `node` itself, or an equivalent node to use instead.
    ///
    /// This never fails: a case that is not handled returns `node`.
    /// Applying it again to the returned node must return that node.
    fn canonical(&self, node: NodeIndex, tool: &mut CanonicalizerTool<'_>) -> NodeIndex;
}

/// An extra rewrite applied after the node's own rule.
pub trait RewriteRule: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, node: NodeIndex, tool: &mut CanonicalizerTool<'_>) -> NodeIndex;
}

/// The view of the graph handed to rewrite rules.
pub struct CanonicalizerTool<'g> {
    graph: &'g mut Graph,
    updated: bool,
}

impl<'g> CanonicalizerTool<'g> {
    pub fn new(graph: &'g mut Graph) -> Self {
        Self {
            graph,
            updated: false,
        }
    }

    pub fn graph(&self) -> &Graph {
        &*self.graph
    }

    pub fn node(&self, node: NodeIndex) -> &Node {
        &self.graph[node]
    }

    pub fn stamp(&self, node: NodeIndex) -> &Stamp {
        self.graph.stamp(node)
    }

    pub fn constant(&mut self, bits: u32, value: i64) -> NodeIndex {
        self.graph.constant(bits, value)
    }

    pub fn fold(&mut self, op: FoldOp, x: NodeIndex, y: NodeIndex) -> Option<Stamp> {
        self.graph.fold(op, x, y)
    }

    /// Adds a node through value numbering. A builder the graph rejects
    /// yields `None`, which rules treat as "no rewrite".
    pub fn add_or_unique(&mut self, builder: NodeBuilder) -> Option<NodeIndex> {
        match self.graph.add_or_unique(builder) {
            Ok(node) => Some(node),
            Err(error) => {
                debug!(%error, "rewrite discarded");
                None
            }
        }
    }

    /// Refines the data of `node` in place, keeping its kind and edges.
    pub fn update_kind(&mut self, node: NodeIndex, kind: NodeKind) {
        if self.graph[node].kind() != &kind {
            self.graph.update_kind(node, kind);
            self.updated = true;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanonicalizerConfig {
    /// How many replacements a single node may go through in one visit.
    pub max_node_iterations: usize,
    /// How many full rounds over the graph may run before giving up.
    pub max_global_iterations: usize,
}

impl Default for CanonicalizerConfig {
    fn default() -> Self {
        Self {
            max_node_iterations: 32,
            max_global_iterations: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationScope {
    Node,
    Global,
}

impl fmt::Display for IterationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IterationScope::Node => write!(f, "per-node"),
            IterationScope::Global => write!(f, "global"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CanonicalizationError {
    #[error("canonicalization of {graph:?} exceeded the {scope} limit of {limit} iterations")]
    IterationLimitExceeded {
        graph: String,
        scope: IterationScope,
        limit: usize,
        node: Option<NodeIndex>,
    },
    #[error(transparent)]
    Graph(#[from] GraphError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalizationStats {
    pub rounds: usize,
    pub replacements: usize,
    pub deletions: usize,
    pub stamp_improvements: usize,
    pub updates: usize,
}

#[derive(Debug, Default)]
struct Worklist {
    queue: VecDeque<NodeIndex>,
    queued: HashSet<NodeIndex>,
}

impl Worklist {
    fn push(&mut self, node: NodeIndex) {
        if self.queued.insert(node) {
            self.queue.push_back(node);
        }
    }

    fn pop(&mut self) -> Option<NodeIndex> {
        let node = self.queue.pop_front()?;
        self.queued.remove(&node);
        Some(node)
    }
}

impl Extend<NodeIndex> for Worklist {
    fn extend<T: IntoIterator<Item = NodeIndex>>(&mut self, iter: T) {
        for node in iter {
            self.push(node);
        }
    }
}

#[derive(Default)]
pub struct Canonicalizer {
    config: CanonicalizerConfig,
    rules: Vec<Box<dyn RewriteRule>>,
}

impl Canonicalizer {
    pub fn new(config: CanonicalizerConfig) -> Self {
        Self {
            config,
            rules: Vec::new(),
        }
    }

    /// Registers an extra rule. Rules run in registration order.
    pub fn with_rule(mut self, rule: impl RewriteRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn config(&self) -> &CanonicalizerConfig {
        &self.config
    }

    #[instrument(level = "debug", skip_all, fields(graph = graph.name()))]
    pub fn apply(&self, graph: &mut Graph) -> Result<CanonicalizationStats, CanonicalizationError> {
        let mut stats = CanonicalizationStats::default();

        loop {
            if stats.rounds >= self.config.max_global_iterations {
                error!(
                    graph = graph.name(),
                    limit = self.config.max_global_iterations,
                    "canonicalization did not reach a fixed point"
                );
                return Err(CanonicalizationError::IterationLimitExceeded {
                    graph: graph.name().to_string(),
                    scope: IterationScope::Global,
                    limit: self.config.max_global_iterations,
                    node: None,
                });
            }
            stats.rounds += 1;

            let mut worklist = Worklist::default();
            worklist.extend(ordered_nodes(graph));
            while let Some(node) = worklist.pop() {
                self.process(graph, node, &mut worklist, &mut stats)?;
            }

            // Every node must now be its own canonical form.
            let mut changed = false;
            let mut scratch = Worklist::default();
            for node in ordered_nodes(graph) {
                changed |= self.process(graph, node, &mut scratch, &mut stats)?;
            }
            if !changed {
                debug!(?stats, "canonicalization converged");
                return Ok(stats);
            }
        }
    }

    /// Visits one node. Returns whether the graph changed.
    fn process(
        &self,
        graph: &mut Graph,
        node: NodeIndex,
        worklist: &mut Worklist,
        stats: &mut CanonicalizationStats,
    ) -> Result<bool, CanonicalizationError> {
        if !graph.is_alive(node) {
            return Ok(false);
        }

        if !graph[node].has_usages() && graph[node].kind().is_deletable_when_unused() {
            let before = graph.len();
            let survivors = graph.delete_with_unused_inputs(node)?;
            stats.deletions += before - graph.len();
            worklist.extend(survivors);
            return Ok(true);
        }

        let mut changed = false;
        if self.improve_stamp(graph, node) {
            stats.stamp_improvements += 1;
            worklist.extend(graph[node].usages().to_vec());
            changed = true;
        }

        let mut current = node;
        let mut replacements = 0;
        loop {
            let (replacement, updated) = self.rewrite(graph, current);
            if updated {
                stats.updates += 1;
                worklist.extend(graph[current].usages().to_vec());
                changed = true;
            }
            if replacement == current {
                break;
            }

            replacements += 1;
            if replacements > self.config.max_node_iterations {
                error!(
                    graph = graph.name(),
                    node = node.to_idx(),
                    limit = self.config.max_node_iterations,
                    "node rewriting did not reach a fixed point"
                );
                return Err(CanonicalizationError::IterationLimitExceeded {
                    graph: graph.name().to_string(),
                    scope: IterationScope::Node,
                    limit: self.config.max_node_iterations,
                    node: Some(node),
                });
            }

            self.substitute(graph, current, replacement, worklist, stats)?;
            changed = true;
            current = replacement;
        }
        Ok(changed)
    }

    fn improve_stamp(&self, graph: &mut Graph, node: NodeIndex) -> bool {
        let Some(op) = graph[node].kind().as_binary().map(|binary| binary.fold_op()) else {
            return false;
        };
        let (Some(x), Some(y)) = (graph[node].input(X_SLOT), graph[node].input(Y_SLOT)) else {
            return false;
        };
        match graph.fold(op, x, y) {
            Some(stamp) => graph.improve_stamp(node, &stamp),
            None => false,
        }
    }

    /// Runs the node's own rule, then the extra rules; the first one that
    /// returns a different node wins.
    fn rewrite(&self, graph: &mut Graph, node: NodeIndex) -> (NodeIndex, bool) {
        let kind = graph[node].kind().clone();
        let mut tool = CanonicalizerTool::new(graph);

        let mut replacement = node;
        if let Some(canonicalizable) = kind.as_canonicalizable() {
            replacement = canonicalizable.canonical(node, &mut tool);
        }
        if replacement == node {
            for rule in &self.rules {
                replacement = rule.apply(node, &mut tool);
                if replacement != node {
                    debug!(rule = rule.name(), node = node.to_idx(), "extra rule applied");
                    break;
                }
            }
        }
        (replacement, tool.updated)
    }

    fn substitute(
        &self,
        graph: &mut Graph,
        old: NodeIndex,
        new: NodeIndex,
        worklist: &mut Worklist,
        stats: &mut CanonicalizationStats,
    ) -> Result<(), CanonicalizationError> {
        debug_assert!(
            graph.stamp(new).is_subset_of(graph.stamp(old)),
            "replacing {} with {} widens {} to {}",
            graph[old].kind(),
            graph[new].kind(),
            graph.stamp(old),
            graph.stamp(new),
        );
        debug!(
            old = old.to_idx(),
            new = new.to_idx(),
            kind = %graph[new].kind(),
            "replacing node"
        );

        let users = graph[old].usages().to_vec();
        graph.replace_at_usages(old, new)?;
        stats.replacements += 1;
        worklist.extend(users);
        worklist.push(new);

        if !graph[old].has_usages() && !graph[old].is_fixed() {
            let before = graph.len();
            let survivors = graph.delete_with_unused_inputs(old)?;
            stats.deletions += before - graph.len();
            worklist.extend(survivors);
        }
        Ok(())
    }
}

fn ordered_nodes(graph: &Graph) -> Vec<NodeIndex> {
    let mut nodes = graph.node_indices();
    nodes.sort_by_key(|node| node.to_idx());
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::nodes::{BinaryArithmeticNode, BinaryOp, ParameterNode, ReturnNode};

    /// Swaps the operands of every addition, forever.
    struct SwapAdditions;

    impl RewriteRule for SwapAdditions {
        fn name(&self) -> &str {
            "swap-additions"
        }

        fn apply(&self, node: NodeIndex, tool: &mut CanonicalizerTool<'_>) -> NodeIndex {
            let NodeKind::Binary(binary) = tool.node(node).kind().clone() else {
                return node;
            };
            let (Some(x), Some(y)) = (tool.node(node).input(X_SLOT), tool.node(node).input(Y_SLOT))
            else {
                return node;
            };
            let builder = NodeBuilder::new(NodeKind::Binary(binary), tool.stamp(node).clone())
                .input(X_SLOT, y)
                .input(Y_SLOT, x);
            tool.graph.add(builder).unwrap_or(node)
        }
    }

    /// Turns every `or` into `xor` and back, in place.
    struct FlipOrXor;

    impl RewriteRule for FlipOrXor {
        fn name(&self) -> &str {
            "flip-or-xor"
        }

        fn apply(&self, node: NodeIndex, tool: &mut CanonicalizerTool<'_>) -> NodeIndex {
            let op = match tool.node(node).kind() {
                NodeKind::Binary(BinaryArithmeticNode { op: BinaryOp::Or }) => BinaryOp::Xor,
                NodeKind::Binary(BinaryArithmeticNode { op: BinaryOp::Xor }) => BinaryOp::Or,
                _ => return node,
            };
            tool.update_kind(node, NodeKind::Binary(BinaryArithmeticNode { op }));
            node
        }
    }

    fn returning(graph: &mut Graph, value: NodeIndex) -> NodeIndex {
        let ret = graph.add(ReturnNode::build(Some(value))).unwrap();
        graph.set_next(graph.start(), ret).unwrap();
        ret
    }

    #[test]
    fn non_converging_rules_hit_the_bound() {
        let mut graph = Graph::new("diverge");
        let x = graph.add(ParameterNode::build(0, Stamp::int(32))).unwrap();
        let y = graph.add(ParameterNode::build(1, Stamp::int(32))).unwrap();
        let builder = BinaryArithmeticNode::build(&mut graph, BinaryOp::Add, x, y).unwrap();
        let add = graph.add(builder).unwrap();
        returning(&mut graph, add);

        let canonicalizer = Canonicalizer::new(CanonicalizerConfig {
            max_node_iterations: 4,
            max_global_iterations: 2,
        })
        .with_rule(SwapAdditions);
        let error = canonicalizer.apply(&mut graph).unwrap_err();
        assert!(
            matches!(
                &error,
                CanonicalizationError::IterationLimitExceeded {
                    scope: IterationScope::Node,
                    limit: 4,
                    ..
                }
            ),
            "{:#?}",
            error
        );
    }

    #[test]
    fn rounds_that_keep_changing_hit_the_global_bound() {
        let mut graph = Graph::new("flip");
        let x = graph.add(ParameterNode::build(0, Stamp::int(32))).unwrap();
        let y = graph.add(ParameterNode::build(1, Stamp::int(32))).unwrap();
        let builder = BinaryArithmeticNode::build(&mut graph, BinaryOp::Or, x, y).unwrap();
        let or = graph.add(builder).unwrap();
        returning(&mut graph, or);

        let canonicalizer = Canonicalizer::new(CanonicalizerConfig {
            max_node_iterations: 4,
            max_global_iterations: 3,
        })
        .with_rule(FlipOrXor);
        let error = canonicalizer.apply(&mut graph).unwrap_err();
        assert!(
            matches!(
                &error,
                CanonicalizationError::IterationLimitExceeded {
                    scope: IterationScope::Global,
                    limit: 3,
                    node: None,
                    ..
                }
            ),
            "{:#?}",
            error
        );
        // Each round flips the node twice, so it is back where it started.
        assert!(matches!(
            graph[or].kind(),
            NodeKind::Binary(BinaryArithmeticNode { op: BinaryOp::Or })
        ));
    }

    #[test]
    fn dead_floating_nodes_are_removed() {
        let mut graph = Graph::new("dce");
        let x = graph.add(ParameterNode::build(0, Stamp::int(32))).unwrap();
        let builder = BinaryArithmeticNode::build(&mut graph, BinaryOp::Mul, x, x).unwrap();
        let unused = graph.add(builder).unwrap();
        returning(&mut graph, x);

        let stats = Canonicalizer::default().apply(&mut graph).unwrap();
        assert!(!graph.is_alive(unused));
        assert!(graph.is_alive(x));
        assert_eq!(stats.deletions, 1);
        assert_eq!(stats.rounds, 1);
    }
}
