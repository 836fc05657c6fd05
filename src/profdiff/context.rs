use std::fmt;

use super::{
    inlining::{InliningPath, InliningTree, InliningTreeNode, PathElement},
    optimization::{Optimization, OptimizationTree},
};

pub const DUPLICATE_PATH_WARNING: &str =
    "Warning: Optimizations cannot be unambiguously attributed (duplicate path)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextNodeKind {
    /// The synthetic root above the root method.
    Root,
    Inlining {
        method: String,
        bci: i32,
        positive: bool,
        is_abstract: bool,
    },
    Optimization(Optimization),
    /// The parent's path from the root also leads to another inlining node.
    DuplicatePath,
}

impl ContextNodeKind {
    fn sort_rank(&self) -> u8 {
        match self {
            ContextNodeKind::DuplicatePath => 0,
            ContextNodeKind::Optimization(_) => 1,
            ContextNodeKind::Inlining { .. } | ContextNodeKind::Root => 2,
        }
    }

    fn bci(&self) -> i32 {
        match self {
            ContextNodeKind::Inlining { bci, .. } => *bci,
            ContextNodeKind::Optimization(optimization) => optimization.bci(),
            ContextNodeKind::Root | ContextNodeKind::DuplicatePath => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizationContextTreeNode {
    pub kind: ContextNodeKind,
    pub children: Vec<OptimizationContextTreeNode>,
}

impl OptimizationContextTreeNode {
    fn new(kind: ContextNodeKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
        }
    }

    pub fn is_duplicate_path_warning(&self) -> bool {
        matches!(self.kind, ContextNodeKind::DuplicatePath)
    }

    pub fn has_duplicate_path_warning(&self) -> bool {
        self.children.iter().any(Self::is_duplicate_path_warning)
    }

    /// Duplicate-path warnings in this whole subtree.
    pub fn count_duplicate_path_warnings(&self) -> usize {
        self.children
            .iter()
            .map(|child| usize::from(child.is_duplicate_path_warning()) + child.count_duplicate_path_warnings())
            .sum()
    }

    /// The inlining children, in order.
    pub fn inlining_children(&self) -> impl Iterator<Item = &OptimizationContextTreeNode> {
        self.children
            .iter()
            .filter(|child| matches!(child.kind, ContextNodeKind::Inlining { .. }))
    }

    pub fn optimizations(&self) -> impl Iterator<Item = &Optimization> {
        self.children.iter().filter_map(|child| match &child.kind {
            ContextNodeKind::Optimization(optimization) => Some(optimization),
            _ => None,
        })
    }

    fn inlining_element(&self) -> Option<(PathElement, bool)> {
        match &self.kind {
            ContextNodeKind::Inlining {
                method,
                bci,
                is_abstract,
                ..
            } => Some((PathElement::new(method.clone(), *bci), *is_abstract)),
            _ => None,
        }
    }

    fn child_at(&mut self, trail: &[usize]) -> &mut OptimizationContextTreeNode {
        let mut node = self;
        for &index in trail {
            node = &mut node.children[index];
        }
        node
    }

    fn sort_recursively(&mut self) {
        self.children
            .sort_by_key(|child| (child.kind.sort_rank(), child.kind.bci()));
        for child in &mut self.children {
            child.sort_recursively();
        }
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "    ".repeat(depth);
        match &self.kind {
            ContextNodeKind::Root => {}
            ContextNodeKind::Inlining {
                method,
                bci,
                positive,
                is_abstract,
            } => {
                write!(f, "{indent}{method} at bci {bci}")?;
                if *is_abstract {
                    write!(f, " (abstract)")?;
                } else if !positive {
                    write!(f, " (not inlined)")?;
                }
                writeln!(f)?;
            }
            ContextNodeKind::Optimization(optimization) => writeln!(f, "{indent}{optimization}")?,
            ContextNodeKind::DuplicatePath => writeln!(f, "{indent}{DUPLICATE_PATH_WARNING}")?,
        }
        let depth = if matches!(self.kind, ContextNodeKind::Root) {
            depth
        } else {
            depth + 1
        };
        for child in &self.children {
            child.write_indented(f, depth)?;
        }
        Ok(())
    }
}

/// An inlining tree with every optimization placed under the method it
/// happened in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizationContextTree {
    root: OptimizationContextTreeNode,
}

impl OptimizationContextTree {
    pub fn root(&self) -> &OptimizationContextTreeNode {
        &self.root
    }

    /// Combines the two trees.
    ///
    /// Inlined nodes whose path from the root also reaches another node get a
    /// duplicate-path warning. Each optimization goes under the last node on
    /// its enclosing-method path, and children are finally ordered as
    /// warnings, optimizations, then inlining nodes, each by bci.
    pub fn create_from(inlining_tree: &InliningTree, optimization_tree: &OptimizationTree) -> Self {
        let mut root = OptimizationContextTreeNode::new(ContextNodeKind::Root);
        root.children.push(clone_inlining_node(
            inlining_tree,
            &inlining_tree.root,
            &mut Vec::new(),
        ));
        let mut tree = Self { root };
        for optimization in optimization_tree.optimizations() {
            tree.insert_optimization(optimization);
        }
        tree.root.sort_recursively();
        tree
    }

    fn insert_optimization(&mut self, optimization: &Optimization) {
        let path = optimization.enclosing_method_path();
        let mut trail = Vec::new();
        if !find_complete(&self.root, path.elements(), &mut trail) {
            trail.clear();
            find_first_prefix(&self.root, path.elements(), &mut trail);
        }
        let target = self.last_concrete_prefix(&trail);
        self.root
            .child_at(&trail[..target])
            .children
            .push(OptimizationContextTreeNode::new(ContextNodeKind::Optimization(
                optimization.clone(),
            )));
    }

    /// The length of the trail prefix that ends at its last non-abstract node.
    fn last_concrete_prefix(&self, trail: &[usize]) -> usize {
        let mut node = &self.root;
        let mut length = 0;
        for (depth, &index) in trail.iter().enumerate() {
            node = &node.children[index];
            if node.inlining_element().is_some_and(|(_, is_abstract)| !is_abstract) {
                length = depth + 1;
            }
        }
        length
    }
}

fn clone_inlining_node(
    tree: &InliningTree,
    node: &InliningTreeNode,
    path: &mut Vec<PathElement>,
) -> OptimizationContextTreeNode {
    let mut clone = OptimizationContextTreeNode::new(ContextNodeKind::Inlining {
        method: node.method.clone(),
        bci: node.bci,
        positive: node.positive,
        is_abstract: node.is_abstract,
    });
    if !node.is_abstract {
        path.push(node.path_element());
    }
    if node.positive
        && !node.is_abstract
        && tree.find_nodes_at(&InliningPath(path.clone())).len() > 1
    {
        clone
            .children
            .push(OptimizationContextTreeNode::new(ContextNodeKind::DuplicatePath));
    }
    for child in &node.children {
        clone.children.push(clone_inlining_node(tree, child, path));
    }
    if !node.is_abstract {
        path.pop();
    }
    clone
}

/// Follows `path` with backtracking. On success `trail` holds the child
/// indices of the match.
fn find_complete(node: &OptimizationContextTreeNode, path: &[PathElement], trail: &mut Vec<usize>) -> bool {
    let Some((first, rest)) = path.split_first() else {
        return true;
    };
    for (index, child) in node.children.iter().enumerate() {
        let Some((element, is_abstract)) = child.inlining_element() else {
            continue;
        };
        trail.push(index);
        let found = if is_abstract {
            find_complete(child, path, trail)
        } else {
            first.matches(&element) && find_complete(child, rest, trail)
        };
        if found {
            return true;
        }
        trail.pop();
    }
    false
}

/// Follows the first matching child at every level as far as it goes.
fn find_first_prefix(node: &OptimizationContextTreeNode, path: &[PathElement], trail: &mut Vec<usize>) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    for (index, child) in node.children.iter().enumerate() {
        let Some((element, is_abstract)) = child.inlining_element() else {
            continue;
        };
        if is_abstract {
            trail.push(index);
            find_first_prefix(child, path, trail);
            return;
        }
        if first.matches(&element) {
            trail.push(index);
            find_first_prefix(child, rest, trail);
            return;
        }
    }
}

impl fmt::Display for OptimizationContextTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimization-context tree")?;
        self.root.write_indented(f, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profdiff::{
        inlining::UNKNOWN_BCI,
        optimization::{OptimizationPhase, Position},
    };

    fn optimization(event: &str, position: &[(&str, i32)]) -> Optimization {
        Optimization::new(
            "SomeOptimization",
            event,
            position
                .iter()
                .map(|(method, bci)| Position::new(*method, *bci))
                .collect(),
        )
    }

    fn optimizations(list: Vec<Optimization>) -> OptimizationTree {
        let phase = list
            .into_iter()
            .fold(OptimizationPhase::new("SomeOptimizationPhase"), |phase, o| {
                phase.with_optimization(o)
            });
        OptimizationTree::new(OptimizationPhase::new("RootPhase").with_phase(phase))
    }

    #[test]
    fn optimizations_land_in_their_method_context() {
        let inlining = InliningTree::new(
            InliningTreeNode::new("a()", UNKNOWN_BCI)
                .with_child(
                    InliningTreeNode::new("b()", 1).with_child(InliningTreeNode::new("d()", 3)),
                )
                .with_child(InliningTreeNode::new("c()", 2)),
        );
        let tree = optimizations(vec![
            optimization("OptimizationA", &[("a()", 3)]),
            optimization("OptimizationB", &[("b()", 4), ("a()", 1)]),
            optimization("OptimizationC", &[("c()", 5), ("a()", 2)]),
            optimization("OptimizationD", &[("d()", 6), ("b()", 3), ("a()", 1)]),
        ]);
        let context = OptimizationContextTree::create_from(&inlining, &tree);
        assert_eq!(
            context.to_string(),
            "\
Optimization-context tree
    a() at bci -1
        SomeOptimization OptimizationA at bci 3
        b() at bci 1
            SomeOptimization OptimizationB at bci 4
            d() at bci 3
                SomeOptimization OptimizationD at bci 6
        c() at bci 2
            SomeOptimization OptimizationC at bci 5
"
        );
    }

    #[test]
    fn duplicate_paths_are_marked_in_both_subtrees() {
        let subtree = || InliningTreeNode::new("b()", 1).with_child(InliningTreeNode::new("d()", 3));
        let inlining = InliningTree::new(
            InliningTreeNode::new("a()", UNKNOWN_BCI)
                .with_child(subtree())
                .with_child(subtree())
                .with_child(InliningTreeNode::new("c()", 2)),
        );
        let tree = optimizations(vec![optimization("OptimizationC", &[("c()", 5), ("a()", 2)])]);
        let context = OptimizationContextTree::create_from(&inlining, &tree);

        let a = context.root().inlining_children().next().unwrap();
        assert!(!a.has_duplicate_path_warning());
        let children: Vec<_> = a.inlining_children().collect();
        assert_eq!(children.len(), 3);
        for b in &children[..2] {
            assert!(b.has_duplicate_path_warning());
            let d = b.inlining_children().next().unwrap();
            assert!(d.has_duplicate_path_warning());
        }
        let c = children[2];
        assert!(!c.has_duplicate_path_warning());
        assert_eq!(c.optimizations().map(|o| o.event.as_str()).collect::<Vec<_>>(), ["OptimizationC"]);
        assert_eq!(c.children.len(), 1);
    }

    #[test]
    fn backtracking_finds_the_complete_match() {
        let inlining = InliningTree::new(
            InliningTreeNode::new("a()", UNKNOWN_BCI)
                .with_child(InliningTreeNode::new("b()", 1).with_child(InliningTreeNode::new("c()", 2)))
                .with_child(InliningTreeNode::new("b()", 1).with_child(InliningTreeNode::new("d()", 3))),
        );
        let tree = optimizations(vec![optimization(
            "OptimizationD",
            &[("d()", 7), ("b()", 3), ("a()", 1)],
        )]);
        let context = OptimizationContextTree::create_from(&inlining, &tree);
        let a = context.root().inlining_children().next().unwrap();
        let second_b = a.inlining_children().nth(1).unwrap();
        let d = second_b.inlining_children().next().unwrap();
        assert_eq!(d.optimizations().count(), 1);
        let first_b = a.inlining_children().next().unwrap();
        assert_eq!(first_b.optimizations().count(), 0);
    }

    #[test]
    fn partial_matches_use_the_deepest_node_of_the_first_prefix() {
        let inlining = InliningTree::new(
            InliningTreeNode::new("a()", UNKNOWN_BCI).with_child(InliningTreeNode::new("b()", 1)),
        );
        let tree = optimizations(vec![optimization(
            "Lost",
            &[("x()", 9), ("b()", 5), ("a()", 1)],
        )]);
        let context = OptimizationContextTree::create_from(&inlining, &tree);
        let a = context.root().inlining_children().next().unwrap();
        let b = a.inlining_children().next().unwrap();
        assert_eq!(b.optimizations().map(|o| o.event.as_str()).collect::<Vec<_>>(), ["Lost"]);
    }

    #[test]
    fn abstract_nodes_are_skipped_when_attributing() {
        let mut interface = InliningTreeNode::new("List.size()", 4);
        interface.is_abstract = true;
        let inlining = InliningTree::new(
            InliningTreeNode::new("a()", UNKNOWN_BCI)
                .with_child(interface.with_child(InliningTreeNode::new("ArrayList.size()", 4))),
        );
        let tree = optimizations(vec![
            optimization("Inner", &[("ArrayList.size()", 0), ("a()", 4)]),
            optimization("Outer", &[("a()", 8)]),
        ]);
        let context = OptimizationContextTree::create_from(&inlining, &tree);
        let a = context.root().inlining_children().next().unwrap();
        assert_eq!(a.optimizations().map(|o| o.event.as_str()).collect::<Vec<_>>(), ["Outer"]);
        let interface = a.inlining_children().next().unwrap();
        assert_eq!(interface.optimizations().count(), 0);
        let concrete = interface.inlining_children().next().unwrap();
        assert_eq!(concrete.optimizations().map(|o| o.event.as_str()).collect::<Vec<_>>(), ["Inner"]);
    }

    #[test]
    fn children_sort_warnings_then_optimizations_then_inlining_by_bci() {
        let subtree = || InliningTreeNode::new("b()", 1);
        let inlining = InliningTree::new(
            InliningTreeNode::new("a()", UNKNOWN_BCI)
                .with_child(InliningTreeNode::new("c()", 9))
                .with_child(subtree())
                .with_child(subtree()),
        );
        let tree = optimizations(vec![
            optimization("Late", &[("a()", 7)]),
            optimization("Early", &[("a()", 2)]),
            optimization("AlsoEarly", &[("a()", 2)]),
        ]);
        let context = OptimizationContextTree::create_from(&inlining, &tree);
        let a = &context.root().children[0];
        let rendered: Vec<String> = a
            .children
            .iter()
            .map(|child| match &child.kind {
                ContextNodeKind::Optimization(o) => o.event.clone(),
                ContextNodeKind::Inlining { method, .. } => method.clone(),
                other => format!("{other:?}"),
            })
            .collect();
        assert_eq!(rendered, ["Early", "AlsoEarly", "Late", "b()", "b()", "c()"]);
    }
}
