use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// The bci of a call site that is not known.
pub const UNKNOWN_BCI: i32 = -1;

fn unknown_bci() -> i32 {
    UNKNOWN_BCI
}

fn inlined() -> bool {
    true
}

/// One method in the inlining tree: the root method, or a callee at a call
/// site of its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InliningTreeNode {
    pub method: String,
    /// The bci of the call site in the parent method.
    #[serde(default = "unknown_bci")]
    pub bci: i32,
    /// Whether the callee was inlined.
    #[serde(default = "inlined")]
    pub positive: bool,
    /// An abstract method stands for the call before devirtualization. Its
    /// children are the concrete targets.
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default)]
    pub children: Vec<InliningTreeNode>,
}

impl InliningTreeNode {
    pub fn new(method: impl Into<String>, bci: i32) -> Self {
        Self {
            method: method.into(),
            bci,
            positive: true,
            is_abstract: false,
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: InliningTreeNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn path_element(&self) -> PathElement {
        PathElement::new(self.method.clone(), self.bci)
    }
}

/// A method name and the call-site bci it was entered through.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathElement {
    pub method: String,
    pub bci: i32,
}

impl PathElement {
    pub fn new(method: impl Into<String>, bci: i32) -> Self {
        Self {
            method: method.into(),
            bci,
        }
    }

    /// Methods must be equal. An unknown bci on either side matches any bci.
    pub fn matches(&self, other: &PathElement) -> bool {
        self.method == other.method
            && (self.bci == UNKNOWN_BCI || other.bci == UNKNOWN_BCI || self.bci == other.bci)
    }
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at bci {}", self.method, self.bci)
    }
}

/// A path of call sites from the root method.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InliningPath(pub Vec<PathElement>);

impl InliningPath {
    pub fn elements(&self) -> &[PathElement] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for InliningPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().join(" -> "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InliningTree {
    pub root: InliningTreeNode,
}

impl InliningTree {
    pub fn new(root: InliningTreeNode) -> Self {
        Self { root }
    }

    /// Every node reached by following `path` from the root. Abstract nodes
    /// are skipped over as if their children were attached to their parent.
    pub fn find_nodes_at(&self, path: &InliningPath) -> Vec<&InliningTreeNode> {
        let mut found = Vec::new();
        let Some((first, rest)) = path.elements().split_first() else {
            return found;
        };
        if self.root.is_abstract {
            collect_nodes_at(&self.root, path.elements(), &mut found);
        } else if first.matches(&self.root.path_element()) {
            if rest.is_empty() {
                found.push(&self.root);
            } else {
                collect_nodes_at(&self.root, rest, &mut found);
            }
        }
        found
    }
}

fn collect_nodes_at<'t>(
    node: &'t InliningTreeNode,
    path: &[PathElement],
    found: &mut Vec<&'t InliningTreeNode>,
) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    for child in &node.children {
        if child.is_abstract {
            collect_nodes_at(child, path, found);
        } else if first.matches(&child.path_element()) {
            if rest.is_empty() {
                found.push(child);
            } else {
                collect_nodes_at(child, rest, found);
            }
        }
    }
}
