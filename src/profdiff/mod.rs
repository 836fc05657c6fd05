//! Attribution of recorded optimizations to inlining decisions.
//!
//! Works on the finished record of a compilation, never on a live graph:
//! an [`InliningTree`] of the methods that were inlined and an
//! [`OptimizationTree`] of the phases that ran and what they did. The two are
//! combined into an [`OptimizationContextTree`].

use serde::{Deserialize, Serialize};

mod context;
mod inlining;
mod optimization;

pub use context::{
    ContextNodeKind, DUPLICATE_PATH_WARNING, OptimizationContextTree, OptimizationContextTreeNode,
};
pub use inlining::{InliningPath, InliningTree, InliningTreeNode, PathElement, UNKNOWN_BCI};
pub use optimization::{Optimization, OptimizationPhase, OptimizationTree, Position};

/// The trees recorded for one compilation, as stored in a TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationTrees {
    /// The compiled method.
    pub method: String,
    pub inlining: InliningTreeNode,
    pub optimizations: OptimizationPhase,
}

impl CompilationTrees {
    pub fn from_toml(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }

    pub fn context_tree(&self) -> OptimizationContextTree {
        OptimizationContextTree::create_from(
            &InliningTree::new(self.inlining.clone()),
            &OptimizationTree::new(self.optimizations.clone()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trees_parse_from_toml() {
        let trees = CompilationTrees::from_toml(
            r#"
method = "a()"

[inlining]
method = "a()"

[[inlining.children]]
method = "b()"
bci = 1

[[inlining.children]]
method = "List.size()"
bci = 2
abstract = true

[optimizations]
name = "RootPhase"

[[optimizations.phases]]
name = "Canonicalizer"

[[optimizations.phases.optimizations]]
name = "Canonicalizer"
event = "CanonicalReplacement"
position = [{ method = "b()", bci = 4 }, { method = "a()", bci = 1 }]
"#,
        )
        .unwrap();
        assert_eq!(trees.inlining.bci, UNKNOWN_BCI);
        assert!(trees.inlining.children[1].is_abstract);
        assert!(trees.inlining.children[0].positive);

        let context = trees.context_tree();
        let a = context.root().inlining_children().next().unwrap();
        let b = a.inlining_children().next().unwrap();
        assert_eq!(b.optimizations().count(), 1);
    }
}
