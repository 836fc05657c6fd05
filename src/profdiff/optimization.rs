use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::inlining::{InliningPath, PathElement, UNKNOWN_BCI};

/// A method and a bci inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub method: String,
    pub bci: i32,
}

impl Position {
    pub fn new(method: impl Into<String>, bci: i32) -> Self {
        Self {
            method: method.into(),
            bci,
        }
    }
}

/// A transformation performed by a phase at a position in the code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Optimization {
    /// The optimization's name, e.g. the pass that performed it.
    pub name: String,
    /// What happened, e.g. `CanonicalReplacement`.
    pub event: String,
    /// The position, innermost method first. Each method after the first is
    /// the caller of the one before it, and its bci is the call site.
    #[serde(default)]
    pub position: Vec<Position>,
}

impl Optimization {
    pub fn new(name: impl Into<String>, event: impl Into<String>, position: Vec<Position>) -> Self {
        Self {
            name: name.into(),
            event: event.into(),
            position,
        }
    }

    /// The bci in the innermost method.
    pub fn bci(&self) -> i32 {
        self.position.first().map_or(UNKNOWN_BCI, |position| position.bci)
    }

    /// The call path from the root method to the method enclosing this
    /// optimization. The root is entered through an unknown bci; every
    /// callee through the bci of the call site in its caller.
    pub fn enclosing_method_path(&self) -> InliningPath {
        let outermost_first: Vec<&Position> = self.position.iter().rev().collect();
        let elements = outermost_first
            .iter()
            .enumerate()
            .map(|(depth, position)| {
                let bci = if depth == 0 {
                    UNKNOWN_BCI
                } else {
                    outermost_first[depth - 1].bci
                };
                PathElement::new(position.method.clone(), bci)
            })
            .collect();
        InliningPath(elements)
    }
}

impl fmt::Display for Optimization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} at bci {}", self.name, self.event, self.bci())
    }
}

/// A compiler phase: its optimizations, then its subphases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationPhase {
    pub name: String,
    #[serde(default)]
    pub optimizations: Vec<Optimization>,
    #[serde(default)]
    pub phases: Vec<OptimizationPhase>,
}

impl OptimizationPhase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optimizations: Vec::new(),
            phases: Vec::new(),
        }
    }

    pub fn with_optimization(mut self, optimization: Optimization) -> Self {
        self.optimizations.push(optimization);
        self
    }

    pub fn with_phase(mut self, phase: OptimizationPhase) -> Self {
        self.phases.push(phase);
        self
    }

    fn collect<'t>(&'t self, out: &mut Vec<&'t Optimization>) {
        out.extend(&self.optimizations);
        for phase in &self.phases {
            phase.collect(out);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationTree {
    pub root: OptimizationPhase,
}

impl OptimizationTree {
    pub fn new(root: OptimizationPhase) -> Self {
        Self { root }
    }

    /// Every optimization, in phase pre-order.
    pub fn optimizations(&self) -> Vec<&Optimization> {
        let mut out = Vec::new();
        self.root.collect(&mut out);
        out
    }
}

impl fmt::Display for OptimizationTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_phase(
            f: &mut fmt::Formatter<'_>,
            phase: &OptimizationPhase,
            depth: usize,
        ) -> fmt::Result {
            writeln!(f, "{}{}", "    ".repeat(depth), phase.name)?;
            for optimization in &phase.optimizations {
                let position = optimization
                    .position
                    .iter()
                    .map(|position| format!("{}: {}", position.method, position.bci))
                    .join(", ");
                writeln!(
                    f,
                    "{}{} {} at bci {{{position}}}",
                    "    ".repeat(depth + 1),
                    optimization.name,
                    optimization.event
                )?;
            }
            for subphase in &phase.phases {
                write_phase(f, subphase, depth + 1)?;
            }
            Ok(())
        }
        write_phase(f, &self.root, 0)
    }
}
