use thiserror::Error;

use super::{NodeIndex, edge::EdgeKind, location::LocationIdentity, stamp::Stamp};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphError {
    #[error("node {node:?} is not alive in graph {graph:?}")]
    DeadNode { graph: String, node: NodeIndex },
    #[error("{kind} node {node:?} is missing required input {slot:?}")]
    MissingInput {
        node: Option<NodeIndex>,
        kind: &'static str,
        slot: &'static str,
    },
    #[error("{kind} node {node:?} input {slot:?} references dead node {target:?}")]
    DanglingInput {
        node: Option<NodeIndex>,
        kind: &'static str,
        slot: &'static str,
        target: NodeIndex,
    },
    #[error("{kind} node {node:?} successor {successor:?} references dead node {target:?}")]
    DanglingSuccessor {
        node: Option<NodeIndex>,
        kind: &'static str,
        successor: &'static str,
        target: NodeIndex,
    },
    #[error("node {user:?} uses {input:?} {expected} times but is recorded {found} times")]
    UsageMismatch {
        user: NodeIndex,
        input: NodeIndex,
        expected: usize,
        found: usize,
    },
    #[error("predecessor of {node:?} is {found:?}, expected {expected:?}")]
    PredecessorMismatch {
        node: NodeIndex,
        expected: Option<NodeIndex>,
        found: Option<NodeIndex>,
    },
    #[error("node {target:?} is already the successor of {predecessor:?}")]
    SuccessorAlreadyLinked {
        target: NodeIndex,
        predecessor: NodeIndex,
    },
    #[error("node {node:?} still has {count} usages")]
    NodeHasUsages { node: NodeIndex, count: usize },
    #[error("node {node:?} is still linked into the control flow")]
    StillLinked { node: NodeIndex },
    #[error("{kind} node {node:?} has {edge} edge {slot:?} to a {found} node")]
    WrongEdgeTarget {
        node: Option<NodeIndex>,
        kind: &'static str,
        edge: EdgeKind,
        slot: &'static str,
        found: &'static str,
    },
    #[error("exception edge of {node:?} leads to a {found} node instead of an exception object")]
    BadExceptionEdge {
        node: Option<NodeIndex>,
        found: &'static str,
    },
    #[error("{kind} node {node:?} accesses {location} but its inputs do not prove it")]
    UnprovenLocation {
        node: NodeIndex,
        kind: &'static str,
        location: LocationIdentity,
    },
    #[error("{kind} node {node:?} is not a {capability}")]
    MissingCapability {
        node: NodeIndex,
        kind: &'static str,
        capability: &'static str,
    },
    #[error("{kind} has no input position {slot}.{index}")]
    InvalidPosition {
        kind: &'static str,
        slot: usize,
        index: usize,
    },
    #[error("operand stamps {x} and {y} are incompatible for {op}")]
    IncompatibleStamps { op: &'static str, x: Stamp, y: Stamp },
    #[error("call to {name} expects {expected} arguments but got {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
}
