//! Static description of the edges a node kind has.

use std::fmt;

use super::NodeIndex;

/// What an input edge means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// A dataflow operand.
    Value,
    /// A deoptimization snapshot, always a frame state.
    State,
    /// An ordering dependency on the last node that may have killed a location.
    Memory,
    /// Auxiliary references such as locked monitors.
    Association,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EdgeKind::Value => "value",
            EdgeKind::State => "state",
            EdgeKind::Memory => "memory",
            EdgeKind::Association => "association",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotDescriptor {
    pub name: &'static str,
    pub kind: EdgeKind,
    /// Whether the slot (or any list entry) may be absent.
    pub optional: bool,
    pub list: bool,
}

impl SlotDescriptor {
    pub const fn input(name: &'static str, kind: EdgeKind) -> Self {
        Self {
            name,
            kind,
            optional: false,
            list: false,
        }
    }

    pub const fn optional(name: &'static str, kind: EdgeKind) -> Self {
        Self {
            name,
            kind,
            optional: true,
            list: false,
        }
    }

    pub const fn list(name: &'static str, kind: EdgeKind) -> Self {
        Self {
            name,
            kind,
            optional: false,
            list: true,
        }
    }

    pub const fn optional_list(name: &'static str, kind: EdgeKind) -> Self {
        Self {
            name,
            kind,
            optional: true,
            list: true,
        }
    }
}

/// The fixed shape of a node kind.
#[derive(Debug)]
pub struct NodeClass {
    pub name: &'static str,
    pub inputs: &'static [SlotDescriptor],
    pub successors: &'static [&'static str],
}

impl NodeClass {
    pub fn input_slot(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|slot| slot.name == name)
    }
}

/// The storage of one input slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSlot {
    Single(Option<NodeIndex>),
    List(Vec<Option<NodeIndex>>),
}

impl InputSlot {
    pub fn targets(&self) -> impl Iterator<Item = Option<NodeIndex>> + '_ {
        let entries: &[Option<NodeIndex>] = match self {
            InputSlot::Single(target) => std::slice::from_ref(target),
            InputSlot::List(targets) => targets,
        };
        entries.iter().copied()
    }
}

/// Where an input edge lives: the slot, and the entry within a list slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputPosition {
    pub slot: usize,
    pub index: usize,
}

impl InputPosition {
    pub fn single(slot: usize) -> Self {
        Self { slot, index: 0 }
    }
}

/// A single input edge as seen while iterating a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub position: InputPosition,
    pub descriptor: &'static SlotDescriptor,
    pub target: Option<NodeIndex>,
}
