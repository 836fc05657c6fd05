//! Memory-edge assignment.
//!
//! Links every memory-accessing fixed node to the last node before it that
//! may have killed its location. Kills of [`LocationIdentity::Any`] order
//! every later access after them, except accesses to immutable fields.

use std::collections::{HashSet, VecDeque};

use tracing::{debug, instrument};

use super::{NodeIndex, errors::GraphError, graph::Graph, location::LocationIdentity};

/// The kills visible at one point of the control flow, oldest first.
#[derive(Debug, Clone)]
struct MemoryState {
    entry: NodeIndex,
    kills: Vec<(NodeIndex, LocationIdentity)>,
}

impl MemoryState {
    fn new(entry: NodeIndex) -> Self {
        Self {
            entry,
            kills: Vec::new(),
        }
    }

    /// The latest kill that may affect an access to `location`. Immutable
    /// fields only see writes to themselves and initializing writes.
    fn last_kill(&self, location: &LocationIdentity) -> NodeIndex {
        self.kills
            .iter()
            .rev()
            .find(|(_, killed)| {
                if location.is_immutable() {
                    killed == location || killed.is_init()
                } else {
                    killed.overlaps(location)
                }
            })
            .map_or(self.entry, |(node, _)| *node)
    }

    fn kill(&mut self, node: NodeIndex, location: LocationIdentity) {
        self.kills.push((node, location));
    }
}

/// Assigns `last_location_access` on every memory access. Returns the
/// number of edges that changed.
#[instrument(level = "debug", skip_all, fields(graph = %graph.name()))]
pub fn assign_memory_edges(graph: &mut Graph) -> Result<usize, GraphError> {
    let start = graph.start();
    let mut blocks = VecDeque::from([(start, MemoryState::new(start))]);
    let mut visited = HashSet::new();
    let mut changed = 0;

    while let Some((entry, mut state)) = blocks.pop_front() {
        if !visited.insert(entry) {
            continue;
        }
        let mut current = Some(entry);
        while let Some(node) = current {
            if let Some(location) = graph[node].location_identity() {
                let kill = state.last_kill(&location);
                if kill != node && graph[node].last_location_access() != Some(kill) {
                    debug!(node = node.to_idx(), kill = kill.to_idx(), %location, "linking memory access");
                    graph.set_last_location_access(node, Some(kill))?;
                    changed += 1;
                }
            }
            if let Some(location) = graph[node].killed_location_identity() {
                state.kill(node, location);
            }
            if let Some(handler) = graph[node].exception_edge() {
                blocks.push_back((handler, state.clone()));
            }
            current = graph[node].next();
        }
    }
    Ok(changed)
}
