//! Structural verification of a graph.

use tracing::error;

use crate::ir::{
    NodeIndex,
    location::LocationIdentity,
    errors::GraphError,
    graph::{Graph, accepts_edge_target},
    node::Node,
    nodes::{ArrayCopyNode, NodeKind, select_component_kind},
};

/// Checks every structural invariant of `graph` and returns the first
/// violation found. Nodes are visited in index order.
pub fn verify_graph(graph: &Graph) -> Result<(), GraphError> {
    let mut nodes: Vec<(NodeIndex, &Node)> = graph.nodes().collect();
    nodes.sort_by_key(|(index, _)| index.to_idx());

    for (index, node) in nodes {
        let result = verify_inputs(graph, index, node)
            .and_then(|()| verify_usages(graph, index, node))
            .and_then(|()| verify_successors(graph, index, node))
            .and_then(|()| verify_predecessor(graph, index, node))
            .and_then(|()| verify_location(graph, index, node));
        if let Err(err) = result {
            error!(graph = %graph.name(), node = index.to_idx(), "graph verification failed: {err}");
            return Err(err);
        }
    }
    Ok(())
}

fn verify_inputs(graph: &Graph, index: NodeIndex, node: &Node) -> Result<(), GraphError> {
    let kind = node.name();
    for (descriptor, storage) in node.class().inputs.iter().zip(&node.inputs) {
        for target in storage.targets() {
            let Some(target) = target else {
                if descriptor.optional {
                    continue;
                }
                return Err(GraphError::MissingInput {
                    node: Some(index),
                    kind,
                    slot: descriptor.name,
                });
            };
            let Some(target_node) = graph.get(target) else {
                return Err(GraphError::DanglingInput {
                    node: Some(index),
                    kind,
                    slot: descriptor.name,
                    target,
                });
            };
            if !accepts_edge_target(descriptor.kind, target_node) {
                return Err(GraphError::WrongEdgeTarget {
                    node: Some(index),
                    kind,
                    edge: descriptor.kind,
                    slot: descriptor.name,
                    found: target_node.name(),
                });
            }
        }
    }
    Ok(())
}

/// `A` has `B` as input n times exactly when `B.usages` holds `A` n times.
fn verify_usages(graph: &Graph, index: NodeIndex, node: &Node) -> Result<(), GraphError> {
    for input in node.input_nodes() {
        let expected = node.input_nodes().filter(|other| *other == input).count();
        let found = graph[input].usages().iter().filter(|user| **user == index).count();
        if expected != found {
            return Err(GraphError::UsageMismatch {
                user: index,
                input,
                expected,
                found,
            });
        }
    }
    for &user in node.usages() {
        let expected = graph
            .get(user)
            .map_or(0, |user| user.input_nodes().filter(|input| *input == index).count());
        let found = node.usages().iter().filter(|other| **other == user).count();
        if expected != found {
            return Err(GraphError::UsageMismatch {
                user,
                input: index,
                expected,
                found,
            });
        }
    }
    Ok(())
}

fn verify_successors(graph: &Graph, index: NodeIndex, node: &Node) -> Result<(), GraphError> {
    let class = node.class();
    for (position, target) in node.successors.iter().enumerate() {
        let Some(target) = *target else { continue };
        let Some(target_node) = graph.get(target) else {
            return Err(GraphError::DanglingSuccessor {
                node: Some(index),
                kind: class.name,
                successor: class.successors[position],
                target,
            });
        };
        if target_node.predecessor() != Some(index) {
            return Err(GraphError::PredecessorMismatch {
                node: target,
                expected: Some(index),
                found: target_node.predecessor(),
            });
        }
    }
    if let Some(handler) = node.exception_edge() {
        let handler = &graph[handler];
        if !matches!(handler.kind(), NodeKind::ExceptionObject(_)) {
            return Err(GraphError::BadExceptionEdge {
                node: Some(index),
                found: handler.name(),
            });
        }
    }
    Ok(())
}

fn verify_predecessor(graph: &Graph, index: NodeIndex, node: &Node) -> Result<(), GraphError> {
    let Some(predecessor) = node.predecessor() else {
        return Ok(());
    };
    let links_back = graph
        .get(predecessor)
        .is_some_and(|predecessor| predecessor.successors().any(|successor| successor == index));
    if links_back {
        Ok(())
    } else {
        Err(GraphError::PredecessorMismatch {
            node: index,
            expected: None,
            found: Some(predecessor),
        })
    }
}

/// A copy only claims a specific element location while its stamps prove
/// it; otherwise it must access `Any`.
fn verify_location(graph: &Graph, index: NodeIndex, node: &Node) -> Result<(), GraphError> {
    let NodeKind::ArrayCopy(copy) = node.kind() else {
        return Ok(());
    };
    let Some(kind) = copy.element_kind else {
        return Ok(());
    };
    let proven = ArrayCopyNode::args(index, graph)
        .and_then(|args| select_component_kind(graph, &args));
    if proven == Some(kind) {
        Ok(())
    } else {
        Err(GraphError::UnprovenLocation {
            node: index,
            kind: node.name(),
            location: LocationIdentity::array_location(kind),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        edge::{InputPosition, InputSlot},
        nodes::{
            BinaryArithmeticNode, BinaryOp, ExceptionObjectNode, FrameStateNode, ParameterNode,
            ReturnNode,
        },
        stamp::Stamp,
    };

    fn simple() -> (Graph, NodeIndex, NodeIndex) {
        let mut graph = Graph::new("verify");
        let x = graph.add(ParameterNode::build(0, Stamp::int(32))).unwrap();
        let builder = BinaryArithmeticNode::build(&mut graph, BinaryOp::Add, x, x).unwrap();
        let add = graph.add(builder).unwrap();
        let ret = graph.add(ReturnNode::build(Some(add))).unwrap();
        graph.set_next(graph.start(), ret).unwrap();
        (graph, x, add)
    }

    #[test]
    fn well_formed_graphs_verify() {
        let (graph, _, _) = simple();
        assert_eq!(verify_graph(&graph), Ok(()));
    }

    #[test]
    fn missing_usages_are_reported() {
        let (mut graph, x, add) = simple();
        graph.node_mut(x).usages.pop();
        assert_eq!(
            verify_graph(&graph),
            Err(GraphError::UsageMismatch {
                user: add,
                input: x,
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn missing_required_inputs_are_reported() {
        let (mut graph, x, add) = simple();
        graph.node_mut(add).inputs[1] = InputSlot::Single(None);
        graph.node_mut(x).usages.pop();
        assert_eq!(
            verify_graph(&graph),
            Err(GraphError::MissingInput {
                node: Some(add),
                kind: "BinaryArithmetic",
                slot: "y"
            })
        );
    }

    #[test]
    fn state_edges_must_reach_frame_states() {
        let (mut graph, x, _) = simple();
        let start = graph.start();
        graph.node_mut(start).inputs[0] = InputSlot::Single(Some(x));
        graph.node_mut(x).usages.push(start);
        assert!(matches!(
            verify_graph(&graph),
            Err(GraphError::WrongEdgeTarget { slot: "state_after", found: "Parameter", .. })
        ));

        let (mut graph, _, _) = simple();
        let state = graph
            .add(FrameStateNode::new(0).build(vec![], vec![], vec![], None))
            .unwrap();
        let start = graph.start();
        graph
            .set_input(start, InputPosition::single(0), Some(state))
            .unwrap();
        assert_eq!(verify_graph(&graph), Ok(()));
    }

    #[test]
    fn broken_predecessors_are_reported() {
        let (mut graph, _, _) = simple();
        let start = graph.start();
        let ret = graph[start].next().unwrap();
        graph.node_mut(ret).predecessor = None;
        assert_eq!(
            verify_graph(&graph),
            Err(GraphError::PredecessorMismatch {
                node: ret,
                expected: Some(start),
                found: None
            })
        );
    }

    #[test]
    fn exception_edges_must_reach_exception_objects() {
        let mut graph = Graph::new("copy");
        let array = graph.add(ParameterNode::build(0, Stamp::object())).unwrap();
        let zero = graph.constant(32, 0);
        let builder = ArrayCopyNode::build(&graph, 0, [array, zero, array, zero, zero]).unwrap();
        let copy = graph.add(builder).unwrap();
        let handler = graph.add(ExceptionObjectNode::build()).unwrap();
        graph.set_successor(copy, 1, Some(handler)).unwrap();
        assert_eq!(verify_graph(&graph), Ok(()));

        let ret = graph.add(ReturnNode::build(None)).unwrap();
        graph.node_mut(copy).successors[1] = Some(ret);
        graph.node_mut(handler).predecessor = None;
        graph.node_mut(ret).predecessor = Some(copy);
        assert_eq!(
            verify_graph(&graph),
            Err(GraphError::BadExceptionEdge {
                node: Some(copy),
                found: "Return"
            })
        );
    }

    #[test]
    fn copies_must_prove_their_element_location() {
        use crate::ir::types::{ElementKind, TypeRef};

        let mut graph = Graph::new("ints");
        let ints = TypeRef::parse("int[]").unwrap();
        let src = graph.add(ParameterNode::build(0, Stamp::for_type(&ints, true))).unwrap();
        let dest = graph.add(ParameterNode::build(1, Stamp::for_type(&ints, true))).unwrap();
        let zero = graph.constant(32, 0);
        let builder = ArrayCopyNode::build(&graph, 0, [src, zero, dest, zero, zero]).unwrap();
        let copy = graph.add(builder).unwrap();
        let ret = graph.add(ReturnNode::build(None)).unwrap();
        graph.set_next(graph.start(), copy).unwrap();
        graph.set_next(copy, ret).unwrap();
        assert_eq!(verify_graph(&graph), Ok(()));

        graph.update_kind(
            copy,
            NodeKind::ArrayCopy(ArrayCopyNode {
                element_kind: Some(ElementKind::Long),
                bci: 0,
            }),
        );
        assert_eq!(
            verify_graph(&graph),
            Err(GraphError::UnprovenLocation {
                node: copy,
                kind: "ArrayCopy",
                location: LocationIdentity::array_location(ElementKind::Long),
            })
        );
    }
}
