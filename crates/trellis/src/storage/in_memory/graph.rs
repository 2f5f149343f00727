//! Dependency graph traversal using petgraph.

use crate::domain::FlagId;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashSet, VecDeque};

/// Ids one hop away from `start` in `direction`.
///
/// `Outgoing` yields dependencies, `Incoming` yields dependents.
pub(super) fn neighbours(
    graph: &DiGraph<FlagId, ()>,
    start: NodeIndex,
    direction: Direction,
) -> Vec<FlagId> {
    graph
        .neighbors_directed(start, direction)
        .map(|node| graph[node])
        .collect()
}

/// Every flag reachable from `start` by following incoming edges.
///
/// BFS with a visited set, so cycles terminate and each flag appears once.
/// `start` itself is excluded even when a cycle leads back to it.
pub(super) fn transitive_dependents_impl(
    graph: &DiGraph<FlagId, ()>,
    start: NodeIndex,
) -> Vec<FlagId> {
    let mut visited: HashSet<NodeIndex> = HashSet::new();
    let mut queue: VecDeque<NodeIndex> = VecDeque::new();
    let mut result = Vec::new();

    visited.insert(start);
    queue.push_back(start);

    while let Some(current) = queue.pop_front() {
        for dependent in graph.neighbors_directed(current, Direction::Incoming) {
            if visited.insert(dependent) {
                result.push(graph[dependent]);
                queue.push_back(dependent);
            }
        }
    }

    result.sort_unstable();
    result
}
