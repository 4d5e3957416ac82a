//! K shortest simple paths (Yen) over the routing graph.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use ordered_float::OrderedFloat;
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::EdgeRef;

use crate::network::{EdgeKey, NodeId};

// Search state for Dijkstra with priority queue
#[derive(Clone, Debug, PartialEq, Eq)]
struct SearchNode {
    cost: OrderedFloat<f64>,
    node: NodeId,
}

impl Ord for SearchNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap, node id breaks ties deterministically
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for SearchNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A found path and its total weight
#[derive(Clone, Debug, PartialEq)]
pub struct WeightedPath {
    pub cost: f64,
    pub nodes: Vec<NodeId>,
}

/// Up to `k` distinct simple paths from `source` to `target`, by increasing cost.
///
/// Equal-cost paths are ordered by their node sequence so results are reproducible.
pub fn k_shortest_paths(
    graph: &DiGraphMap<NodeId, f64>,
    source: NodeId,
    target: NodeId,
    k: usize,
) -> Vec<WeightedPath> {
    let mut accepted: Vec<WeightedPath> = Vec::new();
    if k == 0 || !graph.contains_node(source) || !graph.contains_node(target) {
        return accepted;
    }

    let Some(first) = shortest_path(graph, source, target, &HashSet::new(), &HashSet::new())
    else {
        return accepted;
    };

    let mut seen: HashSet<Vec<NodeId>> = HashSet::new();
    seen.insert(first.nodes.clone());
    accepted.push(first);

    let mut pending: Vec<WeightedPath> = Vec::new();

    while accepted.len() < k {
        let last = accepted[accepted.len() - 1].nodes.clone();

        for i in 0..last.len().saturating_sub(1) {
            let spur = last[i];
            let root = &last[..=i];

            let mut removed_edges: HashSet<EdgeKey> = HashSet::new();
            for path in &accepted {
                if path.nodes.len() > i + 1 && path.nodes[..=i] == *root {
                    removed_edges.insert((path.nodes[i], path.nodes[i + 1]));
                }
            }
            let removed_nodes: HashSet<NodeId> = root[..i].iter().copied().collect();

            let Some(spur_path) =
                shortest_path(graph, spur, target, &removed_edges, &removed_nodes)
            else {
                continue;
            };

            let mut nodes = root[..i].to_vec();
            nodes.extend_from_slice(&spur_path.nodes);
            if seen.insert(nodes.clone()) {
                let cost = path_cost(graph, root).unwrap_or(f64::INFINITY) + spur_path.cost;
                pending.push(WeightedPath { cost, nodes });
            }
        }

        if pending.is_empty() {
            break;
        }

        let best = pending
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                OrderedFloat(a.cost)
                    .cmp(&OrderedFloat(b.cost))
                    .then_with(|| a.nodes.cmp(&b.nodes))
            })
            .map(|(idx, _)| idx);
        match best {
            Some(idx) => accepted.push(pending.swap_remove(idx)),
            None => break,
        }
    }

    accepted
}

/// Sum of edge weights along `nodes`, `None` if a hop is not in the graph
pub fn path_cost(graph: &DiGraphMap<NodeId, f64>, nodes: &[NodeId]) -> Option<f64> {
    nodes
        .windows(2)
        .map(|w| graph.edge_weight(w[0], w[1]).copied())
        .sum()
}

fn shortest_path(
    graph: &DiGraphMap<NodeId, f64>,
    source: NodeId,
    target: NodeId,
    removed_edges: &HashSet<EdgeKey>,
    removed_nodes: &HashSet<NodeId>,
) -> Option<WeightedPath> {
    if source == target {
        return Some(WeightedPath {
            cost: 0.0,
            nodes: vec![source],
        });
    }

    let mut open_set = BinaryHeap::new();
    let mut costs: HashMap<NodeId, f64> = HashMap::new();
    let mut previous: HashMap<NodeId, NodeId> = HashMap::new();
    let mut closed_set: HashSet<NodeId> = HashSet::new();

    costs.insert(source, 0.0);
    open_set.push(SearchNode {
        cost: OrderedFloat(0.0),
        node: source,
    });

    while let Some(current) = open_set.pop() {
        if current.node == target {
            let mut nodes = vec![target];
            let mut cursor = target;
            while let Some(&prev) = previous.get(&cursor) {
                nodes.push(prev);
                cursor = prev;
            }
            nodes.reverse();
            return Some(WeightedPath {
                cost: current.cost.0,
                nodes,
            });
        }

        if !closed_set.insert(current.node) {
            continue;
        }

        for edge in graph.edges(current.node) {
            let neighbor = edge.target();
            if closed_set.contains(&neighbor)
                || removed_nodes.contains(&neighbor)
                || removed_edges.contains(&(current.node, neighbor))
            {
                continue;
            }

            let new_cost = current.cost.0 + *edge.weight();
            let improves = costs.get(&neighbor).is_none_or(|&known| new_cost < known);
            if improves {
                costs.insert(neighbor, new_cost);
                previous.insert(neighbor, current.node);
                open_set.push(SearchNode {
                    cost: OrderedFloat(new_cost),
                    node: neighbor,
                });
            }
        }
    }

    None
}
