// src/graph/layout.rs

//! Layered 2-D layout for visualization consumers.
//!
//! Execution ordering does not depend on this module; it only assigns
//! coordinates. Endpoints (nodes nothing consumes) are anchored in the
//! column given by their longest prerequisite chain, and predecessors fan
//! out one column to the left. Callers may persist coordinates and supply
//! them back; supplied coordinates always win over computed ones.

use std::collections::{HashMap, HashSet};

use petgraph::stable_graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::graph::builder::{GraphNode, JobGraph};

pub const X_STEP: i32 = 160;
pub const X_OFFSET: i32 = 40;
pub const Y_STEP: i32 = 80;
pub const Y_OFFSET: i32 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// Integer coordinates for every node of one graph.
pub struct GraphLayout {
    positions: HashMap<GraphNode, Point>,
}

impl GraphLayout {
    /// Lay out `graph`, preferring `supplied` coordinates where present.
    pub fn compute(graph: &JobGraph, supplied: &HashMap<GraphNode, Point>) -> Self {
        let mut layout = Placement {
            graph,
            positions: HashMap::new(),
            occupancy: HashMap::new(),
            placed: HashSet::new(),
        };
        for (node, point) in supplied {
            if graph.contains_node(node) {
                layout.positions.insert(node.clone(), *point);
            }
        }

        let mut chain_memo = HashMap::new();
        let mut endpoints: Vec<(NodeIndex, usize)> = graph
            .inner()
            .node_indices()
            .filter(|&n| {
                graph
                    .inner()
                    .edges_directed(n, Direction::Outgoing)
                    .all(|e| e.target() == n)
            })
            .map(|n| (n, longest_chain(graph, n, &mut chain_memo, &mut HashSet::new())))
            .collect();
        // Longest chains first so deep pipelines claim their columns before
        // shallow stragglers.
        endpoints.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        for (endpoint, depth) in endpoints {
            layout.place(endpoint, depth as i32);
        }

        GraphLayout {
            positions: layout.positions,
        }
    }

    pub fn position(&self, node: &GraphNode) -> Option<Point> {
        self.positions.get(node).copied()
    }

    pub fn positions(&self) -> impl Iterator<Item = (&GraphNode, Point)> {
        self.positions.iter().map(|(n, p)| (n, *p))
    }
}

struct Placement<'a> {
    graph: &'a JobGraph,
    positions: HashMap<GraphNode, Point>,
    /// Nodes assigned so far per column; drives the y coordinate.
    occupancy: HashMap<i32, i32>,
    placed: HashSet<NodeIndex>,
}

impl Placement<'_> {
    fn place(&mut self, node: NodeIndex, column: i32) {
        if !self.placed.insert(node) {
            return;
        }
        let column = column.max(0);
        let key = self.graph.inner()[node].clone();
        if !self.positions.contains_key(&key) {
            let slot = self.occupancy.entry(column).or_insert(0);
            let point = Point {
                x: X_OFFSET + column * X_STEP,
                y: Y_OFFSET + *slot * Y_STEP,
            };
            *slot += 1;
            self.positions.insert(key, point);
        }
        let predecessors: Vec<NodeIndex> = self
            .graph
            .inner()
            .edges_directed(node, Direction::Incoming)
            .filter(|e| e.source() != node)
            .map(|e| e.source())
            .collect();
        for predecessor in predecessors {
            self.place(predecessor, column - 1);
        }
    }
}

/// Length of the longest prerequisite chain ending at `node`.
///
/// Memoized per node so shared ancestors are walked once; the edge set
/// guards recursion, and a self-loop contributes zero depth.
fn longest_chain(
    graph: &JobGraph,
    node: NodeIndex,
    memo: &mut HashMap<NodeIndex, usize>,
    visited_edges: &mut HashSet<EdgeIndex>,
) -> usize {
    if let Some(depth) = memo.get(&node) {
        return *depth;
    }
    let incoming: Vec<(EdgeIndex, NodeIndex)> = graph
        .inner()
        .edges_directed(node, Direction::Incoming)
        .map(|e| (e.id(), e.source()))
        .collect();
    let mut best = 0;
    for (edge, source) in incoming {
        if source == node || !visited_edges.insert(edge) {
            continue;
        }
        best = best.max(longest_chain(graph, source, memo, visited_edges) + 1);
    }
    memo.insert(node, best);
    best
}
