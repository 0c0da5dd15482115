// src/graph/builder.rs

//! Dependency graph construction and shortcut-edge pruning.

use std::collections::{HashMap, HashSet};
use std::fmt;

use anyhow::{bail, Result};
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;
use tracing::debug;

use crate::graph::model::{ColumnRef, Component, ComponentId, FilterOutcome, PipelineJob, SourceResolver};

/// Bound on producer-chain recursion during construction. Deep enough for
/// any real job; a chain this long means a malformed model.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// A node in the dependency graph: a physical source table or a component.
///
/// Virtual columns and filter outcomes do not get nodes of their own; they
/// resolve to the component that produces them, and a filter-outcome gate
/// travels on the edge as a requirement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GraphNode {
    Table(String),
    Component(ComponentId),
}

impl fmt::Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphNode::Table(name) => write!(f, "table:{name}"),
            GraphNode::Component(id) => write!(f, "{id}"),
        }
    }
}

/// "Produces input consumed by", optionally gated by a filter outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEdge {
    pub requirement: Option<FilterOutcome>,
}

/// The built dependency graph of one job.
pub struct JobGraph {
    graph: StableDiGraph<GraphNode, GraphEdge>,
    indices: HashMap<GraphNode, NodeIndex>,
}

impl JobGraph {
    /// Build the graph for `job` with the default recursion bound.
    pub fn build(job: &PipelineJob) -> Result<Self> {
        Self::build_with_depth(job, DEFAULT_MAX_DEPTH)
    }

    pub fn build_with_depth(job: &PipelineJob, max_depth: usize) -> Result<Self> {
        let resolver = SourceResolver::new(job);
        let mut graph = Self {
            graph: StableDiGraph::new(),
            indices: HashMap::new(),
        };
        let mut visited = HashSet::new();
        for component in &job.components {
            graph.add_component(component, &resolver, &mut visited, max_depth)?;
        }
        graph.validate_acyclic()?;
        debug!(
            job = %job.name,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "built dependency graph"
        );
        Ok(graph)
    }

    fn ensure_node(&mut self, node: GraphNode) -> NodeIndex {
        if let Some(index) = self.indices.get(&node) {
            return *index;
        }
        let index = self.graph.add_node(node.clone());
        self.indices.insert(node, index);
        index
    }

    fn ensure_edge(&mut self, from: NodeIndex, to: NodeIndex, requirement: Option<FilterOutcome>) {
        let exists = self
            .graph
            .edges_connecting(from, to)
            .any(|e| e.weight().requirement == requirement);
        if !exists {
            self.graph.add_edge(from, to, GraphEdge { requirement });
        }
    }

    /// Add `component`, its producers (recursively) and the connecting
    /// edges.
    fn add_component(
        &mut self,
        component: &Component,
        resolver: &SourceResolver<'_>,
        visited: &mut HashSet<ComponentId>,
        depth: usize,
    ) -> Result<NodeIndex> {
        let index = self.ensure_node(GraphNode::Component(component.id.clone()));
        if !visited.insert(component.id.clone()) {
            return Ok(index);
        }
        if depth == 0 {
            bail!(
                "dependency chain through component '{}' exceeds the recursion bound",
                component.id
            );
        }

        for input in &component.inputs {
            match input {
                ColumnRef::Physical { table, .. } => {
                    let table_index = self.ensure_node(GraphNode::Table(table.clone()));
                    self.ensure_edge(table_index, index, None);
                }
                ColumnRef::Virtual { name } => {
                    let Some(producer) = resolver.producer_of(name) else {
                        bail!(
                            "component '{}' consumes virtual column '{}' which no component produces",
                            component.id,
                            name
                        );
                    };
                    if producer.id == component.id {
                        // Self-reference is a terminal case, not a cycle.
                        self.ensure_edge(index, index, None);
                        continue;
                    }
                    let producer_index =
                        self.add_component(producer, resolver, visited, depth - 1)?;
                    self.ensure_edge(producer_index, index, None);
                }
            }
        }

        // Multi-stream components feed synthetic tables downstream jobs
        // read from; those show up as ordinary table nodes.
        for stream in &component.output_streams {
            let stream_index = self.ensure_node(GraphNode::Table(stream.clone()));
            self.ensure_edge(index, stream_index, None);
        }

        if let Some(requirement) = &component.requirement {
            let Some(filter) = resolver.component(&requirement.filter) else {
                bail!(
                    "component '{}' requires outcome of unknown filter '{}'",
                    component.id,
                    requirement.filter
                );
            };
            if filter.id == component.id {
                self.ensure_edge(index, index, Some(requirement.clone()));
            } else {
                let filter_index = self.add_component(filter, resolver, visited, depth - 1)?;
                self.ensure_edge(filter_index, index, Some(requirement.clone()));
            }
        }

        Ok(index)
    }

    /// Remove transitive shortcut edges until a fixpoint.
    ///
    /// An edge A->Z without a requirement is removed when Z has at least
    /// one other incoming edge and every such sibling's source is fully
    /// covered by A: each of its in-edges, recursively, must lead back to
    /// A. A sibling fed from anywhere A does not dominate (a table, an
    /// unrelated component) keeps the edge, since A->Z then carries real
    /// data flow of its own. Edges carrying a requirement encode semantic
    /// gating and are never removed. Idempotent.
    pub fn prune_shortcut_edges(&mut self) -> usize {
        let mut removed = 0;
        while let Some(edge) = self.find_shortcut_edge() {
            if let Some((from, to)) = self.graph.edge_endpoints(edge) {
                debug!(
                    from = %self.graph[from],
                    to = %self.graph[to],
                    "pruning shortcut edge"
                );
            }
            self.graph.remove_edge(edge);
            removed += 1;
        }
        removed
    }

    fn find_shortcut_edge(&self) -> Option<EdgeIndex> {
        for edge in self.graph.edge_references() {
            if edge.weight().requirement.is_some() {
                continue;
            }
            let source = edge.source();
            let target = edge.target();
            if source == target {
                continue;
            }
            let mut has_sibling = false;
            let mut all_covered = true;
            for sibling in self.graph.edges_directed(target, Direction::Incoming) {
                if sibling.id() == edge.id() {
                    continue;
                }
                has_sibling = true;
                let mut checked = HashSet::new();
                if !self.covered_by(source, sibling.source(), &mut checked) {
                    all_covered = false;
                    break;
                }
            }
            if has_sibling && all_covered {
                return Some(edge.id());
            }
        }
        None
    }

    /// Is `node` fully covered by `dominator`?
    ///
    /// True when `node` is `dominator` itself, or when `node` has in-edges
    /// and every one of them, recursively, leads back to `dominator`. A
    /// node with no in-edges is never covered: data enters there that the
    /// dominator does not account for. `checked` guards against revisiting
    /// edges, terminating the walk on shared ancestors and self-loops
    /// (an already-checked edge counts as covered).
    fn covered_by(
        &self,
        dominator: NodeIndex,
        node: NodeIndex,
        checked: &mut HashSet<EdgeIndex>,
    ) -> bool {
        if node == dominator {
            return true;
        }
        let in_edges: Vec<(EdgeIndex, NodeIndex)> = self
            .graph
            .edges_directed(node, Direction::Incoming)
            .map(|e| (e.id(), e.source()))
            .collect();
        if in_edges.is_empty() {
            return false;
        }
        for (edge, predecessor) in in_edges {
            if !checked.insert(edge) {
                continue;
            }
            if !self.covered_by(dominator, predecessor, checked) {
                return false;
            }
        }
        true
    }

    /// The graph must be acyclic apart from self-loops.
    fn validate_acyclic(&self) -> Result<()> {
        self.layers().map(|_| ())
    }

    /// Kahn layering ignoring self-loops; errors on a genuine cycle.
    fn layers(&self) -> Result<Vec<Vec<NodeIndex>>> {
        let mut in_degree: HashMap<NodeIndex, usize> = HashMap::new();
        for node in self.graph.node_indices() {
            let degree = self
                .graph
                .edges_directed(node, Direction::Incoming)
                .filter(|e| e.source() != node)
                .count();
            in_degree.insert(node, degree);
        }

        let mut layers = Vec::new();
        let mut ready: Vec<NodeIndex> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(n, _)| *n)
            .collect();
        ready.sort();
        let mut seen = 0usize;

        while !ready.is_empty() {
            seen += ready.len();
            let mut next = Vec::new();
            for node in &ready {
                for edge in self.graph.edges_directed(*node, Direction::Outgoing) {
                    if edge.target() == *node {
                        continue;
                    }
                    if let Some(degree) = in_degree.get_mut(&edge.target()) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.push(edge.target());
                        }
                    }
                }
            }
            next.sort();
            next.dedup();
            layers.push(std::mem::take(&mut ready));
            ready = next;
        }

        if seen != self.graph.node_count() {
            bail!("dependency graph contains a cycle");
        }
        Ok(layers)
    }

    /// Components grouped into dependency layers: everything in layer N
    /// only depends on layers < N. Tables are dropped; components reading
    /// straight from a table land in the first layer.
    pub fn execution_levels(&self) -> Result<Vec<Vec<ComponentId>>> {
        let layers = self.layers()?;
        let mut levels = Vec::new();
        for layer in layers {
            let mut level: Vec<ComponentId> = layer
                .into_iter()
                .filter_map(|index| match &self.graph[index] {
                    GraphNode::Component(id) => Some(id.clone()),
                    GraphNode::Table(_) => None,
                })
                .collect();
            level.sort();
            if !level.is_empty() {
                levels.push(level);
            }
        }
        Ok(levels)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains_node(&self, node: &GraphNode) -> bool {
        self.indices.contains_key(node)
    }

    /// The edge weight between two nodes, if such an edge exists.
    pub fn edge_between(&self, from: &GraphNode, to: &GraphNode) -> Option<&GraphEdge> {
        let from = *self.indices.get(from)?;
        let to = *self.indices.get(to)?;
        self.graph
            .edges_connecting(from, to)
            .next()
            .map(|e| e.weight())
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.graph.node_indices().map(|i| &self.graph[i])
    }

    /// All edges as `(from, to, weight)` triples.
    pub fn edges(&self) -> impl Iterator<Item = (&GraphNode, &GraphNode, &GraphEdge)> {
        self.graph
            .edge_references()
            .map(|e| (&self.graph[e.source()], &self.graph[e.target()], e.weight()))
    }

    pub(crate) fn inner(&self) -> &StableDiGraph<GraphNode, GraphEdge> {
        &self.graph
    }

    pub(crate) fn index_of(&self, node: &GraphNode) -> Option<NodeIndex> {
        self.indices.get(node).copied()
    }
}
