//! Graph structures shared by the layout stages.
//!
//! # Overview
//!
//! - [`FlowGraph`] - Station adjacency over multi-line edges, restrictable to a
//!   subset of stations (one section, or all real stations of a section).
//! - [`SectionDag`] - The section dependency meta-graph. Junctions are traversed
//!   so that a resolved graph and its raw form produce the same dependencies.
//!
//! Both keep insertion order for nodes and edges, which makes every traversal
//! deterministic.

use std::collections::{HashMap, HashSet};

use indexmap::{IndexMap, IndexSet};
use petgraph::graph::{DiGraph, NodeIndex};

use metroline_core::{
    identifier::Id,
    semantic::{Edge, MetroGraph},
};

// =============================================================================
// Station flow graph
// =============================================================================

/// Directed station graph with per-edge line lists.
#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    nodes: IndexSet<Id>,
    edges: Vec<Edge>,
    outgoing: HashMap<Id, Vec<usize>>,
    incoming: HashMap<Id, Vec<usize>>,
}

impl FlowGraph {
    /// Builds the flow graph of every station and edge of a metro graph.
    pub fn from_graph(graph: &MetroGraph) -> Self {
        let mut flow = Self::default();
        for station in graph.stations() {
            flow.add_node(station.id());
        }
        for edge in graph.edges() {
            flow.add_edge(edge.clone());
        }
        flow
    }

    /// Restricts the graph to `nodes`, keeping only edges with both ends inside.
    ///
    /// Nodes keep the order of `nodes`.
    pub fn subgraph(&self, nodes: impl IntoIterator<Item = Id>) -> Self {
        let mut sub = Self::default();
        for node in nodes {
            if self.nodes.contains(&node) {
                sub.add_node(node);
            }
        }
        for edge in &self.edges {
            if sub.contains(edge.source()) && sub.contains(edge.target()) {
                sub.add_edge(edge.clone());
            }
        }
        sub
    }

    pub fn add_node(&mut self, id: Id) {
        self.nodes.insert(id);
    }

    /// Adds an edge. Endpoints missing from the node set are added.
    pub fn add_edge(&mut self, edge: Edge) {
        self.add_node(edge.source());
        self.add_node(edge.target());
        let idx = self.edges.len();
        self.outgoing.entry(edge.source()).or_default().push(idx);
        self.incoming.entry(edge.target()).or_default().push(idx);
        self.edges.push(edge);
    }

    pub fn nodes(&self) -> impl Iterator<Item = Id> + '_ {
        self.nodes.iter().copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_index(&self, id: Id) -> Option<usize> {
        self.nodes.get_index_of(&id)
    }

    pub fn contains(&self, id: Id) -> bool {
        self.nodes.contains(&id)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Edges leaving `id`, in insertion order.
    pub fn outgoing_edges(&self, id: Id) -> impl Iterator<Item = &Edge> {
        self.outgoing
            .get(&id)
            .into_iter()
            .flatten()
            .map(|&idx| &self.edges[idx])
    }

    /// Edges entering `id`, in insertion order.
    pub fn incoming_edges(&self, id: Id) -> impl Iterator<Item = &Edge> {
        self.incoming
            .get(&id)
            .into_iter()
            .flatten()
            .map(|&idx| &self.edges[idx])
    }

    /// Distinct targets of edges leaving `id`, in first-edge order.
    pub fn successors(&self, id: Id) -> Vec<Id> {
        let mut result: IndexSet<Id> = IndexSet::new();
        result.extend(self.outgoing_edges(id).map(Edge::target));
        result.into_iter().collect()
    }

    /// Distinct sources of edges entering `id`, in first-edge order.
    pub fn predecessors(&self, id: Id) -> Vec<Id> {
        let mut result: IndexSet<Id> = IndexSet::new();
        result.extend(self.incoming_edges(id).map(Edge::source));
        result.into_iter().collect()
    }

    /// Nodes without incoming edges, in node order.
    pub fn roots(&self) -> impl Iterator<Item = Id> + '_ {
        self.nodes
            .iter()
            .copied()
            .filter(|id| !self.incoming.contains_key(id))
    }

    /// Distinct lines on edges touching `id`, in first-edge order.
    pub fn lines_at(&self, id: Id) -> Vec<Id> {
        let mut lines: IndexSet<Id> = IndexSet::new();
        for edge in self.incoming_edges(id).chain(self.outgoing_edges(id)) {
            lines.extend(edge.lines().iter().copied());
        }
        lines.into_iter().collect()
    }

    /// Converts to a petgraph graph whose node weights are the station ids.
    pub fn to_digraph(&self) -> (DiGraph<Id, ()>, HashMap<Id, NodeIndex>) {
        let mut digraph = DiGraph::new();
        let mut indices = HashMap::new();
        for &node in &self.nodes {
            indices.insert(node, digraph.add_node(node));
        }
        let mut seen: HashSet<(Id, Id)> = HashSet::new();
        for edge in &self.edges {
            if !seen.insert((edge.source(), edge.target())) {
                continue;
            }
            if let (Some(&src), Some(&tgt)) = (indices.get(&edge.source()), indices.get(&edge.target()))
            {
                digraph.add_edge(src, tgt, ());
            }
        }
        (digraph, indices)
    }
}

// =============================================================================
// Section dependency meta-graph
// =============================================================================

/// Section dependencies derived from edges that cross section boundaries.
#[derive(Debug, Clone, Default)]
pub struct SectionDag {
    successors: IndexMap<Id, IndexSet<Id>>,
    predecessors: IndexMap<Id, IndexSet<Id>>,
    edge_lines: IndexMap<(Id, Id), IndexSet<Id>>,
}

impl SectionDag {
    /// Builds the meta-graph of a raw or resolved metro graph.
    ///
    /// A direct edge between stations of two different sections is a
    /// dependency. A junction links every section feeding it to every
    /// section it feeds, for the lines it passes on.
    pub fn from_graph(graph: &MetroGraph) -> Self {
        let mut dag = Self::default();
        let mut junction_sources: IndexMap<Id, Vec<(Id, &Edge)>> = IndexMap::new();
        let mut junction_targets: IndexMap<Id, Vec<(Id, &Edge)>> = IndexMap::new();

        for edge in graph.edges() {
            let src_sec = graph.section_of(edge.source());
            let tgt_sec = graph.section_of(edge.target());
            let target_is_junction = graph
                .station(edge.target())
                .is_some_and(|s| s.is_junction());
            let source_is_junction = graph
                .station(edge.source())
                .is_some_and(|s| s.is_junction());

            match (src_sec, tgt_sec) {
                (Some(src), _) if target_is_junction => {
                    junction_sources
                        .entry(edge.target())
                        .or_default()
                        .push((src, edge));
                }
                (_, Some(tgt)) if source_is_junction => {
                    junction_targets
                        .entry(edge.source())
                        .or_default()
                        .push((tgt, edge));
                }
                (Some(src), Some(tgt)) if src != tgt => {
                    dag.add_dependency(src, tgt, edge.lines());
                }
                _ => {}
            }
        }

        for (junction, sources) in &junction_sources {
            let Some(targets) = junction_targets.get(junction) else {
                continue;
            };
            for (src, in_edge) in sources {
                for (tgt, out_edge) in targets {
                    if src == tgt {
                        continue;
                    }
                    let lines: Vec<Id> = out_edge
                        .lines()
                        .iter()
                        .copied()
                        .filter(|line| in_edge.carries(*line))
                        .collect();
                    if !lines.is_empty() {
                        dag.add_dependency(*src, *tgt, &lines);
                    }
                }
            }
        }

        dag
    }

    fn add_dependency(&mut self, src: Id, tgt: Id, lines: &[Id]) {
        self.successors.entry(src).or_default().insert(tgt);
        self.predecessors.entry(tgt).or_default().insert(src);
        self.edge_lines
            .entry((src, tgt))
            .or_default()
            .extend(lines.iter().copied());
    }

    pub fn is_empty(&self) -> bool {
        self.successors.is_empty()
    }

    /// Direct downstream sections of `section`.
    pub fn successors(&self, section: Id) -> impl Iterator<Item = Id> + '_ {
        self.successors.get(&section).into_iter().flatten().copied()
    }

    /// Direct upstream sections of `section`.
    pub fn predecessors(&self, section: Id) -> impl Iterator<Item = Id> + '_ {
        self.predecessors.get(&section).into_iter().flatten().copied()
    }

    pub fn has_successors(&self, section: Id) -> bool {
        self.successors.get(&section).is_some_and(|s| !s.is_empty())
    }

    pub fn has_predecessors(&self, section: Id) -> bool {
        self.predecessors.get(&section).is_some_and(|s| !s.is_empty())
    }

    /// Lines flowing from `src` to `tgt`.
    pub fn lines_between(&self, src: Id, tgt: Id) -> impl Iterator<Item = Id> + '_ {
        self.edge_lines.get(&(src, tgt)).into_iter().flatten().copied()
    }

    /// All (source, target) dependencies in insertion order.
    pub fn dependencies(&self) -> impl Iterator<Item = (Id, Id)> + '_ {
        self.edge_lines.keys().copied()
    }

    /// Every section reachable downstream of `section`.
    pub fn transitive_successors(&self, section: Id) -> HashSet<Id> {
        let mut result = HashSet::new();
        let mut stack: Vec<Id> = self.successors(section).collect();
        while let Some(sid) = stack.pop() {
            if result.insert(sid) {
                stack.extend(self.successors(sid));
            }
        }
        result
    }
}
