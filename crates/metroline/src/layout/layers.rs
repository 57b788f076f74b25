//! Longest-path layering.
//!
//! Every station gets an integer layer such that each edge goes from a
//! strictly lower to a strictly higher layer: a station sits one layer after
//! its latest predecessor, or at layer 0 without predecessors.

use indexmap::IndexMap;
use log::trace;
use petgraph::{Direction, algo::toposort};

use metroline_core::identifier::Id;

use crate::{error::MetroError, structure::FlowGraph};

/// Assigns layers to every node of `flow`.
///
/// `scope` names the subgraph in the cycle error, e.g. `section `qc``.
///
/// # Errors
///
/// Returns [`MetroError::Cycle`] if the graph is not acyclic.
pub fn assign_layers(flow: &FlowGraph, scope: &str) -> Result<IndexMap<Id, usize>, MetroError> {
    let (digraph, _) = flow.to_digraph();
    let order = toposort(&digraph, None).map_err(|cycle| MetroError::Cycle {
        scope: scope.to_string(),
        station: digraph[cycle.node_id()],
    })?;

    let mut layers: IndexMap<Id, usize> = IndexMap::new();
    for idx in order {
        let layer = digraph
            .neighbors_directed(idx, Direction::Incoming)
            .filter_map(|pred| layers.get(&digraph[pred]))
            .map(|&l| l + 1)
            .max()
            .unwrap_or(0);
        layers.insert(digraph[idx], layer);
    }

    // Report in node order rather than topological order.
    let layers: IndexMap<Id, usize> = flow
        .nodes()
        .filter_map(|id| layers.get(&id).map(|&l| (id, l)))
        .collect();
    trace!(scope = scope, layers:? = layers.values().collect::<Vec<_>>(); "Assigned layers");
    Ok(layers)
}

/// Checks that a graph has no cycle without computing layers.
///
/// # Errors
///
/// Returns [`MetroError::Cycle`] naming one station on a cycle.
pub fn check_acyclic(flow: &FlowGraph, scope: &str) -> Result<(), MetroError> {
    let (digraph, _) = flow.to_digraph();
    toposort(&digraph, None)
        .map(|_| ())
        .map_err(|cycle| MetroError::Cycle {
            scope: scope.to_string(),
            station: digraph[cycle.node_id()],
        })
}

#[cfg(test)]
mod tests {
    use metroline_core::semantic::Edge;

    use super::*;

    fn flow(edges: &[(&str, &str)]) -> FlowGraph {
        let mut flow = FlowGraph::default();
        for (src, tgt) in edges {
            flow.add_edge(Edge::new(Id::new(src), Id::new(tgt), vec![Id::new("l")]));
        }
        flow
    }

    #[test]
    fn test_chain_layers() {
        let layers = assign_layers(&flow(&[("a", "b"), ("b", "c")]), "test").unwrap();
        assert_eq!(layers[&Id::new("a")], 0);
        assert_eq!(layers[&Id::new("b")], 1);
        assert_eq!(layers[&Id::new("c")], 2);
    }

    #[test]
    fn test_longest_path_wins() {
        let layers = assign_layers(
            &flow(&[("a", "b"), ("b", "c"), ("c", "d"), ("a", "d")]),
            "test",
        )
        .unwrap();
        assert_eq!(layers[&Id::new("d")], 3);
    }

    #[test]
    fn test_isolated_node_is_layer_zero() {
        let mut graph = flow(&[("a", "b")]);
        graph.add_node(Id::new("lonely"));
        let layers = assign_layers(&graph, "test").unwrap();
        assert_eq!(layers[&Id::new("lonely")], 0);
        assert_eq!(
            layers.keys().copied().collect::<Vec<_>>(),
            vec![Id::new("a"), Id::new("b"), Id::new("lonely")]
        );
    }

    #[test]
    fn test_cycle_is_reported() {
        let graph = flow(&[("a", "b"), ("b", "c"), ("c", "a")]);
        let err = assign_layers(&graph, "section `loop`").unwrap_err();
        match err {
            MetroError::Cycle { scope, station } => {
                assert_eq!(scope, "section `loop`");
                assert!(["a", "b", "c"].iter().any(|name| station == *name));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(check_acyclic(&graph, "loop").is_err());
        assert!(check_acyclic(&flow(&[("a", "b")]), "ok").is_ok());
    }
}
