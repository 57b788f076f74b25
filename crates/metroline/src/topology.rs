//! Reference checks and topology resolution.
//!
//! Raw metro graphs connect stations of different sections directly. The
//! resolver rewrites every such connection into an explicit chain through
//! synthesized boundary stations:
//!
//! ```text
//! station -> exit port -> [junction ->] entry port -> station
//! ```
//!
//! # Overview
//!
//! - [`check_references`] - Fatal reference and hint consistency checks.
//! - [`PortHints`] - Source of entry/exit side declarations per section.
//! - [`resolve`] - The rewrite itself. Idempotent on resolved graphs.
//!
//! One exit port is created per source section; all lines leaving a section
//! exit together. One entry port is created per (target section, side).
//! A junction is inserted after an exit port that feeds several entry ports.

use std::collections::{HashMap, HashSet};

use indexmap::{IndexMap, IndexSet};
use log::{debug, info};

use metroline_core::{
    identifier::Id,
    semantic::{Edge, MetroGraph, Port, PortFlow, PortHint, PortSide, Station},
};

use crate::{error::MetroError, structure::SectionDag};

/// Source of entry and exit port declarations for sections.
///
/// The graph itself provides its explicit declarations; the inference
/// result provides explicit declarations completed by inferred ones.
pub trait PortHints {
    /// Entry declarations of a section.
    fn entry_hints(&self, section: Id) -> &[PortHint];

    /// Exit declarations of a section.
    fn exit_hints(&self, section: Id) -> &[PortHint];
}

impl PortHints for MetroGraph {
    fn entry_hints(&self, section: Id) -> &[PortHint] {
        self.section(section)
            .map(|s| s.entry_hints())
            .unwrap_or_default()
    }

    fn exit_hints(&self, section: Id) -> &[PortHint] {
        self.section(section)
            .map(|s| s.exit_hints())
            .unwrap_or_default()
    }
}

/// Verifies every reference of the graph before any layout work.
///
/// # Errors
///
/// - [`MetroError::EmptyEdge`] for an edge without lines.
/// - [`MetroError::UnknownStation`] for an edge endpoint that does not exist.
/// - [`MetroError::UndeclaredLine`] for an edge line without a definition.
///   A graph that declares no lines at all uses its line names as anonymous
///   lines and is exempt.
/// - [`MetroError::UnknownSection`] for a station in a missing section.
/// - [`MetroError::ContradictoryPortSide`] for a hint naming a line that does
///   not cross the section in that direction, or a line given two sides.
pub fn check_references(graph: &MetroGraph) -> Result<(), MetroError> {
    for edge in graph.edges() {
        let (from, to) = (edge.source(), edge.target());
        if edge.lines().is_empty() {
            return Err(MetroError::EmptyEdge { from, to });
        }
        for station in [from, to] {
            if graph.station(station).is_none() {
                return Err(MetroError::UnknownStation { station, from, to });
            }
        }
        if graph.has_lines() {
            if let Some(&line) = edge.lines().iter().find(|&&l| graph.line(l).is_none()) {
                return Err(MetroError::UndeclaredLine { line, from, to });
            }
        }
    }

    for station in graph.stations() {
        if let Some(section) = station.section() {
            if graph.section(section).is_none() {
                return Err(MetroError::UnknownSection {
                    section,
                    station: station.id(),
                });
            }
        }
    }

    let dag = SectionDag::from_graph(graph);
    for section in graph.sections() {
        let sid = section.id();
        let entering: HashSet<Id> = dag
            .predecessors(sid)
            .flat_map(|pred| dag.lines_between(pred, sid))
            .collect();
        let exiting: HashSet<Id> = dag
            .successors(sid)
            .flat_map(|succ| dag.lines_between(sid, succ))
            .collect();

        check_hints(sid, section.entry_hints(), &entering, PortFlow::Entry)?;
        check_hints(sid, section.exit_hints(), &exiting, PortFlow::Exit)?;
    }

    Ok(())
}

fn check_hints(
    section: Id,
    hints: &[PortHint],
    crossing: &HashSet<Id>,
    flow: PortFlow,
) -> Result<(), MetroError> {
    let mut sides: HashMap<Id, PortSide> = HashMap::new();
    for hint in hints {
        for &line in hint.lines() {
            let contradiction = !crossing.contains(&line)
                || sides.insert(line, hint.side()).is_some_and(|s| s != hint.side());
            if contradiction {
                return Err(MetroError::ContradictoryPortSide {
                    section,
                    line,
                    side: hint.side(),
                    flow,
                });
            }
        }
    }
    Ok(())
}

/// A single-line hop of an edge between ordinary stations of two sections.
#[derive(Debug, Clone, Copy)]
struct Crossing {
    source: Id,
    target: Id,
    line: Id,
    src_sec: Id,
    tgt_sec: Id,
    entry_side: PortSide,
}

/// Rewrites inter-section edges into port and junction chains.
///
/// An edge is inter-section only when both endpoints are ordinary stations of
/// different sections, so ports and junctions already present are kept as
/// they are and a resolved graph resolves to itself. Output edges are merged
/// by (source, target), unioning line lists in first-occurrence order.
///
/// # Errors
///
/// Returns [`MetroError::Layout`] if a port lookup fails while rewriting.
pub fn resolve(graph: &MetroGraph, hints: &impl PortHints) -> Result<MetroGraph, MetroError> {
    info!(edges = graph.edges().len(); "Resolving section topology");

    let mut resolved = graph.clone();

    let mut internal: Vec<Edge> = Vec::new();
    let mut crossings: Vec<Crossing> = Vec::new();
    for edge in graph.edges() {
        match crossing_sections(graph, edge) {
            Some((src_sec, tgt_sec)) => {
                let entry_sides = entry_side_mapping(hints, tgt_sec);
                for &line in edge.lines() {
                    crossings.push(Crossing {
                        source: edge.source(),
                        target: edge.target(),
                        line,
                        src_sec,
                        tgt_sec,
                        entry_side: entry_sides.get(&line).copied().unwrap_or(PortSide::Left),
                    });
                }
            }
            None => internal.push(edge.clone()),
        }
    }

    if crossings.is_empty() {
        resolved.set_edges(merge_edges(internal));
        return Ok(resolved);
    }

    let mut counter = graph.stations().filter(|s| s.is_boundary()).count();
    let by_declaration = |lines: IndexSet<Id>| -> Vec<Id> {
        let mut lines: Vec<Id> = lines.into_iter().collect();
        lines.sort_by_key(|&l| graph.line_index(l).unwrap_or(usize::MAX));
        lines
    };

    let mut exit_groups: IndexMap<Id, IndexSet<Id>> = IndexMap::new();
    let mut entry_groups: IndexMap<(Id, PortSide), IndexSet<Id>> = IndexMap::new();
    for crossing in &crossings {
        exit_groups
            .entry(crossing.src_sec)
            .or_default()
            .insert(crossing.line);
        entry_groups
            .entry((crossing.tgt_sec, crossing.entry_side))
            .or_default()
            .insert(crossing.line);
    }

    let mut exit_ports: HashMap<Id, Id> = HashMap::new();
    for (section, lines) in exit_groups {
        let side = exit_side(hints, section);
        let port_id = Id::exit_port(section, side.as_str(), counter);
        counter += 1;
        let port = Port::new(section, side, PortFlow::Exit, by_declaration(lines));
        debug!(port = port_id.as_string(), side:? = side; "Created exit port");
        resolved.add_station(Station::port(port_id, port));
        exit_ports.insert(section, port_id);
    }

    let mut entry_ports: HashMap<(Id, PortSide), Id> = HashMap::new();
    for ((section, side), lines) in entry_groups {
        let port_id = Id::entry_port(section, side.as_str(), counter);
        counter += 1;
        let port = Port::new(section, side, PortFlow::Entry, by_declaration(lines));
        debug!(port = port_id.as_string(), side:? = side; "Created entry port");
        resolved.add_station(Station::port(port_id, port));
        entry_ports.insert((section, side), port_id);
    }

    let mut edges = internal;
    let mut fan: IndexMap<Id, IndexMap<Id, Vec<Id>>> = IndexMap::new();
    for crossing in &crossings {
        let exit_port = *exit_ports.get(&crossing.src_sec).ok_or_else(|| {
            MetroError::Layout(format!("no exit port for section `{}`", crossing.src_sec))
        })?;
        let entry_port = *entry_ports
            .get(&(crossing.tgt_sec, crossing.entry_side))
            .ok_or_else(|| {
                MetroError::Layout(format!(
                    "no {} entry port for section `{}`",
                    crossing.entry_side, crossing.tgt_sec
                ))
            })?;

        edges.push(Edge::new(crossing.source, exit_port, vec![crossing.line]));
        edges.push(Edge::new(entry_port, crossing.target, vec![crossing.line]));
        fan.entry(exit_port)
            .or_default()
            .entry(entry_port)
            .or_default()
            .push(crossing.line);
    }

    for (exit_port, targets) in fan {
        if targets.len() <= 1 {
            for (entry_port, lines) in targets {
                for line in lines {
                    edges.push(Edge::new(exit_port, entry_port, vec![line]));
                }
            }
            continue;
        }

        let junction = Id::junction(counter);
        counter += 1;
        resolved.add_station(Station::junction(junction));
        debug!(junction = junction.as_string(), branches = targets.len(); "Inserted fan-out junction");

        let trunk: IndexSet<Id> = targets.values().flatten().copied().collect();
        edges.push(Edge::new(exit_port, junction, by_declaration(trunk)));
        for (entry_port, lines) in targets {
            for line in lines {
                edges.push(Edge::new(junction, entry_port, vec![line]));
            }
        }
    }

    resolved.set_edges(merge_edges(edges));
    Ok(resolved)
}

/// Sections of an edge joining ordinary stations of two different sections.
fn crossing_sections(graph: &MetroGraph, edge: &Edge) -> Option<(Id, Id)> {
    let source = graph.station(edge.source())?;
    let target = graph.station(edge.target())?;
    if source.is_boundary() || target.is_boundary() {
        return None;
    }
    match (source.section(), target.section()) {
        (Some(src), Some(tgt)) if src != tgt => Some((src, tgt)),
        _ => None,
    }
}

/// Entry side per line of a section; later declarations win.
fn entry_side_mapping(hints: &impl PortHints, section: Id) -> HashMap<Id, PortSide> {
    let mut sides = HashMap::new();
    for hint in hints.entry_hints(section) {
        for &line in hint.lines() {
            sides.insert(line, hint.side());
        }
    }
    sides
}

/// The single declared exit side of a section, or `Right`.
fn exit_side(hints: &impl PortHints, section: Id) -> PortSide {
    let sides: IndexSet<PortSide> = hints
        .exit_hints(section)
        .iter()
        .map(PortHint::side)
        .collect();
    match sides.len() {
        1 => sides[0],
        _ => PortSide::Right,
    }
}

fn merge_edges(edges: Vec<Edge>) -> Vec<Edge> {
    let mut merged: IndexMap<(Id, Id), Edge> = IndexMap::new();
    for edge in edges {
        match merged.get_mut(&(edge.source(), edge.target())) {
            Some(existing) => existing.merge_lines(edge.lines()),
            None => {
                merged.insert((edge.source(), edge.target()), edge);
            }
        }
    }
    merged.into_values().collect()
}

#[cfg(test)]
mod tests {
    use metroline_core::{
        color::Color,
        semantic::{Line, Section},
    };

    use super::*;

    fn ids(names: &[&str]) -> Vec<Id> {
        names.iter().map(|n| Id::new(n)).collect()
    }

    fn line(name: &str) -> Line {
        Line::new(Id::new(name), name, Color::default())
    }

    fn two_sections() -> MetroGraph {
        let (s1, s2) = (Id::new("top_s1"), Id::new("top_s2"));
        MetroGraph::new()
            .with_line(line("top_red"))
            .with_line(line("top_blue"))
            .with_section(Section::new(s1, "One"))
            .with_section(Section::new(s2, "Two"))
            .with_station(Station::new(Id::new("top_a"), "a").with_section(s1))
            .with_station(Station::new(Id::new("top_b"), "b").with_section(s1))
            .with_station(Station::new(Id::new("top_c"), "c").with_section(s2))
            .with_edge(Edge::new(
                Id::new("top_a"),
                Id::new("top_b"),
                ids(&["top_red"]),
            ))
            .with_edge(Edge::new(
                Id::new("top_b"),
                Id::new("top_c"),
                ids(&["top_blue", "top_red"]),
            ))
    }

    #[test]
    fn test_check_references_accepts_valid_graph() {
        assert!(check_references(&two_sections()).is_ok());
    }

    #[test]
    fn test_check_references_undeclared_line() {
        let graph = two_sections().with_edge(Edge::new(
            Id::new("top_a"),
            Id::new("top_c"),
            ids(&["top_ghost"]),
        ));
        let err = check_references(&graph).unwrap_err();
        assert!(matches!(err, MetroError::UndeclaredLine { line, .. } if line == "top_ghost"));
    }

    #[test]
    fn test_check_references_unknown_station_and_empty_edge() {
        let graph = two_sections().with_edge(Edge::new(
            Id::new("top_a"),
            Id::new("top_nowhere"),
            ids(&["top_red"]),
        ));
        assert!(matches!(
            check_references(&graph),
            Err(MetroError::UnknownStation { station, .. }) if station == "top_nowhere"
        ));

        let graph = two_sections().with_edge(Edge::new(Id::new("top_a"), Id::new("top_b"), vec![]));
        assert!(matches!(
            check_references(&graph),
            Err(MetroError::EmptyEdge { .. })
        ));
    }

    #[test]
    fn test_check_references_unknown_section() {
        let graph = two_sections()
            .with_station(Station::new(Id::new("top_d"), "d").with_section(Id::new("top_gone")));
        assert!(matches!(
            check_references(&graph),
            Err(MetroError::UnknownSection { section, .. }) if section == "top_gone"
        ));
    }

    #[test]
    fn test_check_references_contradictory_hint() {
        let mut graph = two_sections();
        graph.section_mut(Id::new("top_s2")).unwrap().set_entry_hints(vec![
            PortHint::new(PortSide::Left, ids(&["top_red"])),
            PortHint::new(PortSide::Top, ids(&["top_red"])),
        ]);
        assert!(matches!(
            check_references(&graph),
            Err(MetroError::ContradictoryPortSide { side: PortSide::Top, .. })
        ));

        let mut graph = two_sections();
        graph
            .section_mut(Id::new("top_s1"))
            .unwrap()
            .set_entry_hints(vec![PortHint::new(PortSide::Left, ids(&["top_red"]))]);
        assert!(matches!(
            check_references(&graph),
            Err(MetroError::ContradictoryPortSide {
                flow: PortFlow::Entry,
                ..
            })
        ));
    }

    #[test]
    fn test_resolve_creates_port_chain() {
        let graph = two_sections();
        let resolved = resolve(&graph, &graph).unwrap();

        let exit = Id::new("top_s1__exit_right_0");
        let entry = Id::new("top_s2__entry_left_1");
        let exit_port = resolved.station(exit).unwrap().as_port().unwrap();
        assert_eq!(exit_port.lines(), ids(&["top_red", "top_blue"]).as_slice());
        assert!(resolved.station(entry).unwrap().as_port().unwrap().is_entry());
        assert_eq!(resolved.junctions().count(), 0);

        let pairs: Vec<(Id, Id, Vec<Id>)> = resolved
            .edges()
            .iter()
            .map(|e| (e.source(), e.target(), e.lines().to_vec()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (Id::new("top_a"), Id::new("top_b"), ids(&["top_red"])),
                (Id::new("top_b"), exit, ids(&["top_blue", "top_red"])),
                (entry, Id::new("top_c"), ids(&["top_blue", "top_red"])),
                (exit, entry, ids(&["top_blue", "top_red"])),
            ]
        );
    }

    #[test]
    fn test_resolve_uses_hint_sides() {
        let mut graph = two_sections();
        graph
            .section_mut(Id::new("top_s1"))
            .unwrap()
            .set_exit_hints(vec![PortHint::new(PortSide::Bottom, ids(&["top_red", "top_blue"]))]);
        graph
            .section_mut(Id::new("top_s2"))
            .unwrap()
            .set_entry_hints(vec![PortHint::new(PortSide::Top, ids(&["top_blue"]))]);

        let resolved = resolve(&graph, &graph).unwrap();
        assert!(resolved.station(Id::new("top_s1__exit_bottom_0")).is_some());
        assert!(resolved.station(Id::new("top_s2__entry_top_1")).is_some());
        assert!(resolved.station(Id::new("top_s2__entry_left_2")).is_some());
        assert_eq!(resolved.junctions().count(), 1);
        assert!(resolved.station(Id::new("__junction_3")).is_some());
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let graph = two_sections();
        let once = resolve(&graph, &graph).unwrap();
        let twice = resolve(&once, &once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_resolve_without_crossings_keeps_stations() {
        let graph = MetroGraph::new()
            .with_line(line("top_green"))
            .with_station(Station::new(Id::new("top_x"), "x"))
            .with_station(Station::new(Id::new("top_y"), "y"))
            .with_edge(Edge::new(Id::new("top_x"), Id::new("top_y"), ids(&["top_green"])))
            .with_edge(Edge::new(Id::new("top_x"), Id::new("top_y"), ids(&["top_green"])));
        let resolved = resolve(&graph, &graph).unwrap();
        assert_eq!(resolved.stations().count(), 2);
        assert_eq!(resolved.edges().len(), 1);
    }
}
