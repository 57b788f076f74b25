//! Per-(station, line) offsets within bundles.
//!
//! Every line gets a globally consistent slot from its priority, so a line
//! that leaves a bundle and rejoins it later returns to the same slot.
//! Sections with reversed bundle ordering use the mirrored slots. A few
//! boundary stations then copy the offsets their routing actually
//! produces: side exits of TB sections, junctions, and top entries fed by
//! TB bottom exits.

use std::collections::HashMap;

use indexmap::IndexMap;
use log::trace;

use metroline_core::{
    identifier::Id,
    semantic::{Direction, MetroGraph, PortSide, Station},
};

use crate::{layout::LayoutContext, routing::reversal::detect_reversed_sections};

/// Offset of each line at each station.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationOffsets {
    values: IndexMap<(Id, Id), f32>,
}

impl StationOffsets {
    /// Offset of `line` at `station`, 0 when unknown.
    pub fn get(&self, station: Id, line: Id) -> f32 {
        self.lookup(station, line).unwrap_or(0.0)
    }

    pub fn lookup(&self, station: Id, line: Id) -> Option<f32> {
        self.values.get(&(station, line)).copied()
    }

    pub fn insert(&mut self, station: Id, line: Id, offset: f32) {
        self.values.insert((station, line), offset);
    }

    /// Largest offset among `lines` at `station`, 0 for none.
    pub fn max_of(&self, station: Id, lines: &[Id]) -> f32 {
        lines
            .iter()
            .map(|&line| self.get(station, line))
            .reduce(f32::max)
            .unwrap_or(0.0)
    }

    /// All entries as ((station, line), offset), in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = ((Id, Id), f32)> + '_ {
        self.values.iter().map(|(&key, &value)| (key, value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Computes the offset of every line at every station it touches.
///
/// `line_order` is the line priority; lines outside it get slot 0.
pub fn compute_station_offsets(
    graph: &MetroGraph,
    ctx: &LayoutContext,
    line_order: &[Id],
    offset_step: f32,
) -> StationOffsets {
    let priority: HashMap<Id, usize> = line_order
        .iter()
        .enumerate()
        .map(|(idx, &line)| (line, idx))
        .collect();
    let max_priority = line_order.len().saturating_sub(1);
    let reversed = detect_reversed_sections(graph, ctx);

    let mut offsets = StationOffsets::default();
    let mut station_lines: HashMap<Id, Vec<Id>> = HashMap::new();
    for station in graph.stations() {
        let lines = graph.station_lines(station.id());
        let reverse = station.section().is_some_and(|s| reversed.contains(&s));
        for &line in &lines {
            let p = priority.get(&line).copied().unwrap_or(0);
            let slot = if reverse { max_priority.saturating_sub(p) } else { p };
            offsets.insert(station.id(), line, slot as f32 * offset_step);
        }
        station_lines.insert(station.id(), lines);
    }
    let lines_at = |id: Id| station_lines.get(&id).map(Vec::as_slice).unwrap_or_default();

    let is_tb = |section: Id| {
        ctx.section(section)
            .is_some_and(|f| f.direction() == Direction::TopToBottom)
    };
    let port_of = |id: Id| graph.station(id).and_then(Station::as_port);

    // Side exits of TB sections take the reversed internal offsets, as
    // the concentric exit corner swaps the ordering.
    for station in graph.ports() {
        let Some(port) = station.as_port() else {
            continue;
        };
        if port.is_entry() || !port.side().is_left_or_right() || !is_tb(port.section()) {
            continue;
        }
        let mut internal: IndexMap<Id, f32> = IndexMap::new();
        for edge in graph.edges().iter().filter(|e| e.target() == station.id()) {
            if port_of(edge.source()).is_some() {
                continue;
            }
            for &line in edge.lines() {
                internal.insert(line, offsets.get(edge.source(), line));
            }
        }
        let max_internal = internal.values().copied().fold(f32::NEG_INFINITY, f32::max);
        for (line, offset) in internal {
            offsets.insert(station.id(), line, max_internal - offset);
        }
    }

    // Junctions inherit the offsets of the exit port feeding them.
    for junction in graph.junctions() {
        let jid = junction.id();
        let feeding_exit = graph
            .edges()
            .iter()
            .filter(|e| e.target() == jid)
            .map(|e| e.source())
            .find(|&src| port_of(src).is_some_and(|p| !p.is_entry()));
        let Some(exit) = feeding_exit else {
            continue;
        };
        for &line in lines_at(jid) {
            if let Some(offset) = offsets.lookup(exit, line) {
                offsets.insert(jid, line, offset);
            }
        }
    }

    // Top entries fed by TB bottom exits match the vertical drop between
    // the two sections.
    let tb_right_entry: Vec<Id> = graph
        .ports()
        .filter_map(Station::as_port)
        .filter(|p| p.is_entry() && p.side() == PortSide::Right && is_tb(p.section()))
        .map(|p| p.section())
        .collect();
    for station in graph.ports() {
        let Some(port) = station.as_port() else {
            continue;
        };
        if !port.is_entry() || port.side() != PortSide::Top {
            continue;
        }
        let pid = station.id();
        let feeding_exit = graph
            .edges()
            .iter()
            .filter(|e| e.target() == pid)
            .map(|e| e.source())
            .find(|&src| {
                port_of(src).is_some_and(|p| {
                    !p.is_entry() && p.side() == PortSide::Bottom && is_tb(p.section())
                })
            });
        let Some(exit) = feeding_exit else {
            continue;
        };
        let exit_section = graph.section_of(exit);
        let keep = exit_section.is_some_and(|s| tb_right_entry.contains(&s));
        let max_exit = offsets.max_of(exit, lines_at(exit));
        for &line in lines_at(pid) {
            let exit_offset = offsets.get(exit, line);
            let offset = if keep { exit_offset } else { max_exit - exit_offset };
            offsets.insert(pid, line, offset);
        }
    }

    trace!(entries = offsets.len(); "Computed station offsets");
    offsets
}

#[cfg(test)]
mod tests {
    use metroline_core::{
        color::Color,
        geometry::Bounds,
        semantic::{Edge, Line, Port, PortFlow, Section},
    };

    use super::*;
    use crate::layout::SectionLayout;

    fn lines(names: &[&str]) -> Vec<Id> {
        names.iter().map(|n| Id::new(n)).collect()
    }

    fn graph_with_lines(names: &[&str]) -> MetroGraph {
        names.iter().fold(MetroGraph::new(), |graph, name| {
            graph.with_line(Line::new(Id::new(name), *name, Color::default()))
        })
    }

    #[test]
    fn test_offsets_follow_priority() {
        let graph = graph_with_lines(&["of_red", "of_blue"])
            .with_station(Station::new(Id::new("of_a"), "a"))
            .with_station(Station::new(Id::new("of_b"), "b"))
            .with_edge(Edge::new(Id::new("of_a"), Id::new("of_b"), lines(&["of_blue", "of_red"])));
        let order = lines(&["of_red", "of_blue"]);

        let offsets = compute_station_offsets(&graph, &LayoutContext::new(), &order, 3.0);
        assert_eq!(offsets.get(Id::new("of_a"), Id::new("of_red")), 0.0);
        assert_eq!(offsets.get(Id::new("of_a"), Id::new("of_blue")), 3.0);
        assert_eq!(offsets.max_of(Id::new("of_b"), &order), 3.0);
        assert_eq!(offsets.len(), 4);
    }

    #[test]
    fn test_tb_side_exit_and_junction_take_reversed_offsets() {
        let tb = Id::new("of_tb");
        let exit = Station::port(
            Id::new("of_exit"),
            Port::new(tb, PortSide::Right, PortFlow::Exit, lines(&["of_r", "of_g"])),
        )
        .with_section(tb);
        let graph = graph_with_lines(&["of_r", "of_g"])
            .with_section(Section::new(tb, "Tb"))
            .with_station(Station::new(Id::new("of_s"), "s").with_section(tb))
            .with_station(exit)
            .with_station(Station::junction(Id::new("of_j")))
            .with_edge(Edge::new(Id::new("of_s"), Id::new("of_exit"), lines(&["of_r", "of_g"])))
            .with_edge(Edge::new(Id::new("of_exit"), Id::new("of_j"), lines(&["of_r", "of_g"])));
        let mut ctx = LayoutContext::new();
        ctx.insert_section(SectionLayout::new(tb, 1, Direction::TopToBottom, Bounds::default()));

        let offsets = compute_station_offsets(&graph, &ctx, &lines(&["of_r", "of_g"]), 3.0);
        assert_eq!(offsets.get(Id::new("of_s"), Id::new("of_r")), 0.0);
        assert_eq!(offsets.get(Id::new("of_exit"), Id::new("of_r")), 3.0);
        assert_eq!(offsets.get(Id::new("of_exit"), Id::new("of_g")), 0.0);
        assert_eq!(offsets.get(Id::new("of_j"), Id::new("of_r")), 3.0);
        assert_eq!(offsets.get(Id::new("of_j"), Id::new("of_g")), 0.0);
    }

    #[test]
    fn test_unknown_entries_default_to_zero() {
        let offsets = StationOffsets::default();
        assert!(offsets.is_empty());
        assert_eq!(offsets.get(Id::new("of_none"), Id::new("of_r")), 0.0);
        assert_eq!(offsets.max_of(Id::new("of_none"), &[]), 0.0);
    }
}
