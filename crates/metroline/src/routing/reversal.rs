//! Detection of sections whose bundle ordering is flipped.
//!
//! A vertical bundle leaving a top-to-bottom section comes out mirrored:
//! through a bottom exit the x offsets are reversed, and through a left or
//! right exit the concentric corner swaps inner and outer lines. A section
//! receiving such a bundle stacks its lines in reverse priority order so
//! that no two lines cross at its entry. Reversal then carries along the
//! row to the sections that continue the same horizontal run.

use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};
use log::debug;

use metroline_core::{
    identifier::Id,
    semantic::{Direction, MetroGraph, Port, PortSide, Station},
};

use crate::layout::LayoutContext;

/// Returns the ids of sections whose incoming bundle ordering is reversed.
pub fn detect_reversed_sections(graph: &MetroGraph, ctx: &LayoutContext) -> HashSet<Id> {
    let detector = Detector::new(graph, ctx);
    let reversed = detector.run();
    for section in graph.sections() {
        if reversed.contains(&section.id()) {
            debug!(section = section.id().as_string(); "Reversed bundle ordering");
        }
    }
    reversed
}

struct Detector<'a> {
    graph: &'a MetroGraph,
    ctx: &'a LayoutContext,
    tb_sections: HashSet<Id>,
    successors: IndexMap<Id, IndexSet<Id>>,
    reversed: HashSet<Id>,
}

impl<'a> Detector<'a> {
    fn new(graph: &'a MetroGraph, ctx: &'a LayoutContext) -> Self {
        let tb_sections = graph
            .sections()
            .map(|s| s.id())
            .filter(|&id| {
                ctx.section(id)
                    .is_some_and(|f| f.direction() == Direction::TopToBottom)
            })
            .collect();

        let mut successors: IndexMap<Id, IndexSet<Id>> = IndexMap::new();
        for edge in graph.edges() {
            let (Some(src), Some(tgt)) = (
                graph.section_of(edge.source()),
                graph.section_of(edge.target()),
            ) else {
                continue;
            };
            if src != tgt {
                successors.entry(src).or_default().insert(tgt);
            }
        }

        Self {
            graph,
            ctx,
            tb_sections,
            successors,
            reversed: HashSet::new(),
        }
    }

    fn run(mut self) -> HashSet<Id> {
        // Top entries fed by the bottom exit of a TB section.
        for section in self.graph.sections() {
            let sid = section.id();
            for (pid, port) in entry_ports(self.graph, sid) {
                if port.side() != PortSide::Top {
                    continue;
                }
                let fed_by_tb_bottom = self
                    .graph
                    .edges()
                    .iter()
                    .filter(|e| e.target() == pid)
                    .filter_map(|e| self.port_of(e.source()))
                    .any(|src| {
                        !src.is_entry()
                            && src.side() == PortSide::Bottom
                            && self.tb_sections.contains(&src.section())
                    });
                if fed_by_tb_bottom {
                    self.reversed.insert(sid);
                }
            }
        }
        self.propagate_along_rows();

        // Side entries fed by a side exit of a non-reversed TB section. One
        // section at a time, since each propagation may reverse the next TB
        // section and so change what its exits do.
        loop {
            let Some(sid) = self.next_side_fed_section() else {
                break;
            };
            self.reversed.insert(sid);
            self.propagate_along_rows();
        }

        self.reversed
    }

    fn next_side_fed_section(&self) -> Option<Id> {
        for section in self.graph.sections() {
            let sid = section.id();
            if self.reversed.contains(&sid) {
                continue;
            }
            for (pid, port) in entry_ports(self.graph, sid) {
                if !port.side().is_left_or_right() {
                    continue;
                }
                for edge in self.graph.edges().iter().filter(|e| e.target() == pid) {
                    let Some(src) = self.graph.station(edge.source()) else {
                        continue;
                    };
                    let matched = if src.is_junction() {
                        self.graph
                            .edges()
                            .iter()
                            .filter(|e| e.target() == src.id())
                            .filter_map(|e| self.port_of(e.source()))
                            .any(|p| self.is_unreversed_tb_side_exit(p))
                    } else {
                        src.as_port()
                            .is_some_and(|p| self.is_unreversed_tb_side_exit(p))
                    };
                    if matched {
                        return Some(sid);
                    }
                }
            }
        }
        None
    }

    fn is_unreversed_tb_side_exit(&self, port: &Port) -> bool {
        !port.is_entry()
            && port.side().is_left_or_right()
            && self.tb_sections.contains(&port.section())
            && !self.reversed.contains(&port.section())
    }

    /// Carries reversal to successors on the same grid row or reached
    /// through a straight side-to-side port connection. TB sections undo
    /// the reversal in their exit corner and do not pass it on.
    fn propagate_along_rows(&mut self) {
        let mut changed = true;
        while changed {
            changed = false;
            let mut current: Vec<Id> = self.reversed.iter().copied().collect();
            current.sort_by_key(|&id| self.graph.section_index(id));
            for sid in current {
                if self.tb_sections.contains(&sid) {
                    continue;
                }
                let Some(successors) = self.successors.get(&sid) else {
                    continue;
                };
                for &succ in successors {
                    if self.reversed.contains(&succ) {
                        continue;
                    }
                    if self.same_row(sid, succ) || self.is_horizontal_successor(sid, succ) {
                        self.reversed.insert(succ);
                        changed = true;
                    }
                }
            }
        }
    }

    fn same_row(&self, a: Id, b: Id) -> bool {
        match (self.ctx.section(a), self.ctx.section(b)) {
            (Some(a), Some(b)) => a.grid().row() == b.grid().row(),
            _ => false,
        }
    }

    fn is_horizontal_successor(&self, sid: Id, succ: Id) -> bool {
        self.graph.edges().iter().any(|edge| {
            if self.graph.section_of(edge.source()) != Some(sid)
                || self.graph.section_of(edge.target()) != Some(succ)
            {
                return false;
            }
            let exits_side = self
                .port_of(edge.source())
                .is_some_and(|p| !p.is_entry() && p.side().is_left_or_right());
            let enters_side = self
                .port_of(edge.target())
                .is_some_and(|p| p.is_entry() && p.side().is_left_or_right());
            exits_side && enters_side
        })
    }

    fn port_of(&self, id: Id) -> Option<&'a Port> {
        self.graph.station(id).and_then(Station::as_port)
    }
}

fn entry_ports(graph: &MetroGraph, section: Id) -> Vec<(Id, &Port)> {
    graph
        .ports()
        .filter_map(|s| s.as_port().map(|p| (s.id(), p)))
        .filter(|(_, p)| p.is_entry() && p.section() == section)
        .collect()
}

#[cfg(test)]
mod tests {
    use metroline_core::{
        geometry::Bounds,
        semantic::{Edge, GridCell, PortFlow, Section},
    };

    use super::*;
    use crate::layout::SectionLayout;

    fn frame(ctx: &mut LayoutContext, id: Id, number: usize, direction: Direction, col: usize, row: usize) {
        let mut frame = SectionLayout::new(id, number, direction, Bounds::default());
        frame.set_grid(GridCell::new(col, row));
        ctx.insert_section(frame);
    }

    fn port(id: &str, section: Id, side: PortSide, flow: PortFlow) -> Station {
        Station::port(
            Id::new(id),
            Port::new(section, side, flow, vec![Id::new("rv_red")]),
        )
        .with_section(section)
    }

    fn edge(src: &str, tgt: &str) -> Edge {
        Edge::new(Id::new(src), Id::new(tgt), vec![Id::new("rv_red")])
    }

    /// fold (TB) drops through its bottom into `back` (RL), which continues
    /// left into `tail` on the same row.
    fn fold_graph() -> (MetroGraph, LayoutContext) {
        let (fold, back, tail) = (Id::new("rv_fold"), Id::new("rv_back"), Id::new("rv_tail"));
        let graph = MetroGraph::new()
            .with_section(Section::new(fold, "Fold"))
            .with_section(Section::new(back, "Back"))
            .with_section(Section::new(tail, "Tail"))
            .with_station(Station::new(Id::new("rv_a"), "a").with_section(fold))
            .with_station(Station::new(Id::new("rv_b"), "b").with_section(back))
            .with_station(Station::new(Id::new("rv_c"), "c").with_section(tail))
            .with_station(port("rv_fold_out", fold, PortSide::Bottom, PortFlow::Exit))
            .with_station(port("rv_back_in", back, PortSide::Top, PortFlow::Entry))
            .with_station(port("rv_back_out", back, PortSide::Left, PortFlow::Exit))
            .with_station(port("rv_tail_in", tail, PortSide::Right, PortFlow::Entry))
            .with_edge(edge("rv_a", "rv_fold_out"))
            .with_edge(edge("rv_fold_out", "rv_back_in"))
            .with_edge(edge("rv_back_in", "rv_b"))
            .with_edge(edge("rv_b", "rv_back_out"))
            .with_edge(edge("rv_back_out", "rv_tail_in"))
            .with_edge(edge("rv_tail_in", "rv_c"));

        let mut ctx = LayoutContext::new();
        frame(&mut ctx, fold, 1, Direction::TopToBottom, 2, 0);
        frame(&mut ctx, back, 2, Direction::RightToLeft, 2, 1);
        frame(&mut ctx, tail, 3, Direction::RightToLeft, 1, 1);
        (graph, ctx)
    }

    #[test]
    fn test_bottom_exit_reverses_and_propagates_along_row() {
        let (graph, ctx) = fold_graph();
        let reversed = detect_reversed_sections(&graph, &ctx);

        assert!(!reversed.contains(&Id::new("rv_fold")));
        assert!(reversed.contains(&Id::new("rv_back")));
        assert!(reversed.contains(&Id::new("rv_tail")));
    }

    #[test]
    fn test_side_exit_of_tb_section_reverses_target() {
        let (tb, next) = (Id::new("rv_tb"), Id::new("rv_next"));
        let graph = MetroGraph::new()
            .with_section(Section::new(tb, "Tb"))
            .with_section(Section::new(next, "Next"))
            .with_station(Station::new(Id::new("rv_x"), "x").with_section(tb))
            .with_station(Station::new(Id::new("rv_y"), "y").with_section(next))
            .with_station(port("rv_tb_out", tb, PortSide::Right, PortFlow::Exit))
            .with_station(port("rv_next_in", next, PortSide::Left, PortFlow::Entry))
            .with_edge(edge("rv_x", "rv_tb_out"))
            .with_edge(edge("rv_tb_out", "rv_next_in"))
            .with_edge(edge("rv_next_in", "rv_y"));
        let mut ctx = LayoutContext::new();
        frame(&mut ctx, tb, 1, Direction::TopToBottom, 0, 0);
        frame(&mut ctx, next, 2, Direction::LeftToRight, 1, 0);

        let reversed = detect_reversed_sections(&graph, &ctx);
        assert_eq!(reversed.len(), 1);
        assert!(reversed.contains(&next));
    }

    #[test]
    fn test_plain_chain_is_not_reversed() {
        let (a, b) = (Id::new("rv_pa"), Id::new("rv_pb"));
        let graph = MetroGraph::new()
            .with_section(Section::new(a, "A"))
            .with_section(Section::new(b, "B"))
            .with_station(Station::new(Id::new("rv_p1"), "1").with_section(a))
            .with_station(Station::new(Id::new("rv_p2"), "2").with_section(b))
            .with_station(port("rv_pa_out", a, PortSide::Right, PortFlow::Exit))
            .with_station(port("rv_pb_in", b, PortSide::Left, PortFlow::Entry))
            .with_edge(edge("rv_p1", "rv_pa_out"))
            .with_edge(edge("rv_pa_out", "rv_pb_in"))
            .with_edge(edge("rv_pb_in", "rv_p2"));
        let mut ctx = LayoutContext::new();
        frame(&mut ctx, a, 1, Direction::LeftToRight, 0, 0);
        frame(&mut ctx, b, 2, Direction::LeftToRight, 1, 0);

        assert!(detect_reversed_sections(&graph, &ctx).is_empty());
    }
}
