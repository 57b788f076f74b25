//! Bundle corridors between sections.
//!
//! Inter-section runs that share a vertical channel form a bundle. Each
//! (edge, line) of a bundle gets a slot `(index, count)` so parallel lines
//! are spread across the channel instead of drawn on top of each other.
//! Slots follow the spatial order of the sources, so no two lines cross
//! when the bundle turns its corners.

use std::collections::HashMap;

use indexmap::IndexMap;
use log::trace;

use metroline_core::{
    geometry::Point,
    identifier::Id,
    semantic::{MetroGraph, Station},
};

use crate::{error::MetroError, layout::LayoutContext};

use super::{COORD_TOLERANCE, COORD_TOLERANCE_FINE};

/// Position of one (edge, line) in its bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundleSlot {
    index: usize,
    count: usize,
}

impl BundleSlot {
    pub fn new(index: usize, count: usize) -> Self {
        Self { index, count }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

impl Default for BundleSlot {
    fn default() -> Self {
        Self::new(0, 1)
    }
}

/// Key of a bundle slot: (source, target, line).
pub type BundleKey = (Id, Id, Id);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Corridor {
    /// Straight vertical run at a shared x.
    Vertical { x: i64, down: bool },
    /// L-shape leaving a shared source x.
    Elbow { x: i64, down: bool, right: bool },
}

#[derive(Debug, Clone, Copy)]
struct Member {
    source: Id,
    target: Id,
    line: Id,
    source_y: f32,
    target_y: f32,
}

/// Assigns bundle slots to every inter-section (edge, line).
///
/// An edge is inter-section when both ends are ports or junctions.
/// `bottom_exit_junctions` maps junctions fed by a bottom exit port to that
/// port; their runs drop first, so the longest drop takes the outer slot.
///
/// # Errors
///
/// Returns [`MetroError::Layout`] if an endpoint has no position.
pub fn compute_bundles(
    graph: &MetroGraph,
    ctx: &LayoutContext,
    priority: &HashMap<Id, usize>,
    bottom_exit_junctions: &IndexMap<Id, Id>,
) -> Result<HashMap<BundleKey, BundleSlot>, MetroError> {
    let mut corridors: IndexMap<Corridor, Vec<Member>> = IndexMap::new();
    for edge in graph.edges() {
        if !(graph.is_boundary(edge.source()) && graph.is_boundary(edge.target())) {
            continue;
        }
        let src = ctx.require(edge.source())?;
        let tgt = ctx.require(edge.target())?;
        let (dx, dy) = (tgt.x() - src.x(), tgt.y() - src.y());
        if dy.abs() < COORD_TOLERANCE_FINE {
            continue;
        }

        let down = dy > 0.0;
        let x = src.x().round() as i64;
        let corridor = if dx.abs() < COORD_TOLERANCE {
            Corridor::Vertical { x, down }
        } else {
            Corridor::Elbow { x, down, right: dx > 0.0 }
        };
        let members = corridors.entry(corridor).or_default();
        for &line in edge.lines() {
            members.push(Member {
                source: edge.source(),
                target: edge.target(),
                line,
                source_y: src.y(),
                target_y: tgt.y(),
            });
        }
    }

    let rank = |line: Id| priority.get(&line).copied().unwrap_or(usize::MAX);
    let mut slots = HashMap::new();
    for (corridor, mut members) in corridors {
        let first_source = members[0].source;
        let single_source = members.iter().all(|m| m.source == first_source);
        let exit_port = graph
            .station(first_source)
            .and_then(Station::as_port)
            .filter(|p| !p.is_entry());

        if single_source && bottom_exit_junctions.contains_key(&first_source) {
            members.sort_by(|a, b| {
                b.target_y
                    .total_cmp(&a.target_y)
                    .then_with(|| rank(a.line).cmp(&rank(b.line)))
            });
        } else if single_source && exit_port.is_some() {
            let source_y = line_source_y(graph, ctx, first_source);
            let y_of = |line: Id| source_y.get(&line).copied().unwrap_or(0.0);
            members.sort_by(|a, b| {
                y_of(a.line)
                    .total_cmp(&y_of(b.line))
                    .then_with(|| rank(a.line).cmp(&rank(b.line)))
            });
        } else if single_source {
            members.sort_by_key(|m| rank(m.line));
        } else {
            members.sort_by(|a, b| {
                a.source_y
                    .total_cmp(&b.source_y)
                    .then_with(|| rank(a.line).cmp(&rank(b.line)))
            });
        }

        trace!(corridor:? = corridor, members = members.len(); "Bundled corridor");
        let count = members.len();
        for (index, member) in members.iter().enumerate() {
            slots.insert(
                (member.source, member.target, member.line),
                BundleSlot::new(index, count),
            );
        }
    }
    Ok(slots)
}

/// Y of the internal station feeding `port` for each line.
pub fn line_source_y(graph: &MetroGraph, ctx: &LayoutContext, port: Id) -> HashMap<Id, f32> {
    let mut line_y = HashMap::new();
    for edge in graph.edges().iter().filter(|e| e.target() == port) {
        if graph.is_boundary(edge.source()) {
            continue;
        }
        let Some(point) = ctx.position(edge.source()) else {
            continue;
        };
        for &line in edge.lines() {
            line_y.insert(line, point.y());
        }
    }
    line_y
}

/// X of the vertical channel of an L-shape from `src` to `tgt`.
///
/// When both ends belong to sections in different grid columns, the
/// channel runs through the middle of the gap between the two columns,
/// measured against every section stacked in them. Otherwise it sits just
/// beside the source, clear of the widest corner.
pub fn channel_x(
    graph: &MetroGraph,
    ctx: &LayoutContext,
    (src_id, src): (Id, Point),
    (tgt_id, tgt): (Id, Point),
    max_radius: f32,
    offset_step: f32,
) -> f32 {
    let dx = tgt.x() - src.x();
    let col_of = |id: Id| {
        graph
            .section_of(id)
            .and_then(|s| ctx.section(s))
            .map(|f| f.grid().col())
    };

    if let (Some(src_col), Some(tgt_col)) = (col_of(src_id), col_of(tgt_id)) {
        if src_col != tgt_col {
            let column = |col: usize| {
                ctx.sections()
                    .filter(move |f| f.grid().col() == col && f.bounds().width() > 0.0)
                    .map(|f| f.bounds())
            };
            return if dx > 0.0 {
                let right = column(src_col).map(|b| b.max_x()).reduce(f32::max).unwrap_or(src.x());
                let left = column(tgt_col).map(|b| b.min_x()).reduce(f32::min).unwrap_or(tgt.x());
                (right + left) / 2.0
            } else {
                let left = column(src_col).map(|b| b.min_x()).reduce(f32::min).unwrap_or(src.x());
                let right = column(tgt_col).map(|b| b.max_x()).reduce(f32::max).unwrap_or(tgt.x());
                (left + right) / 2.0
            };
        }
    }

    if dx > 0.0 {
        src.x() + max_radius + offset_step
    } else {
        src.x() - max_radius - offset_step
    }
}
