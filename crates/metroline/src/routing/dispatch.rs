//! Ordered route dispatch.
//!
//! Every (edge, line) is routed by exactly one handler: the first of
//! [`RouteKind::PRIORITY`] whose predicate matches. The order is part of
//! the contract; more specific shapes come first.
//!
//! | Priority | Kind | Matches |
//! |---|---|---|
//! | 1 | [`RouteKind::InterSection`] | port or junction to port or junction |
//! | 2 | [`RouteKind::VerticalInternal`] | station to station (or bottom exit) inside a TB section |
//! | 3 | [`RouteKind::VerticalExit`] | station to left/right exit port of a TB section |
//! | 4 | [`RouteKind::VerticalEntry`] | left/right entry port of a TB section to station |
//! | 5 | [`RouteKind::PerpendicularEntry`] | top/bottom port to station |
//! | 6 | [`RouteKind::Default`] | anything else, horizontal runs joined by diagonals |

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use log::{debug, trace};

use metroline_core::{
    geometry::Point,
    identifier::Id,
    semantic::{Direction, Edge, MetroGraph, Port, PortSide, Station},
};

use crate::{
    config::RoutingConfig,
    error::MetroError,
    layout::{LayoutContext, engine::CHAR_WIDTH},
    routing::{
        COORD_TOLERANCE, COORD_TOLERANCE_FINE, CROSS_ROW_THRESHOLD, FOLD_MARGIN, MIN_STRAIGHT_EDGE,
        MIN_STRAIGHT_PORT, RoutedPath,
        bundle::{self, BundleKey, BundleSlot},
        corners,
        offsets::StationOffsets,
    },
    structure::FlowGraph,
};

/// Routing handler of an (edge, line).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKind {
    /// L-shaped run between sections through a bundled vertical channel.
    InterSection,
    /// Vertical run between stations of a top-to-bottom section.
    VerticalInternal,
    /// Vertical drop turning into a side exit of a top-to-bottom section.
    VerticalExit,
    /// Side entry of a top-to-bottom section turning into a vertical drop.
    VerticalEntry,
    /// Top or bottom port curving into the flow of its section.
    PerpendicularEntry,
    /// Horizontal runs joined by a diagonal, or a fold crossing.
    Default,
}

impl RouteKind {
    /// Handlers in dispatch order.
    pub const PRIORITY: [RouteKind; 6] = [
        RouteKind::InterSection,
        RouteKind::VerticalInternal,
        RouteKind::VerticalExit,
        RouteKind::VerticalEntry,
        RouteKind::PerpendicularEntry,
        RouteKind::Default,
    ];

    /// Returns the first handler matching an edge from `source` to `target`.
    ///
    /// `tb_sections` holds the sections flowing top to bottom.
    pub fn classify(graph: &MetroGraph, tb_sections: &HashSet<Id>, source: Id, target: Id) -> Self {
        Self::PRIORITY
            .into_iter()
            .find(|kind| kind.matches(graph, tb_sections, source, target))
            .unwrap_or(RouteKind::Default)
    }

    fn matches(self, graph: &MetroGraph, tb_sections: &HashSet<Id>, source: Id, target: Id) -> bool {
        let (Some(src), Some(tgt)) = (graph.station(source), graph.station(target)) else {
            return self == RouteKind::Default;
        };
        let src_port = src.as_port();
        let tgt_port = tgt.as_port();
        let in_tb = |station: &Station| station.section().is_some_and(|s| tb_sections.contains(&s));
        let same_section = src.section().is_some() && src.section() == tgt.section();

        match self {
            RouteKind::InterSection => src.is_boundary() && tgt.is_boundary(),
            RouteKind::VerticalInternal => {
                let bottom_exit =
                    tgt_port.is_some_and(|p| !p.is_entry() && p.side() == PortSide::Bottom);
                same_section
                    && in_tb(src)
                    && src_port.is_none()
                    && (tgt_port.is_none() || bottom_exit)
            }
            RouteKind::VerticalExit => {
                let side_exit =
                    tgt_port.is_some_and(|p| !p.is_entry() && p.side().is_left_or_right());
                side_exit && src_port.is_none() && in_tb(src) && same_section
            }
            RouteKind::VerticalEntry => {
                let side_entry =
                    src_port.is_some_and(|p| p.is_entry() && p.side().is_left_or_right());
                side_entry && tgt_port.is_none() && in_tb(src)
            }
            RouteKind::PerpendicularEntry => {
                src_port.is_some_and(|p| p.side().is_top_or_bottom()) && tgt_port.is_none()
            }
            RouteKind::Default => true,
        }
    }
}

/// Endpoints of one (edge, line) being routed.
#[derive(Debug, Clone, Copy)]
struct Leg {
    source: Id,
    target: Id,
    line: Id,
    src: Point,
    tgt: Point,
}

impl Leg {
    fn dx(&self) -> f32 {
        self.tgt.x() - self.src.x()
    }

    fn dy(&self) -> f32 {
        self.tgt.y() - self.src.y()
    }

    fn path(&self, points: Vec<Point>) -> RoutedPath {
        RoutedPath::new(self.source, self.target, self.line, points)
    }

    fn straight(&self) -> RoutedPath {
        self.path(vec![self.src, self.tgt])
    }
}

/// Shared lookups of one routing run.
pub(crate) struct Router<'a> {
    graph: &'a MetroGraph,
    ctx: &'a LayoutContext,
    config: &'a RoutingConfig,
    offsets: &'a StationOffsets,
    tb_sections: HashSet<Id>,
    tb_right_entry: HashSet<Id>,
    bottom_exit_junctions: IndexMap<Id, Id>,
    bundles: HashMap<BundleKey, BundleSlot>,
    station_lines: HashMap<Id, Vec<Id>>,
    forks: HashSet<Id>,
    joins: HashSet<Id>,
    fold_x: f32,
}

impl<'a> Router<'a> {
    pub(crate) fn new(
        graph: &'a MetroGraph,
        ctx: &'a LayoutContext,
        config: &'a RoutingConfig,
        line_order: &[Id],
        offsets: &'a StationOffsets,
    ) -> Result<Self, MetroError> {
        let tb_sections: HashSet<Id> = ctx
            .sections()
            .filter(|f| f.direction() == Direction::TopToBottom)
            .map(|f| f.id())
            .collect();

        let ports: Vec<(Id, &Port)> = graph
            .ports()
            .filter_map(|s| s.as_port().map(|p| (s.id(), p)))
            .collect();
        let tb_right_entry: HashSet<Id> = ports
            .iter()
            .filter(|(_, p)| {
                p.is_entry() && p.side() == PortSide::Right && tb_sections.contains(&p.section())
            })
            .map(|(_, p)| p.section())
            .collect();

        let mut bottom_exit_junctions = IndexMap::new();
        for edge in graph.edges() {
            let feeds_junction = graph.station(edge.target()).is_some_and(Station::is_junction);
            let from_bottom = ports
                .iter()
                .any(|(id, p)| *id == edge.source() && !p.is_entry() && p.side() == PortSide::Bottom);
            if feeds_junction && from_bottom {
                bottom_exit_junctions.insert(edge.target(), edge.source());
            }
        }

        let priority: HashMap<Id, usize> = line_order
            .iter()
            .enumerate()
            .map(|(idx, &line)| (line, idx))
            .collect();
        let bundles = bundle::compute_bundles(graph, ctx, &priority, &bottom_exit_junctions)?;

        let flow = FlowGraph::from_graph(graph);
        let forks: HashSet<Id> = flow.nodes().filter(|&id| flow.successors(id).len() > 1).collect();
        let joins: HashSet<Id> = flow.nodes().filter(|&id| flow.predecessors(id).len() > 1).collect();
        let station_lines: HashMap<Id, Vec<Id>> = graph
            .stations()
            .map(|s| (s.id(), graph.station_lines(s.id())))
            .collect();
        let fold_x = ctx
            .coordinates()
            .values()
            .map(|p| p.x())
            .reduce(f32::max)
            .unwrap_or(0.0);

        Ok(Self {
            graph,
            ctx,
            config,
            offsets,
            tb_sections,
            tb_right_entry,
            bottom_exit_junctions,
            bundles,
            station_lines,
            forks,
            joins,
            fold_x,
        })
    }

    /// Routes every (edge, line) in edge order.
    ///
    /// A perpendicular entry fed by a run at its own height absorbs that
    /// run: one combined route replaces the two, starting at the upstream
    /// station.
    pub(crate) fn route_all(&self) -> Result<Vec<RoutedPath>, MetroError> {
        let (upstreams, absorbed) = self.merged_upstreams()?;
        let mut routes = Vec::new();
        for edge in self.graph.edges() {
            let kind = RouteKind::classify(self.graph, &self.tb_sections, edge.source(), edge.target());
            for &line in edge.lines() {
                let key = (edge.source(), edge.target(), line);
                if absorbed.contains(&key) {
                    continue;
                }
                let leg = self.leg(edge, line)?;
                let route = match kind {
                    RouteKind::InterSection => self.route_inter_section(&leg),
                    RouteKind::VerticalInternal => self.route_vertical_internal(&leg),
                    RouteKind::VerticalExit => self.route_vertical_exit(&leg),
                    RouteKind::VerticalEntry => self.route_vertical_entry(&leg),
                    RouteKind::PerpendicularEntry => {
                        let upstream = match upstreams.get(&key) {
                            Some(&id) => Some((id, self.ctx.require(id)?)),
                            None => None,
                        };
                        self.route_perpendicular_entry(&leg, upstream)
                    }
                    RouteKind::Default => self.route_default(&leg),
                };
                trace!(
                    source = edge.source().as_string(),
                    target = edge.target().as_string(),
                    line = line.as_string(),
                    kind:? = kind;
                    "Routed edge"
                );
                routes.push(route);
            }
        }
        Ok(routes)
    }

    fn leg(&self, edge: &Edge, line: Id) -> Result<Leg, MetroError> {
        Ok(Leg {
            source: edge.source(),
            target: edge.target(),
            line,
            src: self.ctx.require(edge.source())?,
            tgt: self.ctx.require(edge.target())?,
        })
    }

    /// Finds perpendicular entries whose feeding run arrives at the same
    /// height, except drops from TB bottom exits, which stay separate.
    #[allow(clippy::type_complexity)]
    fn merged_upstreams(&self) -> Result<(HashMap<BundleKey, Id>, HashSet<BundleKey>), MetroError> {
        let mut upstreams = HashMap::new();
        let mut absorbed = HashSet::new();
        for edge in self.graph.edges() {
            let kind = RouteKind::classify(self.graph, &self.tb_sections, edge.source(), edge.target());
            if kind != RouteKind::PerpendicularEntry {
                continue;
            }
            let entry = edge.source();
            let entry_y = self.ctx.require(entry)?.y();
            for &line in edge.lines() {
                for feeder in self.graph.edges() {
                    if feeder.target() != entry || !feeder.carries(line) {
                        continue;
                    }
                    let upstream = feeder.source();
                    if self.is_tb_bottom_exit(upstream) {
                        continue;
                    }
                    let Some(point) = self.ctx.position(upstream) else {
                        continue;
                    };
                    if (point.y() - entry_y).abs() > COORD_TOLERANCE {
                        continue;
                    }
                    debug!(
                        upstream = upstream.as_string(),
                        entry = entry.as_string(),
                        line = line.as_string();
                        "Merged run into perpendicular entry"
                    );
                    upstreams.insert((entry, edge.target(), line), upstream);
                    absorbed.insert((upstream, entry, line));
                    break;
                }
            }
        }
        Ok((upstreams, absorbed))
    }

    // =========================================================================
    // Handlers
    // =========================================================================

    fn route_inter_section(&self, leg: &Leg) -> RoutedPath {
        let (dx, dy) = (leg.dx(), leg.dy());
        let (src, tgt) = (leg.src, leg.tgt);

        if dy.abs() < COORD_TOLERANCE_FINE {
            return leg.straight().with_inter_section(true);
        }

        // Drops from a TB bottom exit keep the section's x offsets, even
        // when the target entry sits slightly to the side.
        if self.is_tb_bottom_exit(leg.source) {
            let x_off = self.drop_offset(leg.source, leg.line);
            return leg
                .path(vec![
                    Point::new(src.x() + x_off, src.y()),
                    Point::new(tgt.x() + x_off, tgt.y()),
                ])
                .with_inter_section(true)
                .with_offsets_applied(true);
        }

        if dx.abs() < COORD_TOLERANCE {
            return leg.straight().with_inter_section(true);
        }

        // Below a bottom exit junction: drop first, then run across.
        if let Some(&exit) = self.bottom_exit_junctions.get(&leg.source) {
            let x_off = self.drop_offset(exit, leg.line);
            let tgt_off = self.offsets.get(leg.target, leg.line);
            let x = src.x() + x_off;
            return leg
                .path(vec![
                    Point::new(x, src.y()),
                    Point::new(x, tgt.y() + tgt_off),
                    Point::new(tgt.x(), tgt.y() + tgt_off),
                ])
                .with_inter_section(true)
                .with_curve_radii(vec![self.config.curve_radius() + x_off])
                .with_offsets_applied(true);
        }

        let slot = self
            .bundles
            .get(&(leg.source, leg.target, leg.line))
            .copied()
            .unwrap_or_default();
        let step = self.config.offset_step();
        let radius = self.config.curve_radius();
        let shape = corners::l_shape(slot.index(), slot.count(), dy > 0.0, step, radius);
        let max_radius = radius + slot.count().saturating_sub(1) as f32 * step;
        let channel = bundle::channel_x(
            self.graph,
            self.ctx,
            (leg.source, src),
            (leg.target, tgt),
            max_radius,
            step,
        );
        let x = channel + shape.delta;
        leg.path(vec![
            src,
            Point::new(x, src.y()),
            Point::new(x, tgt.y()),
            tgt,
        ])
        .with_inter_section(true)
        .with_curve_radii(vec![shape.first_radius, shape.second_radius])
    }

    fn route_vertical_internal(&self, leg: &Leg) -> RoutedPath {
        let src_off = self.offsets.get(leg.source, leg.line);
        let tgt_off = self.offsets.get(leg.target, leg.line);
        let right_entry = self.has_right_entry(leg.source);
        let (x_src, x_tgt) = if right_entry {
            (src_off, tgt_off)
        } else {
            (
                self.reversed(leg.source, src_off),
                self.reversed(leg.target, tgt_off),
            )
        };
        leg.path(vec![
            Point::new(leg.src.x() + x_src, leg.src.y()),
            Point::new(leg.tgt.x() + x_tgt, leg.tgt.y()),
        ])
        .with_offsets_applied(true)
    }

    fn route_vertical_exit(&self, leg: &Leg) -> RoutedPath {
        let exit_right = self.port(leg.target).is_some_and(|p| p.side() == PortSide::Right);
        let src_off = self.offsets.get(leg.source, leg.line);
        let max_off = self.offsets.max_of(leg.source, self.lines_at(leg.source));
        let corner = corners::tb_exit_corner(src_off, max_off, exit_right, self.config.curve_radius());

        let x = leg.src.x() + corner.vertical_offset;
        let y = leg.tgt.y() + corner.horizontal_offset;
        leg.path(vec![
            Point::new(x, leg.src.y()),
            Point::new(x, y),
            Point::new(leg.tgt.x(), y),
        ])
        .with_curve_radii(vec![corner.radius])
        .with_offsets_applied(true)
    }

    fn route_vertical_entry(&self, leg: &Leg) -> RoutedPath {
        let entry_right = self.port(leg.source).is_some_and(|p| p.side() == PortSide::Right);
        let src_off = self.offsets.get(leg.source, leg.line);
        let tgt_off = self.offsets.get(leg.target, leg.line);
        let max_off = self.offsets.max_of(leg.target, self.lines_at(leg.target));
        let (x_off, radius) =
            corners::tb_entry_corner(tgt_off, max_off, entry_right, self.config.curve_radius());

        let x = leg.tgt.x() + x_off;
        let y = leg.src.y() + src_off;
        leg.path(vec![
            Point::new(leg.src.x(), y),
            Point::new(x, y),
            Point::new(x, leg.tgt.y()),
        ])
        .with_curve_radii(vec![radius])
        .with_offsets_applied(true)
    }

    fn route_perpendicular_entry(&self, leg: &Leg, upstream: Option<(Id, Point)>) -> RoutedPath {
        let radius = self.config.curve_radius();
        let src_off = self.offsets.get(leg.source, leg.line);
        let tgt_off = self.offsets.get(leg.target, leg.line);
        let (src, tgt) = (leg.src, leg.tgt);
        let target_y = tgt.y() + tgt_off;

        let Some((up_id, up)) = upstream else {
            if leg.dx().abs() < COORD_TOLERANCE {
                return leg
                    .path(vec![
                        Point::new(src.x() + src_off, src.y()),
                        Point::new(tgt.x(), target_y),
                    ])
                    .with_offsets_applied(true);
            }
            let x = src.x() + src_off;
            return leg
                .path(vec![
                    Point::new(x, src.y()),
                    Point::new(x, target_y),
                    Point::new(tgt.x(), target_y),
                ])
                .with_curve_radii(vec![radius + src_off])
                .with_offsets_applied(true);
        };

        let up_y = up.y() + self.offsets.get(up_id, leg.line);
        let combined = if (up.x() - src.x()).abs() < COORD_TOLERANCE {
            // The upstream sits straight above or below the port: swing out
            // through the inter-column channel.
            let channel = bundle::channel_x(
                self.graph,
                self.ctx,
                (up_id, up),
                (leg.target, tgt),
                radius,
                self.config.offset_step(),
            );
            let x = channel + src_off;
            RoutedPath::new(
                up_id,
                leg.target,
                leg.line,
                vec![
                    Point::new(up.x(), up_y),
                    Point::new(x, up_y),
                    Point::new(x, target_y),
                    Point::new(tgt.x(), target_y),
                ],
            )
            .with_curve_radii(vec![radius, radius + src_off])
        } else {
            let max_off = self.offsets.max_of(leg.target, self.lines_at(leg.target));
            let rev = corners::reversed_offset(tgt_off, max_off);
            let x = tgt.x() + rev;
            RoutedPath::new(
                up_id,
                leg.target,
                leg.line,
                vec![
                    Point::new(up.x(), up_y),
                    Point::new(x, up_y),
                    Point::new(x, target_y),
                ],
            )
            .with_curve_radii(vec![radius + rev])
        };
        combined.with_offsets_applied(true)
    }

    fn route_default(&self, leg: &Leg) -> RoutedPath {
        let (dx, dy) = (leg.dx(), leg.dy());
        let (src, tgt) = (leg.src, leg.tgt);

        // Backward runs between rows of a folded flow cross at the fold edge.
        if dx <= 0.0 && dy.abs() > CROSS_ROW_THRESHOLD {
            let x = self.fold_x + FOLD_MARGIN;
            return leg.path(vec![src, Point::new(x, src.y()), Point::new(x, tgt.y()), tgt]);
        }
        if dy.abs() < COORD_TOLERANCE_FINE || dx.abs() < COORD_TOLERANCE {
            return leg.straight();
        }

        let sign = dx.signum();
        let half_diag = self.config.diagonal_run() / 2.0;
        let min_straight = if self.port(leg.source).is_some() || self.port(leg.target).is_some() {
            self.config.curve_radius() + MIN_STRAIGHT_PORT
        } else {
            MIN_STRAIGHT_EDGE
        };

        // Forks and joins keep the straight run past their label.
        let mut src_min = min_straight;
        let mut tgt_min = min_straight;
        if self.forks.contains(&leg.source) {
            if let Some(width) = self.label_half_width(leg.source) {
                src_min = src_min.max(width);
            }
        }
        if self.joins.contains(&leg.target) {
            if let Some(width) = self.label_half_width(leg.target) {
                tgt_min = tgt_min.max(width);
            }
        }

        // Diverge close to a fork rather than halfway.
        let mid_x = if self.forks.contains(&leg.source) {
            src.x() + sign * (src_min + half_diag)
        } else {
            (src.x() + tgt.x()) / 2.0
        };
        let mut start = mid_x - sign * half_diag;
        let mut end = mid_x + sign * half_diag;
        if sign > 0.0 {
            start = start.max(src.x() + src_min);
            end = end.min(tgt.x() - tgt_min);
            if end < start {
                start = (start + end) / 2.0;
                end = start;
            }
        } else {
            start = start.min(src.x() - src_min);
            end = end.max(tgt.x() + tgt_min);
            if end > start {
                start = (start + end) / 2.0;
                end = start;
            }
        }
        let (start, end) = self.clear_stations(leg, sign, (start, end), tgt.x() - sign * tgt_min);

        leg.path(vec![
            src,
            Point::new(start, src.y()),
            Point::new(end, tgt.y()),
            tgt,
        ])
    }

    /// Slides a diagonal forward past stations of the same section that sit
    /// between the two tracks inside its span, as long as it still ends
    /// before `limit`.
    fn clear_stations(&self, leg: &Leg, sign: f32, (mut start, mut end): (f32, f32), limit: f32) -> (f32, f32) {
        let low = leg.src.y().min(leg.tgt.y()) + COORD_TOLERANCE;
        let high = leg.src.y().max(leg.tgt.y()) - COORD_TOLERANCE;
        let section = self.graph.section_of(leg.source);

        for station in self.graph.stations() {
            let id = station.id();
            if station.is_boundary() || station.section() != section || id == leg.source || id == leg.target {
                continue;
            }
            let Some(p) = self.ctx.position(id) else {
                continue;
            };
            let (lo_x, hi_x) = (start.min(end), start.max(end));
            if p.y() <= low || p.y() >= high || p.x() < lo_x - COORD_TOLERANCE || p.x() > hi_x + COORD_TOLERANCE {
                continue;
            }
            let shift = p.x() + sign * MIN_STRAIGHT_EDGE - start;
            if sign * (limit - (end + shift)) >= 0.0 {
                debug!(station = id.as_string(), shift; "Moved diagonal off station");
                start += shift;
                end += shift;
            }
        }
        (start, end)
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    fn port(&self, id: Id) -> Option<&Port> {
        self.graph.station(id).and_then(Station::as_port)
    }

    fn lines_at(&self, id: Id) -> &[Id] {
        self.station_lines.get(&id).map(Vec::as_slice).unwrap_or_default()
    }

    fn is_tb_bottom_exit(&self, id: Id) -> bool {
        self.port(id).is_some_and(|p| {
            !p.is_entry() && p.side() == PortSide::Bottom && self.tb_sections.contains(&p.section())
        })
    }

    fn has_right_entry(&self, station: Id) -> bool {
        self.graph
            .section_of(station)
            .is_some_and(|s| self.tb_right_entry.contains(&s))
    }

    fn reversed(&self, station: Id, offset: f32) -> f32 {
        corners::reversed_offset(offset, self.offsets.max_of(station, self.lines_at(station)))
    }

    /// X offset of a vertical drop below a TB exit: kept for sections
    /// entered from the right, reversed otherwise.
    fn drop_offset(&self, exit: Id, line: Id) -> f32 {
        let offset = self.offsets.get(exit, line);
        if self.has_right_entry(exit) {
            offset
        } else {
            self.reversed(exit, offset)
        }
    }

    fn label_half_width(&self, id: Id) -> Option<f32> {
        let label = self.graph.station(id)?.label().trim();
        if label.is_empty() {
            return None;
        }
        Some(label.chars().count() as f32 * CHAR_WIDTH / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use metroline_core::semantic::{PortFlow, Section};

    use super::*;

    fn ids(names: &[&str]) -> Vec<Id> {
        names.iter().map(|n| Id::new(n)).collect()
    }

    fn port(id: &str, section: Id, side: PortSide, flow: PortFlow) -> Station {
        Station::port(Id::new(id), Port::new(section, side, flow, ids(&["dp_r"]))).with_section(section)
    }

    fn classify_graph() -> (MetroGraph, HashSet<Id>) {
        let (tb, lr) = (Id::new("dp_tb"), Id::new("dp_lr"));
        let graph = MetroGraph::new()
            .with_section(Section::new(tb, "Tb"))
            .with_section(Section::new(lr, "Lr"))
            .with_station(Station::new(Id::new("dp_t1"), "t1").with_section(tb))
            .with_station(Station::new(Id::new("dp_t2"), "t2").with_section(tb))
            .with_station(Station::new(Id::new("dp_l1"), "l1").with_section(lr))
            .with_station(Station::new(Id::new("dp_l2"), "l2").with_section(lr))
            .with_station(port("dp_tb_in", tb, PortSide::Left, PortFlow::Entry))
            .with_station(port("dp_tb_out", tb, PortSide::Right, PortFlow::Exit))
            .with_station(port("dp_tb_bottom", tb, PortSide::Bottom, PortFlow::Exit))
            .with_station(port("dp_lr_top", lr, PortSide::Top, PortFlow::Entry))
            .with_station(Station::junction(Id::new("dp_j")));
        let tb_sections = [tb].into_iter().collect();
        (graph, tb_sections)
    }

    #[test]
    fn test_classify_follows_priority() {
        let (graph, tb) = classify_graph();
        let kind = |src: &str, tgt: &str| RouteKind::classify(&graph, &tb, Id::new(src), Id::new(tgt));

        assert_eq!(kind("dp_tb_out", "dp_j"), RouteKind::InterSection);
        assert_eq!(kind("dp_j", "dp_lr_top"), RouteKind::InterSection);
        assert_eq!(kind("dp_t1", "dp_t2"), RouteKind::VerticalInternal);
        assert_eq!(kind("dp_t2", "dp_tb_bottom"), RouteKind::VerticalInternal);
        assert_eq!(kind("dp_t2", "dp_tb_out"), RouteKind::VerticalExit);
        assert_eq!(kind("dp_tb_in", "dp_t1"), RouteKind::VerticalEntry);
        assert_eq!(kind("dp_lr_top", "dp_l1"), RouteKind::PerpendicularEntry);
        assert_eq!(kind("dp_l1", "dp_l2"), RouteKind::Default);
        assert_eq!(kind("dp_missing", "dp_l2"), RouteKind::Default);
    }

    #[test]
    fn test_priority_lists_every_kind_once() {
        let unique: HashSet<RouteKind> = RouteKind::PRIORITY.into_iter().collect();
        assert_eq!(unique.len(), RouteKind::PRIORITY.len());
        assert_eq!(RouteKind::PRIORITY.last(), Some(&RouteKind::Default));
    }
}
