//! Coordinate orchestrator.
//!
//! [`Engine::compute`] turns a resolved graph into a [`LayoutContext`] by
//! running a fixed sequence of phases. Each phase reads what earlier phases
//! wrote and never revisits their decisions:
//!
//! 1. Internal layout of each section over its real stations, in local
//!    coordinates, with direction-specific sizing adjustments.
//! 2. Section placement on the meta-grid.
//! 3. Global mapping of stations and section boxes.
//! 4. Port positioning on section boundaries.
//! 5. Junction positioning next to their exit ports.
//! 6. Entry-port alignment with incoming runs.
//! 7. Exit-port alignment on row-spanning and TB sections.
//! 8. Elbow clearance for perpendicular ports.
//! 9. Junction re-positioning against the final port coordinates.
//!
//! A graph without sections gets a flat layout instead: layering and
//! ordering over every station, with no boxes, ports or junctions.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use log::{debug, info, trace, warn};

use metroline_core::{
    geometry::{Bounds, Point, Size},
    identifier::Id,
    semantic::{Direction, Edge, MetroGraph, Port, PortSide, Station},
};

use crate::{
    config::LayoutConfig,
    error::MetroError,
    layout::{
        auto_layout::Inference,
        context::{LayoutContext, SectionLayout},
        layers::assign_layers,
        ordering::{assign_tracks, line_priority},
        placement,
    },
    structure::{FlowGraph, SectionDag},
};

/// Approximate glyph advance used to estimate label widths.
pub(crate) const CHAR_WIDTH: f32 = 7.0;
const LABEL_PAD: f32 = 6.0;
/// Distance from a TB station marker to the end of its label.
const LABEL_MARKER_GAP: f32 = 11.0;
/// Per-line offset of parallel lines through a TB station.
const TB_LINE_Y_OFFSET: f32 = 3.0;
const JUNCTION_MARGIN: f32 = 10.0;
const MIN_PORT_STATION_GAP: f32 = 16.0;
const ENTRY_SHIFT_TB: f32 = 0.6;
const ENTRY_SHIFT_TB_CROSS: f32 = 1.0;
const ENTRY_INSET_LR: f32 = 0.3;
const EXIT_GAP_MULTIPLIER: f32 = 0.4;

/// Local layout of one section's real stations.
#[derive(Debug, Clone)]
struct LocalSection {
    stations: IndexMap<Id, Point>,
    layers: IndexMap<Id, usize>,
    origin: Point,
    size: Size,
}

impl LocalSection {
    fn shift(&mut self, dx: f32, dy: f32) {
        let delta = Point::new(dx, dy);
        for point in self.stations.values_mut() {
            *point = point.add_point(delta);
        }
    }

    fn grow(&mut self, dw: f32, dh: f32) {
        self.size = Size::new(self.size.width() + dw, self.size.height() + dh);
    }

    fn min_x(&self) -> f32 {
        self.stations.values().map(|p| p.x()).fold(f32::INFINITY, f32::min)
    }

    fn bounds(&self) -> Bounds {
        Bounds::new_from_top_left(self.origin, self.size)
    }
}

/// The phase orchestrator over one resolved graph.
pub struct Engine<'a> {
    graph: &'a MetroGraph,
    inference: &'a Inference,
    config: &'a LayoutConfig,
    flow: FlowGraph,
    dag: SectionDag,
    line_order: Vec<Id>,
}

impl<'a> Engine<'a> {
    /// Creates an engine for a resolved graph.
    ///
    /// `inference` supplies effective grid cells, directions and fold flags.
    pub fn new(graph: &'a MetroGraph, inference: &'a Inference, config: &'a LayoutConfig) -> Self {
        Self {
            graph,
            inference,
            config,
            flow: FlowGraph::from_graph(graph),
            dag: SectionDag::from_graph(graph),
            line_order: line_priority(graph, config.line_order()),
        }
    }

    /// Runs every phase and returns the filled layout context.
    ///
    /// # Errors
    ///
    /// Returns [`MetroError::Cycle`] if a section, or the whole graph of a
    /// sectionless layout, is cyclic, and [`MetroError::Layout`] if a phase
    /// misses a frame it requires.
    pub fn compute(&self) -> Result<LayoutContext, MetroError> {
        let mut ctx = LayoutContext::new();
        if self.graph.section_count() == 0 {
            self.compute_flat(&mut ctx)?;
            return Ok(ctx);
        }
        info!(sections = self.graph.section_count(); "Computing section layout");

        let mut locals: IndexMap<Id, LocalSection> = IndexMap::new();
        for (idx, section) in self.graph.sections().enumerate() {
            let id = section.id();
            let direction = self.inference.direction(id);
            let local = self.layout_section(id, direction)?;
            let bounds = local.as_ref().map_or_else(Bounds::default, LocalSection::bounds);
            ctx.insert_section(
                SectionLayout::new(id, idx + 1, direction, bounds)
                    .with_fold(self.inference.is_fold(id)),
            );
            if let Some(local) = local {
                locals.insert(id, local);
            }
        }

        placement::place_sections(&mut ctx, &self.dag, self.inference.cells(), self.config);
        self.map_to_global(&mut ctx, &locals)?;

        for section in self.graph.sections() {
            placement::position_ports(&mut ctx, self.graph, section.id(), self.config)?;
        }
        self.position_junctions(&mut ctx);
        self.align_entry_ports(&mut ctx);
        self.align_exit_ports(&mut ctx);
        self.clear_port_elbows(&mut ctx);
        self.position_junctions(&mut ctx);

        for station in self.graph.stations() {
            if ctx.position(station.id()).is_none() {
                warn!(station = station.id().as_string(); "Station outside every section left at origin");
                ctx.set_position(station.id(), Point::default());
            }
        }
        Ok(ctx)
    }

    // =========================================================================
    // Flat layout
    // =========================================================================

    fn compute_flat(&self, ctx: &mut LayoutContext) -> Result<(), MetroError> {
        let layers = assign_layers(&self.flow, "graph")?;
        if layers.is_empty() {
            return Ok(());
        }
        info!(stations = layers.len(); "Computing flat layout");

        let tracks = assign_tracks(&self.flow, &layers, &self.line_order);
        let ranks = track_ranks(&tracks);
        let extra = self.fork_join_gaps(self.flow.edges(), &layers);

        for station in self.graph.stations() {
            let id = station.id();
            let layer = layers.get(&id).copied().unwrap_or(0);
            let rank = ranks.get(&id).copied().unwrap_or(0);
            let x = self.config.x_offset()
                + layer as f32 * self.config.x_spacing()
                + extra.get(&layer).copied().unwrap_or(0.0);
            let y = self.config.y_offset() + rank as f32 * self.config.y_spacing();
            ctx.set_position(id, Point::new(x, y));
        }
        Ok(())
    }

    // =========================================================================
    // Internal section layout
    // =========================================================================

    /// Lays out the real stations of a section in local coordinates.
    ///
    /// Returns `None` for a section without real stations.
    fn layout_section(
        &self,
        section: Id,
        direction: Direction,
    ) -> Result<Option<LocalSection>, MetroError> {
        let members = self.graph.section_stations(section);
        let real: Vec<Id> = members
            .iter()
            .copied()
            .filter(|&id| !self.graph.is_boundary(id))
            .collect();
        if real.is_empty() {
            return Ok(None);
        }

        let sub = self.flow.subgraph(real);
        let layers = assign_layers(&sub, &format!("section `{section}`"))?;
        let tracks = assign_tracks(&sub, &layers, &self.line_order);
        let ranks = track_ranks(&tracks);

        // Edges to the section's own ports count as forks and joins too.
        let member_set: HashSet<Id> = members.into_iter().collect();
        let extra = self.fork_join_gaps(
            self.flow
                .edges()
                .iter()
                .filter(|e| member_set.contains(&e.source()) && member_set.contains(&e.target())),
            &layers,
        );

        let (x_spacing, y_spacing) = (self.config.x_spacing(), self.config.y_spacing());
        let mut stations: IndexMap<Id, Point> = IndexMap::new();
        for (&id, &layer) in &layers {
            let rank = ranks.get(&id).copied().unwrap_or(0) as f32;
            let along = layer as f32 * if direction == Direction::TopToBottom { y_spacing } else { x_spacing }
                + extra.get(&layer).copied().unwrap_or(0.0);
            let point = if direction == Direction::TopToBottom {
                Point::new(rank * x_spacing, along)
            } else {
                Point::new(along, rank * y_spacing)
            };
            stations.insert(id, point);
        }

        normalize_min(&mut stations, false);
        if direction == Direction::RightToLeft {
            self.mirror(&mut stations);
        }
        normalize_min(&mut stations, true);

        let mut local = self.enclose(stations, layers, direction);
        self.adjust_tb_labels(&mut local, &sub, direction);
        self.adjust_tb_entry_shifts(&mut local, section, direction);
        self.adjust_lr_entry_inset(&mut local, section, direction);
        self.adjust_lr_exit_gap(&mut local, section, direction);

        trace!(
            section = section.as_string(),
            bounds:? = local.bounds(),
            stations = local.stations.len();
            "Laid out section"
        );
        Ok(Some(local))
    }

    /// Mirrors x so layer 0 is rightmost.
    ///
    /// The anchor is the rightmost station that is not an unlabeled terminus,
    /// so extra terminus layers extend leftward without moving the entry.
    fn mirror(&self, stations: &mut IndexMap<Id, Point>) {
        let is_anchor = |id: &Id| {
            !self
                .graph
                .station(*id)
                .is_some_and(|s| s.is_terminus() && s.label().trim().is_empty())
        };
        let anchored = stations
            .iter()
            .filter(|(id, _)| is_anchor(id))
            .map(|(_, p)| p.x())
            .fold(None, |acc: Option<f32>, x| Some(acc.map_or(x, |a| a.max(x))));
        let max_x = anchored.unwrap_or_else(|| {
            stations.values().map(|p| p.x()).fold(f32::NEG_INFINITY, f32::max)
        });
        for point in stations.values_mut() {
            *point = point.with_x(max_x - point.x());
        }
    }

    /// Frames local stations with padding and a minimum inner extent of one
    /// spacing along the flow axis, stations centered within it.
    fn enclose(
        &self,
        mut stations: IndexMap<Id, Point>,
        layers: IndexMap<Id, usize>,
        direction: Direction,
    ) -> LocalSection {
        let (min, max) = extent(&stations);
        let mut inner = Size::new(max.x() - min.x(), max.y() - min.y());

        if direction == Direction::TopToBottom {
            let target = self.config.y_spacing();
            if inner.height() < target {
                let shift = (target - inner.height()) / 2.0;
                for point in stations.values_mut() {
                    *point = point.with_y(point.y() + shift);
                }
                inner = Size::new(inner.width(), target);
            }
        } else {
            let target = self.config.x_spacing();
            if inner.width() < target {
                let shift = (target - inner.width()) / 2.0;
                for point in stations.values_mut() {
                    *point = point.with_x(point.x() + shift);
                }
                inner = Size::new(target, inner.height());
            }
        }

        let pad_x = self.config.section_x_padding();
        let pad_y = self.config.section_y_padding();
        LocalSection {
            stations,
            layers,
            origin: Point::new(min.x() - pad_x, min.y() - pad_y),
            size: Size::new(inner.width() + 2.0 * pad_x, inner.height() + 2.0 * pad_y),
        }
    }

    /// Makes room left of a TB section's stations for their labels.
    fn adjust_tb_labels(&self, local: &mut LocalSection, sub: &FlowGraph, direction: Direction) {
        if direction != Direction::TopToBottom {
            return;
        }
        let mut max_extent = 0.0_f32;
        for &id in local.stations.keys() {
            let Some(label) = self.label(id) else {
                continue;
            };
            let n_lines = sub.lines_at(id).len() as f32;
            let extent = (n_lines - 1.0) * TB_LINE_Y_OFFSET / 2.0
                + LABEL_MARKER_GAP
                + label.chars().count() as f32 * CHAR_WIDTH;
            max_extent = max_extent.max(extent);
        }

        let need_left = max_extent + LABEL_PAD;
        let have_left = local.min_x() - local.origin.x();
        if need_left > have_left {
            let extra = need_left - have_left;
            local.shift(extra, 0.0);
            local.grow(extra, 0.0);
        }
    }

    /// Shifts TB stations down below perpendicular and cross-column top entries.
    fn adjust_tb_entry_shifts(&self, local: &mut LocalSection, section: Id, direction: Direction) {
        if direction != Direction::TopToBottom {
            return;
        }
        let entries: Vec<(Id, &Port)> = self
            .section_ports(section)
            .into_iter()
            .filter(|(_, p)| p.is_entry())
            .collect();

        if entries.iter().any(|(_, p)| p.side().is_left_or_right()) {
            let shift = self.config.y_spacing() * ENTRY_SHIFT_TB;
            local.shift(0.0, shift);
            local.grow(0.0, shift);
        }

        let my_col = self.grid_col(section);
        let cross_column_top = entries
            .iter()
            .filter(|(_, p)| p.side() == PortSide::Top)
            .any(|(id, _)| {
                self.flow.incoming_edges(*id).any(|edge| {
                    self.graph
                        .section_of(edge.source())
                        .is_some_and(|src| self.grid_col(src) != my_col)
                })
            });
        if cross_column_top {
            let shift = self.config.y_spacing() * ENTRY_SHIFT_TB_CROSS;
            local.shift(0.0, shift);
            local.grow(0.0, shift);
        }
    }

    /// Widens LR/RL sections entered from the top or bottom.
    fn adjust_lr_entry_inset(&self, local: &mut LocalSection, section: Id, direction: Direction) {
        if !direction.is_horizontal() {
            return;
        }
        let perpendicular_entry = self
            .section_ports(section)
            .iter()
            .any(|(_, p)| p.is_entry() && p.side().is_top_or_bottom());
        if perpendicular_entry {
            local.grow(self.config.x_spacing() * ENTRY_INSET_LR, 0.0);
        }
    }

    /// Adds label clearance on the flow side of LR/RL sections exiting there.
    fn adjust_lr_exit_gap(&self, local: &mut LocalSection, section: Id, direction: Direction) {
        if !direction.is_horizontal() {
            return;
        }
        let flow_side = if direction == Direction::LeftToRight {
            PortSide::Right
        } else {
            PortSide::Left
        };
        let flow_exit = self
            .section_ports(section)
            .iter()
            .any(|(_, p)| !p.is_entry() && p.side() == flow_side);
        let Some(max_layer) = local.layers.values().copied().max() else {
            return;
        };
        if !flow_exit {
            return;
        }

        let max_label_half = local
            .layers
            .iter()
            .filter(|&(_, &layer)| layer == max_layer)
            .filter_map(|(&id, _)| self.label(id))
            .map(|label| label.chars().count() as f32 * CHAR_WIDTH / 2.0)
            .fold(0.0_f32, f32::max);
        let gap = (self.config.x_spacing() * EXIT_GAP_MULTIPLIER).max(max_label_half);
        if direction == Direction::RightToLeft {
            local.shift(gap, 0.0);
        }
        local.grow(gap, 0.0);
    }

    /// Extra flow-axis offset per layer around forks and joins.
    ///
    /// A gap is added before each join layer and after each fork layer, wide
    /// enough for the widest label at that layer.
    fn fork_join_gaps<'e>(
        &self,
        edges: impl IntoIterator<Item = &'e Edge>,
        layers: &IndexMap<Id, usize>,
    ) -> HashMap<usize, f32> {
        let mut out_targets: HashMap<Id, HashSet<Id>> = HashMap::new();
        let mut in_sources: HashMap<Id, HashSet<Id>> = HashMap::new();
        for edge in edges {
            out_targets.entry(edge.source()).or_default().insert(edge.target());
            in_sources.entry(edge.target()).or_default().insert(edge.source());
        }

        let layers_over = |map: &HashMap<Id, HashSet<Id>>| -> HashSet<usize> {
            map.iter()
                .filter(|(_, others)| others.len() > 1)
                .filter_map(|(id, _)| layers.get(id).copied())
                .collect()
        };
        let fork_layers = layers_over(&out_targets);
        let join_layers = layers_over(&in_sources);
        if fork_layers.is_empty() && join_layers.is_empty() {
            return HashMap::new();
        }

        let base_gap = self.config.x_spacing() * EXIT_GAP_MULTIPLIER;
        let layer_gap = |layer: usize| -> f32 {
            layers
                .iter()
                .filter(|&(_, &l)| l == layer)
                .filter_map(|(&id, _)| self.label(id))
                .map(|label| label.chars().count() as f32 * CHAR_WIDTH / 2.0)
                .fold(base_gap, f32::max)
        };

        let max_layer = layers.values().copied().max().unwrap_or(0);
        let mut cumulative = 0.0;
        let mut extra = HashMap::new();
        for layer in 0..=max_layer {
            if join_layers.contains(&layer) {
                cumulative += layer_gap(layer);
            }
            extra.insert(layer, cumulative);
            if fork_layers.contains(&layer) {
                cumulative += layer_gap(layer);
            }
        }
        extra
    }

    // =========================================================================
    // Global mapping
    // =========================================================================

    fn map_to_global(
        &self,
        ctx: &mut LayoutContext,
        locals: &IndexMap<Id, LocalSection>,
    ) -> Result<(), MetroError> {
        let base = Point::new(self.config.x_offset(), self.config.y_offset());
        for (&section, local) in locals {
            let shift = ctx.require_section(section)?.offset().add_point(base);
            for (&id, &point) in &local.stations {
                ctx.set_position(id, point.add_point(shift));
            }
        }
        for frame in ctx.sections_mut() {
            let bounds = frame.bounds().translate(frame.offset().add_point(base));
            frame.set_bounds(bounds);
        }
        Ok(())
    }

    // =========================================================================
    // Junctions and port alignment
    // =========================================================================

    /// Places each junction next to the exit port feeding it.
    ///
    /// A junction fed through a bottom port sits below it; any other sits
    /// beside it, toward the nearest entry port it feeds.
    fn position_junctions(&self, ctx: &mut LayoutContext) {
        for junction in self.graph.junctions() {
            let jid = junction.id();
            let exit = self
                .flow
                .incoming_edges(jid)
                .filter(|e| self.port(e.source()).is_some())
                .filter_map(|e| ctx.position(e.source()).map(|p| (e.source(), p)))
                .last();
            let entry_xs: Vec<f32> = self
                .flow
                .outgoing_edges(jid)
                .filter(|e| self.port(e.target()).is_some())
                .filter_map(|e| ctx.position(e.target()))
                .map(|p| p.x())
                .collect();
            let Some((exit_id, exit)) = exit else {
                continue;
            };
            if entry_xs.is_empty() {
                continue;
            }

            let point = if self.port(exit_id).is_some_and(|p| p.side() == PortSide::Bottom) {
                Point::new(exit.x(), exit.y() + JUNCTION_MARGIN)
            } else {
                let mut nearest = entry_xs[0];
                for &x in &entry_xs[1..] {
                    if (x - exit.x()).abs() < (nearest - exit.x()).abs() {
                        nearest = x;
                    }
                }
                let step = if nearest > exit.x() { JUNCTION_MARGIN } else { -JUNCTION_MARGIN };
                Point::new(exit.x() + step, exit.y())
            };
            debug!(junction = jid.as_string(), x = point.x(), y = point.y(); "Positioned junction");
            ctx.set_position(jid, point);
        }
    }

    /// Aligns entry ports with the runs feeding them.
    fn align_entry_ports(&self, ctx: &mut LayoutContext) {
        for station in self.graph.ports() {
            let Some(port) = station.as_port() else {
                continue;
            };
            if !port.is_entry() {
                continue;
            }
            let Some(frame) = ctx.section(port.section()).cloned() else {
                continue;
            };
            if port.side().is_left_or_right() {
                self.align_side_entry(ctx, station.id(), &frame);
            } else {
                self.align_vertical_entry(ctx, station.id(), port.side(), &frame);
            }
        }
    }

    /// LEFT/RIGHT entry: take the y of the first boundary source in the same
    /// grid row, if it falls within the entry section.
    fn align_side_entry(&self, ctx: &mut LayoutContext, pid: Id, frame: &SectionLayout) {
        for edge in self.flow.incoming_edges(pid) {
            let src = edge.source();
            if !self.graph.is_boundary(src) {
                continue;
            }
            let Some(src_row) = self
                .source_section(src)
                .and_then(|s| ctx.section(s))
                .map(|f| f.grid().row())
            else {
                continue;
            };
            let Some(src_point) = ctx.position(src) else {
                continue;
            };

            if frame.grid().row() == src_row {
                let bounds = frame.bounds();
                if src_point.y() < bounds.min_y() || src_point.y() > bounds.max_y() {
                    break;
                }
                let mut target_y = src_point.y();
                if frame.direction() == Direction::TopToBottom {
                    target_y = self.clamp_tb_entry(ctx, frame, target_y, src);
                }
                debug!(port = pid.as_string(), y = target_y; "Aligned entry port");
                ctx.set_y(pid, target_y);
            }
            break;
        }
    }

    /// Keeps a TB section's side entry above its first station.
    ///
    /// When the entry has to move up, the source (and the exit port behind a
    /// junction source) moves with it so the run stays straight. The topmost
    /// station feeding the exit port is preferred as the new level.
    fn clamp_tb_entry(&self, ctx: &mut LayoutContext, frame: &SectionLayout, target_y: f32, src: Id) -> f32 {
        let Some(first_y) = self
            .internal_points(ctx, frame.id())
            .into_iter()
            .map(|p| p.y())
            .reduce(f32::min)
        else {
            return target_y;
        };
        let max_y = first_y - MIN_PORT_STATION_GAP;
        if target_y <= max_y {
            return target_y;
        }

        let src_is_junction = self.graph.station(src).is_some_and(Station::is_junction);
        let exit_port = if src_is_junction {
            self.flow
                .incoming_edges(src)
                .map(Edge::source)
                .find(|&id| self.port(id).is_some())
                .unwrap_or(src)
        } else {
            src
        };
        let top_source_y = self
            .flow
            .incoming_edges(exit_port)
            .map(Edge::source)
            .filter(|&id| !self.graph.is_boundary(id))
            .filter_map(|id| ctx.position(id))
            .map(|p| p.y())
            .reduce(f32::min);

        let clamped = match top_source_y {
            Some(y) if y < max_y => y,
            _ => max_y,
        };

        ctx.set_y(src, clamped);
        if src_is_junction {
            let feeding: Vec<Id> = self
                .flow
                .incoming_edges(src)
                .map(Edge::source)
                .filter(|&id| self.port(id).is_some())
                .collect();
            for id in feeding {
                ctx.set_y(id, clamped);
            }
        }
        clamped
    }

    /// TOP/BOTTOM entry: from another column, take the nearest source level;
    /// from the same column, take the first source x for a straight drop.
    fn align_vertical_entry(&self, ctx: &mut LayoutContext, pid: Id, side: PortSide, frame: &SectionLayout) {
        let sources: Vec<(Point, Option<Id>)> = self
            .flow
            .incoming_edges(pid)
            .map(Edge::source)
            .filter(|&src| self.graph.is_boundary(src))
            .filter_map(|src| ctx.position(src).map(|p| (p, self.source_section(src))))
            .collect();
        let Some(&(first, _)) = sources.first() else {
            return;
        };

        let cross_column = sources.iter().any(|(_, section)| {
            section
                .and_then(|s| ctx.section(s))
                .is_some_and(|src_frame| !src_frame.grid().overlaps_cols(&frame.grid()))
        });

        if cross_column {
            let ys = sources.iter().map(|(p, _)| p.y());
            let level = if side == PortSide::Top {
                ys.fold(f32::INFINITY, f32::min)
            } else {
                ys.fold(f32::NEG_INFINITY, f32::max)
            };
            let bounds = frame.bounds();
            let target_y = level.max(bounds.min_y()).min(bounds.max_y());
            ctx.set_y(pid, target_y);
            if frame.direction().is_horizontal() {
                let toward = if frame.direction() == Direction::RightToLeft {
                    PortSide::Right
                } else {
                    PortSide::Left
                };
                self.nudge_from_stations(ctx, pid, frame, toward);
            }
        } else {
            ctx.set_x(pid, first.x());
        }
    }

    /// Moves a TOP/BOTTOM port off the x of any internal station, toward
    /// `toward`, clamped inside the section.
    fn nudge_from_stations(&self, ctx: &mut LayoutContext, pid: Id, frame: &SectionLayout, toward: PortSide) {
        let Some(port_point) = ctx.position(pid) else {
            return;
        };
        let xs: Vec<f32> = self
            .internal_points(ctx, frame.id())
            .into_iter()
            .map(|p| p.x())
            .collect();
        let tolerance = self.config.elbow_tolerance();
        if !xs.iter().any(|x| (port_point.x() - x).abs() < tolerance) {
            return;
        }

        let bounds = frame.bounds();
        let new_x = if toward == PortSide::Right {
            let max_x = xs.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            (max_x + tolerance).min(bounds.max_x() - tolerance)
        } else {
            let min_x = xs.iter().copied().fold(f32::INFINITY, f32::min);
            (min_x - tolerance).max(bounds.min_x() + tolerance)
        };
        debug!(port = pid.as_string(), x = new_x; "Nudged port off station");
        ctx.set_x(pid, new_x);
    }

    /// Aligns LEFT/RIGHT exit ports of row-spanning and TB sections with the
    /// entry port they feed, unless that leaves the section.
    fn align_exit_ports(&self, ctx: &mut LayoutContext) {
        for station in self.graph.ports() {
            let Some(port) = station.as_port() else {
                continue;
            };
            if port.is_entry() || !port.side().is_left_or_right() {
                continue;
            }
            let Some(frame) = ctx.section(port.section()).cloned() else {
                continue;
            };
            if frame.grid().row_span() <= 1 && frame.direction() != Direction::TopToBottom {
                continue;
            }

            let Some(edge) = self.flow.outgoing_edges(station.id()).next() else {
                continue;
            };
            let target = edge.target();
            // Fan-outs go to several levels; none is preferable.
            let Some(target_port) = self.port(target) else {
                continue;
            };
            if target_port.side().is_top_or_bottom() {
                continue;
            }
            let Some(target_point) = ctx.position(target) else {
                continue;
            };
            let bounds = frame.bounds();
            if target_point.y() < bounds.min_y() || target_point.y() > bounds.max_y() {
                continue;
            }
            debug!(port = station.id().as_string(), y = target_point.y(); "Aligned exit port");
            ctx.set_y(station.id(), target_point.y());
        }
    }

    /// Moves perpendicular ports off the cross-axis coordinate of internal
    /// stations so no station becomes the elbow of a turning line.
    ///
    /// Side ports of TB sections go above the first station (entries) or
    /// below the last one (exits). Top and bottom ports of LR/RL sections
    /// move past the stations toward their entry or exit side.
    fn clear_port_elbows(&self, ctx: &mut LayoutContext) {
        let tolerance = self.config.elbow_tolerance();
        for station in self.graph.ports() {
            let Some(port) = station.as_port() else {
                continue;
            };
            let Some(frame) = ctx.section(port.section()).cloned() else {
                continue;
            };
            if !frame.direction().is_perpendicular(port.side()) {
                continue;
            }
            let pid = station.id();
            let Some(point) = ctx.position(pid) else {
                continue;
            };
            let internal = self.internal_points(ctx, frame.id());

            if port.side().is_left_or_right() {
                if !internal.iter().any(|p| (p.y() - point.y()).abs() <= tolerance) {
                    continue;
                }
                let bounds = frame.bounds();
                let ys = internal.iter().map(|p| p.y());
                let y = if port.is_entry() {
                    let first = ys.fold(f32::INFINITY, f32::min);
                    (first - MIN_PORT_STATION_GAP).max(bounds.min_y())
                } else {
                    let last = ys.fold(f32::NEG_INFINITY, f32::max);
                    (last + MIN_PORT_STATION_GAP).min(bounds.max_y())
                };
                debug!(port = pid.as_string(), y = y; "Cleared port elbow");
                ctx.set_y(pid, y);
            } else {
                let reversed = frame.direction() == Direction::RightToLeft;
                let toward = if port.is_entry() == reversed {
                    PortSide::Right
                } else {
                    PortSide::Left
                };
                self.nudge_from_stations(ctx, pid, &frame, toward);
            }
        }
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    fn port(&self, id: Id) -> Option<&Port> {
        self.graph.station(id).and_then(Station::as_port)
    }

    fn section_ports(&self, section: Id) -> Vec<(Id, &Port)> {
        self.graph
            .ports()
            .filter_map(|s| s.as_port().map(|p| (s.id(), p)))
            .filter(|(_, p)| p.section() == section)
            .collect()
    }

    /// Non-empty trimmed label of a station.
    fn label(&self, id: Id) -> Option<&str> {
        self.graph
            .station(id)
            .map(Station::label)
            .filter(|label| !label.trim().is_empty())
    }

    /// Grid column known before placement, explicit or inferred.
    fn grid_col(&self, section: Id) -> usize {
        self.inference.cell(section).map_or(0, |c| c.col())
    }

    /// Section of a boundary station. A junction belongs to the section
    /// feeding it.
    fn source_section(&self, id: Id) -> Option<Id> {
        if self.graph.station(id)?.is_junction() {
            self.flow
                .incoming_edges(id)
                .find_map(|e| self.graph.section_of(e.source()))
        } else {
            self.graph.section_of(id)
        }
    }

    /// Positions of the non-port stations of a section.
    fn internal_points(&self, ctx: &LayoutContext, section: Id) -> Vec<Point> {
        self.graph
            .section_stations(section)
            .into_iter()
            .filter(|&id| self.port(id).is_none())
            .filter_map(|id| ctx.position(id))
            .collect()
    }
}

/// Rank of each station's track among the distinct tracks, ascending.
fn track_ranks(tracks: &IndexMap<Id, f32>) -> IndexMap<Id, usize> {
    let mut unique: Vec<f32> = tracks.values().copied().collect();
    unique.sort_by(f32::total_cmp);
    unique.dedup();
    tracks
        .iter()
        .map(|(&id, track)| {
            let rank = unique
                .binary_search_by(|probe| probe.total_cmp(track))
                .unwrap_or(0);
            (id, rank)
        })
        .collect()
}

/// Shifts stations so the minimum coordinate on one axis is 0.
fn normalize_min(stations: &mut IndexMap<Id, Point>, x_axis: bool) {
    let axis = |p: &Point| if x_axis { p.x() } else { p.y() };
    let min = stations.values().map(axis).fold(f32::INFINITY, f32::min);
    if !min.is_finite() || min == 0.0 {
        return;
    }
    for point in stations.values_mut() {
        *point = if x_axis {
            point.with_x(point.x() - min)
        } else {
            point.with_y(point.y() - min)
        };
    }
}

/// Component-wise minimum and maximum of a non-empty point set.
fn extent(stations: &IndexMap<Id, Point>) -> (Point, Point) {
    let mut min = Point::new(f32::INFINITY, f32::INFINITY);
    let mut max = Point::new(f32::NEG_INFINITY, f32::NEG_INFINITY);
    for point in stations.values() {
        min = Point::new(min.x().min(point.x()), min.y().min(point.y()));
        max = Point::new(max.x().max(point.x()), max.y().max(point.y()));
    }
    (min, max)
}

#[cfg(test)]
mod tests {
    use float_cmp::approx_eq;
    use metroline_core::{
        color::Color,
        semantic::{Line, Section},
    };

    use super::*;
    use crate::{config::InferenceConfig, layout::auto_layout::infer};

    fn compute(graph: &MetroGraph) -> LayoutContext {
        let dag = SectionDag::from_graph(graph);
        let inference = infer(graph, &dag, &InferenceConfig::default());
        let config = LayoutConfig::default();
        Engine::new(graph, &inference, &config).compute().unwrap()
    }

    fn line(id: &str) -> Line {
        Line::new(Id::new(id), id, Color::default())
    }

    fn assert_point(ctx: &LayoutContext, id: &str, x: f32, y: f32) {
        let point = ctx.position(Id::new(id)).unwrap();
        assert!(approx_eq!(f32, point.x(), x, epsilon = 0.01), "{id}: x {} != {x}", point.x());
        assert!(approx_eq!(f32, point.y(), y, epsilon = 0.01), "{id}: y {} != {y}", point.y());
    }

    #[test]
    fn test_single_section_two_stations() {
        let sec = Id::new("en_sec");
        let graph = MetroGraph::new()
            .with_line(line("en_red"))
            .with_section(Section::new(sec, "Section"))
            .with_station(Station::new(Id::new("en_a"), "A").with_section(sec))
            .with_station(Station::new(Id::new("en_b"), "B").with_section(sec))
            .with_edge(Edge::new(Id::new("en_a"), Id::new("en_b"), vec![Id::new("en_red")]));

        let ctx = compute(&graph);
        assert_point(&ctx, "en_a", 80.0, 120.0);
        assert_point(&ctx, "en_b", 140.0, 120.0);

        let frame = ctx.section(sec).unwrap();
        assert_eq!(frame.number(), 1);
        let bounds = frame.bounds();
        assert!(approx_eq!(f32, bounds.min_x(), 30.0));
        assert!(approx_eq!(f32, bounds.min_y(), 85.0));
        assert!(approx_eq!(f32, bounds.width(), 160.0));
        assert!(approx_eq!(f32, bounds.height(), 70.0));
    }

    #[test]
    fn test_single_station_gets_minimum_extent() {
        let sec = Id::new("en_lonely_sec");
        let graph = MetroGraph::new()
            .with_section(Section::new(sec, "Lonely"))
            .with_station(Station::new(Id::new("en_lonely"), "Lonely").with_section(sec));

        let ctx = compute(&graph);
        // Centered in one x spacing of inner width.
        assert_point(&ctx, "en_lonely", 110.0, 120.0);
        let bounds = ctx.section(sec).unwrap().bounds();
        assert!(approx_eq!(f32, bounds.width(), 160.0));
        assert!(approx_eq!(f32, bounds.min_x(), 30.0));
    }

    #[test]
    fn test_flat_layout_fork_gap() {
        let red = Id::new("fl_red");
        let blue = Id::new("fl_blue");
        let graph = MetroGraph::new()
            .with_line(line("fl_red"))
            .with_line(line("fl_blue"))
            .with_station(Station::new(Id::new("fl_f"), ""))
            .with_station(Station::new(Id::new("fl_x"), ""))
            .with_station(Station::new(Id::new("fl_y"), ""))
            .with_edge(Edge::new(Id::new("fl_f"), Id::new("fl_x"), vec![red]))
            .with_edge(Edge::new(Id::new("fl_f"), Id::new("fl_y"), vec![blue]));

        let ctx = compute(&graph);
        assert_point(&ctx, "fl_f", 80.0, 120.0);
        // Layer 1 comes after a fork gap of 0.4 * 60.
        assert_point(&ctx, "fl_x", 164.0, 120.0);
        assert_point(&ctx, "fl_y", 164.0, 160.0);
        assert!(ctx.sections().next().is_none());
    }

    #[test]
    fn test_rl_section_mirrors() {
        let sec = Id::new("rl_sec");
        let graph = MetroGraph::new()
            .with_line(line("rl_red"))
            .with_section(Section::new(sec, "Back").with_direction(Direction::RightToLeft))
            .with_station(Station::new(Id::new("rl_a"), "A").with_section(sec))
            .with_station(Station::new(Id::new("rl_b"), "B").with_section(sec))
            .with_edge(Edge::new(Id::new("rl_a"), Id::new("rl_b"), vec![Id::new("rl_red")]));

        let ctx = compute(&graph);
        assert_point(&ctx, "rl_a", 140.0, 120.0);
        assert_point(&ctx, "rl_b", 80.0, 120.0);
    }

    #[test]
    fn test_tb_section_makes_label_room() {
        let sec = Id::new("tb_sec");
        let graph = MetroGraph::new()
            .with_line(line("tb_red"))
            .with_section(Section::new(sec, "Down").with_direction(Direction::TopToBottom))
            .with_station(Station::new(Id::new("tb_a"), "Alignment").with_section(sec))
            .with_station(Station::new(Id::new("tb_b"), "B").with_section(sec))
            .with_edge(Edge::new(Id::new("tb_a"), Id::new("tb_b"), vec![Id::new("tb_red")]));

        let ctx = compute(&graph);
        // Label extent 11 + 9 * 7 = 74, plus 6 padding, exceeds the 50 padding by 30.
        assert_point(&ctx, "tb_a", 110.0, 120.0);
        assert_point(&ctx, "tb_b", 110.0, 160.0);
        let bounds = ctx.section(sec).unwrap().bounds();
        assert!(approx_eq!(f32, bounds.width(), 130.0));
        assert!(approx_eq!(f32, bounds.min_x(), 30.0));
    }

    #[test]
    fn test_track_ranks_compact() {
        let mut tracks = IndexMap::new();
        tracks.insert(Id::new("tr_a"), -1.5);
        tracks.insert(Id::new("tr_b"), 4.0);
        tracks.insert(Id::new("tr_c"), -1.5);
        tracks.insert(Id::new("tr_d"), 0.0);
        let ranks = track_ranks(&tracks);
        assert_eq!(ranks.values().copied().collect::<Vec<_>>(), vec![0, 2, 0, 1]);
    }
}
