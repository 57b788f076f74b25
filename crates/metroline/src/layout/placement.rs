//! Section placement on the meta-grid.
//!
//! Sections are columns of a topological layering of the section dependency
//! graph, stacked into rows within each column. Explicit or inferred grid
//! cells pin sections; the rest fill free rows in declaration order. Column
//! widths and row heights come from the local section boxes.
//!
//! # Overview
//!
//! - [`topological_columns`] - Longest-path columns of the section graph.
//! - [`place_sections`] - Grid assignment, placement offsets and span sizing.
//! - [`position_ports`] - Ports on the boundary of their section.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use indexmap::IndexMap;
use log::{debug, info};

use metroline_core::{
    geometry::Point,
    identifier::Id,
    semantic::{Direction, GridCell, MetroGraph, PortSide},
};

use crate::{
    config::LayoutConfig,
    error::MetroError,
    layout::context::{LayoutContext, SectionLayout},
    structure::SectionDag,
};

/// Assigns each section the column of a breadth-first topological layering.
///
/// Sections outside the dependency graph get column 0. The result follows
/// the order of `sections`.
pub fn topological_columns(sections: &[Id], dag: &SectionDag) -> IndexMap<Id, usize> {
    let mut in_degree: HashMap<Id, usize> = sections.iter().map(|&id| (id, 0)).collect();
    for (_, tgt) in dag.dependencies() {
        if let Some(degree) = in_degree.get_mut(&tgt) {
            *degree += 1;
        }
    }

    let mut cols: HashMap<Id, usize> = HashMap::new();
    let mut queue: VecDeque<Id> = VecDeque::new();
    for &id in sections {
        if in_degree.get(&id) == Some(&0) {
            queue.push_back(id);
            cols.insert(id, 0);
        }
    }

    while let Some(id) = queue.pop_front() {
        let next_col = cols.get(&id).copied().unwrap_or(0) + 1;
        for tgt in dag.successors(id) {
            let col = cols.entry(tgt).or_insert(next_col);
            if next_col > *col {
                *col = next_col;
            }
            if let Some(degree) = in_degree.get_mut(&tgt) {
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    queue.push_back(tgt);
                }
            }
        }
    }

    sections
        .iter()
        .map(|&id| (id, cols.get(&id).copied().unwrap_or(0)))
        .collect()
}

/// Places every section frame of `ctx` on the canvas.
///
/// Frames must hold local bounds. On return each frame has its effective
/// grid cell, its placement offset and its span-adjusted bounds, still local.
/// `cells` holds the explicit or inferred cell of each pinned section.
pub fn place_sections(
    ctx: &mut LayoutContext,
    dag: &SectionDag,
    cells: &IndexMap<Id, GridCell>,
    config: &LayoutConfig,
) {
    let ids: Vec<Id> = ctx.sections().map(SectionLayout::id).collect();
    if ids.is_empty() {
        return;
    }
    info!(sections = ids.len(); "Placing sections");

    assign_grid(ctx, &ids, dag, cells);
    let (min_col, max_col) = compute_offsets(ctx, config);
    enforce_min_column_gaps(ctx, min_col, max_col, config.min_section_gap());
}

/// Puts every section into a grid cell.
///
/// Columns come from the section DAG unless the section has an explicit
/// cell. Within a column, sections without a cell fill the free rows in
/// declaration order; the row of their predecessor is not preferred. A
/// row is taken when an explicit cell of the column, or one spanning into
/// it from the left, covers it.
fn assign_grid(
    ctx: &mut LayoutContext,
    ids: &[Id],
    dag: &SectionDag,
    cells: &IndexMap<Id, GridCell>,
) {
    let mut cols = topological_columns(ids, dag);
    for (id, cell) in cells {
        if let Some(col) = cols.get_mut(id) {
            *col = cell.col();
        }
    }

    let mut groups: BTreeMap<usize, Vec<Id>> = BTreeMap::new();
    for (&id, &col) in &cols {
        groups.entry(col).or_default().push(id);
    }

    let mut rows: HashMap<Id, usize> = HashMap::new();
    for (&col, members) in &groups {
        let mut used_rows: HashSet<usize> = HashSet::new();
        for (id, cell) in cells {
            if cols.contains_key(id) && cell.col() <= col && col <= cell.last_col() {
                used_rows.extend(cell.row()..=cell.last_row());
            }
        }
        for id in members {
            if let Some(cell) = cells.get(id) {
                rows.insert(*id, cell.row());
            }
        }

        // Declaration order is section number order.
        let mut next_row = 0;
        for id in members.iter().filter(|id| !cells.contains_key(*id)) {
            while used_rows.contains(&next_row) {
                next_row += 1;
            }
            rows.insert(*id, next_row);
            used_rows.insert(next_row);
            next_row += 1;
        }
    }

    for &id in ids {
        let col = cols.get(&id).copied().unwrap_or(0);
        let row = rows.get(&id).copied().unwrap_or(0);
        let cell = match cells.get(&id) {
            Some(cell) => GridCell::new(col, row)
                .with_row_span(cell.row_span())
                .with_col_span(cell.col_span()),
            None => GridCell::new(col, row),
        };
        debug!(section = id.as_string(), col, row; "Section grid cell");
        if let Some(frame) = ctx.section_mut(id) {
            frame.set_grid(cell);
        }
    }
}

/// Checks whether no other section occupies `row` in the columns of `frame`.
fn row_is_free(frames: &[SectionLayout], frame: &SectionLayout, row: usize) -> bool {
    let grid = frame.grid();
    !frames.iter().any(|other| {
        let og = other.grid();
        other.id() != frame.id() && og.row() <= row && row <= og.last_row() && og.overlaps_cols(&grid)
    })
}

fn compute_offsets(ctx: &mut LayoutContext, config: &LayoutConfig) -> (usize, usize) {
    let x_gap = config.section_x_gap();
    let y_gap = config.section_y_gap();
    let frames: Vec<SectionLayout> = ctx.sections().cloned().collect();

    let min_col = frames.iter().map(|f| f.grid().col()).min().unwrap_or(0);
    let max_col = frames.iter().map(|f| f.grid().last_col()).max().unwrap_or(0);
    let max_row = frames.iter().map(|f| f.grid().last_row()).max().unwrap_or(0);

    // Column widths from single-column sections, then spanning deficits.
    let mut col_widths = vec![0.0_f32; max_col + 1];
    for frame in frames.iter().filter(|f| f.grid().col_span() == 1) {
        let col = frame.grid().col();
        col_widths[col] = col_widths[col].max(frame.bounds().width());
    }
    for frame in frames.iter().filter(|f| f.grid().col_span() > 1) {
        let grid = frame.grid();
        let spanned: f32 = col_widths[grid.col()..=grid.last_col()].iter().sum::<f32>()
            + (grid.col_span() - 1) as f32 * x_gap;
        if frame.bounds().width() > spanned {
            col_widths[grid.last_col()] += frame.bounds().width() - spanned;
        }
    }

    let mut col_offsets = vec![0.0_f32; max_col + 1];
    let mut cumulative_x = 0.0;
    for col in min_col..=max_col {
        col_offsets[col] = cumulative_x;
        cumulative_x += col_widths[col] + x_gap;
    }

    // Single-row TB sections reach into the next row when nothing sits there.
    let tb_extended: HashSet<Id> = frames
        .iter()
        .filter(|f| {
            let grid = f.grid();
            f.direction() == Direction::TopToBottom
                && grid.row_span() == 1
                && grid.row() < max_row
                && row_is_free(&frames, f, grid.row() + 1)
        })
        .map(SectionLayout::id)
        .collect();

    let mut row_heights = vec![0.0_f32; max_row + 1];
    for frame in frames
        .iter()
        .filter(|f| f.grid().row_span() == 1 && !tb_extended.contains(&f.id()))
    {
        let row = frame.grid().row();
        row_heights[row] = row_heights[row].max(frame.bounds().height());
    }
    for frame in frames.iter().filter(|f| f.grid().row_span() > 1) {
        let grid = frame.grid();
        let spanned: f32 = row_heights[grid.row()..=grid.last_row()].iter().sum::<f32>()
            + (grid.row_span() - 1) as f32 * y_gap;
        if frame.bounds().height() > spanned {
            row_heights[grid.last_row()] += frame.bounds().height() - spanned;
        }
    }

    let mut row_offsets = vec![0.0_f32; max_row + 1];
    let mut cumulative_y = 0.0;
    for row in 0..=max_row {
        row_offsets[row] = cumulative_y;
        cumulative_y += row_heights[row] + y_gap;
    }

    let mut heights: HashMap<Id, f32> = frames
        .iter()
        .map(|f| (f.id(), f.bounds().height()))
        .collect();
    let mut tb_frames: Vec<&SectionLayout> = frames
        .iter()
        .filter(|f| tb_extended.contains(&f.id()))
        .collect();
    tb_frames.sort_by_key(|f| f.grid().row());
    for frame in tb_frames {
        let row = frame.grid().row();
        let next = row + 1;
        let tb_bottom = row_offsets[row] + frame.bounds().height() + y_gap;
        let next_bottom = row_offsets[next] + row_heights[next];
        if tb_bottom > next_bottom {
            let delta = tb_bottom - next_bottom;
            for offset in &mut row_offsets[next..] {
                *offset += delta;
            }
        }
        let next_bottom = row_offsets[next] + row_heights[next];
        heights.insert(frame.id(), next_bottom - row_offsets[row]);
    }

    let right_align_cols: HashSet<usize> = frames
        .iter()
        .filter(|f| f.direction() != Direction::LeftToRight && f.grid().col_span() == 1)
        .map(|f| f.grid().col())
        .collect();

    for frame in ctx.sections_mut() {
        let grid = frame.grid();
        let mut bounds = frame.bounds();
        if let Some(&height) = heights.get(&frame.id()) {
            bounds = bounds.with_height(height);
        }

        let mut offset_x = col_offsets[grid.col()];
        let offset_y = row_offsets[grid.row()];
        if grid.col_span() == 1
            && (frame.direction() != Direction::LeftToRight
                || right_align_cols.contains(&grid.col()))
        {
            let col_w = col_widths[grid.col()];
            if col_w > bounds.width() {
                offset_x += col_w - bounds.width();
            }
        }

        if grid.row_span() > 1 {
            let spanned: f32 = row_heights[grid.row()..=grid.last_row()].iter().sum::<f32>()
                + (grid.row_span() - 1) as f32 * y_gap;
            bounds = bounds.with_height(spanned);
        }
        if grid.col_span() > 1 {
            let spanned: f32 = col_widths[grid.col()..=grid.last_col()].iter().sum::<f32>()
                + (grid.col_span() - 1) as f32 * x_gap;
            bounds = bounds.with_width(spanned);
        }

        frame
            .set_offset(Point::new(offset_x, offset_y))
            .set_bounds(bounds);
    }

    (min_col, max_col)
}

/// Shifts columns right, left to right, until adjacent boxes are `min_gap` apart.
///
/// A spanning section belongs to the left side of the pair starting at its
/// last column.
fn enforce_min_column_gaps(ctx: &mut LayoutContext, min_col: usize, max_col: usize, min_gap: f32) {
    for col in min_col..max_col {
        let right_edge = ctx
            .sections()
            .filter(|f| f.grid().last_col() == col)
            .map(|f| f.offset().x() + f.bounds().max_x())
            .fold(None, |acc: Option<f32>, x| Some(acc.map_or(x, |a| a.max(x))));
        let left_edge = ctx
            .sections()
            .filter(|f| f.grid().col() == col + 1)
            .map(|f| f.offset().x() + f.bounds().min_x())
            .fold(None, |acc: Option<f32>, x| Some(acc.map_or(x, |a| a.min(x))));
        let (Some(right_edge), Some(left_edge)) = (right_edge, left_edge) else {
            continue;
        };

        let gap = left_edge - right_edge;
        if gap >= min_gap {
            continue;
        }
        let deficit = min_gap - gap;
        debug!(col, deficit; "Widening column gap");
        for frame in ctx.sections_mut().filter(|f| f.grid().col() > col) {
            let offset = frame.offset();
            frame.set_offset(offset.with_x(offset.x() + deficit));
        }
    }
}

/// Positions the ports of `section` on its boundary.
///
/// Bounds and internal stations must already be global. A port sits on the
/// boundary of its side, aligned with the average of the internal stations it
/// connects to, or centered without any. Ports closer than the configured
/// minimum gap on one side are spread evenly. LEFT/RIGHT exit ports of a TB
/// section sit on the section bottom.
///
/// # Errors
///
/// Returns [`MetroError::Layout`] if the section has no frame.
pub fn position_ports(
    ctx: &mut LayoutContext,
    graph: &MetroGraph,
    section: Id,
    config: &LayoutConfig,
) -> Result<(), MetroError> {
    let frame = ctx.require_section(section)?.clone();
    let bounds = frame.bounds();

    let members = graph.section_stations(section);
    let internal: HashSet<Id> = members
        .iter()
        .copied()
        .filter(|&id| !graph.station(id).is_some_and(|s| s.is_port()))
        .collect();
    let ports: Vec<_> = members
        .iter()
        .filter_map(|&id| graph.station(id).and_then(|s| s.as_port().map(|p| (id, p))))
        .collect();

    let mut sides: IndexMap<PortSide, Vec<Id>> = IndexMap::new();
    for (id, port) in ports.iter().filter(|(_, p)| p.is_entry()) {
        sides.entry(port.side()).or_default().push(*id);
    }
    for (id, port) in ports.iter().filter(|(_, p)| !p.is_entry()) {
        sides.entry(port.side()).or_default().push(*id);
    }

    for (side, ids) in &sides {
        let free_is_y = side.is_left_or_right();
        let fixed = match side {
            PortSide::Left => bounds.min_x(),
            PortSide::Right => bounds.max_x(),
            PortSide::Top => bounds.min_y(),
            PortSide::Bottom => bounds.max_y(),
        };
        let center = bounds.center();
        for &id in ids {
            let point = match connected_internal_coord(ctx, graph, id, &internal, free_is_y) {
                Some(free) if free_is_y => Point::new(fixed, free),
                Some(free) => Point::new(free, fixed),
                None if free_is_y => Point::new(fixed, center.y()),
                None => Point::new(center.x(), fixed),
            };
            ctx.set_position(id, point);
        }

        let (start, end) = if free_is_y {
            (bounds.min_y(), bounds.max_y())
        } else {
            (bounds.min_x(), bounds.max_x())
        };
        spread_ports(ctx, ids, free_is_y, start, end, config.port_min_gap());
    }

    if frame.direction() == Direction::TopToBottom {
        for (id, port) in ports.iter().filter(|(_, p)| !p.is_entry()) {
            if port.side().is_left_or_right() {
                ctx.set_y(*id, bounds.max_y());
            }
        }
    }
    Ok(())
}

/// Average free-axis coordinate of the internal stations connected to a port.
///
/// Each edge counts once per line it carries.
fn connected_internal_coord(
    ctx: &LayoutContext,
    graph: &MetroGraph,
    port: Id,
    internal: &HashSet<Id>,
    free_is_y: bool,
) -> Option<f32> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for edge in graph.edges() {
        let other = if edge.source() == port {
            edge.target()
        } else if edge.target() == port {
            edge.source()
        } else {
            continue;
        };
        if !internal.contains(&other) {
            continue;
        }
        if let Some(point) = ctx.position(other) {
            let value = if free_is_y { point.y() } else { point.x() };
            sum += value * edge.lines().len() as f32;
            count += edge.lines().len();
        }
    }
    (count > 0).then(|| sum / count as f32)
}

fn spread_ports(
    ctx: &mut LayoutContext,
    ids: &[Id],
    free_is_y: bool,
    start: f32,
    end: f32,
    min_gap: f32,
) {
    if ids.len() <= 1 {
        return;
    }
    let mut positions: Vec<(Id, f32)> = ids
        .iter()
        .filter_map(|&id| {
            ctx.position(id)
                .map(|p| (id, if free_is_y { p.y() } else { p.x() }))
        })
        .collect();
    positions.sort_by(|a, b| a.1.total_cmp(&b.1));

    let crowded = positions.windows(2).any(|pair| (pair[1].1 - pair[0].1).abs() < min_gap);
    if !crowded {
        return;
    }

    let n = positions.len();
    let step = ((end - start) - 2.0 * min_gap) / (n.saturating_sub(1).max(1)) as f32;
    for (idx, (id, _)) in positions.into_iter().enumerate() {
        let value = start + min_gap + idx as f32 * step;
        if free_is_y {
            ctx.set_y(id, value);
        } else {
            ctx.set_x(id, value);
        }
    }
}
