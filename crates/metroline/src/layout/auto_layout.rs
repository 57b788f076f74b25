//! Auto-layout inference.
//!
//! Fills the layout parameters a graph leaves open: the grid cell of each
//! section, its flow direction, and the sides its lines enter and exit by.
//! Explicit values always win; inference only fills gaps and never writes
//! back into the graph.
//!
//! # Overview
//!
//! - [`infer`] - Runs every inference step and returns an [`Inference`].
//! - [`Inference`] - Effective cells, directions and port hints. Implements
//!   [`PortHints`] so the topology resolver can consume it directly.
//!
//! Steps, in order: grid packing with fold wrapping, fold row-span
//! extension, explicit TB adjustments, direction rules, column-span
//! optimization and port side inference.
//!
//! When the cumulative station width of a row exceeds the fold threshold,
//! the overflowing topological column becomes a fold: a TB bridge at the
//! edge of the current row. Later columns continue on a new row band in the
//! opposite direction, so the diagram reads as a serpentine.

use std::collections::{BTreeMap, HashMap, HashSet};

use indexmap::{IndexMap, IndexSet};
use log::{debug, info};

use metroline_core::{
    identifier::Id,
    semantic::{Direction, GridCell, MetroGraph, PortHint, PortSide},
};

use crate::{
    config::InferenceConfig,
    layout::{layers::assign_layers, placement::topological_columns},
    structure::{FlowGraph, SectionDag},
    topology::PortHints,
};

/// Effective section layout parameters, explicit or inferred.
#[derive(Debug, Clone, Default)]
pub struct Inference {
    cells: IndexMap<Id, GridCell>,
    directions: IndexMap<Id, Direction>,
    entry_hints: IndexMap<Id, Vec<PortHint>>,
    exit_hints: IndexMap<Id, Vec<PortHint>>,
    fold: HashSet<Id>,
    below_fold: HashSet<Id>,
}

impl Inference {
    /// The explicit parameters of a graph, with nothing inferred.
    fn explicit(graph: &MetroGraph) -> Self {
        let mut inference = Self::default();
        for section in graph.sections() {
            let id = section.id();
            if let Some(cell) = section.grid() {
                inference.cells.insert(id, cell);
            }
            inference
                .directions
                .insert(id, section.direction().unwrap_or_default());
            inference
                .entry_hints
                .insert(id, section.entry_hints().to_vec());
            inference.exit_hints.insert(id, section.exit_hints().to_vec());
        }
        inference
    }

    /// Grid cell of a section, if pinned explicitly or inferred.
    pub fn cell(&self, section: Id) -> Option<GridCell> {
        self.cells.get(&section).copied()
    }

    /// All known grid cells in declaration order.
    pub fn cells(&self) -> &IndexMap<Id, GridCell> {
        &self.cells
    }

    /// Effective direction of a section. Unknown sections flow left to right.
    pub fn direction(&self, section: Id) -> Direction {
        self.directions.get(&section).copied().unwrap_or_default()
    }

    /// Checks whether a section is a fold bridge.
    pub fn is_fold(&self, section: Id) -> bool {
        self.fold.contains(&section)
    }

    /// Checks whether a section was placed directly below a fold.
    pub fn is_below_fold(&self, section: Id) -> bool {
        self.below_fold.contains(&section)
    }

    fn row(&self, section: Id) -> usize {
        self.cell(section).map_or(0, |c| c.row())
    }

    /// Sections grouped by start column, declaration order within a column.
    fn column_groups(&self) -> BTreeMap<usize, Vec<Id>> {
        let mut groups: BTreeMap<usize, Vec<Id>> = BTreeMap::new();
        for (&id, cell) in &self.cells {
            groups.entry(cell.col()).or_default().push(id);
        }
        groups
    }
}

impl PortHints for Inference {
    fn entry_hints(&self, section: Id) -> &[PortHint] {
        self.entry_hints
            .get(&section)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn exit_hints(&self, section: Id) -> &[PortHint] {
        self.exit_hints
            .get(&section)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Infers the missing layout parameters of a graph.
///
/// Nothing is inferred for a graph with at most one section or without
/// dependencies between sections; the result then carries the explicit
/// values only.
pub fn infer(graph: &MetroGraph, dag: &SectionDag, config: &InferenceConfig) -> Inference {
    let mut inference = Inference::explicit(graph);
    if graph.section_count() <= 1 || dag.is_empty() {
        return inference;
    }

    let max_columns = graph
        .max_station_columns()
        .unwrap_or_else(|| config.max_station_columns());
    info!(sections = graph.section_count(), max_columns; "Inferring section layout");

    let layers: HashMap<Id, usize> = graph
        .sections()
        .map(|s| (s.id(), estimate_section_layers(graph, s.id())))
        .collect();

    assign_grid_positions(&mut inference, graph, dag, &layers, max_columns);
    optimize_rowspans(&mut inference, graph, dag);
    adjust_explicit_tb_sections(&mut inference, graph, dag);
    infer_directions(&mut inference, graph, dag);
    optimize_colspans(&mut inference, graph, dag, &layers);
    infer_port_sides(&mut inference, graph, dag, config);

    for section in graph.sections() {
        debug!(
            section = section.id().as_string(),
            cell:? = inference.cell(section.id()),
            direction = inference.direction(section.id()).to_string();
            "Section layout inferred"
        );
    }
    inference
}

/// Estimates the number of station layers of a section.
///
/// Only real stations and the edges between them count. The estimate is the
/// longest-path layer count and is at least 1. A section without internal
/// edges, or a cyclic one the engine rejects later, counts one layer per
/// station.
pub fn estimate_section_layers(graph: &MetroGraph, section: Id) -> usize {
    let stations: Vec<Id> = graph
        .section_stations(section)
        .into_iter()
        .filter(|&id| !graph.is_boundary(id))
        .collect();
    let flow = FlowGraph::from_graph(graph).subgraph(stations.iter().copied());
    if flow.edges().is_empty() {
        return stations.len().max(1);
    }
    match assign_layers(&flow, "section estimate") {
        Ok(layers) => layers.values().copied().max().map_or(1, |max| max + 1),
        Err(_) => stations.len().max(1),
    }
}

/// Packs topological columns into row bands, folding on overflow.
fn assign_grid_positions(
    inference: &mut Inference,
    graph: &MetroGraph,
    dag: &SectionDag,
    layers: &HashMap<Id, usize>,
    max_columns: usize,
) {
    let ids: Vec<Id> = graph.sections().map(|s| s.id()).collect();
    let topo = topological_columns(&ids, dag);

    let mut groups: BTreeMap<usize, Vec<Id>> = BTreeMap::new();
    for &id in ids.iter().filter(|id| !inference.cells.contains_key(*id)) {
        groups
            .entry(topo.get(&id).copied().unwrap_or(0))
            .or_default()
            .push(id);
    }
    if groups.is_empty() {
        return;
    }

    let widths: HashMap<usize, usize> = groups
        .iter()
        .map(|(&col, sids)| {
            let width = sids
                .iter()
                .map(|id| layers.get(id).copied().unwrap_or(1))
                .max()
                .unwrap_or(1);
            (col, width)
        })
        .collect();
    let sorted_cols: Vec<usize> = groups.keys().copied().collect();

    let mut placed: IndexMap<Id, (i64, usize)> = IndexMap::new();
    let mut skip: HashSet<usize> = HashSet::new();
    let mut current_col: i64 = 0;
    let mut col_step: i64 = 1;
    let mut band_start = 0usize;
    let mut max_stack = 0usize;
    let mut cumulative = 0usize;

    for (topo_idx, topo_col) in sorted_cols.iter().enumerate() {
        if skip.contains(topo_col) {
            continue;
        }
        let sids = &groups[topo_col];
        let width = widths.get(topo_col).copied().unwrap_or(1);
        let stack = sids.len();

        if cumulative > 0 && cumulative + width > max_columns {
            let fold_col = current_col;
            for (i, &sid) in sids.iter().enumerate() {
                placed.insert(sid, (fold_col, band_start + i));
                inference.fold.insert(sid);
            }
            let band_height = max_stack.max(stack);
            band_start += band_height.max(1);
            col_step = -col_step;
            current_col = fold_col + col_step;
            cumulative = 0;
            max_stack = 0;
            debug!(fold_col, band = band_start; "Folding section flow");

            // Stacked bands continue straight below the fold instead of on a
            // return row when the fold feeds exactly the next column.
            if band_height > 1 && topo_idx + 1 < sorted_cols.len() {
                let next_topo = sorted_cols[topo_idx + 1];
                let next_sids = &groups[&next_topo];
                let mut fold_succs: HashSet<Id> = HashSet::new();
                let mut all_single = true;
                for &fs in sids {
                    let succs: Vec<Id> = dag.successors(fs).collect();
                    if succs.len() != 1 {
                        all_single = false;
                        break;
                    }
                    fold_succs.extend(succs);
                }
                let next_set: HashSet<Id> = next_sids.iter().copied().collect();
                if all_single && fold_succs == next_set {
                    for (j, &ns) in next_sids.iter().enumerate() {
                        placed.insert(ns, (fold_col, band_start + j));
                        inference.below_fold.insert(ns);
                    }
                    skip.insert(next_topo);
                }
            }
        } else {
            for (i, &sid) in sids.iter().enumerate() {
                placed.insert(sid, (current_col, band_start + i));
            }
            max_stack = max_stack.max(stack);
            current_col += col_step;
            cumulative += width;
        }
    }

    // Return rows may run past column 0; shift everything back on the grid.
    let min_col = placed
        .values()
        .map(|&(col, _)| col)
        .chain(inference.cells.values().map(|c| c.col() as i64))
        .min()
        .unwrap_or(0);
    let shift = (-min_col).max(0);
    if shift > 0 {
        for cell in inference.cells.values_mut() {
            *cell = GridCell::new(cell.col() + shift as usize, cell.row())
                .with_row_span(cell.row_span())
                .with_col_span(cell.col_span());
        }
    }
    for (sid, (col, row)) in placed {
        inference
            .cells
            .insert(sid, GridCell::new((col + shift) as usize, row));
    }
    inference
        .cells
        .sort_by_cached_key(|id, _| graph.section_index(*id).unwrap_or(usize::MAX));
}

/// Grows the row span of `section` over the stacked sections of the column
/// to its left, stopping above other sections of its own column.
///
/// Downstream sections of `section` do not count.
fn extend_row_span(
    inference: &mut Inference,
    dag: &SectionDag,
    groups: &BTreeMap<usize, Vec<Id>>,
    section: Id,
) {
    let Some(cell) = inference.cell(section) else {
        return;
    };
    let (col, row) = (cell.col(), cell.row());
    let Some(left) = col.checked_sub(1).and_then(|left| groups.get(&left)) else {
        return;
    };

    let downstream = dag.transitive_successors(section);
    let mut max_row = row;
    for &sid in left {
        if downstream.contains(&sid) {
            continue;
        }
        let other = inference.row(sid);
        if other >= row {
            max_row = max_row.max(other);
        }
    }
    for &sid in groups.get(&col).into_iter().flatten() {
        if sid == section {
            continue;
        }
        let other = inference.row(sid);
        if other > row {
            max_row = max_row.min(other - 1);
        }
    }

    let span = max_row - row + 1;
    if span > cell.row_span() {
        debug!(section = section.as_string(), span; "Extending row span");
        inference.cells.insert(section, cell.with_row_span(span));
    }
}

fn optimize_rowspans(inference: &mut Inference, graph: &MetroGraph, dag: &SectionDag) {
    if inference.fold.is_empty() {
        return;
    }
    let groups = inference.column_groups();
    for section in graph.sections().map(|s| s.id()) {
        if inference.is_fold(section) {
            extend_row_span(inference, dag, &groups, section);
        }
    }
}

/// Explicit TB sections span their stacked left neighbors like folds do, and
/// auto-placed successors to their right drop to the bottom of the span.
fn adjust_explicit_tb_sections(inference: &mut Inference, graph: &MetroGraph, dag: &SectionDag) {
    let explicit_tb: Vec<Id> = graph
        .sections()
        .filter(|s| s.direction() == Some(Direction::TopToBottom))
        .map(|s| s.id())
        .filter(|id| !inference.is_fold(*id) && inference.cells.contains_key(id))
        .collect();
    if explicit_tb.is_empty() {
        return;
    }

    let groups = inference.column_groups();
    for tb in explicit_tb {
        extend_row_span(inference, dag, &groups, tb);

        let Some(cell) = inference.cell(tb) else {
            continue;
        };
        if cell.row_span() <= 1 {
            continue;
        }
        let bottom = cell.last_row();
        for succ in dag.successors(tb) {
            let auto_placed = graph.section(succ).is_some_and(|s| s.grid().is_none());
            let Some(succ_cell) = inference.cell(succ) else {
                continue;
            };
            if auto_placed && succ_cell.row() == cell.row() && succ_cell.col() > cell.col() {
                inference.cells.insert(
                    succ,
                    GridCell::new(succ_cell.col(), bottom)
                        .with_row_span(succ_cell.row_span())
                        .with_col_span(succ_cell.col_span()),
                );
            }
        }
    }
}

fn infer_directions(inference: &mut Inference, graph: &MetroGraph, dag: &SectionDag) {
    for section in graph.sections() {
        let id = section.id();
        if section.direction().is_some() {
            continue;
        }
        if inference.is_fold(id) {
            inference.directions.insert(id, Direction::TopToBottom);
            continue;
        }
        let Some(me) = inference.cell(id) else {
            continue;
        };

        let succs: Vec<GridCell> = dag.successors(id).filter_map(|s| inference.cell(s)).collect();
        let preds: Vec<GridCell> = dag.predecessors(id).filter_map(|s| inference.cell(s)).collect();
        let all_succs_below = succs.iter().all(|c| c.row() > me.row());

        let direction = if !succs.is_empty()
            && succs.iter().all(|c| c.col() < me.col())
            && (!all_succs_below || inference.is_below_fold(id))
        {
            // Successors all to the left: a return row.
            Direction::RightToLeft
        } else if succs.is_empty()
            && !preds.is_empty()
            && preds.iter().all(|c| c.col() >= me.col())
            && (preds.iter().any(|c| c.row() < me.row()) || preds.iter().any(|c| c.col() > me.col()))
        {
            // Leaf fed from the right or from above.
            Direction::RightToLeft
        } else if !succs.is_empty() && all_succs_below {
            Direction::TopToBottom
        } else {
            Direction::LeftToRight
        };
        inference.directions.insert(id, direction);
    }
}

/// Spans wide sections of fold columns and return rows leftward so the
/// narrower sections of their column set its width.
fn optimize_colspans(
    inference: &mut Inference,
    graph: &MetroGraph,
    dag: &SectionDag,
    layers: &HashMap<Id, usize>,
) {
    let groups = inference.column_groups();
    if !groups.values().any(|sids| sids.len() >= 2) {
        return;
    }

    let layer_count = |id: &Id| layers.get(id).copied().unwrap_or(1);
    let col_max_layers: HashMap<usize, usize> = groups
        .iter()
        .map(|(&col, sids)| (col, sids.iter().map(layer_count).max().unwrap_or(1)))
        .collect();

    let mut occupied: HashMap<(usize, usize), Id> = HashMap::new();
    for section in graph.sections() {
        if let Some(cell) = inference.cell(section.id()) {
            for c in cell.col()..=cell.last_col() {
                for r in cell.row()..=cell.last_row() {
                    occupied.insert((c, r), section.id());
                }
            }
        }
    }

    for (&col, sids) in &groups {
        if sids.len() < 2 {
            continue;
        }
        let is_fold_column = sids.iter().any(|s| inference.is_fold(*s));

        for &sid in sids {
            if inference.is_fold(sid) {
                continue;
            }
            if inference.is_below_fold(sid) && dag.has_successors(sid) {
                continue;
            }
            if !is_fold_column && inference.direction(sid) != Direction::RightToLeft {
                continue;
            }

            let target = layer_count(&sid);
            let other_max = sids
                .iter()
                .filter(|&&s| s != sid)
                .map(layer_count)
                .max()
                .unwrap_or(0);
            if target <= other_max {
                continue;
            }
            let Some(cell) = inference.cell(sid) else {
                continue;
            };
            let rows = cell.row()..=cell.last_row();

            let mut accumulated = other_max;
            let mut start_col = col;
            let mut span = 1;
            for left in (0..col).rev() {
                let Some(&left_layers) = col_max_layers.get(&left) else {
                    break;
                };
                let conflict = rows
                    .clone()
                    .any(|r| occupied.get(&(left, r)).is_some_and(|&o| o != sid));
                if conflict {
                    break;
                }
                accumulated += left_layers;
                start_col = left;
                span += 1;
                if accumulated >= target {
                    break;
                }
            }

            if span > 1 {
                for c in start_col..start_col + span {
                    for r in rows.clone() {
                        occupied.insert((c, r), sid);
                    }
                }
                debug!(section = sid.as_string(), start_col, span; "Spanning section leftward");
                inference.cells.insert(
                    sid,
                    GridCell::new(start_col, cell.row())
                        .with_row_span(cell.row_span())
                        .with_col_span(span),
                );
            }
        }
    }
}

/// Side of the section at `me` facing the section at `other`.
///
/// Sections in disjoint column ranges face each other horizontally;
/// otherwise vertically. Identical positions face right.
pub fn relative_side(me: GridCell, other: GridCell) -> PortSide {
    if !me.overlaps_cols(&other) {
        if other.col() > me.col() {
            return PortSide::Right;
        }
        if other.col() < me.col() {
            return PortSide::Left;
        }
    }
    if other.row() > me.row() {
        PortSide::Bottom
    } else if other.row() < me.row() {
        PortSide::Top
    } else {
        PortSide::Right
    }
}

fn infer_port_sides(
    inference: &mut Inference,
    graph: &MetroGraph,
    dag: &SectionDag,
    config: &InferenceConfig,
) {
    for section in graph.sections() {
        let id = section.id();
        let Some(me) = inference.cell(id) else {
            continue;
        };

        if section.exit_hints().is_empty() && dag.has_successors(id) {
            let all_lines: IndexSet<Id> = dag
                .successors(id)
                .flat_map(|tgt| dag.lines_between(id, tgt))
                .collect();
            if !all_lines.is_empty() {
                let hints = if inference.is_fold(id) {
                    let side = fold_exit_side(inference, dag, id, me, config);
                    vec![PortHint::new(side, declaration_sorted(graph, all_lines))]
                } else {
                    let mut sides: BTreeMap<PortSide, IndexSet<Id>> = BTreeMap::new();
                    for tgt in dag.successors(id) {
                        if let Some(other) = inference.cell(tgt) {
                            sides
                                .entry(relative_side(me, other))
                                .or_default()
                                .extend(dag.lines_between(id, tgt));
                        }
                    }
                    side_hints(graph, sides)
                };
                inference.exit_hints.insert(id, hints);
            }
        }

        if section.entry_hints().is_empty() && dag.has_predecessors(id) {
            let mut sides: BTreeMap<PortSide, IndexSet<Id>> = BTreeMap::new();
            for src in dag.predecessors(id) {
                if let Some(other) = inference.cell(src) {
                    sides
                        .entry(relative_side(me, other))
                        .or_default()
                        .extend(dag.lines_between(src, id));
                }
            }
            let hints = side_hints(graph, sides);
            inference.entry_hints.insert(id, hints);
        }
    }
}

/// Exit side of a fold section, by line-weighted vote over its successors.
///
/// Ties go to the first side in Left, Right, Top, Bottom order. A
/// multi-row fold whose successors all sit below its span exits at the
/// bottom instead of a horizontal side.
fn fold_exit_side(
    inference: &Inference,
    dag: &SectionDag,
    id: Id,
    me: GridCell,
    config: &InferenceConfig,
) -> PortSide {
    let mut votes: BTreeMap<PortSide, usize> = BTreeMap::new();
    for tgt in dag.successors(id) {
        if let Some(other) = inference.cell(tgt) {
            *votes.entry(relative_side(me, other)).or_default() +=
                dag.lines_between(id, tgt).count();
        }
    }

    let mut dominant: Option<(PortSide, usize)> = None;
    for (&side, &count) in &votes {
        if dominant.is_none_or(|(_, best)| count > best) {
            dominant = Some((side, count));
        }
    }
    let Some((mut side, _)) = dominant else {
        return config.fold_exit_side();
    };

    if me.row_span() > 1 && side.is_left_or_right() {
        let all_below = dag
            .successors(id)
            .filter_map(|tgt| inference.cell(tgt))
            .all(|c| c.row() > me.last_row());
        if all_below {
            side = PortSide::Bottom;
        }
    }
    side
}

fn side_hints(graph: &MetroGraph, sides: BTreeMap<PortSide, IndexSet<Id>>) -> Vec<PortHint> {
    sides
        .into_iter()
        .filter(|(_, lines)| !lines.is_empty())
        .map(|(side, lines)| PortHint::new(side, declaration_sorted(graph, lines)))
        .collect()
}

fn declaration_sorted(graph: &MetroGraph, lines: IndexSet<Id>) -> Vec<Id> {
    let mut lines: Vec<Id> = lines.into_iter().collect();
    lines.sort_by_key(|&line| graph.line_index(line).unwrap_or(usize::MAX));
    lines
}
