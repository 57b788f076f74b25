//! Track-per-line vertical ordering.
//!
//! Each line owns a base track, one line gap apart in priority order. A
//! station follows the base track of its highest-priority line, except on
//! side branches far from that track, where it stays near its predecessors.
//!
//! # Overview
//!
//! - [`line_priority`] - Orders lines by declaration or by section span.
//! - [`assign_tracks`] - Assigns a fractional track to every station.
//!
//! Tracks are fractional; callers compact them into consecutive ranks before
//! mapping them to coordinates.

use std::collections::{HashMap, HashSet};

use indexmap::{IndexMap, IndexSet};
use log::trace;

use metroline_core::{identifier::Id, semantic::MetroGraph};

use crate::{config::LineOrder, structure::FlowGraph};

/// Track distance between the base tracks of consecutive lines.
pub const LINE_GAP: f32 = 1.0;

const DIAMOND_COMPRESSION: f32 = 0.25;
const SIDE_BRANCH_NUDGE: f32 = 1.0;
const FANOUT_SPACING: f32 = 1.5;
const FANOUT_EXPONENT: f32 = 0.8;
const SPACING_TOLERANCE: f32 = 0.01;

/// Returns the declared lines in priority order.
///
/// With [`LineOrder::Span`], lines touching more distinct sections come
/// first; ties keep declaration order.
pub fn line_priority(graph: &MetroGraph, order: LineOrder) -> Vec<Id> {
    let declared: Vec<Id> = graph.lines().map(|line| line.id()).collect();
    if order == LineOrder::Definition || graph.section_count() == 0 {
        return declared;
    }

    let mut touched: HashMap<Id, HashSet<Id>> = HashMap::new();
    for edge in graph.edges() {
        let sections = [graph.section_of(edge.source()), graph.section_of(edge.target())];
        for &line in edge.lines() {
            touched
                .entry(line)
                .or_default()
                .extend(sections.iter().flatten().copied());
        }
    }

    let mut ordered = declared;
    // Stable sort keeps declaration order among equal spans.
    ordered.sort_by_key(|line| std::cmp::Reverse(touched.get(line).map_or(0, HashSet::len)));
    ordered
}

/// Assigns each node of `flow` a track.
///
/// `layers` must come from the same graph. `line_order` is the line
/// priority; when it is empty the track of a station is its index.
pub fn assign_tracks(
    flow: &FlowGraph,
    layers: &IndexMap<Id, usize>,
    line_order: &[Id],
) -> IndexMap<Id, f32> {
    if line_order.is_empty() {
        return flow
            .nodes()
            .enumerate()
            .map(|(idx, id)| (id, idx as f32))
            .collect();
    }

    let mut assigner = TrackAssigner::new(flow, layers, line_order);
    assigner.run();

    let tracks: IndexMap<Id, f32> = flow
        .nodes()
        .map(|id| (id, assigner.tracks.get(&id).copied().unwrap_or(0.0)))
        .collect();
    trace!(tracks:? = tracks.values().collect::<Vec<_>>(); "Assigned tracks");
    tracks
}

struct TrackAssigner<'a> {
    flow: &'a FlowGraph,
    layers: &'a IndexMap<Id, usize>,
    line_order: &'a [Id],
    station_lines: HashMap<Id, HashSet<Id>>,
    primary: HashMap<Id, Option<Id>>,
    tracks: HashMap<Id, f32>,
}

impl<'a> TrackAssigner<'a> {
    fn new(flow: &'a FlowGraph, layers: &'a IndexMap<Id, usize>, line_order: &'a [Id]) -> Self {
        let priority: HashMap<Id, usize> = line_order
            .iter()
            .enumerate()
            .map(|(idx, &line)| (line, idx))
            .collect();

        let mut station_lines = HashMap::new();
        let mut primary = HashMap::new();
        for node in flow.nodes() {
            let lines: HashSet<Id> = flow.lines_at(node).into_iter().collect();
            let best = lines
                .iter()
                .filter_map(|line| priority.get(line).map(|&p| (p, *line)))
                .min_by_key(|(p, _)| *p)
                .map(|(_, line)| line);
            primary.insert(node, best);
            station_lines.insert(node, lines);
        }

        Self {
            flow,
            layers,
            line_order,
            station_lines,
            primary,
            tracks: HashMap::new(),
        }
    }

    fn layer(&self, id: Id) -> usize {
        self.layers.get(&id).copied().unwrap_or(0)
    }

    fn line_count(&self, id: Id) -> usize {
        self.station_lines.get(&id).map_or(0, HashSet::len)
    }

    fn run(&mut self) {
        let mut groups: IndexMap<(usize, Option<Id>), Vec<Id>> = IndexMap::new();
        for node in self.flow.nodes() {
            let primary = self.primary.get(&node).copied().flatten();
            groups
                .entry((self.layer(node), primary))
                .or_default()
                .push(node);
        }

        let max_layer = self.layers.values().copied().max().unwrap_or(0);
        let mut orphan_track = self.line_order.len() as f32 * LINE_GAP;

        for layer in 0..=max_layer {
            for (idx, &line) in self.line_order.iter().enumerate() {
                let Some(nodes) = groups.get(&(layer, Some(line))) else {
                    continue;
                };
                let base = idx as f32 * LINE_GAP;
                if let [node] = nodes.as_slice() {
                    let track = self.place_single(*node, base);
                    self.tracks.insert(*node, track);
                } else {
                    self.place_fan_out(nodes.clone(), base);
                }
            }

            if let Some(orphans) = groups.get(&(layer, None)) {
                for &node in orphans {
                    self.tracks.insert(node, orphan_track);
                    orphan_track += 1.0;
                }
            }

            self.equalize_fork_groups(layer);
        }
    }

    /// Average track of the already placed predecessors of `node`.
    fn predecessor_avg(&self, node: Id) -> Option<f32> {
        let placed: Vec<f32> = self
            .flow
            .predecessors(node)
            .iter()
            .filter_map(|pred| self.tracks.get(pred).copied())
            .collect();
        if placed.is_empty() {
            return None;
        }
        Some(placed.iter().sum::<f32>() / placed.len() as f32)
    }

    fn place_single(&self, node: Id, base: f32) -> f32 {
        let Some(pred_avg) = self.predecessor_avg(node) else {
            return base;
        };

        let preds = self.flow.predecessors(node);
        let node_lines = self.line_count(node);
        let pred_lines: HashSet<Id> = preds
            .iter()
            .filter_map(|pred| self.station_lines.get(pred))
            .flatten()
            .copied()
            .collect();

        // Divergence: some predecessor lines leave on other stations.
        if pred_lines.len() > node_lines {
            if self.is_diamond_node(node) {
                return pred_avg + (base - pred_avg) * DIAMOND_COMPRESSION;
            }
            return base;
        }

        // Convergence: lines from several tracks merge here.
        if preds.len() > 1 {
            let max_pred_lines = preds
                .iter()
                .map(|&pred| self.line_count(pred))
                .max()
                .unwrap_or(0);
            if node_lines > max_pred_lines {
                return base;
            }
        }

        if (base - pred_avg).abs() <= LINE_GAP {
            base
        } else {
            let direction = if base > pred_avg { 1.0 } else { -1.0 };
            pred_avg + direction * SIDE_BRANCH_NUDGE
        }
    }

    /// Checks whether `node` is one branch of a fork-join diamond.
    ///
    /// A sibling on the same layer must share the predecessor set, reach a
    /// common successor and carry exactly the same lines.
    fn is_diamond_node(&self, node: Id) -> bool {
        let preds: HashSet<Id> = self.flow.predecessors(node).into_iter().collect();
        let succs: HashSet<Id> = self.flow.successors(node).into_iter().collect();
        if preds.is_empty() || succs.is_empty() {
            return false;
        }

        let layer = self.layer(node);
        let lines = self.station_lines.get(&node);
        self.layers
            .iter()
            .filter(|&(&other, &other_layer)| other_layer == layer && other != node)
            .any(|(&other, _)| {
                let other_preds: HashSet<Id> = self.flow.predecessors(other).into_iter().collect();
                other_preds == preds
                    && self
                        .flow
                        .successors(other)
                        .iter()
                        .any(|succ| succs.contains(succ))
                    && self.station_lines.get(&other) == lines
            })
    }

    /// Places several stations sharing a layer and primary line around one anchor.
    fn place_fan_out(&mut self, mut nodes: Vec<Id>, base: f32) {
        let mut bary: HashMap<Id, f32> = HashMap::new();
        let mut pred_avgs: Vec<f32> = Vec::new();
        for &node in &nodes {
            match self.predecessor_avg(node) {
                Some(avg) => {
                    bary.insert(node, avg);
                    pred_avgs.push(avg);
                }
                None => {
                    bary.insert(node, base);
                }
            }
        }
        nodes.sort_by(|a, b| {
            let ba = bary.get(a).copied().unwrap_or(base);
            let bb = bary.get(b).copied().unwrap_or(base);
            ba.total_cmp(&bb)
        });

        let anchor = if pred_avgs.is_empty() {
            base
        } else {
            let overall = pred_avgs.iter().sum::<f32>() / pred_avgs.len() as f32;
            if (base - overall).abs() <= LINE_GAP {
                base
            } else {
                overall
            }
        };

        let n = nodes.len();
        let spacing = if n > 2 {
            FANOUT_SPACING * ((n - 1) as f32).powf(FANOUT_EXPONENT - 1.0)
        } else {
            FANOUT_SPACING
        };
        let center = (n as f32 - 1.0) / 2.0;
        for (idx, node) in nodes.into_iter().enumerate() {
            self.tracks
                .insert(node, anchor + (idx as f32 - center) * spacing);
        }
    }

    /// Compacts siblings that fork from one predecessor set onto different
    /// lines so they sit one line gap apart.
    fn equalize_fork_groups(&mut self, layer: usize) {
        let layer_nodes: Vec<Id> = self
            .layers
            .iter()
            .filter(|&(id, &l)| l == layer && self.tracks.contains_key(id))
            .map(|(&id, _)| id)
            .collect();
        if layer_nodes.len() < 2 {
            return;
        }

        let mut pred_groups: IndexMap<Vec<usize>, Vec<Id>> = IndexMap::new();
        for node in layer_nodes {
            let mut key: Vec<usize> = self
                .flow
                .predecessors(node)
                .iter()
                .filter_map(|&pred| self.flow.node_index(pred))
                .collect();
            key.sort_unstable();
            pred_groups.entry(key).or_default().push(node);
        }

        for mut group in pred_groups.into_values() {
            if group.len() < 2 {
                continue;
            }
            let primaries: IndexSet<Id> = group
                .iter()
                .filter_map(|id| self.primary.get(id).copied().flatten())
                .collect();
            if primaries.len() < 2 {
                continue;
            }

            group.sort_by(|a, b| self.track(*a).total_cmp(&self.track(*b)));
            let spacings: Vec<f32> = group
                .windows(2)
                .map(|pair| self.track(pair[1]) - self.track(pair[0]))
                .collect();

            let uneven = if let [gap] = spacings.as_slice() {
                *gap > LINE_GAP + SPACING_TOLERANCE
            } else {
                let max = spacings.iter().copied().fold(f32::MIN, f32::max);
                let min = spacings.iter().copied().fold(f32::MAX, f32::min);
                max - min >= SPACING_TOLERANCE
            };
            if !uneven {
                continue;
            }

            let start = self.track(group[0]);
            for (idx, node) in group.into_iter().enumerate() {
                self.tracks.insert(node, start + idx as f32 * LINE_GAP);
            }
        }
    }

    fn track(&self, id: Id) -> f32 {
        self.tracks.get(&id).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::approx_eq;
    use metroline_core::{
        color::Color,
        semantic::{Edge, Line, Section, Station},
    };

    use super::*;
    use crate::layout::layers::assign_layers;

    fn flow(edges: &[(&str, &str, &[&str])]) -> FlowGraph {
        let mut flow = FlowGraph::default();
        for (src, tgt, lines) in edges {
            let lines = lines.iter().map(|l| Id::new(l)).collect();
            flow.add_edge(Edge::new(Id::new(src), Id::new(tgt), lines));
        }
        flow
    }

    fn tracks_of(flow: &FlowGraph, lines: &[&str]) -> IndexMap<Id, f32> {
        let layers = assign_layers(flow, "test").unwrap();
        let order: Vec<Id> = lines.iter().map(|l| Id::new(l)).collect();
        assign_tracks(flow, &layers, &order)
    }

    fn track(tracks: &IndexMap<Id, f32>, name: &str) -> f32 {
        tracks[&Id::new(name)]
    }

    #[test]
    fn test_no_lines_uses_station_index() {
        let flow = flow(&[("ord_a", "ord_b", &["x"]), ("ord_b", "ord_c", &["x"])]);
        let tracks = tracks_of(&flow, &[]);
        assert_eq!(track(&tracks, "ord_a"), 0.0);
        assert_eq!(track(&tracks, "ord_c"), 2.0);
    }

    #[test]
    fn test_single_line_chain_shares_track() {
        let flow = flow(&[("ord_a", "ord_b", &["red"]), ("ord_b", "ord_c", &["red"])]);
        let tracks = tracks_of(&flow, &["red"]);
        assert!(tracks.values().all(|&t| t == 0.0));
    }

    #[test]
    fn test_separate_lines_get_separate_tracks() {
        let flow = flow(&[("ord_a", "ord_b", &["red"]), ("ord_c", "ord_d", &["blue"])]);
        let tracks = tracks_of(&flow, &["red", "blue"]);
        assert_eq!(track(&tracks, "ord_a"), 0.0);
        assert_eq!(track(&tracks, "ord_b"), 0.0);
        assert_eq!(track(&tracks, "ord_c"), 1.0);
        assert_eq!(track(&tracks, "ord_d"), 1.0);
    }

    #[test]
    fn test_fork_join_keeps_ends_on_shared_track() {
        let flow = flow(&[
            ("ord_f", "ord_x", &["red"]),
            ("ord_f", "ord_y", &["blue"]),
            ("ord_x", "ord_j", &["red"]),
            ("ord_y", "ord_j", &["blue"]),
        ]);
        let tracks = tracks_of(&flow, &["red", "blue"]);
        assert_eq!(track(&tracks, "ord_f"), 0.0);
        assert_eq!(track(&tracks, "ord_j"), 0.0);
        assert_eq!(track(&tracks, "ord_x"), 0.0);
        assert_eq!(track(&tracks, "ord_y"), 1.0);
    }

    #[test]
    fn test_fan_out_centers_on_base() {
        let flow = flow(&[
            ("ord_a", "ord_b", &["red"]),
            ("ord_a", "ord_c", &["red"]),
            ("ord_a", "ord_d", &["red"]),
        ]);
        let tracks = tracks_of(&flow, &["red"]);
        let spacing = FANOUT_SPACING * 2f32.powf(FANOUT_EXPONENT - 1.0);
        assert!(approx_eq!(f32, track(&tracks, "ord_b"), -spacing, epsilon = 1e-4));
        assert!(approx_eq!(f32, track(&tracks, "ord_c"), 0.0, epsilon = 1e-4));
        assert!(approx_eq!(f32, track(&tracks, "ord_d"), spacing, epsilon = 1e-4));
    }

    #[test]
    fn test_orphans_go_after_all_lines() {
        let mut flow = flow(&[("ord_a", "ord_b", &["red"])]);
        flow.add_node(Id::new("ord_lonely"));
        let tracks = tracks_of(&flow, &["red", "blue"]);
        assert_eq!(track(&tracks, "ord_lonely"), 2.0);
    }

    #[test]
    fn test_cross_line_fork_group_is_compacted() {
        let flow = flow(&[("ord_a", "ord_b", &["red"]), ("ord_a", "ord_c", &["green"])]);
        let tracks = tracks_of(&flow, &["red", "blue", "green"]);
        assert_eq!(track(&tracks, "ord_b"), 0.0);
        assert_eq!(track(&tracks, "ord_c"), 1.0);
    }

    #[test]
    fn test_diamond_detection_requires_same_lines() {
        let same = flow(&[
            ("ord_f", "ord_x", &["red"]),
            ("ord_f", "ord_y", &["red"]),
            ("ord_x", "ord_j", &["red"]),
            ("ord_y", "ord_j", &["red"]),
        ]);
        let layers = assign_layers(&same, "test").unwrap();
        let order = vec![Id::new("red")];
        let assigner = TrackAssigner::new(&same, &layers, &order);
        assert!(assigner.is_diamond_node(Id::new("ord_x")));
        assert!(!assigner.is_diamond_node(Id::new("ord_f")));

        let mixed = flow(&[
            ("ord_f", "ord_x", &["red"]),
            ("ord_f", "ord_y", &["blue"]),
            ("ord_x", "ord_j", &["red"]),
            ("ord_y", "ord_j", &["blue"]),
        ]);
        let layers = assign_layers(&mixed, "test").unwrap();
        let order = vec![Id::new("red"), Id::new("blue")];
        let assigner = TrackAssigner::new(&mixed, &layers, &order);
        assert!(!assigner.is_diamond_node(Id::new("ord_x")));
    }

    #[test]
    fn test_span_order_prefers_lines_touching_more_sections() {
        let graph = MetroGraph::new()
            .with_line(Line::new(Id::new("ord_short"), "Short", Color::default()))
            .with_line(Line::new(Id::new("ord_long"), "Long", Color::default()))
            .with_section(Section::new(Id::new("ord_s1"), "S1"))
            .with_section(Section::new(Id::new("ord_s2"), "S2"))
            .with_station(Station::new(Id::new("ord_p"), "p").with_section(Id::new("ord_s1")))
            .with_station(Station::new(Id::new("ord_q"), "q").with_section(Id::new("ord_s1")))
            .with_station(Station::new(Id::new("ord_r"), "r").with_section(Id::new("ord_s2")))
            .with_edge(Edge::new(Id::new("ord_p"), Id::new("ord_q"), vec![Id::new("ord_short")]))
            .with_edge(Edge::new(Id::new("ord_p"), Id::new("ord_r"), vec![Id::new("ord_long")]));

        assert_eq!(
            line_priority(&graph, LineOrder::Definition),
            vec![Id::new("ord_short"), Id::new("ord_long")]
        );
        assert_eq!(
            line_priority(&graph, LineOrder::Span),
            vec![Id::new("ord_long"), Id::new("ord_short")]
        );
    }
}
