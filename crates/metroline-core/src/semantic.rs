//! Semantic model of a transit map.
//!
//! This module defines the entities a layout run consumes and produces:
//! lines, stations, sections and the edges between stations.
//!
//! # Overview
//!
//! - [`MetroGraph`] - The complete entity set, kept in declaration order
//! - [`Line`] - A named, colored route through the pipeline
//! - [`Station`] - A node, which may be an ordinary station, a [`Port`] or a junction
//! - [`Section`] - A grouping box with optional direction, grid cell and port hints
//! - [`Edge`] - A directed connection carrying one or more lines
//!
//! Declaration order is the deterministic tie-break everywhere in the engine,
//! so every collection here preserves insertion order.

use std::fmt;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::{color::Color, identifier::Id};

/// The boundary side of a section a port sits on.
///
/// The derived ordering (`Left`, `Right`, `Top`, `Bottom`) is the tie-break
/// order for side votes and the emission order of inferred side groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortSide {
    Left,
    Right,
    Top,
    Bottom,
}

impl PortSide {
    /// Lowercase name used in synthesized port identifiers.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Top => "top",
            Self::Bottom => "bottom",
        }
    }

    pub fn is_left_or_right(self) -> bool {
        matches!(self, Self::Left | Self::Right)
    }

    pub fn is_top_or_bottom(self) -> bool {
        matches!(self, Self::Top | Self::Bottom)
    }
}

impl fmt::Display for PortSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether lines leave or enter a section through a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortFlow {
    Entry,
    Exit,
}

impl fmt::Display for PortFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entry => write!(f, "entry"),
            Self::Exit => write!(f, "exit"),
        }
    }
}

/// Flow direction of a section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
pub enum Direction {
    #[default]
    #[serde(rename = "LR")]
    LeftToRight,
    #[serde(rename = "RL")]
    RightToLeft,
    #[serde(rename = "TB")]
    TopToBottom,
}

impl Direction {
    /// Returns true for directions whose layers advance along the x axis.
    pub fn is_horizontal(self) -> bool {
        matches!(self, Self::LeftToRight | Self::RightToLeft)
    }

    pub fn is_vertical(self) -> bool {
        self == Self::TopToBottom
    }

    /// Checks whether a port on `side` sits across the flow of this direction.
    ///
    /// Top/bottom ports are perpendicular on horizontal sections and
    /// left/right ports are perpendicular on vertical ones.
    ///
    /// ```
    /// use metroline_core::semantic::{Direction, PortSide};
    ///
    /// assert!(Direction::LeftToRight.is_perpendicular(PortSide::Top));
    /// assert!(!Direction::LeftToRight.is_perpendicular(PortSide::Right));
    /// assert!(Direction::TopToBottom.is_perpendicular(PortSide::Left));
    /// ```
    pub fn is_perpendicular(self, side: PortSide) -> bool {
        if self.is_horizontal() {
            side.is_top_or_bottom()
        } else {
            side.is_left_or_right()
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LeftToRight => write!(f, "LR"),
            Self::RightToLeft => write!(f, "RL"),
            Self::TopToBottom => write!(f, "TB"),
        }
    }
}

/// A cell of the coarse section grid, with optional spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridCell {
    col: usize,
    row: usize,
    row_span: usize,
    col_span: usize,
}

impl GridCell {
    /// Creates a single cell at the given column and row.
    pub fn new(col: usize, row: usize) -> Self {
        Self {
            col,
            row,
            row_span: 1,
            col_span: 1,
        }
    }

    pub fn col(&self) -> usize {
        self.col
    }

    pub fn row(&self) -> usize {
        self.row
    }

    pub fn row_span(&self) -> usize {
        self.row_span
    }

    pub fn col_span(&self) -> usize {
        self.col_span
    }

    /// Sets the number of rows covered, clamped to at least one.
    pub fn with_row_span(mut self, row_span: usize) -> Self {
        self.row_span = row_span.max(1);
        self
    }

    /// Sets the number of columns covered, clamped to at least one.
    pub fn with_col_span(mut self, col_span: usize) -> Self {
        self.col_span = col_span.max(1);
        self
    }

    /// Last column covered by this cell.
    pub fn last_col(&self) -> usize {
        self.col + self.col_span - 1
    }

    /// Last row covered by this cell.
    pub fn last_row(&self) -> usize {
        self.row + self.row_span - 1
    }

    /// Checks whether two cells share at least one column.
    pub fn overlaps_cols(&self, other: &GridCell) -> bool {
        self.col <= other.last_col() && other.col <= self.last_col()
    }
}

/// An explicit entry or exit declaration: a side and the lines using it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortHint {
    side: PortSide,
    lines: Vec<Id>,
}

impl PortHint {
    pub fn new(side: PortSide, lines: Vec<Id>) -> Self {
        Self { side, lines }
    }

    pub fn side(&self) -> PortSide {
        self.side
    }

    pub fn lines(&self) -> &[Id] {
        &self.lines
    }
}

/// A metro line.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    id: Id,
    name: String,
    color: Color,
}

impl Line {
    pub fn new(id: Id, name: impl Into<String>, color: Color) -> Self {
        Self {
            id,
            name: name.into(),
            color,
        }
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn color(&self) -> Color {
        self.color
    }
}

/// A synthesized boundary station of a section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    section: Id,
    side: PortSide,
    flow: PortFlow,
    lines: Vec<Id>,
}

impl Port {
    pub fn new(section: Id, side: PortSide, flow: PortFlow, lines: Vec<Id>) -> Self {
        Self {
            section,
            side,
            flow,
            lines,
        }
    }

    pub fn section(&self) -> Id {
        self.section
    }

    pub fn side(&self) -> PortSide {
        self.side
    }

    pub fn flow(&self) -> PortFlow {
        self.flow
    }

    pub fn is_entry(&self) -> bool {
        self.flow == PortFlow::Entry
    }

    pub fn lines(&self) -> &[Id] {
        &self.lines
    }
}

/// What a station is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StationKind {
    /// An ordinary pipeline step.
    Station,
    /// A section boundary station.
    Port(Port),
    /// An unlabeled station where a bundle of lines diverges.
    Junction,
}

/// A node of the metro map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Station {
    id: Id,
    label: String,
    section: Option<Id>,
    kind: StationKind,
    hidden: bool,
    terminus: Option<String>,
}

impl Station {
    /// Creates an ordinary station outside any section.
    ///
    /// # Examples
    ///
    /// ```
    /// use metroline_core::{identifier::Id, semantic::Station};
    ///
    /// let station = Station::new(Id::new("fastqc"), "FastQC").with_section(Id::new("qc"));
    /// assert_eq!(station.label(), "FastQC");
    /// assert_eq!(station.section(), Some(Id::new("qc")));
    /// assert!(!station.is_boundary());
    /// ```
    pub fn new(id: Id, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            section: None,
            kind: StationKind::Station,
            hidden: false,
            terminus: None,
        }
    }

    /// Creates a port station owned by the port's section.
    pub fn port(id: Id, port: Port) -> Self {
        Self {
            id,
            label: String::new(),
            section: Some(port.section()),
            kind: StationKind::Port(port),
            hidden: false,
            terminus: None,
        }
    }

    /// Creates a junction station. Junctions belong to no section.
    pub fn junction(id: Id) -> Self {
        Self {
            id,
            label: String::new(),
            section: None,
            kind: StationKind::Junction,
            hidden: false,
            terminus: None,
        }
    }

    pub fn with_section(mut self, section: Id) -> Self {
        self.section = Some(section);
        self
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    /// Marks the station as a file terminus with an external label.
    pub fn with_terminus(mut self, label: impl Into<String>) -> Self {
        self.terminus = Some(label.into());
        self
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn section(&self) -> Option<Id> {
        self.section
    }

    pub fn kind(&self) -> &StationKind {
        &self.kind
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn is_terminus(&self) -> bool {
        self.terminus.is_some()
    }

    pub fn terminus_label(&self) -> Option<&str> {
        self.terminus.as_deref()
    }

    /// Returns the port description if this station is a port.
    pub fn as_port(&self) -> Option<&Port> {
        match &self.kind {
            StationKind::Port(port) => Some(port),
            _ => None,
        }
    }

    pub fn is_port(&self) -> bool {
        matches!(self.kind, StationKind::Port(_))
    }

    pub fn is_junction(&self) -> bool {
        matches!(self.kind, StationKind::Junction)
    }

    /// Ports and junctions are both boundary stations: synthesized, unlabeled,
    /// and never laid out inside a section.
    pub fn is_boundary(&self) -> bool {
        !matches!(self.kind, StationKind::Station)
    }
}

/// A grouping box of stations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    id: Id,
    label: String,
    direction: Option<Direction>,
    grid: Option<GridCell>,
    entry_hints: Vec<PortHint>,
    exit_hints: Vec<PortHint>,
}

impl Section {
    pub fn new(id: Id, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            direction: None,
            grid: None,
            entry_hints: Vec::new(),
            exit_hints: Vec::new(),
        }
    }

    /// Sets an explicit direction. Explicit directions are never overridden by inference.
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Sets an explicit grid cell. Explicit cells are never overridden by inference.
    pub fn with_grid(mut self, grid: GridCell) -> Self {
        self.grid = Some(grid);
        self
    }

    pub fn with_entry_hint(mut self, hint: PortHint) -> Self {
        self.entry_hints.push(hint);
        self
    }

    pub fn with_exit_hint(mut self, hint: PortHint) -> Self {
        self.exit_hints.push(hint);
        self
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    pub fn grid(&self) -> Option<GridCell> {
        self.grid
    }

    pub fn entry_hints(&self) -> &[PortHint] {
        &self.entry_hints
    }

    pub fn exit_hints(&self) -> &[PortHint] {
        &self.exit_hints
    }

    pub fn set_entry_hints(&mut self, hints: Vec<PortHint>) -> &mut Self {
        self.entry_hints = hints;
        self
    }

    pub fn set_exit_hints(&mut self, hints: Vec<PortHint>) -> &mut Self {
        self.exit_hints = hints;
        self
    }
}

/// A directed connection between two stations carrying an ordered, non-empty list of lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    source: Id,
    target: Id,
    lines: Vec<Id>,
}

impl Edge {
    pub fn new(source: Id, target: Id, lines: Vec<Id>) -> Self {
        Self {
            source,
            target,
            lines,
        }
    }

    pub fn source(&self) -> Id {
        self.source
    }

    pub fn target(&self) -> Id {
        self.target
    }

    pub fn lines(&self) -> &[Id] {
        &self.lines
    }

    pub fn carries(&self, line: Id) -> bool {
        self.lines.contains(&line)
    }

    /// Adds lines not yet carried, keeping first-occurrence order.
    pub fn merge_lines(&mut self, lines: &[Id]) {
        for &line in lines {
            if !self.lines.contains(&line) {
                self.lines.push(line);
            }
        }
    }
}

/// The complete entity set of a transit map.
///
/// # Examples
///
/// ```
/// use metroline_core::{
///     color::Color,
///     identifier::Id,
///     semantic::{Edge, Line, MetroGraph, Section, Station},
/// };
///
/// let main = Id::new("main");
/// let qc = Id::new("qc");
/// let graph = MetroGraph::new()
///     .with_line(Line::new(main, "Main", Color::new("#0570b0").unwrap()))
///     .with_section(Section::new(qc, "Quality control"))
///     .with_station(Station::new(Id::new("fastqc"), "FastQC").with_section(qc))
///     .with_station(Station::new(Id::new("multiqc"), "MultiQC").with_section(qc))
///     .with_edge(Edge::new(Id::new("fastqc"), Id::new("multiqc"), vec![main]));
///
/// assert_eq!(graph.section_stations(qc).len(), 2);
/// assert_eq!(graph.line_index(main), Some(0));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetroGraph {
    lines: IndexMap<Id, Line>,
    stations: IndexMap<Id, Station>,
    sections: IndexMap<Id, Section>,
    edges: Vec<Edge>,
    max_station_columns: Option<usize>,
}

impl MetroGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_line(mut self, line: Line) -> Self {
        self.add_line(line);
        self
    }

    pub fn with_station(mut self, station: Station) -> Self {
        self.add_station(station);
        self
    }

    pub fn with_section(mut self, section: Section) -> Self {
        self.add_section(section);
        self
    }

    pub fn with_edge(mut self, edge: Edge) -> Self {
        self.add_edge(edge);
        self
    }

    /// Overrides the configured fold threshold for this graph.
    pub fn with_max_station_columns(mut self, columns: usize) -> Self {
        self.max_station_columns = Some(columns);
        self
    }

    pub fn add_line(&mut self, line: Line) {
        self.lines.insert(line.id(), line);
    }

    /// Adds a station. A station with an existing id replaces the old one in place.
    pub fn add_station(&mut self, station: Station) {
        self.stations.insert(station.id(), station);
    }

    pub fn add_section(&mut self, section: Section) {
        self.sections.insert(section.id(), section);
    }

    pub fn add_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    pub fn lines(&self) -> impl Iterator<Item = &Line> {
        self.lines.values()
    }

    pub fn line(&self, id: Id) -> Option<&Line> {
        self.lines.get(&id)
    }

    /// Declaration index of a line.
    pub fn line_index(&self, id: Id) -> Option<usize> {
        self.lines.get_index_of(&id)
    }

    pub fn has_lines(&self) -> bool {
        !self.lines.is_empty()
    }

    pub fn stations(&self) -> impl Iterator<Item = &Station> {
        self.stations.values()
    }

    pub fn station(&self, id: Id) -> Option<&Station> {
        self.stations.get(&id)
    }

    /// Declaration index of a station.
    pub fn station_index(&self, id: Id) -> Option<usize> {
        self.stations.get_index_of(&id)
    }

    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.values()
    }

    pub fn section(&self, id: Id) -> Option<&Section> {
        self.sections.get(&id)
    }

    pub fn section_mut(&mut self, id: Id) -> Option<&mut Section> {
        self.sections.get_mut(&id)
    }

    /// Declaration index of a section.
    pub fn section_index(&self, id: Id) -> Option<usize> {
        self.sections.get_index_of(&id)
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Replaces the edge list.
    pub fn set_edges(&mut self, edges: Vec<Edge>) -> &mut Self {
        self.edges = edges;
        self
    }

    pub fn max_station_columns(&self) -> Option<usize> {
        self.max_station_columns
    }

    /// Section owning a station, if both exist.
    pub fn section_of(&self, station: Id) -> Option<Id> {
        self.stations.get(&station).and_then(Station::section)
    }

    /// Stations owned by a section, ports included, in declaration order.
    pub fn section_stations(&self, section: Id) -> Vec<Id> {
        self.stations
            .values()
            .filter(|s| s.section() == Some(section))
            .map(Station::id)
            .collect()
    }

    /// All port stations in declaration order.
    pub fn ports(&self) -> impl Iterator<Item = &Station> {
        self.stations.values().filter(|s| s.is_port())
    }

    /// All junction stations in declaration order.
    pub fn junctions(&self) -> impl Iterator<Item = &Station> {
        self.stations.values().filter(|s| s.is_junction())
    }

    /// Checks whether a station is a port or junction.
    pub fn is_boundary(&self, station: Id) -> bool {
        self.stations.get(&station).is_some_and(Station::is_boundary)
    }

    /// Lines touching a station, ordered by declaration.
    pub fn station_lines(&self, station: Id) -> Vec<Id> {
        let mut lines: Vec<Id> = Vec::new();
        for edge in &self.edges {
            if edge.source() == station || edge.target() == station {
                for &line in edge.lines() {
                    if !lines.contains(&line) {
                        lines.push(line);
                    }
                }
            }
        }
        lines.sort_by_key(|&line| self.line_index(line).unwrap_or(usize::MAX));
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_graph() -> MetroGraph {
        let red = Id::new("red");
        let blue = Id::new("blue");
        let sec = Id::new("align");

        MetroGraph::new()
            .with_line(Line::new(red, "Red", Color::new("red").unwrap()))
            .with_line(Line::new(blue, "Blue", Color::new("blue").unwrap()))
            .with_section(Section::new(sec, "Alignment"))
            .with_station(Station::new(Id::new("star"), "STAR").with_section(sec))
            .with_station(Station::new(Id::new("salmon"), "Salmon").with_section(sec))
            .with_station(Station::new(Id::new("report"), "Report"))
            .with_edge(Edge::new(Id::new("star"), Id::new("salmon"), vec![blue, red]))
            .with_edge(Edge::new(Id::new("salmon"), Id::new("report"), vec![red]))
    }

    #[test]
    fn test_port_side_order() {
        let mut sides = vec![PortSide::Bottom, PortSide::Top, PortSide::Right, PortSide::Left];
        sides.sort();
        assert_eq!(
            sides,
            vec![PortSide::Left, PortSide::Right, PortSide::Top, PortSide::Bottom]
        );
        assert_eq!(PortSide::Bottom.to_string(), "bottom");
    }

    #[test]
    fn test_direction_perpendicular() {
        assert!(Direction::RightToLeft.is_perpendicular(PortSide::Bottom));
        assert!(!Direction::RightToLeft.is_perpendicular(PortSide::Left));
        assert!(!Direction::TopToBottom.is_perpendicular(PortSide::Top));
        assert!(Direction::TopToBottom.is_perpendicular(PortSide::Right));
        assert_eq!(Direction::default(), Direction::LeftToRight);
        assert_eq!(Direction::TopToBottom.to_string(), "TB");
    }

    #[test]
    fn test_grid_cell_spans() {
        let cell = GridCell::new(2, 1).with_row_span(3).with_col_span(0);
        assert_eq!(cell.col_span(), 1);
        assert_eq!(cell.last_row(), 3);
        assert_eq!(cell.last_col(), 2);

        let wide = GridCell::new(1, 0).with_col_span(2);
        assert!(cell.overlaps_cols(&wide));
        assert!(!GridCell::new(0, 0).overlaps_cols(&GridCell::new(1, 0)));
    }

    #[test]
    fn test_station_kinds() {
        let sec = Id::new("trim");
        let port = Station::port(
            Id::new("trim__exit_right_0"),
            Port::new(sec, PortSide::Right, PortFlow::Exit, vec![Id::new("red")]),
        );
        assert!(port.is_port());
        assert!(port.is_boundary());
        assert_eq!(port.section(), Some(sec));
        assert!(!port.as_port().unwrap().is_entry());

        let junction = Station::junction(Id::junction(4));
        assert!(junction.is_junction());
        assert!(junction.is_boundary());
        assert_eq!(junction.section(), None);
        assert_eq!(junction.label(), "");

        let station = Station::new(Id::new("cutadapt"), "Cutadapt").with_terminus("fastq");
        assert!(station.is_terminus());
        assert_eq!(station.terminus_label(), Some("fastq"));
        assert!(station.as_port().is_none());
    }

    #[test]
    fn test_edge_merge_lines() {
        let mut edge = Edge::new(Id::new("a"), Id::new("b"), vec![Id::new("x")]);
        edge.merge_lines(&[Id::new("y"), Id::new("x")]);
        assert_eq!(edge.lines(), &[Id::new("x"), Id::new("y")]);
        assert!(edge.carries(Id::new("y")));
    }

    #[test]
    fn test_graph_lookups() {
        let graph = sample_graph();
        let sec = Id::new("align");

        assert_eq!(graph.section_of(Id::new("star")), Some(sec));
        assert_eq!(graph.section_of(Id::new("report")), None);
        assert_eq!(
            graph.section_stations(sec),
            vec![Id::new("star"), Id::new("salmon")]
        );
        assert_eq!(graph.station_index(Id::new("report")), Some(2));
        assert_eq!(graph.section_index(sec), Some(0));
        assert!(!graph.is_boundary(Id::new("star")));
    }

    #[test]
    fn test_station_lines_follow_declaration_order() {
        let graph = sample_graph();
        assert_eq!(
            graph.station_lines(Id::new("salmon")),
            vec![Id::new("red"), Id::new("blue")]
        );
        assert_eq!(graph.station_lines(Id::new("report")), vec![Id::new("red")]);
    }

    #[test]
    fn test_add_station_replaces_in_place() {
        let mut graph = sample_graph();
        graph.add_station(Station::new(Id::new("star"), "STAR aligner"));
        assert_eq!(graph.station_index(Id::new("star")), Some(0));
        assert_eq!(graph.station(Id::new("star")).unwrap().label(), "STAR aligner");
    }
}
