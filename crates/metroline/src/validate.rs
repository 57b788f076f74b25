//! Geometry invariant checks over a finished [`Layout`].
//!
//! These checks never fail a layout. They report engine defects as
//! [`Violation`]s so tests and tooling can fail loudly on them.
//!
//! # Overview
//!
//! - [`Check::SectionOverlap`] - two section boxes intersect.
//! - [`Check::StationContainment`] - a station lies outside its section box.
//! - [`Check::PortBoundary`] - a port is off the side it was assigned to.
//! - [`Check::CoordinateSanity`] - non-finite or far-off coordinates.
//! - [`Check::MinimumSectionSpacing`] - sections closer than the minimum gap.
//! - [`Check::EdgeWaypoints`] - degenerate routes.
//! - [`Check::StationAsElbow`] - a perpendicular port aligned with a station.
//!
//! # Example
//!
//! ```
//! use metroline::{LayoutBuilder, semantic::MetroGraph, validate::validate_layout};
//!
//! let layout = LayoutBuilder::default().layout(&MetroGraph::new()).unwrap();
//! assert!(validate_layout(&layout).is_empty());
//! ```

use std::fmt;

use indexmap::IndexMap;
use log::debug;

use metroline_core::{
    geometry::Point,
    identifier::Id,
    semantic::{PortSide, Station},
};

use crate::Layout;

/// Sections may touch or share up to a pixel of border.
const OVERLAP_TOLERANCE: f32 = 1.0;
/// Spacing below this is overlap, reported by the overlap check.
const SPACING_FLOOR: f32 = -1.0;
const CONTAINMENT_MARGIN: f32 = 5.0;
const PORT_BOUNDARY_TOLERANCE: f32 = 5.0;
const MAX_COORDINATE: f32 = 10_000.0;
const MIN_SECTION_GAP: f32 = 5.0;
/// Roughly a station marker diameter.
const ELBOW_TOLERANCE: f32 = 10.0;

/// The severity level of a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// A broken invariant.
    Error,

    /// A layout that is valid but likely to render poorly.
    Warning,
}

impl Severity {
    /// Returns `true` if this is an error severity.
    pub fn is_error(&self) -> bool {
        matches!(self, Severity::Error)
    }

    /// Returns `true` if this is a warning severity.
    pub fn is_warning(&self) -> bool {
        matches!(self, Severity::Warning)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// The invariant a violation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Check {
    SectionOverlap,
    StationContainment,
    PortBoundary,
    CoordinateSanity,
    MinimumSectionSpacing,
    EdgeWaypoints,
    StationAsElbow,
}

impl Check {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SectionOverlap => "section_overlap",
            Self::StationContainment => "station_containment",
            Self::PortBoundary => "port_boundary",
            Self::CoordinateSanity => "coordinate_sanity",
            Self::MinimumSectionSpacing => "minimum_section_spacing",
            Self::EdgeWaypoints => "edge_waypoints",
            Self::StationAsElbow => "station_as_elbow",
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single broken invariant, with the ids involved as context.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    check: Check,
    severity: Severity,
    message: String,
    context: IndexMap<&'static str, String>,
}

impl Violation {
    pub fn error(check: Check, message: impl Into<String>) -> Self {
        Self::new(check, Severity::Error, message)
    }

    pub fn warning(check: Check, message: impl Into<String>) -> Self {
        Self::new(check, Severity::Warning, message)
    }

    fn new(check: Check, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            check,
            severity,
            message: message.into(),
            context: IndexMap::new(),
        }
    }

    /// Attaches a context entry, such as the offending station id.
    pub fn with_context(mut self, key: &'static str, value: impl ToString) -> Self {
        self.context.insert(key, value.to_string());
        self
    }

    pub fn check(&self) -> Check {
        self.check
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &IndexMap<&'static str, String> {
        &self.context
    }

    /// Returns the context value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.context.get(key).map(String::as_str)
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]: {}", self.severity, self.check, self.message)
    }
}

/// Runs every check and returns the violations found, errors and warnings
/// interleaved in check order.
pub fn validate_layout(layout: &Layout) -> Vec<Violation> {
    let mut violations = Vec::new();
    violations.extend(check_section_overlap(layout));
    violations.extend(check_station_containment(layout));
    violations.extend(check_port_boundary(layout));
    violations.extend(check_coordinate_sanity(layout));
    violations.extend(check_minimum_section_spacing(layout));
    violations.extend(check_edge_waypoints(layout));
    violations.extend(check_station_as_elbow(layout));

    debug!(
        violations = violations.len(),
        errors = violations.iter().filter(|v| v.severity().is_error()).count();
        "Validated layout"
    );
    violations
}

/// Flags every pair of sections whose boxes overlap by more than a pixel.
pub fn check_section_overlap(layout: &Layout) -> Vec<Violation> {
    let sections: Vec<_> = layout
        .sections()
        .filter(|s| s.bounds().has_area())
        .collect();

    let mut violations = Vec::new();
    for (i, a) in sections.iter().enumerate() {
        for b in &sections[i + 1..] {
            if a.bounds().overlaps(&b.bounds(), OVERLAP_TOLERANCE) {
                violations.push(
                    Violation::error(
                        Check::SectionOverlap,
                        format!("sections `{}` and `{}` overlap", a.id(), b.id()),
                    )
                    .with_context("section_a", a.id())
                    .with_context("section_b", b.id()),
                );
            }
        }
    }
    violations
}

/// Flags internal stations outside their section box.
pub fn check_station_containment(layout: &Layout) -> Vec<Violation> {
    let mut violations = Vec::new();
    for station in internal_stations(layout) {
        let Some(section) = station.section() else {
            continue;
        };
        let Some(frame) = layout.section(section) else {
            continue;
        };
        let bounds = frame.bounds();
        if bounds.width() == 0.0 {
            continue;
        }
        let Some(pos) = layout.position(station.id()) else {
            continue;
        };
        if !bounds.contains_point(pos, CONTAINMENT_MARGIN) {
            violations.push(
                Violation::error(
                    Check::StationContainment,
                    format!(
                        "station `{}` at ({:.1}, {:.1}) is outside section `{}`",
                        station.id(),
                        pos.x(),
                        pos.y(),
                        section
                    ),
                )
                .with_context("station", station.id())
                .with_context("section", section),
            );
        }
    }
    violations
}

/// Flags ports that are not on the side of the box they were assigned to.
pub fn check_port_boundary(layout: &Layout) -> Vec<Violation> {
    let mut violations = Vec::new();
    for station in layout.graph().ports() {
        let Some(port) = station.as_port() else {
            continue;
        };
        let Some(frame) = layout.section(port.section()) else {
            continue;
        };
        let bounds = frame.bounds();
        if bounds.width() == 0.0 {
            continue;
        }
        let Some(pos) = layout.position(station.id()) else {
            continue;
        };

        let distance = match port.side() {
            PortSide::Left => (pos.x() - bounds.min_x()).abs(),
            PortSide::Right => (pos.x() - bounds.max_x()).abs(),
            PortSide::Top => (pos.y() - bounds.min_y()).abs(),
            PortSide::Bottom => (pos.y() - bounds.max_y()).abs(),
        };
        if distance > PORT_BOUNDARY_TOLERANCE {
            violations.push(
                Violation::warning(
                    Check::PortBoundary,
                    format!(
                        "port `{}` is {distance:.1} away from the {} side of section `{}`",
                        station.id(),
                        port.side(),
                        port.section()
                    ),
                )
                .with_context("port", station.id())
                .with_context("section", port.section())
                .with_context("side", port.side()),
            );
        }
    }
    violations
}

/// Flags non-finite coordinates as errors and far-off ones as warnings.
pub fn check_coordinate_sanity(layout: &Layout) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (&station, &pos) in layout.coordinates() {
        for (axis, value) in [("x", pos.x()), ("y", pos.y())] {
            if !value.is_finite() {
                violations.push(
                    Violation::error(
                        Check::CoordinateSanity,
                        format!("station `{station}` has non-finite {axis} = {value}"),
                    )
                    .with_context("station", station)
                    .with_context("axis", axis),
                );
            } else if value.abs() > MAX_COORDINATE {
                violations.push(
                    Violation::warning(
                        Check::CoordinateSanity,
                        format!("station `{station}` has extreme {axis} = {value:.1}"),
                    )
                    .with_context("station", station)
                    .with_context("axis", axis),
                );
            }
        }
    }
    violations
}

/// Flags neighbouring sections closer than the minimum gap.
///
/// Only pairs that face each other across a gap are measured; pairs that
/// are far apart on either axis are skipped, and overlaps are left to
/// [`check_section_overlap`].
pub fn check_minimum_section_spacing(layout: &Layout) -> Vec<Violation> {
    let sections: Vec<_> = layout
        .sections()
        .filter(|s| s.bounds().has_area())
        .collect();

    let mut violations = Vec::new();
    for (i, a) in sections.iter().enumerate() {
        for b in &sections[i + 1..] {
            let (ab, bb) = (a.bounds(), b.bounds());
            let gap_x = (bb.min_x() - ab.max_x()).max(ab.min_x() - bb.max_x());
            let gap_y = (bb.min_y() - ab.max_y()).max(ab.min_y() - bb.max_y());
            if gap_x > MIN_SECTION_GAP || gap_y > MIN_SECTION_GAP {
                continue;
            }
            let gap = gap_x.max(gap_y);
            if (SPACING_FLOOR..MIN_SECTION_GAP).contains(&gap) {
                violations.push(
                    Violation::warning(
                        Check::MinimumSectionSpacing,
                        format!(
                            "sections `{}` and `{}` are {gap:.1} apart, below {MIN_SECTION_GAP}",
                            a.id(),
                            b.id()
                        ),
                    )
                    .with_context("section_a", a.id())
                    .with_context("section_b", b.id()),
                );
            }
        }
    }
    violations
}

/// Flags routes with fewer than two waypoints or a non-finite waypoint.
pub fn check_edge_waypoints(layout: &Layout) -> Vec<Violation> {
    let mut violations = Vec::new();
    for route in layout.routes() {
        let edge = format!("{} -> {}", route.source(), route.target());
        if route.points().len() < 2 {
            violations.push(
                Violation::error(
                    Check::EdgeWaypoints,
                    format!(
                        "route {edge} on line `{}` has {} waypoint(s)",
                        route.line(),
                        route.points().len()
                    ),
                )
                .with_context("edge", &edge)
                .with_context("line", route.line()),
            );
        }
        if let Some(idx) = route.points().iter().position(|p| !p.is_finite()) {
            violations.push(
                Violation::error(
                    Check::EdgeWaypoints,
                    format!("route {edge} on line `{}` has a non-finite waypoint", route.line()),
                )
                .with_context("edge", &edge)
                .with_context("line", route.line())
                .with_context("index", idx),
            );
        }
    }
    violations
}

/// Flags perpendicular ports whose bend would pass through an internal
/// station of the same section.
///
/// Left/right ports of a top-to-bottom section are compared on y, and
/// top/bottom ports of a horizontal section on x. Ports along the flow
/// share a track with the stations and are not checked.
pub fn check_station_as_elbow(layout: &Layout) -> Vec<Violation> {
    let mut internals: IndexMap<Id, Vec<(Id, Point)>> = IndexMap::new();
    for station in internal_stations(layout) {
        let (Some(section), Some(pos)) = (station.section(), layout.position(station.id())) else {
            continue;
        };
        internals.entry(section).or_default().push((station.id(), pos));
    }

    let mut violations = Vec::new();
    for station in layout.graph().ports() {
        let Some(port) = station.as_port() else {
            continue;
        };
        let Some(frame) = layout.section(port.section()) else {
            continue;
        };
        if !frame.direction().is_perpendicular(port.side()) {
            continue;
        }
        let Some(stations) = internals.get(&port.section()) else {
            continue;
        };
        let Some(port_pos) = layout.position(station.id()) else {
            continue;
        };

        let horizontal = port.side().is_left_or_right();
        for &(id, pos) in stations {
            let distance = if horizontal {
                (port_pos.y() - pos.y()).abs()
            } else {
                (port_pos.x() - pos.x()).abs()
            };
            if distance <= ELBOW_TOLERANCE {
                let axis = if horizontal { "y" } else { "x" };
                violations.push(
                    Violation::error(
                        Check::StationAsElbow,
                        format!(
                            "{} port `{}` is aligned with station `{id}` on {axis} ({distance:.1} apart)",
                            port.side(),
                            station.id()
                        ),
                    )
                    .with_context("port", station.id())
                    .with_context("station", id)
                    .with_context("section", port.section()),
                );
            }
        }
    }
    violations
}

fn internal_stations(layout: &Layout) -> impl Iterator<Item = &Station> {
    layout
        .graph()
        .stations()
        .filter(|s| !s.is_port() && s.section().is_some())
}

#[cfg(test)]
mod tests {
    use metroline_core::{
        color::Color,
        geometry::{Bounds, Size},
        semantic::{Direction, Edge, Line, MetroGraph, Port, PortFlow, Section},
    };

    use super::*;
    use crate::{
        layout::SectionLayout,
        routing::{RoutedPath, StationOffsets},
    };

    fn frame(id: Id, direction: Direction, x: f32, y: f32, w: f32, h: f32) -> SectionLayout {
        let bounds = Bounds::new_from_top_left(Point::new(x, y), Size::new(w, h));
        SectionLayout::new(id, 1, direction, bounds)
    }

    fn layout(
        graph: MetroGraph,
        frames: Vec<SectionLayout>,
        positions: &[(Id, f32, f32)],
        routes: Vec<RoutedPath>,
    ) -> Layout {
        Layout {
            graph,
            sections: frames.into_iter().map(|f| (f.id(), f)).collect(),
            coordinates: positions
                .iter()
                .map(|&(id, x, y)| (id, Point::new(x, y)))
                .collect(),
            offsets: StationOffsets::default(),
            routes,
        }
    }

    #[test]
    fn test_severity_display() {
        assert_eq!(Severity::Error.to_string(), "error");
        assert_eq!(Severity::Warning.to_string(), "warning");
        assert!(Severity::Error.is_error());
        assert!(!Severity::Error.is_warning());
        assert!(Severity::Warning.is_warning());
    }

    #[test]
    fn test_overlapping_sections_are_errors() {
        let (a, b) = (Id::new("va_a"), Id::new("va_b"));
        let frames = vec![
            frame(a, Direction::LeftToRight, 0.0, 0.0, 100.0, 100.0),
            frame(b, Direction::LeftToRight, 50.0, 50.0, 100.0, 100.0),
        ];
        let violations = check_section_overlap(&layout(MetroGraph::new(), frames, &[], vec![]));

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].check(), Check::SectionOverlap);
        assert!(violations[0].severity().is_error());
        assert_eq!(violations[0].get("section_a"), Some("va_a"));
        assert_eq!(violations[0].get("section_b"), Some("va_b"));
    }

    #[test]
    fn test_touching_sections_do_not_overlap() {
        let frames = vec![
            frame(Id::new("vt_a"), Direction::LeftToRight, 0.0, 0.0, 100.0, 100.0),
            frame(Id::new("vt_b"), Direction::LeftToRight, 100.0, 0.0, 100.0, 100.0),
        ];
        let layout = layout(MetroGraph::new(), frames, &[], vec![]);

        assert!(check_section_overlap(&layout).is_empty());
        // Touching is still closer than the minimum gap.
        let spacing = check_minimum_section_spacing(&layout);
        assert_eq!(spacing.len(), 1);
        assert!(spacing[0].severity().is_warning());
    }

    #[test]
    fn test_spaced_sections_pass() {
        let frames = vec![
            frame(Id::new("vs_a"), Direction::LeftToRight, 0.0, 0.0, 100.0, 100.0),
            frame(Id::new("vs_b"), Direction::LeftToRight, 150.0, 0.0, 100.0, 100.0),
            frame(Id::new("vs_c"), Direction::LeftToRight, 0.0, 110.0, 100.0, 100.0),
        ];
        let layout = layout(MetroGraph::new(), frames, &[], vec![]);
        assert!(check_section_overlap(&layout).is_empty());
        assert!(check_minimum_section_spacing(&layout).is_empty());
    }

    #[test]
    fn test_station_outside_section() {
        let qc = Id::new("vc_qc");
        let graph = MetroGraph::new()
            .with_section(Section::new(qc, "QC"))
            .with_station(Station::new(Id::new("vc_in"), "in").with_section(qc))
            .with_station(Station::new(Id::new("vc_edge"), "edge").with_section(qc))
            .with_station(Station::new(Id::new("vc_out"), "out").with_section(qc));
        let frames = vec![frame(qc, Direction::LeftToRight, 0.0, 0.0, 100.0, 100.0)];
        let positions = [
            (Id::new("vc_in"), 50.0, 50.0),
            (Id::new("vc_edge"), 104.0, 50.0),
            (Id::new("vc_out"), 120.0, 50.0),
        ];
        let violations = check_station_containment(&layout(graph, frames, &positions, vec![]));

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].get("station"), Some("vc_out"));
        assert_eq!(violations[0].get("section"), Some("vc_qc"));
    }

    #[test]
    fn test_port_off_its_side_is_a_warning() {
        let qc = Id::new("vp_qc");
        let red = Id::new("vp_red");
        let on = Station::port(
            Id::new("vp_on"),
            Port::new(qc, PortSide::Right, PortFlow::Exit, vec![red]),
        )
        .with_section(qc);
        let off = Station::port(
            Id::new("vp_off"),
            Port::new(qc, PortSide::Left, PortFlow::Entry, vec![red]),
        )
        .with_section(qc);
        let graph = MetroGraph::new()
            .with_section(Section::new(qc, "QC"))
            .with_station(on)
            .with_station(off);
        let frames = vec![frame(qc, Direction::LeftToRight, 0.0, 0.0, 100.0, 100.0)];
        let positions = [(Id::new("vp_on"), 100.0, 40.0), (Id::new("vp_off"), 20.0, 40.0)];
        let violations = check_port_boundary(&layout(graph, frames, &positions, vec![]));

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].get("port"), Some("vp_off"));
        assert_eq!(violations[0].get("side"), Some("left"));
        assert!(violations[0].severity().is_warning());
    }

    #[test]
    fn test_coordinate_sanity() {
        let positions = [
            (Id::new("vn_ok"), 10.0, 10.0),
            (Id::new("vn_nan"), f32::NAN, 10.0),
            (Id::new("vn_far"), 10.0, 20_000.0),
        ];
        let violations = check_coordinate_sanity(&layout(MetroGraph::new(), vec![], &positions, vec![]));

        assert_eq!(violations.len(), 2);
        assert!(violations[0].severity().is_error());
        assert_eq!(violations[0].get("station"), Some("vn_nan"));
        assert_eq!(violations[0].get("axis"), Some("x"));
        assert!(violations[1].severity().is_warning());
        assert_eq!(violations[1].get("axis"), Some("y"));
    }

    #[test]
    fn test_degenerate_routes() {
        let (a, b, red) = (Id::new("vw_a"), Id::new("vw_b"), Id::new("vw_red"));
        let routes = vec![
            RoutedPath::new(a, b, red, vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)]),
            RoutedPath::new(a, b, red, vec![Point::new(0.0, 0.0)]),
            RoutedPath::new(a, b, red, vec![Point::new(0.0, 0.0), Point::new(f32::NAN, 0.0)]),
        ];
        let violations = check_edge_waypoints(&layout(MetroGraph::new(), vec![], &[], routes));

        assert_eq!(violations.len(), 2);
        assert!(violations.iter().all(|v| v.check() == Check::EdgeWaypoints));
        assert_eq!(violations[1].get("index"), Some("1"));
        assert_eq!(violations[0].get("edge"), Some("vw_a -> vw_b"));
    }

    #[test]
    fn test_perpendicular_port_aligned_with_station() {
        let (tb, lr, red) = (Id::new("ve_tb"), Id::new("ve_lr"), Id::new("ve_red"));
        let side_port = Station::port(
            Id::new("ve_side"),
            Port::new(tb, PortSide::Left, PortFlow::Entry, vec![red]),
        )
        .with_section(tb);
        let flow_port = Station::port(
            Id::new("ve_flow"),
            Port::new(lr, PortSide::Left, PortFlow::Entry, vec![red]),
        )
        .with_section(lr);
        let graph = MetroGraph::new()
            .with_line(Line::new(red, "Red", Color::default()))
            .with_section(Section::new(tb, "TB"))
            .with_section(Section::new(lr, "LR"))
            .with_station(Station::new(Id::new("ve_s"), "s").with_section(tb))
            .with_station(Station::new(Id::new("ve_t"), "t").with_section(lr))
            .with_station(side_port)
            .with_station(flow_port)
            .with_edge(Edge::new(Id::new("ve_side"), Id::new("ve_s"), vec![red]))
            .with_edge(Edge::new(Id::new("ve_flow"), Id::new("ve_t"), vec![red]));
        let frames = vec![
            frame(tb, Direction::TopToBottom, 0.0, 0.0, 100.0, 100.0),
            frame(lr, Direction::LeftToRight, 200.0, 0.0, 100.0, 100.0),
        ];
        let positions = [
            (Id::new("ve_s"), 50.0, 44.0),
            (Id::new("ve_side"), 0.0, 40.0),
            (Id::new("ve_t"), 250.0, 40.0),
            (Id::new("ve_flow"), 200.0, 40.0),
        ];
        let violations = check_station_as_elbow(&layout(graph, frames, &positions, vec![]));

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].get("port"), Some("ve_side"));
        assert_eq!(violations[0].get("station"), Some("ve_s"));
        assert_eq!(
            violations[0].to_string(),
            "error[station_as_elbow]: left port `ve_side` is aligned with station `ve_s` on y (4.0 apart)"
        );
    }
}
