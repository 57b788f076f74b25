//! Property tests over generated section pipelines.

use proptest::prelude::*;

use metroline::{
    Layout, LayoutBuilder,
    color::Color,
    config::{AppConfig, InferenceConfig, LayoutConfig, RoutingConfig},
    geometry::Point,
    identifier::Id,
    semantic::{Edge, Line, MetroGraph, Section, Station},
    validate::{Check, validate_layout},
};

// ===================
// Strategies
// ===================

/// Shape of a generated pipeline: a chain of sections, each holding a run
/// of stations, with an optional fan-out from the last section into
/// several single-station sections on their own lines.
#[derive(Debug, Clone)]
struct Pipeline {
    sizes: Vec<usize>,
    lines: usize,
    branches: usize,
    max_columns: usize,
}

impl Pipeline {
    fn build(&self, prefix: &str) -> MetroGraph {
        let line_ids: Vec<Id> = (0..self.lines)
            .map(|l| Id::new(&format!("{prefix}_line{l}")))
            .collect();
        let mut graph = MetroGraph::new();
        for (idx, &id) in line_ids.iter().enumerate() {
            graph.add_line(Line::new(id, format!("Line {idx}"), Color::default()));
        }

        let mut previous: Option<Id> = None;
        for (s, &size) in self.sizes.iter().enumerate() {
            let sec = Id::new(&format!("{prefix}_s{s}"));
            graph.add_section(Section::new(sec, format!("Section {s}")));
            for n in 0..size {
                let station = Id::new(&format!("{prefix}_s{s}_{n}"));
                graph.add_station(Station::new(station, format!("step{n}")).with_section(sec));
                if let Some(prev) = previous {
                    graph.add_edge(Edge::new(prev, station, line_ids.clone()));
                }
                previous = Some(station);
            }
        }

        let Some(hub) = previous else {
            return graph;
        };
        for b in 0..self.branches {
            let sec = Id::new(&format!("{prefix}_b{b}"));
            let station = Id::new(&format!("{prefix}_b{b}_0"));
            let branch_line = Id::new(&format!("{prefix}_branch{b}"));
            graph.add_line(Line::new(branch_line, format!("Branch {b}"), Color::default()));
            graph.add_section(Section::new(sec, format!("Branch {b}")));
            graph.add_station(Station::new(station, "leaf").with_section(sec));
            graph.add_edge(Edge::new(hub, station, vec![branch_line]));
        }
        graph
    }

    fn config(&self) -> AppConfig {
        AppConfig::new(
            LayoutConfig::default(),
            RoutingConfig::default(),
            InferenceConfig::default().with_max_station_columns(self.max_columns),
        )
    }
}

fn pipeline_strategy() -> impl Strategy<Value = Pipeline> {
    (
        prop::collection::vec(1usize..4, 1..7),
        1usize..3,
        0usize..4,
        6usize..16,
    )
        .prop_map(|(sizes, lines, branches, max_columns)| Pipeline {
            sizes,
            lines,
            branches,
            max_columns,
        })
}

fn distance(a: Point, b: Point) -> f32 {
    a.sub_point(b).hypot()
}

fn lay_out(pipeline: &Pipeline, prefix: &str) -> Result<Layout, TestCaseError> {
    let graph = pipeline.build(prefix);
    LayoutBuilder::new(pipeline.config())
        .layout(&graph)
        .map_err(|err| TestCaseError::fail(format!("layout failed: {err}")))
}

// ===================
// Property Test Functions
// ===================

/// The layout passes every error check, and no two sections sit closer
/// than the spacing floor.
fn check_no_layout_violations(pipeline: Pipeline) -> Result<(), TestCaseError> {
    let layout = lay_out(&pipeline, "pp_struct")?;
    for violation in validate_layout(&layout) {
        prop_assert!(!violation.severity().is_error(), "{}", violation);
        prop_assert!(
            violation.check() != Check::MinimumSectionSpacing,
            "{}",
            violation
        );
    }
    Ok(())
}

/// Every route has at least two finite points and starts and ends at its
/// stations, up to the bundle offsets it applied.
fn check_routes_connect_their_stations(pipeline: Pipeline) -> Result<(), TestCaseError> {
    let layout = lay_out(&pipeline, "pp_route")?;
    let config = pipeline.config();
    let line_count = layout.graph().lines().count() as f32;

    for route in layout.routes() {
        let points = route.points();
        prop_assert!(points.len() >= 2);
        prop_assert!(points.iter().all(|p| p.is_finite()));

        let tolerance = if route.offsets_applied() {
            line_count * config.routing().offset_step() + 0.5
        } else {
            0.5
        };
        let source = layout.position(route.source());
        let target = layout.position(route.target());
        prop_assert!(source.is_some() && target.is_some());
        if let (Some(source), Some(target), Some(&first), Some(&last)) =
            (source, target, points.first(), points.last())
        {
            prop_assert!(
                distance(first, source) <= tolerance,
                "route {} -> {} starts at {:?}, station at {:?}",
                route.source(),
                route.target(),
                first,
                source
            );
            prop_assert!(
                distance(last, target) <= tolerance,
                "route {} -> {} ends at {:?}, station at {:?}",
                route.source(),
                route.target(),
                last,
                target
            );
        }
    }
    Ok(())
}

/// Every (edge, line) of the resolved graph gets a route, unless it was
/// merged into the route of the run feeding it.
fn check_every_line_is_routed(pipeline: Pipeline) -> Result<(), TestCaseError> {
    let layout = lay_out(&pipeline, "pp_lines")?;
    let graph = layout.graph();

    for edge in graph.edges() {
        for &line in edge.lines() {
            let routed = layout.routes().iter().any(|r| {
                r.line() == line && (r.source() == edge.source() || r.target() == edge.target())
            });
            prop_assert!(routed, "{} -> {} on {} has no route", edge.source(), edge.target(), line);
        }
    }
    Ok(())
}

/// Laying out the resolved graph gives the same coordinates.
fn check_resolved_layout_is_identical(pipeline: Pipeline) -> Result<(), TestCaseError> {
    let graph = pipeline.build("pp_idem");
    let builder = LayoutBuilder::new(pipeline.config());
    let direct = builder
        .layout(&graph)
        .map_err(|err| TestCaseError::fail(err.to_string()))?;
    let resolved = builder
        .resolve(&graph)
        .map_err(|err| TestCaseError::fail(err.to_string()))?;
    let again = builder
        .layout(&resolved)
        .map_err(|err| TestCaseError::fail(err.to_string()))?;

    prop_assert_eq!(direct.coordinates(), again.coordinates());
    Ok(())
}

/// Section numbers run 1..n in declaration order.
fn check_sections_are_numbered(pipeline: Pipeline) -> Result<(), TestCaseError> {
    let layout = lay_out(&pipeline, "pp_num")?;
    for (idx, frame) in layout.sections().enumerate() {
        prop_assert_eq!(frame.number(), idx + 1);
    }
    prop_assert_eq!(layout.sections().count(), layout.graph().section_count());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_no_layout_violations(pipeline in pipeline_strategy()) {
        check_no_layout_violations(pipeline)?;
    }

    #[test]
    fn test_routes_connect_their_stations(pipeline in pipeline_strategy()) {
        check_routes_connect_their_stations(pipeline)?;
    }

    #[test]
    fn test_every_line_is_routed(pipeline in pipeline_strategy()) {
        check_every_line_is_routed(pipeline)?;
    }

    #[test]
    fn test_resolved_layout_is_identical(pipeline in pipeline_strategy()) {
        check_resolved_layout_is_identical(pipeline)?;
    }

    #[test]
    fn test_sections_are_numbered(pipeline in pipeline_strategy()) {
        check_sections_are_numbered(pipeline)?;
    }
}
