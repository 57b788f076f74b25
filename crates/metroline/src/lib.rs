//! Metroline - layout and routing for transit-map style pipeline diagrams.
//!
//! A [`MetroGraph`](semantic::MetroGraph) groups stations into sections and
//! connects them with edges carrying one or more named lines. Metroline
//! resolves the section topology into explicit ports and junctions, places
//! every station and section on a canvas, and routes each line along each
//! edge. Rendering is left to the caller.
//!
//! # Pipeline
//!
//! ```text
//! check references -> infer grid/direction/ports -> resolve topology
//!     -> compute coordinates -> station offsets -> route edges
//! ```
//!
//! Every stage is deterministic: the same graph and configuration always
//! give the same [`Layout`].

pub mod config;
pub mod layout;
pub mod routing;
pub mod structure;
pub mod topology;
pub mod validate;

mod error;

pub use metroline_core::{color, geometry, identifier, semantic};

pub use error::MetroError;

use indexmap::IndexMap;
use log::{debug, info};

use metroline_core::{
    geometry::Point,
    identifier::Id,
    semantic::{Edge, MetroGraph},
};

use config::AppConfig;
use layout::{
    Engine, SectionLayout,
    auto_layout::{self, Inference},
    layers::check_acyclic,
    ordering::line_priority,
};
use routing::{RoutedPath, StationOffsets, compute_station_offsets, route_edges};
use structure::{FlowGraph, SectionDag};

/// Result of a full layout run.
#[derive(Debug, Clone)]
pub struct Layout {
    graph: MetroGraph,
    sections: IndexMap<Id, SectionLayout>,
    coordinates: IndexMap<Id, Point>,
    offsets: StationOffsets,
    routes: Vec<RoutedPath>,
}

impl Layout {
    /// The resolved graph, with ports and junctions.
    pub fn graph(&self) -> &MetroGraph {
        &self.graph
    }

    /// Section frames in declaration order.
    pub fn sections(&self) -> impl Iterator<Item = &SectionLayout> {
        self.sections.values()
    }

    pub fn section(&self, id: Id) -> Option<&SectionLayout> {
        self.sections.get(&id)
    }

    /// Station positions, keyed by station id.
    pub fn coordinates(&self) -> &IndexMap<Id, Point> {
        &self.coordinates
    }

    pub fn position(&self, station: Id) -> Option<Point> {
        self.coordinates.get(&station).copied()
    }

    /// Per-(station, line) offsets within bundles.
    pub fn offsets(&self) -> &StationOffsets {
        &self.offsets
    }

    /// One route per (edge, line), in edge order.
    pub fn routes(&self) -> &[RoutedPath] {
        &self.routes
    }
}

/// Builder for laying out metro graphs.
///
/// # Examples
///
/// ```
/// use metroline::{
///     LayoutBuilder,
///     color::Color,
///     config::AppConfig,
///     identifier::Id,
///     semantic::{Edge, Line, MetroGraph, Section, Station},
/// };
///
/// let (qc, red) = (Id::new("qc"), Id::new("red"));
/// let graph = MetroGraph::new()
///     .with_line(Line::new(red, "Main", Color::default()))
///     .with_section(Section::new(qc, "Quality control"))
///     .with_station(Station::new(Id::new("fastqc"), "FastQC").with_section(qc))
///     .with_station(Station::new(Id::new("multiqc"), "MultiQC").with_section(qc))
///     .with_edge(Edge::new(Id::new("fastqc"), Id::new("multiqc"), vec![red]));
///
/// let builder = LayoutBuilder::new(AppConfig::default());
/// let layout = builder.layout(&graph).expect("Failed to lay out");
///
/// assert_eq!(layout.routes().len(), 1);
/// assert_eq!(layout.sections().count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct LayoutBuilder {
    config: AppConfig,
}

impl LayoutBuilder {
    /// Create a new layout builder with the given configuration.
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Resolve the section topology of a graph.
    ///
    /// Every edge between stations of two sections becomes a chain through
    /// an exit port, an optional junction and an entry port. Resolving an
    /// already resolved graph returns it unchanged.
    ///
    /// # Errors
    ///
    /// Returns a topology error for a dangling reference or inconsistent
    /// port declaration, and [`MetroError::Cycle`] if the sections depend on
    /// each other cyclically.
    pub fn resolve(&self, graph: &MetroGraph) -> Result<MetroGraph, MetroError> {
        let (resolved, _) = self.prepare(graph)?;
        Ok(resolved)
    }

    /// Lay out and route a graph.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`LayoutBuilder::resolve`], and
    /// [`MetroError::Cycle`] for a cycle inside a section.
    pub fn layout(&self, graph: &MetroGraph) -> Result<Layout, MetroError> {
        let (resolved, inference) = self.prepare(graph)?;

        info!(
            stations = resolved.stations().count(),
            sections = resolved.section_count();
            "Computing coordinates"
        );
        let ctx = Engine::new(&resolved, &inference, self.config.layout()).compute()?;

        let line_order = line_priority(&resolved, self.config.layout().line_order());
        let offsets = compute_station_offsets(
            &resolved,
            &ctx,
            &line_order,
            self.config.routing().offset_step(),
        );
        let routes = route_edges(&resolved, &ctx, self.config.routing(), &line_order, &offsets)?;
        info!(routes = routes.len(); "Layout complete");

        let (coordinates, sections) = ctx.into_parts();
        Ok(Layout {
            graph: resolved,
            sections,
            coordinates,
            offsets,
            routes,
        })
    }

    fn prepare(&self, graph: &MetroGraph) -> Result<(MetroGraph, Inference), MetroError> {
        topology::check_references(graph)?;

        let dag = SectionDag::from_graph(graph);
        check_section_cycles(&dag)?;

        let inference = auto_layout::infer(graph, &dag, self.config.inference());
        let resolved = topology::resolve(graph, &inference)?;
        debug!(
            stations = resolved.stations().count(),
            edges = resolved.edges().len();
            "Topology resolved"
        );
        Ok((resolved, inference))
    }
}

/// Rejects a cyclic section meta-graph.
fn check_section_cycles(dag: &SectionDag) -> Result<(), MetroError> {
    let mut flow = FlowGraph::default();
    for (src, tgt) in dag.dependencies() {
        flow.add_edge(Edge::new(src, tgt, dag.lines_between(src, tgt).collect()));
    }
    check_acyclic(&flow, "section graph")
}
