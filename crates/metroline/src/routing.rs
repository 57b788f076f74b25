//! Edge routing over a laid out graph.
//!
//! Each (edge, line) becomes a [`RoutedPath`]: an ordered list of waypoints
//! made of horizontal and vertical runs joined by short diagonals or rounded
//! corners. Parallel lines of one bundle are kept apart by per-line offsets
//! and nested corner radii.
//!
//! # Overview
//!
//! - [`offsets`] - Per-(station, line) slots within bundles.
//! - [`reversal`] - Sections whose bundle ordering is mirrored by a fold.
//! - [`bundle`] - Corridor grouping and the inter-column channel.
//! - [`corners`] - Concentric corner radii.
//! - [`dispatch`] - The ordered handler table and the handlers themselves.
//!
//! Runs crossing a fold get their own shapes: a drop from the bottom of a
//! top-to-bottom section keeps the section's x offsets down into the
//! reversed row below, and backward runs of a folded flat layout cross at
//! the fold edge.

pub mod bundle;
pub mod corners;
pub mod dispatch;
pub mod offsets;
pub mod reversal;

use log::info;

use metroline_core::{geometry::Point, identifier::Id, semantic::MetroGraph};

use crate::{config::RoutingConfig, error::MetroError, layout::LayoutContext};

pub use dispatch::RouteKind;
pub use offsets::{StationOffsets, compute_station_offsets};

pub(crate) const COORD_TOLERANCE: f32 = 1.0;
pub(crate) const COORD_TOLERANCE_FINE: f32 = 0.01;
/// Vertical distance beyond which a backward run counts as a row change.
pub(crate) const CROSS_ROW_THRESHOLD: f32 = 80.0;
pub(crate) const FOLD_MARGIN: f32 = 30.0;
pub(crate) const MIN_STRAIGHT_PORT: f32 = 5.0;
pub(crate) const MIN_STRAIGHT_EDGE: f32 = 10.0;

/// Waypoints of one line along one edge.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedPath {
    source: Id,
    target: Id,
    line: Id,
    points: Vec<Point>,
    inter_section: bool,
    curve_radii: Vec<f32>,
    offsets_applied: bool,
}

impl RoutedPath {
    pub fn new(source: Id, target: Id, line: Id, points: Vec<Point>) -> Self {
        Self {
            source,
            target,
            line,
            points,
            inter_section: false,
            curve_radii: Vec::new(),
            offsets_applied: false,
        }
    }

    pub fn with_inter_section(mut self, inter_section: bool) -> Self {
        self.inter_section = inter_section;
        self
    }

    pub fn with_curve_radii(mut self, curve_radii: Vec<f32>) -> Self {
        self.curve_radii = curve_radii;
        self
    }

    pub fn with_offsets_applied(mut self, offsets_applied: bool) -> Self {
        self.offsets_applied = offsets_applied;
        self
    }

    /// Station the route starts at. A route absorbing the run that feeds
    /// a perpendicular entry starts at that run's source.
    pub fn source(&self) -> Id {
        self.source
    }

    pub fn target(&self) -> Id {
        self.target
    }

    pub fn line(&self) -> Id {
        self.line
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Checks whether the route connects two sections.
    pub fn is_inter_section(&self) -> bool {
        self.inter_section
    }

    /// Radius of each rounded corner, in order. Empty when the renderer
    /// should use its default radius.
    pub fn curve_radii(&self) -> &[f32] {
        &self.curve_radii
    }

    /// Checks whether the per-line offsets are already part of the
    /// waypoints. When false the renderer applies them itself.
    pub fn offsets_applied(&self) -> bool {
        self.offsets_applied
    }
}

/// Routes every (edge, line) of a laid out graph.
///
/// `line_order` is the line priority used for bundle tie-breaks, and
/// `offsets` the result of [`compute_station_offsets`] for the same layout.
///
/// # Errors
///
/// Returns [`MetroError::Layout`] if an edge endpoint has no position.
pub fn route_edges(
    graph: &MetroGraph,
    ctx: &LayoutContext,
    config: &RoutingConfig,
    line_order: &[Id],
    offsets: &StationOffsets,
) -> Result<Vec<RoutedPath>, MetroError> {
    info!(edges = graph.edges().len(); "Routing edges");
    let router = dispatch::Router::new(graph, ctx, config, line_order, offsets)?;
    router.route_all()
}
