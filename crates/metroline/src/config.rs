//! Configuration types for metroline layout and routing.
//!
//! This module provides configuration structures that control spacing,
//! inference thresholds and routing geometry. All types implement
//! [`serde::Deserialize`] so callers can load them from external sources;
//! every field falls back to its documented default when absent.
//!
//! # Overview
//!
//! - [`AppConfig`] - Top-level configuration combining the three sections below.
//! - [`LayoutConfig`] - Spacing, section padding and gaps, port spreading, elbow tolerance.
//! - [`RoutingConfig`] - Diagonal run, corner radius and parallel line offset step.
//! - [`InferenceConfig`] - Fold threshold and fold exit side.
//!
//! # Example
//!
//! ```
//! # use metroline::config::AppConfig;
//! let config = AppConfig::default();
//! assert_eq!(config.layout().x_spacing(), 60.0);
//! assert_eq!(config.inference().max_station_columns(), 15);
//! ```

use serde::Deserialize;

use metroline_core::semantic::PortSide;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Layout configuration section.
    #[serde(default)]
    layout: LayoutConfig,

    /// Routing configuration section.
    #[serde(default)]
    routing: RoutingConfig,

    /// Inference configuration section.
    #[serde(default)]
    inference: InferenceConfig,
}

impl AppConfig {
    /// Creates a new [`AppConfig`] from its three sections.
    pub fn new(layout: LayoutConfig, routing: RoutingConfig, inference: InferenceConfig) -> Self {
        Self {
            layout,
            routing,
            inference,
        }
    }

    /// Returns the layout configuration.
    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    /// Returns the routing configuration.
    pub fn routing(&self) -> &RoutingConfig {
        &self.routing
    }

    /// Returns the inference configuration.
    pub fn inference(&self) -> &InferenceConfig {
        &self.inference
    }
}

/// How lines are prioritized when assigning tracks and offsets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineOrder {
    /// Declaration order.
    #[default]
    Definition,
    /// Lines touching more sections first, ties by declaration order.
    Span,
}

/// Spacing and placement configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    x_spacing: f32,
    y_spacing: f32,
    x_offset: f32,
    y_offset: f32,
    section_x_padding: f32,
    section_y_padding: f32,
    section_x_gap: f32,
    section_y_gap: f32,
    min_section_gap: f32,
    port_min_gap: f32,
    elbow_tolerance: f32,
    line_order: LineOrder,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            x_spacing: 60.0,
            y_spacing: 40.0,
            x_offset: 80.0,
            y_offset: 120.0,
            section_x_padding: 50.0,
            section_y_padding: 35.0,
            section_x_gap: 50.0,
            section_y_gap: 40.0,
            min_section_gap: 40.0,
            port_min_gap: 15.0,
            elbow_tolerance: 12.0,
            line_order: LineOrder::Definition,
        }
    }
}

impl LayoutConfig {
    /// Horizontal distance between layers.
    pub fn x_spacing(&self) -> f32 {
        self.x_spacing
    }

    /// Vertical distance between tracks.
    pub fn y_spacing(&self) -> f32 {
        self.y_spacing
    }

    /// Left margin of the canvas.
    pub fn x_offset(&self) -> f32 {
        self.x_offset
    }

    /// Top margin of the canvas.
    pub fn y_offset(&self) -> f32 {
        self.y_offset
    }

    pub fn section_x_padding(&self) -> f32 {
        self.section_x_padding
    }

    pub fn section_y_padding(&self) -> f32 {
        self.section_y_padding
    }

    /// Gap between grid columns.
    pub fn section_x_gap(&self) -> f32 {
        self.section_x_gap
    }

    /// Gap between grid rows.
    pub fn section_y_gap(&self) -> f32 {
        self.section_y_gap
    }

    /// Minimum physical gap between boxes of adjacent columns.
    pub fn min_section_gap(&self) -> f32 {
        self.min_section_gap
    }

    /// Minimum distance between adjacent ports on one side of a section.
    pub fn port_min_gap(&self) -> f32 {
        self.port_min_gap
    }

    /// Distance within which a perpendicular port counts as sitting on a station.
    pub fn elbow_tolerance(&self) -> f32 {
        self.elbow_tolerance
    }

    pub fn line_order(&self) -> LineOrder {
        self.line_order
    }

    pub fn with_x_spacing(mut self, x_spacing: f32) -> Self {
        self.x_spacing = x_spacing;
        self
    }

    pub fn with_y_spacing(mut self, y_spacing: f32) -> Self {
        self.y_spacing = y_spacing;
        self
    }

    pub fn with_min_section_gap(mut self, gap: f32) -> Self {
        self.min_section_gap = gap;
        self
    }

    pub fn with_line_order(mut self, line_order: LineOrder) -> Self {
        self.line_order = line_order;
        self
    }
}

/// Routing geometry configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    diagonal_run: f32,
    curve_radius: f32,
    offset_step: f32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            diagonal_run: 30.0,
            curve_radius: 10.0,
            offset_step: 3.0,
        }
    }
}

impl RoutingConfig {
    /// Horizontal length of a diagonal transition between tracks.
    pub fn diagonal_run(&self) -> f32 {
        self.diagonal_run
    }

    /// Base radius of rounded corners.
    pub fn curve_radius(&self) -> f32 {
        self.curve_radius
    }

    /// Distance between parallel lines of one bundle.
    pub fn offset_step(&self) -> f32 {
        self.offset_step
    }

    pub fn with_curve_radius(mut self, curve_radius: f32) -> Self {
        self.curve_radius = curve_radius;
        self
    }

    pub fn with_offset_step(mut self, offset_step: f32) -> Self {
        self.offset_step = offset_step;
        self
    }
}

/// Auto-layout inference configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    max_station_columns: usize,
    fold_exit_side: PortSide,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            max_station_columns: 15,
            fold_exit_side: PortSide::Bottom,
        }
    }
}

impl InferenceConfig {
    /// Station columns the main flow may accumulate before it folds.
    pub fn max_station_columns(&self) -> usize {
        self.max_station_columns
    }

    /// Exit side of a fold section whose successors cast no side vote.
    pub fn fold_exit_side(&self) -> PortSide {
        self.fold_exit_side
    }

    pub fn with_max_station_columns(mut self, columns: usize) -> Self {
        self.max_station_columns = columns;
        self
    }

    pub fn with_fold_exit_side(mut self, side: PortSide) -> Self {
        self.fold_exit_side = side;
        self
    }
}
