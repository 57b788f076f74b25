//! Coordinate assignment for resolved metro graphs.
//!
//! # Pipeline Position
//!
//! ```text
//! MetroGraph (raw)
//!     ↓ auto_layout::infer
//! Inference
//!     ↓ topology::resolve
//! MetroGraph (resolved)
//!     ↓ engine (this module)
//! LayoutContext
//!     ↓ routing
//! Layout
//! ```
//!
//! # Submodules
//!
//! - [`layers`] - Longest-path layering along the flow axis
//! - [`ordering`] - Track-per-line ordering across the flow axis
//! - [`placement`] - Section grid placement and port positioning
//! - [`auto_layout`] - Inference of missing grid cells, directions and port sides
//! - [`context`] - The coordinate table and per-section frames
//! - [`engine`] - The phase orchestrator

pub mod auto_layout;
pub mod context;
pub mod engine;
pub mod layers;
pub mod ordering;
pub mod placement;

pub use context::{LayoutContext, SectionLayout};
pub use engine::Engine;
