//! Error types for metroline operations.
//!
//! This module provides the main error type [`MetroError`]. Topology errors are
//! reported before any coordinate is computed; cycle errors abort the layout of
//! the affected subgraph. Geometry invariant violations are not errors here,
//! they are reported by [`crate::validate`].

use thiserror::Error;

use metroline_core::{
    identifier::Id,
    semantic::{PortFlow, PortSide},
};

/// The main error type for metroline operations.
#[derive(Debug, Error)]
pub enum MetroError {
    #[error("edge `{from}` -> `{to}` uses undeclared line `{line}`")]
    UndeclaredLine { line: Id, from: Id, to: Id },

    #[error("edge `{from}` -> `{to}` references unknown station `{station}`")]
    UnknownStation { station: Id, from: Id, to: Id },

    #[error("`{station}` references unknown section `{section}`")]
    UnknownSection { section: Id, station: Id },

    #[error("section `{section}` declares {flow} side `{side}` for line `{line}` inconsistently")]
    ContradictoryPortSide {
        section: Id,
        line: Id,
        side: PortSide,
        flow: PortFlow,
    },

    #[error("edge `{from}` -> `{to}` carries no line")]
    EmptyEdge { from: Id, to: Id },

    #[error("cycle detected in {scope} at station `{station}`")]
    Cycle { scope: String, station: Id },

    #[error("Layout error: {0}")]
    Layout(String),
}

impl MetroError {
    /// Returns true for errors raised by reference and hint checks.
    pub fn is_topology_error(&self) -> bool {
        matches!(
            self,
            Self::UndeclaredLine { .. }
                | Self::UnknownStation { .. }
                | Self::UnknownSection { .. }
                | Self::ContradictoryPortSide { .. }
                | Self::EmptyEdge { .. }
        )
    }
}
