//! Per-run layout state.
//!
//! [`LayoutContext`] owns everything the coordinate phases write: the
//! coordinate table (station id to position) and one [`SectionLayout`] frame
//! per section. Station descriptors in the [`MetroGraph`] are never mutated;
//! each phase reads the graph and writes here.
//!
//! [`MetroGraph`]: metroline_core::semantic::MetroGraph

use indexmap::IndexMap;

use metroline_core::{
    geometry::{Bounds, Point},
    identifier::Id,
    semantic::{Direction, GridCell},
};

use crate::error::MetroError;

/// Final placement of one section.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionLayout {
    id: Id,
    number: usize,
    direction: Direction,
    grid: GridCell,
    bounds: Bounds,
    offset: Point,
    fold: bool,
}

impl SectionLayout {
    /// Creates a frame with local bounds and no placement yet.
    pub fn new(id: Id, number: usize, direction: Direction, bounds: Bounds) -> Self {
        Self {
            id,
            number,
            direction,
            grid: GridCell::new(0, 0),
            bounds,
            offset: Point::default(),
            fold: false,
        }
    }

    pub fn with_fold(mut self, fold: bool) -> Self {
        self.fold = fold;
        self
    }

    pub fn id(&self) -> Id {
        self.id
    }

    /// 1-based declaration number.
    pub fn number(&self) -> usize {
        self.number
    }

    /// Effective flow direction, explicit or inferred.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Effective grid cell after placement.
    pub fn grid(&self) -> GridCell {
        self.grid
    }

    /// Bounding box. Local to the section until global mapping, global after.
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Placement offset of the section on the canvas.
    pub fn offset(&self) -> Point {
        self.offset
    }

    /// Checks whether this section is the turning point of a fold.
    pub fn is_fold(&self) -> bool {
        self.fold
    }

    pub(crate) fn set_grid(&mut self, grid: GridCell) -> &mut Self {
        self.grid = grid;
        self
    }

    pub(crate) fn set_bounds(&mut self, bounds: Bounds) -> &mut Self {
        self.bounds = bounds;
        self
    }

    pub(crate) fn set_offset(&mut self, offset: Point) -> &mut Self {
        self.offset = offset;
        self
    }
}

/// Mutable state shared by the coordinate phases of one run.
#[derive(Debug, Clone, Default)]
pub struct LayoutContext {
    coordinates: IndexMap<Id, Point>,
    sections: IndexMap<Id, SectionLayout>,
}

impl LayoutContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Position of a station, if assigned.
    pub fn position(&self, id: Id) -> Option<Point> {
        self.coordinates.get(&id).copied()
    }

    /// Position of a station that must have been assigned by an earlier phase.
    ///
    /// # Errors
    ///
    /// Returns [`MetroError::Layout`] if the station has no position.
    pub fn require(&self, id: Id) -> Result<Point, MetroError> {
        self.position(id)
            .ok_or_else(|| MetroError::Layout(format!("station `{id}` has no position")))
    }

    pub fn set_position(&mut self, id: Id, point: Point) {
        self.coordinates.insert(id, point);
    }

    /// Replaces the x coordinate of an already placed station.
    pub fn set_x(&mut self, id: Id, x: f32) {
        if let Some(point) = self.coordinates.get_mut(&id) {
            *point = point.with_x(x);
        }
    }

    /// Replaces the y coordinate of an already placed station.
    pub fn set_y(&mut self, id: Id, y: f32) {
        if let Some(point) = self.coordinates.get_mut(&id) {
            *point = point.with_y(y);
        }
    }

    pub fn coordinates(&self) -> &IndexMap<Id, Point> {
        &self.coordinates
    }

    pub fn insert_section(&mut self, frame: SectionLayout) {
        self.sections.insert(frame.id(), frame);
    }

    pub fn section(&self, id: Id) -> Option<&SectionLayout> {
        self.sections.get(&id)
    }

    pub fn section_mut(&mut self, id: Id) -> Option<&mut SectionLayout> {
        self.sections.get_mut(&id)
    }

    /// Frame of a section that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`MetroError::Layout`] if the section has no frame.
    pub fn require_section(&self, id: Id) -> Result<&SectionLayout, MetroError> {
        self.section(id)
            .ok_or_else(|| MetroError::Layout(format!("section `{id}` has no frame")))
    }

    /// Section frames in declaration order.
    pub fn sections(&self) -> impl Iterator<Item = &SectionLayout> {
        self.sections.values()
    }

    pub fn sections_mut(&mut self) -> impl Iterator<Item = &mut SectionLayout> {
        self.sections.values_mut()
    }

    /// Consumes the context, returning the coordinate table and section frames.
    pub fn into_parts(self) -> (IndexMap<Id, Point>, IndexMap<Id, SectionLayout>) {
        (self.coordinates, self.sections)
    }
}
