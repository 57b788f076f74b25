//! Geometric primitives for transit-map layout and positioning.
//!
//! This module provides the geometric types used throughout metroline for
//! station coordinates and section bounding boxes.
//!
//! # Overview
//!
//! - [`Point`] - A 2D coordinate in map space
//! - [`Size`] - Width and height dimensions
//! - [`Bounds`] - A rectangular bounding box defined by minimum and maximum coordinates
//!
//! # Coordinate System
//!
//! Metroline uses a coordinate system consistent with SVG:
//!
//! ```text
//!   (0,0) ────────► +X
//!     │
//!     │
//!     │
//!     ▼
//!    +Y
//! ```
//!
//! - **Origin**: Top-left corner at `(0, 0)`
//! - **X-axis**: Increases rightward (positive to the right)
//! - **Y-axis**: Increases downward (positive downward)

/// A 2D point representing a position in map coordinate space.
///
/// # Examples
///
/// ```
/// # use metroline_core::geometry::Point;
/// let p1 = Point::new(10.0, 20.0);
/// let p2 = Point::new(5.0, 5.0);
///
/// let sum = p1.add_point(p2);
/// assert_eq!(sum.x(), 15.0);
/// assert_eq!(sum.y(), 25.0);
///
/// let delta = p1.sub_point(p2);
/// assert_eq!(delta.x(), 5.0);
/// assert_eq!(delta.y(), 15.0);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point {
    x: f32,
    y: f32,
}

impl Point {
    /// Creates a new point with the specified coordinates
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Returns the x-coordinate of the point
    pub fn x(self) -> f32 {
        self.x
    }

    /// Returns the y-coordinate of the point
    pub fn y(self) -> f32 {
        self.y
    }

    /// Creates a new point with the specified x-coordinate
    pub fn with_x(mut self, x: f32) -> Self {
        self.x = x;
        self
    }

    /// Creates a new point with the specified y-coordinate
    pub fn with_y(mut self, y: f32) -> Self {
        self.y = y;
        self
    }

    /// Checks if both coordinates are finite (neither NaN nor infinite)
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Adds another point to this point, returning a new point.
    ///
    /// # Examples
    ///
    /// ```
    /// # use metroline_core::geometry::Point;
    /// let position = Point::new(100.0, 50.0);
    /// let offset = Point::new(10.0, -5.0);
    ///
    /// let moved = position.add_point(offset);
    /// assert_eq!(moved.x(), 110.0);
    /// assert_eq!(moved.y(), 45.0);
    /// ```
    pub fn add_point(self, other: Point) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }

    /// Subtracts another point from this point, returning a new point
    pub fn sub_point(self, other: Point) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }

    /// Euclidean distance from the origin.
    pub fn hypot(self) -> f32 {
        self.x.hypot(self.y)
    }
}

/// Width and height of a section box.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Size {
    width: f32,
    height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn width(self) -> f32 {
        self.width
    }

    pub fn height(self) -> f32 {
        self.height
    }
}

/// Represents a rectangular bounding box with minimum and maximum coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bounds {
    min_x: f32,
    min_y: f32,
    max_x: f32,
    max_y: f32,
}

impl Bounds {
    /// Creates a new bounds from a top-left point and a size
    pub fn new_from_top_left(top_left: Point, size: Size) -> Self {
        Self {
            min_x: top_left.x,
            min_y: top_left.y,
            max_x: top_left.x + size.width,
            max_y: top_left.y + size.height,
        }
    }

    /// Returns the minimum x-coordinate of the bounds
    pub fn min_x(self) -> f32 {
        self.min_x
    }

    /// Returns the minimum y-coordinate of the bounds
    pub fn min_y(self) -> f32 {
        self.min_y
    }

    /// Returns the maximum x-coordinate of the bounds
    pub fn max_x(self) -> f32 {
        self.max_x
    }

    /// Returns the maximum y-coordinate of the bounds
    pub fn max_y(self) -> f32 {
        self.max_y
    }

    /// Returns the center point of the bounds
    pub fn center(self) -> Point {
        Point::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    pub fn width(self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(self) -> f32 {
        self.max_y - self.min_y
    }

    /// Keeps the top-left corner and sets the width
    pub fn with_width(mut self, width: f32) -> Self {
        self.max_x = self.min_x + width;
        self
    }

    /// Keeps the top-left corner and sets the height
    pub fn with_height(mut self, height: f32) -> Self {
        self.max_y = self.min_y + height;
        self
    }

    /// Returns true if the bounds has a positive area
    pub fn has_area(self) -> bool {
        self.width() > 0.0 && self.height() > 0.0
    }

    /// Checks whether a point lies inside the bounds grown by `margin` on every side.
    pub fn contains_point(self, point: Point, margin: f32) -> bool {
        point.x >= self.min_x - margin
            && point.x <= self.max_x + margin
            && point.y >= self.min_y - margin
            && point.y <= self.max_y + margin
    }

    /// Checks whether two bounds overlap by more than `tolerance`.
    ///
    /// Touching bounds overlap by zero, so any non-negative tolerance treats them as separate.
    pub fn overlaps(self, other: &Self, tolerance: f32) -> bool {
        let overlap_x = self.max_x - tolerance > other.min_x && other.max_x - tolerance > self.min_x;
        let overlap_y = self.max_y - tolerance > other.min_y && other.max_y - tolerance > self.min_y;
        overlap_x && overlap_y
    }

    /// Moves the bounds by the specified offset.
    ///
    /// # Examples
    ///
    /// ```
    /// # use metroline_core::geometry::{Bounds, Point, Size};
    /// let bounds = Bounds::new_from_top_left(Point::new(10.0, 20.0), Size::new(50.0, 30.0));
    /// let moved = bounds.translate(Point::new(100.0, 50.0));
    /// assert_eq!(moved.min_x(), 110.0);
    /// assert_eq!(moved.min_y(), 70.0);
    /// assert_eq!(moved.width(), 50.0);
    /// ```
    pub fn translate(&self, offset: Point) -> Self {
        Self {
            min_x: self.min_x + offset.x,
            min_y: self.min_y + offset.y,
            max_x: self.max_x + offset.x,
            max_y: self.max_y + offset.y,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_new() {
        let point = Point::new(3.5, 4.2);
        assert_eq!(point.x(), 3.5);
        assert_eq!(point.y(), 4.2);
    }

    #[test]
    fn test_point_with_coordinates() {
        let point = Point::new(1.0, 2.0).with_x(5.0).with_y(-3.0);
        assert_eq!(point, Point::new(5.0, -3.0));
    }

    #[test]
    fn test_point_is_finite() {
        assert!(Point::new(1.0, -1.0).is_finite());
        assert!(!Point::new(f32::NAN, 0.0).is_finite());
        assert!(!Point::new(0.0, f32::INFINITY).is_finite());
    }

    #[test]
    fn test_point_distance() {
        let delta = Point::new(5.0, 8.0).sub_point(Point::new(2.0, 4.0));
        assert_eq!(delta, Point::new(3.0, 4.0));
        assert_eq!(delta.hypot(), 5.0);
    }

    #[test]
    fn test_bounds_new_from_top_left() {
        let bounds = Bounds::new_from_top_left(Point::new(10.0, 20.0), Size::new(30.0, 40.0));

        assert_eq!(bounds.min_x(), 10.0);
        assert_eq!(bounds.min_y(), 20.0);
        assert_eq!(bounds.max_x(), 40.0);
        assert_eq!(bounds.max_y(), 60.0);
        assert_eq!(bounds.center(), Point::new(25.0, 40.0));
    }

    #[test]
    fn test_bounds_with_size() {
        let bounds = Bounds::new_from_top_left(Point::new(2.0, 3.0), Size::new(4.0, 5.0))
            .with_width(10.0)
            .with_height(1.0);

        assert_eq!(bounds.min_x(), 2.0);
        assert_eq!(bounds.max_x(), 12.0);
        assert_eq!(bounds.min_y(), 3.0);
        assert_eq!(bounds.max_y(), 4.0);
        assert!(bounds.has_area());
        assert!(!bounds.with_height(0.0).has_area());
    }

    #[test]
    fn test_bounds_contains_point() {
        let bounds = Bounds::new_from_top_left(Point::new(0.0, 0.0), Size::new(100.0, 50.0));

        assert!(bounds.contains_point(Point::new(50.0, 25.0), 0.0));
        assert!(bounds.contains_point(Point::new(100.0, 50.0), 0.0));
        assert!(!bounds.contains_point(Point::new(104.0, 25.0), 0.0));
        assert!(bounds.contains_point(Point::new(104.0, 25.0), 5.0));
    }

    #[test]
    fn test_bounds_overlaps() {
        let a = Bounds::new_from_top_left(Point::new(0.0, 0.0), Size::new(100.0, 50.0));
        let touching = Bounds::new_from_top_left(Point::new(100.0, 0.0), Size::new(50.0, 50.0));
        let crossing = Bounds::new_from_top_left(Point::new(90.0, 10.0), Size::new(50.0, 50.0));
        let apart = Bounds::new_from_top_left(Point::new(0.0, 90.0), Size::new(50.0, 50.0));

        assert!(!a.overlaps(&touching, 0.0));
        assert!(a.overlaps(&touching, -1.0));
        assert!(a.overlaps(&crossing, -1.0));
        assert!(!a.overlaps(&apart, -1.0));
    }

    #[test]
    fn test_bounds_translate() {
        let bounds = Bounds::new_from_top_left(Point::new(1.0, 2.0), Size::new(4.0, 4.0));

        let translated = bounds.translate(Point::new(3.0, -1.0));
        assert_eq!(translated.min_x(), 4.0);
        assert_eq!(translated.min_y(), 1.0);
        assert_eq!(translated.max_x(), 8.0);
        assert_eq!(translated.max_y(), 5.0);
    }
}
