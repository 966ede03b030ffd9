//! Integer pixel geometry.

use crate::util::FpMorphError;
use std::ops::{Add, Sub};

/// Integer pixel position; `x` is the column, `y` the row.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    /// Creates a point.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(self, other: Point) -> f32 {
        let dx = (self.x - other.x) as f32;
        let dy = (self.y - other.y) as f32;
        (dx * dx + dy * dy).sqrt()
    }

    /// Direction from `self` toward `other` in radians, y pointing down.
    pub fn direction_to(self, other: Point) -> f32 {
        ((other.y - self.y) as f32).atan2((other.x - self.x) as f32)
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Axis-aligned rectangle with an inclusive origin and exclusive far edge.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Rect {
    /// Creates a rectangle.
    pub const fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Creates a rectangle spanning `[x0, x1) x [y0, y1)`; inverted spans collapse to empty.
    pub fn from_corners(x0: usize, y0: usize, x1: usize, y1: usize) -> Self {
        Self::new(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
    }

    /// Exclusive right edge.
    pub fn right(&self) -> usize {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> usize {
        self.y + self.height
    }

    /// Returns true when the rectangle covers no pixel.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Top-left corner.
    pub fn origin(&self) -> Point {
        Point::new(self.x as i32, self.y as i32)
    }

    /// Center pixel, rounded down.
    pub fn center(&self) -> Point {
        Point::new(
            (self.x + self.width / 2) as i32,
            (self.y + self.height / 2) as i32,
        )
    }

    /// Returns true when `p` lies strictly inside the rectangle border.
    pub fn contains_strictly(&self, p: Point) -> bool {
        let (x, y) = (p.x as i64, p.y as i64);
        x > self.x as i64
            && y > self.y as i64
            && x < self.right() as i64
            && y < self.bottom() as i64
    }

    pub(crate) fn out_of_bounds(&self, img_width: usize, img_height: usize) -> FpMorphError {
        FpMorphError::RoiOutOfBounds {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            img_width,
            img_height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverted_corners_give_empty_rect() {
        let rect = Rect::from_corners(10, 4, 6, 8);
        assert!(rect.is_empty());
        assert_eq!(rect.height, 4);
    }

    #[test]
    fn strict_containment_excludes_border() {
        let rect = Rect::new(2, 2, 4, 4);
        assert!(rect.contains_strictly(Point::new(3, 3)));
        assert!(!rect.contains_strictly(Point::new(2, 3)));
        assert!(!rect.contains_strictly(Point::new(6, 3)));
    }

    #[test]
    fn direction_points_down_for_positive_y() {
        let d = Point::new(0, 0).direction_to(Point::new(0, 5));
        assert!((d - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
    }
}
