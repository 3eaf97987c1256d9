//! Canvas geometry: points, sizes, axis-aligned boxes

use serde::{Deserialize, Serialize};

/// A point on the canvas, in pixels from the top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[inline]
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[inline]
    #[must_use]
    pub fn distance_sq(self, other: Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    #[inline]
    #[must_use]
    pub fn midpoint(self, other: Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    #[inline]
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    #[inline]
    #[must_use]
    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    #[inline]
    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Whether the two boxes share a region of positive area
    ///
    /// Boxes that only touch along an edge or at a corner do not overlap.
    #[inline]
    #[must_use]
    pub fn overlaps(&self, other: &Rect) -> bool {
        !(self.x >= other.x + other.width
            || self.x + self.width <= other.x
            || self.y >= other.y + other.height
            || self.y + self.height <= other.y)
    }

    /// Move the box so it lies fully inside `[0, width] × [0, height]`
    ///
    /// A box larger than the canvas is pinned to the top-left corner.
    #[inline]
    #[must_use]
    pub fn clamped_to(self, width: f64, height: f64) -> Rect {
        let max_x = (width - self.width).max(0.0);
        let max_y = (height - self.height).max(0.0);
        Rect {
            x: self.x.clamp(0.0, max_x),
            y: self.y.clamp(0.0, max_y),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn edge_adjacent_boxes_do_not_overlap() {
        let a = Rect::new(0.0, 0.0, 120.0, 120.0);
        let right = Rect::new(120.0, 0.0, 120.0, 120.0);
        let below = Rect::new(0.0, 120.0, 120.0, 120.0);
        let corner = Rect::new(120.0, 120.0, 120.0, 120.0);
        assert!(!a.overlaps(&right));
        assert!(!a.overlaps(&below));
        assert!(!a.overlaps(&corner));
    }

    #[test]
    fn one_pixel_overlap_counts() {
        let a = Rect::new(0.0, 0.0, 120.0, 120.0);
        let b = Rect::new(119.0, 119.0, 120.0, 120.0);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
    }

    #[test]
    fn separated_boxes_do_not_overlap() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(!a.overlaps(&Rect::new(50.0, 0.0, 10.0, 10.0)));
        assert!(!a.overlaps(&Rect::new(0.0, 50.0, 10.0, 10.0)));
    }

    #[test]
    fn clamp_keeps_box_inside() {
        let r = Rect::new(-40.0, 900.0, 120.0, 120.0).clamped_to(1024.0, 768.0);
        assert_eq!(r.origin(), Point::new(0.0, 648.0));

        let huge = Rect::new(10.0, 10.0, 500.0, 500.0).clamped_to(100.0, 100.0);
        assert_eq!(huge.origin(), Point::new(0.0, 0.0));
    }

    #[test]
    fn midpoint_and_center() {
        assert_eq!(Point::new(0.0, 0.0).midpoint(Point::new(10.0, 20.0)), Point::new(5.0, 10.0));
        assert_eq!(Rect::new(10.0, 10.0, 20.0, 40.0).center(), Point::new(20.0, 30.0));
    }

    fn rect(x: i32, y: i32, w: i32, h: i32) -> Rect {
        Rect::new(f64::from(x), f64::from(y), f64::from(w), f64::from(h))
    }

    proptest! {
        #[test]
        fn overlap_is_symmetric(
            x1 in -500i32..500, y1 in -500i32..500,
            x2 in -500i32..500, y2 in -500i32..500,
            w1 in 1i32..200, h1 in 1i32..200,
            w2 in 1i32..200, h2 in 1i32..200,
        ) {
            let a = rect(x1, y1, w1, h1);
            let b = rect(x2, y2, w2, h2);
            prop_assert_eq!(a.overlaps(&b), b.overlaps(&a));
        }

        #[test]
        fn overlap_matches_axis_projections(
            x1 in -500i32..500, y1 in -500i32..500,
            x2 in -500i32..500, y2 in -500i32..500,
            w in 1i32..200, h in 1i32..200,
        ) {
            let a = rect(x1, y1, w, h);
            let b = rect(x2, y2, w, h);
            let x_overlap = (x1 - x2).abs() < w;
            let y_overlap = (y1 - y2).abs() < h;
            prop_assert_eq!(a.overlaps(&b), x_overlap && y_overlap);
        }

        #[test]
        fn clamped_box_is_inside(
            x in -5000i32..5000, y in -5000i32..5000,
            cw in 200i32..2000, ch in 200i32..2000,
        ) {
            let r = rect(x, y, 120, 120).clamped_to(f64::from(cw), f64::from(ch));
            prop_assert!(r.x >= 0.0 && r.x + r.width <= f64::from(cw));
            prop_assert!(r.y >= 0.0 && r.y + r.height <= f64::from(ch));
        }
    }
}
