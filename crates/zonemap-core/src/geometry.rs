//! Planar geometry primitives on the canonical face grid.
//!
//! All template and adapted geometry lives in a fixed 0–100 × 0–100
//! coordinate space. Polygons are plain ordered vertex lists; area is
//! the shoelace formula and containment is horizontal ray casting.

use serde::{Deserialize, Serialize};

/// Side length of the canonical coordinate space.
pub const CANONICAL_EXTENT: f64 = 100.0;

/// Minimum vertex count for a polygon to be renderable/scorable.
/// Anything smaller is degenerate and must be skipped, never drawn.
pub const MIN_POLYGON_POINTS: usize = 3;

/// A 2D point. Serializes as `[x, y]` to match the persistence schemas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

impl From<Point> for (f64, f64) {
    fn from(p: Point) -> Self {
        (p.x, p.y)
    }
}

/// An ordered sequence of vertices describing a simple polygon.
///
/// Vertex order is preserved through every transform; no operation in
/// this crate reorders or deduplicates points. Simplicity (no
/// self-intersection) is the caller's responsibility and is not
/// validated here.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Polygon {
    pub points: Vec<Point>,
}

impl Polygon {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// A polygon with fewer than three vertices encloses nothing.
    pub fn is_degenerate(&self) -> bool {
        self.points.len() < MIN_POLYGON_POINTS
    }

    /// Unsigned area via the shoelace formula.
    ///
    /// Degenerate polygons have area 0; this is a value, not an error,
    /// so scoring code can emit a 0 score instead of aborting.
    pub fn area(&self) -> f64 {
        if self.is_degenerate() {
            return 0.0;
        }
        let mut acc = 0.0;
        let n = self.points.len();
        for i in 0..n {
            let p = self.points[i];
            let q = self.points[(i + 1) % n];
            acc += p.x * q.y - q.x * p.y;
        }
        acc.abs() / 2.0
    }

    /// Vertex centroid (arithmetic mean of the points).
    ///
    /// Returns `None` for an empty polygon.
    pub fn centroid(&self) -> Option<Point> {
        if self.points.is_empty() {
            return None;
        }
        let n = self.points.len() as f64;
        let sx: f64 = self.points.iter().map(|p| p.x).sum();
        let sy: f64 = self.points.iter().map(|p| p.y).sum();
        Some(Point::new(sx / n, sy / n))
    }

    /// Point-in-polygon via horizontal ray casting.
    ///
    /// Uses the half-open edge interval `(min(y1,y2), max(y1,y2)]` so a
    /// ray through a shared vertex counts exactly one crossing per edge
    /// pair. Degenerate polygons contain nothing.
    pub fn contains(&self, p: &Point) -> bool {
        if self.is_degenerate() {
            return false;
        }
        let n = self.points.len();
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let a = self.points[i];
            let b = self.points[j];
            if (a.y > p.y) != (b.y > p.y) {
                let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
                if p.x < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    /// Axis-aligned bounding box, or `None` for an empty polygon.
    pub fn bounding_box(&self) -> Option<Rect> {
        Rect::of_points(&self.points)
    }
}

/// Axis-aligned rectangle used for bounding boxes and reference frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Rect {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    /// Bounding box of a point slice, or `None` if it is empty.
    pub fn of_points(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let mut r = Rect::new(first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            r.min_x = r.min_x.min(p.x);
            r.min_y = r.min_y.min(p.y);
            r.max_x = r.max_x.max(p.x);
            r.max_y = r.max_y.max(p.y);
        }
        Some(r)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// True if either dimension has collapsed (or inverted) to zero.
    pub fn is_collapsed(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Grow the rectangle by per-edge margins. Negative margins shrink.
    pub fn expanded(&self, left: f64, right: f64, top: f64, bottom: f64) -> Rect {
        Rect::new(
            self.min_x - left,
            self.min_y - top,
            self.max_x + right,
            self.max_y + bottom,
        )
    }
}

/// Diagonal of the canonical space, the normalizer for centroid drift.
pub fn canonical_diagonal() -> f64 {
    (CANONICAL_EXTENT * CANONICAL_EXTENT * 2.0).sqrt()
}
