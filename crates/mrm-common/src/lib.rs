//! # mrm-common
//!
//! Geometry primitives and shared query types for the MRM ray tracer.
//!
//! This crate provides:
//! - Planar points, line segments and axis-aligned rectangles ([`Point`], [`Line`], [`Rect`])
//! - Angular ranges around a viewpoint ([`AngleInterval`])
//! - The transmission query input ([`TxPair`], [`Transmission`], [`Antenna`])
//! - Serde helpers for `-inf` dB values ([`db`])
//!
//! All coordinates are in metres. Angles are in radians, measured
//! counter-clockwise from the positive x axis.

pub mod angle;
pub mod db;
pub mod tx;

pub use angle::{intersect_set, normalize_angle, subtract_set, AngleInterval, ANGLE_EPSILON};
pub use tx::{Antenna, Transmission, TxPair};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Constants
// ============================================================================

/// Reconstructed ray path segments shorter than this (metres) are rejected.
pub const MIN_SEGMENT_LENGTH: f64 = 0.01;

/// Clipped or cropped segments shorter than this (metres) are treated as points.
pub const MIN_CLIP_LENGTH: f64 = 0.001;

/// Obstacle coordinates are rounded to this precision (metres) on insertion.
pub const COORDINATE_PRECISION: f64 = 0.001;

/// Speed of light in vacuum (m/s).
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised when parsing geometry from text.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    /// Wrong number of separated fields.
    #[error("Expected {expected} values separated by '{separator}' in '{input}', got {actual}")]
    FieldCount {
        /// The offending input.
        input: String,
        /// Separator that was used.
        separator: char,
        /// Number of fields expected.
        expected: usize,
        /// Number of fields found.
        actual: usize,
    },

    /// A field was not a finite number.
    #[error("Invalid number '{0}'")]
    InvalidNumber(String),

    /// Rectangles must not have negative extent.
    #[error("Rectangle has negative size {width} x {height}")]
    NegativeSize {
        /// Width that was given.
        width: f64,
        /// Height that was given.
        height: f64,
    },
}

fn parse_fields<const N: usize>(input: &str, separator: char) -> Result<[f64; N], GeometryError> {
    let fields: Vec<&str> = input.split(separator).map(str::trim).collect();
    if fields.len() != N {
        return Err(GeometryError::FieldCount {
            input: input.to_string(),
            separator,
            expected: N,
            actual: fields.len(),
        });
    }
    let mut out = [0.0; N];
    for (slot, field) in out.iter_mut().zip(fields) {
        *slot = field
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| GeometryError::InvalidNumber(field.to_string()))?;
    }
    Ok(out)
}

// ============================================================================
// Point
// ============================================================================

/// A point in the plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate in metres.
    pub x: f64,
    /// Y coordinate in metres.
    pub y: f64,
}

impl Point {
    /// Create a new point.
    pub const fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    /// Bearing from this point towards `other`, in `(-π, π]`.
    pub fn bearing_to(&self, other: &Point) -> f64 {
        (other.y - self.y).atan2(other.x - self.x)
    }

    /// Both coordinates are finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
    }
}

/// Parses `"x,y"`.
impl FromStr for Point {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let [x, y] = parse_fields::<2>(s, ',')?;
        Ok(Point::new(x, y))
    }
}

// ============================================================================
// Line
// ============================================================================

/// A line segment between two points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Line {
    /// First endpoint.
    pub p1: Point,
    /// Second endpoint.
    pub p2: Point,
}

/// Sign of the turn from segment `(a, b)` to point `p`, with collinear points
/// classified by whether they lie on the segment (0) or beyond it (±1).
fn relative_ccw(a: &Point, b: &Point, p: &Point) -> i32 {
    let (bx, by) = (b.x - a.x, b.y - a.y);
    let (mut px, mut py) = (p.x - a.x, p.y - a.y);
    let mut ccw = px * by - py * bx;
    if ccw == 0.0 {
        ccw = px * bx + py * by;
        if ccw > 0.0 {
            px -= bx;
            py -= by;
            ccw = px * bx + py * by;
            if ccw < 0.0 {
                ccw = 0.0;
            }
        }
    }
    if ccw < 0.0 {
        -1
    } else if ccw > 0.0 {
        1
    } else {
        0
    }
}

impl Line {
    /// Create a segment from two endpoints.
    pub const fn new(p1: Point, p2: Point) -> Self {
        Line { p1, p2 }
    }

    /// Create a segment from raw coordinates.
    pub const fn from_coords(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Line::new(Point::new(x1, y1), Point::new(x2, y2))
    }

    /// Segment starting at `origin` heading along `angle` for `length` metres.
    pub fn directed(origin: Point, angle: f64, length: f64) -> Self {
        Line::new(
            origin,
            Point::new(origin.x + length * angle.cos(), origin.y + length * angle.sin()),
        )
    }

    /// Segment length.
    pub fn length(&self) -> f64 {
        self.p1.distance(&self.p2)
    }

    /// Centre of the segment's bounding box.
    pub fn center(&self) -> Point {
        Point::new((self.p1.x + self.p2.x) / 2.0, (self.p1.y + self.p2.y) / 2.0)
    }

    /// Bounding box of the segment (may have zero width or height).
    pub fn bounds(&self) -> Rect {
        Rect::from_corners(self.p1, self.p2)
    }

    /// Whether the two segments touch or cross, endpoints included.
    pub fn intersects(&self, other: &Line) -> bool {
        relative_ccw(&self.p1, &self.p2, &other.p1) * relative_ccw(&self.p1, &self.p2, &other.p2) <= 0
            && relative_ccw(&other.p1, &other.p2, &self.p1)
                * relative_ccw(&other.p1, &other.p2, &self.p2)
                <= 0
    }

    /// Crossing point of this line's infinite extension with `other`,
    /// restricted to lie on the `other` segment.
    ///
    /// Returns `None` for parallel or degenerate lines.
    pub fn intersection(&self, other: &Line) -> Option<Point> {
        let (p, mu) = self.solve(other)?;
        if (0.0..=1.0).contains(&mu) {
            Some(p)
        } else {
            None
        }
    }

    /// Crossing point of the two lines, both extended infinitely.
    pub fn intersection_infinite(&self, other: &Line) -> Option<Point> {
        self.solve(other).map(|(p, _)| p)
    }

    fn solve(&self, other: &Line) -> Option<(Point, f64)> {
        let (dx1, dy1) = (self.p2.x - self.p1.x, self.p2.y - self.p1.y);
        let (dx2, dy2) = (other.p2.x - other.p1.x, other.p2.y - other.p1.y);
        let det = dx2 * dy1 - dy2 * dx1;
        let scale = dx1.hypot(dy1) * dx2.hypot(dy2);
        if scale == 0.0 || det.abs() <= f64::EPSILON * scale {
            return None;
        }
        let mu = ((self.p1.x - other.p1.x) * dy1 - (self.p1.y - other.p1.y) * dx1) / det;
        let p = Point::new(other.p1.x + mu * dx2, other.p1.y + mu * dy2);
        p.is_finite().then_some((p, mu))
    }

    /// Endpoint-wise comparison: the summed coordinate differences are below `tolerance`.
    pub fn approx_eq(&self, other: &Line, tolerance: f64) -> bool {
        (self.p1.x - other.p1.x).abs()
            + (self.p1.y - other.p1.y).abs()
            + (self.p2.x - other.p2.x).abs()
            + (self.p2.y - other.p2.y).abs()
            < tolerance
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.p1, self.p2)
    }
}

// ============================================================================
// Rect
// ============================================================================

/// Position of a point relative to a rectangle, one flag per side it lies beyond.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outcode {
    /// Point has `x < min_x`.
    pub left: bool,
    /// Point has `x > max_x`.
    pub right: bool,
    /// Point has `y < min_y`.
    pub below: bool,
    /// Point has `y > max_y`.
    pub above: bool,
}

impl Outcode {
    /// Point is inside or on the boundary.
    pub fn is_inside(&self) -> bool {
        !(self.left || self.right || self.below || self.above)
    }
}

/// An axis-aligned rectangle given by its minimum corner and size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Minimum x.
    pub x: f64,
    /// Minimum y.
    pub y: f64,
    /// Width (x extent).
    pub width: f64,
    /// Height (y extent).
    pub height: f64,
}

impl Rect {
    /// Create a rectangle from its minimum corner and size.
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Rect { x, y, width, height }
    }

    /// Smallest rectangle containing both points.
    pub fn from_corners(a: Point, b: Point) -> Self {
        let (min_x, max_x) = (a.x.min(b.x), a.x.max(b.x));
        let (min_y, max_y) = (a.y.min(b.y), a.y.max(b.y));
        Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    pub fn min_x(&self) -> f64 {
        self.x
    }

    pub fn min_y(&self) -> f64 {
        self.y
    }

    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// No interior.
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Half-open containment: the minimum edges are inside, the maximum edges are not.
    pub fn contains(&self, p: &Point) -> bool {
        p.x >= self.x && p.y >= self.y && p.x < self.max_x() && p.y < self.max_y()
    }

    /// Interiors overlap. Rectangles that merely touch do not intersect.
    pub fn intersects(&self, other: &Rect) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        other.max_x() > self.x
            && other.max_y() > self.y
            && other.x < self.max_x()
            && other.y < self.max_y()
    }

    /// Smallest rectangle containing both.
    pub fn union(&self, other: &Rect) -> Rect {
        let min_x = self.x.min(other.x);
        let min_y = self.y.min(other.y);
        let max_x = self.max_x().max(other.max_x());
        let max_y = self.max_y().max(other.max_y());
        Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    /// Grow to include `p`.
    pub fn add_point(&mut self, p: Point) {
        *self = self.union(&Rect::new(p.x, p.y, 0.0, 0.0));
    }

    /// Copy with every coordinate rounded to `precision`.
    pub fn rounded(&self, precision: f64) -> Rect {
        let scale = (1.0 / precision).round();
        let round = |v: f64| (v * scale).round() / scale;
        Rect::new(round(self.x), round(self.y), round(self.width), round(self.height))
    }

    /// Where `p` lies relative to this rectangle. A collapsed axis reports both sides.
    pub fn outcode(&self, p: &Point) -> Outcode {
        let mut code = Outcode::default();
        if self.width <= 0.0 {
            code.left = true;
            code.right = true;
        } else if p.x < self.x {
            code.left = true;
        } else if p.x > self.max_x() {
            code.right = true;
        }
        if self.height <= 0.0 {
            code.below = true;
            code.above = true;
        } else if p.y < self.y {
            code.below = true;
        } else if p.y > self.max_y() {
            code.above = true;
        }
        code
    }

    /// The four sides: bottom, top, left, right.
    pub fn sides(&self) -> [Line; 4] {
        [
            Line::from_coords(self.x, self.y, self.max_x(), self.y),
            Line::from_coords(self.x, self.max_y(), self.max_x(), self.max_y()),
            Line::from_coords(self.x, self.y, self.x, self.max_y()),
            Line::from_coords(self.max_x(), self.y, self.max_x(), self.max_y()),
        ]
    }

    /// Sides facing a viewpoint outside the rectangle (none when inside).
    pub fn facing_sides(&self, viewpoint: &Point) -> Vec<Line> {
        let code = self.outcode(viewpoint);
        let [bottom, top, left, right] = self.sides();
        let mut sides = Vec::with_capacity(2);
        if code.above {
            sides.push(top);
        }
        if code.below {
            sides.push(bottom);
        }
        if code.left {
            sides.push(left);
        }
        if code.right {
            sides.push(right);
        }
        sides
    }

    /// The part of `line` that passes through this rectangle.
    ///
    /// Returns `None` when the segment misses the rectangle, only grazes a
    /// corner, or the clipped part is shorter than [`MIN_CLIP_LENGTH`].
    pub fn clip(&self, line: &Line) -> Option<Line> {
        let p1_inside = self.contains(&line.p1);
        let p2_inside = self.contains(&line.p2);
        if p1_inside && p2_inside {
            return Some(*line);
        }

        let mut hits: Vec<Point> = Vec::with_capacity(4);
        for side in self.sides() {
            if !line.intersects(&side) {
                continue;
            }
            if let Some(p) = line.intersection(&side) {
                if !hits.iter().any(|h| h.distance(&p) < MIN_CLIP_LENGTH) {
                    hits.push(p);
                }
            }
        }

        if hits.len() == 1 {
            if p1_inside {
                hits.push(line.p1);
            } else if p2_inside {
                hits.push(line.p2);
            }
        }

        if hits.len() != 2 {
            return None;
        }
        let clipped = Line::new(hits[0], hits[1]);
        (clipped.length() >= MIN_CLIP_LENGTH).then_some(clipped)
    }

    /// Serialize as `minX;minY;width;height`.
    pub fn to_config_string(&self) -> String {
        format!("{};{};{};{}", self.x, self.y, self.width, self.height)
    }
}

/// Parses `minX;minY;width;height`.
impl FromStr for Rect {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let [x, y, width, height] = parse_fields::<4>(s, ';')?;
        if width < 0.0 || height < 0.0 {
            return Err(GeometryError::NegativeSize { width, height });
        }
        Ok(Rect::new(x, y, width, height))
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.3}, {:.3}] {:.3} x {:.3}",
            self.x, self.y, self.width, self.height
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
