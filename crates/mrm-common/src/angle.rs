//! Angular ranges around a viewpoint.
//!
//! An [`AngleInterval`] is the half-open range `[start, start + span)` on the
//! circle, with `start` normalized into `[0, 2π)` and `span` in `[0, 2π]`.
//! A span of `2π` is the full circle; a span below [`ANGLE_EPSILON`] is empty.
//!
//! Set operations on a union of intervals are provided by [`intersect_set`]
//! and [`subtract_set`].

use crate::{Line, Point};
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};
use std::fmt;

/// Angular tolerance (radians) for emptiness and containment tests.
pub const ANGLE_EPSILON: f64 = 1e-9;

/// Normalize an angle into `[0, 2π)`.
pub fn normalize_angle(angle: f64) -> f64 {
    let a = angle.rem_euclid(TAU);
    // rem_euclid rounds tiny negative inputs up to exactly 2π
    if a >= TAU {
        0.0
    } else {
        a
    }
}

/// A half-open angular range `[start, start + span)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleInterval {
    start: f64,
    span: f64,
}

impl AngleInterval {
    /// Interval sweeping counter-clockwise from `start_angle` to `end_angle`.
    ///
    /// An end at or beyond a full turn from the start yields the full circle.
    pub fn new(start_angle: f64, end_angle: f64) -> Self {
        let span = end_angle - start_angle;
        if span >= TAU - ANGLE_EPSILON {
            return Self::full();
        }
        Self::from_start_span(start_angle, normalize_angle(span))
    }

    /// Interval from a start angle and a span, span clamped to `[0, 2π]`.
    pub fn from_start_span(start: f64, span: f64) -> Self {
        AngleInterval {
            start: normalize_angle(start),
            span: span.clamp(0.0, TAU),
        }
    }

    /// The whole circle.
    pub fn full() -> Self {
        AngleInterval { start: 0.0, span: TAU }
    }

    /// Interval subtended by `segment` as seen from `viewpoint`.
    ///
    /// A segment not passing through the viewpoint always subtends less
    /// than a half turn, so the shorter arc between the endpoint bearings
    /// is taken.
    pub fn of_segment(viewpoint: &Point, segment: &Line) -> Self {
        let a1 = viewpoint.bearing_to(&segment.p1);
        let a2 = viewpoint.bearing_to(&segment.p2);
        let diff = normalize_angle(a2 - a1);
        if diff <= PI {
            Self::from_start_span(a1, diff)
        } else {
            Self::from_start_span(a2, TAU - diff)
        }
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    /// End angle, `start + span`. May exceed `2π`.
    pub fn end(&self) -> f64 {
        self.start + self.span
    }

    pub fn span(&self) -> f64 {
        self.span
    }

    pub fn is_empty(&self) -> bool {
        self.span < ANGLE_EPSILON
    }

    pub fn is_full(&self) -> bool {
        self.span >= TAU - ANGLE_EPSILON
    }

    /// Offset of `angle` from this interval's start, in `[0, 2π)`.
    fn offset_of(&self, angle: f64) -> f64 {
        let d = normalize_angle(angle - self.start);
        // Angles a hair before the start count as the start itself
        if TAU - d < ANGLE_EPSILON {
            0.0
        } else {
            d
        }
    }

    /// Whether `angle` lies in the interval.
    pub fn contains_angle(&self, angle: f64) -> bool {
        self.is_full() || (!self.is_empty() && self.offset_of(angle) < self.span)
    }

    /// Whether `other` lies entirely within this interval.
    pub fn contains(&self, other: &AngleInterval) -> bool {
        if other.is_empty() || self.is_full() {
            return true;
        }
        if other.is_full() || self.is_empty() {
            return false;
        }
        self.offset_of(other.start) + other.span <= self.span + ANGLE_EPSILON
    }

    /// Whether the intervals share a non-empty range.
    pub fn intersects(&self, other: &AngleInterval) -> bool {
        !self.intersect_all(other).is_empty()
    }

    /// Common part of the two intervals.
    ///
    /// Two arcs that each exceed a half turn can overlap in two disjoint
    /// pieces; the wider piece is returned then. Use [`Self::intersect_all`]
    /// to get both.
    pub fn intersect_with(&self, other: &AngleInterval) -> Option<AngleInterval> {
        self.intersect_all(other)
            .into_iter()
            .max_by(|a, b| a.span.total_cmp(&b.span))
    }

    /// Every non-empty piece common to both intervals (zero, one or two),
    /// ordered counter-clockwise from this interval's start.
    pub fn intersect_all(&self, other: &AngleInterval) -> Vec<AngleInterval> {
        if self.is_empty() || other.is_empty() {
            return Vec::new();
        }
        if self.is_full() {
            return vec![*other];
        }
        if other.is_full() {
            return vec![*self];
        }

        // Work in this interval's frame, where it occupies [0, span)
        let d = normalize_angle(other.start - self.start);
        let mut pieces = Vec::with_capacity(2);

        // `other` wrapped back by a full turn covers [d - 2π, d - 2π + other.span)
        let wrapped_hi = (d - TAU + other.span).min(self.span);
        if wrapped_hi >= ANGLE_EPSILON {
            pieces.push(Self::from_start_span(self.start, wrapped_hi));
        }

        if d < self.span {
            let hi = (d + other.span).min(self.span);
            if hi - d >= ANGLE_EPSILON {
                pieces.push(Self::from_start_span(self.start + d, hi - d));
            }
        }
        pieces
    }

    /// The rest of the circle.
    pub fn complement(&self) -> AngleInterval {
        if self.is_empty() {
            return Self::full();
        }
        Self::from_start_span(self.end(), TAU - self.span)
    }

    /// This interval with `other` removed: zero, one or two pieces.
    pub fn subtract(&self, other: &AngleInterval) -> Vec<AngleInterval> {
        if self.is_empty() {
            return Vec::new();
        }
        if other.is_empty() {
            return vec![*self];
        }
        if other.is_full() {
            return Vec::new();
        }
        self.intersect_all(&other.complement())
    }

    /// Same range within [`ANGLE_EPSILON`].
    pub fn approx_eq(&self, other: &AngleInterval) -> bool {
        if self.is_empty() || other.is_empty() {
            return self.is_empty() && other.is_empty();
        }
        if self.is_full() || other.is_full() {
            return self.is_full() && other.is_full();
        }
        let d = normalize_angle(other.start - self.start);
        d.min(TAU - d) < ANGLE_EPSILON && (self.span - other.span).abs() < ANGLE_EPSILON
    }
}

impl fmt::Display for AngleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.2}°, {:.2}°)",
            self.start.to_degrees(),
            self.end().to_degrees()
        )
    }
}

/// Intersect every interval of `set` with `with`, dropping empty results.
pub fn intersect_set(set: &[AngleInterval], with: &AngleInterval) -> Vec<AngleInterval> {
    set.iter().flat_map(|iv| iv.intersect_all(with)).collect()
}

/// Remove `minus` from every interval of `set`, dropping empty results.
pub fn subtract_set(set: &[AngleInterval], minus: &AngleInterval) -> Vec<AngleInterval> {
    set.iter().flat_map(|iv| iv.subtract(minus)).collect()
}
