//! Visibility of obstacle sides from a viewpoint.
//!
//! [`visible_sides`] sweeps the unhandled part of an angular range, picks
//! obstacle sides facing the viewpoint, crops them to the range and keeps
//! those no other side shadows. Partially shadowed sides split the range
//! and the sweep restarts. Results are memoized in a small MRU
//! [`VisibilityCache`] that any world or parameter change must clear.

use crate::obstacles::ObstacleWorld;
use crate::{METRIC_VISIBILITY_CACHE_HIT, METRIC_VISIBILITY_CACHE_MISS};
use mrm_common::{
    intersect_set, subtract_set, AngleInterval, Line, Point, Rect, MIN_CLIP_LENGTH,
    MIN_SEGMENT_LENGTH,
};
use std::collections::VecDeque;
use tracing::{trace, warn};

/// Number of visibility results kept by [`VisibilityCache`].
pub const VISIBILITY_CACHE_CAPACITY: usize = 30;

/// Summed endpoint difference below which a side equals the look-through line.
pub const LOOK_THROUGH_TOLERANCE: f64 = 0.01;

/// Half width (radians) of the sector searched by [`is_direct_path`].
pub const DIRECT_PATH_HALF_WIDTH: f64 = 0.1;

/// A shadow's bounding box is grown by this fraction of its larger extent.
pub const SHADOW_MARGIN: f64 = 0.01;

/// Upper bound on sweep steps for one query.
const MAX_SWEEP_STEPS: usize = 10_000;

// ============================================================================
// Cache
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct CacheKey {
    source: Point,
    interval: Option<AngleInterval>,
    look_through: Option<Line>,
}

/// Most-recently-used memo of visibility results.
///
/// Keys match exactly, with `None` matching only `None`. Hits move to the
/// front; inserting into a full cache evicts the least recently used entry.
#[derive(Debug, Clone)]
pub struct VisibilityCache {
    entries: VecDeque<(CacheKey, Vec<Line>)>,
    capacity: usize,
}

impl Default for VisibilityCache {
    fn default() -> Self {
        Self::new()
    }
}

impl VisibilityCache {
    pub fn new() -> Self {
        Self::with_capacity(VISIBILITY_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        VisibilityCache {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn get(&mut self, key: &CacheKey) -> Option<Vec<Line>> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        let entry = self.entries.remove(index)?;
        let sides = entry.1.clone();
        self.entries.push_front(entry);
        Some(sides)
    }

    fn insert(&mut self, key: CacheKey, sides: Vec<Line>) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front((key, sides));
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Obstacle sides visible from `source`.
///
/// `interval` restricts the search to an angular range (the full circle
/// when `None`). With `look_through`, only sides beyond that line, seen
/// through it, are returned.
pub fn visible_sides(
    world: &mut ObstacleWorld,
    cache: &mut VisibilityCache,
    source: Point,
    interval: Option<AngleInterval>,
    look_through: Option<Line>,
) -> Vec<Line> {
    let key = CacheKey {
        source,
        interval,
        look_through,
    };
    if let Some(sides) = cache.get(&key) {
        metrics::counter!(METRIC_VISIBILITY_CACHE_HIT).increment(1);
        return sides;
    }
    metrics::counter!(METRIC_VISIBILITY_CACHE_MISS).increment(1);

    let sides = sweep(world, source, interval, look_through.as_ref());
    trace!("{} sides visible from {}", sides.len(), source);
    cache.insert(key, sides.clone());
    sides
}

/// Whether nothing blocks the straight segment from `source` to `dest`.
///
/// Only sides visible from `source` count, so an obstacle that contains
/// `source` does not block. A side crossed at `dest` itself does not block
/// either.
pub fn is_direct_path(
    world: &mut ObstacleWorld,
    cache: &mut VisibilityCache,
    source: Point,
    dest: Point,
) -> bool {
    let bearing = source.bearing_to(&dest);
    let sector = AngleInterval::new(bearing - DIRECT_PATH_HALF_WIDTH, bearing + DIRECT_PATH_HALF_WIDTH);
    let path = Line::new(source, dest);

    !visible_sides(world, cache, source, Some(sector), None)
        .iter()
        .any(|side| {
            side.intersects(&path)
                && side
                    .intersection_infinite(&path)
                    .is_some_and(|hit| hit.distance(&dest) > MIN_SEGMENT_LENGTH)
        })
}

// ============================================================================
// Sweep
// ============================================================================

/// Outcome of examining the candidates of one unhandled interval.
#[derive(Debug, Clone, PartialEq)]
enum Step {
    /// An unshadowed side and the part of the interval it occupies.
    Visible(Line, AngleInterval),
    /// A partial shadow: the replacement unhandled set.
    Split(Vec<AngleInterval>),
    /// Every candidate is shadowed by another.
    Stalled,
}

fn sweep(
    world: &mut ObstacleWorld,
    source: Point,
    interval: Option<AngleInterval>,
    look_through: Option<&Line>,
) -> Vec<Line> {
    let initial = match (look_through, interval) {
        (Some(line), Some(interval)) => AngleInterval::of_segment(&source, line).intersect_with(&interval),
        (Some(line), None) => Some(AngleInterval::of_segment(&source, line)),
        (None, Some(interval)) => Some(interval),
        (None, None) => Some(AngleInterval::full()),
    };

    let mut unhandled: Vec<AngleInterval> = initial.into_iter().collect();
    let mut visible = Vec::new();
    let mut steps = 0;

    while let Some(current) = unhandled.first().copied() {
        steps += 1;
        if steps > MAX_SWEEP_STEPS {
            warn!(
                "Visibility sweep from {} gave up with {} intervals unhandled",
                source,
                unhandled.len()
            );
            break;
        }
        if current.is_empty() {
            unhandled.remove(0);
            continue;
        }

        let candidates = candidate_sides(world, source, &current, look_through);
        if candidates.is_empty() {
            unhandled.remove(0);
            continue;
        }

        match resolve(source, &current, &candidates, &unhandled) {
            Step::Visible(side, occupied) => {
                unhandled = subtract_set(&unhandled, &occupied);
                visible.push(side);
            }
            Step::Split(next) => unhandled = next,
            Step::Stalled => {
                warn!("Visibility sweep from {} stalled on {}", source, current);
                unhandled.remove(0);
            }
        }
    }
    visible
}

/// Facing sides of the obstacles in `current`, cropped to it.
fn candidate_sides(
    world: &mut ObstacleWorld,
    source: Point,
    current: &AngleInterval,
    look_through: Option<&Line>,
) -> Vec<Line> {
    let mut candidates = Vec::new();
    for obstacle in world.obstacles_in_angle_interval(&source, current) {
        for side in obstacle.facing_sides(&source) {
            let side_interval = AngleInterval::of_segment(&source, &side);
            let cropped = if current.contains(&side_interval) {
                Some(side)
            } else {
                side_interval
                    .intersect_with(current)
                    .and_then(|part| crop(source, &side, &part))
            };
            let Some(cropped) = cropped else {
                continue;
            };
            if let Some(line) = look_through {
                if !is_beyond(source, &cropped, line) {
                    continue;
                }
            }
            candidates.push(cropped);
        }
    }
    candidates
}

/// The part of `side` seen from `source` within `part`.
fn crop(source: Point, side: &Line, part: &AngleInterval) -> Option<Line> {
    let start = Line::directed(source, part.start(), 1.0).intersection_infinite(side)?;
    let end = Line::directed(source, part.end(), 1.0).intersection_infinite(side)?;
    (start.distance(&end) > MIN_CLIP_LENGTH).then(|| Line::new(start, end))
}

/// `side` lies on the far side of `line` and is not `line` itself.
fn is_beyond(source: Point, side: &Line, line: &Line) -> bool {
    if side.approx_eq(line, LOOK_THROUGH_TOLERANCE) {
        return false;
    }
    Line::new(side.center(), source).intersects(line)
}

/// Find the first candidate no other candidate shadows.
///
/// Two sides covering the same interval at the same summed distance do
/// not shadow each other, so the earlier candidate wins.
fn resolve(
    source: Point,
    current: &AngleInterval,
    candidates: &[Line],
    unhandled: &[AngleInterval],
) -> Step {
    for (i, candidate) in candidates.iter().enumerate() {
        let Some(occupied) = AngleInterval::of_segment(&source, candidate).intersect_with(current) else {
            continue;
        };

        let mut shadowed = false;
        for (j, shadow) in candidates.iter().enumerate() {
            if i == j || !may_shadow(source, candidate, shadow) {
                continue;
            }
            let Some(shadow_interval) = AngleInterval::of_segment(&source, shadow).intersect_with(current) else {
                continue;
            };

            if shadow_interval.contains(&occupied) {
                let same_interval = occupied.contains(&shadow_interval);
                if !same_interval || distance_sum(source, candidate) > distance_sum(source, shadow) {
                    shadowed = true;
                    break;
                }
            } else if let Some(overlap) = occupied.intersect_with(&shadow_interval) {
                let mut added = intersect_set(unhandled, &overlap);
                for rest in occupied.subtract(&shadow_interval) {
                    added.extend(intersect_set(unhandled, &rest));
                }
                let mut next = subtract_set(unhandled, &occupied);
                next.extend(added.into_iter().filter(|iv| !iv.is_empty()));
                return Step::Split(next);
            }
        }

        if !shadowed {
            return Step::Visible(*candidate, occupied);
        }
    }
    Step::Stalled
}

/// Cheap pre-test: `shadow` is near the triangle spanned by `source` and
/// `candidate`, and not entirely behind it.
fn may_shadow(source: Point, candidate: &Line, shadow: &Line) -> bool {
    let mut area = shadow.bounds();
    let margin = SHADOW_MARGIN * area.width.max(area.height);
    let center = area.center();
    area.add_point(Point::new(center.x + margin, center.y + margin));

    let shadow_near = source.distance(&shadow.p1).min(source.distance(&shadow.p2));
    let candidate_far = source.distance(&candidate.p1).max(source.distance(&candidate.p2));

    shadow_near <= candidate_far
        && triangle_intersects_rect(&[source, candidate.p1, candidate.p2], &area)
}

fn distance_sum(source: Point, line: &Line) -> f64 {
    source.distance(&line.p1) + source.distance(&line.p2)
}

fn triangle_intersects_rect(triangle: &[Point; 3], rect: &Rect) -> bool {
    if rect.is_empty() {
        return false;
    }
    if triangle.iter().any(|p| rect.contains(p)) {
        return true;
    }
    let corners = [
        Point::new(rect.min_x(), rect.min_y()),
        Point::new(rect.max_x(), rect.min_y()),
        Point::new(rect.max_x(), rect.max_y()),
        Point::new(rect.min_x(), rect.max_y()),
    ];
    if corners.iter().any(|c| point_in_triangle(c, triangle)) {
        return true;
    }
    let edges = [
        Line::new(triangle[0], triangle[1]),
        Line::new(triangle[1], triangle[2]),
        Line::new(triangle[2], triangle[0]),
    ];
    let sides = rect.sides();
    edges
        .iter()
        .any(|edge| sides.iter().any(|side| edge.intersects(side)))
}

fn point_in_triangle(p: &Point, [a, b, c]: &[Point; 3]) -> bool {
    let cross = |o: &Point, u: &Point| (u.x - o.x) * (p.y - o.y) - (u.y - o.y) * (p.x - o.x);
    let d = [cross(a, b), cross(b, c), cross(c, a)];
    let has_neg = d.iter().any(|v| *v < 0.0);
    let has_pos = d.iter().any(|v| *v > 0.0);
    !(has_neg && has_pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::TAU;

    fn assert_line(actual: &Line, expected: &Line) {
        let forward = actual.approx_eq(expected, 1e-6);
        let reversed = actual.approx_eq(&Line::new(expected.p2, expected.p1), 1e-6);
        assert!(forward || reversed, "expected {}, got {}", expected, actual);
    }

    fn contains_line(lines: &[Line], expected: &Line) -> bool {
        lines.iter().any(|l| {
            l.approx_eq(expected, 1e-6) || l.approx_eq(&Line::new(expected.p2, expected.p1), 1e-6)
        })
    }

    /// A wall at x=10 in front of a wider wall at x=20, both seen from the origin.
    fn two_walls() -> ObstacleWorld {
        let mut world = ObstacleWorld::new();
        world.add_obstacle(Rect::new(10.0, -5.0, 2.0, 10.0), false);
        world.add_obstacle(Rect::new(20.0, -20.0, 2.0, 40.0), false);
        world
    }

    #[test]
    fn test_single_obstacle_shows_facing_side() {
        let mut world = ObstacleWorld::new();
        world.add_obstacle(Rect::new(0.0, 0.0, 50.0, 5.0), false);
        let mut cache = VisibilityCache::new();

        let sides = visible_sides(&mut world, &mut cache, Point::new(-10.0, 2.5), None, None);
        assert_eq!(sides.len(), 1);
        assert_line(&sides[0], &Line::from_coords(0.0, 0.0, 0.0, 5.0));
    }

    #[test]
    fn test_empty_world_has_no_visible_sides() {
        let mut world = ObstacleWorld::new();
        let mut cache = VisibilityCache::new();
        assert!(visible_sides(&mut world, &mut cache, Point::new(1.0, 1.0), None, None).is_empty());
        assert!(is_direct_path(&mut world, &mut cache, Point::new(0.0, 0.0), Point::new(5.0, 5.0)));
    }

    #[test]
    fn test_near_wall_shadows_middle_of_far_wall() {
        let mut world = two_walls();
        let mut cache = VisibilityCache::new();

        let sides = visible_sides(&mut world, &mut cache, Point::new(0.0, 0.0), None, None);
        assert_eq!(sides.len(), 3);
        assert!(contains_line(&sides, &Line::from_coords(10.0, -5.0, 10.0, 5.0)));
        assert!(contains_line(&sides, &Line::from_coords(20.0, 10.0, 20.0, 20.0)));
        assert!(contains_line(&sides, &Line::from_coords(20.0, -20.0, 20.0, -10.0)));
    }

    #[test]
    fn test_look_through_shows_only_what_is_behind() {
        let mut world = two_walls();
        let mut cache = VisibilityCache::new();
        let near_wall = Line::from_coords(10.0, -5.0, 10.0, 5.0);

        let sides = visible_sides(&mut world, &mut cache, Point::new(0.0, 0.0), None, Some(near_wall));
        assert_eq!(sides.len(), 1);
        assert_line(&sides[0], &Line::from_coords(20.0, -10.0, 20.0, 10.0));
    }

    #[test]
    fn test_angle_restriction_crops_sides() {
        let mut world = two_walls();
        let mut cache = VisibilityCache::new();
        // Only the upper uncovered part of the far wall
        let sector = AngleInterval::new(30f64.to_radians(), 40f64.to_radians());

        let sides = visible_sides(&mut world, &mut cache, Point::new(0.0, 0.0), Some(sector), None);
        assert_eq!(sides.len(), 1);
        let expected = Line::from_coords(
            20.0,
            20.0 * 30f64.to_radians().tan(),
            20.0,
            20.0 * 40f64.to_radians().tan(),
        );
        assert_line(&sides[0], &expected);
    }

    #[test]
    fn test_containing_shadow_hides_candidate() {
        let source = Point::new(0.0, 0.0);
        let far = Line::from_coords(20.0, -5.0, 20.0, 5.0);
        let near = Line::from_coords(10.0, -10.0, 10.0, 10.0);
        let full = AngleInterval::full();

        // The far side is examined first but the near one covers it
        let step = resolve(source, &full, &[far, near], &[full]);
        match step {
            Step::Visible(side, occupied) => {
                assert_eq!(side, near);
                assert!((occupied.span() - 90f64.to_radians()).abs() < 1e-9);
            }
            other => panic!("expected a visible side, got {:?}", other),
        }
    }

    #[test]
    fn test_partial_shadow_splits_unhandled_angles() {
        let source = Point::new(0.0, 0.0);
        let far = Line::from_coords(20.0, -10.0, 20.0, 30.0);
        let near = Line::from_coords(10.0, 0.0, 10.0, 10.0);
        let full = AngleInterval::full();

        let Step::Split(next) = resolve(source, &full, &[far, near], &[full]) else {
            panic!("expected a split");
        };
        // The circle outside the far side, then the shadowed and unshadowed pieces
        assert_eq!(next.len(), 4);
        let covered: f64 = next.iter().map(AngleInterval::span).sum();
        assert!((covered - TAU).abs() < 1e-9);
        assert!(next.iter().any(|iv| iv.approx_eq(&AngleInterval::new(0.0, 45f64.to_radians()))));
    }

    #[test]
    fn test_equal_distance_tie_keeps_first_candidate() {
        let source = Point::new(0.0, 0.0);
        let a = Line::from_coords(10.0, -5.0, 10.0, 5.0);
        let b = Line::from_coords(10.0, 5.0, 10.0, -5.0);
        let full = AngleInterval::full();

        match resolve(source, &full, &[a, b], &[full]) {
            Step::Visible(side, _) => assert_eq!(side, a),
            other => panic!("expected a visible side, got {:?}", other),
        }
        match resolve(source, &full, &[b, a], &[full]) {
            Step::Visible(side, _) => assert_eq!(side, b),
            other => panic!("expected a visible side, got {:?}", other),
        }
    }

    #[test]
    fn test_direct_path() {
        let mut world = two_walls();
        let mut cache = VisibilityCache::new();
        let origin = Point::new(0.0, 0.0);

        assert!(is_direct_path(&mut world, &mut cache, origin, Point::new(5.0, 0.0)));
        assert!(!is_direct_path(&mut world, &mut cache, origin, Point::new(30.0, 0.0)));
        // Ending exactly on the blocking side still counts as direct
        assert!(is_direct_path(&mut world, &mut cache, origin, Point::new(10.0, 0.0)));
        // Passing above the near wall, below the top of the far one
        assert!(is_direct_path(&mut world, &mut cache, origin, Point::new(15.0, 15.0)));
    }

    #[test]
    fn test_direct_path_from_inside_obstacle() {
        let mut world = ObstacleWorld::new();
        world.add_obstacle(Rect::new(0.0, 0.0, 50.0, 5.0), false);
        let mut cache = VisibilityCache::new();
        assert!(is_direct_path(&mut world, &mut cache, Point::new(0.0, 2.5), Point::new(60.0, 2.5)));
        assert!(!is_direct_path(&mut world, &mut cache, Point::new(-10.0, 2.5), Point::new(60.0, 2.5)));
    }

    #[test]
    fn test_cache_hit_returns_same_result() {
        let mut world = two_walls();
        let mut cache = VisibilityCache::new();
        let source = Point::new(0.0, 0.0);

        let first = visible_sides(&mut world, &mut cache, source, None, None);
        assert_eq!(cache.len(), 1);
        let second = visible_sides(&mut world, &mut cache, source, None, None);
        assert_eq!(cache.len(), 1);
        assert_eq!(first, second);

        visible_sides(&mut world, &mut cache, Point::new(1.0, 0.0), None, None);
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_evicts_least_recently_used() {
        let mut cache = VisibilityCache::with_capacity(2);
        let key = |x: f64| CacheKey {
            source: Point::new(x, 0.0),
            interval: None,
            look_through: None,
        };
        cache.insert(key(1.0), Vec::new());
        cache.insert(key(2.0), Vec::new());
        // Touch 1 so 2 becomes the oldest
        assert!(cache.get(&key(1.0)).is_some());
        cache.insert(key(3.0), Vec::new());

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key(2.0)).is_none());
        assert!(cache.get(&key(1.0)).is_some());
        assert!(cache.get(&key(3.0)).is_some());
    }

    #[test]
    fn test_cache_key_distinguishes_none() {
        let mut cache = VisibilityCache::new();
        let with_interval = CacheKey {
            source: Point::new(0.0, 0.0),
            interval: Some(AngleInterval::full()),
            look_through: None,
        };
        cache.insert(with_interval, vec![Line::from_coords(0.0, 0.0, 1.0, 1.0)]);
        let without = CacheKey {
            source: Point::new(0.0, 0.0),
            interval: None,
            look_through: None,
        };
        assert!(cache.get(&without).is_none());
    }

    #[test]
    fn test_triangle_rect_intersection() {
        let tri = [Point::new(0.0, 0.0), Point::new(10.0, -5.0), Point::new(10.0, 5.0)];
        assert!(triangle_intersects_rect(&tri, &Rect::new(5.0, -1.0, 1.0, 2.0)));
        assert!(triangle_intersects_rect(&tri, &Rect::new(-5.0, -20.0, 30.0, 40.0)));
        assert!(!triangle_intersects_rect(&tri, &Rect::new(20.0, -1.0, 1.0, 2.0)));
        assert!(!triangle_intersects_rect(&tri, &Rect::new(5.0, 0.0, 0.0, 2.0)));
    }
}
