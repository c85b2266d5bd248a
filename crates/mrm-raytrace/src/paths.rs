//! Ray paths connecting a transmitter to a receiver.
//!
//! [`connecting_paths`] walks a [`RayTree`] breadth-first. A node whose ray
//! can reach the destination in a straight line is traced back up to the
//! root, rebuilding each vertex on the way.

use crate::obstacles::ObstacleWorld;
use crate::tree::{RayKind, RayNode, RayTree};
use crate::visibility::{is_direct_path, VisibilityCache};
use crate::METRIC_PATHS_FOUND;
use mrm_common::{Line, Point, MIN_SEGMENT_LENGTH};
use serde::Serialize;
use std::fmt;
use tracing::{debug, trace};

/// A polyline from the origin to the destination with the event at each vertex.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RayPath {
    points: Vec<Point>,
    kinds: Vec<RayKind>,
}

impl RayPath {
    /// Build a path, checking that it starts at an origin, ends at a
    /// destination and has neither in between.
    pub fn new(points: Vec<Point>, kinds: Vec<RayKind>) -> Option<Self> {
        if points.len() < 2 || points.len() != kinds.len() {
            return None;
        }
        let last = kinds.len() - 1;
        let well_formed = kinds.iter().enumerate().all(|(i, kind)| match kind {
            RayKind::Origin => i == 0,
            RayKind::Destination => i == last,
            _ => i != 0 && i != last,
        });
        well_formed.then_some(RayPath { points, kinds })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn kinds(&self) -> &[RayKind] {
        &self.kinds
    }

    /// Number of straight segments.
    pub fn subpath_count(&self) -> usize {
        self.points.len() - 1
    }

    /// Segment `index`, from vertex `index` to vertex `index + 1`.
    pub fn subpath(&self, index: usize) -> Option<Line> {
        Some(Line::new(*self.points.get(index)?, *self.points.get(index + 1)?))
    }

    /// Event at the start of segment `index`.
    pub fn start_kind(&self, index: usize) -> Option<RayKind> {
        (index < self.subpath_count()).then(|| self.kinds[index])
    }

    pub fn subpaths(&self) -> impl Iterator<Item = (Line, RayKind)> + '_ {
        self.points
            .windows(2)
            .zip(&self.kinds)
            .map(|(w, kind)| (Line::new(w[0], w[1]), *kind))
    }

    /// Total length in metres.
    pub fn length(&self) -> f64 {
        self.subpaths().map(|(line, _)| line.length()).sum()
    }
}

impl fmt::Display for RayPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (point, kind)) in self.points.iter().zip(&self.kinds).enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{} {}", kind, point)?;
        }
        Ok(())
    }
}

/// Switches from the `rt_*` parameters that shape path extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathOptions {
    /// Never accept the straight origin-to-destination path.
    pub disallow_direct: bool,
    /// Stop as soon as the straight path is found.
    pub ignore_non_direct: bool,
}

/// Every path in `tree` that reaches `dest`, in breadth-first order.
pub fn connecting_paths(
    tree: &RayTree,
    world: &mut ObstacleWorld,
    cache: &mut VisibilityCache,
    origin: Point,
    dest: Point,
    options: PathOptions,
) -> Vec<RayPath> {
    let mut paths = Vec::new();

    for (index, node) in tree.nodes().iter().enumerate() {
        let Some(last_hop) = last_hop(node, world, cache, dest, options) else {
            continue;
        };
        let Some(path) = trace_back(tree, index, last_hop, world, cache, origin, dest) else {
            trace!("Dropped broken path through {} node {}", node.kind, index);
            continue;
        };
        paths.push(path);

        if node.kind == RayKind::Origin && options.ignore_non_direct {
            break;
        }
    }

    debug!("Found {} paths from {} to {}", paths.len(), origin, dest);
    metrics::counter!(METRIC_PATHS_FOUND).increment(paths.len() as u64);
    paths
}

/// The vertex before `dest` if the node's ray reaches it directly.
fn last_hop(
    node: &RayNode,
    world: &mut ObstacleWorld,
    cache: &mut VisibilityCache,
    dest: Point,
    options: PathOptions,
) -> Option<Point> {
    match node.kind {
        RayKind::Origin => {
            let reachable = !options.disallow_direct && is_direct_path(world, cache, node.source, dest);
            reachable.then_some(node.source)
        }
        RayKind::Refraction | RayKind::Reflection => {
            let line = node.line?;
            let to_dest = Line::new(node.source, dest);
            if !to_dest.intersects(&line) {
                return None;
            }
            let crossing = to_dest.intersection(&line)?;
            is_direct_path(world, cache, crossing, dest).then_some(crossing)
        }
        RayKind::Diffraction => is_direct_path(world, cache, node.source, dest).then_some(node.source),
        RayKind::Destination => None,
    }
}

/// Rebuild the full path ending with `last_hop -> dest` by climbing to the root.
fn trace_back(
    tree: &RayTree,
    index: usize,
    last_hop: Point,
    world: &mut ObstacleWorld,
    cache: &mut VisibilityCache,
    origin: Point,
    dest: Point,
) -> Option<RayPath> {
    let mut node = tree.node(index)?;
    let mut points = vec![dest, last_hop];
    let mut kinds = vec![RayKind::Destination, node.kind];

    if node.kind != RayKind::Origin && last_hop.distance(&dest) < MIN_SEGMENT_LENGTH {
        return None;
    }
    if node.kind == RayKind::Diffraction && !is_direct_path(world, cache, dest, last_hop) {
        return None;
    }

    let mut newest = last_hop;
    while node.kind != RayKind::Origin {
        let parent = tree.node(node.parent?)?;
        let previous = newest;
        newest = match parent.kind {
            RayKind::Origin => origin,
            RayKind::Refraction | RayKind::Reflection => {
                Line::new(parent.source, previous).intersection_infinite(&parent.line?)?
            }
            RayKind::Diffraction => parent.source,
            RayKind::Destination => return None,
        };
        points.push(newest);
        kinds.push(parent.kind);

        if newest.distance(&previous) < MIN_SEGMENT_LENGTH {
            return None;
        }
        if parent.kind == RayKind::Diffraction && !is_direct_path(world, cache, previous, newest) {
            return None;
        }
        node = parent;
    }

    points.reverse();
    kinds.reverse();
    RayPath::new(points, kinds)
}
