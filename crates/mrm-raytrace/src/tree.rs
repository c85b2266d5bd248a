//! Bounded search tree of ray events.
//!
//! The tree is an arena: nodes live in one `Vec` in breadth-first order and
//! point to their parent by index. A tree is built per query and dropped
//! with it.

use crate::obstacles::ObstacleWorld;
use crate::visibility::{visible_sides, VisibilityCache};
use mrm_common::{Line, Point};
use mrm_model::parameters::{
    ChannelParameters, RT_MAX_DIFFRACTIONS, RT_MAX_RAYS, RT_MAX_REFLECTIONS, RT_MAX_REFRACTIONS,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// The event a ray path vertex represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RayKind {
    Origin,
    /// Passing through an obstacle side.
    Refraction,
    /// Bouncing off an obstacle side.
    Reflection,
    /// Bending around an obstacle corner.
    Diffraction,
    Destination,
}

impl fmt::Display for RayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RayKind::Origin => "Origin",
            RayKind::Refraction => "Refraction",
            RayKind::Reflection => "Reflection",
            RayKind::Diffraction => "Diffraction",
            RayKind::Destination => "Destination",
        };
        f.write_str(name)
    }
}

/// Remaining number of ray events below a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RayBudget {
    /// Events of any kind.
    pub rays: i32,
    pub refractions: i32,
    pub reflections: i32,
    pub diffractions: i32,
}

impl RayBudget {
    /// Budget from the `rt_max_*` parameters.
    pub fn from_parameters(params: &ChannelParameters) -> Self {
        RayBudget {
            rays: params.get(&RT_MAX_RAYS),
            refractions: params.get(&RT_MAX_REFRACTIONS),
            reflections: params.get(&RT_MAX_REFLECTIONS),
            diffractions: params.get(&RT_MAX_DIFFRACTIONS),
        }
    }

    fn after_refraction(&self) -> Self {
        RayBudget {
            rays: self.rays - 1,
            refractions: self.refractions - 1,
            ..*self
        }
    }

    fn after_reflection(&self) -> Self {
        RayBudget {
            rays: self.rays - 1,
            reflections: self.reflections - 1,
            ..*self
        }
    }

    fn after_diffraction(&self) -> Self {
        RayBudget {
            rays: self.rays - 1,
            diffractions: self.diffractions - 1,
            ..*self
        }
    }
}

/// One ray event in the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct RayNode {
    pub kind: RayKind,
    /// Where the ray emanates from: the real source for origin and
    /// refraction nodes, a mirrored pseudo-source for reflections, the
    /// corner for diffractions.
    pub source: Point,
    /// Side the ray passes through or bounces off. `None` for origin and
    /// diffraction nodes.
    pub line: Option<Line>,
    pub budget: RayBudget,
    /// Index of the parent node, `None` for the root.
    pub parent: Option<usize>,
}

/// Arena of ray events rooted at the origin.
#[derive(Debug, Clone)]
pub struct RayTree {
    nodes: Vec<RayNode>,
}

impl RayTree {
    /// Expand every node breadth-first until the budgets run out.
    pub fn build(
        world: &mut ObstacleWorld,
        cache: &mut VisibilityCache,
        origin: Point,
        budget: RayBudget,
    ) -> Self {
        let mut nodes = vec![RayNode {
            kind: RayKind::Origin,
            source: origin,
            line: None,
            budget,
            parent: None,
        }];

        let mut next = 0;
        while next < nodes.len() {
            let children = Self::expand(world, cache, &nodes[next], next);
            nodes.extend(children);
            next += 1;
        }

        debug!("Built ray tree from {} with {} nodes", origin, nodes.len());
        RayTree { nodes }
    }

    fn expand(
        world: &mut ObstacleWorld,
        cache: &mut VisibilityCache,
        node: &RayNode,
        index: usize,
    ) -> Vec<RayNode> {
        let budget = node.budget;
        if budget.rays <= 0 {
            return Vec::new();
        }

        let sides = visible_sides(world, cache, node.source, None, node.line);
        let mut children = Vec::new();

        if budget.refractions > 0 {
            children.extend(sides.iter().map(|side| RayNode {
                kind: RayKind::Refraction,
                source: node.source,
                line: Some(*side),
                budget: budget.after_refraction(),
                parent: Some(index),
            }));
        }

        if budget.reflections > 0 {
            children.extend(sides.iter().map(|side| RayNode {
                kind: RayKind::Reflection,
                source: mirror_across(node.source, side),
                line: Some(*side),
                budget: budget.after_reflection(),
                parent: Some(index),
            }));
        }

        if budget.diffractions > 0 {
            for side in &sides {
                for corner in [side.p1, side.p2] {
                    if world.point_is_near_corner(&corner) {
                        children.push(RayNode {
                            kind: RayKind::Diffraction,
                            source: corner,
                            line: None,
                            budget: budget.after_diffraction(),
                            parent: Some(index),
                        });
                    }
                }
            }
        }

        children
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in breadth-first order. The root is at index 0.
    pub fn nodes(&self) -> &[RayNode] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> Option<&RayNode> {
        self.nodes.get(index)
    }

    pub fn root(&self) -> &RayNode {
        &self.nodes[0]
    }

    /// Indices of the direct children of `index`.
    pub fn children(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(_, n)| n.parent == Some(index))
            .map(|(i, _)| i)
    }
}

/// Mirror `source` across the axis-aligned side's line.
///
/// Sides taller than wide mirror in x, all others in y.
pub fn mirror_across(source: Point, side: &Line) -> Point {
    let bounds = side.bounds();
    if bounds.height > bounds.width {
        Point::new(2.0 * side.p1.x - source.x, source.y)
    } else {
        Point::new(source.x, 2.0 * side.p1.y - source.y)
    }
}
