//! The obstacle world: rectangles plus a spatial grid index.
//!
//! Obstacles are axis-aligned rectangles rounded to millimetre precision.
//! The outer bounds of all obstacles are split into a fixed
//! `resolution × resolution` grid, each cell listing the obstacles that
//! overlap it. Any mutation marks the grid stale; it is rebuilt lazily by
//! the next query that needs it.

use mrm_common::{AngleInterval, Line, Point, Rect, COORDINATE_PRECISION};
use tracing::trace;

/// Default grid resolution (cells per axis).
pub const DEFAULT_GRID_RESOLUTION: usize = 10;

/// Obstacles merge when their union area exceeds the summed areas by no
/// more than this fraction of the smaller obstacle.
pub const MERGE_TOLERANCE: f64 = 0.01;

/// Offset (metres) of the diagonal probes used by corner detection.
pub const CORNER_PROBE_OFFSET: f64 = 0.01;

/// Obstacle set with a lazily rebuilt spatial index.
#[derive(Debug, Clone)]
pub struct ObstacleWorld {
    obstacles: Vec<Rect>,
    outer_bounds: Option<Rect>,
    resolution: usize,
    /// Obstacle indices per cell, row-major by `x * resolution + y`.
    cells: Vec<Vec<usize>>,
    organized: bool,
}

impl Default for ObstacleWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl ObstacleWorld {
    /// Empty world with the default grid resolution.
    pub fn new() -> Self {
        Self::with_resolution(DEFAULT_GRID_RESOLUTION)
    }

    /// Empty world with `resolution` grid cells per axis (at least one).
    pub fn with_resolution(resolution: usize) -> Self {
        ObstacleWorld {
            obstacles: Vec::new(),
            outer_bounds: None,
            resolution: resolution.max(1),
            cells: Vec::new(),
            organized: false,
        }
    }

    pub fn len(&self) -> usize {
        self.obstacles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.obstacles.is_empty()
    }

    pub fn obstacle(&self, index: usize) -> Option<Rect> {
        self.obstacles.get(index).copied()
    }

    pub fn obstacles(&self) -> &[Rect] {
        &self.obstacles
    }

    /// Bounding box of every obstacle, `None` when empty.
    pub fn outer_bounds(&self) -> Option<Rect> {
        self.outer_bounds
    }

    /// Whether the spatial index is current.
    pub fn is_organized(&self) -> bool {
        self.organized
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Insert an obstacle, rounded to millimetres. With `merge`, repeatedly
    /// fuse it with adjacent or overlapping obstacles.
    pub fn add_obstacle(&mut self, rect: Rect, merge: bool) {
        let rect = rect.rounded(COORDINATE_PRECISION);
        self.obstacles.push(rect);
        self.outer_bounds = Some(match self.outer_bounds {
            Some(bounds) => bounds.union(&rect),
            None => rect,
        });
        self.organized = false;

        if merge {
            let mut index = self.obstacles.len() - 1;
            while let Some(merged) = self.merge_once(index) {
                index = merged;
            }
        }
    }

    /// Try to merge the obstacle at `index` with one other obstacle.
    ///
    /// Returns the index of the merged obstacle, or `None` if no candidate
    /// qualified.
    fn merge_once(&mut self, index: usize) -> Option<usize> {
        let target = self.obstacles[index];
        let partner = self
            .obstacles
            .iter()
            .enumerate()
            .find(|(i, other)| *i != index && Self::can_merge(&target, other))
            .map(|(i, _)| i)?;

        let union = target.union(&self.obstacles[partner]);
        trace!("Merging obstacles {} and {} into {}", target, self.obstacles[partner], union);

        // Remove the higher index first so the lower one stays valid
        let (hi, lo) = if index > partner { (index, partner) } else { (partner, index) };
        self.obstacles.remove(hi);
        self.obstacles.remove(lo);
        self.obstacles.push(union);
        self.organized = false;
        Some(self.obstacles.len() - 1)
    }

    fn can_merge(a: &Rect, b: &Rect) -> bool {
        let tolerance = (a.area() * MERGE_TOLERANCE).min(b.area() * MERGE_TOLERANCE);
        a.union(b).area() - tolerance <= a.area() + b.area()
    }

    /// Remove the obstacle at `index`.
    pub fn remove_obstacle(&mut self, index: usize) -> Option<Rect> {
        if index >= self.obstacles.len() {
            return None;
        }
        let removed = self.obstacles.remove(index);
        self.recompute_bounds();
        Some(removed)
    }

    /// Remove every obstacle.
    pub fn remove_all(&mut self) {
        self.obstacles.clear();
        self.recompute_bounds();
    }

    fn recompute_bounds(&mut self) {
        self.outer_bounds = self
            .obstacles
            .iter()
            .copied()
            .reduce(|acc, r| acc.union(&r));
        self.organized = false;
    }

    // ========================================================================
    // Spatial index
    // ========================================================================

    /// Rebuild the grid if any mutation happened since the last rebuild.
    pub fn ensure_organized(&mut self) {
        if !self.organized {
            self.reorganize();
        }
    }

    fn reorganize(&mut self) {
        let n = self.resolution;
        self.cells = vec![Vec::new(); n * n];
        if let Some(bounds) = self.outer_bounds {
            let (bw, bh) = self.cell_size(&bounds);
            for x in 0..n {
                for y in 0..n {
                    let cell = Rect::new(
                        bounds.x + x as f64 * bw,
                        bounds.y + y as f64 * bh,
                        bw,
                        bh,
                    );
                    self.cells[x * n + y] = self
                        .obstacles
                        .iter()
                        .enumerate()
                        .filter(|(_, obstacle)| Self::overlaps_cell(obstacle, &cell))
                        .map(|(i, _)| i)
                        .collect();
                }
            }
        }
        self.organized = true;
        trace!("Reorganized {} obstacles into {}x{} grid", self.obstacles.len(), n, n);
    }

    /// Like [`Rect::intersects`], but degenerate cells or obstacles (a world
    /// collapsed onto a line) still match along the collapsed axis.
    fn overlaps_cell(obstacle: &Rect, cell: &Rect) -> bool {
        if !obstacle.is_empty() && !cell.is_empty() {
            return obstacle.intersects(cell);
        }
        obstacle.max_x() >= cell.x
            && obstacle.x <= cell.max_x()
            && obstacle.max_y() >= cell.y
            && obstacle.y <= cell.max_y()
    }

    fn cell_size(&self, bounds: &Rect) -> (f64, f64) {
        let n = self.resolution as f64;
        (bounds.width / n, bounds.height / n)
    }

    /// Cell coordinate of `p` along one axis (may lie outside the grid).
    fn cell_coord(value: f64, min: f64, size: f64) -> i64 {
        if size <= 0.0 {
            0
        } else {
            ((value - min) / size).floor() as i64
        }
    }

    fn cell_obstacles(&self, x: i64, y: i64) -> &[usize] {
        let n = self.resolution as i64;
        if x < 0 || y < 0 || x >= n || y >= n {
            return &[];
        }
        self.cells
            .get((x * n + y) as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Cells around `p`: its own, plus the lower neighbours when `p` lies
    /// exactly on a cell seam. With `clamp`, points outside the grid use
    /// the nearest border cell.
    fn cells_around(&self, p: &Point, clamp: bool) -> Vec<(i64, i64)> {
        let Some(bounds) = self.outer_bounds else {
            return Vec::new();
        };
        let (bw, bh) = self.cell_size(&bounds);
        let n = self.resolution as i64;
        let mut x = Self::cell_coord(p.x, bounds.x, bw);
        let mut y = Self::cell_coord(p.y, bounds.y, bh);
        if clamp {
            x = x.clamp(0, n - 1);
            y = y.clamp(0, n - 1);
        }

        let on_x_seam = bw > 0.0 && ((p.x - bounds.x) / bw).fract() == 0.0;
        let on_y_seam = bh > 0.0 && ((p.y - bounds.y) / bh).fract() == 0.0;

        let mut cells = vec![(x, y)];
        if on_x_seam {
            cells.push((x - 1, y));
        }
        if on_y_seam {
            cells.push((x, y - 1));
        }
        if on_x_seam && on_y_seam {
            cells.push((x - 1, y - 1));
        }
        cells
    }

    fn collect_unique(&self, cells: &[(i64, i64)]) -> Vec<usize> {
        let mut indices: Vec<usize> = Vec::new();
        for &(x, y) in cells {
            for &i in self.cell_obstacles(x, y) {
                if !indices.contains(&i) {
                    indices.push(i);
                }
            }
        }
        indices
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Obstacles in the grid cell of `p`, including the neighbouring cells
    /// when `p` lies exactly on a cell seam.
    pub fn obstacles_near(&mut self, p: &Point) -> Vec<Rect> {
        self.ensure_organized();
        let cells = self.cells_around(p, false);
        self.collect_unique(&cells)
            .into_iter()
            .map(|i| self.obstacles[i])
            .collect()
    }

    /// Obstacles that may lie within `interval` as seen from `center`.
    ///
    /// Cells are visited in rings of increasing Chebyshev distance from the
    /// cell holding `center`. A cell is accepted when it holds `center` or
    /// when either of its diagonals, seen from `center`, overlaps the
    /// interval. Results are ordered roughly by distance.
    pub fn obstacles_in_angle_interval(
        &mut self,
        center: &Point,
        interval: &AngleInterval,
    ) -> Vec<Rect> {
        self.ensure_organized();
        let Some(bounds) = self.outer_bounds else {
            return Vec::new();
        };
        if interval.is_empty() {
            return Vec::new();
        }

        let (bw, bh) = self.cell_size(&bounds);
        let n = self.resolution as i64;
        let cx = Self::cell_coord(center.x, bounds.x, bw);
        let cy = Self::cell_coord(center.y, bounds.y, bh);

        // Only rings that overlap the grid hold obstacles
        let min_ring = [cx - (n - 1), -cx, cy - (n - 1), -cy, 0]
            .into_iter()
            .max()
            .unwrap_or(0);
        let max_ring = [cx, n - 1 - cx, cy, n - 1 - cy]
            .into_iter()
            .map(i64::abs)
            .max()
            .unwrap_or(0);

        let mut found: Vec<usize> = Vec::new();
        for ring in min_ring..=max_ring {
            if found.len() == self.obstacles.len() {
                break;
            }
            for (x, y) in ring_cells(cx, cy, ring, n) {
                let cell = Rect::new(
                    bounds.x + x as f64 * bw,
                    bounds.y + y as f64 * bh,
                    bw,
                    bh,
                );
                if !cell.contains(center) && !Self::cell_in_interval(center, &cell, interval) {
                    continue;
                }
                for &i in self.cell_obstacles(x, y) {
                    if !found.contains(&i) {
                        found.push(i);
                    }
                }
            }
        }
        found.into_iter().map(|i| self.obstacles[i]).collect()
    }

    fn cell_in_interval(center: &Point, cell: &Rect, interval: &AngleInterval) -> bool {
        let diagonals = [
            Line::from_coords(cell.min_x(), cell.min_y(), cell.max_x(), cell.max_y()),
            Line::from_coords(cell.max_x(), cell.min_y(), cell.min_x(), cell.max_y()),
        ];
        diagonals.iter().any(|diagonal| {
            // A diagonal seen edge-on subtends an empty interval
            let seen = AngleInterval::of_segment(center, diagonal);
            seen.intersects(interval) || (seen.is_empty() && interval.contains_angle(seen.start()))
        })
    }

    /// Whether `p` sits at an obstacle corner.
    ///
    /// Four probes are placed diagonally around `p`; a corner has exactly
    /// one probe inside an obstacle. Only obstacles local to the grid cell
    /// of `p` are consulted.
    pub fn point_is_near_corner(&mut self, p: &Point) -> bool {
        self.ensure_organized();
        let cells = self.cells_around(p, true);
        let local = self.collect_unique(&cells);
        let d = CORNER_PROBE_OFFSET;
        let probes = [
            Point::new(p.x + d, p.y + d),
            Point::new(p.x + d, p.y - d),
            Point::new(p.x - d, p.y + d),
            Point::new(p.x - d, p.y - d),
        ];

        let mut inside = 0;
        for probe in &probes {
            if local.iter().any(|&i| self.obstacles[i].contains(probe)) {
                inside += 1;
                if inside > 1 {
                    return false;
                }
            }
        }
        inside == 1
    }
}

/// Cells of an `n × n` grid at exactly Chebyshev distance `ring` from `(cx, cy)`.
fn ring_cells(cx: i64, cy: i64, ring: i64, n: i64) -> Vec<(i64, i64)> {
    let in_grid = |v: i64| (0..n).contains(&v);
    if ring == 0 {
        return if in_grid(cx) && in_grid(cy) { vec![(cx, cy)] } else { Vec::new() };
    }
    let mut cells = Vec::new();
    let (x_lo, x_hi) = ((cx - ring).max(0), (cx + ring).min(n - 1));
    for y in [cy - ring, cy + ring] {
        if in_grid(y) {
            cells.extend((x_lo..=x_hi).map(|x| (x, y)));
        }
    }
    let (y_lo, y_hi) = ((cy - ring + 1).max(0), (cy + ring - 1).min(n - 1));
    for x in [cx - ring, cx + ring] {
        if in_grid(x) {
            cells.extend((y_lo..=y_hi).map(|y| (x, y)));
        }
    }
    cells
}
