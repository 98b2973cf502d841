//! Octree over triangle centroids
//!
//! Cells split into eight cubes until they hold at most `leaf_capacity` centroids or sit
//! at `max_depth`. The only query is a ball search, used to gather near-field candidates.

use crate::core::types::Point;

/// Axis-aligned box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Lower corner
    pub min: Point,
    /// Upper corner
    pub max: Point,
}

impl Aabb {
    /// Box spanned by two corners
    pub fn new(min: Point, max: Point) -> Self {
        Self { min, max }
    }

    /// Smallest box holding every point, `None` for an empty slice
    pub fn around(points: &[Point]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut out = Self::new(*first, *first);
        for p in rest {
            for k in 0..3 {
                out.min[k] = out.min[k].min(p[k]);
                out.max[k] = out.max[k].max(p[k]);
            }
        }
        Some(out)
    }

    /// Cube with the same center whose half side covers the longest extent plus `pad`
    pub fn cubed(&self, pad: f64) -> Self {
        let mid = self.midpoint();
        let half = (0..3)
            .map(|k| 0.5 * (self.max[k] - self.min[k]))
            .fold(0.0, f64::max)
            + pad;
        Self::new(mid.map(|c| c - half), mid.map(|c| c + half))
    }

    /// Center of the box
    pub fn midpoint(&self) -> Point {
        std::array::from_fn(|k| 0.5 * (self.min[k] + self.max[k]))
    }

    /// Euclidean distance from `p` to the box, zero inside
    pub fn distance_to(&self, p: &Point) -> f64 {
        (0..3)
            .map(|k| (self.min[k] - p[k]).max(p[k] - self.max[k]).max(0.0))
            .map(|d| d * d)
            .sum::<f64>()
            .sqrt()
    }

    /// Octant of `p`: bit `k` is set when `p[k]` is in the upper half along axis `k`
    pub fn octant(&self, p: &Point) -> usize {
        let mid = self.midpoint();
        (0..3).filter(|&k| p[k] >= mid[k]).map(|k| 1 << k).sum()
    }

    /// Sub-box of octant `index`
    pub fn sub_box(&self, index: usize) -> Self {
        let mid = self.midpoint();
        let mut out = *self;
        for k in 0..3 {
            if index & (1 << k) == 0 {
                out.max[k] = mid[k];
            } else {
                out.min[k] = mid[k];
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
struct Cell {
    bounds: Aabb,
    depth: usize,
    /// First of eight consecutive children
    first_child: Option<usize>,
    members: Vec<usize>,
}

/// Octree of points, stored as a flat list of cells with the root at index 0
#[derive(Debug, Clone)]
pub struct Octree {
    cells: Vec<Cell>,
}

impl Octree {
    /// Build the tree over `centers`
    pub fn build(centers: &[Point], leaf_capacity: usize, max_depth: usize) -> Self {
        let Some(bounds) = Aabb::around(centers) else {
            return Self { cells: Vec::new() };
        };
        let extent = (0..3)
            .map(|k| bounds.max[k] - bounds.min[k])
            .fold(0.0, f64::max);
        // padding keeps points on the faces strictly inside
        let root = Cell {
            bounds: bounds.cubed((0.01 * extent).max(f64::MIN_POSITIVE)),
            depth: 0,
            first_child: None,
            members: (0..centers.len()).collect(),
        };

        let capacity = leaf_capacity.max(1);
        let mut cells = vec![root];
        let mut pending = vec![0usize];
        while let Some(at) = pending.pop() {
            let cell = &cells[at];
            if cell.depth >= max_depth || cell.members.len() <= capacity {
                continue;
            }
            let (bounds, depth) = (cell.bounds, cell.depth);
            let members = std::mem::take(&mut cells[at].members);

            let first = cells.len();
            cells.extend((0..8).map(|o| Cell {
                bounds: bounds.sub_box(o),
                depth: depth + 1,
                first_child: None,
                members: Vec::new(),
            }));
            for m in members {
                cells[first + bounds.octant(&centers[m])].members.push(m);
            }
            cells[at].first_child = Some(first);
            pending.extend((first..first + 8).filter(|&c| !cells[c].members.is_empty()));
        }
        Self { cells }
    }

    /// Number of cells, leaves and inner cells alike
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Deepest level reached
    pub fn depth(&self) -> usize {
        self.cells.iter().map(|c| c.depth).max().unwrap_or(0)
    }

    /// Indices stored in leaf cells within `radius` of `center`
    ///
    /// A superset of the points within `radius`; callers filter by exact distance.
    pub fn query_ball(&self, center: &Point, radius: f64) -> Vec<usize> {
        let mut found = Vec::new();
        let mut stack = if self.cells.is_empty() { vec![] } else { vec![0] };
        while let Some(at) = stack.pop() {
            let cell = &self.cells[at];
            if cell.bounds.distance_to(center) > radius {
                continue;
            }
            match cell.first_child {
                Some(first) => stack.extend(first..first + 8),
                None => found.extend_from_slice(&cell.members),
            }
        }
        found
    }
}
