//! Near-field pair search
//!
//! A pair of triangles needs accurate quadrature when it touches or when the centroid
//! distance is below `threshold` times the larger of the two triangle sizes. The size of
//! a triangle is its largest centroid-to-vertex distance.

use crate::core::error::Result;
use crate::core::parallel::parallel_map_indexed;
use crate::core::types::{Point, Triangle, norm, sub, triangle_points};

use super::octree::Octree;

const MAX_PER_LEAF: usize = 16;
const MAX_DEPTH: usize = 12;

/// Centroid and size of each triangle
pub fn centroids_and_sizes(points: &[Point], tris: &[Triangle]) -> Result<(Vec<Point>, Vec<f64>)> {
    let mut centroids = Vec::with_capacity(tris.len());
    let mut sizes = Vec::with_capacity(tris.len());
    for tri in tris {
        let v = triangle_points(points, tri)?;
        let c = [
            (v[0][0] + v[1][0] + v[2][0]) / 3.0,
            (v[0][1] + v[1][1] + v[2][1]) / 3.0,
            (v[0][2] + v[1][2] + v[2][2]) / 3.0,
        ];
        let size = v.iter().map(|p| norm(&sub(p, &c))).fold(0.0, f64::max);
        centroids.push(c);
        sizes.push(size);
    }
    Ok((centroids, sizes))
}

fn touches(a: &Triangle, b: &Triangle) -> bool {
    a.iter().any(|v| b.contains(v))
}

/// All ordered `(obs, src)` triangle pairs in the near field, sorted
pub fn find_nearfield_pairs(
    points: &[Point],
    tris: &[Triangle],
    threshold: f64,
) -> Result<Vec<(usize, usize)>> {
    let (centroids, sizes) = centroids_and_sizes(points, tris)?;
    let max_size = sizes.iter().copied().fold(0.0, f64::max);
    let octree = Octree::build(&centroids, MAX_PER_LEAF, MAX_DEPTH);
    // touching triangles are at most two sizes apart
    let reach = threshold.max(2.0);

    let per_obs: Vec<Vec<(usize, usize)>> = parallel_map_indexed(tris.len(), |i| {
        let radius = reach * max_size;
        let mut found: Vec<(usize, usize)> = octree
            .query_ball(&centroids[i], radius)
            .into_iter()
            .filter(|&j| {
                let dist = norm(&sub(&centroids[i], &centroids[j]));
                i == j || dist < threshold * sizes[i].max(sizes[j]) || touches(&tris[i], &tris[j])
            })
            .map(|j| (i, j))
            .collect();
        found.sort_unstable();
        found
    });

    Ok(per_obs.into_iter().flatten().collect())
}
