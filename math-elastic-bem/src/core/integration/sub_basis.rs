//! Sub-triangle splitting and basis recombination
//!
//! An integral over a sub-triangle pair is expressed in the linear bases of the
//! sub-triangles. Each parent basis function restricted to a sub-triangle is a combination
//! of the sub-triangle bases, with coefficients equal to its values at the sub-vertices:
//!
//! ```text
//! I_parent[a,i,b,j] += Σ_kl B_o[a,k] B_s[b,l] I_sub[k,i,l,j]
//! ```
//!
//! An edge-adjacent pair is split at one interior point per triangle so that the piece
//! touching the shared edge always has the same shape (an isosceles triangle with base
//! angles equal to the split angle). Only the fold angle and ν then parametrize its
//! singular integral.

use crate::core::error::Result;
use crate::core::mesh::classify::{AdjacencyKind, classify};
use crate::core::types::{
    Point, Tensor81, Triangle, TriangleGeometry, add, cross, linear_basis, norm, normalize,
    scale, sub, tensor_index,
};

/// `B[a][k]`: parent basis `a` at sub-vertex `k`
pub type SubBasis = [[f64; 3]; 3];

/// Accumulate a sub-pair tensor into a parent tensor
pub fn add_sub_basis(parent: &mut Tensor81, sub_values: &Tensor81, obs: &SubBasis, src: &SubBasis) {
    for a in 0..3 {
        for b in 0..3 {
            for k in 0..3 {
                let bo = obs[a][k];
                if bo == 0.0 {
                    continue;
                }
                for l in 0..3 {
                    let f = bo * src[b][l];
                    if f == 0.0 {
                        continue;
                    }
                    for i in 0..3 {
                        for j in 0..3 {
                            parent[tensor_index(a, i, b, j)] +=
                                f * sub_values[tensor_index(k, i, l, j)];
                        }
                    }
                }
            }
        }
    }
}

/// Map a sub-pair tensor to the parent bases
pub fn sub_basis(sub_values: &Tensor81, obs: &SubBasis, src: &SubBasis) -> Tensor81 {
    let mut out = [0.0; 81];
    add_sub_basis(&mut out, sub_values, obs, src);
    out
}

/// Parent basis values at the vertices of a sub-triangle lying in the parent's plane
pub fn basis_at_vertices(parent: &[Point; 3], sub_tri: &[Point; 3]) -> SubBasis {
    let g = TriangleGeometry::new(parent);
    let mut out = [[0.0; 3]; 3];
    for (k, v) in sub_tri.iter().enumerate() {
        let [xi, eta] = g.reference_coords(v);
        let phi = linear_basis(xi, eta);
        for a in 0..3 {
            out[a][k] = snap(phi[a]);
        }
    }
    out
}

/// Basis matrix of a relabelling: sub-vertex `k` is parent vertex `perm[k]`
pub fn permutation_basis(perm: [usize; 3]) -> SubBasis {
    let mut out = [[0.0; 3]; 3];
    for (k, &p) in perm.iter().enumerate() {
        out[p][k] = 1.0;
    }
    out
}

fn snap(v: f64) -> f64 {
    if v.abs() < 1e-14 {
        0.0
    } else if (v - 1.0).abs() < 1e-14 {
        1.0
    } else {
        v
    }
}

/// One of the nine sub-pairs of a split edge-adjacent pair, in canonical local order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubPair {
    /// Observation sub-triangle (local point ids of the split)
    pub obs: Triangle,
    /// Source sub-triangle (local point ids of the split)
    pub src: Triangle,
    /// Adjacency of the two sub-triangles
    pub kind: AdjacencyKind,
}

/// Split of a canonical edge-adjacent pair
///
/// Local point ids: `0, 1, 2` are the observation vertices, `3` the source apex, `4` and
/// `5` the split points of the observation and source triangles. The canonical source is
/// `(1, 0, 3)`.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeSplit {
    /// Points of the split
    pub points: [Point; 6],
    /// Observation sub-triangles
    pub obs_subs: [Triangle; 3],
    /// Source sub-triangles
    pub src_subs: [Triangle; 3],
}

/// Observation sub-triangles, the first one holds the shared edge
const OBS_SUBS: [Triangle; 3] = [[0, 1, 4], [1, 2, 4], [2, 0, 4]];

/// Source sub-triangles, the first one holds the shared edge
const SRC_SUBS: [Triangle; 3] = [[1, 0, 5], [0, 3, 5], [3, 1, 5]];

/// Local ids of the observation parent
pub const OBS_PARENT: Triangle = [0, 1, 2];
/// Local ids of the canonical source parent
pub const SRC_PARENT: Triangle = [1, 0, 3];

impl EdgeSplit {
    /// Split `obs` (shared edge `(0, 1)`) and the source with apex `src_apex`
    pub fn new(obs: &[Point; 3], src_apex: &Point, split_angle_deg: f64) -> Self {
        let p_obs = split_point(&obs[0], &obs[1], &obs[2], split_angle_deg);
        let p_src = split_point(&obs[1], &obs[0], src_apex, split_angle_deg);
        Self {
            points: [obs[0], obs[1], obs[2], *src_apex, p_obs, p_src],
            obs_subs: OBS_SUBS,
            src_subs: SRC_SUBS,
        }
    }

    /// Coordinates of a local triangle
    pub fn triangle(&self, tri: &Triangle) -> [Point; 3] {
        [self.points[tri[0]], self.points[tri[1]], self.points[tri[2]]]
    }

    /// The nine sub-pairs, each in canonical local order; the first is the edge core
    pub fn sub_pairs(&self) -> Result<Vec<SubPair>> {
        let mut out = Vec::with_capacity(9);
        for o in &self.obs_subs {
            for s in &self.src_subs {
                let pair = classify(o, s)?;
                let (obs, src) = if pair.kind == AdjacencyKind::Separate {
                    // these come closest at the split points
                    (anchor(o, 4), anchor(s, 5))
                } else {
                    (pair.canonical_obs(), pair.canonical_src())
                };
                out.push(SubPair {
                    obs,
                    src,
                    kind: pair.kind,
                });
            }
        }
        // edge core first
        out.sort_by_key(|p| !matches!(p.kind, AdjacencyKind::EdgeAdjacent));
        Ok(out)
    }

    /// Basis matrices of a sub-pair with respect to the parents
    pub fn sub_bases(&self, pair: &SubPair) -> (SubBasis, SubBasis) {
        let obs_parent = self.triangle(&OBS_PARENT);
        let src_parent = self.triangle(&SRC_PARENT);
        (
            basis_at_vertices(&obs_parent, &self.triangle(&pair.obs)),
            basis_at_vertices(&src_parent, &self.triangle(&pair.src)),
        )
    }
}

/// Rotate `tri` so that local vertex 0 is `id`
fn anchor(tri: &Triangle, id: usize) -> Triangle {
    let r = tri.iter().position(|&v| v == id).unwrap_or(0);
    [tri[r], tri[(r + 1) % 3], tri[(r + 2) % 3]]
}

/// Interior point above the midpoint of edge `(a, b)` at base angle `angle_deg`, on the side of `c`
pub fn split_point(a: &Point, b: &Point, c: &Point, angle_deg: f64) -> Point {
    let edge = sub(b, a);
    let length = norm(&edge);
    let normal = cross(&edge, &sub(c, a));
    let inward = normalize(&cross(&normal, &edge));
    let mid = scale(&add(a, b), 0.5);
    add(
        &mid,
        &scale(&inward, 0.5 * length * angle_deg.to_radians().tan()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_split() -> EdgeSplit {
        let obs = [[0.0, 0.0, 0.0], [1.2, 0.0, 0.0], [0.5, 0.9, 0.0]];
        let apex = [0.7, -0.4, -0.6];
        EdgeSplit::new(&obs, &apex, 15.0)
    }

    #[test]
    fn test_sub_pair_census() {
        let pairs = sample_split().sub_pairs().unwrap();
        assert_eq!(pairs.len(), 9);
        let count = |k| pairs.iter().filter(|p| p.kind == k).count();
        assert_eq!(count(AdjacencyKind::EdgeAdjacent), 1);
        assert_eq!(count(AdjacencyKind::VertexAdjacent), 6);
        assert_eq!(count(AdjacencyKind::Separate), 2);
        assert_eq!(pairs[0].kind, AdjacencyKind::EdgeAdjacent);
        assert_eq!(pairs[0].obs, [0, 1, 4]);
        assert_eq!(pairs[0].src, [1, 0, 5]);
        for p in pairs.iter().filter(|p| p.kind == AdjacencyKind::Separate) {
            assert_eq!((p.obs[0], p.src[0]), (4, 5));
        }
    }

    #[test]
    fn test_split_point_angle() {
        let split = sample_split();
        let p = split.points[4];
        // base angle at vertex 0 equals the split angle
        let e = sub(&split.points[1], &split.points[0]);
        let d = sub(&p, &split.points[0]);
        let cos = crate::core::types::dot(&e, &d) / (norm(&e) * norm(&d));
        assert_relative_eq!(cos.acos().to_degrees(), 15.0, epsilon = 1e-10);
    }

    #[test]
    fn test_sub_areas_cover_parent() {
        let split = sample_split();
        let area = |t: &Triangle| TriangleGeometry::new(&split.triangle(t)).jacobian;
        let obs: f64 = split.obs_subs.iter().map(area).sum();
        let src: f64 = split.src_subs.iter().map(area).sum();
        assert_relative_eq!(obs, area(&OBS_PARENT), max_relative = 1e-12);
        assert_relative_eq!(src, area(&SRC_PARENT), max_relative = 1e-12);
    }

    #[test]
    fn test_basis_columns_sum_to_one() {
        let split = sample_split();
        for pair in split.sub_pairs().unwrap() {
            let (bo, bs) = split.sub_bases(&pair);
            for k in 0..3 {
                assert_relative_eq!(bo[0][k] + bo[1][k] + bo[2][k], 1.0, epsilon = 1e-12);
                assert_relative_eq!(bs[0][k] + bs[1][k] + bs[2][k], 1.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_permutation_basis_relabels() {
        let mut values = [0.0; 81];
        values[tensor_index(0, 1, 2, 0)] = 3.0;
        let out = sub_basis(&values, &permutation_basis([2, 0, 1]), &permutation_basis([1, 2, 0]));
        assert_eq!(out[tensor_index(2, 1, 0, 0)], 3.0);
        assert_eq!(out.iter().filter(|v| **v != 0.0).count(), 1);
    }
}
