//! Canonical standardization of singular triangle pairs
//!
//! A coincident triangle is moved by translation, rotation (possibly with a reflection)
//! and uniform scaling to the standard triangle `(0,0,0), (1,0,0), (x2,y2,0)` with
//! `x2 <= 0.5` and `y2 > 0`. An edge-adjacent pair is moved so that the shared edge is the
//! unit segment on the x axis, the observation triangle lies in the `z = 0` half plane
//! `y > 0` and the source apex sits at `z <= 0`.
//!
//! The Kelvin kernels are built from dot and tensor products only, so they transform
//! covariantly under any orthogonal map. Integrals over the standard configuration are
//! mapped back with [`transform_from_standard`].

use crate::core::error::{NearfieldError, Result};
use crate::core::kernels::KernelKind;
use crate::core::types::{
    Point, Tensor81, add, cross, dot, min_angle_deg, norm, normalize, scale, sub, tensor_index,
};

/// 3×3 matrix, row major
pub type Mat3 = [[f64; 3]; 3];

/// Identity matrix
pub const IDENTITY: Mat3 = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

fn mat_vec(q: &Mat3, v: &Point) -> Point {
    [dot(&q[0], v), dot(&q[1], v), dot(&q[2], v)]
}

fn mat_t_vec(q: &Mat3, v: &Point) -> Point {
    let mut out = [0.0; 3];
    for (k, row) in q.iter().enumerate() {
        for i in 0..3 {
            out[i] += row[i] * v[k];
        }
    }
    out
}

/// A triangle in standard position with the map back to physical space
#[derive(Debug, Clone, PartialEq)]
pub struct StandardizedTriangle {
    /// Standard vertices `(0,0,0), (1,0,0), (x2,y2,0)`
    pub vertices: [Point; 3],
    /// Standard local vertex `k` is original local vertex `labels[k]`
    pub labels: [usize; 3],
    /// Physical position of standard vertex 0
    pub translation: Point,
    /// Orthogonal map, `std = Q (phys - translation) / scale`
    pub rotation: Mat3,
    /// Length of the standard edge (0, 1) in physical units
    pub scale: f64,
    /// The map contains a reflection
    pub flipped: bool,
    /// `+1` when the physical normal maps onto the standard `+z` normal, `-1` otherwise
    pub parity: f64,
}

impl StandardizedTriangle {
    /// Standard coordinate of a physical point
    pub fn to_standard(&self, p: &Point) -> Point {
        scale(&mat_vec(&self.rotation, &sub(p, &self.translation)), 1.0 / self.scale)
    }

    /// Physical coordinate of a standard point
    pub fn to_physical(&self, p: &Point) -> Point {
        add(&self.translation, &scale(&mat_t_vec(&self.rotation, p), self.scale))
    }

    /// Reconstruct the input vertices in their original order
    pub fn physical_vertices(&self) -> [Point; 3] {
        let mut out = [[0.0; 3]; 3];
        for k in 0..3 {
            out[self.labels[k]] = self.to_physical(&self.vertices[k]);
        }
        out
    }

    /// Apex coordinates `(x2, y2)`
    pub fn apex(&self) -> (f64, f64) {
        (self.vertices[2][0], self.vertices[2][1])
    }
}

/// Standardize a triangle for coincident integration
///
/// The longest edge becomes edge (0, 1) and the remaining vertex projects into its first
/// half.
pub fn standardize(tri: &[Point; 3], min_angle_threshold_deg: f64) -> Result<StandardizedTriangle> {
    check_min_angle(tri, min_angle_threshold_deg)?;

    let lengths: Vec<f64> = (0..3)
        .map(|k| norm(&sub(&tri[(k + 1) % 3], &tri[k])))
        .collect();
    let longest = (0..3)
        .max_by(|&a, &b| lengths[a].total_cmp(&lengths[b]))
        .unwrap_or(0);
    let mut labels = [longest, (longest + 1) % 3, (longest + 2) % 3];

    let edge = sub(&tri[labels[1]], &tri[labels[0]]);
    let apex = sub(&tri[labels[2]], &tri[labels[0]]);
    if dot(&apex, &edge) > 0.5 * dot(&edge, &edge) {
        labels.swap(0, 1);
    }

    let normal = normalize(&cross(
        &sub(&tri[1], &tri[0]),
        &sub(&tri[2], &tri[0]),
    ));
    frame_from_labels(tri, labels, &normal, FlipAxis::Y)
}

enum FlipAxis {
    Y,
    Z,
}

fn frame_from_labels(
    tri: &[Point; 3],
    labels: [usize; 3],
    normal: &Point,
    flip: FlipAxis,
) -> Result<StandardizedTriangle> {
    let origin = tri[labels[0]];
    let edge = sub(&tri[labels[1]], &origin);
    let length = norm(&edge);
    if length <= 0.0 {
        return Err(NearfieldError::invalid("triangle has a zero-length edge"));
    }
    let e1 = scale(&edge, 1.0 / length);
    let e3 = *normal;
    let e2 = cross(&e3, &e1);
    let mut rotation = [e1, e2, e3];

    let apex = sub(&tri[labels[2]], &origin);
    let mut flipped = false;
    if matches!(flip, FlipAxis::Y) && dot(&apex, &e2) < 0.0 {
        rotation[1] = scale(&e2, -1.0);
        flipped = true;
    }

    let x2 = dot(&apex, &rotation[0]) / length;
    let y2 = dot(&apex, &rotation[1]) / length;
    let parity = if dot(&rotation[2], normal) >= 0.0 { 1.0 } else { -1.0 };
    Ok(StandardizedTriangle {
        vertices: [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [x2, y2, 0.0]],
        labels,
        translation: origin,
        rotation,
        scale: length,
        flipped,
        parity,
    })
}

/// Standard configuration of an edge-adjacent pair in canonical order
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeStandardization {
    /// Observation triangle in standard position (identity labels)
    pub obs: StandardizedTriangle,
    /// Source apex in standard coordinates (z <= 0)
    pub src_apex: Point,
    /// Fold angle in (0, π], π for a coplanar pair
    pub fold_angle: f64,
    /// Sign relating the physical source normal to the standard source normal
    pub src_parity: f64,
}

/// Standardize a canonical edge-adjacent pair
///
/// `obs` is the observation triangle with the shared edge as (0, 1) and `src_apex` the
/// source vertex off that edge. The frame is built on the observation triangle and
/// reflected in z when needed so that the source apex lies on the `z <= 0` side.
pub fn standardize_edge(obs: &[Point; 3], src_apex: &Point) -> Result<EdgeStandardization> {
    let obs_normal = normalize(&cross(&sub(&obs[1], &obs[0]), &sub(&obs[2], &obs[0])));
    let mut std_obs = frame_from_labels(obs, [0, 1, 2], &obs_normal, FlipAxis::Z)?;

    let mut apex = std_obs.to_standard(src_apex);
    if apex[2] > 0.0 {
        std_obs.rotation[2] = scale(&std_obs.rotation[2], -1.0);
        std_obs.flipped = true;
        std_obs.parity = -1.0;
        apex[2] = -apex[2];
    }

    let depth = if apex[2] < 0.0 { -apex[2] } else { 0.0 };
    let fold_angle = depth.atan2(apex[1]);
    if fold_angle <= 0.0 {
        return Err(NearfieldError::invalid(
            "edge-adjacent triangles overlap (zero fold angle)",
        ));
    }

    // canonical source is (obs1, obs0, apex)
    let src_phys = [obs[1], obs[0], *src_apex];
    let src_normal = normalize(&cross(
        &sub(&src_phys[1], &src_phys[0]),
        &sub(&src_phys[2], &src_phys[0]),
    ));
    let std_src = [[1.0, 0.0, 0.0], [0.0, 0.0, 0.0], apex];
    let std_src_normal = cross(&sub(&std_src[1], &std_src[0]), &sub(&std_src[2], &std_src[0]));
    let mapped = mat_vec(&std_obs.rotation, &src_normal);
    let src_parity = if dot(&mapped, &std_src_normal) >= 0.0 { 1.0 } else { -1.0 };

    Ok(EdgeStandardization {
        obs: std_obs,
        src_apex: apex,
        fold_angle,
        src_parity,
    })
}

/// Reject a triangle whose smallest interior angle is below `threshold_deg`
pub fn check_min_angle(tri: &[Point; 3], threshold_deg: f64) -> Result<()> {
    let min_angle = min_angle_deg(tri);
    if min_angle.is_nan() || min_angle < threshold_deg {
        return Err(NearfieldError::DegenerateTriangle {
            min_angle_deg: if min_angle.is_nan() { 0.0 } else { min_angle },
            threshold_deg,
        });
    }
    Ok(())
}

/// Orthogonal map, labels and parities that carry a standard integral to a physical pair
#[derive(Debug, Clone, PartialEq)]
pub struct StandardTransform {
    /// Original observation local index of each standard observation vertex
    pub obs_labels: [usize; 3],
    /// Original source local index of each standard source vertex
    pub src_labels: [usize; 3],
    /// `std = Q phys`
    pub rotation: Mat3,
    /// Physical length of the unit standard edge
    pub scale: f64,
    /// Observation normal parity
    pub obs_parity: f64,
    /// Source normal parity
    pub src_parity: f64,
}

impl StandardTransform {
    /// Transform for a coincident standardization (source labels equal observation labels)
    pub fn coincident(std: &StandardizedTriangle) -> Self {
        Self {
            obs_labels: std.labels,
            src_labels: std.labels,
            rotation: std.rotation,
            scale: std.scale,
            obs_parity: std.parity,
            src_parity: std.parity,
        }
    }

    /// Transform for an edge standardization
    pub fn edge(std: &EdgeStandardization) -> Self {
        Self {
            obs_labels: [0, 1, 2],
            src_labels: [0, 1, 2],
            rotation: std.obs.rotation,
            scale: std.obs.scale,
            obs_parity: std.obs.parity,
            src_parity: std.src_parity,
        }
    }
}

/// Map an integral over the standard configuration (μ = 1) back to the physical pair
///
/// `I_phys[la[a], i, lb[b], j] = s^(4-d) · μ-factor · parity · Σ_kl Q_ki Q_lj I_std[a, k, b, l]`
pub fn transform_from_standard(
    values: &Tensor81,
    kernel: KernelKind,
    shear_modulus: f64,
    transform: &StandardTransform,
) -> Tensor81 {
    let q = &transform.rotation;
    let factor = transform.scale.powi(4 - kernel.homogeneity_degree())
        * kernel.shear_modulus_factor(shear_modulus)
        * kernel.normal_parity(transform.obs_parity, transform.src_parity);

    let mut out = [0.0; 81];
    for a in 0..3 {
        for b in 0..3 {
            for i in 0..3 {
                for j in 0..3 {
                    let mut acc = 0.0;
                    for k in 0..3 {
                        for l in 0..3 {
                            acc += q[k][i] * q[l][j] * values[tensor_index(a, k, b, l)];
                        }
                    }
                    out[tensor_index(
                        transform.obs_labels[a],
                        i,
                        transform.src_labels[b],
                        j,
                    )] = factor * acc;
                }
            }
        }
    }
    out
}
