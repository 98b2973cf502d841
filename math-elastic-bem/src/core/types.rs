//! Core type definitions
//!
//! Points are plain `[f64; 3]` arrays so kernels can be evaluated in tight loops without
//! allocation. Pair results are 81-entry tensors indexed `a*27 + i*9 + b*3 + j` where `a`/`i`
//! are the observation basis function and component and `b`/`j` the source ones.

use serde::{Deserialize, Serialize};

use super::error::{NearfieldError, Result};

// ============================================================================
// Geometry primitives
// ============================================================================

/// Point in 3D space
pub type Point = [f64; 3];

/// Triangle as three global point indices
pub type Triangle = [usize; 3];

/// 81-entry pair tensor (3 obs basis × 3 obs components × 3 src basis × 3 src components)
pub type Tensor81 = [f64; 81];

/// Flat index into a [`Tensor81`]
#[inline]
pub fn tensor_index(a: usize, i: usize, b: usize, j: usize) -> usize {
    a * 27 + i * 9 + b * 3 + j
}

/// Vector difference `a - b`
#[inline]
pub fn sub(a: &Point, b: &Point) -> Point {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

/// Vector sum `a + b`
#[inline]
pub fn add(a: &Point, b: &Point) -> Point {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

/// Scaled vector `s * a`
#[inline]
pub fn scale(a: &Point, s: f64) -> Point {
    [a[0] * s, a[1] * s, a[2] * s]
}

/// Dot product
#[inline]
pub fn dot(a: &Point, b: &Point) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Cross product
#[inline]
pub fn cross(a: &Point, b: &Point) -> Point {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Euclidean norm
#[inline]
pub fn norm(a: &Point) -> f64 {
    dot(a, a).sqrt()
}

/// Unit vector in the direction of `a` (zero vector stays zero)
#[inline]
pub fn normalize(a: &Point) -> Point {
    let n = norm(a);
    if n > 0.0 { scale(a, 1.0 / n) } else { *a }
}

/// Fetch the three vertices of a triangle
pub fn triangle_points(points: &[Point], tri: &Triangle) -> Result<[Point; 3]> {
    let mut out = [[0.0; 3]; 3];
    for (k, &idx) in tri.iter().enumerate() {
        out[k] = *points.get(idx).ok_or_else(|| {
            NearfieldError::invalid(format!(
                "point index {} out of range ({} points)",
                idx,
                points.len()
            ))
        })?;
    }
    Ok(out)
}

/// Interior angles of a triangle in degrees
pub fn interior_angles_deg(tri: &[Point; 3]) -> [f64; 3] {
    let mut angles = [0.0; 3];
    for k in 0..3 {
        let u = sub(&tri[(k + 1) % 3], &tri[k]);
        let v = sub(&tri[(k + 2) % 3], &tri[k]);
        let c = norm(&cross(&u, &v));
        angles[k] = c.atan2(dot(&u, &v)).to_degrees();
    }
    angles
}

/// Smallest interior angle of a triangle in degrees
pub fn min_angle_deg(tri: &[Point; 3]) -> f64 {
    interior_angles_deg(tri)
        .into_iter()
        .fold(f64::INFINITY, f64::min)
}

// ============================================================================
// Triangle geometry
// ============================================================================

/// Affine map of the reference triangle `(0,0), (1,0), (0,1)` onto a flat triangle
#[derive(Debug, Clone, Copy)]
pub struct TriangleGeometry {
    /// Vertex 0
    pub origin: Point,
    /// Edge vector v1 - v0
    pub e1: Point,
    /// Edge vector v2 - v0
    pub e2: Point,
    /// Unit normal (right-hand rule on the vertex order)
    pub normal: Point,
    /// Jacobian of the map (twice the area)
    pub jacobian: f64,
}

impl TriangleGeometry {
    /// Build the map for a triangle
    pub fn new(tri: &[Point; 3]) -> Self {
        let e1 = sub(&tri[1], &tri[0]);
        let e2 = sub(&tri[2], &tri[0]);
        let n = cross(&e1, &e2);
        let jacobian = norm(&n);
        Self {
            origin: tri[0],
            e1,
            e2,
            normal: normalize(&n),
            jacobian,
        }
    }

    /// Physical point at reference coordinates `(xi, eta)`
    #[inline]
    pub fn at(&self, xi: f64, eta: f64) -> Point {
        [
            self.origin[0] + xi * self.e1[0] + eta * self.e2[0],
            self.origin[1] + xi * self.e1[1] + eta * self.e2[1],
            self.origin[2] + xi * self.e1[2] + eta * self.e2[2],
        ]
    }

    /// Reference coordinates of a point, projected onto the triangle plane
    pub fn reference_coords(&self, p: &Point) -> [f64; 2] {
        let d = sub(p, &self.origin);
        let g11 = dot(&self.e1, &self.e1);
        let g12 = dot(&self.e1, &self.e2);
        let g22 = dot(&self.e2, &self.e2);
        let r1 = dot(&self.e1, &d);
        let r2 = dot(&self.e2, &d);
        let det = g11 * g22 - g12 * g12;
        [(g22 * r1 - g12 * r2) / det, (g11 * r2 - g12 * r1) / det]
    }

    /// Length used to scale the regularization offset, `sqrt(2 * area)`
    #[inline]
    pub fn offset_length(&self) -> f64 {
        self.jacobian.sqrt()
    }
}

/// Linear (P1) basis functions at reference coordinates
#[inline]
pub fn linear_basis(xi: f64, eta: f64) -> [f64; 3] {
    [1.0 - xi - eta, xi, eta]
}

// ============================================================================
// Material parameters
// ============================================================================

/// Isotropic elastic material
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElasticityParams {
    /// Shear modulus μ (> 0)
    pub shear_modulus: f64,
    /// Poisson ratio ν (−1 < ν < 0.5)
    pub poisson_ratio: f64,
}

impl ElasticityParams {
    /// Create validated material parameters
    pub fn new(shear_modulus: f64, poisson_ratio: f64) -> Result<Self> {
        let params = Self {
            shear_modulus,
            poisson_ratio,
        };
        params.validate()?;
        Ok(params)
    }

    /// Check the admissible ranges of μ and ν
    pub fn validate(&self) -> Result<()> {
        if !(self.shear_modulus > 0.0 && self.shear_modulus.is_finite()) {
            return Err(NearfieldError::invalid(format!(
                "shear modulus must be positive, got {}",
                self.shear_modulus
            )));
        }
        if !(self.poisson_ratio > -1.0 && self.poisson_ratio < 0.5) {
            return Err(NearfieldError::invalid(format!(
                "Poisson ratio must lie in (-1, 0.5), got {}",
                self.poisson_ratio
            )));
        }
        Ok(())
    }
}

impl Default for ElasticityParams {
    fn default() -> Self {
        Self {
            shear_modulus: 1.0,
            poisson_ratio: 0.25,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_tensor_index_layout() {
        assert_eq!(tensor_index(0, 0, 0, 0), 0);
        assert_eq!(tensor_index(2, 2, 2, 2), 80);
        assert_eq!(tensor_index(1, 0, 0, 0), 27);
        assert_eq!(tensor_index(0, 1, 0, 0), 9);
        assert_eq!(tensor_index(0, 0, 1, 0), 3);
    }

    #[test]
    fn test_geometry_maps_vertices() {
        let tri = [[1.0, 0.0, 0.0], [3.0, 0.0, 0.0], [1.0, 2.0, 0.0]];
        let g = TriangleGeometry::new(&tri);
        assert_relative_eq!(g.jacobian, 4.0);
        assert_eq!(g.normal, [0.0, 0.0, 1.0]);
        assert_eq!(g.at(1.0, 0.0), tri[1]);
        let rc = g.reference_coords(&[2.0, 1.0, 0.5]);
        assert_relative_eq!(rc[0], 0.5, epsilon = 1e-14);
        assert_relative_eq!(rc[1], 0.5, epsilon = 1e-14);
    }

    #[test]
    fn test_equilateral_angles() {
        let h = 3.0_f64.sqrt() / 2.0;
        let tri = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.5, h, 0.0]];
        assert_relative_eq!(min_angle_deg(&tri), 60.0, epsilon = 1e-10);
    }

    #[test]
    fn test_params_validation() {
        assert!(ElasticityParams::new(1.0, 0.25).is_ok());
        assert!(ElasticityParams::new(0.0, 0.25).is_err());
        assert!(ElasticityParams::new(1.0, 0.5).is_err());
        assert!(ElasticityParams::new(1.0, -1.0).is_err());
    }

    #[test]
    fn test_triangle_points_out_of_range() {
        let pts = vec![[0.0; 3]; 2];
        assert!(triangle_points(&pts, &[0, 1, 2]).is_err());
    }
}
