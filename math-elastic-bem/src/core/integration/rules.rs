//! Quadrature rules over pairs of triangles
//!
//! A [`PairRule`] is a list of `(obs_ref, src_ref, weight)` in reference coordinates of the
//! two triangles. Applying it to a pair approximates
//! `∫∫ f dA_obs dA_src ≈ Σ w f J_obs J_src` where `J` is twice the triangle area.
//!
//! The singular rules are built per pair shape in the physical 2D embedding of each
//! triangle, so their weights already include `1 / (J_obs J_src)`:
//!
//! - coincident: centroid-to-edge collapse outside, polar coordinates inside
//! - edge-adjacent: distance-to-edge grading outside, polar coordinates over the unfolded
//!   source inside, concentrated at the physically nearest point on each ray
//! - vertex-adjacent: two-region Duffy rule with the singularity at local vertex 0
//! - tensor: collapsed Gauss rule for near and far pairs

use serde::{Deserialize, Serialize};

use super::gauss::{gauss_legendre_unit, triangle_quadrature};
use super::sinh::{Rule1d, end_graded_rule, graded_rule, near_singular_rule};
use crate::core::error::{NearfieldError, Result};
use crate::core::types::{Point, TriangleGeometry, cross, dot, norm, normalize, scale, sub};

type P2 = [f64; 2];

/// Orders of the building blocks of a singular rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleOrders {
    /// Gauss order towards the observation singularity (per panel)
    #[serde(default = "default_outer")]
    pub outer_radial: usize,
    /// Gauss order along each collapsed edge (per half)
    #[serde(default = "default_outer")]
    pub outer_along: usize,
    /// Gauss order in the polar angle
    #[serde(default = "default_outer")]
    pub inner_angular: usize,
    /// Gauss order in the polar radius (per panel)
    #[serde(default = "default_inner_radial")]
    pub inner_radial: usize,
}

fn default_outer() -> usize {
    8
}

fn default_inner_radial() -> usize {
    12
}

impl Default for RuleOrders {
    fn default() -> Self {
        Self {
            outer_radial: default_outer(),
            outer_along: default_outer(),
            inner_angular: default_outer(),
            inner_radial: default_inner_radial(),
        }
    }
}

impl RuleOrders {
    /// Same order for every block
    pub fn uniform(order: usize) -> Self {
        Self {
            outer_radial: order,
            outer_along: order,
            inner_angular: order,
            inner_radial: order,
        }
    }

    /// Check that all orders are usable
    pub fn validate(&self) -> Result<()> {
        let all = [
            self.outer_radial,
            self.outer_along,
            self.inner_angular,
            self.inner_radial,
        ];
        if all.iter().any(|&n| n == 0 || n > super::gauss::MAX_GAUSS_ORDER) {
            return Err(NearfieldError::invalid(format!(
                "rule orders must lie in 1..={}, got {:?}",
                super::gauss::MAX_GAUSS_ORDER,
                self
            )));
        }
        Ok(())
    }
}

/// Quadrature orders for every pair type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuadratureSettings {
    /// Regularized coincident rule
    #[serde(default)]
    pub coincident: RuleOrders,
    /// Regularized edge-adjacent rule
    #[serde(default)]
    pub edge: RuleOrders,
    /// Gauss order of the vertex-adjacent Duffy rule (per dimension)
    #[serde(default = "default_vertex_order")]
    pub vertex_order: usize,
    /// Triangle rule order for separate near-field pairs
    #[serde(default = "default_near_order")]
    pub near_order: usize,
    /// Triangle rule order of the far field
    #[serde(default = "default_far_order")]
    pub far_order: usize,
}

fn default_vertex_order() -> usize {
    8
}

fn default_near_order() -> usize {
    8
}

fn default_far_order() -> usize {
    3
}

impl Default for QuadratureSettings {
    fn default() -> Self {
        Self {
            coincident: RuleOrders::default(),
            edge: RuleOrders::default(),
            vertex_order: default_vertex_order(),
            near_order: default_near_order(),
            far_order: default_far_order(),
        }
    }
}

impl QuadratureSettings {
    /// Every order set to `order`
    pub fn uniform(order: usize) -> Self {
        Self {
            coincident: RuleOrders::uniform(order),
            edge: RuleOrders::uniform(order),
            vertex_order: order,
            near_order: order,
            far_order: order,
        }
    }

    /// Check every order
    pub fn validate(&self) -> Result<()> {
        self.coincident.validate()?;
        self.edge.validate()?;
        for (name, n) in [
            ("vertex_order", self.vertex_order),
            ("near_order", self.near_order),
            ("far_order", self.far_order),
        ] {
            if n == 0 || n > super::gauss::MAX_GAUSS_ORDER {
                return Err(NearfieldError::invalid(format!(
                    "{} must lie in 1..={}, got {}",
                    name,
                    super::gauss::MAX_GAUSS_ORDER,
                    n
                )));
            }
        }
        Ok(())
    }
}

/// Quadrature rule over a pair of triangles in reference coordinates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairRule {
    /// Observation reference coordinates
    pub obs: Vec<P2>,
    /// Source reference coordinates
    pub src: Vec<P2>,
    /// Weights
    pub weights: Vec<f64>,
}

impl PairRule {
    /// Empty rule with reserved capacity
    pub fn with_capacity(n: usize) -> Self {
        Self {
            obs: Vec::with_capacity(n),
            src: Vec::with_capacity(n),
            weights: Vec::with_capacity(n),
        }
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// Whether the rule has no points
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Append a point
    #[inline]
    pub fn push(&mut self, obs: P2, src: P2, weight: f64) {
        self.obs.push(obs);
        self.src.push(src);
        self.weights.push(weight);
    }

    /// Check that the three columns agree and all values are finite
    pub fn validate(&self) -> Result<()> {
        if self.obs.len() != self.weights.len() || self.src.len() != self.weights.len() {
            return Err(NearfieldError::dispatch(format!(
                "malformed rule: {} obs, {} src, {} weights",
                self.obs.len(),
                self.src.len(),
                self.weights.len()
            )));
        }
        if self.is_empty() {
            return Err(NearfieldError::dispatch("empty quadrature rule"));
        }
        let finite = self.weights.iter().all(|w| w.is_finite())
            && self.obs.iter().chain(&self.src).flatten().all(|v| v.is_finite());
        if !finite {
            return Err(NearfieldError::dispatch("rule contains non-finite values"));
        }
        Ok(())
    }
}

// ============================================================================
// 2D helpers
// ============================================================================

#[inline]
fn area2(a: P2, b: P2, c: P2) -> f64 {
    (b[0] - a[0]) * (c[1] - a[1]) - (c[0] - a[0]) * (b[1] - a[1])
}

#[inline]
fn line_dist(p: P2, a: P2, b: P2) -> f64 {
    area2(a, b, p).abs() / (b[0] - a[0]).hypot(b[1] - a[1])
}

/// Reference coordinates of `p` in the 2D triangle `tri`
#[inline]
fn bary(p: P2, tri: &[P2; 3]) -> P2 {
    let d = area2(tri[0], tri[1], tri[2]);
    [area2(tri[0], p, tri[2]) / d, area2(tri[0], tri[1], p) / d]
}

/// Planar embedding `(0,0), (L,0), (x2,y2)` of a 3D triangle
fn embed(tri: &[Point; 3]) -> [P2; 3] {
    let e1 = sub(&tri[1], &tri[0]);
    let e2 = sub(&tri[2], &tri[0]);
    let len = norm(&e1);
    let u = scale(&e1, 1.0 / len);
    let x2 = dot(&e2, &u);
    let y2 = (dot(&e2, &e2) - x2 * x2).max(0.0).sqrt();
    [[0.0, 0.0], [len, 0.0], [x2, y2]]
}

/// Singular point seen along a ray: `(ρ*, distance)` for direction `(cos θ, sin θ)` of length `R`
trait NearestOnRay {
    fn nearest(&self, origin: P2, ct: f64, st: f64, reach: f64) -> (f64, f64);
}

/// Coincident case: the singularity sits at height `e` above the polar origin
struct Above(f64);

impl NearestOnRay for Above {
    fn nearest(&self, _origin: P2, _ct: f64, _st: f64, _reach: f64) -> (f64, f64) {
        (0.0, self.0)
    }
}

/// Edge case: closest point of a ray in the folded source plane to the displaced point
struct Folded {
    point: Point,
    wy: f64,
    wz: f64,
}

impl NearestOnRay for Folded {
    fn nearest(&self, origin: P2, ct: f64, st: f64, reach: f64) -> (f64, f64) {
        let d = [ct, -st * self.wy, -st * self.wz];
        let v = [self.point[0] - origin[0], self.point[1], self.point[2]];
        let rs = dot(&v, &d).clamp(0.0, reach);
        let q = [v[0] - rs * d[0], v[1] - rs * d[1], v[2] - rs * d[2]];
        (rs, norm(&q))
    }
}

/// Polar rule over a 2D triangle around `c` (which may lie on its boundary)
///
/// `focus` concentrates the angle at the direction of a point at the given distance.
fn polar(
    c: P2,
    tri: &[P2; 3],
    nearest: &dyn NearestOnRay,
    n_angle: usize,
    n_radial: usize,
    focus: Option<(P2, f64)>,
    out: &mut Vec<(P2, f64)>,
) {
    use std::f64::consts::PI;

    let total = area2(tri[0], tri[1], tri[2]).abs();
    for j in 0..3 {
        let a = tri[j];
        let b = tri[(j + 1) % 3];
        if area2(c, a, b) < 1e-12 * total {
            continue;
        }
        let ta = (a[1] - c[1]).atan2(a[0] - c[0]);
        let mut tb = (b[1] - c[1]).atan2(b[0] - c[0]);
        while tb < ta {
            tb += 2.0 * PI;
        }
        let span = tb - ta;
        let h = line_dist(c, a, b);
        let (ex, ey) = (b[0] - a[0], b[1] - a[1]);
        let len = ex.hypot(ey);
        let foot_angle = (-ex / len).atan2(ey / len);

        // The ray length blows up at foot_angle ± π/2, just outside a wide span
        let pole_a = ta - (foot_angle - 0.5 * PI);
        let pole_b = (foot_angle + 0.5 * PI) - tb;
        let mut panels = vec![(ta, tb, pole_a, pole_b)];
        if let Some((fp, fd)) = focus {
            let mut tf = (fp[1] - c[1]).atan2(fp[0] - c[0]);
            while tf < ta {
                tf += 2.0 * PI;
            }
            let rf = (fp[0] - c[0]).hypot(fp[1] - c[1]);
            let width = fd.atan2(rf);
            if tf < tb && width < span {
                panels = vec![(ta, tf, pole_a, width), (tf, tb, width, pole_b)];
            }
        }
        let angles = angular_rule(n_angle, &panels);

        for (&th, &wth) in angles.0.iter().zip(&angles.1) {
            let reach = h / (th - foot_angle).cos();
            let (ct, st) = (th.cos(), th.sin());
            let (rs, dist) = nearest.nearest(c, ct, st, reach);
            let (rx, rw) = if dist < reach {
                near_singular_rule(n_radial, (rs / reach).clamp(0.0, 1.0), dist / reach)
            } else {
                gauss_legendre_unit(n_radial)
            };
            for (&r, &wr) in rx.iter().zip(&rw) {
                let rho = r * reach;
                out.push(([c[0] + rho * ct, c[1] + rho * st], wth * wr * reach * rho));
            }
        }
    }
}

/// Angle nodes over consecutive panels `(from, to, dist_from, dist_to)`, each graded towards
/// the near-singular behaviour at its ends
///
/// The weights are rescaled to sum to the total span so constants integrate exactly.
fn angular_rule(order: usize, panels: &[(f64, f64, f64, f64)]) -> Rule1d {
    let mut nodes = Vec::with_capacity(2 * order * panels.len());
    let mut weights = Vec::with_capacity(2 * order * panels.len());
    let mut span = 0.0;
    for &(from, to, d0, d1) in panels {
        let len = to - from;
        if len <= 1e-14 {
            continue;
        }
        span += len;
        let (x, w) = end_graded_rule(order, 2.0 * d0 / len, 2.0 * d1 / len);
        nodes.extend(x.iter().map(|&t| from + len * t));
        weights.extend(w.iter().map(|&wt| len * wt));
    }
    let total: f64 = weights.iter().sum();
    if total > 0.0 {
        weights.iter_mut().for_each(|w| *w *= span / total);
    }
    (nodes, weights)
}

// ============================================================================
// Singular rules
// ============================================================================

/// Rule for a triangle paired with itself, observation point displaced by `eps·sqrt(J)`
///
/// With `eps = 0` the rule integrates the weakly singular (U) case directly.
pub fn coincident_rule(tri: &[Point; 3], eps: f64, orders: &RuleOrders) -> PairRule {
    let tri2 = embed(tri);
    let jac = area2(tri2[0], tri2[1], tri2[2]);
    let e = eps * jac.sqrt();
    let c = [
        (tri2[0][0] + tri2[1][0] + tri2[2][0]) / 3.0,
        (tri2[0][1] + tri2[1][1] + tri2[2][1]) / 3.0,
    ];
    let above = Above(e);
    let mut rule = PairRule::default();
    let mut inner = Vec::new();

    for k in 0..3 {
        let a = tri2[k];
        let b = tri2[(k + 1) % 3];
        let prev = tri2[(k + 2) % 3];
        let sub_area = area2(c, a, b);
        let len = (b[0] - a[0]).hypot(b[1] - a[1]);
        let h_edge = line_dist(c, a, b);
        let h_prev = line_dist(c, prev, a);
        let h_next = line_dist(c, b, prev);

        let (tx, tw) = if e > 0.0 {
            near_singular_rule(orders.outer_radial, 0.0, e / h_edge)
        } else {
            graded_rule(orders.outer_radial, 3)
        };
        for (&t, &wt) in tx.iter().zip(&tw) {
            let scale_along = (1.0 - t) * len;
            let (ux, uw) = end_graded_rule(
                orders.outer_along,
                2.0 * (t * h_prev + e) / scale_along,
                2.0 * (t * h_next + e) / scale_along,
            );
            for (&u, &wu) in ux.iter().zip(&uw) {
                let x = [
                    (1.0 - t) * (a[0] + u * (b[0] - a[0])) + t * c[0],
                    (1.0 - t) * (a[1] + u * (b[1] - a[1])) + t * c[1],
                ];
                let w_obs = wt * wu * (1.0 - t) * sub_area;
                let x_ref = bary(x, &tri2);
                inner.clear();
                polar(
                    x,
                    &tri2,
                    &above,
                    orders.inner_angular,
                    orders.inner_radial,
                    None,
                    &mut inner,
                );
                for &(y, w_src) in &inner {
                    rule.push(x_ref, bary(y, &tri2), w_obs * w_src / (jac * jac));
                }
            }
        }
    }
    rule
}

/// Rule for a canonical edge-adjacent pair
///
/// `obs` and `src` share the edge `obs[0] = src[1]`, `obs[1] = src[0]`. The observation
/// point is displaced by `offset_sign · eps · sqrt(J_obs)` along the observation normal.
/// `offset_sign` must put the source apex on the opposite side.
pub fn edge_rule(
    obs: &[Point; 3],
    src: &[Point; 3],
    eps: f64,
    offset_sign: f64,
    orders: &RuleOrders,
) -> PairRule {
    let edge = sub(&obs[1], &obs[0]);
    let len = norm(&edge);
    let ux = scale(&edge, 1.0 / len);
    let normal = normalize(&cross(&edge, &sub(&obs[2], &obs[0])));
    let uy = cross(&normal, &ux);
    let uz = scale(&normal, offset_sign);

    let o2 = sub(&obs[2], &obs[0]);
    let obs2 = [[0.0, 0.0], [len, 0.0], [dot(&o2, &ux), dot(&o2, &uy)]];
    let s2 = sub(&src[2], &obs[0]);
    let (bx, by, bz) = (dot(&s2, &ux), dot(&s2, &uy), dot(&s2, &uz));
    let bd = by.hypot(bz);
    let (wy, wz) = (by / bd, bz / bd);
    let src2 = [[len, 0.0], [0.0, 0.0], [bx, -bd]];

    let jac_obs = area2(obs2[0], obs2[1], obs2[2]);
    let jac_src = area2(src2[0], src2[1], src2[2]);
    let e = eps * jac_obs.sqrt();
    let apex = obs2[2];
    let d0 = apex[0].hypot(apex[1]);
    let d1 = (apex[0] - len).hypot(apex[1]);

    let (tx, tw) = if e > 0.0 {
        near_singular_rule(orders.outer_radial, 0.0, e / apex[1])
    } else {
        graded_rule(orders.outer_radial, 3)
    };

    let mut rule = PairRule::default();
    let mut inner = Vec::new();
    for (&t, &wt) in tx.iter().zip(&tw) {
        let scale_along = (1.0 - t) * len;
        let (uxs, uws) = end_graded_rule(
            orders.outer_along,
            2.0 * (t * d0 + e) / scale_along,
            2.0 * (t * d1 + e) / scale_along,
        );
        for (&u, &wu) in uxs.iter().zip(&uws) {
            let x = [(1.0 - t) * u * len + t * apex[0], t * apex[1]];
            let w_obs = wt * wu * (1.0 - t) * jac_obs;
            let x_ref = bary(x, &obs2);
            let foot = [x[0].clamp(0.0, len), 0.0];
            let folded = Folded {
                point: [x[0], x[1], e],
                wy,
                wz,
            };
            let height = x[1] * wy + e * wz;
            let focus = (height > 0.0).then(|| ([x[0], -height], (x[1] * wz - e * wy).abs()));
            inner.clear();
            polar(
                foot,
                &src2,
                &folded,
                orders.inner_angular,
                orders.inner_radial,
                focus,
                &mut inner,
            );
            for &(y, w_src) in &inner {
                rule.push(x_ref, bary(y, &src2), w_obs * w_src / (jac_obs * jac_src));
            }
        }
    }
    rule
}

/// Sign of the edge offset that keeps the displaced observation surface away from the source
pub fn edge_offset_sign(obs: &[Point; 3], src_apex: &Point) -> f64 {
    let g = TriangleGeometry::new(obs);
    if dot(&sub(src_apex, &obs[0]), &g.normal) <= 0.0 {
        1.0
    } else {
        -1.0
    }
}

/// Two-region Duffy rule for a pair sharing local vertex 0
pub fn vertex_rule(order: usize) -> PairRule {
    let (g, gw) = gauss_legendre_unit(order);
    let mut rule = PairRule::with_capacity(2 * order.pow(4));
    for (&r1, &w1) in g.iter().zip(&gw) {
        for (&w, &ww) in g.iter().zip(&gw) {
            for (&a, &wa) in g.iter().zip(&gw) {
                for (&b, &wb) in g.iter().zip(&gw) {
                    for (ro, rs) in [(r1, r1 * w), (r1 * w, r1)] {
                        rule.push(
                            [ro * (1.0 - a), ro * a],
                            [rs * (1.0 - b), rs * b],
                            w1 * ww * wa * wb * r1 * ro * rs,
                        );
                    }
                }
            }
        }
    }
    rule
}

/// Tensor product of two collapsed Gauss triangle rules
pub fn tensor_rule(order: usize) -> PairRule {
    let tri = triangle_quadrature(order);
    let mut rule = PairRule::with_capacity(tri.len() * tri.len());
    for &(ox, oy, ow) in &tri {
        for &(sx, sy, sw) in &tri {
            rule.push([ox, oy], [sx, sy], ow * sw);
        }
    }
    rule
}
