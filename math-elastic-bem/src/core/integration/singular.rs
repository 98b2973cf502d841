//! Regularized integration of singular pairs
//!
//! The observation point is displaced off its triangle by `ε · sqrt(2·area_obs)`, the
//! now smooth integral is computed for a sequence of `ε` and extrapolated to `ε = 0`.
//!
//! Singular integrals are always computed in the standard configuration with μ = 1 and
//! mapped back with [`transform_from_standard`]. The table builder, the table lookup and
//! the direct path therefore share one code path.

use std::fmt;
use std::str::FromStr;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::limit::{LimitEngine, LimitResult, LimitSettings, LimitStatus};
use super::rules::{
    PairRule, QuadratureSettings, coincident_rule, edge_offset_sign, edge_rule, vertex_rule,
};
use super::sub_basis::{EdgeSplit, add_sub_basis};
use crate::core::error::{NearfieldError, Result};
use crate::core::evaluator::{PairEvaluator, Regularization, row_tensor};
use crate::core::kernels::KernelKind;
use crate::core::mesh::classify::AdjacencyKind;
use crate::core::mesh::standardize::{
    EdgeStandardization, StandardTransform, transform_from_standard,
};
use crate::core::types::{ElasticityParams, Point, Tensor81, Triangle, TriangleGeometry};

/// Singular pair classes that are tabulated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SingularClass {
    /// A triangle with itself
    Coincident,
    /// Two triangles sharing an edge
    #[serde(rename = "edge")]
    EdgeAdjacent,
}

impl SingularClass {
    /// Short name used in file names and on the command line
    pub fn name(&self) -> &'static str {
        match self {
            SingularClass::Coincident => "coincident",
            SingularClass::EdgeAdjacent => "edge",
        }
    }

    /// Number of table axes, ν included
    pub fn dimensions(&self) -> usize {
        match self {
            SingularClass::Coincident => 3,
            SingularClass::EdgeAdjacent => 2,
        }
    }

    /// The class of an adjacency, if it is singular
    pub fn from_adjacency(kind: AdjacencyKind) -> Option<Self> {
        match kind {
            AdjacencyKind::Coincident => Some(SingularClass::Coincident),
            AdjacencyKind::EdgeAdjacent => Some(SingularClass::EdgeAdjacent),
            _ => None,
        }
    }
}

impl fmt::Display for SingularClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SingularClass {
    type Err = NearfieldError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "coincident" | "coinc" => Ok(SingularClass::Coincident),
            "edge" | "adjacent" | "edge-adjacent" => Ok(SingularClass::EdgeAdjacent),
            other => Err(NearfieldError::invalid(format!(
                "unknown singular class '{}'",
                other
            ))),
        }
    }
}

/// Side of the observation normal the observation point is moved to
///
/// Coincident pairs use `+1`; edge-adjacent pairs move away from the source fold.
pub fn offset_sign(class: SingularClass, obs: &[Point; 3], src: &[Point; 3]) -> f64 {
    match class {
        SingularClass::Coincident => 1.0,
        SingularClass::EdgeAdjacent => edge_offset_sign(obs, &src[2]),
    }
}

/// Regularized rule for a canonical pair
pub fn singular_rule(
    class: SingularClass,
    obs: &[Point; 3],
    src: &[Point; 3],
    eps: f64,
    quadrature: &QuadratureSettings,
) -> PairRule {
    match class {
        SingularClass::Coincident => coincident_rule(obs, eps, &quadrature.coincident),
        SingularClass::EdgeAdjacent => edge_rule(
            obs,
            src,
            eps,
            edge_offset_sign(obs, &src[2]),
            &quadrature.edge,
        ),
    }
}

/// Integrate one pair with the observation point displaced by `eps`
#[allow(clippy::too_many_arguments)]
pub fn integrate_regularized(
    kernel: KernelKind,
    obs: &[Point; 3],
    src: &[Point; 3],
    params: &ElasticityParams,
    eps: f64,
    offset_sign: f64,
    rule: &PairRule,
    evaluator: &dyn PairEvaluator,
) -> Result<Tensor81> {
    let points = [obs[0], obs[1], obs[2], src[0], src[1], src[2]];
    let values = evaluator.evaluate(
        kernel,
        rule,
        &points,
        &[([0, 1, 2], [3, 4, 5])],
        params,
        Regularization::new(eps, offset_sign),
    )?;
    row_tensor(&values, 0)
}

/// Finite part of a canonical singular pair, in absolute length units
#[allow(clippy::too_many_arguments)]
pub fn regularized_limit(
    kernel: KernelKind,
    class: SingularClass,
    obs: &[Point; 3],
    src: &[Point; 3],
    params: &ElasticityParams,
    quadrature: &QuadratureSettings,
    limit: &LimitSettings,
    evaluator: &dyn PairEvaluator,
) -> Result<LimitResult> {
    let sign = offset_sign(class, obs, src);
    let h_obs = TriangleGeometry::new(obs).offset_length();
    let result = LimitEngine::run(*limit, kernel, |eps| {
        let rule = singular_rule(class, obs, src, eps, quadrature);
        let values = integrate_regularized(kernel, obs, src, params, eps, sign, &rule, evaluator)?;
        Ok(values.to_vec())
    })?;
    Ok(result.to_absolute(h_obs))
}

/// Singular integral of a standard configuration: finite part and log-scale coefficient
///
/// The physical finite part of a configuration scaled by `s` is
/// `s^(4-d) (finite + ln(s) · log_coefficient)` before rotation.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardValue {
    /// Finite part at unit scale
    pub finite: Tensor81,
    /// Coefficient of `ln(scale)`, i.e. `-B`
    pub log_coefficient: Tensor81,
    /// Status of the extrapolation
    pub status: LimitStatus,
    /// Relative change between the last two estimates
    pub error_estimate: f64,
}

impl StandardValue {
    /// Build from an extrapolation over 81 entries
    pub fn from_limit(result: &LimitResult) -> Result<Self> {
        let mut finite = [0.0; 81];
        let mut log_coefficient = [0.0; 81];
        if result.values.len() != 81 || result.log_coefficients.len() != 81 {
            return Err(NearfieldError::dispatch(format!(
                "expected 81 extrapolated entries, got {}",
                result.values.len()
            )));
        }
        finite.copy_from_slice(&result.values);
        for (c, b) in log_coefficient.iter_mut().zip(&result.log_coefficients) {
            *c = -b;
        }
        Ok(Self {
            finite,
            log_coefficient,
            status: result.status,
            error_estimate: result.error_estimate,
        })
    }

    /// Build from interpolated table entries
    pub fn from_parts(finite: Tensor81, log_coefficient: Tensor81) -> Self {
        Self {
            finite,
            log_coefficient,
            status: LimitStatus::Converged,
            error_estimate: 0.0,
        }
    }

    /// Standard-frame values for a physical configuration of scale `scale`
    pub fn at_scale(&self, scale: f64) -> Tensor81 {
        let ln_s = scale.ln();
        let mut out = self.finite;
        for (o, c) in out.iter_mut().zip(&self.log_coefficient) {
            *o += ln_s * c;
        }
        out
    }
}

/// Material with unit shear modulus, as used in the standard configurations
///
/// Table axes include ν = 0.5, so this bypasses [`ElasticityParams::validate`].
pub fn unit_material(poisson_ratio: f64) -> ElasticityParams {
    ElasticityParams {
        shear_modulus: 1.0,
        poisson_ratio,
    }
}

/// Standard coincident triangle `(0,0,0), (1,0,0), (x2,y2,0)`
pub fn standard_coincident_points(x2: f64, y2: f64) -> [Point; 3] {
    [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [x2, y2, 0.0]]
}

/// Standard edge core for fold angle `phi`: both pieces are isosceles with base angles
/// equal to the split angle, the source below the `z = 0` plane
pub fn standard_edge_points(phi: f64, split_angle_deg: f64) -> ([Point; 3], [Point; 3]) {
    let h = 0.5 * split_angle_deg.to_radians().tan();
    (
        [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.5, h, 0.0]],
        [
            [1.0, 0.0, 0.0],
            [0.0, 0.0, 0.0],
            [0.5, h * phi.cos(), -h * phi.sin()],
        ],
    )
}

/// Singular integral of the standard coincident triangle
pub fn coincident_standard_value(
    kernel: KernelKind,
    x2: f64,
    y2: f64,
    poisson_ratio: f64,
    quadrature: &QuadratureSettings,
    limit: &LimitSettings,
    evaluator: &dyn PairEvaluator,
) -> Result<StandardValue> {
    let tri = standard_coincident_points(x2, y2);
    let result = regularized_limit(
        kernel,
        SingularClass::Coincident,
        &tri,
        &tri,
        &unit_material(poisson_ratio),
        quadrature,
        limit,
        evaluator,
    )?;
    StandardValue::from_limit(&result)
}

/// Singular integral of the standard edge core
#[allow(clippy::too_many_arguments)]
pub fn edge_standard_value(
    kernel: KernelKind,
    phi: f64,
    poisson_ratio: f64,
    split_angle_deg: f64,
    quadrature: &QuadratureSettings,
    limit: &LimitSettings,
    evaluator: &dyn PairEvaluator,
) -> Result<StandardValue> {
    let (obs, src) = standard_edge_points(phi, split_angle_deg);
    let result = regularized_limit(
        kernel,
        SingularClass::EdgeAdjacent,
        &obs,
        &src,
        &unit_material(poisson_ratio),
        quadrature,
        limit,
        evaluator,
    )?;
    StandardValue::from_limit(&result)
}

/// Vertex-rule integrals of canonical pairs sharing local vertex 0, one row per pair
pub fn vertex_adjacent_batch(
    kernel: KernelKind,
    points: &[Point],
    pairs: &[(Triangle, Triangle)],
    params: &ElasticityParams,
    order: usize,
    evaluator: &dyn PairEvaluator,
) -> Result<Array2<f64>> {
    evaluator.evaluate(
        kernel,
        &vertex_rule(order),
        points,
        pairs,
        params,
        Regularization::NONE,
    )
}

/// Integral over a canonical edge-adjacent pair given the standard value of its core
///
/// `obs` has the shared edge as `(0, 1)` and `src` is `(obs[1], obs[0], apex)`. The core
/// is mapped back through `std`; the other eight sub-pairs are integrated with the vertex
/// rule, anchored at their shared vertex or, for the two separate ones, at the split points.
#[allow(clippy::too_many_arguments)]
pub fn compose_edge(
    kernel: KernelKind,
    obs: &[Point; 3],
    src: &[Point; 3],
    params: &ElasticityParams,
    core: &StandardValue,
    std: &EdgeStandardization,
    split_angle_deg: f64,
    vertex_order: usize,
    evaluator: &dyn PairEvaluator,
) -> Result<Tensor81> {
    let split = EdgeSplit::new(obs, &src[2], split_angle_deg);
    let sub_pairs = split.sub_pairs()?;
    let mut out = [0.0; 81];

    let (core_pair, rest) = sub_pairs
        .split_first()
        .ok_or_else(|| NearfieldError::dispatch("edge split produced no sub-pairs"))?;
    let core_phys = transform_from_standard(
        &core.at_scale(std.obs.scale),
        kernel,
        params.shear_modulus,
        &StandardTransform::edge(std),
    );
    let (bo, bs) = split.sub_bases(core_pair);
    add_sub_basis(&mut out, &core_phys, &bo, &bs);

    let batch: Vec<(Triangle, Triangle)> = rest.iter().map(|p| (p.obs, p.src)).collect();
    let values = vertex_adjacent_batch(kernel, &split.points, &batch, params, vertex_order, evaluator)?;
    for (k, pair) in rest.iter().enumerate() {
        let (bo, bs) = split.sub_bases(pair);
        add_sub_basis(&mut out, &row_tensor(&values, k)?, &bo, &bs);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::evaluator::CpuEvaluator;
    use crate::core::integration::sub_basis::split_point;

    #[test]
    fn test_class_names_round_trip() {
        for class in [SingularClass::Coincident, SingularClass::EdgeAdjacent] {
            assert_eq!(class.name().parse::<SingularClass>().unwrap(), class);
        }
        assert!("vertex".parse::<SingularClass>().is_err());
        assert_eq!(SingularClass::from_adjacency(AdjacencyKind::VertexAdjacent), None);
    }

    #[test]
    fn test_standard_edge_core_matches_split() {
        let phi: f64 = 1.1;
        let (obs, src) = standard_edge_points(phi, 15.0);
        let p = split_point(&src[0], &src[1], &[0.5, phi.cos(), -phi.sin()], 15.0);
        for i in 0..3 {
            assert!((p[i] - src[2][i]).abs() < 1e-14);
        }
        assert_eq!(offset_sign(SingularClass::EdgeAdjacent, &obs, &src), 1.0);
    }

    #[test]
    fn test_at_scale_unit_is_finite_part() {
        let mut finite = [0.0; 81];
        finite[5] = 2.0;
        let mut coeff = [0.0; 81];
        coeff[5] = 3.0;
        let v = StandardValue::from_parts(finite, coeff);
        assert_eq!(v.at_scale(1.0)[5], 2.0);
        assert!((v.at_scale(std::f64::consts::E)[5] - 5.0).abs() < 1e-14);
    }

    #[test]
    fn test_coincident_u_converges() {
        let limit = LimitSettings {
            eps_start: 0.02,
            eps_steps: 3,
            tolerance: 2e-2,
            log_terms: None,
        };
        let value = coincident_standard_value(
            KernelKind::U,
            0.3,
            0.8,
            0.25,
            &QuadratureSettings::uniform(5),
            &limit,
            &CpuEvaluator::default(),
        )
        .unwrap();
        assert!(value.finite.iter().all(|v| v.is_finite()));
        assert!(value.log_coefficient.iter().all(|v| *v == 0.0));
        // U is positive definite: diagonal entries are positive
        assert!(value.finite[0] > 0.0);
    }
}
