//! Batched pair evaluator
//!
//! Applies one [`PairRule`] to many triangle pairs and returns an `n × 81` matrix with one
//! row per pair. Pairs are processed in tiles of `tile_size`; pairs inside a tile run in
//! parallel and each writes only its own row. A single pair with a large rule is split
//! over chunks of rule points instead.

use ndarray::Array2;

use crate::core::constants::{DEFAULT_TILE_SIZE, TENSOR_LEN};
use crate::core::error::{NearfieldError, Result};
use crate::core::integration::rules::PairRule;
use crate::core::kernels::KernelKind;
use crate::core::parallel::{parallel_map_indexed, parallel_try_map};
use crate::core::types::{
    ElasticityParams, Point, Tensor81, Triangle, TriangleGeometry, linear_basis, scale, sub,
};

/// Rule points per parallel chunk when a single pair is integrated
const CHUNK_POINTS: usize = 4096;

/// Observation-point displacement of a regularized integral
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Regularization {
    /// Offset relative to `sqrt(2 · area_obs)`
    pub eps: f64,
    /// Side of the observation normal, `+1` or `-1`
    pub offset_sign: f64,
}

impl Regularization {
    /// No displacement
    pub const NONE: Regularization = Regularization {
        eps: 0.0,
        offset_sign: 1.0,
    };

    /// Displacement by `eps` on the side `offset_sign`
    pub fn new(eps: f64, offset_sign: f64) -> Self {
        Self { eps, offset_sign }
    }

    /// Absolute offset vector for an observation triangle
    fn offset(&self, obs: &TriangleGeometry) -> Point {
        scale(
            &obs.normal,
            self.offset_sign * self.eps * obs.offset_length(),
        )
    }
}

impl Default for Regularization {
    fn default() -> Self {
        Self::NONE
    }
}

/// Evaluates a quadrature rule over batches of triangle pairs
pub trait PairEvaluator: Send + Sync {
    /// Integrate `kernel` with `rule` over every `(obs, src)` pair
    ///
    /// Returns an array of shape `(pairs.len(), 81)`.
    fn evaluate(
        &self,
        kernel: KernelKind,
        rule: &PairRule,
        points: &[Point],
        pairs: &[(Triangle, Triangle)],
        params: &ElasticityParams,
        regularization: Regularization,
    ) -> Result<Array2<f64>>;
}

/// CPU evaluator (rayon when the `native` feature is enabled)
#[derive(Debug, Clone)]
pub struct CpuEvaluator {
    /// Pairs per tile
    pub tile_size: usize,
}

impl Default for CpuEvaluator {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
        }
    }
}

impl CpuEvaluator {
    /// Evaluator with a given tile size
    pub fn new(tile_size: usize) -> Result<Self> {
        if tile_size == 0 {
            return Err(NearfieldError::invalid("tile size must be positive"));
        }
        Ok(Self { tile_size })
    }
}

impl PairEvaluator for CpuEvaluator {
    fn evaluate(
        &self,
        kernel: KernelKind,
        rule: &PairRule,
        points: &[Point],
        pairs: &[(Triangle, Triangle)],
        params: &ElasticityParams,
        regularization: Regularization,
    ) -> Result<Array2<f64>> {
        rule.validate()?;
        let tile = self.tile_size.max(1);
        let mut out = Array2::zeros((pairs.len(), TENSOR_LEN));

        for (t, chunk) in pairs.chunks(tile).enumerate() {
            let geometries: Vec<([Point; 3], [Point; 3])> = chunk
                .iter()
                .map(|(o, s)| Ok((pair_points(points, o)?, pair_points(points, s)?)))
                .collect::<Result<_>>()?;

            let rows: Vec<Tensor81> = if geometries.len() == 1 {
                let (o, s) = &geometries[0];
                vec![integrate_pair(kernel, o, s, rule, params, regularization)?]
            } else {
                parallel_try_map(&geometries, |(o, s)| {
                    integrate_pair_serial(kernel, o, s, rule, params, regularization)
                })?
            };
            for (k, row) in rows.iter().enumerate() {
                out.row_mut(t * tile + k)
                    .iter_mut()
                    .zip(row.iter())
                    .for_each(|(dst, &v)| *dst = v);
            }
        }
        Ok(out)
    }
}

fn pair_points(points: &[Point], tri: &Triangle) -> Result<[Point; 3]> {
    let mut out = [[0.0; 3]; 3];
    for (k, &idx) in tri.iter().enumerate() {
        out[k] = *points.get(idx).ok_or_else(|| {
            NearfieldError::dispatch(format!(
                "point index {} out of range ({} points)",
                idx,
                points.len()
            ))
        })?;
    }
    Ok(out)
}

fn checked_geometry(tri: &[Point; 3]) -> Result<TriangleGeometry> {
    let g = TriangleGeometry::new(tri);
    if !(g.jacobian > 0.0 && g.jacobian.is_finite()) {
        return Err(NearfieldError::dispatch(format!(
            "zero-area triangle {:?}",
            tri
        )));
    }
    Ok(g)
}

/// Integrate one pair, splitting large rules over parallel chunks
pub fn integrate_pair(
    kernel: KernelKind,
    obs: &[Point; 3],
    src: &[Point; 3],
    rule: &PairRule,
    params: &ElasticityParams,
    regularization: Regularization,
) -> Result<Tensor81> {
    if rule.len() <= CHUNK_POINTS {
        return integrate_pair_serial(kernel, obs, src, rule, params, regularization);
    }
    let go = checked_geometry(obs)?;
    let gs = checked_geometry(src)?;
    let n_chunks = rule.len().div_ceil(CHUNK_POINTS);
    let partial = parallel_map_indexed(n_chunks, |c| {
        let lo = c * CHUNK_POINTS;
        let hi = (lo + CHUNK_POINTS).min(rule.len());
        accumulate(kernel, &go, &gs, rule, lo..hi, params, regularization)
    });
    let mut out = [0.0; 81];
    for part in partial {
        out.iter_mut().zip(part.iter()).for_each(|(o, p)| *o += p);
    }
    Ok(out)
}

/// Integrate one pair on the calling thread
pub fn integrate_pair_serial(
    kernel: KernelKind,
    obs: &[Point; 3],
    src: &[Point; 3],
    rule: &PairRule,
    params: &ElasticityParams,
    regularization: Regularization,
) -> Result<Tensor81> {
    let go = checked_geometry(obs)?;
    let gs = checked_geometry(src)?;
    Ok(accumulate(
        kernel,
        &go,
        &gs,
        rule,
        0..rule.len(),
        params,
        regularization,
    ))
}

fn accumulate(
    kernel: KernelKind,
    go: &TriangleGeometry,
    gs: &TriangleGeometry,
    rule: &PairRule,
    range: std::ops::Range<usize>,
    params: &ElasticityParams,
    regularization: Regularization,
) -> Tensor81 {
    let offset = regularization.offset(go);
    let jac = go.jacobian * gs.jacobian;
    let mut out = [0.0; 81];

    for q in range {
        let [ox, oy] = rule.obs[q];
        let [sx, sy] = rule.src[q];
        let x = go.at(ox, oy);
        let x = [x[0] + offset[0], x[1] + offset[1], x[2] + offset[2]];
        let y = gs.at(sx, sy);
        let k = kernel.evaluate(&sub(&y, &x), &go.normal, &gs.normal, params);
        let w = rule.weights[q] * jac;
        let bo = linear_basis(ox, oy);
        let bs = linear_basis(sx, sy);
        for a in 0..3 {
            for b in 0..3 {
                let f = w * bo[a] * bs[b];
                let base = a * 27 + b * 3;
                for i in 0..3 {
                    for j in 0..3 {
                        out[base + i * 9 + j] += f * k[i][j];
                    }
                }
            }
        }
    }
    out
}

/// Convert one output row into a tensor
pub fn row_tensor(values: &Array2<f64>, row: usize) -> Result<Tensor81> {
    let mut out = [0.0; 81];
    let src = values
        .outer_iter()
        .nth(row)
        .ok_or_else(|| NearfieldError::dispatch(format!("no evaluator row {}", row)))?;
    if src.len() != TENSOR_LEN {
        return Err(NearfieldError::dispatch(format!(
            "evaluator row has {} entries",
            src.len()
        )));
    }
    out.iter_mut().zip(src.iter()).for_each(|(o, &v)| *o = v);
    Ok(out)
}
