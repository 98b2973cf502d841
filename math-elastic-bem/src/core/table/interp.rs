//! Tensor-product barycentric interpolation on Chebyshev grids
//!
//! Each axis carries Chebyshev points of the second kind, `x_k = cos(kπ/(n-1))` mapped
//! to `[lo, hi]`, with the barycentric weights `(-1)^k` halved at both ends. Node values
//! are stored row major with the last axis fastest.

use ndarray::{Array3, ArrayView2};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::core::constants::AXIS_SLACK;
use crate::core::error::{NearfieldError, Result};
use crate::core::integration::{QuadratureSettings, SingularClass, StandardValue};
use crate::core::kernels::KernelKind;

/// Serialized form of an [`Axis`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct AxisSpec {
    name: String,
    lo: f64,
    hi: f64,
    size: usize,
}

/// One interpolation axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AxisSpec", into = "AxisSpec")]
pub struct Axis {
    name: String,
    lo: f64,
    hi: f64,
    nodes: Vec<f64>,
    weights: Vec<f64>,
}

impl TryFrom<AxisSpec> for Axis {
    type Error = NearfieldError;

    fn try_from(spec: AxisSpec) -> Result<Self> {
        Axis::new(spec.name, spec.lo, spec.hi, spec.size)
    }
}

impl From<Axis> for AxisSpec {
    fn from(axis: Axis) -> Self {
        AxisSpec {
            size: axis.nodes.len(),
            name: axis.name,
            lo: axis.lo,
            hi: axis.hi,
        }
    }
}

impl Axis {
    /// Axis with `size` Chebyshev nodes on `[lo, hi]`
    ///
    /// A single node needs a collapsed range `lo == hi`.
    pub fn new(name: impl Into<String>, lo: f64, hi: f64, size: usize) -> Result<Self> {
        let name = name.into();
        if size == 0 {
            return Err(NearfieldError::invalid(format!("axis '{}' has no nodes", name)));
        }
        if !lo.is_finite() || !hi.is_finite() || lo > hi {
            return Err(NearfieldError::invalid(format!(
                "axis '{}' has invalid bounds [{}, {}]",
                name, lo, hi
            )));
        }
        if size > 1 && lo == hi {
            return Err(NearfieldError::invalid(format!(
                "axis '{}' collapses to {} but has {} nodes",
                name, lo, size
            )));
        }
        if size == 1 && lo < hi {
            return Err(NearfieldError::invalid(format!(
                "axis '{}' spans [{}, {}] with a single node",
                name, lo, hi
            )));
        }

        let (nodes, weights) = if size == 1 {
            (vec![lo], vec![1.0])
        } else {
            let last = (size - 1) as f64;
            let nodes = (0..size)
                .map(|k| {
                    let x = (k as f64 * PI / last).cos();
                    lo + 0.5 * (x + 1.0) * (hi - lo)
                })
                .collect();
            let weights = (0..size)
                .map(|k| {
                    let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
                    if k == 0 || k == size - 1 {
                        0.5 * sign
                    } else {
                        sign
                    }
                })
                .collect();
            (nodes, weights)
        };

        Ok(Self {
            name,
            lo,
            hi,
            nodes,
            weights,
        })
    }

    /// Axis name, used in range errors
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lower bound
    pub fn lo(&self) -> f64 {
        self.lo
    }

    /// Upper bound
    pub fn hi(&self) -> f64 {
        self.hi
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false, an axis has at least one node
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node coordinates, descending from `hi` to `lo`
    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    /// Barycentric weights
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Check that `x` lies on the axis, clamping round-off at the bounds
    pub fn locate(&self, x: f64) -> Result<f64> {
        let slack = AXIS_SLACK * (self.hi - self.lo).abs().max(1.0);
        if x.is_nan() || x < self.lo - slack || x > self.hi + slack {
            return Err(NearfieldError::TableRange {
                axis: self.name.clone(),
                value: x,
                lo: self.lo,
                hi: self.hi,
            });
        }
        Ok(x.clamp(self.lo, self.hi))
    }

    /// Lagrange basis values of every node at `x` (second barycentric form)
    pub fn coefficients(&self, x: f64) -> Result<Vec<f64>> {
        let x = self.locate(x)?;
        let n = self.nodes.len();
        if n == 1 {
            return Ok(vec![1.0]);
        }

        let hit_tol = 1e-14 * (self.hi - self.lo).abs().max(1.0);
        if let Some(k) = self.nodes.iter().position(|&xk| (x - xk).abs() <= hit_tol) {
            let mut out = vec![0.0; n];
            out[k] = 1.0;
            return Ok(out);
        }

        let mut out: Vec<f64> = self
            .nodes
            .iter()
            .zip(&self.weights)
            .map(|(&xk, &wk)| wk / (x - xk))
            .collect();
        let total: f64 = out.iter().sum();
        for c in &mut out {
            *c /= total;
        }
        Ok(out)
    }
}

/// Build parameters recorded alongside the node values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMeta {
    /// Minimum interior angle the table covers (degrees)
    pub min_angle_deg: f64,
    /// Split angle of the edge core (degrees)
    pub split_angle_deg: f64,
    /// Extrapolation tolerance
    pub tolerance: f64,
    /// First regularization offset
    pub eps_start: f64,
    /// Number of offsets
    pub eps_steps: usize,
    /// Rule orders used for the node integrals
    pub quadrature: QuadratureSettings,
    /// Nodes whose extrapolation did not converge
    #[serde(default)]
    pub diverged_nodes: usize,
    /// Library version that built the table
    #[serde(default)]
    pub version: String,
}

/// Interpolation table of standard singular integrals
///
/// `values[[node, entry, 0]]` is the finite part of entry `entry` at unit scale and
/// `values[[node, entry, 1]]` its log-scale coefficient.
#[derive(Debug, Clone, PartialEq)]
pub struct InterpolationTable {
    kernel: KernelKind,
    class: SingularClass,
    axes: Vec<Axis>,
    meta: TableMeta,
    values: Array3<f64>,
}

impl InterpolationTable {
    /// Assemble a table, checking that the values match the grid
    pub fn new(
        kernel: KernelKind,
        class: SingularClass,
        axes: Vec<Axis>,
        meta: TableMeta,
        values: Array3<f64>,
    ) -> Result<Self> {
        if axes.len() != class.dimensions() {
            return Err(NearfieldError::invalid(format!(
                "{} table needs {} axes, got {}",
                class,
                class.dimensions(),
                axes.len()
            )));
        }
        let grid: usize = axes.iter().map(Axis::len).product();
        if values.dim() != (grid, 81, 2) {
            return Err(NearfieldError::invalid(format!(
                "table values have shape {:?}, expected ({}, 81, 2)",
                values.dim(),
                grid
            )));
        }
        Ok(Self {
            kernel,
            class,
            axes,
            meta,
            values,
        })
    }

    /// Kernel the table was built for
    pub fn kernel(&self) -> KernelKind {
        self.kernel
    }

    /// Singular class covered
    pub fn class(&self) -> SingularClass {
        self.class
    }

    /// Axes, ν last
    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    /// Build parameters
    pub fn meta(&self) -> &TableMeta {
        &self.meta
    }

    /// Node values, shape `(grid, 81, 2)`
    pub fn values(&self) -> &Array3<f64> {
        &self.values
    }

    /// Node counts per axis
    pub fn shape(&self) -> Vec<usize> {
        self.axes.iter().map(Axis::len).collect()
    }

    /// Total number of nodes
    pub fn grid_len(&self) -> usize {
        self.values.dim().0
    }

    /// Coordinates of node `index`
    pub fn node_point(&self, index: usize) -> Vec<f64> {
        node_point(&self.axes, index)
    }

    /// Stored value of node `index`
    pub fn node_value(&self, index: usize) -> StandardValue {
        split_entries(self.values.index_axis(ndarray::Axis(0), index))
    }

    /// Interpolate the 162 stored numbers at `coords`
    pub fn interpolate(&self, coords: &[f64]) -> Result<StandardValue> {
        if coords.len() != self.axes.len() {
            return Err(NearfieldError::invalid(format!(
                "table lookup needs {} coordinates, got {}",
                self.axes.len(),
                coords.len()
            )));
        }
        let coefficients = self
            .axes
            .iter()
            .zip(coords)
            .map(|(axis, &x)| axis.coefficients(x))
            .collect::<Result<Vec<_>>>()?;

        let shape = self.shape();
        let mut finite = [0.0; 81];
        let mut log_coefficient = [0.0; 81];
        for node in 0..self.grid_len() {
            let mut factor = 1.0;
            let mut rest = node;
            for (d, &n) in shape.iter().enumerate().rev() {
                factor *= coefficients[d][rest % n];
                rest /= n;
                if factor == 0.0 {
                    break;
                }
            }
            if factor == 0.0 {
                continue;
            }
            let entries = self.values.index_axis(ndarray::Axis(0), node);
            for e in 0..81 {
                finite[e] += factor * entries[[e, 0]];
                log_coefficient[e] += factor * entries[[e, 1]];
            }
        }
        Ok(StandardValue::from_parts(finite, log_coefficient))
    }
}

/// Coordinates of grid node `index` (last axis fastest)
pub fn node_point(axes: &[Axis], index: usize) -> Vec<f64> {
    let mut coords = vec![0.0; axes.len()];
    let mut rest = index;
    for (d, axis) in axes.iter().enumerate().rev() {
        coords[d] = axis.nodes[rest % axis.len()];
        rest /= axis.len();
    }
    coords
}

fn split_entries(entries: ArrayView2<f64>) -> StandardValue {
    let mut finite = [0.0; 81];
    let mut log_coefficient = [0.0; 81];
    for e in 0..81 {
        finite[e] = entries[[e, 0]];
        log_coefficient[e] = entries[[e, 1]];
    }
    StandardValue::from_parts(finite, log_coefficient)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn meta() -> TableMeta {
        TableMeta {
            min_angle_deg: 20.0,
            split_angle_deg: 15.0,
            tolerance: 1e-3,
            eps_start: 0.01,
            eps_steps: 4,
            quadrature: QuadratureSettings::default(),
            diverged_nodes: 0,
            version: String::new(),
        }
    }

    #[test]
    fn test_chebyshev_nodes_and_weights() {
        let axis = Axis::new("x", 0.0, 2.0, 5).unwrap();
        assert_relative_eq!(axis.nodes()[0], 2.0, epsilon = 1e-15);
        assert_relative_eq!(axis.nodes()[2], 1.0, epsilon = 1e-15);
        assert_relative_eq!(axis.nodes()[4], 0.0, epsilon = 1e-15);
        assert_eq!(axis.weights(), &[0.5, -1.0, 1.0, -1.0, 0.5]);
    }

    #[test]
    fn test_polynomial_reproduced() {
        let axis = Axis::new("x", -1.0, 3.0, 6).unwrap();
        let f = |x: f64| 2.0 - x + 0.5 * x.powi(3) - 0.1 * x.powi(5);
        for x in [-1.0, -0.3, 0.77, 2.9, 3.0] {
            let c = axis.coefficients(x).unwrap();
            let value: f64 = c.iter().zip(axis.nodes()).map(|(c, &xk)| c * f(xk)).sum();
            assert_relative_eq!(value, f(x), epsilon = 1e-11);
        }
    }

    #[test]
    fn test_node_hit_is_one_hot() {
        let axis = Axis::new("x", 0.0, 1.0, 4).unwrap();
        let c = axis.coefficients(axis.nodes()[1]).unwrap();
        assert_eq!(c, vec![0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_single_node_axis() {
        let axis = Axis::new("nu", 0.25, 0.25, 1).unwrap();
        assert_eq!(axis.coefficients(0.25).unwrap(), vec![1.0]);
        assert!(axis.coefficients(0.3).unwrap_err().is_table_range());
        assert!(Axis::new("nu", 0.25, 0.25, 3).is_err());
    }

    #[test]
    fn test_single_node_needs_collapsed_range() {
        let err = Axis::new("nu", 0.0, 0.5, 1).unwrap_err();
        assert!(matches!(err, NearfieldError::InvalidInput { .. }));
        assert!(Axis::new("nu", 0.0, 0.5, 2).is_ok());
    }

    #[test]
    fn test_out_of_range() {
        let axis = Axis::new("phi", 0.3, 3.0, 4).unwrap();
        let err = axis.locate(0.1).unwrap_err();
        assert!(matches!(err, NearfieldError::TableRange { ref axis, .. } if axis == "phi"));
        // round-off at the bound is accepted
        assert_eq!(axis.locate(3.0 + 1e-13).unwrap(), 3.0);
    }

    #[test]
    fn test_axis_serde_rebuilds_nodes() {
        let axis = Axis::new("y2", 0.1, 0.9, 7).unwrap();
        let json = serde_json::to_string(&axis).unwrap();
        assert!(json.contains("\"size\":7"));
        let back: Axis = serde_json::from_str(&json).unwrap();
        assert_eq!(back, axis);
        assert!(serde_json::from_str::<Axis>(r#"{"name":"x","lo":1,"hi":0,"size":3}"#).is_err());
    }

    #[test]
    fn test_table_interpolates_separable_data() {
        let axes = vec![
            Axis::new("phi", 0.5, 3.0, 5).unwrap(),
            Axis::new("nu", 0.0, 0.5, 3).unwrap(),
        ];
        let grid = 15;
        let mut values = Array3::zeros((grid, 81, 2));
        for node in 0..grid {
            let p = node_point(&axes, node);
            for e in 0..81 {
                values[[node, e, 0]] = e as f64 + p[0] * p[0] - 2.0 * p[1];
                values[[node, e, 1]] = p[0] * p[1];
            }
        }
        let table = InterpolationTable::new(
            KernelKind::T,
            SingularClass::EdgeAdjacent,
            axes,
            meta(),
            values,
        )
        .unwrap();
        let v = table.interpolate(&[1.3, 0.2]).unwrap();
        assert_relative_eq!(v.finite[10], 10.0 + 1.69 - 0.4, epsilon = 1e-12);
        assert_relative_eq!(v.log_coefficient[80], 0.26, epsilon = 1e-12);

        let at_node = table.node_value(7);
        let p = table.node_point(7);
        let v = table.interpolate(&p).unwrap();
        assert_eq!(v.finite, at_node.finite);
    }

    #[test]
    fn test_table_shape_checked() {
        let axes = vec![
            Axis::new("phi", 0.5, 3.0, 5).unwrap(),
            Axis::new("nu", 0.0, 0.5, 3).unwrap(),
        ];
        let err = InterpolationTable::new(
            KernelKind::T,
            SingularClass::EdgeAdjacent,
            axes.clone(),
            meta(),
            Array3::zeros((14, 81, 2)),
        );
        assert!(err.is_err());
        let err = InterpolationTable::new(
            KernelKind::T,
            SingularClass::Coincident,
            axes,
            meta(),
            Array3::zeros((15, 81, 2)),
        );
        assert!(err.is_err());
    }
}
