//! Offline construction of interpolation tables
//!
//! Every grid node is a standard configuration; its singular integral is computed with the
//! regularized sequence and extrapolated. Nodes are independent and built in parallel.

use std::time::Instant;

use ndarray::Array3;

use super::interp::{Axis, InterpolationTable, TableMeta, node_point};
use crate::core::constants::COINCIDENT_Y2_MARGIN;
use crate::core::error::{NearfieldError, Result};
use crate::core::evaluator::PairEvaluator;
use crate::core::integration::limit::LimitStatus;
use crate::core::integration::singular::{coincident_standard_value, edge_standard_value};
use crate::core::integration::{LimitSettings, QuadratureSettings, SingularClass, StandardValue};
use crate::core::io::native::NearfieldConfig;
use crate::core::kernels::KernelKind;
use crate::core::parallel::parallel_try_map;

/// Builds tables for one set of rule and geometry settings
pub struct TableBuilder<'a> {
    quadrature: QuadratureSettings,
    limit: LimitSettings,
    min_angle_deg: f64,
    split_angle_deg: f64,
    poisson_range: [f64; 2],
    evaluator: &'a dyn PairEvaluator,
}

impl<'a> TableBuilder<'a> {
    /// Builder with the settings of `config`
    pub fn new(config: &NearfieldConfig, evaluator: &'a dyn PairEvaluator) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            quadrature: config.quadrature,
            limit: config.limit,
            min_angle_deg: config.geometry.min_angle_deg,
            split_angle_deg: config.geometry.split_angle_deg,
            poisson_range: config.table.poisson_range,
            evaluator,
        })
    }

    /// Axes of a table class with the given node counts
    ///
    /// Coincident tables span `x2 ∈ [0, 0.5]`, `y2 ∈ [0.5 tan θmin, √3/2]` and ν; edge
    /// tables span the fold angle `φ ∈ [θmin, π]` and ν.
    pub fn axes(&self, class: SingularClass, sizes: &[usize]) -> Result<Vec<Axis>> {
        if sizes.len() != class.dimensions() {
            return Err(NearfieldError::invalid(format!(
                "{} table needs {} node counts, got {}",
                class,
                class.dimensions(),
                sizes.len()
            )));
        }
        let [nu_lo, nu_hi] = self.poisson_range;
        let theta = self.min_angle_deg.to_radians();
        match class {
            SingularClass::Coincident => Ok(vec![
                Axis::new("x2", 0.0, 0.5, sizes[0])?,
                Axis::new(
                    "y2",
                    0.5 * theta.tan(),
                    0.75f64.sqrt() + COINCIDENT_Y2_MARGIN,
                    sizes[1],
                )?,
                Axis::new("nu", nu_lo, nu_hi, sizes[2])?,
            ]),
            SingularClass::EdgeAdjacent => Ok(vec![
                Axis::new("phi", theta, std::f64::consts::PI, sizes[0])?,
                Axis::new("nu", nu_lo, nu_hi, sizes[1])?,
            ]),
        }
    }

    /// Singular integral of the standard configuration at table coordinates `point`
    pub fn node_value(
        &self,
        kernel: KernelKind,
        class: SingularClass,
        point: &[f64],
    ) -> Result<StandardValue> {
        match (class, point) {
            (SingularClass::Coincident, &[x2, y2, nu]) => coincident_standard_value(
                kernel,
                x2,
                y2,
                nu,
                &self.quadrature,
                &self.limit,
                self.evaluator,
            ),
            (SingularClass::EdgeAdjacent, &[phi, nu]) => edge_standard_value(
                kernel,
                phi,
                nu,
                self.split_angle_deg,
                &self.quadrature,
                &self.limit,
                self.evaluator,
            ),
            _ => Err(NearfieldError::invalid(format!(
                "{} node needs {} coordinates, got {}",
                class,
                class.dimensions(),
                point.len()
            ))),
        }
    }

    /// Build a complete table
    pub fn build(
        &self,
        kernel: KernelKind,
        class: SingularClass,
        sizes: &[usize],
    ) -> Result<InterpolationTable> {
        let axes = self.axes(class, sizes)?;
        let grid: usize = axes.iter().map(Axis::len).product();
        log::info!(
            "Building {} {} table: {:?} nodes ({} total)",
            kernel,
            class,
            sizes,
            grid
        );
        let start = Instant::now();

        let nodes: Vec<usize> = (0..grid).collect();
        let node_values = parallel_try_map(&nodes, |&node| {
            let point = node_point(&axes, node);
            let value = self.node_value(kernel, class, &point)?;
            log::debug!("  node {}/{} at {:?} done", node + 1, grid, point);
            Ok::<_, NearfieldError>(value)
        })?;

        let mut values = Array3::zeros((grid, 81, 2));
        let mut diverged = 0;
        for (node, value) in node_values.iter().enumerate() {
            if value.status == LimitStatus::Diverged {
                diverged += 1;
            }
            for e in 0..81 {
                values[[node, e, 0]] = value.finite[e];
                values[[node, e, 1]] = value.log_coefficient[e];
            }
        }
        if diverged > 0 {
            log::warn!(
                "{} of {} {} {} nodes did not converge to tolerance {:.1e}",
                diverged,
                grid,
                kernel,
                class,
                self.limit.tolerance
            );
        }
        log::info!(
            "Built {} {} table in {:.2?}",
            kernel,
            class,
            start.elapsed()
        );

        let meta = TableMeta {
            min_angle_deg: self.min_angle_deg,
            split_angle_deg: self.split_angle_deg,
            tolerance: self.limit.tolerance,
            eps_start: self.limit.eps_start,
            eps_steps: self.limit.eps_steps,
            quadrature: self.quadrature,
            diverged_nodes: diverged,
            version: crate::VERSION.to_string(),
        };
        InterpolationTable::new(kernel, class, axes, meta, values)
    }
}

/// Build a table with the node counts and evaluator of `config`
pub fn build_table(
    kernel: KernelKind,
    class: SingularClass,
    config: &NearfieldConfig,
) -> Result<InterpolationTable> {
    let evaluator = config.cpu_evaluator()?;
    TableBuilder::new(config, &evaluator)?.build(kernel, class, &config.table.nodes(class))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::evaluator::CpuEvaluator;

    fn small_config() -> NearfieldConfig {
        let mut config = NearfieldConfig::default();
        config.quadrature = QuadratureSettings::uniform(5);
        config.limit = LimitSettings {
            eps_start: 0.02,
            eps_steps: 3,
            tolerance: 5e-2,
            log_terms: None,
        };
        config
    }

    #[test]
    fn test_axes_bounds() {
        let config = NearfieldConfig::default();
        let evaluator = CpuEvaluator::default();
        let builder = TableBuilder::new(&config, &evaluator).unwrap();

        let axes = builder.axes(SingularClass::Coincident, &[3, 4, 2]).unwrap();
        assert_eq!(axes[1].lo(), 0.5 * 20f64.to_radians().tan());
        assert!(axes[1].hi() > 0.75f64.sqrt());
        assert_eq!((axes[2].lo(), axes[2].hi()), (0.0, 0.5));

        let axes = builder.axes(SingularClass::EdgeAdjacent, &[5, 2]).unwrap();
        assert_eq!(axes[0].hi(), std::f64::consts::PI);
        assert_eq!(axes[1].len(), 2);
        // one nu node cannot cover the default range
        assert!(builder.axes(SingularClass::EdgeAdjacent, &[5, 1]).is_err());

        assert!(builder.axes(SingularClass::EdgeAdjacent, &[5, 1, 2]).is_err());
    }

    #[test]
    fn test_build_tiny_edge_table() {
        let mut config = small_config();
        config.table.poisson_range = [0.25, 0.25];
        let evaluator = CpuEvaluator::default();
        let builder = TableBuilder::new(&config, &evaluator).unwrap();
        let table = builder
            .build(KernelKind::U, SingularClass::EdgeAdjacent, &[2, 1])
            .unwrap();

        assert_eq!(table.grid_len(), 2);
        assert_eq!(table.meta().eps_steps, 3);
        let direct = builder
            .node_value(KernelKind::U, SingularClass::EdgeAdjacent, &table.node_point(1))
            .unwrap();
        let stored = table.node_value(1);
        for e in 0..81 {
            assert_eq!(stored.finite[e], direct.finite[e]);
        }
    }
}
