//! Table lookup for singular and vertex-adjacent pairs
//!
//! Lookups take the pair in canonical local order (see [`TrianglePair::canonical_obs`])
//! and return the tensor in that order; [`lookup`] does the canonicalization and maps the
//! result back to the caller's vertex orders.

use super::interp::InterpolationTable;
use crate::core::error::{NearfieldError, Result};
use crate::core::evaluator::{PairEvaluator, row_tensor};
use crate::core::integration::singular::{compose_edge, vertex_adjacent_batch};
use crate::core::integration::{SingularClass, permutation_basis, sub_basis};
use crate::core::kernels::KernelKind;
use crate::core::mesh::classify::{AdjacencyKind, TrianglePair};
use crate::core::mesh::standardize::{
    StandardTransform, check_min_angle, standardize, standardize_edge, transform_from_standard,
};
use crate::core::types::{ElasticityParams, Point, Tensor81, triangle_points};

/// Settings shared by every lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookupSettings {
    /// Smallest accepted interior angle in degrees
    pub min_angle_deg: f64,
    /// Gauss order of the vertex-adjacent rule
    pub vertex_order: usize,
}

/// Coincident lookup of a triangle
pub fn lookup_coincident(
    table: &InterpolationTable,
    tri: &[Point; 3],
    params: &ElasticityParams,
    min_angle_deg: f64,
) -> Result<Tensor81> {
    expect_class(table, SingularClass::Coincident)?;
    let std = standardize(tri, min_angle_deg.max(table.meta().min_angle_deg))?;
    let (x2, y2) = std.apex();
    let value = table.interpolate(&[x2, y2, params.poisson_ratio])?;
    Ok(transform_from_standard(
        &value.at_scale(std.scale),
        table.kernel(),
        params.shear_modulus,
        &StandardTransform::coincident(&std),
    ))
}

/// Edge-adjacent lookup of a canonical pair
///
/// The core is interpolated at the fold angle of the pair and recombined with the eight
/// outer sub-pairs, split at the angle the table was built with.
pub fn lookup_edge(
    table: &InterpolationTable,
    obs: &[Point; 3],
    src: &[Point; 3],
    params: &ElasticityParams,
    settings: &LookupSettings,
    evaluator: &dyn PairEvaluator,
) -> Result<Tensor81> {
    expect_class(table, SingularClass::EdgeAdjacent)?;
    let min_angle = settings.min_angle_deg.max(table.meta().min_angle_deg);
    check_min_angle(obs, min_angle)?;
    check_min_angle(src, min_angle)?;

    let std = standardize_edge(obs, &src[2])?;
    let core = table.interpolate(&[std.fold_angle, params.poisson_ratio])?;
    compose_edge(
        table.kernel(),
        obs,
        src,
        params,
        &core,
        &std,
        table.meta().split_angle_deg,
        settings.vertex_order,
        evaluator,
    )
}

/// Vertex-adjacent pair, returned in the caller's vertex orders
///
/// There is nothing to tabulate: the canonical pair is integrated with the vertex rule and
/// relabelled back.
pub fn lookup_vertex(
    kernel: KernelKind,
    pair: &TrianglePair,
    points: &[Point],
    params: &ElasticityParams,
    order: usize,
    evaluator: &dyn PairEvaluator,
) -> Result<Tensor81> {
    if pair.kind != AdjacencyKind::VertexAdjacent {
        return Err(NearfieldError::invalid(format!(
            "vertex lookup of a {:?} pair",
            pair.kind
        )));
    }
    let values = vertex_adjacent_batch(
        kernel,
        points,
        &[(pair.canonical_obs(), pair.canonical_src())],
        params,
        order,
        evaluator,
    )?;
    let canonical = row_tensor(&values, 0)?;
    Ok(sub_basis(
        &canonical,
        &permutation_basis(pair.correspondence.obs_perm()),
        &permutation_basis(pair.correspondence.src_perm()),
    ))
}

/// Table lookup of a singular pair, returned in the caller's vertex orders
pub fn lookup(
    table: &InterpolationTable,
    pair: &TrianglePair,
    points: &[Point],
    params: &ElasticityParams,
    settings: &LookupSettings,
    evaluator: &dyn PairEvaluator,
) -> Result<Tensor81> {
    let obs = triangle_points(points, &pair.canonical_obs())?;
    let src = triangle_points(points, &pair.canonical_src())?;
    let canonical = match SingularClass::from_adjacency(pair.kind) {
        Some(SingularClass::Coincident) => {
            lookup_coincident(table, &obs, params, settings.min_angle_deg)?
        }
        Some(SingularClass::EdgeAdjacent) => {
            lookup_edge(table, &obs, &src, params, settings, evaluator)?
        }
        None => {
            return Err(NearfieldError::invalid(format!(
                "no table covers {:?} pairs",
                pair.kind
            )));
        }
    };
    Ok(pair
        .correspondence
        .remap_to_original(&canonical, table.kernel()))
}

fn expect_class(table: &InterpolationTable, class: SingularClass) -> Result<()> {
    if table.class() != class {
        return Err(NearfieldError::invalid(format!(
            "{} lookup on a {} table",
            class,
            table.class()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::evaluator::{CpuEvaluator, Regularization};
    use crate::core::integration::QuadratureSettings;
    use crate::core::integration::rules::vertex_rule;
    use crate::core::mesh::classify::classify;
    use crate::core::table::interp::{Axis, TableMeta};
    use crate::core::types::tensor_index;
    use approx::assert_relative_eq;
    use ndarray::Array3;

    fn constant_table(class: SingularClass) -> InterpolationTable {
        let axes = match class {
            SingularClass::Coincident => vec![
                Axis::new("x2", 0.0, 0.5, 2).unwrap(),
                Axis::new("y2", 0.2, 0.9, 2).unwrap(),
                Axis::new("nu", 0.0, 0.5, 2).unwrap(),
            ],
            SingularClass::EdgeAdjacent => vec![
                Axis::new("phi", 0.35, std::f64::consts::PI, 2).unwrap(),
                Axis::new("nu", 0.0, 0.5, 2).unwrap(),
            ],
        };
        let grid: usize = axes.iter().map(Axis::len).product();
        let mut values = Array3::zeros((grid, 81, 2));
        for node in 0..grid {
            values[[node, tensor_index(0, 0, 0, 0), 0]] = 1.0;
        }
        let meta = TableMeta {
            min_angle_deg: 20.0,
            split_angle_deg: 15.0,
            tolerance: 1e-3,
            eps_start: 0.01,
            eps_steps: 4,
            quadrature: QuadratureSettings::default(),
            diverged_nodes: 0,
            version: String::new(),
        };
        InterpolationTable::new(KernelKind::U, class, axes, meta, values).unwrap()
    }

    #[test]
    fn test_coincident_scaling() {
        let table = constant_table(SingularClass::Coincident);
        let params = ElasticityParams::new(2.0, 0.25).unwrap();
        let tri = [[0.0, 0.0, 0.0], [3.0, 0.0, 0.0], [1.0, 2.0, 0.0]];
        let out = lookup_coincident(&table, &tri, &params, 20.0).unwrap();
        // U: s^3 / μ, standard vertex 0 is the start of the longest edge
        let std = standardize(&tri, 20.0).unwrap();
        let a = std.labels[0];
        assert_relative_eq!(
            out[tensor_index(a, 0, a, 0)],
            std.scale.powi(3) / 2.0,
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_out_of_range_poisson() {
        let table = constant_table(SingularClass::Coincident);
        let params = ElasticityParams::new(1.0, -0.2).unwrap();
        let tri = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.4, 0.8, 0.0]];
        let err = lookup_coincident(&table, &tri, &params, 20.0).unwrap_err();
        assert!(err.is_table_range());
    }

    #[test]
    fn test_degenerate_triangle_surfaces() {
        let table = constant_table(SingularClass::Coincident);
        let params = ElasticityParams::default();
        let tri = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.5, 0.05, 0.0]];
        let err = lookup_coincident(&table, &tri, &params, 20.0).unwrap_err();
        assert!(matches!(err, NearfieldError::DegenerateTriangle { .. }));
    }

    #[test]
    fn test_wrong_table_class() {
        let table = constant_table(SingularClass::EdgeAdjacent);
        let tri = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.4, 0.8, 0.0]];
        assert!(lookup_coincident(&table, &tri, &ElasticityParams::default(), 20.0).is_err());
    }

    #[test]
    fn test_vertex_lookup_relabels() {
        let points = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [-1.0, 0.2, 0.3],
            [-0.2, -1.0, 0.1],
        ];
        // shared vertex 0 sits at local 1 of obs and local 2 of src
        let pair = classify(&[2, 0, 1], &[3, 4, 0]).unwrap();
        assert_eq!(pair.kind, AdjacencyKind::VertexAdjacent);
        let params = ElasticityParams::default();
        let evaluator = CpuEvaluator::default();
        let out = lookup_vertex(KernelKind::U, &pair, &points, &params, 6, &evaluator).unwrap();

        let canonical = evaluator
            .evaluate(
                KernelKind::U,
                &vertex_rule(6),
                &points,
                &[(pair.canonical_obs(), pair.canonical_src())],
                &params,
                Regularization::NONE,
            )
            .unwrap();
        let canonical = row_tensor(&canonical, 0).unwrap();
        // canonical local 0 is the shared vertex: obs local 1, src local 2
        assert_eq!(
            out[tensor_index(1, 2, 2, 1)],
            canonical[tensor_index(0, 2, 0, 1)]
        );
    }
}
