//! Near-field assembly tests on a small folded mesh
//!
//! The mesh is a unit square in the z = 0 plane (two triangles) with a second square
//! folded up along x = 1 (two more triangles). Every pair is in the near field:
//! 4 coincident, 6 edge-adjacent, 4 vertex-adjacent and 2 separate pairs.

use std::sync::Arc;

use math_audio_elastic_bem::core::assembly::{
    DenseIntegralOp, NearfieldAssembler, TableSet, ValueSource, dof_index,
};
use math_audio_elastic_bem::core::error::NearfieldError;
use math_audio_elastic_bem::core::integration::SingularClass;
use math_audio_elastic_bem::core::io::native::{NearfieldConfig, load_config};
use math_audio_elastic_bem::core::kernels::KernelKind;
use math_audio_elastic_bem::core::table::{
    Axis, InterpolationTable, TableMeta, configured_table_path, save_table,
};
use math_audio_elastic_bem::core::types::{ElasticityParams, Point, Triangle, tensor_index};
use ndarray::{Array1, Array3};

const CONFIG_TOML: &str = r#"
description = "folded square"

[material]
shear_modulus = 2.0
poisson_ratio = 0.25

[quadrature]
vertex_order = 5
near_order = 4
far_order = 3

[quadrature.coincident]
outer_radial = 4
outer_along = 4
inner_angular = 4
inner_radial = 4

[quadrature.edge]
outer_radial = 4
outer_along = 4
inner_angular = 4
inner_radial = 4

[limit]
eps_start = 0.02
eps_steps = 3
tolerance = 0.5

[geometry]
min_angle_deg = 20.0
nearfield_threshold = 3.0

[table]
coincident_nodes = [2, 2, 2]
edge_nodes = [3, 2]
poisson_range = [0.0, 0.5]
"#;

fn folded_mesh() -> (Vec<Point>, Vec<Triangle>) {
    let points = vec![
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [1.0, 1.0, 0.0],
        [0.0, 1.0, 0.0],
        [1.8, 0.0, 0.6],
        [1.8, 1.0, 0.6],
    ];
    let tris = vec![[0, 1, 2], [0, 2, 3], [1, 4, 5], [1, 5, 2]];
    (points, tris)
}

fn folded_config() -> NearfieldConfig {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nearfield.toml");
    std::fs::write(&path, CONFIG_TOML).unwrap();
    load_config(&path).unwrap()
}

fn assembler(kernel: KernelKind, config: &NearfieldConfig, tables: TableSet) -> NearfieldAssembler {
    let (points, tris) = folded_mesh();
    NearfieldAssembler::new(points, tris, kernel, config.elasticity().unwrap(), config, tables)
        .unwrap()
}

/// Table holding the same block at every node
fn constant_table(
    kernel: KernelKind,
    class: SingularClass,
    nu: [f64; 2],
    config: &NearfieldConfig,
) -> InterpolationTable {
    let theta = config.geometry.min_angle_deg.to_radians();
    let nu_nodes = if nu[0] < nu[1] { 2 } else { 1 };
    let axes = match class {
        SingularClass::Coincident => vec![
            Axis::new("x2", 0.0, 0.5, 2).unwrap(),
            Axis::new("y2", 0.5 * theta.tan(), 0.9, 2).unwrap(),
            Axis::new("nu", nu[0], nu[1], nu_nodes).unwrap(),
        ],
        SingularClass::EdgeAdjacent => vec![
            Axis::new("phi", theta, std::f64::consts::PI, 3).unwrap(),
            Axis::new("nu", nu[0], nu[1], nu_nodes).unwrap(),
        ],
    };
    let grid: usize = axes.iter().map(Axis::len).product();
    let values = Array3::from_shape_fn((grid, 81, 2), |(_, e, part)| {
        if part == 0 { 1e-3 * (e % 7) as f64 } else { 0.0 }
    });
    let meta = TableMeta {
        min_angle_deg: config.geometry.min_angle_deg,
        split_angle_deg: config.geometry.split_angle_deg,
        tolerance: config.limit.tolerance,
        eps_start: config.limit.eps_start,
        eps_steps: config.limit.eps_steps,
        quadrature: config.quadrature,
        diverged_nodes: 0,
        version: String::new(),
    };
    InterpolationTable::new(kernel, class, axes, meta, values).unwrap()
}

fn constant_tables(kernel: KernelKind, nu: [f64; 2], config: &NearfieldConfig) -> TableSet {
    TableSet {
        coincident: Some(Arc::new(constant_table(kernel, SingularClass::Coincident, nu, config))),
        edge: Some(Arc::new(constant_table(kernel, SingularClass::EdgeAdjacent, nu, config))),
    }
}

#[test]
fn test_config_file_is_applied() {
    let config = folded_config();
    assert_eq!(config.description, "folded square");
    assert_eq!(config.quadrature.coincident, config.quadrature.edge);
    assert_eq!(config.quadrature.far_order, 3);
    assert_eq!(config.limit.eps_steps, 3);
    assert_eq!(config.table.nodes(SingularClass::Coincident), vec![2, 2, 2]);
    // sections left out keep their defaults
    assert_eq!(config.geometry.split_angle_deg, 15.0);
    assert_eq!(config.evaluator, NearfieldConfig::default().evaluator);
    let params = config.elasticity().unwrap();
    assert_eq!(params.shear_modulus, 2.0);
}

#[test]
fn test_direct_assembly_counts() {
    let config = folded_config();
    let asm = assembler(KernelKind::T, &config, TableSet::empty());
    let (matrix, stats) = asm.assemble().unwrap();

    assert_eq!(stats.pairs, 16);
    assert_eq!(stats.coincident, 4);
    assert_eq!(stats.edge_adjacent, 6);
    assert_eq!(stats.vertex_adjacent, 4);
    assert_eq!(stats.separate, 2);
    assert_eq!(stats.direct, 10);
    assert_eq!(stats.table_lookups, 0);
    assert_eq!(stats.fallbacks, 0);
    assert_eq!(matrix.num_rows, 36);
    assert_eq!(matrix.nnz(), 16 * 81);
    assert!(matrix.values.iter().all(|v| v.is_finite()));
}

#[test]
fn test_tables_serve_singular_pairs() {
    let config = folded_config();
    let tables = constant_tables(KernelKind::U, [0.0, 0.5], &config);
    let asm = assembler(KernelKind::U, &config, tables);
    let blocks = asm.accurate_blocks().unwrap();

    let count = |source: ValueSource| blocks.iter().filter(|b| b.3.source == source).count();
    assert_eq!(count(ValueSource::Table), 10);
    assert_eq!(count(ValueSource::VertexRule), 4);
    assert_eq!(count(ValueSource::Quadrature), 2);
    assert_eq!(count(ValueSource::Direct), 0);

    let (_, stats) = asm.assemble().unwrap();
    assert_eq!(stats.table_lookups, 10);
    assert_eq!(stats.direct, 0);
}

#[test]
fn test_tables_loaded_from_directory() {
    let config = folded_config();
    let dir = tempfile::tempdir().unwrap();
    for class in [SingularClass::Coincident, SingularClass::EdgeAdjacent] {
        // node counts match the configured file names
        let table = constant_table(KernelKind::A, class, [0.0, 0.5], &config);
        save_table(&table, configured_table_path(dir.path(), KernelKind::A, class, &config))
            .unwrap();
    }

    let tables = TableSet::load_dir(dir.path(), KernelKind::A, &config).unwrap();
    assert!(tables.coincident.is_some());
    assert!(tables.edge.is_some());
    let (_, stats) = assembler(KernelKind::A, &config, tables).assemble().unwrap();
    assert_eq!(stats.table_lookups, 10);

    // tables of another kernel are not picked up
    let none = TableSet::load_dir(dir.path(), KernelKind::H, &config).unwrap();
    assert!(none.coincident.is_none() && none.edge.is_none());
}

#[test]
fn test_out_of_range_lookups_fall_back() {
    let config = folded_config();
    let (reference, _) = assembler(KernelKind::U, &config, TableSet::empty())
        .assemble()
        .unwrap();

    // the material's ν = 0.25 lies outside [0, 0.1]
    let tables = constant_tables(KernelKind::U, [0.0, 0.1], &config);
    let (matrix, stats) = assembler(KernelKind::U, &config, tables).assemble().unwrap();
    assert_eq!(stats.fallbacks, 10);
    assert_eq!(stats.table_lookups, 0);
    assert_eq!(stats.direct, 0);
    assert_eq!(matrix.to_dense(), reference.to_dense());
}

#[test]
fn test_dense_operator_holds_accurate_near_blocks() {
    let config = folded_config();
    let asm = assembler(KernelKind::U, &config, TableSet::empty());
    let op = DenseIntegralOp::build(&asm).unwrap();
    assert_eq!(op.num_dofs(), 36);

    for (i, j, _, outcome) in asm.accurate_blocks().unwrap() {
        let scale = outcome.values.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
        for a in 0..3 {
            for c in 0..3 {
                for b in 0..3 {
                    for d in 0..3 {
                        let dense = op.matrix[[dof_index(i, a, c), dof_index(j, b, d)]];
                        let accurate = outcome.values[tensor_index(a, c, b, d)];
                        assert!(
                            (dense - accurate).abs() <= 1e-12 * scale,
                            "pair ({}, {}): {} vs {}",
                            i,
                            j,
                            dense,
                            accurate
                        );
                    }
                }
            }
        }
    }

    let (correction, stats) = asm.assemble().unwrap();
    assert_eq!(op.stats, stats);
    let x = Array1::from_shape_fn(36, |k| (k as f64 * 0.3).cos());
    assert!(op.dot(&x).unwrap().iter().all(|v| v.is_finite()));
    assert_eq!(correction.matvec(&x).unwrap().len(), 36);
}

#[test]
fn test_degenerate_triangle_surfaces() {
    let config = folded_config();
    let points = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.5, 0.05, 0.0]];
    let asm = NearfieldAssembler::new(
        points,
        vec![[0, 1, 2]],
        KernelKind::U,
        ElasticityParams::default(),
        &config,
        TableSet::empty(),
    )
    .unwrap();
    let err = asm.assemble().unwrap_err();
    assert!(matches!(err, NearfieldError::DegenerateTriangle { .. }));
    assert!(err.is_user_visible());
}

#[test]
fn test_repeated_index_surfaces() {
    let config = folded_config();
    let points = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
    let asm = NearfieldAssembler::new(
        points,
        vec![[0, 1, 2], [0, 0, 1]],
        KernelKind::U,
        ElasticityParams::default(),
        &config,
        TableSet::empty(),
    )
    .unwrap();
    let err = asm.pairs().unwrap_err();
    assert!(matches!(err, NearfieldError::ClassificationInconsistency { .. }));
}
