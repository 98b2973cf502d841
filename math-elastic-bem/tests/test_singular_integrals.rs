//! Singular integration tests
//!
//! Test Cases:
//! 1. Extrapolation order on sequences with a known limit
//! 2. Coincident unit right triangle: finite for every kernel at ν = 0.25
//! 3. Coplanar edge-adjacent right triangles: weakly singular entries stable under
//!    refinement of the rule (orders 4 and 5 within 1.2 %)
//! 4. Sub-basis additivity of a split vertex-adjacent pair

use math_audio_elastic_bem::core::evaluator::{CpuEvaluator, row_tensor};
use math_audio_elastic_bem::core::integration::singular::{
    SingularClass, regularized_limit, vertex_adjacent_batch,
};
use math_audio_elastic_bem::core::integration::sub_basis::{
    add_sub_basis, basis_at_vertices, permutation_basis,
};
use math_audio_elastic_bem::core::integration::{
    LimitSettings, LimitStatus, LogTerms, QuadratureSettings, RuleOrders, extrapolate_scalar,
};
use math_audio_elastic_bem::core::kernels::KernelKind;
use math_audio_elastic_bem::core::mesh::{AdjacencyKind, classify};
use math_audio_elastic_bem::core::types::{ElasticityParams, Point, tensor_index};

const UNIT_TRIANGLE: [Point; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];

fn halving(start: f64, n: usize) -> Vec<f64> {
    (0..n).map(|k| start * 0.5f64.powi(k as i32)).collect()
}

fn max_abs(values: &[f64]) -> f64 {
    values.iter().fold(0.0f64, |acc, v| acc.max(v.abs()))
}

/// Error of the extrapolated limit of `f` from `n` samples starting at `start`
fn limit_error(
    f: impl Fn(f64) -> f64,
    exact: f64,
    start: f64,
    n: usize,
    log_terms: LogTerms,
) -> f64 {
    let eps = halving(start, n);
    let values: Vec<f64> = eps.iter().map(|&e| f(e)).collect();
    let result = extrapolate_scalar(&eps, &values, 1.0, log_terms).unwrap();
    (result.values[0] - exact).abs()
}

#[test]
fn test_extrapolation_order_without_log_terms() {
    // limit 1; three samples fit 1, ε, ε² so the error is O(ε³)
    let f = |e: f64| e.exp();
    let mut previous = limit_error(f, 1.0, 0.1, 3, LogTerms::Off);
    for start in [0.05, 0.025, 0.0125] {
        let error = limit_error(f, 1.0, start, 3, LogTerms::Off);
        let ratio = previous / error;
        println!("start {:.4}: error {:.3e}, ratio {:.2}", start, error, ratio);
        assert!((ratio - 8.0).abs() < 0.5, "ratio {}", ratio);
        previous = error;
    }
}

#[test]
fn test_extrapolation_order_with_log_terms() {
    // limit 3, log coefficient -0.3; four samples leave an O(ε²) error
    let f = |e: f64| 2.0 - 0.3 * e.ln() + e.exp() + 0.5 * e * e.ln();
    let mut previous = limit_error(f, 3.0, 0.1, 4, LogTerms::Full);
    for start in [0.05, 0.025, 0.0125] {
        let error = limit_error(f, 3.0, start, 4, LogTerms::Full);
        let ratio = previous / error;
        println!("start {:.4}: error {:.3e}, ratio {:.2}", start, error, ratio);
        assert!(ratio > 3.0, "ratio {}", ratio);
        previous = error;
    }

    let eps = halving(0.0125, 4);
    let values: Vec<f64> = eps.iter().map(|&e| f(e)).collect();
    let result = extrapolate_scalar(&eps, &values, 1e-2, LogTerms::Full).unwrap();
    assert!((result.log_coefficients[0] + 0.3).abs() < 1e-3);
}

#[test]
fn test_coincident_unit_triangle_is_finite() {
    let params = ElasticityParams::new(1.0, 0.25).unwrap();
    let evaluator = CpuEvaluator::default();
    let quadrature = QuadratureSettings::uniform(5);
    let limit = LimitSettings {
        eps_start: 0.02,
        eps_steps: 4,
        tolerance: 1e-2,
        log_terms: None,
    };

    for kernel in KernelKind::ALL {
        let result = regularized_limit(
            kernel,
            SingularClass::Coincident,
            &UNIT_TRIANGLE,
            &UNIT_TRIANGLE,
            &params,
            &quadrature,
            &limit,
            &evaluator,
        )
        .unwrap();
        println!(
            "{}: status {:?}, change {:.2e}",
            kernel, result.status, result.error_estimate
        );
        assert!(
            result.values.iter().all(|v| v.is_finite()),
            "{} finite part has non-finite entries",
            kernel
        );
        assert!(result.log_coefficients.iter().all(|v| v.is_finite()));
        assert!(max_abs(&result.values) > 0.0);
        if kernel == KernelKind::H {
            assert!(max_abs(&result.log_coefficients) > 0.0);
        } else {
            assert!(result.log_coefficients.iter().all(|v| *v == 0.0));
        }
    }
}

#[test]
fn test_coincident_displacement_converges() {
    let params = ElasticityParams::new(1.0, 0.25).unwrap();
    let result = regularized_limit(
        KernelKind::U,
        SingularClass::Coincident,
        &UNIT_TRIANGLE,
        &UNIT_TRIANGLE,
        &params,
        &QuadratureSettings::uniform(6),
        &LimitSettings::default(),
        &CpuEvaluator::default(),
    )
    .unwrap();
    assert_eq!(result.status, LimitStatus::Converged);
    // U is symmetric and positive on the diagonal
    for a in 0..3 {
        for i in 0..3 {
            assert!(result.values[tensor_index(a, i, a, i)] > 0.0);
        }
    }
}

#[test]
fn test_edge_weakly_singular_refinement() {
    let points = [
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, -1.0, 0.0],
    ];
    let pair = classify(&[0, 1, 2], &[1, 0, 3]).unwrap();
    assert_eq!(pair.kind, AdjacencyKind::EdgeAdjacent);
    assert_eq!(pair.canonical_obs(), [0, 1, 2]);
    assert_eq!(pair.canonical_src(), [1, 0, 3]);

    let obs = [points[0], points[1], points[2]];
    let src = [points[1], points[0], points[3]];
    let params = ElasticityParams::new(1.0, 0.25).unwrap();
    let evaluator = CpuEvaluator::default();
    let limit = LimitSettings::default();

    let finite_part = |order: usize| {
        let mut quadrature = QuadratureSettings::default();
        quadrature.edge = RuleOrders::uniform(order);
        regularized_limit(
            KernelKind::U,
            SingularClass::EdgeAdjacent,
            &obs,
            &src,
            &params,
            &quadrature,
            &limit,
            &evaluator,
        )
        .unwrap()
        .values
    };
    let coarse = finite_part(4);
    let fine = finite_part(5);

    for (a, b) in [(2, 2), (2, 0), (2, 1), (0, 2), (1, 2)] {
        for i in 0..3 {
            let e = tensor_index(a, i, b, i);
            let change = (coarse[e] - fine[e]).abs() / fine[e].abs();
            println!("basis ({}, {}) component {}: change {:.3e}", a, b, i, change);
            assert!(fine[e] > 0.0);
            assert!(change < 0.012, "basis ({}, {}) changed by {}", a, b, change);
        }
    }
}

#[test]
fn test_sub_basis_additivity() {
    let parent: [Point; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.2, 0.9, 0.1]];
    let mid = [0.6, 0.45, 0.05];
    let src: [Point; 3] = [[0.0, 0.0, 0.0], [-0.8, 0.3, 0.4], [-0.3, -0.9, 0.2]];
    // local ids: parent 0..3, midpoint 3, source apexes 4, 5
    let points = [parent[0], parent[1], parent[2], mid, src[1], src[2]];
    let params = ElasticityParams::new(1.0, 0.25).unwrap();
    let evaluator = CpuEvaluator::default();
    let identity = permutation_basis([0, 1, 2]);

    for kernel in [KernelKind::U, KernelKind::T] {
        let values = vertex_adjacent_batch(
            kernel,
            &points,
            &[([0, 1, 2], [0, 4, 5]), ([0, 1, 3], [0, 4, 5]), ([0, 3, 2], [0, 4, 5])],
            &params,
            8,
            &evaluator,
        )
        .unwrap();
        let whole = row_tensor(&values, 0).unwrap();

        let mut recombined = [0.0; 81];
        for (row, sub) in [[parent[0], parent[1], mid], [parent[0], mid, parent[2]]]
            .iter()
            .enumerate()
        {
            let basis = basis_at_vertices(&parent, sub);
            add_sub_basis(
                &mut recombined,
                &row_tensor(&values, row + 1).unwrap(),
                &basis,
                &identity,
            );
        }

        let scale = max_abs(&whole);
        let diff = whole
            .iter()
            .zip(&recombined)
            .fold(0.0f64, |acc, (w, r)| acc.max((w - r).abs()));
        println!("{}: relative difference {:.3e}", kernel, diff / scale);
        assert!(diff <= 1e-5 * scale);
    }
}
