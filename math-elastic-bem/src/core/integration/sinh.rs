//! Node-concentrating 1D rules on [0, 1]
//!
//! Regularized integrands are smooth but vary on the scale of the regularization distance
//! near the (displaced) singular point. These rules put Gauss nodes where that happens.

use super::gauss::{gauss_legendre, gauss_legendre_unit};
use crate::core::constants::NEAR_PANEL_WIDTH;

/// A 1D rule as (nodes, weights)
pub type Rule1d = (Vec<f64>, Vec<f64>);

/// Sinh-transformed Gauss rule on [0, 1] concentrated at `a` for a singularity at distance `b`
///
/// Johnston and Elliott transformation: `t = A + B sinh(μ u − η)` with `A = 2a − 1`,
/// `B = 2b`, mapped back to [0, 1].
pub fn sinh_rule(order: usize, a: f64, b: f64) -> Rule1d {
    let (x, w) = gauss_legendre(order);
    let big_a = 2.0 * a - 1.0;
    let big_b = 2.0 * b;
    let s1 = ((1.0 + big_a) / big_b).asinh();
    let s2 = ((1.0 - big_a) / big_b).asinh();
    let mu = 0.5 * (s1 + s2);
    let eta = 0.5 * (s1 - s2);

    let mut nodes = Vec::with_capacity(order);
    let mut weights = Vec::with_capacity(order);
    for (&u, &wu) in x.iter().zip(&w) {
        let arg = mu * u - eta;
        let t = big_a + big_b * arg.sinh();
        let jac = big_b * mu * arg.cosh();
        nodes.push(0.5 * (t + 1.0));
        weights.push(0.5 * wu * jac);
    }
    (nodes, weights)
}

/// Gauss rule on [0, 1] graded towards 0 by `t = u^power`
pub fn graded_rule(order: usize, power: i32) -> Rule1d {
    let (x, w) = gauss_legendre_unit(order);
    let p = power as f64;
    (
        x.iter().map(|&u| u.powi(power)).collect(),
        x.iter()
            .zip(&w)
            .map(|(&u, &wu)| wu * p * u.powi(power - 1))
            .collect(),
    )
}

/// Near-singular rule: a sinh panel around `a` and plain Gauss panels on the rest
///
/// The sinh panel has half-width [`NEAR_PANEL_WIDTH`]. A distance `b >= 1` is smooth enough
/// for a single Gauss rule.
pub fn near_singular_rule(order: usize, a: f64, b: f64) -> Rule1d {
    if b >= 1.0 {
        return gauss_legendre_unit(order);
    }
    let a = a.clamp(0.0, 1.0);
    let lo = (a - NEAR_PANEL_WIDTH).max(0.0);
    let hi = (a + NEAR_PANEL_WIDTH).min(1.0);
    let len = hi - lo;

    let (px, pw) = if b > 0.0 && b < len {
        sinh_rule(order, (a - lo) / len, b / len)
    } else if b > 0.0 {
        gauss_legendre_unit(order)
    } else {
        return graded_at(order, a);
    };

    let mut nodes: Vec<f64> = px.iter().map(|&t| lo + len * t).collect();
    let mut weights: Vec<f64> = pw.iter().map(|&w| len * w).collect();
    for (p, q) in [(0.0, lo), (hi, 1.0)] {
        append_panel(&mut nodes, &mut weights, gauss_legendre_unit(order), p, q);
    }
    (nodes, weights)
}

/// Two graded panels meeting at a point singularity `a` (b = 0)
fn graded_at(order: usize, a: f64) -> Rule1d {
    let mut nodes = Vec::new();
    let mut weights = Vec::new();
    let (gx, gw) = graded_rule(order, 3);
    if a > 0.0 {
        for (&t, &w) in gx.iter().zip(&gw) {
            nodes.push(a - a * t);
            weights.push(a * w);
        }
    }
    if a < 1.0 {
        let len = 1.0 - a;
        for (&t, &w) in gx.iter().zip(&gw) {
            nodes.push(a + len * t);
            weights.push(len * w);
        }
    }
    (nodes, weights)
}

fn append_panel(nodes: &mut Vec<f64>, weights: &mut Vec<f64>, rule: Rule1d, p: f64, q: f64) {
    let len = q - p;
    if len <= 1e-14 {
        return;
    }
    let (x, w) = rule;
    nodes.extend(x.iter().map(|&t| p + len * t));
    weights.extend(w.iter().map(|&wt| len * wt));
}

/// Rule on [0, 1] with near-singular behaviour at both ends
///
/// `b0` and `b1` are the relative distances of the singularities from 0 and 1. Each half
/// gets a sinh rule when its singularity is close and plain Gauss otherwise.
pub fn end_graded_rule(order: usize, b0: f64, b1: f64) -> Rule1d {
    let mut nodes = Vec::with_capacity(2 * order);
    let mut weights = Vec::with_capacity(2 * order);
    for (from_start, b) in [(true, b0), (false, b1)] {
        let (x, w) = if b < 1.0 && b > 0.0 {
            sinh_rule(order, 0.0, b)
        } else {
            gauss_legendre_unit(order)
        };
        for (&t, &wt) in x.iter().zip(&w) {
            nodes.push(if from_start { 0.5 * t } else { 1.0 - 0.5 * t });
            weights.push(0.5 * wt);
        }
    }
    (nodes, weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn integrate(rule: &Rule1d, f: impl Fn(f64) -> f64) -> f64 {
        rule.0.iter().zip(&rule.1).map(|(&x, &w)| w * f(x)).sum()
    }

    #[test]
    fn test_sinh_near_singular() {
        let e: f64 = 1e-4;
        let rule = sinh_rule(20, 0.0, e);
        let exact = ((1.0 + (1.0 + e * e).sqrt()) / e).ln();
        let approx = integrate(&rule, |t| 1.0 / (t * t + e * e).sqrt());
        assert_relative_eq!(approx, exact, max_relative = 1e-6);
    }

    #[test]
    fn test_graded_log() {
        let rule = graded_rule(8, 3);
        let approx = integrate(&rule, |t| -t.ln());
        assert_relative_eq!(approx, 1.0, max_relative = 1e-4);
    }

    #[test]
    fn test_near_rule_weights_cover_unit_interval() {
        for (a, b) in [(0.0, 1e-3), (0.4, 1e-2), (1.0, 0.3), (0.5, 0.0), (0.3, 2.0)] {
            let rule = near_singular_rule(10, a, b);
            let total: f64 = rule.1.iter().sum();
            assert_relative_eq!(total, 1.0, max_relative = 1e-12);
            assert!(rule.0.iter().all(|&x| (0.0..=1.0).contains(&x)));
        }
    }

    #[test]
    fn test_near_rule_interior_peak() {
        let a = 0.37;
        let e: f64 = 1e-3;
        let rule = near_singular_rule(16, a, e);
        let exact = ((1.0 - a) / e).asinh() + (a / e).asinh();
        let approx = integrate(&rule, |t| 1.0 / ((t - a) * (t - a) + e * e).sqrt());
        assert_relative_eq!(approx, exact, max_relative = 1e-6);
    }

    #[test]
    fn test_end_graded_rule() {
        let rule = end_graded_rule(12, 1e-3, 5.0);
        let total: f64 = rule.1.iter().sum();
        assert_relative_eq!(total, 1.0, max_relative = 1e-12);
    }
}
