//! Gauss-Legendre quadrature rules
//!
//! Nodes and weights of arbitrary order, computed by Newton iteration on the Legendre
//! recurrence. Singular rules need orders well beyond the usual tabulated ones.

/// Highest order accepted by [`gauss_legendre`]; rule settings are validated against it
pub const MAX_GAUSS_ORDER: usize = 256;

/// Gauss-Legendre abscissas and weights
///
/// Returns (points, weights) where points are in [-1, 1], ascending.
pub fn gauss_legendre(order: usize) -> (Vec<f64>, Vec<f64>) {
    assert!(
        (1..=MAX_GAUSS_ORDER).contains(&order),
        "Gauss order {} outside 1..={}",
        order,
        MAX_GAUSS_ORDER
    );

    let n = order;
    let mut points = vec![0.0; n];
    let mut weights = vec![0.0; n];
    for i in 0..n.div_ceil(2) {
        let mut x = (std::f64::consts::PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        for _ in 0..100 {
            let (p, p_prev) = legendre_pair(n, x);
            let dp = n as f64 * (x * p - p_prev) / (x * x - 1.0);
            let dx = p / dp;
            x -= dx;
            if dx.abs() < 1e-15 {
                break;
            }
        }
        let (p, p_prev) = legendre_pair(n, x);
        let dp = n as f64 * (x * p - p_prev) / (x * x - 1.0);
        let w = 2.0 / ((1.0 - x * x) * dp * dp);
        points[i] = -x;
        points[n - 1 - i] = x;
        weights[i] = w;
        weights[n - 1 - i] = w;
    }
    (points, weights)
}

/// `(P_n(x), P_{n-1}(x))` by the three-term recurrence
fn legendre_pair(n: usize, x: f64) -> (f64, f64) {
    let mut p0 = 1.0;
    let mut p1 = x;
    for k in 2..=n {
        let k = k as f64;
        let p2 = ((2.0 * k - 1.0) * x * p1 - (k - 1.0) * p0) / k;
        p0 = p1;
        p1 = p2;
    }
    (p1, p0)
}

/// Gauss-Legendre rule mapped to [0, 1]
pub fn gauss_legendre_unit(order: usize) -> (Vec<f64>, Vec<f64>) {
    let (x, w) = gauss_legendre(order);
    (
        x.iter().map(|&xi| 0.5 * (xi + 1.0)).collect(),
        w.iter().map(|&wi| 0.5 * wi).collect(),
    )
}

/// `(xi, eta, weight)` on the reference triangle
///
/// Collapsed (Duffy) tensor product of Gauss rules on the reference triangle with vertices
/// (0,0), (1,0), (0,1). Weights sum to 0.5 (the area of the reference triangle).
pub fn triangle_quadrature(order: usize) -> Vec<(f64, f64, f64)> {
    let (x, w) = gauss_legendre_unit(order);
    let mut result = Vec::with_capacity(order * order);
    for (&u, &wu) in x.iter().zip(&w) {
        for (&v, &wv) in x.iter().zip(&w) {
            result.push((u, v * (1.0 - u), wu * wv * (1.0 - u)));
        }
    }
    result
}
