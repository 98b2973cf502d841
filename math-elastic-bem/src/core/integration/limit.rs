//! Extrapolation of regularized integrals to zero regularization
//!
//! A regularized integral sampled at decreasing offsets follows
//!
//! ```text
//! v(ε) = F + B ln ε + c1 ε + c2 ε ln ε + c3 ε² + ...
//! ```
//!
//! With `t = ε / ε0` the first `m` samples determine the first `m` coefficients of the
//! basis exactly. Every kernel carries the `t^k ln t` products; only integrals that diverge
//! like `ln ε` add the bare `ln t` column, see [`LogTerms`]. Estimates built from a growing
//! number of samples form a Richardson-style sequence whose last two members measure
//! convergence.
//!
//! The per-request workflow is an explicit state machine, [`LimitEngine`]:
//! `Sampling -> Extrapolating -> Done(Converged | Diverged)`.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::core::constants::{DEFAULT_EPS_START, DEFAULT_EPS_STEPS, DEFAULT_LIMIT_TOL};
use crate::core::error::{NearfieldError, Result};
use crate::core::kernels::KernelKind;

/// Smallest scale used when judging convergence of entries that are all near zero
const TINY: f64 = 1e-300;

/// Pivots below this magnitude make the fit singular
const SINGULAR_PIVOT: f64 = 1e-300;

/// Outcome of an extrapolation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitStatus {
    /// The last two estimates agree to the tolerance
    Converged,
    /// The estimates did not settle; the result is the best (last) estimate
    Diverged,
}

/// Extrapolated finite parts and log coefficients
#[derive(Debug, Clone, PartialEq)]
pub struct LimitResult {
    /// Finite part `F` of every entry
    pub values: Vec<f64>,
    /// Coefficient `B` of `ln ε` of every entry
    pub log_coefficients: Vec<f64>,
    /// Largest entry change between the last two estimates, relative to `max |F|`
    pub error_estimate: f64,
    /// Convergence status
    pub status: LimitStatus,
    /// Number of samples used
    pub samples: usize,
}

impl LimitResult {
    /// Whether the extrapolation converged
    pub fn is_converged(&self) -> bool {
        self.status == LimitStatus::Converged
    }

    /// Rewrite the finite parts for `ε` measured in absolute length
    ///
    /// A relative offset `ε` corresponds to the absolute offset `ε h`, so
    /// `F_abs = F_rel - B ln h`.
    pub fn to_absolute(mut self, length: f64) -> Self {
        let ln_h = length.ln();
        for (v, b) in self.values.iter_mut().zip(&self.log_coefficients) {
            *v -= b * ln_h;
        }
        self
    }

    /// The divergence as an error value, if the extrapolation did not converge
    pub fn divergence(&self, tol: f64) -> Option<NearfieldError> {
        match self.status {
            LimitStatus::Converged => None,
            LimitStatus::Diverged => Some(NearfieldError::SingularityExtractionDivergence {
                max_change: self.error_estimate,
                tol,
            }),
        }
    }
}

/// Log columns of the extrapolation basis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTerms {
    /// Powers only, `[1, t, t², ...]`, for sequences known to be smooth in `ε`
    Off,
    /// `[1, t, t ln t, t², t² ln t, ...]`: a finite limit, `B = 0`
    Products,
    /// `[1, ln t, t, t ln t, t², ...]`: the `ln ε` coefficient `B` is fitted too
    Full,
}

/// Settings of the regularized sequence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LimitSettings {
    /// First (largest) relative offset
    #[serde(default = "default_eps_start")]
    pub eps_start: f64,
    /// Number of offsets, each half the previous one
    #[serde(default = "default_eps_steps")]
    pub eps_steps: usize,
    /// Relative tolerance between the last two estimates
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Override the log columns; by default [`KernelKind::log_terms`] decides
    #[serde(default)]
    pub log_terms: Option<LogTerms>,
}

fn default_eps_start() -> f64 {
    DEFAULT_EPS_START
}

fn default_eps_steps() -> usize {
    DEFAULT_EPS_STEPS
}

fn default_tolerance() -> f64 {
    DEFAULT_LIMIT_TOL
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            eps_start: DEFAULT_EPS_START,
            eps_steps: DEFAULT_EPS_STEPS,
            tolerance: DEFAULT_LIMIT_TOL,
            log_terms: None,
        }
    }
}

impl LimitSettings {
    /// Offsets `eps_start · 2^-k`, decreasing
    pub fn epsilons(&self) -> Vec<f64> {
        (0..self.eps_steps)
            .map(|k| self.eps_start * 0.5f64.powi(k as i32))
            .collect()
    }

    /// Log columns of the fit for `kernel`
    pub fn log_terms_for(&self, kernel: KernelKind) -> LogTerms {
        self.log_terms.unwrap_or_else(|| kernel.log_terms())
    }

    /// Check the settings
    pub fn validate(&self) -> Result<()> {
        if !(self.eps_start > 0.0 && self.eps_start.is_finite()) {
            return Err(NearfieldError::invalid(format!(
                "eps_start must be positive, got {}",
                self.eps_start
            )));
        }
        if self.eps_steps < 3 {
            return Err(NearfieldError::invalid(format!(
                "at least 3 regularization steps are needed, got {}",
                self.eps_steps
            )));
        }
        if self.tolerance.is_nan() || self.tolerance <= 0.0 {
            return Err(NearfieldError::invalid(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// The first `m` functions of the extrapolation basis at `t`
pub fn extrapolation_basis(t: f64, log_terms: LogTerms, m: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(m);
    let lt = t.ln();
    let mut power = 0;
    while out.len() < m {
        let tp = t.powi(power);
        out.push(tp);
        let with_log = match log_terms {
            LogTerms::Off => false,
            LogTerms::Products => power > 0,
            LogTerms::Full => true,
        };
        if with_log && out.len() < m {
            out.push(tp * lt);
        }
        power += 1;
    }
    out
}

/// LU factors of a small dense system, with partial pivoting
struct Lu {
    lu: Array2<f64>,
    pivots: Vec<usize>,
}

impl Lu {
    fn factorize(a: Array2<f64>) -> Result<Self> {
        let n = a.nrows();
        let mut lu = a;
        let mut pivots: Vec<usize> = (0..n).collect();

        for k in 0..n {
            let mut max_val = lu[[k, k]].abs();
            let mut max_row = k;
            for i in (k + 1)..n {
                let val = lu[[i, k]].abs();
                if val > max_val {
                    max_val = val;
                    max_row = i;
                }
            }
            if max_val < SINGULAR_PIVOT {
                return Err(NearfieldError::invalid(
                    "extrapolation system is singular (repeated regularization values?)",
                ));
            }
            if max_row != k {
                for j in 0..n {
                    lu.swap([k, j], [max_row, j]);
                }
                pivots.swap(k, max_row);
            }

            let pivot = lu[[k, k]];
            for i in (k + 1)..n {
                let mult = lu[[i, k]] / pivot;
                lu[[i, k]] = mult;
                for j in (k + 1)..n {
                    let update = mult * lu[[k, j]];
                    lu[[i, j]] -= update;
                }
            }
        }
        Ok(Self { lu, pivots })
    }

    /// Solve for every column of `rhs` at once
    fn solve(&self, rhs: &Array2<f64>) -> Array2<f64> {
        let n = self.pivots.len();
        let mut x = Array2::zeros(rhs.raw_dim());
        for (i, &p) in self.pivots.iter().enumerate() {
            x.row_mut(i).assign(&rhs.row(p));
        }
        for i in 0..n {
            for j in 0..i {
                let l_ij = self.lu[[i, j]];
                let row_j = x.row(j).to_owned();
                x.row_mut(i).scaled_add(-l_ij, &row_j);
            }
        }
        for i in (0..n).rev() {
            for j in (i + 1)..n {
                let u_ij = self.lu[[i, j]];
                let row_j = x.row(j).to_owned();
                x.row_mut(i).scaled_add(-u_ij, &row_j);
            }
            let u_ii = self.lu[[i, i]];
            x.row_mut(i).mapv_inplace(|v| v / u_ii);
        }
        x
    }
}

/// `(F, B)` from the first `m` samples
fn estimate(
    t: &[f64],
    data: &Array2<f64>,
    m: usize,
    log_terms: LogTerms,
    ln_eps0: f64,
) -> Result<(Array1<f64>, Array1<f64>)> {
    let mut a = Array2::zeros((m, m));
    for (row, &tk) in t.iter().take(m).enumerate() {
        for (col, v) in extrapolation_basis(tk, log_terms, m).into_iter().enumerate() {
            a[[row, col]] = v;
        }
    }
    let rhs = data.slice(ndarray::s![..m, ..]).to_owned();
    let coeffs = Lu::factorize(a)?.solve(&rhs);

    let c0 = coeffs.row(0).to_owned();
    if log_terms == LogTerms::Full && m >= 2 {
        let b = coeffs.row(1).to_owned();
        // v = c0 + c1 ln(ε/ε0) = (c0 - c1 ln ε0) + c1 ln ε
        let f = &c0 - &(&b * ln_eps0);
        Ok((f, b))
    } else {
        let b = Array1::zeros(c0.len());
        Ok((c0, b))
    }
}

/// Extrapolate sampled values to `ε = 0`
///
/// `values[k]` holds every entry sampled at `epsilons[k]`. The estimates from the first
/// `N - 1` and from all `N` samples are compared; the result is converged when they differ
/// by at most `tol · max(max |F|, tiny)` in every entry.
pub fn extrapolate_limit<V: AsRef<[f64]>>(
    epsilons: &[f64],
    values: &[V],
    tol: f64,
    log_terms: LogTerms,
) -> Result<LimitResult> {
    let n = epsilons.len();
    if n < 3 {
        return Err(NearfieldError::invalid(format!(
            "extrapolation needs at least 3 samples, got {}",
            n
        )));
    }
    if values.len() != n {
        return Err(NearfieldError::invalid(format!(
            "{} regularization values but {} samples",
            n,
            values.len()
        )));
    }
    if epsilons
        .windows(2)
        .any(|w| w[1].is_nan() || w[1] >= w[0] || w[1] <= 0.0)
    {
        return Err(NearfieldError::invalid(
            "regularization values must be positive and strictly decreasing",
        ));
    }
    let width = values[0].as_ref().len();
    if values.iter().any(|v| v.as_ref().len() != width) {
        return Err(NearfieldError::invalid("samples have different lengths"));
    }

    let mut data = Array2::zeros((n, width));
    for (k, v) in values.iter().enumerate() {
        for (e, &x) in v.as_ref().iter().enumerate() {
            data[[k, e]] = x;
        }
    }
    let eps0 = epsilons[0];
    let t: Vec<f64> = epsilons.iter().map(|e| e / eps0).collect();
    let ln_eps0 = eps0.ln();

    let (prev_f, _) = estimate(&t, &data, n - 1, log_terms, ln_eps0)?;
    let (f, b) = estimate(&t, &data, n, log_terms, ln_eps0)?;
    let scale = f.iter().fold(0.0f64, |acc, v| acc.max(v.abs())).max(TINY);
    let change = f
        .iter()
        .zip(prev_f.iter())
        .fold(0.0f64, |acc, (a, p)| acc.max((a - p).abs()))
        / scale;

    let status = if change <= tol {
        LimitStatus::Converged
    } else {
        log::warn!(
            "singularity extraction diverged: last change {:.3e} exceeds tolerance {:.3e}",
            change,
            tol
        );
        LimitStatus::Diverged
    };

    Ok(LimitResult {
        values: f.to_vec(),
        log_coefficients: b.to_vec(),
        error_estimate: change,
        status,
        samples: n,
    })
}

/// [`extrapolate_limit`] for a single scalar sequence
pub fn extrapolate_scalar(
    epsilons: &[f64],
    values: &[f64],
    tol: f64,
    log_terms: LogTerms,
) -> Result<LimitResult> {
    let rows: Vec<[f64; 1]> = values.iter().map(|&v| [v]).collect();
    extrapolate_limit(epsilons, &rows, tol, log_terms)
}

/// Where a limit request stands
#[derive(Debug, Clone, PartialEq)]
pub enum LimitState {
    /// Waiting for samples; `remaining` offsets still to evaluate
    Sampling {
        /// Number of offsets not yet evaluated
        remaining: usize,
    },
    /// All samples are in
    Extrapolating,
    /// Finished
    Done(LimitStatus),
}

/// Drives one regularized sequence from sampling to a finite part
#[derive(Debug, Clone)]
pub struct LimitEngine {
    settings: LimitSettings,
    log_terms: LogTerms,
    epsilons: Vec<f64>,
    samples: Vec<Vec<f64>>,
    state: LimitState,
}

impl LimitEngine {
    /// Start a request for `kernel`
    pub fn new(settings: LimitSettings, kernel: KernelKind) -> Result<Self> {
        settings.validate()?;
        let epsilons = settings.epsilons();
        Ok(Self {
            settings,
            log_terms: settings.log_terms_for(kernel),
            state: LimitState::Sampling {
                remaining: epsilons.len(),
            },
            samples: Vec::with_capacity(epsilons.len()),
            epsilons,
        })
    }

    /// Current state
    pub fn state(&self) -> &LimitState {
        &self.state
    }

    /// The offset to sample next, if any
    pub fn next_eps(&self) -> Option<f64> {
        match self.state {
            LimitState::Sampling { .. } => self.epsilons.get(self.samples.len()).copied(),
            _ => None,
        }
    }

    /// Record the sample for [`LimitEngine::next_eps`]
    pub fn push(&mut self, values: Vec<f64>) -> Result<()> {
        let LimitState::Sampling { remaining } = self.state else {
            return Err(NearfieldError::invalid("limit request is not sampling"));
        };
        self.samples.push(values);
        self.state = if remaining > 1 {
            LimitState::Sampling {
                remaining: remaining - 1,
            }
        } else {
            LimitState::Extrapolating
        };
        Ok(())
    }

    /// Extrapolate the collected samples
    pub fn finish(&mut self) -> Result<LimitResult> {
        if self.state != LimitState::Extrapolating {
            return Err(NearfieldError::invalid(format!(
                "cannot extrapolate in state {:?}",
                self.state
            )));
        }
        let result = extrapolate_limit(
            &self.epsilons,
            &self.samples,
            self.settings.tolerance,
            self.log_terms,
        )?;
        self.state = LimitState::Done(result.status);
        Ok(result)
    }

    /// Run a complete request, sampling with `sample(eps)`
    pub fn run<F>(settings: LimitSettings, kernel: KernelKind, mut sample: F) -> Result<LimitResult>
    where
        F: FnMut(f64) -> Result<Vec<f64>>,
    {
        let mut engine = Self::new(settings, kernel)?;
        while let Some(eps) = engine.next_eps() {
            let values = sample(eps)?;
            engine.push(values)?;
        }
        engine.finish()
    }
}
