//! Kelvin elasticity kernels
//!
//! The four kernels of the elastic boundary integral equation for an infinite isotropic
//! medium, evaluated at a single pair of points:
//!
//! | Kernel | Meaning | Singularity |
//! |---|---|---|
//! | U | displacement (Kelvin solution) | 1/r |
//! | T | traction of U on the source normal | 1/r² |
//! | A | adjoint traction on the observation normal | 1/r² |
//! | H | hypersingular traction-traction | 1/r³ |
//!
//! All kernels take `d = y - x` (source minus observation), the observation normal `m` and
//! the source normal `n`, and return the 3×3 block `K[i][k]` (observation component `i`,
//! source component `k`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::constants::{PI4, PI8, PI16};
use super::error::NearfieldError;
use super::integration::LogTerms;
use super::types::{ElasticityParams, Point, dot};

/// Closed set of supported kernels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KernelKind {
    /// Displacement kernel
    U,
    /// Traction kernel
    T,
    /// Adjoint traction kernel
    A,
    /// Hypersingular kernel
    H,
}

impl KernelKind {
    /// All kernels, in table order
    pub const ALL: [KernelKind; 4] = [KernelKind::U, KernelKind::T, KernelKind::A, KernelKind::H];

    /// Short name used in file names and logs
    pub fn name(&self) -> &'static str {
        match self {
            KernelKind::U => "U",
            KernelKind::T => "T",
            KernelKind::A => "A",
            KernelKind::H => "H",
        }
    }

    /// Degree d such that K(s·d) = s^-d K(d)
    pub fn homogeneity_degree(&self) -> i32 {
        match self {
            KernelKind::U => 1,
            KernelKind::T | KernelKind::A => 2,
            KernelKind::H => 3,
        }
    }

    /// Factor applied when moving from μ = 1 to the actual shear modulus
    pub fn shear_modulus_factor(&self, shear_modulus: f64) -> f64 {
        match self {
            KernelKind::U => 1.0 / shear_modulus,
            KernelKind::T | KernelKind::A => 1.0,
            KernelKind::H => shear_modulus,
        }
    }

    /// Whether the kernel is linear in the observation normal
    pub fn depends_on_obs_normal(&self) -> bool {
        matches!(self, KernelKind::A | KernelKind::H)
    }

    /// Whether the kernel is linear in the source normal
    pub fn depends_on_src_normal(&self) -> bool {
        matches!(self, KernelKind::T | KernelKind::H)
    }

    /// Sign picked up when normals are flipped by the given parities
    pub fn normal_parity(&self, obs_parity: f64, src_parity: f64) -> f64 {
        let mut p = 1.0;
        if self.depends_on_obs_normal() {
            p *= obs_parity;
        }
        if self.depends_on_src_normal() {
            p *= src_parity;
        }
        p
    }

    /// Log columns of the extrapolation of this kernel's regularized integrals
    ///
    /// Only the hypersingular kernel diverges like `ln ε`; the others still carry `ε ln ε`.
    pub fn log_terms(&self) -> LogTerms {
        match self {
            KernelKind::H => LogTerms::Full,
            KernelKind::U | KernelKind::T | KernelKind::A => LogTerms::Products,
        }
    }

    /// Evaluate the kernel block for `d = y - x`
    ///
    /// Returns zero at exactly zero separation.
    #[inline]
    pub fn evaluate(
        &self,
        d: &Point,
        obs_normal: &Point,
        src_normal: &Point,
        params: &ElasticityParams,
    ) -> [[f64; 3]; 3] {
        let r2 = dot(d, d);
        if r2 == 0.0 {
            return [[0.0; 3]; 3];
        }
        let r = r2.sqrt();
        let g = [d[0] / r, d[1] / r, d[2] / r];
        let nu = params.poisson_ratio;
        let mu = params.shear_modulus;
        let m = obs_normal;
        let n = src_normal;
        let mut out = [[0.0; 3]; 3];

        match self {
            KernelKind::U => {
                let c = 1.0 / (PI16 * mu * (1.0 - nu) * r);
                for i in 0..3 {
                    for k in 0..3 {
                        out[i][k] = c * ((3.0 - 4.0 * nu) * delta(i, k) + g[i] * g[k]);
                    }
                }
            }
            KernelKind::T => {
                let c = -1.0 / (PI8 * (1.0 - nu) * r2);
                let rn = dot(&g, n);
                for i in 0..3 {
                    for k in 0..3 {
                        out[i][k] = c
                            * (rn * ((1.0 - 2.0 * nu) * delta(i, k) + 3.0 * g[i] * g[k])
                                - (1.0 - 2.0 * nu) * (g[i] * n[k] - g[k] * n[i]));
                    }
                }
            }
            KernelKind::A => {
                let c = 1.0 / (PI8 * (1.0 - nu) * r2);
                let rm = dot(&g, m);
                for i in 0..3 {
                    for k in 0..3 {
                        out[i][k] = c
                            * ((1.0 - 2.0 * nu) * (delta(i, k) * rm + m[k] * g[i] - m[i] * g[k])
                                + 3.0 * g[i] * g[k] * rm);
                    }
                }
            }
            KernelKind::H => {
                let c = mu / (PI4 * (1.0 - nu) * r2 * r);
                let rn = dot(&g, n);
                let rm = dot(&g, m);
                let mn = dot(m, n);
                for i in 0..3 {
                    for k in 0..3 {
                        let d_ik = delta(i, k);
                        out[i][k] = c
                            * (3.0
                                * rn
                                * ((1.0 - 2.0 * nu) * m[i] * g[k]
                                    + nu * (d_ik * rm + m[k] * g[i])
                                    - 5.0 * g[i] * rm * g[k])
                                + 3.0 * nu * (n[i] * rm * g[k] + mn * g[i] * g[k])
                                + (1.0 - 2.0 * nu) * (3.0 * n[k] * g[i] * rm + mn * d_ik + n[i] * m[k])
                                - (1.0 - 4.0 * nu) * n[k] * m[i]);
                    }
                }
            }
        }
        out
    }
}

#[inline]
fn delta(i: usize, k: usize) -> f64 {
    if i == k { 1.0 } else { 0.0 }
}

impl fmt::Display for KernelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for KernelKind {
    type Err = NearfieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "U" | "DISPLACEMENT" => Ok(KernelKind::U),
            "T" | "TRACTION" => Ok(KernelKind::T),
            "A" | "ADJOINT" => Ok(KernelKind::A),
            "H" | "HYPERSINGULAR" => Ok(KernelKind::H),
            other => Err(NearfieldError::invalid(format!("unknown kernel '{}'", other))),
        }
    }
}
