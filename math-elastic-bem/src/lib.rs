//! # Elastic BEM near-field integration
//!
//! Singular and near-singular integration of the Kelvin elasticity kernels over pairs of
//! flat triangles with linear basis functions.
//!
//! ## Features
//!
//! - Classification and canonical standardization of touching triangle pairs
//! - Regularized quadrature with extrapolation to zero regularization
//! - Chebyshev interpolation tables that replace the direct singular path
//! - Sparse near-field correction assembly, parallel with Rayon
//!

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::too_many_arguments)] // Scientific code often has many parameters

pub mod core;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
