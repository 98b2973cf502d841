//! Near-field integration for elastic boundary integral equations
//!
//! ## Architecture
//!
//! - `types`: Points, triangles, elasticity parameters, 81-entry pair tensors
//! - `constants`: Numerical constants and defaults
//! - `error`: Error taxonomy shared by every module
//! - `kernels`: The four Kelvin kernels (U, T, A, H)
//! - `mesh`: Pair classification, standardization and near-field pair search
//! - `integration`: Quadrature rules, regularized integration, limit extrapolation
//! - `evaluator`: Batched pair evaluation (CPU, tiled and parallel)
//! - `table`: Chebyshev interpolation tables (build, lookup, persistence)
//! - `assembly`: Sparse near-field correction and dense validation operator
//! - `io`: Configuration files (JSON, TOML)
//! - `parallel`: Portable parallel iteration (native rayon or sequential)

pub mod assembly;
pub mod constants;
pub mod error;
pub mod evaluator;
pub mod integration;
pub mod io;
pub mod kernels;
pub mod mesh;
pub mod parallel;
pub mod table;
pub mod types;

// Re-exports for convenience
pub use assembly::{AssemblyStats, CsrMatrix, DenseIntegralOp, NearfieldAssembler, TableSet};
pub use error::{NearfieldError, Result};
pub use evaluator::{CpuEvaluator, PairEvaluator, Regularization};
pub use io::native::NearfieldConfig;
pub use kernels::KernelKind;
pub use mesh::{AdjacencyKind, Correspondence, TrianglePair, classify};
pub use table::{InterpolationTable, SingularClass};
pub use types::*;
