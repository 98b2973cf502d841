//! Numerical integration over triangle pairs
//!
//! - [`gauss`], [`sinh`]: 1D building blocks
//! - [`rules`]: pair rules for every adjacency
//! - [`limit`]: extrapolation to zero regularization
//! - [`singular`]: regularized integrals of singular pairs in standard position
//! - [`sub_basis`]: sub-triangle splitting and basis recombination

pub mod gauss;
pub mod limit;
pub mod rules;
pub mod singular;
pub mod sinh;
pub mod sub_basis;

pub use limit::{
    LimitEngine, LimitResult, LimitSettings, LimitState, LimitStatus, LogTerms,
    extrapolate_limit, extrapolate_scalar,
};
pub use rules::{PairRule, QuadratureSettings, RuleOrders};
pub use singular::{
    SingularClass, StandardValue, integrate_regularized, regularized_limit, vertex_adjacent_batch,
};
pub use sub_basis::{EdgeSplit, permutation_basis, sub_basis};
