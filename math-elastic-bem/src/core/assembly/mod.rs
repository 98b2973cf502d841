//! Near-field matrix assembly
//!
//! - [`nearfield`] - Sparse correction of the far rule on every near-field pair
//! - [`dense`] - Dense operator (far rule everywhere plus correction) for small meshes
//! - [`sparse`] - CSR storage

pub mod dense;
pub mod nearfield;
pub mod sparse;

pub use dense::DenseIntegralOp;
pub use nearfield::{
    AssemblyStats, NearfieldAssembler, NearfieldEngine, PairOutcome, TableSet, ValueSource,
    dof_index, far_field_blocks,
};
pub use sparse::CsrMatrix;
