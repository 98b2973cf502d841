//! Chebyshev interpolation tables of standard singular integrals
//!
//! - [`interp`]: axes, barycentric interpolation and the table type
//! - [`build`]: offline construction from the regularized limit
//! - [`lookup`]: table-backed integrals of physical pairs
//! - [`persist`]: JSON files

pub mod build;
pub mod interp;
pub mod lookup;
pub mod persist;

pub use crate::core::integration::SingularClass;
pub use build::{TableBuilder, build_table};
pub use interp::{Axis, InterpolationTable, TableMeta};
pub use lookup::{LookupSettings, lookup, lookup_coincident, lookup_edge, lookup_vertex};
pub use persist::{
    TABLE_FORMAT_VERSION, configured_table_path, load_table, save_table, table_filename, table_path,
};
