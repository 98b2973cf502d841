//! Mesh-level operations on triangle pairs
//!
//! - `classify`: adjacency and canonical rotations of a pair of index triangles
//! - `standardize`: rigid-plus-scale maps to the standard singular configurations
//! - `octree`: spatial partitioning of triangle centroids
//! - `nearfield`: near-field pair search

pub mod classify;
pub mod nearfield;
pub mod octree;
pub mod standardize;

pub use classify::{AdjacencyKind, Correspondence, TrianglePair, classify};
pub use nearfield::find_nearfield_pairs;
pub use standardize::{
    EdgeStandardization, StandardTransform, StandardizedTriangle, check_min_angle, standardize,
    standardize_edge, transform_from_standard,
};
