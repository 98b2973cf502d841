//! Numerical constants and defaults
//!
//! Values used when no configuration file overrides them.

use std::f64::consts::PI;

/// 4π
pub const PI4: f64 = 4.0 * PI;

/// 8π
pub const PI8: f64 = 8.0 * PI;

/// 16π
pub const PI16: f64 = 16.0 * PI;

/// Number of spatial dimensions
pub const NDIM: usize = 3;

/// Number of linear basis functions per triangle
pub const NBASIS: usize = 3;

/// Degrees of freedom per triangle (basis × component)
pub const DOFS_PER_TRIANGLE: usize = NBASIS * NDIM;

/// Entries of a pair tensor
pub const TENSOR_LEN: usize = DOFS_PER_TRIANGLE * DOFS_PER_TRIANGLE;

/// Smallest admissible interior angle (degrees)
pub const DEFAULT_MIN_ANGLE_DEG: f64 = 20.0;

/// Angle used to place the split point of edge-adjacent triangles (degrees)
pub const DEFAULT_SPLIT_ANGLE_DEG: f64 = 15.0;

/// Pairs per evaluator tile
pub const DEFAULT_TILE_SIZE: usize = 1 << 14;

/// First relative regularization distance
pub const DEFAULT_EPS_START: f64 = 0.01;

/// Number of halvings of the regularization distance
pub const DEFAULT_EPS_STEPS: usize = 5;

/// Relative tolerance on the change between successive extrapolations
pub const DEFAULT_LIMIT_TOL: f64 = 5e-3;

/// Pairs closer than this many triangle sizes use accurate quadrature
pub const DEFAULT_NEARFIELD_THRESHOLD: f64 = 3.0;

/// Margin added to the upper end of the coincident y2 axis
pub const COINCIDENT_Y2_MARGIN: f64 = 1e-3;

/// Relative slack on table axis bounds
pub const AXIS_SLACK: f64 = 1e-10;

/// Width of the sinh panel of the near-singular rule (fraction of [0, 1])
pub const NEAR_PANEL_WIDTH: f64 = 0.25;

/// Small epsilon for numerical comparisons
pub const EPSY: f64 = 1.0e-14;
