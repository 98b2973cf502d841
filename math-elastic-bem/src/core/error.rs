//! Error types for near-field integration.
//!
//! Every fallible operation of the crate returns [`NearfieldError`]. `TableRange` is the
//! only internal variant: the near-field engine catches it and falls back to direct
//! integration, so it never reaches the caller of an assembly.

use thiserror::Error;

/// Errors that can occur during near-field integration and assembly.
#[derive(Debug, Error)]
pub enum NearfieldError {
    /// A triangle has an interior angle below the configured threshold.
    #[error("degenerate triangle: smallest angle {min_angle_deg:.3}° is below {threshold_deg}°")]
    DegenerateTriangle {
        /// Smallest interior angle of the triangle in degrees
        min_angle_deg: f64,
        /// Configured threshold in degrees
        threshold_deg: f64,
    },

    /// Two triangles share indices in a way no canonical rotation can express.
    #[error("inconsistent triangle pair {obs:?} / {src:?}: {reason}")]
    ClassificationInconsistency {
        /// Observation triangle indices
        obs: [usize; 3],
        /// Source triangle indices
        src: [usize; 3],
        /// What went wrong
        reason: String,
    },

    /// The extrapolation to zero regularization did not settle.
    #[error("singularity extraction diverged: last change {max_change:.3e} exceeds tolerance {tol:.3e}")]
    SingularityExtractionDivergence {
        /// Largest entry change between the last two estimates (relative)
        max_change: f64,
        /// Requested tolerance
        tol: f64,
    },

    /// A table lookup was requested outside the tabulated domain.
    #[error("table lookup out of range on axis {axis}: {value} not in [{lo}, {hi}]")]
    TableRange {
        /// Axis name
        axis: String,
        /// Requested coordinate
        value: f64,
        /// Lower bound of the axis
        lo: f64,
        /// Upper bound of the axis
        hi: f64,
    },

    /// The batched evaluator rejected its input.
    #[error("evaluator dispatch failed: {reason}")]
    EvaluatorDispatch {
        /// What was wrong with the batch
        reason: String,
    },

    /// Invalid argument or configuration value.
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// What was wrong
        reason: String,
    },

    /// File system error while reading or writing tables.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Table (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A specialized `Result` type for near-field operations.
pub type Result<T> = std::result::Result<T, NearfieldError>;

impl NearfieldError {
    /// Shorthand for [`NearfieldError::InvalidInput`].
    pub fn invalid(reason: impl Into<String>) -> Self {
        NearfieldError::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`NearfieldError::EvaluatorDispatch`].
    pub fn dispatch(reason: impl Into<String>) -> Self {
        NearfieldError::EvaluatorDispatch {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error is meant to reach the caller of an assembly.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, NearfieldError::TableRange { .. })
    }

    /// Returns `true` if the computation can continue on another path.
    ///
    /// Out-of-range lookups fall back to direct integration and a diverged
    /// extrapolation still yields a usable best estimate.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            NearfieldError::TableRange { .. }
                | NearfieldError::SingularityExtractionDivergence { .. }
        )
    }

    /// Returns `true` if this is a table range error.
    pub fn is_table_range(&self) -> bool {
        matches!(self, NearfieldError::TableRange { .. })
    }
}
