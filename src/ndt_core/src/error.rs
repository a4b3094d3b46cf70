//! Error taxonomy for grid construction, registration and indexing.

use std::fmt;

use nalgebra::Isometry3;
use thiserror::Error;

/// Why the optimizer gave up on a registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivergenceReason {
    /// No transformed source point landed in a scored grid cell.
    NoCorrespondences,
    /// The Newton system could not be solved.
    SingularHessian,
    /// Score, gradient, Hessian or pose became NaN/Inf.
    NonFiniteState,
}

impl fmt::Display for DivergenceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DivergenceReason::NoCorrespondences => "no source point fell into a scored cell",
            DivergenceReason::SingularHessian => "singular Hessian",
            DivergenceReason::NonFiniteState => "non-finite optimizer state",
        };
        f.write_str(text)
    }
}

/// Errors raised by the NDT core.
///
/// All of them are fatal to the current call; nothing is retried internally.
#[derive(Debug, Error)]
pub enum NdtError {
    /// A spatial index or grid was requested over zero finite points.
    #[error("input point cloud has no finite points")]
    EmptyInput,

    /// The grid cannot be built with the given resolution/target.
    #[error("degenerate NDT grid: {reason}")]
    DegenerateGrid { reason: String },

    /// The optimizer hit a numerical failure.
    ///
    /// `last_transform` is the last pose whose state was finite.
    #[error("NDT optimization diverged at iteration {iteration}: {reason}")]
    OptimizationDiverged {
        reason: DivergenceReason,
        iteration: usize,
        last_transform: Isometry3<f64>,
    },

    /// A configuration value is out of range.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl NdtError {
    /// Last finite transform, if this error came out of the optimizer.
    pub fn last_transform(&self) -> Option<&Isometry3<f64>> {
        match self {
            NdtError::OptimizationDiverged { last_transform, .. } => Some(last_transform),
            _ => None,
        }
    }

    pub(crate) fn degenerate_grid(reason: impl Into<String>) -> Self {
        NdtError::DegenerateGrid {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        NdtError::InvalidConfig {
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NdtError>;
