//! Configuration and result types for NDT registration.

use nalgebra::{Isometry3, Matrix6};
use serde::Serialize;

use crate::error::{NdtError, Result};
use crate::transform::PoseVector;

/// Configuration for NDT registration.
#[derive(Debug, Clone)]
pub struct NdtConfig {
    /// Iteration cap. Reaching it is not an error.
    pub max_iterations: usize,

    /// Convergence threshold on the translation part of the applied step.
    pub trans_epsilon: f64,

    /// Convergence threshold (radians) on the rotation part of the applied step.
    pub rotation_epsilon: f64,

    /// Step-size ceiling: the Newton direction is normalized, then scaled by
    /// `min(newton_step_norm, step_size)` before the line search shrinks it.
    pub step_size: f64,

    /// Probability that a point is an outlier.
    pub outlier_ratio: f64,

    /// Added to the diagonal of the negated Hessian before solving.
    pub regularization: f64,
}

impl Default for NdtConfig {
    fn default() -> Self {
        Self {
            max_iterations: 30,
            trans_epsilon: 0.01,
            rotation_epsilon: 0.001,
            step_size: 0.1,
            outlier_ratio: 0.55,
            regularization: 1e-6,
        }
    }
}

impl NdtConfig {
    /// Reject values the optimizer cannot work with.
    ///
    /// The cell size is not checked here: the optimizer takes it from the
    /// grid it is handed, and grids validate it on construction.
    pub fn validate(&self) -> Result<()> {
        if !(self.step_size.is_finite() && self.step_size > 0.0) {
            return Err(NdtError::invalid_config(format!(
                "step size must be positive, got {}",
                self.step_size
            )));
        }
        if self.max_iterations == 0 {
            return Err(NdtError::invalid_config("max_iterations must be > 0"));
        }
        if !(self.outlier_ratio > 0.0 && self.outlier_ratio < 1.0) {
            return Err(NdtError::invalid_config(format!(
                "outlier ratio must be in (0, 1), got {}",
                self.outlier_ratio
            )));
        }
        if !(self.trans_epsilon >= 0.0 && self.rotation_epsilon >= 0.0) {
            return Err(NdtError::invalid_config("epsilons must be non-negative"));
        }
        if !(self.regularization >= 0.0 && self.regularization.is_finite()) {
            return Err(NdtError::invalid_config(format!(
                "regularization must be non-negative, got {}",
                self.regularization
            )));
        }
        Ok(())
    }
}

/// Terminal state of a registration that did not diverge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RegistrationStatus {
    /// The applied step fell below both epsilons.
    Converged,
    /// The iteration cap was hit first.
    MaxIterationsReached,
}

impl RegistrationStatus {
    pub fn is_converged(&self) -> bool {
        matches!(self, RegistrationStatus::Converged)
    }
}

/// One optimizer iteration, in the order they ran.
#[derive(Debug, Clone, Serialize)]
pub struct IterationRecord {
    /// 1-based iteration number.
    pub iteration: usize,
    /// Score at the pose this iteration started from.
    pub score: f64,
    pub num_correspondences: usize,
    /// Norm of the unclamped Newton step.
    pub newton_step_norm: f64,
    /// Whether the Newton step had to be reversed to ascend.
    pub direction_reversed: bool,
    /// Length actually applied after clamping and line search.
    pub step_length: f64,
    pub line_search_evaluations: usize,
    /// False when every trial step was rejected and the pose was left as is.
    pub line_search_accepted: bool,
    /// Pose after this iteration's update.
    pub pose_after: PoseVector,
}

/// Result of a registration that converged or hit the iteration cap.
#[derive(Debug, Clone)]
pub struct NdtResult {
    /// Source-to-target transform.
    pub transform: Isometry3<f64>,
    pub status: RegistrationStatus,
    /// Total score at the final pose (higher is better).
    pub score: f64,
    /// Average score per correspondence at the final pose.
    pub transform_probability: f64,
    /// Iterations performed, never more than `max_iterations`.
    pub iterations: usize,
    /// Hessian at the final pose.
    pub hessian: Matrix6<f64>,
    pub num_correspondences: usize,
    /// Longest run of consecutive direction reversals in the pose history.
    pub oscillation_count: usize,
    /// The last line search rejected a non-zero Newton step. The status is
    /// then `Converged` only because nothing was applied, not because the
    /// step fell below the epsilons.
    pub stalled: bool,
    pub history: Vec<IterationRecord>,
}

impl NdtResult {
    pub fn is_converged(&self) -> bool {
        self.status.is_converged()
    }

    pub fn is_oscillating(&self) -> bool {
        self.oscillation_count > super::oscillation::DEFAULT_OSCILLATION_THRESHOLD
    }
}
