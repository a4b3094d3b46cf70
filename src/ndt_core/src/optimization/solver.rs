//! NDT registration loop.
//!
//! 1. Score the source cloud against the grid at the current pose
//!    (score, gradient, Hessian)
//! 2. Solve the regularized Newton system for a step direction
//! 3. Clamp the step to the ceiling and backtrack until the score holds
//! 4. Apply the step and test convergence on its translation/rotation parts

use nalgebra::{Isometry3, Vector6};
use tracing::{debug, info, warn};

use super::line_search::{backtracking_line_search, LineSearchConfig};
use super::newton::{condition_number, newton_step};
use super::oscillation::{count_oscillation, DEFAULT_OSCILLATION_THRESHOLD};
use super::types::{IterationRecord, NdtConfig, NdtResult, RegistrationStatus};
use crate::derivatives::{compute_derivatives, GaussianParams, ScoreDerivatives};
use crate::error::{DivergenceReason, NdtError, Result};
use crate::ndt_grid::NdtGrid;
use crate::pointcloud::Point;
use crate::transform::{
    apply_pose_delta, isometry_to_pose_vector, pose_vector_to_isometry, PoseVector,
};

/// Configuration for the optimization process.
#[derive(Debug, Clone)]
pub struct OptimizationConfig {
    pub ndt: NdtConfig,
    pub line_search: LineSearchConfig,
    /// Singular values below this are treated as zero in the Newton solve.
    pub svd_tolerance: f64,
    /// Hessian condition number above which a warning is logged.
    pub condition_warning_threshold: f64,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            ndt: NdtConfig::default(),
            line_search: LineSearchConfig::default(),
            svd_tolerance: 1e-10,
            condition_warning_threshold: 1e10,
        }
    }
}

/// Newton optimizer for NDT registration.
///
/// Holds only configuration; every call to [`NdtOptimizer::register`] owns
/// its own state, so one optimizer can serve concurrent registrations.
#[derive(Debug, Clone, Default)]
pub struct NdtOptimizer {
    config: OptimizationConfig,
}

impl NdtOptimizer {
    /// Fails with [`NdtError::InvalidConfig`] if the configuration is unusable.
    pub fn new(config: OptimizationConfig) -> Result<Self> {
        config.ndt.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &OptimizationConfig {
        &self.config
    }

    /// Register `source` against `grid` starting from `initial_guess`.
    ///
    /// Returns the final transform with status
    /// [`RegistrationStatus::Converged`] or
    /// [`RegistrationStatus::MaxIterationsReached`]. Numerical failure is
    /// reported as [`NdtError::OptimizationDiverged`], carrying the last
    /// transform at which the state was finite. A non-finite initial guess
    /// fails at iteration 0 and carries the guess itself.
    pub fn register(
        &self,
        source: &[Point],
        grid: &NdtGrid,
        initial_guess: &Isometry3<f64>,
    ) -> Result<NdtResult> {
        let ndt = &self.config.ndt;
        let gauss = GaussianParams::new(grid.resolution(), ndt.outlier_ratio);

        let mut pose = isometry_to_pose_vector(initial_guess);
        let mut last_valid = *initial_guess;
        let mut pose_history: Vec<PoseVector> = Vec::with_capacity(ndt.max_iterations + 1);
        pose_history.push(pose);
        let mut history: Vec<IterationRecord> = Vec::with_capacity(ndt.max_iterations);

        let diverged =
            |reason: DivergenceReason, iteration: usize, last_transform: Isometry3<f64>| {
                warn!(%reason, iteration, "NDT registration diverged");
                NdtError::OptimizationDiverged {
                    reason,
                    iteration,
                    last_transform,
                }
            };

        if !is_finite_isometry(initial_guess) {
            return Err(diverged(DivergenceReason::NonFiniteState, 0, last_valid));
        }

        let mut current = compute_derivatives(source, grid, &pose, &gauss, true);
        if let Err(reason) = check_state(&current) {
            return Err(diverged(reason, 0, last_valid));
        }

        let mut status = RegistrationStatus::MaxIterationsReached;
        let mut iterations = 0;
        let mut stalled = false;

        while iterations < ndt.max_iterations {
            iterations += 1;

            let condition = condition_number(&current.hessian);
            if condition > self.config.condition_warning_threshold {
                warn!(
                    iteration = iterations,
                    condition, "Ill-conditioned NDT Hessian"
                );
            }

            let delta = newton_step(
                &current.gradient,
                &current.hessian,
                ndt.regularization,
                self.config.svd_tolerance,
            )
            .map_err(|reason| diverged(reason, iterations, last_valid))?;

            let delta_norm = delta.norm();
            let (direction, direction_reversed, slope) = ascent_direction(&delta, &current);

            let max_step = delta_norm.min(ndt.step_size);
            let search = backtracking_line_search(
                |step| {
                    let trial = apply_pose_delta(&pose, &direction, step);
                    compute_derivatives(source, grid, &trial, &gauss, false).score
                },
                current.score,
                slope,
                max_step,
                &self.config.line_search,
            );

            // No trial improved the score although the Newton step was non-zero
            stalled = !search.accepted && max_step > 0.0;
            if stalled {
                warn!(
                    iteration = iterations,
                    newton_step_norm = delta_norm,
                    evaluations = search.evaluations,
                    "Line search rejected every trial step"
                );
            }

            let applied = direction * search.step;
            let next_pose = apply_pose_delta(&pose, &direction, search.step);
            let next_transform = pose_vector_to_isometry(&next_pose);
            if !is_finite_isometry(&next_transform) {
                return Err(diverged(
                    DivergenceReason::NonFiniteState,
                    iterations,
                    last_valid,
                ));
            }

            let next = compute_derivatives(source, grid, &next_pose, &gauss, true);
            if let Err(reason) = check_state(&next) {
                return Err(diverged(reason, iterations, last_valid));
            }

            debug!(
                iteration = iterations,
                score = current.score,
                correspondences = current.num_correspondences,
                newton_step_norm = delta_norm,
                step = search.step,
                line_search_evaluations = search.evaluations,
                "NDT iteration"
            );

            history.push(IterationRecord {
                iteration: iterations,
                score: current.score,
                num_correspondences: current.num_correspondences,
                newton_step_norm: delta_norm,
                direction_reversed,
                step_length: search.step,
                line_search_evaluations: search.evaluations,
                line_search_accepted: search.accepted,
                pose_after: next_pose,
            });

            pose = next_pose;
            last_valid = next_transform;
            current = next;
            pose_history.push(pose);

            let translation_step = applied.fixed_rows::<3>(0).norm();
            let rotation_step = applied.fixed_rows::<3>(3).norm();
            if translation_step < ndt.trans_epsilon && rotation_step < ndt.rotation_epsilon {
                status = RegistrationStatus::Converged;
                break;
            }
        }

        let oscillation = count_oscillation(&pose_history, DEFAULT_OSCILLATION_THRESHOLD);
        if oscillation.is_oscillating {
            warn!(
                count = oscillation.max_oscillation_count,
                "NDT optimizer oscillating"
            );
        }

        let transform_probability =
            current.score / current.num_correspondences.max(1) as f64;

        info!(
            ?status,
            stalled,
            iterations,
            score = current.score,
            transform_probability,
            correspondences = current.num_correspondences,
            "NDT registration finished"
        );

        Ok(NdtResult {
            transform: last_valid,
            status,
            score: current.score,
            transform_probability,
            iterations,
            hessian: current.hessian,
            num_correspondences: current.num_correspondences,
            oscillation_count: oscillation.max_oscillation_count,
            stalled,
            history,
        })
    }
}

/// Register with default settings apart from the iteration cap and
/// step-size ceiling, returning only the transform.
pub fn register(
    source: &[Point],
    grid: &NdtGrid,
    initial_guess: &Isometry3<f64>,
    max_iterations: usize,
    step_size_ceiling: f64,
) -> Result<Isometry3<f64>> {
    let config = OptimizationConfig {
        ndt: NdtConfig {
            max_iterations,
            step_size: step_size_ceiling,
            ..Default::default()
        },
        ..Default::default()
    };
    let result = NdtOptimizer::new(config)?.register(source, grid, initial_guess)?;
    Ok(result.transform)
}

fn check_state(derivatives: &ScoreDerivatives) -> std::result::Result<(), DivergenceReason> {
    if derivatives.num_correspondences == 0 {
        Err(DivergenceReason::NoCorrespondences)
    } else if !derivatives.is_finite() {
        Err(DivergenceReason::NonFiniteState)
    } else {
        Ok(())
    }
}

/// Normalize the Newton step and flip it if it does not climb the score.
///
/// Returns `(direction, reversed, gradient · direction)`.
fn ascent_direction(delta: &Vector6<f64>, at: &ScoreDerivatives) -> (Vector6<f64>, bool, f64) {
    let norm = delta.norm();
    if norm == 0.0 {
        return (Vector6::zeros(), false, 0.0);
    }
    let direction = delta / norm;
    let slope = at.gradient.dot(&direction);
    if slope < 0.0 {
        (-direction, true, -slope)
    } else {
        (direction, false, slope)
    }
}

fn is_finite_isometry(isometry: &Isometry3<f64>) -> bool {
    isometry.translation.vector.iter().all(|v| v.is_finite())
        && isometry.rotation.coords.iter().all(|v| v.is_finite())
}
