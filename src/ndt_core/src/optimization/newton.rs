//! Newton step for score maximization.
//!
//! The score is maximized, so the step solves `(-H + λI) Δ = g`.
//! Rank is judged on `H` itself, relative to its largest singular value, so
//! the ridge `λ` damps ill-conditioned steps without masking a direction the
//! cloud does not constrain at all.

use nalgebra::{Matrix6, Vector6};

use crate::error::DivergenceReason;

/// Solve the regularized Newton system.
///
/// Fails with [`DivergenceReason::SingularHessian`] when the Hessian is
/// numerically rank deficient (smallest singular value at most `tolerance`
/// times the largest) or the solve fails, and with
/// [`DivergenceReason::NonFiniteState`] when the inputs or the step are not
/// finite.
pub fn newton_step(
    gradient: &Vector6<f64>,
    hessian: &Matrix6<f64>,
    regularization: f64,
    tolerance: f64,
) -> Result<Vector6<f64>, DivergenceReason> {
    if !(gradient.iter().all(|v| v.is_finite()) && hessian.iter().all(|v| v.is_finite())) {
        return Err(DivergenceReason::NonFiniteState);
    }

    if is_rank_deficient(hessian, tolerance) {
        return Err(DivergenceReason::SingularHessian);
    }

    let system = -hessian + Matrix6::identity() * regularization;
    let svd = system.svd(true, true);
    let cutoff = tolerance * svd.singular_values.max();

    let delta = svd
        .solve(gradient, cutoff)
        .map_err(|_| DivergenceReason::SingularHessian)?;

    if delta.iter().all(|v| v.is_finite()) {
        Ok(delta)
    } else {
        Err(DivergenceReason::NonFiniteState)
    }
}

fn is_rank_deficient(hessian: &Matrix6<f64>, tolerance: f64) -> bool {
    let singular_values = hessian.svd(false, false).singular_values;
    let max_sv = singular_values.max();
    // Also true for an all-zero Hessian
    !(max_sv > 0.0) || singular_values.min() <= tolerance * max_sv
}

/// Ratio of largest to smallest singular value, `INFINITY` if rank deficient.
pub fn condition_number(hessian: &Matrix6<f64>) -> f64 {
    let svd = hessian.svd(false, false);
    let max_sv = svd.singular_values.max();
    let min_sv = svd.singular_values.min();

    if min_sv < 1e-15 {
        f64::INFINITY
    } else {
        max_sv / min_sv
    }
}
