//! NDT score, gradient and Hessian over a source cloud (Magnusson 2009, Ch. 6).
//!
//! The pose vector is `[tx, ty, tz, roll, pitch, yaw]` with
//! `R = Rx(roll) * Ry(pitch) * Rz(yaw)`.
//!
//! Each source point is transformed by the current pose and scored against
//! the single cell that contains it (direct hash lookup). Points outside
//! every scored cell contribute nothing.

pub mod angular;
pub mod point;
pub mod types;

pub use angular::AngularDerivatives;
pub use point::{compute_point_jacobian, point_contribution};
pub use types::{GaussianParams, PointContribution, PointJacobian, ScoreDerivatives};

use nalgebra::Vector3;
use rayon::prelude::*;

use crate::ndt_grid::NdtGrid;
use crate::pointcloud::{is_finite_point, transform_point, Point};
use crate::transform::{pose_vector_to_isometry, PoseVector};

/// Accumulate score, gradient and (optionally) Hessian at `pose`.
///
/// Per-point work runs in parallel; contributions are summed in input order
/// so the totals are bit-identical between runs.
pub fn compute_derivatives(
    source: &[Point],
    grid: &NdtGrid,
    pose: &PoseVector,
    gauss: &GaussianParams,
    compute_hessian: bool,
) -> ScoreDerivatives {
    let transform = pose_vector_to_isometry(pose);
    let angular = AngularDerivatives::new(pose[3], pose[4], pose[5], compute_hessian);

    let contributions: Vec<Option<PointContribution>> = source
        .par_iter()
        .map(|p| {
            if !is_finite_point(p) {
                return None;
            }
            let x = transform_point(p, &transform);
            let cell = grid.get_by_point(&x)?;

            let original = [p[0] as f64, p[1] as f64, p[2] as f64];
            let jacobian = compute_point_jacobian(&original, &angular, compute_hessian);
            let q = Vector3::new(x[0], x[1], x[2]) - cell.mean;
            point_contribution(&q, &cell.inv_covariance, &jacobian, gauss, compute_hessian)
        })
        .collect();

    let mut totals = ScoreDerivatives::zeros();
    for contribution in contributions.iter().flatten() {
        totals.add(contribution);
    }
    totals
}
