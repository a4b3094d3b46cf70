//! Per-point derivative kernels.
//!
//! - Score (Eq. 6.9): `s = -d1 * exp(-d2/2 * qᵀΣ⁻¹q)`, `q = T(x) - μ`
//! - Gradient (Eq. 6.12): `d1*d2*e * qᵀΣ⁻¹ J`
//! - Hessian (Eq. 6.13): `d1*d2*e * (-d2 (qᵀΣ⁻¹J_i)(qᵀΣ⁻¹J_j) + qᵀΣ⁻¹H_ij + J_jᵀΣ⁻¹J_i)`

use nalgebra::{Matrix3, Matrix3x6, Matrix6, Vector3, Vector6};

use super::angular::AngularDerivatives;
use super::types::{GaussianParams, Matrix18x6, PointContribution, PointJacobian};

/// Jacobian (and optionally Hessian) of `T(x)` for source point `x`.
///
/// Translation columns are the identity; rotation columns come from the
/// precomputed angular rows.
pub fn compute_point_jacobian(
    point: &[f64; 3],
    angular: &AngularDerivatives,
    compute_hessian: bool,
) -> PointJacobian {
    let mut jacobian = Matrix3x6::zeros();
    jacobian[(0, 0)] = 1.0;
    jacobian[(1, 1)] = 1.0;
    jacobian[(2, 2)] = 1.0;

    let g = angular.point_gradient_terms(point);
    jacobian[(1, 3)] = g[0];
    jacobian[(2, 3)] = g[1];
    jacobian[(0, 4)] = g[2];
    jacobian[(1, 4)] = g[3];
    jacobian[(2, 4)] = g[4];
    jacobian[(0, 5)] = g[5];
    jacobian[(1, 5)] = g[6];
    jacobian[(2, 5)] = g[7];

    let mut hessian = Matrix18x6::zeros();
    if compute_hessian {
        let h = angular.point_hessian_terms(point);
        let a = Vector3::new(0.0, h[0], h[1]);
        let b = Vector3::new(0.0, h[2], h[3]);
        let c = Vector3::new(0.0, h[4], h[5]);
        let d = Vector3::new(h[6], h[7], h[8]);
        let e = Vector3::new(h[9], h[10], h[11]);
        let f = Vector3::new(h[12], h[13], h[14]);

        // Only rotation/rotation blocks are non-zero: block i = 3..6, column j = 3..6.
        let blocks = [[a, b, c], [b, d, e], [c, e, f]];
        for (bi, row) in blocks.iter().enumerate() {
            for (bj, v) in row.iter().enumerate() {
                hessian
                    .fixed_view_mut::<3, 1>((bi + 3) * 3, bj + 3)
                    .copy_from(v);
            }
        }
    }

    PointJacobian { jacobian, hessian }
}

/// Score, gradient and Hessian of one point against one cell.
///
/// `q` is the transformed point minus the cell mean. Returns `None` when the
/// exponential term is outside `[0, 1]` or non-finite; such a point
/// contributes nothing.
pub fn point_contribution(
    q: &Vector3<f64>,
    inv_covariance: &Matrix3<f64>,
    point: &PointJacobian,
    gauss: &GaussianParams,
    compute_hessian: bool,
) -> Option<PointContribution> {
    let c_inv_q = inv_covariance * q;
    let mahalanobis_sq = q.dot(&c_inv_q);

    let exp_term = (-gauss.d2 * mahalanobis_sq * 0.5).exp();
    let score = -gauss.d1 * exp_term;

    let d2_e = gauss.d2 * exp_term;
    if !(0.0..=1.0).contains(&d2_e) || !d2_e.is_finite() {
        return None;
    }
    let factor = gauss.d1 * d2_e;

    // qᵀΣ⁻¹J (1x6)
    let q_c_inv_j: Vector6<f64> = (c_inv_q.transpose() * point.jacobian).transpose();
    let gradient = q_c_inv_j * factor;

    let mut hessian = Matrix6::zeros();
    if compute_hessian {
        let jt_c_inv_j = point.jacobian.transpose() * inv_covariance * point.jacobian;
        for i in 0..6 {
            let block = point.hessian.fixed_view::<3, 6>(i * 3, 0);
            let q_c_inv_h = c_inv_q.transpose() * block;
            for j in 0..6 {
                hessian[(i, j)] = factor
                    * (-gauss.d2 * q_c_inv_j[i] * q_c_inv_j[j]
                        + q_c_inv_h[(0, j)]
                        + jt_c_inv_j[(j, i)]);
            }
        }
    }

    Some(PointContribution {
        score,
        gradient,
        hessian,
    })
}
