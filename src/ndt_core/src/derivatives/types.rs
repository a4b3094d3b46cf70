//! Types for NDT score derivatives (Magnusson 2009, Chapter 6).

use nalgebra::{Matrix3x6, Matrix6, SMatrix, Vector6};

/// Parameters of the Gaussian-plus-uniform mixture used as per-point score.
///
/// Score of a point at Mahalanobis distance `m` from a cell (Eq. 6.9):
/// `-d1 * exp(-d2 / 2 * m)`. `d1` is negative, so scores are positive and
/// larger for better alignment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianParams {
    pub d1: f64,
    pub d2: f64,
    pub outlier_ratio: f64,
}

impl GaussianParams {
    /// Fit `d1`/`d2` for a cell edge `resolution` and outlier probability.
    ///
    /// - c1 = 10 * (1 - outlier_ratio)
    /// - c2 = outlier_ratio / resolution^3
    /// - d3 = -ln(c2)
    /// - d1 = -ln(c1 + c2) - d3
    /// - d2 = -2 * ln((-ln(c1 * exp(-0.5) + c2) - d3) / d1)
    pub fn new(resolution: f64, outlier_ratio: f64) -> Self {
        let c1 = 10.0 * (1.0 - outlier_ratio);
        let c2 = outlier_ratio / resolution.powi(3);
        let d3 = -c2.ln();
        let d1 = -(c1 + c2).ln() - d3;
        let d2 = -2.0 * ((-(c1 * (-0.5_f64).exp() + c2).ln() - d3) / d1).ln();

        Self {
            d1,
            d2,
            outlier_ratio,
        }
    }

    /// Score of a point at squared Mahalanobis distance `m`.
    #[inline]
    pub fn score(&self, mahalanobis_sq: f64) -> f64 {
        -self.d1 * (-self.d2 * mahalanobis_sq * 0.5).exp()
    }

    /// Score of a point sitting exactly on a cell mean.
    pub fn max_score(&self) -> f64 {
        -self.d1
    }
}

impl Default for GaussianParams {
    fn default() -> Self {
        Self::new(2.0, 0.55)
    }
}

/// Second derivatives of a transformed point, six 3x6 blocks stacked.
///
/// Block `i` (rows `3i..3i+3`) holds `d^2 T(x) / dp_i dp_j` for all `j`.
pub type Matrix18x6 = SMatrix<f64, 18, 6>;

/// First and second derivatives of `T(x)` with respect to the pose.
#[derive(Debug, Clone)]
pub struct PointJacobian {
    pub jacobian: Matrix3x6<f64>,
    pub hessian: Matrix18x6,
}

/// Score, gradient and Hessian contributed by one source point.
#[derive(Debug, Clone, PartialEq)]
pub struct PointContribution {
    pub score: f64,
    pub gradient: Vector6<f64>,
    pub hessian: Matrix6<f64>,
}

/// Totals over a whole source cloud at one pose.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreDerivatives {
    pub score: f64,
    pub gradient: Vector6<f64>,
    pub hessian: Matrix6<f64>,
    /// Source points that landed in a scored cell.
    pub num_correspondences: usize,
}

impl ScoreDerivatives {
    pub fn zeros() -> Self {
        Self {
            score: 0.0,
            gradient: Vector6::zeros(),
            hessian: Matrix6::zeros(),
            num_correspondences: 0,
        }
    }

    pub fn add(&mut self, contribution: &PointContribution) {
        self.score += contribution.score;
        self.gradient += contribution.gradient;
        self.hessian += contribution.hessian;
        self.num_correspondences += 1;
    }

    /// Whether score, gradient and Hessian are all finite.
    pub fn is_finite(&self) -> bool {
        self.score.is_finite()
            && self.gradient.iter().all(|v| v.is_finite())
            && self.hessian.iter().all(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gaussian_params_signs() {
        let params = GaussianParams::default();

        assert!(params.d1 < 0.0, "d1 should be negative: {}", params.d1);
        assert!(params.d2 > 0.0, "d2 should be positive: {}", params.d2);
        assert_eq!(params.outlier_ratio, 0.55);
    }

    #[test]
    fn test_gaussian_params_reference_values() {
        // Resolution 1.0, outlier ratio 0.55 (values from the PCL formulation)
        let params = GaussianParams::new(1.0, 0.55);
        let c1: f64 = 4.5;
        let c2: f64 = 0.55;
        let d3 = -c2.ln();
        let d1 = -(c1 + c2).ln() - d3;
        assert_relative_eq!(params.d1, d1, epsilon = 1e-12);
        assert!(params.d2 > 0.0 && params.d2 < 1.0);
    }

    #[test]
    fn test_score_peaks_at_mean() {
        let params = GaussianParams::default();
        assert_relative_eq!(params.score(0.0), params.max_score(), epsilon = 1e-12);
        assert!(params.score(1.0) < params.score(0.0));
        assert!(params.score(1e6) >= 0.0);
    }

    #[test]
    fn test_score_derivatives_add() {
        let mut totals = ScoreDerivatives::zeros();
        let contribution = PointContribution {
            score: 1.5,
            gradient: Vector6::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0),
            hessian: Matrix6::identity(),
        };

        totals.add(&contribution);
        totals.add(&contribution);

        assert_eq!(totals.score, 3.0);
        assert_eq!(totals.gradient[5], 12.0);
        assert_eq!(totals.hessian[(2, 2)], 2.0);
        assert_eq!(totals.num_correspondences, 2);
        assert!(totals.is_finite());

        totals.score = f64::NAN;
        assert!(!totals.is_finite());
    }
}
