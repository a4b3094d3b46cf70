//! Transform probability and per-point scoring metrics.
//!
//! Transform probability measures how well the transformed source points
//! match the target grid. It's computed as the sum of NDT scores
//! normalized by the number of correspondences.

use nalgebra::{Isometry3, Matrix3, Vector3};
use rayon::prelude::*;

use crate::derivatives::GaussianParams;
use crate::ndt_grid::NdtGrid;
use crate::pointcloud::{is_finite_point, transform_point, Point};

/// Result of scoring computation.
#[derive(Debug, Clone)]
pub struct ScoringResult {
    /// Total NDT score (sum over all point-cell pairs).
    pub total_score: f64,

    /// Transform probability (total_score / num_correspondences).
    /// This is the average score per correspondence.
    pub transform_probability: f64,

    /// Number of source points that landed in a scored cell.
    pub num_correspondences: usize,

    /// Number of finite source points outside every scored cell.
    pub num_no_correspondence: usize,
}

impl ScoringResult {
    /// Create a result with no correspondences.
    pub fn no_correspondences(num_points: usize) -> Self {
        Self {
            total_score: 0.0,
            transform_probability: 0.0,
            num_correspondences: 0,
            num_no_correspondence: num_points,
        }
    }
}

/// Compute transform probability for a point cloud against an NDT grid.
///
/// Higher values indicate better alignment. Non-finite source points are
/// skipped and counted nowhere.
pub fn compute_transform_probability(
    source_points: &[Point],
    target_grid: &NdtGrid,
    pose: &Isometry3<f64>,
    gauss: &GaussianParams,
) -> ScoringResult {
    let scores: Vec<Option<f64>> = source_points
        .par_iter()
        .filter(|p| is_finite_point(p))
        .map(|p| score_point(p, target_grid, pose, gauss))
        .collect();

    if scores.is_empty() {
        return ScoringResult::no_correspondences(0);
    }

    let mut total_score = 0.0;
    let mut num_correspondences = 0;
    for score in scores.iter().flatten() {
        total_score += score;
        num_correspondences += 1;
    }

    let transform_probability = if num_correspondences > 0 {
        total_score / num_correspondences as f64
    } else {
        0.0
    };

    ScoringResult {
        total_score,
        transform_probability,
        num_correspondences,
        num_no_correspondence: scores.len() - num_correspondences,
    }
}

/// Compute per-point scores for visualization and debugging.
///
/// One entry per input point, 0.0 where there is no correspondence or the
/// point is not finite.
pub fn compute_per_point_scores(
    source_points: &[Point],
    target_grid: &NdtGrid,
    pose: &Isometry3<f64>,
    gauss: &GaussianParams,
) -> Vec<f64> {
    source_points
        .par_iter()
        .map(|p| {
            if !is_finite_point(p) {
                return 0.0;
            }
            score_point(p, target_grid, pose, gauss).unwrap_or(0.0)
        })
        .collect()
}

fn score_point(
    point: &Point,
    grid: &NdtGrid,
    pose: &Isometry3<f64>,
    gauss: &GaussianParams,
) -> Option<f64> {
    let x = transform_point(point, pose);
    let cell = grid.get_by_point(&x)?;
    Some(compute_point_score(
        &Vector3::new(x[0], x[1], x[2]),
        &cell.mean,
        &cell.inv_covariance,
        gauss,
    ))
}

/// NDT score of a single point-cell pair:
/// `-d1 * exp(-d2/2 * (x-μ)ᵀΣ⁻¹(x-μ))`.
fn compute_point_score(
    point: &Vector3<f64>,
    mean: &Vector3<f64>,
    inv_covariance: &Matrix3<f64>,
    gauss: &GaussianParams,
) -> f64 {
    let diff = point - mean;
    gauss.score(diff.dot(&(inv_covariance * diff)))
}
