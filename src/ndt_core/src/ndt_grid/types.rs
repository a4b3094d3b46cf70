//! Type definitions for the NDT grid.

use nalgebra::{Matrix3, Vector3};

use crate::error::{NdtError, Result};

/// Configuration for NDT grid construction.
#[derive(Debug, Clone)]
pub struct NdtGridConfig {
    /// Cell edge length in meters.
    pub resolution: f64,
    /// Minimum number of points for a cell to carry a Gaussian.
    /// Cells with fewer points are discarded.
    pub min_points_per_cell: usize,
    /// Small covariance eigenvalues are raised to this fraction of the largest.
    pub eigenvalue_ratio_threshold: f64,
}

impl Default for NdtGridConfig {
    fn default() -> Self {
        Self {
            resolution: 1.0,
            min_points_per_cell: 6,
            eigenvalue_ratio_threshold: 0.01,
        }
    }
}

impl NdtGridConfig {
    /// Default configuration at the given resolution.
    pub fn with_resolution(resolution: f64) -> Self {
        Self {
            resolution,
            ..Default::default()
        }
    }

    /// Fails with [`NdtError::DegenerateGrid`] unless the resolution is a
    /// positive finite number, and with [`NdtError::InvalidConfig`] on an
    /// eigenvalue ratio outside (0, 1].
    pub fn validate(&self) -> Result<()> {
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(NdtError::degenerate_grid(format!(
                "resolution must be positive and finite, got {}",
                self.resolution
            )));
        }
        if !(self.eigenvalue_ratio_threshold > 0.0 && self.eigenvalue_ratio_threshold <= 1.0) {
            return Err(NdtError::invalid_config(format!(
                "eigenvalue ratio threshold must be in (0, 1], got {}",
                self.eigenvalue_ratio_threshold
            )));
        }
        Ok(())
    }
}

/// A single occupied grid cell holding a Gaussian fitted to its points.
#[derive(Debug, Clone)]
pub struct GridCell {
    /// Mean of the contained points.
    pub mean: Vector3<f64>,
    /// Regularized 3x3 covariance matrix.
    pub covariance: Matrix3<f64>,
    /// Inverse of the regularized covariance.
    pub inv_covariance: Matrix3<f64>,
    /// Number of points used to compute this cell's statistics.
    pub point_count: usize,
}

impl GridCell {
    /// Create a cell from accumulated point statistics.
    ///
    /// # Arguments
    /// * `sum` - Sum of all points in this cell
    /// * `sum_sq` - Sum of outer products (x * x^T) for all points
    /// * `count` - Number of points
    /// * `config` - Configuration for thresholds and regularization
    ///
    /// Returns `None` if the cell has too few points or zero spread.
    pub fn from_statistics(
        sum: &Vector3<f64>,
        sum_sq: &Matrix3<f64>,
        count: usize,
        config: &NdtGridConfig,
    ) -> Option<Self> {
        if count < config.min_points_per_cell.max(2) {
            return None;
        }

        let n = count as f64;
        let mean = sum / n;

        // Cov = (sum_sq - n * mean * mean^T) / (n - 1)
        let mean_outer = mean * mean.transpose();
        let covariance = (sum_sq - mean_outer * n) / (n - 1.0);
        // Cancellation in the single-pass formula can leave tiny asymmetries.
        let covariance = (covariance + covariance.transpose()) * 0.5;

        let (regularized, inv_covariance) =
            regularize_covariance(&covariance, config.eigenvalue_ratio_threshold)?;

        Some(Self {
            mean,
            covariance: regularized,
            inv_covariance,
            point_count: count,
        })
    }
}

/// Regularize a covariance matrix by inflating small eigenvalues.
///
/// Eigenvalues below `ratio_threshold * max_eigenvalue` (including any
/// slightly negative ones produced by round-off) are raised to that floor, so
/// near-planar or near-linear clusters still have a well-conditioned inverse.
///
/// Returns `(regularized_covariance, inverse_covariance)`, or `None` if the
/// largest eigenvalue is not positive.
pub fn regularize_covariance(
    cov: &Matrix3<f64>,
    ratio_threshold: f64,
) -> Option<(Matrix3<f64>, Matrix3<f64>)> {
    let eigen = cov.symmetric_eigen();
    let mut eigenvalues = eigen.eigenvalues;

    let max_eigenvalue = eigenvalues.iter().copied().fold(0.0_f64, f64::max);
    if !(max_eigenvalue > 0.0) || !max_eigenvalue.is_finite() {
        return None;
    }

    let min_eigenvalue = max_eigenvalue * ratio_threshold;
    for ev in eigenvalues.iter_mut() {
        if *ev < min_eigenvalue {
            *ev = min_eigenvalue;
        }
    }

    // V * D * V^T and V * D^{-1} * V^T
    let eigenvectors = &eigen.eigenvectors;
    let regularized = eigenvectors * Matrix3::from_diagonal(&eigenvalues) * eigenvectors.transpose();
    let inv_eigenvalues = eigenvalues.map(|ev| 1.0 / ev);
    let inverse =
        eigenvectors * Matrix3::from_diagonal(&inv_eigenvalues) * eigenvectors.transpose();

    Some((regularized, inverse))
}

/// Integer cell coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl CellCoord {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Cell containing a point: floor-divide each coordinate by resolution.
    ///
    /// Returns `None` for non-finite input and when an index does not fit in
    /// `i32`, so distant points are never folded into a saturated edge cell.
    pub fn from_point(point: &[f64; 3], resolution: f64) -> Option<Self> {
        Some(Self {
            x: cell_index(point[0], resolution)?,
            y: cell_index(point[1], resolution)?,
            z: cell_index(point[2], resolution)?,
        })
    }
}

fn cell_index(coordinate: f64, resolution: f64) -> Option<i32> {
    let index = (coordinate / resolution).floor();
    // NaN fails both comparisons
    if index >= i32::MIN as f64 && index <= i32::MAX as f64 {
        Some(index as i32)
    } else {
        None
    }
}
