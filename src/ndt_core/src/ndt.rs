//! High-level NDT registration API.
//!
//! Wraps grid construction, the Newton optimizer and the fitness evaluation
//! behind one facade.
//!
//! # Example
//!
//! ```ignore
//! use ndt_core::NdtRegistration;
//! use nalgebra::Isometry3;
//!
//! let registration = NdtRegistration::builder()
//!     .resolution(1.0)
//!     .step_size(0.1)
//!     .max_iterations(35)
//!     .build()?;
//!
//! // Grid and spatial index over the target, built once per run
//! let target = registration.prepare_target(&target_points)?;
//!
//! let result = registration.align(&target, &source_points, &Isometry3::identity())?;
//! println!("{:?}, RMS: {:?}, {}", result.status(), result.fitness.rms, result.summary);
//! ```

use nalgebra::Isometry3;
use tracing::info;

use crate::derivatives::GaussianParams;
use crate::error::Result;
use crate::ndt_grid::{NdtGrid, NdtGridConfig};
use crate::optimization::{
    LineSearchConfig, NdtConfig, NdtOptimizer, NdtResult, OptimizationConfig, RegistrationStatus,
};
use crate::pointcloud::{transform_points, Point};
use crate::scoring::{
    compute_per_point_scores, compute_transform_probability, evaluate_fitness_with_index,
    FitnessResult, ScoringResult,
};
use crate::spatial_index::SpatialIndex;
use crate::transform::TransformSummary;

/// Configuration for [`NdtRegistration`].
#[derive(Debug, Clone)]
pub struct NdtRegistrationConfig {
    /// Grid cell edge length in meters.
    pub resolution: f64,

    /// Maximum optimization iterations.
    pub max_iterations: usize,

    /// Convergence threshold for the translation part of a step.
    pub trans_epsilon: f64,

    /// Convergence threshold for the rotation part of a step (radians).
    pub rotation_epsilon: f64,

    /// Maximum step length for the Newton update.
    ///
    /// The Newton step direction is normalized, then scaled by at most
    /// `min(newton_step_norm, step_size)` before the line search shrinks it.
    pub step_size: f64,

    /// Outlier ratio for Gaussian parameters, in (0, 1).
    pub outlier_ratio: f64,

    /// Ridge added to the negated Hessian before solving.
    pub regularization: f64,

    /// Minimum points a cell needs to carry a Gaussian.
    pub min_points_per_cell: usize,

    /// Smallest allowed covariance eigenvalue, relative to the largest.
    pub eigenvalue_ratio_threshold: f64,

    /// Pairs farther apart than this are left out of the RMS fitness.
    pub fitness_max_range: f64,
}

impl Default for NdtRegistrationConfig {
    fn default() -> Self {
        let ndt = NdtConfig::default();
        let grid = NdtGridConfig::default();
        Self {
            resolution: grid.resolution,
            max_iterations: ndt.max_iterations,
            trans_epsilon: ndt.trans_epsilon,
            rotation_epsilon: ndt.rotation_epsilon,
            step_size: ndt.step_size,
            outlier_ratio: ndt.outlier_ratio,
            regularization: ndt.regularization,
            min_points_per_cell: grid.min_points_per_cell,
            eigenvalue_ratio_threshold: grid.eigenvalue_ratio_threshold,
            fitness_max_range: f64::INFINITY,
        }
    }
}

impl NdtRegistrationConfig {
    fn grid_config(&self) -> NdtGridConfig {
        NdtGridConfig {
            resolution: self.resolution,
            min_points_per_cell: self.min_points_per_cell,
            eigenvalue_ratio_threshold: self.eigenvalue_ratio_threshold,
        }
    }

    fn optimization_config(&self) -> OptimizationConfig {
        OptimizationConfig {
            ndt: NdtConfig {
                max_iterations: self.max_iterations,
                trans_epsilon: self.trans_epsilon,
                rotation_epsilon: self.rotation_epsilon,
                step_size: self.step_size,
                outlier_ratio: self.outlier_ratio,
                regularization: self.regularization,
            },
            line_search: LineSearchConfig::default(),
            ..Default::default()
        }
    }
}

/// Builder for [`NdtRegistration`].
#[derive(Debug, Clone, Default)]
pub struct NdtRegistrationBuilder {
    config: NdtRegistrationConfig,
}

impl NdtRegistrationBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolution(mut self, resolution: f64) -> Self {
        self.config.resolution = resolution;
        self
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Set translation epsilon for convergence.
    pub fn transformation_epsilon(mut self, epsilon: f64) -> Self {
        self.config.trans_epsilon = epsilon;
        self
    }

    /// Set rotation epsilon (radians) for convergence.
    pub fn rotation_epsilon(mut self, epsilon: f64) -> Self {
        self.config.rotation_epsilon = epsilon;
        self
    }

    /// Set the step-size ceiling.
    pub fn step_size(mut self, step_size: f64) -> Self {
        self.config.step_size = step_size;
        self
    }

    pub fn outlier_ratio(mut self, outlier_ratio: f64) -> Self {
        self.config.outlier_ratio = outlier_ratio;
        self
    }

    pub fn regularization(mut self, regularization: f64) -> Self {
        self.config.regularization = regularization;
        self
    }

    pub fn min_points_per_cell(mut self, min_points: usize) -> Self {
        self.config.min_points_per_cell = min_points;
        self
    }

    pub fn eigenvalue_ratio_threshold(mut self, ratio: f64) -> Self {
        self.config.eigenvalue_ratio_threshold = ratio;
        self
    }

    /// Set the pair distance beyond which RMS ignores a source point.
    pub fn fitness_max_range(mut self, max_range: f64) -> Self {
        self.config.fitness_max_range = max_range;
        self
    }

    /// Validate the configuration and build the facade.
    pub fn build(self) -> Result<NdtRegistration> {
        NdtRegistration::with_config(self.config)
    }
}

/// Target cloud prepared for registration: NDT grid plus nearest-neighbor
/// index over the same points.
#[derive(Debug)]
pub struct RegistrationTarget {
    points: Vec<Point>,
    grid: NdtGrid,
    index: SpatialIndex,
}

impl RegistrationTarget {
    pub fn grid(&self) -> &NdtGrid {
        &self.grid
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }
}

/// Result of [`NdtRegistration::align`].
#[derive(Debug, Clone)]
pub struct AlignResult {
    /// Optimizer output: transform, status, score, history.
    pub registration: NdtResult,

    /// RMS fitness of the aligned source against the target.
    pub fitness: FitnessResult,

    /// Rotation angle and translation magnitude of the transform.
    pub summary: TransformSummary,
}

impl AlignResult {
    pub fn transform(&self) -> &Isometry3<f64> {
        &self.registration.transform
    }

    pub fn status(&self) -> RegistrationStatus {
        self.registration.status
    }

    pub fn is_converged(&self) -> bool {
        self.registration.is_converged()
    }
}

/// NDT registration facade.
///
/// Holds configuration only; targets are prepared explicitly with
/// [`NdtRegistration::prepare_target`] and passed to every call.
#[derive(Debug, Clone)]
pub struct NdtRegistration {
    config: NdtRegistrationConfig,
    optimizer: NdtOptimizer,
    gauss_params: GaussianParams,
}

impl NdtRegistration {
    /// Default settings at the given resolution.
    pub fn new(resolution: f64) -> Result<Self> {
        Self::with_config(NdtRegistrationConfig {
            resolution,
            ..Default::default()
        })
    }

    /// Fails with [`crate::NdtError::DegenerateGrid`] on a bad resolution and
    /// with [`crate::NdtError::InvalidConfig`] on other out-of-range settings.
    pub fn with_config(config: NdtRegistrationConfig) -> Result<Self> {
        config.grid_config().validate()?;
        let optimizer = NdtOptimizer::new(config.optimization_config())?;
        let gauss_params = GaussianParams::new(config.resolution, config.outlier_ratio);

        Ok(Self {
            config,
            optimizer,
            gauss_params,
        })
    }

    pub fn builder() -> NdtRegistrationBuilder {
        NdtRegistrationBuilder::new()
    }

    pub fn config(&self) -> &NdtRegistrationConfig {
        &self.config
    }

    pub fn gauss_params(&self) -> &GaussianParams {
        &self.gauss_params
    }

    /// Build the NDT grid alone.
    pub fn build_grid(&self, target: &[Point]) -> Result<NdtGrid> {
        NdtGrid::build(target, self.config.grid_config())
    }

    /// Build the grid and the nearest-neighbor index over `target`.
    ///
    /// Fails with [`crate::NdtError::DegenerateGrid`] if the target has no
    /// finite point.
    pub fn prepare_target(&self, target: &[Point]) -> Result<RegistrationTarget> {
        let grid = self.build_grid(target)?;
        let index = SpatialIndex::build(target)?;

        info!(
            points = index.len(),
            cells = grid.len(),
            resolution = grid.resolution(),
            "Prepared registration target"
        );

        Ok(RegistrationTarget {
            points: target.to_vec(),
            grid,
            index,
        })
    }

    /// Register `source` to `target`, then evaluate the RMS fitness of the
    /// aligned source.
    pub fn align(
        &self,
        target: &RegistrationTarget,
        source: &[Point],
        initial_guess: &Isometry3<f64>,
    ) -> Result<AlignResult> {
        let registration = self
            .optimizer
            .register(source, &target.grid, initial_guess)?;
        let fitness = self.evaluate_fitness(target, source, &registration.transform);
        let summary = TransformSummary::from_isometry(&registration.transform);

        Ok(AlignResult {
            registration,
            fitness,
            summary,
        })
    }

    /// RMS fitness of `source` moved by `pose` against the target.
    pub fn evaluate_fitness(
        &self,
        target: &RegistrationTarget,
        source: &[Point],
        pose: &Isometry3<f64>,
    ) -> FitnessResult {
        let aligned = transform_points(source, pose);
        evaluate_fitness_with_index(
            &target.index,
            &target.points,
            &aligned,
            self.config.fitness_max_range,
        )
    }

    /// Transform probability of `source` at `pose`.
    pub fn evaluate_transform_probability(
        &self,
        target: &RegistrationTarget,
        source: &[Point],
        pose: &Isometry3<f64>,
    ) -> ScoringResult {
        compute_transform_probability(source, &target.grid, pose, &self.gauss_params)
    }

    /// NDT score of every source point at `pose`.
    pub fn compute_per_point_scores(
        &self,
        target: &RegistrationTarget,
        source: &[Point],
        pose: &Isometry3<f64>,
    ) -> Vec<f64> {
        compute_per_point_scores(source, &target.grid, pose, &self.gauss_params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NdtError;
    use crate::test_utils::make_offset_half_cubic_pcd;

    fn registration() -> NdtRegistration {
        NdtRegistration::builder()
            .resolution(2.0)
            .max_iterations(60)
            .transformation_epsilon(1e-3)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder() {
        let registration = NdtRegistration::builder()
            .resolution(1.5)
            .max_iterations(50)
            .step_size(0.2)
            .outlier_ratio(0.4)
            .min_points_per_cell(8)
            .fitness_max_range(3.0)
            .build()
            .unwrap();

        let config = registration.config();
        assert_eq!(config.resolution, 1.5);
        assert_eq!(config.max_iterations, 50);
        assert_eq!(config.step_size, 0.2);
        assert_eq!(config.outlier_ratio, 0.4);
        assert_eq!(config.min_points_per_cell, 8);
        assert_eq!(config.fitness_max_range, 3.0);
        assert_eq!(
            *registration.gauss_params(),
            GaussianParams::new(1.5, 0.4)
        );
    }

    #[test]
    fn test_builder_rejects_invalid() {
        assert!(matches!(
            NdtRegistration::builder().max_iterations(0).build(),
            Err(NdtError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_bad_resolution_is_degenerate_grid() {
        for resolution in [-1.0, 0.0, f64::NAN] {
            assert!(
                matches!(
                    NdtRegistration::new(resolution),
                    Err(NdtError::DegenerateGrid { .. })
                ),
                "{resolution}"
            );
        }
        assert!(matches!(
            NdtRegistration::builder().resolution(0.0).build(),
            Err(NdtError::DegenerateGrid { .. })
        ));
    }

    #[test]
    fn test_prepare_target_empty() {
        let registration = registration();
        assert!(matches!(
            registration.prepare_target(&[]),
            Err(NdtError::DegenerateGrid { .. })
        ));
    }

    #[test]
    fn test_align_identity() {
        let registration = registration();
        let points = make_offset_half_cubic_pcd(10.0, 0.2);
        let target = registration.prepare_target(&points).unwrap();

        let result = registration
            .align(&target, &points, &Isometry3::identity())
            .unwrap();

        assert!(result.is_converged());
        assert!(result.summary.translation_norm < 0.02);
        assert!(result.summary.rotation_deg < 0.2);
        assert!(result.fitness.rms.unwrap() < 0.02);
        assert_eq!(result.fitness.num_inliers, points.len());
    }

    #[test]
    fn test_align_with_translation() {
        let registration = registration();
        let points = make_offset_half_cubic_pcd(10.0, 0.2);
        let target = registration.prepare_target(&points).unwrap();
        let offset = Isometry3::translation(0.2, 0.15, -0.1);
        let source = transform_points(&points, &offset);

        let result = registration
            .align(&target, &source, &Isometry3::identity())
            .unwrap();

        let residual = result.transform() * offset;
        assert!(residual.translation.vector.norm() < 0.08);
        assert!(result.fitness.rms.unwrap() < 0.1);
    }

    #[test]
    fn test_scores_better_when_aligned() {
        let registration = registration();
        let points = make_offset_half_cubic_pcd(10.0, 0.2);
        let target = registration.prepare_target(&points).unwrap();

        let aligned =
            registration.evaluate_transform_probability(&target, &points, &Isometry3::identity());
        let shifted = registration.evaluate_transform_probability(
            &target,
            &points,
            &Isometry3::translation(0.5, 0.0, 0.0),
        );
        assert!(aligned.transform_probability > shifted.transform_probability);

        let scores =
            registration.compute_per_point_scores(&target, &points, &Isometry3::identity());
        assert_eq!(scores.len(), points.len());
        assert!(scores.iter().all(|s| *s >= 0.0));
    }
}
