//! Normal Distributions Transform (NDT) registration of 3D point clouds.
//!
//! This library aligns a source scan to a target scan of the same scene by
//! modelling the target as a grid of local Gaussians and maximizing the
//! NDT score of the transformed source with Newton's method. The result is
//! judged with an RMS nearest-neighbor fitness.
//!
//! # Architecture
//!
//! The algorithm is split into phases:
//! - Phase 1: Grid construction from the target cloud ([`ndt_grid`])
//! - Phase 2: Derivative computation, score + gradient + Hessian ([`derivatives`])
//! - Phase 3: Newton optimization with backtracking ([`optimization`])
//! - Phase 4: Scoring, transform probability and RMS fitness ([`scoring`])
//!
//! # Usage
//!
//! ```ignore
//! use ndt_core::{filtering::voxel_downsample, NdtRegistration};
//! use nalgebra::Isometry3;
//!
//! let registration = NdtRegistration::builder()
//!     .resolution(1.0)
//!     .step_size(0.1)
//!     .max_iterations(35)
//!     .build()?;
//!
//! let target = registration.prepare_target(&first_scan)?;
//! let source = voxel_downsample(&second_scan, 0.2);
//!
//! let result = registration.align(&target, &source, &Isometry3::identity())?;
//! println!("RMS: {:?}", result.fitness.rms);
//! println!("{}", result.summary);
//! ```

pub mod derivatives;
pub mod error;
pub mod filtering;
pub mod ndt;
pub mod ndt_grid;
pub mod optimization;
pub mod pointcloud;
pub mod scoring;
pub mod spatial_index;
pub mod test_utils;
pub mod transform;

pub use derivatives::{compute_derivatives, AngularDerivatives, GaussianParams, ScoreDerivatives};
pub use error::{DivergenceReason, NdtError, Result};
pub use ndt_grid::{CellCoord, GridCell, NdtGrid, NdtGridConfig};
pub use optimization::{
    register, IterationRecord, LineSearchConfig, NdtConfig, NdtOptimizer, NdtResult,
    OptimizationConfig, RegistrationStatus,
};
pub use pointcloud::Point;
pub use scoring::{
    compute_per_point_scores, compute_rms, compute_transform_probability, evaluate_fitness,
    FitnessResult, ScoringResult, NO_OVERLAP_RMS,
};
pub use spatial_index::{Neighbor, SpatialIndex};
pub use transform::TransformSummary;

// High-level API (recommended for most users)
pub use ndt::{
    AlignResult, NdtRegistration, NdtRegistrationBuilder, NdtRegistrationConfig,
    RegistrationTarget,
};
