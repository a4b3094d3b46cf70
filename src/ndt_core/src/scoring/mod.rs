//! Scoring and quality metrics for NDT scan matching.
//!
//! This module provides metrics to evaluate alignment quality:
//! - **Transform Probability**: Average NDT score normalized per correspondence
//! - **Per-point scores**: Individual scores for visualization/debugging
//! - **RMS fitness**: Root-mean-square nearest-neighbor distance over the
//!   overlapping part of two clouds
//!
//! Based on Autoware's NDT implementation and Magnusson 2009.

pub mod fitness;
pub mod metrics;

pub use fitness::{
    compute_rms, evaluate_fitness, evaluate_fitness_with_index, FitnessResult, NO_OVERLAP_RMS,
};
pub use metrics::{compute_per_point_scores, compute_transform_probability, ScoringResult};
