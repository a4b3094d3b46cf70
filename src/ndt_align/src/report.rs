//! Run report: what was registered, how well, and how long it took.

use std::fmt;
use std::time::Duration;

use nalgebra::Isometry3;
use ndt_core::{AlignResult, IterationRecord, RegistrationStatus, TransformSummary};
use serde::Serialize;

/// Wall-clock time of each stage, in milliseconds.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageTimings {
    pub downsample_ms: f64,
    pub prepare_target_ms: f64,
    pub registration_ms: f64,
    pub total_ms: f64,
}

impl StageTimings {
    pub fn millis(duration: Duration) -> f64 {
        duration.as_secs_f64() * 1e3
    }
}

/// Input sizes.
#[derive(Debug, Clone, Serialize)]
pub struct CloudSizes {
    pub target_points: usize,
    pub source_points: usize,
    pub filtered_points: usize,
    pub grid_cells: usize,
}

/// Error of the estimate against the known motion between the scans.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct GroundTruthError {
    pub translation: f64,
    pub rotation_deg: f64,
}

impl GroundTruthError {
    /// `estimate` maps the moved scan back, so `estimate * motion` should be
    /// the identity.
    pub fn new(estimate: &Isometry3<f64>, motion: &Isometry3<f64>) -> Self {
        let residual = TransformSummary::from_isometry(&(estimate * motion));
        Self {
            translation: residual.translation_norm,
            rotation_deg: residual.rotation_deg,
        }
    }
}

/// Everything the driver reports about one run.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationReport {
    pub sizes: CloudSizes,
    pub status: RegistrationStatus,
    pub iterations: usize,
    pub score: f64,
    pub transform_probability: f64,
    pub num_correspondences: usize,
    pub oscillation_count: usize,
    /// Final line search rejected a non-zero step.
    pub stalled: bool,
    /// `None` when no source point had a target neighbor in range.
    pub rms: Option<f64>,
    pub num_inliers: usize,
    pub transform: TransformSummary,
    pub ground_truth_error: GroundTruthError,
    pub timings: StageTimings,
    pub history: Vec<IterationRecord>,
}

impl RegistrationReport {
    pub fn new(
        sizes: CloudSizes,
        result: &AlignResult,
        motion: &Isometry3<f64>,
        timings: StageTimings,
    ) -> Self {
        let registration = &result.registration;
        Self {
            sizes,
            status: registration.status,
            iterations: registration.iterations,
            score: registration.score,
            transform_probability: registration.transform_probability,
            num_correspondences: registration.num_correspondences,
            oscillation_count: registration.oscillation_count,
            stalled: registration.stalled,
            rms: result.fitness.rms,
            num_inliers: result.fitness.num_inliers,
            transform: result.summary,
            ground_truth_error: GroundTruthError::new(&registration.transform, motion),
            timings,
            history: registration.history.clone(),
        }
    }
}

impl fmt::Display for RegistrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Target: {} points, source: {} points ({} after downsampling), grid: {} cells",
            self.sizes.target_points,
            self.sizes.source_points,
            self.sizes.filtered_points,
            self.sizes.grid_cells
        )?;
        writeln!(
            f,
            "Status: {:?} after {} iterations (score {:.4}, transform probability {:.4})",
            self.status, self.iterations, self.score, self.transform_probability
        )?;
        if self.stalled {
            writeln!(f, "Warning: line search stalled, the pose may not be optimal")?;
        }
        match self.rms {
            Some(rms) => writeln!(f, "RMS: {rms:.6} ({} inliers)", self.num_inliers)?,
            None => writeln!(f, "RMS: no comparable overlap")?,
        }
        writeln!(f, "{}", self.transform)?;
        writeln!(
            f,
            "Error vs. known motion: {:.6} deg, {:.6} m",
            self.ground_truth_error.rotation_deg, self.ground_truth_error.translation
        )?;
        write!(
            f,
            "Time: {:.3} ms (downsample {:.3}, target {:.3}, registration {:.3})",
            self.timings.total_ms,
            self.timings.downsample_ms,
            self.timings.prepare_target_ms,
            self.timings.registration_ms
        )
    }
}
