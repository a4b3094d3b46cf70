//! Oscillation detection over an optimizer's pose history.
//!
//! Consecutive translation steps pointing in nearly opposite directions mean
//! the optimizer is bouncing around a ridge instead of climbing it.

use nalgebra::Vector3;

use crate::transform::PoseVector;

/// Cosine below which two consecutive steps count as a reversal (~154 deg).
const INVERSION_VECTOR_THRESHOLD: f64 = -0.9;

/// Run length above which a result is flagged as oscillating.
pub const DEFAULT_OSCILLATION_THRESHOLD: usize = 10;

/// Result of oscillation analysis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OscillationResult {
    /// Longest run of consecutive reversals.
    pub max_oscillation_count: usize,
    pub is_oscillating: bool,
    /// History indices at which a reversal was observed.
    pub oscillation_indices: Vec<usize>,
}

/// Count direction reversals in a pose history (initial pose first).
pub fn count_oscillation(poses: &[PoseVector], threshold: usize) -> OscillationResult {
    let translation = |p: &PoseVector| Vector3::new(p[0], p[1], p[2]);

    let mut run = 0;
    let mut max_run = 0;
    let mut oscillation_indices = Vec::new();

    for i in 2..poses.len() {
        let current = translation(&poses[i]) - translation(&poses[i - 1]);
        let previous = translation(&poses[i - 1]) - translation(&poses[i - 2]);

        let (current_norm, previous_norm) = (current.norm(), previous.norm());
        if current_norm < 1e-10 || previous_norm < 1e-10 {
            run = 0;
            continue;
        }

        let cosine = current.dot(&previous) / (current_norm * previous_norm);
        if cosine < INVERSION_VECTOR_THRESHOLD {
            run += 1;
            oscillation_indices.push(i);
        } else {
            run = 0;
        }
        max_run = max_run.max(run);
    }

    OscillationResult {
        max_oscillation_count: max_run,
        is_oscillating: max_run > threshold,
        oscillation_indices,
    }
}
