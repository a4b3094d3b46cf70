//! Rigid transform helpers: pose vector conversions and summaries.
//!
//! The optimizer works on a 6-vector `[tx, ty, tz, roll, pitch, yaw]` with
//! rotation `R = Rx(roll) * Ry(pitch) * Rz(yaw)`. The angular derivatives in
//! [`crate::derivatives`] assume exactly this order.

use std::fmt;

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3, Vector6};
use serde::Serialize;

/// 6-DOF pose `[tx, ty, tz, roll, pitch, yaw]`.
pub type PoseVector = [f64; 6];

/// Convert a pose vector to an isometry.
pub fn pose_vector_to_isometry(pose: &PoseVector) -> Isometry3<f64> {
    let rotation = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), pose[3])
        * UnitQuaternion::from_axis_angle(&Vector3::y_axis(), pose[4])
        * UnitQuaternion::from_axis_angle(&Vector3::z_axis(), pose[5]);
    Isometry3::from_parts(Translation3::new(pose[0], pose[1], pose[2]), rotation)
}

/// Convert an isometry to a pose vector.
///
/// Pitch is returned in `[-pi/2, pi/2]`.
pub fn isometry_to_pose_vector(isometry: &Isometry3<f64>) -> PoseVector {
    let t = isometry.translation.vector;
    let r = isometry.rotation.to_rotation_matrix();
    let m = r.matrix();

    // R = Rx * Ry * Rz:
    //   R02 = sin(pitch)
    //   R12 = -sin(roll) cos(pitch),  R22 = cos(roll) cos(pitch)
    //   R01 = -cos(pitch) sin(yaw),   R00 = cos(pitch) cos(yaw)
    let pitch = m[(0, 2)].clamp(-1.0, 1.0).asin();
    let roll = (-m[(1, 2)]).atan2(m[(2, 2)]);
    let yaw = (-m[(0, 1)]).atan2(m[(0, 0)]);

    [t.x, t.y, t.z, roll, pitch, yaw]
}

/// Additive parameter update: `pose + step * direction`.
pub fn apply_pose_delta(pose: &PoseVector, direction: &Vector6<f64>, step: f64) -> PoseVector {
    let mut out = *pose;
    for (value, d) in out.iter_mut().zip(direction.iter()) {
        *value += step * d;
    }
    out
}

/// Rotation angle in degrees: `acos((trace(R) - 1) / 2)`.
///
/// The cosine is clamped to `[-1, 1]` since round-off can push it slightly
/// outside for near-identity rotations.
pub fn rotation_angle_deg(isometry: &Isometry3<f64>) -> f64 {
    let trace = isometry.rotation.to_rotation_matrix().matrix().trace();
    ((trace - 1.0) / 2.0).clamp(-1.0, 1.0).acos().to_degrees()
}

/// Euclidean norm of the translation part.
pub fn translation_norm(isometry: &Isometry3<f64>) -> f64 {
    isometry.translation.vector.norm()
}

/// Scalar magnitudes of a rigid transform, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TransformSummary {
    pub rotation_deg: f64,
    pub translation_norm: f64,
}

impl TransformSummary {
    pub fn from_isometry(isometry: &Isometry3<f64>) -> Self {
        Self {
            rotation_deg: rotation_angle_deg(isometry),
            translation_norm: translation_norm(isometry),
        }
    }
}

impl fmt::Display for TransformSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ROTATION: {:.6} deg, TRANSLATION: {:.6} m",
            self.rotation_deg, self.translation_norm
        )
    }
}
