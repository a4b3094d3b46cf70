//! Derivatives of `Rx(roll) * Ry(pitch) * Rz(yaw)` with respect to the angles.
//!
//! Each row is a coefficient triple; dotting it with a source point gives one
//! non-zero component of the point's Jacobian or Hessian (Magnusson 2009,
//! Eq. 6.19 and 6.21). The rows depend only on the pose, so they are
//! computed once per iteration and shared by every source point.

/// Below this magnitude an angle is treated as exactly zero.
const ANGLE_EPSILON: f64 = 1e-5;

fn sin_cos(angle: f64) -> (f64, f64) {
    if angle.abs() < ANGLE_EPSILON {
        (0.0, 1.0)
    } else {
        angle.sin_cos()
    }
}

#[inline]
fn dot(row: &[f64; 3], p: &[f64; 3]) -> f64 {
    row[0] * p[0] + row[1] * p[1] + row[2] * p[2]
}

/// Angular coefficient rows for one pose.
#[derive(Debug, Clone)]
pub struct AngularDerivatives {
    /// First derivatives, in order
    /// `[dy/droll, dz/droll, dx/dpitch, dy/dpitch, dz/dpitch, dx/dyaw, dy/dyaw, dz/dyaw]`.
    /// `dx/droll` is identically zero.
    pub jacobian_rows: [[f64; 3]; 8],
    /// Second derivatives `[a2, a3, b2, b3, c2, c3, d1, d2, d3, e1, e2, e3, f1, f2, f3]`
    /// where a = roll/roll, b = roll/pitch, c = roll/yaw, d = pitch/pitch,
    /// e = pitch/yaw and f = yaw/yaw. Zero when not requested.
    pub hessian_rows: [[f64; 3]; 15],
}

impl AngularDerivatives {
    pub fn new(roll: f64, pitch: f64, yaw: f64, compute_hessian: bool) -> Self {
        let (sx, cx) = sin_cos(roll);
        let (sy, cy) = sin_cos(pitch);
        let (sz, cz) = sin_cos(yaw);

        let jacobian_rows = [
            [-sx * sz + cx * sy * cz, -sx * cz - cx * sy * sz, -cx * cy],
            [cx * sz + sx * sy * cz, cx * cz - sx * sy * sz, -sx * cy],
            [-sy * cz, sy * sz, cy],
            [sx * cy * cz, -sx * cy * sz, sx * sy],
            [-cx * cy * cz, cx * cy * sz, -cx * sy],
            [-cy * sz, -cy * cz, 0.0],
            [cx * cz - sx * sy * sz, -cx * sz - sx * sy * cz, 0.0],
            [sx * cz + cx * sy * sz, cx * sy * cz - sx * sz, 0.0],
        ];

        let hessian_rows = if compute_hessian {
            [
                // a: roll, roll
                [-cx * sz - sx * sy * cz, -cx * cz + sx * sy * sz, sx * cy],
                [-sx * sz + cx * sy * cz, -cx * sy * sz - sx * cz, -cx * cy],
                // b: roll, pitch
                [cx * cy * cz, -cx * cy * sz, cx * sy],
                [sx * cy * cz, -sx * cy * sz, sx * sy],
                // c: roll, yaw
                [-sx * cz - cx * sy * sz, sx * sz - cx * sy * cz, 0.0],
                [cx * cz - sx * sy * sz, -sx * sy * cz - cx * sz, 0.0],
                // d: pitch, pitch
                [-cy * cz, cy * sz, -sy],
                [-sx * sy * cz, sx * sy * sz, sx * cy],
                [cx * sy * cz, -cx * sy * sz, -cx * cy],
                // e: pitch, yaw
                [sy * sz, sy * cz, 0.0],
                [-sx * cy * sz, -sx * cy * cz, 0.0],
                [cx * cy * sz, cx * cy * cz, 0.0],
                // f: yaw, yaw
                [-cy * cz, cy * sz, 0.0],
                [-cx * sz - sx * sy * cz, -cx * cz + sx * sy * sz, 0.0],
                [-sx * sz + cx * sy * cz, -cx * sy * sz - sx * cz, 0.0],
            ]
        } else {
            [[0.0; 3]; 15]
        };

        Self {
            jacobian_rows,
            hessian_rows,
        }
    }

    /// Rotation part of the point Jacobian for source point `p`.
    pub fn point_gradient_terms(&self, p: &[f64; 3]) -> [f64; 8] {
        self.jacobian_rows.map(|row| dot(&row, p))
    }

    /// Rotation part of the point Hessian for source point `p`.
    pub fn point_hessian_terms(&self, p: &[f64; 3]) -> [f64; 15] {
        self.hessian_rows.map(|row| dot(&row, p))
    }
}
