//! Synthetic scenes with known geometry.
//!
//! Used by the unit and integration tests and by the `ndt_align` driver,
//! which registers a synthetic scan pair instead of reading files.

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};

use crate::filtering::voxel_downsample;
use crate::pointcloud::{is_finite_point, transform_points, Point};

/// Three orthogonal planes forming a half-cube:
/// - z=0 plane: x∈[0,length], y∈[0,length]
/// - x=0 plane: y∈[0,length], z∈[0,length]
/// - y=0 plane: x∈[0,length], z∈[0,length]
///
/// Produces `3 * (length/interval + 1)²` points.
pub fn make_half_cubic_pcd(length: f32, interval: f32) -> Vec<Point> {
    let n = ((length / interval).round() as usize) + 1;
    let mut points = Vec::with_capacity(3 * n * n);

    for i in 0..n {
        for j in 0..n {
            let u = interval * j as f32;
            let v = interval * i as f32;
            points.push([u, v, 0.0]);
            points.push([0.0, u, v]);
            points.push([u, 0.0, v]);
        }
    }

    points
}

/// Half-cube shifted by +1 on every axis.
///
/// At even grid resolutions the planes then sit in the middle of a cell
/// instead of on a cell boundary.
pub fn make_offset_half_cubic_pcd(length: f32, interval: f32) -> Vec<Point> {
    make_half_cubic_pcd(length, interval)
        .into_iter()
        .map(|p| [p[0] + 1.0, p[1] + 1.0, p[2] + 1.0])
        .collect()
}

/// Default scene: 20 m half-cube at 0.2 m spacing, offset by +1.
pub fn make_default_scene() -> Vec<Point> {
    make_offset_half_cubic_pcd(20.0, 0.2)
}

/// Rigid transform from a translation and Z-Y-X Euler angles in degrees.
pub fn make_transform(translation: [f64; 3], yaw_deg: f64, pitch_deg: f64, roll_deg: f64) -> Isometry3<f64> {
    let rotation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), yaw_deg.to_radians())
        * UnitQuaternion::from_axis_angle(&Vector3::y_axis(), pitch_deg.to_radians())
        * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), roll_deg.to_radians());
    Isometry3::from_parts(
        Translation3::new(translation[0], translation[1], translation[2]),
        rotation,
    )
}

/// A second "scan" of `scene`: moved by `motion`, then downsampled.
pub fn make_scan(scene: &[Point], motion: &Isometry3<f64>, leaf_size: f64) -> Vec<Point> {
    voxel_downsample(&transform_points(scene, motion), leaf_size)
}

/// Axis-aligned bounds `(min, max)` of the finite points.
pub fn compute_bounds(points: &[Point]) -> ([f32; 3], [f32; 3]) {
    let mut min = [f32::MAX; 3];
    let mut max = [f32::MIN; 3];

    for p in points.iter().filter(|p| is_finite_point(p)) {
        for i in 0..3 {
            min[i] = min[i].min(p[i]);
            max[i] = max[i].max(p[i]);
        }
    }

    (min, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_half_cubic_point_count() {
        let pcd = make_half_cubic_pcd(20.0, 0.2);
        assert_eq!(pcd.len(), 3 * 101 * 101);
    }

    #[test]
    fn test_half_cubic_planes() {
        let pcd = make_half_cubic_pcd(20.0, 0.2);
        let n = 101;

        // Interior of the z=0 plane, away from the shared edges
        let xy_strict = pcd
            .iter()
            .filter(|p| p[2].abs() < 0.01 && p[0].abs() > 0.01 && p[1].abs() > 0.01)
            .count();
        assert_eq!(xy_strict, (n - 1) * (n - 1));
    }

    #[test]
    fn test_offset_scene_bounds() {
        let (min, max) = compute_bounds(&make_default_scene());
        for i in 0..3 {
            assert_relative_eq!(min[i], 1.0, epsilon = 1e-5);
            assert_relative_eq!(max[i], 21.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_make_transform() {
        let t = make_transform([1.0, 2.0, 3.0], 90.0, 0.0, 0.0);
        let p = t * nalgebra::Point3::new(1.0, 0.0, 0.0);
        assert_relative_eq!(p.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, 3.0, epsilon = 1e-12);
        assert_relative_eq!(p.z, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_make_scan_downsamples() {
        let scene = make_offset_half_cubic_pcd(10.0, 0.2);
        let scan = make_scan(&scene, &Isometry3::translation(0.1, 0.0, 0.0), 1.0);

        assert!(scan.len() < scene.len() / 10);
        assert!(scan.len() > 100);
    }
}
