//! Point and point cloud helpers.
//!
//! Clouds are plain `[f32; 3]` slices. Sensors routinely report NaN/Inf
//! returns, so every consumer filters through [`is_finite_point`].

use nalgebra::{Isometry3, Point3};

/// A 3D point `[x, y, z]`.
pub type Point = [f32; 3];

/// Check that all three coordinates are finite.
#[inline]
pub fn is_finite_point(point: &Point) -> bool {
    point[0].is_finite() && point[1].is_finite() && point[2].is_finite()
}

/// Iterate over the finite points of a cloud, keeping their original indices.
pub fn finite_points(points: &[Point]) -> impl Iterator<Item = (usize, &Point)> {
    points
        .iter()
        .enumerate()
        .filter(|(_, point)| is_finite_point(point))
}

/// Number of finite points in a cloud.
pub fn count_finite(points: &[Point]) -> usize {
    points.iter().filter(|p| is_finite_point(p)).count()
}

/// Apply a rigid transform to a single point in f64.
#[inline]
pub fn transform_point(point: &Point, transform: &Isometry3<f64>) -> [f64; 3] {
    let p = transform * Point3::new(point[0] as f64, point[1] as f64, point[2] as f64);
    [p.x, p.y, p.z]
}

/// Apply a rigid transform to a whole cloud.
///
/// Non-finite points are passed through unchanged so indices stay aligned
/// with the input.
pub fn transform_points(points: &[Point], transform: &Isometry3<f64>) -> Vec<Point> {
    points
        .iter()
        .map(|p| {
            if !is_finite_point(p) {
                return *p;
            }
            let t = transform_point(p, transform);
            [t[0] as f32, t[1] as f32, t[2] as f32]
        })
        .collect()
}
