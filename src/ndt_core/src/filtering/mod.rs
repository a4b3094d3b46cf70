//! Voxel-grid downsampling of point clouds.
//!
//! Each occupied leaf cell is replaced by the centroid of its points.
//! Output order follows the first appearance of each cell in the input, so
//! the same cloud always downsamples to the same sequence.

use std::collections::HashMap;

use crate::ndt_grid::CellCoord;
use crate::pointcloud::{finite_points, Point};

/// Downsample `points` with cubic leaves of edge `leaf_size`.
///
/// Non-finite points are dropped. A non-positive or non-finite leaf size
/// returns the finite points unchanged.
pub fn voxel_downsample(points: &[Point], leaf_size: f64) -> Vec<Point> {
    if !(leaf_size.is_finite() && leaf_size > 0.0) {
        return finite_points(points).map(|(_, p)| *p).collect();
    }

    let mut slots: HashMap<CellCoord, usize> = HashMap::new();
    // (sum_x, sum_y, sum_z, count) per leaf, in first-seen order
    let mut sums: Vec<([f64; 3], usize)> = Vec::new();

    for (_, p) in finite_points(points) {
        let v = [p[0] as f64, p[1] as f64, p[2] as f64];
        let Some(coord) = CellCoord::from_point(&v, leaf_size) else {
            continue;
        };
        let slot = *slots.entry(coord).or_insert_with(|| {
            sums.push(([0.0; 3], 0));
            sums.len() - 1
        });
        let (sum, count) = &mut sums[slot];
        sum[0] += v[0];
        sum[1] += v[1];
        sum[2] += v[2];
        *count += 1;
    }

    sums.into_iter()
        .map(|(sum, count)| {
            let n = count as f64;
            [(sum[0] / n) as f32, (sum[1] / n) as f32, (sum[2] / n) as f32]
        })
        .collect()
}
