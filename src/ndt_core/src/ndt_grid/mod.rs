//! NDT grid construction and lookup.
//!
//! The target cloud is partitioned into cubes of edge `resolution`. Every
//! cube holding enough points stores a Gaussian (mean, regularized
//! covariance and its inverse). Lookups by point go through a hash keyed by
//! integer cell coordinates, so locating the cell of a transformed source
//! point is O(1).

mod cpu;
pub mod types;

pub use types::{regularize_covariance, CellCoord, GridCell, NdtGridConfig};

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::{NdtError, Result};
use crate::pointcloud::Point;

/// Occupied cells of a target cloud, each carrying a Gaussian.
///
/// Built once per registration and read-only afterwards.
#[derive(Debug)]
pub struct NdtGrid {
    config: NdtGridConfig,
    cells: HashMap<CellCoord, GridCell>,
}

impl NdtGrid {
    /// Build a grid at `resolution` with default thresholds.
    ///
    /// ```ignore
    /// let grid = NdtGrid::from_points(&target, 2.0)?;
    /// ```
    pub fn from_points(points: &[Point], resolution: f64) -> Result<Self> {
        Self::build(points, NdtGridConfig::with_resolution(resolution))
    }

    /// Build a grid with custom configuration.
    ///
    /// Fails with [`NdtError::DegenerateGrid`] if the resolution is not a
    /// positive finite number or the target has no finite point. A grid whose
    /// cells were all dropped for lack of points is returned as-is; it simply
    /// scores nothing.
    pub fn build(points: &[Point], config: NdtGridConfig) -> Result<Self> {
        config.validate()?;

        let built = cpu::build_cells(points, &config);
        if built.binned_points == 0 {
            let reason = if built.out_of_range_points > 0 {
                format!(
                    "resolution {} is too small for the cloud extent: no cell index fits in i32",
                    config.resolution
                )
            } else {
                "target cloud has no finite points".to_string()
            };
            return Err(NdtError::degenerate_grid(reason));
        }
        if built.out_of_range_points > 0 {
            warn!(
                skipped = built.out_of_range_points,
                resolution = config.resolution,
                "Points beyond the addressable cell range were skipped"
            );
        }

        debug!(
            points = built.binned_points,
            cells = built.cells.len(),
            dropped = built.dropped_cells,
            resolution = config.resolution,
            "Built NDT grid"
        );

        Ok(Self {
            config,
            cells: built.cells,
        })
    }

    /// Number of cells carrying a Gaussian.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, coord: &CellCoord) -> Option<&GridCell> {
        self.cells.get(coord)
    }

    /// Cell containing `point`, if it carries a Gaussian.
    pub fn get_by_point(&self, point: &[f64; 3]) -> Option<&GridCell> {
        let coord = CellCoord::from_point(point, self.config.resolution)?;
        self.cells.get(&coord)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CellCoord, &GridCell)> {
        self.cells.iter()
    }

    pub fn resolution(&self) -> f64 {
        self.config.resolution
    }

    pub fn config(&self) -> &NdtGridConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix3, Vector3};
    use rand::prelude::*;
    use rand::rngs::StdRng;
    use rand_distr::Normal;

    fn generate_test_points() -> Vec<Point> {
        let mut rng = StdRng::seed_from_u64(42);
        // Small spread keeps every cluster inside one cell at resolution 2.0
        let dist = Normal::new(0.0f32, 0.1).unwrap();

        let centers = [[1.0, 1.0, 1.0], [11.0, 1.0, 1.0], [1.0, 11.0, 1.0]];
        let mut points = Vec::new();
        for center in &centers {
            for _ in 0..50 {
                points.push([
                    center[0] + dist.sample(&mut rng),
                    center[1] + dist.sample(&mut rng),
                    center[2] + dist.sample(&mut rng),
                ]);
            }
        }
        points
    }

    #[test]
    fn test_grid_from_points() {
        let points = generate_test_points();
        let grid = NdtGrid::from_points(&points, 2.0).unwrap();

        assert_eq!(grid.len(), 3, "Expected 3 cells but got {}", grid.len());
        assert_eq!(grid.resolution(), 2.0);
    }

    #[test]
    fn test_get_by_point() {
        let points = generate_test_points();
        let grid = NdtGrid::from_points(&points, 2.0).unwrap();

        let cell = grid.get_by_point(&[0.1, 0.1, 0.1]).unwrap();
        assert_eq!(cell.point_count, 50);

        assert!(grid.get_by_point(&[5.0, 5.0, 5.0]).is_none());
        assert!(grid.get_by_point(&[f64::NAN, 0.0, 0.0]).is_none());
    }

    #[test]
    fn test_mean_is_arithmetic_mean() {
        let points = generate_test_points();
        let grid = NdtGrid::from_points(&points, 2.0).unwrap();

        for (coord, cell) in grid.iter() {
            let members: Vec<Vector3<f64>> = points
                .iter()
                .map(|p| [p[0] as f64, p[1] as f64, p[2] as f64])
                .filter(|p| CellCoord::from_point(p, 2.0).as_ref() == Some(coord))
                .map(|p| Vector3::new(p[0], p[1], p[2]))
                .collect();
            let mean = members.iter().sum::<Vector3<f64>>() / members.len() as f64;

            assert_eq!(cell.point_count, members.len());
            assert_relative_eq!(cell.mean, mean, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_covariance_symmetric_positive_definite() {
        let points = generate_test_points();
        let grid = NdtGrid::from_points(&points, 2.0).unwrap();

        for (_, cell) in grid.iter() {
            assert_relative_eq!(cell.covariance, cell.covariance.transpose(), epsilon = 1e-12);
            assert_relative_eq!(
                cell.inv_covariance,
                cell.inv_covariance.transpose(),
                epsilon = 1e-6
            );

            let eigen = cell.covariance.symmetric_eigen();
            assert!(eigen.eigenvalues.iter().all(|&ev| ev > 0.0));

            let product = cell.covariance * cell.inv_covariance;
            assert_relative_eq!(product, Matrix3::identity(), epsilon = 1e-6);
        }
    }

    #[test]
    fn test_planar_cell_regularized() {
        // Points on z = 1 give a rank-2 sample covariance.
        let points: Vec<Point> = (0..10)
            .flat_map(|i| (0..10).map(move |j| [0.1 + i as f32 * 0.15, 0.1 + j as f32 * 0.15, 1.0]))
            .collect();
        let grid = NdtGrid::from_points(&points, 2.0).unwrap();
        assert_eq!(grid.len(), 1);

        let cell = grid.get_by_point(&[1.0, 1.0, 1.0]).unwrap();
        assert!(cell.inv_covariance.iter().all(|v| v.is_finite()));
        let eigen = cell.covariance.symmetric_eigen();
        let max_ev = eigen.eigenvalues.max();
        let min_ev = eigen.eigenvalues.min();
        assert_relative_eq!(min_ev, max_ev * 0.01, epsilon = 1e-9);
    }

    #[test]
    fn test_all_cells_sparse_gives_empty_grid() {
        let points = vec![[0.5, 0.5, 0.5], [0.6, 0.5, 0.5], [0.5, 0.6, 0.5]];
        let grid = NdtGrid::from_points(&points, 2.0).unwrap();
        assert!(grid.is_empty());
    }

    #[test]
    fn test_invalid_resolution() {
        let points = generate_test_points();
        for resolution in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = NdtGrid::from_points(&points, resolution).unwrap_err();
            assert!(matches!(err, NdtError::DegenerateGrid { .. }), "{resolution}");
        }
    }

    #[test]
    fn test_tiny_resolution_keeps_points_apart() {
        // 20 points over 5 m, one per cell at 1e-7 m: every cell is too sparse
        let points: Vec<Point> = (0..20).map(|i| [0.25 * i as f32, 0.0, 0.0]).collect();
        let grid = NdtGrid::from_points(&points, 1e-7).unwrap();
        assert!(grid.is_empty());
    }

    #[test]
    fn test_cell_index_overflow_is_degenerate() {
        // x / 1e-7 exceeds i32::MAX for every point; none may share a saturated cell
        let points: Vec<Point> = (0..20).map(|i| [1000.0 + 0.25 * i as f32, 0.0, 0.0]).collect();
        let err = NdtGrid::from_points(&points, 1e-7).unwrap_err();
        match err {
            NdtError::DegenerateGrid { reason } => assert!(reason.contains("too small"), "{reason}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_out_of_range_points_skipped() {
        let mut points = generate_test_points();
        let reference = NdtGrid::from_points(&points, 2.0).unwrap();
        points.extend((0..10).map(|i| [1e10, i as f32, 0.0]));

        let grid = NdtGrid::from_points(&points, 2.0).unwrap();
        assert_eq!(grid.len(), reference.len());
    }

    #[test]
    fn test_empty_target() {
        let err = NdtGrid::from_points(&[], 2.0).unwrap_err();
        assert!(matches!(err, NdtError::DegenerateGrid { .. }));

        let err = NdtGrid::from_points(&[[f32::NAN, 0.0, 0.0]], 2.0).unwrap_err();
        assert!(matches!(err, NdtError::DegenerateGrid { .. }));
    }

    #[test]
    fn test_min_points_threshold() {
        let points: Vec<Point> = (0..5)
            .map(|i| [0.5 + 0.1 * i as f32, 0.5 + 0.05 * (i * i) as f32, 0.5 + 0.02 * i as f32])
            .collect();

        let strict = NdtGrid::build(&points, NdtGridConfig::with_resolution(2.0)).unwrap();
        assert!(strict.is_empty());

        let relaxed = NdtGrid::build(
            &points,
            NdtGridConfig {
                min_points_per_cell: 5,
                ..NdtGridConfig::with_resolution(2.0)
            },
        )
        .unwrap();
        assert_eq!(relaxed.len(), 1);
    }
}
