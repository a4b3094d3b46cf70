//! Grid construction: bin points into cells, then fit one Gaussian per cell.

use std::collections::HashMap;

use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;

use super::types::{CellCoord, GridCell, NdtGridConfig};
use crate::pointcloud::{finite_points, Point};

/// Running first and second moments of the points in one cell.
#[derive(Debug, Clone, Default)]
struct CellAccumulator {
    sum: Vector3<f64>,
    /// Sum of outer products (x * x^T).
    sum_sq: Matrix3<f64>,
    count: usize,
}

impl CellAccumulator {
    fn add_point(&mut self, v: Vector3<f64>) {
        self.sum += v;
        self.sum_sq += v * v.transpose();
        self.count += 1;
    }
}

/// Outcome of binning a cloud into cells.
#[derive(Debug, Default)]
pub(crate) struct BuiltCells {
    pub cells: HashMap<CellCoord, GridCell>,
    /// Occupied cells that did not yield a usable Gaussian.
    pub dropped_cells: usize,
    /// Finite points that were binned.
    pub binned_points: usize,
    /// Finite points whose cell index does not fit in `i32`.
    pub out_of_range_points: usize,
}

/// Bin the finite points of `points` and compute each cell's statistics.
///
/// Points are accumulated in input order, so the result does not depend on
/// thread scheduling. Finalization (eigen-decomposition per cell) runs in
/// parallel.
pub(crate) fn build_cells(points: &[Point], config: &NdtGridConfig) -> BuiltCells {
    let mut accumulators: HashMap<CellCoord, CellAccumulator> = HashMap::new();
    let mut binned_points = 0;
    let mut out_of_range_points = 0;

    for (_, point) in finite_points(points) {
        let p = [point[0] as f64, point[1] as f64, point[2] as f64];
        let Some(coord) = CellCoord::from_point(&p, config.resolution) else {
            out_of_range_points += 1;
            continue;
        };
        accumulators
            .entry(coord)
            .or_default()
            .add_point(Vector3::new(p[0], p[1], p[2]));
        binned_points += 1;
    }

    let occupied = accumulators.len();
    let entries: Vec<_> = accumulators.into_iter().collect();

    let cells: HashMap<CellCoord, GridCell> = entries
        .into_par_iter()
        .filter_map(|(coord, acc)| {
            let cell = GridCell::from_statistics(&acc.sum, &acc.sum_sq, acc.count, config)?;
            Some((coord, cell))
        })
        .collect::<Vec<_>>()
        .into_iter()
        .collect();

    BuiltCells {
        dropped_cells: occupied - cells.len(),
        cells,
        binned_points,
        out_of_range_points,
    }
}
