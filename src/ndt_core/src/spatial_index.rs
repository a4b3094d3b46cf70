//! KD-tree nearest-neighbor index over a reference point cloud.
//!
//! The tree is built once from the finite points of the reference cloud and
//! is immutable afterwards; every query sees exactly the points present at
//! construction time. Queries are exact (no approximate search), which the
//! RMS fitness evaluation relies on.

use kiddo::immutable::float::kdtree::ImmutableKdTree;
use kiddo::SquaredEuclidean;

use crate::error::{NdtError, Result};
use crate::pointcloud::{finite_points, Point};

/// Bucket size for the KD-tree.
///
/// Larger than kiddo's default because scans of man-made scenes are full of
/// planar patches where many points share one coordinate.
const BUCKET_SIZE: usize = 256;

/// Result of a nearest-neighbor query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index of the neighbor in the cloud the index was built from.
    pub index: usize,
    /// Squared Euclidean distance to the query point.
    pub squared_distance: f32,
}

/// Immutable nearest-neighbor index over a point cloud.
#[derive(Debug)]
pub struct SpatialIndex {
    kdtree: ImmutableKdTree<f32, u64, 3, BUCKET_SIZE>,
    /// Maps KD-tree item ids back to indices in the original cloud
    /// (non-finite points are not indexed).
    source_indices: Vec<usize>,
}

impl SpatialIndex {
    /// Build an index over the finite points of `points`.
    ///
    /// Fails with [`NdtError::EmptyInput`] when the cloud has no finite point.
    pub fn build(points: &[Point]) -> Result<Self> {
        let (source_indices, valid): (Vec<usize>, Vec<Point>) =
            finite_points(points).map(|(i, p)| (i, *p)).unzip();

        if valid.is_empty() {
            return Err(NdtError::EmptyInput);
        }

        let kdtree: ImmutableKdTree<f32, u64, 3, BUCKET_SIZE> =
            ImmutableKdTree::new_from_slice(&valid);

        Ok(Self {
            kdtree,
            source_indices,
        })
    }

    /// Find the exact nearest neighbor of `point`.
    pub fn query_nearest(&self, point: &Point) -> Neighbor {
        let nn = self.kdtree.nearest_one::<SquaredEuclidean>(point);
        Neighbor {
            index: self.source_indices[nn.item as usize],
            squared_distance: nn.distance,
        }
    }

    /// Number of indexed (finite) points.
    pub fn len(&self) -> usize {
        self.source_indices.len()
    }

    /// Always false for a successfully built index; provided for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.source_indices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand::rngs::StdRng;

    fn squared_distance(a: &Point, b: &Point) -> f32 {
        let dx = a[0] - b[0];
        let dy = a[1] - b[1];
        let dz = a[2] - b[2];
        dx * dx + dy * dy + dz * dz
    }

    #[test]
    fn test_empty_cloud_rejected() {
        let points: Vec<Point> = vec![];
        assert!(matches!(
            SpatialIndex::build(&points),
            Err(NdtError::EmptyInput)
        ));
    }

    #[test]
    fn test_only_non_finite_rejected() {
        let points = vec![[f32::NAN, 0.0, 0.0], [0.0, f32::INFINITY, 0.0]];
        assert!(matches!(
            SpatialIndex::build(&points),
            Err(NdtError::EmptyInput)
        ));
    }

    #[test]
    fn test_single_point() {
        let index = SpatialIndex::build(&[[5.0, 5.0, 5.0]]).unwrap();
        assert_eq!(index.len(), 1);

        let nn = index.query_nearest(&[5.0, 5.0, 6.0]);
        assert_eq!(nn.index, 0);
        assert!((nn.squared_distance - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_indices_skip_non_finite_points() {
        let points = vec![
            [f32::NAN, 0.0, 0.0],
            [10.0, 0.0, 0.0],
            [0.0, f32::NAN, 0.0],
            [0.0, 0.0, 0.0],
        ];
        let index = SpatialIndex::build(&points).unwrap();
        assert_eq!(index.len(), 2);

        assert_eq!(index.query_nearest(&[0.1, 0.0, 0.0]).index, 3);
        assert_eq!(index.query_nearest(&[9.0, 0.0, 0.0]).index, 1);
    }

    #[test]
    fn test_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(7);
        let reference: Vec<Point> = (0..2000)
            .map(|_| {
                [
                    rng.gen_range(-10.0..10.0),
                    rng.gen_range(-10.0..10.0),
                    rng.gen_range(-2.0..2.0),
                ]
            })
            .collect();
        let index = SpatialIndex::build(&reference).unwrap();

        for _ in 0..200 {
            let query: Point = [
                rng.gen_range(-12.0..12.0),
                rng.gen_range(-12.0..12.0),
                rng.gen_range(-3.0..3.0),
            ];
            let expected = reference
                .iter()
                .map(|p| squared_distance(p, &query))
                .fold(f32::MAX, f32::min);

            let nn = index.query_nearest(&query);
            assert!(
                (nn.squared_distance - expected).abs() <= 1e-4 * expected.max(1.0),
                "kd-tree {} vs brute force {}",
                nn.squared_distance,
                expected
            );
            let actual = squared_distance(&reference[nn.index], &query);
            assert!((actual - expected).abs() <= 1e-4 * expected.max(1.0));
        }
    }

    #[test]
    fn test_planar_cloud() {
        // Many points sharing z = 0 exercise bucket splitting.
        let reference: Vec<Point> = (0..100)
            .flat_map(|i| (0..100).map(move |j| [i as f32 * 0.1, j as f32 * 0.1, 0.0]))
            .collect();
        let index = SpatialIndex::build(&reference).unwrap();

        let nn = index.query_nearest(&[2.52, 3.49, 0.5]);
        let p = reference[nn.index];
        assert!((p[0] - 2.5).abs() < 1e-5);
        assert!((p[1] - 3.5).abs() < 1e-5);
        assert!((nn.squared_distance - (0.02f32 * 0.02 + 0.01 * 0.01 + 0.25)).abs() < 1e-4);
    }
}
