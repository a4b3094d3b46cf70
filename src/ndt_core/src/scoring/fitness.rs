//! RMS nearest-neighbor fitness between a target and an aligned source.
//!
//! Every finite source point is matched to its exact nearest target point.
//! Pairs farther apart than `max_range` are treated as non-overlapping
//! (occluded or out of view) and left out of the average.

use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::pointcloud::{count_finite, is_finite_point, Point};
use crate::spatial_index::SpatialIndex;

/// RMS reported when no source point has a target neighbor within range.
///
/// Means "no comparable overlap", the worst possible fit. Do not average it
/// with real values; check [`FitnessResult::is_no_overlap`] instead.
pub const NO_OVERLAP_RMS: f64 = f64::MAX;

/// Detailed fitness of an alignment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitnessResult {
    /// Root-mean-square distance over the inlier pairs, `None` without any.
    pub rms: Option<f64>,
    /// Source points whose nearest target point lies within range.
    pub num_inliers: usize,
    /// Finite source points that were queried.
    pub num_valid: usize,
}

impl FitnessResult {
    fn no_overlap(num_valid: usize) -> Self {
        Self {
            rms: None,
            num_inliers: 0,
            num_valid,
        }
    }

    pub fn is_no_overlap(&self) -> bool {
        self.rms.is_none()
    }

    /// RMS with [`NO_OVERLAP_RMS`] standing in for "no overlap".
    pub fn rms_or_sentinel(&self) -> f64 {
        self.rms.unwrap_or(NO_OVERLAP_RMS)
    }

    /// Fraction of valid source points that found a neighbor in range.
    pub fn inlier_ratio(&self) -> f64 {
        if self.num_valid == 0 {
            0.0
        } else {
            self.num_inliers as f64 / self.num_valid as f64
        }
    }
}

/// RMS nearest-neighbor distance from `source` to `target`, counting only
/// pairs closer than `max_range`.
///
/// Returns [`NO_OVERLAP_RMS`] when nothing qualifies, including when either
/// cloud has no finite point.
pub fn compute_rms(target: &[Point], source: &[Point], max_range: f64) -> f64 {
    evaluate_fitness(target, source, max_range).rms_or_sentinel()
}

/// Like [`compute_rms`] but with inlier counts.
///
/// A negative or NaN `max_range` admits no pair; `f64::INFINITY` admits all.
pub fn evaluate_fitness(target: &[Point], source: &[Point], max_range: f64) -> FitnessResult {
    // Building only fails on a target without finite points
    let Ok(index) = SpatialIndex::build(target) else {
        let num_valid = count_finite(source);
        debug!(num_valid, "Fitness target has no finite points");
        return FitnessResult::no_overlap(num_valid);
    };
    evaluate_fitness_with_index(&index, target, source, max_range)
}

/// Fitness against a prebuilt index over `target`.
///
/// `index` must have been built from `target`.
pub fn evaluate_fitness_with_index(
    index: &SpatialIndex,
    target: &[Point],
    source: &[Point],
    max_range: f64,
) -> FitnessResult {
    if !(max_range >= 0.0) {
        let num_valid = count_finite(source);
        return FitnessResult::no_overlap(num_valid);
    }
    let max_range_sq = max_range * max_range;

    let distances: Vec<f64> = source
        .par_iter()
        .filter(|p| is_finite_point(p))
        .map(|p| {
            let neighbor = index.query_nearest(p);
            squared_distance(p, &target[neighbor.index])
        })
        .collect();

    let num_valid = distances.len();
    let mut sum = 0.0;
    let mut num_inliers = 0;
    for &d in distances.iter().filter(|&&d| d <= max_range_sq) {
        sum += d;
        num_inliers += 1;
    }

    if num_inliers == 0 {
        return FitnessResult::no_overlap(num_valid);
    }

    let rms = (sum / num_inliers as f64).sqrt();
    debug!(rms, num_inliers, num_valid, "Evaluated fitness");

    FitnessResult {
        rms: Some(rms),
        num_inliers,
        num_valid,
    }
}

fn squared_distance(a: &Point, b: &Point) -> f64 {
    let dx = a[0] as f64 - b[0] as f64;
    let dy = a[1] as f64 - b[1] as f64;
    let dz = a[2] as f64 - b[2] as f64;
    dx * dx + dy * dy + dz * dz
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::prelude::*;
    use rand::rngs::StdRng;

    fn random_cloud(rng: &mut StdRng, n: usize, offset: f32) -> Vec<Point> {
        (0..n)
            .map(|_| {
                [
                    offset + rng.gen_range(0.0..5.0),
                    offset + rng.gen_range(0.0..5.0),
                    offset + rng.gen_range(0.0..5.0),
                ]
            })
            .collect()
    }

    #[test]
    fn test_identical_clouds_zero() {
        let mut rng = StdRng::seed_from_u64(1);
        let cloud = random_cloud(&mut rng, 500, 0.0);

        let fitness = evaluate_fitness(&cloud, &cloud, 1.0);

        assert_eq!(fitness.rms, Some(0.0));
        assert_eq!(fitness.num_inliers, 500);
        assert_eq!(fitness.num_valid, 500);
        assert_eq!(compute_rms(&cloud, &cloud, 0.0), 0.0);
    }

    #[test]
    fn test_known_offset() {
        let target: Vec<Point> = vec![[0.0, 0.0, 0.0], [10.0, 0.0, 0.0]];
        let source: Vec<Point> = vec![[0.0, 0.3, 0.0], [10.0, 0.0, 0.4]];

        let rms = compute_rms(&target, &source, 1.0);

        // sqrt((0.09 + 0.16) / 2)
        assert_relative_eq!(rms, (0.125f64).sqrt(), epsilon = 1e-6);
    }

    #[test]
    fn test_out_of_range_excluded() {
        let target: Vec<Point> = vec![[0.0, 0.0, 0.0]];
        let source: Vec<Point> = vec![[0.0, 0.0, 0.5], [0.0, 0.0, 50.0]];

        let fitness = evaluate_fitness(&target, &source, 1.0);

        assert_eq!(fitness.num_inliers, 1);
        assert_eq!(fitness.num_valid, 2);
        assert_relative_eq!(fitness.rms.unwrap(), 0.5, epsilon = 1e-6);
        assert_relative_eq!(fitness.inlier_ratio(), 0.5);
    }

    #[test]
    fn test_disjoint_with_zero_range_is_sentinel() {
        let mut rng = StdRng::seed_from_u64(2);
        let target = random_cloud(&mut rng, 200, 0.0);
        let source = random_cloud(&mut rng, 200, 100.0);

        assert_eq!(compute_rms(&target, &source, 0.0), NO_OVERLAP_RMS);
        assert!(evaluate_fitness(&target, &source, 0.0).is_no_overlap());
    }

    #[test]
    fn test_empty_inputs_are_sentinel() {
        let cloud: Vec<Point> = vec![[1.0, 2.0, 3.0]];

        assert_eq!(compute_rms(&[], &cloud, 10.0), NO_OVERLAP_RMS);
        assert_eq!(compute_rms(&cloud, &[], 10.0), NO_OVERLAP_RMS);
        assert_eq!(
            compute_rms(&[[f32::NAN, 0.0, 0.0]], &cloud, 10.0),
            NO_OVERLAP_RMS
        );

        let fitness = evaluate_fitness(&[], &cloud, 10.0);
        assert_eq!(fitness.num_valid, 1);
        assert_eq!(fitness.num_inliers, 0);
    }

    #[test]
    fn test_unusable_target_still_counts_source() {
        let source: Vec<Point> = vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [f32::NAN, 0.0, 0.0]];
        let target: Vec<Point> = vec![[f32::NAN, 0.0, 0.0], [0.0, f32::INFINITY, 0.0]];

        let fitness = evaluate_fitness(&target, &source, 10.0);

        assert!(fitness.is_no_overlap());
        assert_eq!(fitness.num_valid, 2);
        assert_eq!(fitness.num_inliers, 0);
    }

    #[test]
    fn test_invalid_range_is_sentinel() {
        let cloud: Vec<Point> = vec![[1.0, 2.0, 3.0]];
        assert_eq!(compute_rms(&cloud, &cloud, -1.0), NO_OVERLAP_RMS);
        assert_eq!(compute_rms(&cloud, &cloud, f64::NAN), NO_OVERLAP_RMS);
        assert_eq!(compute_rms(&cloud, &cloud, f64::INFINITY), 0.0);
    }

    #[test]
    fn test_non_finite_source_points_skipped() {
        let target: Vec<Point> = vec![[0.0, 0.0, 0.0]];
        let source: Vec<Point> = vec![[0.0, 0.0, 0.2], [f32::NAN, 0.0, 0.0]];

        let fitness = evaluate_fitness(&target, &source, 1.0);

        assert_eq!(fitness.num_valid, 1);
        assert_relative_eq!(fitness.rms.unwrap(), 0.2, epsilon = 1e-6);
    }

    #[test]
    fn test_never_negative() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..10 {
            let offset: f32 = rng.gen_range(-2.0..2.0);
            let max_range: f64 = rng.gen_range(0.0..3.0);
            let target = random_cloud(&mut rng, 100, 0.0);
            let source = random_cloud(&mut rng, 100, offset);
            let rms = compute_rms(&target, &source, max_range);
            assert!(rms >= 0.0);
        }
    }
}
