//! Single entry point dispatching a [`KnnConfig`] to its strategy.

use tracing::debug;

use crate::brute_force;
use crate::config::{KnnConfig, Strategy};
use crate::error::{KnnError, Result};
use crate::kdtree::KdTree;
use crate::neighbors::NeighborTable;
use crate::points::PointSet;
use crate::scheduler::Scheduler;

/// Computes the k nearest neighbors of every point with the configured strategy.
///
/// The configuration is validated first and must describe `points`
/// (same point count and dimension).
///
/// # Errors
/// [`KnnError::InvalidConfig`] or [`KnnError::DimensionMismatch`] when the
/// configuration is illegal or does not describe `points`, and
/// [`KnnError::Invariant`] if the partition scheduler breaks down.
pub fn solve(points: &PointSet, config: &KnnConfig) -> Result<NeighborTable> {
    config.validate()?;
    if config.points != points.len() {
        return Err(KnnError::InvalidConfig(format!(
            "configured for {} points, got {}",
            config.points,
            points.len()
        )));
    }
    if config.dimension != points.dimension() {
        return Err(KnnError::DimensionMismatch {
            expected: config.dimension,
            actual: points.dimension(),
        });
    }

    debug!(
        points = config.points,
        dimension = config.dimension,
        k = config.k,
        strategy = ?config.strategy,
        "solving"
    );
    match config.strategy {
        Strategy::BruteForce => brute_force::all_knn(points, config.k),
        Strategy::SpatialIndex => KdTree::build(points).all_knn(config.k),
        Strategy::Partitioned { partitions, workers } => {
            let (table, _) = Scheduler::new(points, config.k, partitions, workers)?.run()?;
            Ok(table)
        }
    }
}

/// Generates `config.points` uniform points and solves them. Mirrors a
/// benchmark run from scratch.
///
/// # Errors
/// Same as [`solve`].
pub fn solve_uniform<R: rand::Rng>(
    config: &KnnConfig,
    rng: &mut R,
) -> Result<(PointSet, NeighborTable)> {
    config.validate()?;
    let points = PointSet::uniform(config.points, config.dimension, rng)?;
    let table = solve(&points, config)?;
    Ok((points, table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_config_must_match_points() {
        let points = PointSet::from_rows(2, [[0.0f32, 0.0], [1.0, 0.0], [0.0, 1.0]]).unwrap();
        let wrong_count = KnnConfig::new(4, 2, 1).brute_force();
        assert!(matches!(solve(&points, &wrong_count), Err(KnnError::InvalidConfig(_))));

        let wrong_dim = KnnConfig::new(3, 3, 1).brute_force();
        assert!(matches!(solve(&points, &wrong_dim), Err(KnnError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_invalid_config_fails_before_work() {
        let points = PointSet::from_rows(1, [[0.0f32], [1.0]]).unwrap();
        let config = KnnConfig::new(2, 1, 1).partitioned(0, 2);
        assert!(solve(&points, &config).is_err());
    }

    #[test]
    fn test_strategies_agree() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let base = KnnConfig::new(120, 6, 5);
        let (points, reference) = solve_uniform(&base.clone().brute_force(), &mut rng).unwrap();
        for config in [base.clone().spatial_index(), base.partitioned(5, 3)] {
            let table = solve(&points, &config).unwrap();
            for id in 0..points.len() {
                assert_eq!(
                    table.neighbor_set(id),
                    reference.neighbor_set(id),
                    "{:?}",
                    config.strategy
                );
            }
        }
    }
}
