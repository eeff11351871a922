//! Comparison tests between the k-d tree / partitioned strategies and brute force

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};

    use crate::brute_force;
    use crate::kdtree::KdTree;
    use crate::neighbors::NeighborTable;
    use crate::points::PointSet;
    use crate::scheduler::Scheduler;

    fn uniform(count: usize, dimension: usize, seed: u64) -> PointSet {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        PointSet::uniform(count, dimension, &mut rng).unwrap()
    }

    /// Neighbor sets must agree point by point; tie order may differ.
    fn assert_same_sets(actual: &NeighborTable, expected: &NeighborTable, label: &str) {
        assert_eq!(actual.len(), expected.len(), "{label}: table sizes differ");
        for id in 0..expected.len() {
            assert_eq!(
                actual.neighbor_set(id),
                expected.neighbor_set(id),
                "{label}: point {id} differs"
            );
        }
    }

    #[test]
    fn test_kdtree_matches_brute_force_low_dimension() {
        let points = uniform(500, 2, 42);
        let expected = brute_force::all_knn(&points, 8).unwrap();
        let actual = KdTree::build(&points).all_knn(8).unwrap();
        assert_same_sets(&actual, &expected, "kdtree d=2");
    }

    #[test]
    fn test_kdtree_matches_brute_force_high_dimension() {
        // high dimension defeats pruning but must stay exact
        let points = uniform(300, 120, 43);
        let expected = brute_force::all_knn(&points, 18).unwrap();
        let actual = KdTree::build(&points).all_knn(18).unwrap();
        assert_same_sets(&actual, &expected, "kdtree d=120");
    }

    #[test]
    fn test_kdtree_matches_brute_force_many_shapes() {
        let shapes = [(50, 1, 1, 1), (50, 3, 49, 2), (64, 5, 7, 3), (257, 8, 16, 4)];
        for (count, dimension, k, seed) in shapes {
            let points = uniform(count, dimension, seed);
            let expected = brute_force::all_knn(&points, k).unwrap();
            let actual = KdTree::build(&points).all_knn(k).unwrap();
            assert_same_sets(&actual, &expected, &format!("kdtree n={count} d={dimension} k={k}"));
        }
    }

    #[test]
    fn test_kdtree_sealed_order_ascending() {
        let points = uniform(200, 4, 44);
        let tree = KdTree::build(&points);
        let mut results = Vec::new();
        for id in 0..points.len() {
            let _ = tree.query_k(id, 10, &mut results).unwrap();
            let distances: Vec<f32> = results
                .iter()
                .map(|&n| points.squared_distance(id, n))
                .collect();
            assert!(distances.windows(2).all(|w| w[0] <= w[1]), "point {id}: {distances:?}");
        }
    }

    #[test]
    fn test_partitioned_matches_brute_force() {
        let points = uniform(400, 16, 45);
        let expected = brute_force::all_knn(&points, 10).unwrap();
        for (partitions, workers) in [(1, 1), (1, 4), (3, 2), (8, 4), (16, 8), (40, 3)] {
            let (actual, _) = Scheduler::new(&points, 10, partitions, workers)
                .unwrap()
                .run()
                .unwrap();
            let label = format!("partitioned p={partitions} w={workers}");
            assert_same_sets(&actual, &expected, &label);
        }
    }

    #[test]
    fn test_partitioned_single_worker_seeded_is_reproducible() {
        let points = uniform(150, 6, 46);
        let (a, _) = Scheduler::new(&points, 5, 6, 1).unwrap().with_seed(1).run().unwrap();
        let (b, _) = Scheduler::new(&points, 5, 6, 1).unwrap().with_seed(1).run().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_brute_force_is_bitwise_repeatable() {
        let points = uniform(250, 10, 47);
        let first = brute_force::all_knn(&points, 12).unwrap();
        let second = brute_force::all_knn(&points, 12).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_all_strategies_on_clustered_data() {
        // tight clusters far apart: pruning cuts whole clusters
        let mut rng = rand::rngs::StdRng::seed_from_u64(48);
        let mut rows = Vec::new();
        for cluster in 0..8 {
            let centre = cluster as f32 * 50.0;
            for _ in 0..25 {
                let mut row = [centre; 3];
                for x in &mut row {
                    *x += rng.random_range(0.0..1.0f32);
                }
                rows.push(row);
            }
        }
        let points = PointSet::from_rows(3, rows).unwrap();
        let expected = brute_force::all_knn(&points, 6).unwrap();

        let tree = KdTree::build(&points);
        assert_same_sets(&tree.all_knn(6).unwrap(), &expected, "kdtree clustered");
        let parallel = tree.all_knn_parallel(6, 3).unwrap();
        assert_same_sets(&parallel, &expected, "kdtree parallel clustered");

        let (partitioned, _) = Scheduler::new(&points, 6, 8, 4).unwrap().run().unwrap();
        assert_same_sets(&partitioned, &expected, "partitioned clustered");
    }
}
