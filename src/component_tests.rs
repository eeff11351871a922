//! Component tests - each building block checked on its own
//! This file provides granular coverage of the accumulator, the k-d tree
//! structure, and the scheduler protocol

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use rand::{Rng, SeedableRng};

    use crate::candidates::{CandidateHeap, NO_NEIGHBOR};
    use crate::kdtree::{KdTree, Node};
    use crate::points::PointSet;
    use crate::scheduler::{Scheduler, TaskInfo, TaskObserver};

    fn uniform(count: usize, dimension: usize, seed: u64) -> PointSet {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        PointSet::uniform(count, dimension, &mut rng).unwrap()
    }

    // ============================================================================
    // CANDIDATE ACCUMULATOR TESTS
    // ============================================================================

    #[test]
    fn test_heap_never_exceeds_capacity() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        let mut heap = CandidateHeap::new(7);
        for id in 0..500 {
            heap.offer(rng.random_range(0.0..100.0), id);
            assert!(heap.len() <= 7);
        }
        assert!(heap.is_full());
    }

    #[test]
    fn test_heap_seal_matches_sorted_prefix() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(12);
        let offered: Vec<f32> = (0..200).map(|_| rng.random_range(0.0..1.0)).collect();

        let mut heap = CandidateHeap::new(10);
        for (id, &d) in offered.iter().enumerate() {
            heap.offer(d, id);
        }
        let sealed = heap.seal();

        let mut expected: Vec<usize> = (0..offered.len()).collect();
        expected.sort_by(|&a, &b| offered[a].total_cmp(&offered[b]));
        expected.truncate(10);
        assert_eq!(sealed, expected);
    }

    #[test]
    fn test_heap_worst_tracks_maximum() {
        let mut heap = CandidateHeap::new(3);
        assert_eq!(heap.worst(), None);
        heap.offer(4.0, 0);
        heap.offer(9.0, 1);
        assert_eq!(heap.worst(), Some(9.0));
        heap.offer(1.0, 2);
        heap.offer(2.0, 3); // evicts 9.0
        assert_eq!(heap.worst(), Some(4.0));
    }

    #[test]
    fn test_heap_seal_all_sentinels_when_empty() {
        let heap = CandidateHeap::new(3);
        assert_eq!(heap.seal(), vec![NO_NEIGHBOR; 3]);
    }

    // ============================================================================
    // K-D TREE STRUCTURE TESTS
    // ============================================================================

    /// Walks the arena checking that leaves cover empty ranges and that every
    /// split separates its range around the median.
    fn check_tree(tree: &KdTree<'_>) {
        let points = tree.points();
        let mut seen = HashSet::new();
        for (node, &(begin, end)) in tree.nodes().iter().zip(&tree.ranges) {
            match *node {
                Node::Leaf => assert!(begin >= end, "leaf with range {begin}..{end}"),
                Node::Split { dim, point, left, right } => {
                    let mid = begin + (end - begin) / 2;
                    assert_eq!(tree.ids[mid], point);
                    assert_eq!(tree.ranges[left], (begin, mid));
                    assert_eq!(tree.ranges[right], (mid + 1, end));

                    let pivot = points.coord(point, dim);
                    for &id in &tree.ids[begin..mid] {
                        assert!(points.coord(id, dim) <= pivot);
                    }
                    for &id in &tree.ids[mid + 1..end] {
                        assert!(points.coord(id, dim) >= pivot);
                    }
                    assert!(seen.insert(point), "point {point} represented twice");
                }
            }
        }
        assert_eq!(seen.len(), points.len(), "every point owns exactly one node");
    }

    #[test]
    fn test_tree_structure_random() {
        let shapes = [(1, 3, 1), (2, 2, 2), (63, 4, 3), (64, 4, 4), (1000, 12, 5)];
        for (count, dimension, seed) in shapes {
            let points = uniform(count, dimension, seed);
            let tree = KdTree::build(&points);
            assert_eq!(tree.node_count(), 2 * count + 1);
            check_tree(&tree);
        }
    }

    #[test]
    fn test_tree_structure_with_duplicates() {
        let rows: Vec<[f32; 2]> = (0..40).map(|i| [(i % 3) as f32, (i % 5) as f32]).collect();
        let points = PointSet::from_rows(2, rows).unwrap();
        check_tree(&KdTree::build(&points));
    }

    #[test]
    fn test_tree_is_balanced() {
        let points = uniform(1023, 3, 6);
        let tree = KdTree::build(&points);
        // median splits of 2^10 - 1 points give a perfect tree
        assert_eq!(tree.depth(), 10);
    }

    #[test]
    fn test_tree_splits_on_widest_dimension() {
        // x spans 0..100, y spans 0..1
        let rows: Vec<[f32; 2]> = (0..50).map(|i| [i as f32 * 2.0, (i % 2) as f32]).collect();
        let points = PointSet::from_rows(2, rows).unwrap();
        let tree = KdTree::build(&points);
        match tree.nodes()[0] {
            Node::Split { dim, .. } => assert_eq!(dim, 0),
            Node::Leaf => panic!("root should split"),
        }
    }

    #[test]
    fn test_tree_shared_across_threads() {
        let points = uniform(400, 5, 7);
        let tree = KdTree::build(&points);
        let serial = tree.all_knn(6).unwrap();
        let parallel = tree.all_knn_parallel(6, 4).unwrap();
        assert_eq!(serial, parallel);
        // more workers than points still works
        let many = tree.all_knn_parallel(6, 1000).unwrap();
        assert_eq!(serial, many);
    }

    // ============================================================================
    // SCHEDULER PROTOCOL TESTS
    // ============================================================================

    /// Records partitions in use and flags any overlap.
    struct ExclusionObserver {
        active: Mutex<Vec<bool>>,
        violations: AtomicUsize,
        executed: Mutex<Vec<usize>>,
    }

    impl ExclusionObserver {
        fn new(partitions: usize, tasks: usize) -> Self {
            ExclusionObserver {
                active: Mutex::new(vec![false; partitions]),
                violations: AtomicUsize::new(0),
                executed: Mutex::new(vec![0; tasks]),
            }
        }
    }

    impl TaskObserver for ExclusionObserver {
        fn task_started(&self, _worker: usize, task: &TaskInfo) {
            let mut active = self.active.lock();
            for p in [task.first, task.second] {
                if active[p] {
                    let _ = self.violations.fetch_add(1, Ordering::SeqCst);
                }
            }
            active[task.first] = true;
            active[task.second] = true;
            drop(active);

            // widen the window in which an overlap could show up
            std::thread::yield_now();
            self.executed.lock()[task.id] += 1;
        }

        fn task_finished(&self, _worker: usize, task: &TaskInfo) {
            let mut active = self.active.lock();
            active[task.first] = false;
            active[task.second] = false;
        }
    }

    #[test]
    fn test_scheduler_mutual_exclusion() {
        let points = uniform(300, 4, 8);
        for (partitions, workers) in [(2, 4), (5, 3), (12, 8), (20, 16)] {
            let scheduler = Scheduler::new(&points, 4, partitions, workers).unwrap();
            let tasks = scheduler.task_count();
            let observer = ExclusionObserver::new(partitions, tasks);
            scheduler.run_observed(&observer).unwrap();

            assert_eq!(observer.violations.load(Ordering::SeqCst), 0);
            assert!(observer.executed.lock().iter().all(|&n| n == 1));
        }
    }

    #[test]
    fn test_scheduler_every_task_exactly_once() {
        let points = uniform(97, 3, 9);
        for partitions in 1..=9 {
            for workers in [1, 2, 5] {
                let scheduler = Scheduler::new(&points, 3, partitions, workers).unwrap();
                let tasks = scheduler.task_count();
                assert_eq!(tasks, partitions * (partitions + 1) / 2);

                let observer = ExclusionObserver::new(partitions, tasks);
                let (_, report) = scheduler.run_observed(&observer).unwrap();
                assert_eq!(report.tasks, tasks);
                assert_eq!(report.comparisons, 97 * 96 / 2);
                assert!(observer.executed.lock().iter().all(|&n| n == 1));
            }
        }
    }

    #[test]
    fn test_scheduler_self_pairs_compare_inside_partition() {
        // all nearest neighbors live inside the same partition
        let rows: Vec<[f32; 1]> = (0..20)
            .map(|i| [(i / 5) as f32 * 1000.0 + (i % 5) as f32])
            .collect();
        let points = PointSet::from_rows(1, rows).unwrap();
        let (table, _) = Scheduler::new(&points, 2, 4, 2).unwrap().run().unwrap();
        for id in 0..20 {
            let block = id / 5;
            assert!(
                table.neighbors(id).iter().all(|&n| n / 5 == block),
                "point {id} got {:?}",
                table.neighbors(id)
            );
        }
    }

    #[test]
    fn test_scheduler_more_partitions_than_points() {
        let points = uniform(6, 2, 10);
        let expected = crate::brute_force::all_knn(&points, 2).unwrap();
        let (table, report) = Scheduler::new(&points, 2, 10, 3).unwrap().run().unwrap();
        assert_eq!(report.tasks, 55);
        for id in 0..6 {
            assert_eq!(table.neighbor_set(id), expected.neighbor_set(id));
        }
    }
}
