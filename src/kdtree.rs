//! k-d tree spatial index over a [`PointSet`].
//!
//! The tree is a flat arena of nodes linked by index. Each splitting node
//! owns one point, the positional median of its range along the dimension
//! with the widest extent; the two halves of the range become its children.
//! An empty range is a leaf.
//!
//! Construction is iterative (FIFO work queue), so depth is never bounded by
//! the call stack. Queries use branch-and-bound: the near child is always
//! searched, the far child only while it may still hold something closer
//! than the worst candidate kept so far.
//!
//! The tree only needs `&self` to query, so it can be shared across threads.

use std::collections::VecDeque;
use std::time::Instant;

use tracing::debug;

use crate::brute_force::check_k;
use crate::candidates::{CandidateHeap, NO_NEIGHBOR};
use crate::error::{KnnError, Result};
use crate::neighbors::NeighborTable;
use crate::points::{PointSet, squared_distance};

/// Arena index of the root node
const ROOT: usize = 0;

/// Node in the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Node {
    /// Empty range, terminal
    Leaf,
    /// Range split at its median
    Split {
        /// Split dimension
        dim: usize,
        /// Representative point id (median along `dim`)
        point: usize,
        /// Arena index of the lower half
        left: usize,
        /// Arena index of the upper half
        right: usize,
    },
}

/// Counters from one query
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueryStats {
    /// Splitting nodes whose representative was compared
    pub nodes_visited: usize,
    /// Far subtrees skipped by the pruning rule
    pub subtrees_pruned: usize,
}

/// Static k-d tree borrowing its point set
#[derive(Clone, Debug)]
pub struct KdTree<'a> {
    points: &'a PointSet,
    nodes: Vec<Node>,
    /// Point ids, partially ordered so every node's range is contiguous
    pub(crate) ids: Vec<usize>,
    /// Id range `[begin, end)` covered by each node, parallel to `nodes`
    pub(crate) ranges: Vec<(usize, usize)>,
    depth: usize,
}

impl<'a> KdTree<'a> {
    /// Builds the index over every point of `points`.
    pub fn build(points: &'a PointSet) -> Self {
        let start = Instant::now();
        let n = points.len();
        let dimension = points.dimension();

        // n splitting nodes plus n + 1 leaves
        let mut nodes = Vec::with_capacity(2 * n + 1);
        let mut ranges = Vec::with_capacity(2 * n + 1);
        let mut ids: Vec<usize> = (0..n).collect();
        let mut depth = 0;

        nodes.push(Node::Leaf);
        ranges.push((0, n));

        let mut queue = VecDeque::new();
        queue.push_back((0usize, n, ROOT, 1usize));

        let mut mins = vec![0.0f32; dimension];
        let mut maxs = vec![0.0f32; dimension];

        while let Some((begin, end, node, level)) = queue.pop_front() {
            if end <= begin {
                continue;
            }
            depth = depth.max(level);

            let dim = widest_dimension(points, &ids[begin..end], &mut mins, &mut maxs);
            let mid = begin + (end - begin) / 2;
            ids[begin..end].select_nth_unstable_by(mid - begin, |&a, &b| {
                points.coord(a, dim).total_cmp(&points.coord(b, dim))
            });

            let left = nodes.len();
            nodes.push(Node::Leaf);
            ranges.push((begin, mid));
            let right = nodes.len();
            nodes.push(Node::Leaf);
            ranges.push((mid + 1, end));

            nodes[node] = Node::Split {
                dim,
                point: ids[mid],
                left,
                right,
            };

            queue.push_back((begin, mid, left, level + 1));
            queue.push_back((mid + 1, end, right, level + 1));
        }

        debug!(
            points = n,
            nodes = nodes.len(),
            depth,
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "k-d tree built"
        );

        KdTree {
            points,
            nodes,
            ids,
            ranges,
            depth,
        }
    }

    /// Number of indexed points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True for a tree over an empty point set
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of arena nodes, leaves included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of splitting levels on the longest root-to-leaf path
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The indexed point set
    pub fn points(&self) -> &'a PointSet {
        self.points
    }

    pub(crate) fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Finds the `k` nearest neighbors of indexed point `id`, excluding itself.
    ///
    /// `results` is cleared and filled with exactly `k` ids, nearest first.
    /// Slots that cannot be filled (fewer than `k` other points) hold
    /// [`NO_NEIGHBOR`].
    ///
    /// # Errors
    /// [`KnnError::PointOutOfRange`] for an unknown `id`, and
    /// [`KnnError::InvalidConfig`] if `k` exceeds the number of points.
    pub fn query_k(&self, id: usize, k: usize, results: &mut Vec<usize>) -> Result<QueryStats> {
        self.points.check_id(id)?;
        self.check_query_k(k)?;
        results.clear();

        // one extra slot for the point itself
        let mut heap = CandidateHeap::new(k + 1);
        let stats = self.search(self.points.point(id), &mut heap);

        let mut sorted = heap.into_sorted();
        match sorted.iter().position(|c| c.id == id) {
            Some(pos) => {
                let _ = sorted.remove(pos);
            }
            // evicted by more than k coincident points
            None => {
                let _ = sorted.pop();
            }
        }
        results.extend(sorted.iter().map(|c| c.id));
        results.resize(k, NO_NEIGHBOR);
        Ok(stats)
    }

    /// Finds the `k` indexed points nearest to an arbitrary location.
    ///
    /// # Errors
    /// [`KnnError::DimensionMismatch`] if `query` has the wrong length, and
    /// [`KnnError::InvalidConfig`] if `k` exceeds the number of points.
    pub fn query_point(
        &self,
        query: &[f32],
        k: usize,
        results: &mut Vec<usize>,
    ) -> Result<QueryStats> {
        if query.len() != self.points.dimension() {
            return Err(KnnError::DimensionMismatch {
                expected: self.points.dimension(),
                actual: query.len(),
            });
        }
        self.check_query_k(k)?;
        results.clear();
        let mut heap = CandidateHeap::new(k);
        let stats = self.search(query, &mut heap);
        results.extend(heap.seal());
        Ok(stats)
    }

    /// Neighbor lists of every indexed point.
    ///
    /// # Errors
    /// [`KnnError::InvalidConfig`] unless `1 <= k < self.len()`.
    pub fn all_knn(&self, k: usize) -> Result<NeighborTable> {
        check_k(self.points, k)?;
        let mut ids = Vec::with_capacity(self.len() * k);
        let mut results = Vec::with_capacity(k);
        for id in 0..self.len() {
            let _ = self.query_k(id, k, &mut results)?;
            ids.extend_from_slice(&results);
        }
        Ok(NeighborTable::from_flat(k, ids))
    }

    /// Neighbor lists of every indexed point, queried from `workers` threads
    /// sharing the tree.
    ///
    /// # Errors
    /// [`KnnError::InvalidConfig`] unless `1 <= k < self.len()` and `workers > 0`.
    pub fn all_knn_parallel(&self, k: usize, workers: usize) -> Result<NeighborTable> {
        check_k(self.points, k)?;
        if workers == 0 {
            return Err(KnnError::InvalidConfig("worker count must be at least 1".into()));
        }
        let n = self.len();
        let mut ids = vec![NO_NEIGHBOR; n * k];
        let chunk_points = n.div_ceil(workers);

        std::thread::scope(|scope| {
            let handles: Vec<_> = ids
                .chunks_mut(chunk_points * k)
                .enumerate()
                .map(|(chunk, out)| {
                    scope.spawn(move || -> Result<()> {
                        let first = chunk * chunk_points;
                        let mut results = Vec::with_capacity(k);
                        for (offset, row) in out.chunks_mut(k).enumerate() {
                            let _ = self.query_k(first + offset, k, &mut results)?;
                            row.copy_from_slice(&results);
                        }
                        Ok(())
                    })
                })
                .collect();

            for handle in handles {
                match handle.join() {
                    Ok(result) => result?,
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
            Ok::<(), KnnError>(())
        })?;

        Ok(NeighborTable::from_flat(k, ids))
    }

    /// Rejects more neighbors than there are points, so every output row fits
    /// in memory and the heap capacity cannot overflow.
    fn check_query_k(&self, k: usize) -> Result<()> {
        if k > self.len() {
            return Err(KnnError::InvalidConfig(format!(
                "k ({k}) exceeds the {} indexed points",
                self.len()
            )));
        }
        Ok(())
    }

    /// Branch-and-bound traversal filling `heap`.
    fn search(&self, query: &[f32], heap: &mut CandidateHeap) -> QueryStats {
        let mut stats = QueryStats::default();
        // (node, squared split distance for far children)
        let mut stack: Vec<(usize, Option<f32>)> = Vec::with_capacity(2 * self.depth + 2);
        stack.push((ROOT, None));

        while let Some((node, bound)) = stack.pop() {
            if let Some(split_sq) = bound {
                let keep = match heap.worst() {
                    Some(worst) if heap.is_full() => split_sq < worst,
                    _ => true,
                };
                if !keep {
                    stats.subtrees_pruned += 1;
                    continue;
                }
            }

            let Node::Split { dim, point, left, right } = self.nodes[node] else {
                continue;
            };
            stats.nodes_visited += 1;

            let representative = self.points.point(point);
            heap.offer(squared_distance(representative, query), point);

            let delta = representative[dim] - query[dim];
            let (near, far) = if delta > 0.0 { (left, right) } else { (right, left) };

            // far is popped after the whole near subtree is done
            stack.push((far, Some(delta * delta)));
            stack.push((near, None));
        }
        stats
    }
}

/// Dimension with the largest coordinate extent over `ids`; the first one wins ties.
fn widest_dimension(
    points: &PointSet,
    ids: &[usize],
    mins: &mut [f32],
    maxs: &mut [f32],
) -> usize {
    mins.fill(f32::INFINITY);
    maxs.fill(f32::NEG_INFINITY);
    for &id in ids {
        for (d, &v) in points.point(id).iter().enumerate() {
            if v < mins[d] {
                mins[d] = v;
            }
            if v > maxs[d] {
                maxs[d] = v;
            }
        }
    }

    let mut best_dim = 0;
    let mut best_extent = f32::NEG_INFINITY;
    for (d, (lo, hi)) in mins.iter().zip(maxs.iter()).enumerate() {
        let extent = hi - lo;
        if extent > best_extent {
            best_extent = extent;
            best_dim = d;
        }
    }
    best_dim
}
