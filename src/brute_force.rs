//! Exhaustive all-pairs strategy.
//!
//! O(n² · D) distance evaluations, each offered to both endpoints. The pair
//! order is fixed, so this is the deterministic reference every other
//! strategy is checked against.

use std::time::Instant;

use tracing::debug;

use crate::candidates::CandidateHeap;
use crate::error::{KnnError, Result};
use crate::neighbors::NeighborTable;
use crate::points::PointSet;

/// Computes the k nearest neighbors of every point by comparing all pairs.
///
/// # Errors
/// [`KnnError::InvalidConfig`] unless `1 <= k < points.len()`.
pub fn all_knn(points: &PointSet, k: usize) -> Result<NeighborTable> {
    check_k(points, k)?;
    let start = Instant::now();

    let mut heaps = vec![CandidateHeap::new(k); points.len()];
    compare_range(points, &mut heaps, 0);

    debug!(
        points = points.len(),
        k,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "brute force finished"
    );
    Ok(NeighborTable::from_heaps(k, heaps))
}

/// Compares every distinct pair inside one contiguous block of points.
///
/// `heaps[i]` is the accumulator of point `offset + i`.
pub(crate) fn compare_range(points: &PointSet, heaps: &mut [CandidateHeap], offset: usize) {
    let n = heaps.len();
    for i in 0..n {
        // split so heaps[i] and heaps[j > i] can be borrowed together
        let (head, tail) = heaps.split_at_mut(i + 1);
        let a = &mut head[i];
        for (j, b) in tail.iter_mut().enumerate() {
            let (pi, pj) = (offset + i, offset + i + 1 + j);
            let dist = points.squared_distance(pi, pj);
            a.offer(dist, pj);
            b.offer(dist, pi);
        }
    }
}

/// Compares every point of one block against every point of another.
pub(crate) fn compare_blocks(
    points: &PointSet,
    left: &mut [CandidateHeap],
    left_offset: usize,
    right: &mut [CandidateHeap],
    right_offset: usize,
) {
    for (i, a) in left.iter_mut().enumerate() {
        let pi = left_offset + i;
        for (j, b) in right.iter_mut().enumerate() {
            let pj = right_offset + j;
            let dist = points.squared_distance(pi, pj);
            a.offer(dist, pj);
            b.offer(dist, pi);
        }
    }
}

/// Rejects `k` outside `1..points.len()`
pub(crate) fn check_k(points: &PointSet, k: usize) -> Result<()> {
    if k == 0 || k >= points.len() {
        return Err(KnnError::InvalidConfig(format!(
            "k ({k}) must be in 1..{} for a set of {} points",
            points.len(),
            points.len()
        )));
    }
    Ok(())
}
