//! Sealed neighbor lists for every point.

use crate::candidates::{CandidateHeap, NO_NEIGHBOR};

/// Per-point neighbor ids, nearest first, stored as one flat `n * k` buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NeighborTable {
    ids: Vec<usize>,
    k: usize,
}

impl NeighborTable {
    /// Seals one accumulator per point, in point id order.
    pub fn from_heaps<I>(k: usize, heaps: I) -> Self
    where
        I: IntoIterator<Item = CandidateHeap>,
    {
        let mut ids = Vec::new();
        for heap in heaps {
            debug_assert_eq!(heap.capacity(), k);
            ids.extend(heap.seal());
        }
        NeighborTable { ids, k }
    }

    /// Builds a table from rows already sealed to length `k`.
    pub(crate) fn from_flat(k: usize, ids: Vec<usize>) -> Self {
        debug_assert!(k == 0 || ids.len() % k == 0);
        NeighborTable { ids, k }
    }

    /// Neighbors per point
    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of points
    pub fn len(&self) -> usize {
        if self.k == 0 { 0 } else { self.ids.len() / self.k }
    }

    /// True for a table without rows
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Neighbor ids of point `id`, nearest first; unfilled slots hold [`NO_NEIGHBOR`].
    ///
    /// # Panics
    /// Panics if `id` is out of range.
    #[inline]
    pub fn neighbors(&self, id: usize) -> &[usize] {
        &self.ids[id * self.k..(id + 1) * self.k]
    }

    /// Iterates `(point id, neighbor ids)` rows
    pub fn iter(&self) -> impl Iterator<Item = (usize, &[usize])> + '_ {
        self.ids.chunks(self.k.max(1)).enumerate()
    }

    /// Ids of point `id` that are real neighbors, as a sorted vector. Handy for
    /// comparing results where tie order may differ.
    pub fn neighbor_set(&self, id: usize) -> Vec<usize> {
        let mut set: Vec<usize> = self
            .neighbors(id)
            .iter()
            .copied()
            .filter(|&n| n != NO_NEIGHBOR)
            .collect();
        set.sort_unstable();
        set
    }
}
