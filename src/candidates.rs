//! Bounded top-k candidate accumulator.
//!
//! A max-heap keyed on squared distance. The worst kept candidate sits at the
//! top so the "is this closer than what we have" test is O(1) and the
//! eviction is O(log k).

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Padding value for neighbor slots that could not be filled.
pub const NO_NEIGHBOR: usize = usize::MAX;

/// A (squared distance, neighbor id) pair
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    /// Squared distance to the query point
    pub distance: f32,
    /// Neighbor point id
    pub id: usize,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Keeps the `capacity` smallest distances offered to it.
#[derive(Clone, Debug, Default)]
pub struct CandidateHeap {
    heap: BinaryHeap<Candidate>,
    capacity: usize,
}

impl CandidateHeap {
    /// Creates an empty accumulator holding at most `capacity` candidates
    pub fn new(capacity: usize) -> Self {
        CandidateHeap {
            heap: BinaryHeap::with_capacity(capacity.saturating_add(1)),
            capacity,
        }
    }

    /// Offers a candidate.
    ///
    /// Below capacity every candidate is kept. At capacity the candidate is
    /// kept only if it is strictly closer than the current worst, which is
    /// evicted first.
    #[inline]
    pub fn offer(&mut self, distance: f32, id: usize) {
        if self.heap.len() < self.capacity {
            self.heap.push(Candidate { distance, id });
            return;
        }
        if let Some(mut worst) = self.heap.peek_mut() {
            if distance < worst.distance {
                // PeekMut restores the heap order on drop
                *worst = Candidate { distance, id };
            }
        }
    }

    /// Distance of the worst kept candidate.
    #[inline]
    pub fn worst(&self) -> Option<f32> {
        self.heap.peek().map(|c| c.distance)
    }

    /// True once `capacity` candidates are kept
    #[inline]
    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.capacity
    }

    /// Number of kept candidates
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// True if nothing was kept yet
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Maximum number of kept candidates
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Kept candidates, nearest first. Not padded.
    pub fn into_sorted(self) -> Vec<Candidate> {
        self.heap.into_sorted_vec()
    }

    /// Seals the accumulator into neighbor ids, nearest first, padded with
    /// [`NO_NEIGHBOR`] up to `capacity`.
    pub fn seal(self) -> Vec<usize> {
        let capacity = self.capacity;
        let mut ids: Vec<usize> = self.into_sorted().into_iter().map(|c| c.id).collect();
        ids.resize(capacity, NO_NEIGHBOR);
        ids
    }
}
