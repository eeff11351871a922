//! Run configuration.
//!
//! A [`KnnConfig`] names the point count, dimension, neighbor count and the
//! strategy to use. [`KnnConfig::validate`] rejects every illegal combination
//! up front so no strategy ever starts on a bad configuration.

use crate::error::{KnnError, Result};

const DEFAULT_POINTS: usize = 10_000;
const DEFAULT_DIMENSION: usize = 120;
const DEFAULT_K: usize = 18;
const DEFAULT_PARTITIONS: usize = 80;
const DEFAULT_WORKERS: usize = 40;

/// How the neighbor lists are computed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Strategy {
    /// Every pair, one thread
    BruteForce,
    /// k-d tree build, then one pruned query per point
    SpatialIndex,
    /// Every pair, split into partition-pair tasks run by `workers` threads
    Partitioned {
        /// Number of contiguous point ranges
        partitions: usize,
        /// Threads running tasks, the caller included
        workers: usize,
    },
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Partitioned {
            partitions: DEFAULT_PARTITIONS,
            workers: DEFAULT_WORKERS,
        }
    }
}

/// Parameters of one all-points kNN run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KnnConfig {
    /// Number of points in the set
    pub points: usize,
    /// Coordinates per point
    pub dimension: usize,
    /// Neighbors per point
    pub k: usize,
    /// Algorithm used by [`crate::solve`]
    pub strategy: Strategy,
}

impl Default for KnnConfig {
    fn default() -> Self {
        KnnConfig {
            points: DEFAULT_POINTS,
            dimension: DEFAULT_DIMENSION,
            k: DEFAULT_K,
            strategy: Strategy::default(),
        }
    }
}

impl KnnConfig {
    /// Configuration for `points` points of `dimension` coordinates and `k`
    /// neighbors, with the default strategy
    pub fn new(points: usize, dimension: usize, k: usize) -> Self {
        KnnConfig {
            points,
            dimension,
            k,
            ..Default::default()
        }
    }

    /// Replaces the strategy
    #[must_use]
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Switches to [`Strategy::BruteForce`]
    #[must_use]
    pub fn brute_force(self) -> Self {
        self.with_strategy(Strategy::BruteForce)
    }

    /// Switches to [`Strategy::SpatialIndex`]
    #[must_use]
    pub fn spatial_index(self) -> Self {
        self.with_strategy(Strategy::SpatialIndex)
    }

    /// Switches to [`Strategy::Partitioned`]
    #[must_use]
    pub fn partitioned(self, partitions: usize, workers: usize) -> Self {
        self.with_strategy(Strategy::Partitioned { partitions, workers })
    }

    /// Checks every parameter, returning the first violation.
    ///
    /// # Errors
    /// [`KnnError::InvalidConfig`] for a zero dimension, `k == 0`, `k >= points`,
    /// or a partitioned strategy with zero partitions or workers.
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(KnnError::InvalidConfig("dimension must be at least 1".into()));
        }
        if self.k == 0 {
            return Err(KnnError::InvalidConfig("k must be at least 1".into()));
        }
        if self.k >= self.points {
            return Err(KnnError::InvalidConfig(format!(
                "k ({}) must be smaller than the point count ({})",
                self.k, self.points
            )));
        }
        if let Strategy::Partitioned { partitions, workers } = self.strategy {
            validate_schedule(partitions, workers)?;
        }
        Ok(())
    }
}

pub(crate) fn validate_schedule(partitions: usize, workers: usize) -> Result<()> {
    if partitions == 0 {
        return Err(KnnError::InvalidConfig("partition count must be at least 1".into()));
    }
    if workers == 0 {
        return Err(KnnError::InvalidConfig("worker count must be at least 1".into()));
    }
    Ok(())
}
