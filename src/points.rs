//! Dense point storage.
//!
//! All coordinates live in one flat buffer, `dimension` floats per point,
//! in insertion order. A point's id is its insertion index.

use rand::Rng;

use crate::error::{KnnError, Result};

/// Fixed-dimension set of points.
#[derive(Clone, Debug, PartialEq)]
pub struct PointSet {
    /// Row-major coordinates: point `i` is `coords[i * dimension..(i + 1) * dimension]`
    coords: Vec<f32>,
    dimension: usize,
}

impl PointSet {
    /// Creates an empty point set
    ///
    /// # Errors
    /// [`KnnError::InvalidConfig`] if `dimension` is zero.
    pub fn new(dimension: usize) -> Result<Self> {
        Self::with_capacity(dimension, 0)
    }

    /// Creates an empty point set with room for `capacity` points
    ///
    /// # Errors
    /// [`KnnError::InvalidConfig`] if `dimension` is zero.
    pub fn with_capacity(dimension: usize, capacity: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(KnnError::InvalidConfig("dimension must be at least 1".into()));
        }
        Ok(PointSet {
            coords: Vec::with_capacity(capacity * dimension),
            dimension,
        })
    }

    /// Builds a point set from rows.
    ///
    /// # Errors
    /// [`KnnError::DimensionMismatch`] for the first row of the wrong length,
    /// [`KnnError::InvalidConfig`] if `dimension` is zero.
    pub fn from_rows<R, I>(dimension: usize, rows: I) -> Result<Self>
    where
        R: AsRef<[f32]>,
        I: IntoIterator<Item = R>,
    {
        let mut set = Self::new(dimension)?;
        for row in rows {
            set.add(row.as_ref())?;
        }
        Ok(set)
    }

    /// `count` points with every coordinate drawn uniformly from `[0, 1)`.
    ///
    /// # Errors
    /// [`KnnError::InvalidConfig`] if `dimension` is zero.
    pub fn uniform<R: Rng>(count: usize, dimension: usize, rng: &mut R) -> Result<Self> {
        let mut set = Self::with_capacity(dimension, count)?;
        set.coords
            .extend((0..count * dimension).map(|_| rng.random::<f32>()));
        Ok(set)
    }

    /// Appends a point and returns its id
    ///
    /// # Errors
    /// [`KnnError::DimensionMismatch`] if `coords` has the wrong length.
    pub fn add(&mut self, coords: &[f32]) -> Result<usize> {
        if coords.len() != self.dimension {
            return Err(KnnError::DimensionMismatch {
                expected: self.dimension,
                actual: coords.len(),
            });
        }
        self.coords.extend_from_slice(coords);
        Ok(self.len() - 1)
    }

    /// Number of points
    #[inline]
    pub fn len(&self) -> usize {
        self.coords.len() / self.dimension
    }

    /// True if no point was added
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// Coordinates per point
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Coordinates of point `id`.
    ///
    /// # Panics
    /// Panics if `id >= self.len()`.
    #[inline]
    pub fn point(&self, id: usize) -> &[f32] {
        let start = id * self.dimension;
        &self.coords[start..start + self.dimension]
    }

    /// Coordinates of point `id`, or `None` if out of range
    pub fn get(&self, id: usize) -> Option<&[f32]> {
        (id < self.len()).then(|| self.point(id))
    }

    /// Single coordinate of a point along `dim`
    #[inline]
    pub fn coord(&self, id: usize, dim: usize) -> f32 {
        self.coords[id * self.dimension + dim]
    }

    /// Squared Euclidean distance between two stored points
    #[inline]
    pub fn squared_distance(&self, a: usize, b: usize) -> f32 {
        squared_distance(self.point(a), self.point(b))
    }

    pub(crate) fn check_id(&self, id: usize) -> Result<()> {
        if id < self.len() {
            Ok(())
        } else {
            Err(KnnError::PointOutOfRange { id, len: self.len() })
        }
    }
}

/// Sum of squared per-dimension differences. No square root: only the
/// ordering matters.
#[inline]
pub fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
