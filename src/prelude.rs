//! Prelude module for convenient imports
//!
//! This module re-exports the most commonly used types from the crate.
//! Users can import everything they need with:
//!
//! ```
//! use allknn::prelude::*;
//! ```

pub use crate::{
    KdTree, KnnConfig, KnnError, NO_NEIGHBOR, NeighborTable, PointSet, Scheduler, Strategy, solve,
};
