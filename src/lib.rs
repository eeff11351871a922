//! # allknn - exact all-points k-nearest-neighbor search
//!
//! For a fixed, in-memory set of points in D-dimensional Euclidean space,
//! computes the exact k nearest neighbors of every point using one of three
//! interchangeable strategies:
//!
//! - **Brute force**: every pair once, single thread. The reference result.
//! - **Spatial index**: a k-d tree (median split on the widest dimension)
//!   queried once per point with branch-and-bound pruning.
//! - **Partitioned**: brute force cut into partition-pair tasks and run on a
//!   worker pool. A scheduler guarantees no two workers ever touch the same
//!   partition at once, so accumulators are updated without per-point locks.
//!
//! ## Quick Start
//!
//! ```rust
//! use allknn::prelude::*;
//!
//! // four points on a line
//! let points = PointSet::from_rows(1, [[0.0f32], [1.0], [3.0], [10.0]]).unwrap();
//!
//! let config = KnnConfig::new(points.len(), 1, 2).brute_force();
//! let table = solve(&points, &config).unwrap();
//! assert_eq!(table.neighbors(0), &[1, 2]);
//! assert_eq!(table.neighbors(3), &[2, 1]);
//!
//! // the same answer from the k-d tree
//! let tree = KdTree::build(&points);
//! let mut results = Vec::new();
//! tree.query_k(3, 2, &mut results).unwrap();
//! assert_eq!(results, vec![2, 1]);
//! ```
//!
//! ## How It Works
//!
//! Every strategy feeds squared Euclidean distances into one bounded
//! max-heap per point ([`CandidateHeap`]) and seals it into an ascending
//! list of neighbor ids. Equal distances may be ordered differently by
//! different strategies; the neighbor *sets* always agree.
//!
//! The library logs through `tracing` and never prints. Installing a
//! subscriber is left to the caller.

pub mod brute_force;
pub mod candidates;
pub mod config;
pub mod engine;
pub mod error;
pub mod kdtree;
pub mod neighbors;
pub mod points;
pub mod prelude;
pub mod scheduler;

mod comparison_tests;
mod component_tests;

pub use candidates::{Candidate, CandidateHeap, NO_NEIGHBOR};
pub use config::{KnnConfig, Strategy};
pub use engine::{solve, solve_uniform};
pub use error::{KnnError, Result};
pub use kdtree::{KdTree, QueryStats};
pub use neighbors::NeighborTable;
pub use points::PointSet;
pub use scheduler::{ScheduleReport, Scheduler, TaskInfo, TaskObserver, TraceObserver};
