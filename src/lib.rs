//! Crate root: module wiring and public re-exports.
//!
//! Modules:
//! - `tree`: arena tree model with memoised likelihood-operation counting.
//! - `alignment`: leaf sequences and duplicate-site removal.
//! - `partition` / `partitions`: named site groups and their collection.
//! - `bins`: worker bins, lower bounds and summaries.
//! - `strategy`: fill heuristics behind the `FillStrategy` contract.
//! - `optimize` / `schedule`: refinement passes and run orchestration.
//! - `enumerate`: brute-force ground truth for small inputs.
//! - `io` / `report`: loaders and flat CSV records.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).

pub mod alignment;
pub mod bins;
pub mod bitset;
pub mod enumerate;
pub mod error;
pub mod io;
pub mod optimize;
pub mod partition;
pub mod partitions;
pub mod report;
pub mod schedule;
pub mod strategy;
pub mod tree;

#[cfg(feature = "python")]
pub mod api;

#[cfg(test)]
mod fixtures;

// Re-export frequently used types & functions
pub use alignment::Alignment;
pub use bins::{Bin, BinCollection, LowerBound};
pub use bitset::Bitset;
pub use enumerate::{Distributions, GroundTruth, expected_distribution_count, ground_truth};
pub use error::{Result, SchedulerError};
pub use io::{read_newick_tree, read_partitions, read_phylip, write_records_csv};
pub use optimize::Optimization;
pub use partition::Partition;
pub use partitions::PartitionCollection;
pub use schedule::{Schedule, SchedulerConfig, schedule};
pub use strategy::{FillStrategy, Heuristic, SliceRounding};
pub use tree::{OperationCount, Tree};
