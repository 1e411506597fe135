//! The [`FillStrategy`] trait and the heuristics implementing it.
//!
//! A run has two phases. [`FillStrategy::initial`] places whole partitions
//! while they fit under the lower bound; [`FillStrategy::fill`] then
//! distributes whatever is left, splitting partitions where needed.

pub mod cut_fill;
pub mod greedy;
pub mod max_spread;
pub mod no_split;
pub mod proportional;
pub mod reference;
pub mod smallest_bin;

pub use cut_fill::CutFill;
pub use greedy::GreedySimulate;
pub use max_spread::MaxSpread;
pub use proportional::{ProportionalSlice, SliceRounding};
pub use reference::Reference;
pub use smallest_bin::SmallestBinFirst;

use crate::bins::BinCollection;
use crate::error::{Result, SchedulerError};
use crate::partition::Partition;
use crate::partitions::PartitionCollection;
use crate::schedule::SchedulerConfig;
use clap::ValueEnum;
use std::str::FromStr;
use std::sync::Arc;

/// A way of distributing partitions over a [`BinCollection`].
///
/// Strategies expect `bins.set_lower_bound` to have run on the same
/// partitions beforehand.
pub trait FillStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Places whole partitions and returns the ones that did not fit.
    fn initial(
        &self,
        bins: &mut BinCollection,
        partitions: PartitionCollection,
    ) -> Result<PartitionCollection> {
        no_split::fill_without_splitting(bins, partitions)
    }

    /// Places every site of `remaining`.
    fn fill(&self, bins: &mut BinCollection, remaining: PartitionCollection) -> Result<()>;
}

/// The selectable remainder-fill heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Heuristic {
    /// Simulate every site in every bin, place it where it is cheapest.
    GreedySimulate,
    /// One site at a time into the currently smallest bin.
    SmallestBinFirst,
    /// Feed the smallest bin the cheapest candidate across all partitions.
    MaxSpread,
    /// Cut the pool into slices proportional to each bin's free space.
    ProportionalSlice,
    /// Cut the pool by operation cost in proportion to each bin's free space.
    CutFill,
    /// Cost-agnostic site-count scheduling, the baseline.
    Reference,
}

impl Heuristic {
    pub fn strategy(self, config: &SchedulerConfig) -> Box<dyn FillStrategy> {
        match self {
            Heuristic::GreedySimulate => Box::new(GreedySimulate),
            Heuristic::SmallestBinFirst => Box::new(SmallestBinFirst),
            Heuristic::MaxSpread => Box::new(MaxSpread::new(config.seed)),
            Heuristic::ProportionalSlice => Box::new(ProportionalSlice::new(config.slice_rounding)),
            Heuristic::CutFill => Box::new(CutFill),
            Heuristic::Reference => Box::new(Reference),
        }
    }
}

impl FromStr for Heuristic {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self> {
        <Self as ValueEnum>::from_str(s, true)
            .map_err(|_| SchedulerError::UnknownHeuristic(s.to_string()))
    }
}

/// A single-site partition of `source`'s name sharing its tree.
pub(crate) fn single_site(source: &Partition, site: usize) -> Result<Partition> {
    let tree = source
        .tree()
        .ok_or_else(|| SchedulerError::NoTree(source.name().to_string()))?;
    Partition::with_tree(source.name(), vec![site], Arc::clone(tree), false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_heuristic() {
        assert_eq!(
            "greedy-simulate".parse::<Heuristic>().unwrap(),
            Heuristic::GreedySimulate
        );
        assert_eq!(
            "Proportional-Slice".parse::<Heuristic>().unwrap(),
            Heuristic::ProportionalSlice
        );
        assert!(matches!(
            "best".parse::<Heuristic>(),
            Err(SchedulerError::UnknownHeuristic(name)) if name == "best"
        ));
    }

    #[test]
    fn test_strategy_names() {
        let config = SchedulerConfig::default();
        let names: Vec<String> = Heuristic::value_variants()
            .iter()
            .map(|h| h.strategy(&config).name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "greedy-simulate",
                "smallest-bin-first",
                "max-spread",
                "proportional-slice",
                "cut-fill",
                "reference"
            ]
        );
    }
}
