//! Greedy-simulate remainder fill.
//!
//! Every remaining site is simulated in every bin. Extending a partition
//! the bin already holds costs its incremental operations; opening a new
//! partition is charged `worst_case_per_site + 1`, so it only wins when no
//! bin holds the partition. Bins below the bound are always preferred
//! over bins at or above it.
//!
//! ```text
//! rank(bin) = (size >= bound, simulated cost)   lowest wins, then lowest index
//! ```

use crate::bins::BinCollection;
use crate::error::{Result, SchedulerError};
use crate::partitions::PartitionCollection;
use crate::strategy::{FillStrategy, single_site};

#[derive(Debug, Clone, Copy, Default)]
pub struct GreedySimulate;

impl FillStrategy for GreedySimulate {
    fn name(&self) -> &str {
        "greedy-simulate"
    }

    fn fill(&self, bins: &mut BinCollection, remaining: PartitionCollection) -> Result<()> {
        let bound = bins.lower_bound().operations;
        let new_partition_cost = bins.worst_case_per_site() + 1;

        for source in &remaining {
            for &site in source.sites() {
                let mut best: Option<((bool, u64), usize)> = None;
                for (i, bin) in bins.iter().enumerate() {
                    let cost = match bin.get(source.name()) {
                        Some(target) => target.simulate_add(&[site])?,
                        None => new_partition_cost,
                    };
                    let rank = (bin.size() >= bound, cost);
                    if best.is_none_or(|(r, _)| rank < r) {
                        best = Some((rank, i));
                    }
                }
                let (_, target) = best.ok_or_else(|| SchedulerError::Infeasible {
                    strategy: self.name().to_string(),
                    detail: format!("no bin for site {site}"),
                })?;
                bins.bins_mut()[target].add(single_site(source, site)?)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_ties_go_to_first_bin() {
        let tree = fixtures::distinct_tree(4);
        let mut parts = fixtures::collection(&tree, &[("p", 1)]);
        let mut bins = BinCollection::new(3).unwrap();
        bins.set_lower_bound(&mut parts).unwrap();

        GreedySimulate.fill(&mut bins, parts).unwrap();
        assert_eq!(bins.bins()[0].total_sites(), 1);
        assert_eq!(bins.total_sites(), 1);
    }

    #[test]
    fn test_extends_existing_partition() {
        // Sites 0 and 1 are identical: extending p in bin 1 is free.
        let tree = fixtures::small_tree();
        let mut parts = fixtures::collection(&tree, &[("p", 2)]);
        let mut bins = BinCollection::new(2).unwrap();
        bins.set_lower_bound(&mut parts).unwrap();
        let mut seed = parts.clone();
        let first = seed.split_by_site_count(1, true).unwrap();
        bins.bins_mut()[1].add_all(first).unwrap();
        bins.override_lower_bound(10);

        GreedySimulate.fill(&mut bins, seed).unwrap();
        assert_eq!(bins.bins()[1].total_sites(), 2);
        assert!(bins.bins()[0].is_empty());
    }

    #[test]
    fn test_prefers_bins_below_bound() {
        let tree = fixtures::distinct_tree(4);
        let mut parts = fixtures::collection(&tree, &[("p", 4)]);
        let mut bins = BinCollection::new(2).unwrap();
        bins.set_lower_bound(&mut parts).unwrap();
        // bin 0 already at the bound (6) with p; bin 1 empty.
        let mut pool = parts.clone();
        bins.bins_mut()[0]
            .add_all(pool.split_by_site_count(2, true).unwrap())
            .unwrap();

        GreedySimulate.fill(&mut bins, pool).unwrap();
        assert_eq!(bins.bins()[0].total_sites(), 2);
        assert_eq!(bins.bins()[1].total_sites(), 2);
    }
}
