//! Reference scheduling: the cost-agnostic baseline.
//!
//! Works on site counts only. Partitions are sorted by size and dealt
//! round-robin while they fit the site bound; the rest is cut into
//! consecutive runs that top every bin up to the bound, smallest bin
//! first. Exactly `bins - sites_adjustment` bins end at the bound, the
//! others one site below it.

use crate::bins::{BinCollection, LowerBound};
use crate::error::Result;
use crate::partitions::PartitionCollection;
use crate::strategy::FillStrategy;

#[derive(Debug, Clone, Copy, Default)]
pub struct Reference;

/// Site cap for the next bin given how many already sit at the bound.
fn site_cap(bound: &LowerBound, bins: usize, full_bins: usize) -> usize {
    if full_bins >= bins - bound.sites_adjustment {
        bound.sites.saturating_sub(1)
    } else {
        bound.sites
    }
}

impl FillStrategy for Reference {
    fn name(&self) -> &str {
        "reference"
    }

    fn initial(
        &self,
        bins: &mut BinCollection,
        mut partitions: PartitionCollection,
    ) -> Result<PartitionCollection> {
        partitions.sort_by_site_count();
        let bound = bins.lower_bound();
        let n = bins.len();
        let mut full_bins = 0;
        let mut bin_index = 0;

        while let Some(next) = partitions.first() {
            let cap = site_cap(&bound, n, full_bins);
            let bin = &bins.bins()[bin_index];
            if bin.total_sites() + next.len() > cap {
                break;
            }
            let placed = partitions.split_front_n_partitions(1);
            let bin = &mut bins.bins_mut()[bin_index];
            bin.add_all(placed)?;
            if bin.total_sites() == bound.sites {
                full_bins += 1;
            }
            bin_index = (bin_index + 1) % n;
        }
        Ok(partitions)
    }

    fn fill(&self, bins: &mut BinCollection, mut remaining: PartitionCollection) -> Result<()> {
        let bound = bins.lower_bound();
        let n = bins.len();
        let mut full_bins = bins
            .iter()
            .filter(|b| b.total_sites() >= bound.sites)
            .count();

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by_key(|&i| bins.bins()[i].total_sites());

        for (pos, &i) in order.iter().enumerate() {
            let held = bins.bins()[i].total_sites();
            if held >= bound.sites {
                continue;
            }
            let count = if pos == n - 1 {
                remaining.total_sites()
            } else {
                site_cap(&bound, n, full_bins).saturating_sub(held)
            };
            let run = remaining.split_by_site_count(count, false)?;
            let bin = &mut bins.bins_mut()[i];
            bin.add_all(run)?;
            if bin.total_sites() == bound.sites {
                full_bins += 1;
            }
        }

        // The last bin in order was already full.
        if !remaining.is_empty() {
            bins.bins_mut()[order[0]].add_all(remaining)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_balances_site_counts() {
        let tree = fixtures::distinct_tree(10);
        let mut parts = fixtures::collection(&tree, &[("big", 6), ("a", 1), ("b", 3)]);
        let mut bins = BinCollection::new(3).unwrap();
        bins.set_lower_bound(&mut parts).unwrap();
        // 10 sites over 3 bins: bound 4, adjustment 2.

        let remaining = Reference.initial(&mut bins, parts).unwrap();
        // a -> bin0, b -> bin1, big does not fit bin2.
        assert_eq!(remaining.names(), vec!["big"]);

        Reference.fill(&mut bins, remaining).unwrap();
        let mut counts: Vec<usize> = bins.iter().map(|b| b.total_sites()).collect();
        counts.sort();
        assert_eq!(counts, vec![3, 3, 4]);
    }

    #[test]
    fn test_single_bin_takes_everything() {
        let tree = fixtures::distinct_tree(5);
        let mut parts = fixtures::collection(&tree, &[("a", 2), ("b", 3)]);
        let mut bins = BinCollection::new(1).unwrap();
        bins.set_lower_bound(&mut parts).unwrap();
        let remaining = Reference.initial(&mut bins, parts).unwrap();
        assert!(remaining.is_empty());
        Reference.fill(&mut bins, remaining).unwrap();
        assert_eq!(bins.total_sites(), 5);
    }
}
