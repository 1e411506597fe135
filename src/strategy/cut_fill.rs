//! Cut fill: the cost-driven counterpart of the proportional slice.
//!
//! Bins are visited smallest first. Each one gets an operation budget
//!
//! ```text
//! budget(bin) = max(ceil(free(bin) / total_free * remaining_ops), free(bin))
//! ```
//!
//! with both totals taken at the moment the bin is visited, and the budget
//! is peeled off the front of the pool by optimized cost.

use crate::bins::BinCollection;
use crate::error::Result;
use crate::partitions::PartitionCollection;
use crate::strategy::FillStrategy;

#[derive(Debug, Clone, Copy, Default)]
pub struct CutFill;

/// Operations owed to a bin with `free` room out of `total_free`, when
/// `remaining_ops` are still waiting in the pool.
pub(crate) fn operation_budget(free: u64, total_free: u64, remaining_ops: u64) -> u64 {
    if total_free == 0 {
        return remaining_ops;
    }
    let share = (u128::from(free) * u128::from(remaining_ops)).div_ceil(u128::from(total_free));
    u64::try_from(share).unwrap_or(u64::MAX).max(free)
}

impl FillStrategy for CutFill {
    fn name(&self) -> &str {
        "cut-fill"
    }

    fn fill(&self, bins: &mut BinCollection, mut remaining: PartitionCollection) -> Result<()> {
        remaining.ensure_computed()?;
        let mut order: Vec<usize> = (0..bins.len()).collect();
        order.sort_by_key(|&i| bins.bins()[i].size());

        for &i in &order {
            if remaining.is_empty() {
                break;
            }
            let free = bins.free_spaces()[i];
            let budget = operation_budget(free, bins.total_free_space(), remaining.total_optimized_cost());
            if budget == 0 {
                continue;
            }
            let cut = remaining.split_by_operation_cost(budget)?;
            tracing::trace!(bin = i, budget, "cut placed");
            bins.bins_mut()[i].add_all(cut)?;
        }

        // Everything was at the bound: the rest goes to the lightest bin.
        if !remaining.is_empty() {
            let target = bins.smallest_bin();
            tracing::debug!(bin = target, sites = remaining.total_sites(), "cut overflow placed");
            bins.bins_mut()[target].add_all(remaining)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_budget_is_share_or_free_space() {
        // Proportional share wins when the pool outweighs the free space.
        assert_eq!(operation_budget(10, 30, 60), 20);
        // Rounded up.
        assert_eq!(operation_budget(10, 30, 50), 17);
        // Never below the bin's own free space.
        assert_eq!(operation_budget(10, 30, 12), 10);
        assert_eq!(operation_budget(0, 30, 12), 0);
        // No room anywhere: the whole pool.
        assert_eq!(operation_budget(0, 0, 12), 12);
    }

    #[test]
    fn test_cuts_partition_by_cost() {
        let tree = fixtures::distinct_tree(10);
        let mut parts = fixtures::collection(&tree, &[("p", 10)]);
        let mut bins = BinCollection::new(3).unwrap();
        bins.set_lower_bound(&mut parts).unwrap();

        CutFill.fill(&mut bins, parts).unwrap();
        let counts: Vec<usize> = bins.iter().map(|b| b.total_sites()).collect();
        assert_eq!(counts, vec![4, 4, 2]);
        assert_eq!(bins.total_size(), 30);

        let mut sites: Vec<usize> = bins
            .iter()
            .flat_map(|b| b.partitions().iter().flat_map(|p| p.sites().to_vec()))
            .collect();
        sites.sort_unstable();
        assert_eq!(sites, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_no_room_sends_pool_to_first_bin() {
        let tree = fixtures::distinct_tree(4);
        let mut parts = fixtures::collection(&tree, &[("p", 4)]);
        let mut bins = BinCollection::new(2).unwrap();
        bins.set_lower_bound(&mut parts).unwrap();
        bins.override_lower_bound(0);

        CutFill.fill(&mut bins, parts).unwrap();
        assert_eq!(bins.bins()[0].total_sites(), 4);
        assert!(bins.bins()[1].is_empty());
    }
}
