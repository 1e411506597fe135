//! Proportional-slice remainder fill.
//!
//! Each bin's share of the remaining sites is its share of the total free
//! space below the bound:
//!
//! ```text
//! sites(bin) = round(free(bin) / total_free * total_remaining_sites)
//! ```
//!
//! Shares are computed once, before anything is placed. Bins are visited
//! smallest first and take their slice off the front of the pool,
//! splitting a partition when the cut falls inside it. Sites left over by
//! rounding down go one at a time to the bins with the most free space,
//! so a bin already at the bound never takes them while another has room.

use crate::bins::BinCollection;
use crate::error::{Result, SchedulerError};
use crate::partitions::PartitionCollection;
use crate::strategy::FillStrategy;
use clap::ValueEnum;

/// How a fractional slice size is turned into a site count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, ValueEnum)]
pub enum SliceRounding {
    #[default]
    Ceil,
    Floor,
}

impl SliceRounding {
    fn apply(self, numerator: u128, denominator: u128) -> usize {
        let value = match self {
            SliceRounding::Ceil => numerator.div_ceil(denominator),
            SliceRounding::Floor => numerator / denominator,
        };
        usize::try_from(value).unwrap_or(usize::MAX)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProportionalSlice {
    rounding: SliceRounding,
}

impl ProportionalSlice {
    pub fn new(rounding: SliceRounding) -> Self {
        ProportionalSlice { rounding }
    }
}

impl FillStrategy for ProportionalSlice {
    fn name(&self) -> &str {
        "proportional-slice"
    }

    fn fill(&self, bins: &mut BinCollection, mut remaining: PartitionCollection) -> Result<()> {
        let total_sites = remaining.total_sites();
        if total_sites == 0 {
            return Ok(());
        }
        let free = bins.free_spaces();
        let total_free: u64 = free.iter().sum();
        if total_free == 0 {
            return Err(SchedulerError::Infeasible {
                strategy: self.name().to_string(),
                detail: format!(
                    "no free space below bound {} for {total_sites} remaining sites",
                    bins.lower_bound().operations
                ),
            });
        }

        let mut order: Vec<usize> = (0..bins.len()).collect();
        order.sort_by_key(|&i| bins.bins()[i].size());

        for &i in &order {
            let count = self.rounding.apply(
                u128::from(free[i]) * total_sites as u128,
                u128::from(total_free),
            );
            let slice = remaining.split_by_site_count(count, false)?;
            tracing::trace!(bin = i, sites = count, "slice placed");
            bins.bins_mut()[i].add_all(slice)?;
        }

        let mut roomiest: Vec<usize> = order.into_iter().filter(|&i| free[i] > 0).collect();
        roomiest.sort_by_key(|&i| std::cmp::Reverse(free[i]));
        for &i in roomiest.iter().cycle() {
            if remaining.is_empty() {
                break;
            }
            let site = remaining.split_by_site_count(1, false)?;
            tracing::trace!(bin = i, "leftover site placed");
            bins.bins_mut()[i].add_all(site)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    fn slice_sizes(rounding: SliceRounding) -> Vec<usize> {
        let tree = fixtures::distinct_tree(10);
        let mut parts = fixtures::collection(&tree, &[("p", 10)]);
        let mut bins = BinCollection::new(3).unwrap();
        bins.set_lower_bound(&mut parts).unwrap();
        ProportionalSlice::new(rounding).fill(&mut bins, parts).unwrap();
        bins.iter().map(|b| b.total_sites()).collect()
    }

    #[test]
    fn test_ceil_runs_dry_in_last_bin() {
        assert_eq!(slice_sizes(SliceRounding::Ceil), vec![4, 4, 2]);
    }

    #[test]
    fn test_floor_hands_leftovers_to_roomiest_bin() {
        assert_eq!(slice_sizes(SliceRounding::Floor), vec![4, 3, 3]);
    }

    #[test]
    fn test_floor_leftovers_skip_full_bin() {
        let tree = fixtures::distinct_tree(6);
        let mut parts = fixtures::collection(&tree, &[("full", 3), ("p", 3)]);
        let mut bins = BinCollection::new(3).unwrap();
        bins.set_lower_bound(&mut parts).unwrap();
        bins.override_lower_bound(9);
        let full = parts.remove("full").unwrap();
        bins.bins_mut()[2].add(full).unwrap();
        assert_eq!(bins.free_spaces(), vec![9, 9, 0]);

        ProportionalSlice::new(SliceRounding::Floor)
            .fill(&mut bins, parts)
            .unwrap();
        let sizes: Vec<u64> = bins.iter().map(|b| b.size()).collect();
        assert_eq!(sizes, vec![6, 3, 9]);
        assert_eq!(bins.total_sites(), 6);
    }

    #[test]
    fn test_no_free_space_is_infeasible() {
        let tree = fixtures::distinct_tree(4);
        let mut parts = fixtures::collection(&tree, &[("p", 4)]);
        let mut bins = BinCollection::new(1).unwrap();
        bins.set_lower_bound(&mut parts).unwrap();
        bins.override_lower_bound(0);

        let err = ProportionalSlice::default().fill(&mut bins, parts).unwrap_err();
        assert!(matches!(err, SchedulerError::Infeasible { .. }));
    }
}
