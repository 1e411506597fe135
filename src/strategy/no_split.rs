//! Whole-partition initial phase.
//!
//! Partitions are taken cheapest first and dealt to the bins round-robin
//! as long as the next one fits under the operations bound of the bin it
//! is dealt to. The first partition that does not fit ends the phase.
//!
//! # Exact fits
//! The bound sums to the total only if exactly `bins - adjustment` bins
//! end at `operations` and the rest one below. Once that many bins are
//! exactly full, the bound drops by one for the remaining bins.

use crate::bins::BinCollection;
use crate::error::Result;
use crate::partitions::PartitionCollection;

pub fn fill_without_splitting(
    bins: &mut BinCollection,
    mut partitions: PartitionCollection,
) -> Result<PartitionCollection> {
    partitions.sort_by_cost();
    let n = bins.len();
    let mut bound = bins.lower_bound();
    let mut full_bins = 0;
    let mut bin_index = 0;

    while let Some(next) = partitions.first() {
        let cost = next.op_optimized();
        let size = bins.bins()[bin_index].size();
        if size + cost > bound.operations {
            break;
        }

        let placed = partitions.split_front_n_partitions(1);
        let bin = &mut bins.bins_mut()[bin_index];
        bin.add_all(placed)?;

        if bin.size() == bound.operations {
            full_bins += 1;
            if bound.operations_adjustment > 0
                && full_bins as u64 == n as u64 - bound.operations_adjustment
            {
                bound.operations -= 1;
                bins.set_lower_bound_to(bound);
            }
        }
        bin_index = (bin_index + 1) % n;
    }

    bins.sort_by_size();
    tracing::debug!(
        bins = n,
        remaining = partitions.len(),
        "whole partitions placed"
    );
    Ok(partitions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_places_equal_halves() {
        let tree = fixtures::distinct_tree(20);
        let mut parts = fixtures::collection(&tree, &[("a", 10), ("b", 10)]);
        let mut bins = BinCollection::new(2).unwrap();
        bins.set_lower_bound(&mut parts).unwrap();

        let remaining = fill_without_splitting(&mut bins, parts).unwrap();
        assert!(remaining.is_empty());
        assert_eq!(bins.bins()[0].partitions()[0].name(), "a");
        assert_eq!(bins.bins()[1].partitions()[0].name(), "b");
    }

    #[test]
    fn test_stops_at_first_overflow() {
        let tree = fixtures::distinct_tree(12);
        // Costs 6, 9, 21 against a bound of 18.
        let mut parts = fixtures::collection(&tree, &[("big", 7), ("s", 2), ("m", 3)]);
        let mut bins = BinCollection::new(2).unwrap();
        bins.set_lower_bound(&mut parts).unwrap();

        let remaining = fill_without_splitting(&mut bins, parts).unwrap();
        assert_eq!(remaining.names(), vec!["big"]);
        assert_eq!(bins.total_sites(), 5);
        assert!(bins.iter().all(|b| b.size() <= 18));
    }

    #[test]
    fn test_exact_fit_lowers_bound_for_remaining_bins() {
        let tree = fixtures::distinct_tree(7);
        // Total 21 over 4 bins: bound 6, adjustment 3.
        let layout = [("a", 2), ("b", 1), ("c", 1), ("d", 1), ("e", 2)];
        let mut parts = fixtures::collection(&tree, &layout);
        let mut bins = BinCollection::new(4).unwrap();
        bins.set_lower_bound(&mut parts).unwrap();
        assert_eq!(bins.lower_bound().operations, 6);
        assert_eq!(bins.lower_bound().operations_adjustment, 3);

        // b, c, d take 3 each, a fills bin 3 exactly, e no longer fits.
        let remaining = fill_without_splitting(&mut bins, parts).unwrap();
        assert_eq!(remaining.names(), vec!["e"]);
        assert_eq!(bins.lower_bound().operations, 5);
        assert_eq!(bins.bins()[3].size(), 6);
    }
}
