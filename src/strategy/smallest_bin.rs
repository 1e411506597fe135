//! Smallest-bin-first remainder fill: each site goes to whichever bin is
//! currently the lightest, ties to the lowest index.

use crate::bins::BinCollection;
use crate::error::Result;
use crate::partitions::PartitionCollection;
use crate::strategy::{FillStrategy, single_site};

#[derive(Debug, Clone, Copy, Default)]
pub struct SmallestBinFirst;

impl FillStrategy for SmallestBinFirst {
    fn name(&self) -> &str {
        "smallest-bin-first"
    }

    fn fill(&self, bins: &mut BinCollection, remaining: PartitionCollection) -> Result<()> {
        for source in &remaining {
            for &site in source.sites() {
                let target = bins.smallest_bin();
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
    fn test_alternates_between_equal_bins() {
        let tree = fixtures::distinct_tree(5);
        let mut parts = fixtures::collection(&tree, &[("p", 5)]);
        let mut bins = BinCollection::new(2).unwrap();
        bins.set_lower_bound(&mut parts).unwrap();

        SmallestBinFirst.fill(&mut bins, parts).unwrap();
        assert_eq!(bins.bins()[0].partitions()[0].sites(), &[0, 2, 4]);
        assert_eq!(bins.bins()[1].partitions()[0].sites(), &[1, 3]);
        assert_eq!(bins.max_size(), 9);
    }
}
