//! Partition Collection: the pool of partitions a scheduling run consumes.

use crate::error::Result;
use crate::partition::Partition;
use crate::tree::Tree;
use std::ops::Range;
use std::sync::Arc;

/// Partitions keyed by name, kept in an explicit order.
///
/// The order is what `split_*` methods take from the front of, so the
/// heuristics sort the collection before consuming it.
#[derive(Debug, Clone, Default)]
pub struct PartitionCollection {
    partitions: Vec<Partition>,
}

impl PartitionCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds uncomputed, tree-less partitions from contiguous site ranges.
    pub fn from_ranges<I, S>(ranges: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Range<usize>)>,
        S: Into<String>,
    {
        let mut collection = Self::new();
        for (name, range) in ranges {
            collection.add(Partition::new(name, range.collect()), true)?;
        }
        Ok(collection)
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Partition> {
        self.partitions.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Partition> {
        self.partitions.iter_mut()
    }

    pub fn first(&self) -> Option<&Partition> {
        self.partitions.first()
    }

    pub fn get(&self, name: &str) -> Option<&Partition> {
        self.partitions.iter().find(|p| p.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Partition> {
        self.partitions.iter_mut().find(|p| p.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.partitions.iter().map(|p| p.name()).collect()
    }

    pub fn total_sites(&self) -> usize {
        self.partitions.iter().map(|p| p.len()).sum()
    }

    pub fn total_optimized_cost(&self) -> u64 {
        self.partitions.iter().map(|p| p.op_optimized()).sum()
    }

    pub fn total_maximum_cost(&self) -> u64 {
        self.partitions.iter().map(|p| p.op_maximum()).sum()
    }

    /// Flattened `(site, owner)` view in collection order.
    pub fn sites_with_owner(&self) -> Vec<(usize, String)> {
        self.partitions
            .iter()
            .flat_map(|p| p.sites().iter().map(move |&s| (s, p.name().to_string())))
            .collect()
    }

    /// Binds `tree` to every partition, optionally computing costs.
    pub fn bind_tree(&mut self, tree: &Arc<Tree>, compute: bool) -> Result<()> {
        for partition in &mut self.partitions {
            partition.bind_tree(Arc::clone(tree));
            if compute {
                partition.compute()?;
            }
        }
        Ok(())
    }

    /// Computes every partition from scratch.
    pub fn compute_all(&mut self) -> Result<()> {
        for partition in &mut self.partitions {
            partition.compute()?;
        }
        Ok(())
    }

    /// Computes the partitions whose costs are missing.
    pub fn ensure_computed(&mut self) -> Result<()> {
        for partition in &mut self.partitions {
            partition.ensure_computed()?;
        }
        Ok(())
    }

    /// Inserts `partition`, merging into a same-named member if present.
    ///
    /// With `dirty` the sites are appended without counting; the merged
    /// member must be recomputed before its costs are read.
    pub fn add(&mut self, partition: Partition, dirty: bool) -> Result<()> {
        match self.get_mut(partition.name()) {
            Some(existing) if dirty => {
                if existing.tree().is_none() {
                    if let Some(tree) = partition.tree() {
                        existing.bind_tree(Arc::clone(tree));
                    }
                }
                existing.extend_dirty(partition.sites());
            }
            Some(existing) => {
                existing.merge(partition, false)?;
            }
            None => self.partitions.push(partition),
        }
        Ok(())
    }

    /// Removes and returns the member called `name`.
    pub fn remove(&mut self, name: &str) -> Option<Partition> {
        let idx = self.partitions.iter().position(|p| p.name() == name)?;
        Some(self.partitions.remove(idx))
    }

    /// Pops up to `n` whole partitions off the front.
    pub fn split_front_n_partitions(&mut self, n: usize) -> Vec<Partition> {
        let n = n.min(self.partitions.len());
        self.partitions.drain(..n).collect()
    }

    /// Removes a running total of `n` sites from the front, cropping the
    /// partition the boundary falls into.
    pub fn split_by_site_count(&mut self, n: usize, compute: bool) -> Result<Vec<Partition>> {
        let mut removed = Vec::new();
        let mut remaining = n;
        while remaining > 0 && !self.partitions.is_empty() {
            if self.partitions[0].len() <= remaining {
                let mut whole = self.partitions.remove(0);
                remaining -= whole.len();
                if compute {
                    whole.ensure_computed()?;
                }
                removed.push(whole);
            } else {
                removed.push(self.partitions[0].split_front(remaining, compute)?);
                remaining = 0;
            }
        }
        Ok(removed)
    }

    /// Removes partitions from the front until their optimized cost reaches
    /// `target`. A partition straddling the boundary is peeled one site at
    /// a time, so the removed cost is never below `target` unless the
    /// collection runs dry.
    pub fn split_by_operation_cost(&mut self, target: u64) -> Result<Vec<Partition>> {
        let mut removed = Vec::new();
        let mut acc = 0u64;
        while acc < target && !self.partitions.is_empty() {
            let cost = self.partitions[0].ensure_computed()?.op_optimized;
            if acc + cost <= target {
                acc += cost;
                removed.push(self.partitions.remove(0));
                continue;
            }

            let source = &mut self.partitions[0];
            let mut piece = source.split_front(0, false)?;
            piece.compute()?;
            let mut taken = 0;
            for &site in source.sites() {
                if acc >= target {
                    break;
                }
                acc += piece.incremental_add(&[site], false)?;
                taken += 1;
            }
            source.split_front(taken, false)?;
            if source.is_empty() {
                self.partitions.remove(0);
            }
            removed.push(piece);
        }
        Ok(removed)
    }

    /// Stable sort by optimized cost, ascending.
    pub fn sort_by_cost(&mut self) {
        self.partitions.sort_by_key(|p| p.op_optimized());
    }

    /// Stable sort by number of sites, ascending.
    pub fn sort_by_site_count(&mut self) {
        self.partitions.sort_by_key(|p| p.len());
    }

    /// Drops members without sites.
    pub fn compact(&mut self) {
        self.partitions.retain(|p| !p.is_empty());
    }

    /// Keeps the first `partitions` members, each cut to its first
    /// `sites_per_partition` sites. Used to shrink inputs for brute force.
    pub fn crop(&mut self, partitions: usize, sites_per_partition: usize) -> Result<()> {
        self.partitions.truncate(partitions);
        for partition in &mut self.partitions {
            partition.crop(sites_per_partition)?;
        }
        Ok(())
    }
}

impl IntoIterator for PartitionCollection {
    type Item = Partition;
    type IntoIter = std::vec::IntoIter<Partition>;

    fn into_iter(self) -> Self::IntoIter {
        self.partitions.into_iter()
    }
}

impl<'a> IntoIterator for &'a PartitionCollection {
    type Item = &'a Partition;
    type IntoIter = std::slice::Iter<'a, Partition>;

    fn into_iter(self) -> Self::IntoIter {
        self.partitions.iter()
    }
}

impl FromIterator<Partition> for PartitionCollection {
    /// Collects without merging; callers guarantee unique names.
    fn from_iter<I: IntoIterator<Item = Partition>>(iter: I) -> Self {
        PartitionCollection {
            partitions: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_from_ranges_and_totals() {
        let parts = PartitionCollection::from_ranges([("a", 0..3), ("b", 3..5)]).unwrap();
        assert_eq!(parts.names(), vec!["a", "b"]);
        assert_eq!(parts.total_sites(), 5);
        assert_eq!(parts.total_optimized_cost(), 0);
        assert_eq!(
            parts.sites_with_owner()[3],
            (3, "b".to_string())
        );
    }

    #[test]
    fn test_add_merges_same_name() {
        let tree = fixtures::small_tree();
        let mut parts = fixtures::collection(&tree, &[("p", 1)]);
        parts
            .add(Partition::with_tree("p", vec![1, 2], Arc::clone(&tree), false).unwrap(), false)
            .unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts.get("p").unwrap().sites(), &[0, 1, 2]);
        assert_eq!(parts.total_optimized_cost(), 3);

        parts.add(Partition::new("p", vec![3]), true).unwrap();
        assert!(!parts.get("p").unwrap().is_computed());
        parts.ensure_computed().unwrap();
        assert_eq!(parts.total_optimized_cost(), 5);
    }

    #[test]
    fn test_split_by_site_count_crops_boundary() {
        let tree = fixtures::distinct_tree(10);
        let mut parts = fixtures::collection(&tree, &[("a", 3), ("b", 4), ("c", 3)]);
        let removed = parts.split_by_site_count(5, true).unwrap();

        assert_eq!(removed.len(), 2);
        assert_eq!(removed[0].name(), "a");
        assert_eq!(removed[1].sites(), &[3, 4]);
        assert_eq!(removed[1].op_optimized(), 6);
        assert_eq!(parts.total_sites(), 5);
        assert_eq!(parts.get("b").unwrap().sites(), &[5, 6]);
    }

    #[test]
    fn test_split_by_operation_cost_never_undershoots() {
        let tree = fixtures::distinct_tree(10);
        let mut parts = fixtures::collection(&tree, &[("a", 3), ("b", 7)]);
        // a costs 9, then b is peeled until 15 >= 13.
        let removed = parts.split_by_operation_cost(13).unwrap();

        let cost: u64 = removed.iter().map(|p| p.op_optimized()).sum();
        assert_eq!(cost, 15);
        assert_eq!(removed[1].sites(), &[3, 4]);
        assert_eq!(parts.total_sites(), 5);
        assert_eq!(parts.total_optimized_cost(), 15);
    }

    #[test]
    fn test_split_front_n_partitions() {
        let parts_src = PartitionCollection::from_ranges([("a", 0..1), ("b", 1..2)]).unwrap();
        let mut parts = parts_src.clone();
        let front = parts.split_front_n_partitions(5);
        assert_eq!(front.len(), 2);
        assert!(parts.is_empty());
    }

    #[test]
    fn test_sort_compact_and_crop() {
        let tree = fixtures::distinct_tree(10);
        let mut parts = fixtures::collection(&tree, &[("a", 5), ("b", 2), ("c", 3)]);
        parts.sort_by_site_count();
        assert_eq!(parts.names(), vec!["b", "c", "a"]);

        parts.get_mut("b").unwrap().split_front(2, false).unwrap();
        parts.compact();
        assert_eq!(parts.names(), vec!["c", "a"]);

        parts.crop(1, 2).unwrap();
        assert_eq!(parts.names(), vec!["c"]);
        assert_eq!(parts.get("c").unwrap().sites(), &[7, 8]);
        assert_eq!(parts.total_optimized_cost(), 6);
    }
}
