//! A named set of alignment sites bound to a tree.
//!
//! The tree is held behind an `Arc`. Partitions created from one source
//! share it until one of them starts counting, at which point
//! `Arc::make_mut` hands that partition a private copy. Costs are only
//! meaningful relative to the copy they were counted against.

use crate::error::{Result, SchedulerError};
use crate::tree::{OperationCount, Tree};
use rand::Rng;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Partition {
    name: String,
    sites: Vec<usize>,
    tree: Option<Arc<Tree>>,
    /// `Some` only while the tree cache holds exactly `sites`.
    costs: Option<OperationCount>,
}

impl Partition {
    /// A partition without a tree. Costs cannot be computed until one is
    /// bound with [`Partition::bind_tree`].
    pub fn new(name: impl Into<String>, sites: Vec<usize>) -> Self {
        Partition {
            name: name.into(),
            sites,
            tree: None,
            costs: None,
        }
    }

    /// A partition sharing `tree`, optionally counting its costs right away.
    pub fn with_tree(
        name: impl Into<String>,
        sites: Vec<usize>,
        tree: Arc<Tree>,
        compute: bool,
    ) -> Result<Self> {
        let mut partition = Partition {
            name: name.into(),
            sites,
            tree: Some(tree),
            costs: None,
        };
        if compute {
            partition.compute()?;
        }
        Ok(partition)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sites(&self) -> &[usize] {
        &self.sites
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn tree(&self) -> Option<&Arc<Tree>> {
        self.tree.as_ref()
    }

    pub fn costs(&self) -> Option<OperationCount> {
        self.costs
    }

    pub fn is_computed(&self) -> bool {
        self.costs.is_some()
    }

    /// Optimized operations; 0 until computed.
    pub fn op_optimized(&self) -> u64 {
        self.costs.map_or(0, |c| c.op_optimized)
    }

    pub fn op_maximum(&self) -> u64 {
        self.costs.map_or(0, |c| c.op_maximum)
    }

    pub fn op_savings(&self) -> f64 {
        self.costs.map_or(0.0, |c| c.op_savings())
    }

    /// Binds (or replaces) the tree. Previously computed costs are dropped.
    pub fn bind_tree(&mut self, tree: Arc<Tree>) {
        self.tree = Some(tree);
        self.costs = None;
    }

    fn tree_ref(&self) -> Result<&Arc<Tree>> {
        self.tree
            .as_ref()
            .ok_or_else(|| SchedulerError::NoTree(self.name.clone()))
    }

    fn tree_mut(&mut self) -> Result<&mut Tree> {
        match self.tree.as_mut() {
            Some(tree) => Ok(Arc::make_mut(tree)),
            None => Err(SchedulerError::NoTree(self.name.clone())),
        }
    }

    /// Counts all sites from scratch on a private copy of the tree.
    ///
    /// # Errors
    /// `NoTree` if no tree is bound.
    pub fn compute(&mut self) -> Result<OperationCount> {
        let sites = std::mem::take(&mut self.sites);
        let result = self.tree_mut().and_then(|tree| {
            tree.clear_cache();
            tree.count_operations(&sites)
        });
        self.sites = sites;
        let count = result?;
        self.costs = Some(count);
        Ok(count)
    }

    /// Returns the cached costs, computing them first if needed.
    pub fn ensure_computed(&mut self) -> Result<OperationCount> {
        match self.costs {
            Some(costs) => Ok(costs),
            None => self.compute(),
        }
    }

    /// Cost of this partition on its own, without touching any cache.
    pub fn fresh_cost(&self) -> Result<u64> {
        if let Some(costs) = self.costs {
            return Ok(costs.op_optimized);
        }
        if self.sites.is_empty() {
            return Ok(0);
        }
        Ok(self.tree_ref()?.simulate_fresh(&self.sites)?.op_optimized)
    }

    /// Operations that adding `sites` would cost, without mutating anything.
    pub fn simulate_add(&self, sites: &[usize]) -> Result<u64> {
        if sites.is_empty() {
            return Ok(0);
        }
        let tree = self.tree_ref()?;
        if self.costs.is_some() {
            return Ok(tree.simulate_operations(sites)?.op_optimized);
        }
        let mut combined = self.sites.clone();
        combined.extend_from_slice(sites);
        let with = tree.simulate_fresh(&combined)?.op_optimized;
        let without = tree.simulate_fresh(&self.sites)?.op_optimized;
        Ok(with - without)
    }

    /// Extends the partition by `sites` and returns the operations added.
    ///
    /// With `simulate` set nothing changes and the hypothetical cost is
    /// returned. Empty input is a no-op.
    pub fn incremental_add(&mut self, sites: &[usize], simulate: bool) -> Result<u64> {
        if sites.is_empty() {
            return Ok(0);
        }
        if simulate {
            return self.simulate_add(sites);
        }
        let mut costs = self.ensure_computed()?;
        let added = self.tree_mut()?.count_operations(sites)?;
        self.sites.extend_from_slice(sites);
        costs += added;
        self.costs = Some(costs);
        Ok(added.op_optimized)
    }

    /// Merges a same-named partition; see [`Partition::incremental_add`].
    pub fn merge(&mut self, other: Partition, simulate: bool) -> Result<u64> {
        debug_assert_eq!(self.name, other.name);
        if self.tree.is_none() {
            self.tree = other.tree.clone();
        }
        self.incremental_add(&other.sites, simulate)
    }

    /// Appends sites without counting them. Costs must be recomputed later.
    pub fn extend_dirty(&mut self, sites: &[usize]) {
        if sites.is_empty() {
            return;
        }
        self.sites.extend_from_slice(sites);
        self.costs = None;
    }

    fn recompute_if_computed(&mut self) -> Result<()> {
        if self.costs.is_some() {
            self.compute()?;
        }
        Ok(())
    }

    /// Removes the first `n` sites and returns them as a new partition of
    /// the same name sharing this tree.
    pub fn split_front(&mut self, n: usize, compute: bool) -> Result<Partition> {
        let n = n.min(self.sites.len());
        let front: Vec<usize> = self.sites.drain(..n).collect();
        self.recompute_if_computed()?;
        let mut piece = Partition {
            name: self.name.clone(),
            sites: front,
            tree: self.tree.clone(),
            costs: None,
        };
        if compute {
            piece.compute()?;
        }
        Ok(piece)
    }

    /// Removes `sites` from this partition.
    ///
    /// With `return_as_partition` the removed sites come back uncomputed
    /// (they are headed for another bin), in this partition's order.
    pub fn delete_specific_sites(
        &mut self,
        sites: &[usize],
        return_as_partition: bool,
    ) -> Result<Option<Partition>> {
        let doomed: HashSet<usize> = sites.iter().copied().collect();
        let (removed, kept): (Vec<usize>, Vec<usize>) =
            self.sites.iter().copied().partition(|s| doomed.contains(s));
        if removed.is_empty() {
            return Ok(return_as_partition.then(|| self.detached(Vec::new())));
        }
        self.sites = kept;
        self.recompute_if_computed()?;
        Ok(return_as_partition.then(|| self.detached(removed)))
    }

    /// Removes one uniformly chosen site and returns it as a single-site
    /// partition. `None` when the partition is empty.
    pub fn take_random_site<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Option<Partition>> {
        if self.sites.is_empty() {
            return Ok(None);
        }
        let idx = rng.gen_range(0..self.sites.len());
        let site = self.sites.remove(idx);
        self.recompute_if_computed()?;
        Ok(Some(self.detached(vec![site])))
    }

    /// Keeps only the first `n` sites.
    pub fn crop(&mut self, n: usize) -> Result<()> {
        if n >= self.sites.len() {
            return Ok(());
        }
        self.sites.truncate(n);
        self.recompute_if_computed()
    }

    fn detached(&self, sites: Vec<usize>) -> Partition {
        Partition {
            name: self.name.clone(),
            sites,
            tree: self.tree.clone(),
            costs: None,
        }
    }

    /// Dependency count of each of this partition's sites.
    pub fn site_dependencies(&self) -> Result<BTreeMap<usize, usize>> {
        let tree = self.tree_ref()?;
        if self.costs.is_some() {
            return tree.site_dependency_count();
        }
        let mut scratch = Tree::clone(tree);
        scratch.clear_cache();
        scratch.count_operations(&self.sites)?;
        scratch.site_dependency_count()
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} sites", self.name, self.sites.len())?;
        if let Some(costs) = self.costs {
            write!(f, ", {}/{} ops", costs.op_optimized, costs.op_maximum)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_compute_requires_tree() {
        let mut p = Partition::new("p", vec![0, 1]);
        assert!(matches!(p.compute(), Err(SchedulerError::NoTree(name)) if name == "p"));
        assert_eq!(p.op_optimized(), 0);
    }

    #[test]
    fn test_with_tree_computes() {
        let tree = fixtures::small_tree();
        let p = Partition::with_tree("p", vec![0, 1, 2], tree, true).unwrap();
        assert_eq!(p.op_maximum(), 6);
        assert_eq!(p.op_optimized(), 3);
        assert_eq!(p.to_string(), "p: 3 sites, 3/6 ops");
    }

    #[test]
    fn test_incremental_add_privatizes_tree() {
        let tree = fixtures::small_tree();
        let mut a = Partition::with_tree("a", vec![0], Arc::clone(&tree), true).unwrap();
        let b = Partition::with_tree("b", vec![2], Arc::clone(&tree), false).unwrap();

        let simulated = a.incremental_add(&[2, 3], true).unwrap();
        assert_eq!(a.len(), 1);
        let added = a.incremental_add(&[2, 3], false).unwrap();
        assert_eq!(simulated, added);
        assert_eq!(added, 3);
        assert_eq!(a.sites(), &[0, 2, 3]);
        assert_eq!(a.op_optimized(), 5);

        // The shared tree never saw those sites.
        assert_eq!(tree.counted_sites().count(), 0);
        assert_eq!(b.fresh_cost().unwrap(), 2);
    }

    #[test]
    fn test_simulate_add_uncomputed_uses_difference() {
        let tree = fixtures::small_tree();
        let p = Partition::with_tree("p", vec![0], tree, false).unwrap();
        assert_eq!(p.simulate_add(&[1]).unwrap(), 0);
        assert_eq!(p.simulate_add(&[2]).unwrap(), 1);
        assert!(!p.is_computed());
    }

    #[test]
    fn test_merge_same_name() {
        let tree = fixtures::small_tree();
        let mut a = Partition::with_tree("p", vec![0], Arc::clone(&tree), true).unwrap();
        let b = Partition::new("p", vec![1, 3]);
        let added = a.merge(b, false).unwrap();
        assert_eq!(added, 2);
        assert_eq!(a.sites(), &[0, 1, 3]);
    }

    #[test]
    fn test_split_front() {
        let tree = fixtures::small_tree();
        let mut p = Partition::with_tree("p", vec![0, 1, 2, 3], tree, true).unwrap();
        let front = p.split_front(2, true).unwrap();
        assert_eq!(front.sites(), &[0, 1]);
        assert_eq!(front.op_optimized(), 2);
        assert_eq!(p.sites(), &[2, 3]);
        assert_eq!(p.op_optimized(), 4);

        let rest = p.split_front(10, false).unwrap();
        assert_eq!(rest.len(), 2);
        assert!(p.is_empty());
        assert_eq!(p.op_optimized(), 0);
    }

    #[test]
    fn test_delete_specific_sites() {
        let tree = fixtures::small_tree();
        let mut p = Partition::with_tree("p", vec![0, 1, 2, 3], tree, true).unwrap();
        let removed = p.delete_specific_sites(&[3, 1], true).unwrap().unwrap();
        assert_eq!(removed.sites(), &[1, 3]);
        assert!(!removed.is_computed());
        assert!(removed.tree().is_some());
        assert_eq!(p.sites(), &[0, 2]);
        assert_eq!(p.op_optimized(), 3);

        assert!(p.delete_specific_sites(&[9], false).unwrap().is_none());
    }

    #[test]
    fn test_take_random_site() {
        let tree = fixtures::small_tree();
        let mut p = Partition::with_tree("p", vec![0, 1, 2], tree, true).unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        let mut seen = Vec::new();
        while let Some(single) = p.take_random_site(&mut rng).unwrap() {
            assert_eq!(single.len(), 1);
            seen.push(single.sites()[0]);
        }
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2]);
        assert!(p.is_empty());
    }

    #[test]
    fn test_empty_partition_is_noop() {
        let mut p = Partition::new("empty", Vec::new());
        assert_eq!(p.incremental_add(&[], false).unwrap(), 0);
        assert!(p.split_front(3, false).unwrap().is_empty());
        assert!(p.take_random_site(&mut StdRng::seed_from_u64(1)).unwrap().is_none());
        p.crop(0).unwrap();
        assert_eq!(p.fresh_cost().unwrap(), 0);
    }

    #[test]
    fn test_site_dependencies() {
        let tree = fixtures::small_tree();
        let p = Partition::with_tree("p", vec![0, 1, 3], tree, false).unwrap();
        let deps = p.site_dependencies().unwrap();
        assert_eq!(deps.keys().copied().collect::<Vec<_>>(), vec![0, 1, 3]);
        assert_eq!(deps[&0], 2);
        assert_eq!(deps[&3], 0);
    }
}
