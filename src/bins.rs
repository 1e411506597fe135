//! Bins (one per worker) and the fixed-size collection the heuristics fill.

use crate::error::{Result, SchedulerError};
use crate::partition::Partition;
use crate::partitions::PartitionCollection;
use crate::report::PartitionRecord;
use std::fmt;

/// One worker's workload.
///
/// `size` is the sum of the member partitions' optimized costs.
#[derive(Debug, Clone, Default)]
pub struct Bin {
    partitions: Vec<Partition>,
    size: u64,
}

impl Bin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn total_sites(&self) -> usize {
        self.partitions.iter().map(|p| p.len()).sum()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&Partition> {
        self.partitions.iter().find(|p| p.name() == name)
    }

    pub fn partition_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.partitions.iter().map(|p| p.name())
    }

    /// Adds `partition`, merging it into a same-named member. Returns the
    /// operations the bin grew by.
    pub fn add(&mut self, mut partition: Partition) -> Result<u64> {
        let added = match self.partitions.iter_mut().find(|p| p.name() == partition.name()) {
            Some(existing) => existing.merge(partition, false)?,
            None => {
                let cost = partition.ensure_computed()?.op_optimized;
                self.partitions.push(partition);
                cost
            }
        };
        self.size += added;
        Ok(added)
    }

    pub fn add_all(&mut self, partitions: impl IntoIterator<Item = Partition>) -> Result<u64> {
        let mut added = 0;
        for partition in partitions {
            added += self.add(partition)?;
        }
        Ok(added)
    }

    /// Operations adding `partition` would cost, without changing anything.
    pub fn simulate_add(&self, partition: &Partition) -> Result<u64> {
        match self.get(partition.name()) {
            Some(existing) => existing.simulate_add(partition.sites()),
            None => partition.fresh_cost(),
        }
    }

    /// Removes `sites` from the member `name` and returns them as an
    /// uncomputed partition. `None` if the bin does not hold `name`.
    pub fn remove_sites(&mut self, name: &str, sites: &[usize]) -> Result<Option<Partition>> {
        let Some(existing) = self.partitions.iter_mut().find(|p| p.name() == name) else {
            return Ok(None);
        };
        let removed = existing.delete_specific_sites(sites, true)?;
        self.update_size()?;
        Ok(removed)
    }

    /// Recomputes `size` from the members, computing any stale one.
    pub fn update_size(&mut self) -> Result<u64> {
        let mut size = 0;
        for partition in &mut self.partitions {
            size += partition.ensure_computed()?.op_optimized;
        }
        self.size = size;
        Ok(size)
    }

    /// Drops members that lost all their sites.
    pub fn compact(&mut self) {
        self.partitions.retain(|p| !p.is_empty());
    }
}

impl fmt::Display for Bin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[size: {}, partitions: {}, sites: {}]",
            self.size,
            self.partitions.len(),
            self.total_sites()
        )
    }
}

/// Ideal per-bin share of the work.
///
/// `operations * bins - operations_adjustment == total operations`, and
/// the same for sites: `adjustment` bins are capped one unit lower.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LowerBound {
    pub operations: u64,
    pub operations_adjustment: u64,
    pub sites: usize,
    pub sites_adjustment: usize,
}

impl LowerBound {
    pub fn new(total_operations: u64, total_sites: usize, bins: usize) -> Result<Self> {
        if bins == 0 {
            return Err(SchedulerError::InvalidBinCount(bins));
        }
        let operations = total_operations.div_ceil(bins as u64);
        let sites = total_sites.div_ceil(bins);
        Ok(LowerBound {
            operations,
            operations_adjustment: operations * bins as u64 - total_operations,
            sites,
            sites_adjustment: sites * bins - total_sites,
        })
    }
}

/// The scheduler's fixed array of bins plus the bound of the current run.
#[derive(Debug, Clone)]
pub struct BinCollection {
    bins: Vec<Bin>,
    lower_bound: LowerBound,
    saved_bound: Option<LowerBound>,
    worst_case_per_site: u64,
}

impl BinCollection {
    /// # Errors
    /// `InvalidBinCount` when `n` is 0.
    pub fn new(n: usize) -> Result<Self> {
        if n == 0 {
            return Err(SchedulerError::InvalidBinCount(n));
        }
        Ok(BinCollection {
            bins: vec![Bin::new(); n],
            lower_bound: LowerBound::default(),
            saved_bound: None,
            worst_case_per_site: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn bins(&self) -> &[Bin] {
        &self.bins
    }

    pub fn bins_mut(&mut self) -> &mut [Bin] {
        &mut self.bins
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bin> {
        self.bins.iter()
    }

    pub fn lower_bound(&self) -> LowerBound {
        self.lower_bound
    }

    pub fn set_lower_bound_to(&mut self, bound: LowerBound) {
        self.lower_bound = bound;
    }

    /// Operations a single site can cost at most: one per internal node.
    pub fn worst_case_per_site(&self) -> u64 {
        self.worst_case_per_site
    }

    /// Derives the bound (and the worst case per site) from the
    /// partitions about to be distributed. Computes missing costs.
    pub fn set_lower_bound(&mut self, partitions: &mut PartitionCollection) -> Result<LowerBound> {
        partitions.ensure_computed()?;
        self.lower_bound = LowerBound::new(
            partitions.total_optimized_cost(),
            partitions.total_sites(),
            self.bins.len(),
        )?;
        self.worst_case_per_site = partitions
            .iter()
            .filter_map(|p| p.tree())
            .map(|t| t.internal_node_count() as u64)
            .max()
            .unwrap_or(0);
        tracing::debug!(
            lower_bound = ?self.lower_bound,
            worst_case = self.worst_case_per_site,
            "lower bound set"
        );
        Ok(self.lower_bound)
    }

    /// Temporarily replaces the operations bound (adjustment 0) until
    /// [`BinCollection::restore_lower_bound`].
    pub fn override_lower_bound(&mut self, operations: u64) {
        if self.saved_bound.is_none() {
            self.saved_bound = Some(self.lower_bound);
        }
        self.lower_bound.operations = operations;
        self.lower_bound.operations_adjustment = 0;
    }

    pub fn restore_lower_bound(&mut self) {
        if let Some(bound) = self.saved_bound.take() {
            self.lower_bound = bound;
        }
    }

    pub fn total_size(&self) -> u64 {
        self.bins.iter().map(|b| b.size()).sum()
    }

    pub fn total_sites(&self) -> usize {
        self.bins.iter().map(|b| b.total_sites()).sum()
    }

    pub fn max_size(&self) -> u64 {
        self.bins.iter().map(|b| b.size()).max().unwrap_or(0)
    }

    pub fn average_size(&self) -> f64 {
        self.total_size() as f64 / self.bins.len() as f64
    }

    /// Index of the first bin with the smallest size.
    pub fn smallest_bin(&self) -> usize {
        let mut best = 0;
        for (i, bin) in self.bins.iter().enumerate() {
            if bin.size() < self.bins[best].size() {
                best = i;
            }
        }
        best
    }

    /// Index of the first bin with the largest size.
    pub fn largest_bin(&self) -> usize {
        let mut best = 0;
        for (i, bin) in self.bins.iter().enumerate() {
            if bin.size() > self.bins[best].size() {
                best = i;
            }
        }
        best
    }

    /// Stable sort, smallest bin first.
    pub fn sort_by_size(&mut self) {
        self.bins.sort_by_key(|b| b.size());
    }

    /// Remaining room below the operations bound, per bin.
    pub fn free_spaces(&self) -> Vec<u64> {
        self.bins
            .iter()
            .map(|b| self.lower_bound.operations.saturating_sub(b.size()))
            .collect()
    }

    pub fn total_free_space(&self) -> u64 {
        self.free_spaces().iter().sum()
    }

    /// Names of partitions held by two or more bins, first-seen order.
    pub fn split_partition_names(&self) -> Vec<String> {
        let mut seen: Vec<(&str, usize)> = Vec::new();
        for name in self.bins.iter().flat_map(|b| b.partition_names()) {
            match seen.iter_mut().find(|(n, _)| *n == name) {
                Some((_, count)) => *count += 1,
                None => seen.push((name, 1)),
            }
        }
        seen.into_iter()
            .filter(|&(_, count)| count > 1)
            .map(|(name, _)| name.to_string())
            .collect()
    }

    pub fn bins_with_partition(&self, name: &str) -> Vec<usize> {
        self.bins
            .iter()
            .enumerate()
            .filter(|(_, b)| b.contains(name))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn update_sizes(&mut self) -> Result<()> {
        for bin in &mut self.bins {
            bin.update_size()?;
        }
        Ok(())
    }

    pub fn compact(&mut self) {
        self.bins.iter_mut().for_each(Bin::compact);
    }

    /// Errors unless the bins hold exactly `expected` sites.
    pub fn verify_site_count(&self, expected: usize) -> Result<()> {
        let actual = self.total_sites();
        if actual != expected {
            return Err(SchedulerError::SiteCountMismatch { expected, actual });
        }
        Ok(())
    }

    /// One line per bin, for logs.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{} bins, lower bound {}, max {}, avg {:.2}",
            self.bins.len(),
            self.lower_bound.operations,
            self.max_size(),
            self.average_size()
        );
        for (i, bin) in self.bins.iter().enumerate() {
            out.push_str(&format!("\n  bin{i}: {bin}"));
        }
        out
    }

    /// Flat records, one per partition per bin.
    pub fn records(&self, description: &str) -> Vec<PartitionRecord> {
        self.bins
            .iter()
            .enumerate()
            .flat_map(|(i, bin)| {
                bin.partitions().iter().map(move |p| {
                    PartitionRecord::new(description, Some(i), self.lower_bound.operations, p)
                })
            })
            .collect()
    }
}
