//! Brute-force ground truth for tiny inputs.
//!
//! Every way of splitting the flattened `(site, owner)` list into exactly
//! `bins` non-empty, positional groups is generated lazily and costed. The
//! number of distributions is `k! * S(n, k)`, so [`ground_truth`] refuses
//! to start above a caller-supplied limit.

use crate::error::{Result, SchedulerError};
use crate::partitions::PartitionCollection;
use crate::tree::Tree;
use itertools::Itertools;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::iter;
use std::sync::Arc;

type DistributionIter<T> = Box<dyn Iterator<Item = Vec<Vec<T>>> + Send>;

/// Lazy, restartable sequence of all distributions of `items` over `bins`.
#[derive(Debug, Clone)]
pub struct Distributions<T> {
    items: Vec<T>,
    bins: usize,
}

impl<T> Distributions<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(items: Vec<T>, bins: usize) -> Self {
        Distributions { items, bins }
    }

    /// A fresh pass over every distribution.
    pub fn iter(&self) -> DistributionIter<T> {
        distribute(self.items.clone(), self.bins)
    }

    pub fn expected_count(&self) -> u128 {
        expected_distribution_count(self.items.len(), self.bins)
    }
}

/// With `k` bins left and `m` items, the next group takes `m` items when
/// it is the last bin, otherwise between 1 and `m - (k - 1)`.
fn distribute<T>(items: Vec<T>, bins_left: usize) -> DistributionIter<T>
where
    T: Clone + Send + Sync + 'static,
{
    if items.is_empty() {
        return Box::new(iter::once(Vec::new()));
    }
    if bins_left == 0 {
        return Box::new(iter::empty());
    }
    let m = items.len();
    let min = if bins_left == 1 { m } else { 1 };
    let max = m.saturating_sub(bins_left - 1);
    let items = Arc::new(items);

    Box::new((min..=max).flat_map(move |size| {
        let items = Arc::clone(&items);
        (0..m).combinations(size).flat_map(move |chosen| {
            let group: Vec<T> = chosen.iter().map(|&i| items[i].clone()).collect();
            let rest: Vec<T> = (0..m)
                .filter(|i| !chosen.contains(i))
                .map(|i| items[i].clone())
                .collect();
            distribute(rest, bins_left - 1).map(move |mut tail| {
                tail.insert(0, group.clone());
                tail
            })
        })
    }))
}

/// Number of ways to put `n` labelled items into `k` ordered non-empty
/// groups, `k! * S(n, k)`. Saturates at `u128::MAX`. Zero items have
/// exactly one (empty) distribution.
pub fn expected_distribution_count(n: usize, k: usize) -> u128 {
    if n == 0 {
        return 1;
    }
    // surj[j] = surjections from the current item count onto j groups.
    let mut surj = vec![0u128; k + 1];
    surj[0] = 1;
    for _ in 0..n {
        for j in (1..=k).rev() {
            surj[j] = (j as u128).saturating_mul(surj[j - 1].saturating_add(surj[j]));
        }
        surj[0] = 0;
    }
    surj[k]
}

/// Best distribution found by [`ground_truth`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundTruth {
    /// Smallest achievable maximum bin cost.
    pub max_cost: u64,
    /// One group of `(site, owner)` per bin. The earliest generated
    /// distribution wins ties.
    pub distribution: Vec<Vec<(usize, String)>>,
    pub evaluated: u128,
}

impl GroundTruth {
    pub fn bins(&self) -> usize {
        self.distribution.len()
    }
}

/// Cost of one distribution: the heaviest group, where a group costs the
/// sum of its owners' fresh counts.
fn distribution_cost(
    trees: &HashMap<&str, &Arc<Tree>>,
    distribution: &[Vec<(usize, String)>],
) -> Result<u64> {
    let mut worst = 0;
    for group in distribution {
        let mut by_owner: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (site, owner) in group {
            by_owner.entry(owner.as_str()).or_default().push(*site);
        }
        let mut cost = 0;
        for (owner, sites) in by_owner {
            let tree = trees
                .get(owner)
                .ok_or_else(|| SchedulerError::NoTree(owner.to_string()))?;
            cost += tree.simulate_fresh(&sites)?.op_optimized;
        }
        worst = worst.max(cost);
    }
    Ok(worst)
}

/// Evaluates every distribution of the collection's sites over `bins`
/// (in parallel) and returns one with the smallest maximum bin cost.
///
/// Every partition needs a bound tree. Fails with
/// `TooManyDistributions` when `k! * S(n, k)` exceeds `limit`.
pub fn ground_truth(partitions: &PartitionCollection, bins: usize, limit: u128) -> Result<GroundTruth> {
    if bins == 0 {
        return Err(SchedulerError::InvalidBinCount(0));
    }
    let items = partitions.sites_with_owner();
    let count = expected_distribution_count(items.len(), bins);
    if count > limit {
        return Err(SchedulerError::TooManyDistributions { count, limit });
    }
    let trees: HashMap<&str, &Arc<Tree>> = partitions
        .iter()
        .map(|p| {
            p.tree()
                .map(|t| (p.name(), t))
                .ok_or_else(|| SchedulerError::NoTree(p.name().to_string()))
        })
        .collect::<Result<_>>()?;
    tracing::info!(sites = items.len(), bins, distributions = count, "enumerating distributions");

    let best = Distributions::new(items, bins)
        .iter()
        .enumerate()
        .par_bridge()
        .map(|(idx, distribution)| {
            distribution_cost(&trees, &distribution).map(|cost| (cost, idx, distribution))
        })
        .try_reduce_with(|a, b| Ok(if (b.0, b.1) < (a.0, a.1) { b } else { a }));

    match best {
        Some(found) => {
            let (max_cost, _, distribution) = found?;
            tracing::debug!(max_cost, "ground truth found");
            Ok(GroundTruth {
                max_cost,
                distribution,
                evaluated: count,
            })
        }
        None => Err(SchedulerError::Infeasible {
            strategy: "ground-truth".to_string(),
            detail: format!("no distribution of {} sites over {bins} bins", partitions.total_sites()),
        }),
    }
}
