//! Post-hoc passes over a finished schedule.
//!
//! Both passes move the sites of split partitions that share the least
//! work with the rest of their partition (lowest dependency count, see
//! [`Tree::site_dependency_count`](crate::tree::Tree::site_dependency_count)).

use crate::bins::BinCollection;
use crate::error::{Result, SchedulerError};
use crate::partitions::PartitionCollection;
use crate::schedule::SchedulerConfig;
use crate::strategy::{FillStrategy, GreedySimulate};
use clap::ValueEnum;
use std::str::FromStr;

/// Optional refinements applied after the base heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Optimization {
    /// Pool the cheapest-to-move sites of split partitions and refill them
    /// greedily against the current average.
    LowDependencyRedistribution,
    /// Move sites out of the heaviest bin into lighter bins holding the
    /// same partition.
    ReduceMax,
    /// Rerun the base heuristic with the achieved average as the bound.
    DoubleResolution,
}

impl FromStr for Optimization {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self> {
        <Self as ValueEnum>::from_str(s, true)
            .map_err(|_| SchedulerError::UnknownOptimization(s.to_string()))
    }
}

/// The `n` sites of partition `name` in bin `bin` with the lowest
/// dependency count, ties by site index.
fn lowest_dependency_sites(
    bins: &BinCollection,
    bin: usize,
    name: &str,
    n: usize,
) -> Result<Vec<usize>> {
    let Some(partition) = bins.bins()[bin].get(name) else {
        return Ok(Vec::new());
    };
    let mut ranked: Vec<(usize, usize)> = partition
        .site_dependencies()?
        .into_iter()
        .map(|(site, deps)| (deps, site))
        .collect();
    ranked.sort_unstable();
    Ok(ranked.into_iter().take(n).map(|(_, site)| site).collect())
}

/// Pulls `max(ceil(fraction * n), min(min_sites, n))` low-dependency sites
/// out of every piece of every split partition and refills them with
/// [`GreedySimulate`] under a bound of the current average bin size
/// (rounded up, taken before anything is pulled).
pub fn redistribute_low_dependency(
    bins: &mut BinCollection,
    config: &SchedulerConfig,
) -> Result<()> {
    let split = bins.split_partition_names();
    if split.is_empty() {
        return Ok(());
    }
    let average = bins.average_size().ceil() as u64;

    let mut pool = PartitionCollection::new();
    for name in &split {
        for idx in bins.bins_with_partition(name) {
            let held = bins.bins()[idx].get(name).map_or(0, |p| p.len());
            let share = (held as f64 * config.redistribution_fraction).ceil() as usize;
            let take = share.max(config.redistribution_min_sites.min(held)).min(held);
            let sites = lowest_dependency_sites(bins, idx, name, take)?;
            if let Some(moved) = bins.bins_mut()[idx].remove_sites(name, &sites)? {
                pool.add(moved, true)?;
            }
        }
    }
    bins.compact();
    tracing::debug!(
        partitions = split.len(),
        sites = pool.total_sites(),
        bound = average,
        "redistributing low-dependency sites"
    );

    bins.override_lower_bound(average);
    let result = GreedySimulate.fill(bins, pool);
    bins.restore_lower_bound();
    result
}

/// Repeatedly relieves the heaviest bin. For every split partition it
/// holds, each lighter-than-average bin holding the same partition gets
/// `floor((average - size) / worst_case_per_site)` of its lowest-dependency
/// sites. Stops when a pass moves nothing, makes the maximum worse, or
/// `reduce_max_passes` is reached.
pub fn reduce_max(bins: &mut BinCollection, config: &SchedulerConfig) -> Result<()> {
    let worst = bins.worst_case_per_site().max(1) as f64;

    for pass in 0..config.reduce_max_passes {
        let before = bins.clone();
        let average = bins.average_size();
        let heaviest = bins.largest_bin();
        let split = bins.split_partition_names();
        let names: Vec<String> = bins.bins()[heaviest]
            .partition_names()
            .filter(|name| split.iter().any(|s| s.as_str() == *name))
            .map(str::to_string)
            .collect();

        let mut moved_sites = 0;
        for name in &names {
            for target in bins.bins_with_partition(name) {
                let size = bins.bins()[target].size() as f64;
                if target == heaviest || size >= average {
                    continue;
                }
                let n = ((average - size) / worst).floor() as usize;
                if n == 0 {
                    continue;
                }
                let sites = lowest_dependency_sites(bins, heaviest, name, n)?;
                if let Some(moved) = bins.bins_mut()[heaviest].remove_sites(name, &sites)? {
                    moved_sites += moved.len();
                    bins.bins_mut()[target].add(moved)?;
                }
            }
        }
        bins.compact();

        if moved_sites == 0 {
            break;
        }
        if bins.max_size() > before.max_size() {
            tracing::debug!(pass, "reduce-max made the maximum worse, reverting");
            *bins = before;
            break;
        }
        tracing::debug!(pass, moved_sites, max = bins.max_size(), "reduce-max pass");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::partition::Partition;
    use std::sync::Arc;

    #[test]
    fn test_parse_optimization() {
        assert_eq!(
            "reduce-max".parse::<Optimization>().unwrap(),
            Optimization::ReduceMax
        );
        assert!(matches!(
            "faster".parse::<Optimization>(),
            Err(SchedulerError::UnknownOptimization(_))
        ));
    }

    /// Bin 0 holds 6 sites of `p`, bin 1 holds 1 site of `p` and 1 of `q`.
    fn unbalanced() -> BinCollection {
        let tree = fixtures::distinct_tree(8);
        let mut parts = fixtures::collection(&tree, &[("p", 7), ("q", 1)]);
        let mut bins = BinCollection::new(2).unwrap();
        bins.set_lower_bound(&mut parts).unwrap();
        let part = |name: &str, sites: Vec<usize>| {
            Partition::with_tree(name, sites, Arc::clone(&tree), false).unwrap()
        };
        bins.bins_mut()[0].add(part("p", (0..6).collect())).unwrap();
        bins.bins_mut()[1].add(part("p", vec![6])).unwrap();
        bins.bins_mut()[1].add(part("q", vec![7])).unwrap();
        bins
    }

    #[test]
    fn test_reduce_max_moves_sites_to_lighter_bin() {
        let mut bins = unbalanced();
        assert_eq!(bins.max_size(), 18);

        reduce_max(&mut bins, &SchedulerConfig::default()).unwrap();
        assert_eq!(bins.total_sites(), 8);
        assert_eq!(bins.max_size(), 12);
        assert_eq!(bins.bins()[0].size(), 12);
        assert_eq!(bins.bins()[1].size(), 12);
    }

    #[test]
    fn test_redistribution_keeps_every_site() {
        let mut bins = unbalanced();
        let bound = bins.lower_bound();

        redistribute_low_dependency(&mut bins, &SchedulerConfig::default()).unwrap();
        assert_eq!(bins.total_sites(), 8);
        assert_eq!(bins.lower_bound(), bound);
        assert!(bins.max_size() <= 18);
    }
}
