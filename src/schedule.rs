//! Scheduling runs: configuration, phase sequencing and the optional
//! refinement passes.

use crate::bins::BinCollection;
use crate::error::{Result, SchedulerError};
use crate::optimize::{self, Optimization};
use crate::partitions::PartitionCollection;
use crate::strategy::{Heuristic, SliceRounding};

/// Everything a scheduling run can be tuned with.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub bins: usize,
    pub heuristic: Heuristic,
    /// Applied in order after the base heuristic.
    pub optimizations: Vec<Optimization>,
    pub slice_rounding: SliceRounding,
    /// Share of each split piece pulled out by low-dependency redistribution.
    pub redistribution_fraction: f64,
    /// Lower limit on the sites pulled per piece.
    pub redistribution_min_sites: usize,
    pub reduce_max_passes: usize,
    /// Seeds random candidate order; front-to-back when `None`.
    pub seed: Option<u64>,
    /// Largest number of distributions brute force may evaluate.
    pub distribution_limit: u128,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            bins: 2,
            heuristic: Heuristic::GreedySimulate,
            optimizations: Vec::new(),
            slice_rounding: SliceRounding::Ceil,
            redistribution_fraction: 0.2,
            redistribution_min_sites: 10,
            reduce_max_passes: 25,
            seed: None,
            distribution_limit: 1_000_000,
        }
    }
}

impl SchedulerConfig {
    pub fn new(bins: usize, heuristic: Heuristic) -> Self {
        SchedulerConfig {
            bins,
            heuristic,
            ..Default::default()
        }
    }

    pub fn with_optimizations(mut self, optimizations: Vec<Optimization>) -> Self {
        self.optimizations = optimizations;
        self
    }

    pub fn with_slice_rounding(mut self, rounding: SliceRounding) -> Self {
        self.slice_rounding = rounding;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_distribution_limit(mut self, limit: u128) -> Self {
        self.distribution_limit = limit;
        self
    }

    pub fn with_redistribution(mut self, fraction: f64, min_sites: usize) -> Self {
        self.redistribution_fraction = fraction;
        self.redistribution_min_sites = min_sites;
        self
    }

    pub fn with_reduce_max_passes(mut self, passes: usize) -> Self {
        self.reduce_max_passes = passes;
        self
    }
}

/// Outcome of [`schedule`].
#[derive(Debug, Clone)]
pub struct Schedule {
    pub bins: BinCollection,
    /// Heaviest bin of the base heuristic, before any refinement.
    pub baseline_max: u64,
    /// Refinements that ran and were kept.
    pub applied: Vec<Optimization>,
}

/// One pass of the base heuristic over a copy of `partitions`.
///
/// `bound_override` replaces the operations bound (with no rounding
/// adjustment) after it has been derived.
pub fn run_heuristic(
    partitions: &PartitionCollection,
    config: &SchedulerConfig,
    bound_override: Option<u64>,
) -> Result<BinCollection> {
    let mut bins = BinCollection::new(config.bins)?;
    let mut pool = partitions.clone();
    pool.compact();
    let expected = pool.total_sites();

    bins.set_lower_bound(&mut pool)?;
    if let Some(operations) = bound_override {
        bins.override_lower_bound(operations);
    }

    let strategy = config.heuristic.strategy(config);
    let remaining = strategy.initial(&mut bins, pool)?;
    tracing::debug!(
        strategy = strategy.name(),
        remaining_partitions = remaining.len(),
        remaining_sites = remaining.total_sites(),
        "initial phase done"
    );
    strategy.fill(&mut bins, remaining)?;
    bins.compact();
    bins.verify_site_count(expected)?;
    Ok(bins)
}

fn apply(
    optimization: Optimization,
    bins: &BinCollection,
    partitions: &PartitionCollection,
    config: &SchedulerConfig,
) -> Result<BinCollection> {
    match optimization {
        Optimization::LowDependencyRedistribution => {
            let mut candidate = bins.clone();
            optimize::redistribute_low_dependency(&mut candidate, config)?;
            Ok(candidate)
        }
        Optimization::ReduceMax => {
            let mut candidate = bins.clone();
            optimize::reduce_max(&mut candidate, config)?;
            Ok(candidate)
        }
        Optimization::DoubleResolution => {
            let achieved = bins.average_size().ceil() as u64;
            run_heuristic(partitions, config, Some(achieved))
        }
    }
}

/// Runs the configured heuristic, then each refinement in order.
///
/// A refinement is kept only if it succeeds, keeps every site and does
/// not raise the maximum bin size. A failing refinement is logged and
/// skipped; the schedule so far stays valid.
pub fn schedule(partitions: &PartitionCollection, config: &SchedulerConfig) -> Result<Schedule> {
    if config.bins == 0 {
        return Err(SchedulerError::InvalidBinCount(0));
    }
    let mut bins = run_heuristic(partitions, config, None)?;
    let baseline_max = bins.max_size();
    let expected = bins.total_sites();
    tracing::info!(
        heuristic = ?config.heuristic,
        max = baseline_max,
        average = bins.average_size(),
        bound = bins.lower_bound().operations,
        "base schedule"
    );

    let mut applied = Vec::new();
    for &optimization in &config.optimizations {
        let outcome = apply(optimization, &bins, partitions, config)
            .and_then(|candidate| candidate.verify_site_count(expected).map(|_| candidate));
        match outcome {
            Ok(candidate) if candidate.max_size() <= bins.max_size() => {
                tracing::info!(
                    ?optimization,
                    max = candidate.max_size(),
                    "optimization kept"
                );
                bins = candidate;
                applied.push(optimization);
            }
            Ok(candidate) => {
                tracing::info!(
                    ?optimization,
                    max = candidate.max_size(),
                    kept = bins.max_size(),
                    "optimization discarded"
                );
            }
            Err(err) => {
                tracing::warn!(?optimization, %err, "optimization failed, keeping previous schedule");
            }
        }
    }

    Ok(Schedule {
        bins,
        baseline_max,
        applied,
    })
}
