//! Python binding layer for operation counting and scheduling.
//!
//! Inputs are file paths (PHYLIP alignment, partition file, Newick tree);
//! results come back as plain tuples and lists.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use rayon::prelude::*;
use std::sync::Arc;

use crate::alignment::Alignment;
use crate::enumerate::ground_truth;
use crate::error::SchedulerError;
use crate::io::{read_newick_tree, read_partitions, read_phylip};
use crate::optimize::Optimization;
use crate::partitions::PartitionCollection;
use crate::schedule::{SchedulerConfig, schedule};
use crate::strategy::Heuristic;
use crate::tree::Tree;

fn to_py(err: SchedulerError) -> PyErr {
    PyValueError::new_err(err.to_string())
}

fn load(alignment: &str, partitions: &str) -> PyResult<(Alignment, PartitionCollection)> {
    let aln = read_phylip(alignment).map_err(to_py)?;
    let parts = read_partitions(partitions, aln.num_sites()).map_err(to_py)?;
    Ok((aln, parts))
}

fn load_tree(path: &str, alignment: &Alignment, midpoint: bool) -> PyResult<Tree> {
    let mut tree = read_newick_tree(path).map_err(to_py)?;
    tree.attach_sequences(alignment).map_err(to_py)?;
    if midpoint {
        tree.midpoint_root().map_err(to_py)?;
    }
    Ok(tree)
}

/// Count likelihood operations per partition for several trees.
///
/// Args:
///     trees: List of Newick tree files
///     alignment: PHYLIP alignment file
///     partitions: Partition file (`DNA, name = start-end`)
///     midpoint: Midpoint root every tree first (default: True)
///
/// Returns:
///     A list of (tree, partition, op_maximum, op_optimized) tuples
///
/// Raises:
///     ValueError: If an input cannot be read or does not match the alignment
#[pyfunction]
#[pyo3(signature = (trees, alignment, partitions, midpoint=true))]
fn count_operations(
    trees: Vec<String>,
    alignment: &str,
    partitions: &str,
    midpoint: bool,
) -> PyResult<Vec<(String, String, u64, u64)>> {
    let (aln, parts) = load(alignment, partitions)?;
    let per_tree: Vec<PyResult<Vec<(String, String, u64, u64)>>> = trees
        .par_iter()
        .map(|path| {
            let tree = load_tree(path, &aln, midpoint)?;
            parts
                .iter()
                .map(|p| -> PyResult<(String, String, u64, u64)> {
                    let counts = tree.simulate_fresh(p.sites()).map_err(to_py)?;
                    Ok((
                        path.clone(),
                        p.name().to_string(),
                        counts.op_maximum,
                        counts.op_optimized,
                    ))
                })
                .collect()
        })
        .collect();

    let mut rows = Vec::new();
    for result in per_tree {
        rows.extend(result?);
    }
    Ok(rows)
}

/// Schedule partitions over bins.
///
/// Args:
///     tree: Newick tree file (midpoint rooted before use)
///     alignment: PHYLIP alignment file
///     partitions: Partition file
///     bins: Number of bins
///     heuristic: greedy-simulate | smallest-bin-first | max-spread |
///         proportional-slice | cut-fill | reference (default: greedy-simulate)
///     optimizations: Refinements applied in order (default: none)
///     seed: Seed for random candidate order (default: None)
///
/// Returns:
///     A list with one list of (partition, sites) per bin, and the bin sizes
#[pyfunction]
#[pyo3(signature = (tree, alignment, partitions, bins, heuristic="greedy-simulate", optimizations=Vec::new(), seed=None))]
fn schedule_sites(
    tree: &str,
    alignment: &str,
    partitions: &str,
    bins: usize,
    heuristic: &str,
    optimizations: Vec<String>,
    seed: Option<u64>,
) -> PyResult<(Vec<Vec<(String, Vec<usize>)>>, Vec<u64>)> {
    let (aln, mut parts) = load(alignment, partitions)?;
    let tree = load_tree(tree, &aln, true)?;
    parts.bind_tree(&Arc::new(tree), true).map_err(to_py)?;

    let heuristic: Heuristic = heuristic.parse().map_err(to_py)?;
    let optimizations = optimizations
        .iter()
        .map(|o| o.parse::<Optimization>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(to_py)?;
    let config = SchedulerConfig::new(bins, heuristic)
        .with_optimizations(optimizations)
        .with_seed(seed);

    let result = schedule(&parts, &config).map_err(to_py)?;
    let layout = result
        .bins
        .iter()
        .map(|bin| {
            bin.partitions()
                .iter()
                .map(|p| (p.name().to_string(), p.sites().to_vec()))
                .collect()
        })
        .collect();
    let sizes = result.bins.iter().map(|b| b.size()).collect();
    Ok((layout, sizes))
}

/// Smallest achievable maximum bin cost, by brute force.
///
/// Args:
///     tree, alignment, partitions: As for `schedule_sites`
///     bins: Number of bins
///     crop_partitions: Keep only the first N partitions (default: 3)
///     crop_sites: Keep only the first N sites of each (default: 6)
///     limit: Refuse above this many distributions (default: 1_000_000)
///
/// Returns:
///     (max_cost, distributions_evaluated)
#[pyfunction]
#[pyo3(signature = (tree, alignment, partitions, bins, crop_partitions=3, crop_sites=6, limit=1_000_000))]
fn optimum(
    tree: &str,
    alignment: &str,
    partitions: &str,
    bins: usize,
    crop_partitions: usize,
    crop_sites: usize,
    limit: u128,
) -> PyResult<(u64, u128)> {
    let (aln, mut parts) = load(alignment, partitions)?;
    let tree = load_tree(tree, &aln, true)?;
    parts.crop(crop_partitions, crop_sites).map_err(to_py)?;
    parts.bind_tree(&Arc::new(tree), true).map_err(to_py)?;
    let truth = ground_truth(&parts, bins, limit).map_err(to_py)?;
    Ok((truth.max_cost, truth.evaluated))
}

#[pymodule]
fn subtree_scheduler(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(count_operations, m)?)?;
    m.add_function(wrap_pyfunction!(schedule_sites, m)?)?;
    m.add_function(wrap_pyfunction!(optimum, m)?)?;
    Ok(())
}
