//! Flat tabular records for CSV export.

use crate::enumerate::GroundTruth;
use crate::partition::Partition;

/// A row with a fixed column layout.
pub trait Record {
    fn header() -> &'static [&'static str];
    fn fields(&self) -> Vec<String>;
}

/// One partition (or piece of one) inside a schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionRecord {
    pub description: String,
    pub bin: Option<usize>,
    pub lower_bound: u64,
    pub sites: usize,
    pub partition: String,
    pub op_optimized: u64,
    pub op_maximum: u64,
}

impl PartitionRecord {
    pub fn new(description: &str, bin: Option<usize>, lower_bound: u64, partition: &Partition) -> Self {
        PartitionRecord {
            description: description.to_string(),
            bin,
            lower_bound,
            sites: partition.len(),
            partition: partition.name().to_string(),
            op_optimized: partition.op_optimized(),
            op_maximum: partition.op_maximum(),
        }
    }
}

impl Record for PartitionRecord {
    fn header() -> &'static [&'static str] {
        &[
            "description",
            "bin",
            "lower_bound",
            "sites",
            "partition",
            "op_optimized",
            "op_maximum",
        ]
    }

    fn fields(&self) -> Vec<String> {
        vec![
            self.description.clone(),
            self.bin.map(|b| b.to_string()).unwrap_or_default(),
            self.lower_bound.to_string(),
            self.sites.to_string(),
            self.partition.clone(),
            self.op_optimized.to_string(),
            self.op_maximum.to_string(),
        ]
    }
}

/// Operation counts of one partition on one rooting of one tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeCostRecord {
    pub tree: String,
    pub root_node: usize,
    pub height: usize,
    pub partition: String,
    pub op_maximum: u64,
    pub op_optimized: u64,
    /// Sites in the first piece when the partition was costed split in
    /// two, 0 when costed whole.
    pub split_at: usize,
}

impl TreeCostRecord {
    /// `op_optimized` as a percentage of `op_maximum`.
    pub fn op_ratio(&self) -> f64 {
        if self.op_maximum == 0 {
            return 0.0;
        }
        self.op_optimized as f64 / self.op_maximum as f64 * 100.0
    }
}

impl Record for TreeCostRecord {
    fn header() -> &'static [&'static str] {
        &[
            "tree",
            "root_node",
            "height",
            "partition",
            "op_maximum",
            "op_optimized",
            "op_ratio",
            "split_at",
        ]
    }

    fn fields(&self) -> Vec<String> {
        vec![
            self.tree.clone(),
            self.root_node.to_string(),
            self.height.to_string(),
            self.partition.clone(),
            self.op_maximum.to_string(),
            self.op_optimized.to_string(),
            format!("{:.4}", self.op_ratio()),
            self.split_at.to_string(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SiteDependencyRecord {
    pub tree: String,
    pub partition: String,
    pub site: usize,
    pub count: usize,
}

impl Record for SiteDependencyRecord {
    fn header() -> &'static [&'static str] {
        &["tree", "partition", "site", "count"]
    }

    fn fields(&self) -> Vec<String> {
        vec![
            self.tree.clone(),
            self.partition.clone(),
            self.site.to_string(),
            self.count.to_string(),
        ]
    }
}

/// Maximum bin cost reached by one method on a cropped input.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundTruthRecord {
    pub method: String,
    pub bins: usize,
    pub sites: usize,
    pub max_cost: u64,
    /// Distributions evaluated; 0 for heuristics.
    pub evaluated: u128,
}

impl GroundTruthRecord {
    pub fn optimum(truth: &GroundTruth, sites: usize) -> Self {
        GroundTruthRecord {
            method: "ground-truth".to_string(),
            bins: truth.bins(),
            sites,
            max_cost: truth.max_cost,
            evaluated: truth.evaluated,
        }
    }
}

impl Record for GroundTruthRecord {
    fn header() -> &'static [&'static str] {
        &["method", "bins", "sites", "max_cost", "evaluated"]
    }

    fn fields(&self) -> Vec<String> {
        vec![
            self.method.clone(),
            self.bins.to_string(),
            self.sites.to_string(),
            self.max_cost.to_string(),
            self.evaluated.to_string(),
        ]
    }
}

/// Where one site of the ground-truth distribution ended up.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteAssignmentRecord {
    pub site: usize,
    pub bin: usize,
    pub partition: String,
}

impl SiteAssignmentRecord {
    pub fn from_ground_truth(truth: &GroundTruth) -> Vec<Self> {
        truth
            .distribution
            .iter()
            .enumerate()
            .flat_map(|(bin, group)| {
                group.iter().map(move |(site, owner)| SiteAssignmentRecord {
                    site: *site,
                    bin,
                    partition: owner.clone(),
                })
            })
            .collect()
    }
}

impl Record for SiteAssignmentRecord {
    fn header() -> &'static [&'static str] {
        &["site", "bin", "partition"]
    }

    fn fields(&self) -> Vec<String> {
        vec![self.site.to_string(), self.bin.to_string(), self.partition.clone()]
    }
}
