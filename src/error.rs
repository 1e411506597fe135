//! Error types shared by the counting engine, the scheduler and the loaders.

/// Errors that can occur while loading data, counting operations or
/// distributing sites over bins.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The tree description could not be parsed.
    #[error("failed to parse tree: {0}")]
    TreeParse(String),

    /// The tree has no nodes.
    #[error("tree has no nodes")]
    EmptyTree,

    /// A node index does not exist in the tree.
    #[error("node {0} does not exist in the tree")]
    UnknownNode(usize),

    /// A leaf label has no sequence in the alignment.
    #[error("leaf '{0}' has no sequence in the alignment")]
    MissingSequence(String),

    /// A sequence does not span the whole alignment.
    #[error("sequence '{label}' has {actual} sites, expected {expected}")]
    SequenceLength {
        label: String,
        expected: usize,
        actual: usize,
    },

    /// A site index points past the end of the alignment.
    #[error("site {site} is out of range for an alignment of {num_sites} sites")]
    SiteOutOfRange { site: usize, num_sites: usize },

    /// A partition range lies outside the alignment.
    #[error("partition '{name}' range {start}-{end} is invalid for {num_sites} sites")]
    PartitionRange {
        name: String,
        start: usize,
        end: usize,
        num_sites: usize,
    },

    /// An input file line could not be understood.
    #[error("malformed input at line {line}: {detail}")]
    MalformedInput { line: usize, detail: String },

    /// The tree has no sequences attached, so operations cannot be counted.
    #[error("tree has no sequence data attached")]
    NoSequences,

    /// A partition was asked for costs without a tree bound to it.
    #[error("partition '{0}' has no tree bound")]
    NoTree(String),

    /// The scheduler needs at least one bin.
    #[error("number of bins must be at least 1, got {0}")]
    InvalidBinCount(usize),

    /// Heuristic name not recognised.
    #[error("unknown heuristic '{0}'")]
    UnknownHeuristic(String),

    /// Optimisation name not recognised.
    #[error("unknown optimization '{0}'")]
    UnknownOptimization(String),

    /// A heuristic cannot place the remaining sites. The lower bound and
    /// the actual totals disagree.
    #[error("strategy '{strategy}' cannot place sites: {detail}")]
    Infeasible { strategy: String, detail: String },

    /// Sites were lost or duplicated during a scheduling run.
    #[error("schedule holds {actual} sites, expected {expected}")]
    SiteCountMismatch { expected: usize, actual: usize },

    /// The brute-force enumerator would produce too many distributions.
    #[error("{count} distributions exceed the limit of {limit}")]
    TooManyDistributions { count: u128, limit: u128 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
