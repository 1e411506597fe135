use clap::{Args, Parser, Subcommand, ValueEnum};
use rayon::prelude::*;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use subtree_scheduler::enumerate::ground_truth;
use subtree_scheduler::io::{
    read_newick_tree, read_partitions, read_phylip, write_partitions, write_phylip,
    write_records_csv,
};
use subtree_scheduler::report::{
    GroundTruthRecord, SiteAssignmentRecord, SiteDependencyRecord, TreeCostRecord,
};
use subtree_scheduler::{
    Alignment, Heuristic, Optimization, PartitionCollection, Result, SchedulerConfig,
    SliceRounding, Tree, schedule,
};
use tracing_subscriber::EnvFilter;

/// Count phylogenetic likelihood operations with subtree-repeat sharing and
/// schedule partitioned alignments over workers.
#[derive(Parser, Debug)]
#[command(name = "subtree-scheduler", version, about = "Likelihood operation counting and site scheduling")]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode: only errors are logged
    #[arg(short = 'q', long = "quiet", default_value_t = false, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Operation counts per tree, rooting and partition
    Count(CountArgs),
    /// Dependency count of every site
    Dependencies(DependencyArgs),
    /// Schedule partitions over bins with a heuristic
    Schedule(ScheduleArgs),
    /// Brute-force optimum on a cropped input, compared with every heuristic
    Optimum(OptimumArgs),
    /// Write alignment and partition files without duplicate sites
    Dedup(DedupArgs),
}

#[derive(Args, Debug)]
struct Inputs {
    /// Sequential PHYLIP alignment
    #[arg(short = 'a', long = "alignment")]
    alignment: PathBuf,

    /// Partition file with lines `DNA, name = start-end`
    #[arg(short = 'p', long = "partitions")]
    partitions: PathBuf,

    /// Remove identical sites inside each partition before anything else
    #[arg(long = "drop-duplicates", default_value_t = false)]
    drop_duplicates: bool,
}

#[derive(Args, Debug)]
struct CountArgs {
    #[command(flatten)]
    inputs: Inputs,

    /// Newick tree files, processed in parallel
    #[arg(short = 't', long = "tree", required = true, num_args = 1..)]
    trees: Vec<PathBuf>,

    /// Where to root each tree: as-is | midpoint | all
    #[arg(long = "rooting", value_enum, default_value_t = Rooting::Midpoint)]
    rooting: Rooting,

    /// Also cost each partition split after this many sites
    #[arg(long = "split-at")]
    split_at: Option<usize>,

    /// Output CSV (`.gz` compresses, `-` is stdout)
    #[arg(short = 'o', long = "output")]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct DependencyArgs {
    #[command(flatten)]
    inputs: Inputs,

    #[arg(short = 't', long = "tree", required = true, num_args = 1..)]
    trees: Vec<PathBuf>,

    /// Keep the rooting of the tree files instead of midpoint rooting
    #[arg(long = "as-is", default_value_t = false)]
    as_is: bool,

    #[arg(short = 'o', long = "output")]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct ScheduleArgs {
    #[command(flatten)]
    inputs: Inputs,

    #[command(flatten)]
    scheduler: SchedulerArgs,

    #[arg(short = 't', long = "tree")]
    tree: PathBuf,

    #[arg(long = "as-is", default_value_t = false)]
    as_is: bool,

    #[arg(short = 'o', long = "output")]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct SchedulerArgs {
    /// Number of bins (workers)
    #[arg(short = 'b', long = "bins", default_value_t = 2)]
    bins: usize,

    #[arg(long = "heuristic", value_enum, default_value_t = Heuristic::GreedySimulate)]
    heuristic: Heuristic,

    /// Refinements applied in order after the heuristic (repeatable)
    #[arg(long = "optimize", value_enum)]
    optimizations: Vec<Optimization>,

    #[arg(long = "slice-rounding", value_enum, default_value_t = SliceRounding::Ceil)]
    slice_rounding: SliceRounding,

    #[arg(long = "redistribution-fraction", default_value_t = 0.2)]
    redistribution_fraction: f64,

    #[arg(long = "redistribution-min-sites", default_value_t = 10)]
    redistribution_min_sites: usize,

    #[arg(long = "reduce-max-passes", default_value_t = 25)]
    reduce_max_passes: usize,

    /// Seed for random candidate order
    #[arg(long = "seed")]
    seed: Option<u64>,
}

impl SchedulerArgs {
    fn config(&self) -> SchedulerConfig {
        SchedulerConfig::new(self.bins, self.heuristic)
            .with_optimizations(self.optimizations.clone())
            .with_slice_rounding(self.slice_rounding)
            .with_redistribution(self.redistribution_fraction, self.redistribution_min_sites)
            .with_reduce_max_passes(self.reduce_max_passes)
            .with_seed(self.seed)
    }
}

#[derive(Args, Debug)]
struct OptimumArgs {
    #[command(flatten)]
    inputs: Inputs,

    #[arg(short = 't', long = "tree")]
    tree: PathBuf,

    #[arg(short = 'b', long = "bins", default_value_t = 2)]
    bins: usize,

    /// Keep only the first N partitions
    #[arg(long = "crop-partitions", default_value_t = 3)]
    crop_partitions: usize,

    /// Keep only the first N sites of each partition
    #[arg(long = "crop-sites", default_value_t = 6)]
    crop_sites: usize,

    /// Refuse to enumerate more distributions than this
    #[arg(long = "limit", default_value_t = 1_000_000)]
    limit: u128,

    /// Optional CSV with the bin of every site in the optimum
    #[arg(long = "assignments")]
    assignments: Option<PathBuf>,

    #[arg(short = 'o', long = "output")]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct DedupArgs {
    #[arg(short = 'a', long = "alignment")]
    alignment: PathBuf,

    #[arg(short = 'p', long = "partitions")]
    partitions: PathBuf,

    /// Appended to both input paths to name the outputs
    #[arg(long = "suffix", default_value = ".uniq")]
    suffix: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Rooting {
    AsIs,
    Midpoint,
    All,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Command::Count(args) => run_count(args),
        Command::Dependencies(args) => run_dependencies(args),
        Command::Schedule(args) => run_schedule(args),
        Command::Optimum(args) => run_optimum(args),
        Command::Dedup(args) => run_dedup(args),
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Unwraps `result` or reports it and exits with `code`.
fn or_exit<T>(result: Result<T>, code: i32, context: impl Display) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            eprintln!("{context}: {e}");
            std::process::exit(code);
        }
    }
}

fn load_inputs(inputs: &Inputs) -> (Alignment, PartitionCollection) {
    let t0 = Instant::now();
    let alignment = or_exit(
        read_phylip(&inputs.alignment),
        2,
        format!("Failed to read alignment {:?}", inputs.alignment),
    );
    let partitions = or_exit(
        read_partitions(&inputs.partitions, alignment.num_sites()),
        2,
        format!("Failed to read partitions {:?}", inputs.partitions),
    );
    let (alignment, partitions) = if inputs.drop_duplicates {
        or_exit(
            alignment.drop_duplicate_sites(&partitions),
            2,
            "Failed to drop duplicate sites",
        )
    } else {
        (alignment, partitions)
    };
    tracing::info!(
        taxa = alignment.num_taxa(),
        sites = alignment.num_sites(),
        partitions = partitions.len(),
        "Reading inputs {:.3}s",
        t0.elapsed().as_secs_f64()
    );
    (alignment, partitions)
}

fn load_tree(path: &Path, alignment: &Alignment, midpoint: bool) -> Result<Tree> {
    let mut tree = read_newick_tree(path)?;
    tree.attach_sequences(alignment)?;
    if midpoint {
        tree.midpoint_root()?;
    }
    Ok(tree)
}

fn log_write_done(output: &Path, rows: usize, started: Instant) {
    let secs = started.elapsed().as_secs_f64();
    if output.as_os_str() == "-" {
        tracing::info!(rows, "Writing to stdout {secs:.3}s");
    } else {
        tracing::info!(rows, "Writing to {:?} {secs:.3}s", output);
    }
}

fn tree_costs(
    path: &Path,
    alignment: &Alignment,
    partitions: &PartitionCollection,
    rooting: Rooting,
    split_at: Option<usize>,
) -> Result<Vec<TreeCostRecord>> {
    let mut tree = load_tree(path, alignment, rooting == Rooting::Midpoint)?;
    let label = path.display().to_string();
    let roots: Vec<Option<usize>> = match rooting {
        Rooting::All => (0..tree.node_count()).map(Some).collect(),
        _ => vec![None],
    };
    tracing::debug!(tree = %label, roots = roots.len(), "processing tree");

    let mut records = Vec::new();
    for (root_node, root) in roots.into_iter().enumerate() {
        if let Some(node) = root {
            tree.reroot(node)?;
        }
        let height = tree.height();
        for partition in partitions.iter() {
            let sites = partition.sites();
            let record = |counts: subtree_scheduler::OperationCount, split_at: usize| TreeCostRecord {
                tree: label.clone(),
                root_node,
                height,
                partition: partition.name().to_string(),
                op_maximum: counts.op_maximum,
                op_optimized: counts.op_optimized,
                split_at,
            };
            if let Some(k) = split_at {
                if sites.len() >= 2 {
                    let k = k.clamp(1, sites.len() - 1);
                    let (front, back) = sites.split_at(k);
                    let counts = tree.simulate_fresh(front)? + tree.simulate_fresh(back)?;
                    records.push(record(counts, k));
                }
            }
            records.push(record(tree.simulate_fresh(sites)?, 0));
        }
    }
    Ok(records)
}

fn run_count(args: CountArgs) {
    let (alignment, partitions) = load_inputs(&args.inputs);

    let t1 = Instant::now();
    let per_tree: Vec<Result<Vec<TreeCostRecord>>> = args
        .trees
        .par_iter()
        .map(|path| tree_costs(path, &alignment, &partitions, args.rooting, args.split_at))
        .collect();
    let mut records = Vec::new();
    for (path, result) in args.trees.iter().zip(per_tree) {
        records.extend(or_exit(result, 3, format!("Failed to count {path:?}")));
    }
    tracing::info!(
        trees = args.trees.len(),
        "Counting operations {:.3}s",
        t1.elapsed().as_secs_f64()
    );

    let t2 = Instant::now();
    or_exit(
        write_records_csv(&args.output, &records),
        4,
        format!("Failed to write output {:?}", args.output),
    );
    log_write_done(&args.output, records.len(), t2);
}

fn site_dependencies(
    path: &Path,
    alignment: &Alignment,
    partitions: &PartitionCollection,
    midpoint: bool,
) -> Result<Vec<SiteDependencyRecord>> {
    let tree = Arc::new(load_tree(path, alignment, midpoint)?);
    let mut bound = partitions.clone();
    bound.bind_tree(&tree, false)?;
    let label = path.display().to_string();

    let mut records = Vec::new();
    for partition in bound.iter() {
        let deps = partition.site_dependencies()?;
        // Sites sharing nothing have no entry.
        records.extend(partition.sites().iter().map(|&site| SiteDependencyRecord {
            tree: label.clone(),
            partition: partition.name().to_string(),
            site,
            count: deps.get(&site).copied().unwrap_or(0),
        }));
    }
    Ok(records)
}

fn run_dependencies(args: DependencyArgs) {
    let (alignment, partitions) = load_inputs(&args.inputs);

    let t1 = Instant::now();
    let per_tree: Vec<Result<Vec<SiteDependencyRecord>>> = args
        .trees
        .par_iter()
        .map(|path| site_dependencies(path, &alignment, &partitions, !args.as_is))
        .collect();
    let mut records = Vec::new();
    for (path, result) in args.trees.iter().zip(per_tree) {
        records.extend(or_exit(result, 3, format!("Failed to count {path:?}")));
    }
    tracing::info!("Counting site dependencies {:.3}s", t1.elapsed().as_secs_f64());

    let t2 = Instant::now();
    or_exit(
        write_records_csv(&args.output, &records),
        4,
        format!("Failed to write output {:?}", args.output),
    );
    log_write_done(&args.output, records.len(), t2);
}

fn heuristic_name(heuristic: Heuristic) -> String {
    heuristic
        .to_possible_value()
        .map(|v| v.get_name().to_string())
        .unwrap_or_else(|| format!("{heuristic:?}"))
}

fn run_schedule(args: ScheduleArgs) {
    let (alignment, mut partitions) = load_inputs(&args.inputs);
    let tree = or_exit(
        load_tree(&args.tree, &alignment, !args.as_is),
        2,
        format!("Failed to load tree {:?}", args.tree),
    );
    or_exit(
        partitions.bind_tree(&Arc::new(tree), true),
        3,
        "Failed to count operations",
    );

    let t1 = Instant::now();
    let config = args.scheduler.config();
    let result = or_exit(schedule(&partitions, &config), 3, "Scheduling failed");
    tracing::info!(
        baseline_max = result.baseline_max,
        applied = ?result.applied,
        "Scheduling {:.3}s\n{}",
        t1.elapsed().as_secs_f64(),
        result.bins.summary()
    );

    let t2 = Instant::now();
    let records = result.bins.records(&heuristic_name(config.heuristic));
    or_exit(
        write_records_csv(&args.output, &records),
        4,
        format!("Failed to write output {:?}", args.output),
    );
    log_write_done(&args.output, records.len(), t2);
}

fn run_optimum(args: OptimumArgs) {
    let (alignment, mut partitions) = load_inputs(&args.inputs);
    let tree = or_exit(
        load_tree(&args.tree, &alignment, true),
        2,
        format!("Failed to load tree {:?}", args.tree),
    );
    or_exit(
        partitions.crop(args.crop_partitions, args.crop_sites),
        3,
        "Failed to crop partitions",
    );
    or_exit(
        partitions.bind_tree(&Arc::new(tree), true),
        3,
        "Failed to count operations",
    );
    let sites = partitions.total_sites();

    let t1 = Instant::now();
    let truth = or_exit(
        ground_truth(&partitions, args.bins, args.limit),
        3,
        "Brute force failed",
    );
    tracing::info!(
        max_cost = truth.max_cost,
        evaluated = truth.evaluated,
        "Brute force {:.3}s",
        t1.elapsed().as_secs_f64()
    );

    let mut records = vec![GroundTruthRecord::optimum(&truth, sites)];
    for heuristic in Heuristic::value_variants() {
        let config = SchedulerConfig::new(args.bins, *heuristic);
        match schedule(&partitions, &config) {
            Ok(result) => records.push(GroundTruthRecord {
                method: heuristic_name(*heuristic),
                bins: args.bins,
                sites,
                max_cost: result.bins.max_size(),
                evaluated: 0,
            }),
            Err(e) => tracing::warn!(?heuristic, %e, "heuristic failed on cropped input"),
        }
    }

    let t2 = Instant::now();
    or_exit(
        write_records_csv(&args.output, &records),
        4,
        format!("Failed to write output {:?}", args.output),
    );
    if let Some(path) = &args.assignments {
        or_exit(
            write_records_csv(path, &SiteAssignmentRecord::from_ground_truth(&truth)),
            4,
            format!("Failed to write output {path:?}"),
        );
    }
    log_write_done(&args.output, records.len(), t2);
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn run_dedup(args: DedupArgs) {
    let alignment = or_exit(
        read_phylip(&args.alignment),
        2,
        format!("Failed to read alignment {:?}", args.alignment),
    );
    let partitions = or_exit(
        read_partitions(&args.partitions, alignment.num_sites()),
        2,
        format!("Failed to read partitions {:?}", args.partitions),
    );
    let (reduced, reduced_partitions) = or_exit(
        alignment.drop_duplicate_sites(&partitions),
        3,
        "Failed to drop duplicate sites",
    );

    let alignment_out = with_suffix(&args.alignment, &args.suffix);
    let partitions_out = with_suffix(&args.partitions, &args.suffix);
    or_exit(
        write_phylip(&alignment_out, &reduced),
        4,
        format!("Failed to write output {alignment_out:?}"),
    );
    or_exit(
        write_partitions(&partitions_out, &reduced_partitions),
        4,
        format!("Failed to write output {partitions_out:?}"),
    );
    tracing::info!(
        "Removed identical sites and saved to {:?} and {:?}",
        alignment_out,
        partitions_out
    );
}
