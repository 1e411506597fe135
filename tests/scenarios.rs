use std::sync::Arc;
use subtree_scheduler::strategy::no_split::fill_without_splitting;
use subtree_scheduler::strategy::{FillStrategy, GreedySimulate, ProportionalSlice};
use subtree_scheduler::{
    Alignment, BinCollection, Heuristic, Partition, PartitionCollection, SchedulerConfig,
    SliceRounding, Tree, ground_truth, schedule,
};

/// `((A,B),(C,D))` where no site shares a pattern with another.
fn unshared_tree(num_sites: usize) -> Arc<Tree> {
    let row: Vec<u8> = (0..num_sites).map(|s| b'!' + s as u8).collect();
    let mut aln = Alignment::new(num_sites);
    for label in ["A", "B", "C", "D"] {
        aln.insert(label, &row).unwrap();
    }
    let mut tree = Tree::from_newick("((A,B),(C,D));").unwrap();
    tree.attach_sequences(&aln).unwrap();
    Arc::new(tree)
}

fn contiguous(tree: &Arc<Tree>, layout: &[(&str, usize)]) -> PartitionCollection {
    let mut parts = PartitionCollection::new();
    let mut start = 0;
    for (name, len) in layout {
        let p = Partition::with_tree(*name, (start..start + len).collect(), Arc::clone(tree), true)
            .unwrap();
        parts.add(p, false).unwrap();
        start += len;
    }
    parts
}

#[test]
fn halves_land_in_their_own_bins() {
    let tree = unshared_tree(20);
    let mut parts = contiguous(&tree, &[("a", 10), ("b", 10)]);
    for p in parts.iter() {
        assert_eq!(p.op_optimized(), p.op_maximum());
    }

    let mut bins = BinCollection::new(2).unwrap();
    bins.set_lower_bound(&mut parts).unwrap();
    let rest = fill_without_splitting(&mut bins, parts).unwrap();

    assert!(rest.is_empty());
    assert_eq!(bins.bins()[0].partition_names().collect::<Vec<_>>(), vec!["a"]);
    assert_eq!(bins.bins()[1].partition_names().collect::<Vec<_>>(), vec!["b"]);
    assert_eq!(bins.bins()[0].size(), 30);
    assert_eq!(bins.bins()[1].size(), 30);
}

#[test]
fn single_partition_is_sliced_over_three_bins() {
    let tree = unshared_tree(10);
    let mut parts = contiguous(&tree, &[("p", 10)]);
    let mut bins = BinCollection::new(3).unwrap();
    bins.set_lower_bound(&mut parts).unwrap();

    let rest = fill_without_splitting(&mut bins, parts).unwrap();
    assert_eq!(rest.total_sites(), 10);
    assert_eq!(bins.total_sites(), 0);

    ProportionalSlice::new(SliceRounding::Ceil)
        .fill(&mut bins, rest)
        .unwrap();
    let counts: Vec<usize> = bins.iter().map(|b| b.total_sites()).collect();
    assert_eq!(counts, vec![4, 4, 2]);

    let mut sites: Vec<usize> = bins
        .iter()
        .flat_map(|b| b.partitions().iter().flat_map(|p| p.sites().to_vec()))
        .collect();
    sites.sort_unstable();
    assert_eq!(sites, (0..10).collect::<Vec<_>>());
}

#[test]
fn greedy_ties_go_to_the_first_bin() {
    let tree = unshared_tree(2);
    let mut parts = contiguous(&tree, &[("p", 1), ("q", 1)]);
    let mut bins = BinCollection::new(2).unwrap();
    bins.set_lower_bound(&mut parts).unwrap();

    let single = parts.split_front_n_partitions(1);
    let mut pool = PartitionCollection::new();
    for p in single {
        pool.add(p, false).unwrap();
    }
    GreedySimulate.fill(&mut bins, pool).unwrap();

    assert_eq!(bins.bins()[0].total_sites(), 1);
    assert!(bins.bins()[0].contains("p"));
    assert!(bins.bins()[1].is_empty());
}

#[test]
fn heuristics_never_beat_brute_force() {
    let tree = unshared_tree(6);
    let parts = contiguous(&tree, &[("a", 2), ("b", 4)]);
    let optimum = ground_truth(&parts, 2, 1_000).unwrap();
    assert_eq!(optimum.max_cost, 9);
    assert_eq!(optimum.evaluated, 62);

    for heuristic in [
        Heuristic::GreedySimulate,
        Heuristic::SmallestBinFirst,
        Heuristic::MaxSpread,
        Heuristic::ProportionalSlice,
            Heuristic::CutFill,
        Heuristic::Reference,
    ] {
        let result = schedule(&parts, &SchedulerConfig::new(2, heuristic)).unwrap();
        assert!(result.bins.max_size() >= optimum.max_cost, "{heuristic:?}");
    }
}
