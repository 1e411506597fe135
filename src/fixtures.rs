//! Trees and collections shared by the unit tests.

use crate::alignment::Alignment;
use crate::partition::Partition;
use crate::partitions::PartitionCollection;
use crate::tree::Tree;
use std::sync::Arc;

pub fn tree_with(newick: &str, rows: &[(&str, &str)]) -> Arc<Tree> {
    let mut aln = Alignment::new(rows[0].1.len());
    for (label, seq) in rows {
        aln.insert(*label, seq.as_bytes()).unwrap();
    }
    attach(newick, &aln)
}

fn attach(newick: &str, aln: &Alignment) -> Arc<Tree> {
    let mut tree = Tree::from_newick(newick).unwrap();
    tree.attach_sequences(aln).unwrap();
    Arc::new(tree)
}

/// `((A,B),C)` over four sites. Sites 0 and 1 are identical, site 2
/// shares the `(A,B)` pattern with them, site 3 shares nothing.
pub fn small_tree() -> Arc<Tree> {
    tree_with(
        "((A,B),C);",
        &[("A", "AAAC"), ("B", "GGGT"), ("C", "TTCG")],
    )
}

/// `((A,B),(C,D))` where every site is distinct at every node, so
/// `op_optimized == op_maximum == 3 * sites`.
pub fn distinct_tree(num_sites: usize) -> Arc<Tree> {
    let row: Vec<u8> = (0..num_sites).map(|s| s as u8).collect();
    let mut aln = Alignment::new(num_sites);
    for label in ["A", "B", "C", "D"] {
        aln.insert(label, &row).unwrap();
    }
    attach("((A,B),(C,D));", &aln)
}

/// Contiguous partitions `(name, len)` over `tree`, costs computed.
pub fn collection(tree: &Arc<Tree>, layout: &[(&str, usize)]) -> PartitionCollection {
    let mut parts = PartitionCollection::new();
    let mut start = 0;
    for (name, len) in layout {
        let sites = (start..start + len).collect();
        parts
            .add(Partition::with_tree(*name, sites, Arc::clone(tree), true).unwrap(), false)
            .unwrap();
        start += len;
    }
    parts
}
