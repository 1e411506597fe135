//! Max-spread remainder fill.
//!
//! Each remaining partition exposes one candidate site at a time. At every
//! step the smallest bin receives the candidate that is cheapest to add
//! there. Candidates of partitions the bin does not hold yet rank after
//! all others. Ties go to the partition with the most sites, then to the
//! one that comes first.
//!
//! Candidates are taken front to back, or in random order when the
//! strategy is seeded.

use crate::bins::BinCollection;
use crate::error::Result;
use crate::partition::Partition;
use crate::partitions::PartitionCollection;
use crate::strategy::{FillStrategy, single_site};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::cmp::Reverse;

#[derive(Debug, Clone, Copy, Default)]
pub struct MaxSpread {
    seed: Option<u64>,
}

impl MaxSpread {
    pub fn new(seed: Option<u64>) -> Self {
        MaxSpread { seed }
    }
}

struct Cursor {
    partition: Partition,
    next: usize,
}

impl Cursor {
    fn site(&self) -> usize {
        self.partition.sites()[self.next]
    }
}

/// Same partition, sites in the order `take_random_site` draws them.
fn shuffled(partition: &Partition, rng: &mut StdRng) -> Result<Partition> {
    let mut draw = Partition::new(partition.name(), partition.sites().to_vec());
    let mut order = Vec::with_capacity(partition.len());
    while let Some(single) = draw.take_random_site(rng)? {
        order.extend_from_slice(single.sites());
    }
    let mut out = Partition::new(partition.name(), order);
    if let Some(tree) = partition.tree() {
        out.bind_tree(tree.clone());
    }
    Ok(out)
}

impl FillStrategy for MaxSpread {
    fn name(&self) -> &str {
        "max-spread"
    }

    fn fill(&self, bins: &mut BinCollection, remaining: PartitionCollection) -> Result<()> {
        let mut rng = self.seed.map(StdRng::seed_from_u64);
        let mut cursors = Vec::with_capacity(remaining.len());
        for partition in remaining.into_iter().filter(|p| !p.is_empty()) {
            let partition = match rng.as_mut() {
                Some(rng) => shuffled(&partition, rng)?,
                None => partition,
            };
            cursors.push(Cursor { partition, next: 0 });
        }

        while !cursors.is_empty() {
            let target = bins.smallest_bin();
            let bin = &bins.bins()[target];

            let mut best: Option<((bool, u64, Reverse<usize>), usize)> = None;
            for (ci, cursor) in cursors.iter().enumerate() {
                let cost = match bin.get(cursor.partition.name()) {
                    Some(existing) => Some(existing.simulate_add(&[cursor.site()])?),
                    None => None,
                };
                let rank = (
                    cost.is_none(),
                    cost.unwrap_or(0),
                    Reverse(cursor.partition.len()),
                );
                if best.is_none_or(|(r, _)| rank < r) {
                    best = Some((rank, ci));
                }
            }
            let Some((_, ci)) = best else { break };

            let cursor = &mut cursors[ci];
            let piece = single_site(&cursor.partition, cursor.site())?;
            cursor.next += 1;
            if cursor.next == cursor.partition.len() {
                cursors.remove(ci);
            }
            bins.bins_mut()[target].add(piece)?;
        }
        Ok(())
    }
}
