//! Aligned sequence data keyed by leaf label.

use crate::error::{Result, SchedulerError};
use crate::partition::Partition;
use crate::partitions::PartitionCollection;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A multiple sequence alignment: every taxon has exactly `num_sites`
/// characters.
///
/// Sequences are stored behind `Arc` so trees that carry them can be
/// cloned without copying the characters.
#[derive(Debug, Clone)]
pub struct Alignment {
    num_sites: usize,
    labels: Vec<String>,
    sequences: HashMap<String, Arc<[u8]>>,
}

impl Alignment {
    pub fn new(num_sites: usize) -> Self {
        Alignment {
            num_sites,
            labels: Vec::new(),
            sequences: HashMap::new(),
        }
    }

    /// Adds (or replaces) the sequence of `label`.
    ///
    /// # Errors
    /// `SequenceLength` if the sequence does not have `num_sites` characters.
    pub fn insert(&mut self, label: impl Into<String>, sequence: &[u8]) -> Result<()> {
        let label = label.into();
        if sequence.len() != self.num_sites {
            return Err(SchedulerError::SequenceLength {
                label,
                expected: self.num_sites,
                actual: sequence.len(),
            });
        }
        if !self.sequences.contains_key(&label) {
            self.labels.push(label.clone());
        }
        self.sequences.insert(label, Arc::from(sequence));
        Ok(())
    }

    pub fn get(&self, label: &str) -> Option<&Arc<[u8]>> {
        self.sequences.get(label)
    }

    pub fn num_sites(&self) -> usize {
        self.num_sites
    }

    pub fn num_taxa(&self) -> usize {
        self.labels.len()
    }

    /// Iterates `(label, sequence)` in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> + '_ {
        self.labels
            .iter()
            .filter_map(|l| self.sequences.get(l).map(|s| (l.as_str(), &s[..])))
    }

    /// Removes identical columns inside each partition.
    ///
    /// Columns are compared across all taxa; the first occurrence of a
    /// column within a partition is kept. The reduced partitions are laid
    /// out contiguously in collection order and carry no tree.
    pub fn drop_duplicate_sites(
        &self,
        partitions: &PartitionCollection,
    ) -> Result<(Alignment, PartitionCollection)> {
        let mut kept_columns: Vec<usize> = Vec::new();
        let mut reduced = PartitionCollection::new();

        for partition in partitions.iter() {
            let mut seen: HashSet<Vec<u8>> = HashSet::new();
            let start = kept_columns.len();
            for &site in partition.sites() {
                if site >= self.num_sites {
                    return Err(SchedulerError::SiteOutOfRange {
                        site,
                        num_sites: self.num_sites,
                    });
                }
                let column: Vec<u8> = self.iter().map(|(_, seq)| seq[site]).collect();
                if seen.insert(column) {
                    kept_columns.push(site);
                }
            }
            let sites = (start..kept_columns.len()).collect();
            reduced.add(Partition::new(partition.name(), sites), false)?;
        }

        let mut alignment = Alignment::new(kept_columns.len());
        for (label, seq) in self.iter() {
            let row: Vec<u8> = kept_columns.iter().map(|&c| seq[c]).collect();
            alignment.insert(label, &row)?;
        }

        tracing::info!(
            "dropped {} duplicate sites ({} -> {})",
            self.num_sites - alignment.num_sites(),
            self.num_sites,
            alignment.num_sites(),
        );
        Ok((alignment, reduced))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_checks_length() {
        let mut aln = Alignment::new(4);
        aln.insert("A", b"ACGT").unwrap();
        let err = aln.insert("B", b"ACG").unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::SequenceLength { expected: 4, actual: 3, .. }
        ));
        assert_eq!(aln.num_taxa(), 1);
    }

    #[test]
    fn test_drop_duplicate_sites_per_partition() {
        // Columns: 0=AA 1=AA 2=CG 3=AA 4=CG 5=TT
        let mut aln = Alignment::new(6);
        aln.insert("x", b"AACACT").unwrap();
        aln.insert("y", b"AAGAGT").unwrap();

        let mut parts = PartitionCollection::new();
        parts.add(Partition::new("p1", vec![0, 1, 2]), false).unwrap();
        parts.add(Partition::new("p2", vec![3, 4, 5]), false).unwrap();

        let (reduced_aln, reduced_parts) = aln.drop_duplicate_sites(&parts).unwrap();

        // p1 keeps {0, 2}; p2 keeps all three (duplicates across partitions survive).
        assert_eq!(reduced_aln.num_sites(), 5);
        assert_eq!(reduced_parts.get("p1").unwrap().sites(), &[0, 1]);
        assert_eq!(reduced_parts.get("p2").unwrap().sites(), &[2, 3, 4]);
        assert_eq!(&reduced_aln.get("x").unwrap()[..], b"ACACT");
    }
}
