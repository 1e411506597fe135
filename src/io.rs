//! Loaders for trees, PHYLIP alignments and partition files, and CSV
//! writers for the report records.

use crate::alignment::Alignment;
use crate::error::{Result, SchedulerError};
use crate::partition::Partition;
use crate::partitions::PartitionCollection;
use crate::report::Record;
use crate::tree::Tree;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;

/// Reads the first Newick tree (up to the first `;`) of a file.
pub fn read_newick_tree<P: AsRef<Path>>(path: P) -> Result<Tree> {
    let content = fs::read_to_string(path.as_ref())?;
    let newick = match content.find(';') {
        Some(end) => &content[..=end],
        None => content.as_str(),
    };
    Tree::from_newick(newick)
}

pub fn read_phylip<P: AsRef<Path>>(path: P) -> Result<Alignment> {
    parse_phylip(&fs::read_to_string(path.as_ref())?)
}

/// Parses a sequential PHYLIP alignment: a `ntaxa nsites` header followed
/// by one `label sequence` row per taxon. Anything after the last taxon
/// must be blank.
pub fn parse_phylip(content: &str) -> Result<Alignment> {
    let mut lines = content.lines().enumerate();
    let malformed = |line: usize, detail: &str| SchedulerError::MalformedInput {
        line: line + 1,
        detail: detail.to_string(),
    };

    let (header_idx, header) = lines
        .next()
        .ok_or_else(|| malformed(0, "empty alignment file"))?;
    let mut fields = header.split_whitespace();
    let num_taxa: usize = fields
        .next()
        .and_then(|f| f.parse().ok())
        .ok_or_else(|| malformed(header_idx, "expected taxon count"))?;
    let num_sites: usize = fields
        .next()
        .and_then(|f| f.parse().ok())
        .ok_or_else(|| malformed(header_idx, "expected site count"))?;

    let mut alignment = Alignment::new(num_sites);
    let mut last = header_idx;
    for _ in 0..num_taxa {
        let (idx, line) = lines
            .next()
            .ok_or_else(|| malformed(last + 1, &format!("expected {num_taxa} taxa")))?;
        let mut fields = line.split_whitespace();
        let (Some(label), Some(sequence)) = (fields.next(), fields.next()) else {
            return Err(malformed(idx, "expected 'label sequence'"));
        };
        alignment.insert(label, sequence.as_bytes())?;
        last = idx;
    }

    if let Some((idx, _)) = lines.find(|(_, line)| !line.trim().is_empty()) {
        return Err(malformed(idx, &format!("non-empty line after {num_taxa} taxa")));
    }
    tracing::debug!(taxa = num_taxa, sites = num_sites, "alignment loaded");
    Ok(alignment)
}

pub fn read_partitions<P: AsRef<Path>>(path: P, num_sites: usize) -> Result<PartitionCollection> {
    parse_partitions(&fs::read_to_string(path.as_ref())?, num_sites)
}

/// Parses lines of the form `TYPE, name = start-end` (1-based, inclusive)
/// into tree-less partitions. Blank lines are skipped.
pub fn parse_partitions(content: &str, num_sites: usize) -> Result<PartitionCollection> {
    let mut collection = PartitionCollection::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let malformed = |detail: &str| SchedulerError::MalformedInput {
            line: idx + 1,
            detail: detail.to_string(),
        };

        let (left, range) = line
            .split_once('=')
            .ok_or_else(|| malformed("expected 'TYPE, name = start-end'"))?;
        let name = match left.split_once(',') {
            Some((_, name)) => name.trim(),
            None => return Err(malformed("expected 'TYPE, name' before '='")),
        };
        if name.is_empty() {
            return Err(malformed("empty partition name"));
        }
        let (start, end) = range
            .trim()
            .split_once('-')
            .and_then(|(s, e)| Some((s.trim().parse::<usize>().ok()?, e.trim().parse::<usize>().ok()?)))
            .ok_or_else(|| malformed("expected numeric 'start-end'"))?;

        if start == 0 || start > end || end > num_sites {
            return Err(SchedulerError::PartitionRange {
                name: name.to_string(),
                start,
                end,
                num_sites,
            });
        }
        collection.add(Partition::new(name, (start - 1..end).collect()), true)?;
    }
    Ok(collection)
}

/// Writes `alignment` as sequential PHYLIP.
pub fn write_phylip<P: AsRef<Path>>(path: P, alignment: &Alignment) -> Result<()> {
    let mut out = BufWriter::new(fs::File::create(path.as_ref())?);
    writeln!(out, "{} {}", alignment.num_taxa(), alignment.num_sites())?;
    for (label, sequence) in alignment.iter() {
        writeln!(out, "{label} {}", String::from_utf8_lossy(sequence))?;
    }
    out.flush()?;
    Ok(())
}

/// Writes contiguous partitions back as `DNA, name = start-end`.
pub fn write_partitions<P: AsRef<Path>>(path: P, partitions: &PartitionCollection) -> Result<()> {
    let mut out = BufWriter::new(fs::File::create(path.as_ref())?);
    for partition in partitions.iter() {
        let (Some(first), Some(last)) = (partition.sites().first(), partition.sites().last()) else {
            continue;
        };
        writeln!(out, "DNA, {} = {}-{}", partition.name(), first + 1, last + 1)?;
    }
    out.flush()?;
    Ok(())
}

/// Opens `path` for writing; `-` is stdout and a `.gz` suffix compresses.
fn open_output(path: &Path) -> io::Result<Box<dyn Write>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(BufWriter::new(io::stdout().lock())));
    }
    let file = fs::File::create(path)?;
    if path.to_string_lossy().ends_with(".gz") {
        Ok(Box::new(BufWriter::new(GzEncoder::new(file, Compression::default()))))
    } else {
        Ok(Box::new(BufWriter::new(file)))
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Writes a header row and one row per record.
pub fn write_records_csv<P: AsRef<Path>, R: Record>(path: P, records: &[R]) -> Result<()> {
    let mut out = open_output(path.as_ref())?;
    writeln!(out, "{}", R::header().join(","))?;
    for record in records {
        let row: Vec<String> = record.fields().iter().map(|f| csv_field(f)).collect();
        writeln!(out, "{}", row.join(","))?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::SiteDependencyRecord;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("subtree-scheduler-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_parse_phylip() {
        let aln = parse_phylip("2 4\nA ACGT\nB AC-T\n\n").unwrap();
        assert_eq!(aln.num_taxa(), 2);
        assert_eq!(aln.num_sites(), 4);
        assert_eq!(&aln.get("B").unwrap()[..], b"AC-T");
    }

    #[test]
    fn test_phylip_rejects_trailing_rows() {
        let err = parse_phylip("1 2\nA AC\nB GT\n").unwrap_err();
        assert!(matches!(err, SchedulerError::MalformedInput { line: 3, .. }));
    }

    #[test]
    fn test_phylip_checks_lengths() {
        let err = parse_phylip("2 3\nA ACG\nB AC\n").unwrap_err();
        assert!(matches!(err, SchedulerError::SequenceLength { expected: 3, actual: 2, .. }));
    }

    #[test]
    fn test_phylip_missing_taxa() {
        let err = parse_phylip("3 2\nA AC\n").unwrap_err();
        assert!(matches!(err, SchedulerError::MalformedInput { .. }));
    }

    #[test]
    fn test_parse_partitions() {
        let parts = parse_partitions("DNA, gene1 = 1-3\n\nDNA, gene2 = 4-10\n", 10).unwrap();
        assert_eq!(parts.names(), vec!["gene1", "gene2"]);
        assert_eq!(parts.get("gene1").unwrap().sites(), &[0, 1, 2]);
        assert_eq!(parts.get("gene2").unwrap().len(), 7);
        assert!(!parts.get("gene2").unwrap().is_computed());
    }

    #[test]
    fn test_partition_range_errors() {
        let err = parse_partitions("DNA, g = 5-12\n", 10).unwrap_err();
        assert!(matches!(err, SchedulerError::PartitionRange { end: 12, .. }));

        let err = parse_partitions("DNA, g = 0-2\n", 10).unwrap_err();
        assert!(matches!(err, SchedulerError::PartitionRange { start: 0, .. }));

        let err = parse_partitions("DNA g 1-2\n", 10).unwrap_err();
        assert!(matches!(err, SchedulerError::MalformedInput { line: 1, .. }));

        let err = parse_partitions("DNA, g = a-2\n", 10).unwrap_err();
        assert!(matches!(err, SchedulerError::MalformedInput { line: 1, .. }));
    }

    #[test]
    fn test_uniq_files_round_trip() {
        let aln = parse_phylip("2 3\nA ACG\nB TTG\n").unwrap();
        let parts = parse_partitions("DNA, g = 1-3\n", 3).unwrap();
        let phy = temp_path("aln.phy.uniq");
        let part = temp_path("parts.uniq");
        write_phylip(&phy, &aln).unwrap();
        write_partitions(&part, &parts).unwrap();

        let back = read_phylip(&phy).unwrap();
        assert_eq!(&back.get("A").unwrap()[..], b"ACG");
        assert_eq!(read_partitions(&part, 3).unwrap().total_sites(), 3);
        let _ = fs::remove_file(phy);
        let _ = fs::remove_file(part);
    }

    #[test]
    fn test_gzip_csv() {
        let path = temp_path("deps.csv.gz");
        let rows = vec![SiteDependencyRecord {
            tree: "t,1".into(),
            partition: "p".into(),
            site: 3,
            count: 2,
        }];
        write_records_csv(&path, &rows).unwrap();

        let mut text = String::new();
        GzDecoder::new(fs::File::open(&path).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "tree,partition,site,count\n\"t,1\",p,3,2\n");
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_read_first_tree() {
        let path = temp_path("tree.nwk");
        fs::write(&path, "((A,B),C);\n((A,C),B);\n").unwrap();
        let tree = read_newick_tree(&path).unwrap();
        assert_eq!(tree.leaf_count(), 3);
        let _ = fs::remove_file(path);
    }
}
