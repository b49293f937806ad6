#[cfg(test)]
mod histogram_tests {
    use anyhow::Result;
    use kmer_top::core::codec::PackedSequence;
    use kmer_top::core::histogram::*;
    use kmer_top::core::io::ReadSource;
    use kmer_top::core::params::{Params, StorageMode};
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn write_fastq(dir: &Path, reads: &[&[u8]]) -> Result<PathBuf> {
        let mut out = Vec::new();
        for (i, seq) in reads.iter().enumerate() {
            out.extend_from_slice(format!("@read{i}\n").as_bytes());
            out.extend_from_slice(seq);
            out.extend_from_slice(b"\n+\n");
            out.extend(std::iter::repeat_n(b'I', seq.len()));
            out.push(b'\n');
        }
        let path = dir.join("reads.fastq");
        fs::write(&path, out)?;
        Ok(path)
    }

    fn params(k: usize, m: usize, stride: usize) -> Params {
        Params {
            k,
            m,
            top_n: 10,
            partitions: 256,
            threads: 1,
            max_depth_search: (1 << (2 * m)) - 1,
            sample_stride: stride,
            storage: StorageMode::Ram,
        }
    }

    fn value_of(mmer: &[u8]) -> usize {
        PackedSequence::encode(mmer)
            .unwrap()
            .substring_value(0, mmer.len()) as usize
    }

    #[test]
    fn accumulates_group_statistics() -> Result<()> {
        let dir = TempDir::new()?;
        // Groups: ACGT (ACG), CGTA (CGT), GTAC (GTA), TACG+ACGT (ACG).
        let path = write_fastq(dir.path(), &[b"ACGTACGT"])?;
        let source = ReadSource::open(&path, 1)?;
        let (hist, stats) = build(&source, &params(4, 3, 1))?;

        assert_eq!(stats.records, 1);
        assert_eq!(stats.sampled, 1);
        assert_eq!(stats.groups, 4);
        assert_eq!(hist.len(), 64);

        let acg = value_of(b"ACG");
        assert_eq!(hist.div[acg], 1.5);
        assert_eq!(hist.fac[acg], 3);
        assert_eq!(hist.sum[acg], 2);
        let cgt = value_of(b"CGT");
        assert_eq!((hist.div[cgt], hist.fac[cgt], hist.sum[cgt]), (1.0, 1, 1));
        assert_eq!(hist.sum[value_of(b"TAC")], 0);
        Ok(())
    }

    #[test]
    fn thresholds_read_sorted_rank() -> Result<()> {
        let dir = TempDir::new()?;
        let path = write_fastq(dir.path(), &[b"ACGTACGT"])?;
        let source = ReadSource::open(&path, 1)?;
        let (hist, _) = build(&source, &params(4, 3, 1))?;

        let top = hist.thresholds(0);
        assert_eq!(top, Thresholds { div: 1.5, fac: 3, sum: 2 });
        let second = hist.thresholds(1);
        assert_eq!(second, Thresholds { div: 1.0, fac: 1, sum: 1 });
        let deep = hist.thresholds(63);
        assert_eq!(deep, Thresholds { div: 0.0, fac: 0, sum: 0 });
        // Depth past the end clamps to the last rank.
        assert_eq!(hist.thresholds(10_000), deep);

        let filter = AdmissionFilter::new(&hist, second);
        assert!(filter.admits(value_of(b"ACG") as u64));
        assert!(!filter.admits(value_of(b"CGT") as u64));
        assert!(!filter.admits(value_of(b"TTT") as u64));

        let everything_seen = AdmissionFilter::new(&hist, deep);
        assert!(everything_seen.admits(value_of(b"GTA") as u64));
        assert!(!everything_seen.admits(value_of(b"TTT") as u64));
        Ok(())
    }

    #[test]
    fn samples_every_stride_th_record() -> Result<()> {
        let dir = TempDir::new()?;
        let reads: Vec<&[u8]> = vec![b"ACGTACGT"; 25];
        let path = write_fastq(dir.path(), &reads)?;
        let source = ReadSource::open(&path, 1)?;
        let (hist, stats) = build(&source, &params(4, 3, 10))?;
        assert_eq!(stats.records, 25);
        // Records 0, 10 and 20.
        assert_eq!(stats.sampled, 3);
        assert_eq!(hist.sum[value_of(b"ACG")], 6);
        Ok(())
    }

    #[test]
    fn malformed_record_does_not_consume_stride() -> Result<()> {
        let dir = TempDir::new()?;
        let path = write_fastq(
            dir.path(),
            &[b"ACGTACGT", b"ACGTACGT", b"ACGTACGT", b"ACGNACGT", b"GGGGCCCC"],
        )?;
        let source = ReadSource::open(&path, 1)?;
        let (hist, stats) = build(&source, &params(4, 3, 3))?;
        assert_eq!(stats.records, 5);
        assert_eq!(stats.malformed, 1);
        // Record 0, then the first clean record after the skip window.
        assert_eq!(stats.sampled, 2);
        assert_eq!(hist.sum[value_of(b"ACG")], 2);
        assert!(hist.sum[value_of(b"CCC")] + hist.sum[value_of(b"GCC")] > 0);
        Ok(())
    }

    #[test]
    fn short_reads_are_sampled_but_empty() -> Result<()> {
        let dir = TempDir::new()?;
        let path = write_fastq(dir.path(), &[b"ACG", b"ACGT"])?;
        let source = ReadSource::open(&path, 1)?;
        let (_, stats) = build(&source, &params(4, 3, 1))?;
        assert_eq!(stats.sampled, 2);
        assert_eq!(stats.short, 1);
        assert_eq!(stats.groups, 1);
        Ok(())
    }
}
