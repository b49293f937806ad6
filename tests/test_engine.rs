#[cfg(test)]
mod engine_tests {
    use anyhow::Result;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use kmer_top::core::engine::{Engine, RunOptions};
    use kmer_top::core::params::StorageMode;
    use kmer_top::core::topk::TopKEntry;
    use std::fs;
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    const EXAMPLE_READ: &[u8] = b"AAAAACGTACGTACGTACGT";

    fn fastq_bytes(reads: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::new();
        for (i, seq) in reads.iter().enumerate() {
            out.extend_from_slice(format!("@read{i}\n").as_bytes());
            out.extend_from_slice(seq);
            out.extend_from_slice(b"\n+\n");
            out.extend(std::iter::repeat_n(b'I', seq.len()));
            out.push(b'\n');
        }
        out
    }

    fn write_fastq(dir: &Path, name: &str, reads: &[Vec<u8>]) -> Result<PathBuf> {
        let path = dir.join(name);
        fs::write(&path, fastq_bytes(reads))?;
        Ok(path)
    }

    fn pseudo_read(len: usize, mut state: u64) -> Vec<u8> {
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            out.push(b"ACGT"[(state >> 33) as usize & 3]);
        }
        out
    }

    fn entry(kmer: &str, count: i64) -> TopKEntry {
        TopKEntry {
            count,
            kmer: kmer.to_string(),
        }
    }

    fn options(threads: usize, storage: Option<StorageMode>, root: &Path) -> RunOptions {
        RunOptions {
            threads: Some(threads),
            storage,
            scratch_root: root.to_path_buf(),
        }
    }

    #[test]
    fn finds_the_most_frequent_kmer() -> Result<()> {
        let dir = TempDir::new()?;
        let reads = vec![EXAMPLE_READ.to_vec(); 3];
        let path = write_fastq(dir.path(), "reads.fastq", &reads)?;

        let mut engine = Engine::with_options(&path, 4, 1, options(4, None, dir.path()))?;
        assert!(engine.results().is_empty());
        assert_eq!(engine.params().m, 3);
        assert_eq!(engine.params().storage, StorageMode::Ram);
        engine.run()?;
        assert_eq!(engine.results(), vec![entry("ACGT", 12)]);
        Ok(())
    }

    #[test]
    fn ranks_ties_by_kmer() -> Result<()> {
        let dir = TempDir::new()?;
        let reads = vec![EXAMPLE_READ.to_vec(); 3];
        let path = write_fastq(dir.path(), "reads.fastq", &reads)?;

        let mut engine = Engine::with_options(&path, 4, 5, options(2, None, dir.path()))?;
        engine.run()?;
        assert_eq!(
            engine.results(),
            vec![
                entry("ACGT", 12),
                entry("CGTA", 9),
                entry("GTAC", 9),
                entry("TACG", 9),
                entry("AAAA", 6),
            ]
        );
        let table = engine.table().unwrap();
        assert_eq!(table.len(), 5);
        Ok(())
    }

    #[test]
    fn fewer_distinct_kmers_than_requested() -> Result<()> {
        let dir = TempDir::new()?;
        let reads = vec![b"ACGTA".to_vec()];
        let path = write_fastq(dir.path(), "reads.fastq", &reads)?;

        let mut engine = Engine::with_options(&path, 4, 50, options(3, None, dir.path()))?;
        engine.run()?;
        let results = engine.results();
        assert_eq!(results, vec![entry("ACGT", 1), entry("CGTA", 1)]);
        assert!(results.iter().all(|e| !e.is_sentinel()));
        Ok(())
    }

    #[test]
    fn low_complexity_input_terminates() -> Result<()> {
        let dir = TempDir::new()?;
        let reads = vec![vec![b'A'; 150]; 40];
        let path = write_fastq(dir.path(), "polya.fastq", &reads)?;

        let mut engine = Engine::with_options(&path, 21, 5, options(4, None, dir.path()))?;
        engine.run()?;
        assert_eq!(engine.results(), vec![entry(&"A".repeat(21), 40 * 130)]);
        Ok(())
    }

    #[test]
    fn ram_and_disk_agree() -> Result<()> {
        let dir = TempDir::new()?;
        let mut reads = Vec::new();
        for i in 0..200u64 {
            let mut read = pseudo_read(90, i * 7919 + 1);
            // Shared motif so the top of the table is well separated.
            if i % 2 == 0 {
                read[10..40].copy_from_slice(&pseudo_read(30, 424242));
            }
            reads.push(read);
        }
        let path = write_fastq(dir.path(), "mixed.fastq", &reads)?;

        let mut ram = Engine::with_options(
            &path,
            11,
            15,
            options(4, Some(StorageMode::Ram), dir.path()),
        )?;
        ram.run()?;
        let mut disk = Engine::with_options(
            &path,
            11,
            15,
            options(4, Some(StorageMode::Disk), dir.path()),
        )?;
        disk.run()?;

        let ram_results = ram.results();
        let disk_results = disk.results();
        assert!(!ram_results.is_empty());
        assert!(ram_results[0].count >= 100);
        let counts = |r: &[TopKEntry]| r.iter().map(|e| e.count).collect::<Vec<_>>();
        assert_eq!(counts(&ram_results), counts(&disk_results));

        // Entries above the boundary count cannot depend on scheduling.
        let boundary = ram_results.last().map(|e| e.count).unwrap_or(0);
        let above = |r: &[TopKEntry]| {
            r.iter()
                .filter(|e| e.count > boundary)
                .cloned()
                .collect::<Vec<_>>()
        };
        assert_eq!(above(&ram_results), above(&disk_results));

        assert!(!dir.path().join("temp").exists());
        assert!(ram.report().buffer_growths > 0);
        assert_eq!(disk.report().buffer_growths, 0);
        Ok(())
    }

    #[test]
    fn disk_run_refuses_occupied_scratch_dir() -> Result<()> {
        let dir = TempDir::new()?;
        let path = write_fastq(dir.path(), "reads.fastq", &[EXAMPLE_READ.to_vec()])?;
        let kept = dir.path().join("temp").join("thesis.txt");
        fs::create_dir_all(kept.parent().unwrap())?;
        fs::write(&kept, b"draft")?;

        let mut engine = Engine::with_options(
            &path,
            4,
            1,
            options(2, Some(StorageMode::Disk), dir.path()),
        )?;
        assert!(engine.run().is_err());
        assert_eq!(fs::read(&kept)?, b"draft");
        assert!(engine.results().is_empty());
        Ok(())
    }

    #[test]
    fn thread_count_does_not_change_counts() -> Result<()> {
        let dir = TempDir::new()?;
        let reads: Vec<Vec<u8>> = (0..50).map(|i| pseudo_read(120, i + 99)).collect();
        let path = write_fastq(dir.path(), "reads.fastq", &reads)?;

        let mut one = Engine::with_options(&path, 9, 10, options(1, None, dir.path()))?;
        one.run()?;
        let mut many = Engine::with_options(&path, 9, 10, options(8, None, dir.path()))?;
        many.run()?;
        let counts = |e: &Engine| e.results().iter().map(|x| x.count).collect::<Vec<_>>();
        assert_eq!(counts(&one), counts(&many));
        assert_eq!(one.report().workers.len(), 1);
        assert_eq!(many.report().workers.len(), 8);
        let claimed: u64 = many.report().workers.iter().map(|w| w.partitions).sum();
        assert_eq!(claimed, 256);
        Ok(())
    }

    #[test]
    fn gzip_input_matches_plain() -> Result<()> {
        let dir = TempDir::new()?;
        let reads = vec![EXAMPLE_READ.to_vec(); 5];
        let plain = write_fastq(dir.path(), "reads.fastq", &reads)?;
        let gz = dir.path().join("reads.fastq.gz");
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&fastq_bytes(&reads))?;
        fs::write(&gz, enc.finish()?)?;

        let mut a = Engine::with_options(&plain, 4, 3, options(2, None, dir.path()))?;
        a.run()?;
        let mut b = Engine::with_options(&gz, 4, 3, options(2, None, dir.path()))?;
        b.run()?;
        assert_eq!(a.results()[0], entry("ACGT", 20));
        assert_eq!(
            a.results().iter().map(|e| e.count).collect::<Vec<_>>(),
            b.results().iter().map(|e| e.count).collect::<Vec<_>>()
        );
        Ok(())
    }

    #[test]
    fn malformed_and_short_reads_are_skipped() -> Result<()> {
        let dir = TempDir::new()?;
        let reads = vec![
            EXAMPLE_READ.to_vec(),
            b"ACGTNACGTACGT".to_vec(),
            b"ACG".to_vec(),
            EXAMPLE_READ.to_vec(),
        ];
        let path = write_fastq(dir.path(), "reads.fastq", &reads)?;
        let mut engine = Engine::with_options(&path, 4, 1, options(2, None, dir.path()))?;
        engine.run()?;
        assert_eq!(engine.results(), vec![entry("ACGT", 8)]);
        assert_eq!(engine.report().partition.malformed, 1);
        assert_eq!(engine.report().partition.short, 1);
        Ok(())
    }

    #[test]
    fn rejects_invalid_configuration() -> Result<()> {
        let dir = TempDir::new()?;
        let path = write_fastq(dir.path(), "reads.fastq", &[EXAMPLE_READ.to_vec()])?;
        assert!(Engine::new(&path, 2, 10).is_err());
        assert!(Engine::new(&path, 91, 10).is_err());
        assert!(Engine::new(&path, 21, 0).is_err());
        assert!(Engine::with_options(&path, 21, 10, options(0, None, dir.path())).is_err());
        assert!(Engine::new(dir.path().join("missing.fastq"), 21, 10).is_err());
        assert!(Engine::new(dir.path(), 21, 10).is_err());
        Ok(())
    }

    #[test]
    fn empty_input_yields_no_results() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("empty.fastq");
        fs::write(&path, b"")?;
        let mut engine = Engine::with_options(&path, 5, 3, options(2, None, dir.path()))?;
        engine.run()?;
        assert!(engine.results().is_empty());
        Ok(())
    }
}
