//! Worker routine: claim partitions, count their k-mers exactly, keep the
//! best ones in a thread-local top-K table.

use crate::core::io::MmapSource;
use crate::core::partition::{Partition, PartitionQueue};
use crate::core::topk::TopKTable;
use anyhow::{Context, Result};
use fxhash::FxHashMap;
use memchr::memchr_iter;
use std::fs;

pub type KmerCounts<'a> = FxHashMap<&'a [u8], u64>;

#[derive(Clone, Debug, Default)]
pub struct WorkerStats {
    pub partitions: u64,
    pub empty: u64,
    pub bytes: u64,
    pub kmers: u64,
    pub distinct: u64,
}

impl std::ops::AddAssign<&WorkerStats> for WorkerStats {
    fn add_assign(&mut self, other: &WorkerStats) {
        self.partitions += other.partitions;
        self.empty += other.empty;
        self.bytes += other.bytes;
        self.kmers += other.kmers;
        self.distinct += other.distinct;
    }
}

/// Counts every k-mer of every `delimiter`-separated superkmer in `data`.
/// Keys borrow from `data`.
pub fn count_kmers(data: &[u8], delimiter: u8, k: usize) -> KmerCounts<'_> {
    let mut counts = KmerCounts::default();
    counts.reserve(data.len() / k.max(1));
    let mut start = 0usize;
    for end in memchr_iter(delimiter, data).chain(std::iter::once(data.len())) {
        let superkmer = &data[start..end];
        start = end + 1;
        if superkmer.len() < k {
            continue;
        }
        for kmer in superkmer.windows(k) {
            *counts.entry(kmer).or_insert(0) += 1;
        }
    }
    counts
}

pub fn fold_counts(table: &mut TopKTable, counts: &KmerCounts<'_>) {
    for (kmer, &count) in counts {
        table.offer(count as i64, kmer);
    }
}

fn count_bytes(data: &[u8], delimiter: u8, k: usize, table: &mut TopKTable, stats: &mut WorkerStats) {
    let counts = count_kmers(data, delimiter, k);
    stats.bytes += data.len() as u64;
    stats.distinct += counts.len() as u64;
    stats.kmers += counts.values().sum::<u64>();
    fold_counts(table, &counts);
}

/// Consumes one claimed partition and releases its storage: the buffer is
/// dropped, the scratch file deleted.
pub fn count_partition(
    partition: Partition,
    k: usize,
    table: &mut TopKTable,
    stats: &mut WorkerStats,
) -> Result<()> {
    let delimiter = partition.delimiter();
    stats.partitions += 1;
    match partition {
        Partition::Memory(buffer) => {
            if buffer.is_empty() {
                stats.empty += 1;
                return Ok(());
            }
            count_bytes(buffer.as_bytes(), delimiter, k, table, stats);
        }
        Partition::Disk(path) => {
            {
                let source = MmapSource::open(&path)?;
                if source.is_empty() {
                    stats.empty += 1;
                } else {
                    count_bytes(source.bytes(), delimiter, k, table, stats);
                }
            }
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove partition file {}", path.display()))?;
        }
    }
    Ok(())
}

/// Runs until the queue is exhausted.
pub fn run_worker(queue: &PartitionQueue, k: usize, top_n: usize) -> Result<(TopKTable, WorkerStats)> {
    let mut table = TopKTable::new(top_n);
    let mut stats = WorkerStats::default();
    while let Some((_, partition)) = queue.claim() {
        count_partition(partition, k, &mut table, &mut stats)?;
    }
    Ok((table, stats))
}
