//! Second pass: route admitted superkmers into partitions keyed by
//! `minimizer % partitions`, held either in RAM buffers or in scratch files.

use crate::core::codec::PackedSequence;
use crate::core::histogram::AdmissionFilter;
use crate::core::io::ReadSource;
use crate::core::minimizer::{MinimizerWindow, Superkmer};
use crate::core::params::Params;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

pub const BUFFER_INCREMENT: usize = 2_000_000;
pub const DELIMITER: u8 = b'_';
pub const SCRATCH_DIR_NAME: &str = "temp";
const DISK_WRITE_BUF: usize = 64 * 1024;

/// Superkmers of one RAM partition, each followed by [`DELIMITER`].
///
/// Capacity grows in fixed [`BUFFER_INCREMENT`] steps and is never released
/// until the buffer is dropped.
#[derive(Clone, Debug, Default)]
pub struct PartitionBuffer {
    data: Vec<u8>,
    allocated: usize,
    growths: u32,
}

impl PartitionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_superkmer(&mut self, superkmer: &[u8]) {
        let needed = self.data.len() + superkmer.len() + 1;
        if needed > self.allocated {
            while needed > self.allocated {
                self.allocated += BUFFER_INCREMENT;
                self.growths += 1;
            }
            self.data.reserve_exact(self.allocated - self.data.len());
        }
        self.data.extend_from_slice(superkmer);
        self.data.push(DELIMITER);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn allocated(&self) -> usize {
        self.allocated
    }

    pub fn growths(&self) -> u32 {
        self.growths
    }
}

/// Finished partition, ready to be claimed by a counting worker.
#[derive(Debug)]
pub enum Partition {
    Memory(PartitionBuffer),
    /// One superkmer per line.
    Disk(PathBuf),
}

impl Partition {
    pub fn delimiter(&self) -> u8 {
        match self {
            Partition::Memory(_) => DELIMITER,
            Partition::Disk(_) => b'\n',
        }
    }
}

/// Destination of the partitioning pass.
pub trait PartitionSink {
    fn append(&mut self, partition: usize, superkmer: &[u8]) -> Result<()>;

    fn finish(self) -> Result<Vec<Partition>>;
}

pub struct RamPartitions {
    buffers: Vec<PartitionBuffer>,
}

impl RamPartitions {
    pub fn new(partitions: usize) -> Self {
        Self {
            buffers: (0..partitions).map(|_| PartitionBuffer::new()).collect(),
        }
    }

    pub fn buffers(&self) -> &[PartitionBuffer] {
        &self.buffers
    }

    pub fn growths(&self) -> u64 {
        self.buffers.iter().map(|b| b.growths() as u64).sum()
    }
}

impl PartitionSink for RamPartitions {
    fn append(&mut self, partition: usize, superkmer: &[u8]) -> Result<()> {
        self.buffers[partition].push_superkmer(superkmer);
        Ok(())
    }

    fn finish(self) -> Result<Vec<Partition>> {
        Ok(self.buffers.into_iter().map(Partition::Memory).collect())
    }
}

/// Scratch directory for disk partitions, removed recursively on drop.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Creates `<root>/temp`. An empty leftover directory is reused; a
    /// non-empty one is never touched and fails the run.
    pub fn create(root: &Path) -> Result<Self> {
        let path = root.join(SCRATCH_DIR_NAME);
        fs::create_dir_all(root)
            .with_context(|| format!("failed to create scratch root {}", root.display()))?;
        // Only succeeds on an empty directory.
        let _ = fs::remove_dir(&path);
        fs::create_dir(&path).with_context(|| {
            format!(
                "failed to create scratch directory {} (remove it if a previous run left it behind)",
                path.display()
            )
        })?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn partition_path(&self, id: usize) -> PathBuf {
        self.path.join(format!("kmer{id}.txt"))
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_dir_all(&self.path) {
            eprintln!(
                "warning: failed to remove scratch directory {}: {err}",
                self.path.display()
            );
        }
    }
}

pub struct DiskPartitions {
    writers: Vec<BufWriter<File>>,
    paths: Vec<PathBuf>,
}

impl DiskPartitions {
    pub fn create(scratch: &ScratchDir, partitions: usize) -> Result<Self> {
        let mut writers = Vec::with_capacity(partitions);
        let mut paths = Vec::with_capacity(partitions);
        for id in 0..partitions {
            let path = scratch.partition_path(id);
            let file = File::create(&path)
                .with_context(|| format!("failed to create partition file {}", path.display()))?;
            writers.push(BufWriter::with_capacity(DISK_WRITE_BUF, file));
            paths.push(path);
        }
        Ok(Self { writers, paths })
    }
}

impl PartitionSink for DiskPartitions {
    fn append(&mut self, partition: usize, superkmer: &[u8]) -> Result<()> {
        let w = &mut self.writers[partition];
        w.write_all(superkmer)
            .and_then(|_| w.write_all(b"\n"))
            .with_context(|| {
                format!(
                    "failed to write partition file {}",
                    self.paths[partition].display()
                )
            })
    }

    fn finish(self) -> Result<Vec<Partition>> {
        for (mut w, path) in self.writers.into_iter().zip(&self.paths) {
            w.flush()
                .with_context(|| format!("failed to flush partition file {}", path.display()))?;
        }
        Ok(self.paths.into_iter().map(Partition::Disk).collect())
    }
}

#[derive(Clone, Debug, Default)]
pub struct PartitionStats {
    pub records: u64,
    pub malformed: u64,
    pub short: u64,
    pub admitted: u64,
    pub rejected: u64,
    pub bytes: u64,
}

/// Streams every record, splits it into superkmers and appends the admitted
/// ones to `sink`.
///
/// Adjacent groups that share a minimizer (a rescan after expiry found the
/// same value) are written as a single superkmer.
pub fn partition_reads<S: PartitionSink>(
    source: &ReadSource,
    params: &Params,
    filter: &AdmissionFilter<'_>,
    sink: &mut S,
) -> Result<PartitionStats> {
    let window = MinimizerWindow::new(params.k, params.m);
    let partitions = params.partitions as u64;
    let k = params.k;
    let mut stats = PartitionStats::default();
    let mut packed = PackedSequence::new();

    let mut emit = |seq: &[u8], group: Superkmer, stats: &mut PartitionStats| -> Result<()> {
        if !filter.admits(group.minimizer) {
            stats.rejected += 1;
            return Ok(());
        }
        let bytes = &seq[group.span(k)];
        sink.append((group.minimizer % partitions) as usize, bytes)?;
        stats.admitted += 1;
        stats.bytes += bytes.len() as u64 + 1;
        Ok(())
    };

    let records = source.for_each_sequence(|seq| {
        if !packed.refill(seq) {
            stats.malformed += 1;
            return Ok(());
        }
        if seq.len() < k {
            stats.short += 1;
            return Ok(());
        }
        let mut pending: Option<Superkmer> = None;
        for group in window.superkmers(&packed) {
            if let Some(p) = pending.as_mut() {
                if p.minimizer == group.minimizer && p.last + 1 == group.first {
                    p.last = group.last;
                    continue;
                }
            }
            if let Some(done) = pending.replace(group) {
                emit(seq, done, &mut stats)?;
            }
        }
        if let Some(done) = pending {
            emit(seq, done, &mut stats)?;
        }
        Ok(())
    })?;
    stats.records = records;

    Ok(stats)
}

/// Hands out each partition exactly once across worker threads.
///
/// Ids are claimed through an atomic cursor; the claimed partition is moved
/// out of its slot, so the claiming thread owns it outright.
pub struct PartitionQueue {
    next: AtomicUsize,
    slots: Vec<Mutex<Option<Partition>>>,
}

impl PartitionQueue {
    pub fn new(partitions: Vec<Partition>) -> Self {
        Self {
            next: AtomicUsize::new(0),
            slots: partitions.into_iter().map(|p| Mutex::new(Some(p))).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn claim(&self) -> Option<(usize, Partition)> {
        loop {
            let id = self.next.fetch_add(1, Ordering::Relaxed);
            if id >= self.slots.len() {
                return None;
            }
            if let Some(partition) = self.slots[id].lock().take() {
                return Some((id, partition));
            }
        }
    }
}
