use crate::core::counter::{self, WorkerStats};
use crate::core::histogram::{self, AdmissionFilter, HistogramStats, Thresholds};
use crate::core::io::{self, ReadSource};
use crate::core::params::{Params, StorageMode};
use crate::core::partition::{
    self, DiskPartitions, Partition, PartitionQueue, PartitionStats, PartitionSink,
    RamPartitions, ScratchDir,
};
use crate::core::stats::{fmt_dur, log_stage, stats_enabled};
use crate::core::topk::{self, TopKEntry, TopKTable};
use anyhow::{Context, Result, anyhow};
use crossbeam_channel as channel;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

/// Caller overrides on top of the adaptive parameters.
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub threads: Option<usize>,
    /// Forces RAM or disk partitions; thresholds and sampling are unchanged.
    pub storage: Option<StorageMode>,
    /// Disk mode writes its partitions under `<scratch_root>/temp`.
    pub scratch_root: PathBuf,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            threads: None,
            storage: None,
            scratch_root: PathBuf::from("."),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RunReport {
    pub histogram: HistogramStats,
    pub thresholds: Option<Thresholds>,
    pub partition: PartitionStats,
    pub buffer_growths: u64,
    pub workers: Vec<WorkerStats>,
}

pub struct Engine {
    path: PathBuf,
    file_size: u64,
    params: Params,
    scratch_root: PathBuf,
    table: Option<TopKTable>,
    report: RunReport,
}

impl Engine {
    pub fn new(path: impl AsRef<Path>, k: usize, top_n: usize) -> Result<Self> {
        Self::with_options(path, k, top_n, RunOptions::default())
    }

    /// Validates k and N, sizes the input once and fixes the run parameters.
    pub fn with_options(
        path: impl AsRef<Path>,
        k: usize,
        top_n: usize,
        options: RunOptions,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file_size = io::file_size(&path)?;
        let threads = options.threads.unwrap_or_else(num_cpus::get);
        let mut params = Params::derive(file_size, k, top_n, threads)
            .with_context(|| "invalid run configuration")?;
        if let Some(storage) = options.storage {
            params.storage = storage;
        }
        Ok(Self {
            path,
            file_size,
            params,
            scratch_root: options.scratch_root,
            table: None,
            report: RunReport::default(),
        })
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    /// Final merged table, sentinels included. `None` before `run`.
    pub fn table(&self) -> Option<&TopKTable> {
        self.table.as_ref()
    }

    /// Up to N (k-mer, count) pairs, highest count first. Empty before `run`.
    pub fn results(&self) -> Vec<TopKEntry> {
        self.table
            .as_ref()
            .map(|t| t.clone().into_ranked())
            .unwrap_or_default()
    }

    pub fn run(&mut self) -> Result<()> {
        let stats = stats_enabled();
        let t_total = Instant::now();
        let params = self.params.clone();
        if stats {
            eprintln!(
                "KMER_TOP_STATS input={} bytes={} k={} m={} top={} threads={} depth={} stride={} storage={}",
                self.path.display(),
                self.file_size,
                params.k,
                params.m,
                params.top_n,
                params.threads,
                params.max_depth_search,
                params.sample_stride,
                params.storage.as_str()
            );
        }

        let t_open = Instant::now();
        let source = ReadSource::open(&self.path, params.threads)?;
        log_stage(stats, "engine.input_open", t_open);

        let t_hist = Instant::now();
        let (histogram, hist_stats) = histogram::build(&source, &params)
            .with_context(|| format!("histogram pass over {} failed", self.path.display()))?;
        log_stage(stats, "engine.histogram", t_hist);

        let t_sort = Instant::now();
        let thresholds = histogram.thresholds(params.max_depth_search);
        let filter = AdmissionFilter::new(&histogram, thresholds);
        log_stage(stats, "engine.thresholds", t_sort);
        if stats {
            eprintln!(
                "KMER_TOP_STATS histogram.records={} histogram.sampled={} histogram.malformed={} histogram.short={} histogram.groups={}",
                hist_stats.records,
                hist_stats.sampled,
                hist_stats.malformed,
                hist_stats.short,
                hist_stats.groups
            );
            eprintln!(
                "KMER_TOP_STATS thresholds.div={:.4} thresholds.fac={} thresholds.sum={}",
                thresholds.div, thresholds.fac, thresholds.sum
            );
        }

        let t_part = Instant::now();
        let mut buffer_growths = 0u64;
        let mut scratch: Option<ScratchDir> = None;
        let (partitions, part_stats) = match params.storage {
            StorageMode::Ram => {
                let mut sink = RamPartitions::new(params.partitions);
                let part_stats = partition::partition_reads(&source, &params, &filter, &mut sink)
                    .with_context(|| {
                        format!("partitioning pass over {} failed", self.path.display())
                    })?;
                buffer_growths = sink.growths();
                (sink.finish()?, part_stats)
            }
            StorageMode::Disk => {
                let dir = ScratchDir::create(&self.scratch_root)?;
                let mut sink = DiskPartitions::create(&dir, params.partitions)?;
                scratch = Some(dir);
                let part_stats = partition::partition_reads(&source, &params, &filter, &mut sink)
                    .with_context(|| {
                        format!("partitioning pass over {} failed", self.path.display())
                    })?;
                (sink.finish()?, part_stats)
            }
        };
        drop(histogram);
        drop(source);
        log_stage(stats, "engine.partition", t_part);
        if stats {
            eprintln!(
                "KMER_TOP_STATS partition.records={} partition.malformed={} partition.admitted={} partition.rejected={} partition.bytes={} partition.growths={}",
                part_stats.records,
                part_stats.malformed,
                part_stats.admitted,
                part_stats.rejected,
                part_stats.bytes,
                buffer_growths
            );
        }

        let t_count = Instant::now();
        let outputs = count_partitions(partitions, &params)?;
        log_stage(stats, "engine.count", t_count);
        if let Some(dir) = scratch.take() {
            let t_clean = Instant::now();
            drop(dir);
            log_stage(stats, "engine.cleanup", t_clean);
        }

        let t_merge = Instant::now();
        let mut tables = Vec::with_capacity(outputs.len());
        let mut workers = Vec::with_capacity(outputs.len());
        for (table, worker) in outputs {
            tables.push(table);
            workers.push(worker);
        }
        let merged = topk::merge_tables(tables).ok_or_else(|| anyhow!("no worker results"))?;
        log_stage(stats, "engine.merge", t_merge);

        if stats {
            let mut total = WorkerStats::default();
            for w in &workers {
                total += w;
            }
            eprintln!(
                "KMER_TOP_STATS worker.partitions={} worker.empty={} worker.bytes={} worker.kmers={} worker.distinct={}",
                total.partitions, total.empty, total.bytes, total.kmers, total.distinct
            );
            eprintln!("KMER_TOP_STATS total={}", fmt_dur(t_total.elapsed()));
        }

        self.table = Some(merged);
        self.report = RunReport {
            histogram: hist_stats,
            thresholds: Some(thresholds),
            partition: part_stats,
            buffer_growths,
            workers,
        };
        Ok(())
    }
}

/// Runs `params.threads` workers over a shared claim queue and gathers their
/// tables. The first worker error aborts the phase.
fn count_partitions(
    partitions: Vec<Partition>,
    params: &Params,
) -> Result<Vec<(TopKTable, WorkerStats)>> {
    let queue = PartitionQueue::new(partitions);
    let (result_tx, result_rx) = channel::unbounded::<Result<(TopKTable, WorkerStats)>>();
    thread::scope(|scope| {
        for _ in 0..params.threads {
            let tx = result_tx.clone();
            let queue = &queue;
            scope.spawn(move || {
                let _ = tx.send(counter::run_worker(queue, params.k, params.top_n));
            });
        }
    });
    drop(result_tx);

    let mut outputs = Vec::with_capacity(params.threads);
    for result in result_rx.iter() {
        outputs.push(result.with_context(|| "partition counting failed")?);
    }
    Ok(outputs)
}
