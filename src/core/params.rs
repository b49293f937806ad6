use crate::core::minimizer::minimizer_len;
use anyhow::{Result, bail};

pub const MIN_K: usize = 3;
pub const MAX_K: usize = 90;
pub const PARTITIONS: usize = 256;

// Input size tiers for the adaptive policy.
pub const FILTER_FILE_SIZE: u64 = 500_000_000;
pub const BIG_FILE_SIZE: u64 = 10_000_000_000;
// Beyond this many requested entries, partitions spill to disk on large inputs.
pub const DISK_TOP_N: usize = 1000;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StorageMode {
    Ram,
    Disk,
}

impl StorageMode {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageMode::Ram => "ram",
            StorageMode::Disk => "disk",
        }
    }
}

/// Run parameters, fixed once the engine is constructed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Params {
    pub k: usize,
    pub m: usize,
    pub top_n: usize,
    pub partitions: usize,
    pub threads: usize,
    /// Rank in the sorted histograms that sets the admission thresholds.
    pub max_depth_search: usize,
    /// Every `sample_stride`-th eligible record feeds the histogram.
    pub sample_stride: usize,
    pub storage: StorageMode,
}

impl Params {
    /// Adaptive policy. The size tiers and multipliers are heuristics carried
    /// over as-is; no tuning is implied.
    pub fn derive(file_size: u64, k: usize, top_n: usize, threads: usize) -> Result<Self> {
        if !(MIN_K..=MAX_K).contains(&k) {
            bail!("k-mer size {k} is outside the allowed range {MIN_K}-{MAX_K}");
        }
        if top_n < 1 {
            bail!("top count must be at least 1");
        }
        if threads < 1 {
            bail!("thread count must be at least 1");
        }

        let m = minimizer_len(k);
        let depth_limit = minimizer_space(m) - 1;

        let mut max_depth_search;
        let mut sample_stride = 10;
        let mut storage = StorageMode::Ram;

        if file_size < FILTER_FILE_SIZE {
            max_depth_search = depth_limit;
        } else {
            max_depth_search = if top_n < 25 { 50 } else { top_n.saturating_mul(2) };
            if top_n > DISK_TOP_N {
                storage = StorageMode::Disk;
                max_depth_search = top_n.saturating_mul(2);
            }
        }
        if file_size > BIG_FILE_SIZE {
            max_depth_search = top_n.saturating_mul(4);
            sample_stride = 5;
            storage = if top_n > DISK_TOP_N {
                StorageMode::Disk
            } else {
                StorageMode::Ram
            };
        }

        Ok(Self {
            k,
            m,
            top_n,
            partitions: PARTITIONS,
            threads,
            max_depth_search: max_depth_search.min(depth_limit),
            sample_stride,
            storage,
        })
    }

    /// Number of distinct minimizer values, 4^m.
    pub fn minimizer_space(&self) -> usize {
        minimizer_space(self.m)
    }
}

pub fn minimizer_space(m: usize) -> usize {
    1usize << (2 * m)
}
