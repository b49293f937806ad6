//! First pass: per-minimizer statistics used to decide which superkmers are
//! worth counting.

use crate::core::codec::PackedSequence;
use crate::core::io::ReadSource;
use crate::core::minimizer::{MinimizerWindow, Superkmer};
use crate::core::params::Params;
use anyhow::Result;

/// Three statistics per minimizer value, indexed by the value itself.
#[derive(Clone, Debug)]
pub struct Histogram {
    /// Sum of 1/g over superkmer groups of size g.
    pub div: Vec<f64>,
    /// Sum of g.
    pub fac: Vec<u64>,
    /// Number of groups.
    pub sum: Vec<u64>,
}

impl Histogram {
    pub fn new(space: usize) -> Self {
        Self {
            div: vec![0.0; space],
            fac: vec![0; space],
            sum: vec![0; space],
        }
    }

    pub fn len(&self) -> usize {
        self.sum.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sum.is_empty()
    }

    pub fn add_group(&mut self, group: &Superkmer) {
        let idx = group.minimizer as usize;
        let g = group.kmer_count();
        self.div[idx] += 1.0 / g as f64;
        self.fac[idx] += g as u64;
        self.sum[idx] += 1;
    }

    /// Values found at rank `depth` of each statistic sorted descending.
    pub fn thresholds(&self, depth: usize) -> Thresholds {
        let depth = depth.min(self.len().saturating_sub(1));

        let mut div = self.div.clone();
        div.sort_unstable_by(|a, b| b.total_cmp(a));
        let mut fac = self.fac.clone();
        fac.sort_unstable_by(|a, b| b.cmp(a));
        let mut sum = self.sum.clone();
        sum.sort_unstable_by(|a, b| b.cmp(a));

        Thresholds {
            div: div.get(depth).copied().unwrap_or(0.0),
            fac: fac.get(depth).copied().unwrap_or(0),
            sum: sum.get(depth).copied().unwrap_or(0),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Thresholds {
    pub div: f64,
    pub fac: u64,
    pub sum: u64,
}

/// Admission test for the partitioning pass. Read-only view of a finished
/// histogram.
#[derive(Clone, Copy, Debug)]
pub struct AdmissionFilter<'a> {
    histogram: &'a Histogram,
    thresholds: Thresholds,
}

impl<'a> AdmissionFilter<'a> {
    pub fn new(histogram: &'a Histogram, thresholds: Thresholds) -> Self {
        Self {
            histogram,
            thresholds,
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// A minimizer only has to stand out on one of the three rankings.
    #[inline]
    pub fn admits(&self, minimizer: u64) -> bool {
        let idx = minimizer as usize;
        self.histogram.div[idx] > self.thresholds.div
            || self.histogram.fac[idx] > self.thresholds.fac
            || self.histogram.sum[idx] > self.thresholds.sum
    }
}

#[derive(Clone, Debug, Default)]
pub struct HistogramStats {
    pub records: u64,
    pub sampled: u64,
    pub malformed: u64,
    pub short: u64,
    pub groups: u64,
}

/// Builds the histogram from every `sample_stride`-th eligible record.
///
/// Records whose sequence is not pure ACGT are dropped without advancing the
/// sampling stride.
pub fn build(source: &ReadSource, params: &Params) -> Result<(Histogram, HistogramStats)> {
    let window = MinimizerWindow::new(params.k, params.m);
    let mut histogram = Histogram::new(params.minimizer_space());
    let mut stats = HistogramStats::default();
    let mut packed = PackedSequence::new();
    let mut to_skip = 0usize;

    let records = source.for_each_sequence(|seq| {
        if to_skip > 0 {
            to_skip -= 1;
            return Ok(());
        }
        if !packed.refill(seq) {
            stats.malformed += 1;
            return Ok(());
        }
        to_skip = params.sample_stride.saturating_sub(1);
        stats.sampled += 1;
        if seq.len() < params.k {
            stats.short += 1;
            return Ok(());
        }
        for group in window.superkmers(&packed) {
            histogram.add_group(&group);
            stats.groups += 1;
        }
        Ok(())
    })?;
    stats.records = records;

    Ok((histogram, stats))
}
