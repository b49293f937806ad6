use crate::core::codec::PackedSequence;

pub const MAX_MINIMIZER_LEN: usize = 10;

// 2-bit values of the rejected 3-base prefixes.
const PREFIX_AAA: u64 = 0b00_00_00;
const PREFIX_ACA: u64 = 0b00_01_00;

/// Minimizer length used for a k-mer length.
pub fn minimizer_len(k: usize) -> usize {
    if k <= 1 {
        1
    } else {
        (k - 1).min(MAX_MINIMIZER_LEN)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Minimizer {
    pub pos: usize,
    pub value: u64,
    /// `false` when every candidate in the window was excluded and this is
    /// the fallback pick.
    pub valid: bool,
}

/// A maximal run of k-mer start positions sharing one minimizer.
///
/// `first..=last` are k-mer start positions; the bases covered are
/// `first..last + k`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Superkmer {
    pub first: usize,
    pub last: usize,
    pub minimizer: u64,
}

impl Superkmer {
    pub fn kmer_count(&self) -> usize {
        self.last - self.first + 1
    }

    pub fn span(&self, k: usize) -> std::ops::Range<usize> {
        self.first..self.last + k
    }
}

/// Sliding-window minimizer search over packed reads.
#[derive(Clone, Copy, Debug)]
pub struct MinimizerWindow {
    k: usize,
    m: usize,
}

impl MinimizerWindow {
    pub fn new(k: usize, m: usize) -> Self {
        debug_assert!(m >= 1 && m <= k && m <= MAX_MINIMIZER_LEN);
        Self { k, m }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn m(&self) -> usize {
        self.m
    }

    /// Low-complexity filter: rejects an "AAA" or "ACA" prefix, and an "AA"
    /// pair at any offset past the first.
    pub fn is_excluded(&self, value: u64) -> bool {
        let m = self.m;
        if m >= 3 {
            let prefix = value >> (2 * (m - 3));
            if prefix == PREFIX_AAA || prefix == PREFIX_ACA {
                return true;
            }
        }
        let mut v = value;
        for _ in 1..m.saturating_sub(1) {
            if v & 0xf == 0 {
                return true;
            }
            v >>= 2;
        }
        false
    }

    /// Smallest non-excluded m-mer fully inside `[start, end)`.
    ///
    /// Ties go to the leftmost position. If every candidate is excluded the
    /// numerically smallest one is returned with `valid == false`.
    pub fn find_minimizer(&self, seq: &PackedSequence, start: usize, end: usize) -> Minimizer {
        debug_assert!(end >= start + self.m && end <= seq.len());
        let mut best: Option<Minimizer> = None;
        let mut fallback = Minimizer {
            pos: start,
            value: seq.substring_value(start, self.m),
            valid: false,
        };
        for pos in start..=end - self.m {
            let value = seq.substring_value(pos, self.m);
            if self.is_excluded(value) {
                if value < fallback.value {
                    fallback = Minimizer {
                        pos,
                        value,
                        valid: false,
                    };
                }
                continue;
            }
            match best {
                Some(b) if b.value <= value => {}
                _ => {
                    best = Some(Minimizer {
                        pos,
                        value,
                        valid: true,
                    })
                }
            }
        }
        best.unwrap_or(fallback)
    }

    /// Checks only the m-mer ending at `new_end` after a one-base slide.
    ///
    /// Returns it when it should replace `current`: a valid candidate must be
    /// smaller than a valid `current` and always displaces a fallback; an
    /// excluded candidate only displaces a larger fallback.
    pub fn is_new_minimizer(
        &self,
        seq: &PackedSequence,
        new_end: usize,
        current: &Minimizer,
    ) -> Option<Minimizer> {
        let pos = new_end - self.m;
        let value = seq.substring_value(pos, self.m);
        if current.valid && value >= current.value {
            return None;
        }
        let valid = !self.is_excluded(value);
        let replaces = match (current.valid, valid) {
            (_, true) => true,
            (true, false) => false,
            (false, false) => value < current.value,
        };
        replaces.then_some(Minimizer { pos, value, valid })
    }

    /// Superkmer groups of a packed read, in order. Empty when the read is
    /// shorter than k.
    pub fn superkmers<'a>(&'a self, seq: &'a PackedSequence) -> Superkmers<'a> {
        let kmers = (seq.len() + 1).saturating_sub(self.k);
        let current = if kmers > 0 {
            Some(self.find_minimizer(seq, 0, self.k))
        } else {
            None
        };
        Superkmers {
            window: self,
            seq,
            kmers,
            next: 1,
            group_start: 0,
            current,
        }
    }
}

pub struct Superkmers<'a> {
    window: &'a MinimizerWindow,
    seq: &'a PackedSequence,
    kmers: usize,
    next: usize,
    group_start: usize,
    current: Option<Minimizer>,
}

impl Iterator for Superkmers<'_> {
    type Item = Superkmer;

    fn next(&mut self) -> Option<Superkmer> {
        let current = self.current?;
        let k = self.window.k;
        while self.next < self.kmers {
            let i = self.next;
            self.next += 1;
            let replacement = if i > current.pos {
                // Minimizer fell off the left edge: rescan the whole window.
                Some(self.window.find_minimizer(self.seq, i, i + k))
            } else {
                self.window.is_new_minimizer(self.seq, i + k, &current)
            };
            if let Some(next_min) = replacement {
                let group = Superkmer {
                    first: self.group_start,
                    last: i - 1,
                    minimizer: current.value,
                };
                self.group_start = i;
                self.current = Some(next_min);
                return Some(group);
            }
        }
        self.current = None;
        Some(Superkmer {
            first: self.group_start,
            last: self.kmers - 1,
            minimizer: current.value,
        })
    }
}
