pub const BASES_PER_WORD: usize = 32;

const INVALID: u8 = 4;

/// ASCII to 2-bit code. 0 = A, 1 = C, 2 = G, 3 = T, 4 = anything else.
static CODE_LUT: [u8; 256] = {
    let mut t = [INVALID; 256];
    t[b'A' as usize] = 0;
    t[b'C' as usize] = 1;
    t[b'G' as usize] = 2;
    t[b'T' as usize] = 3;
    t
};

const CODE_TO_BASE: [u8; 4] = [b'A', b'C', b'G', b'T'];

/// `LOW_MASKS[n]` has the low `n` bits set.
pub static LOW_MASKS: [u64; 65] = {
    let mut t = [0u64; 65];
    let mut n = 1;
    while n < 64 {
        t[n] = (1u64 << n) - 1;
        n += 1;
    }
    t[64] = u64::MAX;
    t
};

#[inline(always)]
pub fn encode_base(b: u8) -> Option<u64> {
    let code = CODE_LUT[b as usize];
    if code == INVALID {
        None
    } else {
        Some(code as u64)
    }
}

#[inline(always)]
pub fn decode_base(code: u64) -> u8 {
    CODE_TO_BASE[(code & 0x3) as usize]
}

pub fn is_acgt(seq: &[u8]) -> bool {
    seq.iter().all(|&b| CODE_LUT[b as usize] != INVALID)
}

/// A read packed 2 bits per base, most significant bits first.
///
/// Base `i` lives in word `i / 32` at bit offset `62 - 2 * (i % 32)`. The last
/// word is left-aligned, its unused low bits are zero.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackedSequence {
    words: Vec<u64>,
    len: usize,
}

impl PackedSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Packs `seq`, or returns `None` when it holds anything outside ACGT.
    pub fn encode(seq: &[u8]) -> Option<Self> {
        let mut packed = Self::new();
        if packed.refill(seq) {
            Some(packed)
        } else {
            None
        }
    }

    /// Re-packs `seq` into this buffer, reusing its allocation.
    ///
    /// Returns `false` (leaving the buffer empty) on a non-ACGT byte; the
    /// caller drops the whole record in that case.
    pub fn refill(&mut self, seq: &[u8]) -> bool {
        self.words.clear();
        self.len = 0;
        let mut word = 0u64;
        for (i, &b) in seq.iter().enumerate() {
            let Some(code) = encode_base(b) else {
                self.words.clear();
                return false;
            };
            word = (word << 2) | code;
            if i % BASES_PER_WORD == BASES_PER_WORD - 1 {
                self.words.push(word);
                word = 0;
            }
        }
        let tail = seq.len() % BASES_PER_WORD;
        if tail != 0 {
            self.words.push(word << (2 * (BASES_PER_WORD - tail)));
        }
        self.len = seq.len();
        true
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    #[inline(always)]
    pub fn base(&self, pos: usize) -> u64 {
        let shift = 62 - 2 * (pos % BASES_PER_WORD);
        (self.words[pos / BASES_PER_WORD] >> shift) & 0x3
    }

    /// Integer value of the `m` bases starting at `pos` (`m <= 32`).
    ///
    /// The substring may straddle two words; `pos + m` must not exceed `len`.
    #[inline(always)]
    pub fn substring_value(&self, pos: usize, m: usize) -> u64 {
        debug_assert!(m <= BASES_PER_WORD && pos + m <= self.len);
        let bits = 2 * m;
        let idx = pos / BASES_PER_WORD;
        let offset = 2 * (pos % BASES_PER_WORD);
        if offset + bits <= 64 {
            (self.words[idx] >> (64 - offset - bits)) & LOW_MASKS[bits]
        } else {
            let spill = offset + bits - 64;
            let high = self.words[idx] & LOW_MASKS[64 - offset];
            (high << spill) | (self.words[idx + 1] >> (64 - spill))
        }
    }

    pub fn decode(&self) -> String {
        decode(&self.words, self.len)
    }
}

/// Unpacks the first `len` bases of `words`.
pub fn decode(words: &[u64], len: usize) -> String {
    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        let shift = 62 - 2 * (i % BASES_PER_WORD);
        out.push(decode_base(words[i / BASES_PER_WORD] >> shift));
    }
    // Only ACGT bytes are ever pushed.
    String::from_utf8(out).unwrap_or_default()
}

/// Renders an `m`-base value (as produced by `substring_value`).
pub fn decode_value(mut value: u64, m: usize) -> String {
    let mut buf = vec![b'A'; m];
    for i in (0..m).rev() {
        buf[i] = decode_base(value);
        value >>= 2;
    }
    String::from_utf8_lossy(&buf).to_string()
}
