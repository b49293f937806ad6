use std::cmp::Reverse;
use std::collections::BinaryHeap;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TopKEntry {
    pub count: i64,
    pub kmer: String,
}

impl TopKEntry {
    /// Placeholder slots have non-positive counts and no k-mer.
    pub fn is_sentinel(&self) -> bool {
        self.count <= 0
    }
}

/// Bounded table that always holds exactly `capacity` entries.
///
/// Starts filled with sentinels counting -1, -2, ..., so any real count
/// displaces one without an empty-table special case.
#[derive(Clone, Debug)]
pub struct TopKTable {
    heap: BinaryHeap<Reverse<TopKEntry>>,
    capacity: usize,
}

impl TopKTable {
    pub fn new(capacity: usize) -> Self {
        let mut heap = BinaryHeap::with_capacity(capacity);
        for i in 0..capacity {
            heap.push(Reverse(TopKEntry {
                count: -(i as i64) - 1,
                kmer: String::new(),
            }));
        }
        Self { heap, capacity }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn min_count(&self) -> Option<i64> {
        self.heap.peek().map(|Reverse(e)| e.count)
    }

    /// Replace-minimum rule: `count` takes the minimum's slot only when it is
    /// strictly larger. The k-mer is copied only on insertion.
    pub fn offer(&mut self, count: i64, kmer: &[u8]) -> bool {
        match self.min_count() {
            Some(min) if count > min => {
                self.replace_min(TopKEntry {
                    count,
                    kmer: String::from_utf8_lossy(kmer).into_owned(),
                });
                true
            }
            _ => false,
        }
    }

    pub fn offer_entry(&mut self, entry: TopKEntry) -> bool {
        match self.min_count() {
            Some(min) if entry.count > min => {
                self.replace_min(entry);
                true
            }
            _ => false,
        }
    }

    fn replace_min(&mut self, entry: TopKEntry) {
        if let Some(mut min) = self.heap.peek_mut() {
            *min = Reverse(entry);
        }
    }

    /// Folds every entry of `other` into this table.
    pub fn merge(&mut self, other: TopKTable) {
        for Reverse(entry) in other.heap.into_vec() {
            self.offer_entry(entry);
        }
    }

    /// All slots, sentinels included, ranked.
    pub fn entries(&self) -> Vec<TopKEntry> {
        let mut entries: Vec<TopKEntry> = self.heap.iter().map(|Reverse(e)| e.clone()).collect();
        rank(&mut entries);
        entries
    }

    /// Real entries only, ranked by count descending, then k-mer.
    pub fn into_ranked(self) -> Vec<TopKEntry> {
        let mut entries: Vec<TopKEntry> = self
            .heap
            .into_vec()
            .into_iter()
            .map(|Reverse(e)| e)
            .filter(|e| !e.is_sentinel())
            .collect();
        rank(&mut entries);
        entries
    }
}

fn rank(entries: &mut [TopKEntry]) {
    entries.sort_unstable_by(|a, b| b.count.cmp(&a.count).then_with(|| a.kmer.cmp(&b.kmer)));
}

/// Reduces per-thread tables into the first one.
///
/// The surviving set is order independent except for ties at the boundary,
/// which depend on the order tables arrive in.
pub fn merge_tables(tables: Vec<TopKTable>) -> Option<TopKTable> {
    let mut iter = tables.into_iter();
    let mut merged = iter.next()?;
    for table in iter {
        merged.merge(table);
    }
    Some(merged)
}
