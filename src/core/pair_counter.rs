//! Adjacent-pair statistics over a corpus of id sequences.

use std::cmp::Reverse;

use rustc_hash::{FxHashMap, FxHashSet};

use super::heap::nlargest;

/// Statistics for one adjacent pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PairCount {
    /// Number of documents the pair appears in at least once.
    pub documents: u64,
    /// Total number of adjacent occurrences across the corpus.
    pub occurrences: u64,
}

/// Packs both 32-bit ids of a pair into one 64-bit map key; stable across a
/// fit and the queries that follow it.
#[inline]
fn pack(pair: (u32, u32)) -> u64 {
    (u64::from(pair.0) << 32) | u64::from(pair.1)
}

#[inline]
fn unpack(key: u64) -> (u32, u32) {
    ((key >> 32) as u32, key as u32)
}

/// Counts every adjacent `(a, b)` pair in a corpus, tracking both total
/// occurrences and the number of documents containing the pair.
#[derive(Debug, Clone, Default)]
pub struct PairCounter {
    counts: FxHashMap<u64, PairCount>,
}

impl PairCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_doc(doc: &[u32]) -> Self {
        let mut counter = Self::new();
        counter.update(doc);
        counter
    }

    pub fn from_corpus(corpus: &[Vec<u32>]) -> Self {
        let mut counter = Self::new();
        for doc in corpus {
            counter.update(doc);
        }
        counter
    }

    /// Fold one document into the statistics. Documents shorter than two
    /// elements contribute nothing.
    pub fn update(&mut self, doc: &[u32]) {
        for window in doc.windows(2) {
            let key = pack((window[0], window[1]));
            self.counts.entry(key).or_default().occurrences += 1;
        }

        let distinct: FxHashSet<u64> = doc
            .windows(2)
            .map(|window| pack((window[0], window[1])))
            .collect();
        for key in distinct {
            self.counts.entry(key).or_default().documents += 1;
        }
    }

    /// Counts for `pair`; zeros if the pair never occurred.
    pub fn get(&self, pair: (u32, u32)) -> PairCount {
        self.counts.get(&pack(pair)).copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// The `n` most frequent pairs with their occurrence counts.
    ///
    /// Ordered by the compound key `(occurrences, -documents)` descending,
    /// so equal occurrence counts rank the pair seen in fewer documents
    /// first; any remaining tie goes to the smaller pair tuple. Candidate
    /// selection downstream is sensitive to this exact ordering.
    pub fn most_common(&self, n: usize) -> Vec<((u32, u32), u64)> {
        let data: Vec<((u32, u32), PairCount)> = self
            .counts
            .iter()
            .map(|(&key, &count)| (unpack(key), count))
            .collect();
        let top = nlargest(data, n, |&(pair, count)| {
            (count.occurrences, Reverse(count.documents), Reverse(pair))
        });
        top.into_iter()
            .map(|(pair, count)| (pair, count.occurrences))
            .collect()
    }
}
