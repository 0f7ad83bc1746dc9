use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::{Anchor, AnchorSearch};

/// Reports every exact q-gram match between consensus and read
///
/// Q-grams occurring more than `max_occurrences` times in the consensus are ignored, these
/// mostly produce spurious anchors in repetitive sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QGramAnchorSearch {
    k: usize,
    max_occurrences: usize,
}

impl QGramAnchorSearch {
    pub fn new(k: usize) -> Self {
        Self::with_max_occurrences(k, 16)
    }

    pub fn with_max_occurrences(k: usize, max_occurrences: usize) -> Self {
        QGramAnchorSearch {
            k: k.max(1),
            max_occurrences,
        }
    }

    #[inline(always)]
    pub fn k(&self) -> usize {
        self.k
    }
}

impl Default for QGramAnchorSearch {
    fn default() -> Self {
        Self::new(6)
    }
}

impl AnchorSearch for QGramAnchorSearch {
    fn find_anchors(&self, consensus: &[u8], read: &[u8]) -> Vec<Anchor> {
        if consensus.len() < self.k || read.len() < self.k {
            return Vec::new();
        }

        let mut index: FxHashMap<&[u8], SmallVec<[usize; 2]>> = FxHashMap::default();
        for (pos, qgram) in consensus.windows(self.k).enumerate() {
            index.entry(qgram).or_default().push(pos);
        }

        read.windows(self.k)
            .enumerate()
            .filter_map(|(read_pos, qgram)| index.get(qgram).map(|hits| (read_pos, hits)))
            .filter(|(_, hits)| hits.len() <= self.max_occurrences)
            .flat_map(|(read_pos, hits)| hits.iter().map(move |c| Anchor::new(*c, read_pos)))
            .collect()
    }

    fn anchor_len(&self) -> usize {
        self.k
    }
}
