//! Sparse dynamic programming over anchors

use super::Anchor;

/// Number of preceding anchors considered as chain predecessor
pub const MAX_LOOKBACK: usize = 64;

/// Find the highest scoring chain of anchors, strictly increasing in both consensus and read
/// position.
///
/// Each anchor contributes `anchor_score`, linking two anchors costs the difference of their
/// diagonals. Ties are resolved in favour of the earliest anchor.
pub fn chain_anchors(anchors: &[Anchor], anchor_score: i64) -> Vec<Anchor> {
    let mut sorted = anchors.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    if sorted.is_empty() {
        return sorted;
    }

    let mut scores = vec![anchor_score; sorted.len()];
    let mut back: Vec<Option<usize>> = vec![None; sorted.len()];

    for i in 1..sorted.len() {
        let curr = sorted[i];

        for j in i.saturating_sub(MAX_LOOKBACK)..i {
            let prev = sorted[j];
            if prev.consensus_pos >= curr.consensus_pos || prev.read_pos >= curr.read_pos {
                continue;
            }

            let drift = (curr.diagonal() - prev.diagonal()).abs();
            let score = scores[j] + anchor_score - drift;

            if score > scores[i] {
                scores[i] = score;
                back[i] = Some(j);
            }
        }
    }

    let mut best = 0;
    for i in 1..sorted.len() {
        if scores[i] > scores[best] {
            best = i;
        }
    }

    let mut chain = vec![sorted[best]];
    let mut curr = best;
    while let Some(prev) = back[curr] {
        chain.push(sorted[prev]);
        curr = prev;
    }

    chain.reverse();
    chain
}
