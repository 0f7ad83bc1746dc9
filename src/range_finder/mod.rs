//! Restrict the alignment DP to a band around anchors between the read and the current consensus

pub mod qgram;
pub mod sdp;

use std::cmp::min;

use rustc_hash::FxHashMap;
use tracing::{debug, debug_span};

use crate::errors::PoaError;
use crate::graph::poa::{GraphStamp, IndexType, PoaGraph, VertexIndex};
use crate::interval::{range_union, Interval};

pub use qgram::QGramAnchorSearch;

pub const DEFAULT_BAND_WIDTH: usize = 30;

/// Exact match between consensus and read, starting at the given positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Anchor {
    pub consensus_pos: usize,
    pub read_pos: usize,
}

impl Anchor {
    pub fn new(consensus_pos: usize, read_pos: usize) -> Self {
        Anchor { consensus_pos, read_pos }
    }

    #[inline(always)]
    pub fn diagonal(&self) -> i64 {
        self.consensus_pos as i64 - self.read_pos as i64
    }
}

/// Strategy to find anchors between the consensus sequence and a read
pub trait AnchorSearch: Send + Sync {
    fn find_anchors(&self, consensus: &[u8], read: &[u8]) -> Vec<Anchor>;

    /// Number of bases covered by each anchor
    fn anchor_len(&self) -> usize {
        1
    }
}

#[derive(Debug)]
struct BandState<Ix>
where
    Ix: IndexType,
{
    stamp: GraphStamp,
    read: Vec<u8>,
    ranges: FxHashMap<VertexIndex<Ix>, Interval>,
    num_anchors: usize,
}

/// Computes for each graph vertex the read positions (DP rows) worth evaluating
pub struct RangeFinder<Ix = u32>
where
    Ix: IndexType,
{
    anchor_search: Box<dyn AnchorSearch>,
    width: usize,
    state: Option<BandState<Ix>>,
}

impl<Ix> RangeFinder<Ix>
where
    Ix: IndexType,
{
    pub fn new(anchor_search: impl AnchorSearch + 'static) -> Self {
        Self::with_width(anchor_search, DEFAULT_BAND_WIDTH)
    }

    pub fn with_width(anchor_search: impl AnchorSearch + 'static, width: usize) -> Self {
        RangeFinder {
            anchor_search: Box::new(anchor_search),
            width,
            state: None,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of chained anchors found by the last call to [`RangeFinder::init`]
    pub fn num_anchors(&self) -> usize {
        self.state.as_ref()
            .map(|s| s.num_anchors)
            .unwrap_or(0)
    }

    /// Compute the bands for a read against the given graph snapshot
    ///
    /// Anchors between the consensus and the read are chained, and each chained anchor fixes the
    /// rows of its consensus vertices to `width` positions around the anchor. All other vertices
    /// inherit the hull of their neighbours' rows, stepped by one position, from a forward pass
    /// (predecessors) and a backward pass (successors).
    pub fn init(
        &mut self,
        graph: &PoaGraph<Ix>,
        consensus_path: &[VertexIndex<Ix>],
        consensus_sequence: &[u8],
        read: &[u8],
    ) {
        let span = debug_span!("range_finder_init", read_len = read.len());
        let _enter = span.enter();

        let anchors = self.anchor_search.find_anchors(consensus_sequence, read);
        let chained = sdp::chain_anchors(&anchors, self.anchor_search.anchor_len() as i64);

        debug!("Found {} anchors, {} chained", anchors.len(), chained.len());

        let ranges = if chained.is_empty() {
            FxHashMap::default()
        } else {
            self.compute_ranges(graph, consensus_path, &chained, read.len())
        };

        self.state = Some(BandState {
            stamp: graph.stamp(),
            read: read.to_vec(),
            ranges,
            num_anchors: chained.len(),
        });
    }

    fn compute_ranges(
        &self,
        graph: &PoaGraph<Ix>,
        consensus_path: &[VertexIndex<Ix>],
        chained: &[Anchor],
        read_len: usize,
    ) -> FxHashMap<VertexIndex<Ix>, Interval> {
        let upper = read_len + 1;
        let anchor_len = self.anchor_search.anchor_len();

        // Row `r + 1` of a vertex holds the alignment of read position `r` to that vertex
        let mut direct: FxHashMap<VertexIndex<Ix>, Interval> = FxHashMap::default();
        for anchor in chained {
            for offset in 0..anchor_len {
                let (cpos, rpos) = (anchor.consensus_pos + offset, anchor.read_pos + offset);
                if cpos >= consensus_path.len() || rpos >= read_len {
                    break;
                }

                let row = rpos + 1;
                let ival = Interval::new(row.saturating_sub(self.width), min(row + self.width + 1, upper));
                direct.entry(consensus_path[cpos])
                    .and_modify(|existing| *existing = existing.union(&ival))
                    .or_insert(ival);
            }
        }

        let order = graph.topological_order();

        let mut forward: FxHashMap<VertexIndex<Ix>, Interval> = FxHashMap::default();
        forward.insert(graph.enter_vertex(), Interval::new(0, 1));
        for &v in order.iter().skip(1) {
            let ival = direct.get(&v).copied().unwrap_or_else(|| {
                range_union(graph.predecessors(v).filter_map(|p| forward.get(&p)))
                    .next(upper)
            });

            forward.insert(v, ival);
        }

        let mut backward: FxHashMap<VertexIndex<Ix>, Interval> = FxHashMap::default();
        backward.insert(graph.exit_vertex(), Interval::new(read_len, upper));
        for &v in order.iter().rev().skip(1) {
            let ival = direct.get(&v).copied().unwrap_or_else(|| {
                range_union(graph.successors(v).filter_map(|s| backward.get(&s)))
                    .prev(0)
            });

            backward.insert(v, ival);
        }

        order.iter()
            .map(|v| {
                let fwd = forward.get(v).copied().unwrap_or_default();
                let bwd = backward.get(v).copied().unwrap_or_default();
                let hull = fwd.union(&bwd);

                let ival = if hull.is_empty() { Interval::new(0, upper) } else { hull };
                (*v, ival)
            })
            .collect()
    }

    /// DP rows to evaluate for vertex `v`. The full range when no anchors were found.
    pub fn find_alignable_range(&self, v: VertexIndex<Ix>) -> Interval {
        let Some(state) = &self.state else {
            return Interval::new(0, usize::MAX);
        };

        state.ranges.get(&v)
            .copied()
            .unwrap_or_else(|| Interval::new(0, state.read.len() + 1))
    }

    /// Check that the range finder was initialized for this read and graph snapshot
    pub fn check_prepared(&self, stamp: GraphStamp, read: &[u8]) -> Result<(), PoaError> {
        match &self.state {
            Some(state) if state.stamp == stamp && state.read == read => Ok(()),
            _ => Err(PoaError::RangeFinderNotInitialized),
        }
    }
}

impl<Ix> Default for RangeFinder<Ix>
where
    Ix: IndexType,
{
    fn default() -> Self {
        Self::new(QGramAnchorSearch::default())
    }
}
