use std::cmp::max;

use smallvec::SmallVec;
use tracing::debug;

use crate::aligner::config::{AlignConfig, AlignMode};
use crate::errors::PoaError;
use crate::graph::io::dot::graph_to_dot;
use crate::graph::io::render_to_string;
use crate::graph::poa::{IndexType, PoaGraph, VertexIndex};

/// Fixed-point scale of the vertex scores
const SCORE_SCALE: i64 = 10_000;

/// Consensus sequence together with a snapshot of the graph it was extracted from
#[derive(Debug, Clone)]
pub struct Consensus<Ix = u32>
where
    Ix: IndexType,
{
    sequence: String,
    graph: PoaGraph<Ix>,
    path: Vec<VertexIndex<Ix>>,
}

impl<Ix> Consensus<Ix>
where
    Ix: IndexType,
{
    /// Build a graph from all reads with global alignment and return its consensus
    pub fn from_reads<S: AsRef<[u8]>>(reads: &[S]) -> Result<Self, PoaError> {
        Self::from_reads_with_config(reads, &AlignConfig::global(), 0)
    }

    pub fn from_reads_with_config<S: AsRef<[u8]>>(
        reads: &[S],
        config: &AlignConfig,
        min_coverage: usize,
    ) -> Result<Self, PoaError> {
        if reads.is_empty() {
            return Err(PoaError::NoSequences);
        }

        if reads.iter().any(|r| r.as_ref().is_empty()) {
            return Err(PoaError::EmptySequence);
        }

        let mut graph = PoaGraph::<Ix>::new();
        for read in reads {
            graph.add_read(read.as_ref(), config, None)?;
        }

        Ok(graph.find_consensus(config, min_coverage))
    }

    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    pub fn path(&self) -> &[VertexIndex<Ix>] {
        &self.path
    }

    pub fn graph(&self) -> &PoaGraph<Ix> {
        &self.graph
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// GraphViz representation of the graph with the consensus path highlighted
    pub fn to_graphviz(&self) -> String {
        render_to_string(|buffer| graph_to_dot(buffer, &self.graph, &self.path))
    }
}

impl<Ix> PoaGraph<Ix>
where
    Ix: IndexType,
{
    /// Extract the consensus: the heaviest path through the graph
    pub fn find_consensus(&self, config: &AlignConfig, min_coverage: usize) -> Consensus<Ix> {
        let path = self.consensus_path(config.mode, min_coverage);
        let bases: Vec<u8> = path.iter()
            .map(|v| self.vertex_base(*v))
            .collect();

        debug!("Consensus of length {} from {} reads", path.len(), self.num_reads());

        Consensus {
            sequence: String::from_utf8_lossy(&bases).into_owned(),
            graph: self.clone(),
            path,
        }
    }

    /// Vertex score: in global mode coverage relative to all reads, otherwise relative to the
    /// reads spanning the vertex. Half-supported vertices score slightly negative.
    fn vertex_score(&self, v: VertexIndex<Ix>, mode: AlignMode, min_coverage: usize) -> i64 {
        let coverage = self.coverage(v) as i64;
        let baseline = match mode {
            AlignMode::Global => self.num_reads(),
            AlignMode::SemiGlobal | AlignMode::Local => max(self.spanning_reads(v), min_coverage),
        } as i64;

        (2 * coverage - baseline) * SCORE_SCALE - 1
    }

    pub(crate) fn consensus_path(&self, mode: AlignMode, min_coverage: usize) -> Vec<VertexIndex<Ix>> {
        let mut scores: Vec<Option<(i64, Option<VertexIndex<Ix>>)>> = vec![None; self.node_bound()];
        let mut best_end: Option<(i64, VertexIndex<Ix>)> = None;
        let mut preds: SmallVec<[VertexIndex<Ix>; 8]> = SmallVec::new();

        for &v in self.topological_order() {
            if self.is_special(v) || self.coverage(v) < min_coverage {
                continue;
            }

            preds.clear();
            preds.extend(self.predecessors(v));
            preds.sort_unstable();

            // Extend the best predecessor path if that improves the score, otherwise start here
            let mut best_pred: Option<(i64, VertexIndex<Ix>)> = None;
            for &p in &preds {
                if let Some((score, _)) = scores[p.index()] {
                    if score > 0 && best_pred.map_or(true, |(best, _)| score > best) {
                        best_pred = Some((score, p));
                    }
                }
            }

            let score = self.vertex_score(v, mode, min_coverage) + best_pred.map_or(0, |(s, _)| s);
            scores[v.index()] = Some((score, best_pred.map(|(_, p)| p)));

            let is_better = match best_end {
                None => true,
                Some((best, best_v)) => score > best || (score == best && v.index() < best_v.index()),
            };

            if is_better {
                best_end = Some((score, v));
            }
        }

        let mut path = Vec::new();
        let mut curr = best_end.map(|(_, v)| v);
        while let Some(v) = curr {
            path.push(v);
            curr = scores[v.index()].and_then(|(_, pred)| pred);
        }

        path.reverse();
        path
    }
}
