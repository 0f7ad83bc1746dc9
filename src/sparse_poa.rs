//! Incremental consensus session: reads are added one by one, optionally in the orientation that
//! aligns best, and the consensus can be queried at any time.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span};

use crate::aligner::config::{AlignConfig, AlignParams};
use crate::aligner::matrix::AlignmentMatrix;
use crate::aligner::utils::reverse_complement;
use crate::consensus::Consensus;
use crate::errors::PoaError;
use crate::graph::io::csv::graph_to_csv;
use crate::graph::io::dot::graph_to_dot;
use crate::graph::io::render_to_string;
use crate::graph::poa::{null_vertex, IndexType, PoaGraph, ReadPath, VertexIndex};
use crate::interval::Interval;
use crate::range_finder::RangeFinder;

/// Identifies a read added to a [`SparsePoa`] session
pub type ReadKey = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddReadOptions {
    pub config: AlignConfig,

    /// Reads with a lower alignment score are not added to the graph
    pub min_score_to_add: i32,
}

impl Default for AddReadOptions {
    fn default() -> Self {
        AddReadOptions {
            config: AlignConfig::local(),
            min_score_to_add: i32::MIN,
        }
    }
}

/// How a read relates to the consensus
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignmentSummary {
    pub reverse_complemented: bool,
    pub extent_on_read: Interval,
    pub extent_on_consensus: Interval,
    pub alignment_score: i32,
    pub alignment_identity: f32,
}

pub struct SparsePoa<Ix = u32>
where
    Ix: IndexType,
{
    graph: PoaGraph<Ix>,
    read_paths: Vec<ReadPath<Ix>>,
    reverse_complemented: Vec<bool>,
    range_finder: RangeFinder<Ix>,
    consensus_config: AlignConfig,
}

impl<Ix> SparsePoa<Ix>
where
    Ix: IndexType,
{
    pub fn new() -> Self {
        Self::with_range_finder(RangeFinder::default())
    }

    pub fn with_range_finder(range_finder: RangeFinder<Ix>) -> Self {
        SparsePoa {
            graph: PoaGraph::new(),
            read_paths: Vec::new(),
            reverse_complemented: Vec::new(),
            range_finder,
            consensus_config: AlignConfig::local(),
        }
    }

    /// Set the mode used for consensus extraction and the scoring used for alignment summaries
    pub fn with_consensus_config(mut self, config: AlignConfig) -> Self {
        self.consensus_config = config;
        self
    }

    pub fn num_reads(&self) -> usize {
        self.read_paths.len()
    }

    pub fn read_path(&self, key: ReadKey) -> Option<&[VertexIndex<Ix>]> {
        self.read_paths.get(key).map(|p| p.as_slice())
    }

    pub fn is_reverse_complemented(&self, key: ReadKey) -> Option<bool> {
        self.reverse_complemented.get(key).copied()
    }

    pub fn graph(&self) -> &PoaGraph<Ix> {
        &self.graph
    }

    /// Align and add a read in the given orientation. Returns `None` when the read scored below
    /// the threshold and was not added.
    pub fn add_read(&mut self, sequence: &[u8], options: &AddReadOptions) -> Result<Option<ReadKey>, PoaError> {
        if sequence.is_empty() {
            return Err(PoaError::EmptySequence);
        }

        if self.graph.is_empty() {
            let path = self.graph.add_first_sequence(sequence)?;
            return Ok(Some(self.push_read(path, false)));
        }

        let span = debug_span!("add_read", read_len = sequence.len());
        let _enter = span.enter();

        let (path, bases) = self.banding_consensus();
        let matrix = self.trial(&path, &bases, sequence, &options.config)?;

        self.commit_if_accepted(matrix, false, options.min_score_to_add)
    }

    /// Align both the read and its reverse complement, and add the best scoring orientation.
    /// Returns `None` when neither reached the score threshold.
    pub fn orient_and_add_read(&mut self, sequence: &[u8], options: &AddReadOptions) -> Result<Option<ReadKey>, PoaError> {
        if sequence.is_empty() {
            return Err(PoaError::EmptySequence);
        }

        if self.graph.is_empty() {
            let path = self.graph.add_first_sequence(sequence)?;
            return Ok(Some(self.push_read(path, false)));
        }

        let span = debug_span!("orient_and_add_read", read_len = sequence.len());
        let _enter = span.enter();

        let (path, bases) = self.banding_consensus();
        let forward = self.trial(&path, &bases, sequence, &options.config)?;

        let rev_comp = reverse_complement(sequence);
        let reverse = self.trial(&path, &bases, &rev_comp, &options.config)?;

        debug!(forward = forward.score(), reverse = reverse.score(), "Orientation scores");

        if reverse.score() > forward.score() {
            self.commit_if_accepted(reverse, true, options.min_score_to_add)
        } else {
            self.commit_if_accepted(forward, false, options.min_score_to_add)
        }
    }

    pub fn find_consensus(&self, min_coverage: usize) -> Consensus<Ix> {
        self.graph.find_consensus(&self.consensus_config, min_coverage)
    }

    /// Consensus together with a summary of each read's alignment to it
    pub fn find_consensus_with_summaries(&self, min_coverage: usize) -> (Consensus<Ix>, Vec<AlignmentSummary>) {
        let consensus = self.find_consensus(min_coverage);

        let consensus_pos: FxHashMap<VertexIndex<Ix>, usize> = consensus.path().iter()
            .enumerate()
            .map(|(pos, v)| (*v, pos))
            .collect();

        let summaries = self.read_paths.iter()
            .zip(&self.reverse_complemented)
            .map(|(path, rc)| summarize(path, *rc, &consensus_pos, &self.consensus_config.params))
            .collect();

        (consensus, summaries)
    }

    /// Remove vertices and edges with coverage below `min_coverage`. Returns the number of removed
    /// vertices.
    pub fn prune_graph(&mut self, min_coverage: usize) -> Result<usize, PoaError> {
        Ok(self.graph.prune_graph(min_coverage, &mut self.read_paths)?)
    }

    /// GraphViz representation of the graph with the current consensus highlighted
    pub fn to_graphviz(&self) -> String {
        let path = self.graph.consensus_path(self.consensus_config.mode, 0);
        render_to_string(|buffer| graph_to_dot(buffer, &self.graph, &path))
    }

    pub fn write_graphviz_file(&self, path: impl AsRef<Path>) -> Result<(), PoaError> {
        let consensus_path = self.graph.consensus_path(self.consensus_config.mode, 0);

        let mut writer = BufWriter::new(File::create(path)?);
        graph_to_dot(&mut writer, &self.graph, &consensus_path)?;
        writer.flush()?;

        Ok(())
    }

    pub fn write_graph_csv_file(&self, path: impl AsRef<Path>) -> Result<(), PoaError> {
        let mut writer = BufWriter::new(File::create(path)?);
        graph_to_csv(&mut writer, &self.graph)?;
        writer.flush()?;

        Ok(())
    }

    fn push_read(&mut self, path: ReadPath<Ix>, reverse_complemented: bool) -> ReadKey {
        self.read_paths.push(path);
        self.reverse_complemented.push(reverse_complemented);

        self.read_paths.len() - 1
    }

    /// Current consensus path and bases, used to anchor the bands of the next read
    fn banding_consensus(&self) -> (Vec<VertexIndex<Ix>>, Vec<u8>) {
        let path = self.graph.consensus_path(self.consensus_config.mode, 0);
        let bases = path.iter()
            .map(|v| self.graph.vertex_base(*v))
            .collect();

        (path, bases)
    }

    fn trial(
        &mut self,
        consensus_path: &[VertexIndex<Ix>],
        consensus_bases: &[u8],
        sequence: &[u8],
        config: &AlignConfig,
    ) -> Result<AlignmentMatrix<Ix>, PoaError> {
        self.range_finder.init(&self.graph, consensus_path, consensus_bases, sequence);
        self.graph.try_add(sequence, config, Some(&self.range_finder))
    }

    fn commit_if_accepted(
        &mut self,
        matrix: AlignmentMatrix<Ix>,
        reverse_complemented: bool,
        min_score: i32,
    ) -> Result<Option<ReadKey>, PoaError> {
        if matrix.score() < min_score {
            debug!("Rejected read with score {} (minimum {})", matrix.score(), min_score);
            return Ok(None);
        }

        let path = self.graph.commit_add(matrix)?;
        Ok(Some(self.push_read(path, reverse_complemented)))
    }
}

impl<Ix> Default for SparsePoa<Ix>
where
    Ix: IndexType,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Derive the alignment of a read to the consensus from the vertices they share
fn summarize<Ix>(
    read_path: &[VertexIndex<Ix>],
    reverse_complemented: bool,
    consensus_pos: &FxHashMap<VertexIndex<Ix>, usize>,
    params: &AlignParams,
) -> AlignmentSummary
where
    Ix: IndexType,
{
    let null = null_vertex();
    let shared: Vec<(usize, usize)> = read_path.iter()
        .enumerate()
        .filter(|(_, v)| **v != null)
        .filter_map(|(read_pos, v)| consensus_pos.get(v).map(|cons_pos| (read_pos, *cons_pos)))
        .collect();

    let (Some(first), Some(last)) = (shared.first(), shared.last()) else {
        return AlignmentSummary {
            reverse_complemented,
            extent_on_read: Interval::empty(),
            extent_on_consensus: Interval::empty(),
            alignment_score: 0,
            alignment_identity: 0.0,
        };
    };

    let matches = shared.len();
    let mut score = matches as i32 * params.match_score;
    let mut columns = matches;

    for w in shared.windows(2) {
        let read_gap = w[1].0 - w[0].0 - 1;
        let cons_gap = w[1].1.saturating_sub(w[0].1 + 1);

        let mismatches = read_gap.min(cons_gap);
        let gap = read_gap.max(cons_gap) - mismatches;

        score += mismatches as i32 * params.mismatch + params.gap_score(gap);
        columns += mismatches + gap;
    }

    AlignmentSummary {
        reverse_complemented,
        extent_on_read: Interval::new(first.0, last.0 + 1),
        extent_on_consensus: Interval::new(first.1, last.1 + 1),
        alignment_score: score,
        alignment_identity: matches as f32 / columns as f32,
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;
    use crate::errors::GraphError;

    const TEMPLATE: &[u8] = b"ACGTTGCAAGTCCGATGCTAGCTTAGGCATCGATCGGATCCTAGAATTCGCGATAGCTAGGCTA";

    #[test]
    fn test_first_read_never_rejected() {
        let mut poa = SparsePoa::<u32>::new();
        let options = AddReadOptions { min_score_to_add: i32::MAX, ..Default::default() };

        assert_eq!(poa.add_read(TEMPLATE, &options).unwrap(), Some(0));
        assert_eq!(poa.num_reads(), 1);
        assert_eq!(poa.find_consensus(0).sequence().as_bytes(), TEMPLATE);
    }

    #[test]
    fn test_rejection() {
        let mut poa = SparsePoa::<u32>::new();
        poa.add_read(TEMPLATE, &AddReadOptions::default()).unwrap();

        let strict = AddReadOptions { min_score_to_add: i32::MAX, ..Default::default() };
        let generation = poa.graph().stamp().generation;

        assert_eq!(poa.add_read(TEMPLATE, &strict).unwrap(), None);
        assert_eq!(poa.orient_and_add_read(TEMPLATE, &strict).unwrap(), None);
        assert_eq!(poa.num_reads(), 1);
        assert_eq!(poa.graph().stamp().generation, generation);

        assert_eq!(poa.add_read(TEMPLATE, &AddReadOptions::default()).unwrap(), Some(1));
    }

    #[test]
    fn test_orientation() {
        let mut poa = SparsePoa::<u32>::new();
        let options = AddReadOptions::default();

        poa.orient_and_add_read(TEMPLATE, &options).unwrap();
        let key = poa.orient_and_add_read(&reverse_complement(TEMPLATE), &options)
            .unwrap()
            .unwrap();

        assert_eq!(poa.is_reverse_complemented(0), Some(false));
        assert_eq!(poa.is_reverse_complemented(key), Some(true));
        assert_eq!(poa.read_path(key), poa.read_path(0));
        assert_eq!(poa.graph().num_vertices(), TEMPLATE.len());

        let (consensus, summaries) = poa.find_consensus_with_summaries(0);
        assert_eq!(consensus.sequence().as_bytes(), TEMPLATE);
        assert!(summaries[key].reverse_complemented);
    }

    #[test]
    fn test_summaries() {
        let mut poa = SparsePoa::<u32>::new();
        let options = AddReadOptions::default();

        for _ in 0..3 {
            poa.add_read(TEMPLATE, &options).unwrap();
        }

        // Only the middle part of the template
        poa.add_read(&TEMPLATE[10..50], &options).unwrap();

        let (consensus, summaries) = poa.find_consensus_with_summaries(0);
        assert_eq!(consensus.sequence().as_bytes(), TEMPLATE);
        assert_eq!(summaries.len(), 4);

        let full = &summaries[0];
        assert_eq!(full.extent_on_read, Interval::new(0, TEMPLATE.len()));
        assert_eq!(full.extent_on_consensus, Interval::new(0, TEMPLATE.len()));
        assert_eq!(full.alignment_score, 3 * TEMPLATE.len() as i32);
        assert_eq!(full.alignment_identity, 1.0);

        let partial = &summaries[3];
        assert_eq!(partial.extent_on_read, Interval::new(0, 40));
        assert_eq!(partial.extent_on_consensus, Interval::new(10, 50));
        assert_eq!(partial.alignment_identity, 1.0);
    }

    #[test]
    fn test_summary_with_gaps() {
        let params = AlignParams::default();
        let consensus_pos: FxHashMap<VertexIndex<u32>, usize> = (0..10)
            .map(|i| (VertexIndex::new(i + 2), i))
            .collect();

        // Read skips consensus position 4 and has a different base at position 7
        let null = null_vertex();
        let path: Vec<VertexIndex<u32>> = [2, 3, 4, 5, 7, 8, 100, 10, 11]
            .into_iter()
            .map(VertexIndex::new)
            .chain([null])
            .collect();

        let summary = summarize(&path, false, &consensus_pos, &params);

        assert_eq!(summary.extent_on_read, Interval::new(0, 9));
        assert_eq!(summary.extent_on_consensus, Interval::new(0, 10));

        // 8 matches, 1 mismatch, 1 deletion
        assert_eq!(summary.alignment_score, 8 * 3 - 5 - 4);
        assert_eq!(summary.alignment_identity, 0.8);
    }

    #[test]
    fn test_prune() {
        let mut poa = SparsePoa::<u32>::new();
        let options = AddReadOptions::default();

        poa.add_read(TEMPLATE, &options).unwrap();
        poa.add_read(TEMPLATE, &options).unwrap();
        // Nothing to align to, ends up as a separate branch
        poa.add_read(b"NNNNNNNNNNNNNNNN", &options).unwrap();

        poa.prune_graph(2).unwrap();
        assert_eq!(poa.graph().num_vertices(), TEMPLATE.len());
        assert!(poa.read_path(2).unwrap().iter().all(|v| *v == null_vertex()));

        let (consensus, summaries) = poa.find_consensus_with_summaries(2);
        assert_eq!(consensus.sequence().as_bytes(), TEMPLATE);
        assert_eq!(summaries[2].extent_on_read, Interval::empty());

        // Pruning everything leaves an empty consensus
        poa.prune_graph(100).unwrap();
        assert!(poa.find_consensus(100).is_empty());
        assert!(poa.graph().is_acyclic());
    }

    #[test]
    fn test_errors() {
        let mut poa = SparsePoa::<u32>::new();
        let options = AddReadOptions::default();

        assert!(matches!(poa.add_read(b"", &options), Err(PoaError::EmptySequence)));
        assert!(matches!(poa.orient_and_add_read(b"", &options), Err(PoaError::EmptySequence)));
        assert_eq!(poa.num_reads(), 0);

        assert!(matches!(
            poa.write_graphviz_file("/nonexistent-dir/graph.dot"),
            Err(PoaError::IOError(_))
        ));

        let mut cyclic = petgraph::stable_graph::StableDiGraph::<(), ()>::new();
        let a = cyclic.add_node(());
        let b = cyclic.add_node(());
        cyclic.add_edge(a, b, ());
        cyclic.add_edge(b, a, ());

        let err: PoaError = petgraph::algo::toposort(&cyclic, None)
            .map_err(GraphError::from)
            .unwrap_err()
            .into();
        assert!(matches!(err, PoaError::Graph(GraphError::Cycle)));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_exports() {
        let mut poa = SparsePoa::<u32>::new();
        poa.add_read(b"ACGTACGT", &AddReadOptions::default()).unwrap();

        let dot = poa.to_graphviz();
        assert_eq!(dot.matches("#ffd966").count(), 8);

        let dir = std::env::temp_dir();
        let dot_path = dir.join(format!("sparsepoa-test-{}.dot", std::process::id()));
        let csv_path = dir.join(format!("sparsepoa-test-{}.csv", std::process::id()));

        poa.write_graphviz_file(&dot_path).unwrap();
        poa.write_graph_csv_file(&csv_path).unwrap();

        assert_eq!(std::fs::read_to_string(&dot_path).unwrap(), dot);
        assert!(std::fs::read_to_string(&csv_path).unwrap().starts_with("V,id,base"));

        let _ = std::fs::remove_file(dot_path);
        let _ = std::fs::remove_file(csv_path);
    }
}
