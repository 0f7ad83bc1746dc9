use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

use itertools::Itertools;
use petgraph::algo::{is_cyclic_directed, toposort};
pub use petgraph::graph::IndexType;
use petgraph::visit::NodeIndexable;
use petgraph::{Direction, Incoming, Outgoing};
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use tracing::{debug, debug_span, trace};

use crate::aligner::config::AlignConfig;
use crate::aligner::matrix::{AlignStep, AlignmentMatrix};
use crate::aligner::utils::print_alignment;
use crate::errors::{GraphError, PoaError};
use crate::range_finder::RangeFinder;

pub(crate) mod graph_impl {
    use petgraph::graph::{IndexType, NodeIndex};
    use petgraph::stable_graph::StableDiGraph;
    use smallvec::SmallVec;

    pub type PoaGraphType<Ix> = StableDiGraph<VertexData<Ix>, EdgeData, Ix>;
    pub type VertexIndex<Ix> = NodeIndex<Ix>;

    #[derive(Debug, Clone)]
    pub struct VertexData<Ix>
    where
        Ix: IndexType,
    {
        pub base: u8,

        /// Sorted IDs of the reads whose path passes through this vertex
        pub reads: Vec<usize>,

        /// Number of reads starting at or before, and ending at or after this vertex
        pub spanning_reads: usize,

        /// Vertices with a different base in the same alignment column
        pub aligned_vertices: SmallVec<[VertexIndex<Ix>; 4]>,
        pub rank: usize,
    }

    impl<Ix> VertexData<Ix>
    where
        Ix: IndexType,
    {
        pub fn new(base: u8) -> Self {
            VertexData {
                base,
                reads: Vec::new(),
                spanning_reads: 0,
                aligned_vertices: SmallVec::new(),
                rank: 0,
            }
        }

        #[inline(always)]
        pub fn coverage(&self) -> usize {
            self.reads.len()
        }
    }

    #[derive(Debug, Clone, Default)]
    pub struct EdgeData {
        /// Sorted IDs of the reads that observed this adjacency
        pub read_ids: Vec<usize>,
    }

    impl EdgeData {
        pub fn new_with_read_id(read_id: usize) -> Self {
            EdgeData {
                read_ids: vec![read_id],
            }
        }

        pub fn new_with_read_ids(read_ids: Vec<usize>) -> Self {
            EdgeData { read_ids }
        }
    }
}

use graph_impl::{EdgeData, PoaGraphType, VertexData};
pub use graph_impl::VertexIndex;

/// The vertices of a read, one per read base, in read order
pub type ReadPath<Ix> = Vec<VertexIndex<Ix>>;

/// Sentinel for "no vertex". Read paths refer to pruned vertices through it.
#[inline]
pub fn null_vertex<Ix: IndexType>() -> VertexIndex<Ix> {
    VertexIndex::end()
}

static NEXT_GRAPH_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies a graph snapshot. Alignment matrices and range finder state are only valid for the
/// snapshot they were computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphStamp {
    pub graph_id: u64,
    pub generation: u64,
}

impl GraphStamp {
    fn fresh(generation: u64) -> Self {
        GraphStamp {
            graph_id: NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed),
            generation,
        }
    }
}

impl Display for GraphStamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.graph_id, self.generation)
    }
}

/// Partial order alignment graph
///
/// Each vertex holds a single base. Two special vertices always exist: the enter vertex `#` and
/// the exit vertex `$`. Each read is threaded through the graph as a path from enter to exit.
#[derive(Debug)]
pub struct PoaGraph<Ix = u32>
where
    Ix: IndexType,
{
    pub(crate) graph: PoaGraphType<Ix>,
    enter_vertex: VertexIndex<Ix>,
    exit_vertex: VertexIndex<Ix>,
    toposorted: Vec<VertexIndex<Ix>>,
    num_reads: usize,
    stamp: GraphStamp,
}

impl<Ix> PoaGraph<Ix>
where
    Ix: IndexType,
{
    pub fn new() -> Self {
        let mut graph = PoaGraphType::<Ix>::default();
        let enter_vertex = graph.add_node(VertexData::new(b'#'));
        let exit_vertex = graph.add_node(VertexData::new(b'$'));

        // Only present while the graph has no other vertices
        graph.add_edge(enter_vertex, exit_vertex, EdgeData::default());
        graph[exit_vertex].rank = 1;

        PoaGraph {
            graph,
            enter_vertex,
            exit_vertex,
            toposorted: vec![enter_vertex, exit_vertex],
            num_reads: 0,
            stamp: GraphStamp::fresh(0),
        }
    }

    /// True while no read has been added to the graph
    pub fn is_empty(&self) -> bool {
        self.num_reads == 0
    }

    pub fn num_reads(&self) -> usize {
        self.num_reads
    }

    /// Number of vertices, excluding the enter and exit vertex
    pub fn num_vertices(&self) -> usize {
        self.graph.node_count() - 2
    }

    pub(crate) fn node_bound(&self) -> usize {
        self.graph.node_bound()
    }

    #[inline(always)]
    pub fn stamp(&self) -> GraphStamp {
        self.stamp
    }

    #[inline(always)]
    pub fn enter_vertex(&self) -> VertexIndex<Ix> {
        self.enter_vertex
    }

    #[inline(always)]
    pub fn exit_vertex(&self) -> VertexIndex<Ix> {
        self.exit_vertex
    }

    #[inline]
    pub fn is_special(&self, v: VertexIndex<Ix>) -> bool {
        v == self.enter_vertex || v == self.exit_vertex
    }

    pub fn contains_vertex(&self, v: VertexIndex<Ix>) -> bool {
        self.graph.contains_node(v)
    }

    /// All vertices in topological order, including the enter and exit vertex
    pub fn topological_order(&self) -> &[VertexIndex<Ix>] {
        &self.toposorted
    }

    /// Iterate over all vertices except enter and exit, ordered by vertex index
    pub fn vertices(&self) -> impl Iterator<Item = VertexIndex<Ix>> + '_ {
        self.graph.node_indices()
            .filter(|v| !self.is_special(*v))
    }

    #[inline]
    pub fn vertex_base(&self, v: VertexIndex<Ix>) -> u8 {
        self.graph[v].base
    }

    #[inline]
    pub fn coverage(&self, v: VertexIndex<Ix>) -> usize {
        self.graph[v].coverage()
    }

    #[inline]
    pub fn spanning_reads(&self, v: VertexIndex<Ix>) -> usize {
        self.graph[v].spanning_reads
    }

    #[inline]
    pub fn rank(&self, v: VertexIndex<Ix>) -> usize {
        self.graph[v].rank
    }

    pub fn vertex_reads(&self, v: VertexIndex<Ix>) -> &[usize] {
        &self.graph[v].reads
    }

    pub fn aligned_vertices(&self, v: VertexIndex<Ix>) -> &[VertexIndex<Ix>] {
        &self.graph[v].aligned_vertices
    }

    /// Number of reads that observed the edge `u -> v`, zero when there's no such edge
    pub fn edge_coverage(&self, u: VertexIndex<Ix>, v: VertexIndex<Ix>) -> usize {
        self.graph.find_edge(u, v)
            .map(|e| self.graph[e].read_ids.len())
            .unwrap_or(0)
    }

    pub fn predecessors(&self, v: VertexIndex<Ix>) -> impl Iterator<Item = VertexIndex<Ix>> + '_ {
        self.graph.neighbors_directed(v, Incoming)
    }

    pub fn successors(&self, v: VertexIndex<Ix>) -> impl Iterator<Item = VertexIndex<Ix>> + '_ {
        self.graph.neighbors_directed(v, Outgoing)
    }

    pub fn is_acyclic(&self) -> bool {
        !is_cyclic_directed(&self.graph)
    }

    /// Obtain the bases along a path. Consecutive vertices must be connected by an edge.
    pub fn path_sequence(&self, path: &[VertexIndex<Ix>]) -> Result<Vec<u8>, GraphError> {
        let mut sequence = Vec::with_capacity(path.len());
        let mut prev: Option<VertexIndex<Ix>> = None;

        for &v in path {
            if !self.graph.contains_node(v) {
                let from = prev.unwrap_or(v);
                return Err(GraphError::InvalidEdge(from.index(), v.index()));
            }

            if let Some(p) = prev {
                if self.graph.find_edge(p, v).is_none() {
                    return Err(GraphError::InvalidEdge(p.index(), v.index()));
                }
            }

            sequence.push(self.graph[v].base);
            prev = Some(v);
        }

        Ok(sequence)
    }

    /// Bootstrap the graph with the first read: a linear chain of new vertices between the enter
    /// and exit vertex.
    pub fn add_first_sequence(&mut self, sequence: &[u8]) -> Result<ReadPath<Ix>, PoaError> {
        if self.num_reads > 0 {
            return Err(GraphError::NotEmpty.into());
        }

        if sequence.is_empty() {
            return Err(PoaError::EmptySequence);
        }

        let span = debug_span!("add_first_sequence", read_len = sequence.len());
        let _enter = span.enter();

        let read_id = self.num_reads;
        let mut path = Vec::with_capacity(sequence.len());
        let mut prev = self.enter_vertex;

        for &base in sequence {
            let curr = self.add_vertex(base);
            self.add_read_to_vertex(curr, read_id);
            self.add_read_to_edge(prev, curr, read_id);

            path.push(curr);
            prev = curr;
        }

        self.finish_read(prev, read_id, &path)?;
        debug!("Added first read with {} vertices", path.len());

        Ok(path)
    }

    /// Align a sequence to the current graph snapshot without modifying it
    pub fn try_add(
        &self,
        sequence: &[u8],
        config: &AlignConfig,
        range_finder: Option<&RangeFinder<Ix>>,
    ) -> Result<AlignmentMatrix<Ix>, PoaError> {
        AlignmentMatrix::compute(self, sequence, config, range_finder)
    }

    /// Trial alignment of multiple sequences against the same snapshot, evaluated in parallel
    pub fn try_add_batch<S>(
        &self,
        sequences: &[S],
        config: &AlignConfig,
    ) -> Vec<Result<AlignmentMatrix<Ix>, PoaError>>
    where
        S: AsRef<[u8]> + Sync,
        Ix: Send + Sync,
    {
        sequences.par_iter()
            .map(|seq| self.try_add(seq.as_ref(), config, None))
            .collect()
    }

    /// Thread the read of a trial alignment into the graph
    ///
    /// Matches reuse the aligned vertex, mismatches reuse a vertex with the read base from the
    /// aligned ring (or create a new one and join the ring), insertions create new vertices, and
    /// deleted vertices are skipped.
    pub fn commit_add(&mut self, matrix: AlignmentMatrix<Ix>) -> Result<ReadPath<Ix>, PoaError> {
        if matrix.stamp() != self.stamp {
            return Err(GraphError::StaleAlignment {
                expected: self.stamp,
                found: matrix.stamp(),
            }.into());
        }

        let read_id = self.num_reads;
        let span = debug_span!("commit_add", read_id, score = matrix.score());
        let _enter = span.enter();

        let steps = matrix.backtrace(self);
        let read = matrix.read();
        trace!("Alignment:\n{}", print_alignment(self, read, &steps));

        // Rank of the next graph vertex consumed after each step. A reused aligned vertex must
        // fit between its neighbours in the current topological order to keep the graph acyclic.
        let mut upper_ranks = vec![0; steps.len()];
        let mut upper = self.graph[self.exit_vertex].rank;
        for (i, step) in steps.iter().enumerate().rev() {
            upper_ranks[i] = upper;

            if let Some(v) = step.vertex() {
                upper = self.graph[v].rank;
            }
        }

        let mut path = Vec::with_capacity(read.len());
        let mut prev = self.enter_vertex;
        let mut lower = self.graph[self.enter_vertex].rank;

        for (step, upper) in steps.iter().zip(upper_ranks) {
            let curr = match *step {
                AlignStep::Match { vertex, .. } => {
                    lower = self.graph[vertex].rank;
                    vertex
                },
                AlignStep::Mismatch { vertex, read_pos } => {
                    let (curr, reused) = self.mismatch_vertex(vertex, read[read_pos], lower, upper);
                    if reused {
                        lower = self.graph[curr].rank;
                    }

                    curr
                },
                AlignStep::Insertion { read_pos } => self.add_vertex(read[read_pos]),
                AlignStep::Deletion { .. } => continue,
            };

            self.add_read_to_vertex(curr, read_id);
            self.add_read_to_edge(prev, curr, read_id);

            path.push(curr);
            prev = curr;
        }

        self.finish_read(prev, read_id, &path)?;
        debug!("Committed read, graph now has {} vertices", self.num_vertices());

        Ok(path)
    }

    /// Add a read to the graph: bootstraps an empty graph, otherwise aligns and commits.
    pub fn add_read(
        &mut self,
        sequence: &[u8],
        config: &AlignConfig,
        range_finder: Option<&RangeFinder<Ix>>,
    ) -> Result<ReadPath<Ix>, PoaError> {
        if self.is_empty() {
            self.add_first_sequence(sequence)
        } else {
            let matrix = self.try_add(sequence, config, range_finder)?;
            self.commit_add(matrix)
        }
    }

    /// Remove all vertices and edges with coverage below `min_coverage`
    ///
    /// Vertices left without incoming (outgoing) edges are reconnected to the enter (exit) vertex.
    /// References to removed vertices in `read_paths` are replaced by [`null_vertex`]. Returns the
    /// number of removed vertices.
    pub fn prune_graph(
        &mut self,
        min_coverage: usize,
        read_paths: &mut [ReadPath<Ix>],
    ) -> Result<usize, GraphError> {
        let span = debug_span!("prune_graph", min_coverage);
        let _enter = span.enter();

        let to_remove: Vec<_> = self.vertices()
            .filter(|v| self.graph[*v].coverage() < min_coverage)
            .collect();

        let removed: FxHashSet<_> = to_remove.iter().copied().collect();
        for &v in &to_remove {
            let ring = std::mem::take(&mut self.graph[v].aligned_vertices);
            for other in ring {
                self.graph[other].aligned_vertices.retain(|w| *w != v);
            }
        }

        for &v in &to_remove {
            self.graph.remove_node(v);
        }

        // The enter -> exit edge of an empty graph is managed by post_process
        let edges_to_remove: Vec<_> = self.graph.edge_indices()
            .filter(|e| self.graph[*e].read_ids.len() < min_coverage)
            .filter(|e| self.graph.edge_endpoints(*e) != Some((self.enter_vertex, self.exit_vertex)))
            .collect();

        if to_remove.is_empty() && edges_to_remove.is_empty() {
            return Ok(0);
        }

        for &e in &edges_to_remove {
            self.graph.remove_edge(e);
        }

        let null = null_vertex();
        for v in read_paths.iter_mut().flat_map(|path| path.iter_mut()) {
            if removed.contains(v) {
                *v = null;
            }
        }

        self.reconnect_dangling();
        self.post_process()?;

        debug!(
            "Pruned {} vertices and {} edges, {} vertices remaining",
            to_remove.len(), edges_to_remove.len(), self.num_vertices()
        );

        Ok(to_remove.len())
    }

    fn add_vertex(&mut self, base: u8) -> VertexIndex<Ix> {
        self.graph.add_node(VertexData::new(base))
    }

    fn add_read_to_vertex(&mut self, v: VertexIndex<Ix>, read_id: usize) {
        let reads = &mut self.graph[v].reads;
        if reads.last() != Some(&read_id) {
            reads.push(read_id);
        }
    }

    fn add_read_to_edge(&mut self, u: VertexIndex<Ix>, v: VertexIndex<Ix>, read_id: usize) {
        // If the edge exists, update the read IDs of the existing one
        if let Some(e) = self.graph.find_edge(u, v) {
            let read_ids = &mut self.graph[e].read_ids;
            if read_ids.last() != Some(&read_id) {
                read_ids.push(read_id);
            }
        } else {
            self.graph.add_edge(u, v, EdgeData::new_with_read_id(read_id));
        }
    }

    /// Find or create the vertex holding `base` in the aligned ring of `vertex`. Returns the vertex
    /// and whether it already existed.
    fn mismatch_vertex(
        &mut self,
        vertex: VertexIndex<Ix>,
        base: u8,
        lower_rank: usize,
        upper_rank: usize,
    ) -> (VertexIndex<Ix>, bool) {
        let existing = self.graph[vertex].aligned_vertices.iter()
            .copied()
            .find(|w| {
                let data = &self.graph[*w];
                data.base == base && data.rank > lower_rank && data.rank < upper_rank
            });

        if let Some(w) = existing {
            return (w, true);
        }

        let new_vertex = self.add_vertex(base);
        trace!("New vertex {:?} aligned to {:?}", new_vertex, vertex);

        let others = self.graph[vertex].aligned_vertices.clone();
        for other in others {
            self.graph[other].aligned_vertices.push(new_vertex);
            self.graph[new_vertex].aligned_vertices.push(other);
        }

        self.graph[vertex].aligned_vertices.push(new_vertex);
        self.graph[new_vertex].aligned_vertices.push(vertex);

        (new_vertex, false)
    }

    fn finish_read(&mut self, last: VertexIndex<Ix>, read_id: usize, path: &[VertexIndex<Ix>]) -> Result<(), GraphError> {
        self.add_read_to_edge(last, self.exit_vertex, read_id);
        self.num_reads += 1;

        self.post_process()?;
        self.tag_span(path);

        Ok(())
    }

    /// Increase the spanning read count of all vertices between the first and last vertex of the
    /// path in topological order
    fn tag_span(&mut self, path: &[VertexIndex<Ix>]) {
        let null = null_vertex();
        let ranks = path.iter()
            .filter(|v| **v != null && self.graph.contains_node(**v))
            .map(|v| self.graph[*v].rank)
            .minmax()
            .into_option();

        let Some((first, last)) = ranks else {
            return;
        };

        for rank in first..=last {
            let v = self.toposorted[rank];
            if !self.is_special(v) {
                self.graph[v].spanning_reads += 1;
            }
        }
    }

    fn merged_read_ids(&self, v: VertexIndex<Ix>, dir: Direction) -> Vec<usize> {
        let read_ids: Vec<usize> = self.graph.edges_directed(v, dir)
            .map(|e| e.weight().read_ids.iter().copied())
            .kmerge()
            .dedup()
            .collect();

        if read_ids.is_empty() {
            self.graph[v].reads.clone()
        } else {
            read_ids
        }
    }

    fn reconnect_dangling(&mut self) {
        let mut to_add = Vec::new();
        for v in self.vertices() {
            // Add new edges from the enter vertex to vertices without incoming edges
            if self.graph.edges_directed(v, Incoming).next().is_none() {
                to_add.push((self.enter_vertex, v, self.merged_read_ids(v, Outgoing)));
            }

            // Add new edges from vertices without outgoing edges to the exit vertex
            if self.graph.edges_directed(v, Outgoing).next().is_none() {
                to_add.push((v, self.exit_vertex, self.merged_read_ids(v, Incoming)));
            }
        }

        for (u, v, read_ids) in to_add {
            trace!("Adding edge {:?} -> {:?}", u, v);
            self.graph.add_edge(u, v, EdgeData::new_with_read_ids(read_ids));
        }
    }

    fn post_process(&mut self) -> Result<(), GraphError> {
        let enter_exit = self.graph.find_edge(self.enter_vertex, self.exit_vertex);
        match (self.num_vertices() == 0, enter_exit) {
            (true, None) => {
                self.graph.add_edge(self.enter_vertex, self.exit_vertex, EdgeData::default());
            },
            (false, Some(e)) => {
                self.graph.remove_edge(e);
            },
            _ => (),
        }

        self.toposorted = toposort(&self.graph, None)?;

        for (rank, v) in self.toposorted.iter().enumerate() {
            self.graph[*v].rank = rank;
        }

        self.stamp.generation += 1;

        Ok(())
    }
}

impl<Ix> Default for PoaGraph<Ix>
where
    Ix: IndexType,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<Ix> Clone for PoaGraph<Ix>
where
    Ix: IndexType,
{
    /// Clones receive a fresh graph ID, matrices computed against the original can't be committed
    /// to the copy.
    fn clone(&self) -> Self {
        PoaGraph {
            graph: self.graph.clone(),
            enter_vertex: self.enter_vertex,
            exit_vertex: self.exit_vertex,
            toposorted: self.toposorted.clone(),
            num_reads: self.num_reads,
            stamp: GraphStamp::fresh(self.stamp.generation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{GraphError, PoaError};

    fn graph_with(reads: &[&[u8]]) -> (PoaGraph, Vec<ReadPath<u32>>) {
        let mut graph = PoaGraph::<u32>::new();
        let config = AlignConfig::global();

        let paths = reads.iter()
            .map(|r| graph.add_read(r, &config, None).unwrap())
            .collect();

        (graph, paths)
    }

    #[test]
    fn test_new_graph() {
        let graph = PoaGraph::<u32>::new();

        assert!(graph.is_empty());
        assert_eq!(graph.num_vertices(), 0);
        assert_eq!(graph.topological_order(), &[graph.enter_vertex(), graph.exit_vertex()]);
        assert_eq!(graph.successors(graph.enter_vertex()).collect::<Vec<_>>(), vec![graph.exit_vertex()]);
    }

    #[test]
    fn test_first_sequence() {
        let mut graph = PoaGraph::<u32>::new();
        let stamp = graph.stamp();

        let path = graph.add_first_sequence(b"GATTACA").unwrap();

        assert_eq!(path.len(), 7);
        assert_eq!(graph.num_reads(), 1);
        assert_eq!(graph.num_vertices(), 7);
        assert_eq!(graph.path_sequence(&path).unwrap(), b"GATTACA");
        assert_eq!(graph.stamp().graph_id, stamp.graph_id);
        assert!(graph.stamp().generation > stamp.generation);

        // No more shortcut from enter to exit
        assert_eq!(graph.edge_coverage(graph.enter_vertex(), graph.exit_vertex()), 0);
        assert!(graph.successors(graph.enter_vertex()).all(|v| v == path[0]));
        assert!(path.iter().all(|v| graph.coverage(*v) == 1 && graph.spanning_reads(*v) == 1));

        assert!(matches!(graph.add_first_sequence(b"GATTACA"), Err(PoaError::Graph(GraphError::NotEmpty))));
        assert!(matches!(PoaGraph::<u32>::new().add_first_sequence(b""), Err(PoaError::EmptySequence)));
    }

    #[test]
    fn test_add_identical() {
        let (graph, paths) = graph_with(&[b"GATTACA", b"GATTACA"]);

        assert_eq!(paths[0], paths[1]);
        assert_eq!(graph.num_vertices(), 7);
        assert!(paths[0].iter().all(|v| graph.coverage(*v) == 2));
        assert_eq!(graph.edge_coverage(paths[0][2], paths[0][3]), 2);
        assert_eq!(graph.vertex_reads(paths[0][0]), &[0, 1]);
    }

    #[test]
    fn test_add_mismatches() {
        let (graph, paths) = graph_with(&[b"GATTACA", b"GATCACA", b"GATGACA"]);

        assert_eq!(graph.num_vertices(), 9);
        assert!(graph.is_acyclic());

        let t = paths[0][3];
        let c = paths[1][3];
        let g = paths[2][3];

        assert_eq!(graph.vertex_base(c), b'C');
        assert_eq!(graph.vertex_base(g), b'G');

        // All three vertices form a single aligned ring
        for (v, mut expected) in [(t, vec![c, g]), (c, vec![t, g]), (g, vec![t, c])] {
            let mut ring = graph.aligned_vertices(v).to_vec();
            ring.sort();
            expected.sort();

            assert_eq!(ring, expected);
        }

        // Shared vertices
        assert_eq!(paths[0][4], paths[1][4]);
        assert_eq!(paths[0][4], paths[2][4]);
        assert_eq!(graph.coverage(paths[0][4]), 3);
        assert_eq!(graph.coverage(c), 1);
    }

    #[test]
    fn test_add_insertion_and_deletion() {
        let (graph, paths) = graph_with(&[b"GATTACA", b"GATTTACA", b"GATACA"]);

        assert_eq!(graph.num_vertices(), 8);
        assert_eq!(paths[1].len(), 8);
        assert_eq!(paths[2].len(), 6);
        assert!(graph.is_acyclic());

        for (path, read) in paths.iter().zip([&b"GATTACA"[..], b"GATTTACA", b"GATACA"]) {
            assert_eq!(graph.path_sequence(path).unwrap(), read);
        }
    }

    #[test]
    fn test_commit_traces_alignment() {
        use std::io::Write;
        use std::sync::{Arc, Mutex};

        #[derive(Clone)]
        struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

        impl Write for SharedBuffer {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().write(buf)
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let buffer = SharedBuffer(Arc::new(Mutex::new(Vec::new())));
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let (mut graph, _) = graph_with(&[b"GATTACA"]);
        tracing::subscriber::with_default(subscriber, || {
            let matrix = graph.try_add(b"GATCACA", &AlignConfig::global(), None).unwrap();
            graph.commit_add(matrix).unwrap();
        });

        let logged = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("GATTACA\n|||*|||\nGATCACA"), "{logged}");
    }

    #[test]
    fn test_stale_commit() {
        let (mut graph, _) = graph_with(&[b"GATTACA"]);
        let config = AlignConfig::global();

        let m1 = graph.try_add(b"GATCACA", &config, None).unwrap();
        let m2 = graph.try_add(b"GATTACA", &config, None).unwrap();

        graph.commit_add(m1).unwrap();
        let num_vertices = graph.num_vertices();

        let result = graph.commit_add(m2);
        assert!(matches!(result, Err(PoaError::Graph(GraphError::StaleAlignment { .. }))));
        assert_eq!(graph.num_reads(), 2);
        assert_eq!(graph.num_vertices(), num_vertices);

        // A clone is another graph
        let mut copy = graph.clone();
        let m3 = graph.try_add(b"GATTACA", &config, None).unwrap();
        assert!(matches!(copy.commit_add(m3), Err(PoaError::Graph(GraphError::StaleAlignment { .. }))));
    }

    #[test]
    fn test_try_add_batch() {
        let (graph, _) = graph_with(&[b"GATTACA", b"GATTACA"]);
        let config = AlignConfig::global();
        let reads: Vec<&[u8]> = vec![b"GATTACA", b"GATCACA", b"GTTACA"];

        let batch = graph.try_add_batch(&reads, &config);
        assert_eq!(batch.len(), 3);

        for (matrix, read) in batch.into_iter().zip(&reads) {
            let matrix = matrix.unwrap();
            let single = graph.try_add(read, &config, None).unwrap();

            assert_eq!(matrix.score(), single.score());
            assert_eq!(matrix.stamp(), graph.stamp());
        }
    }

    #[test]
    fn test_invalid_path() {
        let (graph, paths) = graph_with(&[b"GATTACA"]);

        let path = vec![paths[0][0], paths[0][2]];
        assert!(matches!(graph.path_sequence(&path), Err(GraphError::InvalidEdge(_, _))));
    }

    #[test]
    fn test_prune() {
        let (mut graph, mut paths) = graph_with(&[b"GATTACA", b"GATTACA", b"GATTACA", b"GATCACA"]);
        assert_eq!(graph.num_vertices(), 8);

        let c = paths[3][3];
        let generation = graph.stamp().generation;

        assert_eq!(graph.prune_graph(2, &mut paths).unwrap(), 1);
        assert_eq!(graph.num_vertices(), 7);
        assert!(!graph.contains_vertex(c));
        assert!(graph.stamp().generation > generation);
        assert!(graph.aligned_vertices(paths[0][3]).is_empty());
        assert_eq!(paths[3][3], null_vertex());
        assert_eq!(paths[3][2], paths[0][2]);
        assert!(graph.is_acyclic());

        // Nothing left to prune
        assert_eq!(graph.prune_graph(2, &mut paths).unwrap(), 0);
    }

    #[test]
    fn test_prune_dangling() {
        // Both reads diverge after the shared prefix
        let (mut graph, mut paths) = graph_with(&[b"AAAACCCC", b"AAAAGGGG"]);
        assert_eq!(graph.num_vertices(), 12);

        assert_eq!(graph.prune_graph(2, &mut paths).unwrap(), 8);
        assert_eq!(graph.num_vertices(), 4);
        assert!(graph.is_acyclic());

        let last = paths[0][3];
        assert_eq!(graph.edge_coverage(last, graph.exit_vertex()), 2);
        assert_eq!(graph.path_sequence(&paths[1][..4]).unwrap(), b"AAAA");

        // Every vertex stays on a path from enter to exit
        for v in graph.vertices() {
            assert!(graph.predecessors(v).next().is_some());
            assert!(graph.successors(v).next().is_some());
        }
    }

    #[test]
    fn test_prune_low_coverage_edges() {
        // The deletion in the last read skips one of the Ts through an edge of a single read
        let (mut graph, mut paths) = graph_with(&[b"GATTACA", b"GATTACA", b"GATTACA", b"GATACA"]);
        assert_eq!(graph.num_vertices(), 7);

        let has_weak_edge = |graph: &PoaGraph| {
            graph.vertices()
                .chain([graph.enter_vertex()])
                .any(|u| graph.successors(u).any(|v| graph.edge_coverage(u, v) < 2))
        };
        assert!(has_weak_edge(&graph));

        let generation = graph.stamp().generation;
        assert_eq!(graph.prune_graph(2, &mut paths).unwrap(), 0);
        assert!(graph.stamp().generation > generation);

        assert!(!has_weak_edge(&graph));
        assert_eq!(graph.num_vertices(), 7);
        assert!(graph.is_acyclic());
        for v in graph.vertices() {
            assert!(graph.predecessors(v).next().is_some());
            assert!(graph.successors(v).next().is_some());
        }

        assert_eq!(graph.path_sequence(&paths[0]).unwrap(), b"GATTACA");
        assert_eq!(graph.prune_graph(2, &mut paths).unwrap(), 0);
    }

    #[test]
    fn test_prune_everything() {
        let (mut graph, mut paths) = graph_with(&[b"GATTACA", b"GATTACA"]);

        assert_eq!(graph.prune_graph(10, &mut paths).unwrap(), 7);
        assert_eq!(graph.num_vertices(), 0);
        assert!(paths.iter().flatten().all(|v| *v == null_vertex()));
        assert_eq!(graph.successors(graph.enter_vertex()).collect::<Vec<_>>(), vec![graph.exit_vertex()]);

        // The graph keeps accepting reads
        let path = graph.add_read(b"ACGT", &AlignConfig::global(), None).unwrap();
        assert_eq!(path.len(), 4);
        assert_eq!(graph.num_vertices(), 4);
        assert_eq!(graph.num_reads(), 3);
        assert_eq!(graph.path_sequence(&path).unwrap(), b"ACGT");
    }
}
