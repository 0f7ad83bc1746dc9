//! Sequence-to-graph dynamic programming
//!
//! Gap-affine alignment with three states per cell: match/mismatch (M), insertion (I, read base
//! without graph vertex) and deletion (D, graph vertex without read base). Each graph vertex owns a
//! column of DP cells, one per read position, optionally restricted to a band. Columns are filled
//! in topological order; the predecessor columns of a vertex are those of its graph predecessors.

use smallvec::SmallVec;
use tracing::{debug, debug_span};

use crate::aligner::config::{AlignConfig, AlignMode, AlignParams};
use crate::errors::{GraphError, PoaError};
use crate::graph::poa::{GraphStamp, IndexType, PoaGraph, VertexIndex};
use crate::interval::Interval;
use crate::range_finder::RangeFinder;

/// Score of unreachable cells. Leaves enough headroom to add penalties without overflow.
pub(crate) const NEG_INF: i32 = i32::MIN / 4;

#[inline(always)]
fn is_reachable(score: i32) -> bool {
    score > NEG_INF / 2
}

#[inline(always)]
fn clamp(score: i32) -> i32 {
    score.max(NEG_INF)
}

/// A single step of an alignment between a read and the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignStep<N> {
    Match { vertex: N, read_pos: usize },
    Mismatch { vertex: N, read_pos: usize },
    Insertion { read_pos: usize },
    Deletion { vertex: N },
}

impl<N> AlignStep<N>
where
    N: Copy,
{
    #[inline]
    pub fn vertex(&self) -> Option<N> {
        match *self {
            Self::Match { vertex, .. } | Self::Mismatch { vertex, .. } | Self::Deletion { vertex } => Some(vertex),
            Self::Insertion { .. } => None,
        }
    }

    #[inline]
    pub fn read_pos(&self) -> Option<usize> {
        match *self {
            Self::Match { read_pos, .. } | Self::Mismatch { read_pos, .. } | Self::Insertion { read_pos } => Some(read_pos),
            Self::Deletion { .. } => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            Self::Match { .. } => 'M',
            Self::Mismatch { .. } => 'X',
            Self::Insertion { .. } => 'I',
            Self::Deletion { .. } => 'D',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DpState {
    Match,
    Insertion,
    Deletion,
}

#[derive(Debug, Clone, Copy)]
struct Cell<Ix>
where
    Ix: IndexType,
{
    m: i32,
    ins: i32,
    del: i32,
    m_from: (VertexIndex<Ix>, DpState),
    ins_extend: bool,
    del_from: (VertexIndex<Ix>, bool),
}

impl<Ix> Cell<Ix>
where
    Ix: IndexType,
{
    fn unreachable(v: VertexIndex<Ix>) -> Self {
        Cell {
            m: NEG_INF,
            ins: NEG_INF,
            del: NEG_INF,
            m_from: (v, DpState::Match),
            ins_extend: false,
            del_from: (v, false),
        }
    }

    /// Best score over all states, preferring M over I over D on ties
    #[inline]
    fn best(&self) -> (i32, DpState) {
        let mut best = (self.m, DpState::Match);

        if self.ins > best.0 {
            best = (self.ins, DpState::Insertion);
        }

        if self.del > best.0 {
            best = (self.del, DpState::Deletion);
        }

        best
    }

    #[inline]
    fn score(&self, state: DpState) -> i32 {
        match state {
            DpState::Match => self.m,
            DpState::Insertion => self.ins,
            DpState::Deletion => self.del,
        }
    }
}

/// Banded DP column of a single vertex
#[derive(Debug, Clone)]
struct Column<Ix>
where
    Ix: IndexType,
{
    begin: usize,
    cells: Vec<Cell<Ix>>,
}

impl<Ix> Column<Ix>
where
    Ix: IndexType,
{
    #[inline]
    fn get(&self, row: usize) -> Option<&Cell<Ix>> {
        row.checked_sub(self.begin)
            .and_then(|i| self.cells.get(i))
    }
}

#[inline]
fn column_cell<Ix>(columns: &[Option<Column<Ix>>], v: VertexIndex<Ix>, row: usize) -> Option<Cell<Ix>>
where
    Ix: IndexType,
{
    columns[v.index()].as_ref().and_then(|col| col.get(row).copied())
}

#[derive(Debug, Clone, Copy)]
struct EndCell<Ix>
where
    Ix: IndexType,
{
    vertex: VertexIndex<Ix>,
    row: usize,
    state: DpState,
}

/// Result of a trial alignment of a read to a graph snapshot
///
/// Holds everything required to thread the read into the graph with
/// [`PoaGraph::commit_add`]. Only valid for the graph snapshot it was computed against.
#[derive(Debug)]
pub struct AlignmentMatrix<Ix = u32>
where
    Ix: IndexType,
{
    stamp: GraphStamp,
    mode: AlignMode,
    read: Vec<u8>,
    enter_vertex: VertexIndex<Ix>,
    columns: Vec<Option<Column<Ix>>>,
    score: i32,
    end: Option<EndCell<Ix>>,
    rows: usize,
    cells_evaluated: usize,
}

impl<Ix> AlignmentMatrix<Ix>
where
    Ix: IndexType,
{
    pub(crate) fn compute(
        graph: &PoaGraph<Ix>,
        read: &[u8],
        config: &AlignConfig,
        range_finder: Option<&RangeFinder<Ix>>,
    ) -> Result<Self, PoaError> {
        if read.is_empty() {
            return Err(PoaError::EmptySequence);
        }

        if let Some(rf) = range_finder {
            rf.check_prepared(graph.stamp(), read)?;
        }

        let span = debug_span!("try_add", read_len = read.len(), mode = %config.mode);
        let _enter = span.enter();

        let mut matrix = Self::fill(graph, read, config, |v| {
            range_finder.map(|rf| rf.find_alignable_range(v))
        });

        if matrix.end.is_none() && config.mode != AlignMode::Local && range_finder.is_some() {
            debug!("Read not alignable within the band, computing the full matrix");
            matrix = Self::fill(graph, read, config, |_| None);
        }

        debug!(score = matrix.score, cells = matrix.cells_evaluated, "Trial alignment done");

        Ok(matrix)
    }

    fn enter_column(enter: VertexIndex<Ix>, read_len: usize, mode: AlignMode, params: &AlignParams) -> Column<Ix> {
        let cells = (0..=read_len)
            .map(|row| {
                let mut cell = Cell::unreachable(enter);

                if row == 0 || mode == AlignMode::Local {
                    cell.m = 0;
                } else {
                    // Leading insertions
                    cell.ins = params.gap_score(row);
                    cell.ins_extend = row > 1;
                }

                cell
            })
            .collect();

        Column { begin: 0, cells }
    }

    fn fill<F>(graph: &PoaGraph<Ix>, read: &[u8], config: &AlignConfig, band: F) -> Self
    where
        F: Fn(VertexIndex<Ix>) -> Option<Interval>,
    {
        let params = &config.params;
        let mode = config.mode;
        let enter = graph.enter_vertex();
        let full = Interval::new(0, read.len() + 1);

        let mut columns: Vec<Option<Column<Ix>>> = vec![None; graph.node_bound()];
        columns[enter.index()] = Some(Self::enter_column(enter, read.len(), mode, params));

        let mut rows = 1;
        let mut cells_evaluated = 0;
        let mut preds: SmallVec<[VertexIndex<Ix>; 8]> = SmallVec::new();

        for &v in graph.topological_order() {
            if graph.is_special(v) {
                continue;
            }

            let range = band(v)
                .map(|ival| ival.intersect(&full))
                .unwrap_or(full);

            preds.clear();
            preds.extend(graph.predecessors(v));
            preds.sort_unstable();

            // Free start at this vertex, evaluated after the real predecessors
            let free_start = (mode != AlignMode::Global && !preds.contains(&enter)).then_some(enter);
            let base = graph.vertex_base(v);

            let mut cells: Vec<Cell<Ix>> = Vec::with_capacity(range.len());
            for row in range.begin..range.end {
                let mut cell = Cell::unreachable(enter);

                for &p in &preds {
                    if let Some(pc) = column_cell(&columns, p, row) {
                        let open = pc.m + params.gap_open + params.gap_extend;
                        if open > cell.del {
                            cell.del = open;
                            cell.del_from = (p, false);
                        }

                        let extend = pc.del + params.gap_extend;
                        if extend > cell.del {
                            cell.del = extend;
                            cell.del_from = (p, true);
                        }
                    }
                }

                if row > 0 {
                    let mut best = NEG_INF;
                    for p in preds.iter().copied().chain(free_start) {
                        if let Some(pc) = column_cell(&columns, p, row - 1) {
                            let (score, state) = pc.best();
                            if score > best {
                                best = score;
                                cell.m_from = (p, state);
                            }
                        }
                    }

                    cell.m = best + params.substitution(base, read[row - 1]);

                    if row > range.begin {
                        let prev = &cells[row - 1 - range.begin];
                        cell.ins = prev.m + params.gap_open + params.gap_extend;

                        let extend = prev.ins + params.gap_extend;
                        if extend > cell.ins {
                            cell.ins = extend;
                            cell.ins_extend = true;
                        }
                    }
                }

                cell.m = clamp(cell.m);
                cell.ins = clamp(cell.ins);
                cell.del = clamp(cell.del);

                cells.push(cell);
            }

            rows += 1;
            cells_evaluated += cells.len();
            columns[v.index()] = Some(Column { begin: range.begin, cells });
        }

        let last_row = read.len();
        let mut end: Option<EndCell<Ix>> = None;
        let mut score = NEG_INF;

        match mode {
            AlignMode::Global => {
                let mut exit_preds: SmallVec<[VertexIndex<Ix>; 8]> = graph.predecessors(graph.exit_vertex()).collect();
                exit_preds.sort_unstable();

                for p in exit_preds {
                    if let Some(cell) = column_cell(&columns, p, last_row) {
                        let (cell_score, state) = cell.best();
                        if is_reachable(cell_score) && cell_score > score {
                            score = cell_score;
                            end = Some(EndCell { vertex: p, row: last_row, state });
                        }
                    }
                }
            },
            AlignMode::SemiGlobal => {
                for (ix, column) in columns.iter().enumerate() {
                    let Some(cell) = column.as_ref().and_then(|col| col.get(last_row)) else {
                        continue;
                    };

                    let (cell_score, state) = cell.best();
                    if is_reachable(cell_score) && cell_score > score {
                        score = cell_score;
                        end = Some(EndCell { vertex: VertexIndex::new(ix), row: last_row, state });
                    }
                }
            },
            AlignMode::Local => {
                // An empty alignment scores zero
                score = 0;

                for (ix, column) in columns.iter().enumerate() {
                    if ix == enter.index() {
                        continue;
                    }

                    let Some(column) = column else {
                        continue;
                    };

                    for (i, cell) in column.cells.iter().enumerate() {
                        if cell.m > score {
                            score = cell.m;
                            end = Some(EndCell {
                                vertex: VertexIndex::new(ix),
                                row: column.begin + i,
                                state: DpState::Match
                            });
                        }
                    }
                }
            }
        }

        AlignmentMatrix {
            stamp: graph.stamp(),
            mode,
            read: read.to_vec(),
            enter_vertex: enter,
            columns,
            score,
            end,
            rows,
            cells_evaluated,
        }
    }

    #[inline]
    fn cell(&self, v: VertexIndex<Ix>, row: usize) -> Option<&Cell<Ix>> {
        self.columns.get(v.index())
            .and_then(|col| col.as_ref())
            .and_then(|col| col.get(row))
    }

    /// Trace back the optimal alignment. Every read position occurs exactly once in the returned
    /// steps; unaligned read ends are reported as insertions.
    pub fn backtrace(&self, graph: &PoaGraph<Ix>) -> Vec<AlignStep<VertexIndex<Ix>>> {
        let read_len = self.read.len();

        let Some(end) = self.end else {
            return (0..read_len)
                .map(|read_pos| AlignStep::Insertion { read_pos })
                .collect();
        };

        let mut steps = Vec::with_capacity(read_len + 8);
        steps.extend((end.row..read_len).rev().map(|read_pos| AlignStep::Insertion { read_pos }));

        let (mut v, mut row, mut state) = (end.vertex, end.row, end.state);
        while v != self.enter_vertex {
            let Some(cell) = self.cell(v, row) else {
                break;
            };

            debug_assert!(is_reachable(cell.score(state)));

            match state {
                DpState::Match => {
                    let Some(read_pos) = row.checked_sub(1) else {
                        break;
                    };

                    if graph.vertex_base(v) == self.read[read_pos] {
                        steps.push(AlignStep::Match { vertex: v, read_pos });
                    } else {
                        steps.push(AlignStep::Mismatch { vertex: v, read_pos });
                    }

                    (v, state) = cell.m_from;
                    row = read_pos;
                },
                DpState::Insertion => {
                    let Some(read_pos) = row.checked_sub(1) else {
                        break;
                    };

                    steps.push(AlignStep::Insertion { read_pos });
                    state = if cell.ins_extend { DpState::Insertion } else { DpState::Match };
                    row = read_pos;
                },
                DpState::Deletion => {
                    steps.push(AlignStep::Deletion { vertex: v });

                    let (p, extend) = cell.del_from;
                    v = p;
                    state = if extend { DpState::Deletion } else { DpState::Match };
                }
            }
        }

        // Remaining read prefix
        steps.extend((0..row).rev().map(|read_pos| AlignStep::Insertion { read_pos }));
        steps.reverse();

        steps
    }

    /// Alignment as a string of `M` (match), `X` (mismatch), `I` (insertion) and `D` (deletion)
    pub fn transcript(&self, graph: &PoaGraph<Ix>) -> Result<String, GraphError> {
        if self.stamp != graph.stamp() {
            return Err(GraphError::StaleAlignment {
                expected: graph.stamp(),
                found: self.stamp,
            });
        }

        Ok(self.backtrace(graph).iter()
            .map(|step| step.as_char())
            .collect())
    }

    #[inline(always)]
    pub fn score(&self) -> i32 {
        self.score
    }

    /// Number of graph vertex columns evaluated, including the enter vertex
    #[inline(always)]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Read length plus one
    #[inline(always)]
    pub fn columns(&self) -> usize {
        self.read.len() + 1
    }

    #[inline(always)]
    pub fn cells_evaluated(&self) -> usize {
        self.cells_evaluated
    }

    #[inline(always)]
    pub fn stamp(&self) -> GraphStamp {
        self.stamp
    }

    #[inline(always)]
    pub fn mode(&self) -> AlignMode {
        self.mode
    }

    pub fn read(&self) -> &[u8] {
        &self.read
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aligner::config::AlignConfig;

    fn linear_graph(seq: &[u8]) -> PoaGraph<u32> {
        let mut graph = PoaGraph::new();
        graph.add_first_sequence(seq).unwrap();

        graph
    }

    #[test]
    fn test_global() {
        let graph = linear_graph(b"GATTACA");
        let config = AlignConfig::global();

        let matrix = graph.try_add(b"GATTACA", &config, None).unwrap();
        assert_eq!(matrix.score(), 21);
        assert_eq!(matrix.transcript(&graph).unwrap(), "MMMMMMM");

        let matrix = graph.try_add(b"GATCACA", &config, None).unwrap();
        assert_eq!(matrix.score(), 13);
        assert_eq!(matrix.transcript(&graph).unwrap(), "MMMXMMM");

        let matrix = graph.try_add(b"ATTACA", &config, None).unwrap();
        assert_eq!(matrix.score(), 14);
        assert_eq!(matrix.transcript(&graph).unwrap(), "DMMMMMM");
    }

    #[test]
    fn test_global_vs_semi_global() {
        let graph = linear_graph(b"CCCGATTACATTT");

        let matrix = graph.try_add(b"GATTACA", &AlignConfig::global(), None).unwrap();
        assert_eq!(matrix.score(), -3);
        assert_eq!(matrix.transcript(&graph).unwrap(), "DDDMMMMMMMDDD");

        let matrix = graph.try_add(b"GATTACA", &AlignConfig::semi_global(), None).unwrap();
        assert_eq!(matrix.score(), 21);
        assert_eq!(matrix.transcript(&graph).unwrap(), "MMMMMMM");
    }

    #[test]
    fn test_local() {
        let graph = linear_graph(b"GATTACA");
        let config = AlignConfig::local();

        let matrix = graph.try_add(b"CCCCGATTACACCCC", &config, None).unwrap();
        assert_eq!(matrix.score(), 21);
        assert_eq!(matrix.transcript(&graph).unwrap(), "IIIIMMMMMMMIIII");

        let steps = matrix.backtrace(&graph);
        assert_eq!(steps.len(), 15);
        assert!(steps.iter().enumerate().all(|(i, s)| s.read_pos() == Some(i)));

        // Nothing to align at all
        let graph = linear_graph(b"AAAA");
        let matrix = graph.try_add(b"CCC", &config, None).unwrap();
        assert_eq!(matrix.score(), 0);
        assert_eq!(matrix.transcript(&graph).unwrap(), "III");
    }

    #[test]
    fn test_dimensions() {
        let graph = linear_graph(b"GATTACA");
        let matrix = graph.try_add(b"GATT", &AlignConfig::global(), None).unwrap();

        assert_eq!(matrix.rows(), 8);
        assert_eq!(matrix.columns(), 5);
        assert_eq!(matrix.cells_evaluated(), 7 * 5);
        assert_eq!(matrix.read(), b"GATT");
        assert_eq!(matrix.mode(), AlignMode::Global);
    }

    #[test]
    fn test_errors() {
        let mut graph = linear_graph(b"GATTACA");
        let config = AlignConfig::global();

        assert!(matches!(graph.try_add(b"", &config, None), Err(PoaError::EmptySequence)));

        let matrix = graph.try_add(b"GATTACA", &config, None).unwrap();
        graph.add_read(b"GATTACA", &config, None).unwrap();

        assert!(matches!(matrix.transcript(&graph), Err(GraphError::StaleAlignment { .. })));
    }

    #[test]
    fn test_deterministic() {
        let mut graph = PoaGraph::<u32>::new();
        let config = AlignConfig::global();
        for read in [&b"ACGTTGCA"[..], b"ACGATGCA", b"ACGTTTGCA", b"AGTTGCA"] {
            graph.add_read(read, &config, None).unwrap();
        }

        let first = graph.try_add(b"ACGTGCA", &config, None).unwrap();
        let second = graph.try_add(b"ACGTGCA", &config, None).unwrap();

        assert_eq!(first.score(), second.score());
        assert_eq!(first.backtrace(&graph), second.backtrace(&graph));
    }
}
